//! WebSocket adapter for the Deribit JSON-RPC API.
//!
//! [`create_session`] wires an order manager to a channel-backed gateway;
//! [`run_connector`] owns the socket, pumps frames both ways and reconnects.

mod client;
mod session;

pub use client::run_connector;
pub use session::{create_session, DeribitSession, SharedOrderManager};
