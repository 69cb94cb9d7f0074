//! Deribit JSON-RPC protocol: outbound commands, the codec, and typed
//! inbound payloads.

mod codec;
mod command;
mod error;
mod payload;

pub use codec::{DecodedMessage, Envelope, ProtocolCodec};
pub use command::{
    is_private_channel, AdvancedMode, AuthGrant, Command, EditRequest, PRIVATE_CHANNEL_PREFIX,
};
pub use error::CodecError;
pub use payload::{
    from_payload, parse_channel_list, ChangesPayload, OneOrMany, OrderPayload,
    OrderResultPayload, TradePayload,
};
