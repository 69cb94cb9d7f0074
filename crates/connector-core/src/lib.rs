//! Connection Gateway boundary.
//!
//! The order manager only ever sees a [`FrameSink`]: something that accepts
//! a text frame or reports why it could not. The concrete WebSocket adapter
//! drains the other end of a [`ChannelGateway`] and publishes its state on a
//! [`ConnectionStatus`].

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Failure to hand a frame to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,

    #[error("frame channel closed")]
    ChannelClosed,

    #[error("websocket error: {0}")]
    WebSocket(String),
}

/// Errors ending a connection session.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("reconnect attempts exhausted after {0}")]
    RetriesExhausted(u32),

    #[error("shutdown requested")]
    Shutdown,
}

/// Outbound half of the Connection Gateway.
pub trait FrameSink: Send + Sync {
    /// Hand one text frame to the transport. Fire-and-forget.
    fn send(&self, frame: String) -> Result<(), TransportError>;
}

impl<T: FrameSink + ?Sized> FrameSink for Arc<T> {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        (**self).send(frame)
    }
}

/// Connection lifecycle as seen by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Socket open, not yet authenticated; public methods work.
    Connected,
    Authenticated,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::Authenticated => write!(f, "AUTHENTICATED"),
        }
    }
}

/// Observable connection state, cheap to clone.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    tx: Arc<watch::Sender<ConnectionState>>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStatus {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Publish a new state, returning the previous one.
    pub fn set(&self, state: ConnectionState) -> ConnectionState {
        let previous = self.tx.send_replace(state);
        if previous != state {
            tracing::info!(from = %previous, to = %state, "connection state changed");
        }
        previous
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Resolve once the connection is open (connected or authenticated).
    pub async fn wait_until_open(&self) -> ConnectionState {
        self.wait_for(ConnectionState::is_open).await
    }

    /// Resolve once the session is authenticated.
    pub async fn wait_until_authenticated(&self) -> ConnectionState {
        self.wait_for(|s| *s == ConnectionState::Authenticated).await
    }

    async fn wait_for(&self, predicate: impl FnMut(&ConnectionState) -> bool) -> ConnectionState {
        let mut rx = self.tx.subscribe();
        let state = match rx.wait_for(predicate).await {
            Ok(state) => *state,
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => self.get(),
        };
        state
    }
}

pub type FrameSender = mpsc::UnboundedSender<String>;
pub type FrameReceiver = mpsc::UnboundedReceiver<String>;

/// Frame sink backed by an unbounded channel drained by the socket task.
///
/// Sends are refused while the connection is down so callers learn about
/// it synchronously instead of queueing frames for a future session.
#[derive(Debug, Clone)]
pub struct ChannelGateway {
    tx: FrameSender,
    status: ConnectionStatus,
}

impl ChannelGateway {
    pub fn new(tx: FrameSender, status: ConnectionStatus) -> Self {
        Self { tx, status }
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }
}

impl FrameSink for ChannelGateway {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        if !self.status.get().is_open() {
            return Err(TransportError::NotConnected);
        }
        self.tx
            .send(frame)
            .map_err(|_| TransportError::ChannelClosed)
    }
}

/// Create a gateway and the receiver the socket task drains.
pub fn create_frame_channel(status: ConnectionStatus) -> (ChannelGateway, FrameReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelGateway::new(tx, status), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_gateway_refuses_while_disconnected() {
        let status = ConnectionStatus::new();
        let (gateway, mut rx) = create_frame_channel(status.clone());

        assert_eq!(gateway.send("a".into()), Err(TransportError::NotConnected));

        status.set(ConnectionState::Connected);
        gateway.send("b".into()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "b");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_gateway_reports_closed_channel() {
        let status = ConnectionStatus::new();
        status.set(ConnectionState::Authenticated);
        let (gateway, rx) = create_frame_channel(status);
        drop(rx);

        assert_eq!(gateway.send("a".into()), Err(TransportError::ChannelClosed));
    }

    #[test]
    fn test_set_returns_previous() {
        let status = ConnectionStatus::new();
        assert_eq!(status.set(ConnectionState::Connected), ConnectionState::Disconnected);
        assert_eq!(status.get(), ConnectionState::Connected);
        assert!(status.get().is_open());
    }

    #[tokio::test]
    async fn test_wait_until_open() {
        let status = ConnectionStatus::new();
        let waiter = {
            let status = status.clone();
            tokio::spawn(async move { status.wait_until_open().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        status.set(ConnectionState::Connected);

        let state = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_wait_until_authenticated_immediate() {
        let status = ConnectionStatus::new();
        status.set(ConnectionState::Authenticated);
        assert_eq!(status.wait_until_authenticated().await, ConnectionState::Authenticated);
    }
}
