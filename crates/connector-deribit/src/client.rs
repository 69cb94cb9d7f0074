use std::time::{Duration, Instant};

use auth::Authenticator;
use common::{ReconnectBackoff, SessionConfig};
use connector_core::{ConnectionState, ConnectorError, FrameReceiver};
use futures_util::{SinkExt, StreamExt};
use order_manager::OrderError;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::session::SharedOrderManager;

/// Duration of stable connection before resetting backoff.
const STABLE_CONNECTION_THRESHOLD: Duration = Duration::from_secs(300);

/// Timeout for WebSocket connection attempts.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

enum ConnectResult {
    Connected(WsStream),
    Shutdown,
    Error(ConnectorError),
}

async fn connect_with_timeout(url: &str, shutdown_rx: &mut watch::Receiver<bool>) -> ConnectResult {
    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return ConnectResult::Shutdown;
                }
            }

            result = tokio::time::timeout(CONNECTION_TIMEOUT, connect_async(url)) => {
                return match result {
                    Ok(Ok((stream, _))) => ConnectResult::Connected(stream),
                    Ok(Err(e)) => ConnectResult::Error(ConnectorError::WebSocket(e.to_string())),
                    Err(_) => ConnectResult::Error(ConnectorError::WebSocket("connection timeout".to_string())),
                };
            }
        }
    }
}

enum SessionResult {
    Shutdown,
    Connected {
        duration: Duration,
        error: ConnectorError,
    },
    ConnectFailed(ConnectorError),
}

/// Drop frames queued for a connection that no longer exists.
fn discard_stale_frames(frames: &mut FrameReceiver) -> usize {
    let mut dropped = 0;
    while frames.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}

/// Heartbeat and subscriptions, sent once the session may use private methods.
fn finish_setup(manager: &SharedOrderManager, config: &SessionConfig) -> Result<(), OrderError> {
    if let Some(interval) = config.heartbeat_interval {
        manager.set_heartbeat(interval)?;
    }
    if let Some(id) = manager.resubscribe(&config.channels)? {
        debug!(correlation_id = id, "subscriptions requested");
    }
    Ok(())
}

async fn run_session(
    config: &SessionConfig,
    authenticator: Option<&Authenticator>,
    manager: &SharedOrderManager,
    frames: &mut FrameReceiver,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> SessionResult {
    let url = config.environment.ws_url();
    info!(url = %url, "Connecting to Deribit WebSocket");

    let ws_stream = match connect_with_timeout(url, shutdown_rx).await {
        ConnectResult::Connected(stream) => stream,
        ConnectResult::Shutdown => return SessionResult::Shutdown,
        ConnectResult::Error(e) => return SessionResult::ConnectFailed(e),
    };

    let stale = discard_stale_frames(frames);
    if stale > 0 {
        debug!(stale, "discarded frames from previous connection");
    }

    let status = manager.connection_status().clone();
    let mut status_rx = status.subscribe();
    status.set(ConnectionState::Connected);
    let connected_at = Instant::now();

    let mut setup_pending = true;
    match authenticator {
        Some(authenticator) => {
            if let Err(e) = manager.authenticate(authenticator) {
                error!(error = %e, "failed to send authentication request");
            }
        }
        None => {
            if let Err(e) = finish_setup(manager, config) {
                warn!(error = %e, "session setup failed");
            }
            setup_pending = false;
        }
    }

    let (mut write, mut read) = ws_stream.split();
    let mut reap = tokio::time::interval(config.reap_interval);

    let result = loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Shutdown signal received, closing connection");
                    let _ = write.close().await;
                    break SessionResult::Shutdown;
                }
            }

            _ = status_rx.changed(), if setup_pending => {
                if status.get() == ConnectionState::Authenticated {
                    setup_pending = false;
                    if let Err(e) = finish_setup(manager, config) {
                        warn!(error = %e, "session setup failed");
                    }
                }
            }

            _ = reap.tick() => {
                let expired = manager.reap_expired(config.request_timeout);
                if !expired.is_empty() {
                    debug!(count = expired.len(), "requests timed out");
                }
            }

            Some(frame) = frames.recv() => {
                if let Err(e) = write.send(Message::Text(frame)).await {
                    error!(error = %e, "WebSocket send failed");
                    break SessionResult::Connected {
                        duration: connected_at.elapsed(),
                        error: ConnectorError::WebSocket(e.to_string()),
                    };
                }
            }

            msg_opt = read.next() => {
                let msg = match msg_opt {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        break SessionResult::Connected {
                            duration: connected_at.elapsed(),
                            error: ConnectorError::WebSocket(e.to_string()),
                        };
                    }
                    None => {
                        info!("WebSocket stream ended");
                        break SessionResult::Connected {
                            duration: connected_at.elapsed(),
                            error: ConnectorError::ConnectionClosed,
                        };
                    }
                };

                match msg {
                    Message::Text(text) => manager.handle_frame(&text),
                    Message::Ping(data) => {
                        debug!("Received Ping, sending Pong");
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!(error = %e, "Failed to send Pong");
                            break SessionResult::Connected {
                                duration: connected_at.elapsed(),
                                error: ConnectorError::WebSocket(e.to_string()),
                            };
                        }
                    }
                    Message::Close(_) => {
                        info!("WebSocket closed by server");
                        break SessionResult::Connected {
                            duration: connected_at.elapsed(),
                            error: ConnectorError::ConnectionClosed,
                        };
                    }
                    _ => {}
                }
            }
        }
    };

    status.set(ConnectionState::Disconnected);
    // Replies to these can only arrive on the socket that just closed.
    let abandoned = manager.reap_expired(Duration::ZERO);
    if !abandoned.is_empty() {
        warn!(count = abandoned.len(), "abandoned in-flight requests");
    }
    result
}

/// Run the connection adapter with automatic reconnection.
///
/// Returns `Ok(())` on shutdown and an error once the reconnect budget in
/// `config.reconnect` is used up. Confirmed subscriptions are requested
/// again after every reconnect.
pub async fn run_connector(
    config: SessionConfig,
    authenticator: Option<Authenticator>,
    manager: SharedOrderManager,
    mut frames: FrameReceiver,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), ConnectorError> {
    let metrics = manager.metrics().clone();
    let mut backoff = ReconnectBackoff::new(config.reconnect.clone());
    let mut needs_reconnect = false;

    loop {
        if *shutdown_rx.borrow() {
            info!("Shutdown requested, exiting connector");
            return Ok(());
        }

        let error = match run_session(
            &config,
            authenticator.as_ref(),
            &manager,
            &mut frames,
            &mut shutdown_rx,
        )
        .await
        {
            SessionResult::Shutdown => {
                info!("Connector shutdown complete");
                return Ok(());
            }
            SessionResult::Connected { duration, error } => {
                if needs_reconnect {
                    metrics.inc_reconnect_successes();
                }
                if duration >= STABLE_CONNECTION_THRESHOLD {
                    info!(
                        duration_secs = duration.as_secs(),
                        "Connection was stable, resetting backoff"
                    );
                    backoff.reset();
                }
                error
            }
            SessionResult::ConnectFailed(error) => error,
        };
        needs_reconnect = true;

        if backoff.exhausted() {
            error!(attempts = backoff.attempt(), "Reconnect attempts exhausted");
            return Err(ConnectorError::RetriesExhausted(backoff.attempt()));
        }

        metrics.inc_reconnect_attempts();
        let delay = backoff.next_delay();
        warn!(
            error = %error,
            attempt = backoff.attempt(),
            delay_secs = delay.as_secs_f64(),
            "Connection lost, reconnecting"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Shutdown requested during backoff");
                    return Ok(());
                }
            }
        }
    }
}
