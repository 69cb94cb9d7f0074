mod console;

use std::time::Duration;

use auth::{ApiCredentials, AuthMethod, Authenticator};
use common::SessionConfig;
use connector_deribit::{create_session, run_connector, DeribitSession};
use console::{execute, format_event, ConsoleCommand};
use metrics::create_metrics;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Interval for periodic health status logging.
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Selects the `public/auth` grant; `client_credentials` unless set.
const AUTH_METHOD_VAR: &str = "DERIBIT_AUTH_METHOD";

fn load_authenticator() -> Option<Authenticator> {
    let credentials = match ApiCredentials::from_env() {
        Ok(credentials) => credentials,
        Err(e) => {
            warn!(error = %e, "No API credentials, private methods will fail");
            return None;
        }
    };
    let method = match std::env::var(AUTH_METHOD_VAR) {
        Ok(value) => match value.parse::<AuthMethod>() {
            Ok(method) => method,
            Err(e) => {
                warn!(error = %e, "Unknown auth method, using client_credentials");
                AuthMethod::default()
            }
        },
        Err(_) => AuthMethod::default(),
    };
    info!(client_id = credentials.client_id(), method = ?method, "Loaded API credentials");
    Some(Authenticator::new(credentials, method))
}

#[tokio::main]
async fn main() {
    common::init_logging();

    let config = match SessionConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return;
        }
    };
    let authenticator = load_authenticator();

    info!(
        environment = ?config.environment,
        channels = ?config.channels,
        "Starting Deribit order session"
    );

    let metrics = create_metrics();
    let DeribitSession {
        manager,
        mut events,
        frames,
    } = create_session(metrics.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let connector_manager = manager.clone();
    let connector_handle = tokio::spawn(async move {
        if let Err(e) = run_connector(
            config,
            authenticator,
            connector_manager,
            frames,
            shutdown_rx,
        )
        .await
        {
            error!(error = %e, "Connector error");
        }
    });

    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, initiating shutdown");
            let _ = shutdown_tx_clone.send(true);
        }
    });

    let health_metrics = metrics.clone();
    let mut health_shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEALTH_LOG_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let snapshot = health_metrics.snapshot();
                    info!(
                        status = %snapshot.health_status(),
                        frames = snapshot.frames_received,
                        fills = snapshot.fills_applied,
                        timeouts = snapshot.request_timeouts,
                        errors = snapshot.protocol_errors + snapshot.transport_errors,
                        reconnects = snapshot.reconnect_attempts,
                        "Health check"
                    );
                }
                _ = health_shutdown_rx.changed() => {
                    if *health_shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", format_event(&event));
        }
    });

    let mut console_shutdown_rx = shutdown_tx.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = console_shutdown_rx.changed() => break,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<ConsoleCommand>() {
            Ok(ConsoleCommand::Quit) => break,
            Ok(command) => match execute(&manager, command) {
                Ok(output) => println!("{output}"),
                Err(e) => println!("error: {e}"),
            },
            Err(e) => println!("error: {e}"),
        }
    }

    let _ = shutdown_tx.send(true);
    info!("Waiting for connector to finish");
    let _ = connector_handle.await;

    println!("\n{}", metrics.snapshot());
    info!("Shutdown complete");
}
