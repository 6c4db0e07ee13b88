//! pulseboard monitor entry point.
//!
//! Headless dashboard client: registers the configured streams, then
//! logs connection state, registration changes and per-channel payload
//! activity until interrupted.

mod config;

use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pulseboard_client::StreamClient;
use pulseboard_protocol::StreamOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting pulseboard monitor"
    );

    // Load configuration.
    let cli_config = match config::CliConfig::load() {
        Ok(c) => {
            info!(name = %c.name, url = %c.url, mock = c.mock_mode, "configuration loaded");
            c
        }
        Err(e) => {
            warn!(error = %e, "failed to load config, using defaults");
            config::CliConfig::default()
        }
    };

    let client = StreamClient::new(cli_config.client_config());
    if cli_config.auto_connect || cli_config.mock_mode {
        client.start().await;
    }

    // Log connection state transitions.
    let mut state_rx = client.connection_state();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = *state_rx.borrow_and_update();
            info!(?state, "connection state changed");
        }
    });

    // Log the confirmed stream set as acknowledgements arrive.
    let mut streams_rx = client.registered_streams();
    tokio::spawn(async move {
        while streams_rx.changed().await.is_ok() {
            let registered: Vec<String> =
                streams_rx.borrow_and_update().iter().cloned().collect();
            info!(?registered, "registered streams updated");
        }
    });

    // Register and watch each configured stream.
    for stream in &cli_config.streams {
        let mut subscription = client.subscribe(stream);
        tokio::spawn(async move {
            while let Some(payload) = subscription.recv().await {
                info!(
                    channel = subscription.channel(),
                    mock = is_mock_payload(&payload),
                    "payload received"
                );
            }
        });

        client.register_for_stream(
            stream,
            StreamOptions {
                interval: Some("real-time".into()),
                details: None,
            },
        );
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    client.shutdown().await;
    Ok(())
}

/// A payload is synthetic when it carries `isMock` directly or on any
/// array element.
fn is_mock_payload(payload: &Value) -> bool {
    match payload {
        Value::Object(map) => map.get("isMock") == Some(&Value::Bool(true)),
        Value::Array(items) => items
            .iter()
            .any(|item| item.get("isMock") == Some(&Value::Bool(true))),
        _ => false,
    }
}
