//! Reconnection loop with exponential backoff.
//!
//! Spawned by the connection manager after an unexpected close or a
//! failed explicit connect. The delay doubles per failed attempt up to
//! the configured cap and then stays there; attempts never stop. User
//! actions (connect, disconnect, mock enable) cancel the loop through
//! its token.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::manager::ConnectionManager;

pub(crate) async fn reconnect_loop(
    manager: ConnectionManager,
    cancel: CancellationToken,
    generation: u64,
) {
    loop {
        let failures = manager.attempt.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        let delay = manager.reconnect.delay_for_attempt(failures);
        info!(
            attempt = failures,
            delay_secs = delay.as_secs_f64(),
            "scheduling reconnection attempt"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("reconnect cancelled");
                break;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        if cancel.is_cancelled() || manager.is_mock_mode() {
            break;
        }

        if manager.try_connect().await {
            info!("reconnected");
            break;
        }
        // Failed again; next iteration backs off further.
    }

    manager.clear_reconnect_slot(generation);
}
