use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::source::{FocusReading, FocusSignalSource};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(2);
const SAMPLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensingUpdate {
    Reading(FocusReading),
    Failed(String),
}

pub async fn sensing_loop(
    session_id: String,
    source: Arc<dyn FocusSignalSource>,
    updates: mpsc::Sender<SensingUpdate>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval completes immediately; readings start one
    // period after the session does.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let update = match tokio::time::timeout(SAMPLE_TIMEOUT, source.sample()).await {
                    Ok(Ok(reading)) => {
                        log_debug!("focus reading {} (present={}) session {}", reading.score, reading.present, session_id);
                        SensingUpdate::Reading(reading)
                    }
                    Ok(Err(err)) => {
                        log_warn!("{} sample failed for session {}: {err:#}", source.name(), session_id);
                        SensingUpdate::Failed(err.to_string())
                    }
                    Err(_) => {
                        log_warn!("{} sample timed out (> {}s) session {}", source.name(), SAMPLE_TIMEOUT.as_secs(), session_id);
                        SensingUpdate::Failed(format!("sample timed out after {}s", SAMPLE_TIMEOUT.as_secs()))
                    }
                };

                // A full channel must not block shutdown.
                let delivered = tokio::select! {
                    sent = updates.send(update) => sent.is_ok(),
                    _ = cancel_token.cancelled() => false,
                };
                if !delivered {
                    log_info!("sensing loop for session {} stopped while delivering", session_id);
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("sensing loop shutting down");
                break;
            }
        }
    }
}
