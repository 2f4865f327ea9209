use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::controller::FlushFn;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Fixed-interval flush while an interview is running or paused. The first
/// flush happens one full period after start.
pub async fn flush_loop(flush: FlushFn, period: Duration, cancel_token: CancellationToken) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if flush().await {
                    log_debug!("interval flush complete");
                } else {
                    log_warn!("interval flush failed; in-memory state is still authoritative");
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("flush loop shutting down");
                break;
            }
        }
    }
}
