use crate::domain::optimization::run_state::{Heartbeat, ProgressEvent, RunStatus};
use crate::domain::ports::ProgressReporter;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Emits a liveness event every `interval` until the run is terminal.
///
/// Reads the status record only; never touches population or elite.
pub async fn run_heartbeat(
    status: Arc<RwLock<RunStatus>>,
    reporter: Arc<dyn ProgressReporter>,
    interval: Duration,
) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let heartbeat = {
            let status = status.read().await;
            if status.state.is_terminal() {
                break;
            }
            Heartbeat {
                run_id: status.run_id.clone(),
                state: status.state,
                generation: status.generation,
                uptime_seconds: started.elapsed().as_secs(),
                timestamp: Utc::now(),
            }
        };

        reporter.emit(ProgressEvent::Heartbeat(heartbeat));
    }

    debug!("Heartbeat: Run reached a terminal state, stopping");
}
