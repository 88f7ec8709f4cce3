//! Worker process supervision.

mod control;
mod health;
mod manager;

#[cfg(windows)]
pub(crate) mod win_api;

use std::time::Duration;

pub use control::{is_process_alive, kill_worker, spawn_worker, WorkerHandle};
pub use manager::WorkerSupervisor;

/// Monitor tick interval.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Consecutive HTTP probe failures tolerated before a restart.
const MAX_HTTP_FAILURES: u32 = 3;

/// Restart attempts before the supervisor gives up permanently.
const MAX_RESTART_ATTEMPTS: u32 = 5;

/// How long a worker gets to exit after the graceful signal.
const GRACEFUL_SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

/// Granularity of interruptible sleeps; bounds stop latency.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

const RESTART_BACKOFF_BASE_MS: u64 = 1000;
const RESTART_BACKOFF_CAP_MS: u64 = 16_000;

/// Backoff delay before restart attempt `attempt` (1-indexed):
/// 1s, 2s, 4s, 8s, then capped at 16s.
pub fn restart_backoff(attempt: u32) -> Duration {
    // The cap is reached at attempt 5; clamping the shift keeps the
    // arithmetic safe for any attempt count.
    let shift = attempt.saturating_sub(1).min(4);
    let ms = (RESTART_BACKOFF_BASE_MS << shift).min(RESTART_BACKOFF_CAP_MS);
    Duration::from_millis(ms)
}
