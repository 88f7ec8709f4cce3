//! Worker lifecycle supervision and runtime monitoring.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::Client;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::control::{kill_worker, spawn_worker, WorkerHandle};
use super::health::check_health;
use super::{
    restart_backoff, GRACEFUL_SHUTDOWN_WAIT, HEALTH_CHECK_INTERVAL, MAX_HTTP_FAILURES,
    MAX_RESTART_ATTEMPTS, STOP_POLL_INTERVAL,
};
use crate::config::WorkerConfig;
use crate::error::{Result, SupervisorError};

/// Supervises one long-lived worker process: spawns it, watches OS-level
/// liveness and HTTP health from a background task, restarts it with
/// exponential backoff, and gives up after too many failed attempts.
///
/// One long-lived instance, owned by the host's startup sequence.
pub struct WorkerSupervisor {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<Lifecycle>,
    /// Fast-path flags readable without taking the state lock.
    running: AtomicBool,
    pid: AtomicU32,
    /// Unix seconds of the last (re)spawn; 0 when stopped.
    start_time: AtomicI64,
    /// Counters owned by the monitor loop; other threads only read them.
    http_failures: AtomicU32,
    restart_attempts: AtomicU32,
    /// Cooperative cancellation flag, checked at every sleep boundary.
    stop: AtomicBool,
    probe_client: Client,
}

struct Lifecycle {
    handle: Option<WorkerHandle>,
    config: Option<WorkerConfig>,
    monitor: Option<JoinHandle<()>>,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl WorkerSupervisor {
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let probe_client = Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(Lifecycle {
                    handle: None,
                    config: None,
                    monitor: None,
                }),
                running: AtomicBool::new(false),
                pid: AtomicU32::new(0),
                start_time: AtomicI64::new(0),
                http_failures: AtomicU32::new(0),
                restart_attempts: AtomicU32::new(0),
                stop: AtomicBool::new(false),
                probe_client,
            }),
        }
    }

    /// Start the worker and begin monitoring it.
    ///
    /// No-op when already running. Validates the configuration before any
    /// spawn attempt; the config is captured and replayed verbatim on every
    /// subsequent auto-restart.
    pub async fn start(&self, config: WorkerConfig) -> Result<()> {
        // One lock across the whole check-spawn-record sequence, so two
        // concurrent starts cannot both spawn a worker.
        let mut state = self.shared.state.lock().await;

        if self.shared.running.load(Ordering::SeqCst) {
            log::info!(
                "p2pool: already running (PID {})",
                self.shared.pid.load(Ordering::SeqCst)
            );
            return Ok(());
        }

        config.validate()?;

        // Join any monitor left over from a failed episode. Such a monitor
        // has already broken out of its loop and takes no further locks;
        // the stop flag covers one still draining a sleep.
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(monitor) = state.monitor.take() {
            let _ = monitor.await;
        }

        let handle = spawn_worker(&config.binary_path, &config.build_args(), &config.log_file)?;
        let pid = handle.pid();
        let probe_port = config.stratum_port;

        state.handle = Some(handle);
        state.config = Some(config);

        self.shared.pid.store(pid, Ordering::SeqCst);
        self.shared.start_time.store(now_secs(), Ordering::SeqCst);
        self.shared.http_failures.store(0, Ordering::SeqCst);
        self.shared.restart_attempts.store(0, Ordering::SeqCst);
        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);

        state.monitor = Some(tokio::spawn(monitor_loop(
            Arc::clone(&self.shared),
            probe_port,
        )));
        drop(state);

        log::info!("p2pool: started (PID {})", pid);
        Ok(())
    }

    /// Stop monitoring and kill the worker. Joins the monitor task before
    /// touching the process, so no monitor-driven respawn can race this.
    /// Idempotent on a non-running instance.
    pub async fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);

        let monitor = {
            let mut state = self.shared.state.lock().await;
            state.monitor.take()
        };
        if let Some(monitor) = monitor {
            let _ = monitor.await;
        }

        let handle = {
            let mut state = self.shared.state.lock().await;
            state.handle.take()
        };
        let was_running = handle.is_some();
        if let Some(mut handle) = handle {
            log::info!("p2pool: stopping (PID {})...", handle.pid());
            let _ = tokio::task::spawn_blocking(move || {
                kill_worker(&mut handle, GRACEFUL_SHUTDOWN_WAIT)
            })
            .await;
        }

        let mut state = self.shared.state.lock().await;
        state.config = None;
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.pid.store(0, Ordering::SeqCst);
        self.shared.start_time.store(0, Ordering::SeqCst);
        self.shared.http_failures.store(0, Ordering::SeqCst);
        self.shared.restart_attempts.store(0, Ordering::SeqCst);
        drop(state);

        if was_running {
            log::info!("p2pool: stopped");
        }
    }

    /// Manually run one restart sequence, with the same backoff and
    /// give-up policy the monitor applies.
    pub async fn restart(&self) -> Result<()> {
        log::info!("p2pool: restarting...");
        perform_restart(&self.shared).await
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Running and below the HTTP failure threshold.
    pub fn is_healthy(&self) -> bool {
        self.is_running() && self.shared.http_failures.load(Ordering::SeqCst) < MAX_HTTP_FAILURES
    }

    pub fn pid(&self) -> Option<u32> {
        match self.shared.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Seconds since the last successful (re)spawn; zero when stopped.
    pub fn uptime(&self) -> u64 {
        if !self.is_running() {
            return 0;
        }
        match self.shared.start_time.load(Ordering::SeqCst) {
            0 => 0,
            started => now_secs().saturating_sub(started).max(0) as u64,
        }
    }

    /// Restart attempts since the last successful health probe.
    pub fn restart_attempts(&self) -> u32 {
        self.shared.restart_attempts.load(Ordering::SeqCst)
    }
}

impl Default for WorkerSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleep in short sub-waits so a stop request is honored within
/// `STOP_POLL_INTERVAL`. Returns `false` when stopped.
async fn sleep_interruptible(shared: &Shared, total: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + total;
    loop {
        if shared.stop.load(Ordering::SeqCst) {
            return false;
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return true;
        }
        tokio::time::sleep(STOP_POLL_INTERVAL.min(deadline - now)).await;
    }
}

/// One restart sequence: count the attempt, give up past the ceiling,
/// otherwise back off, kill whatever is left and respawn the captured
/// config. Shared by the monitor loop and the public `restart`.
async fn perform_restart(shared: &Shared) -> Result<()> {
    let attempt = shared.restart_attempts.fetch_add(1, Ordering::SeqCst) + 1;

    if attempt > MAX_RESTART_ATTEMPTS {
        log::error!(
            "p2pool: max restart attempts ({}) reached, giving up",
            MAX_RESTART_ATTEMPTS
        );
        shared.running.store(false, Ordering::SeqCst);
        return Err(SupervisorError::process("max restart attempts reached"));
    }

    let delay = restart_backoff(attempt);
    log::info!(
        "p2pool: waiting {} ms before restart (attempt {}/{})",
        delay.as_millis(),
        attempt,
        MAX_RESTART_ATTEMPTS
    );
    if !sleep_interruptible(shared, delay).await {
        return Err(SupervisorError::process("stop requested during restart"));
    }

    // Kill the previous worker if anything is still alive.
    let (handle, config) = {
        let mut state = shared.state.lock().await;
        (state.handle.take(), state.config.clone())
    };
    if let Some(mut handle) = handle {
        let _ =
            tokio::task::spawn_blocking(move || kill_worker(&mut handle, GRACEFUL_SHUTDOWN_WAIT))
                .await;
    }

    let Some(config) = config else {
        shared.running.store(false, Ordering::SeqCst);
        return Err(SupervisorError::process("no launch config captured"));
    };

    let new_handle = match spawn_worker(&config.binary_path, &config.build_args(), &config.log_file)
    {
        Ok(handle) => handle,
        Err(e) => {
            log::error!("p2pool: restart failed: {}", e);
            shared.running.store(false, Ordering::SeqCst);
            return Err(e);
        }
    };

    let pid = new_handle.pid();
    {
        let mut state = shared.state.lock().await;
        state.handle = Some(new_handle);
    }
    shared.pid.store(pid, Ordering::SeqCst);
    shared.start_time.store(now_secs(), Ordering::SeqCst);
    shared.http_failures.store(0, Ordering::SeqCst);

    log::info!("p2pool: restarted successfully (PID {})", pid);
    Ok(())
}

/// The monitor loop: each tick checks OS-level liveness first, then HTTP
/// health. A dead worker goes straight to the restart sequence; probe
/// failures are tolerated up to the threshold. A successful probe resets
/// both counters, so a worker that comes back and stays healthy counts as
/// recovered.
async fn monitor_loop(shared: Arc<Shared>, probe_port: u16) {
    log::info!("p2pool: monitor task started");

    loop {
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }

        let alive = {
            let mut state = shared.state.lock().await;
            state.handle.as_mut().map_or(false, WorkerHandle::is_alive)
        };

        if !alive {
            log::warn!("p2pool: worker died unexpectedly, attempting restart");
            if perform_restart(&shared).await.is_err() {
                log::error!("p2pool: unable to restart, stopping monitor");
                break;
            }
            // Skip the probe this tick; judge the fresh worker next tick.
            continue;
        }

        if check_health(&shared.probe_client, probe_port).await {
            if shared.http_failures.swap(0, Ordering::SeqCst) > 0 {
                log::info!("p2pool: health check passed, resetting failure count");
            }
            shared.restart_attempts.store(0, Ordering::SeqCst);
        } else {
            let failures = shared.http_failures.fetch_add(1, Ordering::SeqCst) + 1;
            log::warn!(
                "p2pool: health check failed ({}/{})",
                failures,
                MAX_HTTP_FAILURES
            );
            if failures >= MAX_HTTP_FAILURES {
                log::warn!("p2pool: too many health check failures, restarting");
                if perform_restart(&shared).await.is_err() {
                    log::error!("p2pool: unable to restart, stopping monitor");
                    break;
                }
            }
        }

        if !sleep_interruptible(&shared, HEALTH_CHECK_INTERVAL).await {
            break;
        }
    }

    log::info!("p2pool: monitor task stopped");
}
