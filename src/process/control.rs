//! Platform-agnostic process control: spawn, liveness, kill.
//!
//! These functions block; async callers route them through
//! `tokio::task::spawn_blocking`.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::{Result, SupervisorError};
use crate::process::STOP_POLL_INTERVAL;

/// Owned reference to a spawned worker process.
///
/// Exclusively owned by the supervisor; invalidated by dropping it after a
/// confirmed kill or exit. Liveness goes through `try_wait`, which also
/// reaps the child so an exited worker never lingers as a zombie.
#[derive(Debug)]
pub struct WorkerHandle {
    pid: u32,
    child: Child,
}

impl WorkerHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// OS-level liveness of the owned child.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

/// Spawn the worker with its stdout/stderr appended to `log_file` and stdin
/// detached. Log redirection is best-effort: a log file that cannot be
/// opened never blocks the spawn.
pub fn spawn_worker(binary: &Path, args: &[String], log_file: &Path) -> Result<WorkerHandle> {
    let (stdout, stderr) = open_log(log_file);

    let mut cmd = Command::new(binary);
    cmd.args(args).stdin(Stdio::null()).stdout(stdout).stderr(stderr);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt as _;
        cmd.process_group(0);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt as _;
        use windows::Win32::System::Threading::CREATE_NO_WINDOW;
        cmd.creation_flags(CREATE_NO_WINDOW.0);
    }

    let child = cmd
        .spawn()
        .map_err(|e| SupervisorError::spawn(format!("failed to spawn worker: {}", e)))?;

    let pid = child.id();
    Ok(WorkerHandle { pid, child })
}

fn open_log(log_file: &Path) -> (Stdio, Stdio) {
    let file = OpenOptions::new().create(true).append(true).open(log_file);
    match file {
        Ok(out) => match out.try_clone() {
            Ok(err) => (Stdio::from(out), Stdio::from(err)),
            Err(_) => (Stdio::from(out), Stdio::null()),
        },
        Err(e) => {
            log::warn!(
                "p2pool: failed to open log file {}: {}, discarding worker output",
                log_file.display(),
                e
            );
            (Stdio::null(), Stdio::null())
        }
    }
}

/// Check whether a process with the given pid exists. Pid 0 is defined as
/// dead without a syscall.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if pid == 0 {
        return false;
    }
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Check whether a process with the given pid exists. Pid 0 is defined as
/// dead without a syscall.
#[cfg(windows)]
pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    super::win_api::is_process_alive(pid)
}

#[cfg(unix)]
fn graceful_signal(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(|e| {
        SupervisorError::process(format!("failed to send SIGTERM to PID {}: {}", pid, e))
    })
}

// The worker has no console window to deliver a signal to; the graceful
// step is just the grace-period wait before termination.
#[cfg(windows)]
fn graceful_signal(_pid: u32) -> Result<()> {
    Ok(())
}

/// Terminate the worker: graceful signal, poll liveness until the grace
/// period elapses, then force kill and reap. Best-effort, never errors.
pub fn kill_worker(handle: &mut WorkerHandle, grace: Duration) {
    if !handle.is_alive() {
        return;
    }

    let pid = handle.pid();
    log::info!("p2pool: sending graceful shutdown signal to PID {}", pid);

    if graceful_signal(pid).is_ok() {
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if !handle.is_alive() {
                log::info!("p2pool: worker exited gracefully");
                return;
            }
            std::thread::sleep(STOP_POLL_INTERVAL);
        }
        log::warn!("p2pool: worker did not exit within grace period, force killing");
    } else {
        log::warn!("p2pool: graceful signal failed for PID {}, force killing", pid);
    }

    if let Err(e) = handle.child.kill() {
        log::error!("p2pool: failed to force kill PID {}: {}", pid, e);
        return;
    }
    // Reap so the OS releases the process entry.
    let _ = handle.child.wait();
}
