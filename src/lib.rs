//! In-process supervisor for the p2pool mining helper.
//!
//! Embedded in the host daemon, this crate owns the worker's full
//! lifecycle: spawning it, watching OS-level liveness and HTTP health,
//! restarting it with bounded backoff, and serving a cached status
//! snapshot to the rest of the application.

mod client;
mod config;
mod error;
mod process;
mod rpc;
mod status;

#[cfg(test)]
mod testutil;

pub use client::{BlockTemplate, PoolClient, ShareResult, ShareStatus};
pub use config::{resolve_binary_path, WorkerConfig, DEFAULT_RPC_PORT, DEFAULT_STRATUM_PORT};
pub use error::{ErrorKind, Result, SupervisorError};
pub use process::{
    is_process_alive, kill_worker, restart_backoff, spawn_worker, WorkerHandle, WorkerSupervisor,
};
pub use rpc::{parse_worker_url, RpcClient, RpcFailure};
pub use status::{PoolStatus, StatusMonitor};
