//! Worker launch configuration.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SupervisorError};

/// Default RPC port of the host daemon the worker connects back to.
pub const DEFAULT_RPC_PORT: u16 = 8232;

/// Default port the worker serves its stratum/stats API on.
pub const DEFAULT_STRATUM_PORT: u16 = 37889;

const WORKER_BINARY_NAME: &str = "junocash-p2pool";

/// Immutable launch snapshot for the worker process.
///
/// Captured at start time and replayed verbatim on every auto-restart, so
/// restarts are deterministic replays of the original launch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub binary_path: PathBuf,
    pub wallet_address: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
    #[serde(default)]
    pub rpc_user: String,
    #[serde(default)]
    pub rpc_password: String,
    #[serde(default)]
    pub light_mode: bool,
    #[serde(default = "default_stratum_port")]
    pub stratum_port: u16,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_rpc_port() -> u16 {
    DEFAULT_RPC_PORT
}

fn default_stratum_port() -> u16 {
    DEFAULT_STRATUM_PORT
}

fn default_log_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(env::temp_dir)
        .join("p2pool.log")
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::new(),
            wallet_address: String::new(),
            host: default_host(),
            rpc_port: DEFAULT_RPC_PORT,
            rpc_user: String::new(),
            rpc_password: String::new(),
            light_mode: false,
            stratum_port: DEFAULT_STRATUM_PORT,
            log_file: default_log_file(),
        }
    }
}

impl WorkerConfig {
    /// Load a worker configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Fail-fast validation performed before any spawn attempt.
    pub fn validate(&self) -> Result<()> {
        if self.binary_path.as_os_str().is_empty() {
            return Err(SupervisorError::config("worker binary path not configured"));
        }
        if !self.binary_path.exists() {
            return Err(SupervisorError::config(format!(
                "worker binary not found at {}",
                self.binary_path.display()
            )));
        }
        if self.wallet_address.is_empty() {
            return Err(SupervisorError::config("wallet address required"));
        }
        Ok(())
    }

    /// Build the worker's command-line argument vector.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        // Connection back to the host daemon
        args.push("--host".to_string());
        args.push(self.host.clone());
        args.push("--rpc-port".to_string());
        args.push(self.rpc_port.to_string());

        if !self.rpc_user.is_empty() {
            args.push("--rpc-login".to_string());
            args.push(format!("{}:{}", self.rpc_user, self.rpc_password));
        }

        args.push("--wallet".to_string());
        args.push(self.wallet_address.clone());

        // Bind stratum to all interfaces so external miners can connect
        args.push("--stratum".to_string());
        args.push(format!("0.0.0.0:{}", self.stratum_port));

        if self.light_mode {
            args.push("--light-mode".to_string());
        }

        args
    }
}

/// Locate the worker binary: data directory first, then the directory the
/// host daemon itself runs from.
pub fn resolve_binary_path(data_dir: &Path) -> PathBuf {
    let name = if cfg!(windows) {
        format!("{}.exe", WORKER_BINARY_NAME)
    } else {
        WORKER_BINARY_NAME.to_string()
    };

    let candidate = data_dir.join(&name);
    if candidate.exists() {
        return candidate;
    }

    let program_dir = env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    program_dir.join(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> WorkerConfig {
        WorkerConfig {
            binary_path: PathBuf::from("/usr/bin/true"),
            wallet_address: "juno1testwallet".to_string(),
            ..WorkerConfig::default()
        }
    }

    #[test]
    fn args_without_credentials() {
        let config = test_config();
        let args = config.build_args();

        assert_eq!(
            args,
            vec![
                "--host",
                "127.0.0.1",
                "--rpc-port",
                "8232",
                "--wallet",
                "juno1testwallet",
                "--stratum",
                "0.0.0.0:37889",
            ]
        );
    }

    #[test]
    fn args_with_credentials_and_light_mode() {
        let mut config = test_config();
        config.rpc_user = "user".to_string();
        config.rpc_password = "pass".to_string();
        config.light_mode = true;

        let args = config.build_args();
        let login_pos = args.iter().position(|a| a == "--rpc-login");
        assert!(login_pos.is_some());
        assert_eq!(args[login_pos.map_or(0, |p| p + 1)], "user:pass");
        assert_eq!(args.last().map(String::as_str), Some("--light-mode"));
    }

    #[test]
    fn validate_rejects_missing_binary() {
        let mut config = test_config();
        config.binary_path = PathBuf::from("/nonexistent/p2pool-binary");
        assert!(config.validate().is_err());

        config.binary_path = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_toml_file_classifies_errors() {
        use crate::error::ErrorKind;

        let missing = WorkerConfig::from_toml_file(Path::new("/nonexistent/p2pool.toml"));
        assert_eq!(missing.unwrap_err().kind(), ErrorKind::Io);

        let path = std::env::temp_dir().join(format!("p2pool-cfg-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "binary_path = 42").expect("write");
        let malformed = WorkerConfig::from_toml_file(&path);
        assert_eq!(malformed.unwrap_err().kind(), ErrorKind::Config);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn from_toml_file_fills_defaults() {
        let path = std::env::temp_dir().join(format!("p2pool-cfg-ok-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "binary_path = \"/usr/bin/true\"\nwallet_address = \"juno1testwallet\"\n",
        )
        .expect("write");

        let config = WorkerConfig::from_toml_file(&path).expect("load");
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.rpc_port, DEFAULT_RPC_PORT);
        assert_eq!(config.stratum_port, DEFAULT_STRATUM_PORT);
        assert!(!config.light_mode);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn validate_rejects_empty_wallet() {
        let mut config = test_config();
        config.wallet_address = String::new();
        assert!(config.validate().is_err());
    }
}
