//! Control-call client for the worker's domain API.
//!
//! Wraps the RPC client for the two calls the host actually makes: fetching
//! a share template and submitting a solved share. All RPC failures are
//! absorbed here and turned into values; nothing propagates to callers.

use serde_json::{json, Value};

use crate::rpc::RpcClient;

/// Fallback when the template carries no explicit target: maximal target,
/// i.e. every hash qualifies.
const MAX_TARGET: &str = "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";

/// Work unit handed out by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTemplate {
    pub header_hex: String,
    pub seed_hash: String,
    pub difficulty: u64,
    pub height: u64,
    pub target: String,
}

/// Worker's verdict on a submitted share.
///
/// The worker's reply shape is not contractually fixed: an object without a
/// `status` field, an unrecognized status string, or any truthy non-object
/// reply all count as `Accepted`. This leniency is deliberate, inherited
/// behavior; tightening it would change observable semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareStatus {
    Accepted,
    Rejected,
    Stale,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareResult {
    pub status: ShareStatus,
    pub message: String,
}

/// Client for the worker's share template / share submission API.
pub struct PoolClient {
    rpc: RpcClient,
    wallet_address: String,
}

impl PoolClient {
    pub fn new(url: &str, wallet_address: impl Into<String>) -> Self {
        Self {
            rpc: RpcClient::from_url(url),
            wallet_address: wallet_address.into(),
        }
    }

    #[cfg(test)]
    fn with_rpc(rpc: RpcClient, wallet_address: impl Into<String>) -> Self {
        Self {
            rpc,
            wallet_address: wallet_address.into(),
        }
    }

    /// Fetch a new share template. Any failure degrades to `None`.
    pub async fn get_block_template(&self) -> Option<BlockTemplate> {
        let params = vec![json!(self.wallet_address)];
        match self.rpc.call("get_share_template", params).await {
            Ok(result) => {
                let template = parse_block_template(&result);
                if template.is_none() {
                    log::warn!("p2pool: share template reply missing expected fields");
                }
                template
            }
            Err(e) => {
                log::warn!("p2pool: get_share_template failed: {}", e);
                None
            }
        }
    }

    /// Submit a solved share. Failures degrade to an `Error` status.
    pub async fn submit_share(&self, header_hex: &str) -> ShareResult {
        let params = vec![json!(header_hex), json!(self.wallet_address)];
        match self.rpc.call("submit_share", params).await {
            Ok(result) => parse_share_result(&result),
            Err(e) => {
                log::warn!("p2pool: submit_share failed: {}", e);
                ShareResult {
                    status: ShareStatus::Error,
                    message: format!("Error: {}", e),
                }
            }
        }
    }
}

fn parse_block_template(result: &Value) -> Option<BlockTemplate> {
    // The template blob key differs between worker versions.
    let header_hex = result
        .get("blocktemplate_blob")
        .or_else(|| result.get("header"))
        .and_then(Value::as_str)?
        .to_string();

    Some(BlockTemplate {
        header_hex,
        seed_hash: result.get("seed_hash")?.as_str()?.to_string(),
        difficulty: result.get("difficulty")?.as_u64()?,
        height: result.get("height")?.as_u64()?,
        target: result
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or(MAX_TARGET)
            .to_string(),
    })
}

fn parse_share_result(result: &Value) -> ShareResult {
    if let Some(obj) = result.as_object() {
        let status = obj.get("status").and_then(Value::as_str);
        let message = obj
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let (status, default_message) = match status {
            Some("accepted") => (ShareStatus::Accepted, "Share accepted"),
            Some("rejected") => (ShareStatus::Rejected, "Share rejected"),
            Some("stale") => (ShareStatus::Stale, "Share stale"),
            Some(_) => (ShareStatus::Accepted, "Share submitted"),
            None => (ShareStatus::Accepted, "Share accepted"),
        };

        return ShareResult {
            status,
            message: if message.is_empty() {
                default_message.to_string()
            } else {
                message
            },
        };
    }

    let message = if result.as_bool() == Some(true) {
        "Share accepted"
    } else {
        "Share submitted"
    };
    ShareResult {
        status: ShareStatus::Accepted,
        message: message.to_string(),
    }
}
