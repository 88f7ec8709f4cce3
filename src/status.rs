//! Cached worker status polling.
//!
//! A time-boxed read-through cache in front of the worker's `/stats`
//! endpoint. Frequent status queries never pay network cost inside the TTL,
//! and a failed fetch degrades to a disconnected snapshot instead of an
//! error escaping the status API.

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Mutex;

use crate::rpc::parse_worker_url;

/// How long a fetched snapshot is served without re-fetching.
const CACHE_TTL: Duration = Duration::from_secs(5);

/// Timeout for one stats fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(3);

/// Snapshot of worker statistics. All fields default to zero/false when the
/// worker is unreachable or omits them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolStatus {
    pub connected: bool,
    pub connected_miners: u32,
    pub total_shares: u64,
    pub pool_hashrate: f64,
    pub share_difficulty: u64,
    pub last_share_timestamp: i64,
    pub network_difficulty: u64,
    pub effort_percent: f64,
}

struct CacheSlot {
    status: PoolStatus,
    fetched_at: Option<Instant>,
}

/// Polls the worker's stats endpoint with caching. Independent of the
/// supervisor's lifecycle state; any caller may query it at any time.
pub struct StatusMonitor {
    host: String,
    port: u16,
    ttl: Duration,
    cache: Mutex<CacheSlot>,
}

impl StatusMonitor {
    pub fn new(url: &str) -> Self {
        let (host, port) = parse_worker_url(url);
        Self {
            host,
            port,
            ttl: CACHE_TTL,
            cache: Mutex::new(CacheSlot {
                status: PoolStatus::default(),
                fetched_at: None,
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Current status, served from cache when fresh.
    pub async fn get_status(&self) -> PoolStatus {
        let mut slot = self.cache.lock().await;
        if let Some(at) = slot.fetched_at {
            if at.elapsed() < self.ttl {
                return slot.status.clone();
            }
        }

        slot.status = self.fetch_status().await;
        slot.fetched_at = Some(Instant::now());
        slot.status.clone()
    }

    /// Force a fetch now, bypassing the cache.
    pub async fn refresh_status(&self) {
        let mut slot = self.cache.lock().await;
        slot.status = self.fetch_status().await;
        slot.fetched_at = Some(Instant::now());
    }

    /// Whether the worker is up and answering stats queries.
    pub async fn is_ready(&self) -> bool {
        self.get_status().await.connected
    }

    async fn fetch_status(&self) -> PoolStatus {
        let client = match reqwest::Client::builder().timeout(FETCH_TIMEOUT).build() {
            Ok(client) => client,
            Err(_) => return PoolStatus::default(),
        };

        let url = format!("http://{}:{}/stats", self.host, self.port);
        let response = match client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                log::debug!("p2pool: stats fetch failed: {}", e);
                return PoolStatus::default();
            }
        };

        if response.status().as_u16() != 200 {
            log::debug!("p2pool: stats fetch returned HTTP {}", response.status());
            return PoolStatus::default();
        }

        match response.json::<Value>().await {
            Ok(body) => parse_stats(&body),
            Err(_) => PoolStatus::default(),
        }
    }
}

/// Extract a status snapshot from a stats document.
///
/// Field names vary across worker versions, so each field is tried under a
/// fallback chain of key names; absent fields keep their defaults.
fn parse_stats(body: &Value) -> PoolStatus {
    let mut status = PoolStatus {
        connected: true,
        ..PoolStatus::default()
    };

    if !body.is_object() {
        return status;
    }

    // Connection count: direct number, else connections.incoming,
    // else stratum.connections.
    if let Some(n) = body.get("connections").and_then(Value::as_u64) {
        status.connected_miners = n as u32;
    } else if let Some(n) = body
        .get("connections")
        .and_then(|c| c.get("incoming"))
        .and_then(Value::as_u64)
    {
        status.connected_miners = n as u32;
    }

    if let Some(n) = body.get("shares_found").and_then(Value::as_u64) {
        status.total_shares = n;
    }

    if let Some(rate) = body
        .get("pool_hashrate")
        .or_else(|| body.get("hashrate"))
        .and_then(Value::as_f64)
    {
        status.pool_hashrate = rate;
    }

    if let Some(diff) = body
        .get("current_share_diff")
        .or_else(|| body.get("sidechain_difficulty"))
        .and_then(Value::as_u64)
    {
        status.share_difficulty = diff;
    }

    if let Some(ts) = body.get("last_share_timestamp").and_then(Value::as_i64) {
        status.last_share_timestamp = ts;
    }

    if let Some(diff) = body
        .get("network_difficulty")
        .or_else(|| body.get("mainchain_difficulty"))
        .and_then(Value::as_u64)
    {
        status.network_difficulty = diff;
    }

    if let Some(effort) = body.get("pool_effort").and_then(Value::as_f64) {
        status.effort_percent = effort;
    }

    if status.connected_miners == 0 {
        if let Some(n) = body
            .get("stratum")
            .and_then(|s| s.get("connections"))
            .and_then(Value::as_u64)
        {
            status.connected_miners = n as u32;
        }
    }

    status
}
