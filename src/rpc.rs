//! Minimal JSON-RPC-over-HTTP client for the worker's control API.
//!
//! One HTTP round trip per call: no retry, no connection reuse. Failures are
//! classified precisely enough that callers can tell "worker is down" apart
//! from "worker is up but broken".

use std::fmt;
use std::time::Duration;

use serde_json::{json, Value};

use crate::config::DEFAULT_STRATUM_PORT;

/// Timeout for control calls (template fetch, share submission).
const CONTROL_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Classified outcome of a failed RPC call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcFailure {
    /// Could not reach the worker at all (refused, unreachable, timed out)
    Connect,
    /// Connected, but the worker answered with a non-200 HTTP status
    HttpStatus(u16),
    /// 200 response whose body was not a JSON object
    Parse,
    /// Well-formed reply carrying a non-null `error` field
    Rpc(String),
}

impl fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "couldn't connect to p2pool server"),
            Self::HttpStatus(code) => write!(f, "server returned HTTP error {}", code),
            Self::Parse => write!(f, "couldn't parse reply from server"),
            Self::Rpc(message) => write!(f, "RPC error: {}", message),
        }
    }
}

/// Split a worker URL like `http://127.0.0.1:37889` into host and port.
/// The scheme is optional; the port defaults to the worker's stratum port.
pub fn parse_worker_url(url: &str) -> (String, u16) {
    let rest = match url.find("://") {
        Some(pos) => &url[pos + 3..],
        None => url,
    };
    let rest = rest.split('/').next().unwrap_or(rest);

    match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().unwrap_or(DEFAULT_STRATUM_PORT);
            (host.to_string(), port)
        }
        None => (rest.to_string(), DEFAULT_STRATUM_PORT),
    }
}

/// Issues single JSON-RPC requests against one worker endpoint.
pub struct RpcClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: CONTROL_CALL_TIMEOUT,
        }
    }

    pub fn from_url(url: &str) -> Self {
        let (host, port) = parse_worker_url(url);
        Self::new(host, port)
    }

    #[cfg(test)]
    pub(crate) fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Perform one JSON-RPC call with positional parameters.
    ///
    /// Returns the reply's `result` field verbatim. Retry policy belongs to
    /// callers; this never retries internally.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcFailure> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|_| RpcFailure::Connect)?;

        let body = json!({
            "method": method,
            "params": params,
            "id": 1,
        });

        let response = client
            .post(format!("http://{}:{}/", self.host, self.port))
            .header(reqwest::header::CONNECTION, "close")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|_| RpcFailure::Connect)?;

        let status = response.status();
        if status.as_u16() != 200 {
            return Err(RpcFailure::HttpStatus(status.as_u16()));
        }

        let reply: Value = response.json().await.map_err(|_| RpcFailure::Parse)?;
        let reply = reply.as_object().ok_or(RpcFailure::Parse)?;

        if let Some(error) = reply.get("error") {
            if !error.is_null() {
                return Err(RpcFailure::Rpc(error.to_string()));
            }
        }

        Ok(reply.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{json_response, serve_once};

    #[test]
    fn url_parsing() {
        assert_eq!(
            parse_worker_url("http://127.0.0.1:37889"),
            ("127.0.0.1".to_string(), 37889)
        );
        assert_eq!(
            parse_worker_url("10.0.0.5:4000"),
            ("10.0.0.5".to_string(), 4000)
        );
        assert_eq!(
            parse_worker_url("http://pool.local"),
            ("pool.local".to_string(), DEFAULT_STRATUM_PORT)
        );
        assert_eq!(
            parse_worker_url("http://pool.local:1234/stats"),
            ("pool.local".to_string(), 1234)
        );
    }

    #[tokio::test]
    async fn call_returns_result_verbatim() {
        let port = serve_once(&json_response("{\"result\":{\"height\":42},\"error\":null}"));
        let client = RpcClient::new("127.0.0.1", port);

        let value = client
            .call("get_share_template", vec![])
            .await
            .unwrap_or(Value::Null);
        assert_eq!(value["height"], 42);
    }

    #[tokio::test]
    async fn call_classifies_rpc_error() {
        let port = serve_once(&json_response(
            "{\"error\":{\"code\":-32601,\"message\":\"method not found\"}}",
        ));
        let client = RpcClient::new("127.0.0.1", port);

        let err = client.call("bogus", vec![]).await.unwrap_err();
        assert!(
            matches!(&err, RpcFailure::Rpc(message) if message.contains("method not found")),
            "expected Rpc failure, got {:?}",
            err
        );
    }

    #[tokio::test]
    async fn call_classifies_http_status() {
        let port = serve_once("HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n");
        let client = RpcClient::new("127.0.0.1", port);

        assert_eq!(
            client.call("anything", vec![]).await.unwrap_err(),
            RpcFailure::HttpStatus(500)
        );
    }

    #[tokio::test]
    async fn call_classifies_parse_failure() {
        let port = serve_once(&json_response("not json at all"));
        let client = RpcClient::new("127.0.0.1", port);

        assert_eq!(
            client.call("anything", vec![]).await.unwrap_err(),
            RpcFailure::Parse
        );
    }

    #[tokio::test]
    async fn call_classifies_connect_failure() {
        // Nothing listens here; bind then drop to find a dead port.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client =
            RpcClient::new("127.0.0.1", port).with_timeout(Duration::from_millis(500));

        assert_eq!(
            client.call("anything", vec![]).await.unwrap_err(),
            RpcFailure::Connect
        );
    }
}
