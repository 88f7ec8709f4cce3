//! Up/down health probe for the worker process.

use reqwest::Client;

/// Probe the worker's stats endpoint. Healthy iff it answers HTTP 200
/// within the client's timeout; the body is not inspected.
pub(super) async fn check_health(client: &Client, port: u16) -> bool {
    let url = format!("http://127.0.0.1:{}/stats", port);

    match client.get(&url).send().await {
        Ok(response) => response.status().as_u16() == 200,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{json_response, serve_once};
    use std::time::Duration;

    fn probe_client() -> Client {
        Client::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .expect("probe client")
    }

    #[tokio::test]
    async fn healthy_on_200() {
        let port = serve_once(&json_response("{\"hashrate\": 1.0}"));
        assert!(check_health(&probe_client(), port).await);
    }

    #[tokio::test]
    async fn unhealthy_on_error_status() {
        let port = serve_once("HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\n\r\n");
        assert!(!check_health(&probe_client(), port).await);
    }

    #[tokio::test]
    async fn unhealthy_when_unreachable() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        assert!(!check_health(&probe_client(), port).await);
    }
}
