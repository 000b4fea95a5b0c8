use super::{Ack, PeerTransport};
use crate::runtime::error::{TransportError, TransportResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Peer transport that POSTs JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPeerTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpPeerTransport {
    /// Create a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn post_json(&self, url: &str, payload: serde_json::Value) -> TransportResult<Ack> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|err| TransportError::Request {
                url: url.to_string(),
                detail: err.to_string(),
            })?;

        let status = response.status();
        debug!(url, status = status.as_u16(), "peer answered");
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(Ack {
            status: status.as_u16(),
        })
    }
}
