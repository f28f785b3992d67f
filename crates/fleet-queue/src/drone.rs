//! Drone-compatible HTTP queue source.
//!
//! Issues `GET {address}/api/queue` with a bearer token and counts the
//! stages whose status is `pending`. Plain HTTP/1.1 only; terminate TLS in
//! front of the coordinator if it is not on a private network.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::Uri;
use http_body_util::{BodyExt, Empty};
use serde::Deserialize;
use tracing::debug;

use crate::error::QueueError;
use crate::source::QueueSource;

/// One entry of the coordinator's queue listing. Other fields are ignored.
#[derive(Debug, Deserialize)]
struct Stage {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Clone)]
pub struct DroneQueue {
    /// `host:port` to connect to.
    authority: String,
    /// Origin-form request target, e.g. `/api/queue`.
    path: Uri,
    token: Option<String>,
    concurrency: u32,
    timeout: Duration,
}

impl DroneQueue {
    /// Build a queue client for `address` (e.g. "http://drone:8080").
    pub fn new(
        address: &str,
        token: Option<String>,
        concurrency: u32,
        timeout: Duration,
    ) -> Result<Self, QueueError> {
        let base: Uri = address
            .parse()
            .map_err(|_| QueueError::InvalidAddress(address.to_string()))?;
        if base.scheme_str().is_some_and(|s| s != "http") {
            return Err(QueueError::InvalidAddress(address.to_string()));
        }
        let host = base
            .host()
            .ok_or_else(|| QueueError::InvalidAddress(address.to_string()))?;
        let authority = format!("{host}:{}", base.port_u16().unwrap_or(80));

        let prefix = base.path().trim_end_matches('/');
        let path: Uri = format!("{prefix}/api/queue")
            .parse()
            .map_err(|_| QueueError::InvalidAddress(address.to_string()))?;

        Ok(Self {
            authority,
            path,
            token,
            concurrency,
            timeout,
        })
    }

    async fn fetch(&self) -> Result<Bytes, QueueError> {
        let stream = tokio::net::TcpStream::connect(&self.authority)
            .await
            .map_err(|e| QueueError::Unreachable(e.to_string()))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| QueueError::Unreachable(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let mut req = http::Request::builder()
            .method("GET")
            .uri(self.path.clone())
            .header("host", &self.authority)
            .header("accept", "application/json")
            .header("user-agent", "fleetd/0.1");
        if let Some(token) = &self.token {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        let req = req
            .body(Empty::<Bytes>::new())
            .map_err(|e| QueueError::InvalidAddress(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| QueueError::Unreachable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(QueueError::Status(resp.status().as_u16()));
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| QueueError::Unreachable(e.to_string()))?;
        Ok(body.to_bytes())
    }
}

/// Count pending stages in a queue listing.
fn count_pending(body: &[u8]) -> Result<u32, QueueError> {
    let stages: Vec<Stage> =
        serde_json::from_slice(body).map_err(|e| QueueError::Decode(e.to_string()))?;
    let pending = stages.iter().filter(|s| s.status == "pending").count();
    Ok(u32::try_from(pending).unwrap_or(u32::MAX))
}

#[async_trait]
impl QueueSource for DroneQueue {
    async fn pending_count(&self) -> Result<u32, QueueError> {
        let body = tokio::time::timeout(self.timeout, self.fetch())
            .await
            .map_err(|_| {
                QueueError::Unreachable(format!("timed out after {:?}", self.timeout))
            })??;
        let pending = count_pending(&body)?;
        debug!(authority = %self.authority, path = %self.path, pending, "queue polled");
        Ok(pending)
    }

    fn concurrency(&self) -> u32 {
        self.concurrency
    }
}
