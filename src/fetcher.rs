// 🌐 Feed Fetcher
// Retrieves the raw daily feed bytes. No retries here: a failed fetch is
// exactly one failure event, and the scheduler owns the retry policy.

use crate::config::FeedConfig;
use crate::error::IngestError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Source of raw feed bytes.
///
/// `HttpFeedFetcher` is the production implementation; tests plug in
/// canned payloads or scripted failures.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the whole payload, uninterpreted
    async fn fetch(&self) -> Result<Vec<u8>, IngestError>;

    /// Where the payload comes from (used in logs and the audit trail)
    fn endpoint(&self) -> &str;
}

/// Fetches the feed over HTTP(S) from a fixed URL.
pub struct HttpFeedFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpFeedFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration, user_agent: &str) -> Result<Self, IngestError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| IngestError::Transport {
                url: url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, url })
    }

    pub fn from_config(feed: &FeedConfig) -> Result<Self, IngestError> {
        Self::new(feed.url.clone(), feed.timeout(), &feed.user_agent)
    }

    fn transport_error(&self, reason: impl Into<String>) -> IngestError {
        IngestError::Transport {
            url: self.url.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedFetcher {
    async fn fetch(&self) -> Result<Vec<u8>, IngestError> {
        let resp = self.client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(format!("request timed out: {e}"))
            } else {
                self.transport_error(format!("request failed: {e}"))
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(self.transport_error(format!("HTTP {status}")));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| self.transport_error(format!("failed to read body: {e}")))?;

        debug!(url = %self.url, bytes = body.len(), "feed fetched");
        Ok(body.to_vec())
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one canned HTTP response on a random local port
    async fn serve_once(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket.write_all(&response).await.unwrap();
            let _ = socket.shutdown().await;
        });

        format!("http://{addr}/scripts/XML_daily.asp")
    }

    fn fetcher(url: &str) -> HttpFeedFetcher {
        HttpFeedFetcher::new(url, Duration::from_secs(5), "rate-tracker-test").unwrap()
    }

    #[tokio::test]
    async fn test_success_returns_raw_bytes() {
        // 0xC4 0xEE 0xEB 0xEB 0xE0 0xF0 = "Доллар" in windows-1251
        let body: Vec<u8> = vec![0xC4, 0xEE, 0xEB, 0xEB, 0xE0, 0xF0];
        let mut response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(&body);

        let url = serve_once(response).await;
        let bytes = fetcher(&url).fetch().await.unwrap();

        assert_eq!(bytes, body);
    }

    #[tokio::test]
    async fn test_non_success_status_is_transport_error() {
        let response =
            b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec();
        let url = serve_once(response).await;

        let err = fetcher(&url).fetch().await.unwrap_err();

        assert_eq!(err.kind(), "transport");
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = fetcher(&format!("http://{addr}/")).fetch().await.unwrap_err();
        assert!(matches!(err, IngestError::Transport { .. }));
    }
}
