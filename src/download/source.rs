use crate::config::DownloadSettings;
use crate::error::Result;
use std::future::Future;
use thiserror::Error;

/// Failure of a single fetch attempt. Every variant is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("server returned HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Where daily files come from
pub trait RemoteSource: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = std::result::Result<Vec<u8>, FetchError>> + Send;
}

/// reqwest-backed source with a per-request timeout and browser User-Agent
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(settings: &DownloadSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self { client })
    }
}

impl RemoteSource for HttpSource {
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(body.to_vec())
    }
}
