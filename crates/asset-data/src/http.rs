//! Shared HTTP client construction and page fetching.

use std::time::Duration;

use tracing::debug;

use crate::error::SourceError;

/// Desktop browser User-Agent; quote pages reject the reqwest default.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpSettings {
    pub fn build_client(&self) -> Result<reqwest::Client, SourceError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| SourceError::Parse(format!("http client: {e}")))
    }
}

/// GET a page body, classifying non-success statuses.
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String, SourceError> {
    debug!(url = url, "GET");

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::from_status(status, url));
    }

    Ok(response.text().await?)
}
