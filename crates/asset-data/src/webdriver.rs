//! Minimal W3C WebDriver client for pages rendered by client-side scripts.
//!
//! Only the commands the directory scrape needs are implemented: create
//! session, navigate, read page source, delete session. The driver process
//! (chromedriver, selenium) is operated outside this crate; we only talk to
//! its HTTP endpoint.

use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::selector::{first_match_in, SelectorStrategy, StrategyMatch};

/// Chrome flags for an unattended render.
pub const HEADLESS_CHROME_ARGS: &[&str] = &[
    "--headless",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--window-size=1920,1080",
];

const RENDER_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// An open browser session. Call [`WebDriverSession::close`] when done;
/// dropping an unclosed session schedules the DELETE on the current runtime.
#[derive(Debug)]
pub struct WebDriverSession {
    http: reqwest::Client,
    base_url: String,
    id: String,
    closed: bool,
}

impl WebDriverSession {
    /// `POST /session` with headless Chrome capabilities.
    pub async fn start(
        http: reqwest::Client,
        base_url: &str,
        args: &[&str],
    ) -> Result<Self, SourceError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        });

        let response = http
            .post(format!("{base_url}/session"))
            .json(&body)
            .send()
            .await?;
        let payload = read_payload(response).await?;

        // W3C drivers nest the id under `value`; legacy ones put it at the top.
        let id = payload
            .pointer("/value/sessionId")
            .or_else(|| payload.get("sessionId"))
            .and_then(Value::as_str)
            .ok_or_else(|| SourceError::Parse("webdriver: missing sessionId".to_string()))?
            .to_string();

        debug!(session = %id, "webdriver session started");
        Ok(Self {
            http,
            base_url,
            id,
            closed: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn navigate(&self, url: &str) -> Result<(), SourceError> {
        let response = self
            .http
            .post(self.endpoint("url"))
            .json(&json!({ "url": url }))
            .send()
            .await?;
        read_payload(response).await.map(|_| ())
    }

    pub async fn page_source(&self) -> Result<String, SourceError> {
        let response = self.http.get(self.endpoint("source")).send().await?;
        let payload = read_payload(response).await?;
        payload
            .get("value")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SourceError::Parse("webdriver: page source is not a string".to_string()))
    }

    /// Poll the page source until a strategy matches or `timeout` elapses.
    ///
    /// Returns `Ok(None)` if nothing matched in time.
    pub async fn wait_for(
        &self,
        strategies: &[SelectorStrategy],
        timeout: Duration,
    ) -> Result<Option<StrategyMatch>, SourceError> {
        let started = Instant::now();
        loop {
            let source = self.page_source().await?;
            if let Some(found) = first_match_in(&source, strategies)? {
                return Ok(Some(found));
            }
            if started.elapsed() >= timeout {
                return Ok(None);
            }
            tokio::time::sleep(RENDER_POLL_INTERVAL).await;
        }
    }

    /// `DELETE /session/{id}`. Errors are logged, not returned.
    pub async fn close(mut self) {
        self.closed = true;
        match self.http.delete(self.session_url()).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(session = %self.id, "webdriver session closed");
            }
            Ok(resp) => warn!(session = %self.id, status = %resp.status(), "webdriver session close failed"),
            Err(e) => warn!(session = %self.id, error = %e, "webdriver session close failed"),
        }
    }

    fn session_url(&self) -> String {
        format!("{}/session/{}", self.base_url, self.id)
    }

    fn endpoint(&self, command: &str) -> String {
        format!("{}/{}", self.session_url(), command)
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(session = %self.id, "webdriver session leaked: no runtime to close it");
            return;
        };
        let request = self.http.delete(self.session_url());
        let id = self.id.clone();
        handle.spawn(async move {
            if let Err(e) = request.send().await {
                warn!(session = %id, error = %e, "webdriver session close failed");
            }
        });
    }
}

/// Decode a WebDriver response, mapping `{"value": {"error": ...}}` bodies.
/// Error responses without that shape are classified by status.
async fn read_payload(response: reqwest::Response) -> Result<Value, SourceError> {
    let status = response.status();
    let url = response.url().to_string();
    let body = response.text().await?;

    if status.is_success() {
        return serde_json::from_str(&body)
            .map_err(|e| SourceError::Parse(format!("webdriver {url}: {e}")));
    }

    let payload: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let Some(error) = payload.pointer("/value/error").and_then(Value::as_str) else {
        return Err(SourceError::from_status(status, &url));
    };
    let message = payload
        .pointer("/value/message")
        .and_then(Value::as_str)
        .unwrap_or_default();

    Err(match error {
        "timeout" | "script timeout" => SourceError::Timeout(format!("webdriver: {message}")),
        _ => SourceError::Parse(format!("webdriver {error}: {message}")),
    })
}
