//! Static-snapshot driver over HTTP using wreq for TLS fingerprint emulation.
//!
//! Suitable for storefronts that server-render their listing pages. It has no
//! script runtime, so clicks and scripts are reported as not dispatched and
//! the crawl degrades to whatever the server rendered.

use super::{BrowserDriver, ElementTarget, WaitPolicy};
use crate::config::Config;
use crate::error::DriverError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::RngExt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use wreq::Client;
use wreq_util::Emulation;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP driver with browser impersonation and politeness delays.
pub struct HttpDriver {
    client: Client,
    accept_language: &'static str,
    delay_ms: u64,
    delay_jitter_ms: u64,
    page: Option<LoadedPage>,
}

struct LoadedPage {
    url: String,
    html: String,
}

impl HttpDriver {
    /// Creates a new driver with the given configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(10));

        if let Some(proxy_url) = &config.proxy {
            debug!("Configuring proxy: {}", proxy_url);
            let proxy = wreq::Proxy::all(proxy_url).context("Failed to configure proxy")?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            accept_language: config.storefront.accept_language(),
            delay_ms: config.delay_ms,
            delay_jitter_ms: config.delay_jitter_ms,
            page: None,
        })
    }

    /// Adds a random delay to mimic human behavior.
    async fn delay(&self) {
        if self.delay_ms == 0 {
            return;
        }

        let jitter = if self.delay_jitter_ms > 0 {
            rand::rng().random_range(0..=self.delay_jitter_ms)
        } else {
            0
        };

        let total_delay = self.delay_ms + jitter;
        debug!("Delaying {}ms", total_delay);
        tokio::time::sleep(Duration::from_millis(total_delay)).await;
    }

    async fn fetch(&self, url: &str) -> Result<String, DriverError> {
        let failed = |reason: String| DriverError::Navigation { url: url.to_string(), reason };

        let response = self
            .client
            .get(url)
            .emulation(Emulation::Chrome131)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8")
            .header("Accept-Language", self.accept_language)
            .header("Accept-Encoding", "gzip, deflate, br")
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .header("Sec-Ch-Ua", "\"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\"")
            .header("Sec-Ch-Ua-Mobile", "?0")
            .header("Sec-Ch-Ua-Platform", "\"macOS\"")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "none")
            .header("Sec-Fetch-User", "?1")
            .header("Upgrade-Insecure-Requests", "1")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DriverError::Timeout(REQUEST_TIMEOUT)
                } else {
                    failed(e.to_string())
                }
            })?;

        let status = response.status();
        debug!("Response status: {}", status);

        if status == 503 || status == 429 {
            warn!("Rate limited ({}). Consider using a proxy or increasing delay.", status);
            return Err(failed(format!("rate limited ({})", status)));
        }

        if !status.is_success() {
            return Err(failed(format!("status {}", status)));
        }

        response.text().await.map_err(|e| failed(format!("failed to read body: {}", e)))
    }
}

#[async_trait]
impl BrowserDriver for HttpDriver {
    async fn navigate(&mut self, url: &str, _wait: WaitPolicy) -> Result<(), DriverError> {
        self.delay().await;

        debug!("GET {}", url);
        let html = self.fetch(url).await?;
        self.page = Some(LoadedPage { url: url.to_string(), html });
        Ok(())
    }

    async fn content(&mut self) -> Result<String, DriverError> {
        self.page.as_ref().map(|p| p.html.clone()).ok_or(DriverError::NoPage)
    }

    async fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value, DriverError> {
        Err(DriverError::Unsupported("script evaluation"))
    }

    async fn click(&mut self, target: &ElementTarget) -> Result<bool, DriverError> {
        debug!("Static driver cannot click {}", target);
        Ok(false)
    }

    async fn hover(&mut self, target: &ElementTarget) -> Result<bool, DriverError> {
        debug!("Static driver cannot hover {}", target);
        Ok(false)
    }

    fn is_interactive(&self) -> bool {
        false
    }

    async fn screenshot(&mut self, path: &Path) -> Result<(), DriverError> {
        let page = self.page.as_ref().ok_or(DriverError::NoPage)?;
        let path = path.with_extension("html");
        tokio::fs::write(&path, &page.html).await?;
        debug!("Saved snapshot of {} to {}", page.url, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_test_config() -> Config {
        Config { delay_ms: 0, delay_jitter_ms: 0, ..Config::default() }
    }

    #[tokio::test]
    async fn test_navigate_and_content() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/almacen"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><body>Almacén</body></html>"),
            )
            .mount(&mock_server)
            .await;

        let mut driver = HttpDriver::new(&make_test_config()).unwrap();
        let url = format!("{}/almacen", mock_server.uri());
        driver.navigate(&url, WaitPolicy::Load).await.unwrap();

        assert!(driver.content().await.unwrap().contains("Almacén"));
    }

    #[tokio::test]
    async fn test_content_without_page() {
        let mut driver = HttpDriver::new(&make_test_config()).unwrap();
        assert!(matches!(driver.content().await, Err(DriverError::NoPage)));
    }

    #[tokio::test]
    async fn test_rate_limited_503() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let mut driver = HttpDriver::new(&make_test_config()).unwrap();
        let err = driver.navigate(&mock_server.uri(), WaitPolicy::Load).await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_http_error_404() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let mut driver = HttpDriver::new(&make_test_config()).unwrap();
        let err = driver.navigate(&mock_server.uri(), WaitPolicy::Load).await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_interactions_are_not_dispatched() {
        let mut driver = HttpDriver::new(&make_test_config()).unwrap();
        let target = ElementTarget::page("button", 0);

        assert!(!driver.click(&target).await.unwrap());
        assert!(!driver.hover(&target).await.unwrap());
        assert!(matches!(driver.evaluate("1 + 1").await, Err(DriverError::Unsupported(_))));
        assert!(!driver.is_interactive());
    }

    #[tokio::test]
    async fn test_screenshot_writes_snapshot() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>snapshot</p>"))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut driver = HttpDriver::new(&make_test_config()).unwrap();
        driver.navigate(&mock_server.uri(), WaitPolicy::Load).await.unwrap();
        driver.screenshot(&dir.path().join("root.png")).await.unwrap();

        let saved = std::fs::read_to_string(dir.path().join("root.html")).unwrap();
        assert!(saved.contains("snapshot"));
    }
}
