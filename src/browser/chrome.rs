//! Headless Chrome driver (feature `chrome`) built on chromiumoxide.

use super::{BrowserDriver, ElementTarget, WaitPolicy};
use crate::error::DriverError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::Path;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// One headless browser with a single page.
pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

fn driver_err(e: impl std::fmt::Display) -> DriverError {
    DriverError::Other(e.to_string())
}

impl ChromeDriver {
    /// Launches a headless browser and opens a blank page.
    pub async fn launch() -> Result<Self, DriverError> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1366, 768)
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .build()
            .map_err(DriverError::Other)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(driver_err)?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("chromiumoxide handler event error: {}", e);
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(driver_err)?;
        page.set_user_agent(USER_AGENT).await.map_err(driver_err)?;

        Ok(Self { browser, page, handler })
    }

    async fn find(&self, target: &ElementTarget) -> Result<Option<Element>, DriverError> {
        let scope = match &target.scope {
            Some(scope) => {
                let found = self.page.find_elements(scope.selector.as_str()).await;
                match nth(found, scope.index)? {
                    Some(el) => Some(el),
                    None => return Ok(None),
                }
            }
            None => None,
        };

        let found = match scope {
            Some(el) => el.find_elements(target.selector.as_str()).await,
            None => self.page.find_elements(target.selector.as_str()).await,
        };
        nth(found, target.index)
    }
}

/// Picks the `index`-th element of a lookup. An empty or short match list is
/// `None`; a failed lookup is a driver error.
fn nth<T, E: std::fmt::Display>(
    found: Result<Vec<T>, E>,
    index: usize,
) -> Result<Option<T>, DriverError> {
    let mut matches = found.map_err(driver_err)?;
    if index >= matches.len() {
        return Ok(None);
    }
    Ok(Some(matches.swap_remove(index)))
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn navigate(&mut self, url: &str, wait: WaitPolicy) -> Result<(), DriverError> {
        debug!("Navigating to {}", url);
        self.page.goto(url).await.map_err(|e| DriverError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if wait == WaitPolicy::NetworkIdle {
            self.page.wait_for_navigation().await.map_err(driver_err)?;
        }
        Ok(())
    }

    async fn content(&mut self) -> Result<String, DriverError> {
        self.page.content().await.map_err(driver_err)
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, DriverError> {
        let result = self.page.evaluate(script).await.map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(result.into_value::<serde_json::Value>().unwrap_or(serde_json::Value::Null))
    }

    async fn click(&mut self, target: &ElementTarget) -> Result<bool, DriverError> {
        match self.find(target).await? {
            Some(el) => {
                debug!("Clicking {}", target);
                el.scroll_into_view().await.map_err(driver_err)?;
                el.click().await.map_err(driver_err)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn hover(&mut self, target: &ElementTarget) -> Result<bool, DriverError> {
        match self.find(target).await? {
            Some(el) => {
                el.hover().await.map_err(driver_err)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn screenshot(&mut self, path: &Path) -> Result<(), DriverError> {
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .map_err(driver_err)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.browser.close().await.map_err(driver_err)?;
        self.handler.abort();
        Ok(())
    }
}
