//! Per-root crawl: navigate, locate, expand, stabilize, extract.

use super::dom::PageSnapshot;
use super::expansion::{ensure_expanded, PanelState};
use super::extract::extract;
use super::locator::{Located, LocatorChain, Lookup};
use super::pagination::{stabilize, StabilizeOptions, Stabilized};
use crate::browser::BrowserDriver;
use crate::catalog::LeafItem;
use crate::config::CrawlSettings;
use crate::error::{CrawlError, DriverError};
use crate::template::Template;
use tracing::{debug, info, warn};

/// What one root yielded.
#[derive(Debug, Clone)]
pub struct RootCrawl {
    pub located: Located,
    pub panel_state: PanelState,
    pub stabilized: Stabilized,
    pub items: Vec<LeafItem>,
}

/// Runs the extraction chain for one root at a time.
pub struct RootCrawler<'a> {
    template: &'a Template,
    settings: &'a CrawlSettings,
    chain: LocatorChain,
}

impl<'a> RootCrawler<'a> {
    pub fn new(template: &'a Template, settings: &'a CrawlSettings) -> Self {
        Self { template, settings, chain: LocatorChain::from(settings) }
    }

    /// Loads `url`, retrying navigations that time out.
    ///
    /// Once the retries are spent the root is reported as not found. Other
    /// driver failures are returned as they are.
    pub async fn open(&self, driver: &mut dyn BrowserDriver, url: &str) -> Result<(), CrawlError> {
        let attempts = self.settings.navigation_retries + 1;
        let budget = self.settings.navigation_timeout();

        for attempt in 1..=attempts {
            let result =
                tokio::time::timeout(budget, driver.navigate(url, self.settings.wait_policy)).await;

            match result {
                Ok(Ok(())) => {
                    let settle = self.settings.navigation_settle();
                    if !settle.is_zero() {
                        tokio::time::sleep(settle).await;
                    }
                    return Ok(());
                }
                Ok(Err(DriverError::Timeout(_))) | Err(_) => {
                    warn!("Navigation to {} timed out (attempt {}/{})", url, attempt, attempts);
                }
                Ok(Err(e)) => return Err(e.into()),
            }
        }

        warn!("Giving up on {} after {} attempts", url, attempts);
        Err(CrawlError::NotFound { seen: Vec::new() })
    }

    /// Crawls the root listing at `url`.
    pub async fn crawl(
        &self,
        driver: &mut dyn BrowserDriver,
        url: &str,
    ) -> Result<RootCrawl, CrawlError> {
        self.open(driver, url).await?;

        let html = driver.content().await?;
        let panels = PageSnapshot::parse(&html, self.template).panels();
        debug!("Found {} panels: {:?}", panels.len(), panels);

        let located = match self.chain.locate(&panels, &self.settings.target_titles) {
            Lookup::Found(located) => located,
            Lookup::NotFound { seen } => return Err(CrawlError::NotFound { seen }),
        };
        info!(
            "Located region '{}' (#{}) via {}",
            located.region.title, located.region.index, located.strategy
        );

        let expanded =
            ensure_expanded(driver, self.template, &located.region, self.settings.expand_settle())
                .await;
        let panel_state = match expanded {
            Ok(state) => state,
            Err(e) => {
                warn!("Could not expand '{}': {}", located.region.title, e);
                PanelState::Expanding
            }
        };
        if panel_state != PanelState::Expanded {
            debug!("Reading region '{}' while {:?}", located.region.title, panel_state);
        }

        let stabilized = stabilize(
            driver,
            self.template,
            &located.region,
            StabilizeOptions {
                max_attempts: self.settings.max_attempts,
                settle_delay: self.settings.settle_delay(),
                growth_threshold: self.settings.growth_threshold,
            },
        )
        .await?;

        let html = driver.content().await?;
        let items = extract(&PageSnapshot::parse(&html, self.template), &located);
        info!("Extracted {} items from '{}'", items.len(), located.region.title);

        Ok(RootCrawl { located, panel_state, stabilized, items })
    }
}
