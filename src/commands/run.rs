//! Crawl command implementation.

use crate::browser::{BrowserDriver, HttpDriver};
use crate::config::{Config, DriverKind};
use crate::pipeline::{Pipeline, RunSummary};
use crate::store::{CatalogStore, SqliteStore};
use crate::template::Template;
use anyhow::{Context, Result};
use tracing::{info, warn};

/// Runs one crawl pipeline pass.
pub struct RunCommand {
    config: Config,
}

impl RunCommand {
    /// Creates a new run command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Opens the database, starts the configured driver and runs the pipeline.
    pub async fn execute(&self) -> Result<RunSummary> {
        let template =
            Template::compile(&self.config.selectors).context("Invalid selector configuration")?;

        let path = self.config.database_path();
        let store = SqliteStore::open(&path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        let mut driver = self.driver().await?;
        info!("Crawling {} with the {} driver", self.config.base_url(), self.config.driver);

        let summary = self.execute_with(driver.as_mut(), store, &template).await;

        if let Err(e) = driver.close().await {
            warn!("Failed to close driver: {}", e);
        }

        summary
    }

    /// Runs the pipeline with a provided driver and store (for testing).
    pub async fn execute_with<S: CatalogStore>(
        &self,
        driver: &mut dyn BrowserDriver,
        store: S,
        template: &Template,
    ) -> Result<RunSummary> {
        let mut pipeline = Pipeline::new(&self.config, template, store);
        pipeline.run(driver).await.context("Crawl not started")
    }

    async fn driver(&self) -> Result<Box<dyn BrowserDriver>> {
        match self.config.driver {
            DriverKind::Http => {
                let driver = HttpDriver::new(&self.config).context("Failed to create HTTP driver")?;
                Ok(Box::new(driver))
            }
            #[cfg(feature = "chrome")]
            DriverKind::Chrome => {
                let driver = crate::browser::ChromeDriver::launch()
                    .await
                    .context("Failed to launch Chrome")?;
                Ok(Box::new(driver))
            }
            #[cfg(not(feature = "chrome"))]
            DriverKind::Chrome => {
                anyhow::bail!("The chrome driver requires building with `--features chrome`")
            }
        }
    }
}
