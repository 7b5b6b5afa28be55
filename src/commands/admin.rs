//! Store maintenance commands: status, unlock and discard.

use crate::config::Config;
use crate::format::{Formatter, StoreStatus};
use crate::store::{CatalogStore, Collection, SqliteStore, StagedStore};
use anyhow::{Context, Result};
use tracing::{info, warn};

/// Inspects and repairs the catalog database.
pub struct AdminCommand {
    config: Config,
}

impl AdminCommand {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn open(&self) -> Result<SqliteStore> {
        let path = self.config.database_path();
        SqliteStore::open(&path)
            .with_context(|| format!("Failed to open database: {}", path.display()))
    }

    /// Shows the lock holder and node counts.
    pub fn status(&self) -> Result<String> {
        self.status_with(&self.open()?)
    }

    pub fn status_with<S: CatalogStore>(&self, store: &S) -> Result<String> {
        let status = StoreStatus {
            database: self.config.database_path(),
            lock: store.lock_holder()?,
            staged: store.count(Collection::Raw)?,
            published: store.count(Collection::Production)?,
        };
        Ok(Formatter::new(self.config.format).format_status(&status))
    }

    /// Force-releases the run lock.
    pub fn unlock(&self) -> Result<String> {
        self.unlock_with(&mut self.open()?)
    }

    pub fn unlock_with<S: CatalogStore>(&self, store: &mut S) -> Result<String> {
        let holder = store.lock_holder()?;
        if store.unlock(None)? {
            let owner = holder.map(|h| h.owner).unwrap_or_default();
            warn!("Force-released run lock held by {}", owner);
            Ok(format!("Released lock held by {}", owner))
        } else {
            Ok("No lock was held.".to_string())
        }
    }

    /// Drops staged data left by a failed run.
    pub fn discard(&self) -> Result<String> {
        self.discard_with(self.open()?)
    }

    pub fn discard_with<S: CatalogStore>(&self, store: S) -> Result<String> {
        if let Some(holder) = store.lock_holder()? {
            anyhow::bail!(
                "A crawl is in progress (run {}); use `unlock` first if it is dead",
                holder.owner
            );
        }

        let mut staged = StagedStore::new(store);
        let removed = staged.rollback().context("Failed to discard staged data")?;
        info!("Discarded {} staged nodes", removed);
        Ok(format!("Discarded {} staged nodes.", removed))
    }
}
