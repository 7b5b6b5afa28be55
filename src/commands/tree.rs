//! Catalog listing command.

use crate::config::Config;
use crate::format::Formatter;
use crate::store::{CatalogStore, SqliteStore, StagedStore};
use anyhow::{Context, Result};
use tracing::debug;

/// Prints the published or staged catalog.
pub struct TreeCommand {
    config: Config,
}

impl TreeCommand {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn execute(&self, staged: bool) -> Result<String> {
        let path = self.config.database_path();
        let store = SqliteStore::open(&path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        self.execute_with(store, staged)
    }

    /// Formats the catalog held by a provided store (for testing).
    pub fn execute_with<S: CatalogStore>(&self, store: S, staged: bool) -> Result<String> {
        let store = StagedStore::new(store);
        let graph = if staged { store.staged() } else { store.published() };
        let graph = graph.context("Failed to read catalog")?;

        if !graph.orphans().is_empty() {
            debug!("{} nodes without a parent left out", graph.orphans().len());
        }

        Ok(Formatter::new(self.config.format).format_tree(&graph))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogNode, LeafItem};
    use crate::config::OutputFormat;

    fn staged_store() -> SqliteStore {
        let mut staged = StagedStore::new(SqliteStore::open_in_memory().unwrap());
        let root = staged.stage(&CatalogNode::root("Limpieza", "https://shop.test/limpieza")).unwrap();
        let item = LeafItem {
            position: 1,
            label: "Lavandina".to_string(),
            value_token: "lavandina".to_string(),
            source_hint: String::new(),
            is_fallback_derived: false,
        };
        staged.stage_children(&root, &[item]).unwrap();
        staged.into_inner()
    }

    #[test]
    fn test_tree_reads_requested_collection() {
        let cmd = TreeCommand::new(Config { format: OutputFormat::Table, ..Config::default() });

        let staged = cmd.execute_with(staged_store(), true).unwrap();
        assert!(staged.contains("Limpieza"));
        assert!(staged.contains("  - Lavandina"));

        let published = cmd.execute_with(staged_store(), false).unwrap();
        assert_eq!(published, "Catalog is empty.");
    }
}
