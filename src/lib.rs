//! catalog-crawler - Crawls storefront category taxonomies and republishes
//! them atomically.
//!
//! Roots are crawled one at a time through a single browser session; every
//! result is staged and the published catalog is replaced in one transaction
//! once the crawl is complete.

pub mod browser;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod crawl;
pub mod error;
pub mod format;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod store;
pub mod template;

pub use catalog::{CatalogGraph, CatalogNode, LeafItem};
pub use config::Config;
pub use normalize::normalize;
pub use pipeline::{Pipeline, PipelineState, RunSummary};
pub use store::{CatalogStore, SqliteStore, StagedStore};
