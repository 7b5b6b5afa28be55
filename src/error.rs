//! Error types for drivers, the store, crawling and the pipeline.

use std::time::Duration;
use thiserror::Error;

/// Failures reported by a browser automation driver.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("No page loaded")]
    NoPage,

    #[error("Operation not supported by this driver: {0}")]
    Unsupported(&'static str),

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Driver error: {0}")]
    Other(String),
}

/// Failures reported by the catalog store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid stored value in column {column}: {value}")]
    Corrupt { column: &'static str, value: String },

    #[error("Crawl already in progress (held by {owner} since {since})")]
    Locked { owner: String, since: String },

    #[error("Store error: {0}")]
    Other(String),
}

/// Invalid storefront template configuration.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Invalid selector for {name}: {selector}")]
    Selector { name: &'static str, selector: String },

    #[error("Invalid reveal-more pattern {pattern}: {reason}")]
    Pattern { pattern: String, reason: String },
}

/// Per-root crawl failures. None of these abort a run.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("No matching region (panels seen: {})", .seen.join(", "))]
    NotFound { seen: Vec<String> },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("Staging write failed: {0}")]
    Staging(#[source] StoreError),
}

/// Fatal pipeline failures.
///
/// Only a store failure while taking the run lock is returned to the caller;
/// the others end the run in the `Failed` state and are recorded in its report.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Root discovery failed: {0}")]
    Discovery(#[source] DriverError),

    #[error("No root categories to crawl")]
    NoRoots,

    #[error("No region found on any of {0} roots with a static driver; try --driver chrome")]
    NothingExtracted(usize),

    #[error("Crawl exceeded the run budget of {0:?}")]
    RunTimeout(Duration),
}
