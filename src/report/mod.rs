//! Run reports: the catalog diff, per-root outcomes and the audit artifact.

pub mod diff;
pub mod markdown;

pub use diff::{diff_graphs, CatalogDiff};
pub use markdown::{append_outcome, write_report, write_snapshot};

use crate::catalog::CatalogGraph;
use crate::crawl::StrategyKind;
use crate::pipeline::PipelineState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// How one root ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RootStatus {
    Ok,
    NotFound,
    TimedOut,
    Failed,
}

impl fmt::Display for RootStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootStatus::Ok => write!(f, "ok"),
            RootStatus::NotFound => write!(f, "not found"),
            RootStatus::TimedOut => write!(f, "timed out"),
            RootStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What the crawl did with one root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootOutcome {
    pub label: String,
    pub url: String,
    pub status: RootStatus,
    pub strategy: Option<StrategyKind>,
    pub children: usize,
    pub fallback: bool,
    pub clicks: u32,
    /// Items merged into an earlier sibling with the same key
    pub duplicates: usize,
    /// Items skipped because their label has no usable key
    pub unkeyed: usize,
    /// Panel titles on the page when no region matched
    pub seen_titles: Vec<String>,
    pub error: Option<String>,
}

impl RootOutcome {
    pub fn new(label: impl Into<String>, url: impl Into<String>, status: RootStatus) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            status,
            strategy: None,
            children: 0,
            fallback: false,
            clicks: 0,
            duplicates: 0,
            unkeyed: 0,
            seen_titles: Vec::new(),
            error: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == RootStatus::Ok
    }
}

/// Node counts of one catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogCounts {
    pub roots: usize,
    pub children: usize,
}

impl CatalogCounts {
    pub fn of(graph: &CatalogGraph) -> Self {
        Self { roots: graph.roots().len(), children: graph.child_count() }
    }

    pub fn total(&self) -> usize {
        self.roots + self.children
    }
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub run_id: String,
    pub storefront: String,
    pub generated_at: DateTime<Utc>,
    pub roots: Vec<RootOutcome>,
    pub staged: CatalogCounts,
    pub published: CatalogCounts,
    pub diff: CatalogDiff,
    pub fallback_children: usize,
    pub final_state: Option<PipelineState>,
    /// Why the run ended in `Failed`
    pub failure: Option<String>,
    pub swap_error: Option<String>,
}

impl CrawlReport {
    pub fn new(run_id: impl Into<String>, storefront: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            storefront: storefront.into(),
            generated_at: Utc::now(),
            roots: Vec::new(),
            staged: CatalogCounts::default(),
            published: CatalogCounts::default(),
            diff: CatalogDiff::default(),
            fallback_children: 0,
            final_state: None,
            failure: None,
            swap_error: None,
        }
    }

    pub fn total_roots(&self) -> usize {
        self.roots.len()
    }

    /// Roots that yielded nothing usable.
    pub fn failed_roots(&self) -> impl Iterator<Item = &RootOutcome> {
        self.roots.iter().filter(|r| !r.is_ok())
    }

    pub fn failed_count(&self) -> usize {
        self.failed_roots().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_roots() {
        let mut report = CrawlReport::new("run", "jumbo");
        report.roots.push(RootOutcome::new("A", "u", RootStatus::Ok));
        report.roots.push(RootOutcome::new("B", "u", RootStatus::NotFound));
        report.roots.push(RootOutcome::new("C", "u", RootStatus::TimedOut));

        assert_eq!(report.total_roots(), 3);
        assert_eq!(report.failed_count(), 2);
        assert_eq!(report.failed_roots().next().unwrap().label, "B");
    }

    #[test]
    fn test_status_display_and_serde() {
        assert_eq!(RootStatus::NotFound.to_string(), "not found");
        assert_eq!(serde_json::to_string(&RootStatus::TimedOut).unwrap(), "\"timed-out\"");
    }
}
