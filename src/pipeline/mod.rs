//! Staged persistence pipeline.
//!
//! One run walks `Init → Crawling → Reporting → Swapping → Cleanup → Done`.
//! Everything a crawl produces lands in the raw collection first; the published
//! catalog changes only in `Swapping`, through [`StagedStore::commit`], and
//! only after every root has been visited. A run that fails while crawling
//! ends in `Failed` and a run whose swap fails ends in `SwapFailed`; neither
//! touches the published catalog.

use crate::browser::BrowserDriver;
use crate::catalog::{CatalogGraph, CatalogNode};
use crate::config::{Config, RootSpec};
use crate::crawl::roots::discover_roots;
use crate::crawl::RootCrawler;
use crate::error::{CrawlError, PipelineError};
use crate::normalize::normalize;
use crate::report::{
    append_outcome, diff_graphs, write_report, write_snapshot, CatalogCounts, CrawlReport,
    RootOutcome, RootStatus,
};
use crate::store::{CatalogStore, StagedStore};
use crate::template::Template;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Phase of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineState {
    Init,
    Crawling,
    Reporting,
    Swapping,
    Cleanup,
    Done,
    Failed,
    SwapFailed,
}

impl PipelineState {
    /// True for the states a run ends in.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed | PipelineState::SwapFailed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Init => "init",
            PipelineState::Crawling => "crawling",
            PipelineState::Reporting => "reporting",
            PipelineState::Swapping => "swapping",
            PipelineState::Cleanup => "cleanup",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
            PipelineState::SwapFailed => "swap-failed",
        };
        write!(f, "{}", name)
    }
}

/// Result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub state: PipelineState,
    pub report: CrawlReport,
    pub report_path: Option<PathBuf>,
    pub snapshot_path: Option<PathBuf>,
}

impl RunSummary {
    /// True when the published catalog was replaced.
    pub fn swapped(&self) -> bool {
        self.state == PipelineState::Done
    }
}

/// Graphs loaded at the end of the crawl phase.
struct Crawled {
    staged: CatalogGraph,
    published: CatalogGraph,
}

/// Drives one crawl run over a staged store.
pub struct Pipeline<'a, S> {
    config: &'a Config,
    template: &'a Template,
    store: StagedStore<S>,
    run_id: String,
    state: PipelineState,
}

impl<'a, S: CatalogStore> Pipeline<'a, S> {
    pub fn new(config: &'a Config, template: &'a Template, store: S) -> Self {
        Self {
            config,
            template,
            store: StagedStore::new(store),
            run_id: Uuid::new_v4().to_string(),
            state: PipelineState::Init,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn store(&self) -> &StagedStore<S> {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store.into_inner()
    }

    fn enter(&mut self, next: PipelineState) {
        debug!("Pipeline {} -> {}", self.state, next);
        self.state = next;
    }

    /// Runs the pipeline to a terminal state.
    ///
    /// Returns an error only when the run lock cannot be taken; every other
    /// failure is reported through the summary's state.
    pub async fn run(&mut self, driver: &mut dyn BrowserDriver) -> Result<RunSummary, PipelineError> {
        let stale_after = self.config.crawl.lock_stale_after();
        self.store.inner_mut().try_lock(&self.run_id, stale_after)?;
        info!("Run {} started for {}", self.run_id, self.config.storefront.display_name());

        let summary = self.run_locked(driver).await;

        match self.store.inner_mut().unlock(Some(&self.run_id)) {
            Ok(true) => debug!("Released run lock"),
            Ok(false) => warn!("Run lock was no longer held by {}", self.run_id),
            Err(e) => warn!("Failed to release run lock: {}", e),
        }

        info!("Run {} finished: {}", self.run_id, summary.state);
        Ok(summary)
    }

    async fn run_locked(&mut self, driver: &mut dyn BrowserDriver) -> RunSummary {
        let mut report =
            CrawlReport::new(self.run_id.clone(), self.config.storefront.display_name());

        self.enter(PipelineState::Init);
        match self.store.rollback() {
            Ok(0) => {}
            Ok(n) => info!("Discarded {} staged nodes left by an earlier run", n),
            Err(e) => return self.fail(report, PipelineError::Store(e)),
        }

        self.enter(PipelineState::Crawling);
        let budget = self.config.crawl.run_timeout();
        let result = tokio::time::timeout(budget, self.crawl(driver, &mut report)).await;
        let crawled = match result {
            Ok(Ok(crawled)) => crawled,
            Ok(Err(e)) => return self.fail(report, e),
            Err(_) => return self.fail(report, PipelineError::RunTimeout(budget)),
        };

        let not_found = report.roots.iter().filter(|r| r.status == RootStatus::NotFound).count();
        if !driver.is_interactive() && not_found == report.roots.len() {
            return self.fail(report, PipelineError::NothingExtracted(not_found));
        }

        self.enter(PipelineState::Reporting);
        report.staged = CatalogCounts::of(&crawled.staged);
        report.published = CatalogCounts::of(&crawled.published);
        report.fallback_children = crawled
            .staged
            .roots()
            .iter()
            .flat_map(|r| crawled.staged.children_of(&r.id))
            .filter(|c| c.is_fallback_derived)
            .count();
        report.diff = diff_graphs(&crawled.staged, &crawled.published);
        info!(
            "Staged {} roots and {} children; {} changes against the published catalog",
            report.staged.roots,
            report.staged.children,
            report.diff.total_changes()
        );

        let reports_dir = &self.config.reports_dir;
        let report_path = match write_report(reports_dir, &report) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to write report to {}: {}", reports_dir.display(), e);
                None
            }
        };
        let snapshot_path = if self.config.crawl.snapshot_before_swap {
            match write_snapshot(reports_dir, &crawled.published, &self.run_id) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Failed to write snapshot: {}", e);
                    None
                }
            }
        } else {
            None
        };

        self.enter(PipelineState::Swapping);
        match self.store.commit() {
            Ok(n) => {
                info!("Published {} nodes", n);
                self.enter(PipelineState::Cleanup);
                if let Err(e) = self.store.rollback() {
                    warn!("Failed to clear staged data: {}", e);
                }
                self.enter(PipelineState::Done);
            }
            Err(e) => {
                error!("Swap failed, published catalog left unchanged: {}", e);
                report.swap_error = Some(e.to_string());
                self.enter(PipelineState::SwapFailed);
            }
        }

        report.final_state = Some(self.state);
        if let Some(path) = &report_path {
            if let Err(e) = append_outcome(path, self.state, report.swap_error.as_deref()) {
                warn!("Failed to append outcome to {}: {}", path.display(), e);
            }
        }

        RunSummary { state: self.state, report, report_path, snapshot_path }
    }

    fn fail(&mut self, mut report: CrawlReport, reason: PipelineError) -> RunSummary {
        error!("Run failed: {}", reason);
        self.enter(PipelineState::Failed);
        report.failure = Some(reason.to_string());
        report.final_state = Some(self.state);
        RunSummary { state: self.state, report, report_path: None, snapshot_path: None }
    }

    async fn crawl(
        &mut self,
        driver: &mut dyn BrowserDriver,
        report: &mut CrawlReport,
    ) -> Result<Crawled, PipelineError> {
        let roots = self.resolve_roots(driver).await?;
        if roots.is_empty() {
            return Err(PipelineError::NoRoots);
        }

        let mut staged_roots = Vec::with_capacity(roots.len());
        for spec in &roots {
            staged_roots.push(self.store.stage(&CatalogNode::root(&spec.label, &spec.url))?);
        }
        info!("Staged {} root categories", staged_roots.len());

        let pause = self.config.crawl.root_pause();
        let total = staged_roots.len();
        for (i, root) in staged_roots.iter().enumerate() {
            if i > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            info!("[{}/{}] Crawling '{}'", i + 1, total, root.label);
            let outcome = self.crawl_root(driver, root).await;
            report.roots.push(outcome);
        }

        let failed = report.failed_count();
        if failed > 0 {
            warn!("{} of {} roots yielded no children", failed, total);
        }

        Ok(Crawled { staged: self.store.staged()?, published: self.store.published()? })
    }

    async fn resolve_roots(
        &self,
        driver: &mut dyn BrowserDriver,
    ) -> Result<Vec<RootSpec>, PipelineError> {
        let config = self.config;

        let candidates = if config.roots.is_empty() {
            discover_roots(
                driver,
                self.template,
                &config.base_url(),
                &config.excluded_root_labels,
                config.crawl.wait_policy,
                config.crawl.navigation_settle(),
            )
            .await
            .map_err(PipelineError::Discovery)?
        } else {
            debug!("Using {} configured roots", config.roots.len());
            config.roots.clone()
        };

        let mut seen = HashSet::new();
        Ok(candidates
            .into_iter()
            .filter(|spec| {
                let key = normalize(&spec.label);
                if key.is_empty() {
                    warn!("Skipping root '{}': empty key", spec.label);
                    return false;
                }
                seen.insert(key)
            })
            .collect())
    }

    async fn crawl_root(&mut self, driver: &mut dyn BrowserDriver, root: &CatalogNode) -> RootOutcome {
        let config = self.config;
        let url = root.source_url.clone().unwrap_or_default();
        let mut outcome = RootOutcome::new(&root.label, &url, RootStatus::Ok);

        let crawler = RootCrawler::new(self.template, &config.crawl);
        let budget = config.crawl.root_timeout();

        match tokio::time::timeout(budget, crawler.crawl(driver, &url)).await {
            Err(_) => {
                warn!("'{}' exceeded its budget of {:?}", root.label, budget);
                outcome.status = RootStatus::TimedOut;
                outcome.error = Some(CrawlError::Timeout(format!("{:?}", budget)).to_string());
            }
            Ok(Err(CrawlError::NotFound { seen })) => {
                warn!("No region found for '{}' (panels seen: {:?})", root.label, seen);
                outcome.status = RootStatus::NotFound;
                outcome.seen_titles = seen;
            }
            Ok(Err(e)) => {
                warn!("Failed to crawl '{}': {}", root.label, e);
                outcome.status = RootStatus::Failed;
                outcome.error = Some(e.to_string());
            }
            Ok(Ok(crawl)) => {
                outcome.strategy = Some(crawl.located.strategy);
                outcome.fallback = crawl.located.is_fallback();
                outcome.clicks = crawl.stabilized.clicks;

                match self.store.stage_children(root, &crawl.items) {
                    Ok(staged) => {
                        info!("Staged {} children under '{}'", staged.nodes.len(), root.label);
                        outcome.children = staged.nodes.len();
                        outcome.duplicates = staged.duplicates;
                        outcome.unkeyed = staged.unkeyed;
                    }
                    Err(e) => {
                        let e = CrawlError::Staging(e);
                        warn!("'{}': {}", root.label, e);
                        outcome.status = RootStatus::Failed;
                        outcome.error = Some(e.to_string());
                        if let Err(e) = self.store.unstage_children(&root.id) {
                            warn!("Failed to remove partial children of '{}': {}", root.label, e);
                        }
                    }
                }
            }
        }

        if !outcome.is_ok() && config.crawl.screenshot_on_failure {
            let dir = config.diagnostics_dir();
            let path = dir.join(format!("{}-{}.png", root.normalized_key, &self.run_id[..8]));
            let saved = match tokio::fs::create_dir_all(&dir).await {
                Ok(()) => driver.screenshot(&path).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match saved {
                Ok(()) => debug!("Saved failure capture for '{}'", root.label),
                Err(e) => warn!("Failed to save capture for '{}': {}", root.label, e),
            }
        }

        outcome
    }
}
