//! End-to-end runs of the crawl pipeline over scripted pages and a SQLite
//! database on disk.

use catalog_crawler::browser::{BrowserDriver, ScriptedDriver, ScriptedPage, WaitPolicy};
use catalog_crawler::catalog::CatalogGraph;
use catalog_crawler::config::{Config, CrawlSettings, RootSpec};
use catalog_crawler::crawl::pagination::{stabilize, StabilizeOptions};
use catalog_crawler::crawl::retry::StopReason;
use catalog_crawler::crawl::{Region, StrategyKind};
use catalog_crawler::error::{PipelineError, StoreError};
use catalog_crawler::report::RootStatus;
use catalog_crawler::store::{Collection, LockInfo, NodeQuery};
use catalog_crawler::template::Template;
use catalog_crawler::{CatalogNode, CatalogStore, Pipeline, PipelineState, SqliteStore, StagedStore};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const HOME: &str = "https://shop.test";
const ALMACEN: &str = "https://shop.test/almacen";
const BEBIDAS: &str = "https://shop.test/bebidas";
const LIMPIEZA: &str = "https://shop.test/limpieza";
const MORE: &str = ".vtex-search-result-3-x-seeMoreButton";

fn items(labels: &[String]) -> String {
    labels
        .iter()
        .map(|l| {
            format!(
                r#"<div class="vtex-search-result-3-x-filterItem">
                     <input type="checkbox" name="category-3" value="{l}">
                     <label class="vtex-checkbox__label">{l}</label>
                   </div>"#
            )
        })
        .collect()
}

fn panel(title: &str, labels: &[String], more: bool) -> String {
    let button = if more {
        r#"<button class="vtex-search-result-3-x-seeMoreButton">Mostrar más</button>"#.to_string()
    } else {
        String::new()
    };
    format!(
        r#"<div class="vtex-search-result-3-x-filter__container">
             <div class="vtex-search-result-3-x-filterTitle"><span>{title}</span></div>
             <div class="vtex-search-result-3-x-filterTemplateOverflow" aria-hidden="false">{}</div>
             {button}
           </div>"#,
        items(labels)
    )
}

fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn numbered(prefix: &str, n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("{prefix} {i}")).collect()
}

fn listing(panels: &[String]) -> String {
    format!("<html><body>{}</body></html>", panels.concat())
}

struct Fixture {
    _dir: TempDir,
    config: Config,
    template: Template,
}

impl Fixture {
    fn new(roots: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            base_url: Some(HOME.to_string()),
            database: Some(dir.path().join("catalog.db")),
            reports_dir: dir.path().join("reports"),
            roots: roots
                .iter()
                .map(|(label, url)| RootSpec { label: label.to_string(), url: url.to_string() })
                .collect(),
            crawl: CrawlSettings::immediate(),
            ..Config::default()
        };
        Self { _dir: dir, config, template: Template::default() }
    }

    fn db_path(&self) -> &Path {
        self.config.database.as_deref().unwrap()
    }

    fn store(&self) -> SqliteStore {
        SqliteStore::open(self.db_path()).unwrap()
    }

    fn published(&self) -> CatalogGraph {
        StagedStore::new(self.store()).published().unwrap()
    }

    fn pipeline(&self) -> Pipeline<'_, SqliteStore> {
        Pipeline::new(&self.config, &self.template, self.store())
    }
}

fn key_set(graph: &CatalogGraph) -> BTreeSet<(String, String)> {
    let mut keys = BTreeSet::new();
    for root in graph.roots() {
        keys.insert((root.normalized_key.clone(), String::new()));
        for child in graph.children_of(&root.id) {
            keys.insert((root.normalized_key.clone(), child.normalized_key.clone()));
        }
    }
    keys
}

fn child_labels(graph: &CatalogGraph, root_key: &str) -> Vec<String> {
    let root = graph.root_by_key(root_key).unwrap();
    graph.children_of(&root.id).iter().map(|c| c.label.clone()).collect()
}

#[tokio::test]
async fn test_scenario_exact_region_without_pagination() {
    let fx = Fixture::new(&[("Almacén", ALMACEN)]);
    let mut driver = ScriptedDriver::new().with_page(
        ALMACEN,
        ScriptedPage::new(listing(&[
            panel("Marca", &labels(&["x"]), false),
            panel("Sub-Categoría", &labels(&["a", "b", "c"]), false),
        ])),
    );

    let summary = fx.pipeline().run(&mut driver).await.unwrap();
    assert_eq!(summary.state, PipelineState::Done);
    assert_eq!(summary.report.roots[0].strategy, Some(StrategyKind::ExactTitle));

    let graph = fx.published();
    let root = graph.root_by_key("almacen").unwrap();
    assert!(root.has_children);
    assert_eq!(child_labels(&graph, "almacen"), vec!["a", "b", "c"]);
    assert!(graph.children_of(&root.id).iter().all(|c| !c.is_fallback_derived));
}

#[tokio::test]
async fn test_scenario_fallback_region_flags_children() {
    let fx = Fixture::new(&[("Bebidas", BEBIDAS)]);
    let mut driver = ScriptedDriver::new().with_page(
        BEBIDAS,
        ScriptedPage::new(listing(&[
            panel("Marca", &labels(&["x"]), false),
            panel("Categoría", &labels(&["v", "w", "x", "y", "z"]), false),
        ])),
    );

    let summary = fx.pipeline().run(&mut driver).await.unwrap();
    assert!(summary.swapped());
    assert!(summary.report.roots[0].fallback);
    assert_eq!(summary.report.fallback_children, 5);

    let graph = fx.published();
    let root = graph.root_by_key("bebidas").unwrap();
    let children = graph.children_of(&root.id);
    assert_eq!(children.len(), 5);
    assert!(children.iter().all(|c| c.is_fallback_derived));
}

#[tokio::test]
async fn test_scenario_weak_growth_halts_at_budget() {
    let fx = Fixture::new(&[("Almacén", ALMACEN)]);
    let page = ScriptedPage::new(listing(&[panel("Sub-Categoría", &numbered("Item", 20), true)]))
        .then_on_click(MORE, listing(&[panel("Sub-Categoría", &numbered("Item", 22), true)]));
    let mut driver = ScriptedDriver::new().with_page(ALMACEN, page);
    let log = driver.log();

    let summary = fx.pipeline().run(&mut driver).await.unwrap();
    assert!(summary.swapped());
    assert_eq!(summary.report.roots[0].status, RootStatus::Ok);
    assert_eq!(summary.report.roots[0].clicks, 3);
    assert_eq!(summary.report.roots[0].children, 22);
    assert_eq!(log.clicks_on(MORE), 3);
    assert_eq!(fx.published().child_count(), 22);
}

#[tokio::test]
async fn test_exact_title_beats_fallback() {
    let fx = Fixture::new(&[("Almacén", ALMACEN)]);
    let mut driver = ScriptedDriver::new().with_page(
        ALMACEN,
        ScriptedPage::new(listing(&[
            panel("Categoría", &labels(&["wrong"]), false),
            panel("Sub-Categoría", &labels(&["right"]), false),
        ])),
    );

    let summary = fx.pipeline().run(&mut driver).await.unwrap();
    assert_eq!(summary.report.roots[0].strategy, Some(StrategyKind::ExactTitle));
    assert!(!summary.report.roots[0].fallback);
    assert_eq!(child_labels(&fx.published(), "almacen"), vec!["right"]);
}

#[tokio::test]
async fn test_repeated_runs_are_idempotent() {
    let fx = Fixture::new(&[("Almacén", ALMACEN), ("Bebidas", BEBIDAS)]);
    let driver = || {
        ScriptedDriver::new()
            .with_page(
                ALMACEN,
                ScriptedPage::new(listing(&[panel(
                    "Sub-Categoría",
                    &labels(&["Aceites", "ACEITES", "Arroz"]),
                    false,
                )])),
            )
            .with_page(
                BEBIDAS,
                ScriptedPage::new(listing(&[panel("Sub-Categoría", &labels(&["Vinos"]), false)])),
            )
    };

    let summary = fx.pipeline().run(&mut driver()).await.unwrap();
    assert_eq!(summary.report.roots[0].duplicates, 1);
    let first = fx.published();

    let summary = fx.pipeline().run(&mut driver()).await.unwrap();
    assert!(summary.swapped());
    assert!(summary.report.diff.is_empty());
    let second = fx.published();

    assert_eq!(key_set(&first), key_set(&second));
    assert_eq!(first.len(), 5);
    assert_eq!(second.len(), 5);

    let ids = |g: &CatalogGraph| -> BTreeSet<String> {
        g.clone().into_nodes().into_iter().map(|n| n.id).collect()
    };
    assert_eq!(ids(&first), ids(&second));
}

#[tokio::test]
async fn test_discovers_roots_from_menu() {
    let fx = Fixture::new(&[]);
    let home = r##"<html><body>
        <div class="vtex-menu-2-x-menuItem--category-menu">Categorías</div>
        <a class="vtex-menu-2-x-styledLink" href="/almacen">Almacén</a>
        <a class="vtex-menu-2-x-styledLink" href="/ofertas">Ofertas</a>
        <a class="vtex-menu-2-x-styledLink" href="#">Ver todo</a>
        <a class="vtex-menu-2-x-styledLink" href="https://shop.test/limpieza" data-testid="limpieza"> </a>
    </body></html>"##;
    let mut driver = ScriptedDriver::new()
        .with_page(HOME, ScriptedPage::new(home))
        .with_page(ALMACEN, ScriptedPage::new(listing(&[panel("Sub-Categoría", &labels(&["a"]), false)])))
        .with_page(LIMPIEZA, ScriptedPage::new(listing(&[panel("Sub-Categoría", &labels(&["b"]), false)])));
    let log = driver.log();

    let summary = fx.pipeline().run(&mut driver).await.unwrap();
    assert!(summary.swapped());
    let roots: Vec<_> = summary.report.roots.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(roots, vec!["Almacén", "limpieza"]);
    assert_eq!(log.navigations()[0], HOME);
}

#[tokio::test(start_paused = true)]
async fn test_failed_crawl_leaves_production_untouched() {
    let mut fx = Fixture::new(&[("Almacén", ALMACEN)]);
    let mut driver = ScriptedDriver::new().with_page(
        ALMACEN,
        ScriptedPage::new(listing(&[panel("Sub-Categoría", &labels(&["a", "b"]), false)])),
    );
    fx.pipeline().run(&mut driver).await.unwrap();
    let before = fx.published().into_nodes();

    // Second run: the first root succeeds, the second hangs past the run budget.
    fx.config.roots.push(RootSpec { label: "Bebidas".to_string(), url: BEBIDAS.to_string() });
    fx.config.crawl.run_timeout_secs = 20;
    fx.config.crawl.root_timeout_secs = 600;
    let mut driver = ScriptedDriver::new()
        .with_page(
            ALMACEN,
            ScriptedPage::new(listing(&[panel("Sub-Categoría", &labels(&["a", "b", "c"]), false)])),
        )
        .with_page(BEBIDAS, ScriptedPage::new("<p></p>"))
        .hanging_navigation(BEBIDAS);

    let summary = fx.pipeline().run(&mut driver).await.unwrap();
    assert_eq!(summary.state, PipelineState::Failed);
    assert!(summary.report.failure.as_deref().unwrap().contains("run budget"));
    assert!(summary.report_path.is_none());

    assert_eq!(fx.published().into_nodes(), before);
    let store = fx.store();
    assert!(store.count(Collection::Raw).unwrap() > 0);
    assert!(store.lock_holder().unwrap().is_none());
}

/// Store whose production replace always fails.
struct FailingSwap(SqliteStore);

impl CatalogStore for FailingSwap {
    fn upsert(&mut self, c: Collection, node: &CatalogNode) -> Result<CatalogNode, StoreError> {
        self.0.upsert(c, node)
    }

    fn bulk_insert(&mut self, c: Collection, nodes: &[CatalogNode]) -> Result<usize, StoreError> {
        self.0.bulk_insert(c, nodes)
    }

    fn delete_all(&mut self, c: Collection) -> Result<usize, StoreError> {
        self.0.delete_all(c)
    }

    fn find(&self, c: Collection, query: &NodeQuery) -> Result<Vec<CatalogNode>, StoreError> {
        self.0.find(c, query)
    }

    fn set_children(&mut self, c: Collection, parent: &str, refs: &[String]) -> Result<(), StoreError> {
        self.0.set_children(c, parent, refs)
    }

    fn delete_children(&mut self, c: Collection, parent: &str) -> Result<usize, StoreError> {
        self.0.delete_children(c, parent)
    }

    fn replace_all(&mut self, c: Collection, nodes: &[CatalogNode]) -> Result<usize, StoreError> {
        match c {
            Collection::Production => Err(StoreError::Other("disk full".to_string())),
            Collection::Raw => self.0.replace_all(c, nodes),
        }
    }

    fn try_lock(&mut self, owner: &str, stale_after: Duration) -> Result<(), StoreError> {
        self.0.try_lock(owner, stale_after)
    }

    fn unlock(&mut self, owner: Option<&str>) -> Result<bool, StoreError> {
        self.0.unlock(owner)
    }

    fn lock_holder(&self) -> Result<Option<LockInfo>, StoreError> {
        self.0.lock_holder()
    }
}

#[tokio::test]
async fn test_swap_failure_preserves_both_collections() {
    let fx = Fixture::new(&[("Almacén", ALMACEN)]);
    let listing_of = |names: &[&str]| {
        ScriptedDriver::new().with_page(
            ALMACEN,
            ScriptedPage::new(listing(&[panel("Sub-Categoría", &labels(names), false)])),
        )
    };

    fx.pipeline().run(&mut listing_of(&["a", "b"])).await.unwrap();
    let before = fx.published().into_nodes();
    assert_eq!(before.len(), 3);

    let mut pipeline = Pipeline::new(&fx.config, &fx.template, FailingSwap(fx.store()));
    let summary = pipeline.run(&mut listing_of(&["a", "b", "c"])).await.unwrap();

    assert_eq!(summary.state, PipelineState::SwapFailed);
    assert!(!summary.swapped());
    assert!(summary.report.swap_error.as_deref().unwrap().contains("disk full"));
    assert_eq!(summary.report.diff.added_children.len(), 1);

    let report = std::fs::read_to_string(summary.report_path.unwrap()).unwrap();
    assert!(report.contains("**Final state:** swap-failed"));

    // Production is exactly the first run's catalog, ids included.
    assert_eq!(fx.published().into_nodes(), before);

    // Staging still holds the new graph.
    let staged = StagedStore::new(fx.store()).staged().unwrap();
    assert_eq!(child_labels(&staged, "almacen"), vec!["a", "b", "c"]);
    assert_eq!(fx.store().count(Collection::Raw).unwrap(), 4);
    assert!(fx.store().lock_holder().unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_run_is_refused() {
    let fx = Fixture::new(&[("Almacén", ALMACEN)]);
    let mut holder = fx.store();
    holder.try_lock("another-run", Duration::from_secs(3600)).unwrap();

    let mut driver = ScriptedDriver::new();
    let log = driver.log();
    let err = fx.pipeline().run(&mut driver).await.unwrap_err();

    assert!(matches!(err, PipelineError::Store(StoreError::Locked { ref owner, .. }) if owner == "another-run"));
    assert!(log.navigations().is_empty());
    assert_eq!(holder.lock_holder().unwrap().unwrap().owner, "another-run");
}

#[tokio::test]
async fn test_stabilizer_terminates_for_any_growth() {
    let template = Template::default();
    let region = Region { index: 0, title: "Sub-Categoría".to_string() };
    let options = StabilizeOptions { settle_delay: Duration::ZERO, ..StabilizeOptions::default() };

    let patterns: [&[usize]; 4] = [
        &[10, 20, 30, 40, 50, 60],
        &[10, 11, 12, 13, 14],
        &[10, 10, 10],
        &[10, 40, 41, 90],
    ];

    for counts in patterns {
        let mut page =
            ScriptedPage::new(listing(&[panel("Sub-Categoría", &numbered("i", counts[0]), true)]));
        for &n in &counts[1..] {
            page = page.then_on_click(MORE, listing(&[panel("Sub-Categoría", &numbered("i", n), true)]));
        }
        let mut driver = ScriptedDriver::new().with_page(ALMACEN, page);
        let log = driver.log();
        driver.navigate(ALMACEN, WaitPolicy::Load).await.unwrap();

        let out = stabilize(&mut driver, &template, &region, options).await.unwrap();
        assert!(out.clicks <= options.max_attempts, "pattern {:?}", counts);
        assert!(log.clicks_on(MORE) <= options.max_attempts as usize + 1, "pattern {:?}", counts);
        if counts.len() > options.max_attempts as usize + 1 {
            assert_eq!(out.reason, StopReason::BudgetExhausted, "pattern {:?}", counts);
        }
    }
}
