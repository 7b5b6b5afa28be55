//! Configuration management with TOML, environment variables, and CLI overrides.

use crate::template::{SelectorSet, Storefront};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storefront preset
    #[serde(default)]
    pub storefront: Storefront,

    /// Overrides the preset's base URL (e.g. a staging host)
    #[serde(default)]
    pub base_url: Option<String>,

    /// SQLite database path
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Directory for Markdown audit reports
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,

    /// Browser driver used for crawling
    #[serde(default)]
    pub driver: DriverKind,

    /// Proxy URL (e.g., socks5://host:port)
    #[serde(default)]
    pub proxy: Option<String>,

    /// Base delay between requests in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Random jitter added to delay (0 to this value)
    #[serde(default = "default_delay_jitter_ms")]
    pub delay_jitter_ms: u64,

    /// Output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Root categories to crawl. Discovered from the menu when empty.
    #[serde(default)]
    pub roots: Vec<RootSpec>,

    /// Menu labels that are never treated as roots
    #[serde(default = "default_excluded_root_labels")]
    pub excluded_root_labels: Vec<String>,

    /// Crawl tuning
    #[serde(default)]
    pub crawl: CrawlSettings,

    /// Template selectors
    #[serde(default)]
    pub selectors: SelectorSet,
}

/// A root category given explicitly in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootSpec {
    pub label: String,
    pub url: String,
}

/// Timing, budgets and locator hints for one crawl run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    /// Panel titles matched exactly by the first locator strategy
    pub target_titles: Vec<String>,
    /// Titles matched by containment when no exact title is present
    pub alternate_titles: Vec<String>,
    /// Panel index used when no title matches; `None` disables the fallback
    pub positional_fallback: Option<usize>,
    /// Maximum reveal-more clicks per region
    pub max_attempts: u32,
    /// Minimum growth for a click to count as a real load
    pub growth_threshold: usize,
    /// Wait after each reveal-more click
    pub settle_delay_ms: u64,
    /// Wait after clicking a panel toggle
    pub expand_settle_ms: u64,
    /// Budget for one navigation
    pub navigation_timeout_secs: u64,
    /// Retries after a timed-out navigation
    pub navigation_retries: u32,
    /// Wait after navigation for client rendering
    pub navigation_settle_ms: u64,
    pub wait_policy: crate::browser::WaitPolicy,
    /// Pause between roots
    pub root_pause_ms: u64,
    /// Budget for one root, navigation included
    pub root_timeout_secs: u64,
    /// Budget for the crawl phase as a whole
    pub run_timeout_secs: u64,
    /// Age after which a held run lock may be taken over
    pub lock_stale_after_secs: u64,
    /// Save a page capture when a root fails
    pub screenshot_on_failure: bool,
    /// Write a snapshot of the published catalog before swapping
    pub snapshot_before_swap: bool,
    /// Where failure captures go; defaults to `reports_dir/diagnostics`
    pub diagnostics_dir: Option<PathBuf>,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            target_titles: vec!["Sub-Categoría".to_string()],
            alternate_titles: vec![
                "Categorías".to_string(),
                "Categoría".to_string(),
                "Categoria".to_string(),
                "Categorias".to_string(),
            ],
            positional_fallback: Some(1),
            max_attempts: 3,
            growth_threshold: 3,
            settle_delay_ms: 2000,
            expand_settle_ms: 1000,
            navigation_timeout_secs: 60,
            navigation_retries: 2,
            navigation_settle_ms: 5000,
            wait_policy: crate::browser::WaitPolicy::default(),
            root_pause_ms: 5000,
            root_timeout_secs: 180,
            run_timeout_secs: 3600,
            lock_stale_after_secs: 7200,
            screenshot_on_failure: false,
            snapshot_before_swap: true,
            diagnostics_dir: None,
        }
    }
}

impl CrawlSettings {
    /// Settings with every wait set to zero, for fixtures.
    pub fn immediate() -> Self {
        Self {
            settle_delay_ms: 0,
            expand_settle_ms: 0,
            navigation_settle_ms: 0,
            root_pause_ms: 0,
            ..Self::default()
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn expand_settle(&self) -> Duration {
        Duration::from_millis(self.expand_settle_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn navigation_settle(&self) -> Duration {
        Duration::from_millis(self.navigation_settle_ms)
    }

    pub fn root_pause(&self) -> Duration {
        Duration::from_millis(self.root_pause_ms)
    }

    pub fn root_timeout(&self) -> Duration {
        Duration::from_secs(self.root_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_after_secs)
    }
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_delay_ms() -> u64 {
    2000
}

fn default_delay_jitter_ms() -> u64 {
    3000
}

fn default_excluded_root_labels() -> Vec<String> {
    vec!["Categorías".to_string(), "Ofertas".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storefront: Storefront::Jumbo,
            base_url: None,
            database: None,
            reports_dir: default_reports_dir(),
            driver: DriverKind::default(),
            proxy: None,
            delay_ms: default_delay_ms(),
            delay_jitter_ms: default_delay_jitter_ms(),
            format: OutputFormat::Table,
            roots: Vec::new(),
            excluded_root_labels: default_excluded_root_labels(),
            crawl: CrawlSettings::default(),
            selectors: SelectorSet::default(),
        }
    }
}

impl Config {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Loads configuration with fallback to default locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        // 1. Explicit path takes precedence
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        // 2. Try current directory
        let local_config = Path::new("catalog-crawler.toml");
        if local_config.exists() {
            debug!("Found catalog-crawler.toml in current directory");
            return Self::from_file(local_config);
        }

        // 3. Try XDG config directory
        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("catalog-crawler").join("config.toml");
            if xdg_config.exists() {
                debug!("Found config in XDG config directory");
                return Self::from_file(xdg_config);
            }
        }

        // 4. Return default config
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Applies environment variable overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(storefront) = std::env::var("CATALOG_STOREFRONT") {
            if let Ok(s) = storefront.parse() {
                self.storefront = s;
            }
        }

        if let Ok(proxy) = std::env::var("CATALOG_PROXY") {
            self.proxy = Some(proxy);
        }

        if let Ok(database) = std::env::var("CATALOG_DATABASE") {
            if !database.is_empty() {
                self.database = Some(PathBuf::from(database));
            }
        }

        if let Ok(delay) = std::env::var("CATALOG_DELAY") {
            if let Ok(d) = delay.parse() {
                self.delay_ms = d;
            }
        }

        self
    }

    /// Base URL of the storefront, honoring the override.
    pub fn base_url(&self) -> String {
        self.base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| self.storefront.base_url())
    }

    /// Database path, defaulting to the user data directory.
    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.database {
            return path.clone();
        }
        dirs::data_dir()
            .map(|d| d.join("catalog-crawler"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("catalog.db")
    }

    /// Directory for failure captures.
    pub fn diagnostics_dir(&self) -> PathBuf {
        self.crawl
            .diagnostics_dir
            .clone()
            .unwrap_or_else(|| self.reports_dir.join("diagnostics"))
    }
}

/// Which browser driver performs the crawl.
///
/// Defaults to Chrome when built with the `chrome` feature, otherwise to the
/// static HTTP driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Server-rendered HTML only
    Http,
    /// Headless Chrome (requires the `chrome` feature)
    Chrome,
}

impl Default for DriverKind {
    fn default() -> Self {
        if cfg!(feature = "chrome") {
            DriverKind::Chrome
        } else {
            DriverKind::Http
        }
    }
}

impl std::str::FromStr for DriverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(DriverKind::Http),
            "chrome" | "chromium" => Ok(DriverKind::Chrome),
            _ => Err(format!("Unknown driver: {}. Use: http, chrome", s)),
        }
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverKind::Http => write!(f, "http"),
            DriverKind::Chrome => write!(f, "chrome"),
        }
    }
}

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Markdown,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use: table, json, markdown, csv", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}
