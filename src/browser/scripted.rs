//! Deterministic driver over scripted DOM states.
//!
//! Each URL maps to a [`ScriptedPage`]: a list of HTML states plus click
//! transitions between them. Navigating resets the page to its first state,
//! like a reload would. Failures and hangs can be injected per URL, and every
//! interaction is recorded in a shared [`InteractionLog`].

use super::{BrowserDriver, ElementTarget, WaitPolicy};
use crate::error::DriverError;
use async_trait::async_trait;
use scraper::Html;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Navigate(String),
    Click { target: ElementTarget, hit: bool },
    Hover(ElementTarget),
    Screenshot(PathBuf),
}

/// Shared view of the interactions a [`ScriptedDriver`] performed.
#[derive(Debug, Clone, Default)]
pub struct InteractionLog(Arc<Mutex<Vec<Interaction>>>);

impl InteractionLog {
    fn push(&self, interaction: Interaction) {
        if let Ok(mut entries) = self.0.lock() {
            entries.push(interaction);
        }
    }

    /// Returns a copy of all recorded interactions.
    pub fn entries(&self) -> Vec<Interaction> {
        self.0.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Counts clicks whose target selector equals `selector`.
    pub fn clicks_on(&self, selector: &str) -> usize {
        self.entries()
            .iter()
            .filter(|i| matches!(i, Interaction::Click { target, .. } if target.selector == selector))
            .count()
    }

    /// URLs navigated to, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|i| match i {
                Interaction::Navigate(url) => Some(url),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Transition {
    selector: String,
    from: usize,
    to: usize,
}

/// A page made of DOM states connected by clicks.
#[derive(Debug, Clone)]
pub struct ScriptedPage {
    states: Vec<String>,
    transitions: Vec<Transition>,
    current: usize,
}

impl ScriptedPage {
    /// Creates a page with a single state.
    pub fn new(html: impl Into<String>) -> Self {
        Self { states: vec![html.into()], transitions: Vec::new(), current: 0 }
    }

    /// Adds a state reached by clicking `selector` in the most recently added
    /// state.
    pub fn then_on_click(mut self, selector: impl Into<String>, html: impl Into<String>) -> Self {
        let from = self.states.len() - 1;
        self.states.push(html.into());
        self.transitions.push(Transition { selector: selector.into(), from, to: from + 1 });
        self
    }

    fn html(&self) -> &str {
        self.states.get(self.current).map(String::as_str).unwrap_or_default()
    }

    fn apply_click(&mut self, selector: &str) {
        let (current, states) = (self.current, self.states.len());
        let next = self
            .transitions
            .iter()
            .find(|t| t.from == current && t.selector == selector && t.to < states)
            .map(|t| t.to);

        if let Some(to) = next {
            self.current = to;
        }
    }
}

/// Driver that serves [`ScriptedPage`]s.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    pages: HashMap<String, ScriptedPage>,
    current: Option<String>,
    failures: HashMap<String, u32>,
    hanging: HashSet<String>,
    broken_clicks: HashSet<String>,
    static_only: bool,
    log: InteractionLog,
}

impl ScriptedDriver {
    /// Creates a driver with no pages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a page at `url`.
    pub fn with_page(mut self, url: impl Into<String>, page: ScriptedPage) -> Self {
        self.pages.insert(url.into(), page);
        self
    }

    /// Makes the next `times` navigations to `url` fail with a timeout.
    pub fn failing_navigation(mut self, url: impl Into<String>, times: u32) -> Self {
        self.failures.insert(url.into(), times);
        self
    }

    /// Makes every navigation to `url` hang forever.
    pub fn hanging_navigation(mut self, url: impl Into<String>) -> Self {
        self.hanging.insert(url.into());
        self
    }

    /// Makes every click on `selector` fail with a driver error.
    pub fn failing_clicks(mut self, selector: impl Into<String>) -> Self {
        self.broken_clicks.insert(selector.into());
        self
    }

    /// Reports the driver as non-interactive, like a static HTML fetcher.
    pub fn static_only(mut self) -> Self {
        self.static_only = true;
        self
    }

    /// Handle on the interaction log, usable after the driver is moved.
    pub fn log(&self) -> InteractionLog {
        self.log.clone()
    }

    fn current_page(&self) -> Result<&ScriptedPage, DriverError> {
        self.current.as_ref().and_then(|url| self.pages.get(url)).ok_or(DriverError::NoPage)
    }

    fn current_page_mut(&mut self) -> Result<&mut ScriptedPage, DriverError> {
        match self.current.as_ref() {
            Some(url) => self.pages.get_mut(url).ok_or(DriverError::NoPage),
            None => Err(DriverError::NoPage),
        }
    }
}

fn target_exists(html: &str, target: &ElementTarget) -> bool {
    let document = Html::parse_document(html);
    target.resolve(&document).is_some()
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn navigate(&mut self, url: &str, _wait: WaitPolicy) -> Result<(), DriverError> {
        self.log.push(Interaction::Navigate(url.to_string()));

        if self.hanging.contains(url) {
            std::future::pending::<()>().await;
        }

        if let Some(remaining) = self.failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DriverError::Timeout(Duration::from_secs(30)));
            }
        }

        let page = self.pages.get_mut(url).ok_or_else(|| DriverError::Navigation {
            url: url.to_string(),
            reason: "status 404".to_string(),
        })?;
        page.current = 0;
        self.current = Some(url.to_string());
        Ok(())
    }

    async fn content(&mut self) -> Result<String, DriverError> {
        Ok(self.current_page()?.html().to_string())
    }

    async fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value, DriverError> {
        self.current_page()?;
        Ok(serde_json::Value::Null)
    }

    async fn click(&mut self, target: &ElementTarget) -> Result<bool, DriverError> {
        if self.broken_clicks.contains(&target.selector) {
            self.log.push(Interaction::Click { target: target.clone(), hit: false });
            return Err(DriverError::Other(format!("click on {} detached", target)));
        }

        let hit = target_exists(self.current_page()?.html(), target);
        if hit {
            self.current_page_mut()?.apply_click(&target.selector);
        }
        self.log.push(Interaction::Click { target: target.clone(), hit });
        Ok(hit)
    }

    async fn hover(&mut self, target: &ElementTarget) -> Result<bool, DriverError> {
        let hit = target_exists(self.current_page()?.html(), target);
        self.log.push(Interaction::Hover(target.clone()));
        Ok(hit)
    }

    fn is_interactive(&self) -> bool {
        !self.static_only
    }

    async fn screenshot(&mut self, path: &Path) -> Result<(), DriverError> {
        self.log.push(Interaction::Screenshot(path.to_path_buf()));
        Ok(())
    }
}
