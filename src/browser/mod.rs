//! Browser automation seam.
//!
//! The crawler never holds live element handles. Every DOM read goes through
//! [`BrowserDriver::content`] and is parsed with `scraper`; every interaction
//! addresses an [`ElementTarget`] that the driver re-resolves at call time, so
//! targets stay valid across re-renders.

pub mod http;
pub mod scripted;

#[cfg(feature = "chrome")]
pub mod chrome;

pub use http::HttpDriver;
pub use scripted::{ScriptedDriver, ScriptedPage};

#[cfg(feature = "chrome")]
pub use chrome::ChromeDriver;

use crate::error::DriverError;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// How long `navigate` waits before returning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitPolicy {
    /// Return once the load event fired.
    Load,
    /// Additionally wait for the navigation to go quiet.
    #[default]
    NetworkIdle,
}

/// The `index`-th match of `selector` in the document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub selector: String,
    pub index: usize,
}

/// A re-resolvable reference to one element on the current page.
///
/// Resolution: take the `index`-th match of `selector`, searched inside the
/// scope element when one is set, otherwise in the whole document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementTarget {
    pub scope: Option<Scope>,
    pub selector: String,
    pub index: usize,
}

impl ElementTarget {
    /// Targets the `index`-th match of a selector in the whole document.
    pub fn page(selector: impl Into<String>, index: usize) -> Self {
        Self { scope: None, selector: selector.into(), index }
    }

    /// Targets the first match of `selector` inside the `scope_index`-th match
    /// of `scope_selector`.
    pub fn within(
        scope_selector: impl Into<String>,
        scope_index: usize,
        selector: impl Into<String>,
    ) -> Self {
        Self {
            scope: Some(Scope { selector: scope_selector.into(), index: scope_index }),
            selector: selector.into(),
            index: 0,
        }
    }

    /// Resolves the target against a parsed document.
    ///
    /// Returns `None` when any step of the path is missing or a selector does
    /// not parse.
    pub fn resolve<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        let selector = Selector::parse(&self.selector).ok()?;

        match &self.scope {
            Some(scope) => {
                let scope_selector = Selector::parse(&scope.selector).ok()?;
                let scope_el = document.select(&scope_selector).nth(scope.index)?;
                scope_el.select(&selector).nth(self.index)
            }
            None => document.select(&selector).nth(self.index),
        }
    }
}

impl fmt::Display for ElementTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(
                f,
                "{}[{}] >> {}[{}]",
                scope.selector, scope.index, self.selector, self.index
            ),
            None => write!(f, "{}[{}]", self.selector, self.index),
        }
    }
}

/// Operations the crawler needs from a browser automation driver.
///
/// One driver instance is one browser session with one page; the crawler
/// calls it strictly sequentially.
#[async_trait]
pub trait BrowserDriver: Send {
    /// Loads `url` into the page.
    async fn navigate(&mut self, url: &str, wait: WaitPolicy) -> Result<(), DriverError>;

    /// Returns the current DOM serialized as HTML.
    async fn content(&mut self) -> Result<String, DriverError>;

    /// Evaluates a script in the page and returns its JSON result.
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, DriverError>;

    /// Clicks the target. Returns `false` when the target could not be found
    /// or the driver cannot dispatch clicks.
    async fn click(&mut self, target: &ElementTarget) -> Result<bool, DriverError>;

    /// Hovers the target, by default through a synthetic `mouseover` event.
    async fn hover(&mut self, target: &ElementTarget) -> Result<bool, DriverError> {
        let script = hover_script(target);
        let value = self.evaluate(&script).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// False for drivers that only see server-rendered HTML and cannot
    /// dispatch clicks or run scripts.
    fn is_interactive(&self) -> bool {
        true
    }

    /// Saves a diagnostic capture of the page. Never read back.
    async fn screenshot(&mut self, path: &Path) -> Result<(), DriverError>;

    /// Releases the session.
    async fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Builds a script that resolves `target` in the page and returns the element
/// expression, or `null`.
pub(crate) fn resolve_script(target: &ElementTarget) -> String {
    let selector = serde_json::to_string(&target.selector).unwrap_or_default();
    match &target.scope {
        Some(scope) => {
            let scope_selector = serde_json::to_string(&scope.selector).unwrap_or_default();
            format!(
                "(() => {{ const s = document.querySelectorAll({scope_selector})[{}]; \
                 return s ? s.querySelectorAll({selector})[{}] || null : null; }})()",
                scope.index, target.index
            )
        }
        None => format!("(document.querySelectorAll({selector})[{}] || null)", target.index),
    }
}

fn hover_script(target: &ElementTarget) -> String {
    format!(
        "(() => {{ const el = {}; if (!el) return false; \
         el.dispatchEvent(new MouseEvent('mouseover', {{ bubbles: true }})); \
         el.dispatchEvent(new MouseEvent('mouseenter', {{ bubbles: false }})); \
         return true; }})()",
        resolve_script(target)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <div class="panel"><button class="more">A</button><button class="more">B</button></div>
        <div class="panel"><button class="more">C</button></div>
    "#;

    #[test]
    fn test_resolve_page_target() {
        let doc = Html::parse_document(PAGE);
        let el = ElementTarget::page("button.more", 2).resolve(&doc).unwrap();
        assert_eq!(el.text().collect::<String>(), "C");
        assert!(ElementTarget::page("button.more", 3).resolve(&doc).is_none());
    }

    #[test]
    fn test_resolve_scoped_target() {
        let doc = Html::parse_document(PAGE);
        let el = ElementTarget::within(".panel", 1, "button.more").resolve(&doc).unwrap();
        assert_eq!(el.text().collect::<String>(), "C");

        let mut target = ElementTarget::within(".panel", 0, "button.more");
        target.index = 1;
        assert_eq!(target.resolve(&doc).unwrap().text().collect::<String>(), "B");

        assert!(ElementTarget::within(".panel", 5, "button").resolve(&doc).is_none());
    }

    #[test]
    fn test_resolve_invalid_selector() {
        let doc = Html::parse_document(PAGE);
        assert!(ElementTarget::page("div[", 0).resolve(&doc).is_none());
    }

    #[test]
    fn test_target_display() {
        let target = ElementTarget::within(".panel", 1, ".more");
        assert_eq!(target.to_string(), ".panel[1] >> .more[0]");
    }

    #[test]
    fn test_resolve_script_escapes_selectors() {
        let script = resolve_script(&ElementTarget::page("input[type='checkbox']", 0));
        assert!(script.contains("\"input[type='checkbox']\""));
        assert!(script.contains("[0]"));
    }
}
