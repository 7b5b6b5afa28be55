//! Storefront presets and the compiled listing-page template.

pub mod selectors;
pub mod storefront;

pub use selectors::SelectorSet;
pub use storefront::Storefront;

use crate::error::TemplateError;
use regex_lite::Regex;
use scraper::Selector;

/// A parsed CSS selector that remembers its source text.
///
/// The text is what gets handed to a browser driver; the parsed form is what
/// snapshot reads use.
#[derive(Debug, Clone)]
pub struct Css {
    raw: String,
    selector: Selector,
}

impl Css {
    /// Parses a selector, naming it in the error.
    pub fn parse(name: &'static str, raw: &str) -> Result<Self, TemplateError> {
        let selector = Selector::parse(raw)
            .map_err(|_| TemplateError::Selector { name, selector: raw.to_string() })?;
        Ok(Self { raw: raw.to_string(), selector })
    }

    /// Source text of the selector.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Parsed selector.
    pub fn selector(&self) -> &Selector {
        &self.selector
    }
}

/// Compiled selectors and patterns for one template family.
#[derive(Debug, Clone)]
pub struct Template {
    pub panel: Css,
    pub panel_title: Css,
    pub panel_toggle: Css,
    pub panel_content: Css,
    pub expanded_attr: String,
    pub expanded_value: String,
    pub item: Css,
    pub item_label: Css,
    pub item_input: Css,
    pub reveal_more: Css,
    pub reveal_more_text_scope: Css,
    pub reveal_more_patterns: Vec<Regex>,
    pub menu_triggers: Vec<Css>,
    pub menu_link: Css,
    pub menu_link_hint_attr: String,
}

impl Template {
    /// Compiles a selector set, failing on the first invalid entry.
    pub fn compile(set: &SelectorSet) -> Result<Self, TemplateError> {
        let reveal_more_patterns = set
            .reveal_more_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| TemplateError::Pattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let menu_triggers = set
            .menu_triggers
            .iter()
            .map(|raw| Css::parse("menu_triggers", raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            panel: Css::parse("panel", &set.panel)?,
            panel_title: Css::parse("panel_title", &set.panel_title)?,
            panel_toggle: Css::parse("panel_toggle", &set.panel_toggle)?,
            panel_content: Css::parse("panel_content", &set.panel_content)?,
            expanded_attr: set.expanded_attr.clone(),
            expanded_value: set.expanded_value.clone(),
            item: Css::parse("item", &set.item)?,
            item_label: Css::parse("item_label", &set.item_label)?,
            item_input: Css::parse("item_input", &set.item_input)?,
            reveal_more: Css::parse("reveal_more", &set.reveal_more)?,
            reveal_more_text_scope: Css::parse(
                "reveal_more_text_scope",
                &set.reveal_more_text_scope,
            )?,
            reveal_more_patterns,
            menu_triggers,
            menu_link: Css::parse("menu_link", &set.menu_link)?,
            menu_link_hint_attr: set.menu_link_hint_attr.clone(),
        })
    }

    /// Returns true if the text looks like a reveal-more control.
    pub fn is_reveal_more_text(&self, text: &str) -> bool {
        let text = text.trim();
        self.reveal_more_patterns.iter().any(|p| p.is_match(text))
    }
}

impl Default for Template {
    fn default() -> Self {
        // The built-in selector set is covered by tests; it always compiles.
        match Self::compile(&SelectorSet::default()) {
            Ok(template) => template,
            Err(e) => panic!("built-in selector set is invalid: {e}"),
        }
    }
}
