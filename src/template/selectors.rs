//! CSS selectors for the storefront listing template.
//!
//! Defaults describe the VTEX search-result markup shared by the supported
//! storefronts. Every entry can be overridden from the `[selectors]` table of
//! the configuration file when the markup changes.
//!
//! **Update process**: when a root stops yielding children, save the page with
//! `screenshot_on_failure`, adjust the selector here or in config, and add a
//! fixture test.

use serde::{Deserialize, Serialize};

/// Raw selector strings for one template family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSet {
    /// Filter panel container (one per facet on the listing page).
    pub panel: String,
    /// Title text inside a panel.
    pub panel_title: String,
    /// Clickable header that toggles a panel open/closed.
    pub panel_toggle: String,
    /// Collapsible content element carrying the expansion attribute.
    pub panel_content: String,
    /// Attribute on `panel_content` that reports the open state.
    pub expanded_attr: String,
    /// Value of `expanded_attr` meaning the panel is open.
    pub expanded_value: String,
    /// One leaf item inside a panel.
    pub item: String,
    /// Label element inside an item.
    pub item_label: String,
    /// Checkbox input inside an item.
    pub item_input: String,
    /// "Reveal more" button inside a panel.
    pub reveal_more: String,
    /// Elements scanned when matching reveal-more text patterns page-wide.
    pub reveal_more_text_scope: String,
    /// Regexes matched against trimmed button text.
    pub reveal_more_patterns: Vec<String>,
    /// Candidates for the category menu trigger, tried in order.
    pub menu_triggers: Vec<String>,
    /// Root category links exposed by the menu.
    pub menu_link: String,
    /// Attribute used as the menu link's stable hint.
    pub menu_link_hint_attr: String,
}

impl Default for SelectorSet {
    fn default() -> Self {
        Self {
            panel: ".vtex-search-result-3-x-filter__container".to_string(),
            panel_title: ".vtex-search-result-3-x-filterTitle span".to_string(),
            panel_toggle: ".vtex-search-result-3-x-filterTitle".to_string(),
            panel_content: ".vtex-search-result-3-x-filterTemplateOverflow".to_string(),
            expanded_attr: "aria-hidden".to_string(),
            expanded_value: "false".to_string(),
            item: ".vtex-search-result-3-x-filterItem".to_string(),
            item_label: ".vtex-checkbox__label".to_string(),
            item_input: "input[type='checkbox']".to_string(),
            reveal_more: ".vtex-search-result-3-x-seeMoreButton".to_string(),
            reveal_more_text_scope: "button".to_string(),
            reveal_more_patterns: vec![r"^Mostrar \d+ más$".to_string(), r"^Mostrar más$".to_string()],
            menu_triggers: vec![
                ".vtex-menu-2-x-menuItem--category-menu".to_string(),
                ".vtex-menu-2-x-menuItem--header-category".to_string(),
                "[data-testid='category-menu']".to_string(),
                ".category-menu-item".to_string(),
            ],
            menu_link: ".vtex-menu-2-x-styledLink".to_string(),
            menu_link_hint_attr: "data-testid".to_string(),
        }
    }
}
