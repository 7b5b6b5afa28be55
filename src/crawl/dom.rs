//! Reads over a rendered DOM snapshot.
//!
//! Everything here is synchronous and works on a parsed [`Html`] document, so
//! a snapshot never lives across an `.await`. Callers fetch the HTML from the
//! driver, build a [`PageSnapshot`], read what they need into owned values and
//! drop it.

use crate::browser::ElementTarget;
use crate::template::Template;
use scraper::{ElementRef, Html};

/// One filter panel as seen on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelInfo {
    /// Index among all panels, in document order
    pub index: usize,
    /// Trimmed title text; empty when the panel has no title element
    pub title: String,
}

/// A category link exposed by the storefront menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuLink {
    pub label: String,
    pub href: String,
    pub hint: Option<String>,
}

/// A parsed page bound to the template that describes its markup.
pub struct PageSnapshot<'t> {
    document: Html,
    template: &'t Template,
}

impl<'t> PageSnapshot<'t> {
    pub fn parse(html: &str, template: &'t Template) -> Self {
        Self { document: Html::parse_document(html), template }
    }

    pub fn template(&self) -> &'t Template {
        self.template
    }

    /// Every panel on the page with its title.
    pub fn panels(&self) -> Vec<PanelInfo> {
        self.document
            .select(self.template.panel.selector())
            .enumerate()
            .map(|(index, panel)| {
                let title = panel
                    .select(self.template.panel_title.selector())
                    .next()
                    .map(text_of)
                    .unwrap_or_default();
                PanelInfo { index, title }
            })
            .collect()
    }

    /// The panel element at `index`.
    pub fn panel(&self, index: usize) -> Option<ElementRef<'_>> {
        self.document.select(self.template.panel.selector()).nth(index)
    }

    /// True when the panel's content element carries the open-state value.
    /// A panel without a content element reads as closed.
    pub fn is_expanded(&self, index: usize) -> bool {
        self.panel(index)
            .and_then(|panel| panel.select(self.template.panel_content.selector()).next())
            .and_then(|content| content.value().attr(&self.template.expanded_attr))
            .is_some_and(|value| value == self.template.expanded_value)
    }

    /// Number of items currently rendered in the panel.
    pub fn item_count(&self, index: usize) -> usize {
        self.panel(index)
            .map(|panel| panel.select(self.template.item.selector()).count())
            .unwrap_or(0)
    }

    /// The panel's toggle, when present.
    pub fn toggle(&self, index: usize) -> Option<ElementTarget> {
        let panel = self.panel(index)?;
        panel.select(self.template.panel_toggle.selector()).next()?;
        Some(ElementTarget::within(
            self.template.panel.raw(),
            index,
            self.template.panel_toggle.raw(),
        ))
    }

    /// Locates the reveal-more affordance for a panel.
    ///
    /// Lookup order: the panel's own reveal-more button, then any page element
    /// whose text matches a reveal-more pattern, then a page-wide reveal-more
    /// button. Disabled controls are ignored.
    pub fn reveal_more(&self, index: usize) -> Option<ElementTarget> {
        let t = self.template;

        if let Some(panel) = self.panel(index) {
            if let Some(pos) = panel.select(t.reveal_more.selector()).position(is_enabled) {
                let mut target = ElementTarget::within(t.panel.raw(), index, t.reveal_more.raw());
                target.index = pos;
                return Some(target);
            }
        }

        if let Some(pos) = self
            .document
            .select(t.reveal_more_text_scope.selector())
            .position(|el| is_enabled(el) && t.is_reveal_more_text(&text_of(el)))
        {
            return Some(ElementTarget::page(t.reveal_more_text_scope.raw(), pos));
        }

        self.document
            .select(t.reveal_more.selector())
            .position(is_enabled)
            .map(|pos| ElementTarget::page(t.reveal_more.raw(), pos))
    }

    /// First menu trigger candidate present on the page.
    pub fn menu_trigger(&self) -> Option<ElementTarget> {
        self.template
            .menu_triggers
            .iter()
            .find(|css| self.document.select(css.selector()).next().is_some())
            .map(|css| ElementTarget::page(css.raw(), 0))
    }

    /// Category links currently rendered by the menu.
    pub fn menu_links(&self) -> Vec<MenuLink> {
        self.document
            .select(self.template.menu_link.selector())
            .filter_map(|el| {
                let href = el.value().attr("href")?.trim().to_string();
                Some(MenuLink {
                    label: text_of(el),
                    href,
                    hint: el
                        .value()
                        .attr(&self.template.menu_link_hint_attr)
                        .map(str::to_string),
                })
            })
            .collect()
    }
}

/// Element text with whitespace runs collapsed.
pub fn text_of(el: ElementRef<'_>) -> String {
    el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

fn is_enabled(el: ElementRef<'_>) -> bool {
    el.value().attr("disabled").is_none()
}
