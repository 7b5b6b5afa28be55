//! Ordered heuristics for finding the subcategory panel.

use super::dom::PanelInfo;
use super::Region;
use crate::config::CrawlSettings;
use crate::normalize::normalize;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which strategy found a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    ExactTitle,
    FuzzyTitle,
    Positional,
}

impl StrategyKind {
    /// Items read through a fallback strategy are flagged as such.
    pub fn is_fallback(&self) -> bool {
        !matches!(self, StrategyKind::ExactTitle)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::ExactTitle => write!(f, "exact-title"),
            StrategyKind::FuzzyTitle => write!(f, "fuzzy-title"),
            StrategyKind::Positional => write!(f, "positional"),
        }
    }
}

/// A region found by the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub region: Region,
    pub strategy: StrategyKind,
}

impl Located {
    pub fn is_fallback(&self) -> bool {
        self.strategy.is_fallback()
    }
}

/// Result of running the chain. Not finding a region is an ordinary outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(Located),
    NotFound { seen: Vec<String> },
}

/// One way of picking a panel out of the page inventory.
pub trait LocatorStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Returns the matching panel, if any.
    fn locate<'p>(&self, panels: &'p [PanelInfo], hints: &[String]) -> Option<&'p PanelInfo>;

    /// Returns a description of this strategy.
    fn description(&self) -> String;
}

/// Matches a panel whose trimmed title equals one of the hints.
pub struct ExactTitle;

impl LocatorStrategy for ExactTitle {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ExactTitle
    }

    fn locate<'p>(&self, panels: &'p [PanelInfo], hints: &[String]) -> Option<&'p PanelInfo> {
        hints.iter().find_map(|hint| {
            let hint = hint.trim();
            panels.iter().find(|p| !hint.is_empty() && p.title.trim() == hint)
        })
    }

    fn description(&self) -> String {
        "Exact title".to_string()
    }
}

/// Matches a panel whose title contains, or is contained in, one of the
/// alternate titles once both are normalized.
pub struct FuzzyTitle {
    alternates: Vec<String>,
}

impl FuzzyTitle {
    pub fn new(alternates: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let alternates = alternates
            .into_iter()
            .map(|a| normalize(a.as_ref()))
            .filter(|a| !a.is_empty())
            .collect();
        Self { alternates }
    }
}

impl LocatorStrategy for FuzzyTitle {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FuzzyTitle
    }

    fn locate<'p>(&self, panels: &'p [PanelInfo], _hints: &[String]) -> Option<&'p PanelInfo> {
        self.alternates.iter().find_map(|alt| {
            panels.iter().find(|p| {
                let title = normalize(&p.title);
                !title.is_empty() && (title.contains(alt.as_str()) || alt.contains(&title))
            })
        })
    }

    fn description(&self) -> String {
        format!("Fuzzy title ({})", self.alternates.join(", "))
    }
}

/// Picks the panel at a fixed index.
pub struct Positional {
    index: usize,
}

impl Positional {
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

impl LocatorStrategy for Positional {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Positional
    }

    fn locate<'p>(&self, panels: &'p [PanelInfo], _hints: &[String]) -> Option<&'p PanelInfo> {
        panels.get(self.index)
    }

    fn description(&self) -> String {
        format!("Panel #{}", self.index)
    }
}

/// Strategies tried in order; the first match wins.
pub struct LocatorChain {
    strategies: Vec<Box<dyn LocatorStrategy>>,
}

impl LocatorChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self { strategies: Vec::new() }
    }

    /// Appends a strategy with the lowest priority so far.
    pub fn add(&mut self, strategy: impl LocatorStrategy + 'static) -> &mut Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Runs the strategies over the inventory.
    pub fn locate(&self, panels: &[PanelInfo], hints: &[String]) -> Lookup {
        for strategy in &self.strategies {
            if let Some(panel) = strategy.locate(panels, hints) {
                return Lookup::Found(Located {
                    region: Region { index: panel.index, title: panel.title.clone() },
                    strategy: strategy.kind(),
                });
            }
        }

        Lookup::NotFound { seen: panels.iter().map(|p| p.title.clone()).collect() }
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns descriptions of all strategies, in priority order.
    pub fn descriptions(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.description()).collect()
    }
}

impl Default for LocatorChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for constructing a LocatorChain from configuration.
pub struct LocatorChainBuilder {
    chain: LocatorChain,
}

impl LocatorChainBuilder {
    pub fn new() -> Self {
        Self { chain: LocatorChain::new() }
    }

    pub fn exact_title(mut self) -> Self {
        self.chain.add(ExactTitle);
        self
    }

    /// Adds the containment strategy when alternates are configured.
    pub fn fuzzy_title(mut self, alternates: &[String]) -> Self {
        let strategy = FuzzyTitle::new(alternates);
        if !strategy.alternates.is_empty() {
            self.chain.add(strategy);
        }
        self
    }

    /// Adds the positional fallback when an index is configured.
    pub fn positional(mut self, index: Option<usize>) -> Self {
        if let Some(index) = index {
            self.chain.add(Positional::new(index));
        }
        self
    }

    pub fn build(self) -> LocatorChain {
        self.chain
    }
}

impl Default for LocatorChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&CrawlSettings> for LocatorChain {
    fn from(settings: &CrawlSettings) -> Self {
        LocatorChainBuilder::new()
            .exact_title()
            .fuzzy_title(&settings.alternate_titles)
            .positional(settings.positional_fallback)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panels(titles: &[&str]) -> Vec<PanelInfo> {
        titles
            .iter()
            .enumerate()
            .map(|(index, t)| PanelInfo { index, title: t.to_string() })
            .collect()
    }

    fn hints() -> Vec<String> {
        vec!["Sub-Categoría".to_string()]
    }

    fn default_chain() -> LocatorChain {
        LocatorChain::from(&CrawlSettings::default())
    }

    #[test]
    fn test_exact_title() {
        let inv = panels(&["Marca", " Sub-Categoría ", "Precio"]);
        assert_eq!(ExactTitle.locate(&inv, &hints()).map(|p| p.index), Some(1));
        assert!(ExactTitle.locate(&panels(&["Sub-Categorías"]), &hints()).is_none());
    }

    #[test]
    fn test_fuzzy_title_containment_both_ways() {
        let fuzzy = FuzzyTitle::new(["Categoría"]);
        let inv = panels(&["Marca", "CATEGORIAS"]);
        assert_eq!(fuzzy.locate(&inv, &[]).map(|p| p.index), Some(1));

        let fuzzy = FuzzyTitle::new(["Categorías de producto"]);
        let inv = panels(&["Categorías"]);
        assert!(fuzzy.locate(&inv, &[]).is_some());
    }

    #[test]
    fn test_fuzzy_title_ignores_empty_titles() {
        let fuzzy = FuzzyTitle::new(["Categoría", ""]);
        assert_eq!(fuzzy.alternates.len(), 1);
        assert!(fuzzy.locate(&panels(&["", "  "]), &[]).is_none());
    }

    #[test]
    fn test_positional() {
        let inv = panels(&["Marca", "Precio"]);
        assert_eq!(Positional::new(1).locate(&inv, &[]).map(|p| p.index), Some(1));
        assert!(Positional::new(2).locate(&inv, &[]).is_none());
    }

    #[test]
    fn test_exact_beats_fallbacks() {
        let inv = panels(&["Categoría", "Sub-Categoría"]);
        match default_chain().locate(&inv, &hints()) {
            Lookup::Found(located) => {
                assert_eq!(located.strategy, StrategyKind::ExactTitle);
                assert_eq!(located.region.index, 1);
                assert!(!located.is_fallback());
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_fuzzy_before_positional() {
        let inv = panels(&["Marca", "Precio", "Categoría"]);
        match default_chain().locate(&inv, &hints()) {
            Lookup::Found(located) => {
                assert_eq!(located.strategy, StrategyKind::FuzzyTitle);
                assert_eq!(located.region.title, "Categoría");
                assert!(located.is_fallback());
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_positional_fallback() {
        let inv = panels(&["Marca", "Precio"]);
        match default_chain().locate(&inv, &hints()) {
            Lookup::Found(located) => {
                assert_eq!(located.strategy, StrategyKind::Positional);
                assert_eq!(located.region.index, 1);
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_not_found_reports_seen_titles() {
        let inv = panels(&["Marca"]);
        assert_eq!(
            default_chain().locate(&inv, &hints()),
            Lookup::NotFound { seen: vec!["Marca".to_string()] }
        );
    }

    #[test]
    fn test_builder_skips_disabled_strategies() {
        let chain = LocatorChainBuilder::new().exact_title().fuzzy_title(&[]).positional(None).build();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.descriptions(), vec!["Exact title"]);
        assert_eq!(default_chain().len(), 3);
    }

    #[test]
    fn test_strategy_kind_display() {
        assert_eq!(StrategyKind::FuzzyTitle.to_string(), "fuzzy-title");
        assert!(StrategyKind::Positional.is_fallback());
    }
}
