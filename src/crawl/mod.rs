//! Listing-page crawl: locating, opening, paginating and reading regions.

pub mod dom;
pub mod expansion;
pub mod extract;
pub mod locator;
pub mod pagination;
pub mod retry;
pub mod roots;
pub mod session;

pub use expansion::PanelState;
pub use locator::{Located, LocatorChain, LocatorChainBuilder, Lookup, StrategyKind};
pub use pagination::{Stabilized, StabilizeOptions};
pub use session::{RootCrawl, RootCrawler};

/// A panel picked out of the page inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Index among the page's panels
    pub index: usize,
    pub title: String,
}
