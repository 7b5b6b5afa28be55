//! Catalog taxonomy data model.

pub mod graph;
pub mod models;

pub use graph::CatalogGraph;
pub use models::{CatalogNode, LeafItem, NodeKind, RawCatalogNode};
