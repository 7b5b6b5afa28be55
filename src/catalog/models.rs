//! Data models for catalog nodes and extracted leaf items.

use crate::normalize::normalize;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Position of a node in the two-level taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Child,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Child => "child",
        }
    }

    /// Depth of nodes of this kind.
    pub fn level(&self) -> u8 {
        match self {
            NodeKind::Root => 0,
            NodeKind::Child => 1,
        }
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "root" => Ok(NodeKind::Root),
            "child" => Ok(NodeKind::Child),
            _ => Err(format!("Unknown node kind: {}", s)),
        }
    }
}

/// A category in the published or staged catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogNode {
    /// Stable identifier (UUID v4), kept across re-crawls of the same key
    pub id: String,
    /// Display text as read from the storefront
    pub label: String,
    /// Canonical key, unique among siblings
    pub normalized_key: String,
    pub kind: NodeKind,
    /// Listing URL (roots only)
    pub source_url: Option<String>,
    pub level: u8,
    pub has_children: bool,
    /// Ordered child ids
    pub child_refs: Vec<String>,
    /// Read from a region found by a fallback locator strategy
    pub is_fallback_derived: bool,
    pub last_crawled_at: DateTime<Utc>,
    /// Parent id (children only)
    pub parent_id: Option<String>,
    /// 1-based position inside the source region (children only)
    pub position: Option<u32>,
    /// Filter value the storefront uses for this child
    pub value_token: Option<String>,
    /// Where the child was read from
    pub source_hint: Option<String>,
}

/// A node written during an in-progress crawl. Same shape as the published
/// node; only the collection it lives in differs.
pub type RawCatalogNode = CatalogNode;

impl CatalogNode {
    /// Creates a root node with a fresh id.
    pub fn root(label: impl Into<String>, source_url: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            id: Uuid::new_v4().to_string(),
            normalized_key: normalize(&label),
            label,
            kind: NodeKind::Root,
            source_url: Some(source_url.into()),
            level: NodeKind::Root.level(),
            has_children: false,
            child_refs: Vec::new(),
            is_fallback_derived: false,
            last_crawled_at: Utc::now(),
            parent_id: None,
            position: None,
            value_token: None,
            source_hint: None,
        }
    }

    /// Creates a child node of `parent_id` from an extracted item.
    pub fn child(parent_id: &str, item: &LeafItem) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            label: item.label.clone(),
            normalized_key: item.key(),
            kind: NodeKind::Child,
            source_url: None,
            level: NodeKind::Child.level(),
            has_children: false,
            child_refs: Vec::new(),
            is_fallback_derived: item.is_fallback_derived,
            last_crawled_at: Utc::now(),
            parent_id: Some(parent_id.to_string()),
            position: Some(item.position),
            value_token: Some(item.value_token.clone()),
            source_hint: Some(item.source_hint.clone()),
        }
    }

    pub fn is_root(&self) -> bool {
        self.kind == NodeKind::Root
    }
}

/// One item read from a located region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafItem {
    /// 1-based index inside the region
    pub position: u32,
    pub label: String,
    pub value_token: String,
    pub source_hint: String,
    pub is_fallback_derived: bool,
}

impl LeafItem {
    /// Canonical key of the item's label.
    pub fn key(&self) -> String {
        normalize(&self.label)
    }
}
