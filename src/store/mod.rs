//! Catalog persistence: the store seam and the staged view over it.
//!
//! Two collections share one shape. `Raw` holds the nodes of the crawl in
//! progress; `Production` holds the published catalog. [`StagedStore`] is the
//! only writer the pipeline uses, and its [`StagedStore::commit`] is the only
//! operation that touches `Production`.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::catalog::{CatalogGraph, CatalogNode, LeafItem, NodeKind};
use crate::error::StoreError;
use crate::report::diff::{diff_graphs, CatalogDiff};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Which set of nodes an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Raw,
    Production,
}

impl Collection {
    pub fn table(&self) -> &'static str {
        match self {
            Collection::Raw => "raw_catalog_nodes",
            Collection::Production => "catalog_nodes",
        }
    }
}

/// Conjunctive filter for [`CatalogStore::find`]. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeQuery {
    pub id: Option<String>,
    pub kind: Option<NodeKind>,
    pub parent_id: Option<String>,
    pub normalized_key: Option<String>,
}

impl NodeQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn roots() -> Self {
        Self { kind: Some(NodeKind::Root), ..Self::default() }
    }

    pub fn children_of(parent_id: &str) -> Self {
        Self { parent_id: Some(parent_id.to_string()), ..Self::default() }
    }

    pub fn by_id(id: &str) -> Self {
        Self { id: Some(id.to_string()), ..Self::default() }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.normalized_key = Some(key.into());
        self
    }
}

/// Current holder of the run lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockInfo {
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
}

/// Storage operations the crawler needs.
pub trait CatalogStore: Send {
    /// Inserts `node`, or updates the node with the same
    /// `(parent_id, normalized_key)`. Returns the stored node; on update it
    /// carries the existing id.
    fn upsert(&mut self, collection: Collection, node: &CatalogNode)
        -> Result<CatalogNode, StoreError>;

    fn bulk_insert(&mut self, collection: Collection, nodes: &[CatalogNode])
        -> Result<usize, StoreError>;

    fn delete_all(&mut self, collection: Collection) -> Result<usize, StoreError>;

    fn find(&self, collection: Collection, query: &NodeQuery)
        -> Result<Vec<CatalogNode>, StoreError>;

    /// Sets a node's `child_refs`; `has_children` follows from them.
    fn set_children(
        &mut self,
        collection: Collection,
        parent_id: &str,
        child_refs: &[String],
    ) -> Result<(), StoreError>;

    fn delete_children(&mut self, collection: Collection, parent_id: &str)
        -> Result<usize, StoreError>;

    /// Deletes every node of the collection and inserts `nodes`, all or
    /// nothing.
    fn replace_all(&mut self, collection: Collection, nodes: &[CatalogNode])
        -> Result<usize, StoreError>;

    /// Takes the run lock, failing with [`StoreError::Locked`] while another
    /// owner holds it. A lock older than `stale_after` is taken over.
    fn try_lock(&mut self, owner: &str, stale_after: Duration) -> Result<(), StoreError>;

    /// Releases the lock held by `owner`, or any lock when `None`.
    fn unlock(&mut self, owner: Option<&str>) -> Result<bool, StoreError>;

    fn lock_holder(&self) -> Result<Option<LockInfo>, StoreError>;

    fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        Ok(self.find(collection, &NodeQuery::all())?.len())
    }
}

impl<S: CatalogStore + ?Sized> CatalogStore for Box<S> {
    fn upsert(&mut self, c: Collection, node: &CatalogNode) -> Result<CatalogNode, StoreError> {
        (**self).upsert(c, node)
    }

    fn bulk_insert(&mut self, c: Collection, nodes: &[CatalogNode]) -> Result<usize, StoreError> {
        (**self).bulk_insert(c, nodes)
    }

    fn delete_all(&mut self, c: Collection) -> Result<usize, StoreError> {
        (**self).delete_all(c)
    }

    fn find(&self, c: Collection, query: &NodeQuery) -> Result<Vec<CatalogNode>, StoreError> {
        (**self).find(c, query)
    }

    fn set_children(&mut self, c: Collection, parent: &str, refs: &[String]) -> Result<(), StoreError> {
        (**self).set_children(c, parent, refs)
    }

    fn delete_children(&mut self, c: Collection, parent: &str) -> Result<usize, StoreError> {
        (**self).delete_children(c, parent)
    }

    fn replace_all(&mut self, c: Collection, nodes: &[CatalogNode]) -> Result<usize, StoreError> {
        (**self).replace_all(c, nodes)
    }

    fn try_lock(&mut self, owner: &str, stale_after: Duration) -> Result<(), StoreError> {
        (**self).try_lock(owner, stale_after)
    }

    fn unlock(&mut self, owner: Option<&str>) -> Result<bool, StoreError> {
        (**self).unlock(owner)
    }

    fn lock_holder(&self) -> Result<Option<LockInfo>, StoreError> {
        (**self).lock_holder()
    }
}

/// Children staged for one root.
#[derive(Debug, Clone, Default)]
pub struct StagedChildren {
    pub nodes: Vec<CatalogNode>,
    /// Items merged into an earlier sibling with the same key
    pub duplicates: usize,
    /// Items whose label has no usable key
    pub unkeyed: usize,
}

/// Stage, diff, commit and roll back a crawl over a store.
pub struct StagedStore<S> {
    store: S,
}

impl<S: CatalogStore> StagedStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    /// Upserts one node into `Raw`.
    ///
    /// A node whose key is already published under the same parent takes over
    /// the published id, so ids survive re-crawls.
    pub fn stage(&mut self, node: &CatalogNode) -> Result<CatalogNode, StoreError> {
        match self.published_id(node)? {
            Some(id) if id != node.id => {
                let node = CatalogNode { id, ..node.clone() };
                self.store.upsert(Collection::Raw, &node)
            }
            _ => self.store.upsert(Collection::Raw, node),
        }
    }

    fn published_id(&self, node: &CatalogNode) -> Result<Option<String>, StoreError> {
        let query = match &node.parent_id {
            Some(parent) => NodeQuery::children_of(parent),
            None => NodeQuery::roots(),
        };
        let query = query.with_key(node.normalized_key.clone());
        Ok(self.store.find(Collection::Production, &query)?.into_iter().next().map(|n| n.id))
    }

    /// Upserts a root's children into `Raw` and links them to the root.
    ///
    /// Items sharing a key are merged into one node at the first position.
    /// Items whose key is empty are skipped.
    pub fn stage_children(
        &mut self,
        root: &CatalogNode,
        items: &[LeafItem],
    ) -> Result<StagedChildren, StoreError> {
        let mut staged = StagedChildren::default();
        let mut seen = HashSet::new();
        let mut child_refs = Vec::with_capacity(items.len());

        for item in items {
            let key = item.key();
            if key.is_empty() {
                warn!("Skipping item '{}' under '{}': empty key", item.label, root.label);
                staged.unkeyed += 1;
                continue;
            }
            if !seen.insert(key.clone()) {
                debug!("Duplicate key '{}' under '{}'", key, root.label);
                staged.duplicates += 1;
                continue;
            }

            let stored = self.stage(&CatalogNode::child(&root.id, item))?;
            trace!("Staged '{}' ({})", stored.label, stored.normalized_key);
            child_refs.push(stored.id.clone());
            staged.nodes.push(stored);
        }

        self.store.set_children(Collection::Raw, &root.id, &child_refs)?;
        Ok(staged)
    }

    /// Removes a root's staged children and unlinks them.
    pub fn unstage_children(&mut self, root_id: &str) -> Result<usize, StoreError> {
        let removed = self.store.delete_children(Collection::Raw, root_id)?;
        self.store.set_children(Collection::Raw, root_id, &[])?;
        Ok(removed)
    }

    /// The staged catalog.
    pub fn staged(&self) -> Result<CatalogGraph, StoreError> {
        Ok(CatalogGraph::from_nodes(self.store.find(Collection::Raw, &NodeQuery::all())?))
    }

    /// The published catalog.
    pub fn published(&self) -> Result<CatalogGraph, StoreError> {
        Ok(CatalogGraph::from_nodes(self.store.find(Collection::Production, &NodeQuery::all())?))
    }

    /// Differences the commit would publish.
    pub fn diff(&self) -> Result<CatalogDiff, StoreError> {
        Ok(diff_graphs(&self.staged()?, &self.published()?))
    }

    /// Replaces the published catalog with the staged one in one transaction.
    pub fn commit(&mut self) -> Result<usize, StoreError> {
        let nodes = self.staged()?.into_nodes();
        self.store.replace_all(Collection::Production, &nodes)
    }

    /// Discards everything staged.
    pub fn rollback(&mut self) -> Result<usize, StoreError> {
        self.store.delete_all(Collection::Raw)
    }
}
