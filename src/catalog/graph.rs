//! In-memory view of a two-level catalog.

use super::models::CatalogNode;
use std::collections::HashMap;

/// Roots with their children, ordered for display and diffing.
#[derive(Debug, Clone, Default)]
pub struct CatalogGraph {
    roots: Vec<CatalogNode>,
    children: HashMap<String, Vec<CatalogNode>>,
    orphans: Vec<CatalogNode>,
}

impl CatalogGraph {
    /// Groups a flat node list by parent.
    ///
    /// Roots keep the input order. Children follow their parent's
    /// `child_refs` order, then `position` for any not referenced. Children
    /// whose parent is absent are kept aside as orphans.
    pub fn from_nodes(nodes: Vec<CatalogNode>) -> Self {
        let mut roots = Vec::new();
        let mut by_parent: HashMap<String, Vec<CatalogNode>> = HashMap::new();

        for node in nodes {
            match node.parent_id.clone() {
                None => roots.push(node),
                Some(parent) => by_parent.entry(parent).or_default().push(node),
            }
        }

        let mut children = HashMap::new();
        for root in &roots {
            if let Some(mut kids) = by_parent.remove(&root.id) {
                let rank: HashMap<&str, usize> =
                    root.child_refs.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
                kids.sort_by_key(|c| {
                    (rank.get(c.id.as_str()).copied().unwrap_or(usize::MAX), c.position)
                });
                children.insert(root.id.clone(), kids);
            }
        }

        let orphans = by_parent.into_values().flatten().collect();
        Self { roots, children, orphans }
    }

    pub fn roots(&self) -> &[CatalogNode] {
        &self.roots
    }

    /// Children of the root with `root_id`, in order.
    pub fn children_of(&self, root_id: &str) -> &[CatalogNode] {
        self.children.get(root_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Finds a root by its canonical key.
    pub fn root_by_key(&self, key: &str) -> Option<&CatalogNode> {
        self.roots.iter().find(|r| r.normalized_key == key)
    }

    /// Children whose parent is not part of the graph.
    pub fn orphans(&self) -> &[CatalogNode] {
        &self.orphans
    }

    pub fn child_count(&self) -> usize {
        self.children.values().map(Vec::len).sum()
    }

    pub fn len(&self) -> usize {
        self.roots.len() + self.child_count() + self.orphans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattens back into nodes: each root followed by its children.
    pub fn into_nodes(mut self) -> Vec<CatalogNode> {
        let mut nodes = Vec::with_capacity(self.len());
        for root in self.roots {
            let kids = self.children.remove(&root.id).unwrap_or_default();
            nodes.push(root);
            nodes.extend(kids);
        }
        nodes.extend(self.orphans);
        nodes
    }
}
