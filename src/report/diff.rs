//! Differences between a staged and a published catalog.

use crate::catalog::{CatalogGraph, CatalogNode};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Names of the nodes a swap would add, remove or change.
///
/// Roots are listed by label; children as `Root / Child`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogDiff {
    pub added_roots: Vec<String>,
    pub removed_roots: Vec<String>,
    pub modified_roots: Vec<String>,
    pub added_children: Vec<String>,
    pub removed_children: Vec<String>,
    pub modified_children: Vec<String>,
}

impl CatalogDiff {
    pub fn total_changes(&self) -> usize {
        self.added_roots.len()
            + self.removed_roots.len()
            + self.modified_roots.len()
            + self.added_children.len()
            + self.removed_children.len()
            + self.modified_children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_changes() == 0
    }
}

fn child_name(root: &CatalogNode, child: &CatalogNode) -> String {
    format!("{} / {}", root.label, child.label)
}

fn child_changed(new: &CatalogNode, old: &CatalogNode) -> bool {
    new.label != old.label
        || new.value_token != old.value_token
        || new.is_fallback_derived != old.is_fallback_derived
}

/// Compares `staged` against `published`, matching roots by key and children
/// by key within their root.
pub fn diff_graphs(staged: &CatalogGraph, published: &CatalogGraph) -> CatalogDiff {
    let mut diff = CatalogDiff::default();

    for root in staged.roots() {
        let new_children = staged.children_of(&root.id);

        let Some(old_root) = published.root_by_key(&root.normalized_key) else {
            diff.added_roots.push(root.label.clone());
            diff.added_children.extend(new_children.iter().map(|c| child_name(root, c)));
            continue;
        };

        let old_children: HashMap<&str, &CatalogNode> = published
            .children_of(&old_root.id)
            .iter()
            .map(|c| (c.normalized_key.as_str(), c))
            .collect();

        for child in new_children {
            match old_children.get(child.normalized_key.as_str()) {
                None => diff.added_children.push(child_name(root, child)),
                Some(old) if child_changed(child, old) => {
                    diff.modified_children.push(child_name(root, child))
                }
                Some(_) => {}
            }
        }

        let new_keys: BTreeSet<&str> =
            new_children.iter().map(|c| c.normalized_key.as_str()).collect();
        for old in published.children_of(&old_root.id) {
            if !new_keys.contains(old.normalized_key.as_str()) {
                diff.removed_children.push(child_name(old_root, old));
            }
        }

        let old_keys: BTreeSet<&str> = old_children.keys().copied().collect();
        if root.label != old_root.label || root.source_url != old_root.source_url || new_keys != old_keys
        {
            diff.modified_roots.push(root.label.clone());
        }
    }

    for old_root in published.roots() {
        if staged.root_by_key(&old_root.normalized_key).is_none() {
            diff.removed_roots.push(old_root.label.clone());
            diff.removed_children.extend(
                published.children_of(&old_root.id).iter().map(|c| child_name(old_root, c)),
            );
        }
    }

    diff
}
