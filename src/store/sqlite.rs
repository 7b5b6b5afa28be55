//! SQLite-backed catalog store.

use super::{CatalogStore, Collection, LockInfo, NodeQuery};
use crate::catalog::{CatalogNode, NodeKind};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

const COLUMNS: &str = "id, label, normalized_key, kind, source_url, level, has_children, \
     child_refs, is_fallback_derived, last_crawled_at, parent_id, position, value_token, source_hint";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (and creates if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Other(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        debug!("Opening catalog database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self { conn: Connection::open_in_memory()? };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        for collection in [Collection::Production, Collection::Raw] {
            let table = collection.table();
            self.conn.execute_batch(&format!(
                "
                CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    label TEXT NOT NULL,
                    normalized_key TEXT NOT NULL,
                    kind TEXT NOT NULL CHECK(kind IN ('root', 'child')),
                    source_url TEXT,
                    level INTEGER NOT NULL,
                    has_children INTEGER NOT NULL DEFAULT 0,
                    child_refs TEXT NOT NULL DEFAULT '[]',  -- JSON array of ids
                    is_fallback_derived INTEGER NOT NULL DEFAULT 0,
                    last_crawled_at TEXT NOT NULL,
                    parent_id TEXT NOT NULL DEFAULT '',     -- '' for roots
                    position INTEGER,
                    value_token TEXT,
                    source_hint TEXT,
                    UNIQUE(parent_id, normalized_key)
                );

                CREATE INDEX IF NOT EXISTS idx_{table}_kind ON {table}(kind);
                "
            ))?;
        }

        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS crawl_lock (
                id INTEGER PRIMARY KEY CHECK(id = 1),
                owner TEXT NOT NULL,
                acquired_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn insert_sql(table: &str) -> String {
        format!(
            "INSERT INTO {table} ({COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        )
    }
}

/// Column values as stored, before validation.
struct NodeRow {
    id: String,
    label: String,
    normalized_key: String,
    kind: String,
    source_url: Option<String>,
    level: i64,
    has_children: bool,
    child_refs: String,
    is_fallback_derived: bool,
    last_crawled_at: String,
    parent_id: String,
    position: Option<i64>,
    value_token: Option<String>,
    source_hint: Option<String>,
}

impl NodeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            label: row.get(1)?,
            normalized_key: row.get(2)?,
            kind: row.get(3)?,
            source_url: row.get(4)?,
            level: row.get(5)?,
            has_children: row.get(6)?,
            child_refs: row.get(7)?,
            is_fallback_derived: row.get(8)?,
            last_crawled_at: row.get(9)?,
            parent_id: row.get(10)?,
            position: row.get(11)?,
            value_token: row.get(12)?,
            source_hint: row.get(13)?,
        })
    }
}

impl TryFrom<NodeRow> for CatalogNode {
    type Error = StoreError;

    fn try_from(row: NodeRow) -> Result<Self, Self::Error> {
        let kind: NodeKind = row
            .kind
            .parse()
            .map_err(|_| StoreError::Corrupt { column: "kind", value: row.kind.clone() })?;
        let child_refs: Vec<String> = serde_json::from_str(&row.child_refs)
            .map_err(|_| StoreError::Corrupt { column: "child_refs", value: row.child_refs.clone() })?;
        let last_crawled_at = parse_timestamp(&row.last_crawled_at)
            .ok_or(StoreError::Corrupt { column: "last_crawled_at", value: row.last_crawled_at })?;

        Ok(CatalogNode {
            id: row.id,
            label: row.label,
            normalized_key: row.normalized_key,
            kind,
            source_url: row.source_url,
            level: u8::try_from(row.level).unwrap_or(kind.level()),
            has_children: row.has_children,
            child_refs,
            is_fallback_derived: row.is_fallback_derived,
            last_crawled_at,
            parent_id: (!row.parent_id.is_empty()).then_some(row.parent_id),
            position: row.position.and_then(|p| u32::try_from(p).ok()),
            value_token: row.value_token,
            source_hint: row.source_hint,
        })
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value).ok().map(|t| t.with_timezone(&Utc))
}

fn child_refs_json(node: &CatalogNode) -> String {
    serde_json::to_string(&node.child_refs).unwrap_or_else(|_| "[]".to_string())
}

fn insert_node(conn: &Connection, table: &str, node: &CatalogNode) -> rusqlite::Result<usize> {
    conn.execute(
        &SqliteStore::insert_sql(table),
        params![
            node.id,
            node.label,
            node.normalized_key,
            node.kind.as_str(),
            node.source_url,
            node.level,
            node.has_children,
            child_refs_json(node),
            node.is_fallback_derived,
            node.last_crawled_at.to_rfc3339(),
            node.parent_id.as_deref().unwrap_or(""),
            node.position,
            node.value_token,
            node.source_hint,
        ],
    )
}

impl CatalogStore for SqliteStore {
    fn upsert(
        &mut self,
        collection: Collection,
        node: &CatalogNode,
    ) -> Result<CatalogNode, StoreError> {
        let table = collection.table();
        let sql = format!(
            "{} ON CONFLICT(parent_id, normalized_key) DO UPDATE SET \
                label = excluded.label, \
                kind = excluded.kind, \
                source_url = excluded.source_url, \
                level = excluded.level, \
                has_children = excluded.has_children, \
                child_refs = excluded.child_refs, \
                is_fallback_derived = excluded.is_fallback_derived, \
                last_crawled_at = excluded.last_crawled_at, \
                position = excluded.position, \
                value_token = excluded.value_token, \
                source_hint = excluded.source_hint \
             RETURNING id",
            Self::insert_sql(table)
        );

        let id: String = self.conn.query_row(
            &sql,
            params![
                node.id,
                node.label,
                node.normalized_key,
                node.kind.as_str(),
                node.source_url,
                node.level,
                node.has_children,
                child_refs_json(node),
                node.is_fallback_derived,
                node.last_crawled_at.to_rfc3339(),
                node.parent_id.as_deref().unwrap_or(""),
                node.position,
                node.value_token,
                node.source_hint,
            ],
            |row| row.get(0),
        )?;

        Ok(CatalogNode { id, ..node.clone() })
    }

    fn bulk_insert(
        &mut self,
        collection: Collection,
        nodes: &[CatalogNode],
    ) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        for node in nodes {
            insert_node(&tx, collection.table(), node)?;
        }
        tx.commit()?;
        Ok(nodes.len())
    }

    fn delete_all(&mut self, collection: Collection) -> Result<usize, StoreError> {
        let deleted = self.conn.execute(&format!("DELETE FROM {}", collection.table()), [])?;
        debug!("Deleted {} rows from {}", deleted, collection.table());
        Ok(deleted)
    }

    fn find(&self, collection: Collection, query: &NodeQuery) -> Result<Vec<CatalogNode>, StoreError> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(kind) = query.kind {
            clauses.push("kind = ?");
            values.push(kind.as_str().to_string());
        }
        if let Some(parent) = &query.parent_id {
            clauses.push("parent_id = ?");
            values.push(parent.clone());
        }
        if let Some(key) = &query.normalized_key {
            clauses.push("normalized_key = ?");
            values.push(key.clone());
        }
        if let Some(id) = &query.id {
            clauses.push("id = ?");
            values.push(id.clone());
        }

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let sql = format!("SELECT {COLUMNS} FROM {}{filter} ORDER BY rowid", collection.table());

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), NodeRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(CatalogNode::try_from).collect()
    }

    fn set_children(
        &mut self,
        collection: Collection,
        parent_id: &str,
        child_refs: &[String],
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(child_refs).unwrap_or_else(|_| "[]".to_string());
        let updated = self.conn.execute(
            &format!(
                "UPDATE {} SET child_refs = ?1, has_children = ?2 WHERE id = ?3",
                collection.table()
            ),
            params![json, !child_refs.is_empty(), parent_id],
        )?;

        if updated == 0 {
            return Err(StoreError::Other(format!("no node with id {}", parent_id)));
        }
        Ok(())
    }

    fn delete_children(&mut self, collection: Collection, parent_id: &str) -> Result<usize, StoreError> {
        let deleted = self.conn.execute(
            &format!("DELETE FROM {} WHERE parent_id = ?1", collection.table()),
            params![parent_id],
        )?;
        Ok(deleted)
    }

    fn replace_all(
        &mut self,
        collection: Collection,
        nodes: &[CatalogNode],
    ) -> Result<usize, StoreError> {
        let table = collection.table();
        let tx = self.conn.transaction()?;
        let removed = tx.execute(&format!("DELETE FROM {table}"), [])?;
        for node in nodes {
            insert_node(&tx, table, node)?;
        }
        tx.commit()?;

        debug!("Replaced {} rows in {} with {}", removed, table, nodes.len());
        Ok(nodes.len())
    }

    fn try_lock(&mut self, owner: &str, stale_after: Duration) -> Result<(), StoreError> {
        let tx = self.conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let held: Option<(String, String)> = tx
            .query_row("SELECT owner, acquired_at FROM crawl_lock WHERE id = 1", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;

        if let Some((holder, since)) = held {
            let stale = parse_timestamp(&since).is_none_or(|acquired| {
                let age = Utc::now().signed_duration_since(acquired);
                age.to_std().is_ok_and(|age| age >= stale_after)
            });
            if !stale {
                return Err(StoreError::Locked { owner: holder, since });
            }
            warn!("Taking over stale crawl lock held by {} since {}", holder, since);
        }

        tx.execute(
            "INSERT OR REPLACE INTO crawl_lock (id, owner, acquired_at) VALUES (1, ?1, ?2)",
            params![owner, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn unlock(&mut self, owner: Option<&str>) -> Result<bool, StoreError> {
        let removed = match owner {
            Some(owner) => {
                self.conn.execute("DELETE FROM crawl_lock WHERE owner = ?1", params![owner])?
            }
            None => self.conn.execute("DELETE FROM crawl_lock", [])?,
        };
        Ok(removed > 0)
    }

    fn lock_holder(&self) -> Result<Option<LockInfo>, StoreError> {
        let held: Option<(String, String)> = self
            .conn
            .query_row("SELECT owner, acquired_at FROM crawl_lock WHERE id = 1", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;

        held.map(|(owner, since)| {
            let acquired_at = parse_timestamp(&since)
                .ok_or(StoreError::Corrupt { column: "acquired_at", value: since })?;
            Ok(LockInfo { owner, acquired_at })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::LeafItem;

    fn leaf(label: &str) -> LeafItem {
        LeafItem {
            position: 1,
            label: label.to_string(),
            value_token: label.to_lowercase(),
            source_hint: "hint".to_string(),
            is_fallback_derived: false,
        }
    }

    #[test]
    fn test_upsert_keeps_existing_id() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let root = CatalogNode::root("Almacén", "https://x.test/almacen");
        let stored = store.upsert(Collection::Raw, &root).unwrap();
        assert_eq!(stored.id, root.id);

        let again = CatalogNode::root("ALMACEN", "https://x.test/almacen-2");
        let stored = store.upsert(Collection::Raw, &again).unwrap();
        assert_eq!(stored.id, root.id);

        let all = store.find(Collection::Raw, &NodeQuery::all()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].label, "ALMACEN");
        assert_eq!(all[0].source_url.as_deref(), Some("https://x.test/almacen-2"));
    }

    #[test]
    fn test_same_key_under_different_parents() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = store.upsert(Collection::Raw, &CatalogNode::root("A", "u")).unwrap();
        let b = store.upsert(Collection::Raw, &CatalogNode::root("B", "u")).unwrap();

        store.upsert(Collection::Raw, &CatalogNode::child(&a.id, &leaf("Otros"))).unwrap();
        store.upsert(Collection::Raw, &CatalogNode::child(&b.id, &leaf("Otros"))).unwrap();

        let children = store.find(Collection::Raw, &NodeQuery::children_of(&a.id)).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(store.find(Collection::Raw, &NodeQuery::all()).unwrap().len(), 4);
    }

    #[test]
    fn test_round_trips_all_fields() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let root = CatalogNode::root("Bebidas", "https://x.test/bebidas");
        let mut child = CatalogNode::child(&root.id, &leaf("Vinos"));
        child.is_fallback_derived = true;

        store.bulk_insert(Collection::Production, &[root.clone(), child.clone()]).unwrap();
        let found = store.find(Collection::Production, &NodeQuery::children_of(&root.id)).unwrap();
        assert_eq!(found[0].value_token, child.value_token);
        assert_eq!(found[0].parent_id, child.parent_id);
        assert!(found[0].is_fallback_derived);

        let roots = store.find(Collection::Production, &NodeQuery::roots()).unwrap();
        assert_eq!(roots.len(), 1);
        assert!(roots[0].parent_id.is_none());
    }

    #[test]
    fn test_set_and_delete_children() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let root = store.upsert(Collection::Raw, &CatalogNode::root("A", "u")).unwrap();
        let child = store.upsert(Collection::Raw, &CatalogNode::child(&root.id, &leaf("x"))).unwrap();

        store.set_children(Collection::Raw, &root.id, &[child.id.clone()]).unwrap();
        let found = store.find(Collection::Raw, &NodeQuery::by_id(&root.id)).unwrap();
        assert!(found[0].has_children);
        assert_eq!(found[0].child_refs, vec![child.id.clone()]);

        assert_eq!(store.delete_children(Collection::Raw, &root.id).unwrap(), 1);
        store.set_children(Collection::Raw, &root.id, &[]).unwrap();
        let found = store.find(Collection::Raw, &NodeQuery::by_id(&root.id)).unwrap();
        assert!(!found[0].has_children);

        assert!(store.set_children(Collection::Raw, "missing", &[]).is_err());
    }

    #[test]
    fn test_replace_all_is_atomic() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let before = CatalogNode::root("Old", "u");
        store.bulk_insert(Collection::Production, &[before.clone()]).unwrap();

        // Duplicate ids violate the primary key half-way through.
        let fresh = CatalogNode::root("New", "u");
        let mut dup = CatalogNode::root("Other", "u");
        dup.id = fresh.id.clone();
        assert!(store.replace_all(Collection::Production, &[fresh, dup]).is_err());

        let after = store.find(Collection::Production, &NodeQuery::all()).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, before.id);
    }

    #[test]
    fn test_collections_are_separate() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.upsert(Collection::Raw, &CatalogNode::root("A", "u")).unwrap();
        assert!(store.find(Collection::Production, &NodeQuery::all()).unwrap().is_empty());
        assert_eq!(store.delete_all(Collection::Raw).unwrap(), 1);
    }

    #[test]
    fn test_lock_lifecycle() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let hour = Duration::from_secs(3600);

        store.try_lock("run-1", hour).unwrap();
        assert_eq!(store.lock_holder().unwrap().unwrap().owner, "run-1");

        let err = store.try_lock("run-2", hour).unwrap_err();
        assert!(matches!(err, StoreError::Locked { ref owner, .. } if owner == "run-1"));

        assert!(!store.unlock(Some("run-2")).unwrap());
        assert!(store.unlock(Some("run-1")).unwrap());
        assert!(store.lock_holder().unwrap().is_none());
        store.try_lock("run-2", hour).unwrap();
    }

    #[test]
    fn test_stale_lock_is_taken_over() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.try_lock("crashed", Duration::from_secs(3600)).unwrap();

        store.try_lock("next", Duration::ZERO).unwrap();
        assert_eq!(store.lock_holder().unwrap().unwrap().owner, "next");
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.db");
        let mut store = SqliteStore::open(&path).unwrap();
        store.upsert(Collection::Production, &CatalogNode::root("A", "u")).unwrap();
        drop(store);

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.count(Collection::Production).unwrap(), 1);
    }
}
