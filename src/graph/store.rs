//! Property graph targets for triple import
//!
//! Nodes are keyed by their URI and merged on every upsert, edges are keyed
//! by (source, relation, target), so importing the same triples twice
//! leaves the graph unchanged.

use crate::graph::triple::Literal;
use crate::{FloraError, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Boolean(bool),
    Integer(i64),
    String(String),
}

impl From<&Literal> for PropertyValue {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::String(s) => PropertyValue::String(s.clone()),
            Literal::Integer(n) => PropertyValue::Integer(*n),
            Literal::Boolean(b) => PropertyValue::Boolean(*b),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeUpsert {
    pub uri: String,
    pub labels: BTreeSet<String>,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl NodeUpsert {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    /// Union labels, overwrite properties key by key
    pub fn merge(&mut self, other: NodeUpsert) {
        self.labels.extend(other.labels);
        self.properties.extend(other.properties);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeUpsert {
    pub source: String,
    pub relation: String,
    pub target: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphCounts {
    pub nodes: u64,
    pub edges: u64,
}

/// A graph database accepting keyed node and edge upserts
pub trait GraphStore: Send + Sync {
    fn name(&self) -> &str;

    /// Create constraints/tables; idempotent
    fn prepare(&self) -> Result<()>;

    /// Delete every node and edge
    fn clear(&self) -> Result<()>;

    fn upsert_nodes(&self, nodes: &[NodeUpsert]) -> Result<()>;

    /// Both endpoints must already exist as nodes
    fn upsert_edges(&self, edges: &[EdgeUpsert]) -> Result<()>;

    fn counts(&self) -> Result<GraphCounts>;
}

const GRAPH_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS graph_node (
    uri TEXT PRIMARY KEY,
    labels TEXT NOT NULL,
    properties TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS graph_edge (
    source TEXT NOT NULL,
    relation TEXT NOT NULL,
    target TEXT NOT NULL,
    PRIMARY KEY (source, relation, target)
);

CREATE INDEX IF NOT EXISTS idx_graph_edge_target ON graph_edge(target);
"#;

/// Embedded property graph in a SQLite file
#[derive(Clone)]
pub struct SqliteGraphStore {
    conn: Arc<Mutex<Connection>>,
    name: String,
}

impl SqliteGraphStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!(path = %path.display(), "Opening embedded graph store");
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            name: format!("sqlite:{}", path.display()),
        })
    }

    pub fn memory() -> Result<Self> {
        Ok(Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
            name: "sqlite::memory:".to_string(),
        })
    }

    /// Labels and properties stored for `uri`
    pub fn node(&self, uri: &str) -> Result<Option<NodeUpsert>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT labels, properties FROM graph_node WHERE uri = ?1",
                params![uri],
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((labels, properties)) => Ok(Some(NodeUpsert {
                uri: uri.to_string(),
                labels: serde_json::from_str(&labels)?,
                properties: serde_json::from_str(&properties)?,
            })),
        }
    }

    /// Targets of `relation` edges leaving `source`
    pub fn neighbours(&self, source: &str, relation: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT target FROM graph_edge WHERE source = ?1 AND relation = ?2 ORDER BY target",
        )?;
        let targets = stmt
            .query_map(params![source, relation], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(targets)
    }
}

impl GraphStore for SqliteGraphStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&self) -> Result<()> {
        self.conn.lock().execute_batch(GRAPH_SCHEMA)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch("DELETE FROM graph_edge; DELETE FROM graph_node;")?;
        debug!("Cleared embedded graph");
        Ok(())
    }

    fn upsert_nodes(&self, nodes: &[NodeUpsert]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut select =
                tx.prepare_cached("SELECT labels, properties FROM graph_node WHERE uri = ?1")?;
            let mut upsert = tx.prepare_cached(
                "INSERT INTO graph_node (uri, labels, properties) VALUES (?1, ?2, ?3)
                 ON CONFLICT(uri) DO UPDATE SET labels = excluded.labels, properties = excluded.properties",
            )?;

            for node in nodes {
                let existing = select
                    .query_row(params![node.uri], |r| {
                        Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
                    })
                    .optional()?;

                let mut merged = match existing {
                    Some((labels, properties)) => NodeUpsert {
                        uri: node.uri.clone(),
                        labels: serde_json::from_str(&labels)?,
                        properties: serde_json::from_str(&properties)?,
                    },
                    None => NodeUpsert::new(node.uri.clone()),
                };
                merged.merge(node.clone());

                upsert.execute(params![
                    merged.uri,
                    serde_json::to_string(&merged.labels)?,
                    serde_json::to_string(&merged.properties)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn upsert_edges(&self, edges: &[EdgeUpsert]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT OR IGNORE INTO graph_edge (source, relation, target) VALUES (?1, ?2, ?3)",
            )?;
            for edge in edges {
                insert.execute(params![edge.source, edge.relation, edge.target])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn counts(&self) -> Result<GraphCounts> {
        let conn = self.conn.lock();
        let count = |table: &str| -> Result<u64> {
            let n: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
                .map_err(|e| FloraError::Graph(format!("Counting {}: {}", table, e)))?;
            Ok(n as u64)
        };
        Ok(GraphCounts {
            nodes: count("graph_node")?,
            edges: count("graph_edge")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node(uri: &str, label: &str, key: &str, value: PropertyValue) -> NodeUpsert {
        let mut node = NodeUpsert::new(uri);
        node.labels.insert(label.to_string());
        node.properties.insert(key.to_string(), value);
        node
    }

    #[test]
    fn test_nodes_merge_by_uri() {
        let store = SqliteGraphStore::memory().unwrap();
        store.prepare().unwrap();

        store
            .upsert_nodes(&[node("urn:t/1", "Taxon", "name", PropertyValue::String("Oxalis".into()))])
            .unwrap();
        store
            .upsert_nodes(&[node("urn:t/1", "DbWCVP", "reviewed", PropertyValue::Boolean(true))])
            .unwrap();

        let stored = store.node("urn:t/1").unwrap().unwrap();
        assert_eq!(
            stored.labels.into_iter().collect::<Vec<_>>(),
            vec!["DbWCVP".to_string(), "Taxon".to_string()]
        );
        assert_eq!(stored.properties.len(), 2);
        assert_eq!(store.counts().unwrap(), GraphCounts { nodes: 1, edges: 0 });
    }

    #[test]
    fn test_edges_are_not_duplicated() {
        let store = SqliteGraphStore::memory().unwrap();
        store.prepare().unwrap();
        store
            .upsert_nodes(&[NodeUpsert::new("urn:a"), NodeUpsert::new("urn:b")])
            .unwrap();

        let edge = EdgeUpsert {
            source: "urn:a".into(),
            relation: "belongsToGenus".into(),
            target: "urn:b".into(),
        };
        store.upsert_edges(&[edge.clone(), edge.clone()]).unwrap();
        store.upsert_edges(&[edge]).unwrap();

        assert_eq!(store.counts().unwrap(), GraphCounts { nodes: 2, edges: 1 });
        assert_eq!(store.neighbours("urn:a", "belongsToGenus").unwrap(), vec!["urn:b"]);

        store.clear().unwrap();
        assert_eq!(store.counts().unwrap(), GraphCounts::default());
    }

    #[test]
    fn test_property_values_serialize_plainly() {
        let json = serde_json::to_string(&vec![
            PropertyValue::Boolean(false),
            PropertyValue::Integer(1753),
            PropertyValue::String("L.".into()),
        ])
        .unwrap();
        assert_eq!(json, r#"[false,1753,"L."]"#);
    }
}
