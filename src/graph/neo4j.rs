//! Neo4j over Bolt
//!
//! Every node carries the `Resource` label with a unique `uri` property;
//! upserts are Cypher `MERGE`s on that key. The driver is async, so the
//! store owns a small tokio runtime and blocks on it.

use crate::graph::store::{EdgeUpsert, GraphCounts, GraphStore, NodeUpsert, PropertyValue};
use crate::resilience::retry::{with_retry, RetryPolicy};
use crate::{FloraError, Result};
use neo4rs::{query, BoltType, ConfigBuilder, Graph, Query};
use std::collections::{BTreeMap, HashMap};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

pub const RESOURCE_LABEL: &str = "Resource";

/// Statements sent in one transaction
const STATEMENTS_PER_TRANSACTION: usize = 16;

#[derive(Debug, Clone)]
pub struct Neo4jSettings {
    /// Bolt URI, e.g. `bolt://localhost:7687` or `neo4j+s://host`
    pub uri: String,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub retry: RetryPolicy,
    /// Rows per UNWIND statement
    pub batch_size: usize,
}

/// Value of one field of an UNWIND row
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    Text(String),
    Properties(BTreeMap<String, PropertyValue>),
}

pub type Row = BTreeMap<&'static str, RowValue>;

/// Cypher text plus the rows bound to `$rows`
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub cypher: String,
    pub rows: Vec<Row>,
}

impl Statement {
    fn bare(cypher: String) -> Self {
        Self {
            cypher,
            rows: Vec::new(),
        }
    }

    fn to_query(&self) -> Query {
        let q = query(&self.cypher);
        if self.rows.is_empty() {
            return q;
        }
        let rows: Vec<HashMap<String, BoltType>> = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(key, value)| (key.to_string(), row_value(value)))
                    .collect()
            })
            .collect();
        q.param("rows", rows)
    }
}

fn property(value: &PropertyValue) -> BoltType {
    match value {
        PropertyValue::Boolean(b) => BoltType::from(*b),
        PropertyValue::Integer(n) => BoltType::from(*n),
        PropertyValue::String(s) => BoltType::from(s.as_str()),
    }
}

fn row_value(value: &RowValue) -> BoltType {
    match value {
        RowValue::Text(s) => BoltType::from(s.as_str()),
        RowValue::Properties(properties) => BoltType::from(
            properties
                .iter()
                .map(|(k, v)| (k.clone(), property(v)))
                .collect::<HashMap<String, BoltType>>(),
        ),
    }
}

/// Transient server errors and dropped connections are worth retrying;
/// syntax, constraint and auth errors are not
pub fn is_transient(message: &str) -> bool {
    if message.contains("Neo.TransientError") {
        return true;
    }
    let lower = message.to_lowercase();
    ["connection", "io error", "timed out", "broken pipe"]
        .iter()
        .any(|marker| lower.contains(marker))
}

fn graph_error(context: &str, err: impl std::fmt::Display) -> FloraError {
    let message = format!("{}: {}", context, err);
    if is_transient(&message) {
        FloraError::Network {
            message,
            retryable: true,
        }
    } else {
        FloraError::Graph(message)
    }
}

fn driver_config(settings: &Neo4jSettings) -> Result<neo4rs::Config> {
    ConfigBuilder::default()
        .uri(settings.uri.as_str())
        .user(settings.user.as_deref().unwrap_or("neo4j"))
        .password(settings.password.as_deref().unwrap_or(""))
        .db(settings.database.as_str())
        .max_connections(4)
        .build()
        .map_err(|e| FloraError::Config(format!("Invalid Neo4j settings: {}", e)))
}

pub struct Neo4jStore {
    graph: Graph,
    runtime: Runtime,
    settings: Neo4jSettings,
}

impl Neo4jStore {
    pub fn connect(settings: Neo4jSettings) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("neo4j")
            .enable_all()
            .build()?;

        let graph = with_retry(
            || {
                runtime
                    .block_on(Graph::connect(driver_config(&settings)?))
                    .map_err(|e| graph_error("Failed to connect to Neo4j", e))
            },
            &settings.retry,
            "neo4j connect",
        )?;
        info!(uri = %settings.uri, database = %settings.database, "Connected to Neo4j");

        Ok(Self {
            graph,
            runtime,
            settings,
        })
    }

    /// Run statements in one transaction, retrying it whole on transient errors
    fn execute(&self, statements: &[Statement]) -> Result<()> {
        if statements.is_empty() {
            return Ok(());
        }
        with_retry(
            || self.runtime.block_on(self.transaction(statements)),
            &self.settings.retry,
            "neo4j transaction",
        )
    }

    async fn transaction(&self, statements: &[Statement]) -> Result<()> {
        let mut txn = self
            .graph
            .start_txn()
            .await
            .map_err(|e| graph_error("Failed to open transaction", e))?;
        for statement in statements {
            if let Err(e) = txn.run(statement.to_query()).await {
                let error = graph_error("Statement failed", e);
                if let Err(rollback) = txn.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                return Err(error);
            }
        }
        txn.commit()
            .await
            .map_err(|e| graph_error("Commit failed", e))
    }

    fn execute_batched(&self, statements: Vec<Statement>) -> Result<()> {
        for chunk in statements.chunks(STATEMENTS_PER_TRANSACTION) {
            self.execute(chunk)?;
        }
        Ok(())
    }

    fn count(&self, cypher: &str) -> Result<u64> {
        with_retry(
            || self.runtime.block_on(self.count_once(cypher)),
            &self.settings.retry,
            "neo4j count",
        )
    }

    async fn count_once(&self, cypher: &str) -> Result<u64> {
        let mut rows = self
            .graph
            .execute(query(cypher))
            .await
            .map_err(|e| graph_error("Count failed", e))?;
        let row = rows
            .next()
            .await
            .map_err(|e| graph_error("Count failed", e))?
            .ok_or_else(|| FloraError::Graph(format!("No count returned for: {}", cypher)))?;
        let count: i64 = row
            .get("count")
            .map_err(|e| FloraError::Graph(format!("Bad count for {}: {}", cypher, e)))?;
        Ok(count.max(0) as u64)
    }
}

/// Keep identifier characters only; Cypher labels and types cannot be parameters
pub fn sanitize_identifier(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if cleaned.is_empty() || cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", cleaned)
    } else {
        cleaned
    }
}

/// One MERGE statement per distinct label set
pub fn node_statements(nodes: &[NodeUpsert], batch_size: usize) -> Vec<Statement> {
    let mut groups: BTreeMap<Vec<String>, Vec<&NodeUpsert>> = BTreeMap::new();
    for node in nodes {
        let labels = node.labels.iter().map(|l| sanitize_identifier(l)).collect();
        groups.entry(labels).or_default().push(node);
    }

    let mut statements = Vec::new();
    for (labels, group) in groups {
        let set_labels = if labels.is_empty() {
            String::new()
        } else {
            format!(" SET n:{}", labels.join(":"))
        };
        let cypher = format!(
            "UNWIND $rows AS row MERGE (n:{} {{uri: row.uri}}){} SET n += row.properties",
            RESOURCE_LABEL, set_labels
        );
        for batch in group.chunks(batch_size.max(1)) {
            let rows = batch
                .iter()
                .map(|n| {
                    Row::from([
                        ("uri", RowValue::Text(n.uri.clone())),
                        ("properties", RowValue::Properties(n.properties.clone())),
                    ])
                })
                .collect();
            statements.push(Statement {
                cypher: cypher.clone(),
                rows,
            });
        }
    }
    statements
}

/// One MERGE statement per relation type
pub fn edge_statements(edges: &[EdgeUpsert], batch_size: usize) -> Vec<Statement> {
    let mut groups: BTreeMap<String, Vec<&EdgeUpsert>> = BTreeMap::new();
    for edge in edges {
        groups
            .entry(sanitize_identifier(&edge.relation))
            .or_default()
            .push(edge);
    }

    let mut statements = Vec::new();
    for (relation, group) in groups {
        let cypher = format!(
            "UNWIND $rows AS row \
             MATCH (a:{label} {{uri: row.source}}) \
             MATCH (b:{label} {{uri: row.target}}) \
             MERGE (a)-[:{relation}]->(b)",
            label = RESOURCE_LABEL,
            relation = relation
        );
        for batch in group.chunks(batch_size.max(1)) {
            let rows = batch
                .iter()
                .map(|e| {
                    Row::from([
                        ("source", RowValue::Text(e.source.clone())),
                        ("target", RowValue::Text(e.target.clone())),
                    ])
                })
                .collect();
            statements.push(Statement {
                cypher: cypher.clone(),
                rows,
            });
        }
    }
    statements
}

impl GraphStore for Neo4jStore {
    fn name(&self) -> &str {
        &self.settings.uri
    }

    fn prepare(&self) -> Result<()> {
        self.execute(&[Statement::bare(format!(
            "CREATE CONSTRAINT resource_uri IF NOT EXISTS FOR (n:{}) REQUIRE n.uri IS UNIQUE",
            RESOURCE_LABEL
        ))])?;
        debug!("Uniqueness constraint on uri in place");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.execute(&[Statement::bare(format!(
            "MATCH (n:{}) DETACH DELETE n",
            RESOURCE_LABEL
        ))])?;
        info!("Cleared Neo4j graph");
        Ok(())
    }

    fn upsert_nodes(&self, nodes: &[NodeUpsert]) -> Result<()> {
        self.execute_batched(node_statements(nodes, self.settings.batch_size))
    }

    fn upsert_edges(&self, edges: &[EdgeUpsert]) -> Result<()> {
        self.execute_batched(edge_statements(edges, self.settings.batch_size))
    }

    fn counts(&self) -> Result<GraphCounts> {
        Ok(GraphCounts {
            nodes: self.count(&format!(
                "MATCH (n:{}) RETURN count(n) AS count",
                RESOURCE_LABEL
            ))?,
            edges: self.count(&format!(
                "MATCH (:{label})-[r]->(:{label}) RETURN count(r) AS count",
                label = RESOURCE_LABEL
            ))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Taxon", "Taxon")]
    #[case("DbWCVP", "DbWCVP")]
    #[case("has-Area", "hasArea")]
    #[case("8", "_8")]
    #[case("", "_")]
    fn test_sanitize_identifier(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_identifier(input), expected);
    }

    #[test]
    fn test_nodes_grouped_by_label_set() {
        let mut taxon = NodeUpsert::new("urn:taxon/1");
        taxon.labels.insert("Taxon".to_string());
        taxon.labels.insert("DbWCVP".to_string());
        taxon
            .properties
            .insert("name".to_string(), PropertyValue::String("Oxalis".to_string()));
        let bare = NodeUpsert::new("https://www.ipni.org/id#1");

        let statements = node_statements(&[taxon, bare], 100);
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0].cypher,
            "UNWIND $rows AS row MERGE (n:Resource {uri: row.uri}) SET n += row.properties"
        );
        assert_eq!(
            statements[1].cypher,
            "UNWIND $rows AS row MERGE (n:Resource {uri: row.uri}) SET n:DbWCVP:Taxon SET n += row.properties"
        );
        let RowValue::Properties(properties) = &statements[1].rows[0]["properties"] else {
            panic!("expected properties");
        };
        assert_eq!(
            properties.get("name"),
            Some(&PropertyValue::String("Oxalis".to_string()))
        );
        assert_eq!(
            statements[1].rows[0]["uri"],
            RowValue::Text("urn:taxon/1".to_string())
        );
    }

    #[test]
    fn test_edges_batched_per_relation() {
        let edges: Vec<EdgeUpsert> = (0..5)
            .map(|i| EdgeUpsert {
                source: format!("urn:taxon/{}", i),
                relation: "belongsToGenus".to_string(),
                target: "urn:genus/1".to_string(),
            })
            .collect();
        let statements = edge_statements(&edges, 2);
        assert_eq!(statements.len(), 3);
        assert!(statements[0].cypher.contains("MERGE (a)-[:belongsToGenus]->(b)"));
        assert_eq!(statements[2].rows.len(), 1);
        assert_eq!(
            statements[2].rows[0]["source"],
            RowValue::Text("urn:taxon/4".to_string())
        );
    }

    #[rstest]
    #[case("Neo4j error `Neo.TransientError.Transaction.DeadlockDetected`: deadlock", true)]
    #[case("Neo4j error `Neo.TransientError.General.DatabaseUnavailable`: try again", true)]
    #[case("an IO error occurred: Connection reset by peer", true)]
    #[case("connection error", true)]
    #[case("Neo4j error `Neo.ClientError.Statement.SyntaxError`: Invalid input", false)]
    #[case("Neo4j error `Neo.ClientError.Schema.ConstraintValidationFailed`: exists", false)]
    #[case("Neo4j error `Neo.ClientError.Security.Unauthorized`: bad credentials", false)]
    fn test_error_classification(#[case] message: &str, #[case] transient: bool) {
        assert_eq!(is_transient(message), transient);
        let error = graph_error("Statement failed", message);
        assert_eq!(error.is_retryable(), transient);
        assert_eq!(matches!(error, FloraError::Graph(_)), !transient);
    }
}
