/// Loads a triple archive into a graph store
///
/// `rdf:type` objects become node labels, literal objects become node
/// properties and IRI objects become edges. Chunks are applied one at a time.
use crate::core::pipeline::CancellationFlag;
use crate::graph::archive::ArchiveReader;
use crate::graph::store::{EdgeUpsert, GraphCounts, GraphStore, NodeUpsert, PropertyValue};
use crate::graph::triple::{local_name, Term, Triple, RDF_TYPE};
use crate::utils::progress;
use crate::{FloraError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Delete existing nodes and edges first
    pub clear: bool,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub store: String,
    pub chunks: usize,
    pub triples: u64,
    pub node_upserts: u64,
    pub edge_upserts: u64,
    pub counts: GraphCounts,
    pub interrupted: bool,
}

pub struct GraphImporter<'a> {
    store: &'a dyn GraphStore,
    options: ImportOptions,
}

impl<'a> GraphImporter<'a> {
    pub fn new(store: &'a dyn GraphStore, options: ImportOptions) -> Self {
        Self { store, options }
    }

    pub fn import<P: AsRef<Path>>(&self, archive: P, cancel: &CancellationFlag) -> Result<ImportSummary> {
        let reader = ArchiveReader::open(&archive)?;
        let manifest = reader.manifest();
        info!(
            archive = %archive.as_ref().display(),
            store = self.store.name(),
            chunks = manifest.chunks.len(),
            triples = manifest.total_triples,
            "Importing triples"
        );

        self.store.prepare()?;
        if self.options.clear {
            self.store.clear()?;
        }

        let mut summary = ImportSummary {
            store: self.store.name().to_string(),
            ..Default::default()
        };
        let bar = progress::spinner("chunks", self.options.show_progress);

        let applied = reader.for_each_chunk(|chunk, triples| {
            if cancel.is_cancelled() {
                return Err(FloraError::Cancelled);
            }
            let (nodes, edges) = group_triples(&triples);
            self.store.upsert_nodes(&nodes)?;
            self.store.upsert_edges(&edges)?;
            debug!(chunk = %chunk.name, nodes = nodes.len(), edges = edges.len(), "Chunk applied");

            summary.chunks += 1;
            summary.triples += triples.len() as u64;
            summary.node_upserts += nodes.len() as u64;
            summary.edge_upserts += edges.len() as u64;
            bar.inc(1);
            Ok(())
        });
        bar.finish_and_clear();
        match applied {
            Ok(()) => {}
            Err(FloraError::Cancelled) => summary.interrupted = true,
            Err(err) => return Err(err),
        }

        if summary.interrupted {
            warn!(chunks = summary.chunks, "Graph import cancelled between chunks");
        }
        summary.counts = self.store.counts()?;
        info!(
            nodes = summary.counts.nodes,
            edges = summary.counts.edges,
            "Graph import finished"
        );
        Ok(summary)
    }
}

/// Fold a chunk into node and edge upserts. Every IRI object gets a node so
/// edges always have both endpoints.
pub fn group_triples(triples: &[Triple]) -> (Vec<NodeUpsert>, Vec<EdgeUpsert>) {
    let mut nodes: BTreeMap<&str, NodeUpsert> = BTreeMap::new();
    let mut edges = BTreeSet::new();

    for triple in triples {
        let subject = nodes
            .entry(triple.subject.as_str())
            .or_insert_with(|| NodeUpsert::new(triple.subject.clone()));

        match &triple.object {
            Term::Iri(iri) if triple.predicate == RDF_TYPE => {
                subject.labels.insert(local_name(iri).to_string());
            }
            Term::Literal(literal) => {
                subject.properties.insert(
                    local_name(&triple.predicate).to_string(),
                    PropertyValue::from(literal),
                );
            }
            Term::Iri(iri) => {
                edges.insert(EdgeUpsert {
                    source: triple.subject.clone(),
                    relation: local_name(&triple.predicate).to_string(),
                    target: iri.clone(),
                });
                nodes
                    .entry(iri.as_str())
                    .or_insert_with(|| NodeUpsert::new(iri.clone()));
            }
        }
    }

    (nodes.into_values().collect(), edges.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::archive::write_archive;
    use crate::graph::store::SqliteGraphStore;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const BASE: &str = "https://example.org/wcvp";

    fn triples() -> Vec<Triple> {
        vec![
            Triple::new(
                format!("{}/taxon/1", BASE),
                RDF_TYPE,
                Term::iri(format!("{}/node#Taxon", BASE)),
            ),
            Triple::new(
                format!("{}/taxon/1", BASE),
                format!("{}/relation#name", BASE),
                Term::string("Picramnia polyantha"),
            ),
            Triple::new(
                format!("{}/taxon/1", BASE),
                format!("{}/relation#occursIn", BASE),
                Term::iri("http://rs.tdwg.org/wgsrpd/level1/8"),
            ),
            Triple::new(
                format!("{}/distribution/1", BASE),
                format!("{}/relation#introduced", BASE),
                Term::boolean(false),
            ),
        ]
    }

    #[test]
    fn test_group_triples() {
        let (nodes, edges) = group_triples(&triples());
        assert_eq!(nodes.len(), 3);
        let taxon = nodes.iter().find(|n| n.uri.ends_with("/taxon/1")).unwrap();
        assert!(taxon.labels.contains("Taxon"));
        assert_eq!(
            taxon.properties.get("name"),
            Some(&PropertyValue::String("Picramnia polyantha".to_string()))
        );
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relation, "occursIn");
    }

    #[test]
    fn test_reimport_keeps_counts() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("triples.tar.gz");
        write_archive(triples().into_iter().map(Ok), &archive, BASE, 2, |_| {}).unwrap();

        let store = SqliteGraphStore::memory().unwrap();
        let importer = GraphImporter::new(&store, ImportOptions::default());
        let first = importer.import(&archive, &CancellationFlag::new()).unwrap();
        let second = importer.import(&archive, &CancellationFlag::new()).unwrap();

        assert_eq!(first.chunks, 2);
        assert_eq!(first.triples, 4);
        assert_eq!(first.counts, GraphCounts { nodes: 3, edges: 1 });
        assert_eq!(first.counts, second.counts);
    }

    #[test]
    fn test_cancelled_import_applies_nothing() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("triples.tar.gz");
        write_archive(triples().into_iter().map(Ok), &archive, BASE, 10, |_| {}).unwrap();

        let store = SqliteGraphStore::memory().unwrap();
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let summary = GraphImporter::new(&store, ImportOptions::default())
            .import(&archive, &cancel)
            .unwrap();
        assert!(summary.interrupted);
        assert_eq!(summary.counts, GraphCounts::default());
    }

    /// Raises the cancellation flag once the first chunk's edges land
    struct CancelAfterFirstChunk {
        inner: SqliteGraphStore,
        cancel: CancellationFlag,
    }

    impl GraphStore for CancelAfterFirstChunk {
        fn name(&self) -> &str {
            self.inner.name()
        }
        fn prepare(&self) -> Result<()> {
            self.inner.prepare()
        }
        fn clear(&self) -> Result<()> {
            self.inner.clear()
        }
        fn upsert_nodes(&self, nodes: &[NodeUpsert]) -> Result<()> {
            self.inner.upsert_nodes(nodes)
        }
        fn upsert_edges(&self, edges: &[EdgeUpsert]) -> Result<()> {
            self.inner.upsert_edges(edges)?;
            self.cancel.cancel();
            Ok(())
        }
        fn counts(&self) -> Result<GraphCounts> {
            self.inner.counts()
        }
    }

    #[test]
    fn test_cancel_between_chunks_keeps_first_chunk() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("triples.tar.gz");
        write_archive(triples().into_iter().map(Ok), &archive, BASE, 2, |_| {}).unwrap();

        let cancel = CancellationFlag::new();
        let store = CancelAfterFirstChunk {
            inner: SqliteGraphStore::memory().unwrap(),
            cancel: cancel.clone(),
        };
        let summary = GraphImporter::new(&store, ImportOptions::default())
            .import(&archive, &cancel)
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.chunks, 1);
        assert_eq!(summary.triples, 2);
        // taxon node with its label and name, no edge yet
        assert_eq!(summary.counts, GraphCounts { nodes: 1, edges: 0 });

        // a fresh import completes the graph
        let complete = GraphImporter::new(&store.inner, ImportOptions::default())
            .import(&archive, &CancellationFlag::new())
            .unwrap();
        assert!(!complete.interrupted);
        assert_eq!(complete.counts, GraphCounts { nodes: 3, edges: 1 });
    }
}
