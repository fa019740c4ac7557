//! Store → triple archive → property graph
mod common;

use common::TestStore;
use florakb::bio::entity::EntityKind;
use florakb::core::config::{Config, ExportConfig};
use florakb::core::pipeline::CancellationFlag;
use florakb::graph::{
    export_archive, ArchiveReader, GraphCounts, GraphImporter, GraphStore, ImportOptions,
    SqliteGraphStore, Triple, Vocabulary,
};
use florakb::graph::store::{EdgeUpsert, NodeUpsert, PropertyValue};
use florakb::storage::query::ReadStore;
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::path::Path;

fn export_config() -> ExportConfig {
    ExportConfig {
        max_triples_per_chunk: 25,
        ..Config::default().export
    }
}

fn read_triples(path: &Path) -> BTreeSet<Triple> {
    let reader = ArchiveReader::open(path).unwrap();
    let mut all = BTreeSet::new();
    reader
        .for_each_chunk(|_, triples| {
            all.extend(triples);
            Ok(())
        })
        .unwrap();
    all
}

fn populated() -> TestStore {
    let t = TestStore::new();
    t.import_names();
    t.import_distributions();
    t
}

#[test]
fn test_export_is_deterministic_across_stores() {
    let first = populated();
    let second = populated();
    let config = export_config();

    let a = first.path("a.tar.gz");
    let b = second.path("b.tar.gz");
    let manifest_a = export_archive(&first.store, &config, &a, false).unwrap();
    let manifest_b = export_archive(&second.store, &config, &b, false).unwrap();

    assert!(manifest_a.chunks.len() > 1);
    assert_eq!(manifest_a.total_triples, manifest_b.total_triples);
    assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    assert_eq!(read_triples(&a), read_triples(&b));
}

#[test]
fn test_reexport_of_unchanged_store_matches() {
    let t = populated();
    let config = export_config();
    let a = t.path("a.tar.gz");
    let b = t.path("b.tar.gz");
    export_archive(&t.store, &config, &a, false).unwrap();
    export_archive(&t.store, &config, &b, false).unwrap();
    assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
}

#[test]
fn test_graph_import_is_idempotent() {
    let t = populated();
    let archive = t.path("triples.tar.gz");
    let manifest = export_archive(&t.store, &export_config(), &archive, false).unwrap();

    let graph = SqliteGraphStore::open(t.path("graph.db")).unwrap();
    let importer = GraphImporter::new(&graph, ImportOptions::default());

    let first = importer.import(&archive, &CancellationFlag::new()).unwrap();
    assert_eq!(first.triples, manifest.total_triples);
    assert_eq!(first.chunks, manifest.chunks.len());
    assert!(!first.interrupted);

    let second = importer.import(&archive, &CancellationFlag::new()).unwrap();
    assert_eq!(second.counts, first.counts);
    assert_eq!(graph.counts().unwrap(), first.counts);
}

#[test]
fn test_graph_contains_distribution_edges() {
    let t = populated();
    let archive = t.path("triples.tar.gz");
    let config = export_config();
    export_archive(&t.store, &config, &archive, false).unwrap();

    let graph = SqliteGraphStore::memory().unwrap();
    GraphImporter::new(&graph, ImportOptions::default())
        .import(&archive, &CancellationFlag::new())
        .unwrap();

    let vocab = Vocabulary::new(&config.base_uri);
    let taxon = t.store.taxon_by_plant_name_id(2549024).unwrap().unwrap();
    let taxon_iri = vocab.entity(EntityKind::Taxon, taxon.id);

    let node = graph.node(&taxon_iri).unwrap().expect("taxon node");
    assert!(node.labels.contains("Taxon"));
    assert_eq!(
        node.properties.get("name"),
        Some(&PropertyValue::String("Picramnia polyantha".to_string()))
    );

    // names file row plus the distribution file row
    let areas = graph.neighbours(&taxon_iri, "occursIn").unwrap();
    assert_eq!(areas.len(), 2);
    for area in &areas {
        let area_node = graph.node(area).unwrap().expect("area node");
        assert!(area_node.labels.contains("DbTdwgLocation"));
    }
}

#[test]
fn test_accepted_only_drops_synonyms() {
    let t = populated();
    let config = ExportConfig {
        accepted_only: true,
        ..export_config()
    };
    let archive = t.path("accepted.tar.gz");
    export_archive(&t.store, &config, &archive, false).unwrap();

    let vocab = Vocabulary::new(&config.base_uri);
    let synonym = t.store.taxon_by_plant_name_id(2401300).unwrap().unwrap();
    let accepted = t.store.taxon_by_plant_name_id(2401234).unwrap().unwrap();
    let synonym_iri = vocab.entity(EntityKind::Taxon, synonym.id);
    let accepted_iri = vocab.entity(EntityKind::Taxon, accepted.id);

    let triples = read_triples(&archive);
    assert!(triples.iter().all(|t| t.subject != synonym_iri));
    assert!(triples.iter().any(|t| t.subject == accepted_iri));
}

/// Graph store that raises the cancellation flag once the first chunk is written
struct CancelAfterFirstChunk {
    inner: SqliteGraphStore,
    cancel: CancellationFlag,
}

impl GraphStore for CancelAfterFirstChunk {
    fn name(&self) -> &str {
        self.inner.name()
    }
    fn prepare(&self) -> florakb::Result<()> {
        self.inner.prepare()
    }
    fn clear(&self) -> florakb::Result<()> {
        self.inner.clear()
    }
    fn upsert_nodes(&self, nodes: &[NodeUpsert]) -> florakb::Result<()> {
        self.inner.upsert_nodes(nodes)
    }
    fn upsert_edges(&self, edges: &[EdgeUpsert]) -> florakb::Result<()> {
        self.inner.upsert_edges(edges)?;
        self.cancel.cancel();
        Ok(())
    }
    fn counts(&self) -> florakb::Result<GraphCounts> {
        self.inner.counts()
    }
}

#[test]
fn test_cancelled_import_stops_after_first_chunk_and_resumes() {
    let t = populated();
    let archive = t.path("triples.tar.gz");
    let manifest = export_archive(&t.store, &export_config(), &archive, false).unwrap();
    assert!(manifest.chunks.len() > 2);

    let full = SqliteGraphStore::memory().unwrap();
    let expected = GraphImporter::new(&full, ImportOptions::default())
        .import(&archive, &CancellationFlag::new())
        .unwrap()
        .counts;

    let cancel = CancellationFlag::new();
    let store = CancelAfterFirstChunk {
        inner: SqliteGraphStore::open(t.path("graph.db")).unwrap(),
        cancel: cancel.clone(),
    };
    let partial = GraphImporter::new(&store, ImportOptions::default())
        .import(&archive, &cancel)
        .unwrap();
    assert!(partial.interrupted);
    assert_eq!(partial.chunks, 1);
    assert_eq!(partial.triples, manifest.chunks[0].triples);
    assert_eq!(store.counts().unwrap(), partial.counts);
    assert!(partial.counts.nodes + partial.counts.edges < expected.nodes + expected.edges);

    let resumed = GraphImporter::new(&store.inner, ImportOptions::default())
        .import(&archive, &CancellationFlag::new())
        .unwrap();
    assert!(!resumed.interrupted);
    assert_eq!(resumed.chunks, manifest.chunks.len());
    assert_eq!(resumed.counts, expected);
}
