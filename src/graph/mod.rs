/// Relational store → RDF triples → property graph
pub mod archive;
pub mod importer;
pub mod neo4j;
pub mod projector;
pub mod store;
pub mod triple;

pub use archive::{ArchiveManifest, ArchiveReader, ArchiveWriter};
pub use importer::{GraphImporter, ImportOptions, ImportSummary};
pub use projector::{ProjectionOptions, Projector, Vocabulary};
pub use store::{GraphCounts, GraphStore, SqliteGraphStore};
pub use triple::{Term, Triple};

use crate::core::config::{ExportConfig, GraphConfig, NetworkConfig};
use crate::core::paths;
use crate::report::RunSummary;
use crate::storage::traits::RelationalStore;
use crate::utils::progress;
use crate::Result;
use std::path::Path;
use tracing::info;

/// Project the whole store into a triple archive at `output`
pub fn export_archive(
    store: &dyn RelationalStore,
    config: &ExportConfig,
    output: &Path,
    show_progress: bool,
) -> Result<ArchiveManifest> {
    let projector = Projector::new(
        store,
        Vocabulary::new(&config.base_uri),
        ProjectionOptions {
            page_size: config.page_size,
            accepted_only: config.accepted_only,
        },
    );
    info!(
        output = %output.display(),
        accepted_only = config.accepted_only,
        "Exporting triples"
    );

    let bar = progress::spinner("triples", show_progress);
    let manifest = archive::write_archive(
        projector.triples(),
        output,
        projector.vocabulary().base(),
        config.max_triples_per_chunk,
        |n| {
            if n % 10_000 == 0 {
                bar.set_position(n);
            }
        },
    );
    bar.finish_and_clear();
    manifest
}

/// Archive written by an export and the run summary describing it
#[derive(Debug, Clone)]
pub struct ExportRun {
    pub manifest: ArchiveManifest,
    pub summary: RunSummary,
}

/// `export_archive` with timing and the emitted triple count in a summary
pub fn run_export(
    store: &dyn RelationalStore,
    config: &ExportConfig,
    output: &Path,
    show_progress: bool,
) -> Result<ExportRun> {
    let mut summary = RunSummary::start();
    let manifest = export_archive(store, config, output, show_progress)?;
    summary.triples_emitted = manifest.total_triples;
    summary.finish();
    info!(
        triples = summary.triples_emitted,
        chunks = manifest.chunks.len(),
        "Export finished"
    );
    Ok(ExportRun { manifest, summary })
}

/// Neo4j when an endpoint is configured, otherwise the embedded graph file
pub fn open_graph_store(graph: &GraphConfig, network: &NetworkConfig) -> Result<Box<dyn GraphStore>> {
    match &graph.endpoint {
        Some(endpoint) => Ok(Box::new(neo4j::Neo4jStore::connect(neo4j::Neo4jSettings {
            uri: endpoint.clone(),
            database: graph.database.clone(),
            user: graph.user.clone(),
            password: graph.password.clone(),
            retry: network.retry_policy(),
            batch_size: graph.batch_size,
        })?)),
        None => {
            let path = graph
                .embedded_path
                .as_ref()
                .map(Into::into)
                .unwrap_or_else(paths::default_graph_path);
            Ok(Box::new(SqliteGraphStore::open(path)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::storage::sqlite::SqliteStore;
    use tempfile::TempDir;

    #[test]
    fn test_export_of_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::memory().unwrap();
        let manifest = export_archive(
            &store,
            &Config::default().export,
            &dir.path().join("empty.tar.gz"),
            false,
        )
        .unwrap();
        assert_eq!(manifest.total_triples, 0);
    }

    #[test]
    fn test_export_summary_counts_triples() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::memory().unwrap();
        let resolver =
            crate::core::resolver::EntityResolver::open(std::sync::Arc::new(store.clone()), "Unknown")
                .unwrap();
        resolver.resolve_family("Picramniaceae").unwrap();

        let run = run_export(
            &store,
            &Config::default().export,
            &dir.path().join("triples.tar.gz"),
            false,
        )
        .unwrap();
        assert!(run.manifest.total_triples > 0);
        assert_eq!(run.summary.triples_emitted, run.manifest.total_triples);
        assert!(run.summary.finished_at.is_some());

        let text = crate::report::text::generate_text_report(&run.summary, 10);
        assert!(text.contains(&format!("Triples emitted: {}", run.manifest.total_triples)));
        assert!(!text.contains("Rows"));
    }

    #[test]
    fn test_embedded_store_when_no_endpoint() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.graph.embedded_path = Some(dir.path().join("graph.db").display().to_string());
        let store = open_graph_store(&config.graph, &config.network).unwrap();
        assert!(store.name().starts_with("sqlite:"));
    }
}
