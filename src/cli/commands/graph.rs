use crate::cli::output::{print_import_summary, print_json};
use crate::cli::Session;
use crate::core::paths;
use crate::core::pipeline::CancellationFlag;
use crate::graph::{self, GraphImporter, ImportOptions};
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct GraphImportArgs {
    /// Triple archive (defaults to $FLORAKB_DATA_DIR/triples.tar.gz)
    #[arg(value_name = "ARCHIVE")]
    pub archive: Option<PathBuf>,

    /// Neo4j Bolt URI (bolt:// or neo4j://); the embedded graph file is used when unset
    #[arg(long, env = "NEO4J_URI")]
    pub uri: Option<String>,

    #[arg(long, env = "NEO4J_USER")]
    pub user: Option<String>,

    #[arg(long, env = "NEO4J_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Neo4j database name
    #[arg(long)]
    pub database: Option<String>,

    /// Embedded graph file
    #[arg(long, value_name = "FILE")]
    pub graph_db: Option<PathBuf>,

    /// Delete existing nodes and edges before importing
    #[arg(long)]
    pub clear: bool,
}

pub fn run(session: &Session, args: GraphImportArgs) -> anyhow::Result<()> {
    let mut config = session.config.graph.clone();
    if args.uri.is_some() {
        config.endpoint = args.uri;
    }
    if args.user.is_some() {
        config.user = args.user;
    }
    if args.password.is_some() {
        config.password = args.password;
    }
    if let Some(database) = args.database {
        config.database = database;
    }
    if let Some(path) = args.graph_db {
        config.embedded_path = Some(path.display().to_string());
    }

    let archive = args.archive.unwrap_or_else(paths::default_export_path);
    let store = graph::open_graph_store(&config, &session.config.network)?;
    let importer = GraphImporter::new(
        store.as_ref(),
        ImportOptions {
            clear: args.clear,
            show_progress: session.show_progress,
        },
    );
    let summary = importer.import(&archive, &CancellationFlag::new())?;

    if session.json {
        print_json(&summary)
    } else {
        print_import_summary(&summary);
        Ok(())
    }
}
