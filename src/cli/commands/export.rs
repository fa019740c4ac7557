use crate::cli::output::{format_number, format_size, print_json, success, tree_item};
use crate::cli::{Session, StoreArgs};
use crate::core::paths;
use crate::cli::commands::import::write_report;
use crate::graph;
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Archive path (defaults to $FLORAKB_DATA_DIR/triples.tar.gz)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Base URI for entity IRIs
    #[arg(long)]
    pub base_uri: Option<String>,

    /// Triples per chunk file
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Only accepted taxa and their distributions
    #[arg(long)]
    pub accepted_only: bool,

    /// Write the run report here (.json for JSON, text otherwise)
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

pub fn run(session: &Session, args: ExportArgs) -> anyhow::Result<()> {
    let mut config = session.config.export.clone();
    if let Some(base_uri) = args.base_uri {
        config.base_uri = base_uri;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.max_triples_per_chunk = chunk_size;
    }
    config.accepted_only |= args.accepted_only;

    let output = args
        .output
        .or_else(|| config.output.as_ref().map(PathBuf::from))
        .unwrap_or_else(paths::default_export_path);

    let store = session.open_store(&args.store)?;
    let run = graph::run_export(&store, &config, &output, session.show_progress)?;
    let manifest = &run.manifest;

    if let Some(path) = &args.report {
        write_report(&run.summary, path)?;
    }

    if session.json {
        return print_json(manifest);
    }
    success(&format!("Exported to {}", output.display()));
    tree_item(false, "Chunks", Some(&format_number(manifest.chunks.len() as u64)));
    tree_item(false, "Triples", Some(&format_number(run.summary.triples_emitted)));
    let size = std::fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
    tree_item(true, "Size", Some(&format_size(size)));
    if let Some(path) = &args.report {
        success(&format!("Report written to {}", path.display()));
    }
    Ok(())
}
