use crate::cli::output::{print_json, print_run_summary, success};
use crate::cli::{Session, StoreArgs};
use crate::core::pipeline::{CancellationFlag, Pipeline};
use crate::report::{self, Format, RunSummary};
use anyhow::Context;
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Args)]
pub struct ImportArgs {
    /// Delimited input file (.gz accepted)
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Column delimiter (defaults to the configured one, '|')
    #[arg(short, long)]
    pub delimiter: Option<char>,

    /// Rows per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Required columns, comma separated
    #[arg(long, value_delimiter = ',')]
    pub required: Option<Vec<String>>,

    /// Write the full run report here (.json for JSON, text otherwise)
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Skipped rows listed in the terminal summary
    #[arg(long, default_value = "20")]
    pub max_skips: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Names,
    Distributions,
}

pub fn run(session: &Session, args: ImportArgs, kind: InputKind) -> anyhow::Result<()> {
    let mut config = session.config.clone();
    if let Some(delimiter) = args.delimiter {
        config.ingest.delimiter = delimiter;
    }
    if let Some(batch_size) = args.batch_size {
        config.ingest.batch_size = batch_size;
    }
    if let Some(required) = &args.required {
        config.ingest.required_fields = required.clone();
    }
    if kind == InputKind::Distributions && args.required.is_none() {
        config.ingest.required_fields = vec!["plant_name_id".to_string()];
    }

    let store = session.open_store(&args.store)?;
    let pipeline = Pipeline::new(Arc::new(store), config).with_progress(session.show_progress);
    let cancel = CancellationFlag::new();

    let summary = match kind {
        InputKind::Names => pipeline.run_file(&args.input, &cancel),
        InputKind::Distributions => pipeline.run_distribution_file(&args.input, &cancel),
    }
    .with_context(|| format!("Importing {}", args.input.display()))?;

    if let Some(path) = &args.report {
        write_report(&summary, path)?;
    }

    if session.json {
        print_json(&summary)?;
    } else {
        print_run_summary(&summary, args.max_skips);
        if let Some(path) = &args.report {
            success(&format!("Report written to {}", path.display()));
        }
    }
    Ok(())
}

/// Render a run summary to `path`; `.json` selects JSON
pub(crate) fn write_report(summary: &RunSummary, path: &Path) -> anyhow::Result<()> {
    let format = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Format::Json,
        _ => Format::Text,
    };
    let rendered = report::render(summary, format, usize::MAX)?;
    std::fs::write(path, rendered).with_context(|| format!("Writing {}", path.display()))?;
    Ok(())
}
