use crate::cli::output::{format_size, print_json, success, tree_item};
use crate::cli::Session;
use crate::core::paths;
use crate::download::Downloader;
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct DownloadArgs {
    /// Dataset URL (defaults to the configured WCVP archive)
    #[arg(long)]
    pub url: Option<String>,

    /// Target directory (defaults to $FLORAKB_DATA_DIR)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Download again even if the file exists
    #[arg(short, long)]
    pub force: bool,
}

pub fn run(session: &Session, args: DownloadArgs) -> anyhow::Result<()> {
    let mut config = session.config.download.clone();
    if let Some(url) = args.url {
        config.url = url;
    }
    let dir = args
        .output
        .or_else(|| config.data_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(paths::florakb_data_dir);

    let outcome = Downloader::new(&session.config.network)?
        .with_progress(session.show_progress)
        .fetch_dataset(&config, &dir, args.force)?;

    if session.json {
        return print_json(&outcome);
    }
    if outcome.reused {
        success(&format!("Already present: {}", outcome.path.display()));
    } else {
        success(&format!("Downloaded {}", outcome.path.display()));
    }
    tree_item(false, "Size", Some(&format_size(outcome.bytes)));
    tree_item(outcome.extracted.is_empty(), "SHA-256", Some(&outcome.sha256));
    for (i, file) in outcome.extracted.iter().enumerate() {
        let last = i + 1 == outcome.extracted.len();
        tree_item(last, "Extracted", Some(&file.display().to_string()));
    }
    Ok(())
}
