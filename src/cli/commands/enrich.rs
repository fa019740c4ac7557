use crate::cli::output::{format_number, print_json, success, tree_item};
use crate::cli::{Session, StoreArgs};
use crate::core::paths;
use crate::download::{extract_zip_entry, Downloader};
use crate::enrich::{self, ncbi, wgsrpd};
use crate::storage::traits::RelationalStore;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args)]
pub struct MapNcbiArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Use this names.dmp instead of downloading the NCBI dump
    #[arg(long, value_name = "FILE")]
    pub names: Option<PathBuf>,

    /// Download directory (defaults to $FLORAKB_DATA_DIR/ncbi)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Download again even if the dump exists
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args)]
pub struct ImportWgsrpdArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Directory holding tblLevel1.txt to tblLevel3.txt; downloaded when absent
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Download again even if the tables exist
    #[arg(short, long)]
    pub force: bool,
}

fn data_dir(session: &Session, output: Option<PathBuf>, sub: &str) -> PathBuf {
    output.unwrap_or_else(|| {
        session
            .config
            .download
            .data_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(paths::florakb_data_dir)
            .join(sub)
    })
}

pub fn map_ncbi(session: &Session, args: MapNcbiArgs) -> anyhow::Result<()> {
    let names = match args.names {
        Some(path) => path,
        None => {
            let dir = data_dir(session, args.output, "ncbi");
            let url = &session.config.download.taxonomy_url;
            let archive = dir.join(url.rsplit('/').next().unwrap_or("taxdmp.zip"));
            let outcome = Downloader::new(&session.config.network)?
                .with_progress(session.show_progress)
                .fetch(url, &archive, args.force)?;
            extract_zip_entry(&outcome.path, ncbi::NAMES_FILE, &dir)?
        }
    };

    let store = session.open_store(&args.store)?;
    let summary = enrich::map_tax_ids(&store, &names)?;

    if session.json {
        return print_json(&summary);
    }
    success(&format!("Mapped NCBI tax_ids from {}", names.display()));
    tree_item(false, "Taxa", Some(&format_number(summary.taxa)));
    tree_item(false, "Scientific name", Some(&format_number(summary.by_scientific_name)));
    tree_item(false, "Other name", Some(&format_number(summary.by_other_name)));
    tree_item(false, "Inherited", Some(&format_number(summary.inherited)));
    tree_item(false, "Unmatched", Some(&format_number(summary.unmatched)));
    tree_item(true, "Updated", Some(&format_number(summary.updated)));
    Ok(())
}

pub fn import_wgsrpd(session: &Session, args: ImportWgsrpdArgs) -> anyhow::Result<()> {
    let dir = match args.dir {
        Some(dir) => dir,
        None => {
            let dir = data_dir(session, None, "wgsrpd");
            let downloader =
                Downloader::new(&session.config.network)?.with_progress(session.show_progress);
            wgsrpd::fetch_tables(&downloader, &session.config.download.wgsrpd_url, &dir, args.force)?;
            dir
        }
    };
    let units = wgsrpd::read_tables(&dir)?;

    let store: Arc<dyn RelationalStore> = Arc::new(session.open_store(&args.store)?);
    let summary =
        enrich::run_reference_import(store, &session.config.ingest.unknown_sentinel, &units)?;

    if session.json {
        return print_json(&summary);
    }
    success(&format!("Imported WGSRPD reference from {}", dir.display()));
    tree_item(false, "Continents", Some(&format_number(summary.continents)));
    tree_item(false, "Regions", Some(&format_number(summary.regions)));
    tree_item(false, "Areas", Some(&format_number(summary.areas)));
    tree_item(false, "Created", Some(&format_number(summary.created)));
    tree_item(false, "Reparented", Some(&format_number(summary.reparented)));
    tree_item(true, "Skipped", Some(&format_number(summary.skipped)));
    Ok(())
}

pub fn build_tree(session: &Session, args: StoreArgs) -> anyhow::Result<()> {
    let store = session.open_store(&args)?;
    let summary = enrich::rebuild_taxon_tree(&store)?;

    if session.json {
        return print_json(&summary);
    }
    success("Taxonomy tree rebuilt");
    tree_item(false, "Nodes", Some(&format_number(summary.nodes)));
    tree_item(false, "Roots", Some(&format_number(summary.roots)));
    tree_item(false, "Max depth", Some(&format_number(summary.max_depth as u64)));
    tree_item(true, "Cycles broken", Some(&format_number(summary.cycles_broken)));
    Ok(())
}
