pub mod commands;
pub mod output;

use crate::core::config::{self, Config};
use crate::core::paths;
use crate::storage::sqlite::SqliteStore;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "florakb",
    version,
    about = "Plant checklist knowledge base: relational ingest, RDF export, graph import",
    long_about = "florakb ingests the World Checklist of Vascular Plants into a relational store, \
                  deduplicating every family, genus, species, taxon and geographic unit, then \
                  projects the store into a chunked RDF archive that can be loaded into a \
                  property graph."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity: -v debug, -vv trace; overrides RUST_LOG and FLORAKB_LOG
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Number of threads to use (0 = all available)
    #[arg(short = 'j', long, default_value = "0", global = true)]
    pub threads: usize,

    /// Configuration file (defaults to $FLORAKB_HOME/config.toml when present)
    #[arg(long, env = "FLORAKB_CONFIG", global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the relational schema (idempotent)
    CreateSchema(StoreArgs),

    /// Drop every table of the relational schema
    DropSchema(commands::schema::DropSchemaArgs),

    /// Download and unpack the WCVP dataset
    Download(commands::download::DownloadArgs),

    /// Import a names file (optionally carrying distribution columns)
    Import(commands::import::ImportArgs),

    /// Import a distribution file referencing taxa by plant_name_id
    ImportDistributions(commands::import::ImportArgs),

    /// Import the WGSRPD continent, region and area tables
    ImportWgsrpd(commands::enrich::ImportWgsrpdArgs),

    /// Attach NCBI Taxonomy identifiers to taxa by name
    MapNcbi(commands::enrich::MapNcbiArgs),

    /// Rebuild the nested-set taxonomy tree
    BuildTree(StoreArgs),

    /// Export the store as a chunked N-Triples archive
    Export(commands::export::ExportArgs),

    /// Load a triple archive into a graph store
    GraphImport(commands::graph::GraphImportArgs),

    /// Read-only lookups against the store
    Query(commands::query::QueryArgs),

    /// Entity and distribution flag counts
    Stats(StoreArgs),

    /// Manage the configuration file
    Config(commands::config::ConfigArgs),
}

/// Connection options shared by every command touching the store
#[derive(Args, Clone, Debug, Default)]
pub struct StoreArgs {
    /// Store connection string: sqlite://<path>, sqlite::memory: or a file path
    #[arg(long = "db", env = "FLORAKB_DB", value_name = "CONNECTION")]
    pub connection: Option<String>,
}

/// Global state handed to every command
pub struct Session {
    pub config: Config,
    pub config_path: PathBuf,
    pub json: bool,
    pub show_progress: bool,
}

impl Session {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let (config, config_path) = match &cli.config {
            Some(path) => (
                config::load_config(path)
                    .with_context(|| format!("Loading config {}", path.display()))?,
                path.clone(),
            ),
            None => {
                let path = paths::default_config_path();
                let config = if path.exists() {
                    config::load_config(&path)
                        .with_context(|| format!("Loading config {}", path.display()))?
                } else {
                    Config::default()
                };
                (config, path)
            }
        };

        Ok(Self {
            config,
            config_path,
            json: cli.json,
            show_progress: !cli.json && cli.verbose == 0,
        })
    }

    /// Open the relational store, the `--db` flag taking precedence
    pub fn open_store(&self, args: &StoreArgs) -> anyhow::Result<SqliteStore> {
        let mut store_config = self.config.store.clone();
        if let Some(connection) = &args.connection {
            store_config.connection = Some(connection.clone());
        }
        let store = SqliteStore::from_config(&store_config)?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_import() {
        let cli = Cli::try_parse_from([
            "florakb",
            "-v",
            "import",
            "wcvp_names.csv",
            "--db",
            "sqlite::memory:",
            "--batch-size",
            "50",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Import(args) => {
                assert_eq!(args.input, PathBuf::from("wcvp_names.csv"));
                assert_eq!(args.store.connection.as_deref(), Some("sqlite::memory:"));
                assert_eq!(args.batch_size, Some(50));
            }
            _ => panic!("expected import"),
        }
    }

    #[test]
    fn test_parse_enrichment_commands() {
        let cli =
            Cli::try_parse_from(["florakb", "map-ncbi", "--names", "names.dmp"]).unwrap();
        match cli.command {
            Commands::MapNcbi(args) => {
                assert_eq!(args.names, Some(PathBuf::from("names.dmp")));
                assert!(!args.force);
            }
            _ => panic!("expected map-ncbi"),
        }

        let cli = Cli::try_parse_from(["florakb", "import-wgsrpd", "--dir", "wgsrpd"]).unwrap();
        assert!(matches!(cli.command, Commands::ImportWgsrpd(args) if args.dir == Some(PathBuf::from("wgsrpd"))));

        let cli = Cli::try_parse_from(["florakb", "build-tree", "--db", "sqlite::memory:"]).unwrap();
        assert!(matches!(cli.command, Commands::BuildTree(_)));
    }
}
