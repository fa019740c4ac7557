use clap::Parser;
use colored::*;
use florakb::cli::commands::{self, import::InputKind};
use florakb::cli::{Cli, Commands, Session};
use florakb::utils::logging::filter_directive;
use florakb::FloraError;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    let directive = filter_directive(
        cli.verbose,
        std::env::var("RUST_LOG").ok().as_deref(),
        std::env::var("FLORAKB_LOG").ok().as_deref(),
    );
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(exit_code(&e));
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<FloraError>() {
        Some(FloraError::Config(_)) => 2,
        Some(FloraError::Io(_)) | Some(FloraError::NotFound(_)) => 3,
        Some(FloraError::Parse(_))
        | Some(FloraError::Csv(_))
        | Some(FloraError::TypeMismatch { .. }) => 4,
        Some(FloraError::Sqlite(_))
        | Some(FloraError::Schema(_))
        | Some(FloraError::Conflict(_)) => 5,
        Some(FloraError::Network { .. })
        | Some(FloraError::Graph(_))
        | Some(FloraError::Archive(_)) => 6,
        _ => 1,
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let session = Session::load(&cli)?;

    // -j overrides the configured normalization threads
    let threads = match cli.threads {
        0 => session.config.ingest.threads,
        n => n,
    };
    let workers = florakb::utils::parallel::init_normalization_pool(threads);
    if cli.verbose > 0 {
        eprintln!("Using {} threads", workers);
    }

    match cli.command {
        Commands::CreateSchema(args) => commands::schema::create(&session, args),
        Commands::DropSchema(args) => commands::schema::drop(&session, args),
        Commands::Download(args) => commands::download::run(&session, args),
        Commands::Import(args) => commands::import::run(&session, args, InputKind::Names),
        Commands::ImportDistributions(args) => {
            commands::import::run(&session, args, InputKind::Distributions)
        }
        Commands::ImportWgsrpd(args) => commands::enrich::import_wgsrpd(&session, args),
        Commands::MapNcbi(args) => commands::enrich::map_ncbi(&session, args),
        Commands::BuildTree(args) => commands::enrich::build_tree(&session, args),
        Commands::Export(args) => commands::export::run(&session, args),
        Commands::GraphImport(args) => commands::graph::run(&session, args),
        Commands::Query(args) => commands::query::run(&session, args),
        Commands::Stats(args) => commands::stats::run(&session, args),
        Commands::Config(args) => commands::config::run(&session, args),
    }
}
