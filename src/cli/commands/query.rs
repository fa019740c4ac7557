use crate::cli::output::{create_standard_table, header_cell, print_json};
use crate::cli::{Session, StoreArgs};
use crate::storage::query::{AreaView, DistributionFlag, DistributionView, Page, ReadStore, TaxonView};
use crate::FloraError;
use clap::{Args, Subcommand};
use comfy_table::Cell;

#[derive(Args)]
pub struct QueryArgs {
    #[command(subcommand)]
    pub command: QueryCommands,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Rows to skip
    #[arg(long, default_value = "0", global = true)]
    pub offset: u64,

    /// Maximum rows returned
    #[arg(long, default_value = "100", global = true)]
    pub limit: u64,
}

#[derive(Subcommand)]
pub enum QueryCommands {
    /// Taxon by store identifier
    Taxon { id: i64 },

    /// Taxon by WCVP plant_name_id
    PlantName { plant_name_id: i64 },

    /// Taxa of a family
    Family { name: String },

    /// Distributions with a flag set (or unset with --unset)
    Flag {
        /// introduced, extinct or location-doubtful
        flag: DistributionFlag,
        #[arg(long)]
        unset: bool,
    },

    /// Geographic units whose name contains the pattern
    Area { pattern: String },

    /// Taxa occurring in a named geographic unit
    InArea { name: String },

    /// Taxa below a taxon in the taxonomy tree (run build-tree first)
    Descendants { id: i64 },
}

pub fn run(session: &Session, args: QueryArgs) -> anyhow::Result<()> {
    let store = session.open_store(&args.store)?;
    let page = Page {
        offset: args.offset,
        limit: args.limit,
    };

    match args.command {
        QueryCommands::Taxon { id } => {
            let taxon = store
                .taxon(id)?
                .ok_or_else(|| FloraError::NotFound(format!("taxon {}", id)))?;
            show_taxa(session, &[taxon])
        }
        QueryCommands::PlantName { plant_name_id } => {
            let taxon = store
                .taxon_by_plant_name_id(plant_name_id)?
                .ok_or_else(|| FloraError::NotFound(format!("plant_name_id {}", plant_name_id)))?;
            show_taxa(session, &[taxon])
        }
        QueryCommands::Family { name } => show_taxa(session, &store.taxa_by_family(&name, page)?),
        QueryCommands::Flag { flag, unset } => {
            show_distributions(session, &store.distributions_by_flag(flag, !unset, page)?)
        }
        QueryCommands::Area { pattern } => show_areas(session, &store.areas_by_name(&pattern)?),
        QueryCommands::InArea { name } => show_taxa(session, &store.taxa_in_area(&name, page)?),
        QueryCommands::Descendants { id } => show_taxa(session, &store.descendants(id, page)?),
    }
}

fn show_taxa(session: &Session, taxa: &[TaxonView]) -> anyhow::Result<()> {
    if session.json {
        return print_json(&taxa);
    }
    let mut table = create_standard_table();
    table.set_header(vec![
        header_cell("ID"),
        header_cell("plant_name_id"),
        header_cell("Name"),
        header_cell("Authorship"),
        header_cell("Rank"),
        header_cell("Status"),
        header_cell("Family"),
    ]);
    for t in taxa {
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(t.plant_name_id.map(|p| p.to_string()).unwrap_or_default()),
            Cell::new(&t.name),
            Cell::new(&t.authorship),
            Cell::new(&t.rank),
            Cell::new(&t.status),
            Cell::new(&t.family),
        ]);
    }
    println!("{}", table);
    Ok(())
}

fn show_distributions(session: &Session, rows: &[DistributionView]) -> anyhow::Result<()> {
    if session.json {
        return print_json(&rows);
    }
    let mut table = create_standard_table();
    table.set_header(vec![
        header_cell("Taxon"),
        header_cell("Area"),
        header_cell("Level"),
        header_cell("Introduced"),
        header_cell("Extinct"),
        header_cell("Doubtful"),
    ]);
    for d in rows {
        table.add_row(vec![
            Cell::new(&d.taxon_name),
            Cell::new(&d.area.name),
            Cell::new(&d.area.level),
            Cell::new(d.introduced),
            Cell::new(d.extinct),
            Cell::new(d.location_doubtful),
        ]);
    }
    println!("{}", table);
    Ok(())
}

fn show_areas(session: &Session, areas: &[AreaView]) -> anyhow::Result<()> {
    if session.json {
        return print_json(&areas);
    }
    let mut table = create_standard_table();
    table.set_header(vec![
        header_cell("ID"),
        header_cell("Level"),
        header_cell("Code"),
        header_cell("Name"),
    ]);
    for a in areas {
        table.add_row(vec![
            Cell::new(a.id),
            Cell::new(&a.level),
            Cell::new(&a.code),
            Cell::new(&a.name),
        ]);
    }
    println!("{}", table);
    Ok(())
}
