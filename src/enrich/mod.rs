//! Enrichment of a populated store from external references
pub mod ncbi;
pub mod tree;
pub mod wgsrpd;

pub use ncbi::{map_tax_ids, MappingSummary};
pub use tree::{rebuild_taxon_tree, TreeSummary};
pub use wgsrpd::{run_reference_import, ReferenceSummary};
