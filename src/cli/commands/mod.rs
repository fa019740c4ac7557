pub mod config;
pub mod download;
pub mod enrich;
pub mod export;
pub mod graph;
pub mod import;
pub mod query;
pub mod schema;
pub mod stats;
