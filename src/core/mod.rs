pub mod config;
pub mod normalizer;
pub mod paths;
pub mod pipeline;
pub mod resolver;

pub use config::Config;
pub use normalizer::{NormalizedRecord, Normalizer, Outcome};
pub use pipeline::{CancellationFlag, Pipeline};
pub use resolver::EntityResolver;
