pub mod checklist;
pub mod entity;
pub mod geography;
pub mod taxonomy;

pub use checklist::{RawRow, RowReader};
pub use entity::{Entity, EntityId, EntityKind, NaturalKey};
pub use geography::GeoLevel;
pub use taxonomy::{TaxonRank, TaxonStatus};
