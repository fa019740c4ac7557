pub mod query;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use query::{DistributionFlag, Page, ReadStore, Statistics};
pub use sqlite::SqliteStore;
pub use traits::{PageFilter, PersistOutcome, RelationalStore};
