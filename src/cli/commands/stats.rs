use crate::cli::output::{print_json, print_statistics};
use crate::cli::{Session, StoreArgs};
use crate::storage::query::ReadStore;
use crate::storage::traits::RelationalStore;
use crate::FloraError;

pub fn run(session: &Session, args: StoreArgs) -> anyhow::Result<()> {
    let store = session.open_store(&args)?;
    if !store.schema_exists()? {
        return Err(FloraError::Schema(
            "No schema found; run create-schema or import first".to_string(),
        )
        .into());
    }
    let stats = store.statistics()?;
    if session.json {
        print_json(&stats)
    } else {
        print_statistics(&stats);
        Ok(())
    }
}
