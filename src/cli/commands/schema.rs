use crate::cli::output::{success, warning};
use crate::cli::{Session, StoreArgs};
use crate::storage::traits::RelationalStore;
use clap::Args;

#[derive(Args)]
pub struct DropSchemaArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Confirm that every table and row should be deleted
    #[arg(long)]
    pub yes: bool,
}

pub fn create(session: &Session, args: StoreArgs) -> anyhow::Result<()> {
    let store = session.open_store(&args)?;
    store.create_schema()?;
    success("Schema ready");
    Ok(())
}

pub fn drop(session: &Session, args: DropSchemaArgs) -> anyhow::Result<()> {
    if !args.yes {
        warning("drop-schema deletes all stored entities; pass --yes to confirm");
        return Ok(());
    }
    let store = session.open_store(&args.store)?;
    store.drop_schema()?;
    success("Schema dropped");
    Ok(())
}
