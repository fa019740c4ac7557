/// Storage trait hierarchy for the relational entity store
///
/// The resolver owns identity; a store only persists what it is handed and
/// answers key lookups. Backends other than SQLite plug in here.
use crate::bio::entity::{Entity, EntityId, EntityKind, NaturalKey};
use crate::bio::taxonomy::TaxonStatus;
use crate::{FloraError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Result of persisting an entity under a resolver-minted identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The row was written under the given identifier
    Created(EntityId),
    /// Another writer already holds the natural key under this identifier
    Existing(EntityId),
}

impl PersistOutcome {
    pub fn id(&self) -> EntityId {
        match self {
            PersistOutcome::Created(id) | PersistOutcome::Existing(id) => *id,
        }
    }
}

/// Restricts which rows a page walk returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageFilter {
    /// Only accepted taxa, and only distributions of accepted taxa
    pub accepted_only: bool,
}

/// Taxon columns read by the NCBI mapping pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonName {
    pub id: EntityId,
    pub name: String,
    pub plant_name_id: Option<i64>,
    pub accepted_plant_name_id: Option<i64>,
    pub tax_id: Option<i64>,
}

/// Nested-set position of one taxon. Descendants of a node are exactly the
/// nodes with `lft` and `rgt` strictly inside its interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub taxon_id: EntityId,
    pub parent_id: Option<EntityId>,
    pub lft: i64,
    pub rgt: i64,
    pub depth: u32,
}

/// Schema management and entity persistence
pub trait RelationalStore: Send + Sync {
    /// Create tables and indexes; idempotent
    fn create_schema(&self) -> Result<()>;

    /// Drop all tables; idempotent
    fn drop_schema(&self) -> Result<()>;

    fn schema_exists(&self) -> Result<bool>;

    /// Plain insert; surfaces constraint violations as errors
    fn insert(&self, id: EntityId, entity: &Entity) -> Result<()>;

    /// Identifier of the persisted entity holding `key`
    fn find_id(&self, key: &NaturalKey) -> Result<Option<EntityId>>;

    /// Highest identifier in use for `kind` (0 when empty)
    fn max_id(&self, kind: EntityKind) -> Result<EntityId>;

    /// Every persisted natural key of `kind`, used to seed the resolver
    fn load_keys(&self, kind: EntityKind) -> Result<Vec<(NaturalKey, EntityId)>>;

    /// Taxa whose status may still be upgraded by a later row
    fn provisional_taxa(&self) -> Result<Vec<(EntityId, TaxonStatus)>>;

    fn update_taxon_status(&self, id: EntityId, status: TaxonStatus) -> Result<()>;

    /// Record that a source plant_name_id denotes a taxon; first link wins
    fn link_plant_name(&self, plant_name_id: i64, taxon_id: EntityId) -> Result<()>;

    fn taxon_for_plant_name(&self, plant_name_id: i64) -> Result<Option<EntityId>>;

    /// Move an area under `parent_id`; false when it already sits there
    fn update_area_parent(&self, id: EntityId, parent_id: EntityId) -> Result<bool>;

    /// Areas whose parent is the placeholder unit with `code`
    fn areas_under_placeholder(&self, code: &str) -> Result<Vec<EntityId>>;

    /// Bulk plant_name_id lookup; unknown identifiers are absent from the map
    fn taxa_for_plant_names(&self, plant_name_ids: &[i64]) -> Result<HashMap<i64, EntityId>>;

    /// Entities of `kind` with id greater than `after`, ascending, at most `limit`
    fn page(
        &self,
        kind: EntityKind,
        after: EntityId,
        limit: usize,
        filter: PageFilter,
    ) -> Result<Vec<(EntityId, Entity)>>;

    /// Group subsequent writes; a no-op for stores without transactions
    fn begin_batch(&self) -> Result<()> {
        Ok(())
    }

    fn commit_batch(&self) -> Result<()> {
        Ok(())
    }

    /// Discard writes made since `begin_batch`
    fn rollback_batch(&self) -> Result<()> {
        Ok(())
    }

    /// Idempotent persist: a constraint violation is settled by re-fetching the
    /// row that already holds the natural key
    fn persist(&self, id: EntityId, entity: &Entity) -> Result<PersistOutcome> {
        match self.insert(id, entity) {
            Ok(()) => Ok(PersistOutcome::Created(id)),
            Err(err) if err.is_constraint_violation() => {
                let key = entity.natural_key();
                debug!(%key, "Constraint violation on insert, re-fetching");
                match self.find_id(&key)? {
                    Some(existing) => Ok(PersistOutcome::Existing(existing)),
                    None => Err(FloraError::Conflict(format!(
                        "{} {}: {} and no row holds the key",
                        entity.kind(),
                        id,
                        err
                    ))),
                }
            }
            Err(err) => Err(err),
        }
    }
}

/// Whole-table passes over persisted taxa: NCBI mapping and the taxonomy tree
pub trait TaxonomyStore: Send + Sync {
    /// Every taxon, ascending by id
    fn taxon_names(&self) -> Result<Vec<TaxonName>>;

    /// Write NCBI identifiers in one transaction; returns rows changed
    fn set_tax_ids(&self, assignments: &[(EntityId, i64)]) -> Result<usize>;

    /// Each taxon with the taxon its parent_plant_name_id resolves to
    fn taxon_parents(&self) -> Result<Vec<(EntityId, Option<EntityId>)>>;

    /// Swap the stored tree for `nodes` in one transaction
    fn replace_taxon_tree(&self, nodes: &[TreeNode]) -> Result<()>;
}
