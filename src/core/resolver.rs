/// Get-or-create engine: maps natural keys to stable entity identifiers
///
/// The key map is seeded from the store when the resolver is opened and is
/// dropped with it, so a restarted run re-resolves instead of assuming an
/// empty store. Each key owns a slot; creating a key holds only that slot's
/// lock, so lookups of other keys never wait on a persist. Parents are
/// always resolved before a slot is locked.
use crate::bio::entity::{
    AreaRecord, DistributionRecord, Entity, EntityId, EntityKind, FamilyRecord, GenusRecord,
    InfraspeciesRecord, NaturalKey, PublicationRecord, SpeciesRecord, TaxonRecord,
};
use crate::bio::geography::{GeoLevel, GeoUnit};
use crate::bio::taxonomy::{compose_name, TaxonRank, TaxonStatus};
use crate::core::normalizer::{DistributionFlags, NormalizedRecord, PublicationFields};
use crate::resilience::{with_retry, RetryPolicy};
use crate::storage::traits::{PersistOutcome, RelationalStore};
use crate::Result;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

const KINDS: usize = EntityKind::ALL.len();

/// Identifier of one natural key; `None` until its entity is persisted
type KeySlot = Arc<Mutex<Option<EntityId>>>;

/// Identifier returned by a get-or-create call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub id: EntityId,
    pub created: bool,
}

/// Entities touched by one names row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRow {
    pub taxon_id: EntityId,
    /// Identifiers of the row's geographic levels, continent first
    pub area_ids: Vec<EntityId>,
    pub distribution_id: Option<EntityId>,
}

/// Per-kind counters for the lifetime of one resolver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverCounts {
    pub created: BTreeMap<EntityKind, u64>,
    pub reused: BTreeMap<EntityKind, u64>,
    pub status_reconciled: u64,
    /// Areas moved from a placeholder (or stale) parent to a real one
    pub areas_reparented: u64,
}

pub struct EntityResolver {
    store: Arc<dyn RelationalStore>,
    keys: DashMap<NaturalKey, KeySlot>,
    next_ids: [AtomicI64; KINDS],
    created: [AtomicU64; KINDS],
    reused: [AtomicU64; KINDS],
    /// Taxa whose status may still be upgraded
    provisional: DashMap<EntityId, TaxonStatus>,
    plant_names: DashMap<i64, EntityId>,
    /// Areas hanging under a placeholder parent
    orphans: DashSet<EntityId>,
    reconciled: AtomicU64,
    reparented: AtomicU64,
    sentinel: String,
    retry: RetryPolicy,
}

impl EntityResolver {
    /// Open a resolver over `store`, seeding keys and id counters from the
    /// persisted entities
    pub fn open(store: Arc<dyn RelationalStore>, sentinel: &str) -> Result<Self> {
        let resolver = Self {
            store,
            keys: DashMap::new(),
            next_ids: std::array::from_fn(|_| AtomicI64::new(0)),
            created: std::array::from_fn(|_| AtomicU64::new(0)),
            reused: std::array::from_fn(|_| AtomicU64::new(0)),
            provisional: DashMap::new(),
            plant_names: DashMap::new(),
            orphans: DashSet::new(),
            reconciled: AtomicU64::new(0),
            reparented: AtomicU64::new(0),
            sentinel: sentinel.to_string(),
            retry: RetryPolicy::for_database(),
        };
        resolver.seed()?;
        Ok(resolver)
    }

    fn seed(&self) -> Result<()> {
        for kind in EntityKind::ALL {
            let max = self.store.max_id(kind)?;
            self.next_ids[kind as usize].store(max, Ordering::SeqCst);
            for (key, id) in self.store.load_keys(kind)? {
                self.keys.insert(key, Arc::new(Mutex::new(Some(id))));
            }
        }
        for (id, status) in self.store.provisional_taxa()? {
            self.provisional.insert(id, status);
        }
        for id in self.store.areas_under_placeholder(&self.placeholder_code())? {
            self.orphans.insert(id);
        }
        info!(keys = self.keys.len(), "Resolver seeded from store");
        Ok(())
    }

    pub fn store(&self) -> &Arc<dyn RelationalStore> {
        &self.store
    }

    pub fn known_keys(&self) -> usize {
        self.keys.len()
    }

    /// Return the identifier holding the entity's natural key, creating and
    /// persisting the entity when the key is new
    pub fn get_or_create(&self, entity: Entity) -> Result<Resolution> {
        let kind = entity.kind();
        let key = entity.natural_key();

        let slot = self.slot(key);
        let mut resolved = slot.lock();
        if let Some(id) = *resolved {
            self.reused[kind as usize].fetch_add(1, Ordering::Relaxed);
            return Ok(Resolution { id, created: false });
        }

        // A failed persist leaves the slot empty for the next caller
        let id = self.next_ids[kind as usize].fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = with_retry(
            || self.store.persist(id, &entity),
            &self.retry,
            "persist entity",
        )?;
        *resolved = Some(outcome.id());
        match outcome {
            PersistOutcome::Created(id) => {
                self.created[kind as usize].fetch_add(1, Ordering::Relaxed);
                Ok(Resolution { id, created: true })
            }
            PersistOutcome::Existing(existing) => {
                debug!(kind = %kind, minted = id, existing, "Key already persisted by another writer");
                self.reused[kind as usize].fetch_add(1, Ordering::Relaxed);
                Ok(Resolution {
                    id: existing,
                    created: false,
                })
            }
        }
    }

    /// Slot for `key`, inserted empty when missing. The map guard is released
    /// before the caller locks the slot.
    fn slot(&self, key: NaturalKey) -> KeySlot {
        if let Some(slot) = self.keys.get(&key) {
            return Arc::clone(slot.value());
        }
        Arc::clone(self.keys.entry(key).or_default().value())
    }

    pub fn resolve_family(&self, name: &str) -> Result<EntityId> {
        Ok(self
            .get_or_create(Entity::Family(FamilyRecord {
                name: name.to_string(),
            }))?
            .id)
    }

    /// A genus keeps the family of the first row that created it
    pub fn resolve_genus(&self, name: &str, family: &str) -> Result<EntityId> {
        let key = NaturalKey::taxonomic(EntityKind::Genus, TaxonRank::Genus, name, "");
        if let Some(id) = self.lookup(&key) {
            return Ok(id);
        }
        let family_id = self.resolve_family(family)?;
        Ok(self
            .get_or_create(Entity::Genus(GenusRecord {
                name: name.to_string(),
                family_id,
            }))?
            .id)
    }

    pub fn resolve_species(&self, genus: &str, epithet: &str, family: &str) -> Result<EntityId> {
        let name = compose_name(genus, Some(epithet), None, None);
        let key = NaturalKey::taxonomic(EntityKind::Species, TaxonRank::Species, &name, "");
        if let Some(id) = self.lookup(&key) {
            return Ok(id);
        }
        let genus_id = self.resolve_genus(genus, family)?;
        Ok(self
            .get_or_create(Entity::Species(SpeciesRecord {
                name,
                epithet: epithet.to_string(),
                genus_id,
            }))?
            .id)
    }

    pub fn resolve_infraspecies(
        &self,
        genus: &str,
        species: &str,
        rank: TaxonRank,
        epithet: &str,
        family: &str,
    ) -> Result<EntityId> {
        let name = compose_name(genus, Some(species), Some(rank), Some(epithet));
        let key = NaturalKey::taxonomic(EntityKind::Infraspecies, rank, &name, "");
        if let Some(id) = self.lookup(&key) {
            return Ok(id);
        }
        let species_id = self.resolve_species(genus, species, family)?;
        Ok(self
            .get_or_create(Entity::Infraspecies(InfraspeciesRecord {
                name,
                rank,
                epithet: epithet.to_string(),
                species_id,
            }))?
            .id)
    }

    pub fn resolve_publication(&self, fields: &PublicationFields) -> Result<EntityId> {
        Ok(self
            .get_or_create(Entity::Publication(PublicationRecord {
                place: fields.place.clone(),
                volume_and_page: fields.volume_and_page.clone(),
                year: fields.year,
                author: fields.author.clone(),
            }))?
            .id)
    }

    /// Resolve the taxon of a normalized row, parents first
    pub fn resolve_taxon(&self, record: &NormalizedRecord) -> Result<EntityId> {
        let family_id = self.resolve_family(&record.family)?;
        let genus_id = self.resolve_genus(&record.genus, &record.family)?;
        let species_id = match &record.species {
            Some(epithet) => Some(self.resolve_species(&record.genus, epithet, &record.family)?),
            None => None,
        };
        let infraspecies_id = match (&record.species, &record.infraspecies) {
            (Some(species), Some(infra)) => Some(self.resolve_infraspecies(
                &record.genus,
                species,
                record.infraspecific_rank.unwrap_or(TaxonRank::Unranked),
                infra,
                &record.family,
            )?),
            _ => None,
        };
        let publication_id = match &record.publication {
            Some(fields) => Some(self.resolve_publication(fields)?),
            None => None,
        };

        let resolution = self.get_or_create(Entity::Taxon(TaxonRecord {
            plant_name_id: record.plant_name_id,
            rank: record.rank,
            status: record.status,
            name: record.taxon_name.clone(),
            authorship: record.taxon_authors.clone(),
            family_id,
            genus_id,
            species_id,
            infraspecies_id,
            publication_id,
            ipni_id: record.ipni_id.clone(),
            powo_id: record.powo_id.clone(),
            accepted_plant_name_id: record.accepted_plant_name_id,
            parent_plant_name_id: record.parent_plant_name_id,
            basionym_plant_name_id: record.basionym_plant_name_id,
            lifeform: record.lifeform.clone(),
            climate: record.climate.clone(),
            geographic_note: record.geographic_note.clone(),
            remarks: record.remarks.clone(),
            reviewed: record.reviewed,
            homotypic_synonym: record.homotypic_synonym,
            tax_id: None,
        }))?;

        if resolution.created {
            if record.status.is_provisional() {
                self.provisional.insert(resolution.id, record.status);
            }
        } else {
            self.reconcile_status(resolution.id, record.status)?;
        }

        if let Some(plant_name_id) = record.plant_name_id {
            self.link_plant_name(plant_name_id, resolution.id)?;
        }
        Ok(resolution.id)
    }

    /// Upgrade a provisional status; the only mutation of a committed taxon
    fn reconcile_status(&self, id: EntityId, status: TaxonStatus) -> Result<()> {
        if !status.is_definitive() {
            return Ok(());
        }
        if let Some((_, previous)) = self.provisional.remove(&id) {
            self.store.update_taxon_status(id, status)?;
            self.reconciled.fetch_add(1, Ordering::Relaxed);
            debug!(taxon = id, from = %previous, to = %status, "Taxon status reconciled");
        }
        Ok(())
    }

    fn link_plant_name(&self, plant_name_id: i64, taxon_id: EntityId) -> Result<()> {
        if let Entry::Vacant(entry) = self.plant_names.entry(plant_name_id) {
            self.store.link_plant_name(plant_name_id, taxon_id)?;
            entry.insert(taxon_id);
        }
        Ok(())
    }

    /// Taxon recorded for a source plant_name_id, in this run or persisted
    pub fn taxon_for_plant_name(&self, plant_name_id: i64) -> Result<Option<EntityId>> {
        if let Some(id) = self.plant_names.get(&plant_name_id) {
            return Ok(Some(*id));
        }
        let found = self.store.taxon_for_plant_name(plant_name_id)?;
        if let Some(id) = found {
            self.plant_names.insert(plant_name_id, id);
        }
        Ok(found)
    }

    /// Resolve a row's geographic levels. A level whose parent level is
    /// absent from the row hangs under a placeholder parent.
    pub fn resolve_geography(&self, units: &[GeoUnit]) -> Result<Vec<EntityId>> {
        units.iter().map(|unit| self.resolve_unit(unit, units)).collect()
    }

    fn resolve_unit(&self, unit: &GeoUnit, row_units: &[GeoUnit]) -> Result<EntityId> {
        let key = NaturalKey::geographic(unit.level, &unit.code);
        let row_parent = unit
            .level
            .parent()
            .and_then(|level| row_units.iter().find(|u| u.level == level));

        if let Some(id) = self.lookup(&key) {
            // A row naming the parent level repairs a placeholder parent
            if let Some(parent) = row_parent {
                if self.orphans.contains(&id) {
                    let parent_id = self.resolve_unit(parent, row_units)?;
                    self.adopt(id, parent_id)?;
                }
            }
            return Ok(id);
        }

        let parent_id = match unit.level.parent() {
            None => None,
            Some(level) => Some(match row_parent {
                Some(parent) => self.resolve_unit(parent, row_units)?,
                None => self.resolve_placeholder(level)?,
            }),
        };
        let resolution = self.get_or_create(Entity::GeographicArea(AreaRecord {
            level: unit.level,
            code: unit.code.clone(),
            name: unit.name.clone(),
            parent_id,
        }))?;
        if resolution.created
            && parent_id.is_some()
            && row_parent.is_none()
            && unit.code != self.placeholder_code()
        {
            self.orphans.insert(resolution.id);
        }
        Ok(resolution.id)
    }

    fn resolve_placeholder(&self, level: GeoLevel) -> Result<EntityId> {
        let unit = GeoUnit {
            level,
            code: self.placeholder_code(),
            name: self.sentinel.clone(),
        };
        self.resolve_unit(&unit, &[])
    }

    fn placeholder_code(&self) -> String {
        self.sentinel.to_uppercase()
    }

    fn adopt(&self, id: EntityId, parent_id: EntityId) -> Result<()> {
        if self.store.update_area_parent(id, parent_id)? {
            self.reparented.fetch_add(1, Ordering::Relaxed);
            debug!(area = id, parent = parent_id, "Area moved to its real parent");
        }
        self.orphans.remove(&id);
        Ok(())
    }

    /// Resolve a unit of the WGSRPD reference tables. The reference parent
    /// replaces whatever parent an earlier row gave the area.
    pub fn resolve_reference_area(
        &self,
        level: GeoLevel,
        code: &str,
        name: &str,
        parent_id: Option<EntityId>,
    ) -> Result<EntityId> {
        let resolution = self.get_or_create(Entity::GeographicArea(AreaRecord {
            level,
            code: code.to_string(),
            name: name.to_string(),
            parent_id,
        }))?;
        match parent_id {
            Some(parent_id) if !resolution.created => self.adopt(resolution.id, parent_id)?,
            _ => {
                self.orphans.remove(&resolution.id);
            }
        }
        Ok(resolution.id)
    }

    /// First-seen flags win for a (taxon, area) pair
    pub fn resolve_distribution(
        &self,
        taxon_id: EntityId,
        area_id: EntityId,
        flags: DistributionFlags,
    ) -> Result<EntityId> {
        Ok(self
            .get_or_create(Entity::Distribution(DistributionRecord {
                taxon_id,
                area_id,
                introduced: flags.introduced,
                extinct: flags.extinct,
                location_doubtful: flags.location_doubtful,
            }))?
            .id)
    }

    /// Resolve everything a names row carries; the distribution links the
    /// taxon to the most specific level present
    pub fn resolve_row(&self, record: &NormalizedRecord) -> Result<ResolvedRow> {
        let taxon_id = self.resolve_taxon(record)?;
        let area_ids = self.resolve_geography(&record.geography)?;
        let distribution_id = match area_ids.last() {
            Some(&area_id) => Some(self.resolve_distribution(taxon_id, area_id, record.flags)?),
            None => None,
        };
        Ok(ResolvedRow {
            taxon_id,
            area_ids,
            distribution_id,
        })
    }

    pub fn counts(&self) -> ResolverCounts {
        let mut counts = ResolverCounts {
            status_reconciled: self.reconciled.load(Ordering::Relaxed),
            areas_reparented: self.reparented.load(Ordering::Relaxed),
            ..Default::default()
        };
        for kind in EntityKind::ALL {
            let created = self.created[kind as usize].load(Ordering::Relaxed);
            let reused = self.reused[kind as usize].load(Ordering::Relaxed);
            if created > 0 {
                counts.created.insert(kind, created);
            }
            if reused > 0 {
                counts.reused.insert(kind, reused);
            }
        }
        counts
    }

    fn lookup(&self, key: &NaturalKey) -> Option<EntityId> {
        let slot = self.keys.get(key).map(|slot| Arc::clone(slot.value()))?;
        let id = *slot.lock();
        id
    }
}
