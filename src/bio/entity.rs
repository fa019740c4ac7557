/// Resolved entity records and their natural keys
use crate::bio::geography::GeoLevel;
use crate::bio::taxonomy::{TaxonRank, TaxonStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier assigned by the resolver at first creation
pub type EntityId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Family,
    Genus,
    Species,
    Infraspecies,
    Publication,
    Taxon,
    GeographicArea,
    Distribution,
}

impl EntityKind {
    /// Kinds in dependency order: every kind only references kinds before it
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Family,
        EntityKind::Genus,
        EntityKind::Species,
        EntityKind::Infraspecies,
        EntityKind::Publication,
        EntityKind::Taxon,
        EntityKind::GeographicArea,
        EntityKind::Distribution,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Family => "family",
            EntityKind::Genus => "genus",
            EntityKind::Species => "species",
            EntityKind::Infraspecies => "infraspecies",
            EntityKind::Publication => "publication",
            EntityKind::Taxon => "taxon",
            EntityKind::GeographicArea => "geographic_area",
            EntityKind::Distribution => "distribution",
        }
    }

    /// Path segment used in entity IRIs
    pub fn slug(&self) -> &'static str {
        match self {
            EntityKind::GeographicArea => "area",
            other => other.table(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Family => "Family",
            EntityKind::Genus => "Genus",
            EntityKind::Species => "Species",
            EntityKind::Infraspecies => "Infraspecies",
            EntityKind::Publication => "Publication",
            EntityKind::Taxon => "Taxon",
            EntityKind::GeographicArea => "GeographicArea",
            EntityKind::Distribution => "Distribution",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Kind-specific natural key. At most one entity exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NaturalKey {
    /// Family, genus, species, infraspecies and taxon names
    Taxonomic {
        kind: EntityKind,
        rank: TaxonRank,
        name: String,
        authorship: String,
    },
    Geographic {
        level: GeoLevel,
        code: String,
    },
    Publication {
        place: String,
        volume_and_page: String,
        year: Option<i32>,
        author: String,
    },
    Distribution {
        taxon: EntityId,
        area: EntityId,
    },
}

impl NaturalKey {
    pub fn taxonomic(kind: EntityKind, rank: TaxonRank, name: &str, authorship: &str) -> Self {
        NaturalKey::Taxonomic {
            kind,
            rank,
            name: name.to_string(),
            authorship: authorship.to_string(),
        }
    }

    pub fn geographic(level: GeoLevel, code: &str) -> Self {
        NaturalKey::Geographic {
            level,
            code: code.to_string(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            NaturalKey::Taxonomic { kind, .. } => *kind,
            NaturalKey::Geographic { .. } => EntityKind::GeographicArea,
            NaturalKey::Publication { .. } => EntityKind::Publication,
            NaturalKey::Distribution { .. } => EntityKind::Distribution,
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NaturalKey::Taxonomic {
                kind,
                rank,
                name,
                authorship,
            } => write!(f, "{}({}, {:?}, {:?})", kind, rank, name, authorship),
            NaturalKey::Geographic { level, code } => write!(f, "{}({})", level, code),
            NaturalKey::Publication {
                place,
                volume_and_page,
                year,
                ..
            } => write!(f, "publication({:?}, {:?}, {:?})", place, volume_and_page, year),
            NaturalKey::Distribution { taxon, area } => {
                write!(f, "distribution(taxon={}, area={})", taxon, area)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyRecord {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenusRecord {
    pub name: String,
    pub family_id: EntityId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesRecord {
    /// Binomial
    pub name: String,
    pub epithet: String,
    pub genus_id: EntityId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfraspeciesRecord {
    /// Trinomial
    pub name: String,
    pub rank: TaxonRank,
    pub epithet: String,
    pub species_id: EntityId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub place: String,
    pub volume_and_page: String,
    pub year: Option<i32>,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonRecord {
    pub plant_name_id: Option<i64>,
    pub rank: TaxonRank,
    pub status: TaxonStatus,
    pub name: String,
    pub authorship: String,
    pub family_id: EntityId,
    pub genus_id: EntityId,
    pub species_id: Option<EntityId>,
    pub infraspecies_id: Option<EntityId>,
    pub publication_id: Option<EntityId>,
    pub ipni_id: Option<String>,
    pub powo_id: Option<String>,
    pub accepted_plant_name_id: Option<i64>,
    pub parent_plant_name_id: Option<i64>,
    pub basionym_plant_name_id: Option<i64>,
    pub lifeform: Option<String>,
    pub climate: Option<String>,
    pub geographic_note: Option<String>,
    pub remarks: Option<String>,
    pub reviewed: bool,
    pub homotypic_synonym: bool,
    /// NCBI Taxonomy identifier, filled by the NCBI mapping step
    pub tax_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaRecord {
    pub level: GeoLevel,
    pub code: String,
    pub name: String,
    pub parent_id: Option<EntityId>,
}

/// Taxon occurrence in a geographic unit. The three flags are independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRecord {
    pub taxon_id: EntityId,
    pub area_id: EntityId,
    pub introduced: bool,
    pub extinct: bool,
    pub location_doubtful: bool,
}

/// An entity ready to be persisted under a resolver-minted identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Entity {
    Family(FamilyRecord),
    Genus(GenusRecord),
    Species(SpeciesRecord),
    Infraspecies(InfraspeciesRecord),
    Publication(PublicationRecord),
    Taxon(TaxonRecord),
    GeographicArea(AreaRecord),
    Distribution(DistributionRecord),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Family(_) => EntityKind::Family,
            Entity::Genus(_) => EntityKind::Genus,
            Entity::Species(_) => EntityKind::Species,
            Entity::Infraspecies(_) => EntityKind::Infraspecies,
            Entity::Publication(_) => EntityKind::Publication,
            Entity::Taxon(_) => EntityKind::Taxon,
            Entity::GeographicArea(_) => EntityKind::GeographicArea,
            Entity::Distribution(_) => EntityKind::Distribution,
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        match self {
            Entity::Family(f) => {
                NaturalKey::taxonomic(EntityKind::Family, TaxonRank::Family, &f.name, "")
            }
            Entity::Genus(g) => {
                NaturalKey::taxonomic(EntityKind::Genus, TaxonRank::Genus, &g.name, "")
            }
            Entity::Species(s) => {
                NaturalKey::taxonomic(EntityKind::Species, TaxonRank::Species, &s.name, "")
            }
            Entity::Infraspecies(i) => {
                NaturalKey::taxonomic(EntityKind::Infraspecies, i.rank, &i.name, "")
            }
            Entity::Publication(p) => NaturalKey::Publication {
                place: p.place.clone(),
                volume_and_page: p.volume_and_page.clone(),
                year: p.year,
                author: p.author.clone(),
            },
            Entity::Taxon(t) => {
                NaturalKey::taxonomic(EntityKind::Taxon, t.rank, &t.name, &t.authorship)
            }
            Entity::GeographicArea(a) => NaturalKey::geographic(a.level, &a.code),
            Entity::Distribution(d) => NaturalKey::Distribution {
                taxon: d.taxon_id,
                area: d.area_id,
            },
        }
    }
}
