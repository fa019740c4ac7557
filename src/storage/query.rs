/// Read-only lookups over the populated store
///
/// This is the surface a query-serving layer calls; it never exposes
/// connections or table layout.
use crate::bio::entity::{EntityId, EntityKind};
use crate::storage::sqlite::{level_from_sql, SqliteStore};
use crate::{FloraError, Result};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionFlag {
    Introduced,
    Extinct,
    LocationDoubtful,
}

impl DistributionFlag {
    pub const ALL: [DistributionFlag; 3] = [
        DistributionFlag::Introduced,
        DistributionFlag::Extinct,
        DistributionFlag::LocationDoubtful,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            DistributionFlag::Introduced => "introduced",
            DistributionFlag::Extinct => "extinct",
            DistributionFlag::LocationDoubtful => "location_doubtful",
        }
    }
}

impl FromStr for DistributionFlag {
    type Err = FloraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "introduced" => Ok(DistributionFlag::Introduced),
            "extinct" => Ok(DistributionFlag::Extinct),
            "location_doubtful" | "doubtful" => Ok(DistributionFlag::LocationDoubtful),
            other => Err(FloraError::Parse(format!("Unknown distribution flag: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationView {
    pub place: String,
    pub volume_and_page: String,
    pub year: Option<i32>,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonView {
    pub id: EntityId,
    pub plant_name_id: Option<i64>,
    pub name: String,
    pub authorship: String,
    pub rank: String,
    pub status: String,
    pub family: String,
    pub genus: String,
    pub species: Option<String>,
    pub ipni_id: Option<String>,
    pub powo_id: Option<String>,
    pub tax_id: Option<i64>,
    pub accepted_plant_name_id: Option<i64>,
    pub lifeform: Option<String>,
    pub climate: Option<String>,
    pub publication: Option<PublicationView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaView {
    pub id: EntityId,
    pub level: String,
    pub code: String,
    pub name: String,
    pub parent_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionView {
    pub taxon_id: EntityId,
    pub taxon_name: String,
    pub area: AreaView,
    pub introduced: bool,
    pub extinct: bool,
    pub location_doubtful: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub entities: BTreeMap<EntityKind, u64>,
    pub introduced: u64,
    pub extinct: u64,
    pub location_doubtful: u64,
}

/// Read contract over the relational store
pub trait ReadStore {
    fn taxon(&self, id: EntityId) -> Result<Option<TaxonView>>;
    fn taxon_by_plant_name_id(&self, plant_name_id: i64) -> Result<Option<TaxonView>>;
    fn taxa_by_family(&self, family: &str, page: Page) -> Result<Vec<TaxonView>>;
    fn distributions_by_flag(
        &self,
        flag: DistributionFlag,
        value: bool,
        page: Page,
    ) -> Result<Vec<DistributionView>>;
    /// Case-insensitive substring match on area names
    fn areas_by_name(&self, pattern: &str) -> Result<Vec<AreaView>>;
    fn taxa_in_area(&self, area_name: &str, page: Page) -> Result<Vec<TaxonView>>;
    /// Taxa below `taxon_id` in the nested-set tree, in preorder
    fn descendants(&self, taxon_id: EntityId, page: Page) -> Result<Vec<TaxonView>>;
    fn statistics(&self) -> Result<Statistics>;
}

const TAXON_SELECT: &str = "SELECT t.id, t.plant_name_id, t.name, t.authorship, t.rank, t.status,
        f.name AS family, g.name AS genus, s.name AS species, t.ipni_id, t.powo_id,
        t.tax_id, t.accepted_plant_name_id, t.lifeform, t.climate,
        p.place, p.volume_and_page, p.year, p.author
    FROM taxon t
    JOIN family f ON f.id = t.family_id
    JOIN genus g ON g.id = t.genus_id
    LEFT JOIN species s ON s.id = t.species_id
    LEFT JOIN publication p ON p.id = t.publication_id";

const DISTRIBUTION_SELECT: &str = "SELECT d.taxon_id, t.name AS taxon_name,
        a.id AS area_id, a.level, a.code, a.name AS area_name, a.parent_id,
        d.introduced, d.extinct, d.location_doubtful
    FROM distribution d
    JOIN taxon t ON t.id = d.taxon_id
    JOIN geographic_area a ON a.id = d.area_id";

fn taxon_view(r: &Row<'_>) -> rusqlite::Result<TaxonView> {
    let place: Option<String> = r.get("place")?;
    let publication = match place {
        Some(place) => Some(PublicationView {
            place,
            volume_and_page: r.get("volume_and_page")?,
            year: r.get("year")?,
            author: r.get("author")?,
        }),
        None => None,
    };
    Ok(TaxonView {
        id: r.get("id")?,
        plant_name_id: r.get("plant_name_id")?,
        name: r.get("name")?,
        authorship: r.get("authorship")?,
        rank: r.get("rank")?,
        status: r.get("status")?,
        family: r.get("family")?,
        genus: r.get("genus")?,
        species: r.get("species")?,
        ipni_id: r.get("ipni_id")?,
        powo_id: r.get("powo_id")?,
        tax_id: r.get("tax_id")?,
        accepted_plant_name_id: r.get("accepted_plant_name_id")?,
        lifeform: r.get("lifeform")?,
        climate: r.get("climate")?,
        publication,
    })
}

fn area_view(r: &Row<'_>, id_column: &str, name_column: &str) -> rusqlite::Result<AreaView> {
    Ok(AreaView {
        id: r.get(id_column)?,
        level: level_from_sql(r.get("level")?)?.as_str().to_string(),
        code: r.get("code")?,
        name: r.get(name_column)?,
        parent_id: r.get("parent_id")?,
    })
}

fn distribution_view(r: &Row<'_>) -> rusqlite::Result<DistributionView> {
    Ok(DistributionView {
        taxon_id: r.get("taxon_id")?,
        taxon_name: r.get("taxon_name")?,
        area: area_view(r, "area_id", "area_name")?,
        introduced: r.get("introduced")?,
        extinct: r.get("extinct")?,
        location_doubtful: r.get("location_doubtful")?,
    })
}

impl ReadStore for SqliteStore {
    fn taxon(&self, id: EntityId) -> Result<Option<TaxonView>> {
        self.with_connection(|conn| {
            Ok(conn
                .query_row(
                    &format!("{} WHERE t.id = ?1", TAXON_SELECT),
                    [id],
                    taxon_view,
                )
                .optional()?)
        })
    }

    fn taxon_by_plant_name_id(&self, plant_name_id: i64) -> Result<Option<TaxonView>> {
        self.with_connection(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "{} JOIN plant_name pn ON pn.taxon_id = t.id WHERE pn.plant_name_id = ?1",
                        TAXON_SELECT
                    ),
                    [plant_name_id],
                    taxon_view,
                )
                .optional()?)
        })
    }

    fn taxa_by_family(&self, family: &str, page: Page) -> Result<Vec<TaxonView>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE f.name = ?1 ORDER BY t.id LIMIT ?2 OFFSET ?3",
                TAXON_SELECT
            ))?;
            let taxa = stmt
                .query_map(
                    params![family, page.limit as i64, page.offset as i64],
                    taxon_view,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(taxa)
        })
    }

    fn distributions_by_flag(
        &self,
        flag: DistributionFlag,
        value: bool,
        page: Page,
    ) -> Result<Vec<DistributionView>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE d.{} = ?1 ORDER BY d.id LIMIT ?2 OFFSET ?3",
                DISTRIBUTION_SELECT,
                flag.column()
            ))?;
            let rows = stmt
                .query_map(
                    params![value, page.limit as i64, page.offset as i64],
                    distribution_view,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    fn areas_by_name(&self, pattern: &str) -> Result<Vec<AreaView>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, level, code, name, parent_id FROM geographic_area
                 WHERE name LIKE '%' || ?1 || '%' ORDER BY level, id",
            )?;
            let areas = stmt
                .query_map([pattern], |r| area_view(r, "id", "name"))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(areas)
        })
    }

    fn taxa_in_area(&self, area_name: &str, page: Page) -> Result<Vec<TaxonView>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE t.id IN (
                    SELECT d.taxon_id FROM distribution d
                    JOIN geographic_area a ON a.id = d.area_id
                    WHERE a.name = ?1 COLLATE NOCASE)
                 ORDER BY t.id LIMIT ?2 OFFSET ?3",
                TAXON_SELECT
            ))?;
            let taxa = stmt
                .query_map(
                    params![area_name, page.limit as i64, page.offset as i64],
                    taxon_view,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(taxa)
        })
    }

    fn descendants(&self, taxon_id: EntityId, page: Page) -> Result<Vec<TaxonView>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{}
                 JOIN taxon_tree n ON n.taxon_id = t.id
                 JOIN taxon_tree r ON r.taxon_id = ?1
                 WHERE n.lft > r.lft AND n.rgt < r.rgt
                 ORDER BY n.lft LIMIT ?2 OFFSET ?3",
                TAXON_SELECT
            ))?;
            let taxa = stmt
                .query_map(
                    params![taxon_id, page.limit as i64, page.offset as i64],
                    taxon_view,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(taxa)
        })
    }

    fn statistics(&self) -> Result<Statistics> {
        self.with_connection(|conn| {
            let mut stats = Statistics::default();
            for kind in EntityKind::ALL {
                let count: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM {}", kind.table()),
                    [],
                    |r| r.get(0),
                )?;
                stats.entities.insert(kind, count as u64);
            }
            let (introduced, extinct, doubtful): (i64, i64, i64) = conn.query_row(
                "SELECT IFNULL(SUM(introduced), 0), IFNULL(SUM(extinct), 0),
                        IFNULL(SUM(location_doubtful), 0)
                 FROM distribution",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )?;
            stats.introduced = introduced as u64;
            stats.extinct = extinct as u64;
            stats.location_doubtful = doubtful as u64;
            Ok(stats)
        })
    }
}
