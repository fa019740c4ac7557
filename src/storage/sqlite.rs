//! Embedded single-file store backed by SQLite
//!
//! Uses an `Arc<Mutex<Connection>>` shared by every clone; WAL mode lets
//! readers proceed while the pipeline writes.

use crate::bio::entity::{
    AreaRecord, DistributionRecord, Entity, EntityId, EntityKind, FamilyRecord, GenusRecord,
    InfraspeciesRecord, NaturalKey, PublicationRecord, SpeciesRecord, TaxonRecord,
};
use crate::bio::geography::GeoLevel;
use crate::bio::taxonomy::{TaxonRank, TaxonStatus};
use crate::core::config::StoreConfig;
use crate::core::paths;
use crate::storage::schema;
use crate::storage::traits::{PageFilter, RelationalStore, TaxonName, TaxonomyStore, TreeNode};
use crate::{FloraError, Result};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Bound on the number of host parameters in one IN (...) list
const IN_CHUNK: usize = 500;

/// Where a connection string points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    Memory,
    File(PathBuf),
}

/// Parse `sqlite://<path>`, `sqlite::memory:` or a bare file path.
/// Client/server schemes are rejected.
pub fn parse_connection(connection: &str) -> Result<ConnectionTarget> {
    let connection = connection.trim();
    if connection == "sqlite::memory:" || connection == ":memory:" {
        return Ok(ConnectionTarget::Memory);
    }
    if let Some(rest) = connection.strip_prefix("sqlite://") {
        if rest.is_empty() {
            return Err(FloraError::Config(
                "sqlite:// connection string has no path".to_string(),
            ));
        }
        if rest == ":memory:" {
            return Ok(ConnectionTarget::Memory);
        }
        return Ok(ConnectionTarget::File(PathBuf::from(rest)));
    }
    if let Some((scheme, _)) = connection.split_once("://") {
        return Err(FloraError::Config(format!(
            "Unsupported store scheme '{}': only sqlite is available",
            scheme
        )));
    }
    if connection.is_empty() {
        return Err(FloraError::Config("Empty connection string".to_string()));
    }
    Ok(ConnectionTarget::File(PathBuf::from(connection)))
}

/// Thread-safe SQLite store
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    target: ConnectionTarget,
}

impl SqliteStore {
    pub fn open(connection: &str, busy_timeout_ms: u64) -> Result<Self> {
        let target = parse_connection(connection)?;
        info!(?target, "Opening SQLite store");

        let conn = match &target {
            ConnectionTarget::Memory => Connection::open_in_memory()?,
            ConnectionTarget::File(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Connection::open(path)?
            }
        };

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            target,
        };
        store.configure_pragmas(busy_timeout_ms)?;
        Ok(store)
    }

    /// Open the configured store, or the default database under the home dir
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let connection = match &config.connection {
            Some(connection) => connection.clone(),
            None => paths::default_database_path().display().to_string(),
        };
        Self::open(&connection, config.busy_timeout_ms)
    }

    /// In-memory store with the schema applied, for tests
    pub fn memory() -> Result<Self> {
        let store = Self::open("sqlite::memory:", 5000)?;
        store.create_schema()?;
        Ok(store)
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    /// Execute a closure with the connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    fn configure_pragmas(&self, busy_timeout_ms: u64) -> Result<()> {
        debug!("Configuring SQLite pragmas");
        self.with_connection(|conn| {
            if matches!(self.target, ConnectionTarget::File(_)) {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
                conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
            }
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch(&format!("PRAGMA busy_timeout = {};", busy_timeout_ms))?;
            conn.execute_batch("PRAGMA temp_store = MEMORY;")?;
            Ok(())
        })
    }
}

impl RelationalStore for SqliteStore {
    fn create_schema(&self) -> Result<()> {
        self.with_connection(schema::create)
    }

    fn drop_schema(&self) -> Result<()> {
        self.with_connection(schema::drop_all)
    }

    fn schema_exists(&self) -> Result<bool> {
        self.with_connection(schema::exists)
    }

    fn insert(&self, id: EntityId, entity: &Entity) -> Result<()> {
        self.with_connection(|conn| {
            match entity {
                Entity::Family(f) => {
                    conn.execute("INSERT INTO family (id, name) VALUES (?1, ?2)", params![id, f.name])?
                }
                Entity::Genus(g) => conn.execute(
                    "INSERT INTO genus (id, name, family_id) VALUES (?1, ?2, ?3)",
                    params![id, g.name, g.family_id],
                )?,
                Entity::Species(s) => conn.execute(
                    "INSERT INTO species (id, name, epithet, genus_id) VALUES (?1, ?2, ?3, ?4)",
                    params![id, s.name, s.epithet, s.genus_id],
                )?,
                Entity::Infraspecies(i) => conn.execute(
                    "INSERT INTO infraspecies (id, name, rank, epithet, species_id)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id, i.name, i.rank.as_str(), i.epithet, i.species_id],
                )?,
                Entity::Publication(p) => conn.execute(
                    "INSERT INTO publication (id, place, volume_and_page, year, author)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id, p.place, p.volume_and_page, p.year, p.author],
                )?,
                Entity::Taxon(t) => conn.execute(
                    "INSERT INTO taxon (id, plant_name_id, rank, status, name, authorship,
                        family_id, genus_id, species_id, infraspecies_id, publication_id,
                        ipni_id, powo_id, accepted_plant_name_id, parent_plant_name_id,
                        basionym_plant_name_id, lifeform, climate, geographic_note, remarks,
                        reviewed, homotypic_synonym, tax_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                        ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
                    params![
                        id,
                        t.plant_name_id,
                        t.rank.as_str(),
                        t.status.as_str(),
                        t.name,
                        t.authorship,
                        t.family_id,
                        t.genus_id,
                        t.species_id,
                        t.infraspecies_id,
                        t.publication_id,
                        t.ipni_id,
                        t.powo_id,
                        t.accepted_plant_name_id,
                        t.parent_plant_name_id,
                        t.basionym_plant_name_id,
                        t.lifeform,
                        t.climate,
                        t.geographic_note,
                        t.remarks,
                        t.reviewed,
                        t.homotypic_synonym,
                        t.tax_id,
                    ],
                )?,
                Entity::GeographicArea(a) => conn.execute(
                    "INSERT INTO geographic_area (id, level, code, name, parent_id)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id, a.level.number(), a.code, a.name, a.parent_id],
                )?,
                Entity::Distribution(d) => conn.execute(
                    "INSERT INTO distribution (id, taxon_id, area_id, introduced, extinct,
                        location_doubtful)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        id,
                        d.taxon_id,
                        d.area_id,
                        d.introduced,
                        d.extinct,
                        d.location_doubtful
                    ],
                )?,
            };
            Ok(())
        })
    }

    fn find_id(&self, key: &NaturalKey) -> Result<Option<EntityId>> {
        self.with_connection(|conn| {
            let id = match key {
                NaturalKey::Taxonomic {
                    kind,
                    rank,
                    name,
                    authorship,
                } => match kind {
                    EntityKind::Infraspecies => conn
                        .query_row(
                            "SELECT id FROM infraspecies WHERE rank = ?1 AND name = ?2",
                            params![rank.as_str(), name],
                            |r| r.get(0),
                        )
                        .optional()?,
                    EntityKind::Taxon => conn
                        .query_row(
                            "SELECT id FROM taxon WHERE rank = ?1 AND name = ?2 AND authorship = ?3",
                            params![rank.as_str(), name, authorship],
                            |r| r.get(0),
                        )
                        .optional()?,
                    other => conn
                        .query_row(
                            &format!("SELECT id FROM {} WHERE name = ?1", other.table()),
                            params![name],
                            |r| r.get(0),
                        )
                        .optional()?,
                },
                NaturalKey::Geographic { level, code } => conn
                    .query_row(
                        "SELECT id FROM geographic_area WHERE level = ?1 AND code = ?2",
                        params![level.number(), code],
                        |r| r.get(0),
                    )
                    .optional()?,
                NaturalKey::Publication {
                    place,
                    volume_and_page,
                    year,
                    author,
                } => conn
                    .query_row(
                        "SELECT id FROM publication
                         WHERE place = ?1 AND volume_and_page = ?2
                           AND IFNULL(year, -1) = IFNULL(?3, -1) AND author = ?4",
                        params![place, volume_and_page, year, author],
                        |r| r.get(0),
                    )
                    .optional()?,
                NaturalKey::Distribution { taxon, area } => conn
                    .query_row(
                        "SELECT id FROM distribution WHERE taxon_id = ?1 AND area_id = ?2",
                        params![taxon, area],
                        |r| r.get(0),
                    )
                    .optional()?,
            };
            Ok(id)
        })
    }

    fn max_id(&self, kind: EntityKind) -> Result<EntityId> {
        self.with_connection(|conn| {
            let id = conn.query_row(
                &format!("SELECT IFNULL(MAX(id), 0) FROM {}", kind.table()),
                [],
                |r| r.get(0),
            )?;
            Ok(id)
        })
    }

    fn load_keys(&self, kind: EntityKind) -> Result<Vec<(NaturalKey, EntityId)>> {
        let sql = match kind {
            EntityKind::Family | EntityKind::Genus | EntityKind::Species => {
                format!("SELECT id, name FROM {}", kind.table())
            }
            EntityKind::Infraspecies => "SELECT id, name, rank FROM infraspecies".to_string(),
            EntityKind::Taxon => "SELECT id, name, rank, authorship FROM taxon".to_string(),
            EntityKind::Publication => {
                "SELECT id, place, volume_and_page, year, author FROM publication".to_string()
            }
            EntityKind::GeographicArea => "SELECT id, level, code FROM geographic_area".to_string(),
            EntityKind::Distribution => "SELECT id, taxon_id, area_id FROM distribution".to_string(),
        };

        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let keys = stmt
                .query_map([], |r| Ok((row_to_key(kind, r)?, r.get::<_, EntityId>(0)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            debug!(kind = %kind, count = keys.len(), "Loaded persisted keys");
            Ok(keys)
        })
    }

    fn provisional_taxa(&self) -> Result<Vec<(EntityId, TaxonStatus)>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, status FROM taxon WHERE status IN ('unknown', 'unplaced')",
            )?;
            let taxa = stmt
                .query_map([], |r| {
                    let status: String = r.get(1)?;
                    Ok((r.get(0)?, TaxonStatus::parse(&status)))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(taxa)
        })
    }

    fn update_taxon_status(&self, id: EntityId, status: TaxonStatus) -> Result<()> {
        self.with_connection(|conn| {
            let updated = conn.execute(
                "UPDATE taxon SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )?;
            if updated == 0 {
                return Err(FloraError::NotFound(format!("taxon {}", id)));
            }
            Ok(())
        })
    }

    fn link_plant_name(&self, plant_name_id: i64, taxon_id: EntityId) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO plant_name (plant_name_id, taxon_id) VALUES (?1, ?2)",
                params![plant_name_id, taxon_id],
            )?;
            Ok(())
        })
    }

    fn taxon_for_plant_name(&self, plant_name_id: i64) -> Result<Option<EntityId>> {
        self.with_connection(|conn| {
            Ok(conn
                .query_row(
                    "SELECT taxon_id FROM plant_name WHERE plant_name_id = ?1",
                    [plant_name_id],
                    |r| r.get(0),
                )
                .optional()?)
        })
    }

    fn update_area_parent(&self, id: EntityId, parent_id: EntityId) -> Result<bool> {
        self.with_connection(|conn| {
            let updated = conn.execute(
                "UPDATE geographic_area SET parent_id = ?2
                 WHERE id = ?1 AND parent_id IS NOT ?2",
                params![id, parent_id],
            )?;
            Ok(updated > 0)
        })
    }

    fn areas_under_placeholder(&self, code: &str) -> Result<Vec<EntityId>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT a.id FROM geographic_area a
                 JOIN geographic_area p ON p.id = a.parent_id
                 WHERE p.code = ?1 AND a.code <> ?1 ORDER BY a.id",
            )?;
            let ids = stmt
                .query_map([code], |r| r.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ids)
        })
    }

    fn taxa_for_plant_names(&self, plant_name_ids: &[i64]) -> Result<HashMap<i64, EntityId>> {
        let mut found = HashMap::with_capacity(plant_name_ids.len());
        self.with_connection(|conn| {
            for chunk in plant_name_ids.chunks(IN_CHUNK) {
                let placeholders = vec!["?"; chunk.len()].join(", ");
                let mut stmt = conn.prepare(&format!(
                    "SELECT plant_name_id, taxon_id FROM plant_name WHERE plant_name_id IN ({})",
                    placeholders
                ))?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), |r| {
                    Ok((r.get::<_, i64>(0)?, r.get::<_, EntityId>(1)?))
                })?;
                for row in rows {
                    let (plant_name_id, taxon_id) = row?;
                    found.insert(plant_name_id, taxon_id);
                }
            }
            Ok(())
        })?;
        Ok(found)
    }

    fn page(
        &self,
        kind: EntityKind,
        after: EntityId,
        limit: usize,
        filter: PageFilter,
    ) -> Result<Vec<(EntityId, Entity)>> {
        let sql = match (kind, filter.accepted_only) {
            (EntityKind::Taxon, true) => {
                "SELECT * FROM taxon WHERE id > ?1 AND status = 'accepted' ORDER BY id LIMIT ?2"
                    .to_string()
            }
            (EntityKind::Distribution, true) => "SELECT d.* FROM distribution d
                 JOIN taxon t ON t.id = d.taxon_id
                 WHERE d.id > ?1 AND t.status = 'accepted'
                 ORDER BY d.id LIMIT ?2"
                .to_string(),
            _ => format!(
                "SELECT * FROM {} WHERE id > ?1 ORDER BY id LIMIT ?2",
                kind.table()
            ),
        };

        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![after, limit as i64], |r| {
                    Ok((r.get::<_, EntityId>("id")?, row_to_entity(kind, r)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    fn begin_batch(&self) -> Result<()> {
        self.with_connection(|conn| {
            if conn.is_autocommit() {
                conn.execute_batch("BEGIN IMMEDIATE")?;
            }
            Ok(())
        })
    }

    fn commit_batch(&self) -> Result<()> {
        self.with_connection(|conn| {
            if !conn.is_autocommit() {
                conn.execute_batch("COMMIT")?;
            }
            Ok(())
        })
    }

    fn rollback_batch(&self) -> Result<()> {
        self.with_connection(|conn| {
            if !conn.is_autocommit() {
                conn.execute_batch("ROLLBACK")?;
            }
            Ok(())
        })
    }
}

impl TaxonomyStore for SqliteStore {
    fn taxon_names(&self) -> Result<Vec<TaxonName>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, plant_name_id, accepted_plant_name_id, tax_id
                 FROM taxon ORDER BY id",
            )?;
            let names = stmt
                .query_map([], |r| {
                    Ok(TaxonName {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        plant_name_id: r.get(2)?,
                        accepted_plant_name_id: r.get(3)?,
                        tax_id: r.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names)
        })
    }

    fn set_tax_ids(&self, assignments: &[(EntityId, i64)]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare("UPDATE taxon SET tax_id = ?2 WHERE id = ?1")?;
            for (id, tax_id) in assignments {
                changed += stmt.execute(params![id, tax_id])?;
            }
        }
        tx.commit()?;
        debug!(changed, "NCBI tax_ids written");
        Ok(changed)
    }

    fn taxon_parents(&self) -> Result<Vec<(EntityId, Option<EntityId>)>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id, pn.taxon_id FROM taxon t
                 LEFT JOIN plant_name pn ON pn.plant_name_id = t.parent_plant_name_id
                 ORDER BY t.id",
            )?;
            let parents = stmt
                .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(parents)
        })
    }

    fn replace_taxon_tree(&self, nodes: &[TreeNode]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM taxon_tree", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO taxon_tree (taxon_id, parent_id, lft, rgt, depth)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for node in nodes {
                stmt.execute(params![
                    node.taxon_id,
                    node.parent_id,
                    node.lft,
                    node.rgt,
                    node.depth
                ])?;
            }
        }
        tx.commit()?;
        info!(nodes = nodes.len(), "Taxonomy tree stored");
        Ok(())
    }
}

/// Natural key out of the columns selected by `load_keys`
fn row_to_key(kind: EntityKind, r: &Row<'_>) -> rusqlite::Result<NaturalKey> {
    let key = match kind {
        EntityKind::Family => {
            NaturalKey::taxonomic(kind, TaxonRank::Family, &r.get::<_, String>(1)?, "")
        }
        EntityKind::Genus => NaturalKey::taxonomic(kind, TaxonRank::Genus, &r.get::<_, String>(1)?, ""),
        EntityKind::Species => {
            NaturalKey::taxonomic(kind, TaxonRank::Species, &r.get::<_, String>(1)?, "")
        }
        EntityKind::Infraspecies => NaturalKey::taxonomic(
            kind,
            TaxonRank::parse(&r.get::<_, String>(2)?),
            &r.get::<_, String>(1)?,
            "",
        ),
        EntityKind::Taxon => NaturalKey::taxonomic(
            kind,
            TaxonRank::parse(&r.get::<_, String>(2)?),
            &r.get::<_, String>(1)?,
            &r.get::<_, String>(3)?,
        ),
        EntityKind::Publication => NaturalKey::Publication {
            place: r.get(1)?,
            volume_and_page: r.get(2)?,
            year: r.get(3)?,
            author: r.get(4)?,
        },
        EntityKind::GeographicArea => NaturalKey::Geographic {
            level: level_from_sql(r.get(1)?)?,
            code: r.get(2)?,
        },
        EntityKind::Distribution => NaturalKey::Distribution {
            taxon: r.get(1)?,
            area: r.get(2)?,
        },
    };
    Ok(key)
}

pub(crate) fn level_from_sql(level: i64) -> rusqlite::Result<GeoLevel> {
    u8::try_from(level)
        .ok()
        .and_then(GeoLevel::from_number)
        .ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                Type::Integer,
                Box::new(FloraError::Schema(format!("invalid area level {}", level))),
            )
        })
}

/// Map a `SELECT *` row of the kind's table back to its record
fn row_to_entity(kind: EntityKind, r: &Row<'_>) -> rusqlite::Result<Entity> {
    let entity = match kind {
        EntityKind::Family => Entity::Family(FamilyRecord { name: r.get("name")? }),
        EntityKind::Genus => Entity::Genus(GenusRecord {
            name: r.get("name")?,
            family_id: r.get("family_id")?,
        }),
        EntityKind::Species => Entity::Species(SpeciesRecord {
            name: r.get("name")?,
            epithet: r.get("epithet")?,
            genus_id: r.get("genus_id")?,
        }),
        EntityKind::Infraspecies => Entity::Infraspecies(InfraspeciesRecord {
            name: r.get("name")?,
            rank: TaxonRank::parse(&r.get::<_, String>("rank")?),
            epithet: r.get("epithet")?,
            species_id: r.get("species_id")?,
        }),
        EntityKind::Publication => Entity::Publication(PublicationRecord {
            place: r.get("place")?,
            volume_and_page: r.get("volume_and_page")?,
            year: r.get("year")?,
            author: r.get("author")?,
        }),
        EntityKind::Taxon => Entity::Taxon(TaxonRecord {
            plant_name_id: r.get("plant_name_id")?,
            rank: TaxonRank::parse(&r.get::<_, String>("rank")?),
            status: TaxonStatus::parse(&r.get::<_, String>("status")?),
            name: r.get("name")?,
            authorship: r.get("authorship")?,
            family_id: r.get("family_id")?,
            genus_id: r.get("genus_id")?,
            species_id: r.get("species_id")?,
            infraspecies_id: r.get("infraspecies_id")?,
            publication_id: r.get("publication_id")?,
            ipni_id: r.get("ipni_id")?,
            powo_id: r.get("powo_id")?,
            accepted_plant_name_id: r.get("accepted_plant_name_id")?,
            parent_plant_name_id: r.get("parent_plant_name_id")?,
            basionym_plant_name_id: r.get("basionym_plant_name_id")?,
            lifeform: r.get("lifeform")?,
            climate: r.get("climate")?,
            geographic_note: r.get("geographic_note")?,
            remarks: r.get("remarks")?,
            reviewed: r.get("reviewed")?,
            homotypic_synonym: r.get("homotypic_synonym")?,
            tax_id: r.get("tax_id")?,
        }),
        EntityKind::GeographicArea => Entity::GeographicArea(AreaRecord {
            level: level_from_sql(r.get("level")?)?,
            code: r.get("code")?,
            name: r.get("name")?,
            parent_id: r.get("parent_id")?,
        }),
        EntityKind::Distribution => Entity::Distribution(DistributionRecord {
            taxon_id: r.get("taxon_id")?,
            area_id: r.get("area_id")?,
            introduced: r.get("introduced")?,
            extinct: r.get("extinct")?,
            location_doubtful: r.get("location_doubtful")?,
        }),
    };
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::traits::PersistOutcome;
    use rstest::rstest;

    #[rstest]
    #[case("sqlite::memory:", ConnectionTarget::Memory)]
    #[case("sqlite://:memory:", ConnectionTarget::Memory)]
    #[case("sqlite:///var/lib/florakb.db", ConnectionTarget::File(PathBuf::from("/var/lib/florakb.db")))]
    #[case("data/florakb.db", ConnectionTarget::File(PathBuf::from("data/florakb.db")))]
    fn test_parse_connection(#[case] input: &str, #[case] expected: ConnectionTarget) {
        assert_eq!(parse_connection(input).unwrap(), expected);
    }

    #[test]
    fn test_client_server_scheme_rejected() {
        let err = parse_connection("postgresql://user@localhost/wcvp").unwrap_err();
        assert!(matches!(err, FloraError::Config(_)));
    }

    #[test]
    fn test_persist_twice_reports_existing() {
        let store = SqliteStore::memory().unwrap();
        let family = Entity::Family(FamilyRecord {
            name: "Oxalidaceae".to_string(),
        });

        assert_eq!(store.persist(1, &family).unwrap(), PersistOutcome::Created(1));
        // A second writer minted a different id for the same key
        assert_eq!(store.persist(2, &family).unwrap(), PersistOutcome::Existing(1));
        assert_eq!(store.max_id(EntityKind::Family).unwrap(), 1);
    }

    #[test]
    fn test_page_walks_in_id_order() {
        let store = SqliteStore::memory().unwrap();
        for (id, name) in [(1, "Oxalidaceae"), (2, "Picramniaceae"), (3, "Rosaceae")] {
            store
                .insert(id, &Entity::Family(FamilyRecord { name: name.to_string() }))
                .unwrap();
        }

        let first = store
            .page(EntityKind::Family, 0, 2, PageFilter::default())
            .unwrap();
        assert_eq!(first.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![1, 2]);
        let rest = store
            .page(EntityKind::Family, 2, 2, PageFilter::default())
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(
            rest[0].1,
            Entity::Family(FamilyRecord {
                name: "Rosaceae".to_string()
            })
        );
    }

    #[test]
    fn test_load_keys_round_trips_natural_keys() {
        let store = SqliteStore::memory().unwrap();
        let area = Entity::GeographicArea(AreaRecord {
            level: GeoLevel::Continent,
            code: "8".to_string(),
            name: "SOUTHERN AMERICA".to_string(),
            parent_id: None,
        });
        store.insert(4, &area).unwrap();

        let keys = store.load_keys(EntityKind::GeographicArea).unwrap();
        assert_eq!(keys, vec![(area.natural_key(), 4)]);
    }

    #[test]
    fn test_plant_name_links() {
        let store = SqliteStore::memory().unwrap();
        store
            .insert(1, &Entity::Family(FamilyRecord { name: "F".to_string() }))
            .unwrap();
        store
            .insert(
                1,
                &Entity::Genus(GenusRecord {
                    name: "G".to_string(),
                    family_id: 1,
                }),
            )
            .unwrap();
        store
            .insert(
                1,
                &Entity::Taxon(TaxonRecord {
                    plant_name_id: Some(100),
                    rank: TaxonRank::Genus,
                    status: TaxonStatus::Accepted,
                    name: "G".to_string(),
                    authorship: "L.".to_string(),
                    family_id: 1,
                    genus_id: 1,
                    species_id: None,
                    infraspecies_id: None,
                    publication_id: None,
                    ipni_id: None,
                    powo_id: None,
                    accepted_plant_name_id: None,
                    parent_plant_name_id: None,
                    basionym_plant_name_id: None,
                    lifeform: None,
                    climate: None,
                    geographic_note: None,
                    remarks: None,
                    reviewed: false,
                    homotypic_synonym: false,
                    tax_id: None,
                }),
            )
            .unwrap();

        store.link_plant_name(100, 1).unwrap();
        store.link_plant_name(100, 1).unwrap();
        store.link_plant_name(101, 1).unwrap();

        assert_eq!(store.taxon_for_plant_name(101).unwrap(), Some(1));
        let found = store.taxa_for_plant_names(&[100, 101, 999]).unwrap();
        assert_eq!(found.len(), 2);
        assert!(!found.contains_key(&999));
    }
}
