//! Relational schema for the checklist entities

use crate::{FloraError, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// Schema version - increment when making schema changes
pub const SCHEMA_VERSION: i32 = 2;

/// Tables in creation order; dropped in reverse
pub const TABLES: [&str; 11] = [
    "schema_migrations",
    "family",
    "genus",
    "species",
    "infraspecies",
    "publication",
    "taxon",
    "plant_name",
    "taxon_tree",
    "geographic_area",
    "distribution",
];

/// Create every table and index that does not exist yet, then apply the
/// migrations newer than the recorded version
pub fn create(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_V1)
        .map_err(|e| FloraError::Schema(format!("Failed to apply v1 schema: {}", e)))?;

    let current = current_version(conn)?;
    if current >= SCHEMA_VERSION {
        debug!(version = current, "Schema already present");
        return Ok(());
    }
    for version in current.max(1)..=SCHEMA_VERSION {
        if version == 2 {
            migrate_v2(conn)?;
        }
        conn.execute(
            "INSERT OR IGNORE INTO schema_migrations (version) VALUES (?1)",
            [version],
        )?;
    }
    info!(from = current, to = SCHEMA_VERSION, "Schema migrated");
    Ok(())
}

/// NCBI taxon column and the nested-set taxonomy table
fn migrate_v2(conn: &Connection) -> Result<()> {
    if !has_column(conn, "taxon", "tax_id")? {
        conn.execute_batch("ALTER TABLE taxon ADD COLUMN tax_id INTEGER;")?;
    }
    conn.execute_batch(SCHEMA_V2)
        .map_err(|e| FloraError::Schema(format!("Failed to apply v2 schema: {}", e)))
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |r| r.get::<_, String>("name"))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names.iter().any(|name| name == column))
}

/// Drop every table; a missing table is not an error
pub fn drop_all(conn: &Connection) -> Result<()> {
    let mut sql = String::from("PRAGMA foreign_keys = OFF;\n");
    for table in TABLES.iter().rev() {
        sql.push_str(&format!("DROP TABLE IF EXISTS {};\n", table));
    }
    sql.push_str("PRAGMA foreign_keys = ON;\n");
    conn.execute_batch(&sql)?;
    info!("Schema dropped");
    Ok(())
}

pub fn exists(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'taxon'",
        [],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn current_version(conn: &Connection) -> Result<i32> {
    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS family (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS genus (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    family_id INTEGER NOT NULL REFERENCES family(id)
);

CREATE TABLE IF NOT EXISTS species (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    epithet TEXT NOT NULL,
    genus_id INTEGER NOT NULL REFERENCES genus(id)
);

CREATE TABLE IF NOT EXISTS infraspecies (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    rank TEXT NOT NULL,
    epithet TEXT NOT NULL,
    species_id INTEGER NOT NULL REFERENCES species(id),
    UNIQUE (rank, name)
);

CREATE TABLE IF NOT EXISTS publication (
    id INTEGER PRIMARY KEY,
    place TEXT NOT NULL,
    volume_and_page TEXT NOT NULL,
    year INTEGER,
    author TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_publication_key
    ON publication (place, volume_and_page, IFNULL(year, -1), author);

CREATE TABLE IF NOT EXISTS taxon (
    id INTEGER PRIMARY KEY,
    plant_name_id INTEGER,
    rank TEXT NOT NULL,
    status TEXT NOT NULL,
    name TEXT NOT NULL,
    authorship TEXT NOT NULL,
    family_id INTEGER NOT NULL REFERENCES family(id),
    genus_id INTEGER NOT NULL REFERENCES genus(id),
    species_id INTEGER REFERENCES species(id),
    infraspecies_id INTEGER REFERENCES infraspecies(id),
    publication_id INTEGER REFERENCES publication(id),
    ipni_id TEXT,
    powo_id TEXT,
    accepted_plant_name_id INTEGER,
    parent_plant_name_id INTEGER,
    basionym_plant_name_id INTEGER,
    lifeform TEXT,
    climate TEXT,
    geographic_note TEXT,
    remarks TEXT,
    reviewed INTEGER NOT NULL DEFAULT 0,
    homotypic_synonym INTEGER NOT NULL DEFAULT 0,
    UNIQUE (rank, name, authorship)
);
CREATE INDEX IF NOT EXISTS idx_taxon_family ON taxon (family_id);
CREATE INDEX IF NOT EXISTS idx_taxon_status ON taxon (status);

-- Every source plant_name_id, including those that collapsed onto an
-- existing taxon key
CREATE TABLE IF NOT EXISTS plant_name (
    plant_name_id INTEGER PRIMARY KEY,
    taxon_id INTEGER NOT NULL REFERENCES taxon(id)
);

CREATE TABLE IF NOT EXISTS geographic_area (
    id INTEGER PRIMARY KEY,
    level INTEGER NOT NULL CHECK (level IN (1, 2, 3)),
    code TEXT NOT NULL,
    name TEXT NOT NULL,
    parent_id INTEGER REFERENCES geographic_area(id),
    UNIQUE (level, code)
);
CREATE INDEX IF NOT EXISTS idx_area_name ON geographic_area (name);

CREATE TABLE IF NOT EXISTS distribution (
    id INTEGER PRIMARY KEY,
    taxon_id INTEGER NOT NULL REFERENCES taxon(id),
    area_id INTEGER NOT NULL REFERENCES geographic_area(id),
    introduced INTEGER NOT NULL DEFAULT 0,
    extinct INTEGER NOT NULL DEFAULT 0,
    location_doubtful INTEGER NOT NULL DEFAULT 0,
    UNIQUE (taxon_id, area_id)
);
CREATE INDEX IF NOT EXISTS idx_distribution_area ON distribution (area_id);
"#;

const SCHEMA_V2: &str = r#"
CREATE INDEX IF NOT EXISTS idx_taxon_name ON taxon (name);

-- Nested-set numbering of the parent_plant_name_id hierarchy; rebuilt whole
CREATE TABLE IF NOT EXISTS taxon_tree (
    taxon_id INTEGER PRIMARY KEY REFERENCES taxon(id),
    parent_id INTEGER REFERENCES taxon(id),
    lft INTEGER NOT NULL,
    rgt INTEGER NOT NULL,
    depth INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_taxon_tree_lft ON taxon_tree (lft);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create(&conn).unwrap();
        create(&conn).unwrap();
        assert!(exists(&conn).unwrap());

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 2);
        assert!(has_column(&conn, "taxon", "tax_id").unwrap());
    }

    #[test]
    fn test_v1_store_is_migrated() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_V1).unwrap();
        conn.execute("INSERT INTO schema_migrations (version) VALUES (1)", [])
            .unwrap();
        assert!(!has_column(&conn, "taxon", "tax_id").unwrap());

        create(&conn).unwrap();
        assert!(has_column(&conn, "taxon", "tax_id").unwrap());
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);
        let trees: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'taxon_tree'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(trees, 1);
    }

    #[test]
    fn test_drop_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        drop_all(&conn).unwrap();
        create(&conn).unwrap();
        drop_all(&conn).unwrap();
        drop_all(&conn).unwrap();
        assert!(!exists(&conn).unwrap());
    }

    #[test]
    fn test_publication_key_treats_missing_year_as_value() {
        let conn = Connection::open_in_memory().unwrap();
        create(&conn).unwrap();
        let insert = "INSERT INTO publication (id, place, volume_and_page, year, author)
                      VALUES (?1, 'Sp. Pl.', '1: 1', NULL, 'L.')";
        conn.execute(insert, [1]).unwrap();
        assert!(conn.execute(insert, [2]).is_err());
    }
}
