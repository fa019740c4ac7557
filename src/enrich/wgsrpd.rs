/// WGSRPD reference tables: every continent, region and area with its real parent
///
/// The TDWG tables are `*`-delimited text, one per level, with the parent's
/// code in its own column. Importing them before the distribution file means
/// distribution rows that only carry an area code find the area already
/// placed under its region; importing afterwards repairs placeholder parents.
use crate::bio::entity::{EntityId, EntityKind};
use crate::bio::geography::{normalize_code, GeoLevel};
use crate::core::resolver::{EntityResolver, ResolverCounts};
use crate::download::Downloader;
use crate::storage::traits::RelationalStore;
use crate::{FloraError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const DELIMITER: u8 = b'*';

pub const LEVEL_TABLES: [(GeoLevel, &str); 3] = [
    (GeoLevel::Continent, "tblLevel1.txt"),
    (GeoLevel::Region, "tblLevel2.txt"),
    (GeoLevel::Area, "tblLevel3.txt"),
];

/// One row of a level table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceUnit {
    pub level: GeoLevel,
    pub code: String,
    pub name: String,
    pub parent_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceSummary {
    pub continents: u64,
    pub regions: u64,
    pub areas: u64,
    pub created: u64,
    pub reparented: u64,
    /// Units whose parent code is not in the parent table
    pub skipped: u64,
}

/// (code, name, parent code) column headers of a level table
fn columns(level: GeoLevel) -> (&'static str, &'static str, Option<&'static str>) {
    match level {
        GeoLevel::Continent => ("L1 code", "L1 continent", None),
        GeoLevel::Region => ("L2 code", "L2 region", Some("L1 code")),
        GeoLevel::Area => ("L3 code", "L3 area", Some("L2 code")),
    }
}

/// Read one level table. Columns are found by header name; text that is
/// not UTF-8 is decoded lossily.
pub fn read_level<R: Read>(level: GeoLevel, reader: R) -> Result<Vec<ReferenceUnit>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .flexible(true)
        .from_reader(reader);
    let headers: Vec<String> = rdr
        .byte_headers()?
        .iter()
        .map(|h| String::from_utf8_lossy(h).trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    let position = |column: &str| {
        headers.iter().position(|h| h == column).ok_or_else(|| {
            FloraError::Schema(format!(
                "Column '{}' missing from the level {} table",
                column,
                level.number()
            ))
        })
    };

    let (code_column, name_column, parent_column) = columns(level);
    let code_at = position(code_column)?;
    let name_at = position(name_column)?;
    let parent_at = parent_column.map(|c| position(c)).transpose()?;

    let mut units = Vec::new();
    for record in rdr.byte_records() {
        let record = record?;
        let field = |i: usize| {
            record
                .get(i)
                .map(|v| String::from_utf8_lossy(v).trim().to_string())
                .unwrap_or_default()
        };
        let code = normalize_code(&field(code_at));
        if code.is_empty() {
            continue;
        }
        units.push(ReferenceUnit {
            level,
            code,
            name: field(name_at),
            parent_code: parent_at
                .map(|i| normalize_code(&field(i)))
                .filter(|c| !c.is_empty()),
        });
    }
    Ok(units)
}

/// Read all three tables from `dir`, continents first
pub fn read_tables(dir: &Path) -> Result<Vec<ReferenceUnit>> {
    let mut units = Vec::new();
    for (level, file) in LEVEL_TABLES {
        let path = dir.join(file);
        let table = File::open(&path)
            .map_err(|e| FloraError::NotFound(format!("{}: {}", path.display(), e)))?;
        let read = read_level(level, table)?;
        info!(level = %level, units = read.len(), "Reference table read");
        units.extend(read);
    }
    Ok(units)
}

/// Download the three tables under `base_url` into `dir`
pub fn fetch_tables(
    downloader: &Downloader,
    base_url: &str,
    dir: &Path,
    force: bool,
) -> Result<Vec<PathBuf>> {
    LEVEL_TABLES
        .iter()
        .map(|(_, file)| {
            let url = format!("{}/{}", base_url.trim_end_matches('/'), file);
            Ok(downloader.fetch(&url, &dir.join(file), force)?.path)
        })
        .collect()
}

/// Resolve every unit, parents before children
pub fn import_reference(
    resolver: &EntityResolver,
    units: &[ReferenceUnit],
) -> Result<ReferenceSummary> {
    let before = resolver.counts();
    let mut ordered: Vec<&ReferenceUnit> = units.iter().collect();
    ordered.sort_by_key(|u| u.level);

    let mut summary = ReferenceSummary::default();
    let mut ids: HashMap<(GeoLevel, &str), EntityId> = HashMap::new();
    for unit in ordered {
        let parent_id = match unit.level.parent() {
            None => None,
            Some(parent_level) => {
                let found = unit
                    .parent_code
                    .as_deref()
                    .and_then(|code| ids.get(&(parent_level, code)).copied());
                if found.is_none() {
                    warn!(
                        level = %unit.level,
                        code = %unit.code,
                        parent = ?unit.parent_code,
                        "Reference unit has an unknown parent"
                    );
                    summary.skipped += 1;
                    continue;
                }
                found
            }
        };

        let id = resolver.resolve_reference_area(unit.level, &unit.code, &unit.name, parent_id)?;
        ids.insert((unit.level, unit.code.as_str()), id);
        match unit.level {
            GeoLevel::Continent => summary.continents += 1,
            GeoLevel::Region => summary.regions += 1,
            GeoLevel::Area => summary.areas += 1,
        }
    }

    let after = resolver.counts();
    let created = |counts: &ResolverCounts| {
        counts
            .created
            .get(&EntityKind::GeographicArea)
            .copied()
            .unwrap_or(0)
    };
    summary.created = created(&after) - created(&before);
    summary.reparented = after.areas_reparented - before.areas_reparented;
    Ok(summary)
}

/// Import the reference units in one transaction
pub fn run_reference_import(
    store: Arc<dyn RelationalStore>,
    sentinel: &str,
    units: &[ReferenceUnit],
) -> Result<ReferenceSummary> {
    store.create_schema()?;
    let resolver = EntityResolver::open(store.clone(), sentinel)?;
    store.begin_batch()?;
    match import_reference(&resolver, units) {
        Ok(summary) => {
            store.commit_batch()?;
            info!(
                continents = summary.continents,
                regions = summary.regions,
                areas = summary.areas,
                reparented = summary.reparented,
                "WGSRPD reference imported"
            );
            Ok(summary)
        }
        Err(e) => {
            if let Err(rollback) = store.rollback_batch() {
                warn!(error = %rollback, "Rollback of the reference import failed");
            }
            Err(e)
        }
    }
}
