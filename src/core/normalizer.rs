/// Row normalization: type coercion, defaults and required-field checks
///
/// Normalization is pure per row, so batches are normalized in parallel with
/// rayon while keeping input order.
use crate::bio::checklist::RawRow;
use crate::bio::geography::{normalize_code, GeoLevel, GeoUnit};
use crate::bio::taxonomy::{compose_name, TaxonRank, TaxonStatus};
use crate::core::config::IngestConfig;
use crate::report::{SkipReason, SkipRecord};
use crate::{FloraError, Result};
use rayon::prelude::*;
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

/// Column names of each geographic level: (code column, name column)
const GEO_COLUMNS: [(GeoLevel, &str, &str); 3] = [
    (GeoLevel::Continent, "continent_code_l1", "continent"),
    (GeoLevel::Region, "region_code_l2", "region"),
    (GeoLevel::Area, "area_code_l3", "area"),
];

/// Result of normalizing one row
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Accepted(T),
    Skipped(SkipRecord),
}

impl<T> Outcome<T> {
    pub fn accepted(self) -> Option<T> {
        match self {
            Outcome::Accepted(value) => Some(value),
            Outcome::Skipped(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistributionFlags {
    pub introduced: bool,
    pub extinct: bool,
    pub location_doubtful: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublicationFields {
    pub place: String,
    pub volume_and_page: String,
    pub year: Option<i32>,
    pub author: String,
}

/// A names row (optionally joined with its distribution columns) with every
/// column resolved to a typed value or a default
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub row: u64,
    pub plant_name_id: Option<i64>,
    pub ipni_id: Option<String>,
    pub powo_id: Option<String>,
    pub rank: TaxonRank,
    pub status: TaxonStatus,
    pub family: String,
    pub genus: String,
    pub species: Option<String>,
    pub infraspecific_rank: Option<TaxonRank>,
    pub infraspecies: Option<String>,
    pub taxon_name: String,
    pub taxon_authors: String,
    pub publication: Option<PublicationFields>,
    pub remarks: Option<String>,
    pub geographic_note: Option<String>,
    pub lifeform: Option<String>,
    pub climate: Option<String>,
    pub accepted_plant_name_id: Option<i64>,
    pub parent_plant_name_id: Option<i64>,
    pub basionym_plant_name_id: Option<i64>,
    pub reviewed: bool,
    pub homotypic_synonym: bool,
    /// Present levels, continent first
    pub geography: Vec<GeoUnit>,
    pub flags: DistributionFlags,
}

/// A row of the distribution file, which references its taxon by plant_name_id
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionRow {
    pub row: u64,
    pub plant_name_id: i64,
    pub geography: Vec<GeoUnit>,
    pub flags: DistributionFlags,
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    required_fields: Vec<String>,
    sentinel: String,
}

impl Normalizer {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            required_fields: config.required_fields.clone(),
            sentinel: config.unknown_sentinel.clone(),
        }
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Normalize a names row. Missing required fields skip the row; values of
    /// the wrong type fail the run.
    pub fn normalize(&self, row: &RawRow) -> Result<Outcome<NormalizedRecord>> {
        if let Some(field) = self.first_missing(row, &self.required_fields) {
            return Ok(self.skip(row.number, SkipReason::MissingRequiredField(field)));
        }

        let text = |column: &str| row.get(column).map(str::to_string);
        let or_sentinel = |column: &str| text(column).unwrap_or_else(|| self.sentinel.clone());

        let genus = or_sentinel("genus");
        let species = text("species");
        let infraspecific_rank = row.get("infraspecific_rank").map(TaxonRank::parse);
        let infraspecies = text("infraspecies");

        let taxon_name = text("taxon_name").unwrap_or_else(|| {
            compose_name(
                &genus,
                species.as_deref(),
                infraspecific_rank,
                infraspecies.as_deref(),
            )
        });

        let taxon_authors = text("taxon_authors")
            .or_else(|| {
                compose_authors(row.get("parenthetical_author"), row.get("primary_author"))
            })
            .unwrap_or_else(|| self.sentinel.clone());

        let publication = row.get("place_of_publication").map(|place| PublicationFields {
            place: place.to_string(),
            volume_and_page: or_sentinel("volume_and_page"),
            year: row.get("first_published").and_then(parse_year),
            author: text("publication_author")
                .or_else(|| text("primary_author"))
                .unwrap_or_else(|| self.sentinel.clone()),
        });

        Ok(Outcome::Accepted(NormalizedRecord {
            row: row.number,
            plant_name_id: parse_int(row, "plant_name_id")?,
            ipni_id: text("ipni_id"),
            powo_id: text("powo_id"),
            rank: row
                .get("taxon_rank")
                .map(TaxonRank::parse)
                .unwrap_or(TaxonRank::Unranked),
            status: row
                .get("taxon_status")
                .map(TaxonStatus::parse)
                .unwrap_or(TaxonStatus::Unknown),
            family: or_sentinel("family"),
            genus,
            species,
            infraspecific_rank,
            infraspecies,
            taxon_name,
            taxon_authors,
            publication,
            remarks: text("nomenclatural_remarks"),
            geographic_note: text("geographic_area"),
            lifeform: text("lifeform_description"),
            climate: text("climate_description"),
            accepted_plant_name_id: parse_int(row, "accepted_plant_name_id")?,
            parent_plant_name_id: parse_int(row, "parent_plant_name_id")?,
            basionym_plant_name_id: parse_int(row, "basionym_plant_name_id")?,
            reviewed: parse_bool(row, "reviewed")?,
            homotypic_synonym: parse_bool(row, "homotypic_synonym")?,
            geography: self.geography(row),
            flags: parse_flags(row)?,
        }))
    }

    /// Normalize a distribution-file row; only plant_name_id is required
    pub fn normalize_distribution(&self, row: &RawRow) -> Result<Outcome<DistributionRow>> {
        let plant_name_id = match parse_int(row, "plant_name_id")? {
            Some(id) => id,
            None => {
                return Ok(self.skip(
                    row.number,
                    SkipReason::MissingRequiredField("plant_name_id".to_string()),
                ))
            }
        };

        let geography = self.geography(row);
        if geography.is_empty() {
            return Ok(self.skip(row.number, SkipReason::MissingGeography));
        }

        Ok(Outcome::Accepted(DistributionRow {
            row: row.number,
            plant_name_id,
            geography,
            flags: parse_flags(row)?,
        }))
    }

    pub fn normalize_batch(&self, rows: &[RawRow]) -> Vec<Result<Outcome<NormalizedRecord>>> {
        rows.par_iter().map(|row| self.normalize(row)).collect()
    }

    pub fn normalize_distribution_batch(
        &self,
        rows: &[RawRow],
    ) -> Vec<Result<Outcome<DistributionRow>>> {
        rows.par_iter()
            .map(|row| self.normalize_distribution(row))
            .collect()
    }

    fn first_missing(&self, row: &RawRow, required: &[String]) -> Option<String> {
        required
            .iter()
            .find(|field| row.get(field).is_none())
            .cloned()
    }

    fn skip<T>(&self, row: u64, reason: SkipReason) -> Outcome<T> {
        warn!(row, reason = %reason, "Skipping row");
        Outcome::Skipped(SkipRecord { row, reason })
    }

    /// A level is present when it has a code or a name
    fn geography(&self, row: &RawRow) -> Vec<GeoUnit> {
        GEO_COLUMNS
            .iter()
            .filter_map(|(level, code_column, name_column)| {
                let code = row.get(code_column).map(normalize_code);
                let name = row.get(name_column).map(str::to_string);
                match (code, name) {
                    (None, None) => None,
                    (Some(code), name) => Some(GeoUnit {
                        level: *level,
                        code,
                        name: name.unwrap_or_else(|| self.sentinel.clone()),
                    }),
                    (None, Some(name)) => Some(GeoUnit {
                        level: *level,
                        code: name.to_uppercase(),
                        name,
                    }),
                }
            })
            .collect()
    }
}

fn compose_authors(parenthetical: Option<&str>, primary: Option<&str>) -> Option<String> {
    match (parenthetical, primary) {
        (Some(par), Some(prim)) => Some(format!("({}) {}", par, prim)),
        (None, Some(prim)) => Some(prim.to_string()),
        (Some(par), None) => Some(format!("({})", par)),
        (None, None) => None,
    }
}

fn parse_flags(row: &RawRow) -> Result<DistributionFlags> {
    Ok(DistributionFlags {
        introduced: parse_bool(row, "introduced")?,
        extinct: parse_bool(row, "extinct")?,
        location_doubtful: parse_bool(row, "location_doubtful")?,
    })
}

/// Absent or blank is `false`
pub fn parse_bool(row: &RawRow, column: &str) -> Result<bool> {
    let Some(value) = row.get(column) else {
        return Ok(false);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" | "t" | "y" | "yes" => Ok(true),
        "0" | "0.0" | "false" | "f" | "n" | "no" => Ok(false),
        _ => Err(mismatch(row, column, value)),
    }
}

/// Integer identifier; a trailing `.0` from spreadsheet exports is accepted
pub fn parse_int(row: &RawRow, column: &str) -> Result<Option<i64>> {
    let Some(value) = row.get(column) else {
        return Ok(None);
    };
    let digits = value.strip_suffix(".0").unwrap_or(value);
    digits
        .parse::<i64>()
        .map(Some)
        .map_err(|_| mismatch(row, column, value))
}

/// Four-digit year out of free text such as "(1753)" or "1 Jan 1891"
pub fn parse_year(value: &str) -> Option<i32> {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    let re = YEAR.get_or_init(|| Regex::new(r"\b(\d{4})\b").expect("valid year pattern"));
    re.captures(value)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn mismatch(row: &RawRow, column: &str, value: &str) -> FloraError {
    FloraError::TypeMismatch {
        row: row.number,
        column: column.to_string(),
        value: value.to_string(),
    }
}
