use crate::bio::entity::EntityKind;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod text;

/// Why a row was left out of the persisted entities
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "reason", content = "detail")]
pub enum SkipReason {
    /// A configured required column was empty or missing
    MissingRequiredField(String),
    /// A distribution row carried no continent, region or area
    MissingGeography,
    /// A distribution row referenced a plant_name_id with no persisted taxon
    UnresolvedTaxon(i64),
    /// A constraint violation that re-fetching could not settle
    PersistenceConflict(String),
}

impl SkipReason {
    /// Reason without its detail, used to group the report
    pub fn category(&self) -> &'static str {
        match self {
            SkipReason::MissingRequiredField(_) => "missing-required-field",
            SkipReason::MissingGeography => "missing-geography",
            SkipReason::UnresolvedTaxon(_) => "unresolved-taxon",
            SkipReason::PersistenceConflict(_) => "persistence-conflict",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingRequiredField(field) => {
                write!(f, "missing-required-field: {}", field)
            }
            SkipReason::MissingGeography => f.write_str("missing-geography"),
            SkipReason::UnresolvedTaxon(id) => write!(f, "unresolved-taxon: {}", id),
            SkipReason::PersistenceConflict(detail) => {
                write!(f, "persistence-conflict: {}", detail)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipRecord {
    pub row: u64,
    pub reason: SkipReason,
}

/// User-visible outcome of an import or export run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub rows_total: u64,
    pub rows_processed: u64,
    pub rows_skipped: u64,
    pub skipped: Vec<SkipRecord>,
    pub entities_created: BTreeMap<EntityKind, u64>,
    pub entities_reused: BTreeMap<EntityKind, u64>,
    pub status_reconciled: u64,
    /// Areas moved off a placeholder parent
    pub areas_reparented: u64,
    pub triples_emitted: u64,
    /// Set when the run stopped early on a cancellation request
    pub interrupted: bool,
}

impl RunSummary {
    pub fn start() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn record_skip(&mut self, skip: SkipRecord) {
        self.rows_total += 1;
        self.rows_skipped += 1;
        self.skipped.push(skip);
    }

    pub fn record_processed(&mut self) {
        self.rows_total += 1;
        self.rows_processed += 1;
    }

    pub fn created(&self, kind: EntityKind) -> u64 {
        self.entities_created.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_created(&self) -> u64 {
        self.entities_created.values().sum()
    }

    /// Skip counts grouped by reason category
    pub fn skips_by_reason(&self) -> BTreeMap<&'static str, u64> {
        let mut grouped = BTreeMap::new();
        for skip in &self.skipped {
            *grouped.entry(skip.reason.category()).or_insert(0) += 1;
        }
        grouped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

pub fn render(summary: &RunSummary, format: Format, max_skips: usize) -> Result<String> {
    match format {
        Format::Text => Ok(text::generate_text_report(summary, max_skips)),
        Format::Json => Ok(serde_json::to_string_pretty(summary)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_reason_display() {
        let reason = SkipReason::MissingRequiredField("genus".to_string());
        assert_eq!(reason.to_string(), "missing-required-field: genus");
        assert_eq!(reason.category(), "missing-required-field");
        assert_eq!(
            SkipReason::UnresolvedTaxon(42).to_string(),
            "unresolved-taxon: 42"
        );
    }

    #[test]
    fn test_counts_add_up() {
        let mut summary = RunSummary::start();
        summary.record_processed();
        summary.record_processed();
        summary.record_skip(SkipRecord {
            row: 3,
            reason: SkipReason::MissingRequiredField("family".to_string()),
        });
        summary.entities_created.insert(EntityKind::Family, 1);
        summary.entities_reused.insert(EntityKind::Family, 1);

        assert_eq!(summary.rows_total, summary.rows_processed + summary.rows_skipped);
        assert_eq!(summary.created(EntityKind::Family), 1);
        assert_eq!(summary.skips_by_reason().get("missing-required-field"), Some(&1));
    }

    #[test]
    fn test_json_report_uses_kind_names() {
        let mut summary = RunSummary::default();
        summary.entities_created.insert(EntityKind::GeographicArea, 1);
        let json = render(&summary, Format::Json, 10).unwrap();
        assert!(json.contains("\"geographic_area\": 1"));
    }
}
