/// NCBI Taxonomy identifiers for stored taxa
///
/// Names from `names.dmp` are matched against taxon names in three passes:
/// scientific names first, then any name class for taxa still unmatched,
/// and finally synonyms inherit the identifier of their accepted name.
use crate::bio::entity::EntityId;
use crate::storage::traits::{TaxonName, TaxonomyStore};
use crate::{FloraError, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

pub const NAMES_FILE: &str = "names.dmp";

const SCIENTIFIC_NAME: &str = "scientific name";

/// One line of names.dmp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NcbiName {
    pub tax_id: i64,
    pub name: String,
    pub class: String,
}

/// Parse `tax_id\t|\tname\t|\tunique name\t|\tname class\t|`
pub fn parse_names_line(line: &str) -> Result<NcbiName> {
    let trimmed = line.trim_end_matches(|c| c == '\n' || c == '\r');
    let trimmed = trimmed.strip_suffix("\t|").unwrap_or(trimmed);
    let fields: Vec<&str> = trimmed.split("\t|\t").collect();
    if fields.len() != 4 {
        return Err(FloraError::Parse(format!(
            "Expected 4 fields in names.dmp line, got {}: {:?}",
            fields.len(),
            line
        )));
    }
    let tax_id = fields[0]
        .trim()
        .parse()
        .map_err(|_| FloraError::Parse(format!("Invalid tax_id {:?}", fields[0])))?;
    Ok(NcbiName {
        tax_id,
        name: fields[1].trim().to_string(),
        class: fields[3].trim().to_string(),
    })
}

/// Name lookups restricted to the names present in the store.
/// The first tax_id listed for a name wins.
#[derive(Debug, Default)]
pub struct NameIndex {
    scientific: HashMap<String, i64>,
    any: HashMap<String, i64>,
}

impl NameIndex {
    pub fn from_reader<R: BufRead>(reader: R, wanted: &HashSet<&str>) -> Result<Self> {
        let mut index = Self::default();
        let mut lines = 0u64;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            lines += 1;
            let entry = parse_names_line(&line)?;
            if !wanted.contains(entry.name.as_str()) {
                continue;
            }
            if entry.class == SCIENTIFIC_NAME {
                index.scientific.entry(entry.name.clone()).or_insert(entry.tax_id);
            }
            index.any.entry(entry.name).or_insert(entry.tax_id);
        }
        debug!(lines, names = index.any.len(), "names.dmp indexed");
        Ok(index)
    }

    pub fn scientific(&self, name: &str) -> Option<i64> {
        self.scientific.get(name).copied()
    }

    pub fn any(&self, name: &str) -> Option<i64> {
        self.any.get(name).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingSummary {
    pub taxa: u64,
    pub by_scientific_name: u64,
    pub by_other_name: u64,
    pub inherited: u64,
    pub unmatched: u64,
    /// Rows whose stored tax_id changed
    pub updated: u64,
}

/// Decide a tax_id for every taxon; returns only assignments that differ
/// from what is stored
pub fn assign_tax_ids(
    taxa: &[TaxonName],
    index: &NameIndex,
) -> (Vec<(EntityId, i64)>, MappingSummary) {
    let mut summary = MappingSummary {
        taxa: taxa.len() as u64,
        ..Default::default()
    };
    let mut resolved: Vec<Option<i64>> = Vec::with_capacity(taxa.len());

    for taxon in taxa {
        let tax_id = if let Some(id) = index.scientific(&taxon.name) {
            summary.by_scientific_name += 1;
            Some(id)
        } else if let Some(id) = index.any(&taxon.name) {
            summary.by_other_name += 1;
            Some(id)
        } else {
            None
        };
        resolved.push(tax_id);
    }

    let by_plant_name: HashMap<i64, i64> = taxa
        .iter()
        .zip(&resolved)
        .filter_map(|(taxon, tax_id)| Some((taxon.plant_name_id?, tax_id.or(taxon.tax_id)?)))
        .collect();

    for (taxon, tax_id) in taxa.iter().zip(resolved.iter_mut()) {
        if tax_id.is_some() {
            continue;
        }
        let inherited = match (taxon.plant_name_id, taxon.accepted_plant_name_id) {
            (Some(own), Some(accepted)) if own != accepted => by_plant_name.get(&accepted).copied(),
            _ => None,
        };
        match inherited {
            Some(id) => {
                summary.inherited += 1;
                *tax_id = Some(id);
            }
            None => summary.unmatched += 1,
        }
    }

    let assignments: Vec<(EntityId, i64)> = taxa
        .iter()
        .zip(resolved)
        .filter_map(|(taxon, tax_id)| match tax_id {
            Some(id) if taxon.tax_id != Some(id) => Some((taxon.id, id)),
            _ => None,
        })
        .collect();
    summary.updated = assignments.len() as u64;
    (assignments, summary)
}

/// Map every stored taxon against a names.dmp file and persist the result
pub fn map_tax_ids(store: &dyn TaxonomyStore, names_dmp: &Path) -> Result<MappingSummary> {
    let taxa = store.taxon_names()?;
    let wanted: HashSet<&str> = taxa.iter().map(|t| t.name.as_str()).collect();
    let index = NameIndex::from_reader(BufReader::new(File::open(names_dmp)?), &wanted)?;

    let (assignments, summary) = assign_tax_ids(&taxa, &index);
    store.set_tax_ids(&assignments)?;
    info!(
        taxa = summary.taxa,
        scientific = summary.by_scientific_name,
        other = summary.by_other_name,
        inherited = summary.inherited,
        unmatched = summary.unmatched,
        "NCBI mapping complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NAMES: &str = "\
3701\t|\tArabidopsis\t|\t\t|\tscientific name\t|
3702\t|\tArabidopsis thaliana\t|\t\t|\tscientific name\t|
3702\t|\tthale cress\t|\t\t|\tgenbank common name\t|
4000\t|\tOxalis stricta\t|\t\t|\tscientific name\t|
4001\t|\tOxalis stricta\t|\t\t|\tscientific name\t|
5000\t|\tOxalis europaea\t|\t\t|\tsynonym\t|
";

    fn taxon(id: EntityId, name: &str, plant: i64, accepted: i64) -> TaxonName {
        TaxonName {
            id,
            name: name.to_string(),
            plant_name_id: Some(plant),
            accepted_plant_name_id: Some(accepted),
            tax_id: None,
        }
    }

    fn index_for(taxa: &[TaxonName]) -> NameIndex {
        let wanted: HashSet<&str> = taxa.iter().map(|t| t.name.as_str()).collect();
        NameIndex::from_reader(NAMES.as_bytes(), &wanted).unwrap()
    }

    #[test]
    fn test_parse_names_line() {
        let name = parse_names_line("3702\t|\tthale cress\t|\t\t|\tgenbank common name\t|").unwrap();
        assert_eq!(
            name,
            NcbiName {
                tax_id: 3702,
                name: "thale cress".to_string(),
                class: "genbank common name".to_string(),
            }
        );
        assert!(parse_names_line("3702\t|\tthale cress").is_err());
        assert!(parse_names_line("x\t|\ta\t|\t\t|\tsynonym\t|").is_err());
    }

    #[test]
    fn test_scientific_before_other_names() {
        let taxa = vec![
            taxon(1, "Arabidopsis thaliana", 10, 10),
            taxon(2, "thale cress", 11, 11),
            taxon(3, "Oxalis europaea", 12, 12),
        ];
        let (assignments, summary) = assign_tax_ids(&taxa, &index_for(&taxa));
        assert_eq!(assignments, vec![(1, 3702), (2, 3702), (3, 5000)]);
        assert_eq!(summary.by_scientific_name, 1);
        assert_eq!(summary.by_other_name, 2);
        assert_eq!(summary.unmatched, 0);
    }

    #[test]
    fn test_first_listed_tax_id_wins() {
        let taxa = vec![taxon(1, "Oxalis stricta", 10, 10)];
        let (assignments, _) = assign_tax_ids(&taxa, &index_for(&taxa));
        assert_eq!(assignments, vec![(1, 4000)]);
    }

    #[test]
    fn test_synonym_inherits_from_accepted_name() {
        let taxa = vec![
            taxon(1, "Arabidopsis thaliana", 10, 10),
            taxon(2, "Pilosella thaliana", 11, 10),
            taxon(3, "Unmapped name", 12, 12),
        ];
        let (assignments, summary) = assign_tax_ids(&taxa, &index_for(&taxa));
        assert_eq!(assignments, vec![(1, 3702), (2, 3702)]);
        assert_eq!(summary.inherited, 1);
        assert_eq!(summary.unmatched, 1);
    }

    #[test]
    fn test_unchanged_tax_ids_are_not_rewritten() {
        let mut mapped = taxon(1, "Arabidopsis thaliana", 10, 10);
        mapped.tax_id = Some(3702);
        let taxa = vec![mapped, taxon(2, "Pilosella thaliana", 11, 10)];
        let (assignments, summary) = assign_tax_ids(&taxa, &index_for(&taxa));
        assert_eq!(assignments, vec![(2, 3702)]);
        assert_eq!(summary.updated, 1);
    }
}
