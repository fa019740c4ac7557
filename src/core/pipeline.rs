/// Batch ingestion: raw rows → normalized records → resolved entities
///
/// Normalization runs in parallel per batch; resolution and persistence run
/// serially in input order so identifiers are deterministic for a given
/// input and starting store. Cancellation is honoured between batches.
use crate::bio::checklist::{RawRow, RowReader};
use crate::core::config::Config;
use crate::core::normalizer::{Normalizer, Outcome};
use crate::core::resolver::EntityResolver;
use crate::report::{RunSummary, SkipReason, SkipRecord};
use crate::storage::traits::RelationalStore;
use crate::utils::progress;
use crate::{FloraError, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Cooperative cancellation shared between a run and whoever stops it
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Pipeline {
    store: Arc<dyn RelationalStore>,
    config: Config,
    show_progress: bool,
}

impl Pipeline {
    pub fn new(store: Arc<dyn RelationalStore>, config: Config) -> Self {
        Self {
            store,
            config,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ingest a names file (optionally joined with distribution columns)
    pub fn run_file<P: AsRef<Path>>(&self, path: P, cancel: &CancellationFlag) -> Result<RunSummary> {
        info!(path = %path.as_ref().display(), "Importing names");
        let reader = RowReader::open(path, self.config.ingest.delimiter_byte()?)?;
        self.run(reader, cancel)
    }

    /// Ingest a distribution file whose rows reference taxa by plant_name_id
    pub fn run_distribution_file<P: AsRef<Path>>(
        &self,
        path: P,
        cancel: &CancellationFlag,
    ) -> Result<RunSummary> {
        info!(path = %path.as_ref().display(), "Importing distributions");
        let reader = RowReader::open(path, self.config.ingest.delimiter_byte()?)?;
        self.run_distributions(reader, cancel)
    }

    pub fn run<I>(&self, rows: I, cancel: &CancellationFlag) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Result<RawRow>>,
    {
        let (resolver, normalizer) = self.prepare()?;
        let mut summary = RunSummary::start();

        self.for_each_batch(rows, cancel, &mut summary, |batch, summary| {
            for outcome in normalizer.normalize_batch(batch) {
                match outcome? {
                    Outcome::Skipped(skip) => summary.record_skip(skip),
                    Outcome::Accepted(record) => match resolver.resolve_row(&record) {
                        Ok(_) => summary.record_processed(),
                        Err(err) => settle_row_error(err, record.row, summary)?,
                    },
                }
            }
            Ok(())
        })?;

        self.finish(&resolver, summary)
    }

    pub fn run_distributions<I>(&self, rows: I, cancel: &CancellationFlag) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Result<RawRow>>,
    {
        let (resolver, normalizer) = self.prepare()?;
        let mut summary = RunSummary::start();

        self.for_each_batch(rows, cancel, &mut summary, |batch, summary| {
            for outcome in normalizer.normalize_distribution_batch(batch) {
                let row = match outcome? {
                    Outcome::Skipped(skip) => {
                        summary.record_skip(skip);
                        continue;
                    }
                    Outcome::Accepted(row) => row,
                };

                let Some(taxon_id) = resolver.taxon_for_plant_name(row.plant_name_id)? else {
                    let reason = SkipReason::UnresolvedTaxon(row.plant_name_id);
                    warn!(row = row.row, reason = %reason, "Skipping row");
                    summary.record_skip(SkipRecord {
                        row: row.row,
                        reason,
                    });
                    continue;
                };

                let resolved = resolver
                    .resolve_geography(&row.geography)
                    .and_then(|area_ids| match area_ids.last() {
                        Some(&area_id) => resolver
                            .resolve_distribution(taxon_id, area_id, row.flags)
                            .map(Some),
                        None => Ok(None),
                    });
                match resolved {
                    Ok(_) => summary.record_processed(),
                    Err(err) => settle_row_error(err, row.row, summary)?,
                }
            }
            Ok(())
        })?;

        self.finish(&resolver, summary)
    }

    fn prepare(&self) -> Result<(EntityResolver, Normalizer)> {
        self.config.validate()?;
        self.store.create_schema()?;
        let resolver = EntityResolver::open(
            Arc::clone(&self.store),
            &self.config.ingest.unknown_sentinel,
        )?;
        Ok((resolver, Normalizer::new(&self.config.ingest)))
    }

    /// Pull rows in batches and hand each batch to `process` inside a store
    /// batch. A fatal error rolls the whole batch back; earlier batches stay
    /// committed.
    fn for_each_batch<I, F>(
        &self,
        rows: I,
        cancel: &CancellationFlag,
        summary: &mut RunSummary,
        mut process: F,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Result<RawRow>>,
        F: FnMut(&[RawRow], &mut RunSummary) -> Result<()>,
    {
        let batch_size = self.config.ingest.batch_size.max(1);
        let spinner = progress::spinner("rows", self.show_progress);
        let mut rows = rows.into_iter();
        let mut batch = Vec::with_capacity(batch_size);

        loop {
            if cancel.is_cancelled() {
                warn!(rows = summary.rows_total, "Run cancelled between batches");
                summary.interrupted = true;
                break;
            }

            batch.clear();
            for row in rows.by_ref().take(batch_size) {
                batch.push(row?);
            }
            if batch.is_empty() {
                break;
            }

            self.store.begin_batch()?;
            if let Err(err) = process(&batch, summary) {
                if let Err(rollback) = self.store.rollback_batch() {
                    warn!(error = %rollback, "Rollback after fatal error failed");
                }
                return Err(err);
            }
            self.store.commit_batch()?;

            spinner.inc(batch.len() as u64);
        }

        spinner.finish_and_clear();
        Ok(())
    }

    fn finish(&self, resolver: &EntityResolver, mut summary: RunSummary) -> Result<RunSummary> {
        let counts = resolver.counts();
        summary.entities_created = counts.created;
        summary.entities_reused = counts.reused;
        summary.status_reconciled = counts.status_reconciled;
        summary.areas_reparented = counts.areas_reparented;
        summary.finish();

        info!(
            rows = summary.rows_total,
            processed = summary.rows_processed,
            skipped = summary.rows_skipped,
            created = summary.total_created(),
            interrupted = summary.interrupted,
            "Import finished"
        );
        Ok(summary)
    }
}

/// Unsettled key conflicts skip the row; every other error ends the run
fn settle_row_error(err: FloraError, row: u64, summary: &mut RunSummary) -> Result<()> {
    match err {
        FloraError::Conflict(detail) => {
            let reason = SkipReason::PersistenceConflict(detail);
            warn!(row, reason = %reason, "Skipping row");
            summary.record_skip(SkipRecord { row, reason });
            Ok(())
        }
        other => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::entity::EntityKind;
    use crate::storage::query::ReadStore;
    use crate::storage::sqlite::SqliteStore;

    fn names_row(number: u64, id: &str, family: &str, genus: &str, species: &str) -> Result<RawRow> {
        Ok(RawRow::from_pairs(
            number,
            [
                ("plant_name_id", id),
                ("taxon_rank", "Species"),
                ("taxon_status", "Accepted"),
                ("family", family),
                ("genus", genus),
                ("species", species),
            ],
        ))
    }

    fn pipeline(store: &SqliteStore) -> Pipeline {
        let mut config = Config::default();
        config.ingest.batch_size = 2;
        Pipeline::new(Arc::new(store.clone()), config)
    }

    #[test]
    fn test_counts_add_up_with_skips() {
        let store = SqliteStore::memory().unwrap();
        let rows = vec![
            names_row(1, "1", "Oxalidaceae", "Oxalis", "acetosella"),
            names_row(2, "2", "Oxalidaceae", "", "sensitivum"),
            names_row(3, "3", "Oxalidaceae", "Biophytum", "sensitivum"),
        ];

        let summary = pipeline(&store).run(rows, &CancellationFlag::new()).unwrap();
        assert_eq!(summary.rows_total, 3);
        assert_eq!(summary.rows_processed + summary.rows_skipped, 3);
        assert_eq!(summary.skipped[0].reason.to_string(), "missing-required-field: genus");
        assert_eq!(summary.created(EntityKind::Family), 1);
        assert_eq!(summary.created(EntityKind::Taxon), 2);
    }

    #[test]
    fn test_cancelled_run_stops_before_first_batch() {
        let store = SqliteStore::memory().unwrap();
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let rows = vec![names_row(1, "1", "Oxalidaceae", "Oxalis", "acetosella")];
        let summary = pipeline(&store).run(rows, &cancel).unwrap();
        assert!(summary.interrupted);
        assert_eq!(summary.rows_total, 0);
    }

    #[test]
    fn test_type_mismatch_is_fatal() {
        let store = SqliteStore::memory().unwrap();
        let rows = vec![names_row(1, "abc", "Oxalidaceae", "Oxalis", "acetosella")];
        let err = pipeline(&store).run(rows, &CancellationFlag::new()).unwrap_err();
        assert!(matches!(err, FloraError::TypeMismatch { row: 1, .. }));
    }

    #[test]
    fn test_fatal_error_rolls_back_its_batch() {
        let store = SqliteStore::memory().unwrap();
        let mut config = Config::default();
        config.ingest.batch_size = 3;
        let p = Pipeline::new(Arc::new(store.clone()), config);

        let rows = vec![
            names_row(1, "1", "Oxalidaceae", "Oxalis", "acetosella"),
            names_row(2, "2", "Oxalidaceae", "Oxalis", "corniculata"),
            names_row(3, "3", "Oxalidaceae", "Oxalis", "stricta"),
            names_row(4, "4", "Fabaceae", "Lupinus", "albus"),
            names_row(5, "5", "Fabaceae", "Lupinus", "luteus"),
            names_row(6, "abc", "Fabaceae", "Lupinus", "angustifolius"),
        ];
        let err = p.run(rows, &CancellationFlag::new()).unwrap_err();
        assert!(matches!(err, FloraError::TypeMismatch { row: 6, .. }));

        // first batch committed, second batch discarded entirely
        assert!(store.taxon_by_plant_name_id(1).unwrap().is_some());
        assert!(store.taxon_by_plant_name_id(3).unwrap().is_some());
        assert!(store.taxon_by_plant_name_id(4).unwrap().is_none());
        assert!(store.taxon_by_plant_name_id(5).unwrap().is_none());
        assert_eq!(store.max_id(EntityKind::Family).unwrap(), 1);
        assert_eq!(store.max_id(EntityKind::Genus).unwrap(), 1);
    }

    #[test]
    fn test_distribution_rows_need_known_taxon() {
        let store = SqliteStore::memory().unwrap();
        let p = pipeline(&store);
        p.run(
            vec![names_row(1, "2549024", "Picramniaceae", "Picramnia", "polyantha")],
            &CancellationFlag::new(),
        )
        .unwrap();

        let rows = vec![
            Ok(RawRow::from_pairs(
                1,
                [
                    ("plant_name_id", "2549024"),
                    ("continent_code_l1", "8"),
                    ("continent", "SOUTHERN AMERICA"),
                    ("introduced", "0"),
                    ("extinct", "0"),
                ],
            )),
            Ok(RawRow::from_pairs(
                2,
                [("plant_name_id", "42"), ("continent", "AFRICA")],
            )),
        ];
        let summary = p.run_distributions(rows, &CancellationFlag::new()).unwrap();
        assert_eq!(summary.rows_processed, 1);
        assert_eq!(summary.skipped[0].reason, SkipReason::UnresolvedTaxon(42));

        let taxa = store.taxa_in_area("southern america", Default::default()).unwrap();
        assert_eq!(taxa.len(), 1);
        assert_eq!(taxa[0].name, "Picramnia polyantha");
    }
}
