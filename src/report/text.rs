use crate::bio::entity::EntityKind;
use crate::report::RunSummary;
use std::fmt::Write;

pub fn generate_text_report(summary: &RunSummary, max_skips: usize) -> String {
    let mut output = String::new();

    // Writing into a String cannot fail
    let _ = write_report(&mut output, summary, max_skips);
    output
}

fn write_report(output: &mut String, summary: &RunSummary, max_skips: usize) -> std::fmt::Result {
    writeln!(output, "Run Summary")?;
    writeln!(output, "===========")?;
    if summary.interrupted {
        writeln!(output, "(interrupted: resume by re-running the same input)")?;
    }
    writeln!(output)?;

    // Export runs read no rows
    let is_export = summary.rows_total == 0 && summary.triples_emitted > 0;
    if !is_export {
        writeln!(output, "Rows")?;
        writeln!(output, "----")?;
        writeln!(output, "- Total:     {:8}", summary.rows_total)?;
        writeln!(output, "- Processed: {:8}", summary.rows_processed)?;
        writeln!(output, "- Skipped:   {:8}", summary.rows_skipped)?;
        for (reason, count) in summary.skips_by_reason() {
            writeln!(output, "    {}: {}", reason, count)?;
        }
        writeln!(output)?;
    }

    if summary.total_created() > 0 || !summary.entities_reused.is_empty() {
        writeln!(output, "Entities")?;
        writeln!(output, "--------")?;
        for kind in EntityKind::ALL {
            let created = summary.created(kind);
            let reused = summary.entities_reused.get(&kind).copied().unwrap_or(0);
            if created + reused > 0 {
                writeln!(
                    output,
                    "- {:<16} {:8} created {:10} reused",
                    kind.label(),
                    created,
                    reused
                )?;
            }
        }
        if summary.status_reconciled > 0 {
            writeln!(output, "- Status upgrades: {}", summary.status_reconciled)?;
        }
        if summary.areas_reparented > 0 {
            writeln!(output, "- Areas reparented: {}", summary.areas_reparented)?;
        }
        writeln!(output)?;
    }

    if summary.triples_emitted > 0 {
        writeln!(output, "Triples emitted: {}", summary.triples_emitted)?;
        writeln!(output)?;
    }

    if !summary.skipped.is_empty() && max_skips > 0 {
        writeln!(output, "Skipped Rows")?;
        writeln!(output, "------------")?;
        for skip in summary.skipped.iter().take(max_skips) {
            writeln!(output, "  row {:>8}: {}", skip.row, skip.reason)?;
        }
        if summary.skipped.len() > max_skips {
            writeln!(output, "  ... and {} more", summary.skipped.len() - max_skips)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{SkipReason, SkipRecord};

    #[test]
    fn test_text_report_lists_skips() {
        let mut summary = RunSummary::default();
        summary.record_processed();
        summary.record_skip(SkipRecord {
            row: 2,
            reason: SkipReason::MissingRequiredField("genus".to_string()),
        });
        summary.entities_created.insert(EntityKind::Taxon, 1);

        let text = generate_text_report(&summary, 5);
        assert!(text.contains("Skipped:          1"));
        assert!(text.contains("row        2: missing-required-field: genus"));
        assert!(text.contains("Taxon"));
    }
}
