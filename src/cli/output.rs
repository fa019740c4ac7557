/// Standard output utilities for consistent command formatting
use crate::bio::entity::EntityKind;
use crate::graph::ImportSummary;
use crate::report::RunSummary;
use crate::storage::query::Statistics;
use colored::*;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color as TableColor, ContentArrangement, Table};
use serde::Serialize;

pub fn section_header_with_line(title: &str) {
    println!("\n{}", title.bold().cyan());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

pub fn success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn info(message: &str) {
    println!("{} {}", "●".blue(), message);
}

pub fn warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

pub fn tree_item(is_last: bool, label: &str, value: Option<&str>) {
    let prefix = if is_last { "└─" } else { "├─" };
    if let Some(val) = value {
        println!("{} {}: {}", prefix.dimmed(), label, val);
    } else {
        println!("{} {}", prefix.dimmed(), label);
    }
}

/// Create a standard table with our preferred styling
pub fn create_standard_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .add_attribute(Attribute::Bold)
        .fg(TableColor::Cyan)
}

fn number_cell(n: u64) -> Cell {
    Cell::new(format_number(n)).set_alignment(CellAlignment::Right)
}

pub fn format_size(bytes: u64) -> String {
    use humansize::{format_size as hs_format, BINARY};
    hs_format(bytes, BINARY)
}

/// Format a number with thousands separator
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.insert(0, ',');
        }
        result.insert(0, c);
    }
    result
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Rows, per-kind entity counts and skip reasons of an ingestion run
pub fn run_summary_table(summary: &RunSummary) -> Table {
    let mut table = create_standard_table();
    table.set_header(vec![
        header_cell("Entity"),
        header_cell("Created"),
        header_cell("Reused"),
    ]);
    for kind in EntityKind::ALL {
        let created = summary.created(kind);
        let reused = summary.entities_reused.get(&kind).copied().unwrap_or(0);
        table.add_row(vec![
            Cell::new(kind.label()),
            number_cell(created),
            number_cell(reused),
        ]);
    }
    table
}

pub fn print_run_summary(summary: &RunSummary, max_skips: usize) {
    section_header_with_line("Import Summary");
    tree_item(false, "Rows read", Some(&format_number(summary.rows_total)));
    tree_item(false, "Processed", Some(&format_number(summary.rows_processed)));
    tree_item(false, "Skipped", Some(&format_number(summary.rows_skipped)));
    tree_item(
        false,
        "Status upgrades",
        Some(&format_number(summary.status_reconciled)),
    );
    tree_item(
        true,
        "Areas reparented",
        Some(&format_number(summary.areas_reparented)),
    );
    println!("\n{}", run_summary_table(summary));

    if !summary.skipped.is_empty() {
        let mut reasons = create_standard_table();
        reasons.set_header(vec![header_cell("Skip reason"), header_cell("Rows")]);
        for (reason, count) in summary.skips_by_reason() {
            reasons.add_row(vec![Cell::new(reason), number_cell(count)]);
        }
        println!("{}", reasons);

        for skip in summary.skipped.iter().take(max_skips) {
            println!("  {} row {}: {}", "-".dimmed(), skip.row, skip.reason);
        }
        if summary.skipped.len() > max_skips {
            println!(
                "  {}",
                format!("... and {} more", summary.skipped.len() - max_skips).dimmed()
            );
        }
    }

    if summary.interrupted {
        warning("Run was cancelled; rerun to resume from the persisted state");
    }
}

pub fn print_statistics(stats: &Statistics) {
    section_header_with_line("Store Statistics");
    let mut table = create_standard_table();
    table.set_header(vec![header_cell("Entity"), header_cell("Count")]);
    for (kind, count) in &stats.entities {
        table.add_row(vec![Cell::new(kind.label()), number_cell(*count)]);
    }
    println!("{}", table);

    let mut flags = create_standard_table();
    flags.set_header(vec![header_cell("Distribution flag"), header_cell("Set")]);
    flags.add_row(vec![Cell::new("introduced"), number_cell(stats.introduced)]);
    flags.add_row(vec![Cell::new("extinct"), number_cell(stats.extinct)]);
    flags.add_row(vec![
        Cell::new("location_doubtful"),
        number_cell(stats.location_doubtful),
    ]);
    println!("{}", flags);
}

pub fn print_import_summary(summary: &ImportSummary) {
    section_header_with_line("Graph Import");
    tree_item(false, "Store", Some(&summary.store));
    tree_item(false, "Chunks", Some(&format_number(summary.chunks as u64)));
    tree_item(false, "Triples", Some(&format_number(summary.triples)));
    tree_item(false, "Nodes", Some(&format_number(summary.counts.nodes)));
    tree_item(true, "Edges", Some(&format_number(summary.counts.edges)));
    if summary.interrupted {
        warning("Import was cancelled; re-import the archive to complete it");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn test_run_summary_table_lists_every_kind() {
        let mut summary = RunSummary::start();
        summary.entities_created.insert(EntityKind::Family, 1);
        summary.entities_reused.insert(EntityKind::Family, 1);
        let rendered = run_summary_table(&summary).to_string();
        for kind in EntityKind::ALL {
            assert!(rendered.contains(kind.label()));
        }
    }
}
