//! Table formatting using comfy-table.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use kgcheck::RunReport;

fn styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header_cell(text: &str) -> Cell {
    if super::no_color() {
        Cell::new(text)
    } else {
        Cell::new(text).add_attribute(Attribute::Bold).fg(Color::Cyan)
    }
}

fn verdict_cell(passed: bool) -> Cell {
    let text = if passed { "PASS" } else { "FAIL" };
    if super::no_color() {
        Cell::new(text)
    } else if passed {
        Cell::new(text).fg(Color::Green)
    } else {
        Cell::new(text).fg(Color::Red).add_attribute(Attribute::Bold)
    }
}

/// Creates the per-client summary table of a run.
pub fn report_table(reports: &[RunReport]) -> Table {
    let mut table = styled_table();
    table.set_header(
        ["client", "seed", "steps", "adds", "reconciled", "MRC", "RYWC", "result"]
            .map(header_cell),
    );

    for report in reports {
        table.add_row(vec![
            Cell::new(report.client_id.as_str()),
            Cell::new(report.seed),
            Cell::new(report.steps),
            Cell::new(report.adds),
            Cell::new(report.reconciliations),
            Cell::new(report.mrc_violations()),
            Cell::new(report.rywc_violations()),
            verdict_cell(report.passed()),
        ]);
    }

    table
}

/// Creates a key-value info table (two columns: key and value).
pub fn info_table(entries: &[(&str, String)]) -> Table {
    let mut table = styled_table();

    for (key, value) in entries {
        let key_cell = if super::no_color() {
            Cell::new(key)
        } else {
            Cell::new(key).fg(Color::DarkGrey)
        };
        table.add_row(vec![key_cell, Cell::new(value)]);
    }

    table
}

/// Prints a key-value info table.
pub fn print_info_table(entries: &[(&str, String)]) {
    println!("{}", info_table(entries));
}
