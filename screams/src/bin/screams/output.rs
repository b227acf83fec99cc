use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{Attribute, Cell, CellAlignment, Color as TableColor, Table};

use screams::repair::RepairReport;

/// Output format options for CLI commands
#[derive(Clone, Debug, ValueEnum, Default, PartialEq)]
pub enum OutputFormat {
    /// Formatted table output (default)
    #[default]
    Table,
    /// JSON output for scripting
    Json,
}

pub fn repair_table(report: &RepairReport) -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL_CONDENSED);
    table.set_header(
        ["Scream", "Counter", "Stored", "Actual"]
            .into_iter()
            .map(|title| Cell::new(title).add_attribute(Attribute::Bold)),
    );
    for correction in &report.corrections {
        table.add_row(vec![
            Cell::new(&correction.scream_id),
            Cell::new(correction.field),
            Cell::new(correction.stored)
                .fg(TableColor::Red)
                .set_alignment(CellAlignment::Right),
            Cell::new(correction.actual)
                .fg(TableColor::Green)
                .set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

pub fn print_repair_report(report: &RepairReport, format: &OutputFormat) -> Result<()> {
    if report.skipped > 0 && *format == OutputFormat::Table {
        println!(
            "{} {} screams changed while scanning; rerun to check them",
            "!".yellow().bold(),
            report.skipped
        );
    }
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Table if report.is_clean() => {
            println!(
                "{} counters consistent across {} screams",
                "✓".green().bold(),
                report.scanned
            );
        }
        OutputFormat::Table => {
            println!("{}", repair_table(report));
            println!(
                "{} corrected {} counters across {} screams",
                "!".yellow().bold(),
                report.corrections.len(),
                report.scanned
            );
        }
    }
    Ok(())
}
