//! Print what the reconciler sees in a workbook: cell grid, merged ranges, and the resolved column and
//! row maps.
//!
//! Usage: dump_excel <xlsx> [sheet] [config.toml]

use anyhow::{bail, Context, Result};
use std::path::Path;

use invoice_reconciler_lib::excel::load_workbook;
use invoice_reconciler_lib::models::cell_ref;
use invoice_reconciler_lib::{Engine, EngineConfig};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(path) = args.first() else {
        bail!("usage: dump_excel <xlsx> [sheet] [config.toml]");
    };
    let mut config = match args.get(2) {
        Some(p) => EngineConfig::load(p).with_context(|| format!("Failed to load config {}", p))?,
        None => EngineConfig::default(),
    };
    if let Some(sheet) = args.get(1) {
        config.layout.main_sheet = Some(sheet.clone());
    }

    let workbook = load_workbook(Path::new(path))?;
    println!("Sheets: {}", workbook.sheet_names().join(", "));
    let name = config
        .layout
        .main_sheet
        .clone()
        .or_else(|| workbook.first_sheet().map(|s| s.name().to_string()))
        .unwrap_or_default();
    let Some(sheet) = workbook.sheet(&name) else {
        bail!("Worksheet '{}' not found", name);
    };

    println!("\n== {} ({} rows x {} cols) ==", name, sheet.max_row(), sheet.max_col());
    let last_row = sheet.max_row().min(config.layout.header_rows + config.layout.row_scan_limit);
    for row in 1..=last_row {
        let cells: Vec<String> = (1..=sheet.max_col())
            .filter(|col| !sheet.value(row, *col).is_empty())
            .map(|col| format!("{}={:?}", cell_ref(row, col), sheet.value(row, col).as_text()))
            .collect();
        if !cells.is_empty() {
            println!("{:>4}: {}", row, cells.join("  "));
        }
    }

    println!("\nMerged ranges:");
    for range in sheet.merged_ranges() {
        println!("  {} (value: {:?})", range, sheet.display_text(range.first_row, range.first_col));
    }

    let engine = Engine::new(config)?;
    match engine.resolve_layout(&workbook) {
        Ok(layout) => {
            println!("\nColumns: {}", layout.columns);
            println!("Rows:");
            for (region, row) in layout.rows.iter() {
                println!("  {:<30} row {}", engine.resolver().name(region), row);
            }
            let missing: Vec<&str> = engine
                .resolver()
                .regions()
                .filter(|r| layout.rows.get(*r).is_none())
                .map(|r| engine.resolver().name(r))
                .collect();
            if !missing.is_empty() {
                println!("No row for: {}", missing.join(", "));
            }
        }
        Err(e) => println!("\nLayout error: {}", e),
    }
    Ok(())
}
