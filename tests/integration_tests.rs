//! End-to-end runs against real .xlsx files: fixture built with rust_xlsxwriter, loaded with calamine,
//! saved with edit_xlsx, reloaded.

use std::fs;
use std::path::{Path, PathBuf};

use invoice_reconciler_lib::commands::{cmd_reconcile, ReconcileArgs};
use invoice_reconciler_lib::db::Db;
use invoice_reconciler_lib::excel::{load_workbook, save_workbook};
use invoice_reconciler_lib::models::CellValue;
use invoice_reconciler_lib::{Engine, EngineConfig, ExtractedDocument};
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};

const MOMO_TEXT: &str = "DOCUMENTO TRIBUTARIO ELECTRÓNICO\nFactura\nAGROSERVICIOS LA COSECHA\n\
NIT Emisor: 1234567-8\nNúmero de Autorización:\n3F2A9C10-4B7D-4E21-9A0C-5D6E7F8A9B01\n\
NIT Receptor: 7654321\nCantón Xequemeya, Momostenango, Totonicapán";

/// Title row, header on row 3 with "Proveedores" merged over E3:F3 and "Cantidad | Total" beneath,
/// one row per municipality from row 5.
fn build_report(path: &Path) {
    let mut workbook = XlsxWorkbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Informe").unwrap();
    sheet
        .merge_range(0, 0, 0, 5, "INFORME DE COMPRAS - TOTONICAPÁN", &bold)
        .unwrap();
    sheet.write_string(2, 0, "Municipio").unwrap();
    sheet.write_string(2, 1, "Escuelas").unwrap();
    sheet.write_string(2, 2, "Abarrotes (Q)").unwrap();
    sheet.write_string(2, 3, "Agricultura Familiar (Q)").unwrap();
    sheet.merge_range(2, 4, 2, 5, "Proveedores", &bold).unwrap();
    sheet.write_string(3, 4, "Cantidad").unwrap();
    sheet.write_string(3, 5, "Total").unwrap();
    let regions = [
        "Totonicapán",
        "San Cristóbal Totonicapán",
        "San Francisco El Alto",
        "Momostenango",
    ];
    for (i, region) in regions.iter().enumerate() {
        sheet.write_string(4 + i as u32, 0, *region).unwrap();
    }
    // Momostenango agriculture already carries a prior total.
    sheet.write_number(7, 3, 100.0).unwrap();
    workbook.save(path).unwrap();
}

fn momo_doc() -> ExtractedDocument {
    let row = |cells: &[&str]| cells.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    ExtractedDocument::new("momo.pdf", MOMO_TEXT).with_table(vec![
        row(&["Cant.", "Descripción", "P. Unitario", "Total"]),
        row(&["10", "Tomate", "Q22,50", "Q225,00"]),
    ])
}

fn fixture() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("informe.xlsx");
    build_report(&path);
    (dir, path)
}

#[test]
fn test_load_reads_merged_header() {
    let (_dir, path) = fixture();
    let workbook = load_workbook(&path).unwrap();
    let sheet = workbook.sheet("Informe").unwrap();
    assert_eq!(sheet.writable_cell(3, 6), (3, 5));
    assert_eq!(sheet.display_text(3, 6), "Proveedores");
    assert_eq!(sheet.value(8, 4), &CellValue::Number(100.0));

    let engine = Engine::new(EngineConfig::default()).unwrap();
    let layout = engine.resolve_layout(&workbook).unwrap();
    assert_eq!(layout.columns.to_string(), "{abarrotes=C, agricultura=D, escuelas=B, productores=F}");
    assert_eq!(layout.rows.len(), 4);
}

#[test]
fn test_reconcile_save_reload_and_rerun() {
    let (dir, path) = fixture();
    let output = dir.path().join("informe_out.xlsx");
    let engine = Engine::new(EngineConfig::default()).unwrap();

    let mut workbook = load_workbook(&path).unwrap();
    let summary = engine
        .run_and_persist(&mut workbook, vec![Ok(momo_doc())], |wb| save_workbook(wb, &path, &output))
        .unwrap();
    assert_eq!(summary.new_count, 1);

    let reloaded = load_workbook(&output).unwrap();
    let main = reloaded.sheet("Informe").unwrap();
    assert_eq!(main.value(8, 4).as_amount(), 325.0);
    assert_eq!(main.value(8, 2).as_amount(), 1.0);
    assert_eq!(main.value(8, 6).as_amount(), 1.0);
    // Merged title untouched.
    assert_eq!(main.display_text(1, 3), "INFORME DE COMPRAS - TOTONICAPÁN");

    let audit = reloaded.sheet("Detalle Facturas").unwrap();
    assert_eq!(audit.display_text(1, 1), "Emisor");
    assert_eq!(audit.display_text(2, 4), "3F2A9C10-4B7D-4E21-9A0C-5D6E7F8A9B01");
    assert_eq!(audit.display_text(2, 5), "Momostenango");

    // Second run over the saved file: nothing new, totals unchanged.
    let mut again = load_workbook(&output).unwrap();
    let summary = engine
        .run_and_persist(&mut again, vec![Ok(momo_doc())], |wb| save_workbook(wb, &output, &output))
        .unwrap();
    assert_eq!(summary.new_count, 0);
    assert_eq!(summary.skipped_count, 1);
    let reloaded = load_workbook(&output).unwrap();
    assert_eq!(reloaded.sheet("Informe").unwrap().value(8, 4).as_amount(), 325.0);
    assert_eq!(reloaded.sheet("Detalle Facturas").unwrap().max_row(), 2);
}

#[test]
fn test_cmd_reconcile_with_sidecars_records_history() {
    let (dir, path) = fixture();
    let sidecar = dir.path().join("momo.json");
    fs::write(&sidecar, serde_json::to_string(&momo_doc()).unwrap()).unwrap();
    let broken = dir.path().join("roto.json");
    fs::write(&broken, "{").unwrap();
    let history = dir.path().join("history.db");

    let args = ReconcileArgs {
        workbook: path.clone(),
        output: None,
        config: None,
        history: Some(history.clone()),
        json: true,
        documents: vec![sidecar.clone(), broken],
    };
    let summary = cmd_reconcile(&args).unwrap();
    assert_eq!(summary.new_count, 1);
    assert_eq!(summary.unreadable_count, 1);

    let rerun = cmd_reconcile(&ReconcileArgs {
        documents: vec![sidecar],
        ..args
    })
    .unwrap();
    assert_eq!(rerun.skipped_count, 1);

    let db = Db::new(&history).unwrap();
    let runs = db.recent_runs(10).unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].skipped_count, 1);
    assert_eq!(runs[1].unreadable_count, 1);
}

#[test]
fn test_missing_columns_leave_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vacio.xlsx");
    let mut workbook = XlsxWorkbook::new();
    workbook.add_worksheet().write_string(0, 0, "Abarrotes").unwrap();
    workbook.save(&path).unwrap();
    let before = fs::read(&path).unwrap();

    let args = ReconcileArgs {
        workbook: path.clone(),
        output: None,
        config: None,
        history: Some(dir.path().join("history.db")),
        json: false,
        documents: vec![dir.path().join("momo.json")],
    };
    let err = cmd_reconcile(&args).unwrap_err();
    assert!(format!("{:#}", err).contains("Could not find the base category columns"));
    assert_eq!(fs::read(&path).unwrap(), before);
}
