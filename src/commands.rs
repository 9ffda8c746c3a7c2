//! Command implementations behind the CLI: input validation, document loading, the reconcile run,
//! run history and configuration output.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::db::{default_db_path, Db};
use crate::document;
use crate::engine::Engine;
use crate::excel;
use crate::ocr;
use crate::types::{BatchNotice, BatchSummary, ExtractedDocument, UnreadableDocument};

const MAX_DOCUMENT_BYTES: u64 = 50 * 1024 * 1024;
const MAX_WORKBOOK_BYTES: u64 = 100 * 1024 * 1024;
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

#[derive(Debug, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    fn invalid(error: &str) -> Self {
        Self {
            valid: false,
            error: Some(error.to_string()),
        }
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Size cap for all documents; PDFs must also carry the `%PDF-` header.
pub fn validate_document_file(path: &Path) -> io::Result<ValidationResult> {
    if !path.exists() {
        return Ok(ValidationResult::invalid("File not found."));
    }
    let metadata = fs::metadata(path)?;
    if metadata.len() > MAX_DOCUMENT_BYTES {
        return Ok(ValidationResult::invalid("File too large (max 50MB)."));
    }
    if extension(path) != "pdf" {
        return Ok(ValidationResult::ok());
    }
    let mut f = fs::File::open(path)?;
    let mut header = [0u8; 8];
    if f.read(&mut header).unwrap_or(0) < 5 {
        return Ok(ValidationResult::invalid("Not a valid PDF (could not read header)."));
    }
    if !header.starts_with(b"%PDF-") {
        return Ok(ValidationResult::invalid("Not a valid PDF file."));
    }
    Ok(ValidationResult::ok())
}

/// Exists, below the size cap, zip header, and not locked by another program.
pub fn validate_excel_file(path: &Path) -> io::Result<ValidationResult> {
    if !path.exists() {
        return Ok(ValidationResult::invalid("File not found."));
    }
    let metadata = fs::metadata(path)?;
    if metadata.len() > MAX_WORKBOOK_BYTES {
        return Ok(ValidationResult::invalid("File too large (max 100MB)."));
    }
    let mut f = fs::File::open(path)?;
    let mut header = [0u8; 4];
    if f.read(&mut header).unwrap_or(0) < 4 {
        return Ok(ValidationResult::invalid(
            "Not a valid Excel file (could not read header).",
        ));
    }
    if header != [0x50, 0x4B, 0x03, 0x04] {
        return Ok(ValidationResult::invalid("Not a valid Excel file (.xlsx)."));
    }
    match fs::OpenOptions::new().write(true).open(path) {
        Ok(_) => Ok(ValidationResult::ok()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Ok(ValidationResult::invalid(
            "Excel file is open. Please close it and try again.",
        )),
        Err(e) => Err(e),
    }
}

/// Turn one input path into an extracted document. Failures become per-document notices, never
/// batch errors.
pub fn read_document(path: &Path) -> std::result::Result<ExtractedDocument, UnreadableDocument> {
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let unreadable = |reason: String| UnreadableDocument {
        source: source.clone(),
        reason,
    };

    let ext = extension(path);
    if ext == "json" {
        return document::load_extracted(path).map_err(|e| unreadable(e.to_string()));
    }
    if ext != "pdf" && !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return Err(unreadable(format!("Unsupported document type '.{}'", ext)));
    }
    match validate_document_file(path) {
        Ok(v) if !v.valid => return Err(unreadable(v.error.unwrap_or_default())),
        Err(e) => return Err(unreadable(e.to_string())),
        Ok(_) => {}
    }
    if !ocr::is_configured() {
        return Err(unreadable(
            "OCR is not configured: set AZURE_OCR_KEY and AZURE_OCR_ENDPOINT (or pass a .json sidecar)".into(),
        ));
    }
    ocr::analyze_layout(path).map_err(|e| unreadable(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct ReconcileArgs {
    pub workbook: PathBuf,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub history: Option<PathBuf>,
    pub json: bool,
    pub documents: Vec<PathBuf>,
}

pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::load(p).with_context(|| format!("Failed to load config {}", p.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn open_history(path: Option<&Path>) -> Option<Db> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_db_path);
    match Db::new(&path) {
        Ok(db) => Some(db),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "run history unavailable");
            None
        }
    }
}

pub fn cmd_reconcile(args: &ReconcileArgs) -> Result<BatchSummary> {
    let config = load_config(args.config.as_deref())?;
    let validation = validate_excel_file(&args.workbook)
        .with_context(|| format!("Could not check {}", args.workbook.display()))?;
    if !validation.valid {
        bail!(
            "{}: {}",
            args.workbook.display(),
            validation.error.unwrap_or_default()
        );
    }
    if args.documents.is_empty() {
        bail!("No documents given");
    }

    let engine = Engine::new(config)?;
    let output = args.output.clone().unwrap_or_else(|| args.workbook.clone());
    let history = open_history(args.history.as_deref());
    let workbook_path = args.workbook.display().to_string();

    info!(workbook = %workbook_path, documents = args.documents.len(), "starting reconciliation");
    let result = excel::load_workbook(&args.workbook).and_then(|mut workbook| {
        let documents = args.documents.iter().map(|p| read_document(p));
        engine.run_and_persist(&mut workbook, documents, |wb| {
            excel::save_workbook(wb, &args.workbook, &output)
        })
    });

    match result {
        Ok(summary) => {
            if let Some(db) = &history {
                let output_path = args.output.as_ref().map(|p| p.display().to_string());
                if let Err(e) = db.record_run(&workbook_path, output_path.as_deref(), &summary, engine.resolver()) {
                    warn!(error = %e, "could not record run history");
                }
            }
            print_summary(&summary, args.json)?;
            Ok(summary)
        }
        Err(e) => {
            if let Some(db) = &history {
                if let Err(db_err) = db.record_failure(&workbook_path, &e.to_string()) {
                    warn!(error = %db_err, "could not record run history");
                }
            }
            Err(e).with_context(|| format!("Reconciliation of {} failed", workbook_path))
        }
    }
}

fn describe_notice(notice: &BatchNotice) -> String {
    match notice {
        BatchNotice::UnresolvedRegion { source, identifier } => {
            format!("{}: region not found ({})", source, identifier)
        }
        BatchNotice::Duplicate { source, identifier } => {
            format!("{}: already ingested ({})", source, identifier)
        }
        BatchNotice::FileNameIdentifier { source } => {
            format!("{}: no authorization UUID, file name used as identifier", source)
        }
        BatchNotice::HighGroceryRatio {
            source,
            identifier,
            ratio,
        } => format!("{}: groceries are {:.0}% of spending ({})", source, ratio * 100.0, identifier),
        BatchNotice::UnreadableDocument { source, reason } => format!("{}: unreadable ({})", source, reason),
        BatchNotice::RegionWithoutRow { region } => {
            format!("{}: no row in the report, totals not written", region)
        }
    }
}

pub fn print_summary(summary: &BatchSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    println!(
        "New: {}  Skipped: {}  Unresolved: {}  Unreadable: {}",
        summary.new_count, summary.skipped_count, summary.unresolved_count, summary.unreadable_count
    );
    if !summary.totals.is_empty() {
        println!();
        println!(
            "{:<30} {:>12} {:>12} {:>8} {:>8}",
            "Region", "Groceries", "Agriculture", "Schools", "Issuers"
        );
        for totals in summary.totals.values() {
            println!(
                "{:<30} {:>12.2} {:>12.2} {:>8} {:>8}",
                totals.region,
                totals.sums.groceries,
                totals.sums.agriculture,
                totals.establishments,
                totals.producers
            );
        }
    }
    if !summary.notices.is_empty() {
        println!();
        for notice in &summary.notices {
            let marker = if notice.is_warning() { "!" } else { "-" };
            println!("{} {}", marker, describe_notice(notice));
        }
    }
    Ok(())
}

pub fn cmd_history(history: Option<&Path>, limit: usize, json: bool) -> Result<()> {
    let path = history.map(Path::to_path_buf).unwrap_or_else(default_db_path);
    let db = Db::new(&path).with_context(|| format!("Could not open history {}", path.display()))?;
    let runs = db.recent_runs(limit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    if runs.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }
    for run in runs {
        println!(
            "#{:<4} {}  {:<9} new={} skipped={} unresolved={} unreadable={}  {}",
            run.id,
            run.created_at,
            run.status,
            run.new_count,
            run.skipped_count,
            run.unresolved_count,
            run.unreadable_count,
            run.workbook_path
        );
        if let Some(err) = run.error_message {
            println!("       {}", err);
        }
    }
    Ok(())
}

pub fn cmd_config(config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    print!("{}", config.to_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_excel_file_rejects_non_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("informe.xlsx");
        fs::write(&path, b"not a zip").unwrap();
        let result = validate_excel_file(&path).unwrap();
        assert!(!result.valid);
        assert_eq!(result.error.as_deref(), Some("Not a valid Excel file (.xlsx)."));

        let missing = validate_excel_file(&dir.path().join("nope.xlsx")).unwrap();
        assert_eq!(missing.error.as_deref(), Some("File not found."));
    }

    #[test]
    fn test_validate_document_file_pdf_header() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.pdf");
        fs::write(&good, b"%PDF-1.7\n...").unwrap();
        assert!(validate_document_file(&good).unwrap().valid);

        let bad = dir.path().join("b.pdf");
        fs::write(&bad, b"<html>").unwrap();
        assert!(!validate_document_file(&bad).unwrap().valid);
    }

    #[test]
    fn test_read_document_failures_are_per_document() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("notas.txt");
        fs::write(&txt, "hola").unwrap();
        let err = read_document(&txt).unwrap_err();
        assert_eq!(err.source, "notas.txt");

        let bad_pdf = dir.path().join("roto.pdf");
        fs::write(&bad_pdf, b"xx").unwrap();
        let err = read_document(&bad_pdf).unwrap_err();
        assert!(err.reason.contains("PDF"));
    }

    #[test]
    fn test_read_document_without_ocr_credentials() {
        if ocr::is_configured() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("factura.pdf");
        fs::write(&pdf, b"%PDF-1.7\n%%EOF").unwrap();
        let err = read_document(&pdf).unwrap_err();
        assert_eq!(err.source, "factura.pdf");
        assert!(err.reason.contains("OCR is not configured"));
    }

    #[test]
    fn test_read_json_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("momo.json");
        fs::write(&path, r#"{"source": "momo.pdf", "text": "Momostenango"}"#).unwrap();
        let doc = read_document(&path).unwrap();
        assert_eq!(doc.source, "momo.pdf");
    }
}
