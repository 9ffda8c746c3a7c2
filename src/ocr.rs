//! Azure Document Intelligence `prebuilt-layout` adapter: binary document → text + table rows.

use reqwest::blocking::Client;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::ExtractedDocument;

const API_VERSION: &str = "2024-11-30";
const POLL_ATTEMPTS: usize = 60;
const POLL_INTERVAL: Duration = Duration::from_secs(2);

fn load_env() {
    let _ = dotenvy::dotenv();
}

/// True when both Azure variables are present (after loading `.env`).
pub fn is_configured() -> bool {
    load_env();
    std::env::var("AZURE_OCR_KEY").is_ok() && std::env::var("AZURE_OCR_ENDPOINT").is_ok()
}

/// Send a document to `prebuilt-layout` and poll until the analysis completes.
pub fn analyze_layout(path: &Path) -> Result<ExtractedDocument> {
    load_env();
    let key = std::env::var("AZURE_OCR_KEY").map_err(|_| Error::Ocr("AZURE_OCR_KEY not set in .env".into()))?;
    let endpoint = std::env::var("AZURE_OCR_ENDPOINT")
        .map_err(|_| Error::Ocr("AZURE_OCR_ENDPOINT not set in .env".into()))?;
    let endpoint = endpoint.trim_end_matches('/');
    let url = format!(
        "{}/documentintelligence/documentModels/prebuilt-layout:analyze?api-version={}",
        endpoint, API_VERSION
    );

    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::Ocr("File not found.".to_string())
        } else {
            Error::Ocr(format!("Could not read file: {}", e))
        }
    })?;
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let client = Client::builder().timeout(Duration::from_secs(120)).build()?;

    info!(source = %source, "sending document to layout analysis");
    let response = client
        .post(&url)
        .header("Ocp-Apim-Subscription-Key", &key)
        .header("Content-Type", "application/octet-stream")
        .body(bytes)
        .send()
        .map_err(|e| {
            Error::Ocr(
                if e.is_connect() || e.is_timeout() {
                    "Check your internet connection and try again."
                } else {
                    "Network error."
                }
                .to_string(),
            )
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(Error::Ocr(format!(
            "OCR failed ({}): {}",
            status,
            if body.is_empty() {
                "Invalid key or endpoint?"
            } else {
                body.as_str()
            }
        )));
    }

    let result_url = response
        .headers()
        .get("Operation-Location")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Ocr("No Operation-Location in response".into()))?
        .to_string();

    for attempt in 0..POLL_ATTEMPTS {
        std::thread::sleep(POLL_INTERVAL);
        let poll: Value = client
            .get(&result_url)
            .header("Ocp-Apim-Subscription-Key", &key)
            .send()?
            .json()?;
        let status = poll.get("status").and_then(Value::as_str).unwrap_or("");
        debug!(attempt, status, "layout analysis polled");
        match status {
            "succeeded" => {
                let result = poll
                    .get("analyzeResult")
                    .ok_or_else(|| Error::Ocr("No analyzeResult".into()))?;
                return Ok(layout_to_document(&source, result));
            }
            "failed" => {
                let err = poll
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error");
                return Err(Error::Ocr(format!("OCR analysis failed: {}", err)));
            }
            _ => {}
        }
    }
    Err(Error::Ocr("OCR timed out. Try again.".to_string()))
}

/// `analyzeResult.content` plus each table's cells placed by `rowIndex` / `columnIndex`.
pub fn layout_to_document(source: &str, result: &Value) -> ExtractedDocument {
    let text = result
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let mut doc = ExtractedDocument::new(source, text);
    let tables = result.get("tables").and_then(Value::as_array);
    for table in tables.into_iter().flatten() {
        let index = |v: &Value, key: &str| v.get(key).and_then(Value::as_u64).unwrap_or(0) as usize;
        let row_count = index(table, "rowCount");
        let col_count = index(table, "columnCount");
        let mut rows = vec![vec![String::new(); col_count]; row_count];
        for cell in table.get("cells").and_then(Value::as_array).into_iter().flatten() {
            let (r, c) = (index(cell, "rowIndex"), index(cell, "columnIndex"));
            if r >= rows.len() {
                rows.resize(r + 1, vec![String::new(); col_count]);
            }
            if c >= rows[r].len() {
                rows[r].resize(c + 1, String::new());
            }
            rows[r][c] = cell
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or("")
                .replace('\n', " ");
        }
        doc = doc.with_table(rows);
    }
    doc
}
