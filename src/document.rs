//! JSON sidecar documents: `{ "source": ..., "text": ..., "tables": [[[cell, ...], ...], ...] }`.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::ExtractedDocument;

/// Read a pre-extracted document. A missing or empty `source` takes the sidecar's file stem.
pub fn load_extracted(path: &Path) -> Result<ExtractedDocument> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::Document(format!("File not found: {}", path.display()))
        } else {
            Error::Document(format!("Could not read {}: {}", path.display(), e))
        }
    })?;
    let mut doc: ExtractedDocument = serde_json::from_str(&content)
        .map_err(|e| Error::Document(format!("Invalid document JSON in {}: {}", path.display(), e)))?;
    if doc.source.trim().is_empty() {
        doc.source = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_defaults_to_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("factura_01.json");
        fs::write(&path, r#"{"text": "Factura", "tables": []}"#).unwrap();
        let doc = load_extracted(&path).unwrap();
        assert_eq!(doc.source, "factura_01");
        assert_eq!(doc.text, "Factura");
    }

    #[test]
    fn test_blank_source_defaults_to_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("factura_02.json");
        fs::write(&path, r#"{"source": "  ", "text": "Factura"}"#).unwrap();
        let doc = load_extracted(&path).unwrap();
        assert_eq!(doc.source, "factura_02");
        assert!(doc.tables.is_empty());
    }

    #[test]
    fn test_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roto.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_extracted(&path), Err(Error::Document(_))));
    }
}
