//! Error types for the reconciler

use thiserror::Error;

use crate::models::ColumnMap;

#[derive(Error, Debug)]
pub enum Error {
    /// The destination workbook has no resolvable column for a mandatory category.
    #[error("Could not find the base category columns (groceries and agriculture). Columns detected: {found}")]
    MissingColumns { found: ColumnMap },

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Document error: {0}")]
    Document(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
