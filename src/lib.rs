//! Invoice ingestion and spreadsheet reconciliation.
//!
//! Documents (text + tables) are classified into groceries / agriculture spending, deduplicated by
//! authorization identifier, aggregated per municipality and merged into an externally-authored
//! report workbook.

pub mod batch;
pub mod commands;
pub mod config;
pub mod db;
pub mod document;
pub mod engine;
pub mod error;
pub mod excel;
pub mod models;
pub mod ocr;
pub mod reconcile;
pub mod services;
pub mod types;

pub use config::EngineConfig;
pub use engine::{Engine, RunState};
pub use error::{Error, Result};
pub use types::{BatchSummary, ExtractedDocument, InvoiceRecord, UnreadableDocument};
