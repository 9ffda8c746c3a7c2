//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Merge invoice totals into a municipal purchasing report
#[derive(Parser)]
#[command(name = "invoice-reconciler")]
#[command(about = "Invoice ingestion and Excel report reconciliation", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Run history database (defaults to the user data directory)
    #[arg(long, global = true)]
    pub history: Option<PathBuf>,

    /// Engine configuration (TOML); built-in defaults when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest documents and merge their totals into the report workbook
    Reconcile {
        /// Report workbook (.xlsx)
        #[arg(short, long)]
        workbook: PathBuf,

        /// Write the result here instead of updating the workbook in place
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the batch summary as JSON
        #[arg(long)]
        json: bool,

        /// Invoice documents: PDFs or images (layout OCR) or JSON sidecars
        #[arg(required = true)]
        documents: Vec<PathBuf>,
    },

    /// Show recent runs
    History {
        /// Number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}
