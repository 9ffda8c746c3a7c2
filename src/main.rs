//! Invoice Reconciler CLI
//!
//! Usage:
//!   invoice-reconciler reconcile --workbook informe.xlsx facturas/*.pdf
//!   invoice-reconciler history --limit 10
//!   invoice-reconciler config > reconciler.toml

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;
use invoice_reconciler_lib::commands::{self, ReconcileArgs};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr).compact())
        .init();

    match cli.command {
        Commands::Reconcile {
            workbook,
            output,
            json,
            documents,
        } => {
            let args = ReconcileArgs {
                workbook,
                output,
                config: cli.config,
                history: cli.history,
                json,
                documents,
            };
            commands::cmd_reconcile(&args).map(|_| ())
        }
        Commands::History { limit, json } => commands::cmd_history(cli.history.as_deref(), limit, json),
        Commands::Config => commands::cmd_config(cli.config.as_deref()),
    }
}
