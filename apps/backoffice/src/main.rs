//! # Tally Back Office
//!
//! Command line front end for stock, purchasing and reporting.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Parse arguments (clap)                                             │
//! │  2. Initialize logging (RUST_LOG, default info,tally=debug,sqlx=warn)  │
//! │  3. Resolve configuration (TALLY_* > config.toml > defaults)           │
//! │  4. Open SQLite (WAL, migrations)                                      │
//! │  5. Sign the configured operator in                                    │
//! │  6. Run one command, close the pool, exit with the error's code        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod commands;
mod config;
mod error;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tally_db::{Database, DbConfig};
use tally_engine::{Engine, LocalSession, SessionProvider, UserContext};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::commands::Context;
use crate::config::AppConfig;
use crate::error::CliResult;

#[derive(Debug, Parser)]
#[command(name = "tally", version, about = "Tally POS back office")]
struct Cli {
    /// Config file (default: platform config dir)
    #[arg(long, global = true, env = "TALLY_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load products, variants and opening stock from a CSV file
    Import { file: PathBuf },

    /// Show stock per variant
    Stock {
        /// Only low and out-of-stock variants
        #[arg(long)]
        low: bool,
    },

    /// Overwrite a variant's stock with a counted figure
    Adjust {
        sku: String,
        new_stock: String,
        #[arg(long)]
        reason: String,
    },

    /// Ring up a cash sale
    Sell {
        /// SKU:QTY, repeatable
        #[arg(long = "line", required = true)]
        lines: Vec<String>,
        /// Cash tendered, e.g. 25.00
        #[arg(long)]
        cash: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },

    /// Return items from an earlier sale
    Return {
        transaction_id: String,
        /// SKU:QTY, repeatable
        #[arg(long = "line", required = true)]
        lines: Vec<String>,
    },

    /// Purchase orders
    #[command(subcommand)]
    Po(PoCommand),

    /// Receive stock with no purchase order
    Receive {
        #[arg(long)]
        supplier: String,
        /// SKU:QTY, repeatable
        #[arg(long = "line", required = true)]
        lines: Vec<String>,
    },

    /// List goods receipts
    Receipts {
        /// Only receipts with no invoice yet
        #[arg(long)]
        uninvoiced: bool,
    },

    /// Supplier invoices
    #[command(subcommand)]
    Invoice(InvoiceCommand),

    /// Recompute and list stock notifications
    Notifications {
        /// Mark this notification read first
        #[arg(long)]
        read: Option<String>,
    },

    /// Sales report for a date range (inclusive, UTC)
    Report {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

#[derive(Debug, Subcommand)]
enum PoCommand {
    /// Create a purchase order
    Create {
        #[arg(long)]
        supplier: String,
        #[arg(long)]
        expected: Option<NaiveDate>,
        /// SKU:QTY[:COST], repeatable
        #[arg(long = "line", required = true)]
        lines: Vec<String>,
    },
    /// List orders not yet fully received
    Open,
    /// Receive goods against an order
    Receive {
        po_number: String,
        /// SKU:QTY, repeatable
        #[arg(long = "line", required = true)]
        lines: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
enum InvoiceCommand {
    /// Invoice a goods receipt at its order's costs
    Receipt {
        goods_receipt_id: String,
        #[arg(long)]
        number: String,
        #[arg(long)]
        due: NaiveDate,
    },
    /// Mark an invoice paid
    Pay { invoice_id: String },
    /// List unpaid invoices
    Unpaid,
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=tally=trace` - Trace for tally crates only
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tally=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn open_database(config: &AppConfig) -> CliResult<Database> {
    if let Some(dir) = config.database_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| error::CliError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let db_config = DbConfig::new(&config.database_path).max_connections(config.max_connections);
    Ok(Database::new(db_config).await?)
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    info!(db_path = %config.database_path.display(), "Configuration loaded");

    let db = open_database(&config).await?;
    let session = LocalSession::signed_in(UserContext::new(&config.user_id, &config.user_name));
    let ctx = Context {
        engine: Engine::new(db.records()),
        user: session.require_user().await?,
        json: cli.json,
    };

    let result = dispatch(&ctx, cli.command).await;
    db.close().await;
    result
}

async fn dispatch(ctx: &Context, command: Command) -> CliResult<()> {
    match command {
        Command::Import { file } => commands::import(ctx, &file).await,
        Command::Stock { low } => commands::stock(ctx, low).await,
        Command::Adjust {
            sku,
            new_stock,
            reason,
        } => commands::adjust(ctx, &sku, &new_stock, &reason).await,
        Command::Sell {
            lines,
            cash,
            phone,
            name,
        } => commands::sell(ctx, &lines, &cash, phone, name).await,
        Command::Return {
            transaction_id,
            lines,
        } => commands::return_items(ctx, &transaction_id, &lines).await,
        Command::Po(PoCommand::Create {
            supplier,
            expected,
            lines,
        }) => commands::create_po(ctx, &supplier, expected, &lines).await,
        Command::Po(PoCommand::Open) => commands::open_pos(ctx).await,
        Command::Po(PoCommand::Receive { po_number, lines }) => {
            commands::receive_po(ctx, &po_number, &lines).await
        }
        Command::Receive { supplier, lines } => commands::receive_manual(ctx, &supplier, &lines).await,
        Command::Receipts { uninvoiced } => commands::receipts(ctx, uninvoiced).await,
        Command::Invoice(InvoiceCommand::Receipt {
            goods_receipt_id,
            number,
            due,
        }) => commands::invoice_receipt(ctx, &goods_receipt_id, &number, due).await,
        Command::Invoice(InvoiceCommand::Pay { invoice_id }) => {
            commands::pay_invoice(ctx, &invoice_id).await
        }
        Command::Invoice(InvoiceCommand::Unpaid) => commands::unpaid_invoices(ctx).await,
        Command::Notifications { read } => commands::notifications(ctx, read.as_deref()).await,
        Command::Report { from, to, top } => {
            let today = Utc::now().date_naive();
            let to = to.unwrap_or(today);
            let from = from.unwrap_or(to);
            commands::report(ctx, from, to, top).await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(cli).await {
        error!(error = %e, "Command failed");
        eprintln!("error: {}", e);
        std::process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_nested_commands() {
        let cli = Cli::try_parse_from([
            "tally", "po", "receive", "PO-20260101-ABCD", "--line", "TEE-M:10", "--line", "TEE-L:3",
        ])
        .unwrap();
        match cli.command {
            Command::Po(PoCommand::Receive { po_number, lines }) => {
                assert_eq!(po_number, "PO-20260101-ABCD");
                assert_eq!(lines.len(), 2);
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Cli::try_parse_from(["tally", "sell", "--cash", "10"]).is_err());
    }
}
