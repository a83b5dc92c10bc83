//! # Command Handlers
//!
//! One function per subcommand. Each resolves SKUs to variants, calls a
//! single engine workflow and prints the result as text or JSON.

use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;
use tally_core::ledger::StockLine;
use tally_core::payment::PaymentEvent;
use tally_core::{Money, Quantity, StockLevel, Variant};
use tally_engine::{
    Checkout, Engine, EngineError, NewPurchaseOrder, OrderLine, PaymentOutcome, UserContext,
};
use tracing::{info, warn};

use crate::error::{CliError, CliResult};

/// Shared by every handler.
pub struct Context {
    pub engine: Engine,
    pub user: UserContext,
    pub json: bool,
}

impl Context {
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> CliResult<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text();
        }
        Ok(())
    }

    async fn variant_by_sku(&self, sku: &str) -> CliResult<Variant> {
        self.engine
            .records()
            .variants()
            .by_sku(sku.trim())
            .await?
            .ok_or_else(|| EngineError::not_found("Variant", sku.trim()).into())
    }
}

// =============================================================================
// Line arguments
// =============================================================================

/// A `SKU:QTY[:COST]` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineArg {
    pub sku: String,
    pub quantity: Quantity,
    pub cost: Option<Money>,
}

impl LineArg {
    pub fn parse(arg: &str) -> CliResult<Self> {
        let parts: Vec<&str> = arg.split(':').map(str::trim).collect();
        let bad = || CliError::usage(format!("expected SKU:QTY or SKU:QTY:COST, got '{}'", arg));
        let (sku, quantity, cost) = match parts.as_slice() {
            [sku, qty] => (*sku, *qty, None),
            [sku, qty, cost] => (*sku, *qty, Some(*cost)),
            _ => return Err(bad()),
        };
        if sku.is_empty() {
            return Err(bad());
        }
        let quantity = quantity.parse::<Quantity>().map_err(EngineError::from)?;
        let cost = cost
            .map(Money::parse_decimal)
            .transpose()
            .map_err(EngineError::from)?;
        Ok(LineArg {
            sku: sku.to_string(),
            quantity,
            cost,
        })
    }
}

fn parse_lines(args: &[String]) -> CliResult<Vec<LineArg>> {
    if args.is_empty() {
        return Err(CliError::usage("at least one --line is required"));
    }
    args.iter().map(|a| LineArg::parse(a)).collect()
}

async fn stock_lines(ctx: &Context, args: &[String]) -> CliResult<Vec<StockLine>> {
    let mut lines = Vec::new();
    for line in parse_lines(args)? {
        let variant = ctx.variant_by_sku(&line.sku).await?;
        lines.push(StockLine::new(variant.id, line.quantity));
    }
    Ok(lines)
}

// =============================================================================
// Catalog & stock
// =============================================================================

pub async fn import(ctx: &Context, file: &Path) -> CliResult<()> {
    let csv = std::fs::read_to_string(file).map_err(|source| CliError::Io {
        path: file.to_path_buf(),
        source,
    })?;
    let summary = match ctx.engine.import_inventory(&csv).await {
        Err(EngineError::Core(tally_core::CoreError::ImportRejected(rows))) => {
            for row in &rows {
                eprintln!("{}", row);
            }
            return Err(CliError::usage(format!("{} row(s) rejected, nothing imported", rows.len())));
        }
        other => other?,
    };
    info!(file = %file.display(), "Import finished");
    println!(
        "{} products, {} variants, {} opening lots created; {} SKUs already present",
        summary.products_created,
        summary.variants_created,
        summary.opening_lots,
        summary.skipped_skus.len()
    );
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StockRow {
    sku: String,
    name: String,
    stock: Quantity,
    uom: String,
    reorder_point: Quantity,
    level: StockLevel,
}

pub async fn stock(ctx: &Context, low_only: bool) -> CliResult<()> {
    let ledgers = ctx.engine.load_inventory().await?;
    let mut rows: Vec<StockRow> = ledgers
        .iter()
        .flat_map(|p| {
            p.variants.iter().map(move |v| StockRow {
                sku: v.variant.sku.clone(),
                name: tally_engine::catalog::display_name(&p.product.name, &v.variant),
                stock: v.stock(),
                uom: v.variant.storage_uom.clone(),
                reorder_point: v.variant.reorder_point,
                level: v.level(),
            })
        })
        .filter(|r| !low_only || r.level != StockLevel::InStock)
        .collect();
    rows.sort_by(|a, b| a.sku.cmp(&b.sku));

    ctx.emit(&rows, || {
        for r in &rows {
            println!(
                "{:<16} {:<40} {:>10} {:<4} {:?}",
                r.sku, r.name, r.stock.to_string(), r.uom, r.level
            );
        }
        println!(
            "valuation at cost: {}",
            tally_core::reports::inventory_valuation(&ledgers)
        );
    })
}

pub async fn adjust(ctx: &Context, sku: &str, new_stock: &str, reason: &str) -> CliResult<()> {
    let variant = ctx.variant_by_sku(sku).await?;
    let new_stock = new_stock.parse::<Quantity>().map_err(EngineError::from)?;
    let log = ctx
        .engine
        .adjust_stock(&ctx.user, &variant.id, new_stock, reason)
        .await?;
    ctx.emit(&log, || {
        println!(
            "{}: {} -> {} ({})",
            variant.sku, log.previous_stock, log.new_stock, log.reason
        )
    })
}

// =============================================================================
// Sales
// =============================================================================

pub async fn sell(ctx: &Context, lines: &[String], cash: &str, phone: Option<String>, name: Option<String>) -> CliResult<()> {
    let mut checkout = Checkout::new(ctx.engine.clone(), ctx.user.clone());
    for line in parse_lines(lines)? {
        let variant = ctx.variant_by_sku(&line.sku).await?;
        let product = ctx.engine.records().products().require(&variant.product_id).await?;
        checkout.add_item(&product.name, &variant, line.quantity)?;
    }
    checkout.set_customer(phone, name);

    let cash = Money::parse_decimal(cash).map_err(EngineError::from)?;
    match checkout.apply_payment(&PaymentEvent::cash(cash)).await? {
        PaymentOutcome::Completed { transaction, change } => ctx.emit(&transaction, || {
            println!(
                "sale {} total {} paid {} change {}",
                transaction.id, transaction.total, transaction.amount_paid, change
            )
        }),
        PaymentOutcome::AwaitingPayment { remaining, .. } => Err(CliError::usage(format!(
            "cash does not cover the total; {} short, nothing recorded",
            remaining
        ))),
        other => {
            warn!(outcome = ?other, "Unexpected checkout outcome");
            Ok(())
        }
    }
}

pub async fn return_items(ctx: &Context, transaction_id: &str, lines: &[String]) -> CliResult<()> {
    let lines = stock_lines(ctx, lines).await?;
    let tx = ctx
        .engine
        .process_return(&ctx.user, transaction_id, &lines)
        .await?;
    ctx.emit(&tx, || println!("return {} refund {}", tx.id, tx.total.abs()))
}

// =============================================================================
// Purchasing
// =============================================================================

pub async fn create_po(ctx: &Context, supplier: &str, expected: Option<NaiveDate>, lines: &[String]) -> CliResult<()> {
    let mut order_lines = Vec::new();
    for line in parse_lines(lines)? {
        let variant = ctx.variant_by_sku(&line.sku).await?;
        order_lines.push(OrderLine {
            variant_id: variant.id,
            quantity: line.quantity,
            cost: line.cost,
        });
    }
    let po = ctx
        .engine
        .create_purchase_order(NewPurchaseOrder {
            supplier: supplier.to_string(),
            expected_delivery_date: expected,
            lines: order_lines,
        })
        .await?;
    ctx.emit(&po, || println!("{} {} total {}", po.po_number, po.status, po.total))
}

pub async fn open_pos(ctx: &Context) -> CliResult<()> {
    let pos = ctx.engine.records().purchase_orders().open().await?;
    ctx.emit(&pos, || {
        for po in &pos {
            println!("{:<20} {:<24} {:<20} {}", po.po_number, po.supplier, po.status.to_string(), po.total);
        }
    })
}

pub async fn receive_po(ctx: &Context, po_number: &str, lines: &[String]) -> CliResult<()> {
    let po = ctx
        .engine
        .records()
        .purchase_orders()
        .by_number(po_number.trim())
        .await?
        .ok_or_else(|| EngineError::not_found("Purchase order", po_number.trim()))?;
    let lines = stock_lines(ctx, lines).await?;
    let grn = ctx.engine.receive_goods(&po.id, &lines).await?;
    ctx.emit(&grn, || println!("goods receipt {} against {}", grn.id, grn.purchase_order_number))
}

pub async fn receive_manual(ctx: &Context, supplier: &str, lines: &[String]) -> CliResult<()> {
    let lines = stock_lines(ctx, lines).await?;
    let grn = ctx.engine.receive_manual(supplier, &lines).await?;
    ctx.emit(&grn, || println!("goods receipt {} ({} lines)", grn.id, grn.items.len()))
}

pub async fn receipts(ctx: &Context, uninvoiced: bool) -> CliResult<()> {
    let grns = if uninvoiced {
        ctx.engine.uninvoiced_receipts().await?
    } else {
        ctx.engine.records().goods_receipts().all().await?
    };
    ctx.emit(&grns, || {
        for grn in &grns {
            println!(
                "{}  {}  {:<20} {:<24} {} lines",
                grn.id,
                grn.date.format("%Y-%m-%d"),
                grn.purchase_order_number,
                grn.supplier,
                grn.items.len()
            );
        }
    })
}

pub async fn invoice_receipt(ctx: &Context, grn_id: &str, number: &str, due: NaiveDate) -> CliResult<()> {
    let invoice = ctx.engine.invoice_receipt(grn_id, number, due).await?;
    ctx.emit(&invoice, || {
        println!("invoice {} total {} due {}", invoice.invoice_number, invoice.total, invoice.due_date)
    })
}

pub async fn pay_invoice(ctx: &Context, invoice_id: &str) -> CliResult<()> {
    let invoice = ctx.engine.mark_invoice_paid(invoice_id).await?;
    ctx.emit(&invoice, || println!("invoice {} paid", invoice.invoice_number))
}

pub async fn unpaid_invoices(ctx: &Context) -> CliResult<()> {
    let invoices = ctx.engine.records().invoices().unpaid().await?;
    ctx.emit(&invoices, || {
        for inv in &invoices {
            println!("{:<20} {:<24} {:>12} due {}", inv.invoice_number, inv.supplier, inv.total.to_string(), inv.due_date);
        }
    })
}

// =============================================================================
// Read side
// =============================================================================

pub async fn notifications(ctx: &Context, mark_read: Option<&str>) -> CliResult<()> {
    if let Some(id) = mark_read {
        ctx.engine.mark_notification_read(id).await?;
    }
    let current = ctx.engine.refresh_notifications().await?;
    ctx.emit(&current, || {
        for n in &current {
            let flag = if n.read { " " } else { "*" };
            println!("{} {}  {}", flag, n.id, n.message);
        }
    })
}

pub async fn report(ctx: &Context, from: NaiveDate, to: NaiveDate, top: usize) -> CliResult<()> {
    let report = ctx.engine.sales_report(from, to, top).await?;
    ctx.emit(&report, || {
        let s = &report.summary;
        println!("{} to {}", report.from, report.to);
        println!(
            "sales {} ({})  returns {} ({})  net {}  tax {}  void {}",
            s.sale_count, s.gross_sales, s.return_count, s.returns, s.net_sales, s.tax_collected, s.void_count
        );
        for t in &report.top_sellers {
            println!("  {:<16} {:<40} {:>8} {:>12}", t.sku, t.name, t.quantity.to_string(), t.revenue.to_string());
        }
        for p in &report.payments {
            println!("  {:<12} {}", p.method.to_string(), p.amount);
        }
    })
}
