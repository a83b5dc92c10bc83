//! # Sale / Return Recorder
//!
//! Turns a settled cart into a transaction plus its stock movement.
//!
//! ## Sale Workflow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate cart & tenders ──► look customer up by phone                  │
//! │                                     │                                   │
//! │  ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┼ ─ ─ detached write phase ─ ─ ─ ─   │
//! │                                     ▼                                   │
//! │                     insert Customer (phone not on file)                 │
//! │                          │ fails: clean error                           │
//! │                          ▼                                              │
//! │                     insert Transaction (Completed)                      │
//! │                          │ fails: clean error, or partial failure       │
//! │                          │        if a customer was just created        │
//! │                          ▼                                              │
//! │                     insert one −q lot per line                          │
//! │                          │ fails: set Transaction → Void,               │
//! │                          │        partial failure "verify stock"        │
//! │                          ▼                                              │
//! │                       Completed                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transactions are never deleted. A failed sale stays behind as `Void`.
//!
//! Two terminals creating a customer for the same new phone number at the
//! same moment both succeed, leaving duplicate customers.

use chrono::Utc;
use tally_core::cart::{self, Totals};
use tally_core::ledger::StockLine;
use tally_core::validation::{normalize_phone, validate_payment_amount, validate_price, validate_quantity};
use tally_core::{
    new_id, CartItem, CoreError, Customer, CustomerRef, Money, PaymentMethod, PaymentTender,
    Transaction, TransactionKind, TransactionStatus, MAX_CART_ITEMS,
};
use tracing::{error, info, warn};

use crate::error::EngineResult;
use crate::saga::{self, Saga};
use crate::session::UserContext;
use crate::stock;
use crate::Engine;

/// A settled cart ready to be recorded.
#[derive(Debug, Clone, Default)]
pub struct SaleRequest {
    pub items: Vec<CartItem>,
    pub tenders: Vec<PaymentTender>,
    /// Raw phone number as typed; normalised before lookup.
    pub customer_phone: Option<String>,
    /// Used only when a new customer is created.
    pub customer_name: Option<String>,
}

fn stock_lines(items: &[CartItem]) -> Vec<StockLine> {
    items
        .iter()
        .map(|i| StockLine::new(i.variant_id.clone(), i.quantity))
        .collect()
}

/// Outcome of a phone lookup, before anything is written.
#[derive(Debug, Clone)]
enum CustomerLookup {
    Anonymous,
    Known(CustomerRef),
    /// Not on file; inserted as the first write of the sale.
    New(Customer),
}

impl CustomerLookup {
    fn customer_ref(&self) -> Option<CustomerRef> {
        match self {
            CustomerLookup::Anonymous => None,
            CustomerLookup::Known(known) => Some(known.clone()),
            CustomerLookup::New(customer) => Some(CustomerRef::from(customer)),
        }
    }
}

impl Engine {
    async fn lookup_customer(&self, phone: Option<&str>, name: Option<&str>) -> EngineResult<CustomerLookup> {
        let phone = match phone.map(str::trim) {
            Some(p) if !p.is_empty() => normalize_phone(p)?,
            _ => return Ok(CustomerLookup::Anonymous),
        };

        if let Some(existing) = self.records().customers().by_phone(&phone).await? {
            return Ok(CustomerLookup::Known(CustomerRef::from(&existing)));
        }

        Ok(CustomerLookup::New(Customer {
            id: new_id(),
            phone,
            name: name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            created_at: Utc::now(),
        }))
    }

    /// Finds the customer with this phone number or creates one.
    pub async fn resolve_customer(&self, phone: Option<&str>, name: Option<&str>) -> EngineResult<Option<CustomerRef>> {
        match self.lookup_customer(phone, name).await? {
            CustomerLookup::New(customer) => {
                let customer = self.records().customers().insert(&customer).await?;
                info!(customer_id = %customer.id, "Created customer");
                Ok(Some(CustomerRef::from(&customer)))
            }
            lookup => Ok(lookup.customer_ref()),
        }
    }

    /// Records a sale and decrements stock.
    pub async fn record_sale(&self, user: &UserContext, request: SaleRequest) -> EngineResult<Transaction> {
        if request.items.is_empty() {
            return Err(CoreError::EmptyCart.into());
        }
        if request.items.len() > MAX_CART_ITEMS {
            return Err(CoreError::CartTooLarge { max: MAX_CART_ITEMS }.into());
        }
        for item in &request.items {
            validate_quantity(item.quantity, item.selling_method)?;
            validate_price("price", item.price)?;
        }
        for tender in &request.tenders {
            validate_payment_amount(tender.amount)?;
        }

        let totals = Totals::of(&request.items);
        let paid: Money = request.tenders.iter().map(|t| t.amount).sum();
        if paid < totals.total {
            return Err(CoreError::Underpaid {
                paid: paid.to_string(),
                total: totals.total.to_string(),
            }
            .into());
        }

        let lookup = self
            .lookup_customer(
                request.customer_phone.as_deref(),
                request.customer_name.as_deref(),
            )
            .await?;
        let customer = lookup.customer_ref();

        let tx = Transaction {
            id: new_id(),
            date: Utc::now(),
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
            amount_paid: paid,
            customer,
            payment_methods: request.tenders,
            status: TransactionStatus::Completed,
            kind: TransactionKind::Sale,
            user: user.user_id.clone(),
            original_transaction_id: None,
            items: request.items,
        };
        let lines = stock_lines(&tx.items);

        info!(
            transaction_id = %tx.id,
            lines = lines.len(),
            total = %tx.total,
            user_id = %user.user_id,
            "Recording sale"
        );

        let records = self.records().clone();
        saga::detached("record_sale", async move {
            let mut saga = Saga::start("record_sale");

            if let CustomerLookup::New(customer) = &lookup {
                if let Err(e) = records.customers().insert(customer).await {
                    return Err(saga.fail(e.into(), "customer not saved; sale not recorded"));
                }
                info!(customer_id = %customer.id, "Created customer");
                saga.commit("customer", [customer.id.clone()]);
            }

            if let Err(e) = records.transactions().insert(&tx).await {
                return Err(saga.fail(
                    e.into(),
                    format!("sale {} not recorded; only the new customer record was kept", tx.id),
                ));
            }
            saga.commit("transaction", [tx.id.clone()]);

            let err = match stock::record_sale_lots(&records, &tx.id, &lines, tx.date).await {
                Ok(lots) => {
                    saga.commit("sale_lots", lots.into_iter().map(|l| l.id));
                    saga.complete();
                    return Ok(tx);
                }
                Err(e) => e,
            };

            warn!(transaction_id = %tx.id, error = %err, "Sale lots not written, voiding sale");
            match records
                .transactions()
                .set_status(&tx.id, TransactionStatus::Void)
                .await
            {
                Ok(()) => Err(saga.compensated(
                    err.into(),
                    format!(
                        "sale {} was voided because stock could not be updated; verify stock manually",
                        tx.id
                    ),
                )),
                Err(void_err) => {
                    error!(transaction_id = %tx.id, error = %void_err, "Could not void sale");
                    Err(saga.fail(
                        err.into(),
                        format!(
                            "sale {} was recorded but stock was not updated and the sale could not be voided; void it and verify stock manually",
                            tx.id
                        ),
                    ))
                }
            }
        })
        .await
    }

    /// Records a return against a completed sale and restores stock.
    ///
    /// Quantities are checked against what the sale sold minus what earlier
    /// returns already took back. The refund goes to the sale's first tender
    /// method and every monetary field is negative.
    pub async fn process_return(&self, user: &UserContext, original_id: &str, lines: &[StockLine]) -> EngineResult<Transaction> {
        let original = self.records().transactions().require(original_id).await?;
        let prior = self.records().transactions().returns_for(original_id).await?;
        let items = cart::build_return(&original, &prior, lines)?;

        let totals = Totals::of(&items).negated();
        let method = original
            .payment_methods
            .first()
            .map(|t| t.method)
            .unwrap_or(PaymentMethod::Cash);

        let tx = Transaction {
            id: new_id(),
            date: Utc::now(),
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
            amount_paid: totals.total,
            customer: original.customer.clone(),
            payment_methods: vec![PaymentTender {
                method,
                amount: totals.total,
            }],
            status: TransactionStatus::Completed,
            kind: TransactionKind::Return,
            user: user.user_id.clone(),
            original_transaction_id: Some(original.id.clone()),
            items,
        };
        let lines = stock_lines(&tx.items);

        info!(
            return_id = %tx.id,
            original_id = %original.id,
            refund = %tx.total,
            user_id = %user.user_id,
            "Processing return"
        );

        let records = self.records().clone();
        saga::detached("process_return", async move {
            let mut saga = Saga::start("process_return");

            if let Err(e) = records.transactions().insert(&tx).await {
                return Err(saga.fail(e.into(), "return not recorded"));
            }
            saga.commit("transaction", [tx.id.clone()]);

            match stock::restore_returned_lots(&records, &tx.id, &lines, tx.date).await {
                Ok(lots) => {
                    saga.commit("return_lots", lots.into_iter().map(|l| l.id));
                    saga.complete();
                    Ok(tx)
                }
                Err(e) => Err(saga.fail(
                    e.into(),
                    format!(
                        "return {} recorded but stock not restored; add the returned stock manually",
                        tx.id
                    ),
                )),
            }
        })
        .await
    }
}
