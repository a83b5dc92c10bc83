//! # Checkout
//!
//! One customer at the till: a cart, the payments confirmed so far, and the
//! sale they turn into.
//!
//! ```text
//!   add_item / update_quantity / remove_item        (until the first payment)
//!        │
//!        ▼
//!   apply_payment(event) ──► accumulator (idempotent per provider id)
//!        │
//!        ├── paid < total ──► AwaitingPayment { remaining }
//!        │
//!        └── paid ≥ total ──► record_sale ──► Completed { transaction, change }
//!                                  │
//!                                  └── later events ──► AlreadyCompleted
//! ```
//!
//! Payment events may come from a cashier, a card terminal or a mobile money
//! confirmation. How they arrive does not matter; the sale is recorded once.

use serde::Serialize;
use tally_core::cart::{Cart, CartTotals};
use tally_core::payment::{Applied, PaymentAccumulator, PaymentEvent};
use tally_core::{CoreError, Money, Quantity, Transaction, ValidationError, Variant};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::recorder::SaleRequest;
use crate::session::UserContext;
use crate::Engine;

/// What applying a payment led to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum PaymentOutcome {
    #[serde(rename_all = "camelCase")]
    AwaitingPayment { paid: Money, remaining: Money },
    /// The provider id was already applied; nothing changed.
    Duplicate,
    /// This payment settled the cart and the sale was recorded.
    #[serde(rename_all = "camelCase")]
    Completed { transaction: Transaction, change: Money },
    /// The sale was recorded earlier; the event was ignored.
    #[serde(rename_all = "camelCase")]
    AlreadyCompleted { transaction_id: String },
}

#[derive(Debug)]
enum Stage {
    Open,
    Completed(Transaction),
    /// Recording partially failed; the rows left behind need manual attention.
    Failed,
}

#[derive(Debug)]
pub struct Checkout {
    engine: Engine,
    user: UserContext,
    cart: Cart,
    payments: PaymentAccumulator,
    customer_phone: Option<String>,
    customer_name: Option<String>,
    stage: Stage,
}

impl Checkout {
    pub fn new(engine: Engine, user: UserContext) -> Self {
        Checkout {
            engine,
            user,
            cart: Cart::new(),
            payments: PaymentAccumulator::new(),
            customer_phone: None,
            customer_name: None,
            stage: Stage::Open,
        }
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn totals(&self) -> CartTotals {
        CartTotals::from(&self.cart)
    }

    pub fn paid(&self) -> Money {
        self.payments.paid()
    }

    pub fn remaining(&self) -> Money {
        self.payments.remaining(self.cart.totals().total)
    }

    /// The recorded sale, once there is one.
    pub fn transaction(&self) -> Option<&Transaction> {
        match &self.stage {
            Stage::Completed(tx) => Some(tx),
            _ => None,
        }
    }

    fn ensure_editable(&self) -> EngineResult<()> {
        if !matches!(self.stage, Stage::Open) {
            return Err(ValidationError::invalid("cart", "checkout is finished").into());
        }
        if !self.payments.paid().is_zero() {
            return Err(ValidationError::invalid("cart", "cart is locked once payment has been taken").into());
        }
        Ok(())
    }

    pub fn add_item(&mut self, product_name: &str, variant: &Variant, quantity: Quantity) -> EngineResult<()> {
        self.ensure_editable()?;
        self.cart.add_item(product_name, variant, quantity)?;
        Ok(())
    }

    pub fn update_quantity(&mut self, variant_id: &str, quantity: Quantity) -> EngineResult<()> {
        self.ensure_editable()?;
        self.cart.update_quantity(variant_id, quantity)?;
        Ok(())
    }

    pub fn remove_item(&mut self, variant_id: &str) -> EngineResult<()> {
        self.ensure_editable()?;
        self.cart.remove_item(variant_id)?;
        Ok(())
    }

    pub fn set_customer(&mut self, phone: Option<String>, name: Option<String>) {
        self.customer_phone = phone;
        self.customer_name = name;
    }

    /// Applies a confirmed payment; records the sale when it settles the cart.
    pub async fn apply_payment(&mut self, event: &PaymentEvent) -> EngineResult<PaymentOutcome> {
        match &self.stage {
            Stage::Completed(tx) => {
                debug!(transaction_id = %tx.id, "Payment after completion ignored");
                return Ok(PaymentOutcome::AlreadyCompleted {
                    transaction_id: tx.id.clone(),
                });
            }
            Stage::Failed => {
                return Err(EngineError::consistency(
                    "checkout failed part way; reconcile the voided sale before taking payment",
                ))
            }
            Stage::Open => {}
        }
        if self.cart.is_empty() {
            return Err(CoreError::EmptyCart.into());
        }

        if self.payments.apply(event)? == Applied::Duplicate {
            debug!(provider_id = ?event.transaction_id, "Duplicate payment event");
            return Ok(PaymentOutcome::Duplicate);
        }
        info!(method = %event.method, amount = %event.amount, paid = %self.payments.paid(), "Payment applied");

        self.finalize().await
    }

    /// Records the sale if the payments cover the total.
    ///
    /// Called by [`apply_payment`](Self::apply_payment); call it directly to
    /// retry after a failure that wrote nothing.
    pub async fn finalize(&mut self) -> EngineResult<PaymentOutcome> {
        if let Stage::Completed(tx) = &self.stage {
            return Ok(PaymentOutcome::AlreadyCompleted {
                transaction_id: tx.id.clone(),
            });
        }
        let total = self.cart.totals().total;
        if !self.payments.is_settled(total) {
            return Ok(PaymentOutcome::AwaitingPayment {
                paid: self.payments.paid(),
                remaining: self.payments.remaining(total),
            });
        }

        let request = SaleRequest {
            items: self.cart.items.clone(),
            tenders: self.payments.tenders().to_vec(),
            customer_phone: self.customer_phone.clone(),
            customer_name: self.customer_name.clone(),
        };
        match self.engine.record_sale(&self.user, request).await {
            Ok(tx) => {
                let change = self.payments.change(total);
                self.stage = Stage::Completed(tx.clone());
                Ok(PaymentOutcome::Completed {
                    transaction: tx,
                    change,
                })
            }
            Err(e) => {
                if e.is_partial_failure() {
                    self.stage = Stage::Failed;
                }
                warn!(error = %e, partial = e.is_partial_failure(), "Checkout could not record sale");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{Harness, Op};
    use tally_core::PaymentMethod;
    use tally_db::Collection;

    fn mobile(amount: i64, id: &str) -> PaymentEvent {
        PaymentEvent {
            method: PaymentMethod::MobileMoney,
            amount: Money::from_cents(amount),
            transaction_id: Some(id.to_string()),
        }
    }

    #[tokio::test]
    async fn test_split_payment_records_once() {
        let h = Harness::new();
        let v = h.seed("Mug", "MUG", 10).await;
        let mut checkout = Checkout::new(h.engine.clone(), h.user.clone());
        checkout.add_item("Mug", &v, Quantity::from_units(2)).unwrap();
        assert_eq!(checkout.totals().total, Money::from_cents(2320));

        let out = checkout.apply_payment(&mobile(1000, "MP1")).await.unwrap();
        assert_eq!(
            out,
            PaymentOutcome::AwaitingPayment {
                paid: Money::from_cents(1000),
                remaining: Money::from_cents(1320),
            }
        );
        assert_eq!(
            checkout.apply_payment(&mobile(1000, "MP1")).await.unwrap(),
            PaymentOutcome::Duplicate
        );

        let out = checkout
            .apply_payment(&PaymentEvent::cash(Money::from_cents(1500)))
            .await
            .unwrap();
        let PaymentOutcome::Completed { transaction, change } = out else {
            panic!("expected completion, got {out:?}");
        };
        assert_eq!(change, Money::from_cents(180));
        assert_eq!(transaction.payment_methods.len(), 2);
        assert_eq!(transaction.amount_paid, Money::from_cents(2500));

        let again = checkout.apply_payment(&mobile(2320, "MP2")).await.unwrap();
        assert_eq!(
            again,
            PaymentOutcome::AlreadyCompleted {
                transaction_id: transaction.id.clone()
            }
        );
        assert_eq!(h.store.count(Collection::Transactions).await, 1);
        assert_eq!(h.stock(&v.id).await, 8);
    }

    #[test]
    fn test_outcome_payload_is_tagged() {
        let value = serde_json::to_value(PaymentOutcome::AwaitingPayment {
            paid: Money::from_cents(1000),
            remaining: Money::from_cents(1320),
        })
        .unwrap();
        assert_eq!(value["outcome"], "awaitingPayment");
        assert!(value.get("remaining").is_some());

        let value = serde_json::to_value(PaymentOutcome::AlreadyCompleted {
            transaction_id: "t1".to_string(),
        })
        .unwrap();
        assert_eq!(value["transactionId"], "t1");
    }

    #[tokio::test]
    async fn test_cart_locked_after_payment() {
        let h = Harness::new();
        let v = h.seed("Mug", "MUG", 10).await;
        let mut checkout = Checkout::new(h.engine.clone(), h.user.clone());
        checkout.add_item("Mug", &v, Quantity::from_units(2)).unwrap();
        checkout.apply_payment(&mobile(500, "MP1")).await.unwrap();

        let err = checkout.remove_item(&v.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(checkout.remaining(), Money::from_cents(1820));
    }

    #[tokio::test]
    async fn test_empty_cart_and_invalid_amount_rejected() {
        let h = Harness::new();
        let v = h.seed("Mug", "MUG", 10).await;
        let mut checkout = Checkout::new(h.engine.clone(), h.user.clone());

        let err = checkout.apply_payment(&mobile(500, "MP1")).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::EmptyCart)));

        checkout.add_item("Mug", &v, Quantity::from_units(1)).unwrap();
        let err = checkout.apply_payment(&mobile(0, "MP1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        // A rejected event does not use up its provider id.
        assert!(matches!(
            checkout.apply_payment(&mobile(1160, "MP1")).await.unwrap(),
            PaymentOutcome::Completed { .. }
        ));
    }

    #[tokio::test]
    async fn test_clean_failure_can_be_retried() {
        let h = Harness::new();
        let v = h.seed("Mug", "MUG", 10).await;
        let mut checkout = Checkout::new(h.engine.clone(), h.user.clone());
        checkout.add_item("Mug", &v, Quantity::from_units(1)).unwrap();

        h.store.fail_on(Op::Insert, Collection::Transactions);
        let err = checkout.apply_payment(&mobile(1160, "MP1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert!(checkout.transaction().is_none());

        h.store.heal();
        assert!(matches!(
            checkout.finalize().await.unwrap(),
            PaymentOutcome::Completed { .. }
        ));
        assert_eq!(h.stock(&v.id).await, 9);
    }

    #[tokio::test]
    async fn test_partial_failure_blocks_further_payment() {
        let h = Harness::new();
        let v = h.seed("Mug", "MUG", 10).await;
        let mut checkout = Checkout::new(h.engine.clone(), h.user.clone());
        checkout.add_item("Mug", &v, Quantity::from_units(1)).unwrap();

        h.store.fail_on(Op::Insert, Collection::Lots);
        let err = checkout.apply_payment(&mobile(1160, "MP1")).await.unwrap_err();
        assert!(err.is_partial_failure());

        h.store.heal();
        let err = checkout
            .apply_payment(&PaymentEvent::cash(Money::from_cents(100)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert_eq!(h.store.count(Collection::Transactions).await, 1);
    }
}
