//! # Payment Confirmation
//!
//! Confirmed payments arrive as events (cash keyed in at the till, card or
//! mobile money confirmations from the provider). The provider may deliver the
//! same confirmation more than once, so events are applied idempotently by
//! their provider transaction id.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PaymentEvent ──► apply() ──► seen id?  yes ──► ignored                │
//! │                                  │                                      │
//! │                                  no                                     │
//! │                                  ▼                                      │
//! │                        paid += amount                                   │
//! │                                  │                                      │
//! │                   paid ≥ total due? ──► settled                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{PaymentMethod, PaymentTender};
use crate::validation::validate_payment_amount;

/// One confirmed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PaymentEvent {
    pub method: PaymentMethod,
    pub amount: Money,
    /// Provider reference. Cash events carry none.
    pub transaction_id: Option<String>,
}

impl PaymentEvent {
    pub fn cash(amount: Money) -> Self {
        PaymentEvent {
            method: PaymentMethod::Cash,
            amount,
            transaction_id: None,
        }
    }
}

/// Outcome of applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Accepted,
    /// Same provider transaction id already applied.
    Duplicate,
}

/// Running total of confirmed payments for one checkout.
#[derive(Debug, Clone, Default)]
pub struct PaymentAccumulator {
    seen: HashSet<String>,
    tenders: Vec<PaymentTender>,
    paid: Money,
}

impl PaymentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an event once. Events without a transaction id are always applied.
    pub fn apply(&mut self, event: &PaymentEvent) -> Result<Applied, ValidationError> {
        validate_payment_amount(event.amount)?;

        if let Some(id) = &event.transaction_id {
            if !self.seen.insert(id.clone()) {
                return Ok(Applied::Duplicate);
            }
        }

        self.paid += event.amount;
        match self.tenders.iter_mut().find(|t| t.method == event.method) {
            Some(tender) => tender.amount += event.amount,
            None => self.tenders.push(PaymentTender {
                method: event.method,
                amount: event.amount,
            }),
        }
        Ok(Applied::Accepted)
    }

    pub fn paid(&self) -> Money {
        self.paid
    }

    /// One tender per method, in first-applied order.
    pub fn tenders(&self) -> &[PaymentTender] {
        &self.tenders
    }

    pub fn is_settled(&self, total_due: Money) -> bool {
        self.paid >= total_due
    }

    /// Amount still owed (never negative).
    pub fn remaining(&self, total_due: Money) -> Money {
        if self.paid >= total_due {
            Money::zero()
        } else {
            total_due - self.paid
        }
    }

    /// Change owed back to the customer (never negative).
    pub fn change(&self, total_due: Money) -> Money {
        if self.paid > total_due {
            self.paid - total_due
        } else {
            Money::zero()
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(cents: i64, id: &str) -> PaymentEvent {
        PaymentEvent {
            method: PaymentMethod::Card,
            amount: Money::from_cents(cents),
            transaction_id: Some(id.to_string()),
        }
    }

    #[test]
    fn test_duplicate_confirmation_is_ignored() {
        let mut acc = PaymentAccumulator::new();
        assert_eq!(acc.apply(&card(500, "tx-1")).unwrap(), Applied::Accepted);
        assert_eq!(acc.apply(&card(500, "tx-1")).unwrap(), Applied::Duplicate);
        assert_eq!(acc.paid().cents(), 500);
    }

    #[test]
    fn test_split_payment_settles() {
        let total = Money::from_cents(1160);
        let mut acc = PaymentAccumulator::new();

        acc.apply(&card(1000, "tx-1")).unwrap();
        assert!(!acc.is_settled(total));
        assert_eq!(acc.remaining(total).cents(), 160);

        acc.apply(&PaymentEvent::cash(Money::from_cents(200))).unwrap();
        assert!(acc.is_settled(total));
        assert_eq!(acc.change(total).cents(), 40);
        assert_eq!(acc.tenders().len(), 2);
    }

    #[test]
    fn test_cash_events_without_id_always_apply() {
        let mut acc = PaymentAccumulator::new();
        acc.apply(&PaymentEvent::cash(Money::from_cents(100))).unwrap();
        acc.apply(&PaymentEvent::cash(Money::from_cents(100))).unwrap();
        assert_eq!(acc.paid().cents(), 200);
        assert_eq!(acc.tenders()[0].amount.cents(), 200);
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        let mut acc = PaymentAccumulator::new();
        assert!(acc.apply(&PaymentEvent::cash(Money::zero())).is_err());
        assert!(acc.apply(&card(-5, "tx-9")).is_err());
        // a rejected event does not burn its id
        assert_eq!(acc.apply(&card(5, "tx-9")).unwrap(), Applied::Accepted);
    }
}
