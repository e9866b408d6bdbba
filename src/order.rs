//! Finalized orders.
//!
//! An [`Order`] is frozen at checkout and never edited afterwards. The only
//! field that changes once it is in the ledger is `synced`, and that change
//! goes through [`crate::ledger::OrderLedger::mark_synced`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cart::LineItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Card,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            other => Err(format!("Invalid payment method: {other}. Must be cash or card")),
        }
    }
}

/// How the order was paid. Cash carries the tendered amount and the change
/// handed back; card carries nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum Payment {
    Cash { tendered: Decimal, change: Decimal },
    Card,
}

impl Payment {
    pub fn method(&self) -> PaymentMethod {
        match self {
            Payment::Cash { .. } => PaymentMethod::Cash,
            Payment::Card => PaymentMethod::Card,
        }
    }

    pub fn tendered(&self) -> Option<Decimal> {
        match self {
            Payment::Cash { tendered, .. } => Some(*tendered),
            Payment::Card => None,
        }
    }

    pub fn change(&self) -> Option<Decimal> {
        match self {
            Payment::Cash { change, .. } => Some(*change),
            Payment::Card => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub customer_name: String,
    pub items: Vec<LineItem>,
    pub total: Decimal,
    pub is_gift: bool,
    pub payment: Payment,
    pub created_at: DateTime<Utc>,
    pub seller: String,
    pub event_name: String,
    #[serde(default)]
    pub synced: bool,
}

impl Order {
    pub fn payment_method(&self) -> PaymentMethod {
        self.payment.method()
    }
}

/// Fresh order identifier. Random UUID rather than a clock tail so two
/// orders confirmed in the same millisecond can never collide.
pub fn new_order_id() -> String {
    format!("ORD-{}", Uuid::new_v4().simple())
}
