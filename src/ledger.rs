//! Order ledger: the durable, append-only record of every order finalized on
//! this device.
//!
//! Each order is written in its own SQLite commit before `append` returns.
//! The `synced` flag is the only column that may change afterwards; the
//! append-only triggers from the v2 migration reject any other update.
//! `count_unsynced` always queries storage, so the pending indicator cannot
//! drift from what is actually on disk.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};
use rust_decimal::Decimal;
use tracing::{debug, error, info};

use crate::cart::LineItem;
use crate::db::{DbState, StorageError};
use crate::order::{Order, Payment, PaymentMethod};

const ORDER_COLUMNS: &str = "id, customer_name, items, total, is_gift, payment_method,
                             cash_tendered, change_due, created_at, seller, event_name, synced";

#[derive(Debug, Clone)]
pub struct OrderLedger {
    db: Arc<DbState>,
}

/// Raw column values, decoded into an [`Order`] outside the row callback so
/// that format problems surface as [`StorageError::Corrupt`].
struct OrderRow {
    id: String,
    customer_name: String,
    items: String,
    total: String,
    is_gift: bool,
    payment_method: String,
    cash_tendered: Option<String>,
    change_due: Option<String>,
    created_at: String,
    seller: String,
    event_name: String,
    synced: bool,
}

impl OrderRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            customer_name: row.get(1)?,
            items: row.get(2)?,
            total: row.get(3)?,
            is_gift: row.get(4)?,
            payment_method: row.get(5)?,
            cash_tendered: row.get(6)?,
            change_due: row.get(7)?,
            created_at: row.get(8)?,
            seller: row.get(9)?,
            event_name: row.get(10)?,
            synced: row.get(11)?,
        })
    }

    fn into_order(self) -> Result<Order, StorageError> {
        let id = self.id;
        let corrupt = |field: &str, detail: String| StorageError::Corrupt {
            what: format!("order {id} {field}"),
            detail,
        };

        let items: Vec<LineItem> =
            serde_json::from_str(&self.items).map_err(|e| corrupt("items", e.to_string()))?;
        let total = parse_decimal(&self.total).map_err(|e| corrupt("total", e))?;
        let method = PaymentMethod::from_str(&self.payment_method)
            .map_err(|e| corrupt("payment_method", e))?;
        let payment = match method {
            PaymentMethod::Card => Payment::Card,
            PaymentMethod::Cash => {
                let tendered = self
                    .cash_tendered
                    .as_deref()
                    .map(parse_decimal)
                    .transpose()
                    .map_err(|e| corrupt("cash_tendered", e))?
                    .unwrap_or(Decimal::ZERO);
                let change = self
                    .change_due
                    .as_deref()
                    .map(parse_decimal)
                    .transpose()
                    .map_err(|e| corrupt("change_due", e))?
                    .unwrap_or(Decimal::ZERO);
                Payment::Cash { tendered, change }
            }
        };
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| corrupt("created_at", e.to_string()))?
            .with_timezone(&Utc);

        Ok(Order {
            id,
            customer_name: self.customer_name,
            items,
            total,
            is_gift: self.is_gift,
            payment,
            created_at,
            seller: self.seller,
            event_name: self.event_name,
            synced: self.synced,
        })
    }
}

fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw.trim()).map_err(|e| format!("{raw:?}: {e}"))
}

impl OrderLedger {
    pub fn new(db: Arc<DbState>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Arc<DbState> {
        &self.db
    }

    /// Persist a finalized order. Returns once the row is committed.
    ///
    /// The stored copy always starts unsynced, whatever the in-memory flag.
    pub fn append(&self, order: &Order) -> Result<(), StorageError> {
        let items = serde_json::to_string(&order.items)?;
        let created_at = order.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true);

        let conn = self.db.lock()?;

        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM orders WHERE id = ?1",
                params![order.id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StorageError::DuplicateOrder(order.id.clone()));
        }

        conn.execute(
            "INSERT INTO orders (
                id, customer_name, items, total, is_gift, payment_method,
                cash_tendered, change_due, created_at, seller, event_name, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0)",
            params![
                order.id,
                order.customer_name,
                items,
                order.total.to_string(),
                order.is_gift,
                order.payment_method().as_str(),
                order.payment.tendered().map(|d| d.to_string()),
                order.payment.change().map(|d| d.to_string()),
                created_at,
                order.seller,
                order.event_name,
            ],
        )?;

        info!(order_id = %order.id, total = %order.total, "Order appended to ledger");
        Ok(())
    }

    /// Flag an order as mirrored remotely.
    ///
    /// Unknown ids and already-synced orders are a no-op. Returns whether a
    /// row actually flipped from unsynced to synced.
    pub fn mark_synced(&self, order_id: &str) -> Result<bool, StorageError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.lock()?;
        let changed = conn.execute(
            "UPDATE orders SET synced = 1, synced_at = ?2 WHERE id = ?1 AND synced = 0",
            params![order_id, now],
        )?;

        if changed == 0 {
            debug!(order_id = %order_id, "mark_synced: no unsynced order with this id");
        } else {
            info!(order_id = %order_id, "Order marked synced");
        }
        Ok(changed > 0)
    }

    /// Number of orders not yet confirmed by the remote store.
    pub fn count_unsynced(&self) -> Result<usize, StorageError> {
        let conn = self.db.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM orders WHERE synced = 0", [], |row| {
                row.get(0)
            })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn count_all(&self) -> Result<usize, StorageError> {
        let conn = self.db.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Every order in append order.
    pub fn load_all(&self) -> Result<Vec<Order>, StorageError> {
        self.query_orders(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY seq"))
    }

    /// Unsynced orders in append order.
    ///
    /// Rows that no longer decode are logged and skipped so the rest of the
    /// backlog can still be pushed. They stay counted by `count_unsynced`.
    pub fn pending(&self) -> Result<Vec<Order>, StorageError> {
        let rows = self.query_rows(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE synced = 0 ORDER BY seq"
        ))?;
        let orders = rows
            .into_iter()
            .filter_map(|row| {
                let order_id = row.id.clone();
                match row.into_order() {
                    Ok(order) => Some(order),
                    Err(e) => {
                        error!(order_id = %order_id, "Skipping undecodable pending order: {e}");
                        None
                    }
                }
            })
            .collect();
        Ok(orders)
    }

    pub fn get(&self, order_id: &str) -> Result<Option<Order>, StorageError> {
        let row = {
            let conn = self.db.lock()?;
            conn.query_row(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
                params![order_id],
                OrderRow::from_row,
            )
            .optional()?
        };
        row.map(OrderRow::into_order).transpose()
    }

    fn query_orders(&self, sql: &str) -> Result<Vec<Order>, StorageError> {
        self.query_rows(sql)?
            .into_iter()
            .map(OrderRow::into_order)
            .collect()
    }

    fn query_rows(&self, sql: &str) -> Result<Vec<OrderRow>, StorageError> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map([], OrderRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
