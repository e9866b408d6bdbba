//! The order being built at the counter.
//!
//! A cart is an ordered list of line items where each line is a distinct
//! `(product, add-on set)` configuration. Adding a configuration that is
//! already present bumps the quantity of the existing line in place.

use std::collections::BTreeSet;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::Product;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("invalid index {index} (cart has {len} lines)")]
    InvalidIndex { index: usize, len: usize },
    #[error("quantity must be at least 1")]
    ZeroQuantity,
    #[error("quantity too large (current {current}, change {delta})")]
    QuantityOverflow { current: u32, delta: i64 },
}

/// Canonical, order-insensitive set of add-on identifiers.
///
/// Two selections with the same members compare equal regardless of the
/// order they were picked in; this is the single equality used when merging
/// cart lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddOnSelection(BTreeSet<String>);

impl AddOnSelection {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(ids.into_iter().map(Into::into).collect())
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Identifiers in canonical (sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for AddOnSelection {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl fmt::Display for AddOnSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for id in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(id)?;
            first = false;
        }
        Ok(())
    }
}

/// One cart entry. Carries the product name and unit price captured when it
/// was added so a frozen order never depends on the live catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: u32,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub add_ons: AddOnSelection,
}

impl LineItem {
    /// True when this line holds exactly the given configuration.
    pub fn same_configuration(&self, product_id: u32, add_ons: &AddOnSelection) -> bool {
        self.product_id == product_id && &self.add_ons == add_ons
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    lines: Vec<LineItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `quantity` units of `product` with the given add-ons, merging into
    /// an existing identical configuration when there is one.
    ///
    /// Returns the index of the line that now holds the configuration.
    pub fn add(
        &mut self,
        product: &Product,
        quantity: u32,
        add_ons: AddOnSelection,
    ) -> Result<usize, CartError> {
        if quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }

        if let Some(index) = self
            .lines
            .iter()
            .position(|line| line.same_configuration(product.id, &add_ons))
        {
            let line = &mut self.lines[index];
            line.quantity = line
                .quantity
                .checked_add(quantity)
                .ok_or(CartError::QuantityOverflow {
                    current: line.quantity,
                    delta: i64::from(quantity),
                })?;
            return Ok(index);
        }

        self.lines.push(LineItem {
            product_id: product.id,
            name: product.name.clone(),
            unit_price: product.price,
            quantity,
            add_ons,
        });
        Ok(self.lines.len() - 1)
    }

    /// Change the quantity of the line at `index` by `delta`.
    ///
    /// A line whose quantity would reach zero or below is removed. Returns the
    /// new quantity, or `None` when the line was removed.
    pub fn adjust_quantity(&mut self, index: usize, delta: i64) -> Result<Option<u32>, CartError> {
        let len = self.lines.len();
        let line = self
            .lines
            .get_mut(index)
            .ok_or(CartError::InvalidIndex { index, len })?;

        let overflow = CartError::QuantityOverflow {
            current: line.quantity,
            delta,
        };
        let next = i64::from(line.quantity)
            .checked_add(delta)
            .ok_or_else(|| overflow.clone())?;
        if next <= 0 {
            self.lines.remove(index);
            return Ok(None);
        }

        line.quantity = u32::try_from(next).map_err(|_| overflow)?;
        Ok(Some(line.quantity))
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Deep copy of the current lines for freezing into an order.
    pub fn snapshot(&self) -> Vec<LineItem> {
        self.lines.clone()
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total number of units across all lines.
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }
}
