//! The transaction currently at the counter.
//!
//! ```text
//! building ──begin_payment──▶ awaiting-payment ──confirm──▶ finalized
//!    ▲                              │                          │
//!    └────────back_to_cart──────────┘                          │
//!    └──────────────────────── reset ──────────────────────────┘
//! ```
//!
//! While building, the cart, customer name and gift flag are editable. Entering
//! awaiting-payment freezes the cart and fixes the total; payment method and
//! cash tendered are only accepted in that phase. Confirming produces
//! an immutable [`Order`] and resets the transaction; a confirmed order cannot
//! be reopened.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use crate::cart::{AddOnSelection, Cart, CartError};
use crate::catalog::{Catalog, Product};
use crate::order::{Order, Payment, PaymentMethod};
use crate::pricing;
use crate::session::EventSession;

/// Validation failures. None of these mutate the transaction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CheckoutError {
    #[error(transparent)]
    Cart(#[from] CartError),
    #[error("unknown product {0}")]
    UnknownProduct(u32),
    #[error("customer name is required")]
    MissingCustomerName,
    #[error("cart is empty")]
    EmptyCart,
    #[error("insufficient cash: tendered {tendered}, total {total}")]
    InsufficientCash { tendered: Decimal, total: Decimal },
    #[error("cash amount cannot be negative")]
    NegativeCash,
    #[error("order is awaiting payment; go back to the cart to edit it")]
    AwaitingPayment,
    #[error("no payment in progress")]
    NotAwaitingPayment,
    #[error("no active event session")]
    NoSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Building,
    AwaitingPayment { total: Decimal },
}

#[derive(Debug, Clone)]
pub struct Transaction {
    cart: Cart,
    customer_name: String,
    is_gift: bool,
    phase: Phase,
    payment_method: PaymentMethod,
    cash_tendered: Decimal,
}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            cart: Cart::new(),
            customer_name: String::new(),
            is_gift: false,
            phase: Phase::Building,
            payment_method: PaymentMethod::Cash,
            cash_tendered: Decimal::ZERO,
        }
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    pub fn is_gift(&self) -> bool {
        self.is_gift
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn cash_tendered(&self) -> Decimal {
        self.cash_tendered
    }

    fn ensure_building(&self) -> Result<(), CheckoutError> {
        match self.phase {
            Phase::Building => Ok(()),
            Phase::AwaitingPayment { .. } => Err(CheckoutError::AwaitingPayment),
        }
    }

    fn frozen_total(&self) -> Result<Decimal, CheckoutError> {
        match self.phase {
            Phase::AwaitingPayment { total } => Ok(total),
            Phase::Building => Err(CheckoutError::NotAwaitingPayment),
        }
    }

    // -- building ------------------------------------------------------------

    pub fn add_item(
        &mut self,
        product: &Product,
        quantity: u32,
        add_ons: AddOnSelection,
    ) -> Result<usize, CheckoutError> {
        self.ensure_building()?;
        Ok(self.cart.add(product, quantity, add_ons)?)
    }

    pub fn adjust_quantity(&mut self, index: usize, delta: i64) -> Result<Option<u32>, CheckoutError> {
        self.ensure_building()?;
        Ok(self.cart.adjust_quantity(index, delta)?)
    }

    pub fn clear_cart(&mut self) -> Result<(), CheckoutError> {
        self.ensure_building()?;
        self.cart.clear();
        Ok(())
    }

    pub fn set_customer_name(&mut self, name: &str) -> Result<(), CheckoutError> {
        self.ensure_building()?;
        self.customer_name = name.to_string();
        Ok(())
    }

    pub fn set_gift(&mut self, is_gift: bool) -> Result<(), CheckoutError> {
        self.ensure_building()?;
        self.is_gift = is_gift;
        Ok(())
    }

    /// Live total of the cart as currently configured.
    pub fn display_total(&self, catalog: &Catalog) -> Decimal {
        pricing::cart_total(catalog, self.cart.lines(), self.is_gift)
    }

    /// Freeze the cart and move to payment. Requires a customer name and at
    /// least one line.
    pub fn begin_payment(&mut self, catalog: &Catalog) -> Result<Decimal, CheckoutError> {
        self.ensure_building()?;
        if self.customer_name.trim().is_empty() {
            return Err(CheckoutError::MissingCustomerName);
        }
        if self.cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let total = self.display_total(catalog);
        self.phase = Phase::AwaitingPayment { total };
        debug!(total = %total, lines = self.cart.len(), "Awaiting payment");
        Ok(total)
    }

    // -- awaiting payment ----------------------------------------------------

    /// Leave the payment step without confirming.
    pub fn back_to_cart(&mut self) -> Result<(), CheckoutError> {
        self.frozen_total()?;
        self.phase = Phase::Building;
        Ok(())
    }

    /// Frozen total, once payment has started.
    pub fn total(&self) -> Option<Decimal> {
        self.frozen_total().ok()
    }

    pub fn select_payment(&mut self, method: PaymentMethod) -> Result<(), CheckoutError> {
        self.frozen_total()?;
        self.payment_method = method;
        Ok(())
    }

    /// Add a bill to the cash tendered. Returns the new tendered amount.
    pub fn add_cash(&mut self, amount: Decimal) -> Result<Decimal, CheckoutError> {
        self.frozen_total()?;
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(CheckoutError::NegativeCash);
        }
        self.cash_tendered += amount;
        Ok(self.cash_tendered)
    }

    pub fn set_cash(&mut self, amount: Decimal) -> Result<(), CheckoutError> {
        self.frozen_total()?;
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(CheckoutError::NegativeCash);
        }
        self.cash_tendered = amount;
        Ok(())
    }

    pub fn clear_cash(&mut self) -> Result<(), CheckoutError> {
        self.frozen_total()?;
        self.cash_tendered = Decimal::ZERO;
        Ok(())
    }

    /// `tendered - total`; negative means the customer still owes money.
    pub fn change_preview(&self) -> Option<Decimal> {
        self.total().map(|total| self.cash_tendered - total)
    }

    pub fn can_confirm(&self) -> bool {
        self.validate_payment().is_ok()
    }

    fn validate_payment(&self) -> Result<Payment, CheckoutError> {
        let total = self.frozen_total()?;
        match self.payment_method {
            PaymentMethod::Card => Ok(Payment::Card),
            PaymentMethod::Cash => {
                if self.cash_tendered < total {
                    return Err(CheckoutError::InsufficientCash {
                        tendered: self.cash_tendered,
                        total,
                    });
                }
                Ok(Payment::Cash {
                    tendered: self.cash_tendered,
                    change: self.cash_tendered - total,
                })
            }
        }
    }

    /// Build the immutable order and reset for the next customer.
    ///
    /// On any validation error nothing changes: the cart, name and payment
    /// inputs stay as they were.
    pub fn confirm(
        &mut self,
        session: &EventSession,
        order_id: String,
        now: DateTime<Utc>,
    ) -> Result<Order, CheckoutError> {
        let total = self.frozen_total()?;
        let payment = self.validate_payment()?;

        let order = Order {
            id: order_id,
            customer_name: self.customer_name.trim().to_string(),
            items: self.cart.snapshot(),
            total,
            is_gift: self.is_gift,
            payment,
            created_at: now,
            seller: session.seller.clone(),
            event_name: session.event_name.clone(),
            synced: false,
        };

        self.reset();
        Ok(order)
    }

    /// Start a fresh transaction. The selected payment method is kept.
    pub fn reset(&mut self) {
        self.cart.clear();
        self.customer_name.clear();
        self.is_gift = false;
        self.cash_tendered = Decimal::ZERO;
        self.phase = Phase::Building;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> EventSession {
        EventSession::start("Luis", "Feria").unwrap()
    }

    /// Two Azulitos for Ana: 70.00 due.
    fn azulito_order(catalog: &Catalog) -> Transaction {
        let mut tx = Transaction::new();
        tx.set_customer_name("Ana").unwrap();
        tx.add_item(catalog.product(1).unwrap(), 2, AddOnSelection::none())
            .unwrap();
        tx
    }

    #[test]
    fn test_begin_payment_requires_customer_and_items() {
        let catalog = Catalog::builtin();
        let mut tx = Transaction::new();
        tx.add_item(catalog.product(1).unwrap(), 1, AddOnSelection::none())
            .unwrap();
        assert_eq!(
            tx.begin_payment(&catalog),
            Err(CheckoutError::MissingCustomerName)
        );

        let mut tx = Transaction::new();
        tx.set_customer_name("Ana").unwrap();
        assert_eq!(tx.begin_payment(&catalog), Err(CheckoutError::EmptyCart));
        assert_eq!(tx.phase(), Phase::Building);
    }

    #[test]
    fn test_cart_is_frozen_while_awaiting_payment() {
        let catalog = Catalog::builtin();
        let mut tx = azulito_order(&catalog);
        assert_eq!(tx.begin_payment(&catalog), Ok(Decimal::from(70)));

        let product = catalog.product(2).unwrap();
        assert_eq!(
            tx.add_item(product, 1, AddOnSelection::none()),
            Err(CheckoutError::AwaitingPayment)
        );
        assert_eq!(tx.adjust_quantity(0, 1), Err(CheckoutError::AwaitingPayment));
        assert_eq!(tx.set_gift(true), Err(CheckoutError::AwaitingPayment));
        assert_eq!(tx.cart().item_count(), 2);

        tx.back_to_cart().unwrap();
        tx.add_item(product, 1, AddOnSelection::none()).unwrap();
        assert_eq!(tx.begin_payment(&catalog), Ok(Decimal::from(100)));
    }

    #[test]
    fn test_insufficient_cash_is_rejected_without_changes() {
        let catalog = Catalog::builtin();
        let mut tx = azulito_order(&catalog);
        tx.begin_payment(&catalog).unwrap();
        tx.add_cash(Decimal::from(50)).unwrap();

        assert!(!tx.can_confirm());
        assert_eq!(tx.change_preview(), Some(Decimal::from(-20)));
        let err = tx
            .confirm(&session(), "ORD-1".into(), Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            CheckoutError::InsufficientCash {
                tendered: Decimal::from(50),
                total: Decimal::from(70),
            }
        );

        assert_eq!(tx.cart().len(), 1);
        assert_eq!(tx.cart().lines()[0].quantity, 2);
        assert_eq!(tx.customer_name(), "Ana");
        assert_eq!(tx.cash_tendered(), Decimal::from(50));
        assert_eq!(tx.phase(), Phase::AwaitingPayment { total: Decimal::from(70) });
    }

    #[test]
    fn test_exact_cash_gives_zero_change() {
        let catalog = Catalog::builtin();
        let mut tx = azulito_order(&catalog);
        tx.begin_payment(&catalog).unwrap();
        tx.set_cash(Decimal::new(7000, 2)).unwrap();

        let order = tx.confirm(&session(), "ORD-1".into(), Utc::now()).unwrap();
        assert_eq!(order.payment.change(), Some(Decimal::ZERO));
        assert!(order.payment.change().unwrap().is_zero());
    }

    #[test]
    fn test_overpaid_cash_gives_change() {
        let catalog = Catalog::builtin();
        let mut tx = azulito_order(&catalog);
        tx.begin_payment(&catalog).unwrap();
        for bill in [50, 20, 20, 10] {
            tx.add_cash(Decimal::from(bill)).unwrap();
        }

        let order = tx.confirm(&session(), "ORD-1".into(), Utc::now()).unwrap();
        assert_eq!(order.total, Decimal::from(70));
        assert_eq!(
            order.payment,
            Payment::Cash {
                tendered: Decimal::from(100),
                change: Decimal::from(30),
            }
        );
        assert_eq!(order.seller, "Luis");
        assert_eq!(order.event_name, "Feria");
        assert!(!order.synced);
    }

    #[test]
    fn test_card_always_confirms() {
        let catalog = Catalog::builtin();
        let mut tx = azulito_order(&catalog);
        tx.begin_payment(&catalog).unwrap();
        tx.select_payment(PaymentMethod::Card).unwrap();
        assert!(tx.can_confirm());

        let order = tx.confirm(&session(), "ORD-1".into(), Utc::now()).unwrap();
        assert_eq!(order.payment, Payment::Card);
        assert_eq!(tx.payment_method(), PaymentMethod::Card);
    }

    #[test]
    fn test_gift_with_zero_cash_is_valid() {
        let catalog = Catalog::builtin();
        let mut tx = azulito_order(&catalog);
        tx.set_gift(true).unwrap();
        assert_eq!(tx.begin_payment(&catalog), Ok(Decimal::ZERO));
        assert!(tx.can_confirm());

        let order = tx.confirm(&session(), "ORD-1".into(), Utc::now()).unwrap();
        assert!(order.is_gift);
        assert_eq!(order.total, Decimal::ZERO);
        assert_eq!(order.payment.change(), Some(Decimal::ZERO));
        assert_eq!(pricing::cart_total(&catalog, &order.items, false), Decimal::from(70));
    }

    #[test]
    fn test_confirm_resets_and_order_is_detached() {
        let catalog = Catalog::builtin();
        let mut tx = azulito_order(&catalog);
        tx.set_gift(false).unwrap();
        tx.begin_payment(&catalog).unwrap();
        tx.add_cash(Decimal::from(100)).unwrap();
        let order = tx.confirm(&session(), "ORD-1".into(), Utc::now()).unwrap();

        assert_eq!(tx.phase(), Phase::Building);
        assert!(tx.cart().is_empty());
        assert!(tx.customer_name().is_empty());
        assert!(!tx.is_gift());
        assert_eq!(tx.cash_tendered(), Decimal::ZERO);

        tx.add_item(catalog.product(1).unwrap(), 5, AddOnSelection::none())
            .unwrap();
        assert_eq!(order.items[0].quantity, 2);
    }

    #[test]
    fn test_confirm_requires_awaiting_payment() {
        let mut tx = Transaction::new();
        assert_eq!(
            tx.confirm(&session(), "ORD-1".into(), Utc::now()),
            Err(CheckoutError::NotAwaitingPayment)
        );
        assert_eq!(tx.back_to_cart(), Err(CheckoutError::NotAwaitingPayment));
    }

    #[test]
    fn test_negative_cash_rejected() {
        let catalog = Catalog::builtin();
        let mut tx = azulito_order(&catalog);
        tx.begin_payment(&catalog).unwrap();
        assert_eq!(tx.add_cash(Decimal::from(-5)), Err(CheckoutError::NegativeCash));
        assert_eq!(tx.set_cash(Decimal::from(-1)), Err(CheckoutError::NegativeCash));
        tx.add_cash(Decimal::from(20)).unwrap();
        tx.clear_cash().unwrap();
        assert_eq!(tx.cash_tendered(), Decimal::ZERO);
    }

    #[test]
    fn test_payment_inputs_wait_for_payment_step() {
        let catalog = Catalog::builtin();
        let mut tx = azulito_order(&catalog);

        assert_eq!(tx.add_cash(Decimal::from(50)), Err(CheckoutError::NotAwaitingPayment));
        assert_eq!(tx.set_cash(Decimal::from(50)), Err(CheckoutError::NotAwaitingPayment));
        assert_eq!(tx.clear_cash(), Err(CheckoutError::NotAwaitingPayment));
        assert_eq!(
            tx.select_payment(PaymentMethod::Card),
            Err(CheckoutError::NotAwaitingPayment)
        );
        assert_eq!(tx.cash_tendered(), Decimal::ZERO);
        assert_eq!(tx.payment_method(), PaymentMethod::Cash);

        tx.begin_payment(&catalog).unwrap();
        tx.add_cash(Decimal::from(50)).unwrap();
        tx.back_to_cart().unwrap();
        assert_eq!(tx.add_cash(Decimal::from(20)), Err(CheckoutError::NotAwaitingPayment));
        assert_eq!(tx.cash_tendered(), Decimal::from(50));
    }
}
