//! Pricing engine.
//!
//! Pure functions over cart lines. Uses `rust_decimal` so totals, tendered
//! cash and change are exact.
//!
//! Add-on ids that no longer resolve in the catalog contribute nothing to a
//! line's price. Stale references are tolerated rather than rejected.

use rust_decimal::Decimal;
use tracing::debug;

use crate::cart::LineItem;
use crate::catalog::Catalog;

/// Sum of the price deltas of every resolvable add-on on the line.
pub fn add_ons_delta(catalog: &Catalog, line: &LineItem) -> Decimal {
    line.add_ons
        .iter()
        .map(|id| match catalog.add_on(id) {
            Some(add_on) => add_on.price,
            None => {
                debug!(add_on = %id, product_id = line.product_id, "Unknown add-on priced at zero");
                Decimal::ZERO
            }
        })
        .sum()
}

/// Price of a single unit including its add-ons.
pub fn unit_total(catalog: &Catalog, line: &LineItem) -> Decimal {
    line.unit_price + add_ons_delta(catalog, line)
}

/// `(unit price + add-on deltas) × quantity`.
pub fn line_total(catalog: &Catalog, line: &LineItem) -> Decimal {
    unit_total(catalog, line) * Decimal::from(line.quantity)
}

/// Total due for the given lines. A gift order is always exactly zero.
pub fn cart_total(catalog: &Catalog, lines: &[LineItem], is_gift: bool) -> Decimal {
    if is_gift {
        return Decimal::ZERO;
    }
    lines.iter().map(|line| line_total(catalog, line)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{AddOnSelection, Cart};

    fn line(product_id: u32, price: i64, quantity: u32, add_ons: &[&str]) -> LineItem {
        LineItem {
            product_id,
            name: format!("product-{product_id}"),
            unit_price: Decimal::from(price),
            quantity,
            add_ons: AddOnSelection::new(add_ons.iter().copied()),
        }
    }

    #[test]
    fn test_line_total_without_add_ons() {
        let catalog = Catalog::builtin();
        assert_eq!(line_total(&catalog, &line(1, 35, 2, &[])), Decimal::from(70));
    }

    #[test]
    fn test_line_total_with_add_ons() {
        let catalog = Catalog::builtin();
        // (40 + 10 + 0) * 3
        let l = line(3, 40, 3, &["extra_shot", "sin_sal"]);
        assert_eq!(line_total(&catalog, &l), Decimal::from(150));
        assert_eq!(unit_total(&catalog, &l), Decimal::from(50));
    }

    #[test]
    fn test_unknown_add_on_contributes_zero() {
        let catalog = Catalog::builtin();
        let l = line(5, 25, 2, &["extra_shot", "renamed_extra"]);
        assert_eq!(add_ons_delta(&catalog, &l), Decimal::from(10));
        assert_eq!(line_total(&catalog, &l), Decimal::from(70));
    }

    #[test]
    fn test_cart_total_sums_lines() {
        let catalog = Catalog::builtin();
        let lines = vec![line(1, 35, 2, &[]), line(7, 50, 1, &["extra_shot"])];
        assert_eq!(cart_total(&catalog, &lines, false), Decimal::from(130));
    }

    #[test]
    fn test_gift_total_is_zero() {
        let catalog = Catalog::builtin();
        let lines = vec![line(1, 35, 2, &[]), line(7, 50, 4, &["extra_shot"])];
        assert_eq!(cart_total(&catalog, &lines, true), Decimal::ZERO);
        assert_eq!(cart_total(&catalog, &[], true), Decimal::ZERO);
    }

    #[test]
    fn test_cart_total_is_pure() {
        let catalog = Catalog::builtin();
        let mut cart = Cart::new();
        cart.add(catalog.product(2).unwrap(), 3, AddOnSelection::none())
            .unwrap();
        let before = cart.clone();

        let first = cart_total(&catalog, cart.lines(), false);
        let second = cart_total(&catalog, cart.lines(), false);

        assert_eq!(first, Decimal::from(90));
        assert_eq!(first, second);
        assert_eq!(cart, before);
    }

    #[test]
    fn test_fractional_prices_stay_exact() {
        let catalog = Catalog::builtin();
        let mut l = line(9, 0, 3, &[]);
        l.unit_price = Decimal::new(1_10, 2);
        assert_eq!(line_total(&catalog, &l), Decimal::new(3_30, 2));
    }
}
