//! In-memory shopping cart for the session.

use serde::{Deserialize, Serialize};

use lullwave_core::{CurrencyCode, Price, ProductId, VariantId};

use super::product::Product;

/// One product in the cart. `quantity` is always at least 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Price,
    pub image_url: Option<String>,
}

impl CartLine {
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// Shopping cart holding at most one line per product.
#[derive(Debug, Clone, Default)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.lines
            .iter()
            .find(|l| &l.product_id == product_id)
            .map_or(0, |l| l.quantity)
    }

    /// Add one of `product`, merging into an existing line.
    ///
    /// Returns the line's new quantity.
    pub fn add(&mut self, product: &Product) -> u32 {
        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product.id) {
            line.quantity = line.quantity.saturating_add(1);
            return line.quantity;
        }

        self.lines.push(CartLine {
            product_id: product.id.clone(),
            variant_id: product.variant_id.clone(),
            name: product.name.clone(),
            quantity: 1,
            unit_price: product.price,
            image_url: product.image_url.clone(),
        });
        1
    }

    /// Adjust a line by `delta`. The result is clamped at zero and a line
    /// reaching zero is removed.
    ///
    /// Returns the new quantity (0 if removed or absent).
    pub fn update_quantity(&mut self, product_id: &ProductId, delta: i64) -> u32 {
        let Some(line) = self.lines.iter_mut().find(|l| &l.product_id == product_id) else {
            return 0;
        };

        let next = i64::from(line.quantity).saturating_add(delta).max(0);
        let next = u32::try_from(next).unwrap_or(u32::MAX);
        if next == 0 {
            self.remove(product_id);
        } else {
            line.quantity = next;
        }
        next
    }

    /// Drop a line. Returns whether it was present.
    pub fn remove(&mut self, product_id: &ProductId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| &l.product_id != product_id);
        self.lines.len() != before
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Total number of items across lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0, |total: u32, l| total.saturating_add(l.quantity))
    }

    /// Sum of line totals, in the first line's currency.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        let currency = self
            .lines
            .first()
            .map_or(CurrencyCode::default(), |l| l.unit_price.currency_code);
        let amount = self.lines.iter().map(|l| l.line_total().amount).sum();
        Price::new(amount, currency)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::merch::catalog::tests::product;

    #[test]
    fn test_repeated_add_merges_into_one_line() {
        let mut cart = Cart::new();
        let hoodie = product("hoodie", 4900);
        for expected in 1..=5 {
            assert_eq!(cart.add(&hoodie), expected);
        }
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.quantity_of(&hoodie.id), 5);
    }

    #[test]
    fn test_update_quantity_clamps_and_removes() {
        let mut cart = Cart::new();
        let mask = product("mask", 1200);
        cart.add(&mask);
        cart.add(&mask);

        assert_eq!(cart.update_quantity(&mask.id, 3), 5);
        assert_eq!(cart.update_quantity(&mask.id, -1), 4);
        assert_eq!(cart.update_quantity(&mask.id, -10), 0);
        assert!(cart.is_empty());
        assert_eq!(cart.update_quantity(&mask.id, 1), 0);
    }

    #[test]
    fn test_update_quantity_saturates_extreme_deltas() {
        let mut cart = Cart::new();
        let mask = product("mask", 1200);
        cart.add(&mask);

        assert_eq!(cart.update_quantity(&mask.id, i64::MAX), u32::MAX);
        assert_eq!(cart.quantity_of(&mask.id), u32::MAX);
        assert_eq!(cart.item_count(), u32::MAX);

        assert_eq!(cart.update_quantity(&mask.id, i64::MIN), 0);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_totals() {
        let mut cart = Cart::new();
        let a = product("a", 1000);
        let b = product("b", 250);
        cart.add(&a);
        cart.add(&b);
        cart.add(&b);

        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.subtotal().amount, Decimal::new(1500, 2));
        assert_eq!(cart.subtotal().to_string(), "$15.00");
    }

    #[test]
    fn test_remove() {
        let mut cart = Cart::new();
        let a = product("a", 1000);
        cart.add(&a);
        assert!(cart.remove(&a.id));
        assert!(!cart.remove(&a.id));
        assert_eq!(cart.subtotal().amount, Decimal::ZERO);
    }
}
