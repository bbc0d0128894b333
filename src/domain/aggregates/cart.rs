//! Cart Aggregate
//!
//! The cart only owns its lines. Totals are never cached: every call to
//! [`Cart::totals`] recomputes them from the current lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::events::{CartEvent, DomainEvent};
use crate::domain::pricing::{compute_totals, CartTotals, LineItem, SellMode};
use crate::domain::value_objects::{LocalizedText, Sku};

#[derive(Clone, Debug)]
pub struct Cart {
    session_id: String,
    items: Vec<CartItem>,
    updated_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub variant_id: Uuid,
    pub sku: Sku,
    pub title: LocalizedText,
    #[serde(flatten)]
    pub line: LineItem,
}

impl CartItem {
    pub fn sell_mode(&self) -> SellMode { self.line.sell_mode }
    pub fn quantity(&self) -> u32 { self.line.quantity }
    fn is_line(&self, variant_id: Uuid, sell_mode: SellMode) -> bool {
        self.variant_id == variant_id && self.line.sell_mode == sell_mode
    }
}

impl Cart {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self { session_id: session_id.into(), items: vec![], updated_at: Utc::now(), events: vec![] }
    }

    pub fn with_items(session_id: impl Into<String>, items: Vec<CartItem>) -> Self {
        let mut cart = Self::new(session_id);
        cart.items = items;
        cart
    }

    pub fn session_id(&self) -> &str { &self.session_id }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn line_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn item(&self, variant_id: Uuid, sell_mode: SellMode) -> Option<&CartItem> {
        self.items.iter().find(|i| i.is_line(variant_id, sell_mode))
    }

    /// Quantities of `variant_id` carted under sell modes other than `sell_mode`.
    pub fn other_modes(&self, variant_id: Uuid, sell_mode: SellMode) -> Vec<(SellMode, u32)> {
        self.items.iter()
            .filter(|i| i.variant_id == variant_id && i.sell_mode() != sell_mode)
            .map(|i| (i.sell_mode(), i.quantity()))
            .collect()
    }

    pub fn totals(&self) -> CartTotals { compute_totals(self.items.iter().map(|i| &i.line)) }

    /// Adds a line, merging quantities with an existing line for the same variant and sell mode.
    /// Returns the resulting line.
    pub fn add_item(&mut self, item: CartItem) -> &CartItem {
        let (variant_id, sell_mode, quantity) = (item.variant_id, item.sell_mode(), item.quantity());
        let index = match self.items.iter().position(|i| i.is_line(variant_id, sell_mode)) {
            Some(index) => {
                let existing = &mut self.items[index];
                existing.line.quantity = existing.line.quantity.saturating_add(quantity);
                // Catalog figures may have moved since the line was first added.
                existing.line.unit_price = item.line.unit_price;
                existing.line.box_price = item.line.box_price;
                existing.line.tax_rate_percent = item.line.tax_rate_percent;
                index
            }
            None => { self.items.push(item); self.items.len() - 1 }
        };
        self.touch();
        self.raise_event(DomainEvent::Cart(CartEvent::ItemAdded { variant_id, sell_mode, quantity }));
        &self.items[index]
    }

    /// Sets a line's quantity; zero removes the line.
    pub fn update_quantity(&mut self, variant_id: Uuid, sell_mode: SellMode, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 { return self.remove_item(variant_id, sell_mode); }
        let item = self.items.iter_mut().find(|i| i.is_line(variant_id, sell_mode)).ok_or(CartError::ItemNotFound(variant_id))?;
        item.line.quantity = quantity;
        self.touch();
        self.raise_event(DomainEvent::Cart(CartEvent::QuantityChanged { variant_id, sell_mode, quantity }));
        Ok(())
    }

    pub fn remove_item(&mut self, variant_id: Uuid, sell_mode: SellMode) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| !i.is_line(variant_id, sell_mode));
        if self.items.len() == before { return Err(CartError::ItemNotFound(variant_id)); }
        self.touch();
        self.raise_event(DomainEvent::Cart(CartEvent::ItemRemoved { variant_id, sell_mode }));
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.touch();
        self.raise_event(DomainEvent::Cart(CartEvent::Cleared));
    }

    /// Align a line with the quantity the store holds after an increment. Raises no event.
    pub fn settle_quantity(&mut self, variant_id: Uuid, sell_mode: SellMode, quantity: u32) {
        if let Some(item) = self.items.iter_mut().find(|i| i.is_line(variant_id, sell_mode)) {
            item.line.quantity = quantity;
        }
    }

    /// Swap in the authoritative line list, discarding local changes.
    pub fn replace_items(&mut self, items: Vec<CartItem>) {
        self.items = items;
        self.touch();
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Item {0} not found in cart")]
    ItemNotFound(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn item(variant_id: Uuid, mode: SellMode, quantity: u32) -> CartItem {
        CartItem {
            variant_id,
            sku: Sku::new("BAG-PAPER-M").unwrap(),
            title: LocalizedText::greek("Χάρτινη σακούλα"),
            line: LineItem {
                unit_price: Decimal::new(500, 2),
                box_price: Some(Decimal::new(4000, 2)),
                quantity,
                tax_rate_percent: Decimal::new(24, 0),
                sell_mode: mode,
            },
        }
    }

    #[test]
    fn test_cart_operations() {
        let v = Uuid::new_v4();
        let mut cart = Cart::new("s-1");
        cart.add_item(item(v, SellMode::Unit, 2));
        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.totals().subtotal, Decimal::new(1000, 2));
        let merged = cart.add_item(item(v, SellMode::Unit, 1));
        assert_eq!(merged.quantity(), 3);
        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.totals().item_count, 3);
    }

    #[test]
    fn test_unit_and_box_lines_are_distinct() {
        let v = Uuid::new_v4();
        let mut cart = Cart::new("s-1");
        cart.add_item(item(v, SellMode::Unit, 3));
        cart.add_item(item(v, SellMode::Box, 1));
        assert_eq!(cart.line_count(), 2);
        let totals = cart.totals();
        assert_eq!(totals.subtotal, Decimal::new(5500, 2));
        assert_eq!(totals.total, Decimal::new(6820, 2));
        assert_eq!(totals.item_count, 4);
    }

    #[test]
    fn test_totals_follow_mutations() {
        let v = Uuid::new_v4();
        let mut cart = Cart::new("s-1");
        cart.add_item(item(v, SellMode::Unit, 2));
        cart.update_quantity(v, SellMode::Unit, 5).unwrap();
        assert_eq!(cart.totals().item_count, 5);
        assert_eq!(cart.totals().total, Decimal::new(3100, 2));
    }

    #[test]
    fn test_zero_quantity_removes_line() {
        let v = Uuid::new_v4();
        let mut cart = Cart::new("s-1");
        cart.add_item(item(v, SellMode::Unit, 2));
        cart.update_quantity(v, SellMode::Unit, 0).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.totals(), CartTotals::default());
    }

    #[test]
    fn test_missing_line() {
        let mut cart = Cart::new("s-1");
        let v = Uuid::new_v4();
        assert_eq!(cart.remove_item(v, SellMode::Box), Err(CartError::ItemNotFound(v)));
        assert_eq!(cart.update_quantity(v, SellMode::Box, 2), Err(CartError::ItemNotFound(v)));
    }

    #[test]
    fn test_events_recorded() {
        let v = Uuid::new_v4();
        let mut cart = Cart::new("s-1");
        cart.add_item(item(v, SellMode::Unit, 1));
        cart.remove_item(v, SellMode::Unit).unwrap();
        cart.clear();
        let kinds: Vec<_> = cart.take_events().iter().map(DomainEvent::kind).collect();
        assert_eq!(kinds, vec!["cart.item_added", "cart.item_removed", "cart.cleared"]);
        assert!(cart.take_events().is_empty());
    }

    #[test]
    fn test_other_modes_and_settle() {
        let v = Uuid::new_v4();
        let mut cart = Cart::new("s-1");
        cart.add_item(item(v, SellMode::Unit, 15));
        cart.add_item(item(v, SellMode::Box, 1));
        cart.add_item(item(Uuid::new_v4(), SellMode::Unit, 4));
        assert_eq!(cart.other_modes(v, SellMode::Unit), vec![(SellMode::Box, 1)]);
        assert_eq!(cart.other_modes(v, SellMode::Box), vec![(SellMode::Unit, 15)]);

        cart.take_events();
        cart.settle_quantity(v, SellMode::Unit, 20);
        assert_eq!(cart.item(v, SellMode::Unit).map(CartItem::quantity), Some(20));
        assert!(cart.take_events().is_empty());
    }

    #[test]
    fn test_replace_items() {
        let mut cart = Cart::new("s-1");
        cart.add_item(item(Uuid::new_v4(), SellMode::Unit, 9));
        cart.replace_items(vec![item(Uuid::new_v4(), SellMode::Box, 1)]);
        assert_eq!(cart.totals().item_count, 1);
        assert_eq!(cart.totals().subtotal, Decimal::new(4000, 2));
    }
}
