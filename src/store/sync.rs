//! Optimistic cart session
//!
//! Every mutation is applied to the local cart first, then written to the
//! store. When the write fails the local lines are replaced with what the
//! store reports, so the caller always ends up with either its own change or
//! the authoritative state, never a hand-patched mix.

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartItem};
use crate::domain::events::DomainEvent;
use crate::domain::pricing::{CartTotals, SellMode};
use crate::store::CartStore;
use crate::{Result, StoreError};

pub struct CartSession<'a, S: CartStore + ?Sized> {
    store: &'a S,
    cart: Cart,
}

impl<'a, S: CartStore + ?Sized> CartSession<'a, S> {
    pub async fn load(store: &'a S, session_id: &str) -> Result<Self> {
        let items = store.load(session_id).await?;
        debug!(session = session_id, lines = items.len(), "cart loaded");
        Ok(Self { store, cart: Cart::with_items(session_id, items) })
    }

    pub fn cart(&self) -> &Cart { &self.cart }
    pub fn totals(&self) -> CartTotals { self.cart.totals() }
    pub fn take_events(&mut self) -> Vec<DomainEvent> { self.cart.take_events() }

    /// Sends the added quantity rather than the merged total, so adds from other
    /// sessions on the same cart are not overwritten.
    pub async fn add_item(&mut self, item: CartItem) -> Result<()> {
        let (variant_id, sell_mode, delta) = (item.variant_id, item.sell_mode(), item.quantity());
        self.cart.add_item(item);
        match self.store.add_to_line(self.cart.session_id(), variant_id, sell_mode, delta).await {
            Ok(stored) => {
                self.cart.settle_quantity(variant_id, sell_mode, stored);
                Ok(())
            }
            Err(write) => self.reconcile(Err(write)).await,
        }
    }

    /// Zero removes the line.
    pub async fn update_quantity(&mut self, variant_id: Uuid, sell_mode: SellMode, quantity: u32) -> Result<()> {
        self.cart.update_quantity(variant_id, sell_mode, quantity)?;
        let session_id = self.cart.session_id();
        let write = if quantity == 0 {
            self.store.remove_line(session_id, variant_id, sell_mode).await
        } else {
            self.store.save_line(session_id, variant_id, sell_mode, quantity).await
        };
        self.reconcile(write).await
    }

    pub async fn remove_item(&mut self, variant_id: Uuid, sell_mode: SellMode) -> Result<()> {
        self.cart.remove_item(variant_id, sell_mode)?;
        let write = self.store.remove_line(self.cart.session_id(), variant_id, sell_mode).await;
        self.reconcile(write).await
    }

    pub async fn clear(&mut self) -> Result<()> {
        self.cart.clear();
        let write = self.store.clear(self.cart.session_id()).await;
        self.reconcile(write).await
    }

    async fn reconcile(&mut self, write: Result<()>) -> Result<()> {
        let Err(write) = write else { return Ok(()) };
        let session_id = self.cart.session_id().to_string();
        warn!(session = %session_id, error = %write, "cart write failed, reloading from store");
        match self.store.load(&session_id).await {
            Ok(items) => {
                self.cart.replace_items(items);
                // The local change never happened as far as the store is concerned.
                self.cart.take_events();
                Err(StoreError::Reverted { source: Box::new(write) })
            }
            Err(reload) => {
                error!(session = %session_id, error = %reload, "cart reload failed");
                Err(StoreError::ReloadFailed { write: Box::new(write), reload: Box::new(reload) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pricing::LineItem;
    use crate::domain::value_objects::{LocalizedText, Sku};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        carts: Mutex<HashMap<String, Vec<CartItem>>>,
        fail_writes: AtomicBool,
        fail_loads: AtomicBool,
    }

    impl MemoryStore {
        fn seeded(session_id: &str, items: Vec<CartItem>) -> Self {
            let store = Self::default();
            store.carts.lock().unwrap().insert(session_id.to_string(), items);
            store
        }
        fn write_guard(&self) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) { return Err(StoreError::Invalid("write rejected".into())); }
            Ok(())
        }
        fn lines(&self, session_id: &str) -> Vec<CartItem> {
            self.carts.lock().unwrap().get(session_id).cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl CartStore for MemoryStore {
        async fn load(&self, session_id: &str) -> Result<Vec<CartItem>> {
            if self.fail_loads.load(Ordering::SeqCst) { return Err(StoreError::Invalid("load rejected".into())); }
            Ok(self.lines(session_id))
        }
        async fn add_to_line(&self, session_id: &str, variant_id: Uuid, sell_mode: SellMode, delta: u32) -> Result<u32> {
            self.write_guard()?;
            let mut carts = self.carts.lock().unwrap();
            let lines = carts.entry(session_id.to_string()).or_default();
            match lines.iter_mut().find(|l| l.variant_id == variant_id && l.sell_mode() == sell_mode) {
                Some(line) => {
                    line.line.quantity += delta;
                    Ok(line.line.quantity)
                }
                None => {
                    lines.push(item(variant_id, sell_mode, delta));
                    Ok(delta)
                }
            }
        }
        async fn save_line(&self, session_id: &str, variant_id: Uuid, sell_mode: SellMode, quantity: u32) -> Result<()> {
            self.write_guard()?;
            let mut carts = self.carts.lock().unwrap();
            let lines = carts.entry(session_id.to_string()).or_default();
            match lines.iter_mut().find(|l| l.variant_id == variant_id && l.sell_mode() == sell_mode) {
                Some(line) => line.line.quantity = quantity,
                None => lines.push(item(variant_id, sell_mode, quantity)),
            }
            Ok(())
        }
        async fn remove_line(&self, session_id: &str, variant_id: Uuid, sell_mode: SellMode) -> Result<()> {
            self.write_guard()?;
            if let Some(lines) = self.carts.lock().unwrap().get_mut(session_id) {
                lines.retain(|l| !(l.variant_id == variant_id && l.sell_mode() == sell_mode));
            }
            Ok(())
        }
        async fn clear(&self, session_id: &str) -> Result<()> {
            self.write_guard()?;
            self.carts.lock().unwrap().remove(session_id);
            Ok(())
        }
    }

    fn item(variant_id: Uuid, sell_mode: SellMode, quantity: u32) -> CartItem {
        CartItem {
            variant_id,
            sku: Sku::new("CUP-8OZ").unwrap(),
            title: LocalizedText::new("Χάρτινο ποτήρι", Some("Paper cup".into())),
            line: LineItem {
                unit_price: Decimal::new(1000, 2),
                box_price: None,
                quantity,
                tax_rate_percent: Decimal::new(24, 0),
                sell_mode,
            },
        }
    }

    #[tokio::test]
    async fn test_successful_mutations_persist() {
        let store = MemoryStore::default();
        let v = Uuid::new_v4();
        let mut session = CartSession::load(&store, "s-1").await.unwrap();
        session.add_item(item(v, SellMode::Unit, 2)).await.unwrap();
        session.add_item(item(v, SellMode::Unit, 1)).await.unwrap();
        assert_eq!(session.totals().item_count, 3);
        assert_eq!(store.lines("s-1")[0].quantity(), 3);

        session.update_quantity(v, SellMode::Unit, 0).await.unwrap();
        assert!(session.cart().is_empty());
        assert!(store.lines("s-1").is_empty());
        assert_eq!(session.take_events().len(), 3);
    }

    #[tokio::test]
    async fn test_overlapping_adds_accumulate() {
        let store = MemoryStore::default();
        let v = Uuid::new_v4();
        let mut first = CartSession::load(&store, "s-1").await.unwrap();
        let mut second = CartSession::load(&store, "s-1").await.unwrap();
        first.add_item(item(v, SellMode::Unit, 2)).await.unwrap();
        second.add_item(item(v, SellMode::Unit, 3)).await.unwrap();
        assert_eq!(store.lines("s-1")[0].quantity(), 5);
        assert_eq!(second.totals().item_count, 5);
        assert_eq!(first.totals().item_count, 2);
    }

    #[tokio::test]
    async fn test_failed_add_reloads_authoritative_state() {
        let v = Uuid::new_v4();
        let store = MemoryStore::seeded("s-1", vec![item(v, SellMode::Unit, 1)]);
        let mut session = CartSession::load(&store, "s-1").await.unwrap();
        store.fail_writes.store(true, Ordering::SeqCst);
        let err = session.add_item(item(v, SellMode::Unit, 4)).await.unwrap_err();
        assert!(matches!(err, StoreError::Reverted { .. }));
        assert_eq!(session.totals().item_count, 1);
    }

    #[tokio::test]
    async fn test_failed_write_reloads_authoritative_state() {
        let v = Uuid::new_v4();
        let store = MemoryStore::seeded("s-1", vec![item(v, SellMode::Unit, 2)]);
        let mut session = CartSession::load(&store, "s-1").await.unwrap();
        assert_eq!(session.totals().total, Decimal::new(2480, 2));

        store.fail_writes.store(true, Ordering::SeqCst);
        let err = session.update_quantity(v, SellMode::Unit, 7).await.unwrap_err();
        assert!(matches!(err, StoreError::Reverted { .. }));
        assert_eq!(session.totals().item_count, 2);
        assert_eq!(session.totals().total, Decimal::new(2480, 2));
        assert!(session.take_events().is_empty());

        let err = session.clear().await.unwrap_err();
        assert!(matches!(err, StoreError::Reverted { .. }));
        assert_eq!(session.cart().line_count(), 1);
    }

    #[tokio::test]
    async fn test_reload_failure_keeps_local_change() {
        let v = Uuid::new_v4();
        let store = MemoryStore::seeded("s-1", vec![item(v, SellMode::Unit, 2)]);
        let mut session = CartSession::load(&store, "s-1").await.unwrap();
        store.fail_writes.store(true, Ordering::SeqCst);
        store.fail_loads.store(true, Ordering::SeqCst);
        let err = session.remove_item(v, SellMode::Unit).await.unwrap_err();
        assert!(matches!(err, StoreError::ReloadFailed { .. }));
        assert!(session.cart().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_line_never_reaches_store() {
        let store = MemoryStore::default();
        let mut session = CartSession::load(&store, "s-1").await.unwrap();
        store.fail_loads.store(true, Ordering::SeqCst);
        let err = session.remove_item(Uuid::new_v4(), SellMode::Box).await.unwrap_err();
        assert!(matches!(err, StoreError::Cart(_)));
    }
}
