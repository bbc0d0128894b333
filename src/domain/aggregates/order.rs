//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::aggregates::cart::{Cart, CartItem};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::pricing::{compute_totals, CartTotals};

#[derive(Clone, Debug, Serialize)]
pub struct Order {
    id: Uuid,
    order_number: String,
    customer_email: String,
    status: OrderStatus,
    lines: Vec<CartItem>,
    totals: CartTotals,
    shipping_address: Option<Address>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
    pub phone: Option<String>,
}

fn default_country() -> String { "GR".to_string() }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Confirmed, Processing, Shipped, Delivered, Cancelled }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Confirmed => "confirmed", Self::Processing => "processing",
            Self::Shipped => "shipped", Self::Delivered => "delivered", Self::Cancelled => "cancelled",
        }
    }
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "pending" => Self::Pending, "confirmed" => Self::Confirmed, "processing" => Self::Processing,
            "shipped" => Self::Shipped, "delivered" => Self::Delivered, "cancelled" => Self::Cancelled,
            _ => return None,
        })
    }
}

impl Order {
    /// Snapshot a cart into a pending order. Zero-quantity lines are dropped.
    pub fn place(order_number: impl Into<String>, customer_email: impl Into<String>, shipping_address: Option<Address>, cart: &Cart) -> Result<Self, OrderError> {
        let lines: Vec<CartItem> = cart.items().iter().filter(|i| i.quantity() > 0).cloned().collect();
        if lines.is_empty() { return Err(OrderError::NoItems); }
        let totals = compute_totals(lines.iter().map(|i| &i.line));
        let now = Utc::now();
        let mut order = Self {
            id: Uuid::now_v7(), order_number: order_number.into(), customer_email: customer_email.into(),
            status: OrderStatus::Pending, lines, totals, shipping_address, notes: None,
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id, order_number: order.order_number.clone(), total: order.totals.total,
        }));
        Ok(order)
    }

    /// Rebuild an order from stored rows; raises no events.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid, order_number: String, customer_email: String, status: OrderStatus, lines: Vec<CartItem>,
        totals: CartTotals, shipping_address: Option<Address>, notes: Option<String>,
        created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Self {
        Self { id, order_number, customer_email, status, lines, totals, shipping_address, notes, created_at, updated_at, events: vec![] }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn customer_email(&self) -> &str { &self.customer_email }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn lines(&self) -> &[CartItem] { &self.lines }
    pub fn totals(&self) -> &CartTotals { &self.totals }
    pub fn total(&self) -> Decimal { self.totals.total }
    pub fn shipping_address(&self) -> Option<&Address> { self.shipping_address.as_ref() }
    pub fn notes(&self) -> Option<&str> { self.notes.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    pub fn set_notes(&mut self, notes: Option<String>) { self.notes = notes.filter(|n| !n.trim().is_empty()); self.touch(); }

    pub fn confirm(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::Pending, OrderStatus::Confirmed)?;
        self.raise_event(DomainEvent::Order(OrderEvent::Confirmed { order_id: self.id }));
        Ok(())
    }

    pub fn mark_paid(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::Confirmed, OrderStatus::Processing)?;
        self.raise_event(DomainEvent::Order(OrderEvent::Paid { order_id: self.id }));
        Ok(())
    }

    pub fn ship(&mut self, tracking: Option<String>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Processing, OrderStatus::Shipped)?;
        self.raise_event(DomainEvent::Order(OrderEvent::Shipped { order_id: self.id, tracking }));
        Ok(())
    }

    pub fn deliver(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::Shipped, OrderStatus::Delivered)?;
        self.raise_event(DomainEvent::Order(OrderEvent::Delivered { order_id: self.id }));
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if matches!(self.status, OrderStatus::Shipped | OrderStatus::Delivered | OrderStatus::Cancelled) {
            return Err(OrderError::InvalidTransition { from: self.status, to: OrderStatus::Cancelled });
        }
        self.status = OrderStatus::Cancelled;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id }));
        Ok(())
    }

    fn transition(&mut self, expected: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        if self.status != expected { return Err(OrderError::InvalidTransition { from: self.status, to }); }
        self.status = to;
        self.touch();
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("No items")]
    NoItems,
    #[error("Cannot move order from {from:?} to {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}
