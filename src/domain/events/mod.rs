//! Domain events
use crate::domain::pricing::SellMode;
use crate::domain::value_objects::Sku;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Product(ProductEvent),
    Cart(CartEvent),
    Order(OrderEvent),
}

impl DomainEvent {
    /// Subject suffix used when publishing, e.g. `order.placed`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Product(ProductEvent::Published { .. }) => "product.published",
            Self::Product(ProductEvent::StockAdded { .. }) => "product.stock_added",
            Self::Product(ProductEvent::StockRemoved { .. }) => "product.stock_removed",
            Self::Cart(CartEvent::ItemAdded { .. }) => "cart.item_added",
            Self::Cart(CartEvent::QuantityChanged { .. }) => "cart.quantity_changed",
            Self::Cart(CartEvent::ItemRemoved { .. }) => "cart.item_removed",
            Self::Cart(CartEvent::Cleared) => "cart.cleared",
            Self::Order(OrderEvent::Placed { .. }) => "order.placed",
            Self::Order(OrderEvent::Confirmed { .. }) => "order.confirmed",
            Self::Order(OrderEvent::Paid { .. }) => "order.paid",
            Self::Order(OrderEvent::Shipped { .. }) => "order.shipped",
            Self::Order(OrderEvent::Delivered { .. }) => "order.delivered",
            Self::Order(OrderEvent::Cancelled { .. }) => "order.cancelled",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductEvent {
    Published { product_id: Uuid },
    StockAdded { variant_id: Uuid, sku: Sku, quantity: u32 },
    StockRemoved { variant_id: Uuid, sku: Sku, quantity: u32 },
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CartEvent {
    ItemAdded { variant_id: Uuid, sell_mode: SellMode, quantity: u32 },
    QuantityChanged { variant_id: Uuid, sell_mode: SellMode, quantity: u32 },
    ItemRemoved { variant_id: Uuid, sell_mode: SellMode },
    Cleared,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, order_number: String, total: Decimal },
    Confirmed { order_id: Uuid },
    Paid { order_id: Uuid },
    Shipped { order_id: Uuid, tracking: Option<String> },
    Delivered { order_id: Uuid },
    Cancelled { order_id: Uuid },
}
