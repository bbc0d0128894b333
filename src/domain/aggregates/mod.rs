//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{ProductBase, ProductError, ProductStatus, ProductVariant};
pub use order::{Address, Order, OrderError, OrderStatus};
pub use cart::{Cart, CartError, CartItem};
