//! Packstore Commerce
//!
//! Cart, pricing and checkout backend for a bilingual (Greek/English)
//! packaging-products storefront.
//!
//! ## Features
//! - Variant-based catalog with unit and box pricing
//! - Cart totals and VAT computed from the current lines on every read
//! - Optimistic cart mutation with reload from the store on failure
//! - Order placement from a cart snapshot
//! - Category navigation menu in either storefront language

pub mod config;
pub mod domain;
pub mod store;

use thiserror::Error;
use uuid::Uuid;
use crate::domain::aggregates::{CartError, OrderError, ProductError};

pub use domain::pricing::{compute_totals, CartTotals, LineItem, SellMode};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Product not found")]
    ProductNotFound,

    #[error("Variant {0} not found")]
    VariantNotFound(Uuid),

    #[error("Order not found")]
    OrderNotFound,

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Product(#[from] ProductError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Cart write failed and was reverted: {source}")]
    Reverted { #[source] source: Box<StoreError> },

    #[error("Cart write failed ({write}) and reload failed ({reload})")]
    ReloadFailed { write: Box<StoreError>, reload: Box<StoreError> },

    #[error("Storage error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Event publishing error: {0}")]
    Events(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
