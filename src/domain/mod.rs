//! Storefront domain: pricing, catalog, cart and order aggregates.
pub mod aggregates;
pub mod events;
pub mod menu;
pub mod pricing;
pub mod value_objects;
