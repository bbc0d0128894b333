//! Product Aggregate
//!
//! A product base groups sellable variants (sizes, colours, materials). Price,
//! optional box price and stock live on the variant; the VAT rate lives on the
//! base.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::pricing::{LineItem, SellMode};
use crate::domain::value_objects::{LocalizedText, Quantity, Sku, TaxRate};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductBase {
    id: Uuid,
    slug: String,
    name: LocalizedText,
    description: LocalizedText,
    category_id: Option<Uuid>,
    tax_rate: TaxRate,
    status: ProductStatus,
    variants: Vec<ProductVariant>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: Uuid,
    pub sku: Sku,
    pub label: LocalizedText,
    pub unit_price: Decimal,
    pub box_price: Option<Decimal>,
    pub units_per_box: Option<u32>,
    pub stock: Quantity,
}

impl ProductVariant {
    pub fn is_in_stock(&self) -> bool { !self.stock.is_zero() }

    /// Stock units consumed by `quantity` sold in `mode`.
    pub fn units_required(&self, mode: SellMode, quantity: u32) -> u64 {
        let per = match mode {
            SellMode::Unit => 1,
            SellMode::Box => self.units_per_box.unwrap_or(1).max(1),
        };
        u64::from(quantity) * u64::from(per)
    }

    pub fn sells_by_box(&self) -> bool { self.box_price.is_some() }

    /// Cart and order line title: product name followed by this variant's label.
    pub fn title(&self, product_name: &LocalizedText) -> LocalizedText {
        Self::line_title(product_name, &self.label)
    }

    pub fn line_title(name: &LocalizedText, label: &LocalizedText) -> LocalizedText {
        let join = |a: &str, b: &str| if b.trim().is_empty() { a.to_string() } else { format!("{a} {b}") };
        let en = match (&name.en, &label.en) {
            (None, None) => None,
            (name_en, label_en) => Some(join(name_en.as_deref().unwrap_or(&name.el), label_en.as_deref().unwrap_or(&label.el))),
        };
        LocalizedText::new(join(&name.el, &label.el), en)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus { #[default] Draft, Active, Archived }

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Draft => "draft", Self::Active => "active", Self::Archived => "archived" }
    }
    pub fn parse(value: &str) -> Self {
        match value { "active" => Self::Active, "archived" => Self::Archived, _ => Self::Draft }
    }
}

impl ProductBase {
    pub fn create(slug: impl Into<String>, name: LocalizedText, tax_rate: TaxRate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(), slug: slug.into(), name, description: LocalizedText::default(),
            category_id: None, tax_rate, status: ProductStatus::Draft, variants: vec![],
            created_at: now, updated_at: now, events: vec![],
        }
    }

    /// Rebuild a product from stored rows; raises no events.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid, slug: String, name: LocalizedText, description: LocalizedText, category_id: Option<Uuid>,
        tax_rate: TaxRate, status: ProductStatus, variants: Vec<ProductVariant>,
        created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Self {
        Self { id, slug, name, description, category_id, tax_rate, status, variants, created_at, updated_at, events: vec![] }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn slug(&self) -> &str { &self.slug }
    pub fn name(&self) -> &LocalizedText { &self.name }
    pub fn description(&self) -> &LocalizedText { &self.description }
    pub fn category_id(&self) -> Option<Uuid> { self.category_id }
    pub fn tax_rate(&self) -> TaxRate { self.tax_rate }
    pub fn status(&self) -> ProductStatus { self.status }
    pub fn variants(&self) -> &[ProductVariant] { &self.variants }
    pub fn is_in_stock(&self) -> bool { self.variants.iter().any(ProductVariant::is_in_stock) }

    pub fn add_variant(&mut self, variant: ProductVariant) -> Result<(), ProductError> {
        if self.variants.iter().any(|v| v.sku == variant.sku) { return Err(ProductError::DuplicateSku(variant.sku)); }
        self.variants.push(variant);
        self.touch();
        Ok(())
    }

    pub fn variant(&self, variant_id: Uuid) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    /// Variant preselected on the product page: first one in stock, else the first listed.
    pub fn default_variant(&self) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| v.is_in_stock()).or_else(|| self.variants.first())
    }

    pub fn publish(&mut self) -> Result<(), ProductError> {
        if self.name.is_empty() { return Err(ProductError::MissingName); }
        if self.variants.is_empty() { return Err(ProductError::NoVariants); }
        self.status = ProductStatus::Active;
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::Published { product_id: self.id }));
        Ok(())
    }

    pub fn archive(&mut self) { self.status = ProductStatus::Archived; self.touch(); }

    /// Price a cart line for `quantity` of a variant, checking sell mode and stock.
    pub fn line_item(&self, variant_id: Uuid, sell_mode: SellMode, quantity: u32) -> Result<LineItem, ProductError> {
        self.line_item_alongside(variant_id, sell_mode, quantity, &[])
    }

    /// [`line_item`](Self::line_item) for a cart that already holds `held`: quantities
    /// of the same variant under other sell modes. Unit and box lines draw on one stock.
    pub fn line_item_alongside(
        &self, variant_id: Uuid, sell_mode: SellMode, quantity: u32, held: &[(SellMode, u32)],
    ) -> Result<LineItem, ProductError> {
        let variant = self.variant(variant_id).ok_or(ProductError::VariantNotFound(variant_id))?;
        if quantity == 0 { return Err(ProductError::InvalidQuantity); }
        if sell_mode == SellMode::Box && !variant.sells_by_box() { return Err(ProductError::NotSoldByBox(variant.sku.clone())); }
        let committed: u64 = held.iter().map(|&(mode, qty)| variant.units_required(mode, qty)).sum();
        let requested = variant.units_required(sell_mode, quantity) + committed;
        let available = variant.stock.value();
        if requested > u64::from(available) {
            return Err(ProductError::InsufficientStock { sku: variant.sku.clone(), requested, available });
        }
        Ok(LineItem {
            unit_price: variant.unit_price,
            box_price: variant.box_price,
            quantity,
            tax_rate_percent: self.tax_rate.percent(),
            sell_mode,
        })
    }

    pub fn add_stock(&mut self, variant_id: Uuid, qty: u32) -> Result<(), ProductError> {
        let variant = self.variants.iter_mut().find(|v| v.id == variant_id).ok_or(ProductError::VariantNotFound(variant_id))?;
        variant.stock = variant.stock.add(qty);
        let event = ProductEvent::StockAdded { variant_id, sku: variant.sku.clone(), quantity: qty };
        self.touch();
        self.raise_event(DomainEvent::Product(event));
        Ok(())
    }

    pub fn remove_stock(&mut self, variant_id: Uuid, qty: u32) -> Result<(), ProductError> {
        let variant = self.variants.iter_mut().find(|v| v.id == variant_id).ok_or(ProductError::VariantNotFound(variant_id))?;
        let sku = variant.sku.clone();
        let available = variant.stock.value();
        variant.stock = variant.stock.subtract(qty).ok_or_else(|| ProductError::InsufficientStock {
            sku: sku.clone(), requested: u64::from(qty), available,
        })?;
        let event = ProductEvent::StockRemoved { variant_id, sku, quantity: qty };
        self.touch();
        self.raise_event(DomainEvent::Product(event));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("Missing name")]
    MissingName,
    #[error("Product has no variants")]
    NoVariants,
    #[error("Duplicate SKU {0}")]
    DuplicateSku(Sku),
    #[error("Variant {0} not found")]
    VariantNotFound(Uuid),
    #[error("Quantity must be at least 1")]
    InvalidQuantity,
    #[error("{0} is not sold by the box")]
    NotSoldByBox(Sku),
    #[error("Insufficient stock for {sku}: requested {requested}, available {available}")]
    InsufficientStock { sku: Sku, requested: u64, available: u32 },
}
