//! PostgreSQL catalog, cart and order persistence
//!
//! Cart rows only carry `(session_id, variant_id, sell_mode, quantity)`.
//! Prices, stock and VAT are joined from the catalog on every load so a cart
//! always reflects current catalog data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::aggregates::{
    Address, CartItem, Order, OrderStatus, ProductBase, ProductError, ProductStatus, ProductVariant,
};
use crate::domain::menu::Category;
use crate::domain::pricing::{CartTotals, LineItem, SellMode};
use crate::domain::value_objects::{LocalizedText, Quantity, Sku, TaxRate};
use crate::store::CartStore;
use crate::{Result, StoreError};

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow { id: Uuid, parent_id: Option<Uuid>, slug: String, name_el: String, name_en: Option<String>, position: i32, tags: Vec<String> }

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid, slug: String, name_el: String, name_en: Option<String>, description_el: String, description_en: Option<String>,
    category_id: Option<Uuid>, tax_rate_percent: Decimal, status: String, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    id: Uuid, product_id: Uuid, sku: String, label_el: String, label_en: Option<String>,
    unit_price: Decimal, box_price: Option<Decimal>, units_per_box: Option<i32>, stock: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    variant_id: Uuid, sell_mode: String, quantity: i32, sku: String,
    name_el: String, name_en: Option<String>, label_el: String, label_en: Option<String>,
    unit_price: Decimal, box_price: Option<Decimal>, tax_rate_percent: Decimal, status: String,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid, order_number: String, customer_email: String, status: String,
    subtotal: Decimal, tax_amount: Decimal, total: Decimal, item_count: i64,
    shipping_address: Option<serde_json::Value>, notes: Option<String>,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    variant_id: Uuid, sku: String, title_el: String, title_en: Option<String>, sell_mode: String,
    unit_price: Decimal, box_price: Option<Decimal>, quantity: i32, tax_rate_percent: Decimal,
}

fn sku(raw: String) -> Result<Sku> { Sku::new(raw).map_err(|e| StoreError::Invalid(e.to_string())) }

fn sell_mode(raw: &str) -> Result<SellMode> {
    SellMode::parse(raw).ok_or_else(|| StoreError::Invalid(format!("unknown sell mode {raw}")))
}

fn non_negative(value: i32) -> u32 { u32::try_from(value).unwrap_or(0) }

/// Cart lines whose product is still on sale. Lines of drafted or archived
/// products stay in the table but are neither priced nor ordered.
fn cart_lines(rows: Vec<CartLineRow>) -> Result<Vec<CartItem>> {
    rows.into_iter()
        .filter(|r| ProductStatus::parse(&r.status) == ProductStatus::Active)
        .map(CartItem::try_from)
        .collect()
}

/// Decimal places of the `orders` amount columns. A 4dp price at a 2dp VAT
/// rate yields tax with up to 8 places, all of which are kept.
const ORDER_AMOUNT_SCALE: u32 = 8;

fn fits_order_scale(totals: &CartTotals) -> bool {
    [totals.subtotal, totals.tax_amount, totals.total].iter().all(|a| a.normalize().scale() <= ORDER_AMOUNT_SCALE)
}

fn to_i32(value: u64) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::Invalid(format!("quantity {value} out of range")))
}

impl TryFrom<VariantRow> for ProductVariant {
    type Error = StoreError;
    fn try_from(r: VariantRow) -> Result<Self> {
        Ok(Self {
            id: r.id, sku: sku(r.sku)?, label: LocalizedText::new(r.label_el, r.label_en),
            unit_price: r.unit_price, box_price: r.box_price,
            units_per_box: r.units_per_box.map(non_negative), stock: Quantity::new(non_negative(r.stock)),
        })
    }
}

impl TryFrom<CartLineRow> for CartItem {
    type Error = StoreError;
    fn try_from(r: CartLineRow) -> Result<Self> {
        Ok(Self {
            variant_id: r.variant_id,
            sku: sku(r.sku)?,
            title: ProductVariant::line_title(&LocalizedText::new(r.name_el, r.name_en), &LocalizedText::new(r.label_el, r.label_en)),
            line: LineItem {
                unit_price: r.unit_price, box_price: r.box_price, quantity: non_negative(r.quantity),
                tax_rate_percent: r.tax_rate_percent, sell_mode: sell_mode(&r.sell_mode)?,
            },
        })
    }
}

impl TryFrom<OrderItemRow> for CartItem {
    type Error = StoreError;
    fn try_from(r: OrderItemRow) -> Result<Self> {
        Ok(Self {
            variant_id: r.variant_id,
            sku: sku(r.sku)?,
            title: LocalizedText::new(r.title_el, r.title_en),
            line: LineItem {
                unit_price: r.unit_price, box_price: r.box_price, quantity: non_negative(r.quantity),
                tax_rate_percent: r.tax_rate_percent, sell_mode: sell_mode(&r.sell_mode)?,
            },
        })
    }
}

#[derive(Clone)]
pub struct PgStore { pool: PgPool }

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>("SELECT id, parent_id, slug, name_el, name_en, position, tags FROM categories")
            .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| Category {
            id: r.id, parent_id: r.parent_id, slug: r.slug, name: LocalizedText::new(r.name_el, r.name_en),
            position: r.position, tags: r.tags,
        }).collect())
    }

    /// Active products, newest first, optionally limited to one category.
    pub async fn list_products(&self, category: Option<Uuid>, page: u32, per_page: u32) -> Result<(Vec<ProductBase>, i64)> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(per_page);
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT * FROM product_bases WHERE status = 'active' AND ($1::uuid IS NULL OR category_id = $1) ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(category).bind(i64::from(per_page)).bind(offset)
        .fetch_all(&self.pool).await?;
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM product_bases WHERE status = 'active' AND ($1::uuid IS NULL OR category_id = $1)")
            .bind(category).fetch_one(&self.pool).await?;
        Ok((self.with_variants(rows).await?, total.0))
    }

    pub async fn product_by_slug(&self, slug: &str) -> Result<ProductBase> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM product_bases WHERE slug = $1 AND status = 'active'")
            .bind(slug).fetch_optional(&self.pool).await?.ok_or(StoreError::ProductNotFound)?;
        self.with_variants(vec![row]).await?.pop().ok_or(StoreError::ProductNotFound)
    }

    /// The product owning `variant_id`, with all of its variants.
    pub async fn product_for_variant(&self, variant_id: Uuid) -> Result<ProductBase> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT p.* FROM product_bases p JOIN product_variants v ON v.product_id = p.id WHERE v.id = $1 AND p.status = 'active'",
        )
        .bind(variant_id).fetch_optional(&self.pool).await?.ok_or(StoreError::VariantNotFound(variant_id))?;
        self.with_variants(vec![row]).await?.pop().ok_or(StoreError::VariantNotFound(variant_id))
    }

    async fn with_variants(&self, rows: Vec<ProductRow>) -> Result<Vec<ProductBase>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let variant_rows = sqlx::query_as::<_, VariantRow>(
            "SELECT id, product_id, sku, label_el, label_en, unit_price, box_price, units_per_box, stock FROM product_variants WHERE product_id = ANY($1) ORDER BY position, sku",
        )
        .bind(&ids).fetch_all(&self.pool).await?;
        let mut by_product: HashMap<Uuid, Vec<ProductVariant>> = HashMap::new();
        for row in variant_rows {
            by_product.entry(row.product_id).or_default().push(ProductVariant::try_from(row)?);
        }
        rows.into_iter().map(|r| {
            let tax_rate = TaxRate::from_percent(r.tax_rate_percent).map_err(|e| StoreError::Invalid(e.to_string()))?;
            Ok(ProductBase::restore(
                r.id, r.slug, LocalizedText::new(r.name_el, r.name_en), LocalizedText::new(r.description_el, r.description_en),
                r.category_id, tax_rate, ProductStatus::parse(&r.status), by_product.remove(&r.id).unwrap_or_default(),
                r.created_at, r.updated_at,
            ))
        }).collect()
    }

    /// Persist a placed order, take its stock and empty the session's cart in one transaction.
    pub async fn place_order(&self, order: &Order, session_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let totals = order.totals();
        if !fits_order_scale(totals) {
            return Err(StoreError::Invalid(format!("order amounts exceed {ORDER_AMOUNT_SCALE} decimal places")));
        }
        let address = order.shipping_address().map(serde_json::to_value).transpose()
            .map_err(|e| StoreError::Invalid(e.to_string()))?;
        sqlx::query(
            "INSERT INTO orders (id, order_number, customer_email, status, subtotal, tax_amount, total, item_count, shipping_address, notes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)",
        )
        .bind(order.id()).bind(order.order_number()).bind(order.customer_email()).bind(order.status().as_str())
        .bind(totals.subtotal).bind(totals.tax_amount).bind(totals.total)
        .bind(i64::try_from(totals.item_count).map_err(|_| StoreError::Invalid("item count out of range".into()))?)
        .bind(address).bind(order.notes()).bind(order.created_at())
        .execute(&mut *tx).await?;

        for line in order.lines() {
            Self::insert_order_item(&mut tx, order.id(), line).await?;
        }
        sqlx::query("DELETE FROM cart_items WHERE session_id = $1").bind(session_id).execute(&mut *tx).await?;
        tx.commit().await?;
        info!(order = %order.order_number(), total = %order.total(), "order placed");
        Ok(())
    }

    async fn insert_order_item(tx: &mut Transaction<'_, Postgres>, order_id: Uuid, line: &CartItem) -> Result<()> {
        let units_per_box = sqlx::query_scalar::<_, Option<i32>>("SELECT units_per_box FROM product_variants WHERE id = $1")
            .bind(line.variant_id).fetch_optional(&mut **tx).await?.flatten();
        let per = match line.sell_mode() {
            SellMode::Unit => 1,
            SellMode::Box => units_per_box.map_or(1, non_negative).max(1),
        };
        let units = to_i32(u64::from(line.quantity()) * u64::from(per))?;
        let taken = sqlx::query("UPDATE product_variants SET stock = stock - $2 WHERE id = $1 AND stock >= $2")
            .bind(line.variant_id).bind(units).execute(&mut **tx).await?;
        if taken.rows_affected() == 0 {
            let available = sqlx::query_scalar::<_, i32>("SELECT stock FROM product_variants WHERE id = $1")
                .bind(line.variant_id).fetch_optional(&mut **tx).await?;
            return Err(ProductError::InsufficientStock {
                sku: line.sku.clone(), requested: u64::from(non_negative(units)), available: available.map_or(0, non_negative),
            }.into());
        }
        sqlx::query(
            "INSERT INTO order_items (id, order_id, variant_id, sku, title_el, title_en, sell_mode, unit_price, box_price, quantity, tax_rate_percent) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(Uuid::now_v7()).bind(order_id).bind(line.variant_id).bind(line.sku.as_str())
        .bind(&line.title.el).bind(&line.title.en).bind(line.sell_mode().as_str())
        .bind(line.line.unit_price).bind(line.line.box_price).bind(to_i32(u64::from(line.quantity()))?)
        .bind(line.line.tax_rate_percent)
        .execute(&mut **tx).await?;
        Ok(())
    }

    pub async fn order(&self, id: Uuid) -> Result<Order> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?.ok_or(StoreError::OrderNotFound)?;
        let lines = sqlx::query_as::<_, OrderItemRow>(
            "SELECT variant_id, sku, title_el, title_en, sell_mode, unit_price, box_price, quantity, tax_rate_percent FROM order_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(id).fetch_all(&self.pool).await?
        .into_iter().map(CartItem::try_from).collect::<Result<Vec<_>>>()?;
        let status = OrderStatus::parse(&row.status).ok_or_else(|| StoreError::Invalid(format!("unknown order status {}", row.status)))?;
        let address: Option<Address> = row.shipping_address.map(serde_json::from_value).transpose()
            .map_err(|e| StoreError::Invalid(e.to_string()))?;
        let totals = CartTotals {
            subtotal: row.subtotal, tax_amount: row.tax_amount, total: row.total,
            item_count: u64::try_from(row.item_count).unwrap_or(0),
        };
        Ok(Order::restore(row.id, row.order_number, row.customer_email, status, lines, totals, address, row.notes, row.created_at, row.updated_at))
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn load(&self, session_id: &str) -> Result<Vec<CartItem>> {
        let rows = sqlx::query_as::<_, CartLineRow>(
            "SELECT c.variant_id, c.sell_mode, c.quantity, v.sku, p.name_el, p.name_en, v.label_el, v.label_en, \
                    v.unit_price, v.box_price, p.tax_rate_percent, p.status \
             FROM cart_items c \
             JOIN product_variants v ON v.id = c.variant_id \
             JOIN product_bases p ON p.id = v.product_id \
             WHERE c.session_id = $1 ORDER BY c.created_at, c.variant_id",
        )
        .bind(session_id).fetch_all(&self.pool).await?;
        debug!(session = session_id, lines = rows.len(), "cart rows fetched");
        cart_lines(rows)
    }

    async fn add_to_line(&self, session_id: &str, variant_id: Uuid, sell_mode: SellMode, delta: u32) -> Result<u32> {
        let stored = sqlx::query_scalar::<_, i32>(
            "INSERT INTO cart_items (session_id, variant_id, sell_mode, quantity, created_at, updated_at) VALUES ($1, $2, $3, $4, NOW(), NOW()) \
             ON CONFLICT (session_id, variant_id, sell_mode) DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity, updated_at = NOW() \
             RETURNING quantity",
        )
        .bind(session_id).bind(variant_id).bind(sell_mode.as_str()).bind(to_i32(u64::from(delta))?)
        .fetch_one(&self.pool).await?;
        Ok(non_negative(stored))
    }

    async fn save_line(&self, session_id: &str, variant_id: Uuid, sell_mode: SellMode, quantity: u32) -> Result<()> {
        sqlx::query(
            "INSERT INTO cart_items (session_id, variant_id, sell_mode, quantity, created_at, updated_at) VALUES ($1, $2, $3, $4, NOW(), NOW()) \
             ON CONFLICT (session_id, variant_id, sell_mode) DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = NOW()",
        )
        .bind(session_id).bind(variant_id).bind(sell_mode.as_str()).bind(to_i32(u64::from(quantity))?)
        .execute(&self.pool).await?;
        Ok(())
    }

    async fn remove_line(&self, session_id: &str, variant_id: Uuid, sell_mode: SellMode) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE session_id = $1 AND variant_id = $2 AND sell_mode = $3")
            .bind(session_id).bind(variant_id).bind(sell_mode.as_str())
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE session_id = $1").bind(session_id).execute(&self.pool).await?;
        Ok(())
    }
}
