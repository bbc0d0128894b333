//! Packstore Commerce - cart, pricing and checkout API

use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, response::{IntoResponse, Response}, routing::{get, post, put}, Json, Router};
use packstore_commerce::config::Config;
use packstore_commerce::domain::aggregates::{Address, Cart, CartError, CartItem, Order, ProductBase, ProductError};
use packstore_commerce::domain::menu::{build_menu, MenuEntry};
use packstore_commerce::domain::value_objects::{Locale, Money, UnknownLocale};
use packstore_commerce::store::{CartSession, CartStore, EventPublisher, PgStore};
use packstore_commerce::{CartTotals, LineItem, SellMode, StoreError};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct AppState { pub store: PgStore, pub events: EventPublisher, pub config: Arc<Config> }

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;
    let db = PgPoolOptions::new().max_connections(config.max_connections).connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;
    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => { tracing::warn!(error = %e, "NATS unavailable, domain events will not be published"); None }
        },
        None => None,
    };
    let addr = config.socket_addr();
    let state = AppState { store: PgStore::new(db), events: EventPublisher::new(nats), config: Arc::new(config) };

    let app = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "packstore-commerce"})) }))
        .route("/api/v1/categories/menu", get(category_menu))
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/:slug", get(get_product))
        .route("/api/v1/cart/:session", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/:session/items", post(add_to_cart))
        .route("/api/v1/cart/:session/items/:variant", put(update_cart_item).delete(remove_cart_item))
        .route("/api/v1/cart/:session/checkout", post(checkout))
        .route("/api/v1/orders/:id", get(get_order))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state);

    tracing::info!("packstore-commerce listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}

// =============================================================================
// Errors
// =============================================================================

/// Error response. Failed cart writes carry the reloaded cart so the client can
/// redraw from authoritative state.
pub struct ApiError { error: StoreError, cart: Option<CartView> }

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self { Self { error, cart: None } }
}

impl From<ProductError> for ApiError {
    fn from(error: ProductError) -> Self { StoreError::from(error).into() }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self { StoreError::Invalid(errors.to_string()).into() }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.error {
            StoreError::ProductNotFound | StoreError::VariantNotFound(_) | StoreError::OrderNotFound
            | StoreError::Cart(CartError::ItemNotFound(_)) | StoreError::Product(ProductError::VariantNotFound(_)) => StatusCode::NOT_FOUND,
            StoreError::Product(ProductError::InsufficientStock { .. } | ProductError::NotSoldByBox(_)) => StatusCode::CONFLICT,
            StoreError::Product(_) | StoreError::Order(_) | StoreError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StoreError::Reverted { .. } | StoreError::ReloadFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            StoreError::Database(_) | StoreError::Events(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() { tracing::error!(error = %self.error, "request failed"); }
        (status, Json(serde_json::json!({"error": self.error.to_string(), "cart": self.cart}))).into_response()
    }
}

// =============================================================================
// Views
// =============================================================================

#[derive(Debug, Deserialize)] pub struct LocaleParams { pub locale: Option<String> }

fn locale(s: &AppState, requested: Option<&str>) -> Result<Locale, ApiError> {
    match requested {
        None => Ok(s.config.default_locale),
        Some(code) => code.parse().map_err(|e: UnknownLocale| StoreError::Invalid(e.to_string()).into()),
    }
}

#[derive(Debug, Serialize)]
pub struct CartItemView { pub variant_id: Uuid, pub sku: String, pub title: String, pub sell_mode: SellMode, pub quantity: u32, pub unit_price: Decimal, pub tax_rate_percent: Decimal, pub line_subtotal: Decimal, pub line_display: String }

#[derive(Debug, Serialize)]
pub struct CartView { pub session_id: String, pub currency: String, pub items: Vec<CartItemView>, pub totals: CartTotals, pub total_display: String }

impl CartView {
    fn new(cart: &Cart, locale: Locale, currency: &str) -> Self {
        let items = cart.items().iter().map(|i: &CartItem| CartItemView {
            variant_id: i.variant_id, sku: i.sku.to_string(), title: i.title.get(locale).to_string(),
            sell_mode: i.sell_mode(), quantity: i.quantity(), unit_price: i.line.effective_price(),
            tax_rate_percent: i.line.tax_rate_percent, line_subtotal: i.line.line_subtotal().round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            line_display: Money::new(i.line.effective_price(), currency).multiply(i.quantity()).display(),
        }).collect();
        let totals = cart.totals();
        let total_display = Money::new(totals.total, currency).display();
        Self { session_id: cart.session_id().to_string(), currency: currency.to_string(), items, totals: totals.rounded(), total_display }
    }
}

#[derive(Debug, Serialize)]
pub struct VariantView { pub id: Uuid, pub sku: String, pub label: String, pub unit_price: Decimal, pub box_price: Option<Decimal>, pub units_per_box: Option<u32>, pub stock: u32, pub in_stock: bool }

#[derive(Debug, Serialize)]
pub struct ProductView { pub id: Uuid, pub slug: String, pub name: String, pub description: String, pub category_id: Option<Uuid>, pub tax_rate_percent: Decimal, pub in_stock: bool, pub default_variant_id: Option<Uuid>, pub variants: Vec<VariantView> }

impl ProductView {
    fn new(p: &ProductBase, locale: Locale) -> Self {
        Self {
            id: p.id(), slug: p.slug().to_string(), name: p.name().get(locale).to_string(), description: p.description().get(locale).to_string(),
            category_id: p.category_id(), tax_rate_percent: p.tax_rate().percent(), in_stock: p.is_in_stock(),
            default_variant_id: p.default_variant().map(|v| v.id),
            variants: p.variants().iter().map(|v| VariantView {
                id: v.id, sku: v.sku.to_string(), label: v.label.get(locale).to_string(), unit_price: v.unit_price, box_price: v.box_price,
                units_per_box: v.units_per_box, stock: v.stock.value(), in_stock: v.is_in_stock(),
            }).collect(),
        }
    }
}

#[derive(Debug, Serialize)] pub struct PaginatedResponse<T> { pub data: Vec<T>, pub total: i64, pub page: u32 }

// =============================================================================
// Catalog
// =============================================================================

async fn category_menu(State(s): State<AppState>, Query(p): Query<LocaleParams>) -> Result<Json<Vec<MenuEntry>>, ApiError> {
    let locale = locale(&s, p.locale.as_deref())?;
    let categories = s.store.list_categories().await?;
    Ok(Json(build_menu(&categories, locale)))
}

#[derive(Debug, Deserialize)] pub struct ListParams { pub page: Option<u32>, pub per_page: Option<u32>, pub category: Option<Uuid>, pub locale: Option<String> }

async fn list_products(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<PaginatedResponse<ProductView>>, ApiError> {
    let locale = locale(&s, p.locale.as_deref())?;
    let page = p.page.unwrap_or(1).max(1); let per_page = p.per_page.unwrap_or(20).clamp(1, 100);
    let (products, total) = s.store.list_products(p.category, page, per_page).await?;
    Ok(Json(PaginatedResponse { data: products.iter().map(|p| ProductView::new(p, locale)).collect(), total, page }))
}

async fn get_product(State(s): State<AppState>, Path(slug): Path<String>, Query(p): Query<LocaleParams>) -> Result<Json<ProductView>, ApiError> {
    let locale = locale(&s, p.locale.as_deref())?;
    let product = s.store.product_by_slug(&slug).await?;
    Ok(Json(ProductView::new(&product, locale)))
}

// =============================================================================
// Cart
// =============================================================================

/// Publish the session's events on success; attach the reloaded cart on failure.
async fn respond(s: &AppState, mut session: CartSession<'_, PgStore>, outcome: packstore_commerce::Result<()>, locale: Locale) -> Result<Json<CartView>, ApiError> {
    let view = CartView::new(session.cart(), locale, &s.config.currency);
    match outcome {
        Ok(()) => { s.events.publish_all(session.take_events()).await; Ok(Json(view)) }
        Err(error @ (StoreError::Reverted { .. } | StoreError::ReloadFailed { .. })) => Err(ApiError { error, cart: Some(view) }),
        Err(error) => Err(error.into()),
    }
}

async fn get_cart(State(s): State<AppState>, Path(session_id): Path<String>, Query(p): Query<LocaleParams>) -> Result<Json<CartView>, ApiError> {
    let locale = locale(&s, p.locale.as_deref())?;
    let session = CartSession::load(&s.store, &session_id).await?;
    Ok(Json(CartView::new(session.cart(), locale, &s.config.currency)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartRequest {
    pub variant_id: Uuid,
    #[serde(default)]
    pub sell_mode: SellMode,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: u32,
    pub locale: Option<String>,
}

async fn add_to_cart(State(s): State<AppState>, Path(session_id): Path<String>, Json(r): Json<AddToCartRequest>) -> Result<(StatusCode, Json<CartView>), ApiError> {
    r.validate()?;
    let locale = locale(&s, r.locale.as_deref())?;
    let product = s.store.product_for_variant(r.variant_id).await?;
    let variant = product.variant(r.variant_id).ok_or(StoreError::VariantNotFound(r.variant_id))?;
    let mut session = CartSession::load(&s.store, &session_id).await?;
    // Stock must cover what is already in the cart, in either sell mode, plus the new quantity.
    let in_cart = session.cart().item(r.variant_id, r.sell_mode).map_or(0, CartItem::quantity);
    let held = session.cart().other_modes(r.variant_id, r.sell_mode);
    let line = product.line_item_alongside(r.variant_id, r.sell_mode, in_cart.saturating_add(r.quantity), &held)?;
    let item = CartItem {
        variant_id: r.variant_id, sku: variant.sku.clone(), title: variant.title(product.name()),
        line: LineItem { quantity: r.quantity, ..line },
    };
    let outcome = session.add_item(item).await;
    let view = respond(&s, session, outcome, locale).await?;
    Ok((StatusCode::CREATED, view))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuantityRequest {
    #[serde(default)]
    pub sell_mode: SellMode,
    #[validate(range(max = 10000))]
    pub quantity: u32,
    pub locale: Option<String>,
}

async fn update_cart_item(State(s): State<AppState>, Path((session_id, variant_id)): Path<(String, Uuid)>, Json(r): Json<UpdateQuantityRequest>) -> Result<Json<CartView>, ApiError> {
    r.validate()?;
    let locale = locale(&s, r.locale.as_deref())?;
    let mut session = CartSession::load(&s.store, &session_id).await?;
    if r.quantity > 0 {
        let product = s.store.product_for_variant(variant_id).await?;
        product.line_item_alongside(variant_id, r.sell_mode, r.quantity, &session.cart().other_modes(variant_id, r.sell_mode))?;
    }
    let outcome = session.update_quantity(variant_id, r.sell_mode, r.quantity).await;
    respond(&s, session, outcome, locale).await
}

#[derive(Debug, Deserialize)] pub struct RemoveParams { pub mode: Option<SellMode>, pub locale: Option<String> }

async fn remove_cart_item(State(s): State<AppState>, Path((session_id, variant_id)): Path<(String, Uuid)>, Query(p): Query<RemoveParams>) -> Result<Json<CartView>, ApiError> {
    let locale = locale(&s, p.locale.as_deref())?;
    let mut session = CartSession::load(&s.store, &session_id).await?;
    let outcome = session.remove_item(variant_id, p.mode.unwrap_or_default()).await;
    respond(&s, session, outcome, locale).await
}

async fn clear_cart(State(s): State<AppState>, Path(session_id): Path<String>, Query(p): Query<LocaleParams>) -> Result<Json<CartView>, ApiError> {
    let locale = locale(&s, p.locale.as_deref())?;
    let mut session = CartSession::load(&s.store, &session_id).await?;
    let outcome = session.clear().await;
    respond(&s, session, outcome, locale).await
}

// =============================================================================
// Checkout & orders
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(email)]
    pub customer_email: String,
    pub shipping_address: Option<Address>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

async fn checkout(State(s): State<AppState>, Path(session_id): Path<String>, Json(r): Json<CheckoutRequest>) -> Result<(StatusCode, Json<Order>), ApiError> {
    r.validate()?;
    let cart = Cart::with_items(session_id.as_str(), s.store.load(&session_id).await?);
    let order_number = format!("ORD-{:08}", rand::random::<u32>());
    let mut order = Order::place(order_number, r.customer_email, r.shipping_address, &cart).map_err(StoreError::from)?;
    order.set_notes(r.notes);
    s.store.place_order(&order, &session_id).await?;
    s.events.publish_all(order.take_events()).await;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>, ApiError> {
    Ok(Json(s.store.order(id).await?))
}
