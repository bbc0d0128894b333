//! Persistence seams
//!
//! [`CartStore`] is the remote side of a cart: the authoritative line list
//! for a session. [`CartSession`] applies changes locally first and falls
//! back to that authoritative list when a write fails.

pub mod events;
pub mod postgres;
pub mod sync;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::aggregates::CartItem;
use crate::domain::pricing::SellMode;
use crate::Result;

pub use events::EventPublisher;
pub use postgres::PgStore;
pub use sync::CartSession;

#[async_trait]
pub trait CartStore: Send + Sync {
    /// Current lines for a session, priced with current catalog data.
    async fn load(&self, session_id: &str) -> Result<Vec<CartItem>>;

    /// Add `delta` to a line in a single write, inserting the line when absent.
    /// Returns the quantity the store now holds, which includes concurrent adds.
    async fn add_to_line(&self, session_id: &str, variant_id: Uuid, sell_mode: SellMode, delta: u32) -> Result<u32>;

    /// Persist a line's quantity, inserting the line when absent.
    async fn save_line(&self, session_id: &str, variant_id: Uuid, sell_mode: SellMode, quantity: u32) -> Result<()>;

    async fn remove_line(&self, session_id: &str, variant_id: Uuid, sell_mode: SellMode) -> Result<()>;

    async fn clear(&self, session_id: &str) -> Result<()>;
}
