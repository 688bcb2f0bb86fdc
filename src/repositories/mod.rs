//! Document store seams for orders, catalog items and carts.
//!
//! Orders are written with optimistic concurrency: `update_order` only
//! succeeds if the stored version still matches the one the caller read.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;
use crate::domain::aggregates::{Cart, Item, Order, OrderStatus};
use crate::domain::value_objects::{Quantity, TransactionHash};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("order {0} was modified concurrently")]
    Conflict(Uuid),
    #[error("document {0} not found")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result of inserting an order under its user's unique transaction hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another order of the same user already holds the transaction hash.
    Existing(Uuid),
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_order_by_id(&self, id: Uuid) -> Result<Option<Order>, StoreError>;
    /// Transaction hashes are unique per user, not globally.
    async fn find_order_by_transaction_hash(&self, user_id: &str, hash: &TransactionHash) -> Result<Option<Order>, StoreError>;
    /// Matches either the checkout session or a pending settlement session.
    async fn find_order_by_session(&self, session_id: &str) -> Result<Option<Order>, StoreError>;
    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome, StoreError>;
    /// Conditional write on `order.version()`; bumps the version on success.
    async fn update_order(&self, order: &mut Order) -> Result<(), StoreError>;
    async fn orders_for_user(&self, user_id: &str, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError>;
    async fn all_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError>;
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn find_item(&self, id: Uuid) -> Result<Option<Item>, StoreError>;
    async fn find_items_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Item>, StoreError>;
    async fn list_items(&self) -> Result<Vec<Item>, StoreError>;
    async fn insert_item(&self, item: &Item) -> Result<(), StoreError>;
    async fn increment_item_sales(&self, id: Uuid, delta: Quantity) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    /// Returns an empty cart for users who have none yet.
    async fn load_cart(&self, user_id: &str) -> Result<Cart, StoreError>;
    async fn save_cart(&self, cart: &Cart) -> Result<(), StoreError>;
}
