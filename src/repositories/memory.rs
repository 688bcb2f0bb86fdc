//! In-process store used when no database is configured, and by tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;
use crate::domain::aggregates::{Cart, Item, Order, OrderStatus};
use crate::domain::value_objects::{Quantity, TransactionHash};
use super::{CartStore, InsertOutcome, ItemStore, OrderStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    orders: RwLock<HashMap<Uuid, Order>>,
    items: RwLock<HashMap<Uuid, Item>>,
    carts: RwLock<HashMap<String, Cart>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn order_count(&self) -> usize { self.orders.read().await.len() }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    orders
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn find_order_by_id(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_order_by_transaction_hash(&self, user_id: &str, hash: &TransactionHash) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.values().find(|o| o.user_id() == user_id && o.transaction_hash() == hash).cloned())
    }

    async fn find_order_by_session(&self, session_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.values()
            .find(|o| o.gateway_session_id() == session_id
                || o.pending_settlement().is_some_and(|p| p.session_id == session_id)
                || o.settled_session_id() == Some(session_id))
            .cloned())
    }

    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome, StoreError> {
        let mut orders = self.orders.write().await;
        if let Some(existing) = orders.values().find(|o| o.user_id() == order.user_id() && o.transaction_hash() == order.transaction_hash()) {
            return Ok(InsertOutcome::Existing(existing.id()));
        }
        orders.insert(order.id(), order.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn update_order(&self, order: &mut Order) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        let stored = orders.get_mut(&order.id()).ok_or(StoreError::NotFound(order.id()))?;
        if stored.version() != order.version() {
            return Err(StoreError::Conflict(order.id()));
        }
        order.set_version(order.version() + 1);
        *stored = order.clone();
        Ok(())
    }

    async fn orders_for_user(&self, user_id: &str, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().await;
        Ok(newest_first(orders.values()
            .filter(|o| o.user_id() == user_id && status.map_or(true, |s| o.status() == s))
            .cloned().collect()))
    }

    async fn all_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().await;
        Ok(newest_first(orders.values().filter(|o| status.map_or(true, |s| o.status() == s)).cloned().collect()))
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn find_item(&self, id: Uuid) -> Result<Option<Item>, StoreError> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn find_items_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Item>, StoreError> {
        let items = self.items.read().await;
        Ok(ids.iter().filter_map(|id| items.get(id).cloned()).collect())
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        let mut items: Vec<Item> = self.items.read().await.values().cloned().collect();
        items.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(items)
    }

    async fn insert_item(&self, item: &Item) -> Result<(), StoreError> {
        self.items.write().await.insert(item.id(), item.clone());
        Ok(())
    }

    async fn increment_item_sales(&self, id: Uuid, delta: Quantity) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        let item = items.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        item.record_sale(delta);
        item.take_events();
        Ok(())
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn load_cart(&self, user_id: &str) -> Result<Cart, StoreError> {
        Ok(self.carts.read().await.get(user_id).cloned().unwrap_or_else(|| Cart::for_user(user_id)))
    }

    async fn save_cart(&self, cart: &Cart) -> Result<(), StoreError> {
        self.carts.write().await.insert(cart.user_id().to_string(), cart.clone());
        Ok(())
    }
}
