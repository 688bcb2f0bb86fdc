//! PostgreSQL store. Aggregates are kept as `jsonb` documents next to the
//! columns they are looked up by.

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use uuid::Uuid;
use crate::domain::aggregates::{Cart, Item, Order, OrderStatus};
use crate::domain::value_objects::{Quantity, TransactionHash};
use super::{CartStore, InsertOutcome, ItemStore, OrderStore, StoreError};

#[derive(Clone)]
pub struct PgStore { db: PgPool }

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let db = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        sqlx::migrate!("./migrations").run(&db).await.map_err(|e| StoreError::Database(e.into()))?;
        Ok(Self { db })
    }
}

fn settlement_session(order: &Order) -> Option<&str> {
    order.pending_settlement().map(|p| p.session_id.as_str()).or(order.settled_session_id())
}

#[async_trait]
impl OrderStore for PgStore {
    async fn find_order_by_id(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let doc = sqlx::query_scalar::<_, Json<Order>>("SELECT document FROM orders WHERE id = $1")
            .bind(id).fetch_optional(&self.db).await?;
        Ok(doc.map(|Json(o)| o))
    }

    async fn find_order_by_transaction_hash(&self, user_id: &str, hash: &TransactionHash) -> Result<Option<Order>, StoreError> {
        let doc = sqlx::query_scalar::<_, Json<Order>>("SELECT document FROM orders WHERE user_id = $1 AND transaction_hash = $2")
            .bind(user_id).bind(hash.as_str()).fetch_optional(&self.db).await?;
        Ok(doc.map(|Json(o)| o))
    }

    async fn find_order_by_session(&self, session_id: &str) -> Result<Option<Order>, StoreError> {
        let doc = sqlx::query_scalar::<_, Json<Order>>("SELECT document FROM orders WHERE gateway_session_id = $1 OR settlement_session_id = $1 LIMIT 1")
            .bind(session_id).fetch_optional(&self.db).await?;
        Ok(doc.map(|Json(o)| o))
    }

    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome, StoreError> {
        // Insert-or-fetch on the per-user transaction hash.
        let inserted = sqlx::query("INSERT INTO orders (id, user_id, status, transaction_hash, gateway_session_id, settlement_session_id, version, document, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) ON CONFLICT (user_id, transaction_hash) DO NOTHING")
            .bind(order.id()).bind(order.user_id()).bind(order.status().as_str()).bind(order.transaction_hash().as_str())
            .bind(order.gateway_session_id()).bind(settlement_session(order)).bind(order.version() as i64)
            .bind(Json(order)).bind(order.created_at()).bind(order.updated_at())
            .execute(&self.db).await?;
        if inserted.rows_affected() == 1 { return Ok(InsertOutcome::Inserted); }
        let existing: Uuid = sqlx::query_scalar("SELECT id FROM orders WHERE user_id = $1 AND transaction_hash = $2")
            .bind(order.user_id()).bind(order.transaction_hash().as_str()).fetch_one(&self.db).await?;
        Ok(InsertOutcome::Existing(existing))
    }

    async fn update_order(&self, order: &mut Order) -> Result<(), StoreError> {
        let expected = order.version();
        let mut next = order.clone();
        next.set_version(expected + 1);
        let updated = sqlx::query("UPDATE orders SET status = $3, settlement_session_id = $4, version = $5, document = $6, updated_at = $7 WHERE id = $1 AND version = $2")
            .bind(next.id()).bind(expected as i64).bind(next.status().as_str()).bind(settlement_session(&next))
            .bind(next.version() as i64).bind(Json(&next)).bind(next.updated_at())
            .execute(&self.db).await?;
        if updated.rows_affected() == 0 {
            let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM orders WHERE id = $1").bind(order.id()).fetch_optional(&self.db).await?;
            return Err(if exists.is_some() { StoreError::Conflict(order.id()) } else { StoreError::NotFound(order.id()) });
        }
        order.set_version(expected + 1);
        Ok(())
    }

    async fn orders_for_user(&self, user_id: &str, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError> {
        let docs = sqlx::query_scalar::<_, Json<Order>>("SELECT document FROM orders WHERE user_id = $1 AND ($2::text IS NULL OR status = $2) ORDER BY created_at DESC")
            .bind(user_id).bind(status.map(|s| s.as_str())).fetch_all(&self.db).await?;
        Ok(docs.into_iter().map(|Json(o)| o).collect())
    }

    async fn all_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError> {
        let docs = sqlx::query_scalar::<_, Json<Order>>("SELECT document FROM orders WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC")
            .bind(status.map(|s| s.as_str())).fetch_all(&self.db).await?;
        Ok(docs.into_iter().map(|Json(o)| o).collect())
    }
}

#[async_trait]
impl ItemStore for PgStore {
    async fn find_item(&self, id: Uuid) -> Result<Option<Item>, StoreError> {
        let doc = sqlx::query_scalar::<_, Json<Item>>("SELECT document FROM items WHERE id = $1")
            .bind(id).fetch_optional(&self.db).await?;
        Ok(doc.map(|Json(i)| i))
    }

    async fn find_items_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Item>, StoreError> {
        let docs = sqlx::query_scalar::<_, Json<Item>>("SELECT document FROM items WHERE id = ANY($1)")
            .bind(ids).fetch_all(&self.db).await?;
        Ok(docs.into_iter().map(|Json(i)| i).collect())
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        let docs = sqlx::query_scalar::<_, Json<Item>>("SELECT document FROM items ORDER BY name")
            .fetch_all(&self.db).await?;
        Ok(docs.into_iter().map(|Json(i)| i).collect())
    }

    async fn insert_item(&self, item: &Item) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO items (id, name, document, created_at) VALUES ($1, $2, $3, NOW())")
            .bind(item.id()).bind(item.name()).bind(Json(item))
            .execute(&self.db).await?;
        Ok(())
    }

    async fn increment_item_sales(&self, id: Uuid, delta: Quantity) -> Result<(), StoreError> {
        let updated = sqlx::query("UPDATE items SET document = jsonb_set(document, '{sales}', to_jsonb(COALESCE((document->>'sales')::bigint, 0) + $2)) WHERE id = $1")
            .bind(id).bind(i64::from(delta.value()))
            .execute(&self.db).await?;
        if updated.rows_affected() == 0 { return Err(StoreError::NotFound(id)); }
        Ok(())
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn load_cart(&self, user_id: &str) -> Result<Cart, StoreError> {
        let doc = sqlx::query_scalar::<_, Json<Cart>>("SELECT document FROM carts WHERE user_id = $1")
            .bind(user_id).fetch_optional(&self.db).await?;
        Ok(doc.map(|Json(c)| c).unwrap_or_else(|| Cart::for_user(user_id)))
    }

    async fn save_cart(&self, cart: &Cart) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO carts (user_id, document, updated_at) VALUES ($1, $2, $3) ON CONFLICT (user_id) DO UPDATE SET document = EXCLUDED.document, updated_at = EXCLUDED.updated_at")
            .bind(cart.user_id()).bind(Json(cart)).bind(cart.updated_at())
            .execute(&self.db).await?;
        Ok(())
    }
}
