//! Duplicate-checkout detection.
//!
//! A checkout attempt is identified by the caller and its transaction hash.
//! Before an order is created the guard looks for an existing order of the
//! same user with the same hash; the store's unique `(user_id, hash)` index
//! catches submissions that race past it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;
use crate::domain::value_objects::TransactionHash;
use crate::repositories::{OrderStore, StoreError};

/// Width of the window in which identical server-fingerprinted carts collapse.
pub const FINGERPRINT_WINDOW_SECS: i64 = 10 * 60;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Duplicate { existing_order_id: Uuid },
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    orders: Arc<dyn OrderStore>,
}

impl IdempotencyGuard {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self { Self { orders } }

    pub async fn admit_order(&self, user_id: &str, hash: &TransactionHash) -> Result<Admission, StoreError> {
        Ok(match self.orders.find_order_by_transaction_hash(user_id, hash).await? {
            Some(existing) => Admission::Duplicate { existing_order_id: existing.id() },
            None => Admission::Accepted,
        })
    }

    /// Server-issued key for clients that send none: a digest of the user and
    /// the cart snapshot, bucketed by time so the same cart can be bought
    /// again later.
    pub fn fingerprint(user_id: &str, snapshot: &impl Serialize, at: DateTime<Utc>) -> Result<TransactionHash, serde_json::Error> {
        let mut hasher = Sha256::new();
        hasher.update(user_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(serde_json::to_vec(snapshot)?);
        hasher.update(at.timestamp().div_euclid(FINGERPRINT_WINDOW_SECS).to_be_bytes());
        let digest = hex::encode(hasher.finalize());
        Ok(TransactionHash::server_issued(&digest[..32]))
    }
}
