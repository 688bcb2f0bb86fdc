//! Payment gateway collaborator.
//!
//! The ledger only ever asks the gateway to open hosted checkout sessions;
//! whether a session was paid is learned from the webhook, never from the
//! customer's redirect.

pub mod http;
pub mod mock;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::Money;

pub use http::HttpGateway;
pub use mock::MockGateway;
pub use webhook::{verify_signature, WebhookEvent, CHECKOUT_SESSION_COMPLETED};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GatewayLineItem {
    pub name: String,
    pub quantity: u32,
    /// Unit amount in the store currency.
    pub amount: Money,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionRequest {
    /// Our reference for the session, e.g. the order number.
    pub reference: String,
    pub line_items: Vec<GatewayLineItem>,
    pub total_amount: Money,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub checkout_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("gateway returned an unexpected response: {0}")]
    Malformed(String),
    #[error("invalid session request: {0}")]
    InvalidRequest(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(&self, request: SessionRequest) -> Result<CheckoutSession, GatewayError>;
}

impl SessionRequest {
    pub fn validate(&self) -> Result<(), GatewayError> {
        if !self.total_amount.is_positive() {
            return Err(GatewayError::InvalidRequest("total amount must be positive".into()));
        }
        if self.line_items.is_empty() {
            return Err(GatewayError::InvalidRequest("at least one line item is required".into()));
        }
        let lines: Money = self.line_items.iter().map(|l| l.amount.multiply_units(l.quantity)).sum();
        if lines != self.total_amount {
            return Err(GatewayError::InvalidRequest(format!("line items sum to {lines}, expected {}", self.total_amount)));
        }
        Ok(())
    }
}
