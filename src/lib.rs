//! Furnish Commerce
//!
//! Storefront backend for a furniture retailer selling both stock pieces and
//! made-to-order furniture.
//!
//! ## Features
//! - Catalog with cost-sheet pricing for customizable items
//! - Cart and checkout against a hosted payment gateway
//! - Split payments: 30% down on made-to-order lines, balance settled later
//! - Order lifecycle from payment confirmation through delivery or refund
//! - Idempotent checkout keyed by a transaction fingerprint

pub mod config;
pub mod domain;
pub mod events;
pub mod gateway;
pub mod http;
pub mod repositories;
pub mod services;

use thiserror::Error;
use crate::domain::aggregates::{CartError, OrderError, ProductError};
use crate::domain::pricing::PricingError;
use crate::gateway::GatewayError;
use crate::repositories::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(#[source] StoreError),
}

impl LedgerError {
    /// Machine-readable kind reported to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::InvalidState(_) => "invalid_state",
            Self::Gateway(_) => "gateway_error",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "internal_error",
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(id) => Self::Conflict(format!("order {id} was modified concurrently, retry the request")),
            StoreError::NotFound(id) => Self::NotFound(format!("document {id}")),
            other => Self::Storage(other),
        }
    }
}

impl From<OrderError> for LedgerError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NoItems => Self::Validation(err.to_string()),
            OrderError::Validation(m) => Self::Validation(m),
            OrderError::Unauthorized(m) => Self::Unauthorized(m),
            OrderError::InvalidState(m) => Self::InvalidState(m),
        }
    }
}

impl From<PricingError> for LedgerError {
    fn from(err: PricingError) -> Self { Self::Validation(err.to_string()) }
}

impl From<CartError> for LedgerError {
    fn from(err: CartError) -> Self { Self::NotFound(err.to_string().trim_end_matches(" not found").to_string()) }
}

impl From<ProductError> for LedgerError {
    fn from(err: ProductError) -> Self { Self::Validation(err.to_string()) }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
