//! Application services orchestrating the aggregates and their stores.

pub mod idempotency;
pub mod ledger;
pub mod storefront;

pub use idempotency::{Admission, IdempotencyGuard};
pub use ledger::{
    CheckoutLine, CheckoutOutcome, CheckoutRequest, LedgerSettings, OrderLedger, SettlementSession,
    WebhookOutcome, WebhookReceipt,
};
pub use storefront::{NewItem, Storefront};
