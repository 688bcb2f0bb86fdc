//! axum router and handlers.

pub mod dto;
pub mod error;
pub mod extract;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use uuid::Uuid;
use crate::domain::aggregates::{Cart, Item, Order};
use crate::domain::identity::Caller;
use crate::domain::pricing::{CustomQuote, CustomizationInput};
use crate::domain::value_objects::TransactionHash;
use crate::gateway::{verify_signature, WebhookEvent};
use crate::services::{CheckoutOutcome, CheckoutRequest, OrderLedger, SettlementSession, Storefront, WebhookOutcome};
use crate::LedgerError;
use self::dto::*;
use self::extract::ValidatedJson;

pub const SERVICE_NAME: &str = "furnish-commerce";

/// Signature headers accepted on the payment webhook, in lookup order.
const SIGNATURE_HEADERS: [&str; 2] = ["stripe-signature", "x-signature"];

#[derive(Clone)]
pub struct WebhookSecret {
    pub secret: String,
    pub tolerance_secs: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub ledger: OrderLedger,
    pub storefront: Storefront,
    /// Unsigned webhooks are accepted when no secret is configured.
    pub webhook_secret: Option<WebhookSecret>,
}

type ApiResult<T> = Result<T, LedgerError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": SERVICE_NAME})) }))
        .route("/api/v1/items", get(list_items).post(create_item))
        .route("/api/v1/items/:id", get(get_item))
        .route("/api/v1/items/:id/quote", post(quote_item))
        .route("/api/v1/cart", get(get_cart).post(add_to_cart))
        .route("/api/v1/cart/:line_id", delete(remove_cart_line))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/webhooks/payments", post(payment_webhook))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/complete-payment", post(complete_payment))
        .route("/api/v1/orders/:id/refund-request", post(request_refund))
        .route("/api/v1/orders/:id/cancel", post(cancel_order))
        .route("/api/v1/admin/orders", get(admin_list_orders))
        .route("/api/v1/admin/orders/:id/status", put(admin_update_status))
        .route("/api/v1/admin/orders/:id/refund", post(admin_confirm_refund))
        .route("/api/v1/admin/orders/:id/delivery-proof", post(admin_delivery_proof))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn list_items(State(s): State<AppState>) -> ApiResult<Json<Vec<Item>>> {
    Ok(Json(s.storefront.list_items().await?))
}

async fn get_item(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Item>> {
    Ok(Json(s.storefront.item(id).await?))
}

async fn create_item(State(s): State<AppState>, caller: Caller, ValidatedJson(r): ValidatedJson<CreateItemRequest>) -> ApiResult<(StatusCode, Json<Item>)> {
    Ok((StatusCode::CREATED, Json(s.storefront.create_item(&caller, r.into()).await?)))
}

async fn quote_item(State(s): State<AppState>, Path(id): Path<Uuid>, ValidatedJson(r): ValidatedJson<CustomizationDto>) -> ApiResult<Json<CustomQuote>> {
    let input: CustomizationInput = r.into();
    Ok(Json(s.storefront.quote(id, &input).await?))
}

async fn get_cart(State(s): State<AppState>, caller: Caller) -> ApiResult<Json<Cart>> {
    Ok(Json(s.storefront.cart(&caller).await?))
}

async fn add_to_cart(State(s): State<AppState>, caller: Caller, ValidatedJson(r): ValidatedJson<AddToCartRequest>) -> ApiResult<(StatusCode, Json<Cart>)> {
    let (item_id, quantity, customization) = r.into_parts()?;
    Ok((StatusCode::CREATED, Json(s.storefront.add_to_cart(&caller, item_id, quantity, customization).await?)))
}

async fn remove_cart_line(State(s): State<AppState>, caller: Caller, Path(line_id): Path<Uuid>) -> ApiResult<Json<Cart>> {
    Ok(Json(s.storefront.remove_from_cart(&caller, line_id).await?))
}

async fn checkout(State(s): State<AppState>, caller: Caller, ValidatedJson(r): ValidatedJson<CheckoutRequestDto>) -> ApiResult<(StatusCode, Json<CheckoutOutcome>)> {
    let outcome = s.ledger.checkout(&caller, CheckoutRequest::try_from(r)?).await?;
    let status = if outcome.is_duplicate { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(outcome)))
}

/// Gateway notification endpoint. Anything short of a storage failure is
/// acknowledged so the provider stops redelivering.
async fn payment_webhook(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<Value>, Response> {
    if let Some(cfg) = &s.webhook_secret {
        let signature = SIGNATURE_HEADERS.iter()
            .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()));
        let valid = signature.is_some_and(|sig| verify_signature(sig, &body, &cfg.secret, cfg.tolerance_secs, Utc::now().timestamp()));
        if !valid {
            warn!("rejected payment webhook with a bad signature");
            return Err((StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid_signature", "message": "signature verification failed"}))).into_response());
        }
    }
    let event = match WebhookEvent::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "unreadable payment webhook");
            return Err(LedgerError::Validation("malformed webhook payload".into()).into_response());
        }
    };
    let receipt = s.ledger.handle_webhook(&event).await.map_err(IntoResponse::into_response)?;
    let (outcome, order_id) = match &receipt.outcome {
        WebhookOutcome::Confirmed(id) => ("confirmed", Some(*id)),
        WebhookOutcome::Settled(id) => ("settled", Some(*id)),
        WebhookOutcome::AlreadyProcessed(id) => ("already_processed", Some(*id)),
        WebhookOutcome::Ignored(_) => ("ignored", None),
    };
    Ok(Json(json!({"received": true, "outcome": outcome, "orderId": order_id})))
}

async fn list_orders(State(s): State<AppState>, caller: Caller, Query(q): Query<OrderListQuery>) -> ApiResult<Json<OrderList>> {
    Ok(Json(s.ledger.orders_for(&caller, q.status()?).await?.into()))
}

async fn get_order(State(s): State<AppState>, caller: Caller, Path(id): Path<Uuid>) -> ApiResult<Json<Order>> {
    Ok(Json(s.ledger.order(&caller, id).await?))
}

async fn complete_payment(State(s): State<AppState>, caller: Caller, Path(id): Path<Uuid>, body: Option<ValidatedJson<CompletePaymentRequest>>) -> ApiResult<Json<SettlementSession>> {
    let hash = body.and_then(|ValidatedJson(r)| r.transaction_hash)
        .map(TransactionHash::new)
        .transpose()
        .map_err(|e| LedgerError::Validation(e.to_string()))?;
    Ok(Json(s.ledger.request_settlement(&caller, id, hash).await?))
}

async fn request_refund(State(s): State<AppState>, caller: Caller, Path(id): Path<Uuid>) -> ApiResult<Json<Order>> {
    Ok(Json(s.ledger.request_refund(&caller, id).await?))
}

async fn cancel_order(State(s): State<AppState>, caller: Caller, Path(id): Path<Uuid>) -> ApiResult<Json<Order>> {
    Ok(Json(s.ledger.cancel_order(&caller, id).await?))
}

async fn admin_list_orders(State(s): State<AppState>, caller: Caller, Query(q): Query<OrderListQuery>) -> ApiResult<Json<OrderList>> {
    Ok(Json(s.ledger.all_orders(&caller, q.status()?).await?.into()))
}

async fn admin_update_status(State(s): State<AppState>, caller: Caller, Path(id): Path<Uuid>, ValidatedJson(r): ValidatedJson<UpdateStatusRequest>) -> ApiResult<Json<Order>> {
    Ok(Json(s.ledger.force_status(&caller, id, r.status()?).await?))
}

async fn admin_confirm_refund(State(s): State<AppState>, caller: Caller, Path(id): Path<Uuid>) -> ApiResult<Json<Order>> {
    Ok(Json(s.ledger.confirm_refund(&caller, id).await?))
}

async fn admin_delivery_proof(State(s): State<AppState>, caller: Caller, Path(id): Path<Uuid>, ValidatedJson(r): ValidatedJson<DeliveryProofRequest>) -> ApiResult<Json<Order>> {
    Ok(Json(s.ledger.attach_delivery_proof(&caller, id, &r.proof_url).await?))
}
