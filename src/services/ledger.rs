//! Order ledger service.
//!
//! Ties the order aggregate to its collaborators: prices lines, plans the
//! charge, opens gateway sessions, persists orders with conditional writes and
//! applies gateway confirmations. Nothing is persisted for a charge until the
//! gateway has accepted the session, and nothing is marked paid until its
//! webhook arrives.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use crate::domain::aggregates::{
    Confirmation, DeliveryOption, Item, NewOrder, Order, OrderLine, OrderStatus, PaymentType, SettlementStart,
};
use crate::domain::aggregates::order::initial_charge;
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::identity::Caller;
use crate::domain::payment_plan::{compute_plan, PaymentPlan};
use crate::domain::pricing::{CustomizationInput, PricingResolver};
use crate::domain::value_objects::{Money, Quantity, TransactionHash};
use crate::events::EventPublisher;
use crate::gateway::{GatewayLineItem, PaymentGateway, SessionRequest, WebhookEvent};
use crate::repositories::{CartStore, InsertOutcome, ItemStore, OrderStore, StoreError};
use crate::services::idempotency::{Admission, IdempotencyGuard};
use crate::{LedgerError, Result};

/// Tolerance when comparing a client's stated amount with the server plan.
const AMOUNT_TOLERANCE: Money = Money::from_cents(1);

#[derive(Clone, Debug)]
pub struct LedgerSettings {
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Read-modify-write attempts before a version conflict is surfaced.
    pub max_write_attempts: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            currency: "PHP".into(),
            success_url: "http://localhost:8083/checkout/success".into(),
            cancel_url: "http://localhost:8083/checkout/cancel".into(),
            max_write_attempts: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckoutLine {
    pub item_id: Uuid,
    pub quantity: Quantity,
    pub customization: Option<CustomizationInput>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CheckoutRequest {
    /// Client fingerprint; derived server-side when absent.
    pub transaction_hash: Option<TransactionHash>,
    pub lines: Vec<CheckoutLine>,
    pub shipping_fee: Money,
    pub delivery_option: DeliveryOption,
    pub payment_type: PaymentType,
    /// What the client believes it is paying now, excluding shipping.
    pub paid_amount: Option<Money>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOutcome {
    pub order_id: Uuid,
    pub is_duplicate: bool,
    pub checkout_url: String,
    pub plan: Option<PaymentPlan>,
    pub charge: Option<Money>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementSession {
    pub order_id: Uuid,
    pub amount: Money,
    pub session_id: String,
    pub checkout_url: String,
    /// True when an already-open settlement session was handed back.
    pub reused: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    Confirmed(Uuid),
    Settled(Uuid),
    AlreadyProcessed(Uuid),
    Ignored(String),
}

/// Result of webhook handling plus the handle of any follow-up work that was
/// dispatched after the commit.
#[derive(Debug)]
pub struct WebhookReceipt {
    pub outcome: WebhookOutcome,
    pub side_effects: Option<JoinHandle<()>>,
}

impl WebhookReceipt {
    fn ignored(reason: impl Into<String>) -> Self { Self { outcome: WebhookOutcome::Ignored(reason.into()), side_effects: None } }
}

#[derive(Clone)]
pub struct OrderLedger {
    orders: Arc<dyn OrderStore>,
    items: Arc<dyn ItemStore>,
    carts: Arc<dyn CartStore>,
    gateway: Arc<dyn PaymentGateway>,
    resolver: Arc<PricingResolver>,
    guard: IdempotencyGuard,
    events: EventPublisher,
    settings: LedgerSettings,
}

impl OrderLedger {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        items: Arc<dyn ItemStore>,
        carts: Arc<dyn CartStore>,
        gateway: Arc<dyn PaymentGateway>,
        events: EventPublisher,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            guard: IdempotencyGuard::new(orders.clone()),
            orders, items, carts, gateway,
            resolver: Arc::new(PricingResolver::default()),
            events, settings,
        }
    }

    #[instrument(skip(self, request), fields(user_id = %caller.user_id, lines = request.lines.len()))]
    pub async fn checkout(&self, caller: &Caller, request: CheckoutRequest) -> Result<CheckoutOutcome> {
        if request.lines.is_empty() { return Err(LedgerError::Validation("cart is empty".into())); }
        if request.shipping_fee < Money::ZERO { return Err(LedgerError::Validation("shipping fee cannot be negative".into())); }

        let transaction_hash = match &request.transaction_hash {
            Some(hash) => hash.clone(),
            None => IdempotencyGuard::fingerprint(&caller.user_id, &request, Utc::now())
                .map_err(|e| LedgerError::Validation(format!("unreadable checkout: {e}")))?,
        };
        if let Admission::Duplicate { existing_order_id } = self.guard.admit_order(&caller.user_id, &transaction_hash).await? {
            info!(%transaction_hash, order_id = %existing_order_id, "duplicate checkout collapsed");
            return self.duplicate_outcome(caller, existing_order_id).await;
        }

        let lines = self.price_lines(&request.lines).await?;
        let plan = compute_plan(&lines);
        let (payment_type, charge) = initial_charge(&plan, request.shipping_fee, request.payment_type);
        if let Some(paid) = request.paid_amount {
            let expected = match payment_type {
                PaymentType::DownPayment => plan.down_payment_amount,
                PaymentType::FullPayment => plan.full_amount,
            };
            if (paid.amount() - expected.amount()).abs() > AMOUNT_TOLERANCE.amount() {
                return Err(LedgerError::Validation(format!("paid amount {paid} does not match the {expected} due now")));
            }
        }

        let session = self.gateway.create_checkout_session(SessionRequest {
            reference: transaction_hash.to_string(),
            line_items: gateway_lines(&lines, &plan, payment_type, request.shipping_fee),
            total_amount: charge,
            currency: self.settings.currency.clone(),
            success_url: self.settings.success_url.clone(),
            cancel_url: self.settings.cancel_url.clone(),
        }).await.map_err(|e| {
            error!(error = %e, %transaction_hash, "checkout session could not be created");
            LedgerError::Gateway(e)
        })?;

        let mut order = Order::place(NewOrder {
            user_id: caller.user_id.clone(),
            currency: self.settings.currency.clone(),
            lines,
            shipping_fee: request.shipping_fee,
            payment_type,
            delivery_option: request.delivery_option,
            transaction_hash,
            gateway_session_id: session.session_id,
            checkout_url: session.checkout_url,
        })?;
        let events = order.take_events();
        match self.orders.insert_order(&order).await? {
            InsertOutcome::Inserted => {
                info!(order_id = %order.id(), charge = %charge, payment_type = ?payment_type, "order placed");
                self.events.publish_all(events).await;
                Ok(CheckoutOutcome {
                    order_id: order.id(),
                    is_duplicate: false,
                    checkout_url: order.checkout_url().to_string(),
                    plan: Some(plan),
                    charge: Some(charge),
                })
            }
            InsertOutcome::Existing(existing) => {
                warn!(order_id = %existing, abandoned_session = %order.gateway_session_id(), "concurrent duplicate checkout");
                self.duplicate_outcome(caller, existing).await
            }
        }
    }

    async fn duplicate_outcome(&self, caller: &Caller, order_id: Uuid) -> Result<CheckoutOutcome> {
        let existing = self.load(order_id).await?;
        if existing.user_id() != caller.user_id {
            warn!(%order_id, user_id = %caller.user_id, "transaction hash resolved to another user's order");
            return Err(LedgerError::Unauthorized("transaction hash belongs to another user".into()));
        }
        Ok(CheckoutOutcome {
            order_id,
            is_duplicate: true,
            checkout_url: existing.checkout_url().to_string(),
            plan: None,
            charge: None,
        })
    }

    async fn price_lines(&self, requested: &[CheckoutLine]) -> Result<Vec<OrderLine>> {
        let ids: Vec<Uuid> = requested.iter().map(|l| l.item_id).collect();
        let catalog: HashMap<Uuid, Item> = self.items.find_items_by_ids(&ids).await?
            .into_iter().map(|i| (i.id(), i)).collect();
        requested.iter().map(|line| {
            let item = catalog.get(&line.item_id).ok_or_else(|| LedgerError::NotFound(format!("item {}", line.item_id)))?;
            let unit_price = self.resolver.resolve_unit_price(item, line.customization.as_ref())?;
            Ok(OrderLine {
                item_id: item.id(),
                name: item.name().to_string(),
                quantity: line.quantity,
                unit_price,
                is_customizable: item.is_customizable(),
                customization: line.customization.clone(),
            })
        }).collect()
    }

    /// Applies a gateway notification. Problems with the event itself are
    /// logged and acknowledged; only storage failures are returned so the
    /// provider redelivers.
    #[instrument(skip(self, event), fields(event_type = %event.event_type, session_id = ?event.session_id))]
    pub async fn handle_webhook(&self, event: &WebhookEvent) -> Result<WebhookReceipt> {
        if !event.is_checkout_completed() {
            return Ok(WebhookReceipt::ignored(format!("unhandled event type '{}'", event.event_type)));
        }
        let Some(session_id) = event.session_id.as_deref() else {
            warn!("checkout completion without a session id");
            return Ok(WebhookReceipt::ignored("missing session id"));
        };
        let Some(order) = self.orders.find_order_by_session(session_id).await? else {
            warn!("no order for completed session");
            return Ok(WebhookReceipt::ignored(format!("no order for session {session_id}")));
        };

        let order_id = order.id();
        let is_initial = order.gateway_session_id() == session_id;
        let result = self.mutate(order_id, |o| {
            Ok(if is_initial { o.confirm_payment(session_id)? } else { o.settle(session_id)? })
        }).await;

        match result {
            Ok((_, Confirmation::AlreadyApplied)) => {
                info!(%order_id, "webhook already applied");
                Ok(WebhookReceipt { outcome: WebhookOutcome::AlreadyProcessed(order_id), side_effects: None })
            }
            Ok((order, Confirmation::Applied)) if is_initial => {
                info!(%order_id, payment_status = ?order.payment_status(), status = %order.status(), "payment confirmed");
                let side_effects = Some(self.dispatch_fulfillment(&order));
                Ok(WebhookReceipt { outcome: WebhookOutcome::Confirmed(order_id), side_effects })
            }
            Ok((_, Confirmation::Applied)) => {
                info!(%order_id, "balance settled");
                Ok(WebhookReceipt { outcome: WebhookOutcome::Settled(order_id), side_effects: None })
            }
            Err(e @ (LedgerError::Storage(_) | LedgerError::Conflict(_))) => Err(e),
            Err(e) => {
                warn!(%order_id, error = %e, "webhook could not be applied");
                Ok(WebhookReceipt::ignored(e.to_string()))
            }
        }
    }

    /// Clears purchased cart lines and bumps item sales. Runs after the
    /// confirmation has been committed; failures are only logged.
    fn dispatch_fulfillment(&self, order: &Order) -> JoinHandle<()> {
        let (carts, items, events) = (self.carts.clone(), self.items.clone(), self.events.clone());
        let user_id = order.user_id().to_string();
        let lines = order.lines().to_vec();
        let order_id = order.id();
        tokio::spawn(async move {
            match carts.load_cart(&user_id).await {
                Ok(mut cart) => {
                    if cart.remove_purchased(&lines) > 0 {
                        if let Err(e) = carts.save_cart(&cart).await {
                            warn!(%order_id, error = %e, "failed to clear purchased cart lines");
                        }
                    }
                }
                Err(e) => warn!(%order_id, error = %e, "failed to load cart for clean-up"),
            }
            let mut sold = Vec::with_capacity(lines.len());
            for line in &lines {
                match items.increment_item_sales(line.item_id, line.quantity).await {
                    Ok(()) => sold.push(DomainEvent::Product(ProductEvent::SalesIncremented {
                        item_id: line.item_id, quantity: line.quantity.value(),
                    })),
                    Err(e) => warn!(%order_id, item_id = %line.item_id, error = %e, "failed to record item sales"),
                }
            }
            events.publish_all(sold).await;
        })
    }

    /// Opens (or hands back) a gateway session for the remaining balance.
    #[instrument(skip(self, transaction_hash), fields(user_id = %caller.user_id))]
    pub async fn request_settlement(&self, caller: &Caller, order_id: Uuid, transaction_hash: Option<TransactionHash>) -> Result<SettlementSession> {
        let order = self.load(order_id).await?;
        let balance = order.settleable_balance(caller)?;
        if let Some(pending) = order.pending_settlement().filter(|p| p.amount == balance) {
            return Ok(SettlementSession {
                order_id, amount: balance, session_id: pending.session_id.clone(),
                checkout_url: pending.checkout_url.clone(), reused: true,
            });
        }

        let session = self.gateway.create_checkout_session(SessionRequest {
            reference: format!("{}-balance", order.order_number()),
            line_items: vec![GatewayLineItem {
                name: format!("Remaining balance for {}", order.order_number()),
                quantity: 1,
                amount: balance,
            }],
            total_amount: balance,
            currency: order.currency().to_string(),
            success_url: self.settings.success_url.clone(),
            cancel_url: self.settings.cancel_url.clone(),
        }).await.map_err(|e| {
            error!(error = %e, %order_id, "settlement session could not be created");
            LedgerError::Gateway(e)
        })?;

        let hash = transaction_hash.unwrap_or_else(|| TransactionHash::server_issued(&session.session_id));
        let (_, start) = self.mutate(order_id, |o| {
            Ok(o.begin_settlement(caller, session.session_id.clone(), session.checkout_url.clone(), hash.clone())?)
        }).await?;
        let reused = matches!(start, SettlementStart::AlreadyOpen(_));
        if reused {
            warn!(%order_id, abandoned_session = %session.session_id, "settlement opened concurrently, keeping the first session");
        } else {
            info!(%order_id, amount = %start.pending().amount, "settlement session opened");
        }
        let pending = start.into_pending();
        Ok(SettlementSession {
            order_id, amount: pending.amount, session_id: pending.session_id,
            checkout_url: pending.checkout_url, reused,
        })
    }

    /// Admin override that skips transition checks.
    #[instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn force_status(&self, caller: &Caller, order_id: Uuid, status: OrderStatus) -> Result<Order> {
        let (order, from) = self.mutate(order_id, |o| Ok(o.force_status(caller, status)?)).await?;
        info!(%order_id, %from, to = %status, "order status forced");
        Ok(order)
    }

    #[instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn request_refund(&self, caller: &Caller, order_id: Uuid) -> Result<Order> {
        Ok(self.mutate(order_id, |o| Ok(o.request_refund(caller)?)).await?.0)
    }

    #[instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn confirm_refund(&self, caller: &Caller, order_id: Uuid) -> Result<Order> {
        Ok(self.mutate(order_id, |o| Ok(o.confirm_refund(caller)?)).await?.0)
    }

    #[instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn cancel_order(&self, caller: &Caller, order_id: Uuid) -> Result<Order> {
        Ok(self.mutate(order_id, |o| Ok(o.cancel(caller)?)).await?.0)
    }

    #[instrument(skip(self, proof_url), fields(user_id = %caller.user_id))]
    pub async fn attach_delivery_proof(&self, caller: &Caller, order_id: Uuid, proof_url: &str) -> Result<Order> {
        let now = Utc::now();
        Ok(self.mutate(order_id, |o| Ok(o.attach_delivery_proof(caller, proof_url, now)?)).await?.0)
    }

    pub async fn order(&self, caller: &Caller, order_id: Uuid) -> Result<Order> {
        let order = self.load(order_id).await?;
        if !caller.is_admin() && !caller.owns(order.user_id()) {
            return Err(LedgerError::Unauthorized("order belongs to another customer".into()));
        }
        Ok(order)
    }

    pub async fn orders_for(&self, caller: &Caller, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        Ok(self.orders.orders_for_user(&caller.user_id, status).await?)
    }

    pub async fn all_orders(&self, caller: &Caller, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        if !caller.is_admin() { return Err(LedgerError::Unauthorized("admin role required".into())); }
        Ok(self.orders.all_orders(status).await?)
    }

    async fn load(&self, order_id: Uuid) -> Result<Order> {
        self.orders.find_order_by_id(order_id).await?
            .ok_or_else(|| LedgerError::NotFound(format!("order {order_id}")))
    }

    /// Read-modify-write with a version check. `apply` runs against a fresh
    /// copy on every attempt; a rejected guard aborts without writing, and an
    /// operation that changed nothing is not written at all.
    async fn mutate<T, F>(&self, order_id: Uuid, mut apply: F) -> Result<(Order, T)>
    where
        F: FnMut(&mut Order) -> Result<T>,
    {
        let attempts = self.settings.max_write_attempts.max(1);
        for attempt in 1..=attempts {
            let mut order = self.load(order_id).await?;
            let out = apply(&mut order)?;
            if !order.has_changes() { return Ok((order, out)); }
            let events = order.take_events();
            match self.orders.update_order(&mut order).await {
                Ok(()) => {
                    self.events.publish_all(events).await;
                    return Ok((order, out));
                }
                Err(StoreError::Conflict(_)) if attempt < attempts => {
                    warn!(%order_id, attempt, "version conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LedgerError::Conflict(format!("order {order_id} kept changing, retry the request")))
    }
}

fn gateway_lines(lines: &[OrderLine], plan: &PaymentPlan, payment_type: PaymentType, shipping_fee: Money) -> Vec<GatewayLineItem> {
    let mut items: Vec<GatewayLineItem> = match payment_type {
        PaymentType::FullPayment => lines.iter()
            .map(|l| GatewayLineItem { name: l.name.clone(), quantity: l.quantity.value(), amount: l.unit_price })
            .collect(),
        PaymentType::DownPayment => {
            let mut items = vec![GatewayLineItem {
                name: "Down payment (30%) for made-to-order items".into(),
                quantity: 1,
                amount: plan.down_payment_amount - plan.normal_total,
            }];
            items.extend(lines.iter().filter(|l| !l.is_customizable)
                .map(|l| GatewayLineItem { name: l.name.clone(), quantity: l.quantity.value(), amount: l.unit_price }));
            items
        }
    };
    if shipping_fee.is_positive() {
        items.push(GatewayLineItem { name: "Shipping".into(), quantity: 1, amount: shipping_fee });
    }
    items
}
