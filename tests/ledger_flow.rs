mod common;

use async_trait::async_trait;
use common::*;
use furnish_commerce::domain::aggregates::{Order, OrderStatus, PaymentStatus, PaymentType};
use furnish_commerce::domain::identity::Caller;
use furnish_commerce::domain::value_objects::{Money, Quantity, TransactionHash};
use furnish_commerce::events::EventPublisher;
use furnish_commerce::gateway::WebhookEvent;
use furnish_commerce::repositories::{CartStore, InsertOutcome, ItemStore, MemoryStore, OrderStore, StoreError};
use furnish_commerce::services::{LedgerSettings, OrderLedger, WebhookOutcome};
use furnish_commerce::LedgerError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

async fn confirm(w: &World, order_id: Uuid) -> Order {
    let receipt = w.ledger.handle_webhook(&WebhookEvent::completed(w.session_of(order_id).await)).await.unwrap();
    assert_eq!(receipt.outcome, WebhookOutcome::Confirmed(order_id));
    if let Some(task) = receipt.side_effects { task.await.unwrap(); }
    w.store.find_order_by_id(order_id).await.unwrap().unwrap()
}

#[tokio::test]
async fn full_payment_stock_cart_is_fully_paid_on_confirmation() {
    let w = world().await;
    let caller = Caller::user("u1");
    let out = w.ledger.checkout(&caller, checkout_request(&caller, 1, vec![stock_line(&w.lamp, 2)], 1500, PaymentType::FullPayment)).await.unwrap();
    let plan = out.plan.unwrap();
    assert_eq!(plan.full_amount, Money::from_major(2000));
    assert_eq!(plan.down_payment_amount, Money::from_major(2000));
    assert_eq!(plan.remaining_balance, Money::ZERO);
    assert_eq!(out.charge, Some(Money::from_major(3500)));

    let pending = w.store.find_order_by_id(out.order_id).await.unwrap().unwrap();
    assert_eq!(pending.status(), OrderStatus::Pending);
    assert_eq!(pending.payment_status(), PaymentStatus::Pending);

    let order = confirm(&w, out.order_id).await;
    assert_eq!(order.amount(), Money::from_major(2000));
    assert_eq!(order.status(), OrderStatus::OnProcess);
    assert_eq!(order.payment_status(), PaymentStatus::FullyPaid);
    assert_eq!(order.balance(), Money::ZERO);
}

#[tokio::test]
async fn down_payment_then_settlement() {
    let w = world().await;
    let caller = Caller::user("u1");
    let mut request = checkout_request(&caller, 1, vec![custom_line(&w.table), stock_line(&w.chair, 1)], 0, PaymentType::DownPayment);
    request.paid_amount = Some(Money::from_major(3500));
    let out = w.ledger.checkout(&caller, request).await.unwrap();
    let plan = out.plan.unwrap();
    assert_eq!(plan.customized_total, Money::from_major(10000));
    assert_eq!(plan.normal_total, Money::from_major(500));
    assert_eq!(plan.down_payment_amount, Money::from_major(3500));
    assert_eq!(plan.remaining_balance, Money::from_major(7000));

    let order = confirm(&w, out.order_id).await;
    assert_eq!(order.payment_status(), PaymentStatus::DownpaymentReceived);
    assert_eq!(order.balance(), Money::from_major(7000));
    assert_eq!(order.down_payment() + order.balance(), order.total_with_shipping());

    let settlement = w.ledger.request_settlement(&caller, out.order_id, Some(TransactionHash::for_user("u1", 2))).await.unwrap();
    assert_eq!(settlement.amount, Money::from_major(7000));
    let mid = w.store.find_order_by_id(out.order_id).await.unwrap().unwrap();
    assert_eq!(mid.payment_status(), PaymentStatus::PendingFullPayment);
    assert_eq!(mid.balance(), Money::from_major(7000));

    let receipt = w.ledger.handle_webhook(&WebhookEvent::completed(settlement.session_id.clone())).await.unwrap();
    assert_eq!(receipt.outcome, WebhookOutcome::Settled(out.order_id));
    let settled = w.store.find_order_by_id(out.order_id).await.unwrap().unwrap();
    assert_eq!(settled.balance(), Money::ZERO);
    assert_eq!(settled.down_payment(), settled.total_with_shipping());
    assert_eq!(settled.payment_status(), PaymentStatus::FullyPaid);
    assert_eq!(settled.transaction_hash(), &TransactionHash::for_user("u1", 1));

    let replay = w.ledger.handle_webhook(&WebhookEvent::completed(settlement.session_id)).await.unwrap();
    assert_eq!(replay.outcome, WebhookOutcome::AlreadyProcessed(out.order_id));
}

#[tokio::test]
async fn duplicate_checkout_returns_the_first_order() {
    let w = world().await;
    let caller = Caller::user("u1");
    let request = checkout_request(&caller, 7, vec![stock_line(&w.chair, 1)], 0, PaymentType::FullPayment);
    let first = w.ledger.checkout(&caller, request.clone()).await.unwrap();
    let second = w.ledger.checkout(&caller, request).await.unwrap();
    assert!(!first.is_duplicate);
    assert!(second.is_duplicate);
    assert_eq!(second.order_id, first.order_id);
    assert_eq!(w.store.order_count().await, 1);
    assert_eq!(w.gateway.sessions().await.len(), 1);
}

#[tokio::test]
async fn racing_duplicate_checkouts_persist_one_order() {
    let w = world().await;
    let caller = Caller::user("u1");
    let request = checkout_request(&caller, 9, vec![stock_line(&w.lamp, 1)], 0, PaymentType::FullPayment);
    let (a, b) = tokio::join!(
        w.ledger.checkout(&caller, request.clone()),
        w.ledger.checkout(&caller, request),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.order_id, b.order_id);
    assert!(a.is_duplicate != b.is_duplicate);
    assert_eq!(w.store.order_count().await, 1);
}

#[tokio::test]
async fn transaction_hashes_are_scoped_to_their_user() {
    let w = world().await;
    let alice = Caller::user("alice");
    let mallory = Caller::user("mallory");
    let mut squatted = checkout_request(&alice, 1, vec![stock_line(&w.lamp, 1)], 0, PaymentType::FullPayment);
    let foreign = w.ledger.checkout(&mallory, squatted.clone()).await.unwrap();
    assert!(!foreign.is_duplicate);

    squatted.lines = vec![stock_line(&w.chair, 2)];
    let own = w.ledger.checkout(&alice, squatted).await.unwrap();
    assert!(!own.is_duplicate);
    assert_ne!(own.order_id, foreign.order_id);
    assert_ne!(own.checkout_url, foreign.checkout_url);
    assert_eq!(w.ledger.order(&alice, own.order_id).await.unwrap().user_id(), "alice");
    assert_eq!(w.store.order_count().await, 2);
}

#[tokio::test]
async fn concurrent_settlement_requests_share_one_session() {
    let w = world().await;
    let caller = Caller::user("u1");
    let out = w.ledger.checkout(&caller, checkout_request(&caller, 1, vec![custom_line(&w.table)], 0, PaymentType::DownPayment)).await.unwrap();
    confirm(&w, out.order_id).await;

    let (a, b) = tokio::join!(
        w.ledger.request_settlement(&caller, out.order_id, None),
        w.ledger.request_settlement(&caller, out.order_id, None),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.session_id, b.session_id);
    assert!(a.reused != b.reused);
    let pending = w.store.find_order_by_id(out.order_id).await.unwrap().unwrap();
    assert_eq!(pending.pending_settlement().map(|p| p.session_id.clone()), Some(a.session_id.clone()));

    let receipt = w.ledger.handle_webhook(&WebhookEvent::completed(a.session_id)).await.unwrap();
    assert_eq!(receipt.outcome, WebhookOutcome::Settled(out.order_id));
    let settled = w.store.find_order_by_id(out.order_id).await.unwrap().unwrap();
    assert_eq!(settled.payment_status(), PaymentStatus::FullyPaid);
    assert_eq!(settled.balance(), Money::ZERO);
}

#[tokio::test]
async fn plan_reconciles_for_awkward_prices() {
    let w = world().await;
    let caller = Caller::user("u1");
    for (counter, qty) in [(1u64, 1u32), (2, 3), (3, 7)] {
        let out = w.ledger.checkout(&caller, checkout_request(&caller, counter, vec![custom_line(&w.table), stock_line(&w.chair, qty)], 0, PaymentType::DownPayment)).await.unwrap();
        let plan = out.plan.unwrap();
        assert_eq!(plan.down_payment_amount - plan.normal_total + plan.remaining_balance, plan.customized_total);
        assert_eq!(plan.down_payment_amount + plan.remaining_balance, plan.full_amount);
    }
}

#[tokio::test]
async fn refunds_are_refused_for_made_to_order_items() {
    let w = world().await;
    let caller = Caller::user("u1");
    let admin = Caller::admin("ops");
    let out = w.ledger.checkout(&caller, checkout_request(&caller, 1, vec![custom_line(&w.table)], 0, PaymentType::FullPayment)).await.unwrap();
    confirm(&w, out.order_id).await;
    for status in OrderStatus::ALL {
        w.ledger.force_status(&admin, out.order_id, status).await.unwrap();
        let err = w.ledger.request_refund(&caller, out.order_id).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)), "status {status}");
    }
}

#[tokio::test]
async fn stock_order_refund_round_trip() {
    let w = world().await;
    let caller = Caller::user("u1");
    let admin = Caller::admin("ops");
    let out = w.ledger.checkout(&caller, checkout_request(&caller, 1, vec![stock_line(&w.chair, 2)], 0, PaymentType::FullPayment)).await.unwrap();
    confirm(&w, out.order_id).await;

    assert!(matches!(w.ledger.request_refund(&Caller::user("u2"), out.order_id).await, Err(LedgerError::Unauthorized(_))));
    let requested = w.ledger.request_refund(&caller, out.order_id).await.unwrap();
    assert_eq!(requested.status(), OrderStatus::RequestingForRefund);
    assert!(matches!(w.ledger.confirm_refund(&caller, out.order_id).await, Err(LedgerError::Unauthorized(_))));
    let refunded = w.ledger.confirm_refund(&admin, out.order_id).await.unwrap();
    assert_eq!(refunded.status(), OrderStatus::Refunded);
    assert_eq!(refunded.payment_status(), PaymentStatus::Refunded);
}

#[tokio::test]
async fn only_the_webhook_moves_an_order_out_of_pending() {
    let w = world().await;
    let caller = Caller::user("u1");
    let out = w.ledger.checkout(&caller, checkout_request(&caller, 1, vec![custom_line(&w.table)], 0, PaymentType::DownPayment)).await.unwrap();
    assert!(matches!(w.ledger.request_settlement(&caller, out.order_id, None).await, Err(LedgerError::InvalidState(_))));
    assert!(matches!(w.ledger.request_refund(&caller, out.order_id).await, Err(LedgerError::InvalidState(_))));
    let order = w.store.find_order_by_id(out.order_id).await.unwrap().unwrap();
    assert_eq!(order.payment_status(), PaymentStatus::Pending);

    let cancelled = w.ledger.cancel_order(&caller, out.order_id).await.unwrap();
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    let late = w.ledger.handle_webhook(&WebhookEvent::completed(cancelled.gateway_session_id())).await.unwrap();
    assert!(matches!(late.outcome, WebhookOutcome::Ignored(_)));
    assert_eq!(w.store.find_order_by_id(out.order_id).await.unwrap().unwrap().payment_status(), PaymentStatus::Pending);
}

#[tokio::test]
async fn gateway_outage_leaves_no_order_behind() {
    let w = world().await;
    let caller = Caller::user("u1");
    w.gateway.fail_requests(true);
    let request = checkout_request(&caller, 1, vec![stock_line(&w.chair, 1)], 0, PaymentType::FullPayment);
    let err = w.ledger.checkout(&caller, request.clone()).await.unwrap_err();
    assert_eq!(err.kind(), "gateway_error");
    assert_eq!(w.store.order_count().await, 0);

    w.gateway.fail_requests(false);
    let retry = w.ledger.checkout(&caller, request).await.unwrap();
    assert!(!retry.is_duplicate);
    assert_eq!(w.store.order_count().await, 1);
}

#[tokio::test]
async fn confirmation_clears_cart_and_counts_sales_once() {
    let w = world().await;
    let caller = Caller::user("u1");
    w.storefront.add_to_cart(&caller, w.chair.id(), Quantity::new(3).unwrap(), None).await.unwrap();
    w.storefront.add_to_cart(&caller, w.lamp.id(), Quantity::new(1).unwrap(), None).await.unwrap();

    let out = w.ledger.checkout(&caller, checkout_request(&caller, 1, vec![stock_line(&w.chair, 3)], 0, PaymentType::FullPayment)).await.unwrap();
    confirm(&w, out.order_id).await;
    let cart = w.store.load_cart("u1").await.unwrap();
    assert_eq!(cart.lines().len(), 1);
    assert_eq!(cart.lines()[0].item_id, w.lamp.id());
    assert_eq!(w.store.find_item(w.chair.id()).await.unwrap().unwrap().sales(), 3);

    let replay = w.ledger.handle_webhook(&WebhookEvent::completed(w.session_of(out.order_id).await)).await.unwrap();
    assert!(replay.side_effects.is_none());
    assert_eq!(w.store.find_item(w.chair.id()).await.unwrap().unwrap().sales(), 3);
}

#[tokio::test]
async fn delivery_proof_completes_the_order() {
    let w = world().await;
    let caller = Caller::user("u1");
    let out = w.ledger.checkout(&caller, checkout_request(&caller, 1, vec![stock_line(&w.chair, 1)], 200, PaymentType::FullPayment)).await.unwrap();
    confirm(&w, out.order_id).await;
    assert!(matches!(
        w.ledger.attach_delivery_proof(&caller, out.order_id, "https://cdn.example/proof.jpg").await,
        Err(LedgerError::Unauthorized(_))
    ));
    let order = w.ledger.attach_delivery_proof(&Caller::admin("ops"), out.order_id, "https://cdn.example/proof.jpg").await.unwrap();
    assert_eq!(order.status(), OrderStatus::Delivered);
    assert_eq!(order.delivery_proof(), Some("https://cdn.example/proof.jpg"));
    assert!(order.delivery_date().is_some());
}

/// Delegates to a memory store but reports a version conflict on the first
/// `fail_first` updates.
struct ContendedStore {
    inner: MemoryStore,
    fail_first: u32,
    updates: AtomicU32,
}

#[async_trait]
impl OrderStore for ContendedStore {
    async fn find_order_by_id(&self, id: Uuid) -> Result<Option<Order>, StoreError> { self.inner.find_order_by_id(id).await }
    async fn find_order_by_transaction_hash(&self, user_id: &str, hash: &TransactionHash) -> Result<Option<Order>, StoreError> { self.inner.find_order_by_transaction_hash(user_id, hash).await }
    async fn find_order_by_session(&self, session_id: &str) -> Result<Option<Order>, StoreError> { self.inner.find_order_by_session(session_id).await }
    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome, StoreError> { self.inner.insert_order(order).await }
    async fn update_order(&self, order: &mut Order) -> Result<(), StoreError> {
        if self.updates.fetch_add(1, Ordering::SeqCst) < self.fail_first {
            return Err(StoreError::Conflict(order.id()));
        }
        self.inner.update_order(order).await
    }
    async fn orders_for_user(&self, user_id: &str, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError> { self.inner.orders_for_user(user_id, status).await }
    async fn all_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError> { self.inner.all_orders(status).await }
}

async fn contended_ledger(fail_first: u32) -> (Arc<ContendedStore>, Arc<MemoryStore>, OrderLedger, Uuid) {
    let w = world().await;
    let orders = Arc::new(ContendedStore { inner: MemoryStore::new(), fail_first, updates: AtomicU32::new(0) });
    let catalog = w.store.clone();
    let ledger = OrderLedger::new(orders.clone(), catalog.clone(), catalog.clone(), w.gateway.clone(), EventPublisher::disabled(), LedgerSettings::default());
    let caller = Caller::user("u1");
    let out = ledger.checkout(&caller, checkout_request(&caller, 1, vec![stock_line(&w.chair, 1)], 0, PaymentType::FullPayment)).await.unwrap();
    (orders, catalog, ledger, out.order_id)
}

#[tokio::test]
async fn version_conflicts_are_retried() {
    let (orders, _, ledger, order_id) = contended_ledger(2).await;
    let order = ledger.cancel_order(&Caller::user("u1"), order_id).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);
    assert_eq!(orders.find_order_by_id(order_id).await.unwrap().unwrap().version(), 1);
}

#[tokio::test]
async fn persistent_conflicts_surface() {
    let (orders, _, ledger, order_id) = contended_ledger(10).await;
    let err = ledger.cancel_order(&Caller::user("u1"), order_id).await.unwrap_err();
    assert_eq!(err.kind(), "conflict");
    assert_eq!(orders.find_order_by_id(order_id).await.unwrap().unwrap().status(), OrderStatus::Pending);
}

#[tokio::test]
async fn catalog_store_is_independent_of_order_store() {
    let (_, catalog, ledger, order_id) = contended_ledger(0).await;
    let session = ledger.order(&Caller::user("u1"), order_id).await.unwrap().gateway_session_id().to_string();
    let receipt = ledger.handle_webhook(&WebhookEvent::completed(session)).await.unwrap();
    receipt.side_effects.unwrap().await.unwrap();
    let sold: u64 = catalog.list_items().await.unwrap().iter().map(|i| i.sales()).sum();
    assert_eq!(sold, 1);
}
