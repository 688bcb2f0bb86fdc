//! Order Aggregate
//!
//! Owns the financial fields of an order and the lifecycle around them:
//!
//! ```text
//! Pending -> On Process | Ready for Pickup -> Delivered | Picked Up
//!            On Process -> Requesting for Refund -> Refunded
//! Pending -> Cancelled
//! ```
//!
//! An order is placed in `Pending` with nothing collected. Only a gateway
//! confirmation moves it out of `Pending`; a later settlement collects the
//! balance left by a down payment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::identity::Caller;
use crate::domain::payment_plan::{compute_plan, PaymentPlan};
use crate::domain::pricing::CustomizationInput;
use crate::domain::value_objects::{Money, Quantity, TransactionHash};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    id: Uuid,
    order_number: String,
    user_id: String,
    currency: String,
    lines: Vec<OrderLine>,
    amount: Money,
    shipping_fee: Money,
    total_with_shipping: Money,
    down_payment: Money,
    balance: Money,
    payment_type: PaymentType,
    planned_charge: Money,
    payment_status: PaymentStatus,
    status: OrderStatus,
    transaction_hash: TransactionHash,
    settlement_transaction_hash: Option<TransactionHash>,
    delivery_option: DeliveryOption,
    delivery_proof: Option<String>,
    delivery_date: Option<DateTime<Utc>>,
    gateway_session_id: String,
    checkout_url: String,
    pending_settlement: Option<PendingSettlement>,
    #[serde(default)]
    settled_session_id: Option<String>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// One purchased line, fixed at placement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_id: Uuid,
    pub name: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub is_customizable: bool,
    pub customization: Option<CustomizationInput>,
}

impl OrderLine {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSettlement {
    pub session_id: String,
    pub checkout_url: String,
    pub amount: Money,
    pub transaction_hash: TransactionHash,
    pub requested_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType { FullPayment, DownPayment }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOption { Shipping, Pickup }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    Pending,
    #[serde(rename = "On Process")] OnProcess,
    #[serde(rename = "Ready for Pickup")] ReadyForPickup,
    Delivered,
    #[serde(rename = "Picked Up")] PickedUp,
    #[serde(rename = "Requesting for Refund")] RequestingForRefund,
    Refunded,
    Cancelled,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[default]
    Pending,
    #[serde(rename = "Downpayment Received")] DownpaymentReceived,
    #[serde(rename = "Pending Full Payment")] PendingFullPayment,
    #[serde(rename = "Fully Paid")] FullyPaid,
    #[serde(rename = "Refund Requested")] RefundRequested,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Pending, OrderStatus::OnProcess, OrderStatus::ReadyForPickup, OrderStatus::Delivered,
        OrderStatus::PickedUp, OrderStatus::RequestingForRefund, OrderStatus::Refunded, OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::OnProcess => "On Process",
            Self::ReadyForPickup => "Ready for Pickup",
            Self::Delivered => "Delivered",
            Self::PickedUp => "Picked Up",
            Self::RequestingForRefund => "Requesting for Refund",
            Self::Refunded => "Refunded",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str().eq_ignore_ascii_case(value.trim()))
    }

    fn is_closed(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded | Self::RequestingForRefund)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Outcome of applying a gateway confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirmation { Applied, AlreadyApplied }

/// Outcome of asking to settle the balance. An open settlement session is
/// never replaced, since the customer may already be paying it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettlementStart {
    Opened(PendingSettlement),
    AlreadyOpen(PendingSettlement),
}

impl SettlementStart {
    pub fn pending(&self) -> &PendingSettlement {
        match self { Self::Opened(p) | Self::AlreadyOpen(p) => p }
    }
    pub fn into_pending(self) -> PendingSettlement {
        match self { Self::Opened(p) | Self::AlreadyOpen(p) => p }
    }
}

/// What the customer is charged at checkout, and the payment type that
/// actually applies. A down payment on a cart without made-to-order lines
/// collapses into a full payment.
pub fn initial_charge(plan: &PaymentPlan, shipping_fee: Money, requested: PaymentType) -> (PaymentType, Money) {
    match requested {
        PaymentType::DownPayment if plan.has_customized_lines() => (PaymentType::DownPayment, plan.down_payment_amount + shipping_fee),
        _ => (PaymentType::FullPayment, plan.full_amount + shipping_fee),
    }
}

/// Everything checkout has settled on before the order exists.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub user_id: String,
    pub currency: String,
    pub lines: Vec<OrderLine>,
    pub shipping_fee: Money,
    pub payment_type: PaymentType,
    pub delivery_option: DeliveryOption,
    pub transaction_hash: TransactionHash,
    pub gateway_session_id: String,
    pub checkout_url: String,
}

impl Order {
    pub fn place(new: NewOrder) -> Result<Self, OrderError> {
        if new.lines.is_empty() { return Err(OrderError::NoItems); }
        if new.shipping_fee < Money::ZERO { return Err(OrderError::Validation("shipping fee cannot be negative".into())); }
        let plan = compute_plan(&new.lines);
        let (payment_type, planned_charge) = initial_charge(&plan, new.shipping_fee, new.payment_type);
        let total_with_shipping = plan.full_amount + new.shipping_fee;
        let now = Utc::now();
        let mut order = Self {
            id: Uuid::now_v7(),
            order_number: format!("ORD-{:08}", rand::random::<u32>()),
            user_id: new.user_id, currency: new.currency, lines: new.lines,
            amount: plan.full_amount, shipping_fee: new.shipping_fee, total_with_shipping,
            down_payment: Money::ZERO, balance: total_with_shipping,
            payment_type, planned_charge,
            payment_status: PaymentStatus::Pending, status: OrderStatus::Pending,
            transaction_hash: new.transaction_hash, settlement_transaction_hash: None,
            delivery_option: new.delivery_option, delivery_proof: None, delivery_date: None,
            gateway_session_id: new.gateway_session_id, checkout_url: new.checkout_url, pending_settlement: None, settled_session_id: None,
            version: 0, created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id, user_id: order.user_id.clone(), total_with_shipping,
        }));
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn user_id(&self) -> &str { &self.user_id }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn lines(&self) -> &[OrderLine] { &self.lines }
    pub fn amount(&self) -> Money { self.amount }
    pub fn shipping_fee(&self) -> Money { self.shipping_fee }
    pub fn total_with_shipping(&self) -> Money { self.total_with_shipping }
    pub fn down_payment(&self) -> Money { self.down_payment }
    pub fn balance(&self) -> Money { self.balance }
    pub fn payment_type(&self) -> PaymentType { self.payment_type }
    pub fn planned_charge(&self) -> Money { self.planned_charge }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn transaction_hash(&self) -> &TransactionHash { &self.transaction_hash }
    pub fn settlement_transaction_hash(&self) -> Option<&TransactionHash> { self.settlement_transaction_hash.as_ref() }
    pub fn delivery_option(&self) -> DeliveryOption { self.delivery_option }
    pub fn delivery_proof(&self) -> Option<&str> { self.delivery_proof.as_deref() }
    pub fn delivery_date(&self) -> Option<DateTime<Utc>> { self.delivery_date }
    pub fn gateway_session_id(&self) -> &str { &self.gateway_session_id }
    pub fn checkout_url(&self) -> &str { &self.checkout_url }
    pub fn pending_settlement(&self) -> Option<&PendingSettlement> { self.pending_settlement.as_ref() }
    /// Gateway session that paid off the balance, once settled.
    pub fn settled_session_id(&self) -> Option<&str> { self.settled_session_id.as_deref() }
    pub fn version(&self) -> u64 { self.version }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn has_customized_lines(&self) -> bool { self.lines.iter().any(|l| l.is_customizable) }

    /// Set by the store after a successful conditional write.
    pub(crate) fn set_version(&mut self, version: u64) { self.version = version; }

    /// Applies the gateway's confirmation of the checkout charge.
    pub fn confirm_payment(&mut self, session_id: &str) -> Result<Confirmation, OrderError> {
        if session_id != self.gateway_session_id {
            return Err(OrderError::InvalidState(format!("session {session_id} does not belong to order {}", self.id)));
        }
        if self.payment_status != PaymentStatus::Pending {
            return Ok(Confirmation::AlreadyApplied);
        }
        if self.status != OrderStatus::Pending {
            return Err(OrderError::InvalidState(format!("cannot confirm payment on a {} order", self.status)));
        }
        self.down_payment = self.planned_charge;
        self.balance = self.total_with_shipping.saturating_sub(self.planned_charge);
        match self.payment_type {
            PaymentType::FullPayment => {
                self.payment_status = PaymentStatus::FullyPaid;
                self.status = match self.delivery_option {
                    DeliveryOption::Pickup => OrderStatus::ReadyForPickup,
                    DeliveryOption::Shipping => OrderStatus::OnProcess,
                };
            }
            PaymentType::DownPayment => {
                self.payment_status = PaymentStatus::DownpaymentReceived;
                self.status = OrderStatus::OnProcess;
            }
        }
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::PaymentConfirmed {
            order_id: self.id, collected: self.down_payment, payment_status: self.payment_status,
        }));
        Ok(Confirmation::Applied)
    }

    /// Checks that `caller` may pay off the remaining balance, returning it.
    pub fn settleable_balance(&self, caller: &Caller) -> Result<Money, OrderError> {
        self.ensure_owner(caller)?;
        if !self.balance.is_positive() {
            return Err(OrderError::InvalidState("order has no remaining balance".into()));
        }
        if !matches!(self.payment_status, PaymentStatus::DownpaymentReceived | PaymentStatus::PendingFullPayment) {
            return Err(OrderError::InvalidState(format!("cannot settle while payment is {:?}", self.payment_status)));
        }
        if self.status.is_closed() {
            return Err(OrderError::InvalidState(format!("cannot settle a {} order", self.status)));
        }
        Ok(self.balance)
    }

    /// Records the gateway session opened for the remaining balance, unless
    /// one is already pending; that one is handed back untouched.
    pub fn begin_settlement(
        &mut self,
        caller: &Caller,
        session_id: impl Into<String>,
        checkout_url: impl Into<String>,
        transaction_hash: TransactionHash,
    ) -> Result<SettlementStart, OrderError> {
        let amount = self.settleable_balance(caller)?;
        if let Some(open) = &self.pending_settlement {
            return Ok(SettlementStart::AlreadyOpen(open.clone()));
        }
        self.payment_status = PaymentStatus::PendingFullPayment;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::SettlementRequested { order_id: self.id, amount }));
        let pending = self.pending_settlement.insert(PendingSettlement {
            session_id: session_id.into(),
            checkout_url: checkout_url.into(),
            amount,
            transaction_hash,
            requested_at: Utc::now(),
        });
        Ok(SettlementStart::Opened(pending.clone()))
    }

    /// Applies the gateway's confirmation of the balance payment.
    pub fn settle(&mut self, session_id: &str) -> Result<Confirmation, OrderError> {
        let pending = match self.pending_settlement.take() {
            Some(p) if p.session_id == session_id => p,
            other => {
                self.pending_settlement = other;
                if self.settled_session_id.as_deref() == Some(session_id) {
                    return Ok(Confirmation::AlreadyApplied);
                }
                return Err(OrderError::InvalidState(format!("no settlement pending for session {session_id}")));
            }
        };
        self.balance = Money::ZERO;
        self.down_payment = self.total_with_shipping;
        self.payment_status = PaymentStatus::FullyPaid;
        self.settlement_transaction_hash = Some(pending.transaction_hash);
        self.settled_session_id = Some(pending.session_id);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Settled { order_id: self.id, amount: pending.amount }));
        Ok(Confirmation::Applied)
    }

    /// Admin override: sets any status regardless of the current one.
    pub fn force_status(&mut self, caller: &Caller, status: OrderStatus) -> Result<OrderStatus, OrderError> {
        self.ensure_admin(caller)?;
        let from = std::mem::replace(&mut self.status, status);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusForced { order_id: self.id, from, to: status }));
        Ok(from)
    }

    pub fn request_refund(&mut self, caller: &Caller) -> Result<(), OrderError> {
        self.ensure_owner(caller)?;
        if self.has_customized_lines() {
            return Err(OrderError::InvalidState("orders with made-to-order items cannot be refunded".into()));
        }
        if self.status != OrderStatus::OnProcess {
            return Err(OrderError::InvalidState(format!("refund can only be requested while On Process, order is {}", self.status)));
        }
        self.status = OrderStatus::RequestingForRefund;
        self.payment_status = PaymentStatus::RefundRequested;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::RefundRequested { order_id: self.id }));
        Ok(())
    }

    pub fn confirm_refund(&mut self, caller: &Caller) -> Result<(), OrderError> {
        self.ensure_admin(caller)?;
        if self.status != OrderStatus::RequestingForRefund {
            return Err(OrderError::InvalidState(format!("no refund requested, order is {}", self.status)));
        }
        self.status = OrderStatus::Refunded;
        self.payment_status = PaymentStatus::Refunded;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Refunded { order_id: self.id }));
        Ok(())
    }

    pub fn cancel(&mut self, caller: &Caller) -> Result<(), OrderError> {
        self.ensure_owner(caller)?;
        if self.status != OrderStatus::Pending {
            return Err(OrderError::InvalidState(format!("only pending orders can be cancelled, order is {}", self.status)));
        }
        self.status = OrderStatus::Cancelled;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id }));
        Ok(())
    }

    pub fn attach_delivery_proof(&mut self, caller: &Caller, proof_url: impl Into<String>, at: DateTime<Utc>) -> Result<OrderStatus, OrderError> {
        self.ensure_admin(caller)?;
        let proof = proof_url.into();
        if proof.trim().is_empty() { return Err(OrderError::Validation("delivery proof url is required".into())); }
        self.status = match self.delivery_option {
            DeliveryOption::Pickup => OrderStatus::PickedUp,
            DeliveryOption::Shipping => OrderStatus::Delivered,
        };
        self.delivery_proof = Some(proof.clone());
        self.delivery_date = Some(at);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Delivered { order_id: self.id, status: self.status, proof }));
        Ok(self.status)
    }

    fn ensure_owner(&self, caller: &Caller) -> Result<(), OrderError> {
        if caller.owns(&self.user_id) { Ok(()) } else { Err(OrderError::Unauthorized("order belongs to another customer".into())) }
    }

    fn ensure_admin(&self, caller: &Caller) -> Result<(), OrderError> {
        if caller.is_admin() { Ok(()) } else { Err(OrderError::Unauthorized("admin role required".into())) }
    }

    pub fn has_changes(&self) -> bool { !self.events.is_empty() }
    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    InvalidState(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(price: i64, qty: u32, custom: bool) -> OrderLine {
        OrderLine {
            item_id: Uuid::now_v7(), name: if custom { "Custom Table".into() } else { "Chair".into() },
            quantity: Quantity::new(qty).unwrap(), unit_price: Money::from_major(price),
            is_customizable: custom, customization: None,
        }
    }

    fn place(lines: Vec<OrderLine>, shipping: i64, payment_type: PaymentType, delivery: DeliveryOption) -> Order {
        Order::place(NewOrder {
            user_id: "u1".into(), currency: "PHP".into(), lines, shipping_fee: Money::from_major(shipping),
            payment_type, delivery_option: delivery, transaction_hash: TransactionHash::for_user("u1", 1),
            gateway_session_id: "cs_1".into(), checkout_url: "https://pay/cs_1".into(),
        }).unwrap()
    }

    fn mixed_order() -> Order {
        let mut order = place(vec![line(10000, 1, true), line(500, 1, false)], 0, PaymentType::DownPayment, DeliveryOption::Shipping);
        order.confirm_payment("cs_1").unwrap();
        order
    }

    fn assert_reconciles(order: &Order) {
        assert_eq!(order.down_payment() + order.balance(), order.total_with_shipping());
        if order.balance().is_positive() { assert_ne!(order.payment_status(), PaymentStatus::FullyPaid); }
    }

    #[test]
    fn test_placed_order_is_pending_with_nothing_collected() {
        let order = place(vec![line(1000, 2, false)], 1500, PaymentType::FullPayment, DeliveryOption::Shipping);
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert_eq!(order.amount(), Money::from_major(2000));
        assert_eq!(order.total_with_shipping(), Money::from_major(3500));
        assert_eq!(order.balance(), Money::from_major(3500));
        assert_reconciles(&order);
    }

    #[test]
    fn test_empty_order_rejected() {
        let err = Order::place(NewOrder {
            user_id: "u1".into(), currency: "PHP".into(), lines: vec![], shipping_fee: Money::ZERO,
            payment_type: PaymentType::FullPayment, delivery_option: DeliveryOption::Pickup,
            transaction_hash: TransactionHash::for_user("u1", 1), gateway_session_id: "cs".into(), checkout_url: "https://pay/cs".into(),
        }).unwrap_err();
        assert_eq!(err, OrderError::NoItems);
    }

    #[test]
    fn test_full_payment_confirmation() {
        let mut order = place(vec![line(1000, 2, false)], 1500, PaymentType::FullPayment, DeliveryOption::Shipping);
        assert_eq!(order.confirm_payment("cs_1").unwrap(), Confirmation::Applied);
        assert_eq!(order.status(), OrderStatus::OnProcess);
        assert_eq!(order.payment_status(), PaymentStatus::FullyPaid);
        assert_eq!(order.balance(), Money::ZERO);
        assert_eq!(order.amount(), Money::from_major(2000));
        assert_reconciles(&order);
    }

    #[test]
    fn test_pickup_full_payment_is_ready_for_pickup() {
        let mut order = place(vec![line(1000, 1, true)], 0, PaymentType::FullPayment, DeliveryOption::Pickup);
        order.confirm_payment("cs_1").unwrap();
        assert_eq!(order.status(), OrderStatus::ReadyForPickup);
        assert_eq!(order.payment_status(), PaymentStatus::FullyPaid);
    }

    #[test]
    fn test_down_payment_on_stock_cart_collapses_to_full() {
        let mut order = place(vec![line(1000, 1, false)], 0, PaymentType::DownPayment, DeliveryOption::Pickup);
        assert_eq!(order.payment_type(), PaymentType::FullPayment);
        order.confirm_payment("cs_1").unwrap();
        assert_eq!(order.payment_status(), PaymentStatus::FullyPaid);
    }

    #[test]
    fn test_down_payment_confirmation() {
        let order = mixed_order();
        assert_eq!(order.payment_status(), PaymentStatus::DownpaymentReceived);
        assert_eq!(order.status(), OrderStatus::OnProcess);
        assert_eq!(order.down_payment(), Money::from_major(3500));
        assert_eq!(order.balance(), Money::from_major(7000));
        assert_reconciles(&order);
    }

    #[test]
    fn test_down_payment_with_shipping_charges_shipping_up_front() {
        let mut order = place(vec![line(10000, 1, true)], 250, PaymentType::DownPayment, DeliveryOption::Shipping);
        assert_eq!(order.planned_charge(), Money::from_major(3250));
        order.confirm_payment("cs_1").unwrap();
        assert_eq!(order.balance(), Money::from_major(7000));
        assert_reconciles(&order);
    }

    #[test]
    fn test_confirmation_is_idempotent() {
        let mut order = mixed_order();
        let before = order.down_payment();
        assert_eq!(order.confirm_payment("cs_1").unwrap(), Confirmation::AlreadyApplied);
        assert_eq!(order.down_payment(), before);
    }

    #[test]
    fn test_confirmation_rejects_foreign_session_and_cancelled_orders() {
        let mut order = place(vec![line(1000, 1, false)], 0, PaymentType::FullPayment, DeliveryOption::Shipping);
        assert!(matches!(order.confirm_payment("cs_other"), Err(OrderError::InvalidState(_))));
        order.cancel(&Caller::user("u1")).unwrap();
        assert!(matches!(order.confirm_payment("cs_1"), Err(OrderError::InvalidState(_))));
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
    }

    #[test]
    fn test_settlement() {
        let mut order = mixed_order();
        let hash = TransactionHash::for_user("u1", 2);
        let start = order.begin_settlement(&Caller::user("u1"), "cs_2", "https://pay/cs_2", hash.clone()).unwrap();
        assert!(matches!(start, SettlementStart::Opened(_)));
        assert_eq!(start.pending().amount, Money::from_major(7000));
        assert_eq!(order.payment_status(), PaymentStatus::PendingFullPayment);
        assert_reconciles(&order);

        assert_eq!(order.settle("cs_2").unwrap(), Confirmation::Applied);
        assert_eq!(order.balance(), Money::ZERO);
        assert_eq!(order.down_payment(), order.total_with_shipping());
        assert_eq!(order.payment_status(), PaymentStatus::FullyPaid);
        assert_eq!(order.settlement_transaction_hash(), Some(&hash));
        assert_eq!(order.settle("cs_2").unwrap(), Confirmation::AlreadyApplied);
    }

    #[test]
    fn test_open_settlement_is_never_replaced() {
        let mut order = mixed_order();
        order.begin_settlement(&Caller::user("u1"), "cs_2", "https://pay/cs_2", TransactionHash::for_user("u1", 2)).unwrap();
        order.take_events();
        let again = order.begin_settlement(&Caller::user("u1"), "cs_3", "https://pay/cs_3", TransactionHash::for_user("u1", 3)).unwrap();
        let SettlementStart::AlreadyOpen(open) = again else { panic!("expected the open settlement") };
        assert_eq!(open.session_id, "cs_2");
        assert_eq!(order.pending_settlement().map(|p| p.session_id.as_str()), Some("cs_2"));
        assert!(!order.has_changes());
        assert!(matches!(order.settle("cs_3"), Err(OrderError::InvalidState(_))));
        assert_eq!(order.settle("cs_2").unwrap(), Confirmation::Applied);
    }

    #[test]
    fn test_settlement_guards() {
        let mut order = mixed_order();
        let hash = TransactionHash::for_user("u2", 1);
        assert!(matches!(order.begin_settlement(&Caller::user("u2"), "cs_2", "url", hash), Err(OrderError::Unauthorized(_))));
        assert!(matches!(order.settle("cs_unknown"), Err(OrderError::InvalidState(_))));

        let mut paid = place(vec![line(1000, 1, false)], 0, PaymentType::FullPayment, DeliveryOption::Shipping);
        paid.confirm_payment("cs_1").unwrap();
        assert!(matches!(paid.settleable_balance(&Caller::user("u1")), Err(OrderError::InvalidState(_))));
    }

    #[test]
    fn test_refund_rejected_for_customized_orders_in_any_status() {
        for status in OrderStatus::ALL {
            let mut order = mixed_order();
            order.force_status(&Caller::admin("a"), status).unwrap();
            let err = order.request_refund(&Caller::user("u1")).unwrap_err();
            assert!(matches!(err, OrderError::InvalidState(_)));
            assert_eq!(order.status(), status);
        }
    }

    #[test]
    fn test_refund_flow() {
        let mut order = place(vec![line(1000, 1, false)], 0, PaymentType::FullPayment, DeliveryOption::Shipping);
        assert!(order.request_refund(&Caller::user("u1")).is_err());
        order.confirm_payment("cs_1").unwrap();
        assert!(matches!(order.request_refund(&Caller::user("u2")), Err(OrderError::Unauthorized(_))));
        order.request_refund(&Caller::user("u1")).unwrap();
        assert_eq!(order.status(), OrderStatus::RequestingForRefund);
        assert_eq!(order.payment_status(), PaymentStatus::RefundRequested);
        assert!(matches!(order.confirm_refund(&Caller::user("u1")), Err(OrderError::Unauthorized(_))));
        order.confirm_refund(&Caller::admin("a")).unwrap();
        assert_eq!(order.status(), OrderStatus::Refunded);
        assert_eq!(order.payment_status(), PaymentStatus::Refunded);
    }

    #[test]
    fn test_cancel_only_from_pending() {
        let mut order = place(vec![line(1000, 1, false)], 0, PaymentType::FullPayment, DeliveryOption::Shipping);
        assert!(matches!(order.cancel(&Caller::user("u2")), Err(OrderError::Unauthorized(_))));
        order.cancel(&Caller::user("u1")).unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);

        let mut confirmed = mixed_order();
        assert!(matches!(confirmed.cancel(&Caller::user("u1")), Err(OrderError::InvalidState(_))));
    }

    #[test]
    fn test_force_status_is_unconditional_but_admin_only() {
        let mut order = place(vec![line(1000, 1, false)], 0, PaymentType::FullPayment, DeliveryOption::Shipping);
        assert!(order.force_status(&Caller::user("u1"), OrderStatus::Delivered).is_err());
        assert_eq!(order.force_status(&Caller::admin("a"), OrderStatus::Delivered).unwrap(), OrderStatus::Pending);
        assert_eq!(order.status(), OrderStatus::Delivered);
    }

    #[test]
    fn test_delivery_proof() {
        let now = Utc::now();
        let mut shipped = mixed_order();
        assert_eq!(shipped.attach_delivery_proof(&Caller::admin("a"), "https://img/1.jpg", now).unwrap(), OrderStatus::Delivered);
        assert_eq!(shipped.delivery_proof(), Some("https://img/1.jpg"));
        assert_eq!(shipped.delivery_date(), Some(now));

        let mut pickup = place(vec![line(1000, 1, false)], 0, PaymentType::FullPayment, DeliveryOption::Pickup);
        assert!(pickup.attach_delivery_proof(&Caller::user("u1"), "x", now).is_err());
        assert!(matches!(pickup.attach_delivery_proof(&Caller::admin("a"), " ", now), Err(OrderError::Validation(_))));
        assert_eq!(pickup.attach_delivery_proof(&Caller::admin("a"), "https://img/2.jpg", now).unwrap(), OrderStatus::PickedUp);
    }

    #[test]
    fn test_amount_never_changes() {
        let mut order = mixed_order();
        let amount = order.amount();
        order.begin_settlement(&Caller::user("u1"), "cs_2", "url", TransactionHash::for_user("u1", 2)).unwrap();
        order.settle("cs_2").unwrap();
        order.attach_delivery_proof(&Caller::admin("a"), "p", Utc::now()).unwrap();
        assert_eq!(order.amount(), amount);
        assert_eq!(order.amount().amount(), dec!(10500));
    }

    #[test]
    fn test_status_serialization_uses_display_names() {
        assert_eq!(serde_json::to_string(&OrderStatus::RequestingForRefund).unwrap(), "\"Requesting for Refund\"");
        assert_eq!(serde_json::to_string(&PaymentStatus::DownpaymentReceived).unwrap(), "\"Downpayment Received\"");
        assert_eq!(OrderStatus::parse("ready for pickup"), Some(OrderStatus::ReadyForPickup));
    }

    #[test]
    fn test_events_raised() {
        let mut order = mixed_order();
        let events = order.take_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].subject(), "order.payment_confirmed");
    }
}
