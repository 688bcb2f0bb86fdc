//! Domain events
use crate::domain::aggregates::order::{OrderStatus, PaymentStatus};
use crate::domain::value_objects::Money;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "aggregate", rename_all = "snake_case")]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProductEvent {
    SalesIncremented { item_id: Uuid, quantity: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: String, total_with_shipping: Money },
    PaymentConfirmed { order_id: Uuid, collected: Money, payment_status: PaymentStatus },
    SettlementRequested { order_id: Uuid, amount: Money },
    Settled { order_id: Uuid, amount: Money },
    StatusForced { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    RefundRequested { order_id: Uuid },
    Refunded { order_id: Uuid },
    Cancelled { order_id: Uuid },
    Delivered { order_id: Uuid, status: OrderStatus, proof: String },
}

impl DomainEvent {
    /// NATS subject suffix, e.g. `order.payment_confirmed`.
    pub fn subject(&self) -> String {
        let (aggregate, kind) = match self {
            DomainEvent::Product(ProductEvent::SalesIncremented { .. }) => ("product", "sales_incremented"),
            DomainEvent::Order(e) => ("order", match e {
                OrderEvent::Placed { .. } => "placed",
                OrderEvent::PaymentConfirmed { .. } => "payment_confirmed",
                OrderEvent::SettlementRequested { .. } => "settlement_requested",
                OrderEvent::Settled { .. } => "settled",
                OrderEvent::StatusForced { .. } => "status_forced",
                OrderEvent::RefundRequested { .. } => "refund_requested",
                OrderEvent::Refunded { .. } => "refunded",
                OrderEvent::Cancelled { .. } => "cancelled",
                OrderEvent::Delivered { .. } => "delivered",
            }),
        };
        format!("{aggregate}.{kind}")
    }
}
