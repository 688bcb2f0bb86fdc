//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{CustomizationOptions, Item, Material, ProductError};
pub use order::{
    Confirmation, DeliveryOption, NewOrder, Order, OrderError, OrderLine, OrderStatus, PaymentStatus,
    PaymentType, PendingSettlement, SettlementStart,
};
pub use cart::{Cart, CartError, CartLine};
