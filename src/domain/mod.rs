//! Domain layer: aggregates, value objects and the pricing rules.
pub mod aggregates;
pub mod events;
pub mod identity;
pub mod payment_plan;
pub mod pricing;
pub mod value_objects;
