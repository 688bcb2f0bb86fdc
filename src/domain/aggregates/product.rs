//! Catalog Item Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Money, Quantity};
use crate::domain::events::{DomainEvent, ProductEvent};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Item {
    id: Uuid,
    name: String,
    description: String,
    category: Option<String>,
    price: Money,
    cost: Money,
    is_customizable: bool,
    customization_options: Option<CustomizationOptions>,
    stocks: u32,
    sales: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Cost sheet for made-to-order pieces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomizationOptions {
    pub materials: Vec<Material>,
    pub labor_cost_per_day: Money,
    /// Fractional margin, `0.25` meaning 25%.
    pub profit_margin: Decimal,
    pub overhead_cost: Money,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    /// Cost of one 3x3x10 plank (legs and frame stock).
    pub plank_3x3x10_cost: Money,
    /// Cost of one 2x12x10 plank (tabletop stock).
    pub plank_2x12x10_cost: Money,
}

impl CustomizationOptions {
    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.name.eq_ignore_ascii_case(name.trim()))
    }
}

impl Item {
    pub fn create(name: impl Into<String>, price: Money, cost: Money) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), name: name.into(), description: String::new(), category: None,
            price, cost, is_customizable: false, customization_options: None,
            stocks: 0, sales: 0, created_at: now, updated_at: now, events: vec![],
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self { self.description = description.into(); self }
    pub fn with_category(mut self, category: impl Into<String>) -> Self { self.category = Some(category.into()); self }
    pub fn with_stocks(mut self, stocks: u32) -> Self { self.stocks = stocks; self }

    /// Marks the item as made-to-order, priced from the given cost sheet.
    pub fn make_customizable(mut self, options: CustomizationOptions) -> Result<Self, ProductError> {
        if options.materials.is_empty() { return Err(ProductError::NoMaterials); }
        if options.profit_margin < Decimal::ZERO { return Err(ProductError::NegativeMargin); }
        self.is_customizable = true;
        self.customization_options = Some(options);
        Ok(self)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn description(&self) -> &str { &self.description }
    pub fn category(&self) -> Option<&str> { self.category.as_deref() }
    pub fn price(&self) -> Money { self.price }
    pub fn cost(&self) -> Money { self.cost }
    pub fn is_customizable(&self) -> bool { self.is_customizable }
    pub fn customization_options(&self) -> Option<&CustomizationOptions> { self.customization_options.as_ref() }
    pub fn stocks(&self) -> u32 { self.stocks }
    pub fn sales(&self) -> u64 { self.sales }

    pub fn record_sale(&mut self, qty: Quantity) {
        self.sales = self.sales.saturating_add(u64::from(qty.value()));
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::SalesIncremented { item_id: self.id, quantity: qty.value() }));
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone)] pub enum ProductError { NoMaterials, NegativeMargin }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoMaterials => write!(f, "customizable item needs at least one material"),
            Self::NegativeMargin => write!(f, "profit margin cannot be negative"),
        }
    }
}
