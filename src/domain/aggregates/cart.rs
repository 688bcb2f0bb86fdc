//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::order::OrderLine;
use crate::domain::pricing::CustomizationInput;
use crate::domain::value_objects::{Money, Quantity};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cart {
    user_id: String,
    lines: Vec<CartLine>,
    updated_at: DateTime<Utc>,
}

/// A cart line; custom lines carry the price quoted when they were added.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub line_id: Uuid,
    pub item_id: Uuid,
    pub name: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub is_customizable: bool,
    pub customization: Option<CustomizationInput>,
}

impl CartLine {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
    fn same_configuration(&self, item_id: Uuid, customization: Option<&CustomizationInput>) -> bool {
        self.item_id == item_id && self.customization.as_ref() == customization
    }
}

impl Cart {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), lines: vec![], updated_at: Utc::now() }
    }

    pub fn user_id(&self) -> &str { &self.user_id }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn subtotal(&self) -> Money { self.lines.iter().map(CartLine::line_total).sum() }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Adds a line, merging into an existing one with identical configuration.
    /// Returns the id of the line holding the units.
    pub fn add_line(&mut self, mut line: CartLine) -> Uuid {
        let id = match self.lines.iter_mut().find(|l| l.same_configuration(line.item_id, line.customization.as_ref())) {
            Some(existing) => {
                existing.quantity = existing.quantity.add(line.quantity);
                existing.unit_price = line.unit_price;
                existing.line_id
            }
            None => {
                if line.line_id.is_nil() { line.line_id = Uuid::now_v7(); }
                let id = line.line_id;
                self.lines.push(line);
                id
            }
        };
        self.touch();
        id
    }

    pub fn remove_line(&mut self, line_id: Uuid) -> Result<(), CartError> {
        let before = self.lines.len();
        self.lines.retain(|l| l.line_id != line_id);
        if self.lines.len() == before { return Err(CartError::LineNotFound); }
        self.touch();
        Ok(())
    }

    /// Drops the lines an order has paid for. Returns how many were removed.
    pub fn remove_purchased(&mut self, purchased: &[OrderLine]) -> usize {
        let before = self.lines.len();
        self.lines.retain(|l| !purchased.iter().any(|p| l.same_configuration(p.item_id, p.customization.as_ref())));
        let removed = before - self.lines.len();
        if removed > 0 { self.touch(); }
        removed
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CartError {
    #[error("cart line not found")]
    LineNotFound,
}
