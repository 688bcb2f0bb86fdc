//! Pricing resolver for catalog and made-to-order lines.
//!
//! Standard lines are charged the catalog price. Customized lines are priced
//! from the item's cost sheet: plank material, labor days and overhead make up
//! the base cost, and the profit margin is applied on top.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::product::Item;
use crate::domain::value_objects::Money;

/// Frame stock, 3in x 3in x 10ft.
pub const FRAME_PLANK_LENGTH_IN: u32 = 120;
/// Tabletop stock, 2in x 12in x 10ft.
pub const TABLETOP_PLANK_LENGTH_IN: u32 = 120;
pub const TABLETOP_PLANK_WIDTH_IN: u32 = 12;
/// Largest length, width or height the workshop builds, in inches.
pub const MAX_DIMENSION_IN: u32 = 1200;
pub const MAX_LABOR_DAYS: u32 = 365;

/// Buyer-supplied customization, dimensions in inches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomizationInput {
    pub length: Decimal,
    pub width: Decimal,
    pub height: Decimal,
    pub labor_days: Decimal,
    /// Material for the 3x3 legs and frame.
    pub material_name_3x3: String,
    /// Material for the 2x12 tabletop.
    pub material_name_2x12: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dimensions { pub length: Decimal, pub width: Decimal, pub height: Decimal }

/// Per-unit costs resolved from an item's cost sheet and the chosen materials.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CostSheet {
    pub frame_plank_cost: Money,
    pub tabletop_plank_cost: Money,
    pub labor_cost_per_day: Money,
    pub overhead_cost: Money,
    pub profit_margin: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub frame_planks: u32,
    pub tabletop_planks: u32,
    pub frame_material_cost: Money,
    pub tabletop_material_cost: Money,
    pub labor_cost: Money,
    pub overhead_cost: Money,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomQuote {
    /// Base cost before margin.
    pub cost: Money,
    pub price: Money,
    pub breakdown: CostBreakdown,
}

/// Turns dimensions, labor and unit costs into a quote.
pub trait CustomPriceCalculator: Send + Sync {
    fn calculate(&self, dimensions: &Dimensions, labor_days: Decimal, costs: &CostSheet) -> Result<CustomQuote, PricingError>;
}

fn too_large() -> PricingError {
    PricingError::InvalidCustomization("customization is too large to price".into())
}

/// The workshop's plank estimate: four legs plus the apron run in frame stock,
/// tabletop covered by strips of 2x12 laid along the length.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlankEstimator;

impl PlankEstimator {
    fn planks(run: Decimal, plank_length: u32) -> u32 {
        (run / Decimal::from(plank_length)).ceil().try_into().unwrap_or(u32::MAX)
    }
}

impl CustomPriceCalculator for PlankEstimator {
    fn calculate(&self, d: &Dimensions, labor_days: Decimal, costs: &CostSheet) -> Result<CustomQuote, PricingError> {
        let legs = Decimal::from(4).checked_mul(d.height);
        let apron = d.length.checked_add(d.width).and_then(|run| run.checked_mul(Decimal::from(2)));
        let frame_run = legs.zip(apron).and_then(|(legs, apron)| legs.checked_add(apron)).ok_or_else(too_large)?;
        let frame_planks = Self::planks(frame_run, FRAME_PLANK_LENGTH_IN);
        let strips = Self::planks(d.width, TABLETOP_PLANK_WIDTH_IN);
        let tabletop_planks = strips.checked_mul(Self::planks(d.length, TABLETOP_PLANK_LENGTH_IN)).ok_or_else(too_large)?;

        let frame_material_cost = costs.frame_plank_cost.checked_mul(Decimal::from(frame_planks)).ok_or_else(too_large)?;
        let tabletop_material_cost = costs.tabletop_plank_cost.checked_mul(Decimal::from(tabletop_planks)).ok_or_else(too_large)?;
        let labor_cost = costs.labor_cost_per_day.checked_mul(labor_days).ok_or_else(too_large)?;
        let cost = [tabletop_material_cost, labor_cost, costs.overhead_cost].into_iter()
            .try_fold(frame_material_cost, |acc, m| acc.checked_add(m))
            .ok_or_else(too_large)?;
        let price = Decimal::ONE.checked_add(costs.profit_margin)
            .and_then(|markup| cost.checked_mul(markup))
            .ok_or_else(too_large)?;

        Ok(CustomQuote {
            cost,
            price,
            breakdown: CostBreakdown {
                frame_planks, tabletop_planks, frame_material_cost, tabletop_material_cost,
                labor_cost, overhead_cost: costs.overhead_cost,
            },
        })
    }
}

pub struct PricingResolver<C = PlankEstimator> {
    calculator: C,
}

impl Default for PricingResolver<PlankEstimator> {
    fn default() -> Self { Self { calculator: PlankEstimator } }
}

impl<C: CustomPriceCalculator> PricingResolver<C> {
    pub fn new(calculator: C) -> Self { Self { calculator } }

    /// Unit price to charge for one line of `item`.
    pub fn resolve_unit_price(&self, item: &Item, customization: Option<&CustomizationInput>) -> Result<Money, PricingError> {
        match customization {
            None => Ok(item.price()),
            Some(input) => Ok(self.quote(item, input)?.price),
        }
    }

    pub fn quote(&self, item: &Item, input: &CustomizationInput) -> Result<CustomQuote, PricingError> {
        let options = match item.customization_options() {
            Some(options) if item.is_customizable() => options,
            _ => return Err(PricingError::InvalidCustomization(format!("{} is not customizable", item.name()))),
        };
        for (field, value) in [("length", input.length), ("width", input.width), ("height", input.height), ("labor_days", input.labor_days)] {
            if value <= Decimal::ZERO {
                return Err(PricingError::InvalidCustomization(format!("{field} must be positive")));
            }
        }
        for (field, value, max) in [
            ("length", input.length, MAX_DIMENSION_IN), ("width", input.width, MAX_DIMENSION_IN),
            ("height", input.height, MAX_DIMENSION_IN), ("labor_days", input.labor_days, MAX_LABOR_DAYS),
        ] {
            if value > Decimal::from(max) {
                return Err(PricingError::InvalidCustomization(format!("{field} cannot exceed {max}")));
            }
        }
        let frame = options.material(&input.material_name_3x3)
            .ok_or_else(|| PricingError::MaterialNotFound(input.material_name_3x3.clone()))?;
        let top = options.material(&input.material_name_2x12)
            .ok_or_else(|| PricingError::MaterialNotFound(input.material_name_2x12.clone()))?;

        let costs = CostSheet {
            frame_plank_cost: frame.plank_3x3x10_cost,
            tabletop_plank_cost: top.plank_2x12x10_cost,
            labor_cost_per_day: options.labor_cost_per_day,
            overhead_cost: options.overhead_cost,
            profit_margin: options.profit_margin,
        };
        let dimensions = Dimensions { length: input.length, width: input.width, height: input.height };
        self.calculator.calculate(&dimensions, input.labor_days, &costs)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PricingError {
    #[error("invalid customization: {0}")]
    InvalidCustomization(String),
    #[error("material not found: {0}")]
    MaterialNotFound(String),
}
