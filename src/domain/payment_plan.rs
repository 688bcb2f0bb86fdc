//! Payment plan for mixed carts.
//!
//! Made-to-order lines take a 30% down payment; stock lines are always paid
//! in full up front.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::order::OrderLine;
use crate::domain::value_objects::Money;

/// Share of the customized subtotal collected up front.
pub const DOWN_PAYMENT_RATE: Decimal = Decimal::from_parts(30, 0, 0, false, 2);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPlan {
    pub customized_total: Money,
    pub normal_total: Money,
    pub full_amount: Money,
    pub down_payment_amount: Money,
    pub remaining_balance: Money,
}

impl PaymentPlan {
    pub fn has_customized_lines(&self) -> bool { self.customized_total.is_positive() }
}

pub fn compute_plan(lines: &[OrderLine]) -> PaymentPlan {
    let (customized, normal): (Vec<&OrderLine>, Vec<&OrderLine>) = lines.iter().partition(|l| l.is_customizable);
    let customized_total: Money = customized.iter().map(|l| l.line_total()).sum();
    let normal_total: Money = normal.iter().map(|l| l.line_total()).sum();

    // Remaining balance is derived by subtraction so the two halves always
    // add back up to the customized subtotal after rounding.
    let custom_down = customized_total.portion(DOWN_PAYMENT_RATE);
    let remaining_balance = customized_total - custom_down;

    PaymentPlan {
        customized_total,
        normal_total,
        full_amount: customized_total + normal_total,
        down_payment_amount: custom_down + normal_total,
        remaining_balance,
    }
}
