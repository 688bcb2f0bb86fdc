//! Wire schemas for the HTTP API, validated at the boundary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};
use crate::domain::aggregates::{CustomizationOptions, DeliveryOption, Order, OrderStatus, PaymentType};
use crate::domain::pricing::{CustomizationInput, MAX_DIMENSION_IN, MAX_LABOR_DAYS};
use crate::domain::value_objects::{Money, Quantity, TransactionHash};
use crate::services::{CheckoutLine, CheckoutRequest, NewItem};
use crate::LedgerError;

fn non_negative(value: &Money) -> Result<(), ValidationError> {
    if *value < Money::ZERO { return Err(ValidationError::new("negative_amount")); }
    Ok(())
}

fn within(value: &Decimal, max: u32) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO || *value > Decimal::from(max) {
        return Err(ValidationError::new("out_of_range"));
    }
    Ok(())
}

fn bounded_dimension(value: &Decimal) -> Result<(), ValidationError> { within(value, MAX_DIMENSION_IN) }

fn bounded_labor_days(value: &Decimal) -> Result<(), ValidationError> { within(value, MAX_LABOR_DAYS) }

fn quantity(raw: u32) -> Result<Quantity, LedgerError> {
    Quantity::new(raw).map_err(|e| LedgerError::Validation(e.to_string()))
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CustomizationDto {
    #[validate(custom = "bounded_dimension")]
    pub custom_length: Decimal,
    #[validate(custom = "bounded_dimension")]
    pub custom_width: Decimal,
    #[validate(custom = "bounded_dimension")]
    pub custom_height: Decimal,
    #[validate(custom = "bounded_labor_days")]
    pub labor_days: Decimal,
    #[validate(length(min = 1, max = 100))]
    pub legs_frame_material: String,
    #[validate(length(min = 1, max = 100))]
    pub tabletop_material: String,
}

impl From<CustomizationDto> for CustomizationInput {
    fn from(dto: CustomizationDto) -> Self {
        Self {
            length: dto.custom_length,
            width: dto.custom_width,
            height: dto.custom_height,
            labor_days: dto.labor_days,
            material_name_3x3: dto.legs_frame_material,
            material_name_2x12: dto.tabletop_material,
        }
    }
}

fn customization(dto: Option<CustomizationDto>) -> Result<Option<CustomizationInput>, LedgerError> {
    match dto {
        None => Ok(None),
        Some(dto) => {
            dto.validate().map_err(|e| LedgerError::Validation(e.to_string()))?;
            Ok(Some(dto.into()))
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateItemRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: Option<String>,
    #[validate(custom = "non_negative")]
    pub price: Money,
    #[validate(custom = "non_negative")]
    pub cost: Money,
    #[serde(default)]
    pub stocks: u32,
    pub customization_options: Option<CustomizationOptions>,
}

impl From<CreateItemRequest> for NewItem {
    fn from(r: CreateItemRequest) -> Self {
        Self {
            name: r.name,
            description: r.description,
            category: r.category,
            price: r.price,
            cost: r.cost,
            stocks: r.stocks,
            customization_options: r.customization_options,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartRequest {
    pub item_id: Uuid,
    #[validate(range(min = 1, max = 999))]
    pub quantity: u32,
    pub customization: Option<CustomizationDto>,
}

impl AddToCartRequest {
    pub fn into_parts(self) -> Result<(Uuid, Quantity, Option<CustomizationInput>), LedgerError> {
        Ok((self.item_id, quantity(self.quantity)?, customization(self.customization)?))
    }
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CheckoutItemDto {
    pub item_id: Uuid,
    #[validate(range(min = 1, max = 999))]
    pub quantity: u32,
    pub customization: Option<CustomizationDto>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequestDto {
    #[validate(length(min = 1, max = 128))]
    pub transaction_hash: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub items: Vec<CheckoutItemDto>,
    #[serde(default)]
    #[validate(custom = "non_negative")]
    pub shipping_fee: Money,
    pub delivery_option: DeliveryOption,
    pub payment_type: PaymentType,
    #[validate(custom = "non_negative")]
    pub paid_amount: Option<Money>,
}

impl TryFrom<CheckoutRequestDto> for CheckoutRequest {
    type Error = LedgerError;

    fn try_from(dto: CheckoutRequestDto) -> Result<Self, Self::Error> {
        let lines = dto.items.into_iter().map(|item| {
            item.validate().map_err(|e| LedgerError::Validation(e.to_string()))?;
            Ok(CheckoutLine {
                item_id: item.item_id,
                quantity: quantity(item.quantity)?,
                customization: customization(item.customization)?,
            })
        }).collect::<Result<Vec<_>, LedgerError>>()?;
        let transaction_hash = dto.transaction_hash
            .map(TransactionHash::new)
            .transpose()
            .map_err(|e| LedgerError::Validation(e.to_string()))?;
        Ok(Self {
            transaction_hash,
            lines,
            shipping_fee: dto.shipping_fee,
            delivery_option: dto.delivery_option,
            payment_type: dto.payment_type,
            paid_amount: dto.paid_amount,
        })
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CompletePaymentRequest {
    #[validate(length(min = 1, max = 128))]
    pub transaction_hash: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStatusRequest {
    #[validate(length(min = 1, max = 40))]
    pub status: String,
}

impl UpdateStatusRequest {
    pub fn status(&self) -> Result<OrderStatus, LedgerError> {
        OrderStatus::parse(&self.status).ok_or_else(|| LedgerError::Validation(format!("unknown order status '{}'", self.status)))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct DeliveryProofRequest {
    #[validate(url)]
    pub proof_url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<String>,
}

impl OrderListQuery {
    pub fn status(&self) -> Result<Option<OrderStatus>, LedgerError> {
        match self.status.as_deref().map(str::trim).filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all")) {
            None => Ok(None),
            Some(raw) => OrderStatus::parse(raw).map(Some)
                .ok_or_else(|| LedgerError::Validation(format!("unknown order status '{raw}'"))),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderList {
    pub data: Vec<Order>,
    pub total: usize,
}

impl From<Vec<Order>> for OrderList {
    fn from(data: Vec<Order>) -> Self { Self { total: data.len(), data } }
}
