//! Catalog and cart operations.

use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use crate::domain::aggregates::{Cart, CartLine, CustomizationOptions, Item};
use crate::domain::identity::Caller;
use crate::domain::pricing::{CustomQuote, CustomizationInput, PricingResolver};
use crate::domain::value_objects::{Money, Quantity};
use crate::repositories::{CartStore, ItemStore};
use crate::{LedgerError, Result};

#[derive(Clone, Debug)]
pub struct NewItem {
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    pub price: Money,
    pub cost: Money,
    pub stocks: u32,
    pub customization_options: Option<CustomizationOptions>,
}

#[derive(Clone)]
pub struct Storefront {
    items: Arc<dyn ItemStore>,
    carts: Arc<dyn CartStore>,
    resolver: Arc<PricingResolver>,
}

impl Storefront {
    pub fn new(items: Arc<dyn ItemStore>, carts: Arc<dyn CartStore>) -> Self {
        Self { items, carts, resolver: Arc::new(PricingResolver::default()) }
    }

    pub async fn list_items(&self) -> Result<Vec<Item>> { Ok(self.items.list_items().await?) }

    pub async fn item(&self, id: Uuid) -> Result<Item> {
        self.items.find_item(id).await?.ok_or_else(|| LedgerError::NotFound(format!("item {id}")))
    }

    #[instrument(skip(self, new), fields(user_id = %caller.user_id, name = %new.name))]
    pub async fn create_item(&self, caller: &Caller, new: NewItem) -> Result<Item> {
        if !caller.is_admin() { return Err(LedgerError::Unauthorized("admin role required".into())); }
        if new.name.trim().is_empty() { return Err(LedgerError::Validation("item name is required".into())); }
        if new.price < Money::ZERO || new.cost < Money::ZERO {
            return Err(LedgerError::Validation("price and cost cannot be negative".into()));
        }
        let mut item = Item::create(new.name.trim(), new.price, new.cost)
            .with_description(new.description)
            .with_stocks(new.stocks);
        if let Some(category) = new.category { item = item.with_category(category); }
        if let Some(options) = new.customization_options { item = item.make_customizable(options)?; }
        self.items.insert_item(&item).await?;
        info!(item_id = %item.id(), customizable = item.is_customizable(), "item created");
        Ok(item)
    }

    pub async fn quote(&self, item_id: Uuid, input: &CustomizationInput) -> Result<CustomQuote> {
        let item = self.item(item_id).await?;
        Ok(self.resolver.quote(&item, input)?)
    }

    pub async fn cart(&self, caller: &Caller) -> Result<Cart> { Ok(self.carts.load_cart(&caller.user_id).await?) }

    /// Adds a line priced as of now. Identical configurations merge.
    #[instrument(skip(self, customization), fields(user_id = %caller.user_id))]
    pub async fn add_to_cart(&self, caller: &Caller, item_id: Uuid, quantity: Quantity, customization: Option<CustomizationInput>) -> Result<Cart> {
        let item = self.item(item_id).await?;
        let unit_price = self.resolver.resolve_unit_price(&item, customization.as_ref())?;
        let mut cart = self.carts.load_cart(&caller.user_id).await?;
        let line_id = cart.add_line(CartLine {
            line_id: Uuid::nil(),
            item_id,
            name: item.name().to_string(),
            quantity,
            unit_price,
            is_customizable: item.is_customizable(),
            customization,
        });
        self.carts.save_cart(&cart).await?;
        info!(%line_id, %unit_price, "cart line added");
        Ok(cart)
    }

    pub async fn remove_from_cart(&self, caller: &Caller, line_id: Uuid) -> Result<Cart> {
        let mut cart = self.carts.load_cart(&caller.user_id).await?;
        cart.remove_line(line_id)?;
        self.carts.save_cart(&cart).await?;
        Ok(cart)
    }
}
