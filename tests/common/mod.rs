#![allow(dead_code)]

use furnish_commerce::domain::aggregates::{CustomizationOptions, Item, Material};
use furnish_commerce::domain::identity::Caller;
use furnish_commerce::domain::pricing::CustomizationInput;
use furnish_commerce::domain::value_objects::{Money, Quantity, TransactionHash};
use furnish_commerce::domain::aggregates::{DeliveryOption, PaymentType};
use furnish_commerce::events::EventPublisher;
use furnish_commerce::gateway::MockGateway;
use furnish_commerce::repositories::{ItemStore, MemoryStore, OrderStore};
use furnish_commerce::services::{CheckoutLine, CheckoutRequest, LedgerSettings, OrderLedger, Storefront};
use rust_decimal_macros::dec;
use std::sync::Arc;

pub struct World {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<MockGateway>,
    pub ledger: OrderLedger,
    pub storefront: Storefront,
    /// Stock chair, 500.
    pub chair: Item,
    /// Stock lamp, 1000.
    pub lamp: Item,
    /// Made-to-order table; `table_customization()` prices it at 10000.
    pub table: Item,
}

pub fn workshop_options() -> CustomizationOptions {
    CustomizationOptions {
        materials: vec![
            Material { name: "Mahogany".into(), plank_3x3x10_cost: Money::from_major(700), plank_2x12x10_cost: Money::from_major(1800) },
            Material { name: "Narra".into(), plank_3x3x10_cost: Money::from_major(900), plank_2x12x10_cost: Money::from_major(2400) },
        ],
        labor_cost_per_day: Money::from_major(600),
        profit_margin: dec!(0.25),
        overhead_cost: Money::from_major(500),
    }
}

/// 60x24x30 in Mahogany over three days: 3 frame planks, 2 top planks,
/// base cost 8000 and price 10000.
pub fn table_customization() -> CustomizationInput {
    CustomizationInput {
        length: dec!(60),
        width: dec!(24),
        height: dec!(30),
        labor_days: dec!(3),
        material_name_3x3: "Mahogany".into(),
        material_name_2x12: "Mahogany".into(),
    }
}

pub async fn world() -> World {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(MockGateway::new());
    let chair = Item::create("Chair", Money::from_major(500), Money::from_major(200)).with_stocks(20);
    let lamp = Item::create("Floor Lamp", Money::from_major(1000), Money::from_major(450)).with_stocks(10);
    let table = Item::create("Dining Table", Money::from_major(9000), Money::from_major(6000))
        .make_customizable(workshop_options())
        .unwrap();
    for item in [&chair, &lamp, &table] {
        store.insert_item(item).await.unwrap();
    }
    let ledger = OrderLedger::new(
        store.clone(), store.clone(), store.clone(), gateway.clone(),
        EventPublisher::disabled(), LedgerSettings::default(),
    );
    let storefront = Storefront::new(store.clone(), store.clone());
    World { store, gateway, ledger, storefront, chair, lamp, table }
}

pub fn stock_line(item: &Item, qty: u32) -> CheckoutLine {
    CheckoutLine { item_id: item.id(), quantity: Quantity::new(qty).unwrap(), customization: None }
}

pub fn custom_line(item: &Item) -> CheckoutLine {
    CheckoutLine { item_id: item.id(), quantity: Quantity::new(1).unwrap(), customization: Some(table_customization()) }
}

pub fn checkout_request(caller: &Caller, counter: u64, lines: Vec<CheckoutLine>, shipping: i64, payment_type: PaymentType) -> CheckoutRequest {
    CheckoutRequest {
        transaction_hash: Some(TransactionHash::for_user(&caller.user_id, counter)),
        lines,
        shipping_fee: Money::from_major(shipping),
        delivery_option: DeliveryOption::Shipping,
        payment_type,
        paid_amount: None,
    }
}

impl World {
    pub async fn session_of(&self, order_id: uuid::Uuid) -> String {
        self.store.find_order_by_id(order_id).await.unwrap().unwrap().gateway_session_id().to_string()
    }
}
