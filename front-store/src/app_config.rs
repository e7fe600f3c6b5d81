use serde::Deserialize;
use std::env;

use front_catalog::{Catalog, DiscountType, DonationType, PaymentType, PaymentTypeKind, ServiceKind};
use front_core::{User, UserDirectory};
use front_order::{Order, OrderStatus};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreSettings,
    pub plugin: PluginSettings,
    pub seed: SeedConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    /// Continuous operations open longer than this are logged as slow
    pub scope_warn_after_ms: u64,
    #[serde(default)]
    pub cafe_session_open: bool,
    pub currency: String,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize { 256 }

#[derive(Debug, Deserialize, Clone)]
pub struct PluginSettings {
    /// User the plugin's own credentials are issued for
    pub user_name: String,
    /// PIN of a user with an open personal session, used for remote payments
    pub pay_pin: String,
    pub card_number: String,
    pub card_payment_type: String,
    pub credit_payment_type_prefix: String,
    pub counteragent_prefix: String,
    pub external_payment_type: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SeedConfig {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub discount_types: Vec<SeedDiscountType>,
    #[serde(default)]
    pub payment_types: Vec<SeedPaymentType>,
    #[serde(default)]
    pub donation_types: Vec<SeedDonationType>,
    #[serde(default)]
    pub orders: Vec<SeedOrder>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedUser {
    pub name: String,
    pub pin: String,
    #[serde(default)]
    pub has_personal_session: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedDiscountType {
    pub name: String,
    pub percent: u8,
    #[serde(default = "default_true")]
    pub applies_to_dine_in: bool,
    #[serde(default = "default_true")]
    pub applies_to_delivery: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedPaymentType {
    pub name: String,
    pub kind: PaymentTypeKind,
    #[serde(default)]
    pub can_be_external_processed: bool,
    #[serde(default)]
    pub can_pay_out_on_user: bool,
    /// Name of a seeded discount type
    pub discount: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedDonationType {
    pub name: String,
    /// Names of seeded payment types
    pub payment_types: Vec<String>,
    #[serde(default = "all_service_kinds")]
    pub service_kinds: Vec<ServiceKind>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedOrder {
    pub kind: ServiceKind,
    pub table: Option<String>,
    pub delivery_address: Option<String>,
    #[serde(default = "default_status")]
    pub status: OrderStatus,
    #[serde(default)]
    pub items: Vec<SeedOrderItem>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedOrderItem {
    pub product: String,
    pub price: i64,
    pub amount: u32,
}

fn default_true() -> bool { true }

fn default_status() -> OrderStatus { OrderStatus::New }

fn all_service_kinds() -> Vec<ServiceKind> {
    vec![ServiceKind::DineIn, ServiceKind::Delivery]
}

/// Reference data and orders the store starts with
pub struct Seed {
    pub users: UserDirectory,
    pub catalog: Catalog,
    pub orders: Vec<Order>,
}

impl SeedConfig {
    /// Resolve name references between seed entries
    pub fn build(&self) -> Result<Seed, config::ConfigError> {
        let users = self.users.iter()
            .map(|u| User::new(&u.name, &u.pin, u.has_personal_session))
            .collect();

        let discount_types: Vec<DiscountType> = self.discount_types.iter()
            .map(|d| {
                let mut discount = DiscountType::new(&d.name, d.percent);
                discount.applies_to_dine_in = d.applies_to_dine_in;
                discount.applies_to_delivery = d.applies_to_delivery;
                discount
            })
            .collect();

        let mut payment_types = Vec::with_capacity(self.payment_types.len());
        for p in &self.payment_types {
            let mut payment_type = PaymentType::new(&p.name, p.kind);
            payment_type.can_be_external_processed = p.can_be_external_processed;
            payment_type.can_pay_out_on_user = p.can_pay_out_on_user;
            if let Some(discount) = &p.discount {
                let discount = discount_types.iter()
                    .find(|d| d.name == *discount)
                    .ok_or_else(|| unresolved("discount type", discount, &p.name))?;
                payment_type = payment_type.with_discount(discount.id);
            }
            payment_types.push(payment_type);
        }

        let mut donation_types = Vec::with_capacity(self.donation_types.len());
        for d in &self.donation_types {
            let ids = d.payment_types.iter()
                .map(|name| {
                    payment_types.iter()
                        .find(|pt: &&PaymentType| pt.name == *name)
                        .map(|pt| pt.id)
                        .ok_or_else(|| unresolved("payment type", name, &d.name))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let mut donation = DonationType::new(&d.name, ids);
            donation.service_kinds = d.service_kinds.clone();
            donation_types.push(donation);
        }

        let orders = self.orders.iter()
            .map(|o| -> Result<Order, config::ConfigError> {
                let mut order = Order::new(o.kind);
                order.table = o.table.clone();
                order.delivery_address = o.delivery_address.clone();
                order.status = o.status;
                for item in &o.items {
                    order.items.push(front_order::OrderItem {
                        id: uuid::Uuid::new_v4(),
                        product_name: item.product.clone(),
                        price: item.price,
                        amount: item.amount,
                    });
                }
                order.recalculate()
                    .map_err(|e| config::ConfigError::Message(format!("seed order: {}", e)))?;
                Ok(order)
            })
            .collect::<Result<Vec<_>, config::ConfigError>>()?;

        Ok(Seed {
            users: UserDirectory::new(users),
            catalog: Catalog { payment_types, discount_types, donation_types },
            orders,
        })
    }
}

fn unresolved(what: &str, name: &str, owner: &str) -> config::ConfigError {
    config::ConfigError::Message(format!("seed entry {} references unknown {} {}", owner, what, name))
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `FRONT__STORE__CAFE_SESSION_OPEN=true`
            .add_source(config::Environment::with_prefix("FRONT").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

impl Default for Config {
    /// The demo restaurant the sample plugin is written against
    fn default() -> Self {
        let user = |name: &str, pin: &str, has_personal_session| SeedUser {
            name: name.to_string(),
            pin: pin.to_string(),
            has_personal_session,
        };
        let payment_type = |name: &str, kind, external, pay_out, discount: Option<&str>| SeedPaymentType {
            name: name.to_string(),
            kind,
            can_be_external_processed: external,
            can_pay_out_on_user: pay_out,
            discount: discount.map(str::to_string),
        };
        let item = |product: &str, price, amount| SeedOrderItem {
            product: product.to_string(),
            price,
            amount,
        };

        Self {
            store: StoreSettings {
                scope_warn_after_ms: 500,
                cafe_session_open: true,
                currency: "RUB".to_string(),
                event_capacity: default_event_capacity(),
            },
            plugin: PluginSettings {
                user_name: "Plugin".to_string(),
                pay_pin: "777".to_string(),
                card_number: "123456".to_string(),
                card_payment_type: "VISA".to_string(),
                credit_payment_type_prefix: "БЕЗН".to_string(),
                counteragent_prefix: "BBB".to_string(),
                external_payment_type: "SampleApiPayment".to_string(),
            },
            seed: SeedConfig {
                users: vec![
                    user("Plugin", "000", false),
                    user("Cashier", "777", true),
                    user("BBB Catering", "555", false),
                ],
                discount_types: vec![SeedDiscountType {
                    name: "Cash -5%".to_string(),
                    percent: 5,
                    applies_to_dine_in: true,
                    applies_to_delivery: true,
                }],
                payment_types: vec![
                    payment_type("Cash", PaymentTypeKind::Cash, true, true, Some("Cash -5%")),
                    payment_type("VISA", PaymentTypeKind::Card, true, true, None),
                    payment_type("Безналичный расчет", PaymentTypeKind::Credit, false, false, None),
                    payment_type("SampleApiPayment", PaymentTypeKind::External, true, false, None),
                ],
                donation_types: vec![SeedDonationType {
                    name: "Tips".to_string(),
                    payment_types: vec!["Cash".to_string(), "VISA".to_string(), "SampleApiPayment".to_string()],
                    service_kinds: all_service_kinds(),
                }],
                orders: vec![
                    SeedOrder {
                        kind: ServiceKind::DineIn,
                        table: Some("1".to_string()),
                        delivery_address: None,
                        status: OrderStatus::Closed,
                        items: vec![item("Espresso", 15000, 2)],
                    },
                    SeedOrder {
                        kind: ServiceKind::DineIn,
                        table: Some("2".to_string()),
                        delivery_address: None,
                        status: OrderStatus::New,
                        items: vec![item("Borscht", 45000, 2), item("Black tea", 9000, 1)],
                    },
                    SeedOrder {
                        kind: ServiceKind::Delivery,
                        table: None,
                        delivery_address: Some("Lenina 1, apt. 5".to_string()),
                        status: OrderStatus::New,
                        items: vec![item("Pizza Margherita", 60000, 1), item("Lemonade", 12000, 2)],
                    },
                ],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_seed_resolves() {
        let seed = Config::default().seed.build().unwrap();

        let cash = seed.catalog.payment_types.iter().find(|pt| pt.is_named("cash")).unwrap();
        assert!(cash.discount_type_id.is_some());
        assert_eq!(seed.catalog.donation_types[0].payment_type_ids.len(), 3);
        assert!(seed.users.authenticate_by_pin("777").unwrap().has_personal_session);
        assert_eq!(seed.orders.len(), 3);
        assert_eq!(seed.orders[1].result_sum, 99000);
    }

    #[test]
    fn test_unknown_reference_is_rejected() {
        let mut seed = Config::default().seed;
        seed.payment_types[0].discount = Some("Happy hour".to_string());

        let err = seed.build().err().unwrap();
        assert!(err.to_string().contains("Happy hour"));
    }
}
