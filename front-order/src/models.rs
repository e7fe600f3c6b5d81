use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use front_catalog::{DiscountType, PricingEngine, ServiceKind};
use front_core::{EntityId, PaymentItemAdditionalData, ValidationError, Version};

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Bill,
    Closed,
    Deleted,
}

/// Payment item status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentItemStatus {
    /// Added, money not taken yet
    New,
    /// Processed by a payment system or by closing the order
    Processed,
    /// Converted into a prepayment; cannot be undone
    Prepaid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Guest {
    pub id: EntityId,
    pub name: String,
}

/// A product line on the order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderItem {
    pub id: EntityId,
    pub product_name: String,
    pub price: i64,
    pub amount: u32,
}

impl OrderItem {
    /// `None` when the line total leaves the amount range
    pub fn cost(&self) -> Option<i64> {
        self.price.checked_mul(i64::from(self.amount))
    }
}

/// Money attached to an order: a payment, a prepayment or a donation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentItem {
    pub id: EntityId,
    pub order_id: EntityId,
    pub payment_type_id: EntityId,
    /// Minor currency units
    pub amount: i64,
    pub status: PaymentItemStatus,
    pub is_preliminary: bool,
    pub is_external: bool,
    pub is_fiscalized_externally: bool,
    pub is_donation: bool,
    pub donation_type_id: Option<EntityId>,
    pub additional_data: Option<PaymentItemAdditionalData>,
    pub created_at: DateTime<Utc>,
}

impl PaymentItem {
    pub fn new(order_id: EntityId, payment_type_id: EntityId, amount: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            payment_type_id,
            amount,
            status: PaymentItemStatus::New,
            is_preliminary: false,
            is_external: false,
            is_fiscalized_externally: false,
            is_donation: false,
            donation_type_id: None,
            additional_data: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_prepaid(&self) -> bool {
        self.status == PaymentItemStatus::Prepaid
    }
}

/// A discount applied to an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscountItem {
    pub id: EntityId,
    pub discount_type: DiscountType,
    pub created_at: DateTime<Utc>,
}

/// The aggregate the store versions and locks. Guests, items, payments,
/// donations and discounts change only through their order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Order {
    pub id: EntityId,
    /// 0 until committed
    pub version: Version,
    pub number: u32,
    pub kind: ServiceKind,
    pub status: OrderStatus,
    pub table: Option<String>,
    pub delivery_address: Option<String>,
    pub guests: Vec<Guest>,
    pub items: Vec<OrderItem>,
    pub payments: Vec<PaymentItem>,
    pub donations: Vec<PaymentItem>,
    pub discounts: Vec<DiscountItem>,
    pub result_sum: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(kind: ServiceKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            version: 0,
            number: 0,
            kind,
            status: OrderStatus::New,
            table: None,
            delivery_address: None,
            guests: Vec::new(),
            items: Vec::new(),
            payments: Vec::new(),
            donations: Vec::new(),
            discounts: Vec::new(),
            result_sum: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_delivery(&self) -> bool {
        self.kind == ServiceKind::Delivery
    }

    pub fn subtotal(&self) -> Option<i64> {
        self.items.iter().try_fold(0i64, |sum, item| sum.checked_add(item.cost()?))
    }

    /// Recompute `result_sum` after items or discounts changed
    pub fn recalculate(&mut self) -> Result<(), ValidationError> {
        let subtotal = self.subtotal().ok_or(ValidationError::SumOutOfRange(self.id))?;
        self.result_sum = PricingEngine::result_sum(
            subtotal,
            self.discounts.iter().map(|d| &d.discount_type),
        );
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Sum of payments (donations excluded)
    pub fn paid_sum(&self) -> i64 {
        self.payments.iter().map(|p| p.amount).fold(0, i64::saturating_add)
    }

    pub fn payment(&self, id: &EntityId) -> Option<&PaymentItem> {
        self.payments.iter().find(|p| p.id == *id)
    }

    pub fn payment_mut(&mut self, id: &EntityId) -> Option<&mut PaymentItem> {
        self.payments.iter_mut().find(|p| p.id == *id)
    }

    pub fn donation(&self, id: &EntityId) -> Option<&PaymentItem> {
        self.donations.iter().find(|p| p.id == *id)
    }

    /// Payment or donation with this id
    pub fn any_payment(&self, id: &EntityId) -> Option<&PaymentItem> {
        self.payment(id).or_else(|| self.donation(id))
    }
}

/// The restaurant's working shift; payments need it open
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CafeSession {
    pub id: EntityId,
    pub version: Version,
    pub number: u32,
    pub is_open: bool,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub opened_by: Option<EntityId>,
}

impl CafeSession {
    pub fn closed() -> Self {
        Self {
            id: Uuid::new_v4(),
            version: 1,
            number: 0,
            is_open: false,
            opened_at: None,
            closed_at: None,
            opened_by: None,
        }
    }
}
