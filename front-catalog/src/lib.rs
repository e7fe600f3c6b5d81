pub mod payment_type;
pub mod discount;
pub mod donation;

use serde::{Deserialize, Serialize};
use front_core::{EntityId, OperationResult, ValidationError};

pub use payment_type::{PaymentType, PaymentTypeKind};
pub use discount::{DiscountType, PricingEngine};
pub use donation::DonationType;

/// How an order is served; some discounts, donations and preliminary payments depend on it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceKind {
    DineIn,
    Delivery,
}

/// Reference data the store validates staged operations against
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub payment_types: Vec<PaymentType>,
    pub discount_types: Vec<DiscountType>,
    pub donation_types: Vec<DonationType>,
}

impl Catalog {
    /// Active payment type by id
    pub fn payment_type(&self, id: &EntityId) -> OperationResult<&PaymentType> {
        let payment_type = self.payment_types.iter()
            .find(|pt| pt.id == *id)
            .ok_or(ValidationError::UnknownPaymentType(*id))?;

        if !payment_type.is_active {
            return Err(ValidationError::PaymentTypeInactive(payment_type.name.clone()).into());
        }

        Ok(payment_type)
    }

    pub fn discount_type(&self, id: &EntityId) -> OperationResult<&DiscountType> {
        self.discount_types.iter()
            .find(|dt| dt.id == *id)
            .ok_or_else(|| ValidationError::UnknownDiscountType(*id).into())
    }

    pub fn donation_type(&self, id: &EntityId) -> Option<&DonationType> {
        self.donation_types.iter().find(|dt| dt.id == *id)
    }

    pub fn active_payment_types(&self) -> impl Iterator<Item = &PaymentType> {
        self.payment_types.iter().filter(|pt| pt.is_active)
    }

    pub fn payment_types_to_pay_out_on_user(&self) -> impl Iterator<Item = &PaymentType> {
        self.active_payment_types().filter(|pt| pt.can_pay_out_on_user)
    }

    pub fn donation_types_compatible_with(&self, kind: ServiceKind) -> impl Iterator<Item = &DonationType> {
        self.donation_types.iter().filter(move |dt| dt.is_compatible_with(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use front_core::OperationError;

    fn catalog() -> Catalog {
        let cash = PaymentType::new("Cash", PaymentTypeKind::Cash).pay_out_on_user();
        let mut retired = PaymentType::new("Old voucher", PaymentTypeKind::External);
        retired.is_active = false;
        let mut tips = DonationType::new("Tips", vec![cash.id]);
        tips.service_kinds = vec![ServiceKind::DineIn];

        Catalog {
            payment_types: vec![cash, retired, PaymentType::new("Visa", PaymentTypeKind::Card)],
            discount_types: vec![DiscountType::new("Cash -5%", 5)],
            donation_types: vec![tips],
        }
    }

    #[test]
    fn test_payment_type_lookup() {
        let catalog = catalog();
        let cash_id = catalog.payment_types[0].id;
        assert_eq!(catalog.payment_type(&cash_id).unwrap().name, "Cash");

        let retired_id = catalog.payment_types[1].id;
        assert!(matches!(
            catalog.payment_type(&retired_id),
            Err(OperationError::Validation(ValidationError::PaymentTypeInactive(_)))
        ));

        let unknown = uuid::Uuid::new_v4();
        assert!(matches!(
            catalog.payment_type(&unknown),
            Err(OperationError::Validation(ValidationError::UnknownPaymentType(_)))
        ));
    }

    #[test]
    fn test_filtered_views() {
        let catalog = catalog();
        assert_eq!(catalog.active_payment_types().count(), 2);
        assert_eq!(catalog.payment_types_to_pay_out_on_user().count(), 1);
        assert_eq!(catalog.donation_types_compatible_with(ServiceKind::DineIn).count(), 1);
        assert_eq!(catalog.donation_types_compatible_with(ServiceKind::Delivery).count(), 0);
    }
}
