use serde::{Deserialize, Serialize};
use uuid::Uuid;
use front_core::{EntityId, PaymentItemAdditionalData, ValidationError};

/// Payment type kinds known to the host
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentTypeKind {
    Cash,
    Card,
    Credit,
    /// Handled by a plugin payment system
    External,
}

impl PaymentTypeKind {
    /// Check the kind-specific data a payment item of this kind may carry
    pub fn check_additional_data(&self, data: Option<&PaymentItemAdditionalData>) -> Result<(), ValidationError> {
        let accepted = match (self, data) {
            (PaymentTypeKind::Cash, None) => true,
            (PaymentTypeKind::Card, None | Some(PaymentItemAdditionalData::Card(_))) => true,
            (PaymentTypeKind::Credit, Some(PaymentItemAdditionalData::Credit(_))) => true,
            (PaymentTypeKind::External, None | Some(PaymentItemAdditionalData::External(_))) => true,
            _ => false,
        };

        if accepted {
            Ok(())
        } else {
            Err(ValidationError::AdditionalDataMismatch {
                kind: format!("{:?}", self),
                data: data.map(|d| d.name()).unwrap_or("NONE").to_string(),
            })
        }
    }
}

/// A payment type as configured in the back office
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentType {
    pub id: EntityId,
    pub name: String,
    pub kind: PaymentTypeKind,
    pub is_active: bool,
    pub can_be_external_processed: bool,
    pub can_pay_out_on_user: bool,
    /// Discount applied together with a payment of this type
    pub discount_type_id: Option<EntityId>,
}

impl PaymentType {
    pub fn new(name: &str, kind: PaymentTypeKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind,
            is_active: true,
            can_be_external_processed: false,
            can_pay_out_on_user: false,
            discount_type_id: None,
        }
    }

    pub fn external_processed(mut self) -> Self {
        self.can_be_external_processed = true;
        self
    }

    pub fn pay_out_on_user(mut self) -> Self {
        self.can_pay_out_on_user = true;
        self
    }

    pub fn with_discount(mut self, discount_type_id: EntityId) -> Self {
        self.discount_type_id = Some(discount_type_id);
        self
    }

    /// Case-insensitive name match, the way operators refer to payment types
    pub fn is_named(&self, name: &str) -> bool {
        self.name.to_uppercase() == name.to_uppercase()
    }

    pub fn name_starts_with(&self, prefix: &str) -> bool {
        self.name.to_uppercase().starts_with(&prefix.to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_additional_data_per_kind() {
        let card = PaymentItemAdditionalData::card("123456");
        let credit = PaymentItemAdditionalData::credit(Uuid::new_v4());
        let external = PaymentItemAdditionalData::external("{}".to_string());

        assert!(PaymentTypeKind::Cash.check_additional_data(None).is_ok());
        assert!(PaymentTypeKind::Cash.check_additional_data(Some(&card)).is_err());

        assert!(PaymentTypeKind::Card.check_additional_data(Some(&card)).is_ok());
        assert!(PaymentTypeKind::Card.check_additional_data(None).is_ok());
        assert!(PaymentTypeKind::Card.check_additional_data(Some(&external)).is_err());

        assert!(PaymentTypeKind::Credit.check_additional_data(Some(&credit)).is_ok());
        assert!(PaymentTypeKind::Credit.check_additional_data(None).is_err());

        assert!(PaymentTypeKind::External.check_additional_data(Some(&external)).is_ok());
    }

    #[test]
    fn test_mismatch_names_both_sides() {
        let err = PaymentTypeKind::Credit.check_additional_data(None).unwrap_err();
        assert_eq!(err, ValidationError::AdditionalDataMismatch {
            kind: "Credit".to_string(),
            data: "NONE".to_string(),
        });
    }

    #[test]
    fn test_name_matching() {
        let visa = PaymentType::new("Visa", PaymentTypeKind::Card);
        assert!(visa.is_named("VISA"));
        assert!(visa.name_starts_with("vi"));
        assert!(!visa.is_named("Visa Electron"));
    }
}
