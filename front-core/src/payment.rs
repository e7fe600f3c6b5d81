use serde::{Deserialize, Serialize};
use front_shared::Masked;

use crate::{EntityId, OperationError, OperationResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardPaymentItemAdditionalData {
    pub card_number: Masked<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreditPaymentItemAdditionalData {
    pub counteragent_user_id: EntityId,
}

/// Payment-system specific blob, passed through the store unchanged
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalPaymentItemAdditionalData {
    pub custom_data: String,
}

/// Kind-specific data attached to a payment item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentItemAdditionalData {
    Card(CardPaymentItemAdditionalData),
    Credit(CreditPaymentItemAdditionalData),
    External(ExternalPaymentItemAdditionalData),
}

impl PaymentItemAdditionalData {
    pub fn card(card_number: &str) -> Self {
        PaymentItemAdditionalData::Card(CardPaymentItemAdditionalData {
            card_number: Masked(card_number.to_string()),
        })
    }

    pub fn credit(counteragent_user_id: EntityId) -> Self {
        PaymentItemAdditionalData::Credit(CreditPaymentItemAdditionalData { counteragent_user_id })
    }

    pub fn external(custom_data: String) -> Self {
        PaymentItemAdditionalData::External(ExternalPaymentItemAdditionalData { custom_data })
    }

    pub fn name(&self) -> &'static str {
        match self {
            PaymentItemAdditionalData::Card(_) => "CARD",
            PaymentItemAdditionalData::Credit(_) => "CREDIT",
            PaymentItemAdditionalData::External(_) => "EXTERNAL",
        }
    }

    /// Log-safe description; card numbers show their last four digits only
    pub fn summary(&self) -> String {
        match self {
            PaymentItemAdditionalData::Card(card) => format!("CARD *{}", card.card_number.tail()),
            PaymentItemAdditionalData::Credit(credit) => format!("CREDIT {}", credit.counteragent_user_id),
            PaymentItemAdditionalData::External(_) => "EXTERNAL".to_string(),
        }
    }
}

/// Payload the demo payment system understands. Its encoded form travels as
/// `ExternalPaymentItemAdditionalData::custom_data`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PaymentAdditionalData {
    pub silent_pay: bool,
}

impl PaymentAdditionalData {
    pub fn to_custom_data(&self) -> OperationResult<String> {
        serde_json::to_string(self)
            .map_err(|e| OperationError::Internal(format!("Custom data encoding failed: {}", e)))
    }

    pub fn from_custom_data(custom_data: &str) -> OperationResult<Self> {
        serde_json::from_str(custom_data)
            .map_err(|e| OperationError::Internal(format!("Custom data decoding failed: {}", e)))
    }

    pub fn into_additional_data(self) -> OperationResult<PaymentItemAdditionalData> {
        Ok(PaymentItemAdditionalData::external(self.to_custom_data()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_data_payload() {
        let data = PaymentAdditionalData { silent_pay: true };
        let encoded = data.to_custom_data().unwrap();
        assert_eq!(encoded, r#"{"SilentPay":true}"#);

        match data.into_additional_data().unwrap() {
            PaymentItemAdditionalData::External(external) => {
                assert_eq!(PaymentAdditionalData::from_custom_data(&external.custom_data).unwrap(), data);
            }
            other => panic!("unexpected additional data {}", other.name()),
        }
    }

    #[test]
    fn test_summary_shows_only_card_tail() {
        let card = PaymentItemAdditionalData::card("4111111111111234");
        assert_eq!(card.summary(), "CARD *1234");
        assert!(!card.summary().contains("4111"));
        assert_eq!(PaymentItemAdditionalData::external("{}".to_string()).summary(), "EXTERNAL");
    }

    #[test]
    fn test_card_number_is_masked_in_debug() {
        let data = PaymentItemAdditionalData::card("123456");
        assert!(!format!("{:?}", data).contains("123456"));
        assert_eq!(data.name(), "CARD");
    }
}
