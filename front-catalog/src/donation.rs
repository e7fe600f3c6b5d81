use serde::{Deserialize, Serialize};
use uuid::Uuid;
use front_core::EntityId;

use crate::ServiceKind;

/// A charity or tip collected on top of an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DonationType {
    pub id: EntityId,
    pub name: String,
    /// Payment types a donation of this type may be paid with
    pub payment_type_ids: Vec<EntityId>,
    pub service_kinds: Vec<ServiceKind>,
}

impl DonationType {
    pub fn new(name: &str, payment_type_ids: Vec<EntityId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            payment_type_ids,
            service_kinds: vec![ServiceKind::DineIn, ServiceKind::Delivery],
        }
    }

    pub fn is_compatible_with(&self, kind: ServiceKind) -> bool {
        self.service_kinds.contains(&kind)
    }

    pub fn accepts(&self, payment_type_id: &EntityId) -> bool {
        self.payment_type_ids.contains(payment_type_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_donation_compatibility() {
        let cash = Uuid::new_v4();
        let mut tips = DonationType::new("Tips", vec![cash]);
        tips.service_kinds = vec![ServiceKind::DineIn];

        assert!(tips.is_compatible_with(ServiceKind::DineIn));
        assert!(!tips.is_compatible_with(ServiceKind::Delivery));
        assert!(tips.accepts(&cash));
        assert!(!tips.accepts(&Uuid::new_v4()));
    }
}
