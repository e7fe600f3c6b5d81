//! Pick the demo entities an action works on.
//!
//! Every picker fails with [`WorkflowError::FixtureNotFound`] instead of
//! panicking when the demo data has nothing suitable.

use front_catalog::{DonationType, PaymentType, PaymentTypeKind};
use front_core::User;
use front_order::{Order, OrderStatus};

use crate::error::{WorkflowError, WorkflowResult};

pub const NEW: &[OrderStatus] = &[OrderStatus::New];
pub const NEW_OR_BILL: &[OrderStatus] = &[OrderStatus::New, OrderStatus::Bill];
pub const NOT_DELETED: &[OrderStatus] = &[OrderStatus::New, OrderStatus::Bill, OrderStatus::Closed];
pub const CLOSED: &[OrderStatus] = &[OrderStatus::Closed];

/// Most recent order in one of `statuses`
pub fn last_order_with_status(orders: Vec<Order>, statuses: &[OrderStatus]) -> WorkflowResult<Order> {
    orders.into_iter()
        .rfind(|o| statuses.contains(&o.status))
        .ok_or_else(|| WorkflowError::fixture(format!("order with status {:?}", statuses)))
}

/// First payment type of `kind`, optionally with a given name (case-insensitive)
pub fn payment_type_of_kind(payment_types: &[PaymentType], kind: PaymentTypeKind, name: Option<&str>) -> WorkflowResult<PaymentType> {
    payment_types.iter()
        .find(|pt| pt.kind == kind && name.map_or(true, |n| pt.is_named(n)))
        .cloned()
        .ok_or_else(|| match name {
            Some(name) => WorkflowError::fixture(format!("{:?} payment type named {}", kind, name)),
            None => WorkflowError::fixture(format!("{:?} payment type", kind)),
        })
}

pub fn payment_type_with_prefix(payment_types: &[PaymentType], kind: PaymentTypeKind, prefix: &str) -> WorkflowResult<PaymentType> {
    payment_types.iter()
        .find(|pt| pt.kind == kind && pt.name_starts_with(prefix))
        .cloned()
        .ok_or_else(|| WorkflowError::fixture(format!("{:?} payment type starting with {}", kind, prefix)))
}

/// First payment type of `kind` that grants a discount
pub fn payment_type_with_discount(payment_types: &[PaymentType], kind: PaymentTypeKind) -> WorkflowResult<PaymentType> {
    payment_types.iter()
        .find(|pt| pt.kind == kind && pt.discount_type_id.is_some())
        .cloned()
        .ok_or_else(|| WorkflowError::fixture(format!("{:?} payment type with a discount", kind)))
}

pub fn external_processable_payment_type(payment_types: &[PaymentType]) -> WorkflowResult<PaymentType> {
    payment_types.iter()
        .find(|pt| pt.can_be_external_processed)
        .cloned()
        .ok_or_else(|| WorkflowError::fixture("externally processable payment type"))
}

pub fn last_user_with_prefix(users: &[User], prefix: &str) -> WorkflowResult<User> {
    let prefix = prefix.to_uppercase();
    users.iter()
        .rev()
        .find(|u| u.name.to_uppercase().starts_with(&prefix))
        .cloned()
        .ok_or_else(|| WorkflowError::fixture(format!("user starting with {}", prefix)))
}

/// First donation type accepting a payment type that `accept` picks, with that payment type
pub fn donation_type_accepting<F>(
    donation_types: &[DonationType],
    payment_types: &[PaymentType],
    accept: F,
) -> WorkflowResult<(DonationType, PaymentType)>
where
    F: Fn(&PaymentType) -> bool,
{
    donation_types.iter()
        .find_map(|dt| {
            payment_types.iter()
                .find(|pt| dt.accepts(&pt.id) && accept(pt))
                .map(|pt| (dt.clone(), pt.clone()))
        })
        .ok_or_else(|| WorkflowError::fixture("compatible donation type"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use front_catalog::ServiceKind;

    fn payment_types() -> Vec<PaymentType> {
        vec![
            PaymentType::new("Cash", PaymentTypeKind::Cash).external_processed(),
            PaymentType::new("Visa", PaymentTypeKind::Card),
            PaymentType::new("Безналичный расчет", PaymentTypeKind::Credit),
        ]
    }

    #[test]
    fn test_last_order_with_status() {
        let mut closed = Order::new(ServiceKind::DineIn);
        closed.status = OrderStatus::Closed;
        let first = Order::new(ServiceKind::DineIn);
        let second = Order::new(ServiceKind::DineIn);
        let second_id = second.id;

        let picked = last_order_with_status(vec![first, second, closed], NEW).unwrap();
        assert_eq!(picked.id, second_id);

        let err = last_order_with_status(vec![], CLOSED).unwrap_err();
        assert!(matches!(err, WorkflowError::FixtureNotFound(_)));
    }

    #[test]
    fn test_payment_type_pickers() {
        let types = payment_types();
        assert_eq!(payment_type_of_kind(&types, PaymentTypeKind::Card, Some("VISA")).unwrap().name, "Visa");
        assert_eq!(payment_type_of_kind(&types, PaymentTypeKind::Cash, None).unwrap().name, "Cash");
        assert!(payment_type_of_kind(&types, PaymentTypeKind::Card, Some("Mir")).is_err());

        let credit = payment_type_with_prefix(&types, PaymentTypeKind::Credit, "безн").unwrap();
        assert_eq!(credit.kind, PaymentTypeKind::Credit);
        assert_eq!(external_processable_payment_type(&types).unwrap().name, "Cash");
        assert!(payment_type_with_discount(&types, PaymentTypeKind::Cash).is_err());
    }

    #[test]
    fn test_last_user_with_prefix() {
        let users = vec![
            User::new("BBB first", "1", false),
            User::new("Cashier", "2", true),
            User::new("bbb second", "3", false),
        ];
        assert_eq!(last_user_with_prefix(&users, "BBB").unwrap().name, "bbb second");
        assert!(last_user_with_prefix(&users, "ZZZ").is_err());
    }

    #[test]
    fn test_donation_type_accepting() {
        let types = payment_types();
        let tips = DonationType::new("Tips", vec![types[1].id]);

        let (donation, payment_type) = donation_type_accepting(
            &[tips],
            &types,
            |pt| pt.kind == PaymentTypeKind::Card,
        ).unwrap();
        assert_eq!(donation.name, "Tips");
        assert_eq!(payment_type.name, "Visa");

        assert!(donation_type_accepting(&[], &types, |_| true).is_err());
    }
}
