use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::Utc;
use front_catalog::Catalog;
use front_core::{
    EntityId, OperationResult, PaymentItemAdditionalData, UserDirectory, ValidationError,
};

use crate::manager::OrderManager;
use crate::models::{DiscountItem, Guest, Order, OrderItem, OrderStatus, PaymentItem, PaymentItemStatus};

const EDITABLE: &[OrderStatus] = &[OrderStatus::New, OrderStatus::Bill];
const ACCEPTS_DONATIONS: &[OrderStatus] = &[OrderStatus::New, OrderStatus::Bill, OrderStatus::Closed];

/// How a new payment item enters the order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    Regular,
    /// Announced in advance (delivery), taken when the courier arrives
    Preliminary,
    /// Money handled by a third party
    External { is_processed: bool },
    /// Handled and fiscalized by a third party
    ExternalFiscalized,
    /// Remote payment accounted as the acting user's debt
    PayOutOnUser,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewPayment {
    pub amount: i64,
    pub payment_type_id: EntityId,
    pub additional_data: Option<PaymentItemAdditionalData>,
    pub mode: PaymentMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewDonation {
    pub amount: i64,
    pub donation_type_id: EntityId,
    pub payment_type_id: EntityId,
    pub additional_data: Option<PaymentItemAdditionalData>,
    pub is_processed: bool,
}

/// Reference data a change is validated against
#[derive(Clone, Copy)]
pub struct ChangeContext<'a> {
    pub catalog: &'a Catalog,
    pub users: &'a UserDirectory,
}

/// Validated modifications of a single order. Every function either applies
/// its change completely or leaves the order untouched.
pub struct ChangeHandler;

impl ChangeHandler {
    pub fn add_guest(order: &mut Order, name: &str) -> OperationResult<EntityId> {
        OrderManager::require_status(order, EDITABLE)?;

        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyGuestName.into());
        }

        let guest = Guest { id: Uuid::new_v4(), name: name.to_string() };
        let id = guest.id;
        order.guests.push(guest);
        order.updated_at = Utc::now();
        Ok(id)
    }

    pub fn add_item(order: &mut Order, product_name: &str, price: i64, amount: u32) -> OperationResult<EntityId> {
        OrderManager::require_status(order, EDITABLE)?;

        if amount == 0 {
            return Err(ValidationError::NonPositiveAmount(0).into());
        }
        if price < 0 {
            return Err(ValidationError::NonPositiveAmount(price).into());
        }

        let item = OrderItem {
            id: Uuid::new_v4(),
            product_name: product_name.to_string(),
            price,
            amount,
        };
        let in_range = item.cost()
            .zip(order.subtotal())
            .and_then(|(cost, subtotal)| subtotal.checked_add(cost))
            .is_some();
        if !in_range {
            return Err(ValidationError::SumOutOfRange(order.id).into());
        }

        let id = item.id;
        order.items.push(item);
        order.recalculate()?;
        Ok(id)
    }

    pub fn add_payment(order: &mut Order, ctx: ChangeContext<'_>, payment: &NewPayment) -> OperationResult<EntityId> {
        OrderManager::require_status(order, EDITABLE)?;
        Self::require_positive(payment.amount)?;

        let payment_type = ctx.catalog.payment_type(&payment.payment_type_id)?;
        payment_type.kind.check_additional_data(payment.additional_data.as_ref())?;
        Self::check_counteragent(ctx, payment.additional_data.as_ref())?;

        let mut item = PaymentItem::new(order.id, payment_type.id, payment.amount);
        item.additional_data = payment.additional_data.clone();

        match payment.mode {
            PaymentMode::Regular => {}
            PaymentMode::Preliminary => {
                if !order.is_delivery() {
                    return Err(ValidationError::NotADeliveryOrder(order.id).into());
                }
                item.is_preliminary = true;
            }
            PaymentMode::External { is_processed } => {
                if !payment_type.can_be_external_processed {
                    return Err(ValidationError::NotExternallyProcessable(payment_type.name.clone()).into());
                }
                item.is_external = true;
                if is_processed {
                    item.status = PaymentItemStatus::Processed;
                }
            }
            PaymentMode::ExternalFiscalized => {
                if !payment_type.can_be_external_processed {
                    return Err(ValidationError::NotExternallyProcessable(payment_type.name.clone()).into());
                }
                item.is_external = true;
                item.is_fiscalized_externally = true;
                item.status = PaymentItemStatus::Processed;
            }
            PaymentMode::PayOutOnUser => {
                if !payment_type.can_pay_out_on_user {
                    return Err(ValidationError::NotPayableOutOnUser(payment_type.name.clone()).into());
                }
                item.status = PaymentItemStatus::Processed;
            }
        }

        let id = item.id;
        order.payments.push(item);
        order.updated_at = Utc::now();
        Ok(id)
    }

    pub fn add_donation(order: &mut Order, ctx: ChangeContext<'_>, donation: &NewDonation) -> OperationResult<EntityId> {
        OrderManager::require_status(order, ACCEPTS_DONATIONS)?;
        Self::require_positive(donation.amount)?;

        let donation_type = ctx.catalog.donation_type(&donation.donation_type_id)
            .ok_or(ValidationError::EntityNotFound(donation.donation_type_id))?;
        if !donation_type.is_compatible_with(order.kind) {
            return Err(ValidationError::DonationTypeNotCompatible {
                donation: donation_type.name.clone(),
                order: order.id,
            }.into());
        }

        let payment_type = ctx.catalog.payment_type(&donation.payment_type_id)?;
        if !donation_type.accepts(&payment_type.id) {
            return Err(ValidationError::DonationPaymentTypeNotAllowed {
                donation: donation_type.name.clone(),
                payment_type: payment_type.name.clone(),
            }.into());
        }
        payment_type.kind.check_additional_data(donation.additional_data.as_ref())?;
        Self::check_counteragent(ctx, donation.additional_data.as_ref())?;

        let mut item = PaymentItem::new(order.id, payment_type.id, donation.amount);
        item.is_donation = true;
        item.donation_type_id = Some(donation_type.id);
        item.additional_data = donation.additional_data.clone();
        if donation.is_processed {
            item.status = PaymentItemStatus::Processed;
        }

        let id = item.id;
        order.donations.push(item);
        order.updated_at = Utc::now();
        Ok(id)
    }

    pub fn add_discount(order: &mut Order, ctx: ChangeContext<'_>, discount_type_id: &EntityId) -> OperationResult<EntityId> {
        OrderManager::require_status(order, EDITABLE)?;

        let discount_type = ctx.catalog.discount_type(discount_type_id)?;
        if !discount_type.applies_to(order.kind) {
            return Err(ValidationError::DiscountNotApplicable {
                discount: discount_type.name.clone(),
                order: order.id,
            }.into());
        }

        let item = DiscountItem {
            id: Uuid::new_v4(),
            discount_type: discount_type.clone(),
            created_at: Utc::now(),
        };
        let id = item.id;
        order.discounts.push(item);
        order.recalculate()?;
        Ok(id)
    }

    pub fn delete_discount(order: &mut Order, discount_item_id: &EntityId) -> OperationResult<DiscountItem> {
        OrderManager::require_status(order, EDITABLE)?;

        let index = order.discounts.iter()
            .position(|d| d.id == *discount_item_id)
            .ok_or(ValidationError::DiscountItemNotFound(*discount_item_id))?;

        let removed = order.discounts.remove(index);
        order.recalculate()?;
        Ok(removed)
    }

    pub fn delete_preliminary_payment(order: &mut Order, payment_item_id: &EntityId) -> OperationResult<PaymentItem> {
        OrderManager::require_status(order, EDITABLE)?;

        let item = Self::find_payment(order, payment_item_id)?;
        if !item.is_preliminary {
            return Err(Self::not_eligible(item, "not a preliminary payment"));
        }
        if item.is_prepaid() {
            return Err(Self::not_eligible(item, "already converted to a prepayment"));
        }

        Ok(Self::remove_payment(order, payment_item_id)?)
    }

    pub fn delete_external_fiscalized_payment(order: &mut Order, payment_item_id: &EntityId) -> OperationResult<PaymentItem> {
        OrderManager::require_status(order, EDITABLE)?;

        let item = Self::find_payment(order, payment_item_id)?;
        if !item.is_fiscalized_externally {
            return Err(Self::not_eligible(item, "not fiscalized externally"));
        }
        if item.is_prepaid() {
            return Err(Self::not_eligible(item, "already converted to a prepayment"));
        }

        Ok(Self::remove_payment(order, payment_item_id)?)
    }

    pub fn delete_donation(order: &mut Order, donation_id: &EntityId) -> OperationResult<PaymentItem> {
        OrderManager::require_status(order, ACCEPTS_DONATIONS)?;

        let index = order.donations.iter()
            .position(|d| d.id == *donation_id)
            .ok_or(ValidationError::PaymentItemNotFound(*donation_id))?;

        let removed = order.donations.remove(index);
        order.updated_at = Utc::now();
        Ok(removed)
    }

    pub fn change_payment_sum(order: &mut Order, payment_item_id: &EntityId, amount: i64) -> OperationResult<()> {
        OrderManager::require_status(order, EDITABLE)?;
        Self::require_positive(amount)?;

        let item = Self::find_payment(order, payment_item_id)?;
        if item.is_prepaid() {
            return Err(Self::not_eligible(item, "already converted to a prepayment"));
        }

        if let Some(item) = order.payment_mut(payment_item_id) {
            item.amount = amount;
        }
        order.updated_at = Utc::now();
        Ok(())
    }

    /// Turn a payment into a prepayment. Irreversible.
    pub fn process_prepay(order: &mut Order, payment_item_id: &EntityId) -> OperationResult<()> {
        OrderManager::require_status(order, EDITABLE)?;

        if let Some(donation) = order.donation(payment_item_id) {
            return Err(Self::not_eligible(donation, "donations cannot be prepaid"));
        }
        let item = Self::find_payment(order, payment_item_id)?;
        if item.is_prepaid() {
            return Err(Self::not_eligible(item, "already converted to a prepayment"));
        }

        if let Some(item) = order.payment_mut(payment_item_id) {
            item.status = PaymentItemStatus::Prepaid;
            item.is_preliminary = false;
        }
        order.updated_at = Utc::now();
        Ok(())
    }

    fn require_positive(amount: i64) -> Result<(), ValidationError> {
        if amount <= 0 {
            return Err(ValidationError::NonPositiveAmount(amount));
        }
        Ok(())
    }

    fn check_counteragent(ctx: ChangeContext<'_>, data: Option<&PaymentItemAdditionalData>) -> OperationResult<()> {
        if let Some(PaymentItemAdditionalData::Credit(credit)) = data {
            ctx.users.require(&credit.counteragent_user_id)?;
        }
        Ok(())
    }

    fn find_payment<'o>(order: &'o Order, id: &EntityId) -> Result<&'o PaymentItem, ValidationError> {
        order.payment(id).ok_or(ValidationError::PaymentItemNotFound(*id))
    }

    fn remove_payment(order: &mut Order, id: &EntityId) -> Result<PaymentItem, ValidationError> {
        let index = order.payments.iter()
            .position(|p| p.id == *id)
            .ok_or(ValidationError::PaymentItemNotFound(*id))?;
        let removed = order.payments.remove(index);
        order.updated_at = Utc::now();
        Ok(removed)
    }

    fn not_eligible(item: &PaymentItem, reason: &str) -> front_core::OperationError {
        ValidationError::PaymentItemNotEligible {
            id: item.id,
            reason: reason.to_string(),
        }.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use front_catalog::{DiscountType, DonationType, PaymentType, PaymentTypeKind, ServiceKind};
    use front_core::{OperationError, User};

    struct Fixture {
        catalog: Catalog,
        users: UserDirectory,
    }

    impl Fixture {
        fn new() -> Self {
            let cash = PaymentType::new("Cash", PaymentTypeKind::Cash).external_processed();
            let visa = PaymentType::new("VISA", PaymentTypeKind::Card).external_processed();
            let credit = PaymentType::new("Cashless", PaymentTypeKind::Credit);
            let mut dine_in_only = DiscountType::new("Hall -10%", 10);
            dine_in_only.applies_to_delivery = false;
            let tips = DonationType::new("Tips", vec![cash.id]);

            Self {
                catalog: Catalog {
                    payment_types: vec![cash, visa, credit],
                    discount_types: vec![DiscountType::new("Cash -5%", 5), dine_in_only],
                    donation_types: vec![tips],
                },
                users: UserDirectory::new(vec![User::new("BBB Counteragent", "111", false)]),
            }
        }

        fn ctx(&self) -> ChangeContext<'_> {
            ChangeContext { catalog: &self.catalog, users: &self.users }
        }

        fn payment_type(&self, kind: PaymentTypeKind) -> EntityId {
            self.catalog.payment_types.iter().find(|pt| pt.kind == kind).unwrap().id
        }
    }

    fn order(kind: ServiceKind) -> Order {
        let mut order = Order::new(kind);
        ChangeHandler::add_item(&mut order, "Pelmeni", 10000, 1).unwrap();
        order
    }

    fn payment(payment_type_id: EntityId, amount: i64, mode: PaymentMode) -> NewPayment {
        NewPayment { amount, payment_type_id, additional_data: None, mode }
    }

    fn validation(result: OperationResult<impl std::fmt::Debug>) -> ValidationError {
        match result {
            Err(OperationError::Validation(err)) => err,
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_add_guest() {
        let mut order = order(ServiceKind::DineIn);
        ChangeHandler::add_guest(&mut order, "Herbert").unwrap();
        assert_eq!(order.guests[0].name, "Herbert");
        assert_eq!(validation(ChangeHandler::add_guest(&mut order, "  ")), ValidationError::EmptyGuestName);
    }

    #[test]
    fn test_add_item_rejects_out_of_range_total() {
        let mut order = order(ServiceKind::DineIn);
        let before = order.clone();

        assert_eq!(
            validation(ChangeHandler::add_item(&mut order, "Gold", i64::MAX / 2, 3)),
            ValidationError::SumOutOfRange(order.id)
        );
        assert_eq!(
            validation(ChangeHandler::add_item(&mut order, "Gold", i64::MAX - 1000, 1)),
            ValidationError::SumOutOfRange(order.id)
        );
        assert_eq!(order, before);

        ChangeHandler::add_item(&mut order, "Kvass", 500, 2).unwrap();
        assert_eq!(order.result_sum, 11000);
    }

    #[test]
    fn test_remove_unknown_payment_leaves_others() {
        let fx = Fixture::new();
        let mut order = order(ServiceKind::DineIn);
        let cash = fx.payment_type(PaymentTypeKind::Cash);
        ChangeHandler::add_payment(&mut order, fx.ctx(), &payment(cash, 5000, PaymentMode::Regular)).unwrap();

        let unknown = Uuid::new_v4();
        assert_eq!(
            ChangeHandler::remove_payment(&mut order, &unknown),
            Err(ValidationError::PaymentItemNotFound(unknown))
        );
        assert_eq!(order.payments.len(), 1);
    }

    #[test]
    fn test_add_regular_payment() {
        let fx = Fixture::new();
        let mut order = order(ServiceKind::DineIn);
        let cash = fx.payment_type(PaymentTypeKind::Cash);

        let id = ChangeHandler::add_payment(&mut order, fx.ctx(), &payment(cash, 5000, PaymentMode::Regular)).unwrap();
        let item = order.payment(&id).unwrap();
        assert_eq!(item.status, PaymentItemStatus::New);
        assert_eq!(order.paid_sum(), 5000);
    }

    #[test]
    fn test_payment_rules() {
        let fx = Fixture::new();
        let mut order = order(ServiceKind::DineIn);
        let cash = fx.payment_type(PaymentTypeKind::Cash);
        let credit = fx.payment_type(PaymentTypeKind::Credit);

        assert_eq!(
            validation(ChangeHandler::add_payment(&mut order, fx.ctx(), &payment(cash, 0, PaymentMode::Regular))),
            ValidationError::NonPositiveAmount(0)
        );
        assert_eq!(
            validation(ChangeHandler::add_payment(&mut order, fx.ctx(), &payment(cash, 100, PaymentMode::Preliminary))),
            ValidationError::NotADeliveryOrder(order.id)
        );
        assert!(matches!(
            validation(ChangeHandler::add_payment(&mut order, fx.ctx(), &payment(credit, 100, PaymentMode::Regular))),
            ValidationError::AdditionalDataMismatch { .. }
        ));
        assert!(matches!(
            validation(ChangeHandler::add_payment(&mut order, fx.ctx(), &payment(credit, 100, PaymentMode::External { is_processed: true }))),
            ValidationError::AdditionalDataMismatch { .. }
        ));
        assert!(order.payments.is_empty());
    }

    #[test]
    fn test_credit_payment_needs_known_counteragent() {
        let fx = Fixture::new();
        let mut order = order(ServiceKind::Delivery);
        let credit = fx.payment_type(PaymentTypeKind::Credit);

        let mut unknown = payment(credit, 200, PaymentMode::Preliminary);
        unknown.additional_data = Some(PaymentItemAdditionalData::credit(Uuid::new_v4()));
        assert!(matches!(
            validation(ChangeHandler::add_payment(&mut order, fx.ctx(), &unknown)),
            ValidationError::UnknownUser(_)
        ));

        let mut known = unknown.clone();
        known.additional_data = Some(PaymentItemAdditionalData::credit(fx.users.users()[0].id));
        let id = ChangeHandler::add_payment(&mut order, fx.ctx(), &known).unwrap();
        assert!(order.payment(&id).unwrap().is_preliminary);
    }

    #[test]
    fn test_external_modes() {
        let fx = Fixture::new();
        let mut order = order(ServiceKind::DineIn);
        let visa = fx.payment_type(PaymentTypeKind::Card);
        let credit = fx.payment_type(PaymentTypeKind::Credit);

        let pending = ChangeHandler::add_payment(&mut order, fx.ctx(), &payment(visa, 100, PaymentMode::External { is_processed: false })).unwrap();
        let fiscal = ChangeHandler::add_payment(&mut order, fx.ctx(), &payment(visa, 100, PaymentMode::ExternalFiscalized)).unwrap();
        assert_eq!(order.payment(&pending).unwrap().status, PaymentItemStatus::New);
        assert!(order.payment(&fiscal).unwrap().is_fiscalized_externally);
        assert_eq!(order.payment(&fiscal).unwrap().status, PaymentItemStatus::Processed);

        let mut credit_payment = payment(credit, 100, PaymentMode::External { is_processed: true });
        credit_payment.additional_data = Some(PaymentItemAdditionalData::credit(fx.users.users()[0].id));
        assert!(matches!(
            validation(ChangeHandler::add_payment(&mut order, fx.ctx(), &credit_payment)),
            ValidationError::NotExternallyProcessable(_)
        ));
    }

    #[test]
    fn test_prepay_is_irreversible() {
        let fx = Fixture::new();
        let mut order = order(ServiceKind::Delivery);
        let cash = fx.payment_type(PaymentTypeKind::Cash);
        let id = ChangeHandler::add_payment(&mut order, fx.ctx(), &payment(cash, 1000, PaymentMode::Preliminary)).unwrap();

        ChangeHandler::change_payment_sum(&mut order, &id, 800).unwrap();
        ChangeHandler::process_prepay(&mut order, &id).unwrap();
        let item = order.payment(&id).unwrap();
        assert_eq!(item.status, PaymentItemStatus::Prepaid);
        assert_eq!(item.amount, 800);

        assert!(matches!(
            validation(ChangeHandler::process_prepay(&mut order, &id)),
            ValidationError::PaymentItemNotEligible { .. }
        ));
        assert!(matches!(
            validation(ChangeHandler::delete_preliminary_payment(&mut order, &id)),
            ValidationError::PaymentItemNotEligible { .. }
        ));
        assert!(matches!(
            validation(ChangeHandler::change_payment_sum(&mut order, &id, 900)),
            ValidationError::PaymentItemNotEligible { .. }
        ));
    }

    #[test]
    fn test_discount_round_trip_recalculates() {
        let fx = Fixture::new();
        let mut order = order(ServiceKind::Delivery);
        let five = fx.catalog.discount_types[0].id;
        let dine_in_only = fx.catalog.discount_types[1].id;

        let id = ChangeHandler::add_discount(&mut order, fx.ctx(), &five).unwrap();
        assert_eq!(order.result_sum, 9500);
        assert!(matches!(
            validation(ChangeHandler::add_discount(&mut order, fx.ctx(), &dine_in_only)),
            ValidationError::DiscountNotApplicable { .. }
        ));

        ChangeHandler::delete_discount(&mut order, &id).unwrap();
        assert_eq!(order.result_sum, 10000);
    }

    #[test]
    fn test_donations() {
        let fx = Fixture::new();
        let mut order = order(ServiceKind::DineIn);
        let tips = fx.catalog.donation_types[0].id;
        let cash = fx.payment_type(PaymentTypeKind::Cash);
        let visa = fx.payment_type(PaymentTypeKind::Card);

        let donation = NewDonation {
            amount: 1000,
            donation_type_id: tips,
            payment_type_id: cash,
            additional_data: None,
            is_processed: true,
        };
        let id = ChangeHandler::add_donation(&mut order, fx.ctx(), &donation).unwrap();
        assert!(order.donation(&id).unwrap().is_donation);
        assert_eq!(order.paid_sum(), 0);

        assert!(matches!(
            validation(ChangeHandler::process_prepay(&mut order, &id)),
            ValidationError::PaymentItemNotEligible { .. }
        ));

        let by_card = NewDonation { payment_type_id: visa, ..donation };
        assert!(matches!(
            validation(ChangeHandler::add_donation(&mut order, fx.ctx(), &by_card)),
            ValidationError::DonationPaymentTypeNotAllowed { .. }
        ));

        ChangeHandler::delete_donation(&mut order, &id).unwrap();
        assert!(order.donations.is_empty());
    }

    #[test]
    fn test_closed_order_rejects_payments() {
        let fx = Fixture::new();
        let mut order = order(ServiceKind::DineIn);
        order.status = OrderStatus::Closed;
        let cash = fx.payment_type(PaymentTypeKind::Cash);

        assert!(matches!(
            validation(ChangeHandler::add_payment(&mut order, fx.ctx(), &payment(cash, 100, PaymentMode::Regular))),
            ValidationError::InvalidOrderStatus { .. }
        ));
    }
}
