use serde::{Deserialize, Serialize};
use uuid::Uuid;
use front_core::EntityId;

use crate::ServiceKind;

/// A percentage discount configured in the back office
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscountType {
    pub id: EntityId,
    pub name: String,
    /// Whole percent, 0..=100
    pub percent: u8,
    pub applies_to_dine_in: bool,
    pub applies_to_delivery: bool,
}

impl DiscountType {
    pub fn new(name: &str, percent: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            percent: percent.min(100),
            applies_to_dine_in: true,
            applies_to_delivery: true,
        }
    }

    pub fn applies_to(&self, kind: ServiceKind) -> bool {
        match kind {
            ServiceKind::DineIn => self.applies_to_dine_in,
            ServiceKind::Delivery => self.applies_to_delivery,
        }
    }

    /// Amount taken off `subtotal`, rounded down to the minor unit
    pub fn discount_amount(&self, subtotal: i64) -> i64 {
        let subtotal = subtotal.max(0);
        let percent = i64::from(self.percent);
        // Split so no intermediate exceeds `subtotal`
        subtotal / 100 * percent + subtotal % 100 * percent / 100
    }
}

/// Computes order result sums from their subtotal and applied discounts
pub struct PricingEngine;

impl PricingEngine {
    /// Every discount is taken from the undiscounted subtotal; the result never goes negative
    pub fn result_sum<'a, I>(subtotal: i64, discounts: I) -> i64
    where
        I: IntoIterator<Item = &'a DiscountType>,
    {
        let total_discount = discounts.into_iter()
            .map(|d| d.discount_amount(subtotal))
            .fold(0, i64::saturating_add);

        (subtotal - total_discount).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_amount_rounds_down() {
        let discount = DiscountType::new("Cash -5%", 5);
        assert_eq!(discount.discount_amount(1999), 99);
        assert_eq!(discount.discount_amount(-10), 0);
    }

    #[test]
    fn test_percent_is_clamped() {
        assert_eq!(DiscountType::new("Too generous", 150).percent, 100);
    }

    #[test]
    fn test_result_sum() {
        let five = DiscountType::new("Cash -5%", 5);
        let ten = DiscountType::new("Loyalty -10%", 10);

        assert_eq!(PricingEngine::result_sum(10000, Vec::<&DiscountType>::new()), 10000);
        assert_eq!(PricingEngine::result_sum(10000, [&five, &ten]), 8500);

        let all = DiscountType::new("Staff meal", 100);
        assert_eq!(PricingEngine::result_sum(10000, [&all, &five]), 0);
    }

    #[test]
    fn test_large_subtotals_do_not_overflow() {
        let ten = DiscountType::new("Loyalty -10%", 10);
        let all = DiscountType::new("Staff meal", 100);

        assert_eq!(ten.discount_amount(i64::MAX), i64::MAX / 10);
        assert_eq!(all.discount_amount(i64::MAX), i64::MAX);
        assert_eq!(PricingEngine::result_sum(i64::MAX, [&all, &all, &ten]), 0);
    }

    #[test]
    fn test_applicability() {
        let mut delivery_only = DiscountType::new("Delivery -7%", 7);
        delivery_only.applies_to_dine_in = false;

        assert!(delivery_only.applies_to(ServiceKind::Delivery));
        assert!(!delivery_only.applies_to(ServiceKind::DineIn));
    }
}
