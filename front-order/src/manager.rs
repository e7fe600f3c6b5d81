use crate::models::{Order, OrderStatus, PaymentItemStatus};
use chrono::Utc;
use front_core::{EntityId, OperationError, OperationResult, User, ValidationError};
use std::collections::HashMap;

/// Owns the committed orders and their lifecycle transitions
pub struct OrderManager {
    orders: HashMap<EntityId, Order>,
    last_number: u32,
}

impl OrderManager {
    pub fn new() -> Self {
        Self {
            orders: HashMap::new(),
            last_number: 0,
        }
    }

    /// Get a committed order by ID
    pub fn get(&self, order_id: &EntityId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    pub fn require(&self, order_id: &EntityId) -> OperationResult<&Order> {
        self.get(order_id)
            .ok_or_else(|| ValidationError::EntityNotFound(*order_id).into())
    }

    /// Snapshot of all orders, oldest first
    pub fn list(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.values().cloned().collect();
        orders.sort_by_key(|o| (o.created_at, o.number));
        orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Make a working copy visible: one version bump, a number for new orders
    pub fn commit(&mut self, mut order: Order) -> &Order {
        if order.version == 0 {
            self.last_number += 1;
            order.number = self.last_number;
        }
        order.version += 1;
        order.updated_at = Utc::now();

        let id = order.id;
        self.orders.insert(id, order);
        &self.orders[&id]
    }

    pub fn require_status(order: &Order, allowed: &[OrderStatus]) -> Result<(), ValidationError> {
        if allowed.contains(&order.status) {
            return Ok(());
        }

        Err(ValidationError::InvalidOrderStatus {
            id: order.id,
            status: format!("{:?}", order.status),
            expected: allowed.iter()
                .map(|s| format!("{:?}", s))
                .collect::<Vec<_>>()
                .join("|"),
        })
    }

    /// Transition: New/Bill → Closed, paid with the payments already on the order
    pub fn pay(order: &mut Order, user: &User) -> OperationResult<()> {
        Self::require_status(order, &[OrderStatus::New, OrderStatus::Bill])?;

        if !user.has_personal_session {
            return Err(ValidationError::NoPersonalSession(user.name.clone()).into());
        }

        let paid = order.paid_sum();
        if paid < order.result_sum {
            return Err(ValidationError::InsufficientPayment {
                paid,
                required: order.result_sum,
            }.into());
        }

        for item in order.payments.iter_mut().filter(|p| !p.is_prepaid()) {
            item.status = PaymentItemStatus::Processed;
        }
        order.status = OrderStatus::Closed;
        order.updated_at = Utc::now();
        Ok(())
    }

    /// Optimistic concurrency check of a caller's snapshot
    pub fn check_version(current: &Order, expected: u64) -> OperationResult<()> {
        if current.version != expected {
            return Err(OperationError::EntityModified {
                id: current.id,
                expected,
                actual: current.version,
            });
        }
        Ok(())
    }
}

impl Default for OrderManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentItem;
    use front_catalog::ServiceKind;
    use uuid::Uuid;

    fn order_with_sum(sum: i64) -> Order {
        let mut order = Order::new(ServiceKind::DineIn);
        order.result_sum = sum;
        order
    }

    #[test]
    fn test_commit_assigns_number_and_version() {
        let mut manager = OrderManager::new();

        let first = manager.commit(Order::new(ServiceKind::DineIn)).clone();
        assert_eq!(first.version, 1);
        assert_eq!(first.number, 1);

        let second = manager.commit(Order::new(ServiceKind::Delivery)).clone();
        assert_eq!(second.number, 2);

        let updated = manager.commit(first.clone());
        assert_eq!(updated.version, 2);
        assert_eq!(updated.number, 1);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_check_version() {
        let mut manager = OrderManager::new();
        let order = manager.commit(Order::new(ServiceKind::DineIn)).clone();

        assert!(OrderManager::check_version(&order, 1).is_ok());
        assert_eq!(
            OrderManager::check_version(&order, 0).unwrap_err(),
            OperationError::EntityModified { id: order.id, expected: 0, actual: 1 }
        );
    }

    #[test]
    fn test_pay_lifecycle() {
        let cashier = User::new("Cashier", "777", true);
        let mut order = order_with_sum(1000);
        order.payments.push(PaymentItem::new(order.id, Uuid::new_v4(), 1000));

        OrderManager::pay(&mut order, &cashier).unwrap();
        assert_eq!(order.status, OrderStatus::Closed);
        assert_eq!(order.payments[0].status, PaymentItemStatus::Processed);

        // Closed orders cannot be paid again
        assert!(OrderManager::pay(&mut order, &cashier).is_err());
    }

    #[test]
    fn test_pay_needs_coverage_and_personal_session() {
        let mut order = order_with_sum(1000);
        order.payments.push(PaymentItem::new(order.id, Uuid::new_v4(), 400));

        let waiter = User::new("Waiter", "123", false);
        assert!(matches!(
            OrderManager::pay(&mut order, &waiter),
            Err(OperationError::Validation(ValidationError::NoPersonalSession(_)))
        ));

        let cashier = User::new("Cashier", "777", true);
        assert_eq!(
            OrderManager::pay(&mut order, &cashier).unwrap_err(),
            OperationError::Validation(ValidationError::InsufficientPayment { paid: 400, required: 1000 })
        );
        assert_eq!(order.status, OrderStatus::New);
    }
}
