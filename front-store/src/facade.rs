use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::BoxFuture;
use tracing::{debug, info};

use front_catalog::{DiscountType, DonationType, PaymentType, ServiceKind};
use front_core::{Credentials, EntityId, OperationError, OperationResult, PaymentItemAdditionalData, User};
use front_order::{
    CafeSession, ChangeHandler, ContinuousBody, EditSession, NewDonation, NewPayment, Operations, Order, OrderManager,
    PaymentItem, PaymentMode, SubmittedEntities,
};
use front_shared::models::events::{
    CafeSessionChangedEvent, OrderPaidEvent, PaymentItemAddedEvent, PaymentItemDeletedEvent,
    PrepayProcessedEvent, ScopeOutcome,
};
use front_shared::FrontEvent;

use crate::continuous::{Caller, ContinuousOperation, ScopeGuard};
use crate::entity_store::{Committed, EntityStore};

/// The operations façade handed to plugins.
///
/// The long-lived instance acts as the global caller. Inside
/// [`FrontOperations::run_continuous`] the body gets a scoped handle whose
/// mutations lock what they touch until the body finishes.
#[derive(Clone)]
pub struct FrontOperations {
    store: Arc<EntityStore>,
    scope: Option<Arc<ContinuousOperation>>,
    plugin_user: String,
}

impl FrontOperations {
    pub fn new(store: Arc<EntityStore>, plugin_user: &str) -> Self {
        Self {
            store,
            scope: None,
            plugin_user: plugin_user.to_string(),
        }
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// The continuous operation this handle belongs to, if any
    pub fn scope(&self) -> Option<&ContinuousOperation> {
        self.scope.as_deref()
    }

    fn caller(&self) -> Caller {
        match &self.scope {
            Some(scope) => Caller::Scope(scope.id()),
            None => Caller::Global,
        }
    }

    fn track<T>(&self, committed: Committed<T>) -> T {
        if let Some(scope) = &self.scope {
            scope.track(&committed.touched);
        }
        committed.value
    }

    /// Run `body` as one continuous operation.
    ///
    /// Every entity the body changes through the handle it receives stays
    /// locked for everybody else until the body's future completes. Locks
    /// are released on success, failure, panic and cancellation alike. A
    /// call made from inside a running body joins the enclosing operation.
    ///
    /// ```ignore
    /// ops.run_continuous(&credentials, |scoped| async move {
    ///     let submitted = scoped.submit_changes(&credentials, &session).await?;
    ///     scoped.process_prepay(&credentials, order, item).await
    /// }.boxed()).await?;
    /// ```
    pub async fn run_continuous<T, F>(&self, credentials: &Credentials, body: F) -> OperationResult<T>
    where
        T: Send,
        F: for<'a> FnOnce(&'a FrontOperations) -> BoxFuture<'a, OperationResult<T>> + Send,
    {
        if let Some(scope) = &self.scope {
            debug!("Joining continuous operation {}", scope.id());
            return body(self).await;
        }

        let user = self.store.verify(credentials)?;
        let scope = Arc::new(ContinuousOperation::new(&user.name));
        self.store.open_scope(scope.id())?;
        let guard = ScopeGuard::new(self.store.clone(), scope.clone());
        info!("Continuous operation {} started by {}", scope.id(), user.name);

        let scoped = FrontOperations {
            store: self.store.clone(),
            scope: Some(scope),
            plugin_user: self.plugin_user.clone(),
        };
        let result = body(&scoped).await;

        guard.finish(if result.is_ok() { ScopeOutcome::Committed } else { ScopeOutcome::Aborted });
        result
    }

    fn add_payment(&self, credentials: &Credentials, order: &Order, payment: NewPayment, operation: &str) -> OperationResult<PaymentItem> {
        if let Some(data) = &payment.additional_data {
            debug!("{} on order {}: {} with {}", operation, order.id, payment.amount, data.summary());
        }
        let committed = self.store.update_order(self.caller(), credentials, order, operation, |order, env| {
            ChangeHandler::add_payment(order, env.changes, &payment)
        })?;
        let (item_id, order) = self.track(committed);
        let item = Self::committed_payment(&order, &item_id)?;
        self.publish_added(&item);
        Ok(item)
    }

    fn committed_payment(order: &Order, item_id: &EntityId) -> OperationResult<PaymentItem> {
        order.any_payment(item_id)
            .cloned()
            .ok_or_else(|| OperationError::Internal(format!("payment item {} vanished on commit", item_id)))
    }

    fn publish_added(&self, item: &PaymentItem) {
        self.store.publish(FrontEvent::PaymentItemAdded(PaymentItemAddedEvent {
            order_id: item.order_id,
            payment_item_id: item.id,
            payment_type_id: item.payment_type_id,
            amount: item.amount,
            is_preliminary: item.is_preliminary,
            is_external: item.is_external,
            is_donation: item.is_donation,
            timestamp: Utc::now().timestamp(),
        }));
    }

    fn publish_deleted(&self, item: &PaymentItem) {
        self.store.publish(FrontEvent::PaymentItemDeleted(PaymentItemDeletedEvent {
            order_id: item.order_id,
            payment_item_id: item.id,
            timestamp: Utc::now().timestamp(),
        }));
    }

    fn publish_paid(&self, order: &Order, user: &User) {
        self.store.publish(FrontEvent::OrderPaid(OrderPaidEvent {
            order_id: order.id,
            user_id: user.id,
            result_sum: order.result_sum,
            timestamp: Utc::now().timestamp(),
        }));
    }

    fn set_cafe_session(&self, credentials: &Credentials, open: bool) -> OperationResult<CafeSession> {
        let committed = self.store.set_cafe_session(self.caller(), credentials, open)?;
        let session = self.track(committed);
        self.store.publish(FrontEvent::CafeSessionChanged(CafeSessionChangedEvent {
            session_id: session.id,
            is_open: session.is_open,
            user_id: credentials.user_id(),
            timestamp: Utc::now().timestamp(),
        }));
        Ok(session)
    }
}

#[async_trait]
impl Operations for FrontOperations {
    async fn get_credentials(&self) -> OperationResult<Credentials> {
        self.store.issue_credentials(&self.plugin_user)
    }

    async fn authenticate_by_pin(&self, pin: &str) -> OperationResult<Credentials> {
        self.store.authenticate_by_pin(pin)
    }

    async fn get_users(&self) -> OperationResult<Vec<User>> {
        self.store.users()
    }

    async fn get_orders(&self) -> OperationResult<Vec<Order>> {
        self.store.orders(ServiceKind::DineIn)
    }

    async fn get_delivery_orders(&self) -> OperationResult<Vec<Order>> {
        self.store.orders(ServiceKind::Delivery)
    }

    async fn get_order_by_id(&self, id: EntityId) -> OperationResult<Order> {
        self.store.order(&id)
    }

    async fn get_payment_types(&self) -> OperationResult<Vec<PaymentType>> {
        Ok(self.store.catalog()?.active_payment_types().cloned().collect())
    }

    async fn get_payment_types_to_pay_out_on_user(&self) -> OperationResult<Vec<PaymentType>> {
        Ok(self.store.catalog()?.payment_types_to_pay_out_on_user().cloned().collect())
    }

    async fn get_discount_types(&self) -> OperationResult<Vec<DiscountType>> {
        Ok(self.store.catalog()?.discount_types)
    }

    async fn get_donation_types_compatible_with(&self, order: &Order) -> OperationResult<Vec<DonationType>> {
        Ok(self.store.catalog()?.donation_types_compatible_with(order.kind).cloned().collect())
    }

    async fn get_cafe_session(&self) -> OperationResult<CafeSession> {
        self.store.cafe_session()
    }

    async fn submit_changes(&self, credentials: &Credentials, session: &EditSession) -> OperationResult<SubmittedEntities> {
        let committed = self.store.submit(self.caller(), credentials, session)?;
        Ok(self.track(committed))
    }

    async fn add_payment_item(
        &self,
        amount: i64,
        additional_data: Option<PaymentItemAdditionalData>,
        payment_type: &PaymentType,
        order: &Order,
        credentials: &Credentials,
    ) -> OperationResult<PaymentItem> {
        let payment = NewPayment {
            amount,
            payment_type_id: payment_type.id,
            additional_data,
            mode: PaymentMode::Regular,
        };
        self.add_payment(credentials, order, payment, "add_payment_item")
    }

    async fn add_preliminary_payment_item(
        &self,
        amount: i64,
        additional_data: Option<PaymentItemAdditionalData>,
        payment_type: &PaymentType,
        order: &Order,
        credentials: &Credentials,
    ) -> OperationResult<PaymentItem> {
        let payment = NewPayment {
            amount,
            payment_type_id: payment_type.id,
            additional_data,
            mode: PaymentMode::Preliminary,
        };
        self.add_payment(credentials, order, payment, "add_preliminary_payment_item")
    }

    async fn add_external_payment_item(
        &self,
        amount: i64,
        is_processed: bool,
        additional_data: Option<PaymentItemAdditionalData>,
        payment_type: &PaymentType,
        order: &Order,
        credentials: &Credentials,
    ) -> OperationResult<PaymentItem> {
        let payment = NewPayment {
            amount,
            payment_type_id: payment_type.id,
            additional_data,
            mode: PaymentMode::External { is_processed },
        };
        self.add_payment(credentials, order, payment, "add_external_payment_item")
    }

    async fn add_external_fiscalized_payment_item(
        &self,
        amount: i64,
        additional_data: Option<PaymentItemAdditionalData>,
        payment_type: &PaymentType,
        order: &Order,
        credentials: &Credentials,
    ) -> OperationResult<PaymentItem> {
        let payment = NewPayment {
            amount,
            payment_type_id: payment_type.id,
            additional_data,
            mode: PaymentMode::ExternalFiscalized,
        };
        self.add_payment(credentials, order, payment, "add_external_fiscalized_payment_item")
    }

    #[allow(clippy::too_many_arguments)]
    async fn add_donation(
        &self,
        credentials: &Credentials,
        order: &Order,
        donation_type: &DonationType,
        payment_type: &PaymentType,
        additional_data: Option<PaymentItemAdditionalData>,
        is_processed: bool,
        amount: i64,
    ) -> OperationResult<PaymentItem> {
        let donation = NewDonation {
            amount,
            donation_type_id: donation_type.id,
            payment_type_id: payment_type.id,
            additional_data,
            is_processed,
        };
        let committed = self.store.update_order(self.caller(), credentials, order, "add_donation", |order, env| {
            ChangeHandler::add_donation(order, env.changes, &donation)
        })?;
        let (item_id, order) = self.track(committed);
        let item = Self::committed_payment(&order, &item_id)?;
        self.publish_added(&item);
        Ok(item)
    }

    async fn change_payment_item_sum(
        &self,
        amount: i64,
        payment_item: &PaymentItem,
        order: &Order,
        credentials: &Credentials,
    ) -> OperationResult<PaymentItem> {
        let committed = self.store.update_order(self.caller(), credentials, order, "change_payment_item_sum", |order, _| {
            ChangeHandler::change_payment_sum(order, &payment_item.id, amount)
        })?;
        let ((), order) = self.track(committed);
        Self::committed_payment(&order, &payment_item.id)
    }

    async fn process_prepay(&self, credentials: &Credentials, order: &Order, payment_item: &PaymentItem) -> OperationResult<Order> {
        let committed = self.store.update_order(self.caller(), credentials, order, "process_prepay", |order, env| {
            env.require_open_cafe_session()?;
            ChangeHandler::process_prepay(order, &payment_item.id)
        })?;
        let ((), order) = self.track(committed);

        let amount = order.payment(&payment_item.id).map(|p| p.amount).unwrap_or(payment_item.amount);
        self.store.publish(FrontEvent::PrepayProcessed(PrepayProcessedEvent {
            order_id: order.id,
            payment_item_id: payment_item.id,
            amount,
            timestamp: Utc::now().timestamp(),
        }));
        Ok(order)
    }

    async fn delete_preliminary_payment_item(&self, payment_item: &PaymentItem, order: &Order, credentials: &Credentials) -> OperationResult<()> {
        let committed = self.store.update_order(self.caller(), credentials, order, "delete_preliminary_payment_item", |order, _| {
            ChangeHandler::delete_preliminary_payment(order, &payment_item.id)
        })?;
        let (removed, _) = self.track(committed);
        self.publish_deleted(&removed);
        Ok(())
    }

    async fn delete_donation(&self, credentials: &Credentials, order: &Order, donation: &PaymentItem) -> OperationResult<()> {
        let committed = self.store.update_order(self.caller(), credentials, order, "delete_donation", |order, _| {
            ChangeHandler::delete_donation(order, &donation.id)
        })?;
        let (removed, _) = self.track(committed);
        self.publish_deleted(&removed);
        Ok(())
    }

    async fn delete_external_fiscalized_payment_item(&self, payment_item: &PaymentItem, order: &Order, credentials: &Credentials) -> OperationResult<()> {
        let committed = self.store.update_order(self.caller(), credentials, order, "delete_external_fiscalized_payment_item", |order, _| {
            ChangeHandler::delete_external_fiscalized_payment(order, &payment_item.id)
        })?;
        let (removed, _) = self.track(committed);
        self.publish_deleted(&removed);
        Ok(())
    }

    async fn pay_order(&self, credentials: &Credentials, order: &Order) -> OperationResult<Order> {
        let committed = self.store.update_order(self.caller(), credentials, order, "pay_order", |order, env| {
            env.require_open_cafe_session()?;
            OrderManager::pay(order, env.user)?;
            Ok(env.user.clone())
        })?;
        let (user, order) = self.track(committed);
        self.publish_paid(&order, &user);
        Ok(order)
    }

    async fn pay_order_and_pay_out_on_user(
        &self,
        credentials: &Credentials,
        order: &Order,
        payment_type: &PaymentType,
        amount: i64,
    ) -> OperationResult<Order> {
        let payment = NewPayment {
            amount,
            payment_type_id: payment_type.id,
            additional_data: None,
            mode: PaymentMode::PayOutOnUser,
        };
        let committed = self.store.update_order(self.caller(), credentials, order, "pay_order_and_pay_out_on_user", |order, env| {
            env.require_open_cafe_session()?;
            if !env.user.has_personal_session {
                return Err(front_core::ValidationError::NoPersonalSession(env.user.name.clone()).into());
            }
            let item_id = ChangeHandler::add_payment(order, env.changes, &payment)?;
            let closed = order.paid_sum() >= order.result_sum;
            if closed {
                OrderManager::pay(order, env.user)?;
            }
            Ok((item_id, closed, env.user.clone()))
        })?;
        let ((item_id, closed, user), order) = self.track(committed);

        self.publish_added(&Self::committed_payment(&order, &item_id)?);
        if closed {
            self.publish_paid(&order, &user);
        }
        Ok(order)
    }

    async fn open_cafe_session(&self, credentials: &Credentials) -> OperationResult<CafeSession> {
        self.set_cafe_session(credentials, true)
    }

    async fn close_cafe_session(&self, credentials: &Credentials) -> OperationResult<CafeSession> {
        self.set_cafe_session(credentials, false)
    }

    async fn enter_continuous(&self, credentials: &Credentials, body: ContinuousBody) -> OperationResult<()> {
        self.run_continuous(credentials, move |scoped| body(scoped)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::Config;
    use front_core::ValidationError;
    use front_order::{OrderStatus, PaymentItemStatus};
    use futures_util::FutureExt;

    fn operations() -> FrontOperations {
        let config = Config::default();
        let store = EntityStore::from_config(&config).unwrap();
        FrontOperations::new(Arc::new(store), &config.plugin.user_name)
    }

    async fn new_dine_in(ops: &FrontOperations) -> Order {
        ops.get_orders().await.unwrap()
            .into_iter()
            .rfind(|o| o.status == OrderStatus::New)
            .unwrap()
    }

    async fn cash(ops: &FrontOperations) -> PaymentType {
        ops.get_payment_types().await.unwrap()
            .into_iter()
            .find(|pt| pt.is_named("cash"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_payment_item_bumps_version() {
        let ops = operations();
        let credentials = ops.get_credentials().await.unwrap();
        let order = new_dine_in(&ops).await;
        let cash = cash(&ops).await;

        let item = ops.add_payment_item(50, None, &cash, &order, &credentials).await.unwrap();
        assert_eq!(item.status, PaymentItemStatus::New);

        let refreshed = ops.get_order_by_id(order.id).await.unwrap();
        assert_eq!(refreshed.version, order.version + 1);
        assert!(refreshed.payment(&item.id).is_some());

        // The stale snapshot no longer works
        let err = ops.add_payment_item(50, None, &cash, &order, &credentials).await.unwrap_err();
        assert!(matches!(err, OperationError::EntityModified { .. }));
    }

    #[tokio::test]
    async fn test_pay_order_needs_open_cafe_session() {
        let ops = operations();
        let credentials = ops.get_credentials().await.unwrap();
        ops.close_cafe_session(&credentials).await.unwrap();

        let cashier = ops.authenticate_by_pin("777").await.unwrap();
        let order = new_dine_in(&ops).await;
        let err = ops.pay_order(&cashier, &order).await.unwrap_err();
        assert_eq!(err, OperationError::Validation(ValidationError::CafeSessionClosed));
    }

    #[tokio::test]
    async fn test_pay_out_on_user_closes_covered_order() {
        let ops = operations();
        let cashier = ops.authenticate_by_pin("777").await.unwrap();
        let order = new_dine_in(&ops).await;
        let cash = ops.get_payment_types_to_pay_out_on_user().await.unwrap()
            .into_iter()
            .find(|pt| pt.is_named("cash"))
            .unwrap();

        let half = ops.pay_order_and_pay_out_on_user(&cashier, &order, &cash, order.result_sum / 2).await.unwrap();
        assert_eq!(half.status, OrderStatus::New);

        let rest = half.result_sum - half.paid_sum();
        let paid = ops.pay_order_and_pay_out_on_user(&cashier, &half, &cash, rest).await.unwrap();
        assert_eq!(paid.status, OrderStatus::Closed);
        assert!(paid.payments.iter().all(|p| p.status == PaymentItemStatus::Processed));
    }

    #[tokio::test]
    async fn test_run_continuous_releases_locks_on_failure() {
        let ops = operations();
        let credentials = ops.get_credentials().await.unwrap();
        let order = new_dine_in(&ops).await;
        let cash = cash(&ops).await;

        let (creds, snapshot, payment_type) = (credentials.clone(), order.clone(), cash.clone());
        let result: OperationResult<()> = ops.run_continuous(&credentials, move |scoped| async move {
            scoped.add_payment_item(50, None, &payment_type, &snapshot, &creds).await?;
            assert_eq!(scoped.scope().unwrap().locked(), vec![snapshot.id]);
            Err::<(), _>(OperationError::from(ValidationError::EmptyGuestName))
        }.boxed()).await;

        assert!(result.is_err());
        assert_eq!(ops.store().lock_owner(&order.id).unwrap(), None);
    }

    #[tokio::test]
    async fn test_nested_run_continuous_joins_outer_scope() {
        let ops = operations();
        let credentials = ops.get_credentials().await.unwrap();

        let creds = credentials.clone();
        let ids = ops.run_continuous(&credentials, move |outer| async move {
            let outer_id = outer.scope().map(|s| s.id());
            let inner_id = outer.run_continuous(&creds, |inner| async move {
                Ok::<_, OperationError>(inner.scope().map(|s| s.id()))
            }.boxed()).await?;
            Ok::<_, OperationError>((outer_id, inner_id))
        }.boxed()).await.unwrap();

        assert!(ids.0.is_some());
        assert_eq!(ids.0, ids.1);
    }

    #[tokio::test]
    async fn test_run_continuous_through_trait_object() {
        use front_order::OperationsExt;

        let ops = operations();
        let credentials = ops.get_credentials().await.unwrap();
        let order = new_dine_in(&ops).await;
        let cash = cash(&ops).await;
        let outside = ops.clone();

        let handle: &dyn Operations = &ops;
        let (creds, snapshot, payment_type) = (credentials.clone(), order.clone(), cash.clone());
        let item = handle.run_continuous(&credentials, move |scoped| async move {
            let item = scoped.add_payment_item(50, None, &payment_type, &snapshot, &creds).await?;

            let current = outside.get_order_by_id(snapshot.id).await?;
            let err = outside.add_payment_item(50, None, &payment_type, &current, &creds).await.unwrap_err();
            assert_eq!(err, OperationError::EntityAlreadyInUse { id: snapshot.id });

            // A nested call through the trait joins the running scope
            let current = scoped.get_order_by_id(snapshot.id).await?;
            let inner_creds = creds.clone();
            let again = scoped.run_continuous(&creds, move |inner| async move {
                inner.add_payment_item(25, None, &payment_type, &current, &inner_creds).await
            }.boxed()).await?;
            assert_eq!(again.amount, 25);
            Ok::<_, OperationError>(item)
        }.boxed()).await.unwrap();

        assert_eq!(item.amount, 50);
        assert_eq!(ops.store().lock_owner(&order.id).unwrap(), None);
        let refreshed = ops.get_order_by_id(order.id).await.unwrap();
        assert_eq!(refreshed.version, order.version + 2);
    }
}
