use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use front_catalog::{DiscountType, DonationType, PaymentType};
use front_core::{Credentials, EntityId, OperationError, OperationResult, PaymentItemAdditionalData, User};

use crate::models::{CafeSession, Order, PaymentItem};
use crate::session::{EditSession, SubmittedEntities};

/// Body of a continuous operation, run against the scoped handle
pub type ContinuousBody = Box<dyn for<'a> FnOnce(&'a dyn Operations) -> BoxFuture<'a, OperationResult<()>> + Send>;

/// Box a closure as a [`ContinuousBody`], pinning down its higher-ranked signature
pub fn continuous_body<F>(body: F) -> ContinuousBody
where
    F: for<'a> FnOnce(&'a dyn Operations) -> BoxFuture<'a, OperationResult<()>> + Send + 'static,
{
    Box::new(body)
}

/// The operations façade the host hands to plugins.
///
/// Implemented by the long-lived façade and by the handle a continuous
/// operation passes to its body; workflows take whichever they are given as
/// `&dyn Operations`. Every mutation takes the caller's snapshot of the order
/// and fails with `EntityModified` when that snapshot is stale.
#[async_trait]
pub trait Operations: Send + Sync {
    /// Credentials of the user the plugin acts for
    async fn get_credentials(&self) -> OperationResult<Credentials>;

    async fn authenticate_by_pin(&self, pin: &str) -> OperationResult<Credentials>;

    async fn get_users(&self) -> OperationResult<Vec<User>>;

    /// All dine-in orders, oldest first
    async fn get_orders(&self) -> OperationResult<Vec<Order>>;

    /// All delivery orders, oldest first
    async fn get_delivery_orders(&self) -> OperationResult<Vec<Order>>;

    async fn get_order_by_id(&self, id: EntityId) -> OperationResult<Order>;

    async fn get_payment_types(&self) -> OperationResult<Vec<PaymentType>>;

    async fn get_payment_types_to_pay_out_on_user(&self) -> OperationResult<Vec<PaymentType>>;

    async fn get_discount_types(&self) -> OperationResult<Vec<DiscountType>>;

    async fn get_donation_types_compatible_with(&self, order: &Order) -> OperationResult<Vec<DonationType>>;

    async fn get_cafe_session(&self) -> OperationResult<CafeSession>;

    fn create_edit_session(&self) -> EditSession {
        EditSession::new()
    }

    /// Commit every staged operation of `session` or none of them
    async fn submit_changes(&self, credentials: &Credentials, session: &EditSession) -> OperationResult<SubmittedEntities>;

    async fn add_payment_item(
        &self,
        amount: i64,
        additional_data: Option<PaymentItemAdditionalData>,
        payment_type: &PaymentType,
        order: &Order,
        credentials: &Credentials,
    ) -> OperationResult<PaymentItem>;

    async fn add_preliminary_payment_item(
        &self,
        amount: i64,
        additional_data: Option<PaymentItemAdditionalData>,
        payment_type: &PaymentType,
        order: &Order,
        credentials: &Credentials,
    ) -> OperationResult<PaymentItem>;

    async fn add_external_payment_item(
        &self,
        amount: i64,
        is_processed: bool,
        additional_data: Option<PaymentItemAdditionalData>,
        payment_type: &PaymentType,
        order: &Order,
        credentials: &Credentials,
    ) -> OperationResult<PaymentItem>;

    async fn add_external_fiscalized_payment_item(
        &self,
        amount: i64,
        additional_data: Option<PaymentItemAdditionalData>,
        payment_type: &PaymentType,
        order: &Order,
        credentials: &Credentials,
    ) -> OperationResult<PaymentItem>;

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
    ) -> OperationResult<PaymentItem>;

    async fn change_payment_item_sum(
        &self,
        amount: i64,
        payment_item: &PaymentItem,
        order: &Order,
        credentials: &Credentials,
    ) -> OperationResult<PaymentItem>;

    /// Convert a payment into a prepayment. Irreversible.
    async fn process_prepay(&self, credentials: &Credentials, order: &Order, payment_item: &PaymentItem) -> OperationResult<Order>;

    async fn delete_preliminary_payment_item(&self, payment_item: &PaymentItem, order: &Order, credentials: &Credentials) -> OperationResult<()>;

    async fn delete_donation(&self, credentials: &Credentials, order: &Order, donation: &PaymentItem) -> OperationResult<()>;

    async fn delete_external_fiscalized_payment_item(&self, payment_item: &PaymentItem, order: &Order, credentials: &Credentials) -> OperationResult<()>;

    /// Close the order with the payments already on it
    async fn pay_order(&self, credentials: &Credentials, order: &Order) -> OperationResult<Order>;

    /// Add a payment accounted as the acting user's debt; closes the order once covered
    async fn pay_order_and_pay_out_on_user(
        &self,
        credentials: &Credentials,
        order: &Order,
        payment_type: &PaymentType,
        amount: i64,
    ) -> OperationResult<Order>;

    async fn open_cafe_session(&self, credentials: &Credentials) -> OperationResult<CafeSession>;

    async fn close_cafe_session(&self, credentials: &Credentials) -> OperationResult<CafeSession>;

    /// Run `body` as one continuous operation: whatever it changes through
    /// the handle it receives stays locked for other callers until it ends.
    /// Called from inside a running body, joins the enclosing operation.
    async fn enter_continuous(&self, credentials: &Credentials, body: ContinuousBody) -> OperationResult<()>;
}

/// Typed front end of [`Operations::enter_continuous`]
#[async_trait]
pub trait OperationsExt: Operations {
    async fn run_continuous<T, F>(&self, credentials: &Credentials, body: F) -> OperationResult<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a dyn Operations) -> BoxFuture<'a, OperationResult<T>> + Send + 'static;
}

#[async_trait]
impl<O: Operations + ?Sized> OperationsExt for O {
    async fn run_continuous<T, F>(&self, credentials: &Credentials, body: F) -> OperationResult<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a dyn Operations) -> BoxFuture<'a, OperationResult<T>> + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(None));
        let sink = slot.clone();

        self.enter_continuous(credentials, continuous_body(move |scoped| async move {
            let value = body(scoped).await?;
            *sink.lock().map_err(|_| poisoned())? = Some(value);
            Ok::<_, OperationError>(())
        }.boxed())).await?;

        let value = slot.lock().map_err(|_| poisoned())?.take();
        value.ok_or_else(|| OperationError::Internal("continuous operation produced no result".to_string()))
    }
}

fn poisoned() -> OperationError {
    OperationError::Internal("continuous operation result is poisoned".to_string())
}
