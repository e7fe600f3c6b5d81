//! The demo payment actions. Each one reads what it needs from the façade,
//! picks its fixtures and performs a single scenario.

use futures_util::FutureExt;
use tracing::info;

use front_catalog::{PaymentType, PaymentTypeKind};
use front_core::{OperationError, PaymentAdditionalData, PaymentItemAdditionalData};
use front_order::{CafeSession, Operations, OperationsExt, Order, PaymentItem};
use front_store::app_config::PluginSettings;

use crate::error::{WorkflowError, WorkflowResult};
use crate::fixtures::{
    donation_type_accepting, external_processable_payment_type, last_order_with_status,
    last_user_with_prefix, payment_type_of_kind, payment_type_with_discount, payment_type_with_prefix,
    CLOSED, NEW, NEW_OR_BILL, NOT_DELETED,
};

/// Guest seated on the order created inside a continuous operation
pub const GUEST_NAME: &str = "Herbert";

// Minor currency units
const REGULAR_AMOUNT: i64 = 5000;
const PRELIMINARY_CASH_AMOUNT: i64 = 10000;
const PRELIMINARY_CARD_AMOUNT: i64 = 15000;
const PRELIMINARY_CREDIT_AMOUNT: i64 = 20000;
const PREPAY_AMOUNT: i64 = 15000;
const FISCALIZED_AMOUNT: i64 = 5000;
const CONTINUOUS_PREPAY_AMOUNT: i64 = 4200;
const COURIER_CASH_AMOUNT: i64 = 100000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    AddCashPayment,
    AddCardPayment,
    AddCashPreliminaryPayment,
    AddCardPreliminaryPayment,
    AddCreditPreliminaryPayment,
    DeletePreliminaryPayment,
    AddCashPreliminaryPaymentWithDiscount,
    DeletePreliminaryPaymentWithDiscount,
    AddCashExternalNotProcessedPayment,
    AddCardExternalNotProcessedPayment,
    AddPluginExternalNotProcessedPayment,
    AddCashExternalProcessedPayment,
    AddCardExternalProcessedPayment,
    AddCashExternalProcessedPrepay,
    AddCardExternalProcessedPrepay,
    AddPluginExternalNotProcessedPrepay,
    AddCashProcessedDonation,
    AddCardProcessedDonation,
    AddPluginProcessedDonation,
    AddPluginNotProcessedDonation,
    DeleteDonation,
    AddExternalFiscalizedPayment,
    AddExternalFiscalizedPrepay,
    DeleteExternalFiscalizedPayment,
    PayOrderOnCash,
    PayOrderOnCard,
    PayOrderWithExistingPayments,
    OpenCafeSession,
    CloseCafeSession,
    CreateOrderAndProcessPrepayments,
    AddAndProcessPreliminaryPayment,
}

impl Action {
    /// Every action, in the order the operator panel lists them
    pub const ALL: [Action; 31] = [
        Action::AddCashPayment,
        Action::AddCardPayment,
        Action::AddCashPreliminaryPayment,
        Action::AddCardPreliminaryPayment,
        Action::AddCreditPreliminaryPayment,
        Action::DeletePreliminaryPayment,
        Action::AddCashPreliminaryPaymentWithDiscount,
        Action::DeletePreliminaryPaymentWithDiscount,
        Action::AddCashExternalNotProcessedPayment,
        Action::AddCardExternalNotProcessedPayment,
        Action::AddPluginExternalNotProcessedPayment,
        Action::AddCashExternalProcessedPayment,
        Action::AddCardExternalProcessedPayment,
        Action::AddCashExternalProcessedPrepay,
        Action::AddCardExternalProcessedPrepay,
        Action::AddPluginExternalNotProcessedPrepay,
        Action::AddCashProcessedDonation,
        Action::AddCardProcessedDonation,
        Action::AddPluginProcessedDonation,
        Action::AddPluginNotProcessedDonation,
        Action::DeleteDonation,
        Action::AddExternalFiscalizedPayment,
        Action::AddExternalFiscalizedPrepay,
        Action::DeleteExternalFiscalizedPayment,
        Action::PayOrderOnCash,
        Action::PayOrderOnCard,
        Action::PayOrderWithExistingPayments,
        Action::OpenCafeSession,
        Action::CloseCafeSession,
        Action::CreateOrderAndProcessPrepayments,
        Action::AddAndProcessPreliminaryPayment,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Action::AddCashPayment => "Add cash payment",
            Action::AddCardPayment => "Add card payment",
            Action::AddCashPreliminaryPayment => "Add cash preliminary payment",
            Action::AddCardPreliminaryPayment => "Add card preliminary payment",
            Action::AddCreditPreliminaryPayment => "Add credit preliminary payment",
            Action::DeletePreliminaryPayment => "Delete preliminary payment",
            Action::AddCashPreliminaryPaymentWithDiscount => "Add cash preliminary payment with discount",
            Action::DeletePreliminaryPaymentWithDiscount => "Delete preliminary payment with discount",
            Action::AddCashExternalNotProcessedPayment => "Add cash external not processed payment",
            Action::AddCardExternalNotProcessedPayment => "Add card external not processed payment",
            Action::AddPluginExternalNotProcessedPayment => "Add plugin external not processed payment",
            Action::AddCashExternalProcessedPayment => "Add cash external processed payment",
            Action::AddCardExternalProcessedPayment => "Add card external processed payment",
            Action::AddCashExternalProcessedPrepay => "Add cash external processed prepay",
            Action::AddCardExternalProcessedPrepay => "Add card external processed prepay",
            Action::AddPluginExternalNotProcessedPrepay => "Add plugin external not processed prepay",
            Action::AddCashProcessedDonation => "Add cash processed donation",
            Action::AddCardProcessedDonation => "Add card processed donation",
            Action::AddPluginProcessedDonation => "Add plugin processed donation",
            Action::AddPluginNotProcessedDonation => "Add plugin not processed donation",
            Action::DeleteDonation => "Delete donation",
            Action::AddExternalFiscalizedPayment => "Add external fiscalized payment",
            Action::AddExternalFiscalizedPrepay => "Add external fiscalized prepay",
            Action::DeleteExternalFiscalizedPayment => "Delete external fiscalized payment",
            Action::PayOrderOnCash => "Pay order on cash",
            Action::PayOrderOnCard => "Pay order on card",
            Action::PayOrderWithExistingPayments => "Pay order with existing payments",
            Action::OpenCafeSession => "Open cafe session",
            Action::CloseCafeSession => "Close cafe session",
            Action::CreateOrderAndProcessPrepayments => "Create order and process prepayments",
            Action::AddAndProcessPreliminaryPayment => "Add and process preliminary payment",
        }
    }
}

/// Run one action against the façade
pub async fn run_action(ops: &dyn Operations, settings: &PluginSettings, action: Action) -> WorkflowResult<()> {
    info!("Running action: {}", action.label());
    match action {
        Action::AddCashPayment => add_cash_payment(ops).await.map(drop),
        Action::AddCardPayment => add_card_payment(ops, settings).await.map(drop),
        Action::AddCashPreliminaryPayment => add_cash_preliminary_payment(ops).await.map(drop),
        Action::AddCardPreliminaryPayment => add_card_preliminary_payment(ops, settings).await.map(drop),
        Action::AddCreditPreliminaryPayment => add_credit_preliminary_payment(ops, settings).await.map(drop),
        Action::DeletePreliminaryPayment => delete_preliminary_payment(ops).await,
        Action::AddCashPreliminaryPaymentWithDiscount => add_cash_preliminary_payment_with_discount(ops).await.map(drop),
        Action::DeletePreliminaryPaymentWithDiscount => delete_preliminary_payment_with_discount(ops).await.map(drop),
        Action::AddCashExternalNotProcessedPayment => add_cash_external_payment(ops, false).await.map(drop),
        Action::AddCardExternalNotProcessedPayment => add_card_external_payment(ops, settings, false).await.map(drop),
        Action::AddPluginExternalNotProcessedPayment => add_plugin_external_not_processed_payment(ops, settings).await.map(drop),
        Action::AddCashExternalProcessedPayment => add_cash_external_payment(ops, true).await.map(drop),
        Action::AddCardExternalProcessedPayment => add_card_external_payment(ops, settings, true).await.map(drop),
        Action::AddCashExternalProcessedPrepay => add_cash_external_processed_prepay(ops).await.map(drop),
        Action::AddCardExternalProcessedPrepay => add_card_external_processed_prepay(ops, settings).await.map(drop),
        Action::AddPluginExternalNotProcessedPrepay => add_plugin_external_not_processed_prepay(ops, settings).await.map(drop),
        Action::AddCashProcessedDonation => add_cash_processed_donation(ops).await.map(drop),
        Action::AddCardProcessedDonation => add_card_processed_donation(ops, settings).await.map(drop),
        Action::AddPluginProcessedDonation => add_plugin_donation(ops, settings, true).await.map(drop),
        Action::AddPluginNotProcessedDonation => add_plugin_donation(ops, settings, false).await.map(drop),
        Action::DeleteDonation => delete_donation(ops).await,
        Action::AddExternalFiscalizedPayment => add_external_fiscalized_payment(ops, settings).await.map(drop),
        Action::AddExternalFiscalizedPrepay => add_external_fiscalized_prepay(ops, settings).await.map(drop),
        Action::DeleteExternalFiscalizedPayment => delete_external_fiscalized_payment(ops).await,
        Action::PayOrderOnCash => pay_order_on_cash_and_pay_out_on_user(ops, settings).await.map(drop),
        Action::PayOrderOnCard => pay_order_on_card_and_pay_out_on_user(ops, settings).await.map(drop),
        Action::PayOrderWithExistingPayments => pay_order_with_existing_payments(ops, settings).await.map(drop),
        Action::OpenCafeSession => open_cafe_session(ops).await.map(drop),
        Action::CloseCafeSession => close_cafe_session(ops).await.map(drop),
        Action::CreateOrderAndProcessPrepayments => create_order_and_process_prepayments(ops).await.map(drop),
        Action::AddAndProcessPreliminaryPayment => add_and_process_preliminary_payment(ops).await.map(drop),
    }
}

// Fixture lookups through the façade

async fn new_order(ops: &dyn Operations) -> WorkflowResult<Order> {
    last_order_with_status(ops.get_orders().await?, NEW)
}

async fn new_delivery_order(ops: &dyn Operations) -> WorkflowResult<Order> {
    last_order_with_status(ops.get_delivery_orders().await?, NEW)
}

async fn open_delivery_order(ops: &dyn Operations) -> WorkflowResult<Order> {
    last_order_with_status(ops.get_delivery_orders().await?, NEW_OR_BILL)
}

async fn cash(ops: &dyn Operations) -> WorkflowResult<PaymentType> {
    payment_type_of_kind(&ops.get_payment_types().await?, PaymentTypeKind::Cash, None)
}

async fn card(ops: &dyn Operations, settings: &PluginSettings) -> WorkflowResult<PaymentType> {
    payment_type_of_kind(&ops.get_payment_types().await?, PaymentTypeKind::Card, Some(settings.card_payment_type.as_str()))
}

async fn plugin_payment_type(ops: &dyn Operations, settings: &PluginSettings) -> WorkflowResult<PaymentType> {
    payment_type_of_kind(&ops.get_payment_types().await?, PaymentTypeKind::External, Some(settings.external_payment_type.as_str()))
}

fn card_data(settings: &PluginSettings) -> Option<PaymentItemAdditionalData> {
    Some(PaymentItemAdditionalData::card(&settings.card_number))
}

/// Payload the demo payment system gets for payments it should take silently
fn silent_pay_data() -> WorkflowResult<Option<PaymentItemAdditionalData>> {
    let data = PaymentAdditionalData { silent_pay: true }.into_additional_data()?;
    Ok(Some(data))
}

fn missing_submitted(what: &str) -> OperationError {
    OperationError::Internal(format!("submitted entities have no {}", what))
}

// Regular payments

pub async fn add_cash_payment(ops: &dyn Operations) -> WorkflowResult<PaymentItem> {
    let order = new_order(ops).await?;
    let payment_type = cash(ops).await?;
    let credentials = ops.get_credentials().await?;
    Ok(ops.add_payment_item(REGULAR_AMOUNT, None, &payment_type, &order, &credentials).await?)
}

pub async fn add_card_payment(ops: &dyn Operations, settings: &PluginSettings) -> WorkflowResult<PaymentItem> {
    let order = new_order(ops).await?;
    let payment_type = card(ops, settings).await?;
    let credentials = ops.get_credentials().await?;
    Ok(ops.add_payment_item(REGULAR_AMOUNT, card_data(settings), &payment_type, &order, &credentials).await?)
}

// Preliminary payments

pub async fn add_cash_preliminary_payment(ops: &dyn Operations) -> WorkflowResult<PaymentItem> {
    let order = new_delivery_order(ops).await?;
    let payment_type = cash(ops).await?;
    let credentials = ops.get_credentials().await?;
    Ok(ops.add_preliminary_payment_item(PRELIMINARY_CASH_AMOUNT, None, &payment_type, &order, &credentials).await?)
}

pub async fn add_card_preliminary_payment(ops: &dyn Operations, settings: &PluginSettings) -> WorkflowResult<PaymentItem> {
    let order = new_delivery_order(ops).await?;
    let payment_type = card(ops, settings).await?;
    let credentials = ops.get_credentials().await?;
    Ok(ops.add_preliminary_payment_item(PRELIMINARY_CARD_AMOUNT, card_data(settings), &payment_type, &order, &credentials).await?)
}

/// Preliminary payment on credit of a counteragent
pub async fn add_credit_preliminary_payment(ops: &dyn Operations, settings: &PluginSettings) -> WorkflowResult<PaymentItem> {
    let order = open_delivery_order(ops).await?;
    let payment_type = payment_type_with_prefix(
        &ops.get_payment_types().await?,
        PaymentTypeKind::Credit,
        &settings.credit_payment_type_prefix,
    )?;
    let counteragent = last_user_with_prefix(&ops.get_users().await?, &settings.counteragent_prefix)?;
    let data = PaymentItemAdditionalData::credit(counteragent.id);
    let credentials = ops.get_credentials().await?;
    Ok(ops.add_preliminary_payment_item(PRELIMINARY_CREDIT_AMOUNT, Some(data), &payment_type, &order, &credentials).await?)
}

pub async fn delete_preliminary_payment(ops: &dyn Operations) -> WorkflowResult<()> {
    let order = open_delivery_order(ops).await?;
    let item = order.payments.iter()
        .find(|p| p.is_preliminary)
        .ok_or_else(|| WorkflowError::fixture("preliminary payment"))?;
    let credentials = ops.get_credentials().await?;
    Ok(ops.delete_preliminary_payment_item(item, &order, &credentials).await?)
}

/// Preliminary cash payment together with the discount its payment type grants, atomically
pub async fn add_cash_preliminary_payment_with_discount(ops: &dyn Operations) -> WorkflowResult<Order> {
    let order = open_delivery_order(ops).await?;
    let payment_type = payment_type_with_discount(&ops.get_payment_types().await?, PaymentTypeKind::Cash)?;
    let discount_type = ops.get_discount_types().await?
        .into_iter()
        .find(|d| Some(d.id) == payment_type.discount_type_id)
        .ok_or_else(|| WorkflowError::fixture(format!("discount of {}", payment_type.name)))?;

    let mut session = ops.create_edit_session();
    session.add_discount(&discount_type, &order);
    session.add_preliminary_payment_item(PRELIMINARY_CASH_AMOUNT, None, &payment_type, &order);

    let credentials = ops.get_credentials().await?;
    ops.submit_changes(&credentials, &session).await?;
    Ok(ops.get_order_by_id(order.id).await?)
}

/// Undo [`add_cash_preliminary_payment_with_discount`] in one session
pub async fn delete_preliminary_payment_with_discount(ops: &dyn Operations) -> WorkflowResult<Order> {
    let order = open_delivery_order(ops).await?;
    let payment_types = ops.get_payment_types().await?;

    let (item, discount_type_id) = order.payments.iter()
        .filter(|p| p.is_preliminary)
        .find_map(|p| {
            payment_types.iter()
                .find(|pt| pt.id == p.payment_type_id)
                .and_then(|pt| pt.discount_type_id)
                .map(|discount| (p, discount))
        })
        .ok_or_else(|| WorkflowError::fixture("preliminary payment with a discount"))?;
    let discount = order.discounts.iter()
        .rev()
        .find(|d| d.discount_type.id == discount_type_id)
        .ok_or_else(|| WorkflowError::fixture("discount granted by the payment type"))?;

    let mut session = ops.create_edit_session();
    session.delete_discount(discount, &order);
    session.delete_preliminary_payment_item(item, &order);

    let credentials = ops.get_credentials().await?;
    ops.submit_changes(&credentials, &session).await?;
    Ok(ops.get_order_by_id(order.id).await?)
}

// External payments

pub async fn add_cash_external_payment(ops: &dyn Operations, is_processed: bool) -> WorkflowResult<PaymentItem> {
    let order = new_order(ops).await?;
    let payment_type = cash(ops).await?;
    let credentials = ops.get_credentials().await?;
    Ok(ops.add_external_payment_item(order.result_sum / 2, is_processed, None, &payment_type, &order, &credentials).await?)
}

pub async fn add_card_external_payment(ops: &dyn Operations, settings: &PluginSettings, is_processed: bool) -> WorkflowResult<PaymentItem> {
    let order = new_order(ops).await?;
    let payment_type = card(ops, settings).await?;
    let credentials = ops.get_credentials().await?;
    Ok(ops.add_external_payment_item(order.result_sum / 2, is_processed, card_data(settings), &payment_type, &order, &credentials).await?)
}

pub async fn add_plugin_external_not_processed_payment(ops: &dyn Operations, settings: &PluginSettings) -> WorkflowResult<PaymentItem> {
    let order = new_order(ops).await?;
    let payment_type = plugin_payment_type(ops, settings).await?;
    let credentials = ops.get_credentials().await?;
    Ok(ops.add_external_payment_item(order.result_sum / 2, false, silent_pay_data()?, &payment_type, &order, &credentials).await?)
}

// External payments turned into prepayments

async fn add_external_prepay(
    ops: &dyn Operations,
    payment_type: &PaymentType,
    additional_data: Option<PaymentItemAdditionalData>,
    is_processed: bool,
) -> WorkflowResult<Order> {
    let order = new_order(ops).await?;
    let credentials = ops.get_credentials().await?;
    let item = ops.add_external_payment_item(PREPAY_AMOUNT, is_processed, additional_data, payment_type, &order, &credentials).await?;

    // Adding the payment moved the order on
    let order = ops.get_order_by_id(order.id).await?;
    Ok(ops.process_prepay(&credentials, &order, &item).await?)
}

pub async fn add_cash_external_processed_prepay(ops: &dyn Operations) -> WorkflowResult<Order> {
    let payment_type = cash(ops).await?;
    add_external_prepay(ops, &payment_type, None, true).await
}

pub async fn add_card_external_processed_prepay(ops: &dyn Operations, settings: &PluginSettings) -> WorkflowResult<Order> {
    let payment_type = card(ops, settings).await?;
    add_external_prepay(ops, &payment_type, card_data(settings), true).await
}

pub async fn add_plugin_external_not_processed_prepay(ops: &dyn Operations, settings: &PluginSettings) -> WorkflowResult<Order> {
    let payment_type = plugin_payment_type(ops, settings).await?;
    add_external_prepay(ops, &payment_type, silent_pay_data()?, false).await
}

// Donations

async fn add_donation<F>(
    ops: &dyn Operations,
    order: Order,
    accept: F,
    additional_data: Option<PaymentItemAdditionalData>,
    is_processed: bool,
    divisor: i64,
) -> WorkflowResult<PaymentItem>
where
    F: Fn(&PaymentType) -> bool,
{
    let donation_types = ops.get_donation_types_compatible_with(&order).await?;
    let payment_types = ops.get_payment_types().await?;
    let (donation_type, payment_type) = donation_type_accepting(&donation_types, &payment_types, accept)?;

    let credentials = ops.get_credentials().await?;
    let item = ops.add_donation(
        &credentials,
        &order,
        &donation_type,
        &payment_type,
        additional_data,
        is_processed,
        order.result_sum / divisor,
    ).await?;

    let order = ops.get_order_by_id(order.id).await?;
    if order.donation(&item.id).is_none() {
        return Err(OperationError::Internal(format!("donation {} is missing from order {}", item.id, order.id)).into());
    }
    Ok(item)
}

pub async fn add_cash_processed_donation(ops: &dyn Operations) -> WorkflowResult<PaymentItem> {
    let order = new_order(ops).await?;
    add_donation(ops, order, |pt| pt.kind == PaymentTypeKind::Cash, None, true, 10).await
}

/// Tips on an already closed order
pub async fn add_card_processed_donation(ops: &dyn Operations, settings: &PluginSettings) -> WorkflowResult<PaymentItem> {
    let order = last_order_with_status(ops.get_orders().await?, CLOSED)?;
    let card_name = settings.card_payment_type.as_str();
    add_donation(
        ops,
        order,
        |pt| pt.kind == PaymentTypeKind::Card && pt.is_named(card_name),
        card_data(settings),
        true,
        4,
    ).await
}

pub async fn add_plugin_donation(ops: &dyn Operations, settings: &PluginSettings, is_processed: bool) -> WorkflowResult<PaymentItem> {
    let order = new_order(ops).await?;
    let name = settings.external_payment_type.as_str();
    let accept = |pt: &PaymentType| pt.kind == PaymentTypeKind::External && pt.name == name;
    if is_processed {
        add_donation(ops, order, accept, None, true, 3).await
    } else {
        add_donation(ops, order, accept, silent_pay_data()?, false, 2).await
    }
}

pub async fn delete_donation(ops: &dyn Operations) -> WorkflowResult<()> {
    let order = last_order_with_status(ops.get_orders().await?, NOT_DELETED)?;
    let donation = order.donations.last()
        .ok_or_else(|| WorkflowError::fixture("donation"))?;
    let credentials = ops.get_credentials().await?;
    Ok(ops.delete_donation(&credentials, &order, donation).await?)
}

// Externally fiscalized payments

pub async fn add_external_fiscalized_payment(ops: &dyn Operations, settings: &PluginSettings) -> WorkflowResult<PaymentItem> {
    let order = new_order(ops).await?;
    let payment_type = card(ops, settings).await?;
    let credentials = ops.get_credentials().await?;
    Ok(ops.add_external_fiscalized_payment_item(FISCALIZED_AMOUNT, card_data(settings), &payment_type, &order, &credentials).await?)
}

pub async fn add_external_fiscalized_prepay(ops: &dyn Operations, settings: &PluginSettings) -> WorkflowResult<Order> {
    let order = new_order(ops).await?;
    let payment_type = card(ops, settings).await?;
    let credentials = ops.get_credentials().await?;
    let item = ops.add_external_fiscalized_payment_item(FISCALIZED_AMOUNT, card_data(settings), &payment_type, &order, &credentials).await?;

    let order = ops.get_order_by_id(order.id).await?;
    Ok(ops.process_prepay(&credentials, &order, &item).await?)
}

pub async fn delete_external_fiscalized_payment(ops: &dyn Operations) -> WorkflowResult<()> {
    let order = new_order(ops).await?;
    let item = order.payments.iter()
        .rev()
        .find(|p| p.is_fiscalized_externally)
        .ok_or_else(|| WorkflowError::fixture("externally fiscalized payment"))?;
    let credentials = ops.get_credentials().await?;
    Ok(ops.delete_external_fiscalized_payment_item(item, &order, &credentials).await?)
}

// Paying orders remotely; needs a user with an open personal session

async fn pay_order_and_pay_out_on_user(
    ops: &dyn Operations,
    settings: &PluginSettings,
    kind: PaymentTypeKind,
    name: Option<&str>,
) -> WorkflowResult<Order> {
    let order = last_order_with_status(ops.get_orders().await?, NEW_OR_BILL)?;
    let payment_type = payment_type_of_kind(&ops.get_payment_types_to_pay_out_on_user().await?, kind, name)?;
    let credentials = ops.authenticate_by_pin(&settings.pay_pin).await?;
    Ok(ops.pay_order_and_pay_out_on_user(&credentials, &order, &payment_type, order.result_sum / 2).await?)
}

/// Cash taken remotely counts as the cashier's debt
pub async fn pay_order_on_cash_and_pay_out_on_user(ops: &dyn Operations, settings: &PluginSettings) -> WorkflowResult<Order> {
    pay_order_and_pay_out_on_user(ops, settings, PaymentTypeKind::Cash, None).await
}

pub async fn pay_order_on_card_and_pay_out_on_user(ops: &dyn Operations, settings: &PluginSettings) -> WorkflowResult<Order> {
    pay_order_and_pay_out_on_user(ops, settings, PaymentTypeKind::Card, Some(settings.card_payment_type.as_str())).await
}

pub async fn pay_order_with_existing_payments(ops: &dyn Operations, settings: &PluginSettings) -> WorkflowResult<Order> {
    let order = last_order_with_status(ops.get_orders().await?, NEW_OR_BILL)?;
    let credentials = ops.authenticate_by_pin(&settings.pay_pin).await?;
    Ok(ops.pay_order(&credentials, &order).await?)
}

// Cafe session

pub async fn open_cafe_session(ops: &dyn Operations) -> WorkflowResult<CafeSession> {
    let credentials = ops.get_credentials().await?;
    Ok(ops.open_cafe_session(&credentials).await?)
}

pub async fn close_cafe_session(ops: &dyn Operations) -> WorkflowResult<CafeSession> {
    let credentials = ops.get_credentials().await?;
    Ok(ops.close_cafe_session(&credentials).await?)
}

// Continuous operations

/// Create an order with an external payment and turn that payment into a
/// prepayment before anybody else can touch the new order.
pub async fn create_order_and_process_prepayments(ops: &dyn Operations) -> WorkflowResult<Order> {
    // Prepare everything up front; the order stays locked while the body runs
    let payment_type = external_processable_payment_type(&ops.get_payment_types().await?)?;
    let credentials = ops.get_credentials().await?;

    let creds = credentials.clone();
    let order = ops.run_continuous(&credentials, move |scoped| async move {
        let mut session = scoped.create_edit_session();
        let order_stub = session.create_order(None);
        session.add_order_guest(GUEST_NAME, order_stub);
        let payment_stub = session.add_external_payment_item(CONTINUOUS_PREPAY_AMOUNT, true, None, &payment_type, order_stub);

        let submitted = scoped.submit_changes(&creds, &session).await?;
        let order = submitted.get(&order_stub).cloned().ok_or_else(|| missing_submitted("order"))?;
        let item = submitted.get(&payment_stub).cloned().ok_or_else(|| missing_submitted("payment item"))?;

        scoped.process_prepay(&creds, &order, &item).await
    }.boxed()).await?;

    Ok(order)
}

/// A courier brings change for a cash preliminary payment: adjust the sum to
/// the order total and make it a prepayment without interference.
pub async fn add_and_process_preliminary_payment(ops: &dyn Operations) -> WorkflowResult<Order> {
    let order = open_delivery_order(ops).await?;
    let payment_type = cash(ops).await?;
    let credentials = ops.get_credentials().await?;
    let item = ops.add_preliminary_payment_item(COURIER_CASH_AMOUNT, None, &payment_type, &order, &credentials).await?;

    let creds = credentials.clone();
    let order_id = order.id;
    let order = ops.run_continuous(&credentials, move |scoped| async move {
        let current = scoped.get_order_by_id(order_id).await?;
        let item = scoped.change_payment_item_sum(current.result_sum, &item, &current, &creds).await?;

        let current = scoped.get_order_by_id(order_id).await?;
        scoped.process_prepay(&creds, &current, &item).await
    }.boxed()).await?;

    Ok(order)
}
