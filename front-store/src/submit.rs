use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use front_core::{EntityId, OperationError, OperationResult, ValidationError};
use front_order::{
    ChangeContext, ChangeHandler, ItemRef, Order, OrderManager, OrderRef, StagedOperation,
    SubmittedEntities,
};
use front_shared::models::events::{PaymentItemAddedEvent, PaymentItemDeletedEvent};
use front_shared::FrontEvent;

/// Working copies of everything an edit session touches.
///
/// Nothing here is visible to other callers; the store either writes all
/// working copies back or drops the batch.
pub(crate) struct SessionBatch<'a> {
    session_id: Uuid,
    committed: &'a OrderManager,
    ctx: ChangeContext<'a>,
    working: HashMap<EntityId, Order>,
    /// Touch order, so write-back and numbering follow staging order
    touched: Vec<EntityId>,
    created: Vec<EntityId>,
    order_stubs: HashMap<u32, EntityId>,
    /// stub -> (order, child)
    child_stubs: HashMap<u32, (EntityId, EntityId)>,
    events: Vec<FrontEvent>,
}

impl<'a> SessionBatch<'a> {
    pub(crate) fn new(session_id: Uuid, committed: &'a OrderManager, ctx: ChangeContext<'a>) -> Self {
        Self {
            session_id,
            committed,
            ctx,
            working: HashMap::new(),
            touched: Vec::new(),
            created: Vec::new(),
            order_stubs: HashMap::new(),
            child_stubs: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub(crate) fn apply(&mut self, operation: &StagedOperation) -> OperationResult<()> {
        match operation {
            StagedOperation::CreateOrder { stub, kind, table, delivery_address } => {
                let mut order = Order::new(*kind);
                order.table = table.clone();
                order.delivery_address = delivery_address.clone();

                let id = order.id;
                self.working.insert(id, order);
                self.touched.push(id);
                self.created.push(id);
                self.order_stubs.insert(*stub, id);
            }
            StagedOperation::AddGuest { stub, order, name } => {
                let order_id = self.resolve_order(order)?;
                let guest_id = ChangeHandler::add_guest(self.working_order(&order_id)?, name)?;
                self.child_stubs.insert(*stub, (order_id, guest_id));
            }
            StagedOperation::AddOrderItem { stub, order, product_name, price, amount } => {
                let order_id = self.resolve_order(order)?;
                let item_id = ChangeHandler::add_item(self.working_order(&order_id)?, product_name, *price, *amount)?;
                self.child_stubs.insert(*stub, (order_id, item_id));
            }
            StagedOperation::AddPayment { stub, order, payment } => {
                let order_id = self.resolve_order(order)?;
                let ctx = self.ctx;
                let working = self.working_order(&order_id)?;
                let item_id = ChangeHandler::add_payment(working, ctx, payment)?;

                if let Some(item) = working.payment(&item_id) {
                    let event = FrontEvent::PaymentItemAdded(PaymentItemAddedEvent {
                        order_id,
                        payment_item_id: item.id,
                        payment_type_id: item.payment_type_id,
                        amount: item.amount,
                        is_preliminary: item.is_preliminary,
                        is_external: item.is_external,
                        is_donation: item.is_donation,
                        timestamp: Utc::now().timestamp(),
                    });
                    self.events.push(event);
                }
                self.child_stubs.insert(*stub, (order_id, item_id));
            }
            StagedOperation::AddDiscount { stub, order, discount_type_id } => {
                let order_id = self.resolve_order(order)?;
                let ctx = self.ctx;
                let discount_id = ChangeHandler::add_discount(self.working_order(&order_id)?, ctx, discount_type_id)?;
                self.child_stubs.insert(*stub, (order_id, discount_id));
            }
            StagedOperation::DeleteDiscount { order, item } => {
                let order_id = self.resolve_order(order)?;
                let item_id = self.resolve_item(item)?;
                ChangeHandler::delete_discount(self.working_order(&order_id)?, &item_id)?;
            }
            StagedOperation::DeletePreliminaryPayment { order, item } => {
                let order_id = self.resolve_order(order)?;
                let item_id = self.resolve_item(item)?;
                ChangeHandler::delete_preliminary_payment(self.working_order(&order_id)?, &item_id)?;
                self.events.push(FrontEvent::PaymentItemDeleted(PaymentItemDeletedEvent {
                    order_id,
                    payment_item_id: item_id,
                    timestamp: Utc::now().timestamp(),
                }));
            }
            StagedOperation::ChangePaymentSum { order, item, amount } => {
                let order_id = self.resolve_order(order)?;
                let item_id = self.resolve_item(item)?;
                ChangeHandler::change_payment_sum(self.working_order(&order_id)?, &item_id, *amount)?;
            }
        }
        Ok(())
    }

    fn resolve_order(&mut self, order: &OrderRef) -> OperationResult<EntityId> {
        match order {
            OrderRef::Existing { id, .. } => {
                if !self.working.contains_key(id) {
                    let snapshot = self.committed.require(id)?.clone();
                    self.working.insert(*id, snapshot);
                    self.touched.push(*id);
                }
                Ok(*id)
            }
            OrderRef::Stub(key) => {
                if key.session_id != self.session_id {
                    return Err(ValidationError::ForeignStub.into());
                }
                self.order_stubs.get(&key.index)
                    .copied()
                    .ok_or_else(|| ValidationError::UnknownStub(key.index).into())
            }
        }
    }

    fn resolve_item(&self, item: &ItemRef) -> OperationResult<EntityId> {
        match item {
            ItemRef::Existing(id) => Ok(*id),
            ItemRef::Stub(key) => {
                if key.session_id != self.session_id {
                    return Err(ValidationError::ForeignStub.into());
                }
                self.child_stubs.get(&key.index)
                    .map(|(_, child)| *child)
                    .ok_or_else(|| ValidationError::UnknownStub(key.index).into())
            }
        }
    }

    fn working_order(&mut self, id: &EntityId) -> OperationResult<&mut Order> {
        self.working.get_mut(id)
            .ok_or_else(|| OperationError::Internal(format!("order {} has no working copy", id)))
    }

    /// Working copies in the order they were first touched
    pub(crate) fn into_parts(mut self) -> BatchParts {
        let orders = self.touched.iter()
            .filter_map(|id| self.working.remove(id))
            .collect();

        BatchParts {
            orders,
            created: self.created,
            order_stubs: self.order_stubs,
            child_stubs: self.child_stubs,
            events: self.events,
        }
    }
}

/// A validated batch, detached from the committed state it was checked against
pub(crate) struct BatchParts {
    pub orders: Vec<Order>,
    pub created: Vec<EntityId>,
    order_stubs: HashMap<u32, EntityId>,
    child_stubs: HashMap<u32, (EntityId, EntityId)>,
    pub events: Vec<FrontEvent>,
}

impl BatchParts {
    /// Map the session's stubs onto the committed entities.
    ///
    /// A child created and deleted by the same session has no committed
    /// counterpart and stays unresolved.
    pub(crate) fn resolve(
        &self,
        session_id: Uuid,
        operations: &[StagedOperation],
        committed: &HashMap<EntityId, Order>,
    ) -> SubmittedEntities {
        let mut entities = SubmittedEntities::new(session_id);

        for operation in operations {
            match operation {
                StagedOperation::CreateOrder { stub, .. } => {
                    if let Some(order) = self.order_stubs.get(stub).and_then(|id| committed.get(id)) {
                        entities.insert_order(*stub, order.clone());
                    }
                }
                StagedOperation::AddGuest { stub, .. } => {
                    if let Some((order, id)) = self.child(stub, committed) {
                        if let Some(guest) = order.guests.iter().find(|g| g.id == id) {
                            entities.insert_guest(*stub, guest.clone());
                        }
                    }
                }
                StagedOperation::AddOrderItem { stub, .. } => {
                    if let Some((order, id)) = self.child(stub, committed) {
                        if let Some(item) = order.items.iter().find(|i| i.id == id) {
                            entities.insert_order_item(*stub, item.clone());
                        }
                    }
                }
                StagedOperation::AddPayment { stub, .. } => {
                    if let Some((order, id)) = self.child(stub, committed) {
                        if let Some(item) = order.payment(&id) {
                            entities.insert_payment_item(*stub, item.clone());
                        }
                    }
                }
                StagedOperation::AddDiscount { stub, .. } => {
                    if let Some((order, id)) = self.child(stub, committed) {
                        if let Some(item) = order.discounts.iter().find(|d| d.id == id) {
                            entities.insert_discount_item(*stub, item.clone());
                        }
                    }
                }
                StagedOperation::DeleteDiscount { .. }
                | StagedOperation::DeletePreliminaryPayment { .. }
                | StagedOperation::ChangePaymentSum { .. } => {}
            }
        }

        entities
    }

    fn child<'o>(&self, stub: &u32, committed: &'o HashMap<EntityId, Order>) -> Option<(&'o Order, EntityId)> {
        let (order_id, child_id) = self.child_stubs.get(stub)?;
        committed.get(order_id).map(|order| (order, *child_id))
    }
}
