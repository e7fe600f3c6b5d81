//! Edit sessions: staged batches of order changes that the store commits
//! all-or-nothing.
//!
//! A session never touches the store while it is being built. Entities created
//! inside it are addressed through [`EntityStub`]s, which later operations of
//! the same session may reference; [`SubmittedEntities`] maps every stub to the
//! committed entity once the store accepted the batch.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use front_catalog::{DiscountType, PaymentType, ServiceKind};
use front_core::{EntityId, PaymentItemAdditionalData, Version};

use crate::changes::{NewPayment, PaymentMode};
use crate::models::{DiscountItem, Guest, Order, OrderItem, PaymentItem};

/// Placeholder for an entity created by an uncommitted session
pub struct EntityStub<T> {
    session_id: Uuid,
    index: u32,
    _kind: PhantomData<fn() -> T>,
}

impl<T> EntityStub<T> {
    fn new(session_id: Uuid, index: u32) -> Self {
        Self { session_id, index, _kind: PhantomData }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

impl<T> Clone for EntityStub<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for EntityStub<T> {}

impl<T> PartialEq for EntityStub<T> {
    fn eq(&self, other: &Self) -> bool {
        self.session_id == other.session_id && self.index == other.index
    }
}

impl<T> Eq for EntityStub<T> {}

impl<T> Hash for EntityStub<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.session_id.hash(state);
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for EntityStub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityStub<{}>#{}", std::any::type_name::<T>().rsplit("::").next().unwrap_or("?"), self.index)
    }
}

/// Session-independent form of a stub, kept inside staged operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StubKey {
    pub session_id: Uuid,
    pub index: u32,
}

impl<T> From<EntityStub<T>> for StubKey {
    fn from(stub: EntityStub<T>) -> Self {
        StubKey { session_id: stub.session_id, index: stub.index }
    }
}

/// The order an operation targets: a committed snapshot or a stub of this session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRef {
    /// Committed order at the version the caller looked at
    Existing { id: EntityId, version: Version },
    Stub(StubKey),
}

impl From<&Order> for OrderRef {
    fn from(order: &Order) -> Self {
        OrderRef::Existing { id: order.id, version: order.version }
    }
}

impl From<EntityStub<Order>> for OrderRef {
    fn from(stub: EntityStub<Order>) -> Self {
        OrderRef::Stub(stub.into())
    }
}

impl From<&EntityStub<Order>> for OrderRef {
    fn from(stub: &EntityStub<Order>) -> Self {
        OrderRef::Stub((*stub).into())
    }
}

/// A child entity (payment, discount) an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemRef {
    Existing(EntityId),
    Stub(StubKey),
}

impl From<&PaymentItem> for ItemRef {
    fn from(item: &PaymentItem) -> Self {
        ItemRef::Existing(item.id)
    }
}

impl From<&DiscountItem> for ItemRef {
    fn from(item: &DiscountItem) -> Self {
        ItemRef::Existing(item.id)
    }
}

impl From<EntityStub<PaymentItem>> for ItemRef {
    fn from(stub: EntityStub<PaymentItem>) -> Self {
        ItemRef::Stub(stub.into())
    }
}

impl From<EntityStub<DiscountItem>> for ItemRef {
    fn from(stub: EntityStub<DiscountItem>) -> Self {
        ItemRef::Stub(stub.into())
    }
}

/// One staged change, applied in staging order on submit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StagedOperation {
    CreateOrder {
        stub: u32,
        kind: ServiceKind,
        table: Option<String>,
        delivery_address: Option<String>,
    },
    AddGuest {
        stub: u32,
        order: OrderRef,
        name: String,
    },
    AddOrderItem {
        stub: u32,
        order: OrderRef,
        product_name: String,
        price: i64,
        amount: u32,
    },
    AddPayment {
        stub: u32,
        order: OrderRef,
        payment: NewPayment,
    },
    AddDiscount {
        stub: u32,
        order: OrderRef,
        discount_type_id: EntityId,
    },
    DeleteDiscount {
        order: OrderRef,
        item: ItemRef,
    },
    DeletePreliminaryPayment {
        order: OrderRef,
        item: ItemRef,
    },
    ChangePaymentSum {
        order: OrderRef,
        item: ItemRef,
        amount: i64,
    },
}

impl StagedOperation {
    pub fn order(&self) -> Option<&OrderRef> {
        match self {
            StagedOperation::CreateOrder { .. } => None,
            StagedOperation::AddGuest { order, .. }
            | StagedOperation::AddOrderItem { order, .. }
            | StagedOperation::AddPayment { order, .. }
            | StagedOperation::AddDiscount { order, .. }
            | StagedOperation::DeleteDiscount { order, .. }
            | StagedOperation::DeletePreliminaryPayment { order, .. }
            | StagedOperation::ChangePaymentSum { order, .. } => Some(order),
        }
    }
}

/// Staged intent, owned by the caller until submitted or dropped
#[derive(Debug, Clone)]
pub struct EditSession {
    id: Uuid,
    operations: Vec<StagedOperation>,
    next_stub: u32,
}

impl EditSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            operations: Vec::new(),
            next_stub: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn operations(&self) -> &[StagedOperation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Committed entities this session was built against, with the versions it saw
    pub fn expected_versions(&self) -> Vec<(EntityId, Version)> {
        let mut seen = Vec::new();
        for operation in &self.operations {
            if let Some(OrderRef::Existing { id, version }) = operation.order() {
                if !seen.contains(&(*id, *version)) {
                    seen.push((*id, *version));
                }
            }
        }
        seen
    }

    fn stub<T>(&mut self) -> EntityStub<T> {
        let stub = EntityStub::new(self.id, self.next_stub);
        self.next_stub += 1;
        stub
    }

    fn stage(&mut self, operation: StagedOperation) {
        tracing::debug!(session = %self.id, ?operation, "Staged operation");
        self.operations.push(operation);
    }

    /// New dine-in order
    pub fn create_order(&mut self, table: Option<String>) -> EntityStub<Order> {
        let stub = self.stub();
        self.stage(StagedOperation::CreateOrder {
            stub: stub.index,
            kind: ServiceKind::DineIn,
            table,
            delivery_address: None,
        });
        stub
    }

    pub fn create_delivery_order(&mut self, delivery_address: &str) -> EntityStub<Order> {
        let stub = self.stub();
        self.stage(StagedOperation::CreateOrder {
            stub: stub.index,
            kind: ServiceKind::Delivery,
            table: None,
            delivery_address: Some(delivery_address.to_string()),
        });
        stub
    }

    pub fn add_order_guest(&mut self, name: &str, order: impl Into<OrderRef>) -> EntityStub<Guest> {
        let stub = self.stub();
        self.stage(StagedOperation::AddGuest {
            stub: stub.index,
            order: order.into(),
            name: name.to_string(),
        });
        stub
    }

    pub fn add_order_item(&mut self, product_name: &str, price: i64, amount: u32, order: impl Into<OrderRef>) -> EntityStub<OrderItem> {
        let stub = self.stub();
        self.stage(StagedOperation::AddOrderItem {
            stub: stub.index,
            order: order.into(),
            product_name: product_name.to_string(),
            price,
            amount,
        });
        stub
    }

    fn add_payment(
        &mut self,
        amount: i64,
        additional_data: Option<PaymentItemAdditionalData>,
        payment_type: &PaymentType,
        order: OrderRef,
        mode: PaymentMode,
    ) -> EntityStub<PaymentItem> {
        let stub = self.stub();
        self.stage(StagedOperation::AddPayment {
            stub: stub.index,
            order,
            payment: NewPayment {
                amount,
                payment_type_id: payment_type.id,
                additional_data,
                mode,
            },
        });
        stub
    }

    pub fn add_payment_item(
        &mut self,
        amount: i64,
        additional_data: Option<PaymentItemAdditionalData>,
        payment_type: &PaymentType,
        order: impl Into<OrderRef>,
    ) -> EntityStub<PaymentItem> {
        self.add_payment(amount, additional_data, payment_type, order.into(), PaymentMode::Regular)
    }

    pub fn add_preliminary_payment_item(
        &mut self,
        amount: i64,
        additional_data: Option<PaymentItemAdditionalData>,
        payment_type: &PaymentType,
        order: impl Into<OrderRef>,
    ) -> EntityStub<PaymentItem> {
        self.add_payment(amount, additional_data, payment_type, order.into(), PaymentMode::Preliminary)
    }

    pub fn add_external_payment_item(
        &mut self,
        amount: i64,
        is_processed: bool,
        additional_data: Option<PaymentItemAdditionalData>,
        payment_type: &PaymentType,
        order: impl Into<OrderRef>,
    ) -> EntityStub<PaymentItem> {
        self.add_payment(amount, additional_data, payment_type, order.into(), PaymentMode::External { is_processed })
    }

    pub fn add_discount(&mut self, discount_type: &DiscountType, order: impl Into<OrderRef>) -> EntityStub<DiscountItem> {
        let stub = self.stub();
        self.stage(StagedOperation::AddDiscount {
            stub: stub.index,
            order: order.into(),
            discount_type_id: discount_type.id,
        });
        stub
    }

    pub fn delete_discount(&mut self, item: impl Into<ItemRef>, order: impl Into<OrderRef>) {
        self.stage(StagedOperation::DeleteDiscount {
            order: order.into(),
            item: item.into(),
        });
    }

    pub fn delete_preliminary_payment_item(&mut self, item: impl Into<ItemRef>, order: impl Into<OrderRef>) {
        self.stage(StagedOperation::DeletePreliminaryPayment {
            order: order.into(),
            item: item.into(),
        });
    }

    pub fn change_payment_item_sum(&mut self, amount: i64, item: impl Into<ItemRef>, order: impl Into<OrderRef>) {
        self.stage(StagedOperation::ChangePaymentSum {
            order: order.into(),
            item: item.into(),
            amount,
        });
    }
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Committed entities of a session, keyed by the stubs it handed out
#[derive(Debug, Clone, Default)]
pub struct SubmittedEntities {
    session_id: Uuid,
    orders: HashMap<u32, Order>,
    guests: HashMap<u32, Guest>,
    order_items: HashMap<u32, OrderItem>,
    payment_items: HashMap<u32, PaymentItem>,
    discount_items: HashMap<u32, DiscountItem>,
}

/// Entity kinds a stub can resolve to
pub trait Submitted: Sized {
    fn lookup(entities: &SubmittedEntities, index: u32) -> Option<&Self>;
}

impl Submitted for Order {
    fn lookup(entities: &SubmittedEntities, index: u32) -> Option<&Self> {
        entities.orders.get(&index)
    }
}

impl Submitted for Guest {
    fn lookup(entities: &SubmittedEntities, index: u32) -> Option<&Self> {
        entities.guests.get(&index)
    }
}

impl Submitted for OrderItem {
    fn lookup(entities: &SubmittedEntities, index: u32) -> Option<&Self> {
        entities.order_items.get(&index)
    }
}

impl Submitted for PaymentItem {
    fn lookup(entities: &SubmittedEntities, index: u32) -> Option<&Self> {
        entities.payment_items.get(&index)
    }
}

impl Submitted for DiscountItem {
    fn lookup(entities: &SubmittedEntities, index: u32) -> Option<&Self> {
        entities.discount_items.get(&index)
    }
}

impl SubmittedEntities {
    pub fn new(session_id: Uuid) -> Self {
        Self { session_id, ..Default::default() }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Committed entity behind `stub`; `None` for stubs of other sessions
    pub fn get<T: Submitted>(&self, stub: &EntityStub<T>) -> Option<&T> {
        if stub.session_id != self.session_id {
            return None;
        }
        T::lookup(self, stub.index)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
            + self.guests.len()
            + self.order_items.len()
            + self.payment_items.len()
            + self.discount_items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn insert_order(&mut self, stub: u32, order: Order) {
        self.orders.insert(stub, order);
    }

    pub fn insert_guest(&mut self, stub: u32, guest: Guest) {
        self.guests.insert(stub, guest);
    }

    pub fn insert_order_item(&mut self, stub: u32, item: OrderItem) {
        self.order_items.insert(stub, item);
    }

    pub fn insert_payment_item(&mut self, stub: u32, item: PaymentItem) {
        self.payment_items.insert(stub, item);
    }

    pub fn insert_discount_item(&mut self, stub: u32, item: DiscountItem) {
        self.discount_items.insert(stub, item);
    }
}
