use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use front_catalog::{Catalog, ServiceKind};
use front_core::{Credentials, EntityId, OperationError, OperationResult, User, UserDirectory, ValidationError};
use front_order::{CafeSession, ChangeContext, EditSession, Order, OrderManager, SubmittedEntities};
use front_shared::models::events::OrderCreatedEvent;
use front_shared::FrontEvent;

use crate::app_config::{Config, Seed, StoreSettings};
use crate::continuous::{Caller, LockTable, ScopeId};
use crate::events::EventBus;
use crate::metrics::StoreMetrics;
use crate::submit::SessionBatch;

#[derive(Debug, thiserror::Error)]
pub enum StoreInitError {
    #[error("Invalid seed: {0}")]
    Seed(#[from] config::ConfigError),

    #[error("Metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// The result of a committed mutation plus the entities it touched
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    pub touched: Vec<EntityId>,
}

/// What a direct order mutation may consult besides the order itself
pub struct ChangeEnv<'a> {
    pub changes: ChangeContext<'a>,
    pub user: &'a User,
    pub cafe_session: &'a CafeSession,
}

impl ChangeEnv<'_> {
    pub fn require_open_cafe_session(&self) -> Result<(), ValidationError> {
        if !self.cafe_session.is_open {
            return Err(ValidationError::CafeSessionClosed);
        }
        Ok(())
    }
}

struct StoreState {
    orders: OrderManager,
    cafe_session: CafeSession,
    catalog: Catalog,
    users: UserDirectory,
    issued: HashMap<Uuid, Credentials>,
    locks: LockTable,
}

impl StoreState {
    fn verify(&self, credentials: &Credentials) -> OperationResult<User> {
        let issued = self.issued.get(&credentials.token());
        if issued != Some(credentials) {
            warn!("Rejected credentials of {}", credentials.user_name());
            return Err(OperationError::AuthenticationFailed(
                "credentials were not issued by this store".to_string(),
            ));
        }

        self.users.get(&credentials.user_id())
            .filter(|u| u.is_active)
            .cloned()
            .ok_or_else(|| OperationError::AuthenticationFailed(format!(
                "user {} is not active",
                credentials.user_name()
            )))
    }

    fn issue(&mut self, user: &User) -> Credentials {
        let credentials = Credentials::issue(user);
        self.issued.insert(credentials.token(), credentials.clone());
        credentials
    }
}

/// Committed orders, the cafe session and the reference data, with
/// optimistic versioning and continuous-operation locks.
///
/// Every critical section runs under one mutex and never awaits.
pub struct EntityStore {
    state: Mutex<StoreState>,
    events: EventBus,
    metrics: StoreMetrics,
    settings: StoreSettings,
}

impl EntityStore {
    pub fn new(settings: StoreSettings, seed: Seed) -> Result<Self, StoreInitError> {
        let mut orders = OrderManager::new();
        for order in seed.orders {
            orders.commit(order);
        }

        let mut cafe_session = CafeSession::closed();
        if settings.cafe_session_open {
            cafe_session.is_open = true;
            cafe_session.number = 1;
            cafe_session.opened_at = Some(Utc::now());
        }

        info!(
            "Entity store ready: {} orders, {} payment types, {} users, cafe session {}",
            orders.len(),
            seed.catalog.payment_types.len(),
            seed.users.users().len(),
            if cafe_session.is_open { "open" } else { "closed" }
        );

        Ok(Self {
            state: Mutex::new(StoreState {
                orders,
                cafe_session,
                catalog: seed.catalog,
                users: seed.users,
                issued: HashMap::new(),
                locks: LockTable::default(),
            }),
            events: EventBus::new(settings.event_capacity),
            metrics: StoreMetrics::new()?,
            settings,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, StoreInitError> {
        let seed = config.seed.build()?;
        Self::new(config.store.clone(), seed)
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FrontEvent> {
        self.events.subscribe()
    }

    pub fn publish(&self, event: FrontEvent) {
        self.events.publish(event);
    }

    fn state(&self) -> OperationResult<MutexGuard<'_, StoreState>> {
        self.state.lock()
            .map_err(|_| OperationError::Internal("entity store state is poisoned".to_string()))
    }

    // Credentials

    /// Credentials for a user by name; how the host identifies a plugin
    pub fn issue_credentials(&self, user_name: &str) -> OperationResult<Credentials> {
        let mut state = self.state()?;
        let user = state.users.find_by_name(user_name)
            .filter(|u| u.is_active)
            .cloned()
            .ok_or_else(|| OperationError::AuthenticationFailed(format!("unknown user {}", user_name)))?;
        Ok(state.issue(&user))
    }

    pub fn authenticate_by_pin(&self, pin: &str) -> OperationResult<Credentials> {
        let mut state = self.state()?;
        let user = state.users.authenticate_by_pin(pin)?.clone();
        Ok(state.issue(&user))
    }

    pub fn verify(&self, credentials: &Credentials) -> OperationResult<User> {
        self.state()?.verify(credentials)
    }

    // Reads

    pub fn users(&self) -> OperationResult<Vec<User>> {
        Ok(self.state()?.users.users().to_vec())
    }

    pub fn orders(&self, kind: ServiceKind) -> OperationResult<Vec<Order>> {
        let state = self.state()?;
        Ok(state.orders.list().into_iter().filter(|o| o.kind == kind).collect())
    }

    pub fn order(&self, id: &EntityId) -> OperationResult<Order> {
        Ok(self.state()?.orders.require(id)?.clone())
    }

    pub fn catalog(&self) -> OperationResult<Catalog> {
        Ok(self.state()?.catalog.clone())
    }

    pub fn cafe_session(&self) -> OperationResult<CafeSession> {
        Ok(self.state()?.cafe_session.clone())
    }

    /// Scope currently holding `id`, if any
    pub fn lock_owner(&self, id: &EntityId) -> OperationResult<Option<ScopeId>> {
        Ok(self.state()?.locks.owner(id))
    }

    // Continuous operations

    pub(crate) fn open_scope(&self, scope: ScopeId) -> OperationResult<()> {
        self.state()?.locks.open(scope);
        self.metrics.scope_opened();
        Ok(())
    }

    /// Runs from `Drop`, so a poisoned state is still cleaned up
    pub(crate) fn release_scope(&self, scope: &ScopeId) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.locks.release(scope)
    }

    // Mutations

    /// Apply every staged operation of `session` or none of them
    pub fn submit(
        &self,
        caller: Caller,
        credentials: &Credentials,
        session: &EditSession,
    ) -> OperationResult<Committed<SubmittedEntities>> {
        let result = self.submit_locked(caller, credentials, session);
        self.metrics.observe("submit_changes", &result);
        if let Err(e) = &result {
            warn!("Edit session {} rejected: {}", session.id(), e);
        }
        result
    }

    fn submit_locked(
        &self,
        caller: Caller,
        credentials: &Credentials,
        session: &EditSession,
    ) -> OperationResult<Committed<SubmittedEntities>> {
        let mut guard = self.state()?;
        let state = &mut *guard;
        let user = state.verify(credentials)?;
        state.locks.check_caller(caller)?;

        // Everything referenced must exist, be ours to touch and be current
        for (id, expected) in session.expected_versions() {
            let current = state.orders.require(&id)?;
            state.locks.check(caller, &id)?;
            OrderManager::check_version(current, expected)?;
        }

        let ctx = ChangeContext { catalog: &state.catalog, users: &state.users };
        let mut batch = SessionBatch::new(session.id(), &state.orders, ctx);
        for operation in session.operations() {
            batch.apply(operation)?;
        }
        let mut parts = batch.into_parts();
        let working = std::mem::take(&mut parts.orders);

        let mut committed = HashMap::with_capacity(working.len());
        let mut touched = Vec::with_capacity(working.len());
        let mut events = Vec::new();
        for order in working {
            let order = state.orders.commit(order).clone();
            if parts.created.contains(&order.id) {
                events.push(FrontEvent::OrderCreated(OrderCreatedEvent {
                    order_id: order.id,
                    number: order.number,
                    user_id: user.id,
                    timestamp: Utc::now().timestamp(),
                }));
            }
            touched.push(order.id);
            committed.insert(order.id, order);
        }
        state.locks.acquire(caller, &touched);
        drop(guard);

        info!(
            "Edit session {} of {} committed: {} operation(s), {} order(s)",
            session.id(),
            user.name,
            session.operations().len(),
            touched.len()
        );
        events.extend(parts.events.iter().cloned());
        for event in events {
            self.publish(event);
        }

        let submitted = parts.resolve(session.id(), session.operations(), &committed);
        Ok(Committed { value: submitted, touched })
    }

    /// Change one committed order from the caller's snapshot of it.
    ///
    /// The change runs on a copy; the copy replaces the order only when the
    /// change succeeds.
    pub fn update_order<R, F>(
        &self,
        caller: Caller,
        credentials: &Credentials,
        snapshot: &Order,
        operation: &str,
        change: F,
    ) -> OperationResult<Committed<(R, Order)>>
    where
        F: FnOnce(&mut Order, &ChangeEnv<'_>) -> OperationResult<R>,
    {
        let result = self.update_order_locked(caller, credentials, snapshot, change);
        self.metrics.observe(operation, &result);
        match &result {
            Ok(committed) => info!(
                "{} on order #{} committed at version {}",
                operation, committed.value.1.number, committed.value.1.version
            ),
            Err(e) => warn!("{} on order {} failed: {}", operation, snapshot.id, e),
        }
        result
    }

    fn update_order_locked<R, F>(
        &self,
        caller: Caller,
        credentials: &Credentials,
        snapshot: &Order,
        change: F,
    ) -> OperationResult<Committed<(R, Order)>>
    where
        F: FnOnce(&mut Order, &ChangeEnv<'_>) -> OperationResult<R>,
    {
        let mut guard = self.state()?;
        let state = &mut *guard;
        let user = state.verify(credentials)?;

        let current = state.orders.require(&snapshot.id)?;
        state.locks.check(caller, &snapshot.id)?;
        OrderManager::check_version(current, snapshot.version)?;

        let mut working = current.clone();
        let env = ChangeEnv {
            changes: ChangeContext { catalog: &state.catalog, users: &state.users },
            user: &user,
            cafe_session: &state.cafe_session,
        };
        let value = change(&mut working, &env)?;

        let order = state.orders.commit(working).clone();
        state.locks.acquire(caller, &[order.id]);
        Ok(Committed { value: (value, order), touched: vec![snapshot.id] })
    }

    /// Open or close the cafe session
    pub fn set_cafe_session(
        &self,
        caller: Caller,
        credentials: &Credentials,
        open: bool,
    ) -> OperationResult<Committed<CafeSession>> {
        let operation = if open { "open_cafe_session" } else { "close_cafe_session" };
        let result = self.set_cafe_session_locked(caller, credentials, open);
        self.metrics.observe(operation, &result);
        match &result {
            Ok(committed) => info!("Cafe session #{} {}", committed.value.number, if open { "opened" } else { "closed" }),
            Err(e) => warn!("{} failed: {}", operation, e),
        }
        result
    }

    fn set_cafe_session_locked(
        &self,
        caller: Caller,
        credentials: &Credentials,
        open: bool,
    ) -> OperationResult<Committed<CafeSession>> {
        let mut guard = self.state()?;
        let state = &mut *guard;
        let user = state.verify(credentials)?;

        let session_id = state.cafe_session.id;
        state.locks.check(caller, &session_id)?;

        let mut session = state.cafe_session.clone();
        match (session.is_open, open) {
            (true, true) => return Err(ValidationError::CafeSessionAlreadyOpen.into()),
            (false, false) => return Err(ValidationError::CafeSessionAlreadyClosed.into()),
            (false, true) => {
                session.is_open = true;
                session.number += 1;
                session.opened_at = Some(Utc::now());
                session.closed_at = None;
                session.opened_by = Some(user.id);
            }
            (true, false) => {
                session.is_open = false;
                session.closed_at = Some(Utc::now());
            }
        }
        session.version += 1;

        state.cafe_session = session.clone();
        state.locks.acquire(caller, &[session_id]);
        Ok(Committed { value: session, touched: vec![session_id] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use front_order::OrderStatus;

    fn store() -> EntityStore {
        EntityStore::from_config(&Config::default()).unwrap()
    }

    fn dine_in(store: &EntityStore) -> Order {
        store.orders(ServiceKind::DineIn).unwrap()
            .into_iter()
            .rfind(|o| o.status == OrderStatus::New)
            .unwrap()
    }

    #[test]
    fn test_seeded_orders_are_committed() {
        let store = store();
        let orders = store.orders(ServiceKind::DineIn).unwrap();
        assert_eq!(orders.len(), 2);
        assert!(orders.iter().all(|o| o.version == 1 && o.number > 0));
        assert_eq!(store.orders(ServiceKind::Delivery).unwrap().len(), 1);
    }

    #[test]
    fn test_foreign_credentials_are_rejected() {
        let store = store();
        let other = EntityStore::from_config(&Config::default()).unwrap();
        let credentials = other.issue_credentials("Plugin").unwrap();

        assert!(matches!(
            store.verify(&credentials),
            Err(OperationError::AuthenticationFailed(_))
        ));
        assert!(matches!(
            store.authenticate_by_pin("not a pin"),
            Err(OperationError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_update_order_bumps_version_once() {
        let store = store();
        let credentials = store.issue_credentials("Plugin").unwrap();
        let order = dine_in(&store);

        let committed = store.update_order(Caller::Global, &credentials, &order, "rename_table", |o, _| {
            o.table = Some("7".to_string());
            o.guests.clear();
            Ok(())
        }).unwrap();

        let (_, updated) = committed.value;
        assert_eq!(updated.version, order.version + 1);
        assert_eq!(committed.touched, vec![order.id]);

        // The old snapshot is stale now
        let err = store.update_order(Caller::Global, &credentials, &order, "rename_table", |_, _| Ok(())).unwrap_err();
        assert_eq!(err, OperationError::EntityModified { id: order.id, expected: 1, actual: 2 });
    }

    #[test]
    fn test_failed_change_leaves_order_untouched() {
        let store = store();
        let credentials = store.issue_credentials("Plugin").unwrap();
        let order = dine_in(&store);

        let result = store.update_order(Caller::Global, &credentials, &order, "fail", |o, _| {
            o.table = Some("lost".to_string());
            Err::<(), _>(ValidationError::EmptyGuestName.into())
        });

        assert!(result.is_err());
        assert_eq!(store.order(&order.id).unwrap(), order);
    }

    #[test]
    fn test_locked_order_rejects_other_callers() {
        let store = store();
        let credentials = store.issue_credentials("Plugin").unwrap();
        let order = dine_in(&store);

        let scope = Uuid::new_v4();
        store.open_scope(scope).unwrap();
        let (_, order) = store.update_order(Caller::Scope(scope), &credentials, &order, "touch", |_, _| Ok(()))
            .unwrap()
            .value;
        assert_eq!(store.lock_owner(&order.id).unwrap(), Some(scope));

        let err = store.update_order(Caller::Global, &credentials, &order, "touch", |_, _| Ok(())).unwrap_err();
        assert_eq!(err, OperationError::EntityAlreadyInUse { id: order.id });

        assert_eq!(store.release_scope(&scope), 1);
        assert!(store.update_order(Caller::Global, &credentials, &order, "touch", |_, _| Ok(())).is_ok());
    }

    #[test]
    fn test_cafe_session_transitions() {
        let store = store();
        let credentials = store.issue_credentials("Plugin").unwrap();

        let err = store.set_cafe_session(Caller::Global, &credentials, true).unwrap_err();
        assert_eq!(err, OperationError::Validation(ValidationError::CafeSessionAlreadyOpen));

        let closed = store.set_cafe_session(Caller::Global, &credentials, false).unwrap().value;
        assert!(!closed.is_open);

        let reopened = store.set_cafe_session(Caller::Global, &credentials, true).unwrap().value;
        assert!(reopened.is_open);
        assert_eq!(reopened.number, closed.number + 1);
        assert_eq!(reopened.version, closed.version + 1);
    }
}
