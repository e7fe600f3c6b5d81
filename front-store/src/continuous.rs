//! Continuous operations: a sequence of calls that keeps every entity it
//! touched to itself until the sequence ends.
//!
//! The store keeps one [`LockTable`] for all scopes. A scope's locks only
//! grow while it is open and are all dropped together when its
//! [`ScopeGuard`] goes away, whether the body returned, failed or panicked.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{info, warn};
use uuid::Uuid;

use front_core::{EntityId, OperationError, OperationResult};
use front_shared::models::events::{ScopeFinishedEvent, ScopeOutcome};
use front_shared::FrontEvent;

use crate::entity_store::EntityStore;

pub type ScopeId = Uuid;

/// Who is mutating the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    /// The long-lived façade; takes no locks
    Global,
    Scope(ScopeId),
}

/// Which continuous operation owns which entity
#[derive(Debug, Default)]
pub struct LockTable {
    owners: HashMap<EntityId, ScopeId>,
    open_scopes: HashSet<ScopeId>,
}

impl LockTable {
    pub fn open(&mut self, scope: ScopeId) {
        self.open_scopes.insert(scope);
    }

    pub fn is_open(&self, scope: &ScopeId) -> bool {
        self.open_scopes.contains(scope)
    }

    pub fn owner(&self, id: &EntityId) -> Option<ScopeId> {
        self.owners.get(id).copied()
    }

    /// A finished scope's handle must not be used any more
    pub fn check_caller(&self, caller: Caller) -> OperationResult<()> {
        match caller {
            Caller::Scope(scope) if !self.is_open(&scope) => Err(OperationError::Internal(format!(
                "continuous operation {} is already finished",
                scope
            ))),
            _ => Ok(()),
        }
    }

    /// Fail fast when `id` belongs to a scope other than the caller's
    pub fn check(&self, caller: Caller, id: &EntityId) -> OperationResult<()> {
        self.check_caller(caller)?;

        match self.owners.get(id) {
            Some(owner) if caller != Caller::Scope(*owner) => {
                Err(OperationError::EntityAlreadyInUse { id: *id })
            }
            _ => Ok(()),
        }
    }

    /// Record ownership of `ids` for a scoped caller. The global caller takes no locks.
    pub fn acquire(&mut self, caller: Caller, ids: &[EntityId]) {
        if let Caller::Scope(scope) = caller {
            for id in ids {
                self.owners.insert(*id, scope);
            }
        }
    }

    /// Drop every lock of `scope` and close it; returns how many were held
    pub fn release(&mut self, scope: &ScopeId) -> usize {
        let before = self.owners.len();
        self.owners.retain(|_, owner| owner != scope);
        self.open_scopes.remove(scope);
        before - self.owners.len()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Open,
    Committed,
    Aborted,
}

/// One continuous operation as seen by its body
#[derive(Debug)]
pub struct ContinuousOperation {
    id: ScopeId,
    user_name: String,
    started: Instant,
    state: Mutex<ScopeState>,
    /// Entities this scope touched; only grows while open
    locked: Mutex<BTreeSet<EntityId>>,
}

impl ContinuousOperation {
    pub fn new(user_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_name: user_name.to_string(),
            started: Instant::now(),
            state: Mutex::new(ScopeState::Open),
            locked: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn state(&self) -> ScopeState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_open(&self) -> bool {
        self.state() == ScopeState::Open
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Snapshot of the entities held by this scope
    pub fn locked(&self) -> Vec<EntityId> {
        self.locked.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    pub(crate) fn track(&self, touched: &[EntityId]) {
        let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
        locked.extend(touched.iter().copied());
    }

    fn finish(&self, outcome: ScopeOutcome) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = match outcome {
            ScopeOutcome::Committed => ScopeState::Committed,
            ScopeOutcome::Aborted => ScopeState::Aborted,
        };
    }
}

/// Releases a scope's locks when dropped.
///
/// Without an explicit [`ScopeGuard::finish`] the scope counts as aborted,
/// which covers early returns, panics and cancelled futures.
pub(crate) struct ScopeGuard {
    store: Arc<EntityStore>,
    scope: Arc<ContinuousOperation>,
    outcome: ScopeOutcome,
    warn_after: Duration,
}

impl ScopeGuard {
    pub(crate) fn new(store: Arc<EntityStore>, scope: Arc<ContinuousOperation>) -> Self {
        let warn_after = Duration::from_millis(store.settings().scope_warn_after_ms);
        Self {
            store,
            scope,
            outcome: ScopeOutcome::Aborted,
            warn_after,
        }
    }

    pub(crate) fn finish(mut self, outcome: ScopeOutcome) {
        self.outcome = outcome;
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let released = self.store.release_scope(&self.scope.id);
        self.scope.finish(self.outcome);

        let elapsed = self.scope.elapsed();
        if elapsed > self.warn_after {
            warn!(
                "Continuous operation {} of {} held {} entities for {:?}",
                self.scope.id, self.scope.user_name, released, elapsed
            );
        }
        info!(
            "Continuous operation {} finished: {:?}, released {} lock(s)",
            self.scope.id, self.outcome, released
        );

        self.store.metrics().scope_finished(self.outcome);
        self.store.publish(FrontEvent::ScopeFinished(ScopeFinishedEvent {
            scope_id: self.scope.id,
            outcome: self.outcome,
            locked_entities: released,
            elapsed_ms: elapsed.as_millis() as u64,
        }));
    }
}
