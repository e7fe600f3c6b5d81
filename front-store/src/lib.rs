pub mod app_config;
pub mod continuous;
pub mod entity_store;
pub mod events;
pub mod facade;
pub mod metrics;
mod submit;

pub use app_config::Config;
pub use continuous::{Caller, ContinuousOperation, LockTable, ScopeId, ScopeState};
pub use entity_store::{ChangeEnv, Committed, EntityStore, StoreInitError};
pub use events::EventBus;
pub use facade::FrontOperations;
pub use metrics::StoreMetrics;
