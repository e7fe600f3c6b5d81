pub mod error;
pub mod fixtures;
pub mod plugin;
pub mod subscriptions;
pub mod workflows;

pub use error::{WorkflowError, WorkflowResult};
pub use plugin::{FrontPlugin, PaymentDemoPlugin};
pub use subscriptions::Subscription;
pub use workflows::Action;
