pub mod models;
pub mod manager;
pub mod changes;
pub mod session;
pub mod operations;

pub use models::{CafeSession, DiscountItem, Guest, Order, OrderItem, OrderStatus, PaymentItem, PaymentItemStatus};
pub use manager::OrderManager;
pub use changes::{ChangeContext, ChangeHandler, NewDonation, NewPayment, PaymentMode};
pub use session::{EditSession, EntityStub, ItemRef, OrderRef, StagedOperation, SubmittedEntities};
pub use operations::{continuous_body, ContinuousBody, Operations, OperationsExt};
