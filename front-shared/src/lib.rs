pub mod models;
pub mod pii;

pub use models::events::FrontEvent;
pub use pii::Masked;
