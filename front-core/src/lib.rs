pub mod identity;
pub mod payment;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use identity::{Credentials, User, UserDirectory};
pub use payment::{PaymentAdditionalData, PaymentItemAdditionalData};

/// Identity assigned by the entity store when an entity is committed
pub type EntityId = Uuid;

/// Per-entity version, bumped once per committed mutation
pub type Version = u64;

/// Coarse failure classification callers match on to pick a retry strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Optimistic concurrency conflict: refetch, rebuild, retry
    Modified,
    /// Entity locked by another continuous operation: retry later
    InUse,
    /// Domain rule violated: not retryable with the same input
    Invalid,
    AuthFailed,
    Fatal,
}

/// Domain rule violations reported by the entity store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Stub belongs to another edit session")]
    ForeignStub,

    #[error("Stub #{0} was not created by an earlier operation of this session")]
    UnknownStub(u32),

    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("Payment type not found: {0}")]
    UnknownPaymentType(EntityId),

    #[error("Payment type {0} is not active")]
    PaymentTypeInactive(String),

    #[error("Additional data {data} does not match payment type kind {kind}")]
    AdditionalDataMismatch {
        kind: String,
        data: String,
    },

    #[error("Payment type {0} cannot be processed externally")]
    NotExternallyProcessable(String),

    #[error("Payment type {0} cannot be paid out on a user")]
    NotPayableOutOnUser(String),

    #[error("Order {id} is {status}, expected {expected}")]
    InvalidOrderStatus {
        id: EntityId,
        status: String,
        expected: String,
    },

    #[error("Preliminary payments need a delivery order, {0} is not one")]
    NotADeliveryOrder(EntityId),

    #[error("Payment item {0} does not belong to the order")]
    PaymentItemNotFound(EntityId),

    #[error("Payment item {id} is not eligible: {reason}")]
    PaymentItemNotEligible {
        id: EntityId,
        reason: String,
    },

    #[error("Discount type {discount} does not apply to order {order}")]
    DiscountNotApplicable {
        discount: String,
        order: EntityId,
    },

    #[error("Discount type not found: {0}")]
    UnknownDiscountType(EntityId),

    #[error("Discount item {0} does not belong to the order")]
    DiscountItemNotFound(EntityId),

    #[error("Donation type {donation} is not compatible with order {order}")]
    DonationTypeNotCompatible {
        donation: String,
        order: EntityId,
    },

    #[error("Donation type {donation} does not accept payment type {payment_type}")]
    DonationPaymentTypeNotAllowed {
        donation: String,
        payment_type: String,
    },

    #[error("Order {0} total is out of range")]
    SumOutOfRange(EntityId),

    #[error("Insufficient payment: {paid} of {required}")]
    InsufficientPayment {
        paid: i64,
        required: i64,
    },

    #[error("Cafe session is already open")]
    CafeSessionAlreadyOpen,

    #[error("Cafe session is already closed")]
    CafeSessionAlreadyClosed,

    #[error("Cafe session is closed")]
    CafeSessionClosed,

    #[error("User {0} has no open personal session")]
    NoPersonalSession(String),

    #[error("User not found: {0}")]
    UnknownUser(EntityId),

    #[error("Guest name must not be empty")]
    EmptyGuestName,
}

/// Every failure a façade call can surface
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Entity {id} was modified: expected version {expected}, actual {actual}")]
    EntityModified {
        id: EntityId,
        expected: Version,
        actual: Version,
    },

    #[error("Entity {id} is already in use by another operation")]
    EntityAlreadyInUse {
        id: EntityId,
    },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Internal service error: {0}")]
    Internal(String),
}

impl OperationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            OperationError::AuthenticationFailed(_) => FailureKind::AuthFailed,
            OperationError::EntityModified { .. } => FailureKind::Modified,
            OperationError::EntityAlreadyInUse { .. } => FailureKind::InUse,
            OperationError::Validation(_) => FailureKind::Invalid,
            OperationError::Internal(_) => FailureKind::Fatal,
        }
    }

    /// Conflicts may succeed later; everything else needs different input or is fatal
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), FailureKind::Modified | FailureKind::InUse)
    }
}

pub type OperationResult<T> = Result<T, OperationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        let id = Uuid::new_v4();

        let modified = OperationError::EntityModified { id, expected: 1, actual: 2 };
        assert_eq!(modified.kind(), FailureKind::Modified);
        assert!(modified.is_retryable());

        let in_use = OperationError::EntityAlreadyInUse { id };
        assert_eq!(in_use.kind(), FailureKind::InUse);
        assert!(in_use.is_retryable());

        let invalid: OperationError = ValidationError::CafeSessionClosed.into();
        assert_eq!(invalid.kind(), FailureKind::Invalid);
        assert!(!invalid.is_retryable());

        assert_eq!(OperationError::AuthenticationFailed("bad pin".into()).kind(), FailureKind::AuthFailed);
        assert_eq!(OperationError::Internal("poisoned".into()).kind(), FailureKind::Fatal);
    }

    #[test]
    fn test_error_display() {
        let err = OperationError::Validation(ValidationError::InsufficientPayment { paid: 100, required: 250 });
        assert_eq!(err.to_string(), "Validation failed: Insufficient payment: 100 of 250");
    }
}
