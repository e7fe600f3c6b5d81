use front_core::{FailureKind, OperationError};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// The demo data has nothing the action could work on
    #[error("No {0} to work with")]
    FixtureNotFound(String),

    #[error("Subscription {name} failed to stop: {reason}")]
    Subscription {
        name: String,
        reason: String,
    },
}

impl WorkflowError {
    pub fn fixture(what: impl Into<String>) -> Self {
        WorkflowError::FixtureNotFound(what.into())
    }

    /// Short label of the failure, shown in front of a report
    pub fn kind_name(&self) -> &'static str {
        match self {
            WorkflowError::Operation(e) => match e.kind() {
                FailureKind::Modified => "EntityModified",
                FailureKind::InUse => "EntityAlreadyInUse",
                FailureKind::Invalid => "Validation",
                FailureKind::AuthFailed => "AuthenticationFailed",
                FailureKind::Fatal => "Internal",
            },
            WorkflowError::FixtureNotFound(_) => "FixtureNotFound",
            WorkflowError::Subscription { .. } => "Subscription",
        }
    }

    pub fn operation_error(&self) -> Option<&OperationError> {
        match self {
            WorkflowError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Log a failed action the way an operator would read it and return the message
pub fn report(action: &str, error: &WorkflowError) -> String {
    let message = format!("{}: Cannot {}: {}", error.kind_name(), action, error);
    tracing::error!("{}", message);
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use front_core::ValidationError;
    use uuid::Uuid;

    #[test]
    fn test_report_format() {
        let error: WorkflowError = OperationError::EntityAlreadyInUse { id: Uuid::nil() }.into();
        let message = report("Add cash payment", &error);
        assert_eq!(
            message,
            format!(
                "EntityAlreadyInUse: Cannot Add cash payment: Entity {} is already in use by another operation",
                Uuid::nil()
            )
        );

        let message = report("Delete donation", &WorkflowError::fixture("donation"));
        assert_eq!(message, "FixtureNotFound: Cannot Delete donation: No donation to work with");
    }

    #[test]
    fn test_kind_name_follows_failure_kind() {
        let error: WorkflowError = OperationError::from(ValidationError::CafeSessionClosed).into();
        assert_eq!(error.kind_name(), "Validation");
        assert!(error.operation_error().is_some());
    }
}
