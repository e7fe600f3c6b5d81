use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use front_shared::Masked;

use crate::{EntityId, OperationError, OperationResult, ValidationError};

/// Terminal user known to the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub name: String,
    pub pin: Masked<String>,
    /// Remote payments are only accepted from users with an open personal session
    pub has_personal_session: bool,
    pub is_active: bool,
}

impl User {
    pub fn new(name: &str, pin: &str, has_personal_session: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            pin: Masked(pin.to_string()),
            has_personal_session,
            is_active: true,
        }
    }
}

/// Opaque authorization token carried by every mutating call.
///
/// Only the store issues credentials; plugins pass them through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    token: Uuid,
    user_id: EntityId,
    user_name: String,
    issued_at: DateTime<Utc>,
}

impl Credentials {
    pub fn issue(user: &User) -> Self {
        Self {
            token: Uuid::new_v4(),
            user_id: user.id,
            user_name: user.name.clone(),
            issued_at: Utc::now(),
        }
    }

    pub fn token(&self) -> Uuid {
        self.token
    }

    pub fn user_id(&self) -> EntityId {
        self.user_id
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

/// The users the store authenticates against
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: Vec<User>,
}

impl UserDirectory {
    pub fn new(users: Vec<User>) -> Self {
        Self { users }
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn get(&self, id: &EntityId) -> Option<&User> {
        self.users.iter().find(|u| u.id == *id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|u| u.name == name)
    }

    /// Resolve an active user by PIN
    pub fn authenticate_by_pin(&self, pin: &str) -> OperationResult<&User> {
        let user = self.users.iter()
            .find(|u| u.is_active && u.pin.expose() == pin)
            .ok_or_else(|| {
                tracing::warn!("PIN authentication rejected");
                OperationError::AuthenticationFailed("unknown or inactive PIN".to_string())
            })?;

        tracing::debug!("Authenticated user {} by PIN", user.name);
        Ok(user)
    }

    /// Credit payments name a counteragent, who must be a known user
    pub fn require(&self, id: &EntityId) -> OperationResult<&User> {
        self.get(id).ok_or_else(|| ValidationError::UnknownUser(*id).into())
    }
}
