use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, Role, User};

/// Who is performing an operation. Passed explicitly into every use case call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActingContext {
    pub user_id: i64,
    pub role: Role,
}

impl ActingContext {
    pub fn new(user_id: i64, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn user(user_id: i64) -> Self {
        Self::new(user_id, Role::User)
    }

    pub fn admin(user_id: i64) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn of(user: &User) -> Self {
        Self::new(user.id(), user.role())
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn require_admin(&self) -> Result<(), DomainError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(DomainError::unauthorized(format!(
                "user {} is not an administrator",
                self.user_id
            )))
        }
    }
}
