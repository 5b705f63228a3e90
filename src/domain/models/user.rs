use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// A customer or administrator account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub(crate) id: i64,
    pub(crate) username: String,
    pub(crate) email: String,
    #[serde(skip_serializing)]
    pub(crate) password_hash: String,
    pub(crate) full_name: String,
    pub(crate) phone_number: Option<String>,
    pub(crate) address: Option<String>,
    pub(crate) role: Role,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: Option<DateTime<Utc>>,
    pub(crate) is_active: bool,
}

impl User {
    /// A new, not yet persisted, active account. The id is assigned when the
    /// account is added to a unit of work.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        full_name: impl Into<String>,
        role: Role,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            full_name: full_name.into(),
            phone_number: None,
            address: None,
            role,
            created_at: now,
            updated_at: None,
            is_active: true,
        }
    }

    pub fn with_contact(mut self, phone_number: Option<String>, address: Option<String>) -> Self {
        self.phone_number = phone_number;
        self.address = address;
        self
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn change_password_hash(&mut self, password_hash: String, now: DateTime<Utc>) {
        self.password_hash = password_hash;
        self.updated_at = Some(now);
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = Some(now);
    }
}
