//! User type
//!
//! A user is the actor whose permissions are resolved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Entity, EntityKind, UserId};

/// A user record.
///
/// The identifier is assigned at creation and never reassigned; changing the
/// email address does not change the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier for this user
    pub id: UserId,

    /// Human-readable name
    pub display_name: String,

    /// Contact email, not part of the identity
    pub email: String,

    /// When this user was created
    pub created_at: DateTime<Utc>,

    /// When this user was last updated
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new User with a freshly generated ID
    pub fn new(display_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self::with_id(UserId::generate(), display_name, email)
    }

    /// Create a User with a specific ID
    pub fn with_id(id: UserId, display_name: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            display_name: display_name.into(),
            email: email.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Entity for User {
    const KIND: EntityKind = EntityKind::User;

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn stamp(&mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) {
        self.created_at = created_at;
        self.updated_at = updated_at;
    }
}
