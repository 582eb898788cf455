//! Role type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Entity, EntityKind, RoleId};

/// A named bundle of permissions that can be assigned to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Create a new Role with a freshly generated ID
    pub fn new(display_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::with_id(RoleId::generate(), display_name, description)
    }

    /// Create a Role with a specific ID
    pub fn with_id(
        id: RoleId,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            display_name: display_name.into(),
            description: description.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Entity for Role {
    const KIND: EntityKind = EntityKind::Role;

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

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_role_new() {
        let role = Role::new("Editor", "Can edit documents");
        assert!(role.id.as_str().starts_with("rol_"));
        assert_eq!(role.description, "Can edit documents");
    }

    #[test]
    fn test_empty_description_is_omitted() {
        let role = Role::with_id(RoleId::new("r1"), "Viewer", "");
        let json = serde_json::to_value(&role).unwrap();
        assert!(json.get("description").is_none());

        let back: Role = serde_json::from_value(json).unwrap();
        assert_eq!(back.description, "");
    }
}
