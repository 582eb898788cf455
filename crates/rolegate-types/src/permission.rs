//! Permission type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Entity, EntityKind, PermissionId};

/// A single grantable action, usually identified by a stable dotted name
/// such as `document.create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    pub fn new(
        id: impl Into<PermissionId>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: description.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Entity for Permission {
    const KIND: EntityKind = EntityKind::Permission;

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
