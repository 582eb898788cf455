//! Effective permissions
//!
//! The denormalized union of every permission a user reaches through its
//! roles. This copy is eventually consistent: it reflects the graph as of the
//! last successful recomputation and nothing stronger.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PermissionId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermissions {
    pub user_id: UserId,
    pub permissions: BTreeSet<PermissionId>,
    /// When the set was computed
    pub computed_at: DateTime<Utc>,
}

impl EffectivePermissions {
    pub fn new(user_id: UserId, permissions: BTreeSet<PermissionId>) -> Self {
        Self { user_id, permissions, computed_at: Utc::now() }
    }

    pub fn contains(&self, permission: &PermissionId) -> bool {
        self.permissions.contains(permission)
    }
}
