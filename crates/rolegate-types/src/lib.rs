//! # Rolegate Types
//!
//! Shared type definitions for the Rolegate authorization engine.
//!
//! This crate holds the entity records (users, roles, permissions), their
//! identifiers, and the assignment edges that connect them. Storage and
//! resolution crates depend on it so that every layer agrees on a single
//! vocabulary.

#![deny(unsafe_code)]

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

// ============================================================================
// Identity Types
// ============================================================================

pub mod ids;

pub use ids::{PermissionId, RoleId, UserId};

// ============================================================================
// Entity Types
// ============================================================================

pub mod edge;
pub mod effective;
pub mod permission;
pub mod role;
pub mod user;

pub use edge::{Edge, EdgeKind};
pub use effective::EffectivePermissions;
pub use permission::Permission;
pub use role::Role;
pub use user::User;

/// The kind of a first-class entity.
///
/// The string form is the key segment used by the storage layer, so it must
/// never change for an existing deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    User,
    Role,
    Permission,
}

impl EntityKind {
    /// All entity kinds, in declaration order.
    pub const ALL: [EntityKind; 3] = [EntityKind::User, EntityKind::Role, EntityKind::Permission];

    /// Get the storage representation (e.g. `USER`).
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "USER",
            EntityKind::Role => "ROLE",
            EntityKind::Permission => "PERMISSION",
        }
    }

    /// Resolve a storage representation back into a kind.
    pub fn from_storage(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an [`EntityKind`] from user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown entity kind: {0} (expected one of: user, role, permission)")]
pub struct ParseKindError(pub String);

impl FromStr for EntityKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" | "users" => Ok(EntityKind::User),
            "role" | "roles" => Ok(EntityKind::Role),
            "permission" | "permissions" => Ok(EntityKind::Permission),
            _ => Err(ParseKindError(s.to_string())),
        }
    }
}

/// Narrow capability shared by the three metadata record types.
///
/// The entity store is generic over this trait so that `create`, `get` and
/// `list_all` are written once and parameterized by [`Entity::KIND`].
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The kind this record type is stored under.
    const KIND: EntityKind;

    /// The record's identity as a raw string.
    fn id(&self) -> &str;

    /// When the record was first persisted.
    fn created_at(&self) -> DateTime<Utc>;

    /// Overwrite both timestamps. Only the store calls this.
    fn stamp(&mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_storage_names() {
        assert_eq!(EntityKind::User.as_str(), "USER");
        assert_eq!(EntityKind::Role.as_str(), "ROLE");
        assert_eq!(EntityKind::Permission.as_str(), "PERMISSION");
    }

    #[test]
    fn test_entity_kind_from_storage() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_storage(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::from_storage("METADATA"), None);
        assert_eq!(EntityKind::from_storage("user"), None);
    }

    #[test]
    fn test_entity_kind_from_str_accepts_plurals() {
        assert_eq!("users".parse::<EntityKind>().unwrap(), EntityKind::User);
        assert_eq!("Role".parse::<EntityKind>().unwrap(), EntityKind::Role);
        assert_eq!("permissions".parse::<EntityKind>().unwrap(), EntityKind::Permission);
        assert!("groups".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_entity_kind_serialization() {
        let json = serde_json::to_string(&EntityKind::Permission).unwrap();
        assert_eq!(json, "\"PERMISSION\"");
    }
}
