//! Assignment edges
//!
//! Edges are directed many-to-many records connecting two entities. They
//! carry no identity beyond the pair they connect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::EntityKind;

/// The two relationship shapes the RBAC graph supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// A user holds a role.
    UserRole,
    /// A role grants a permission.
    RolePermission,
}

impl EdgeKind {
    /// The owning (partition) side of the edge.
    pub fn source(&self) -> EntityKind {
        match self {
            EdgeKind::UserRole => EntityKind::User,
            EdgeKind::RolePermission => EntityKind::Role,
        }
    }

    /// The target side of the edge.
    pub fn target(&self) -> EntityKind {
        match self {
            EdgeKind::UserRole => EntityKind::Role,
            EdgeKind::RolePermission => EntityKind::Permission,
        }
    }

    /// Find the edge kind connecting `source` to `target`, if any.
    pub fn between(source: EntityKind, target: EntityKind) -> Option<Self> {
        match (source, target) {
            (EntityKind::User, EntityKind::Role) => Some(EdgeKind::UserRole),
            (EntityKind::Role, EntityKind::Permission) => Some(EdgeKind::RolePermission),
            _ => None,
        }
    }
}

/// A persisted assignment edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub kind: EdgeKind,
    pub source_id: String,
    pub target_id: String,
    /// Last time this edge was (re)assigned; last write wins.
    pub assigned_at: DateTime<Utc>,
}

impl Edge {
    pub fn new(kind: EdgeKind, source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            kind,
            source_id: source_id.into(),
            target_id: target_id.into(),
            assigned_at: Utc::now(),
        }
    }
}
