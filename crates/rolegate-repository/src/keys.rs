//! Key encoding for the single-table layout.
//!
//! Every record lives in one keyspace addressed by `(partition, sort)`:
//!
//! - `{KIND}#{id}` / `METADATA#{id}` - entity metadata
//! - `{SOURCE}#{source_id}` / `{TARGET}#{target_id}` - assignment edge
//! - `USER#{id}` / `EFFECTIVE#{id}` - cached effective permissions
//!
//! Edges live in the source's partition, so forward traversal is a prefix
//! query on the sort key. The inverted index swaps the two halves and turns
//! reverse traversal into the same kind of query.

use rolegate_store::ItemKey;
use rolegate_types::EntityKind;

use crate::error::{RepositoryError, RepositoryResult};

/// Separates the kind (or record tag) from the identifier in a key segment.
pub const SEPARATOR: char = '#';

/// Sort-key tag of metadata records.
pub const METADATA_TAG: &str = "METADATA";

/// Sort-key tag of effective-permission records.
pub const EFFECTIVE_TAG: &str = "EFFECTIVE";

/// Reject identifiers that would make a key ambiguous.
pub fn validate_id(id: &str) -> RepositoryResult<()> {
    if id.is_empty() {
        return Err(RepositoryError::InvalidIdentity("identifier must not be empty".into()));
    }
    if id.contains(SEPARATOR) {
        return Err(RepositoryError::InvalidIdentity(format!(
            "identifier {:?} must not contain '{}'",
            id, SEPARATOR
        )));
    }
    Ok(())
}

/// `{KIND}#`, the sort-key prefix selecting one kind of edge target.
#[inline]
pub fn kind_prefix(kind: EntityKind) -> String {
    format!("{}{}", kind.as_str(), SEPARATOR)
}

/// `{KIND}#{id}`, without validation.
#[inline]
pub fn segment(kind: EntityKind, id: &str) -> String {
    format!("{}{}{}", kind.as_str(), SEPARATOR, id)
}

/// Split a key segment at its first separator into `(prefix, id)`.
pub fn split_segment(value: &str) -> Option<(&str, &str)> {
    value.split_once(SEPARATOR)
}

fn parse_kind_segment(value: &str) -> RepositoryResult<(EntityKind, String)> {
    let (prefix, id) = split_segment(value).ok_or_else(|| malformed(value))?;
    let kind = EntityKind::from_storage(prefix).ok_or_else(|| malformed(value))?;
    Ok((kind, id.to_string()))
}

fn malformed(value: &str) -> RepositoryError {
    RepositoryError::Internal(format!("malformed key segment: {}", value))
}

/// Metadata record keys.
pub mod metadata {
    use super::*;

    /// Schema: `{KIND}#{id}` / `METADATA#{id}`
    pub fn encode(kind: EntityKind, id: &str) -> RepositoryResult<ItemKey> {
        validate_id(id)?;
        Ok(ItemKey::new(segment(kind, id), format!("{}{}{}", METADATA_TAG, SEPARATOR, id)))
    }

    pub fn decode(key: &ItemKey) -> RepositoryResult<(EntityKind, String)> {
        let (kind, id) = parse_kind_segment(&key.partition)?;
        match split_segment(&key.sort) {
            Some((METADATA_TAG, sort_id)) if sort_id == id => Ok((kind, id)),
            _ => Err(malformed(&key.sort)),
        }
    }

    /// Whether the sort key marks a metadata record.
    pub fn is_metadata_sort(sort: &str) -> bool {
        matches!(split_segment(sort), Some((METADATA_TAG, _)))
    }
}

/// Edge record keys.
pub mod edge {
    use super::*;

    /// Both endpoints of a decoded edge key.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct EdgeKey {
        pub source_kind: EntityKind,
        pub source_id: String,
        pub target_kind: EntityKind,
        pub target_id: String,
    }

    /// Schema: `{SOURCE}#{source_id}` / `{TARGET}#{target_id}`
    pub fn encode(
        source_kind: EntityKind,
        source_id: &str,
        target_kind: EntityKind,
        target_id: &str,
    ) -> RepositoryResult<ItemKey> {
        validate_id(source_id)?;
        validate_id(target_id)?;
        Ok(ItemKey::new(segment(source_kind, source_id), segment(target_kind, target_id)))
    }

    pub fn decode(key: &ItemKey) -> RepositoryResult<EdgeKey> {
        let (source_kind, source_id) = parse_kind_segment(&key.partition)?;
        let (target_kind, target_id) = parse_kind_segment(&key.sort)?;
        Ok(EdgeKey { source_kind, source_id, target_kind, target_id })
    }

    /// Whether the key has the shape of an edge (both halves `{KIND}#{id}`).
    pub fn is_edge(key: &ItemKey) -> bool {
        decode(key).is_ok()
    }
}

/// Effective-permission record keys.
pub mod effective {
    use super::*;

    /// Schema: `USER#{user_id}` / `EFFECTIVE#{user_id}`
    pub fn encode(user_id: &str) -> RepositoryResult<ItemKey> {
        validate_id(user_id)?;
        Ok(ItemKey::new(
            segment(EntityKind::User, user_id),
            format!("{}{}{}", EFFECTIVE_TAG, SEPARATOR, user_id),
        ))
    }
}
