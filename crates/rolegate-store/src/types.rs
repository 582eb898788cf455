//! Item, key and query types shared by every storage backend.

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

use crate::error::{StorageError, StorageResult};

/// Two-part item address: the partition groups related records, the sort
/// key orders them inside the partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey {
    pub partition: String,
    pub sort: String,
}

impl ItemKey {
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self { partition: partition.into(), sort: sort.into() }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.partition, self.sort)
    }
}

/// A stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: ItemKey,
    /// Projects the item into [`IndexName::EntityType`] when set.
    pub entity_type: Option<String>,
    pub body: Vec<u8>,
}

impl Item {
    pub fn new(key: ItemKey, body: Vec<u8>) -> Self {
        Self { key, entity_type: None, body }
    }

    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }
}

/// Secondary indexes every backend maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexName {
    /// Partition = item sort key, sort = item partition key.
    Inverted,
    /// Partition = item `entity_type`, sort = item partition key.
    EntityType,
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexName::Inverted => write!(f, "inverted"),
            IndexName::EntityType => write!(f, "entity_type"),
        }
    }
}

/// Filter on the sort dimension of a query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SortCondition {
    #[default]
    Any,
    BeginsWith(String),
    /// Inclusive on both ends.
    Between { start: String, end: String },
}

impl SortCondition {
    pub fn begins_with(prefix: impl Into<String>) -> Self {
        Self::BeginsWith(prefix.into())
    }

    pub fn matches(&self, sort: &str) -> bool {
        match self {
            SortCondition::Any => true,
            SortCondition::BeginsWith(prefix) => sort.starts_with(prefix.as_str()),
            SortCondition::Between { start, end } => {
                sort >= start.as_str() && sort <= end.as_str()
            },
        }
    }

    /// Smallest sort value that can match.
    pub fn lower_bound(&self) -> &str {
        match self {
            SortCondition::Any => "",
            SortCondition::BeginsWith(prefix) => prefix,
            SortCondition::Between { start, .. } => start,
        }
    }

    /// Whether `sort`, and everything ordered after it, can no longer match.
    pub fn is_past(&self, sort: &str) -> bool {
        match self {
            SortCondition::Any => false,
            SortCondition::BeginsWith(prefix) => {
                sort > prefix.as_str() && !sort.starts_with(prefix.as_str())
            },
            SortCondition::Between { end, .. } => sort > end.as_str(),
        }
    }
}

/// Opaque resume position returned with a partial [`Page`].
///
/// Callers hand it back unchanged; only the issuing backend interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    /// Encode a backend-defined position.
    pub fn from_parts(parts: &[String]) -> StorageResult<Self> {
        let json = serde_json::to_vec(parts)
            .map_err(|e| StorageError::Serialization { message: e.to_string() })?;
        Ok(Self(URL_SAFE_NO_PAD.encode(json)))
    }

    /// Decode the position written by [`from_parts`](Self::from_parts).
    pub fn to_parts(&self) -> StorageResult<Vec<String>> {
        let bytes = URL_SAFE_NO_PAD
            .decode(self.0.as_bytes())
            .map_err(|e| StorageError::InvalidToken { message: e.to_string() })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::InvalidToken { message: e.to_string() })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for ContinuationToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A range query against one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub partition: String,
    pub condition: SortCondition,
    /// Page size; `None` returns every match.
    pub limit: Option<usize>,
    pub start: Option<ContinuationToken>,
}

impl QueryRequest {
    pub fn new(partition: impl Into<String>) -> Self {
        Self { partition: partition.into(), condition: SortCondition::Any, limit: None, start: None }
    }

    pub fn with_condition(mut self, condition: SortCondition) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_start(mut self, start: Option<ContinuationToken>) -> Self {
        self.start = start;
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Present when more results may follow.
    pub next: Option<ContinuationToken>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next: Option<ContinuationToken>) -> Self {
        Self { items, next }
    }

    pub fn empty() -> Self {
        Self { items: Vec::new(), next: None }
    }

    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page { items: self.items.into_iter().map(f).collect(), next: self.next }
    }

    /// Like [`map`](Self::map) but stops at the first error.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        let items = self.items.into_iter().map(f).collect::<Result<Vec<_>, E>>()?;
        Ok(Page { items, next: self.next })
    }
}

/// One operation inside [`StorageBackend::transact_write`](crate::StorageBackend::transact_write).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put(Item),
    PutIfAbsent(Item),
    Delete(ItemKey),
}

impl WriteOp {
    pub fn key(&self) -> &ItemKey {
        match self {
            WriteOp::Put(item) | WriteOp::PutIfAbsent(item) => &item.key,
            WriteOp::Delete(key) => key,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_begins_with_bounds() {
        let cond = SortCondition::begins_with("ROLE#");
        assert!(cond.matches("ROLE#r1"));
        assert!(!cond.matches("PERMISSION#p1"));
        assert!(!cond.is_past("PERMISSION#p1"));
        assert!(!cond.is_past("ROLE#zzz"));
        assert!(cond.is_past("USER#u1"));
        assert_eq!(cond.lower_bound(), "ROLE#");
    }

    #[test]
    fn test_between_is_inclusive() {
        let cond = SortCondition::Between { start: "b".into(), end: "d".into() };
        assert!(cond.matches("b"));
        assert!(cond.matches("d"));
        assert!(!cond.matches("a"));
        assert!(!cond.matches("da"));
        assert!(cond.is_past("e"));
    }

    #[test]
    fn test_token_is_url_safe() {
        let token =
            ContinuationToken::from_parts(&["USER#a/b+c".to_string(), "ROLE#?".to_string()])
                .unwrap();
        assert!(!token.as_str().contains(['+', '/', '=']));
        assert_eq!(token.to_parts().unwrap(), vec!["USER#a/b+c", "ROLE#?"]);
    }

    #[test]
    fn test_garbage_token_rejected() {
        let token = ContinuationToken::from("not a token!".to_string());
        assert!(matches!(token.to_parts(), Err(StorageError::InvalidToken { .. })));
    }

    #[test]
    fn test_page_try_map() {
        let page = Page::new(vec!["1", "2"], None);
        let parsed: Page<u32> = page.try_map(|s| s.parse::<u32>()).unwrap();
        assert_eq!(parsed.items, vec![1, 2]);
        assert!(parsed.is_last());

        let bad = Page::new(vec!["1", "x"], None);
        assert!(bad.try_map(|s| s.parse::<u32>()).is_err());
    }
}
