//! Bounded parallel fan-out over a user's roles.
//!
//! Each role's permission lookup runs as its own task in a
//! [`JoinSet`](tokio::task::JoinSet), at most `max_concurrency` at a time.
//! A lookup that fails is reported back with its role instead of failing
//! the whole fan-out; the caller decides what a failure means.
//!
//! Dropping the returned future aborts every task still in flight.

use std::{collections::BTreeSet, future::Future};

use rolegate_repository::RepositoryError;
use tokio::task::JoinSet;

use crate::{CoreError, CoreResult};

/// Default number of role lookups in flight at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Outcome of one fan-out.
#[derive(Debug, Default)]
pub struct FanoutResult {
    /// Union of every successful branch.
    pub values: BTreeSet<String>,
    /// Branches whose lookup failed, with the error.
    pub failed: Vec<(String, RepositoryError)>,
}

#[derive(Debug, Clone, Copy)]
pub struct RoleFanout {
    max_concurrency: usize,
}

impl Default for RoleFanout {
    fn default() -> Self {
        Self { max_concurrency: DEFAULT_MAX_CONCURRENCY }
    }
}

impl RoleFanout {
    pub fn new(max_concurrency: usize) -> Self {
        Self { max_concurrency: max_concurrency.max(1) }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run `lookup` for every key and union the results.
    ///
    /// Order of completion does not affect the result.
    pub async fn union<F, Fut>(&self, keys: Vec<String>, lookup: F) -> CoreResult<FanoutResult>
    where
        F: Fn(String) -> Fut + Send + Sync,
        Fut: Future<Output = Result<Vec<String>, RepositoryError>> + Send + 'static,
    {
        let mut result = FanoutResult::default();
        if keys.is_empty() {
            return Ok(result);
        }

        let mut join_set = JoinSet::new();
        for key in keys {
            let branch = lookup(key.clone());
            join_set.spawn(async move { (key, branch.await) });

            if join_set.len() >= self.max_concurrency
                && let Some(joined) = join_set.join_next().await
            {
                Self::absorb(&mut result, joined)?;
            }
        }

        while let Some(joined) = join_set.join_next().await {
            Self::absorb(&mut result, joined)?;
        }

        Ok(result)
    }

    fn absorb(
        result: &mut FanoutResult,
        joined: Result<(String, Result<Vec<String>, RepositoryError>), tokio::task::JoinError>,
    ) -> CoreResult<()> {
        let (key, outcome) =
            joined.map_err(|e| CoreError::Internal(format!("Task join error: {}", e)))?;
        match outcome {
            Ok(values) => result.values.extend(values),
            Err(e) => result.failed.push((key, e)),
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use super::*;

    #[tokio::test]
    async fn test_union_and_failures() {
        let fanout = RoleFanout::new(2);
        let keys = vec!["admin".to_string(), "broken".to_string(), "viewer".to_string()];

        let result = fanout
            .union(keys, |role| async move {
                match role.as_str() {
                    "admin" => Ok(vec!["doc.read".to_string(), "doc.write".to_string()]),
                    "viewer" => Ok(vec!["doc.read".to_string()]),
                    _ => Err(RepositoryError::Timeout),
                }
            })
            .await
            .unwrap();

        assert_eq!(result.values.len(), 2);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].0, "broken");
    }

    #[tokio::test]
    async fn test_empty_keys() {
        let result = RoleFanout::default()
            .union(Vec::new(), |_| async { Ok(vec!["never".to_string()]) })
            .await
            .unwrap();
        assert!(result.values.is_empty());
        assert!(result.failed.is_empty());
    }

    #[tokio::test]
    async fn test_respects_concurrency_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let keys: Vec<String> = (0..12).map(|i| format!("r{}", i)).collect();

        let fanout = RoleFanout::new(3);
        let result = fanout
            .union(keys, |role| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(vec![role])
                }
            })
            .await
            .unwrap();

        assert_eq!(result.values.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }
}
