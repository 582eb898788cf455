//! Permission resolver.
//!
//! A check walks two levels of the graph: the user's roles from the user's
//! partition, then each role's permissions from the role partitions, fanned
//! out in parallel. The union is tested for membership.
//!
//! Failure policy: a role whose permission lookup fails is logged and
//! skipped, so one bad role partition cannot deny every check. A user with
//! no roles (including a user that does not exist) is denied. A failure to
//! read the user's own roles is an error, not a denial.

use std::{collections::BTreeSet, time::Duration};

use rolegate_observe::metrics;
use rolegate_types::EntityKind;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{CallContext, CoreResult, SharedStorage, fanout::RoleFanout};

#[derive(Clone)]
pub struct Resolver {
    storage: SharedStorage,
    fanout: RoleFanout,
    timeout: Option<Duration>,
}

#[bon::bon]
impl Resolver {
    #[builder]
    pub fn new(
        storage: SharedStorage,
        #[builder(default)] fanout: RoleFanout,
        // applied per call unless the caller's deadline is tighter
        timeout: Option<Duration>,
    ) -> Self {
        Self { storage, fanout, timeout }
    }
}

impl Resolver {
    /// Does `user_id` hold `permission_id` through any of its roles?
    pub async fn has_permission(
        &self,
        ctx: &CallContext,
        user_id: &str,
        permission_id: &str,
    ) -> CoreResult<bool> {
        let start = Instant::now();
        let permissions = self.effective_permissions(ctx, user_id).await?;
        let allowed = permissions.contains(permission_id);

        metrics::record_check(allowed, start.elapsed().as_secs_f64());
        debug!(
            user = user_id,
            permission = permission_id,
            allowed,
            duration = ?start.elapsed(),
            "Permission check complete"
        );
        Ok(allowed)
    }

    /// Union of every permission reachable from the user's roles.
    pub async fn effective_permissions(
        &self,
        ctx: &CallContext,
        user_id: &str,
    ) -> CoreResult<BTreeSet<String>> {
        let ctx = ctx.child(self.timeout);
        ctx.run(self.collect(user_id)).await
    }

    async fn collect(&self, user_id: &str) -> CoreResult<BTreeSet<String>> {
        let relations = self.storage.relations();
        let roles = relations.forward_neighbors(EntityKind::User, user_id, EntityKind::Role).await?;
        if roles.is_empty() {
            debug!(user = user_id, "User has no roles");
            return Ok(BTreeSet::new());
        }

        let lookup_store = relations.clone();
        let result = self
            .fanout
            .union(roles, move |role_id| {
                let relations = lookup_store.clone();
                async move {
                    relations
                        .forward_neighbors(EntityKind::Role, &role_id, EntityKind::Permission)
                        .await
                }
            })
            .await?;

        for (role_id, error) in &result.failed {
            warn!(
                user = user_id,
                role = %role_id,
                error = %error,
                "Skipping role whose permissions could not be read"
            );
        }
        metrics::record_roles_skipped(result.failed.len());

        Ok(result.values)
    }
}
