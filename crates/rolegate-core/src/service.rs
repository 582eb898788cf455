//! RBAC service - management and authorization operations
//!
//! The one entry point callers use. It validates relation endpoints, keeps
//! stored effective permissions in step with the graph, and routes deletes
//! through [`Cascade`].

use std::time::Duration;

use futures::future::try_join_all;
use rolegate_observe::metrics;
use rolegate_repository::RepositoryError;
use rolegate_types::{
    Edge, EdgeKind, Entity, EntityKind, Permission, PermissionId, Role, RoleId, User, UserId,
};
use tracing::{debug, warn};

use crate::{
    CallContext, Cascade, CoreError, CoreResult, DeleteOutcome, MaintenanceHandle,
    MaintenanceTask, Recomputer, Resolver, RoleFanout, SharedStorage,
};

/// Map a missing entity to its kind-specific error.
fn missing(kind: EntityKind, id: &str) -> CoreError {
    debug!(%kind, id, "Entity not found");
    match kind {
        EntityKind::User => CoreError::UserNotFound(id.to_string()),
        EntityKind::Role => CoreError::RoleNotFound(id.to_string()),
        EntityKind::Permission => CoreError::PermissionNotFound(id.to_string()),
    }
}

/// A transient failure on a create leaves its outcome unknown.
fn create_error(error: RepositoryError) -> CoreError {
    if error.is_transient() { CoreError::Indeterminate(error) } else { CoreError::Repository(error) }
}

fn update_error(kind: EntityKind, id: &str, error: RepositoryError) -> CoreError {
    if error.is_not_found() { missing(kind, id) } else { CoreError::Repository(error) }
}

#[derive(Clone)]
pub struct RbacService {
    storage: SharedStorage,
    resolver: Resolver,
    recomputer: Option<Recomputer>,
    cascade: Cascade,
    maintenance: Option<MaintenanceHandle>,
}

#[bon::bon]
impl RbacService {
    #[builder]
    pub fn new(
        storage: SharedStorage,
        #[builder(default)] fanout: RoleFanout,
        resolver_timeout: Option<Duration>,
        #[builder(default)] cascade: Cascade,
        // keep EFFECTIVE# records up to date and answer cached checks from them
        #[builder(default)] effective_permissions: bool,
        maintenance: Option<MaintenanceHandle>,
    ) -> Self {
        let resolver = Resolver::builder()
            .storage(storage.clone())
            .fanout(fanout)
            .maybe_timeout(resolver_timeout)
            .build();
        let recomputer =
            effective_permissions.then(|| Recomputer::new(storage.clone(), resolver.clone()));
        Self { storage, resolver, recomputer, cascade, maintenance }
    }
}

impl RbacService {
    /// Attach a maintenance queue started after the service was built.
    pub fn with_maintenance(mut self, handle: MaintenanceHandle) -> Self {
        self.maintenance = Some(handle);
        self
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Present only when effective permissions are enabled.
    pub fn recomputer(&self) -> Option<&Recomputer> {
        self.recomputer.as_ref()
    }

    pub fn cascade(&self) -> &Cascade {
        &self.cascade
    }

    // ----- entities -------------------------------------------------------

    /// Creates a user with a freshly generated id
    ///
    /// # Errors
    /// Returns `CoreError::Indeterminate` when the store failed transiently
    /// and the record may or may not exist. Read it back before retrying.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn create_user(
        &self,
        ctx: &CallContext,
        display_name: &str,
        email: &str,
    ) -> CoreResult<User> {
        ctx.run(async {
            self.storage.entities().create(User::new(display_name, email)).await.map_err(create_error)
        })
        .await
    }

    /// Creates a role with a freshly generated id
    #[tracing::instrument(skip(self, ctx))]
    pub async fn create_role(
        &self,
        ctx: &CallContext,
        display_name: &str,
        description: &str,
    ) -> CoreResult<Role> {
        ctx.run(async {
            self.storage
                .entities()
                .create(Role::new(display_name, description))
                .await
                .map_err(create_error)
        })
        .await
    }

    /// Creates a permission under a caller-chosen id
    ///
    /// # Errors
    /// Returns `RepositoryError::AlreadyExists` if the id is taken; the
    /// existing permission is not modified.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn create_permission(
        &self,
        ctx: &CallContext,
        id: &str,
        display_name: &str,
        description: &str,
    ) -> CoreResult<Permission> {
        ctx.run(async {
            self.storage
                .entities()
                .create(Permission::new(id, display_name, description))
                .await
                .map_err(create_error)
        })
        .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn get_user(&self, ctx: &CallContext, id: &str) -> CoreResult<User> {
        ctx.run(self.fetch::<User>(id)).await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn get_role(&self, ctx: &CallContext, id: &str) -> CoreResult<Role> {
        ctx.run(self.fetch::<Role>(id)).await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn get_permission(&self, ctx: &CallContext, id: &str) -> CoreResult<Permission> {
        ctx.run(self.fetch::<Permission>(id)).await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn list_users(&self, ctx: &CallContext) -> CoreResult<Vec<User>> {
        ctx.run(self.storage.entities().list_all::<User>()).await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn list_roles(&self, ctx: &CallContext) -> CoreResult<Vec<Role>> {
        ctx.run(self.storage.entities().list_all::<Role>()).await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn list_permissions(&self, ctx: &CallContext) -> CoreResult<Vec<Permission>> {
        ctx.run(self.storage.entities().list_all::<Permission>()).await
    }

    /// Replaces a user's mutable fields. The id and `created_at` are kept.
    #[tracing::instrument(skip(self, ctx, user), fields(id = %user.id))]
    pub async fn update_user(&self, ctx: &CallContext, user: User) -> CoreResult<User> {
        ctx.run(self.replace(user)).await
    }

    #[tracing::instrument(skip(self, ctx, role), fields(id = %role.id))]
    pub async fn update_role(&self, ctx: &CallContext, role: Role) -> CoreResult<Role> {
        ctx.run(self.replace(role)).await
    }

    #[tracing::instrument(skip(self, ctx, permission), fields(id = %permission.id))]
    pub async fn update_permission(
        &self,
        ctx: &CallContext,
        permission: Permission,
    ) -> CoreResult<Permission> {
        ctx.run(self.replace(permission)).await
    }

    // ----- relations ------------------------------------------------------

    /// Assigns a role to a user
    ///
    /// Re-assigning an existing pair succeeds and refreshes `assigned_at`.
    /// The user's stored effective permissions are recomputed before this
    /// returns.
    ///
    /// # Errors
    /// Returns `CoreError::UserNotFound` or `CoreError::RoleNotFound` when an
    /// endpoint does not exist. Nothing is written in that case.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn assign_role_to_user(
        &self,
        ctx: &CallContext,
        user_id: &str,
        role_id: &str,
    ) -> CoreResult<Edge> {
        ctx.run(async {
            self.require_pair(EntityKind::User, user_id, EntityKind::Role, role_id).await?;
            let edge = self.storage.relations().assign(EdgeKind::UserRole, user_id, role_id).await?;
            self.refresh_user(ctx, user_id).await;
            Ok::<_, CoreError>(edge)
        })
        .await
    }

    /// Removes a role from a user. Removing an absent assignment succeeds.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn remove_role_from_user(
        &self,
        ctx: &CallContext,
        user_id: &str,
        role_id: &str,
    ) -> CoreResult<()> {
        ctx.run(async {
            self.storage.relations().remove(EdgeKind::UserRole, user_id, role_id).await?;
            self.refresh_user(ctx, user_id).await;
            Ok::<_, CoreError>(())
        })
        .await
    }

    /// Grants a permission to a role
    ///
    /// Members' stored effective permissions are refreshed in the
    /// background when a maintenance queue is attached.
    ///
    /// # Errors
    /// Returns `CoreError::RoleNotFound` or `CoreError::PermissionNotFound`
    /// when an endpoint does not exist.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn assign_permission_to_role(
        &self,
        ctx: &CallContext,
        role_id: &str,
        permission_id: &str,
    ) -> CoreResult<Edge> {
        ctx.run(async {
            self.require_pair(EntityKind::Role, role_id, EntityKind::Permission, permission_id)
                .await?;
            let edge = self
                .storage
                .relations()
                .assign(EdgeKind::RolePermission, role_id, permission_id)
                .await?;
            self.schedule(ctx, MaintenanceTask::RecomputeRole(RoleId::from(role_id))).await;
            Ok::<_, CoreError>(edge)
        })
        .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn remove_permission_from_role(
        &self,
        ctx: &CallContext,
        role_id: &str,
        permission_id: &str,
    ) -> CoreResult<()> {
        ctx.run(async {
            self.storage
                .relations()
                .remove(EdgeKind::RolePermission, role_id, permission_id)
                .await?;
            self.schedule(ctx, MaintenanceTask::RecomputeRole(RoleId::from(role_id))).await;
            Ok::<_, CoreError>(())
        })
        .await
    }

    /// Roles assigned to a user. Unknown users have none.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn roles_of_user(&self, ctx: &CallContext, user_id: &str) -> CoreResult<Vec<Role>> {
        ctx.run(async {
            let ids = self
                .storage
                .relations()
                .forward_neighbors(EntityKind::User, user_id, EntityKind::Role)
                .await?;
            self.hydrate::<Role>(ids).await
        })
        .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn permissions_of_role(
        &self,
        ctx: &CallContext,
        role_id: &str,
    ) -> CoreResult<Vec<Permission>> {
        ctx.run(async {
            let ids = self
                .storage
                .relations()
                .forward_neighbors(EntityKind::Role, role_id, EntityKind::Permission)
                .await?;
            self.hydrate::<Permission>(ids).await
        })
        .await
    }

    /// Users holding a role, served from the inverted index.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn users_in_role(&self, ctx: &CallContext, role_id: &str) -> CoreResult<Vec<User>> {
        ctx.run(async {
            let ids = self
                .storage
                .relations()
                .reverse_neighbors(EntityKind::Role, role_id, EntityKind::User)
                .await?;
            self.hydrate::<User>(ids).await
        })
        .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn roles_with_permission(
        &self,
        ctx: &CallContext,
        permission_id: &str,
    ) -> CoreResult<Vec<Role>> {
        ctx.run(async {
            let ids = self
                .storage
                .relations()
                .reverse_neighbors(EntityKind::Permission, permission_id, EntityKind::Role)
                .await?;
            self.hydrate::<Role>(ids).await
        })
        .await
    }

    // ----- authorization --------------------------------------------------

    /// Live check against the graph.
    ///
    /// Missing data denies. Cancellation and deadline expiry are errors,
    /// never a denial.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn has_permission(
        &self,
        ctx: &CallContext,
        user_id: &str,
        permission_id: &str,
    ) -> CoreResult<bool> {
        self.resolver.has_permission(ctx, user_id, permission_id).await
    }

    /// Check against the stored effective permissions, falling back to a
    /// live check when the user has no record yet.
    ///
    /// User-role changes are reflected once the call that made them returns.
    /// Role-permission changes and deletes are applied by the maintenance
    /// queue, so the stored set lags until it catches up, or indefinitely
    /// if the queue was full and the task dropped.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn has_permission_cached(
        &self,
        ctx: &CallContext,
        user_id: &str,
        permission_id: &str,
    ) -> CoreResult<bool> {
        if self.recomputer.is_some() {
            let record = ctx.run(self.storage.effective().get(user_id)).await?;
            metrics::record_effective_lookup(record.is_some());
            if let Some(record) = record {
                return Ok(record.contains(&PermissionId::from(permission_id)));
            }
        }
        self.resolver.has_permission(ctx, user_id, permission_id).await
    }

    // ----- deletes --------------------------------------------------------

    /// Deletes a user, its role assignments and its effective permissions.
    ///
    /// Always completes before returning, even with a maintenance queue
    /// attached.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn delete_user(&self, ctx: &CallContext, user_id: &str) -> CoreResult<DeleteOutcome> {
        ctx.run(async {
            self.require(EntityKind::User, user_id).await?;
            let outcome = self
                .cascade
                .delete(&self.storage, EntityKind::User, user_id, self.maintenance.as_ref())
                .await?;
            // Clears any record a concurrent recompute wrote after the cascade.
            self.refresh_user(ctx, user_id).await;
            Ok::<_, CoreError>(outcome)
        })
        .await
    }

    /// Deletes a role with its member and permission edges
    ///
    /// Former members get their effective permissions recomputed.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn delete_role(&self, ctx: &CallContext, role_id: &str) -> CoreResult<DeleteOutcome> {
        ctx.run(async {
            self.require(EntityKind::Role, role_id).await?;
            let members = self
                .storage
                .relations()
                .reverse_neighbors(EntityKind::Role, role_id, EntityKind::User)
                .await?;
            let outcome = self
                .cascade
                .delete(&self.storage, EntityKind::Role, role_id, self.maintenance.as_ref())
                .await?;
            for user_id in members {
                self.schedule(ctx, MaintenanceTask::RecomputeUser(UserId::from(user_id))).await;
            }
            Ok::<_, CoreError>(outcome)
        })
        .await
    }

    /// Deletes a permission and revokes it from every role holding it
    #[tracing::instrument(skip(self, ctx))]
    pub async fn delete_permission(
        &self,
        ctx: &CallContext,
        permission_id: &str,
    ) -> CoreResult<DeleteOutcome> {
        ctx.run(async {
            self.require(EntityKind::Permission, permission_id).await?;
            let roles = self
                .storage
                .relations()
                .reverse_neighbors(EntityKind::Permission, permission_id, EntityKind::Role)
                .await?;
            let outcome = self
                .cascade
                .delete(&self.storage, EntityKind::Permission, permission_id, self.maintenance.as_ref())
                .await?;
            for role_id in roles {
                self.schedule(ctx, MaintenanceTask::RecomputeRole(RoleId::from(role_id))).await;
            }
            Ok::<_, CoreError>(outcome)
        })
        .await
    }

    /// Re-run the edge sweep for an already deleted entity.
    ///
    /// Safe to call any number of times; returns the edges removed by this
    /// run.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn sweep(&self, ctx: &CallContext, kind: EntityKind, id: &str) -> CoreResult<usize> {
        ctx.run(self.cascade.sweep(&self.storage, kind, id)).await
    }

    // ----- helpers --------------------------------------------------------

    async fn fetch<E: Entity>(&self, id: &str) -> CoreResult<E> {
        self.storage.entities().find::<E>(id).await?.ok_or_else(|| missing(E::KIND, id))
    }

    async fn replace<E: Entity>(&self, entity: E) -> CoreResult<E> {
        let id = entity.id().to_string();
        self.storage.entities().update(entity).await.map_err(|e| update_error(E::KIND, &id, e))
    }

    async fn require(&self, kind: EntityKind, id: &str) -> CoreResult<()> {
        if self.storage.entities().exists(kind, id).await? {
            Ok(())
        } else {
            Err(missing(kind, id))
        }
    }

    async fn require_pair(
        &self,
        source_kind: EntityKind,
        source_id: &str,
        target_kind: EntityKind,
        target_id: &str,
    ) -> CoreResult<()> {
        let entities = self.storage.entities();
        let (source, target) = tokio::join!(
            entities.exists(source_kind, source_id),
            entities.exists(target_kind, target_id)
        );
        if !source? {
            return Err(missing(source_kind, source_id));
        }
        if !target? {
            return Err(missing(target_kind, target_id));
        }
        Ok(())
    }

    /// Load full records for `ids`, skipping edges whose target is gone.
    async fn hydrate<E: Entity>(&self, ids: Vec<String>) -> CoreResult<Vec<E>> {
        let entities = self.storage.entities();
        let found = try_join_all(ids.iter().map(|id| entities.find::<E>(id))).await?;

        let mut out = Vec::with_capacity(found.len());
        for (id, record) in ids.iter().zip(found) {
            match record {
                Some(record) => out.push(record),
                None => warn!(kind = %E::KIND, id = %id, "Skipping dangling edge"),
            }
        }
        Ok(out)
    }

    /// Recompute one user's effective permissions now. Failures are logged;
    /// the stored copy is allowed to lag.
    async fn refresh_user(&self, ctx: &CallContext, user_id: &str) {
        let Some(recomputer) = &self.recomputer else {
            return;
        };
        if let Err(e) = recomputer.recompute_user(ctx, user_id).await {
            warn!(user = user_id, error = %e, "Failed to recompute effective permissions");
        }
    }

    /// Hand `task` to the maintenance queue, or run it inline when there is
    /// none.
    async fn schedule(&self, ctx: &CallContext, task: MaintenanceTask) {
        let Some(recomputer) = &self.recomputer else {
            return;
        };
        if let Some(handle) = &self.maintenance {
            handle.try_enqueue(task);
            return;
        }

        let result = match &task {
            MaintenanceTask::RecomputeUser(user_id) => {
                recomputer.recompute_user(ctx, user_id.as_str()).await.map(|_| ())
            },
            MaintenanceTask::RecomputeRole(role_id) => {
                recomputer.recompute_role(ctx, role_id.as_str()).await.map(|_| ())
            },
            MaintenanceTask::Sweep { kind, id } => {
                self.cascade.sweep(&self.storage, *kind, id).await.map(|_| ())
            },
        };
        if let Err(e) = result {
            warn!(task = task.name(), error = %e, "Inline maintenance failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rolegate_store::MemoryBackend;

    use super::*;
    use crate::shared_storage;

    fn service(effective: bool) -> RbacService {
        RbacService::builder()
            .storage(shared_storage(MemoryBackend::new(), 10))
            .effective_permissions(effective)
            .build()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let svc = service(false);
        let ctx = CallContext::new();
        let user = svc.create_user(&ctx, "Ada", "ada@example.com").await.unwrap();
        assert_eq!(svc.get_user(&ctx, user.id.as_str()).await.unwrap(), user);
        assert!(matches!(svc.get_role(&ctx, "rol_missing").await, Err(CoreError::RoleNotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_permission_keeps_original() {
        let svc = service(false);
        let ctx = CallContext::new();
        let original = svc.create_permission(&ctx, "doc.read", "Read", "first").await.unwrap();
        let err = svc.create_permission(&ctx, "doc.read", "Other", "second").await.unwrap_err();
        assert!(matches!(err, CoreError::Repository(RepositoryError::AlreadyExists(_))));
        assert!(!err.is_retryable());
        assert_eq!(svc.get_permission(&ctx, "doc.read").await.unwrap(), original);
    }

    #[tokio::test]
    async fn test_assign_reports_missing_endpoint() {
        let svc = service(false);
        let ctx = CallContext::new();
        let user = svc.create_user(&ctx, "Ada", "ada@example.com").await.unwrap();
        let role = svc.create_role(&ctx, "Admin", "").await.unwrap();

        let err = svc.assign_role_to_user(&ctx, user.id.as_str(), "rol_nope").await.unwrap_err();
        assert!(matches!(err, CoreError::RoleNotFound(_)));
        let err = svc.assign_role_to_user(&ctx, "usr_nope", role.id.as_str()).await.unwrap_err();
        assert!(matches!(err, CoreError::UserNotFound(_)));
        let err = svc.assign_permission_to_role(&ctx, role.id.as_str(), "nope").await.unwrap_err();
        assert!(matches!(err, CoreError::PermissionNotFound(_)));

        assert!(svc.roles_of_user(&ctx, user.id.as_str()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_preserves_identity() {
        let svc = service(false);
        let ctx = CallContext::new();
        let mut role = svc.create_role(&ctx, "Admin", "").await.unwrap();
        role.description = "Full access".to_string();
        let updated = svc.update_role(&ctx, role.clone()).await.unwrap();
        assert_eq!(updated.created_at, role.created_at);
        assert_eq!(svc.get_role(&ctx, role.id.as_str()).await.unwrap().description, "Full access");

        let ghost = Role::new("Ghost", "");
        assert!(matches!(svc.update_role(&ctx, ghost).await, Err(CoreError::RoleNotFound(_))));
    }

    #[tokio::test]
    async fn test_cached_check_follows_user_role_changes() {
        let svc = service(true);
        let ctx = CallContext::new();
        let user = svc.create_user(&ctx, "Ada", "ada@example.com").await.unwrap();
        let role = svc.create_role(&ctx, "Reader", "").await.unwrap();
        svc.create_permission(&ctx, "doc.read", "Read", "").await.unwrap();
        svc.assign_permission_to_role(&ctx, role.id.as_str(), "doc.read").await.unwrap();

        svc.assign_role_to_user(&ctx, user.id.as_str(), role.id.as_str()).await.unwrap();
        let stored = svc.storage().effective().get(user.id.as_str()).await.unwrap().unwrap();
        assert!(stored.contains(&PermissionId::from("doc.read")));
        assert!(svc.has_permission_cached(&ctx, user.id.as_str(), "doc.read").await.unwrap());

        svc.remove_role_from_user(&ctx, user.id.as_str(), role.id.as_str()).await.unwrap();
        assert!(!svc.has_permission_cached(&ctx, user.id.as_str(), "doc.read").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_user_removes_everything() {
        let svc = service(true);
        let ctx = CallContext::new();
        let user = svc.create_user(&ctx, "Ada", "ada@example.com").await.unwrap();
        let role = svc.create_role(&ctx, "Reader", "").await.unwrap();
        svc.assign_role_to_user(&ctx, user.id.as_str(), role.id.as_str()).await.unwrap();

        let outcome = svc.delete_user(&ctx, user.id.as_str()).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Completed { edges_removed: 1 });
        assert!(svc.users_in_role(&ctx, role.id.as_str()).await.unwrap().is_empty());
        assert!(svc.storage().effective().get(user.id.as_str()).await.unwrap().is_none());
        assert!(matches!(
            svc.delete_user(&ctx, user.id.as_str()).await,
            Err(CoreError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_call_does_not_write() {
        let svc = service(false);
        let ctx = CallContext::new();
        ctx.cancel();
        assert!(matches!(
            svc.create_role(&ctx, "Admin", "").await,
            Err(CoreError::Cancelled)
        ));
        assert!(svc.list_roles(&CallContext::new()).await.unwrap().is_empty());
    }
}
