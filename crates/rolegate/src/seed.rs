//! Seed documents: a JSON snapshot of users, roles, permissions and
//! assignments loaded into a fresh backend at startup.
//!
//! ```json
//! {
//!   "users": [{ "id": "usr_ada", "display_name": "Ada", "email": "ada@example.com" }],
//!   "roles": [{ "id": "rol_editor", "display_name": "Editor" }],
//!   "permissions": [{ "id": "doc.write", "display_name": "Write documents" }],
//!   "user_roles": [["usr_ada", "rol_editor"]],
//!   "role_permissions": [["rol_editor", "doc.write"]]
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use rolegate_core::{CallContext, RbacService};
use rolegate_types::{Permission, Role, RoleId, User, UserId};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Seed {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub roles: Vec<SeedRole>,
    #[serde(default)]
    pub permissions: Vec<SeedPermission>,
    #[serde(default)]
    pub user_roles: Vec<(String, String)>,
    #[serde(default)]
    pub role_permissions: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedRole {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedPermission {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

impl Seed {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid seed file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Write every record through the service. Assignments are validated
    /// like any other call, so a dangling reference fails the load.
    pub async fn apply(&self, service: &RbacService, ctx: &CallContext) -> Result<()> {
        let entities = service.storage().entities();
        for user in &self.users {
            let record = User::with_id(UserId::new(&user.id), &user.display_name, &user.email);
            entities.create(record).await.with_context(|| format!("user {}", user.id))?;
        }
        for role in &self.roles {
            let record = Role::with_id(RoleId::new(&role.id), &role.display_name, &role.description);
            entities.create(record).await.with_context(|| format!("role {}", role.id))?;
        }
        for permission in &self.permissions {
            let record =
                Permission::new(permission.id.as_str(), &permission.display_name, &permission.description);
            entities.create(record).await.with_context(|| format!("permission {}", permission.id))?;
        }

        for (role_id, permission_id) in &self.role_permissions {
            service
                .assign_permission_to_role(ctx, role_id, permission_id)
                .await
                .with_context(|| format!("grant {} to {}", permission_id, role_id))?;
        }
        for (user_id, role_id) in &self.user_roles {
            service
                .assign_role_to_user(ctx, user_id, role_id)
                .await
                .with_context(|| format!("assign {} to {}", role_id, user_id))?;
        }

        info!(
            users = self.users.len(),
            roles = self.roles.len(),
            permissions = self.permissions.len(),
            assignments = self.user_roles.len() + self.role_permissions.len(),
            "Seed loaded"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rolegate_core::shared_storage;
    use rolegate_store::MemoryBackend;

    use super::*;

    const SEED: &str = r#"{
        "users": [{ "id": "usr_ada", "display_name": "Ada", "email": "ada@example.com" }],
        "roles": [{ "id": "rol_editor", "display_name": "Editor" }],
        "permissions": [{ "id": "doc.write", "display_name": "Write documents" }],
        "user_roles": [["usr_ada", "rol_editor"]],
        "role_permissions": [["rol_editor", "doc.write"]]
    }"#;

    fn service() -> RbacService {
        RbacService::builder().storage(shared_storage(MemoryBackend::new(), 10)).build()
    }

    #[tokio::test]
    async fn test_seed_applies() {
        let seed = Seed::parse(SEED).unwrap();
        let svc = service();
        let ctx = CallContext::new();
        seed.apply(&svc, &ctx).await.unwrap();

        assert!(svc.has_permission(&ctx, "usr_ada", "doc.write").await.unwrap());
        assert_eq!(svc.users_in_role(&ctx, "rol_editor").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dangling_assignment_fails() {
        let seed = Seed::parse(r#"{ "user_roles": [["usr_ghost", "rol_ghost"]] }"#).unwrap();
        let err = seed.apply(&service(), &CallContext::new()).await.unwrap_err();
        assert!(err.to_string().contains("usr_ghost"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(Seed::parse(r#"{ "groups": [] }"#).is_err());
    }
}
