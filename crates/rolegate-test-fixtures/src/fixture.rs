//! A service wired to a fresh backend, plus shorthand for building graphs.

use anyhow::Result;
use rolegate_core::{CallContext, RbacService, SharedStorage, shared_storage};
use rolegate_store::{MemoryBackend, StorageBackend};

/// Page size small enough that multi-page traversals show up in tests.
pub const TEST_PAGE_SIZE: usize = 4;

pub struct TestFixture {
    pub service: RbacService,
    pub ctx: CallContext,
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixture {
    /// Memory backend, effective permissions off.
    pub fn new() -> Self {
        Self::over(MemoryBackend::new(), false)
    }

    /// Memory backend with stored effective permissions recomputed inline.
    pub fn with_effective() -> Self {
        Self::over(MemoryBackend::new(), true)
    }

    pub fn over<B: StorageBackend + 'static>(backend: B, effective: bool) -> Self {
        let service = RbacService::builder()
            .storage(shared_storage(backend, TEST_PAGE_SIZE))
            .effective_permissions(effective)
            .build();
        Self { service, ctx: CallContext::new() }
    }

    pub fn storage(&self) -> &SharedStorage {
        self.service.storage()
    }

    /// Create a user and return its id.
    pub async fn user(&self, name: &str) -> Result<String> {
        let email = format!("{}@example.com", name.to_lowercase());
        let user = self.service.create_user(&self.ctx, name, &email).await?;
        Ok(user.id.into_inner())
    }

    pub async fn role(&self, name: &str) -> Result<String> {
        let role = self.service.create_role(&self.ctx, name, "").await?;
        Ok(role.id.into_inner())
    }

    pub async fn permission(&self, id: &str) -> Result<String> {
        let permission = self.service.create_permission(&self.ctx, id, id, "").await?;
        Ok(permission.id.into_inner())
    }

    pub async fn assign(&self, user_id: &str, role_id: &str) -> Result<()> {
        self.service.assign_role_to_user(&self.ctx, user_id, role_id).await?;
        Ok(())
    }

    pub async fn grant(&self, role_id: &str, permission_id: &str) -> Result<()> {
        self.service.assign_permission_to_role(&self.ctx, role_id, permission_id).await?;
        Ok(())
    }

    pub async fn check(&self, user_id: &str, permission_id: &str) -> Result<bool> {
        Ok(self.service.has_permission(&self.ctx, user_id, permission_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_builds_a_graph() {
        let fx = TestFixture::new();
        let user = fx.user("Ada").await.unwrap();
        let role = fx.role("Reader").await.unwrap();
        let perm = fx.permission("doc.read").await.unwrap();
        fx.grant(&role, &perm).await.unwrap();
        fx.assign(&user, &role).await.unwrap();
        assert!(fx.check(&user, "doc.read").await.unwrap());
    }
}
