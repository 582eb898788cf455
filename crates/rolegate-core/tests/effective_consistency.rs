//! Stored effective permissions under concurrent recomputation of the same
//! user. A recompute that read the graph earlier must never overwrite the
//! record written by one that read it later.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use rolegate_core::{CallContext, MaintenanceWorker, RbacService, shared_storage};
use rolegate_store::MemoryBackend;
use rolegate_test_fixtures::{FlakyBackend, TestFixture};
use rolegate_types::EdgeKind;

async fn wait_until_unassigned(service: &RbacService, user_id: &str, role_id: &str) {
    let relations = service.storage().relations();
    while relations.get(EdgeKind::UserRole, user_id, role_id).await.unwrap().is_some() {
        tokio::task::yield_now().await;
    }
}

async fn cached(service: &RbacService, user_id: &str, permission_id: &str) -> bool {
    service.has_permission_cached(&CallContext::new(), user_id, permission_id).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn earlier_refresh_cannot_overwrite_later_revocation() {
    let flaky = FlakyBackend::new(MemoryBackend::new());
    let fx = TestFixture::over(flaky.clone(), true);
    let user = fx.user("Ada").await.unwrap();
    let r1 = fx.role("r1").await.unwrap();
    let r2 = fx.role("r2").await.unwrap();
    fx.permission("p1").await.unwrap();
    fx.permission("p2").await.unwrap();
    fx.grant(&r1, "p1").await.unwrap();
    fx.grant(&r2, "p2").await.unwrap();
    fx.assign(&user, &r1).await.unwrap();

    // Assigning r2 resolves {p1, p2} and parks before storing it.
    let gate = flaky.hold_next_put("EFFECTIVE#");
    let assign = tokio::spawn({
        let (service, user, r2) = (fx.service.clone(), user.clone(), r2.clone());
        async move { service.assign_role_to_user(&CallContext::new(), &user, &r2).await }
    });
    gate.reached().await;

    // Revoke r1 while the older refresh is still in flight.
    let revoke = tokio::spawn({
        let (service, user, r1) = (fx.service.clone(), user.clone(), r1.clone());
        async move { service.remove_role_from_user(&CallContext::new(), &user, &r1).await }
    });
    wait_until_unassigned(&fx.service, &user, &r1).await;

    gate.release();
    assign.await.unwrap().unwrap();
    revoke.await.unwrap().unwrap();

    assert!(!fx.check(&user, "p1").await.unwrap());
    assert!(!cached(&fx.service, &user, "p1").await);
    assert!(cached(&fx.service, &user, "p2").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queued_role_recompute_cannot_overwrite_later_revocation() {
    let flaky = FlakyBackend::new(MemoryBackend::new());
    let service = RbacService::builder()
        .storage(shared_storage(flaky.clone(), 4))
        .effective_permissions(true)
        .build();
    let recomputer = service.recomputer().cloned().unwrap();
    let worker = MaintenanceWorker::start(recomputer, *service.cascade(), 16);
    let service = service.with_maintenance(worker.handle());
    let ctx = CallContext::new();

    let user = service.create_user(&ctx, "Ada", "ada@example.com").await.unwrap();
    let uid = user.id.as_str();
    let role = service.create_role(&ctx, "Editor", "").await.unwrap();
    let rid = role.id.as_str();
    service.create_permission(&ctx, "p1", "p1", "").await.unwrap();
    service.create_permission(&ctx, "p2", "p2", "").await.unwrap();
    service.assign_permission_to_role(&ctx, rid, "p1").await.unwrap();
    service.assign_role_to_user(&ctx, uid, rid).await.unwrap();
    worker.handle().flush().await.unwrap();

    // The worker resolves {p1, p2} for the member and parks before storing it.
    let gate = flaky.hold_next_put("EFFECTIVE#");
    service.assign_permission_to_role(&ctx, rid, "p2").await.unwrap();
    gate.reached().await;

    let revoke = tokio::spawn({
        let (service, uid, rid) = (service.clone(), uid.to_string(), rid.to_string());
        async move { service.remove_role_from_user(&CallContext::new(), &uid, &rid).await }
    });
    wait_until_unassigned(&service, uid, rid).await;

    gate.release();
    revoke.await.unwrap().unwrap();
    worker.handle().flush().await.unwrap();

    assert!(!service.has_permission(&ctx, uid, "p1").await.unwrap());
    assert!(!cached(&service, uid, "p1").await);
    assert!(!cached(&service, uid, "p2").await);
    worker.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refresh_in_flight_cannot_resurrect_deleted_user() {
    let flaky = FlakyBackend::new(MemoryBackend::new());
    let fx = TestFixture::over(flaky.clone(), true);
    let user = fx.user("Ada").await.unwrap();
    let role = fx.role("r1").await.unwrap();
    fx.permission("p1").await.unwrap();
    fx.grant(&role, "p1").await.unwrap();

    // The refresh after this assignment has seen the user and parks.
    let gate = flaky.hold_next_put("EFFECTIVE#");
    let assign = tokio::spawn({
        let (service, user, role) = (fx.service.clone(), user.clone(), role.clone());
        async move { service.assign_role_to_user(&CallContext::new(), &user, &role).await }
    });
    gate.reached().await;

    let delete = tokio::spawn({
        let (service, user) = (fx.service.clone(), user.clone());
        async move { service.delete_user(&CallContext::new(), &user).await }
    });
    while fx.service.get_user(&fx.ctx, &user).await.is_ok() {
        tokio::task::yield_now().await;
    }

    gate.release();
    assign.await.unwrap().unwrap();
    delete.await.unwrap().unwrap();

    assert!(fx.storage().effective().get(&user).await.unwrap().is_none());
    assert!(!cached(&fx.service, &user, "p1").await);
}
