//! Resolver and service behavior under store failures, cancellation and
//! deadlines.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use rolegate_core::{CallContext, CoreError, RbacService, RoleFanout, shared_storage};
use rolegate_repository::RepositoryError;
use rolegate_store::{MemoryBackend, StorageError};
use rolegate_test_fixtures::{FlakyBackend, TestFixture};
use rolegate_types::EntityKind;

async fn two_role_user(fx: &TestFixture) -> (String, String, String) {
    let user = fx.user("Ada").await.unwrap();
    let good = fx.role("good").await.unwrap();
    let bad = fx.role("bad").await.unwrap();
    fx.permission("doc.read").await.unwrap();
    fx.permission("doc.write").await.unwrap();
    fx.grant(&good, "doc.read").await.unwrap();
    fx.grant(&bad, "doc.write").await.unwrap();
    fx.assign(&user, &good).await.unwrap();
    fx.assign(&user, &bad).await.unwrap();
    (user, good, bad)
}

#[tokio::test]
async fn failing_role_is_skipped() {
    let flaky = FlakyBackend::new(MemoryBackend::new());
    let fx = TestFixture::over(flaky.clone(), false);
    let (user, _good, bad) = two_role_user(&fx).await;

    flaky.fail_partition(format!("ROLE#{}", bad));

    assert!(fx.check(&user, "doc.read").await.unwrap());
    // the broken role's permission is unreachable, so this denies rather than errors
    assert!(!fx.check(&user, "doc.write").await.unwrap());
}

#[tokio::test]
async fn failing_user_partition_is_an_error_not_a_denial() {
    let flaky = FlakyBackend::new(MemoryBackend::new());
    let fx = TestFixture::over(flaky.clone(), false);
    let (user, _, _) = two_role_user(&fx).await;

    flaky.fail_partition(format!("USER#{}", user));

    let err = fx.service.has_permission(&fx.ctx, &user, "doc.read").await.unwrap_err();
    assert!(matches!(err, CoreError::Repository(RepositoryError::Timeout)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn failing_page_aborts_traversal() {
    let flaky = FlakyBackend::new(MemoryBackend::new())
        .with_error(StorageError::connection("connection reset"));
    let fx = TestFixture::over(flaky.clone(), false);
    let user = fx.user("Ada").await.unwrap();
    // more roles than fit on one page of the fixture's page size
    for i in 0..10 {
        let role = fx.role(&format!("role{}", i)).await.unwrap();
        fx.assign(&user, &role).await.unwrap();
    }

    flaky.fail_queries_after(1);
    let err = fx
        .storage()
        .relations()
        .forward_neighbors(EntityKind::User, &user, EntityKind::Role)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Unavailable(_)));

    flaky.heal();
    flaky.fail_queries_after(1);
    assert!(fx.service.roles_of_user(&fx.ctx, &user).await.is_err());
}

#[tokio::test]
async fn cancelled_check_returns_cancelled() {
    let fx = TestFixture::new();
    let (user, _, _) = two_role_user(&fx).await;

    let ctx = CallContext::new();
    ctx.cancel();
    let result = fx.service.has_permission(&ctx, &user, "doc.read").await;
    assert!(matches!(result, Err(CoreError::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn slow_store_hits_deadline() {
    let flaky = FlakyBackend::new(MemoryBackend::new());
    let fx = TestFixture::over(flaky.clone(), false);
    let (user, _, _) = two_role_user(&fx).await;

    flaky.delay_queries(Duration::from_secs(30));
    let ctx = CallContext::with_timeout(Duration::from_millis(200));
    let result = fx.service.has_permission(&ctx, &user, "doc.read").await;
    assert!(matches!(result, Err(CoreError::DeadlineExceeded)));
}

#[tokio::test(start_paused = true)]
async fn resolver_timeout_applies_without_caller_deadline() {
    let flaky = FlakyBackend::new(MemoryBackend::new());
    let service = RbacService::builder()
        .storage(shared_storage(flaky.clone(), 4))
        .fanout(RoleFanout::new(2))
        .resolver_timeout(Duration::from_millis(100))
        .build();
    let ctx = CallContext::new();
    let user = service.create_user(&ctx, "Ada", "ada@example.com").await.unwrap();

    flaky.delay_queries(Duration::from_secs(5));
    let result = service.has_permission(&ctx, user.id.as_str(), "doc.read").await;
    assert!(matches!(result, Err(CoreError::DeadlineExceeded)));
}

#[tokio::test]
async fn transient_create_failure_is_indeterminate() {
    let flaky = FlakyBackend::new(MemoryBackend::new());
    let fx = TestFixture::over(flaky.clone(), false);

    flaky.fail_writes(true);
    let err = fx.service.create_role(&fx.ctx, "Admin", "").await.unwrap_err();
    assert!(matches!(err, CoreError::Indeterminate(RepositoryError::Timeout)));
    assert!(!err.is_retryable());
}
