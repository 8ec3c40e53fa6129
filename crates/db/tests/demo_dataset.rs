//! End-to-end checks that the demo dataset is actually workable: the seeded
//! accounts can drive the request workflow, and reloading restores the
//! canonical demo state afterwards.

use stockroom_core::domain::request::{Decision, RequestStatus, UsageRequestId};
use stockroom_core::domain::unit::{UnitId, UnitStatus};
use stockroom_core::domain::user::{Principal, Role, UserId};
use stockroom_db::repositories::{SqlUnitRepository, SqlWorkflowStore, UnitRepository};
use stockroom_db::{connect_with_settings, migrations, DbPool, DemoDataset, SeedPasswordHashes};

fn hashes() -> SeedPasswordHashes {
    SeedPasswordHashes {
        admin: "$2b$10$admin-test-hash".to_string(),
        user: "$2b$10$user-test-hash".to_string(),
    }
}

fn seed_admin() -> Principal {
    Principal::new(UserId("seed-user-admin".to_string()), Role::Admin)
}

async fn seeded_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .expect("connect to test database");
    migrations::run_pending(&pool).await.expect("run migrations");
    DemoDataset::load(&pool, &hashes()).await.expect("load demo dataset");
    pool
}

async fn lp001(pool: &DbPool) -> stockroom_core::domain::unit::Unit {
    SqlUnitRepository::new(pool.clone())
        .find_by_id(&UnitId("seed-unit-lp001".to_string()))
        .await
        .expect("find unit")
        .expect("unit present")
}

#[tokio::test]
async fn demo_accounts_can_drive_the_request_workflow() {
    let pool = seeded_pool().await;
    let store = SqlWorkflowStore::new(pool.clone());

    let decision = store
        .decide_usage_request(
            &seed_admin(),
            &UsageRequestId("seed-req-usage".to_string()),
            Decision::Approved,
            Some("have a good survey".to_string()),
        )
        .await
        .expect("approve the seeded request");

    assert_eq!(decision.request.status, RequestStatus::Approved);
    assert_eq!(decision.requester_name, "User");
    assert_eq!(decision.item_name.as_deref(), Some("ThinkPad X1 Carbon"));

    let unit = lp001(&pool).await;
    assert_eq!(unit.quantity, 2);
    assert_eq!(unit.status, UnitStatus::Available);
}

#[tokio::test]
async fn reloading_restores_the_canonical_demo_state() {
    let pool = seeded_pool().await;
    let store = SqlWorkflowStore::new(pool.clone());

    store
        .decide_usage_request(
            &seed_admin(),
            &UsageRequestId("seed-req-usage".to_string()),
            Decision::Approved,
            None,
        )
        .await
        .expect("approve the seeded request");
    assert_eq!(lp001(&pool).await.quantity, 2);

    DemoDataset::load(&pool, &hashes()).await.expect("reload demo dataset");
    let verification = DemoDataset::verify(&pool).await.expect("verify demo dataset");
    assert!(verification.all_present, "failed checks: {:?}", verification.checks);

    // The decided request is pending again and the stock is back.
    assert_eq!(lp001(&pool).await.quantity, 3);
    let status: String =
        sqlx::query_scalar("SELECT status FROM usage_request WHERE id = 'seed-req-usage'")
            .fetch_one(&pool)
            .await
            .expect("query request status");
    assert_eq!(status, "PENDING");
}
