//! Integration tests for the instance repository: status filters,
//! termination, and tenancy scoping.

use nimbus_db::models::InstanceStatus;
use nimbus_db::pagination::Page;
use nimbus_db::queries::instances::{self, InstanceFilter, NewInstance};
use nimbus_db::queries::projects;

use nimbus_test_utils::{create_test_db, drop_test_db};

const OWNER: i64 = 42;

fn new_instance(project_id: uuid::Uuid, name: &str) -> NewInstance {
    NewInstance {
        owner_id: OWNER,
        project_id,
        name: name.to_string(),
        provider_id: "mock".to_string(),
        region: "us-east-1".to_string(),
        size: "small".to_string(),
        image: "ubuntu-22.04".to_string(),
        tags: vec!["web".to_string()],
    }
}

#[tokio::test]
async fn create_defaults_to_pending() {
    let (pool, db_name) = create_test_db().await;

    let project = projects::create(&pool, OWNER, "infra").await.unwrap();
    let instance = instances::create(&pool, &new_instance(project.id, "web-1"))
        .await
        .expect("instance should create");

    assert_eq!(instance.status, InstanceStatus::Pending);
    assert!(instance.public_ip.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn list_excludes_terminated_by_default() {
    let (pool, db_name) = create_test_db().await;

    let project = projects::create(&pool, OWNER, "infra-2").await.unwrap();
    let live = instances::create(&pool, &new_instance(project.id, "live")).await.unwrap();
    let dead = instances::create(&pool, &new_instance(project.id, "dead")).await.unwrap();
    instances::terminate(&pool, dead.id).await.unwrap();

    let listed = instances::list(&pool, OWNER, &InstanceFilter::default(), Page::default())
        .await
        .unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, live.id);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn list_filters_by_status_not_equal() {
    let (pool, db_name) = create_test_db().await;

    let project = projects::create(&pool, OWNER, "infra-3").await.unwrap();
    let pending = instances::create(&pool, &new_instance(project.id, "pending-1")).await.unwrap();
    let ready = instances::create(&pool, &new_instance(project.id, "ready-1")).await.unwrap();
    instances::update_status(&pool, ready.id, InstanceStatus::Ready).await.unwrap();

    let filter = InstanceFilter {
        status: Some(InstanceStatus::Ready),
        status_filter: instances::StatusFilterModeOrDefault(
            nimbus_db::models::StatusFilterMode::NotEqual,
        ),
        include_deleted: false,
    };
    let listed = instances::list(&pool, OWNER, &filter, Page::default())
        .await
        .unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, pending.id);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn terminate_is_idempotent_and_soft_deletes() {
    let (pool, db_name) = create_test_db().await;

    let project = projects::create(&pool, OWNER, "infra-4").await.unwrap();
    let instance = instances::create(&pool, &new_instance(project.id, "to-terminate"))
        .await
        .unwrap();

    instances::terminate(&pool, instance.id).await.unwrap();
    instances::terminate(&pool, instance.id).await.unwrap();

    let reloaded = instances::get_by_id(&pool, OWNER, instance.id).await.unwrap();
    assert_eq!(reloaded.status, InstanceStatus::Terminated);
    assert!(reloaded.deleted_at.is_some());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn update_by_name_sets_public_ip_and_status() {
    let (pool, db_name) = create_test_db().await;

    let project = projects::create(&pool, OWNER, "infra-5").await.unwrap();
    instances::create(&pool, &new_instance(project.id, "named")).await.unwrap();

    let updated = instances::update_by_name(
        &pool,
        project.id,
        "named",
        Some("10.0.0.5"),
        Some("ext-123"),
        InstanceStatus::Ready,
    )
    .await
    .expect("update by name should succeed");

    assert_eq!(updated.public_ip.as_deref(), Some("10.0.0.5"));
    assert_eq!(updated.external_id.as_deref(), Some("ext-123"));
    assert_eq!(updated.status, InstanceStatus::Ready);

    pool.close().await;
    drop_test_db(&db_name).await;
}
