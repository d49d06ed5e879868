//! Integration tests for the project repository: uniqueness, tenancy, and
//! soft delete.

use nimbus_db::pagination::Page;
use nimbus_db::queries::projects;
use nimbus_db::StoreError;

use nimbus_test_utils::{create_test_db, drop_test_db};

const OWNER: i64 = 7;

#[tokio::test]
async fn create_rejects_duplicate_name_for_same_owner() {
    let (pool, db_name) = create_test_db().await;

    projects::create(&pool, OWNER, "prod")
        .await
        .expect("first create should succeed");

    let err = projects::create(&pool, OWNER, "prod")
        .await
        .expect_err("duplicate name should be rejected");
    assert!(matches!(err, StoreError::Conflict(_)));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn same_name_allowed_across_different_owners() {
    let (pool, db_name) = create_test_db().await;

    projects::create(&pool, OWNER, "shared-name").await.unwrap();
    let other = projects::create(&pool, OWNER + 1, "shared-name")
        .await
        .expect("a different owner may reuse the name");
    assert_eq!(other.name, "shared-name");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn soft_deleted_name_can_be_reused() {
    let (pool, db_name) = create_test_db().await;

    let project = projects::create(&pool, OWNER, "recyclable")
        .await
        .unwrap();
    projects::soft_delete(&pool, OWNER, project.id).await.unwrap();

    let recreated = projects::create(&pool, OWNER, "recyclable")
        .await
        .expect("soft-deleted name should be reusable");
    assert_ne!(recreated.id, project.id);

    let err = projects::get_by_id(&pool, OWNER, project.id)
        .await
        .expect_err("soft-deleted project should not be retrievable");
    assert!(matches!(err, StoreError::NotFound));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn list_is_tenancy_scoped_and_paginated() {
    let (pool, db_name) = create_test_db().await;

    for i in 0..3 {
        projects::create(&pool, OWNER, &format!("p{i}")).await.unwrap();
    }
    projects::create(&pool, OWNER + 1, "other-owner-project")
        .await
        .unwrap();

    let page = projects::list(&pool, OWNER, Page::new(0, 2)).await.unwrap();
    assert_eq!(page.len(), 2);

    let all = projects::list(&pool, OWNER, Page::new(0, 50)).await.unwrap();
    assert_eq!(all.len(), 3);

    pool.close().await;
    drop_test_db(&db_name).await;
}
