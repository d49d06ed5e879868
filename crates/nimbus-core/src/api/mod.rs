//! The thin HTTP API surface boundary.
//!
//! Accepts validated submissions and persists them as `Task` rows; never
//! calls providers directly. Built around `build_router`
//! (`axum::Router`, `CorsLayer`, a typed `AppError` -> JSON response) with
//! a `{slug, error, data}` envelope, plus the write endpoints
//! (`POST /projects`, `POST /projects/{name}/tasks`, `POST|DELETE
//! /instances`) a read-only dashboard wouldn't need.

mod dto;
mod error;

use axum::routing::{delete, get, post};
use axum::Router;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;

pub use error::AppError;

mod handlers;

/// Build the full `/api/v1` router over a connection pool.
pub fn build_router(pool: PgPool) -> Router {
    Router::new()
        .route("/api/v1/projects", post(handlers::create_project))
        .route("/api/v1/projects/:name/tasks", post(handlers::submit_task))
        .route("/api/v1/projects/:name/tasks", get(handlers::list_tasks))
        .route("/api/v1/tasks/:id", get(handlers::get_task))
        .route("/api/v1/instances", get(handlers::list_instances))
        .route("/api/v1/instances", post(handlers::create_instances_shortcut))
        .route("/api/v1/instances", delete(handlers::terminate_instances_shortcut))
        .layer(CorsLayer::permissive())
        .with_state(pool)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sqlx::PgPool;
    use tower::ServiceExt;

    use nimbus_test_utils::{create_test_db, drop_test_db};

    async fn send_request(
        pool: PgPool,
        method: &str,
        uri: &str,
        owner_id: i64,
        body: serde_json::Value,
    ) -> axum::response::Response {
        let app = super::build_router(pool);
        let body = if body.is_null() {
            Body::empty()
        } else {
            Body::from(body.to_string())
        };
        let mut builder = Request::builder().method(method).uri(uri).header("content-type", "application/json");
        if owner_id >= 0 {
            builder = builder.header("x-owner-id", owner_id.to_string());
        }
        app.oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const OWNER: i64 = 1;

    #[tokio::test]
    async fn create_project_then_list_it() {
        let (pool, db_name) = create_test_db().await;

        let resp = send_request(
            pool.clone(),
            "POST",
            "/api/v1/projects",
            OWNER,
            serde_json::json!({"name": "fleet-a"}),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["slug"], "success");
        assert_eq!(body["data"]["name"], "fleet-a");

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn missing_owner_header_is_rejected() {
        let (pool, db_name) = create_test_db().await;

        let resp = send_request(
            pool.clone(),
            "POST",
            "/api/v1/projects",
            -1,
            serde_json::json!({"name": "fleet-b"}),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["slug"], "invalid-input");

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn submit_task_then_get_it() {
        let (pool, db_name) = create_test_db().await;

        send_request(
            pool.clone(),
            "POST",
            "/api/v1/projects",
            OWNER,
            serde_json::json!({"name": "fleet-c"}),
        )
        .await;

        let resp = send_request(
            pool.clone(),
            "POST",
            "/api/v1/projects/fleet-c/tasks",
            OWNER,
            serde_json::json!({"action": "create_instances", "payload": {"requests": []}}),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        let task_id = body["data"]["task_id"].as_str().expect("task_id should be a string");

        let resp = send_request(pool.clone(), "GET", &format!("/api/v1/tasks/{task_id}"), OWNER, serde_json::Value::Null).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["status"], "pending");
        assert_eq!(body["data"]["priority"], "normal");

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn get_task_for_another_owner_is_not_found() {
        let (pool, db_name) = create_test_db().await;

        send_request(pool.clone(), "POST", "/api/v1/projects", OWNER, serde_json::json!({"name": "fleet-d"})).await;
        let resp = send_request(
            pool.clone(),
            "POST",
            "/api/v1/projects/fleet-d/tasks",
            OWNER,
            serde_json::json!({"action": "terminate_instances", "payload": {}}),
        )
        .await;
        let body = body_json(resp).await;
        let task_id = body["data"]["task_id"].as_str().unwrap().to_string();

        let resp = send_request(pool.clone(), "GET", &format!("/api/v1/tasks/{task_id}"), OWNER + 1, serde_json::Value::Null).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn create_instances_shortcut_enqueues_a_task() {
        let (pool, db_name) = create_test_db().await;

        send_request(pool.clone(), "POST", "/api/v1/projects", OWNER, serde_json::json!({"name": "fleet-e"})).await;

        let resp = send_request(
            pool.clone(),
            "POST",
            "/api/v1/instances",
            OWNER,
            serde_json::json!({
                "project": "fleet-e",
                "requests": [{
                    "provider": "mock",
                    "count": 1,
                    "region": "us-east-1",
                    "size": "small",
                    "image": "ubuntu-22.04",
                    "ssh_key_name": "default"
                }]
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert!(body["data"]["task_id"].is_string());

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn list_instances_excludes_terminated_by_default() {
        let (pool, db_name) = create_test_db().await;

        let resp = send_request(pool.clone(), "GET", "/api/v1/instances", OWNER, serde_json::Value::Null).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 0);

        pool.close().await;
        drop_test_db(&db_name).await;
    }
}
