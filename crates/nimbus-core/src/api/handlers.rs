//! Route handlers. Each persists/reads `Task`/`Project`/`Instance` rows
//! and never calls a provider or provisioner directly.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use sqlx::PgPool;
use uuid::Uuid;

use nimbus_db::models::Action;
use nimbus_db::pagination::Page;
use nimbus_db::queries::{instances, projects, tasks};

use super::dto::*;
use super::error::AppError;

/// Owner id is threaded through as the tenancy key.
/// Authentication/authorization are out of scope; this boundary only
/// distinguishes "no tenant supplied" (rejected) from the `ADMIN`
/// sentinel, which a caller must supply explicitly as `0`.
fn owner_id_from_headers(headers: &HeaderMap) -> Result<i64, AppError> {
    let raw = headers
        .get("x-owner-id")
        .ok_or_else(|| AppError::invalid_input("missing X-Owner-Id header"))?
        .to_str()
        .map_err(|_| AppError::invalid_input("X-Owner-Id header is not valid UTF-8"))?;
    raw.parse::<i64>()
        .map_err(|_| AppError::invalid_input("X-Owner-Id header is not a valid integer"))
}

pub async fn create_project(
    State(pool): State<PgPool>,
    headers: HeaderMap,
    Json(req): Json<CreateProjectRequest>,
) -> Result<Json<Envelope<ProjectResponse>>, AppError> {
    let owner_id = owner_id_from_headers(&headers)?;
    let project = projects::create(&pool, owner_id, &req.name).await?;
    Ok(Json(Envelope::success(ProjectResponse {
        id: project.id,
        owner_id: project.owner_id,
        name: project.name,
    })))
}

pub async fn submit_task(
    State(pool): State<PgPool>,
    headers: HeaderMap,
    Path(project_name): Path<String>,
    Json(req): Json<SubmitTaskRequest>,
) -> Result<Json<Envelope<SubmitTaskResponse>>, AppError> {
    let owner_id = owner_id_from_headers(&headers)?;
    let project = projects::get_by_name(&pool, owner_id, &project_name).await?;

    let task = tasks::create(
        &pool,
        owner_id,
        project.id,
        req.instance_id,
        req.action,
        req.priority,
        req.payload,
    )
    .await?;

    Ok(Json(Envelope::success(SubmitTaskResponse { task_id: task.id })))
}

pub async fn list_tasks(
    State(pool): State<PgPool>,
    headers: HeaderMap,
    Path(project_name): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Envelope<Vec<TaskResponse>>>, AppError> {
    let owner_id = owner_id_from_headers(&headers)?;
    let project = projects::get_by_name(&pool, owner_id, &project_name).await?;

    let page = Page::new(page.page.unwrap_or(0) * page.limit.unwrap_or(Page::DEFAULT_LIMIT), page.limit.unwrap_or(Page::DEFAULT_LIMIT));
    let rows = tasks::list_by_project(&pool, owner_id, project.id, page).await?;

    Ok(Json(Envelope::success(
        rows.into_iter().map(TaskResponse::from).collect(),
    )))
}

pub async fn get_task(
    State(pool): State<PgPool>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<TaskResponse>>, AppError> {
    let owner_id = owner_id_from_headers(&headers)?;
    let task = tasks::get_by_id(&pool, owner_id, id).await?;
    Ok(Json(Envelope::success(TaskResponse::from(task))))
}

pub async fn list_instances(
    State(pool): State<PgPool>,
    headers: HeaderMap,
    Query(q): Query<InstanceListQuery>,
) -> Result<Json<Envelope<Vec<InstanceResponse>>>, AppError> {
    let owner_id = owner_id_from_headers(&headers)?;

    let filter = instances::InstanceFilter {
        status: q.status,
        status_filter: instances::StatusFilterModeOrDefault(
            q.status_filter.map(Into::into).unwrap_or(nimbus_db::models::StatusFilterMode::Equal),
        ),
        include_deleted: q.include_deleted,
    };
    let page = Page::new(q.offset.unwrap_or(0), q.limit.unwrap_or(Page::DEFAULT_LIMIT));

    let rows = instances::list(&pool, owner_id, &filter, page).await?;
    Ok(Json(Envelope::success(
        rows.into_iter().map(InstanceResponse::from).collect(),
    )))
}

pub async fn create_instances_shortcut(
    State(pool): State<PgPool>,
    headers: HeaderMap,
    Json(req): Json<CreateInstancesShortcut>,
) -> Result<Json<Envelope<SubmitTaskResponse>>, AppError> {
    let owner_id = owner_id_from_headers(&headers)?;
    let project = projects::get_by_name(&pool, owner_id, &req.project).await?;

    let payload = serde_json::to_value(&req.payload)
        .map_err(|e| AppError::invalid_input(format!("invalid create-instances payload: {e}")))?;

    let task = tasks::create(
        &pool,
        owner_id,
        project.id,
        None,
        Action::CreateInstances,
        req.priority,
        payload,
    )
    .await?;

    Ok(Json(Envelope::success(SubmitTaskResponse { task_id: task.id })))
}

pub async fn terminate_instances_shortcut(
    State(pool): State<PgPool>,
    headers: HeaderMap,
    Json(req): Json<TerminateInstancesShortcut>,
) -> Result<Json<Envelope<SubmitTaskResponse>>, AppError> {
    let owner_id = owner_id_from_headers(&headers)?;
    let project = projects::get_by_name(&pool, owner_id, &req.project).await?;

    let payload = serde_json::to_value(&req.payload)
        .map_err(|e| AppError::invalid_input(format!("invalid terminate-instances payload: {e}")))?;

    let task = tasks::create(
        &pool,
        owner_id,
        project.id,
        None,
        Action::TerminateInstances,
        req.priority,
        payload,
    )
    .await?;

    Ok(Json(Envelope::success(SubmitTaskResponse { task_id: task.id })))
}
