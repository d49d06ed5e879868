//! Request/response shapes for the HTTP API, including the RPC-style
//! response envelope.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nimbus_db::models::{Action, InstanceStatus, Priority, StatusFilterMode, Task};

use crate::executor::create_instances::CreateInstancesPayload;
use crate::executor::terminate_instances::TerminateInstancesPayload;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub slug: &'static str,
    pub error: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            slug: "success",
            error: String::new(),
            data: Some(data),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub owner_id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    pub action: Action,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub instance_id: Option<Uuid>,
}

fn default_priority() -> Priority {
    Priority::Normal
}

#[derive(Debug, Serialize)]
pub struct SubmitTaskResponse {
    pub task_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub action: Action,
    pub status: String,
    pub priority: String,
    pub attempts: i32,
    pub error: String,
    pub logs: String,
    pub result: Option<serde_json::Value>,
}

impl From<Task> for TaskResponse {
    fn from(t: Task) -> Self {
        Self {
            id: t.id,
            action: t.action,
            status: t.status.to_string(),
            priority: t.priority.to_string(),
            attempts: t.attempts,
            error: t.error,
            logs: t.logs,
            result: t.result,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct InstanceListQuery {
    pub status: Option<InstanceStatus>,
    #[serde(default)]
    pub status_filter: Option<StatusFilterQuery>,
    #[serde(default)]
    pub include_deleted: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilterQuery {
    Equal,
    NotEqual,
}

impl From<StatusFilterQuery> for StatusFilterMode {
    fn from(q: StatusFilterQuery) -> Self {
        match q {
            StatusFilterQuery::Equal => StatusFilterMode::Equal,
            StatusFilterQuery::NotEqual => StatusFilterMode::NotEqual,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InstanceResponse {
    pub id: Uuid,
    pub name: String,
    pub provider_id: String,
    pub region: String,
    pub size: String,
    pub status: String,
    pub public_ip: Option<String>,
}

impl From<nimbus_db::models::Instance> for InstanceResponse {
    fn from(i: nimbus_db::models::Instance) -> Self {
        Self {
            id: i.id,
            name: i.name,
            provider_id: i.provider_id,
            region: i.region,
            size: i.size,
            status: i.status.to_string(),
            public_ip: i.public_ip,
        }
    }
}

/// Shortcut body for `POST /instances`: wraps the same payload shape the
/// `CreateInstances` action expects, plus the project it targets.
#[derive(Debug, Deserialize)]
pub struct CreateInstancesShortcut {
    pub project: String,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(flatten)]
    pub payload: CreateInstancesPayload,
}

/// Shortcut body for `DELETE /instances`: wraps the `TerminateInstances`
/// payload shape plus the project it targets.
#[derive(Debug, Deserialize)]
pub struct TerminateInstancesShortcut {
    pub project: String,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(flatten)]
    pub payload: TerminateInstancesPayload,
}
