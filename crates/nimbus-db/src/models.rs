use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Sentinel owner id that bypasses tenancy filters in repository reads.
///
/// Distinct from "unauthenticated", which is rejected above the Store.
pub const ADMIN: i64 = 0;

/// Compile-time bound on task execution attempts.
pub const MAX_ATTEMPTS: i32 = 10;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Scheduling priority. Lower numeric value sorts first (higher priority).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High = 0,
    Normal = 1,
    Low = 2,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        };
        f.write_str(s)
    }
}

impl FromStr for Priority {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            other => Err(EnumParseError::new("priority", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Status of a task. `Completed` and `Terminated` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Terminated,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "terminated" => Ok(Self::Terminated),
            other => Err(EnumParseError::new("task status", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// The kind of work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreateInstances,
    TerminateInstances,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CreateInstances => "create_instances",
            Self::TerminateInstances => "terminate_instances",
        };
        f.write_str(s)
    }
}

impl FromStr for Action {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_instances" => Ok(Self::CreateInstances),
            "terminate_instances" => Ok(Self::TerminateInstances),
            other => Err(EnumParseError::new("action", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Lifecycle status of an instance. `Terminated` is terminal and co-occurs
/// with soft delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Unknown,
    Pending,
    Provisioning,
    Configuring,
    Ready,
    Terminated,
}

impl Default for InstanceStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Pending => "pending",
            Self::Provisioning => "provisioning",
            Self::Configuring => "configuring",
            Self::Ready => "ready",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

impl FromStr for InstanceStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "pending" => Ok(Self::Pending),
            "provisioning" => Ok(Self::Provisioning),
            "configuring" => Ok(Self::Configuring),
            "ready" => Ok(Self::Ready),
            "terminated" => Ok(Self::Terminated),
            other => Err(EnumParseError::new("instance status", other)),
        }
    }
}

/// Direction used by [`crate::queries::instances::InstanceFilter`] when
/// matching on status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilterMode {
    Equal,
    NotEqual,
}

// ---------------------------------------------------------------------------

/// Generic parse error for the text-backed enums above.
#[derive(Debug, Clone)]
pub struct EnumParseError {
    pub kind: &'static str,
    pub value: String,
}

impl EnumParseError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for EnumParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A tenant. Identified by an opaque numeric owner id.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub owner_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A project: owned by exactly one user, unique by (owner_id, name).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A cloud compute instance belonging to a project.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Instance {
    pub id: Uuid,
    pub owner_id: i64,
    pub project_id: Uuid,
    pub name: String,
    pub provider_id: String,
    pub region: String,
    pub size: String,
    pub image: String,
    pub tags: Vec<String>,
    pub external_id: Option<String>,
    pub public_ip: Option<String>,
    pub status: InstanceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A task -- the central, durably-scheduled unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub owner_id: i64,
    pub project_id: Uuid,
    pub instance_id: Option<Uuid>,
    pub action: Action,
    pub status: TaskStatus,
    pub priority: Priority,
    pub attempts: i32,
    pub locked_at: Option<DateTime<Utc>>,
    pub lock_expiry: Option<DateTime<Utc>>,
    pub error: String,
    pub logs: String,
    pub result: Option<serde_json::Value>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Whether the scheduler is allowed to select this task.
    ///
    /// `status ∈ {Pending, Running} ∧ attempts < MAX_ATTEMPTS ∧
    /// (locked_at IS NULL ∨ lock_expiry < now)`.
    pub fn is_schedulable(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, TaskStatus::Pending | TaskStatus::Running)
            && self.attempts < MAX_ATTEMPTS
            && match self.lock_expiry {
                None => true,
                Some(expiry) => expiry < now,
            }
    }
}

/// An SSH key credential referenced by name from instance requests.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SshKey {
    pub owner_id: i64,
    pub name: String,
    pub public_key: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_display_roundtrip() {
        for p in [Priority::High, Priority::Normal, Priority::Low] {
            let s = p.to_string();
            let parsed: Priority = s.parse().expect("should parse");
            assert_eq!(p, parsed);
        }
    }

    #[test]
    fn priority_orders_high_first() {
        let mut ps = vec![Priority::Low, Priority::High, Priority::Normal];
        ps.sort();
        assert_eq!(ps, vec![Priority::High, Priority::Normal, Priority::Low]);
    }

    #[test]
    fn task_status_display_roundtrip() {
        let variants = [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Terminated,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: TaskStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn task_status_invalid() {
        assert!("bogus".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn action_display_roundtrip() {
        for a in [Action::CreateInstances, Action::TerminateInstances] {
            let s = a.to_string();
            let parsed: Action = s.parse().expect("should parse");
            assert_eq!(a, parsed);
        }
    }

    #[test]
    fn instance_status_display_roundtrip() {
        let variants = [
            InstanceStatus::Unknown,
            InstanceStatus::Pending,
            InstanceStatus::Provisioning,
            InstanceStatus::Configuring,
            InstanceStatus::Ready,
            InstanceStatus::Terminated,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: InstanceStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn instance_status_default_is_unknown() {
        assert_eq!(InstanceStatus::default(), InstanceStatus::Unknown);
    }

    #[test]
    fn task_schedulable_when_unlocked_and_pending() {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            owner_id: 1,
            project_id: Uuid::new_v4(),
            instance_id: None,
            action: Action::CreateInstances,
            status: TaskStatus::Pending,
            priority: Priority::Normal,
            attempts: 0,
            locked_at: None,
            lock_expiry: None,
            error: String::new(),
            logs: String::new(),
            result: None,
            payload: serde_json::json!({}),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        assert!(task.is_schedulable(now));
    }

    #[test]
    fn task_not_schedulable_when_locked_and_unexpired() {
        let now = Utc::now();
        let mut task = Task {
            id: Uuid::new_v4(),
            owner_id: 1,
            project_id: Uuid::new_v4(),
            instance_id: None,
            action: Action::CreateInstances,
            status: TaskStatus::Running,
            priority: Priority::Normal,
            attempts: 1,
            locked_at: Some(now),
            lock_expiry: Some(now + chrono::Duration::minutes(5)),
            error: String::new(),
            logs: String::new(),
            result: None,
            payload: serde_json::json!({}),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        assert!(!task.is_schedulable(now));
        task.lock_expiry = Some(now - chrono::Duration::seconds(1));
        assert!(task.is_schedulable(now));
    }

    #[test]
    fn task_not_schedulable_at_max_attempts() {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            owner_id: 1,
            project_id: Uuid::new_v4(),
            instance_id: None,
            action: Action::CreateInstances,
            status: TaskStatus::Failed,
            priority: Priority::Normal,
            attempts: MAX_ATTEMPTS,
            locked_at: None,
            lock_expiry: None,
            error: "boom".to_string(),
            logs: String::new(),
            result: None,
            payload: serde_json::json!({}),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        assert!(!task.is_schedulable(now));
    }
}
