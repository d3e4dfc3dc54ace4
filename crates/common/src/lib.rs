//! Shared domain model for the Course Crafter service
//!
//! Entities here are the canonical in-memory form of the rows the storage
//! layer persists. Status enums carry their lowercase wire form on both the
//! API surface and the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Stored normalized: trimmed and lowercased
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A server-side session record
///
/// Only the SHA-256 hex digest of the raw token is persisted; the raw value
/// lives exclusively in the client's cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A learning roadmap request: what to learn, at what level, on what budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roadmap {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub field: String,
    pub level: String,
    pub weekly_hours: i32,
    pub duration_weeks: i32,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a generated course
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    Draft,
    Running,
    Ready,
    Failed,
}

impl CourseStatus {
    /// Database / wire form
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Running => "running",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for CourseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "running" => Ok(Self::Running),
            "ready" => Ok(Self::Ready),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown course status '{s}'")),
        }
    }
}

/// A course generated from a roadmap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: Uuid,
    pub user_id: Uuid,
    pub roadmap_id: Uuid,
    pub status: CourseStatus,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One week of a course
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseModule {
    pub id: Uuid,
    pub course_id: Uuid,
    pub week: i32,
    pub title: String,
    pub outcomes: Vec<String>,
    /// Markdown lesson body; `None` until the module writer has run
    pub content_md: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CourseModule {
    /// Whether the module already carries non-blank lesson content
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.content_md
            .as_deref()
            .is_some_and(|md| !md.trim().is_empty())
    }
}

/// Lifecycle of a generation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    /// Database / wire form
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// A settled run is never picked up again
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown run status '{s}'")),
        }
    }
}

/// Progress record for one asynchronous generation job
///
/// Clients poll this row while the worker drives the job; `result` holds the
/// outline JSON once an outline run succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRun {
    pub id: Uuid,
    pub user_id: Uuid,
    pub roadmap_id: Uuid,
    pub course_id: Option<Uuid>,
    /// Queue job backing this run
    pub job_id: Option<Uuid>,
    pub status: RunStatus,
    /// 0..=100
    pub progress: i32,
    pub message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Kind of work a queue job carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    GenerateRoadmapOutline,
    GenerateCourseModules,
}

impl JobKind {
    /// Database / wire form
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateRoadmapOutline => "generate_roadmap_outline",
            Self::GenerateCourseModules => "generate_course_modules",
        }
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generate_roadmap_outline" => Ok(Self::GenerateRoadmapOutline),
            "generate_course_modules" => Ok(Self::GenerateCourseModules),
            _ => Err(format!("unknown job kind '{s}'")),
        }
    }
}

/// Queue state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting to be claimed
    Pending,
    /// Claimed by a worker
    Running,
    /// Acknowledged after successful (or permanently failed) handling
    Done,
    /// Retries exhausted
    Dead,
}

impl JobState {
    /// Database / wire form
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Dead => "dead",
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "dead" => Ok(Self::Dead),
            _ => Err(format!("unknown job state '{s}'")),
        }
    }
}

/// A durable queue job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub kind: JobKind,
    pub run_id: Uuid,
    pub course_id: Option<Uuid>,
    pub overwrite: bool,
    pub attempts: i32,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
