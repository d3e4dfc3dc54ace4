//! PostgreSQL persistence for the Course Crafter service
//!
//! Two concerns live here:
//! - **Metadata**: users, sessions, roadmaps, courses, modules, and
//!   generation runs ([`MetadataStore`]).
//! - **Job queue**: the durable `jobs` table the worker consumes
//!   ([`JobQueue`]). Claims use `FOR UPDATE SKIP LOCKED`, so concurrent
//!   workers never receive the same job and a crashed worker leaves its job
//!   visible in the `running` state rather than losing it.
//!
//! Both traits are implemented by [`PostgresStore`].

use thiserror::Error;
use uuid::Uuid;

pub mod job_queue;
pub mod metadata_store;

pub use job_queue::JobQueue;
pub use metadata_store::{MetadataStore, PostgresConfig, PostgresStore};

use coursecraft_common::{CourseStatus, RunStatus};

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("postgres error: {0}")]
    Postgres(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<tokio_postgres::Error> for StorageError {
    fn from(err: tokio_postgres::Error) -> Self {
        use tokio_postgres::error::SqlState;
        if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
            StorageError::Conflict(err.to_string())
        } else {
            StorageError::Postgres(err.to_string())
        }
    }
}

/// Parameters for a new roadmap row
#[derive(Debug, Clone)]
pub struct NewRoadmap {
    pub user_id: Uuid,
    pub title: String,
    pub field: String,
    pub level: String,
    pub weekly_hours: i32,
    pub duration_weeks: i32,
}

/// Parameters for a new course row
#[derive(Debug, Clone)]
pub struct NewCourse {
    pub user_id: Uuid,
    pub roadmap_id: Uuid,
    pub status: CourseStatus,
    pub title: String,
    pub description: Option<String>,
}

/// Parameters for a new course module row
#[derive(Debug, Clone)]
pub struct NewModule {
    pub week: i32,
    pub title: String,
    pub outcomes: Vec<String>,
}

/// Parameters for a new generation run row
#[derive(Debug, Clone)]
pub struct NewRun {
    pub user_id: Uuid,
    pub roadmap_id: Uuid,
    pub course_id: Option<Uuid>,
}

/// Partial update applied to a generation run
///
/// Only fields that are set get written; everything else keeps its current
/// value. `started`/`finished` stamp the corresponding timestamp with the
/// database clock.
#[derive(Debug, Clone, Default)]
pub struct RunPatch {
    pub status: Option<RunStatus>,
    pub progress: Option<i32>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
    pub course_id: Option<Uuid>,
    pub started: bool,
    pub finished: bool,
}

impl RunPatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn status(mut self, status: RunStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn progress(mut self, progress: i32) -> Self {
        self.progress = Some(progress.clamp(0, 100));
        self
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    #[must_use]
    pub fn result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    #[must_use]
    pub fn course_id(mut self, course_id: Uuid) -> Self {
        self.course_id = Some(course_id);
        self
    }

    #[must_use]
    pub fn started(mut self) -> Self {
        self.started = true;
        self
    }

    #[must_use]
    pub fn finished(mut self) -> Self {
        self.finished = true;
        self
    }
}
