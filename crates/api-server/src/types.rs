//! API request and response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use coursecraft_common::{Course, CourseModule, CourseStatus, GenerationRun, Roadmap, RunStatus};

/// Registration / login credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Public view of an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
}

/// Roadmap creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoadmapRequest {
    pub title: String,
    pub field: String,
    /// Defaults to "beginner"
    #[serde(default)]
    pub level: Option<String>,
    /// Defaults to 8
    #[serde(default)]
    pub weekly_hours: Option<i32>,
    /// Defaults to 16
    #[serde(default)]
    pub duration_weeks: Option<i32>,
}

/// Roadmap representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadmapResponse {
    pub id: Uuid,
    pub title: String,
    pub field: String,
    pub level: String,
    pub weekly_hours: i32,
    pub duration_weeks: i32,
    pub created_at: DateTime<Utc>,
}

impl From<Roadmap> for RoadmapResponse {
    fn from(roadmap: Roadmap) -> Self {
        Self {
            id: roadmap.id,
            title: roadmap.title,
            field: roadmap.field,
            level: roadmap.level,
            weekly_hours: roadmap.weekly_hours,
            duration_weeks: roadmap.duration_weeks,
            created_at: roadmap.created_at,
        }
    }
}

/// One module of a course view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleResponse {
    pub week: i32,
    pub title: String,
    pub outcomes: Vec<String>,
    #[serde(default)]
    pub content_md: Option<String>,
}

impl From<CourseModule> for ModuleResponse {
    fn from(module: CourseModule) -> Self {
        Self {
            week: module.week,
            title: module.title,
            outcomes: module.outcomes,
            content_md: module.content_md,
        }
    }
}

/// Course view with its modules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseResponse {
    pub id: Uuid,
    pub roadmap_id: Uuid,
    pub status: CourseStatus,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub modules: Vec<ModuleResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CourseResponse {
    #[must_use]
    pub fn from_parts(course: Course, modules: Vec<CourseModule>) -> Self {
        Self {
            id: course.id,
            roadmap_id: course.roadmap_id,
            status: course.status,
            title: course.title,
            description: course.description,
            modules: modules.into_iter().map(ModuleResponse::from).collect(),
            created_at: course.created_at,
            updated_at: course.updated_at,
        }
    }
}

/// Module-writing request options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateModulesRequest {
    /// Rewrite modules that already have content
    #[serde(default)]
    pub overwrite: bool,
}

/// Response for an accepted generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAccepted {
    pub run_id: Uuid,
    pub status: RunStatus,
}

/// Polled run state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatusResponse {
    pub id: Uuid,
    pub status: RunStatus,
    pub progress: i32,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub course_id: Option<Uuid>,
    /// Outline JSON; only populated once the run has succeeded
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

impl From<GenerationRun> for RunStatusResponse {
    fn from(run: GenerationRun) -> Self {
        let result = if run.status == RunStatus::Succeeded {
            run.result
        } else {
            None
        };
        Self {
            id: run.id,
            status: run.status,
            progress: run.progress,
            message: run.message,
            error: run.error,
            course_id: run.course_id,
            result,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_deserialization() {
        let json = r#"{"email": "Alice@Example.com", "password": "hunter2"}"#;
        let creds: Credentials = serde_json::from_str(json).unwrap();
        assert_eq!(creds.email, "Alice@Example.com");
        assert_eq!(creds.password, "hunter2");
    }

    #[test]
    fn test_create_roadmap_request_defaults() {
        let json = r#"{"title": "Learn Rust", "field": "systems programming"}"#;
        let request: CreateRoadmapRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.title, "Learn Rust");
        assert!(request.level.is_none());
        assert!(request.weekly_hours.is_none());
        assert!(request.duration_weeks.is_none());
    }

    #[test]
    fn test_generate_modules_request_defaults() {
        let request: GenerateModulesRequest = serde_json::from_str("{}").unwrap();
        assert!(!request.overwrite);

        let request: GenerateModulesRequest =
            serde_json::from_str(r#"{"overwrite": true}"#).unwrap();
        assert!(request.overwrite);
    }

    #[test]
    fn test_run_accepted_serialization() {
        let accepted = RunAccepted {
            run_id: Uuid::nil(),
            status: RunStatus::Queued,
        };
        let json = serde_json::to_value(&accepted).unwrap();
        assert_eq!(json["status"], "queued");
    }

    #[test]
    fn test_run_status_response_hides_result_until_succeeded() {
        let base = GenerationRun {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            roadmap_id: Uuid::new_v4(),
            course_id: None,
            job_id: None,
            status: RunStatus::Running,
            progress: 60,
            message: Some("Creating course structure".to_string()),
            result: Some(serde_json::json!({"weeks": []})),
            error: None,
            started_at: None,
            finished_at: None,
            created_at: Utc::now(),
        };

        let running = RunStatusResponse::from(base.clone());
        assert!(running.result.is_none());

        let mut succeeded = base;
        succeeded.status = RunStatus::Succeeded;
        let response = RunStatusResponse::from(succeeded);
        assert_eq!(response.result, Some(serde_json::json!({"weeks": []})));
    }

    #[test]
    fn test_course_response_from_parts() {
        let course = Course {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            roadmap_id: Uuid::new_v4(),
            status: CourseStatus::Ready,
            title: "Rust (AI-generated)".to_string(),
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let modules = vec![CourseModule {
            id: Uuid::new_v4(),
            course_id: course.id,
            week: 1,
            title: "Ownership".to_string(),
            outcomes: vec!["explain moves".to_string(), "use borrows".to_string()],
            content_md: None,
            created_at: Utc::now(),
        }];

        let response = CourseResponse::from_parts(course, modules);
        assert_eq!(response.modules.len(), 1);
        assert_eq!(response.modules[0].week, 1);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "ready");
    }
}
