//! HTTP request handlers for roadmaps, courses, and generation runs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::info;
use uuid::Uuid;

use coursecraft_common::JobKind;
use coursecraft_storage::{JobQueue, MetadataStore, NewRoadmap, NewRun};

use crate::auth::CurrentUser;
use crate::types::{
    CourseResponse, CreateRoadmapRequest, GenerateModulesRequest, HealthResponse,
    RoadmapResponse, RunAccepted, RunStatusResponse,
};
use crate::ApiState;

const DEFAULT_LEVEL: &str = "beginner";
const DEFAULT_WEEKLY_HOURS: i32 = 8;
const DEFAULT_DURATION_WEEKS: i32 = 16;

fn internal(err: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List the caller's roadmaps, newest first
pub async fn list_roadmaps(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let roadmaps = state
        .store
        .roadmaps_for_user(user.id)
        .await
        .map_err(internal)?;
    let response: Vec<RoadmapResponse> = roadmaps.into_iter().map(RoadmapResponse::from).collect();
    Ok(Json(response))
}

/// Create a roadmap
pub async fn create_roadmap(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<CreateRoadmapRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let title = request.title.trim().to_string();
    let field = request.field.trim().to_string();
    if title.is_empty() || field.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "title and field are required".to_string(),
        ));
    }

    let level = request
        .level
        .as_deref()
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_LEVEL)
        .to_string();

    let roadmap = state
        .store
        .create_roadmap(&NewRoadmap {
            user_id: user.id,
            title,
            field,
            level,
            weekly_hours: request.weekly_hours.unwrap_or(DEFAULT_WEEKLY_HOURS),
            duration_weeks: request.duration_weeks.unwrap_or(DEFAULT_DURATION_WEEKS),
        })
        .await
        .map_err(internal)?;

    info!(roadmap_id = %roadmap.id, user_id = %user.id, "roadmap created");

    Ok((StatusCode::CREATED, Json(RoadmapResponse::from(roadmap))))
}

/// Fetch one roadmap
pub async fn get_roadmap(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
    Path(roadmap_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let roadmap = state
        .store
        .roadmap_for_user(roadmap_id, user.id)
        .await
        .map_err(internal)?
        .ok_or((
            StatusCode::NOT_FOUND,
            format!("Roadmap not found: {roadmap_id}"),
        ))?;
    Ok(Json(RoadmapResponse::from(roadmap)))
}

/// Queue outline generation for a roadmap
pub async fn start_roadmap_generation(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
    Path(roadmap_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let roadmap = state
        .store
        .roadmap_for_user(roadmap_id, user.id)
        .await
        .map_err(internal)?
        .ok_or((
            StatusCode::NOT_FOUND,
            format!("Roadmap not found: {roadmap_id}"),
        ))?;

    let run = state
        .store
        .create_run(&NewRun {
            user_id: user.id,
            roadmap_id: roadmap.id,
            course_id: None,
        })
        .await
        .map_err(internal)?;

    let job = state
        .store
        .enqueue(JobKind::GenerateRoadmapOutline, run.id, None, false)
        .await
        .map_err(internal)?;
    state
        .store
        .set_run_job_id(run.id, job.id)
        .await
        .map_err(internal)?;

    info!(run_id = %run.id, job_id = %job.id, roadmap_id = %roadmap.id, "outline generation queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            run_id: run.id,
            status: run.status,
        }),
    ))
}

/// Fetch a course together with its modules
pub async fn get_course(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let course = state
        .store
        .course_for_user(course_id, user.id)
        .await
        .map_err(internal)?
        .ok_or((
            StatusCode::NOT_FOUND,
            format!("Course not found: {course_id}"),
        ))?;

    let modules = state
        .store
        .modules_for_course(course.id)
        .await
        .map_err(internal)?;

    Ok(Json(CourseResponse::from_parts(course, modules)))
}

/// Queue module-content generation for a course
pub async fn start_module_generation(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
    Path(course_id): Path<Uuid>,
    body: Option<Json<GenerateModulesRequest>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let options = body.map(|Json(request)| request).unwrap_or_default();

    let course = state
        .store
        .course_for_user(course_id, user.id)
        .await
        .map_err(internal)?
        .ok_or((
            StatusCode::NOT_FOUND,
            format!("Course not found: {course_id}"),
        ))?;

    let run = state
        .store
        .create_run(&NewRun {
            user_id: user.id,
            roadmap_id: course.roadmap_id,
            course_id: Some(course.id),
        })
        .await
        .map_err(internal)?;

    let job = state
        .store
        .enqueue(
            JobKind::GenerateCourseModules,
            run.id,
            Some(course.id),
            options.overwrite,
        )
        .await
        .map_err(internal)?;
    state
        .store
        .set_run_job_id(run.id, job.id)
        .await
        .map_err(internal)?;

    info!(
        run_id = %run.id,
        job_id = %job.id,
        course_id = %course.id,
        overwrite = options.overwrite,
        "module generation queued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            run_id: run.id,
            status: run.status,
        }),
    ))
}

/// Poll a generation run
pub async fn get_run_status(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
    Path(run_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let run = state
        .store
        .run_for_user(run_id, user.id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, format!("Run not found: {run_id}")))?;
    Ok(Json(RunStatusResponse::from(run)))
}
