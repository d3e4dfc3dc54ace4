//! JSON API server for the Course Crafter service
//!
//! Exposes cookie-session authentication, roadmap management, course
//! viewing, and the asynchronous generation endpoints. Generation requests
//! return `202 Accepted` with a run id; clients poll `/runs/{run_id}` while
//! the worker drives the job.

pub mod auth;
pub mod handlers;
pub mod sessions;
pub mod types;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use coursecraft_storage::PostgresStore;

pub use auth::CurrentUser;
pub use sessions::SessionConfig;
pub use types::*;

/// API server state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    /// Metadata store and job queue
    pub store: Arc<PostgresStore>,
    /// Session policy
    pub sessions: SessionConfig,
}

impl ApiState {
    /// Create new API state
    #[must_use]
    pub fn new(store: Arc<PostgresStore>, sessions: SessionConfig) -> Self {
        Self { store, sessions }
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Authentication
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        // Roadmaps
        .route(
            "/roadmaps",
            get(handlers::list_roadmaps).post(handlers::create_roadmap),
        )
        .route("/roadmaps/{roadmap_id}", get(handlers::get_roadmap))
        .route(
            "/roadmaps/{roadmap_id}/generate",
            post(handlers::start_roadmap_generation),
        )
        // Courses
        .route("/courses/{course_id}", get(handlers::get_course))
        .route(
            "/courses/{course_id}/generate",
            post(handlers::start_module_generation),
        )
        // Run polling
        .route("/runs/{run_id}", get(handlers::get_run_status))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    tracing::info!("Starting API server on {}", addr);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await
}
