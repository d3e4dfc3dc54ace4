//! Metadata persistence using `PostgreSQL`
//!
//! Holds the account, roadmap, course, and generation-run tables behind the
//! [`MetadataStore`] trait. Schema bootstrap is idempotent
//! (`CREATE TABLE IF NOT EXISTS`), so every binary can call
//! [`MetadataStore::init_schema`] on startup.

use chrono::{DateTime, Utc};
use tokio_postgres::{Client, NoTls, Row};
use uuid::Uuid;

use coursecraft_common::{
    Course, CourseModule, CourseStatus, GenerationRun, Roadmap, SessionToken, User,
};

use crate::{NewCourse, NewModule, NewRoadmap, NewRun, RunPatch, StorageError, StorageResult};

/// `PostgreSQL` configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database host
    pub host: String,

    /// Database port
    pub port: u16,

    /// Database name
    pub database: String,

    /// Database user
    pub user: String,

    /// Database password
    pub password: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("POSTGRES_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5432),
            database: std::env::var("POSTGRES_DB")
                .unwrap_or_else(|_| "course_crafter".to_string()),
            user: std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("POSTGRES_PASSWORD").unwrap_or_default(),
        }
    }
}

impl PostgresConfig {
    /// Build connection string
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }
}

/// `PostgreSQL`-backed store for metadata and the job queue
pub struct PostgresStore {
    pub(crate) client: Client,
}

impl PostgresStore {
    /// Connect and spawn the connection driver in the background
    pub async fn connect(config: &PostgresConfig) -> StorageResult<Self> {
        let (client, connection) = tokio_postgres::connect(&config.connection_string(), NoTls)
            .await
            .map_err(|e| StorageError::Postgres(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Self { client })
    }
}

/// Metadata storage operations
#[async_trait::async_trait]
pub trait MetadataStore: Send + Sync {
    /// Initialize database schema (create tables if not exist)
    async fn init_schema(&self) -> StorageResult<()>;

    /// Insert a user; a duplicate normalized email yields
    /// [`StorageError::Conflict`]
    async fn create_user(&self, email: &str, password_hash: &str) -> StorageResult<User>;

    /// Look up a user by normalized email
    async fn user_by_email(&self, email: &str) -> StorageResult<Option<User>>;

    /// Look up a user by id
    async fn user_by_id(&self, id: Uuid) -> StorageResult<Option<User>>;

    /// Insert a session token row
    async fn create_session(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StorageResult<SessionToken>;

    /// Look up a live (non-revoked) session by token digest
    async fn session_by_token_hash(&self, token_hash: &str)
        -> StorageResult<Option<SessionToken>>;

    /// Record session activity
    async fn touch_session(&self, id: Uuid, at: DateTime<Utc>) -> StorageResult<()>;

    /// Revoke a session server-side
    async fn revoke_session(&self, id: Uuid, at: DateTime<Utc>) -> StorageResult<()>;

    /// Insert a roadmap
    async fn create_roadmap(&self, new: &NewRoadmap) -> StorageResult<Roadmap>;

    /// All roadmaps owned by a user, newest first
    async fn roadmaps_for_user(&self, user_id: Uuid) -> StorageResult<Vec<Roadmap>>;

    /// A roadmap, scoped to its owner
    async fn roadmap_for_user(&self, id: Uuid, user_id: Uuid) -> StorageResult<Option<Roadmap>>;

    /// A roadmap by id, unscoped (worker-side lookups)
    async fn roadmap_by_id(&self, id: Uuid) -> StorageResult<Option<Roadmap>>;

    /// Insert a course
    async fn create_course(&self, new: &NewCourse) -> StorageResult<Course>;

    /// A course, scoped to its owner
    async fn course_for_user(&self, id: Uuid, user_id: Uuid) -> StorageResult<Option<Course>>;

    /// Update a course's lifecycle status
    async fn set_course_status(&self, id: Uuid, status: CourseStatus) -> StorageResult<()>;

    /// Insert modules for a course (batch); returns the number inserted
    async fn insert_modules(&self, course_id: Uuid, modules: &[NewModule])
        -> StorageResult<usize>;

    /// Modules of a course, week ascending
    async fn modules_for_course(&self, course_id: Uuid) -> StorageResult<Vec<CourseModule>>;

    /// Store a module's generated Markdown
    async fn set_module_content(&self, id: Uuid, content_md: &str) -> StorageResult<()>;

    /// Insert a generation run in the `queued` state
    async fn create_run(&self, new: &NewRun) -> StorageResult<GenerationRun>;

    /// A run, scoped to its owner
    async fn run_for_user(&self, id: Uuid, user_id: Uuid)
        -> StorageResult<Option<GenerationRun>>;

    /// A run by id, unscoped (worker-side lookups)
    async fn run_by_id(&self, id: Uuid) -> StorageResult<Option<GenerationRun>>;

    /// Record the queue job backing a run
    async fn set_run_job_id(&self, id: Uuid, job_id: Uuid) -> StorageResult<()>;

    /// Apply a partial update to a run
    async fn update_run(&self, id: Uuid, patch: &RunPatch) -> StorageResult<()>;
}

#[async_trait::async_trait]
impl MetadataStore for PostgresStore {
    async fn init_schema(&self) -> StorageResult<()> {
        self.client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS users (
                    id UUID PRIMARY KEY,
                    email TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    is_active BOOLEAN NOT NULL DEFAULT TRUE,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now()
                )
                ",
                &[],
            )
            .await?;

        self.client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS session_tokens (
                    id UUID PRIMARY KEY,
                    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    token_hash TEXT NOT NULL,
                    expires_at TIMESTAMP WITH TIME ZONE NOT NULL,
                    last_seen_at TIMESTAMP WITH TIME ZONE NOT NULL,
                    revoked_at TIMESTAMP WITH TIME ZONE,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now()
                )
                ",
                &[],
            )
            .await?;

        self.client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS roadmaps (
                    id UUID PRIMARY KEY,
                    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    title VARCHAR(200) NOT NULL,
                    field VARCHAR(200) NOT NULL,
                    level VARCHAR(50) NOT NULL DEFAULT 'beginner',
                    weekly_hours INTEGER NOT NULL DEFAULT 8,
                    duration_weeks INTEGER NOT NULL DEFAULT 16,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now()
                )
                ",
                &[],
            )
            .await?;

        self.client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS courses (
                    id UUID PRIMARY KEY,
                    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    roadmap_id UUID NOT NULL REFERENCES roadmaps(id) ON DELETE CASCADE,
                    status VARCHAR(30) NOT NULL DEFAULT 'draft',
                    title VARCHAR(200) NOT NULL,
                    description TEXT,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now(),
                    updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now()
                )
                ",
                &[],
            )
            .await?;

        self.client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS course_modules (
                    id UUID PRIMARY KEY,
                    course_id UUID NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                    week INTEGER NOT NULL,
                    title VARCHAR(200) NOT NULL,
                    outcomes JSONB NOT NULL,
                    content_md TEXT,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now()
                )
                ",
                &[],
            )
            .await?;

        self.client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS generation_runs (
                    id UUID PRIMARY KEY,
                    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    roadmap_id UUID NOT NULL REFERENCES roadmaps(id) ON DELETE CASCADE,
                    course_id UUID,
                    job_id UUID,
                    status VARCHAR(30) NOT NULL DEFAULT 'queued',
                    progress INTEGER NOT NULL DEFAULT 0,
                    message VARCHAR(255),
                    result JSONB,
                    error TEXT,
                    started_at TIMESTAMP WITH TIME ZONE,
                    finished_at TIMESTAMP WITH TIME ZONE,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now()
                )
                ",
                &[],
            )
            .await?;

        self.client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS jobs (
                    id UUID PRIMARY KEY,
                    kind TEXT NOT NULL,
                    run_id UUID NOT NULL,
                    course_id UUID,
                    overwrite BOOLEAN NOT NULL DEFAULT FALSE,
                    attempts INTEGER NOT NULL DEFAULT 0,
                    state TEXT NOT NULL DEFAULT 'pending',
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now(),
                    updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now()
                )
                ",
                &[],
            )
            .await?;

        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_session_tokens_hash ON session_tokens(token_hash)",
                &[],
            )
            .await?;
        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_roadmaps_user ON roadmaps(user_id)",
                &[],
            )
            .await?;
        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_courses_user ON courses(user_id)",
                &[],
            )
            .await?;
        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_modules_course ON course_modules(course_id)",
                &[],
            )
            .await?;
        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_runs_user ON generation_runs(user_id)",
                &[],
            )
            .await?;
        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state, created_at)",
                &[],
            )
            .await?;

        tracing::info!("PostgreSQL schema initialized");

        Ok(())
    }

    async fn create_user(&self, email: &str, password_hash: &str) -> StorageResult<User> {
        let row = self
            .client
            .query_one(
                r"
                INSERT INTO users (id, email, password_hash)
                VALUES ($1, $2, $3)
                RETURNING id, email, password_hash, is_active, created_at
                ",
                &[&Uuid::new_v4(), &email, &password_hash],
            )
            .await?;
        user_from_row(&row)
    }

    async fn user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let row = self
            .client
            .query_opt(
                "SELECT id, email, password_hash, is_active, created_at
                 FROM users WHERE email = $1",
                &[&email],
            )
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn user_by_id(&self, id: Uuid) -> StorageResult<Option<User>> {
        let row = self
            .client
            .query_opt(
                "SELECT id, email, password_hash, is_active, created_at
                 FROM users WHERE id = $1",
                &[&id],
            )
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StorageResult<SessionToken> {
        let row = self
            .client
            .query_one(
                r"
                INSERT INTO session_tokens (id, user_id, token_hash, expires_at, last_seen_at)
                VALUES ($1, $2, $3, $4, now())
                RETURNING id, user_id, token_hash, expires_at, last_seen_at, revoked_at, created_at
                ",
                &[&Uuid::new_v4(), &user_id, &token_hash, &expires_at],
            )
            .await?;
        session_from_row(&row)
    }

    async fn session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> StorageResult<Option<SessionToken>> {
        let row = self
            .client
            .query_opt(
                "SELECT id, user_id, token_hash, expires_at, last_seen_at, revoked_at, created_at
                 FROM session_tokens
                 WHERE token_hash = $1 AND revoked_at IS NULL",
                &[&token_hash],
            )
            .await?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn touch_session(&self, id: Uuid, at: DateTime<Utc>) -> StorageResult<()> {
        self.client
            .execute(
                "UPDATE session_tokens SET last_seen_at = $2 WHERE id = $1",
                &[&id, &at],
            )
            .await?;
        Ok(())
    }

    async fn revoke_session(&self, id: Uuid, at: DateTime<Utc>) -> StorageResult<()> {
        self.client
            .execute(
                "UPDATE session_tokens SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL",
                &[&id, &at],
            )
            .await?;
        Ok(())
    }

    async fn create_roadmap(&self, new: &NewRoadmap) -> StorageResult<Roadmap> {
        let row = self
            .client
            .query_one(
                r"
                INSERT INTO roadmaps (id, user_id, title, field, level, weekly_hours, duration_weeks)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id, user_id, title, field, level, weekly_hours, duration_weeks, created_at
                ",
                &[
                    &Uuid::new_v4(),
                    &new.user_id,
                    &new.title,
                    &new.field,
                    &new.level,
                    &new.weekly_hours,
                    &new.duration_weeks,
                ],
            )
            .await?;
        Ok(roadmap_from_row(&row))
    }

    async fn roadmaps_for_user(&self, user_id: Uuid) -> StorageResult<Vec<Roadmap>> {
        let rows = self
            .client
            .query(
                "SELECT id, user_id, title, field, level, weekly_hours, duration_weeks, created_at
                 FROM roadmaps
                 WHERE user_id = $1
                 ORDER BY created_at DESC",
                &[&user_id],
            )
            .await?;
        Ok(rows.iter().map(roadmap_from_row).collect())
    }

    async fn roadmap_for_user(&self, id: Uuid, user_id: Uuid) -> StorageResult<Option<Roadmap>> {
        let row = self
            .client
            .query_opt(
                "SELECT id, user_id, title, field, level, weekly_hours, duration_weeks, created_at
                 FROM roadmaps
                 WHERE id = $1 AND user_id = $2",
                &[&id, &user_id],
            )
            .await?;
        Ok(row.as_ref().map(roadmap_from_row))
    }

    async fn roadmap_by_id(&self, id: Uuid) -> StorageResult<Option<Roadmap>> {
        let row = self
            .client
            .query_opt(
                "SELECT id, user_id, title, field, level, weekly_hours, duration_weeks, created_at
                 FROM roadmaps
                 WHERE id = $1",
                &[&id],
            )
            .await?;
        Ok(row.as_ref().map(roadmap_from_row))
    }

    async fn create_course(&self, new: &NewCourse) -> StorageResult<Course> {
        let row = self
            .client
            .query_one(
                r"
                INSERT INTO courses (id, user_id, roadmap_id, status, title, description)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, user_id, roadmap_id, status, title, description, created_at, updated_at
                ",
                &[
                    &Uuid::new_v4(),
                    &new.user_id,
                    &new.roadmap_id,
                    &new.status.as_str(),
                    &new.title,
                    &new.description,
                ],
            )
            .await?;
        course_from_row(&row)
    }

    async fn course_for_user(&self, id: Uuid, user_id: Uuid) -> StorageResult<Option<Course>> {
        let row = self
            .client
            .query_opt(
                "SELECT id, user_id, roadmap_id, status, title, description, created_at, updated_at
                 FROM courses
                 WHERE id = $1 AND user_id = $2",
                &[&id, &user_id],
            )
            .await?;
        row.as_ref().map(course_from_row).transpose()
    }

    async fn set_course_status(&self, id: Uuid, status: CourseStatus) -> StorageResult<()> {
        self.client
            .execute(
                "UPDATE courses SET status = $2, updated_at = now() WHERE id = $1",
                &[&id, &status.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn insert_modules(
        &self,
        course_id: Uuid,
        modules: &[NewModule],
    ) -> StorageResult<usize> {
        let mut inserted = 0;
        for module in modules {
            let outcomes = serde_json::to_value(&module.outcomes)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            self.client
                .execute(
                    r"
                    INSERT INTO course_modules (id, course_id, week, title, outcomes)
                    VALUES ($1, $2, $3, $4, $5)
                    ",
                    &[
                        &Uuid::new_v4(),
                        &course_id,
                        &module.week,
                        &module.title,
                        &outcomes,
                    ],
                )
                .await?;
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn modules_for_course(&self, course_id: Uuid) -> StorageResult<Vec<CourseModule>> {
        let rows = self
            .client
            .query(
                "SELECT id, course_id, week, title, outcomes, content_md, created_at
                 FROM course_modules
                 WHERE course_id = $1
                 ORDER BY week ASC",
                &[&course_id],
            )
            .await?;
        rows.iter().map(module_from_row).collect()
    }

    async fn set_module_content(&self, id: Uuid, content_md: &str) -> StorageResult<()> {
        self.client
            .execute(
                "UPDATE course_modules SET content_md = $2 WHERE id = $1",
                &[&id, &content_md],
            )
            .await?;
        Ok(())
    }

    async fn create_run(&self, new: &NewRun) -> StorageResult<GenerationRun> {
        let row = self
            .client
            .query_one(
                r"
                INSERT INTO generation_runs (id, user_id, roadmap_id, course_id, status, progress, message)
                VALUES ($1, $2, $3, $4, 'queued', 0, 'Queued')
                RETURNING id, user_id, roadmap_id, course_id, job_id, status, progress, message,
                          result, error, started_at, finished_at, created_at
                ",
                &[&Uuid::new_v4(), &new.user_id, &new.roadmap_id, &new.course_id],
            )
            .await?;
        run_from_row(&row)
    }

    async fn run_for_user(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> StorageResult<Option<GenerationRun>> {
        let row = self
            .client
            .query_opt(
                "SELECT id, user_id, roadmap_id, course_id, job_id, status, progress, message,
                        result, error, started_at, finished_at, created_at
                 FROM generation_runs
                 WHERE id = $1 AND user_id = $2",
                &[&id, &user_id],
            )
            .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn run_by_id(&self, id: Uuid) -> StorageResult<Option<GenerationRun>> {
        let row = self
            .client
            .query_opt(
                "SELECT id, user_id, roadmap_id, course_id, job_id, status, progress, message,
                        result, error, started_at, finished_at, created_at
                 FROM generation_runs
                 WHERE id = $1",
                &[&id],
            )
            .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn set_run_job_id(&self, id: Uuid, job_id: Uuid) -> StorageResult<()> {
        self.client
            .execute(
                "UPDATE generation_runs SET job_id = $2 WHERE id = $1",
                &[&id, &job_id],
            )
            .await?;
        Ok(())
    }

    async fn update_run(&self, id: Uuid, patch: &RunPatch) -> StorageResult<()> {
        let status = patch.status.map(|s| s.as_str());
        let affected = self
            .client
            .execute(
                r"
                UPDATE generation_runs SET
                    status = COALESCE($2, status),
                    progress = COALESCE($3, progress),
                    message = COALESCE($4, message),
                    error = COALESCE($5, error),
                    result = COALESCE($6, result),
                    course_id = COALESCE($7, course_id),
                    started_at = CASE WHEN $8 THEN now() ELSE started_at END,
                    finished_at = CASE WHEN $9 THEN now() ELSE finished_at END
                WHERE id = $1
                ",
                &[
                    &id,
                    &status,
                    &patch.progress,
                    &patch.message,
                    &patch.error,
                    &patch.result,
                    &patch.course_id,
                    &patch.started,
                    &patch.finished,
                ],
            )
            .await?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!("run {id}")));
        }
        Ok(())
    }
}

fn user_from_row(row: &Row) -> StorageResult<User> {
    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    })
}

fn session_from_row(row: &Row) -> StorageResult<SessionToken> {
    Ok(SessionToken {
        id: row.get("id"),
        user_id: row.get("user_id"),
        token_hash: row.get("token_hash"),
        expires_at: row.get("expires_at"),
        last_seen_at: row.get("last_seen_at"),
        revoked_at: row.get("revoked_at"),
        created_at: row.get("created_at"),
    })
}

fn roadmap_from_row(row: &Row) -> Roadmap {
    Roadmap {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        field: row.get("field"),
        level: row.get("level"),
        weekly_hours: row.get("weekly_hours"),
        duration_weeks: row.get("duration_weeks"),
        created_at: row.get("created_at"),
    }
}

fn course_from_row(row: &Row) -> StorageResult<Course> {
    let status: String = row.get("status");
    Ok(Course {
        id: row.get("id"),
        user_id: row.get("user_id"),
        roadmap_id: row.get("roadmap_id"),
        status: status
            .parse()
            .map_err(StorageError::Serialization)?,
        title: row.get("title"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn module_from_row(row: &Row) -> StorageResult<CourseModule> {
    let outcomes: serde_json::Value = row.get("outcomes");
    Ok(CourseModule {
        id: row.get("id"),
        course_id: row.get("course_id"),
        week: row.get("week"),
        title: row.get("title"),
        outcomes: serde_json::from_value(outcomes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
        content_md: row.get("content_md"),
        created_at: row.get("created_at"),
    })
}

fn run_from_row(row: &Row) -> StorageResult<GenerationRun> {
    let status: String = row.get("status");
    Ok(GenerationRun {
        id: row.get("id"),
        user_id: row.get("user_id"),
        roadmap_id: row.get("roadmap_id"),
        course_id: row.get("course_id"),
        job_id: row.get("job_id"),
        status: status
            .parse()
            .map_err(StorageError::Serialization)?,
        progress: row.get("progress"),
        message: row.get("message"),
        result: row.get("result"),
        error: row.get("error"),
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
        created_at: row.get("created_at"),
    })
}
