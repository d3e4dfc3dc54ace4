//! Generation worker
//!
//! Consumes the durable job queue: claims a job, flips its run to `running`,
//! dispatches to the outline or module-writing handler, and acks. Handler
//! errors send the job back to the queue with the attempt counter bumped;
//! once retries are exhausted the run is failed and the job buried.
//!
//! Permanent failures (missing roadmap/course/modules) fail the run and ack
//! the job, since re-running cannot fix them.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use coursecraft_common::{CourseStatus, JobKind, JobRecord, RunStatus};
use coursecraft_generation::{plan_outline, write_module, GenerationError};
use coursecraft_llm::ChatClient;
use coursecraft_storage::{
    JobQueue, MetadataStore, NewCourse, NewModule, PostgresStore, RunPatch, StorageError,
};

/// Times a failed job is requeued before being buried
pub const MAX_RETRIES: i32 = 3;

/// Worker errors; all of these are retryable (permanent failures settle the
/// run instead of surfacing here)
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between empty queue polls
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let poll_secs = std::env::var("WORKER_POLL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        Self {
            poll_interval: Duration::from_secs(poll_secs),
        }
    }
}

/// Whether a job that just failed should go back to the queue
#[must_use]
pub fn should_retry(attempts_so_far: i32) -> bool {
    attempts_so_far + 1 <= MAX_RETRIES
}

/// Progress value while writing module `done + 1` of `total`
#[must_use]
pub fn module_progress(done: usize, total: usize) -> i32 {
    (5.0 + done as f64 * (90.0 / total.max(1) as f64)) as i32
}

/// Queue consumer
pub struct Worker {
    store: Arc<PostgresStore>,
    llm: Box<dyn ChatClient>,
    config: WorkerConfig,
}

impl Worker {
    #[must_use]
    pub fn new(store: Arc<PostgresStore>, llm: Box<dyn ChatClient>, config: WorkerConfig) -> Self {
        Self { store, llm, config }
    }

    /// Claim and handle one job; sleeps for the poll interval when the queue
    /// is empty. Returns whether a job was handled.
    pub async fn step(&self) -> bool {
        let job = match self.store.claim().await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::debug!("idle (no jobs)");
                tokio::time::sleep(self.config.poll_interval).await;
                return false;
            }
            Err(e) => {
                error!("failed to claim job: {}", e);
                tokio::time::sleep(self.config.poll_interval).await;
                return false;
            }
        };

        self.process_job(&job).await;
        true
    }

    async fn process_job(&self, job: &JobRecord) {
        info!(
            job_id = %job.id,
            kind = job.kind.as_str(),
            run_id = %job.run_id,
            attempt = job.attempts,
            "processing job"
        );

        // Settled and orphaned runs are never re-run
        match self.store.run_by_id(job.run_id).await {
            Ok(Some(run)) if run.status.is_settled() => {
                info!(run_id = %job.run_id, status = run.status.as_str(), "run already settled, dropping job");
                self.ack_quietly(job).await;
                return;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(run_id = %job.run_id, "run row missing, dropping job");
                self.ack_quietly(job).await;
                return;
            }
            Err(e) => warn!(run_id = %job.run_id, "failed to load run: {}", e),
        }

        // Flip the run off "queued" immediately so polling clients see
        // movement before the first real milestone.
        let picked_up = self
            .store
            .update_run(
                job.run_id,
                &RunPatch::new()
                    .status(RunStatus::Running)
                    .progress(1)
                    .message("Worker picked up job")
                    .started(),
            )
            .await;
        if let Err(e) = picked_up {
            warn!(run_id = %job.run_id, "failed to flip run to running: {}", e);
        }

        let outcome = match job.kind {
            JobKind::GenerateRoadmapOutline => self.run_outline_job(job).await,
            JobKind::GenerateCourseModules => self.run_modules_job(job).await,
        };

        match outcome {
            Ok(()) => {
                info!(job_id = %job.id, "job handled, acking");
                self.ack_quietly(job).await;
            }
            Err(e) => self.handle_failure(job, &e).await,
        }
    }

    async fn handle_failure(&self, job: &JobRecord, err: &WorkerError) {
        error!(job_id = %job.id, "job failed: {}", err);

        if should_retry(job.attempts) {
            let next = job.attempts + 1;
            let patch = RunPatch::new()
                .status(RunStatus::Running)
                .message(format!("Retry {next}/{MAX_RETRIES} after error: {err}"));
            if let Err(e) = self.store.update_run(job.run_id, &patch).await {
                warn!(run_id = %job.run_id, "failed to record retry on run: {}", e);
            }
            match self.store.retry(job.id).await {
                Ok(attempts) => info!(job_id = %job.id, attempts, "job requeued"),
                Err(e) => error!(job_id = %job.id, "failed to requeue job: {}", e),
            }
        } else {
            let patch = RunPatch::new()
                .status(RunStatus::Failed)
                .error(format!("Retries exhausted: {err}"))
                .finished();
            if let Err(e) = self.store.update_run(job.run_id, &patch).await {
                warn!(run_id = %job.run_id, "failed to record failure on run: {}", e);
            }
            if let Err(e) = self.store.bury(job.id).await {
                error!(job_id = %job.id, "failed to bury job: {}", e);
            }
        }
    }

    async fn ack_quietly(&self, job: &JobRecord) {
        if let Err(e) = self.store.ack(job.id).await {
            error!(job_id = %job.id, "failed to ack job: {}", e);
        }
    }

    /// Fail the run permanently and treat the job as handled
    async fn settle_failed(&self, run_id: uuid::Uuid, error: &str) -> Result<(), WorkerError> {
        self.store
            .update_run(
                run_id,
                &RunPatch::new()
                    .status(RunStatus::Failed)
                    .error(error)
                    .finished(),
            )
            .await?;
        Ok(())
    }

    /// Plan the roadmap outline and materialize the course skeleton
    async fn run_outline_job(&self, job: &JobRecord) -> Result<(), WorkerError> {
        let run_id = job.run_id;
        let Some(run) = self.store.run_by_id(run_id).await? else {
            warn!(%run_id, "run not found");
            return Ok(());
        };

        self.store
            .update_run(
                run_id,
                &RunPatch::new()
                    .status(RunStatus::Running)
                    .progress(5)
                    .message("Starting outline generation"),
            )
            .await?;

        let Some(roadmap) = self.store.roadmap_by_id(run.roadmap_id).await? else {
            return self
                .settle_failed(
                    run_id,
                    &format!("Roadmap not found for roadmap_id={}", run.roadmap_id),
                )
                .await;
        };

        self.store
            .update_run(
                run_id,
                &RunPatch::new()
                    .progress(20)
                    .message("Planning roadmap outline (LLM)"),
            )
            .await?;

        let outline = plan_outline(
            self.llm.as_ref(),
            &roadmap.field,
            &roadmap.level,
            roadmap.weekly_hours,
            roadmap.duration_weeks,
        )
        .await?;

        self.store
            .update_run(
                run_id,
                &RunPatch::new()
                    .progress(60)
                    .message("Creating course structure"),
            )
            .await?;

        let course = self
            .store
            .create_course(&NewCourse {
                user_id: run.user_id,
                roadmap_id: roadmap.id,
                status: CourseStatus::Draft,
                title: format!("{} (AI-generated)", roadmap.title),
                description: Some(format!(
                    "{}-week roadmap for {}, level {}.",
                    roadmap.duration_weeks, roadmap.field, roadmap.level
                )),
            })
            .await?;

        let modules: Vec<NewModule> = outline
            .weeks
            .iter()
            .map(|week| NewModule {
                week: week.week,
                title: week.title.clone(),
                outcomes: week.outcomes.clone(),
            })
            .collect();
        self.store.insert_modules(course.id, &modules).await?;

        self.store
            .update_run(
                run_id,
                &RunPatch::new()
                    .course_id(course.id)
                    .progress(85)
                    .message("Saving outline and course structure")
                    .result(serde_json::to_value(&outline)?),
            )
            .await?;

        self.store
            .set_course_status(course.id, CourseStatus::Ready)
            .await?;
        self.store
            .update_run(
                run_id,
                &RunPatch::new()
                    .status(RunStatus::Succeeded)
                    .progress(100)
                    .message("Done")
                    .finished(),
            )
            .await?;

        info!(%run_id, course_id = %course.id, weeks = modules.len(), "outline generated");
        Ok(())
    }

    /// Write Markdown content for each module of a course
    async fn run_modules_job(&self, job: &JobRecord) -> Result<(), WorkerError> {
        let run_id = job.run_id;
        let Some(run) = self.store.run_by_id(run_id).await? else {
            warn!(%run_id, "run not found");
            return Ok(());
        };

        let Some(course_id) = job.course_id else {
            return self.settle_failed(run_id, "course_id missing in job payload").await;
        };
        let Some(course) = self.store.course_for_user(course_id, run.user_id).await? else {
            return self.settle_failed(run_id, "course not found").await;
        };
        let Some(roadmap) = self.store.roadmap_by_id(course.roadmap_id).await? else {
            return self.settle_failed(run_id, "roadmap not found for course").await;
        };

        let modules = self.store.modules_for_course(course.id).await?;
        if modules.is_empty() {
            return self.settle_failed(run_id, "No modules found").await;
        }

        self.store
            .update_run(
                run_id,
                &RunPatch::new()
                    .course_id(course.id)
                    .status(RunStatus::Running)
                    .progress(5)
                    .message("Generating module content (Markdown)")
                    .started(),
            )
            .await?;

        let total = modules.len();
        let mut written = 0usize;
        let mut skipped = 0usize;

        for module in &modules {
            if module.has_content() && !job.overwrite {
                skipped += 1;
                continue;
            }

            let done = written + skipped;
            self.store
                .update_run(
                    run_id,
                    &RunPatch::new().progress(module_progress(done, total)).message(
                        format!("Writing week {}/{total}: {}", module.week, module.title),
                    ),
                )
                .await?;

            let markdown = write_module(
                self.llm.as_ref(),
                &roadmap.field,
                &roadmap.level,
                module.week,
                &module.title,
                &module.outcomes,
            )
            .await?;
            self.store.set_module_content(module.id, &markdown).await?;
            written += 1;
        }

        self.store
            .set_course_status(course.id, CourseStatus::Ready)
            .await?;
        self.store
            .update_run(
                run_id,
                &RunPatch::new()
                    .status(RunStatus::Succeeded)
                    .progress(100)
                    .message(format!(
                        "Course content ready (written={written}, skipped={skipped}, overwrite={})",
                        job.overwrite
                    ))
                    .finished(),
            )
            .await?;

        info!(%run_id, written, skipped, "module content generated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry_bounds() {
        assert!(should_retry(0));
        assert!(should_retry(1));
        assert!(should_retry(2));
        assert!(!should_retry(3));
        assert!(!should_retry(10));
    }

    #[test]
    fn test_module_progress_spread() {
        // 4 modules: 5, 27, 50, 72; never reaches 100 before the final patch
        assert_eq!(module_progress(0, 4), 5);
        assert_eq!(module_progress(1, 4), 27);
        assert_eq!(module_progress(2, 4), 50);
        assert_eq!(module_progress(3, 4), 72);
        assert!(module_progress(3, 4) < 100);
    }

    #[test]
    fn test_module_progress_degenerate_total() {
        assert_eq!(module_progress(0, 0), 5);
        assert_eq!(module_progress(0, 1), 5);
    }
}
