//! Durable job queue on `PostgreSQL`
//!
//! Queue lifecycle:
//! - Producer inserts a `pending` row ([`JobQueue::enqueue`]).
//! - A worker atomically flips the oldest `pending` row to `running`
//!   ([`JobQueue::claim`], `FOR UPDATE SKIP LOCKED`), so two workers can
//!   never claim the same job and a crash leaves the row in `running`
//!   instead of losing it.
//! - [`JobQueue::ack`] settles the job, [`JobQueue::retry`] returns it to
//!   `pending` with the attempt counter bumped, [`JobQueue::bury`] parks it
//!   once retries are exhausted.

use tokio_postgres::Row;
use uuid::Uuid;

use coursecraft_common::{JobKind, JobRecord};

use crate::{PostgresStore, StorageError, StorageResult};

/// Durable queue operations
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    /// Insert a pending job and return it
    async fn enqueue(
        &self,
        kind: JobKind,
        run_id: Uuid,
        course_id: Option<Uuid>,
        overwrite: bool,
    ) -> StorageResult<JobRecord>;

    /// Claim the oldest pending job, if any
    async fn claim(&self) -> StorageResult<Option<JobRecord>>;

    /// Settle a handled job
    async fn ack(&self, id: Uuid) -> StorageResult<()>;

    /// Return a job to the queue; yields the new attempt count
    async fn retry(&self, id: Uuid) -> StorageResult<i32>;

    /// Park a job whose retries are exhausted
    async fn bury(&self, id: Uuid) -> StorageResult<()>;
}

#[async_trait::async_trait]
impl JobQueue for PostgresStore {
    async fn enqueue(
        &self,
        kind: JobKind,
        run_id: Uuid,
        course_id: Option<Uuid>,
        overwrite: bool,
    ) -> StorageResult<JobRecord> {
        let row = self
            .client
            .query_one(
                r"
                INSERT INTO jobs (id, kind, run_id, course_id, overwrite)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, kind, run_id, course_id, overwrite, attempts, state,
                          created_at, updated_at
                ",
                &[
                    &Uuid::new_v4(),
                    &kind.as_str(),
                    &run_id,
                    &course_id,
                    &overwrite,
                ],
            )
            .await?;
        job_from_row(&row)
    }

    async fn claim(&self) -> StorageResult<Option<JobRecord>> {
        let row = self
            .client
            .query_opt(
                r"
                UPDATE jobs SET state = 'running', updated_at = now()
                WHERE id = (
                    SELECT id FROM jobs
                    WHERE state = 'pending'
                    ORDER BY created_at
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING id, kind, run_id, course_id, overwrite, attempts, state,
                          created_at, updated_at
                ",
                &[],
            )
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn ack(&self, id: Uuid) -> StorageResult<()> {
        self.client
            .execute(
                "UPDATE jobs SET state = 'done', updated_at = now() WHERE id = $1",
                &[&id],
            )
            .await?;
        Ok(())
    }

    async fn retry(&self, id: Uuid) -> StorageResult<i32> {
        let row = self
            .client
            .query_one(
                r"
                UPDATE jobs SET state = 'pending', attempts = attempts + 1, updated_at = now()
                WHERE id = $1
                RETURNING attempts
                ",
                &[&id],
            )
            .await?;
        Ok(row.get("attempts"))
    }

    async fn bury(&self, id: Uuid) -> StorageResult<()> {
        self.client
            .execute(
                "UPDATE jobs SET state = 'dead', updated_at = now() WHERE id = $1",
                &[&id],
            )
            .await?;
        Ok(())
    }
}

fn job_from_row(row: &Row) -> StorageResult<JobRecord> {
    let kind: String = row.get("kind");
    let state: String = row.get("state");
    Ok(JobRecord {
        id: row.get("id"),
        kind: kind.parse().map_err(StorageError::Serialization)?,
        run_id: row.get("run_id"),
        course_id: row.get("course_id"),
        overwrite: row.get("overwrite"),
        attempts: row.get("attempts"),
        state: state.parse().map_err(StorageError::Serialization)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
