use chrono::{Duration, Utc};
use garde::Validate;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{competitor_queries, queries};
use crate::error::{QueueError, QueueResult};
use crate::models::job::AnalysisJob;
use crate::models::requests::SubmitAnalysisRequest;
use crate::services::worker::AnalysisWorker;

/// Owner of the job state machine: accepts submissions, signals
/// readiness, drains pending work, and applies user edits. All state
/// lives in the job store; this struct is just the store handle plus the
/// transition rules.
pub struct QueueManager {
    db: PgPool,
}

/// How a cancellation request landed.
#[derive(Debug)]
pub enum CancelOutcome {
    /// The job was still pending; no worker owned it, cancelled outright.
    Cancelled,
    /// A worker owns the job; the flag is set and the worker will stop at
    /// its next step boundary.
    CancellationRequested,
}

impl QueueManager {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Accept a new analysis submission.
    ///
    /// Validates first (nothing is written on validation failure), then
    /// inserts the job and its competitor rows in one transaction.
    pub async fn submit(&self, request: SubmitAnalysisRequest) -> QueueResult<AnalysisJob> {
        request
            .validate()
            .map_err(|e| QueueError::Validation(e.to_string()))?;

        // Normalize the competitor list: trimmed, de-duplicated, order
        // preserved. A repeated username is a client slip, not a reason
        // to reject the whole submission.
        let mut seen = std::collections::HashSet::new();
        let competitors: Vec<String> = request
            .selected_competitors
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty() && seen.insert(u.clone()))
            .collect();

        let job = queries::create_job_with_competitors(
            &self.db,
            request.session_id.trim(),
            request.primary_username.trim(),
            &request.form_data,
            &competitors,
        )
        .await
        .map_err(map_submit_error)?;

        metrics::counter!("viral_analysis_jobs_total").increment(1);
        tracing::info!(
            job_id = %job.id,
            session_id = %job.session_id,
            primary_username = %job.primary_username,
            competitors = competitors.len(),
            "Analysis job queued"
        );

        Ok(job)
    }

    /// Readiness signal: verify the job exists and echo its state.
    ///
    /// Deliberately does not flip status; pending→processing belongs to
    /// the worker's claim, so a crashed worker can never leave a job
    /// falsely marked processing by this path.
    pub async fn start_job(&self, job_id: Uuid) -> QueueResult<AnalysisJob> {
        queries::get_job(&self.db, job_id)
            .await?
            .ok_or_else(|| QueueError::NotFound(format!("job {job_id}")))
    }

    /// Hand every pending job to the worker asynchronously and return
    /// immediately. Each handoff goes through the claim, so concurrent
    /// drains (or the worker's own poll loop) cannot double-process.
    pub async fn drain_pending(&self, worker: &Arc<AnalysisWorker>) -> QueueResult<usize> {
        let pending = queries::list_pending_ids(&self.db).await?;
        let count = pending.len();

        for job_id in pending {
            let worker = Arc::clone(worker);
            tokio::spawn(worker.process_job(job_id));
        }

        tracing::info!(pending_jobs = count, "Queue drain started");
        Ok(count)
    }

    /// Cancel a job in {pending, processing}. Cooperative for processing
    /// jobs: the worker observes the flag at its next step boundary.
    pub async fn cancel_job(&self, job_id: Uuid) -> QueueResult<CancelOutcome> {
        if queries::cancel_if_pending(&self.db, job_id, "Analysis cancelled by user").await? {
            tracing::info!(job_id = %job_id, "Pending job cancelled");
            return Ok(CancelOutcome::Cancelled);
        }
        if queries::request_cancel(&self.db, job_id).await? {
            tracing::info!(job_id = %job_id, "Cancellation requested");
            return Ok(CancelOutcome::CancellationRequested);
        }

        match queries::get_job(&self.db, job_id).await? {
            None => Err(QueueError::NotFound(format!("job {job_id}"))),
            Some(job) => Err(QueueError::Conflict(format!(
                "job is {} and can no longer be cancelled",
                job.status
            ))),
        }
    }

    /// Park a processing job at its next step boundary.
    pub async fn pause_job(&self, job_id: Uuid) -> QueueResult<()> {
        if queries::pause_job(&self.db, job_id).await? {
            tracing::info!(job_id = %job_id, "Job paused");
            return Ok(());
        }
        match queries::get_job(&self.db, job_id).await? {
            None => Err(QueueError::NotFound(format!("job {job_id}"))),
            Some(job) => Err(QueueError::Conflict(format!(
                "only processing jobs can be paused, job is {}",
                job.status
            ))),
        }
    }

    /// Release a paused job back to pending for re-claim.
    pub async fn resume_job(&self, job_id: Uuid) -> QueueResult<()> {
        if queries::resume_job(&self.db, job_id).await? {
            tracing::info!(job_id = %job_id, "Job resumed");
            return Ok(());
        }
        match queries::get_job(&self.db, job_id).await? {
            None => Err(QueueError::NotFound(format!("job {job_id}"))),
            Some(job) => Err(QueueError::Conflict(format!(
                "only paused jobs can be resumed, job is {}",
                job.status
            ))),
        }
    }

    /// User edit: include or exclude a competitor from the analysis
    /// scope without deleting its history.
    pub async fn set_competitor_active(
        &self,
        job_id: Uuid,
        username: &str,
        is_active: bool,
    ) -> QueueResult<()> {
        if competitor_queries::set_active(&self.db, job_id, username, is_active).await? {
            tracing::info!(job_id = %job_id, competitor = %username, is_active, "Competitor toggled");
            Ok(())
        } else {
            Err(QueueError::NotFound(format!(
                "competitor '{username}' on job {job_id}"
            )))
        }
    }

    /// Update the auto-rerun policy. Enabling schedules the next run one
    /// full interval out; disabling clears any pending schedule.
    pub async fn update_schedule(
        &self,
        job_id: Uuid,
        enabled: bool,
        frequency_hours: i32,
    ) -> QueueResult<()> {
        let next_run = enabled.then(|| Utc::now() + Duration::hours(i64::from(frequency_hours)));
        if queries::update_rerun_policy(&self.db, job_id, enabled, frequency_hours, next_run)
            .await?
        {
            tracing::info!(job_id = %job_id, enabled, frequency_hours, "Rerun schedule updated");
            Ok(())
        } else {
            Err(QueueError::NotFound(format!("job {job_id}")))
        }
    }
}

fn map_submit_error(e: sqlx::Error) -> QueueError {
    if let sqlx::Error::Database(db_err) = &e {
        // Competitors are de-duplicated before insert, so a unique
        // violation can only be the session key.
        if db_err.is_unique_violation() {
            return QueueError::Conflict(
                "an analysis is already queued for this session".to_string(),
            );
        }
    }
    QueueError::Persistence(e)
}
