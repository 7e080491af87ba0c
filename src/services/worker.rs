use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use uuid::Uuid;

use crate::db::{competitor_queries, queries};
use crate::error::QueueError;
use crate::models::competitor::{CompetitorStatus, JobCompetitor};
use crate::models::job::{AnalysisJob, JobStatus};
use crate::services::engine::{AnalysisEngineClient, EngineError, ExtractedHook};

const POLL_INTERVAL_MS: u64 = 1000; // 1 second
const CANCEL_MESSAGE: &str = "Analysis cancelled by user";

/// Outcome of a step-boundary check.
enum StepGate {
    Continue,
    Cancelled,
    /// Paused externally, or the row is gone. Stop without a terminal write.
    Parked,
}

/// What the pipeline produced for a claimed job.
enum PipelineOutcome {
    Completed(serde_json::Value),
    Cancelled,
    Parked,
}

#[derive(Debug, thiserror::Error)]
enum PipelineError {
    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// The analysis worker: claims pending jobs and walks them through the
/// viral-ideas pipeline, reporting progress back into the job store.
///
/// Concurrency is bounded by a semaphore; a permit is held from before
/// the claim until the job reaches a terminal state, so at most
/// `concurrency` jobs are in flight regardless of which path (poll loop
/// or batch drain) handed them over.
pub struct AnalysisWorker {
    db: PgPool,
    engine: AnalysisEngineClient,
    permits: Arc<Semaphore>,
}

impl AnalysisWorker {
    pub fn new(db: PgPool, engine: AnalysisEngineClient, concurrency: usize) -> Self {
        Self {
            db,
            engine,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Main polling loop: claim the next pending job, process it in a
    /// spawned task, sleep when the queue is empty.
    pub async fn run(self: Arc<Self>) {
        tracing::info!("Worker ready, starting job processing loop");
        loop {
            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return, // semaphore closed, shutting down
            };

            match queries::claim_next_pending(&self.db).await {
                Ok(Some(job)) => {
                    let worker = Arc::clone(&self);
                    tokio::spawn(async move {
                        worker.process_claimed(job).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tracing::trace!("No jobs available, sleeping");
                    sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                }
                Err(e) => {
                    drop(permit);
                    tracing::error!(error = %e, "Failed to claim next job, will retry");
                    sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                }
            }
        }
    }

    /// Drain path: try to claim one specific job and process it.
    ///
    /// A lost claim race is normal here (another drain call, the poll
    /// loop, or a second worker got there first) and is skipped quietly.
    pub async fn process_job(self: Arc<Self>, job_id: Uuid) {
        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        match queries::claim_job(&self.db, job_id).await {
            Ok(Some(job)) => self.process_claimed(job).await,
            Ok(None) => {
                tracing::debug!(job_id = %job_id, "Job already claimed or no longer pending, skipping");
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to claim job");
            }
        }
        drop(permit);
    }

    /// Release terminal jobs whose scheduled rerun has come due. Uses the
    /// same conditional-update primitive as the claim path, so racing the
    /// drain loop or a second scheduler never double-releases.
    pub async fn release_due_reruns(&self) -> Result<usize, sqlx::Error> {
        let due = queries::list_rerun_due(&self.db).await?;
        let mut released = 0;
        for job_id in due {
            if queries::release_rerun(&self.db, job_id).await? {
                released += 1;
                tracing::info!(job_id = %job_id, "Released job for scheduled rerun");
            }
        }
        Ok(released)
    }

    /// Run the pipeline for a job this worker has already claimed and
    /// persist the terminal outcome.
    async fn process_claimed(&self, job: AnalysisJob) {
        let job_id = job.id;
        let started = std::time::Instant::now();

        tracing::info!(
            job_id = %job_id,
            session_id = %job.session_id,
            primary_username = %job.primary_username,
            "Processing analysis job"
        );

        match self.run_pipeline(&job).await {
            Ok(PipelineOutcome::Completed(result)) => {
                match queries::complete_job(&self.db, job_id, &result).await {
                    Ok(true) => {
                        metrics::counter!("viral_analysis_jobs_completed").increment(1);
                        metrics::histogram!("viral_analysis_processing_seconds")
                            .record(started.elapsed().as_secs_f64());
                        tracing::info!(
                            job_id = %job_id,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Job completed successfully"
                        );
                    }
                    Ok(false) => {
                        tracing::warn!(job_id = %job_id, "Completion rejected, job left processing state");
                    }
                    Err(e) => {
                        tracing::error!(job_id = %job_id, error = %e, "Failed to persist completion");
                    }
                }
            }
            Ok(PipelineOutcome::Cancelled) => {
                self.fail_quietly(job_id, CANCEL_MESSAGE).await;
                tracing::info!(job_id = %job_id, "Job cancelled at step boundary");
            }
            Ok(PipelineOutcome::Parked) => {
                tracing::info!(job_id = %job_id, "Job parked, leaving current state untouched");
            }
            Err(PipelineError::Engine(e)) => {
                self.fail_quietly(job_id, &format!("Analysis failed: {e}")).await;
                metrics::counter!("viral_analysis_jobs_failed").increment(1);
                tracing::error!(job_id = %job_id, error = %e, "Job processing failed");
            }
            Err(PipelineError::Db(e)) => {
                // The store write already failed once; the job stays at its
                // last committed state and the overdue flag surfaces it.
                self.fail_quietly(job_id, "Internal storage error during analysis").await;
                tracing::error!(job_id = %job_id, error = %e, "Storage error during job processing");
            }
        }
    }

    async fn fail_quietly(&self, job_id: Uuid, message: &str) {
        if let Err(e) = queries::fail_job(&self.db, job_id, message).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to persist failure state");
        }
    }

    async fn run_pipeline(&self, job: &AnalysisJob) -> Result<PipelineOutcome, PipelineError> {
        match self.step_gate(job.id).await? {
            StepGate::Continue => {}
            StepGate::Cancelled => return Ok(PipelineOutcome::Cancelled),
            StepGate::Parked => return Ok(PipelineOutcome::Parked),
        }

        self.report(job.id, 5, "Fetching profile data").await?;
        let primary = self.engine.profile_snapshot(&job.primary_username).await?;

        match self.step_gate(job.id).await? {
            StepGate::Continue => {}
            StepGate::Cancelled => return Ok(PipelineOutcome::Cancelled),
            StepGate::Parked => return Ok(PipelineOutcome::Parked),
        }

        self.report(job.id, 25, "Extracting hooks").await?;
        let mut hooks = self.engine.extract_hooks(&primary).await?;

        match self.step_gate(job.id).await? {
            StepGate::Continue => {}
            StepGate::Cancelled => return Ok(PipelineOutcome::Cancelled),
            StepGate::Parked => return Ok(PipelineOutcome::Parked),
        }

        self.report(job.id, 50, "Analyzing competitors").await?;
        let competitors = competitor_queries::list_active_for_job(&self.db, job.id).await?;
        let total = competitors.len();
        let mut analyzed = 0usize;
        let mut failed = 0usize;

        for (idx, competitor) in competitors.iter().enumerate() {
            // Competitors are step boundaries too: cancellation and pause
            // take effect between profiles, not mid-profile.
            match self.step_gate(job.id).await? {
                StepGate::Continue => {}
                StepGate::Cancelled => return Ok(PipelineOutcome::Cancelled),
                StepGate::Parked => return Ok(PipelineOutcome::Parked),
            }

            match self.analyze_competitor(competitor, &mut hooks).await {
                Ok(()) => analyzed += 1,
                Err(e) => {
                    // One bad competitor profile does not sink the job.
                    failed += 1;
                    tracing::warn!(
                        job_id = %job.id,
                        competitor = %competitor.competitor_username,
                        error = %e,
                        "Competitor analysis failed"
                    );
                }
            }

            let percentage = 50 + ((idx + 1) * 25 / total.max(1)) as i32;
            let step = format!("Analyzing competitors ({}/{})", idx + 1, total);
            self.report(job.id, percentage, &step).await?;
        }

        match self.step_gate(job.id).await? {
            StepGate::Continue => {}
            StepGate::Cancelled => return Ok(PipelineOutcome::Cancelled),
            StepGate::Parked => return Ok(PipelineOutcome::Parked),
        }

        self.report(job.id, 80, "Generating scripts").await?;
        let scripts = self.engine.generate_scripts(&hooks, &job.form_data).await?;

        self.report(job.id, 95, "Finalizing results").await?;
        let result = serde_json::json!({
            "primary_username": job.primary_username,
            "reels_analyzed": primary.reels_analyzed,
            "hooks": hooks,
            "scripts": scripts,
            "competitors_analyzed": analyzed,
            "competitors_failed": failed,
        });

        Ok(PipelineOutcome::Completed(result))
    }

    /// Snapshot one competitor and fold its hooks into the running set,
    /// recording the per-row sub-status either way.
    async fn analyze_competitor(
        &self,
        competitor: &JobCompetitor,
        hooks: &mut Vec<ExtractedHook>,
    ) -> Result<(), PipelineError> {
        competitor_queries::mark_processing(&self.db, competitor.id).await?;

        let outcome = async {
            let snapshot = self
                .engine
                .profile_snapshot(&competitor.competitor_username)
                .await?;
            self.engine.extract_hooks(&snapshot).await
        }
        .await;

        match outcome {
            Ok(competitor_hooks) => {
                hooks.extend(competitor_hooks);
                competitor_queries::mark_outcome(
                    &self.db,
                    competitor.id,
                    CompetitorStatus::Completed,
                    None,
                )
                .await?;
                Ok(())
            }
            Err(e) => {
                competitor_queries::mark_outcome(
                    &self.db,
                    competitor.id,
                    CompetitorStatus::Failed,
                    Some(&e.to_string()),
                )
                .await?;
                Err(PipelineError::Engine(e))
            }
        }
    }

    /// Progress reports are monotonic writes; a rejected report (stale
    /// percentage, job no longer processing) is logged and dropped rather
    /// than crashing the reporting path.
    async fn report(&self, job_id: Uuid, percentage: i32, step: &str) -> Result<(), sqlx::Error> {
        let percentage = percentage.clamp(0, 99);
        let accepted = queries::report_progress(&self.db, job_id, percentage, step).await?;
        if accepted {
            tracing::debug!(job_id = %job_id, percentage, step, "Progress updated");
        } else {
            let rejection = QueueError::WorkerReport(format!(
                "progress {percentage}% not accepted, job is gone, terminal, or further along"
            ));
            tracing::warn!(job_id = %job_id, step, error = %rejection, "Dropping worker report");
        }
        Ok(())
    }

    async fn step_gate(&self, job_id: Uuid) -> Result<StepGate, sqlx::Error> {
        match queries::get_run_flags(&self.db, job_id).await? {
            Some((_, true)) => Ok(StepGate::Cancelled),
            Some((JobStatus::Processing, false)) => Ok(StepGate::Continue),
            Some((_, false)) => Ok(StepGate::Parked),
            None => Ok(StepGate::Parked),
        }
    }
}
