use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::job::{AnalysisFormData, AnalysisJob, JobStatus};

/// Column list shared by every job SELECT/RETURNING clause.
const JOB_COLUMNS: &str = "id, session_id, primary_username, form_data, status, priority, \
     progress_percentage, current_step, error_message, cancel_requested, \
     auto_rerun_enabled, rerun_frequency_hours, total_runs, result, \
     submitted_at, started_processing_at, completed_at, last_analysis_at, \
     next_scheduled_run, updated_at";

fn job_from_row(row: &PgRow) -> Result<AnalysisJob, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<JobStatus>()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: Box::new(e),
        })?;
    let form_data: Json<AnalysisFormData> = row.try_get("form_data")?;

    Ok(AnalysisJob {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        primary_username: row.try_get("primary_username")?,
        form_data: form_data.0,
        status,
        priority: row.try_get("priority")?,
        progress_percentage: row.try_get("progress_percentage")?,
        current_step: row.try_get("current_step")?,
        error_message: row.try_get("error_message")?,
        cancel_requested: row.try_get("cancel_requested")?,
        auto_rerun_enabled: row.try_get("auto_rerun_enabled")?,
        rerun_frequency_hours: row.try_get("rerun_frequency_hours")?,
        total_runs: row.try_get("total_runs")?,
        result: row.try_get("result")?,
        submitted_at: row.try_get("submitted_at")?,
        started_processing_at: row.try_get("started_processing_at")?,
        completed_at: row.try_get("completed_at")?,
        last_analysis_at: row.try_get("last_analysis_at")?,
        next_scheduled_run: row.try_get("next_scheduled_run")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a job together with its competitor rows in one transaction.
///
/// All-or-nothing: a failed competitor insert (duplicate username, FK
/// trouble) rolls the job back, so a concurrent reader never sees a
/// partially created submission.
pub async fn create_job_with_competitors(
    pool: &PgPool,
    session_id: &str,
    primary_username: &str,
    form_data: &AnalysisFormData,
    competitors: &[String],
) -> Result<AnalysisJob, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        "INSERT INTO viral_ideas_jobs (session_id, primary_username, form_data) \
         VALUES ($1, $2, $3) \
         RETURNING {JOB_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(session_id)
        .bind(primary_username)
        .bind(Json(form_data))
        .fetch_one(&mut *tx)
        .await?;
    let job = job_from_row(&row)?;

    for username in competitors {
        sqlx::query(
            "INSERT INTO viral_ideas_competitors (job_id, competitor_username) \
             VALUES ($1, $2)",
        )
        .bind(job.id)
        .bind(username)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(job)
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<AnalysisJob>, sqlx::Error> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM viral_ideas_jobs WHERE id = $1");
    let row = sqlx::query(&sql).bind(job_id).fetch_optional(pool).await?;
    row.map(|r| job_from_row(&r)).transpose()
}

/// Get a job by the client's session correlation key
pub async fn get_job_by_session(
    pool: &PgPool,
    session_id: &str,
) -> Result<Option<AnalysisJob>, sqlx::Error> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM viral_ideas_jobs WHERE session_id = $1");
    let row = sqlx::query(&sql)
        .bind(session_id)
        .fetch_optional(pool)
        .await?;
    row.map(|r| job_from_row(&r)).transpose()
}

/// List pending job ids, highest priority first, oldest first within a
/// priority. This is the drain ordering.
pub async fn list_pending_ids(pool: &PgPool) -> Result<Vec<Uuid>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id FROM viral_ideas_jobs \
         WHERE status = 'pending' \
         ORDER BY priority ASC, submitted_at ASC",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(|r| r.try_get("id")).collect()
}

/// Claim a specific pending job.
///
/// Compare-and-set on status: exactly one caller gets the row back; a
/// concurrent claimant sees None and moves on. Each claim stamps a fresh
/// `started_processing_at` so rerun pickups restart the clock.
pub async fn claim_job(pool: &PgPool, job_id: Uuid) -> Result<Option<AnalysisJob>, sqlx::Error> {
    let sql = format!(
        "UPDATE viral_ideas_jobs \
         SET status = 'processing', started_processing_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND status = 'pending' \
         RETURNING {JOB_COLUMNS}"
    );
    let row = sqlx::query(&sql).bind(job_id).fetch_optional(pool).await?;
    row.map(|r| job_from_row(&r)).transpose()
}

/// Claim whichever pending job is next in drain order, if any.
///
/// SKIP LOCKED keeps parallel workers from queueing up behind one
/// another on the same head-of-line row.
pub async fn claim_next_pending(pool: &PgPool) -> Result<Option<AnalysisJob>, sqlx::Error> {
    let sql = format!(
        "UPDATE viral_ideas_jobs \
         SET status = 'processing', started_processing_at = NOW(), updated_at = NOW() \
         WHERE id = ( \
             SELECT id FROM viral_ideas_jobs \
             WHERE status = 'pending' \
             ORDER BY priority ASC, submitted_at ASC \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED \
         ) \
         RETURNING {JOB_COLUMNS}"
    );
    let row = sqlx::query(&sql).fetch_optional(pool).await?;
    row.map(|r| job_from_row(&r)).transpose()
}

/// Record worker progress. Monotonic: a report below the stored
/// percentage, or against a job no longer processing, affects zero rows.
pub async fn report_progress(
    pool: &PgPool,
    job_id: Uuid,
    percentage: i32,
    current_step: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE viral_ideas_jobs \
         SET progress_percentage = $2, current_step = $3, updated_at = NOW() \
         WHERE id = $1 AND status = 'processing' AND progress_percentage <= $2",
    )
    .bind(job_id)
    .bind(percentage)
    .bind(current_step)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Terminal success: pin progress to 100, stamp completion timestamps,
/// store the assembled result, and schedule the next run when auto-rerun
/// is on.
pub async fn complete_job(
    pool: &PgPool,
    job_id: Uuid,
    result: &serde_json::Value,
) -> Result<bool, sqlx::Error> {
    let outcome = sqlx::query(
        "UPDATE viral_ideas_jobs \
         SET status = 'completed', \
             progress_percentage = 100, \
             current_step = NULL, \
             error_message = NULL, \
             result = $2, \
             completed_at = NOW(), \
             last_analysis_at = NOW(), \
             next_scheduled_run = CASE \
                 WHEN auto_rerun_enabled \
                 THEN NOW() + make_interval(hours => rerun_frequency_hours) \
                 ELSE NULL \
             END, \
             updated_at = NOW() \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(job_id)
    .bind(result)
    .execute(pool)
    .await?;
    Ok(outcome.rows_affected() == 1)
}

/// Terminal failure. Accepted from pending (cancel before pickup),
/// processing, or paused.
pub async fn fail_job(pool: &PgPool, job_id: Uuid, error: &str) -> Result<bool, sqlx::Error> {
    let outcome = sqlx::query(
        "UPDATE viral_ideas_jobs \
         SET status = 'failed', \
             error_message = $2, \
             current_step = NULL, \
             completed_at = NOW(), \
             updated_at = NOW() \
         WHERE id = $1 AND status IN ('pending', 'processing', 'paused')",
    )
    .bind(job_id)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(outcome.rows_affected() == 1)
}

/// Cancel a job that has not been picked up yet. No worker owns it, so
/// it can go straight to failed.
pub async fn cancel_if_pending(
    pool: &PgPool,
    job_id: Uuid,
    error: &str,
) -> Result<bool, sqlx::Error> {
    let outcome = sqlx::query(
        "UPDATE viral_ideas_jobs \
         SET status = 'failed', \
             error_message = $2, \
             completed_at = NOW(), \
             updated_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(job_id)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(outcome.rows_affected() == 1)
}

/// Raise the cooperative cancellation flag on a cancellable job.
pub async fn request_cancel(pool: &PgPool, job_id: Uuid) -> Result<bool, sqlx::Error> {
    let outcome = sqlx::query(
        "UPDATE viral_ideas_jobs \
         SET cancel_requested = TRUE, updated_at = NOW() \
         WHERE id = $1 AND status IN ('pending', 'processing')",
    )
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(outcome.rows_affected() == 1)
}

/// Lightweight step-boundary check for the worker: current status plus
/// the cancellation flag.
pub async fn get_run_flags(
    pool: &PgPool,
    job_id: Uuid,
) -> Result<Option<(JobStatus, bool)>, sqlx::Error> {
    let row = sqlx::query("SELECT status, cancel_requested FROM viral_ideas_jobs WHERE id = $1")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;
    row.map(|r| {
        let status: String = r.try_get("status")?;
        let status = status
            .parse::<JobStatus>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "status".to_string(),
                source: Box::new(e),
            })?;
        Ok((status, r.try_get("cancel_requested")?))
    })
    .transpose()
}

/// Park a processing job. The worker honors this at its next step
/// boundary and stops without a terminal write.
pub async fn pause_job(pool: &PgPool, job_id: Uuid) -> Result<bool, sqlx::Error> {
    let outcome = sqlx::query(
        "UPDATE viral_ideas_jobs \
         SET status = 'paused', updated_at = NOW() \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(outcome.rows_affected() == 1)
}

/// Release a paused job back to pending for re-claim.
pub async fn resume_job(pool: &PgPool, job_id: Uuid) -> Result<bool, sqlx::Error> {
    let outcome = sqlx::query(
        "UPDATE viral_ideas_jobs \
         SET status = 'pending', current_step = NULL, updated_at = NOW() \
         WHERE id = $1 AND status = 'paused'",
    )
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(outcome.rows_affected() == 1)
}

/// List jobs whose scheduled rerun has come due.
pub async fn list_rerun_due(pool: &PgPool) -> Result<Vec<Uuid>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id FROM viral_ideas_jobs \
         WHERE auto_rerun_enabled \
           AND status IN ('completed', 'failed') \
           AND next_scheduled_run IS NOT NULL \
           AND next_scheduled_run <= NOW() \
         ORDER BY next_scheduled_run ASC",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(|r| r.try_get("id")).collect()
}

/// Release a due terminal job back to pending for another run.
///
/// Same conditional-update shape as the claim, so the drain path and the
/// scheduler can never double-release. Bumps `total_runs` and resets the
/// per-run fields; `started_processing_at` is restamped on the next
/// claim.
pub async fn release_rerun(pool: &PgPool, job_id: Uuid) -> Result<bool, sqlx::Error> {
    let outcome = sqlx::query(
        "UPDATE viral_ideas_jobs \
         SET status = 'pending', \
             progress_percentage = 0, \
             current_step = NULL, \
             error_message = NULL, \
             cancel_requested = FALSE, \
             completed_at = NULL, \
             total_runs = total_runs + 1, \
             next_scheduled_run = NULL, \
             updated_at = NOW() \
         WHERE id = $1 \
           AND status IN ('completed', 'failed') \
           AND auto_rerun_enabled \
           AND next_scheduled_run IS NOT NULL \
           AND next_scheduled_run <= NOW()",
    )
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(outcome.rows_affected() == 1)
}

/// Count jobs currently in the given status
pub async fn count_by_status(pool: &PgPool, status: JobStatus) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM viral_ideas_jobs WHERE status = $1")
        .bind(status.to_string())
        .fetch_one(pool)
        .await
}

/// The most recently submitted jobs (for the system status view)
pub async fn recent_jobs(pool: &PgPool, limit: i64) -> Result<Vec<AnalysisJob>, sqlx::Error> {
    let sql = format!(
        "SELECT {JOB_COLUMNS} FROM viral_ideas_jobs \
         ORDER BY submitted_at DESC \
         LIMIT $1"
    );
    let rows = sqlx::query(&sql).bind(limit).fetch_all(pool).await?;
    rows.iter().map(job_from_row).collect()
}

/// Update scheduling policy for a job (auto-rerun toggle and cadence).
pub async fn update_rerun_policy(
    pool: &PgPool,
    job_id: Uuid,
    enabled: bool,
    frequency_hours: i32,
    next_scheduled_run: Option<DateTime<Utc>>,
) -> Result<bool, sqlx::Error> {
    let outcome = sqlx::query(
        "UPDATE viral_ideas_jobs \
         SET auto_rerun_enabled = $2, \
             rerun_frequency_hours = $3, \
             next_scheduled_run = $4, \
             updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(job_id)
    .bind(enabled)
    .bind(frequency_hours)
    .bind(next_scheduled_run)
    .execute(pool)
    .await?;
    Ok(outcome.rows_affected() == 1)
}
