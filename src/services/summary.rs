use chrono::Utc;
use sqlx::PgPool;

use crate::db::{competitor_queries, queries};
use crate::error::{QueueError, QueueResult};
use crate::models::summary::JobSummary;

/// Build the flattened status summary polled by clients.
///
/// Two indexed point reads (job by session key, competitors by job id),
/// everything else computed in memory. Read-only; safe to call every few
/// seconds per open session.
pub async fn job_summary(pool: &PgPool, session_id: &str) -> QueueResult<JobSummary> {
    let job = queries::get_job_by_session(pool, session_id)
        .await?
        .ok_or_else(|| QueueError::NotFound(format!("analysis for session '{session_id}'")))?;

    let competitors = competitor_queries::list_for_job(pool, job.id).await?;

    Ok(JobSummary::build(job, competitors, Utc::now()))
}
