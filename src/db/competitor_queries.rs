use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::competitor::{CompetitorStatus, JobCompetitor, SelectionMethod};

const COMPETITOR_COLUMNS: &str = "id, job_id, competitor_username, selection_method, is_active, \
     processing_status, error_message, added_at, processed_at";

fn competitor_from_row(row: &PgRow) -> Result<JobCompetitor, sqlx::Error> {
    let selection_method: String = row.try_get("selection_method")?;
    let selection_method =
        selection_method
            .parse::<SelectionMethod>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "selection_method".to_string(),
                source: Box::new(e),
            })?;
    let processing_status: String = row.try_get("processing_status")?;
    let processing_status =
        processing_status
            .parse::<CompetitorStatus>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "processing_status".to_string(),
                source: Box::new(e),
            })?;

    Ok(JobCompetitor {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        competitor_username: row.try_get("competitor_username")?,
        selection_method,
        is_active: row.try_get("is_active")?,
        processing_status,
        error_message: row.try_get("error_message")?,
        added_at: row.try_get("added_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

/// All competitor rows for a job, active and inactive.
pub async fn list_for_job(
    pool: &PgPool,
    job_id: Uuid,
) -> Result<Vec<JobCompetitor>, sqlx::Error> {
    let sql = format!(
        "SELECT {COMPETITOR_COLUMNS} FROM viral_ideas_competitors \
         WHERE job_id = $1 \
         ORDER BY added_at ASC"
    );
    let rows = sqlx::query(&sql).bind(job_id).fetch_all(pool).await?;
    rows.iter().map(competitor_from_row).collect()
}

/// Only the rows in the worker's analysis scope.
pub async fn list_active_for_job(
    pool: &PgPool,
    job_id: Uuid,
) -> Result<Vec<JobCompetitor>, sqlx::Error> {
    let sql = format!(
        "SELECT {COMPETITOR_COLUMNS} FROM viral_ideas_competitors \
         WHERE job_id = $1 AND is_active \
         ORDER BY added_at ASC"
    );
    let rows = sqlx::query(&sql).bind(job_id).fetch_all(pool).await?;
    rows.iter().map(competitor_from_row).collect()
}

/// Mark a competitor as being analyzed.
pub async fn mark_processing(pool: &PgPool, competitor_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE viral_ideas_competitors \
         SET processing_status = 'processing', error_message = NULL \
         WHERE id = $1",
    )
    .bind(competitor_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record a competitor's terminal outcome for this run.
pub async fn mark_outcome(
    pool: &PgPool,
    competitor_id: Uuid,
    status: CompetitorStatus,
    error: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE viral_ideas_competitors \
         SET processing_status = $2, error_message = $3, processed_at = NOW() \
         WHERE id = $1",
    )
    .bind(competitor_id)
    .bind(status.to_string())
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

/// User edit: include or exclude a competitor without losing its history.
pub async fn set_active(
    pool: &PgPool,
    job_id: Uuid,
    username: &str,
    is_active: bool,
) -> Result<bool, sqlx::Error> {
    let outcome = sqlx::query(
        "UPDATE viral_ideas_competitors \
         SET is_active = $3 \
         WHERE job_id = $1 AND competitor_username = $2",
    )
    .bind(job_id)
    .bind(username)
    .bind(is_active)
    .execute(pool)
    .await?;
    Ok(outcome.rows_affected() == 1)
}

/// Active-competitor counts for a batch of jobs in one grouped query,
/// for the recent-items view.
pub async fn active_counts_for_jobs(
    pool: &PgPool,
    job_ids: &[Uuid],
) -> Result<HashMap<Uuid, i64>, sqlx::Error> {
    if job_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query(
        "SELECT job_id, COUNT(*) AS active_count \
         FROM viral_ideas_competitors \
         WHERE job_id = ANY($1) AND is_active \
         GROUP BY job_id",
    )
    .bind(job_ids)
    .fetch_all(pool)
    .await?;

    let mut counts = HashMap::with_capacity(rows.len());
    for row in rows {
        counts.insert(row.try_get("job_id")?, row.try_get("active_count")?);
    }
    Ok(counts)
}
