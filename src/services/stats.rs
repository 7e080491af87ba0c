use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{competitor_queries, queries};
use crate::error::QueueResult;
use crate::models::job::JobStatus;
use crate::models::summary::JobInsights;

/// How many recently submitted jobs feed the derived metrics.
pub const RECENT_ITEMS_LIMIT: i64 = 10;

/// Capacity usage is computed against at least this many slots so a
/// nearly empty system does not read as saturated.
const CAPACITY_FLOOR: i64 = 10;

const EFFICIENCY_TARGET: f64 = 95.0;
const EFFICIENCY_PENALTY_CAP: f64 = 40.0;
const AVERAGE_TIME_THRESHOLD_MINUTES: f64 = 20.0;
const AVERAGE_TIME_PENALTY_CAP: f64 = 20.0;
const OVERDUE_PENALTY: f64 = 10.0;

/// System-wide queue statistics.
#[derive(Debug, Serialize)]
pub struct QueueStatistics {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub total: i64,
    pub queue_capacity_usage: f64,
    pub processing_efficiency: f64,
    pub average_processing_time_minutes: Option<f64>,
    pub overdue_jobs: i64,
    pub system_health_score: f64,
}

/// One entry in the recent-activity list.
#[derive(Debug, Serialize)]
pub struct RecentJob {
    pub job_id: Uuid,
    pub session_id: String,
    pub primary_username: String,
    pub status: JobStatus,
    pub progress_percentage: i32,
    pub current_step: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub started_processing_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub active_competitors_count: i64,

    #[serde(flatten)]
    pub insights: JobInsights,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub statistics: QueueStatistics,
    pub recent_items: Vec<RecentJob>,
}

/// Compute the system-wide queue view: per-status counts, the ten most
/// recent jobs with their derived fields, and the composite health
/// metrics. Pure read aggregation, no store writes.
pub async fn system_status(pool: &PgPool) -> QueueResult<SystemStatus> {
    // Independent tallies, issued concurrently.
    let (pending, processing, completed, failed) = tokio::join!(
        queries::count_by_status(pool, JobStatus::Pending),
        queries::count_by_status(pool, JobStatus::Processing),
        queries::count_by_status(pool, JobStatus::Completed),
        queries::count_by_status(pool, JobStatus::Failed),
    );
    let (pending, processing, completed, failed) = (pending?, processing?, completed?, failed?);

    let recent = queries::recent_jobs(pool, RECENT_ITEMS_LIMIT).await?;
    let job_ids: Vec<Uuid> = recent.iter().map(|job| job.id).collect();
    let competitor_counts = competitor_queries::active_counts_for_jobs(pool, &job_ids).await?;

    let now = Utc::now();
    let recent_items: Vec<RecentJob> = recent
        .into_iter()
        .map(|job| {
            let insights = JobInsights::compute(&job, now);
            RecentJob {
                active_competitors_count: competitor_counts.get(&job.id).copied().unwrap_or(0),
                job_id: job.id,
                session_id: job.session_id,
                primary_username: job.primary_username,
                status: job.status,
                progress_percentage: job.progress_percentage,
                current_step: job.current_step,
                submitted_at: job.submitted_at,
                started_processing_at: job.started_processing_at,
                completed_at: job.completed_at,
                insights,
            }
        })
        .collect();

    let statistics = compute_statistics(pending, processing, completed, failed, &recent_items);

    metrics::gauge!("viral_analysis_queue_depth").set(pending as f64);

    Ok(SystemStatus {
        statistics,
        recent_items,
    })
}

fn compute_statistics(
    pending: i64,
    processing: i64,
    completed: i64,
    failed: i64,
    recent: &[RecentJob],
) -> QueueStatistics {
    let total = pending + processing + completed + failed;

    let recent_completed = recent
        .iter()
        .filter(|r| r.status == JobStatus::Completed)
        .count();
    let recent_failed = recent
        .iter()
        .filter(|r| r.status == JobStatus::Failed)
        .count();

    let durations: Vec<i64> = recent
        .iter()
        .filter_map(|r| r.insights.processing_duration_minutes)
        .collect();
    let average_processing_time_minutes = (!durations.is_empty())
        .then(|| durations.iter().sum::<i64>() as f64 / durations.len() as f64);

    let overdue_jobs = recent.iter().filter(|r| r.insights.is_overdue).count();

    let processing_efficiency = processing_efficiency(recent_completed, recent_failed);

    QueueStatistics {
        pending,
        processing,
        completed,
        failed,
        total,
        queue_capacity_usage: queue_capacity_usage(pending, processing, total),
        processing_efficiency,
        average_processing_time_minutes,
        overdue_jobs: overdue_jobs as i64,
        system_health_score: system_health_score(
            processing_efficiency,
            average_processing_time_minutes,
            overdue_jobs,
        ),
    }
}

/// Share of recent terminal jobs that completed. 100 when there is no
/// recent terminal activity at all.
fn processing_efficiency(completed: usize, failed: usize) -> f64 {
    let terminal = completed + failed;
    if terminal == 0 {
        return 100.0;
    }
    completed as f64 / terminal as f64 * 100.0
}

fn queue_capacity_usage(pending: i64, processing: i64, total: i64) -> f64 {
    (pending + processing) as f64 / total.max(CAPACITY_FLOOR) as f64 * 100.0
}

/// Composite 0–100 score: start at 100, penalize low efficiency, slow
/// average turnaround, and overdue jobs.
fn system_health_score(
    efficiency: f64,
    average_minutes: Option<f64>,
    overdue_jobs: usize,
) -> f64 {
    let mut score = 100.0;

    if efficiency < EFFICIENCY_TARGET {
        score -= (EFFICIENCY_TARGET - efficiency).min(EFFICIENCY_PENALTY_CAP);
    }

    if let Some(avg) = average_minutes {
        if avg > AVERAGE_TIME_THRESHOLD_MINUTES {
            score -= ((avg - AVERAGE_TIME_THRESHOLD_MINUTES) * 2.0).min(AVERAGE_TIME_PENALTY_CAP);
        }
    }

    score -= OVERDUE_PENALTY * overdue_jobs as f64;

    score.max(0.0)
}
