use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::competitor::JobCompetitor;
use crate::models::job::{AnalysisFormData, AnalysisJob, JobStatus};

/// A processing job older than this is flagged overdue.
pub const OVERDUE_THRESHOLD_MINUTES: i64 = 30;

/// Coarse bucket for client-side status badges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    Waiting,
    Active,
    Success,
    Error,
    Warning,
}

impl StatusCategory {
    pub fn from_status(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => StatusCategory::Waiting,
            JobStatus::Processing => StatusCategory::Active,
            JobStatus::Completed => StatusCategory::Success,
            JobStatus::Failed => StatusCategory::Error,
            JobStatus::Paused => StatusCategory::Warning,
        }
    }
}

/// Human-readable pipeline stage derived from the progress percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    NotStarted,
    Initializing,
    Processing,
    Analyzing,
    Finalizing,
    Completed,
}

impl ProgressStage {
    pub fn from_percentage(percentage: i32) -> Self {
        match percentage {
            i32::MIN..=0 => ProgressStage::NotStarted,
            1..=24 => ProgressStage::Initializing,
            25..=49 => ProgressStage::Processing,
            50..=74 => ProgressStage::Analyzing,
            75..=99 => ProgressStage::Finalizing,
            _ => ProgressStage::Completed,
        }
    }
}

/// Fields derived at read time from a job row. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct JobInsights {
    pub status_category: StatusCategory,
    pub progress_stage: ProgressStage,
    pub processing_duration_minutes: Option<i64>,
    pub estimated_minutes_remaining: Option<i64>,
    pub is_overdue: bool,
    pub can_be_cancelled: bool,
    pub can_be_rerun: bool,
}

impl JobInsights {
    pub fn compute(job: &AnalysisJob, now: DateTime<Utc>) -> Self {
        JobInsights {
            status_category: StatusCategory::from_status(job.status),
            progress_stage: ProgressStage::from_percentage(job.progress_percentage),
            processing_duration_minutes: processing_duration_minutes(job),
            estimated_minutes_remaining: estimated_minutes_remaining(job, now),
            is_overdue: is_overdue(job, now),
            can_be_cancelled: matches!(job.status, JobStatus::Pending | JobStatus::Processing),
            can_be_rerun: job.status.is_terminal(),
        }
    }
}

/// Whole minutes spent processing, once the job reached a terminal state.
fn processing_duration_minutes(job: &AnalysisJob) -> Option<i64> {
    let started = job.started_processing_at?;
    let completed = job.completed_at?;
    Some((completed - started).num_minutes())
}

/// Linear extrapolation from elapsed time and current progress:
/// `elapsed * (100 / progress - 1)`, rounded to whole minutes.
fn estimated_minutes_remaining(job: &AnalysisJob, now: DateTime<Utc>) -> Option<i64> {
    if job.status != JobStatus::Processing || job.progress_percentage <= 0 {
        return None;
    }
    let started = job.started_processing_at?;
    let elapsed_secs = (now - started).num_seconds().max(0) as f64;
    let progress = f64::from(job.progress_percentage);
    let remaining_secs = elapsed_secs * (100.0 / progress - 1.0);
    Some((remaining_secs / 60.0).round() as i64)
}

/// A processing job past the overdue threshold has likely lost its worker.
fn is_overdue(job: &AnalysisJob, now: DateTime<Utc>) -> bool {
    if job.status != JobStatus::Processing {
        return false;
    }
    match job.started_processing_at {
        Some(started) => (now - started).num_minutes() > OVERDUE_THRESHOLD_MINUTES,
        None => false,
    }
}

/// Flattened job + competitors view served on the polling path.
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub session_id: String,
    pub primary_username: String,
    pub status: JobStatus,
    pub priority: i32,
    pub progress_percentage: i32,
    pub current_step: Option<String>,
    pub error_message: Option<String>,

    // Known form fields promoted for cheap filtering/display.
    pub content_type: Option<String>,
    pub target_audience: Option<String>,
    pub main_goals: Option<String>,
    pub form_data: AnalysisFormData,

    pub auto_rerun_enabled: bool,
    pub rerun_frequency_hours: i32,
    pub total_runs: i32,
    pub result: Option<serde_json::Value>,

    pub submitted_at: DateTime<Utc>,
    pub started_processing_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_analysis_at: Option<DateTime<Utc>>,
    pub next_scheduled_run: Option<DateTime<Utc>>,

    pub active_competitors_count: i64,
    pub total_competitors_count: i64,
    /// Active competitors only; inactive rows are history, not display.
    pub competitors: Vec<JobCompetitor>,

    #[serde(flatten)]
    pub insights: JobInsights,
}

impl JobSummary {
    pub fn build(job: AnalysisJob, competitors: Vec<JobCompetitor>, now: DateTime<Utc>) -> Self {
        let insights = JobInsights::compute(&job, now);
        let total_competitors_count = competitors.len() as i64;
        let active: Vec<JobCompetitor> =
            competitors.into_iter().filter(|c| c.is_active).collect();

        JobSummary {
            job_id: job.id,
            session_id: job.session_id,
            primary_username: job.primary_username,
            status: job.status,
            priority: job.priority,
            progress_percentage: job.progress_percentage,
            current_step: job.current_step,
            error_message: job.error_message,
            content_type: job.form_data.content_type.clone(),
            target_audience: job.form_data.target_audience.clone(),
            main_goals: job.form_data.main_goals.clone(),
            form_data: job.form_data,
            auto_rerun_enabled: job.auto_rerun_enabled,
            rerun_frequency_hours: job.rerun_frequency_hours,
            total_runs: job.total_runs,
            result: job.result,
            submitted_at: job.submitted_at,
            started_processing_at: job.started_processing_at,
            completed_at: job.completed_at,
            last_analysis_at: job.last_analysis_at,
            next_scheduled_run: job.next_scheduled_run,
            active_competitors_count: active.len() as i64,
            total_competitors_count,
            competitors: active,
            insights,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_job(status: JobStatus, progress: i32) -> AnalysisJob {
        let now = Utc::now();
        AnalysisJob {
            id: Uuid::new_v4(),
            session_id: "sess-1".to_string(),
            primary_username: "fitcoach".to_string(),
            form_data: AnalysisFormData::default(),
            status,
            priority: 5,
            progress_percentage: progress,
            current_step: None,
            error_message: None,
            cancel_requested: false,
            auto_rerun_enabled: false,
            rerun_frequency_hours: 24,
            total_runs: 0,
            result: None,
            submitted_at: now,
            started_processing_at: None,
            completed_at: None,
            last_analysis_at: None,
            next_scheduled_run: None,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_category_mapping() {
        assert_eq!(
            StatusCategory::from_status(JobStatus::Pending),
            StatusCategory::Waiting
        );
        assert_eq!(
            StatusCategory::from_status(JobStatus::Processing),
            StatusCategory::Active
        );
        assert_eq!(
            StatusCategory::from_status(JobStatus::Completed),
            StatusCategory::Success
        );
        assert_eq!(
            StatusCategory::from_status(JobStatus::Failed),
            StatusCategory::Error
        );
        assert_eq!(
            StatusCategory::from_status(JobStatus::Paused),
            StatusCategory::Warning
        );
    }

    #[test]
    fn test_progress_stage_buckets() {
        assert_eq!(ProgressStage::from_percentage(0), ProgressStage::NotStarted);
        assert_eq!(ProgressStage::from_percentage(1), ProgressStage::Initializing);
        assert_eq!(ProgressStage::from_percentage(24), ProgressStage::Initializing);
        assert_eq!(ProgressStage::from_percentage(25), ProgressStage::Processing);
        assert_eq!(ProgressStage::from_percentage(49), ProgressStage::Processing);
        assert_eq!(ProgressStage::from_percentage(50), ProgressStage::Analyzing);
        assert_eq!(ProgressStage::from_percentage(74), ProgressStage::Analyzing);
        assert_eq!(ProgressStage::from_percentage(75), ProgressStage::Finalizing);
        assert_eq!(ProgressStage::from_percentage(99), ProgressStage::Finalizing);
        assert_eq!(ProgressStage::from_percentage(100), ProgressStage::Completed);
    }

    #[test]
    fn test_processing_duration_requires_both_timestamps() {
        let now = Utc::now();
        let mut job = sample_job(JobStatus::Completed, 100);
        assert_eq!(processing_duration_minutes(&job), None);

        job.started_processing_at = Some(now - Duration::minutes(18));
        assert_eq!(processing_duration_minutes(&job), None);

        job.completed_at = Some(now);
        assert_eq!(processing_duration_minutes(&job), Some(18));
    }

    #[test]
    fn test_overdue_boundary() {
        let now = Utc::now();
        let mut job = sample_job(JobStatus::Processing, 40);

        job.started_processing_at = Some(now - Duration::minutes(29));
        assert!(!is_overdue(&job, now), "29 minutes in should not be overdue");

        job.started_processing_at = Some(now - Duration::minutes(31));
        assert!(is_overdue(&job, now), "31 minutes in should be overdue");

        // Never overdue outside processing, no matter how old.
        job.status = JobStatus::Completed;
        assert!(!is_overdue(&job, now));
        job.status = JobStatus::Paused;
        assert!(!is_overdue(&job, now));
    }

    #[test]
    fn test_estimated_time_remaining() {
        let now = Utc::now();
        let mut job = sample_job(JobStatus::Processing, 50);
        job.started_processing_at = Some(now - Duration::minutes(10));

        // Half done after 10 minutes: 10 more expected.
        assert_eq!(estimated_minutes_remaining(&job, now), Some(10));

        // 25% after 6 minutes: 18 more expected.
        job.progress_percentage = 25;
        job.started_processing_at = Some(now - Duration::minutes(6));
        assert_eq!(estimated_minutes_remaining(&job, now), Some(18));

        // No estimate without progress.
        job.progress_percentage = 0;
        assert_eq!(estimated_minutes_remaining(&job, now), None);

        // No estimate outside processing.
        job.progress_percentage = 100;
        job.status = JobStatus::Completed;
        assert_eq!(estimated_minutes_remaining(&job, now), None);
    }

    #[test]
    fn test_action_flags() {
        let now = Utc::now();
        let insights = JobInsights::compute(&sample_job(JobStatus::Pending, 0), now);
        assert!(insights.can_be_cancelled);
        assert!(!insights.can_be_rerun);

        let insights = JobInsights::compute(&sample_job(JobStatus::Processing, 10), now);
        assert!(insights.can_be_cancelled);
        assert!(!insights.can_be_rerun);

        let insights = JobInsights::compute(&sample_job(JobStatus::Completed, 100), now);
        assert!(!insights.can_be_cancelled);
        assert!(insights.can_be_rerun);

        let insights = JobInsights::compute(&sample_job(JobStatus::Failed, 60), now);
        assert!(!insights.can_be_cancelled);
        assert!(insights.can_be_rerun);

        let insights = JobInsights::compute(&sample_job(JobStatus::Paused, 60), now);
        assert!(!insights.can_be_cancelled);
        assert!(!insights.can_be_rerun);
    }

    #[test]
    fn test_summary_counts_active_competitors_only() {
        use crate::models::competitor::{CompetitorStatus, JobCompetitor, SelectionMethod};

        let now = Utc::now();
        let job = sample_job(JobStatus::Pending, 0);
        let job_id = job.id;
        let competitor = |name: &str, active: bool| JobCompetitor {
            id: Uuid::new_v4(),
            job_id,
            competitor_username: name.to_string(),
            selection_method: SelectionMethod::Manual,
            is_active: active,
            processing_status: CompetitorStatus::Pending,
            error_message: None,
            added_at: now,
            processed_at: None,
        };

        let summary = JobSummary::build(
            job,
            vec![
                competitor("rival_a", true),
                competitor("rival_b", false),
                competitor("rival_c", true),
            ],
            now,
        );

        assert_eq!(summary.total_competitors_count, 3);
        assert_eq!(summary.active_competitors_count, 2);
        assert_eq!(summary.competitors.len(), 2);
        assert!(summary.competitors.iter().all(|c| c.is_active));
    }
}
