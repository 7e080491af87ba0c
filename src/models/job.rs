use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of an analysis job in the async queue.
///
/// Transitions: pending → processing → {completed, failed};
/// processing → paused → pending (resume); terminal → pending when the
/// rerun scheduler releases a due job.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Paused,
}

impl JobStatus {
    /// Terminal states can only leave via the rerun release.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Client-submitted analysis preferences.
///
/// The known sub-fields are promoted into the status summary; anything
/// else the client sends rides along in `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFormData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_goals: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A viral-ideas analysis job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub session_id: String,
    pub primary_username: String,
    pub form_data: AnalysisFormData,
    pub status: JobStatus,
    pub priority: i32,
    pub progress_percentage: i32,
    pub current_step: Option<String>,
    pub error_message: Option<String>,
    pub cancel_requested: bool,
    pub auto_rerun_enabled: bool,
    pub rerun_frequency_hours: i32,
    pub total_runs: i32,
    pub result: Option<serde_json::Value>,
    pub submitted_at: DateTime<Utc>,
    pub started_processing_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_analysis_at: Option<DateTime<Utc>>,
    pub next_scheduled_run: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
