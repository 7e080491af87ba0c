use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a competitor ended up attached to a job.
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
pub enum SelectionMethod {
    Manual,
    Suggested,
    Api,
}

/// Per-competitor processing sub-status within a job.
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
pub enum CompetitorStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A competitor profile included in a job's analysis scope.
///
/// Unique per (job_id, competitor_username). Inactive rows are kept for
/// history but excluded from the worker pipeline and the active count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCompetitor {
    pub id: Uuid,
    pub job_id: Uuid,
    pub competitor_username: String,
    pub selection_method: SelectionMethod,
    pub is_active: bool,
    pub processing_status: CompetitorStatus,
    pub error_message: Option<String>,
    pub added_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}
