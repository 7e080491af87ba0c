use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{AnalysisFormData, JobStatus};

/// Request to queue a viral-ideas analysis.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnalysisRequest {
    #[garde(length(min = 1, max = 200))]
    pub session_id: String,

    #[garde(length(min = 1, max = 200))]
    pub primary_username: String,

    #[garde(skip)]
    #[serde(default)]
    pub form_data: AnalysisFormData,

    /// May be empty; an analysis without competitors is valid.
    #[garde(length(max = 50), inner(length(min = 1, max = 200)))]
    #[serde(default)]
    pub selected_competitors: Vec<String>,
}

/// Response after queueing an analysis.
#[derive(Debug, Serialize)]
pub struct SubmitAnalysisResponse {
    pub job_id: Uuid,
    pub session_id: String,
    pub primary_username: String,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
}

/// Response for the start-readiness signal.
#[derive(Debug, Serialize)]
pub struct StartJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// Acknowledgment that batch draining has kicked off.
#[derive(Debug, Serialize)]
pub struct DrainResponse {
    pub status: String,
    pub pending_jobs: usize,
}

/// Request to toggle a competitor in or out of the analysis scope.
#[derive(Debug, Deserialize)]
pub struct UpdateCompetitorRequest {
    pub is_active: bool,
}

/// Request to change a job's auto-rerun policy.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateScheduleRequest {
    #[garde(skip)]
    pub auto_rerun_enabled: bool,

    /// Hours between reruns, one hour to thirty days.
    #[garde(range(min = 1, max = 720))]
    #[serde(default = "default_rerun_frequency_hours")]
    pub rerun_frequency_hours: i32,
}

fn default_rerun_frequency_hours() -> i32 {
    24
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> SubmitAnalysisRequest {
        SubmitAnalysisRequest {
            session_id: "sess-42".to_string(),
            primary_username: "fitcoach".to_string(),
            form_data: AnalysisFormData::default(),
            selected_competitors: vec!["rival_a".to_string(), "rival_b".to_string()],
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(valid_request().validate().is_ok());
    }

    #[test]
    fn test_empty_session_id_rejected() {
        let mut req = valid_request();
        req.session_id = String::new();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_empty_primary_username_rejected() {
        let mut req = valid_request();
        req.primary_username = String::new();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_empty_competitor_list_is_valid() {
        let mut req = valid_request();
        req.selected_competitors.clear();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_blank_competitor_username_rejected() {
        let mut req = valid_request();
        req.selected_competitors.push(String::new());
        assert!(req.validate().is_err());
    }
}
