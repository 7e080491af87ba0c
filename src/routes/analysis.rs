use axum::extract::{Path, State};
use axum::Json;
use garde::Validate;
use serde::Serialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::{QueueError, QueueResult};
use crate::models::requests::{
    DrainResponse, StartJobResponse, SubmitAnalysisRequest, SubmitAnalysisResponse,
    UpdateCompetitorRequest, UpdateScheduleRequest,
};
use crate::models::summary::JobSummary;
use crate::services::queue::CancelOutcome;
use crate::services::{stats, summary};

/// POST /api/viral-ideas/queue — Submit an analysis request.
pub async fn submit_analysis(
    State(state): State<AppState>,
    Json(request): Json<SubmitAnalysisRequest>,
) -> QueueResult<Json<SubmitAnalysisResponse>> {
    let job = state.queue.submit(request).await?;

    Ok(Json(SubmitAnalysisResponse {
        job_id: job.id,
        session_id: job.session_id,
        primary_username: job.primary_username,
        status: job.status,
        submitted_at: job.submitted_at,
    }))
}

/// GET /api/viral-ideas/queue/{session_id} — Poll analysis progress.
pub async fn get_analysis_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> QueueResult<Json<JobSummary>> {
    let summary = summary::job_summary(&state.db, &session_id).await?;
    Ok(Json(summary))
}

/// GET /api/viral-ideas/queue-status — System-wide queue view.
pub async fn get_system_status(
    State(state): State<AppState>,
) -> QueueResult<Json<stats::SystemStatus>> {
    let status = stats::system_status(&state.db).await?;
    Ok(Json(status))
}

/// POST /api/viral-ideas/queue/{job_id}/start — Readiness signal.
pub async fn start_analysis(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> QueueResult<Json<StartJobResponse>> {
    let job = state.queue.start_job(job_id).await?;
    Ok(Json(StartJobResponse {
        job_id: job.id,
        status: job.status,
    }))
}

/// POST /api/viral-ideas/process-pending — Drain all pending jobs.
pub async fn drain_pending(State(state): State<AppState>) -> QueueResult<Json<DrainResponse>> {
    let pending_jobs = state.queue.drain_pending(&state.worker).await?;
    Ok(Json(DrainResponse {
        status: "started".to_string(),
        pending_jobs,
    }))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: Uuid,
    pub status: String,
}

/// POST /api/viral-ideas/queue/{job_id}/cancel — Cancel a job.
pub async fn cancel_analysis(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> QueueResult<Json<CancelResponse>> {
    let outcome = state.queue.cancel_job(job_id).await?;
    let status = match outcome {
        CancelOutcome::Cancelled => "cancelled",
        CancelOutcome::CancellationRequested => "cancellation_requested",
    };
    Ok(Json(CancelResponse {
        job_id,
        status: status.to_string(),
    }))
}

/// POST /api/viral-ideas/queue/{job_id}/pause
pub async fn pause_analysis(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> QueueResult<Json<serde_json::Value>> {
    state.queue.pause_job(job_id).await?;
    Ok(Json(serde_json::json!({ "job_id": job_id, "status": "paused" })))
}

/// POST /api/viral-ideas/queue/{job_id}/resume
pub async fn resume_analysis(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> QueueResult<Json<serde_json::Value>> {
    state.queue.resume_job(job_id).await?;
    Ok(Json(serde_json::json!({ "job_id": job_id, "status": "pending" })))
}

/// PATCH /api/viral-ideas/queue/{job_id}/competitors/{username} — Toggle
/// a competitor in or out of the analysis scope.
pub async fn update_competitor(
    State(state): State<AppState>,
    Path((job_id, username)): Path<(Uuid, String)>,
    Json(request): Json<UpdateCompetitorRequest>,
) -> QueueResult<Json<serde_json::Value>> {
    state
        .queue
        .set_competitor_active(job_id, &username, request.is_active)
        .await?;
    Ok(Json(serde_json::json!({
        "job_id": job_id,
        "competitor_username": username,
        "is_active": request.is_active,
    })))
}

/// PATCH /api/viral-ideas/queue/{job_id}/schedule — Auto-rerun policy.
pub async fn update_schedule(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(request): Json<UpdateScheduleRequest>,
) -> QueueResult<Json<serde_json::Value>> {
    request
        .validate()
        .map_err(|e| QueueError::Validation(e.to_string()))?;
    state
        .queue
        .update_schedule(job_id, request.auto_rerun_enabled, request.rerun_frequency_hours)
        .await?;
    Ok(Json(serde_json::json!({
        "job_id": job_id,
        "auto_rerun_enabled": request.auto_rerun_enabled,
        "rerun_frequency_hours": request.rerun_frequency_hours,
    })))
}
