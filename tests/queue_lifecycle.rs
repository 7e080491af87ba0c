//! Store-backed queue lifecycle tests.
//!
//! These require a running PostgreSQL instance configured via
//! DATABASE_URL (migrations are applied automatically).
//!
//! Run with: cargo test --test queue_lifecycle -- --ignored

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use viral_ideas_queue::db::{self, competitor_queries, queries};
use viral_ideas_queue::error::QueueError;
use viral_ideas_queue::models::job::{AnalysisFormData, JobStatus};
use viral_ideas_queue::models::requests::SubmitAnalysisRequest;
use viral_ideas_queue::models::summary::ProgressStage;
use viral_ideas_queue::services::queue::{CancelOutcome, QueueManager};
use viral_ideas_queue::services::summary;

async fn test_pool() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = db::init_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

fn submit_request(session_id: &str, competitors: &[&str]) -> SubmitAnalysisRequest {
    SubmitAnalysisRequest {
        session_id: session_id.to_string(),
        primary_username: "fitcoach".to_string(),
        form_data: AnalysisFormData {
            content_type: Some("reels".to_string()),
            target_audience: Some("fitness creators".to_string()),
            main_goals: Some("grow to 100k".to_string()),
            extra: serde_json::Map::new(),
        },
        selected_competitors: competitors.iter().map(|c| c.to_string()).collect(),
    }
}

fn unique_session() -> String {
    format!("test-session-{}", Uuid::new_v4())
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_submission_atomicity_on_duplicate_competitors() {
    let pool = test_pool().await;
    let session = unique_session();

    // Straight to the store, bypassing the manager's de-duplication: the
    // second insert violates the (job_id, username) constraint and the
    // whole transaction must roll back.
    let duplicates = vec!["rival_a".to_string(), "rival_a".to_string()];
    let result = queries::create_job_with_competitors(
        &pool,
        &session,
        "fitcoach",
        &AnalysisFormData::default(),
        &duplicates,
    )
    .await;
    assert!(result.is_err(), "duplicate competitor insert should fail");

    // No orphaned job row survives the rollback.
    let job = queries::get_job_by_session(&pool, &session)
        .await
        .expect("Failed to query job");
    assert!(job.is_none(), "rolled-back submission must not be visible");
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_full_lifecycle() {
    let pool = test_pool().await;
    let manager = QueueManager::new(pool.clone());
    let session = unique_session();

    // Submit with two competitors.
    let job = manager
        .submit(submit_request(&session, &["rival_a", "rival_b"]))
        .await
        .expect("Failed to submit");
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.progress_percentage, 0);

    let status = summary::job_summary(&pool, &session)
        .await
        .expect("Failed to get summary");
    assert_eq!(status.status, JobStatus::Pending);
    assert_eq!(status.progress_percentage, 0);
    assert_eq!(status.active_competitors_count, 2);
    assert_eq!(status.content_type.as_deref(), Some("reels"));
    assert!(status.insights.can_be_cancelled);
    assert!(!status.insights.can_be_rerun);

    // Worker claims the job.
    let claimed = queries::claim_job(&pool, job.id)
        .await
        .expect("Failed to claim")
        .expect("Claim should succeed on a pending job");
    assert_eq!(claimed.status, JobStatus::Processing);
    assert!(claimed.started_processing_at.is_some());

    // Worker reports mid-pipeline progress.
    let accepted = queries::report_progress(&pool, job.id, 50, "Analyzing competitors")
        .await
        .expect("Failed to report progress");
    assert!(accepted);

    let status = summary::job_summary(&pool, &session)
        .await
        .expect("Failed to get summary");
    assert_eq!(status.progress_percentage, 50);
    assert_eq!(status.insights.progress_stage, ProgressStage::Analyzing);
    assert!(!status.insights.is_overdue);
    assert_eq!(
        status.current_step.as_deref(),
        Some("Analyzing competitors")
    );

    // Worker reports terminal success.
    let result = serde_json::json!({ "hooks": [], "scripts": [] });
    let completed = queries::complete_job(&pool, job.id, &result)
        .await
        .expect("Failed to complete");
    assert!(completed);

    let status = summary::job_summary(&pool, &session)
        .await
        .expect("Failed to get summary");
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.progress_percentage, 100);
    assert!(status.completed_at.is_some());
    assert!(status.last_analysis_at.is_some());
    assert!(status.current_step.is_none());
    assert!(status.insights.can_be_rerun);
    assert!(!status.insights.can_be_cancelled);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_claim_exclusivity_under_race() {
    let pool = test_pool().await;
    let manager = QueueManager::new(pool.clone());
    let session = unique_session();

    let job = manager
        .submit(submit_request(&session, &[]))
        .await
        .expect("Failed to submit");

    // Race eight claimants against the single pending job.
    let attempts = (0..8).map(|_| {
        let pool = pool.clone();
        let job_id = job.id;
        tokio::spawn(async move { queries::claim_job(&pool, job_id).await })
    });
    let outcomes = futures::future::join_all(attempts).await;

    let wins = outcomes
        .into_iter()
        .map(|joined| joined.expect("task panicked").expect("claim query failed"))
        .filter(|claim| claim.is_some())
        .count();
    assert_eq!(wins, 1, "exactly one claimant may win");

    let job = queries::get_job(&pool, job.id)
        .await
        .expect("Failed to fetch job")
        .expect("Job must exist");
    assert_eq!(job.status, JobStatus::Processing);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_concurrent_drains_claim_each_job_once() {
    let pool = test_pool().await;
    let manager = QueueManager::new(pool.clone());

    let mut job_ids = Vec::new();
    for _ in 0..5 {
        let job = manager
            .submit(submit_request(&unique_session(), &[]))
            .await
            .expect("Failed to submit");
        job_ids.push(job.id);
    }

    // Two drain loops racing over the same pending set, both using the
    // claim-next primitive until the queue is dry.
    let drain = |pool: PgPool| async move {
        let mut claimed = Vec::new();
        loop {
            match queries::claim_next_pending(&pool).await.expect("claim failed") {
                Some(job) => claimed.push(job.id),
                None => break,
            }
        }
        claimed
    };

    let (first, second) = tokio::join!(drain(pool.clone()), drain(pool.clone()));

    let mut all: Vec<Uuid> = first.into_iter().chain(second).collect();
    // Other tests may have queued jobs; only count ours.
    all.retain(|id| job_ids.contains(id));
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 5, "all five jobs claimed, none twice");
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_progress_reports_are_monotonic() {
    let pool = test_pool().await;
    let manager = QueueManager::new(pool.clone());
    let session = unique_session();

    let job = manager
        .submit(submit_request(&session, &[]))
        .await
        .expect("Failed to submit");
    queries::claim_job(&pool, job.id)
        .await
        .expect("Failed to claim")
        .expect("Claim should succeed");

    assert!(queries::report_progress(&pool, job.id, 50, "Analyzing competitors")
        .await
        .expect("report failed"));

    // A stale, lower report is rejected.
    assert!(!queries::report_progress(&pool, job.id, 30, "Extracting hooks")
        .await
        .expect("report failed"));

    let job_row = queries::get_job(&pool, job.id)
        .await
        .expect("Failed to fetch")
        .expect("Job must exist");
    assert_eq!(job_row.progress_percentage, 50);
    assert_eq!(
        job_row.current_step.as_deref(),
        Some("Analyzing competitors")
    );

    // An equal report may still refresh the step label.
    assert!(queries::report_progress(&pool, job.id, 50, "Generating scripts")
        .await
        .expect("report failed"));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_rerun_release() {
    let pool = test_pool().await;
    let manager = QueueManager::new(pool.clone());
    let session = unique_session();

    let job = manager
        .submit(submit_request(&session, &["rival_a"]))
        .await
        .expect("Failed to submit");
    queries::claim_job(&pool, job.id)
        .await
        .expect("Failed to claim")
        .expect("Claim should succeed");
    queries::complete_job(&pool, job.id, &serde_json::json!({}))
        .await
        .expect("Failed to complete");

    // Backdate the schedule so the rerun is due now.
    let due = Utc::now() - Duration::minutes(5);
    assert!(queries::update_rerun_policy(&pool, job.id, true, 1, Some(due))
        .await
        .expect("Failed to update policy"));

    let released = queries::release_rerun(&pool, job.id)
        .await
        .expect("Failed to release");
    assert!(released);

    let job_row = queries::get_job(&pool, job.id)
        .await
        .expect("Failed to fetch")
        .expect("Job must exist");
    assert_eq!(job_row.status, JobStatus::Pending);
    assert_eq!(job_row.progress_percentage, 0);
    assert_eq!(job_row.total_runs, 1);
    assert!(job_row.error_message.is_none());
    assert!(job_row.completed_at.is_none(), "terminal timestamp cleared on release");
    assert!(job_row.next_scheduled_run.is_none());
    // The last successful analysis remains on record across reruns.
    assert!(job_row.last_analysis_at.is_some());

    // The release is CAS-shaped: a second release on the same schedule
    // finds nothing to do.
    let released_again = queries::release_rerun(&pool, job.id)
        .await
        .expect("Failed to re-release");
    assert!(!released_again);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_cancel_pending_job_fails_it_immediately() {
    let pool = test_pool().await;
    let manager = QueueManager::new(pool.clone());
    let session = unique_session();

    let job = manager
        .submit(submit_request(&session, &[]))
        .await
        .expect("Failed to submit");

    let outcome = manager.cancel_job(job.id).await.expect("Cancel failed");
    assert!(matches!(outcome, CancelOutcome::Cancelled));

    let status = summary::job_summary(&pool, &session)
        .await
        .expect("Failed to get summary");
    assert_eq!(status.status, JobStatus::Failed);
    assert!(status.error_message.is_some());
    assert!(status.insights.can_be_rerun);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_cancel_processing_job_sets_flag() {
    let pool = test_pool().await;
    let manager = QueueManager::new(pool.clone());
    let session = unique_session();

    let job = manager
        .submit(submit_request(&session, &[]))
        .await
        .expect("Failed to submit");
    queries::claim_job(&pool, job.id)
        .await
        .expect("Failed to claim")
        .expect("Claim should succeed");

    let outcome = manager.cancel_job(job.id).await.expect("Cancel failed");
    assert!(matches!(outcome, CancelOutcome::CancellationRequested));

    let flags = queries::get_run_flags(&pool, job.id)
        .await
        .expect("Failed to fetch flags")
        .expect("Job must exist");
    assert_eq!(flags, (JobStatus::Processing, true));

    // A completed job can no longer be cancelled.
    queries::complete_job(&pool, job.id, &serde_json::json!({}))
        .await
        .expect("Failed to complete");
    let err = manager.cancel_job(job.id).await.unwrap_err();
    assert!(matches!(err, QueueError::Conflict(_)));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_unknown_session_returns_not_found() {
    let pool = test_pool().await;

    let err = summary::job_summary(&pool, &unique_session())
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::NotFound(_)));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_empty_competitor_list_is_valid() {
    let pool = test_pool().await;
    let manager = QueueManager::new(pool.clone());
    let session = unique_session();

    manager
        .submit(submit_request(&session, &[]))
        .await
        .expect("Submission without competitors should succeed");

    let status = summary::job_summary(&pool, &session)
        .await
        .expect("Failed to get summary");
    assert_eq!(status.active_competitors_count, 0);
    assert_eq!(status.total_competitors_count, 0);
    assert!(status.competitors.is_empty());
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_duplicate_session_conflicts() {
    let pool = test_pool().await;
    let manager = QueueManager::new(pool.clone());
    let session = unique_session();

    manager
        .submit(submit_request(&session, &[]))
        .await
        .expect("First submission should succeed");
    let err = manager
        .submit(submit_request(&session, &[]))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Conflict(_)));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_competitor_toggle_excludes_from_active_count() {
    let pool = test_pool().await;
    let manager = QueueManager::new(pool.clone());
    let session = unique_session();

    let job = manager
        .submit(submit_request(&session, &["rival_a", "rival_b"]))
        .await
        .expect("Failed to submit");

    manager
        .set_competitor_active(job.id, "rival_b", false)
        .await
        .expect("Toggle failed");

    let status = summary::job_summary(&pool, &session)
        .await
        .expect("Failed to get summary");
    assert_eq!(status.total_competitors_count, 2);
    assert_eq!(status.active_competitors_count, 1);

    let active = competitor_queries::list_active_for_job(&pool, job.id)
        .await
        .expect("Failed to list active");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].competitor_username, "rival_a");

    // Unknown competitor is a not-found, not a silent no-op.
    let err = manager
        .set_competitor_active(job.id, "nobody", false)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::NotFound(_)));
}
