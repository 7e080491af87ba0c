use sqlx::PgPool;
use std::sync::Arc;

use crate::services::queue::QueueManager;
use crate::services::worker::AnalysisWorker;

/// Shared application state passed to all route handlers.
///
/// Constructed once at startup from the store handle; a missing
/// dependency fails fast here instead of being checked on every call.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub queue: Arc<QueueManager>,
    pub worker: Arc<AnalysisWorker>,
}

impl AppState {
    pub fn new(db: PgPool, queue: QueueManager, worker: AnalysisWorker) -> Self {
        Self {
            db,
            queue: Arc::new(queue),
            worker: Arc::new(worker),
        }
    }
}
