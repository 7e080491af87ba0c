use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Base URL of the content-analysis engine service
    pub engine_url: String,

    /// Bearer token for the analysis engine
    pub engine_api_token: String,

    /// How many jobs a worker process analyzes in parallel
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Seconds between rerun-scheduler scans
    #[serde(default = "default_rerun_scan_interval_secs")]
    pub rerun_scan_interval_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_rerun_scan_interval_secs() -> u64 {
    60
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
