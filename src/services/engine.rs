use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::models::job::AnalysisFormData;

/// Client for the external content-analysis engine.
///
/// The engine owns the actual analysis (profile crawling, hook
/// extraction, script generation) including its own retry strategy; this
/// client only speaks its JSON API.
pub struct AnalysisEngineClient {
    http: Client,
    base_url: String,
    api_token: String,
}

/// Condensed view of a profile's recent content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub username: String,
    pub follower_count: Option<i64>,
    pub reels_analyzed: i64,
    /// Engine-internal metrics, passed through untouched.
    pub metrics: serde_json::Value,
}

/// A hook the engine pulled out of high-performing content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedHook {
    pub hook_text: String,
    pub source_username: String,
    pub score: f64,
}

/// A generated script idea built from the extracted hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedScript {
    pub title: String,
    pub script_text: String,
    pub source_hook: Option<String>,
}

#[derive(Deserialize)]
struct EngineResponse {
    result: serde_json::Value,
}

impl AnalysisEngineClient {
    pub fn new(base_url: String, api_token: String) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        }
    }

    /// Snapshot a profile's recent content performance.
    pub async fn profile_snapshot(&self, username: &str) -> Result<ProfileSnapshot, EngineError> {
        let url = format!("{}/v1/profiles/{}/snapshot", self.base_url, username);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(EngineError::Http)?
            .error_for_status()
            .map_err(EngineError::Http)?;

        let envelope: EngineResponse = response.json().await.map_err(EngineError::Http)?;
        serde_json::from_value(envelope.result).map_err(EngineError::Parse)
    }

    /// Extract the strongest hooks from a snapshot.
    pub async fn extract_hooks(
        &self,
        snapshot: &ProfileSnapshot,
    ) -> Result<Vec<ExtractedHook>, EngineError> {
        let url = format!("{}/v1/hooks/extract", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({ "snapshot": snapshot }))
            .send()
            .await
            .map_err(EngineError::Http)?
            .error_for_status()
            .map_err(EngineError::Http)?;

        let envelope: EngineResponse = response.json().await.map_err(EngineError::Http)?;
        serde_json::from_value(envelope.result).map_err(EngineError::Parse)
    }

    /// Turn extracted hooks plus the client's stated goals into scripts.
    pub async fn generate_scripts(
        &self,
        hooks: &[ExtractedHook],
        form_data: &AnalysisFormData,
    ) -> Result<Vec<GeneratedScript>, EngineError> {
        let url = format!("{}/v1/scripts/generate", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({
                "hooks": hooks,
                "preferences": form_data,
            }))
            .send()
            .await
            .map_err(EngineError::Http)?
            .error_for_status()
            .map_err(EngineError::Http)?;

        let envelope: EngineResponse = response.json().await.map_err(EngineError::Http)?;
        serde_json::from_value(envelope.result).map_err(EngineError::Parse)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse engine response: {0}")]
    Parse(#[from] serde_json::Error),
}
