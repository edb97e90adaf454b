//! Ollama-backed oracle — non-streaming completions against a local
//! Ollama instance's `/api/generate` endpoint.

use crate::provider::{Oracle, OracleError, OracleResult};
use async_trait::async_trait;
use opscrew_core::config::OracleConfig;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub struct OllamaOracle {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaOracle {
    pub fn new(config: &OracleConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[async_trait]
impl Oracle for OllamaOracle {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, prompt: &str) -> OracleResult<String> {
        debug!(model = %self.model, prompt_len = prompt.len(), "oracle completion");

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
                "options": { "temperature": 0.2 }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::RequestFailed(format!(
                "ollama returned {status}: {body}"
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;
        Ok(generated.response)
    }
}
