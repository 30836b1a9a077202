//! Local model server speaking the Ollama `/api/generate` protocol.

use std::time::Duration;

use async_trait::async_trait;
use nlq_core::{LanguageModel, ModelError};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaModel {
    pub fn new(base_url: Option<String>, model: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.into(),
            timeout,
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: 0.1,
                num_predict: 2048,
            },
        };

        let response = self.client.post(&url).json(&request).send().await.map_err(|e| {
            if e.is_timeout() {
                ModelError::Timeout(self.timeout.as_millis() as u64)
            } else {
                ModelError::Unreachable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(ModelError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Unreachable(format!("invalid response body: {}", e)))?;
        if parsed.response.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(parsed.response)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
