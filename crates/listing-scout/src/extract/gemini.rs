//! Google Generative Language (`generateContent`) backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use super::error::GenerationError;
use super::GenerationClient;

pub struct GeminiClient {
    http: HttpClient,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

/// `candidates[0].content.parts[0].text`
fn response_text(body: &Value) -> Result<String, GenerationError> {
    body.get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            let reason = body
                .get("promptFeedback")
                .and_then(|f| f.get("blockReason"))
                .and_then(Value::as_str)
                .unwrap_or("no candidate text");
            GenerationError::Response(reason.to_string())
        })
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(
        &self,
        api_key: &SecretString,
        system_instruction: &str,
        prompt: &str,
    ) -> Result<String, GenerationError> {
        let body = json!({
            "system_instruction": { "parts": [{ "text": system_instruction }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 0.1,
                "responseMimeType": "application/json"
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .query(&[("key", api_key.expose_secret())])
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message: String = text.chars().take(500).collect();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Response(e.to_string()))?;
        response_text(&value)
    }
}
