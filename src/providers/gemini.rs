use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use crate::{
    core::errors::{AppError, AppResult},
    providers::{EmbeddingProvider, StructuredGenerator, StructuredRequest},
};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    embedding_model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, embedding_model: impl Into<String>) -> AppResult<Self> {
        // Per-request timeouts come from the caller; this is only a ceiling.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| AppError::Network(err.to_string()))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            embedding_model: embedding_model.into(),
        })
    }

    async fn post(&self, endpoint: String, payload: &Value, timeout: Option<Duration>) -> AppResult<Value> {
        let mut builder = self
            .http
            .post(endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(payload);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().await.map_err(map_transport_error)?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(AppError::ProviderAuth),
            StatusCode::TOO_MANY_REQUESTS => return Err(AppError::ProviderRateLimited),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::ProviderInvalidResponse(format!(
                    "status {status} body {body}"
                )));
            }
            _ => {}
        }

        response
            .json()
            .await
            .map_err(|err| AppError::ProviderInvalidResponse(err.to_string()))
    }
}

fn map_transport_error(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::ProviderTimeout
    } else {
        AppError::Network(err.to_string())
    }
}

/// Gemini rejects the draft marker and accepts the rest of the schema as is.
fn provider_schema(schema: &Value) -> Value {
    let mut schema = schema.clone();
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
    }
    schema
}

pub(crate) fn generate_content_payload(request: &StructuredRequest) -> Value {
    serde_json::json!({
        "systemInstruction": {
            "parts": [{"text": request.system}]
        },
        "contents": [
            {
                "role": "user",
                "parts": [{"text": request.prompt}]
            }
        ],
        "generationConfig": {
            "temperature": request.temperature,
            "maxOutputTokens": request.max_tokens,
            "responseMimeType": "application/json",
            "responseJsonSchema": provider_schema(&request.schema)
        }
    })
}

pub(crate) fn candidate_json(body: &Value) -> AppResult<Value> {
    let text = body
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|items: &Vec<Value>| items.first())
        .and_then(|item: &Value| item.get("content"))
        .and_then(|content: &Value| content.get("parts"))
        .and_then(Value::as_array)
        .and_then(|parts: &Vec<Value>| parts.first())
        .and_then(|part: &Value| part.get("text"))
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::ProviderInvalidResponse("missing text candidate".to_string()))?;

    serde_json::from_str(text)
        .map_err(|err| AppError::ProviderInvalidResponse(format!("model output not JSON: {err}")))
}

#[async_trait]
impl StructuredGenerator for GeminiClient {
    async fn generate_json(&self, request: &StructuredRequest) -> AppResult<Value> {
        let endpoint = format!("{API_BASE}/{}:generateContent", request.model);
        let body = self
            .post(endpoint, &generate_content_payload(request), Some(request.timeout))
            .await?;
        if let Some(usage) = body.get("usageMetadata") {
            tracing::debug!(model = %request.model, usage = %usage, "structured generation finished");
        }
        candidate_json(&body)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiClient {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let endpoint = format!("{API_BASE}/{}:embedContent", self.embedding_model);
        let payload = serde_json::json!({
            "model": format!("models/{}", self.embedding_model),
            "content": {"parts": [{"text": text}]}
        });
        let body = self.post(endpoint, &payload, None).await?;
        let values = body
            .get("embedding")
            .and_then(|embedding: &Value| embedding.get("values"))
            .and_then(Value::as_array)
            .ok_or_else(|| AppError::ProviderInvalidResponse("missing embedding values".to_string()))?;
        values
            .iter()
            .map(|value| {
                value
                    .as_f64()
                    .map(|v| v as f32)
                    .ok_or_else(|| AppError::ProviderInvalidResponse("non-numeric embedding".to_string()))
            })
            .collect()
    }
}
