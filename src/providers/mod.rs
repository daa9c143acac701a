pub mod embeddings;
pub mod gemini;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::errors::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub model: String,
    pub schema: Value,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl StructuredRequest {
    /// Request for contract `T` with its derived schema and temperature 0.
    pub fn for_contract<T: ExtractionContract>(
        model: impl Into<String>,
        system: impl Into<String>,
        prompt: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> AppResult<Self> {
        Ok(Self {
            model: model.into(),
            schema: serde_json::to_value(schemars::schema_for!(T))?,
            system: system.into(),
            prompt: prompt.into(),
            temperature: 0.0,
            max_tokens,
            timeout,
        })
    }
}

/// Schema-constrained generation returning the raw JSON object.
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn generate_json(&self, request: &StructuredRequest) -> AppResult<Value>;

    /// Upper bound on wall time for one `generate_json` call. Generators that
    /// make several attempts widen it so each attempt keeps `request.timeout`.
    fn time_budget(&self, request: &StructuredRequest) -> Duration {
        request.timeout
    }
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>>;
}

/// A typed extraction output. `validate` covers rules the JSON schema cannot
/// express to every provider (string lengths, list sizes).
pub trait ExtractionContract: DeserializeOwned + JsonSchema + Send {
    fn validate(&self) -> Result<(), String>;
}

/// Runs one structured generation and returns a validated `T`. The
/// generator's time budget is enforced here regardless of what it does.
pub async fn generate_structured_output<T: ExtractionContract>(
    generator: &dyn StructuredGenerator,
    request: &StructuredRequest,
) -> AppResult<T> {
    let budget = generator.time_budget(request);
    let raw = tokio::time::timeout(budget, generator.generate_json(request))
        .await
        .map_err(|_| AppError::ProviderTimeout)??;
    let parsed: T = serde_json::from_value(raw)
        .map_err(|err| AppError::SchemaViolation(err.to_string()))?;
    parsed.validate().map_err(AppError::SchemaViolation)?;
    Ok(parsed)
}

/// Retries a failed request once against `fallback_model`. Each attempt gets
/// the full `request.timeout`.
#[derive(Clone)]
pub struct FallbackGenerator {
    inner: Arc<dyn StructuredGenerator>,
    fallback_model: Option<String>,
}

impl FallbackGenerator {
    pub fn new(inner: Arc<dyn StructuredGenerator>, fallback_model: Option<String>) -> Self {
        Self {
            inner,
            fallback_model,
        }
    }

    fn fallback_for(&self, request: &StructuredRequest) -> Option<&String> {
        self.fallback_model
            .as_ref()
            .filter(|model| **model != request.model)
    }

    async fn attempt(&self, request: &StructuredRequest) -> AppResult<Value> {
        tokio::time::timeout(request.timeout, self.inner.generate_json(request))
            .await
            .map_err(|_| AppError::ProviderTimeout)?
    }
}

#[async_trait]
impl StructuredGenerator for FallbackGenerator {
    async fn generate_json(&self, request: &StructuredRequest) -> AppResult<Value> {
        match self.attempt(request).await {
            Ok(value) => Ok(value),
            Err(err) => {
                let Some(fallback_model) = self.fallback_for(request) else {
                    return Err(err);
                };
                tracing::warn!(
                    primary = %request.model,
                    fallback = %fallback_model,
                    error = %err,
                    "primary model failed, retrying with fallback"
                );
                let mut retry = request.clone();
                retry.model = fallback_model.clone();
                self.attempt(&retry).await
            }
        }
    }

    fn time_budget(&self, request: &StructuredRequest) -> Duration {
        match self.fallback_for(request) {
            Some(_) => request.timeout.saturating_mul(2),
            None => request.timeout,
        }
    }
}
