use std::{path::PathBuf, time::Duration};

use crate::core::errors::{AppError, AppResult};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub model: String,
    pub fallback_model: Option<String>,
    pub embedding_model: String,
    pub extraction_timeout: Duration,
    pub max_output_tokens: u32,
    pub embedding_concurrency: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".bidlens"),
            model: DEFAULT_MODEL.to_string(),
            fallback_model: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            extraction_timeout: Duration::from_secs(60),
            max_output_tokens: 8192,
            embedding_concurrency: 3,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let timeout_secs = parse_number(&non_empty, "BIDLENS_EXTRACTION_TIMEOUT_SECS")?
            .unwrap_or(defaults.extraction_timeout.as_secs());
        let embedding_concurrency = parse_number(&non_empty, "BIDLENS_EMBEDDING_CONCURRENCY")?
            .map(|value: u64| value as usize)
            .unwrap_or(defaults.embedding_concurrency);
        if embedding_concurrency == 0 {
            return Err(AppError::InvalidInput(
                "BIDLENS_EMBEDDING_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            data_dir: non_empty("BIDLENS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            model: non_empty("BIDLENS_MODEL").unwrap_or(defaults.model),
            fallback_model: non_empty("BIDLENS_FALLBACK_MODEL"),
            embedding_model: non_empty("BIDLENS_EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            extraction_timeout: Duration::from_secs(timeout_secs),
            max_output_tokens: parse_number(&non_empty, "BIDLENS_MAX_OUTPUT_TOKENS")?
                .map(|value: u64| value as u32)
                .unwrap_or(defaults.max_output_tokens),
            embedding_concurrency,
        })
    }
}

fn parse_number<F>(lookup: &F, key: &str) -> AppResult<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|err| AppError::InvalidInput(format!("{key}={raw}: {err}")))
        })
        .transpose()
}

pub fn log_filter_from_env() -> String {
    let level = match std::env::var("BIDLENS_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .to_ascii_lowercase()
        .as_str()
    {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    if sqlx_debug_enabled() {
        level.to_string()
    } else {
        format!("{level},sqlx::query=warn")
    }
}

fn sqlx_debug_enabled() -> bool {
    matches!(
        std::env::var("BIDLENS_SQLX_DEBUG")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::AppConfig;

    #[test]
    fn lookup_overrides_defaults() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("BIDLENS_MODEL", "gemini-2.5-pro"),
            ("BIDLENS_EXTRACTION_TIMEOUT_SECS", "90"),
            ("BIDLENS_EMBEDDING_CONCURRENCY", "5"),
            ("BIDLENS_FALLBACK_MODEL", " "),
        ]);
        let config = AppConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()))
            .expect("config");
        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.extraction_timeout.as_secs(), 90);
        assert_eq!(config.embedding_concurrency, 5);
        assert!(config.fallback_model.is_none());
    }

    #[test]
    fn rejects_non_numeric_and_zero_concurrency() {
        assert!(AppConfig::from_lookup(|key| {
            (key == "BIDLENS_MAX_OUTPUT_TOKENS").then(|| "lots".to_string())
        })
        .is_err());
        assert!(AppConfig::from_lookup(|key| {
            (key == "BIDLENS_EMBEDDING_CONCURRENCY").then(|| "0".to_string())
        })
        .is_err());
    }
}
