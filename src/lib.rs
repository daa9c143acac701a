pub mod commands;
pub mod core;
pub mod db;
pub mod evidence;
pub mod providers;
pub mod sections;
pub mod security;

use std::{path::PathBuf, sync::Arc};

use tracing_subscriber::EnvFilter;

use crate::{
    core::{
        config::{log_filter_from_env, AppConfig},
        errors::AppResult,
        types::Provider,
    },
    db::{resolve_data_dir, store::SqliteFindingsStore, Database},
    evidence::{DisabledWebResearch, SqliteEvidenceStore},
    providers::{gemini::GeminiClient, FallbackGenerator},
    sections::pipeline::{PipelineSettings, SectionPipeline},
    security::keyring,
};

/// Logs go to stderr; stdout is reserved for command output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_filter_from_env()))
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: AppConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    pub async fn open(config: AppConfig) -> AppResult<Self> {
        let data_dir = resolve_data_dir(&config.data_dir)?;
        let db = Database::new(&data_dir).await?;
        Ok(Self {
            db,
            config,
            data_dir,
        })
    }

    /// Wires the SQLite stores to the Gemini client. Needs a provider key,
    /// which is why it is built per run rather than at startup.
    pub fn section_pipeline(&self) -> AppResult<SectionPipeline> {
        let api_key = keyring::get_provider_key(Provider::Gemini)?;
        let gemini = Arc::new(GeminiClient::new(api_key, self.config.embedding_model.clone())?);
        let generator = Arc::new(FallbackGenerator::new(
            gemini.clone(),
            self.config.fallback_model.clone(),
        ));
        Ok(SectionPipeline::new(
            Arc::new(SqliteEvidenceStore::new(self.db.clone())),
            Arc::new(DisabledWebResearch),
            generator,
            gemini,
            Arc::new(SqliteFindingsStore::new(self.db.clone())),
            PipelineSettings::from_config(&self.config),
        ))
    }
}
