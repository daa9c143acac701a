use std::{
    io::Write,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use bidlens_lib::{
    commands,
    core::{
        config::AppConfig,
        errors::{AppError, AppResult},
        types::{EvidenceChunk, Provider},
    },
    init_tracing, AppState,
};

#[derive(Parser)]
#[command(name = "bidlens")]
#[command(about = "Evidence-grounded section extraction for tender documents", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Data directory (overrides BIDLENS_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run section pipelines for a scope
    Run {
        scope_id: String,
        /// Section ids; all sections when omitted
        #[arg(long = "section")]
        sections: Vec<String>,
        /// Allow best-effort web research before collecting evidence
        #[arg(long)]
        web: bool,
    },
    /// Import evidence chunks from a JSON array file
    Import { scope_id: String, file: PathBuf },
    /// Print the persisted snapshot of one section
    Show { scope_id: String, section_id: String },
    /// Store the Gemini API key in the OS keyring
    SetKey { api_key: String },
    /// List sections a scan result supports
    Availability { file: PathBuf },
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    let text = serde_json::to_string_pretty(value)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.write_all(b"\n")?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> AppResult<T> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|err| AppError::InvalidInput(format!("{}: {err}", path.display())))
}

async fn dispatch(cli: Cli) -> AppResult<()> {
    let mut config = AppConfig::from_env()?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    match cli.command {
        Command::Run {
            scope_id,
            sections,
            web,
        } => {
            let state = AppState::open(config).await?;
            let pipeline = state.section_pipeline()?;
            print_json(&commands::sections::run_sections(&pipeline, scope_id, sections, web).await?)
        }
        Command::Import { scope_id, file } => {
            let state = AppState::open(config).await?;
            let chunks: Vec<EvidenceChunk> = read_json(&file)?;
            print_json(&commands::evidence::import_chunks(&state, scope_id, chunks).await?)
        }
        Command::Show {
            scope_id,
            section_id,
        } => {
            let state = AppState::open(config).await?;
            print_json(&commands::sections::get_section_snapshot(&state, scope_id, section_id).await?)
        }
        Command::SetKey { api_key } => {
            print_json(&commands::settings::set_provider_key(Provider::Gemini, api_key).await?)
        }
        Command::Availability { file } => {
            let scan: Value = read_json(&file)?;
            print_json(&commands::sections::section_availability(scan).await?)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match dispatch(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(code = err.code(), error = %err, "command failed");
            if let Ok(text) = serde_json::to_string(&err) {
                eprintln!("{text}");
            }
            ExitCode::FAILURE
        }
    }
}
