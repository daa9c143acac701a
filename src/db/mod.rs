use std::path::{Path, PathBuf};
use std::str::FromStr;

use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};

use crate::core::errors::{AppError, AppResult};

pub mod repositories;
pub mod store;

pub const DATABASE_FILE: &str = "bidlens.sqlite";

static MIGRATOR: Migrator = sqlx::migrate!("./src/db/migrations");

/// Shared SQLite pool holding evidence chunks and persisted section runs.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (or creates) `bidlens.sqlite` under `data_dir` and applies
    /// pending migrations.
    pub async fn new(data_dir: &Path) -> AppResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(DATABASE_FILE);
        let url = format!("sqlite:{}", db_path.to_string_lossy().replace('\\', "/"));
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|err| AppError::Database(err.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
        let db = Self::connect(options, 10).await?;
        tracing::debug!(path = %db_path.display(), "database ready");
        Ok(db)
    }

    /// Single-connection in-memory database; every connection to
    /// `sqlite::memory:` would otherwise see its own empty schema.
    pub async fn in_memory() -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|err| AppError::Database(err.to_string()))?;
        Self::connect(options, 1).await
    }

    async fn connect(options: SqliteConnectOptions, max_connections: u32) -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options.foreign_keys(true))
            .await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Anchors a relative data directory at the current working directory.
pub fn resolve_data_dir(data_dir: &Path) -> AppResult<PathBuf> {
    if data_dir.is_absolute() {
        return Ok(data_dir.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|err| AppError::Io(err.to_string()))?;
    Ok(cwd.join(data_dir))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::resolve_data_dir;

    #[test]
    fn relative_data_dir_is_anchored_at_cwd() {
        let resolved = resolve_data_dir(Path::new(".bidlens")).expect("resolve");
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with(".bidlens"));
    }

    #[test]
    fn absolute_data_dir_is_kept() {
        let dir = std::env::temp_dir().join("bidlens-data");
        assert_eq!(resolve_data_dir(&dir).expect("resolve"), dir);
    }
}
