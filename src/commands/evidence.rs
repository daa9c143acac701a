use crate::{
    core::{
        errors::{AppError, AppResult},
        types::{EvidenceChunk, ImportChunksResponse},
    },
    db::repositories::evidence,
    AppState,
};

pub(crate) fn normalized_scope(scope_id: &str) -> AppResult<String> {
    let trimmed = scope_id.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput("scope id cannot be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

pub async fn import_chunks(
    state: &AppState,
    scope_id: String,
    chunks: Vec<EvidenceChunk>,
) -> AppResult<ImportChunksResponse> {
    let scope_id = normalized_scope(&scope_id)?;
    let imported = evidence::insert_chunks(state.db.pool(), &scope_id, &chunks).await?;
    tracing::info!(scope_id = %scope_id, received = chunks.len(), imported, "evidence chunks imported");
    Ok(ImportChunksResponse { scope_id, imported })
}
