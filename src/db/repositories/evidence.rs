use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::core::{
    errors::{AppError, AppResult},
    types::{EvidenceChunk, SourceKind},
};

/// Content-addressed id for chunks imported without one. Locators are part
/// of the key, so repeated boilerplate on different pages stays distinct.
pub fn stable_chunk_id(scope_id: &str, chunk: &EvidenceChunk) -> String {
    let page = chunk.page.map(|page| page.to_string()).unwrap_or_default();
    let paragraph = chunk
        .paragraph
        .map(|paragraph| paragraph.to_string())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    for part in [
        scope_id,
        chunk.source_kind.as_str(),
        chunk.document.as_deref().unwrap_or_default(),
        page.as_str(),
        paragraph.as_str(),
        chunk.url.as_deref().unwrap_or_default(),
        chunk.content.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = format!("{:x}", hasher.finalize());
    format!("chunk-{}", &digest[..16])
}

/// Upserts chunks; a re-imported id keeps its original ordinal.
pub async fn insert_chunks(
    pool: &SqlitePool,
    scope_id: &str,
    chunks: &[EvidenceChunk],
) -> AppResult<usize> {
    let mut tx = pool.begin().await?;
    let mut next_ordinal: i64 = sqlx::query(
        "SELECT COALESCE(MAX(ordinal), -1) + 1 AS next_ordinal FROM evidence_chunks WHERE scope_id = ?1",
    )
    .bind(scope_id)
    .fetch_one(&mut *tx)
    .await?
    .try_get("next_ordinal")?;

    let mut written = 0usize;
    for chunk in chunks {
        if chunk.content.trim().is_empty() {
            continue;
        }
        let id = if chunk.id.trim().is_empty() {
            stable_chunk_id(scope_id, chunk)
        } else {
            chunk.id.trim().to_string()
        };
        let affected = sqlx::query(
            r#"
            INSERT INTO evidence_chunks (
              scope_id, id, ordinal, content, source_kind, document, page, paragraph, url
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(scope_id, id) DO UPDATE SET
              content = excluded.content,
              source_kind = excluded.source_kind,
              document = excluded.document,
              page = excluded.page,
              paragraph = excluded.paragraph,
              url = excluded.url
            "#,
        )
        .bind(scope_id)
        .bind(&id)
        .bind(next_ordinal)
        .bind(&chunk.content)
        .bind(chunk.source_kind.as_str())
        .bind(&chunk.document)
        .bind(chunk.page)
        .bind(chunk.paragraph)
        .bind(&chunk.url)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        next_ordinal += 1;
        written += affected as usize;
    }
    tx.commit().await?;
    Ok(written)
}

pub async fn list_scope_chunks(pool: &SqlitePool, scope_id: &str) -> AppResult<Vec<EvidenceChunk>> {
    let rows = sqlx::query(
        r#"
        SELECT id, content, source_kind, document, page, paragraph, url
        FROM evidence_chunks
        WHERE scope_id = ?1
        ORDER BY ordinal ASC
        "#,
    )
    .bind(scope_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(map_chunk).collect()
}

pub async fn count_scope_chunks(pool: &SqlitePool, scope_id: &str) -> AppResult<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS total FROM evidence_chunks WHERE scope_id = ?1")
        .bind(scope_id)
        .fetch_one(pool)
        .await?;
    Ok(row.try_get("total")?)
}

fn map_chunk(row: sqlx::sqlite::SqliteRow) -> AppResult<EvidenceChunk> {
    let source_kind: String = row.try_get("source_kind")?;
    Ok(EvidenceChunk {
        id: row.try_get("id")?,
        content: row.try_get("content")?,
        source_kind: SourceKind::parse(&source_kind)
            .ok_or_else(|| AppError::Database(format!("unknown source kind {source_kind}")))?,
        document: row.try_get("document")?,
        page: row.try_get("page")?,
        paragraph: row.try_get("paragraph")?,
        url: row.try_get("url")?,
    })
}
