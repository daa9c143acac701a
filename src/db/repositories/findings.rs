use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::core::{
    errors::{AppError, AppResult},
    types::{
        FindingCategory, FindingMetadata, PersistableFinding, SectionFinding, SectionId,
        SectionSnapshot, StoredFinding,
    },
    visualization::VisualizationTree,
};

fn parse_timestamp(value: String) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|v| v.with_timezone(&Utc))
        .map_err(|err| AppError::Database(format!("invalid timestamp {value}: {err}")))
}

/// Removes visualization, highlights and findings of one section. Returns the
/// number of deleted rows across all three tables.
pub async fn delete_section_artifacts(
    pool: &SqlitePool,
    scope_id: &str,
    section_id: SectionId,
) -> AppResult<u64> {
    let mut tx = pool.begin().await?;
    let mut deleted = 0u64;
    for table in ["section_visualizations", "dashboard_highlights", "section_findings"] {
        deleted += sqlx::query(&format!(
            "DELETE FROM {table} WHERE scope_id = ?1 AND section_id = ?2"
        ))
        .bind(scope_id)
        .bind(section_id.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }
    tx.commit().await?;
    Ok(deleted)
}

pub async fn insert_visualization(
    conn: &mut SqliteConnection,
    scope_id: &str,
    section_id: SectionId,
    run_id: &str,
    tree: &VisualizationTree,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO section_visualizations (scope_id, section_id, run_id, tree_json)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(scope_id)
    .bind(section_id.as_str())
    .bind(run_id)
    .bind(
        serde_json::to_string(tree)
            .map_err(|err: serde_json::Error| AppError::Internal(err.to_string()))?,
    )
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn insert_dashboard_highlights(
    conn: &mut SqliteConnection,
    scope_id: &str,
    section_id: SectionId,
    run_id: &str,
    highlights: &[String],
) -> AppResult<()> {
    for (idx, text) in highlights.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO dashboard_highlights (scope_id, section_id, run_id, idx, text)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(scope_id)
        .bind(section_id.as_str())
        .bind(run_id)
        .bind(idx as i64)
        .bind(text)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn insert_findings(
    conn: &mut SqliteConnection,
    scope_id: &str,
    section_id: SectionId,
    run_id: &str,
    findings: &[PersistableFinding],
) -> AppResult<()> {
    for (idx, row) in findings.iter().enumerate() {
        let embedding_json = row
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err: serde_json::Error| AppError::Internal(err.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO section_findings (
              id, scope_id, section_id, run_id, idx, content, category, confidence, metadata_json, embedding_json
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(scope_id)
        .bind(section_id.as_str())
        .bind(run_id)
        .bind(idx as i64)
        .bind(&row.finding.content)
        .bind(row.finding.category.as_str())
        .bind(i64::from(row.finding.confidence))
        .bind(
            serde_json::to_string(&row.finding.metadata)
                .map_err(|err: serde_json::Error| AppError::Internal(err.to_string()))?,
        )
        .bind(embedding_json)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn list_findings(
    pool: &SqlitePool,
    scope_id: &str,
    section_id: SectionId,
) -> AppResult<Vec<StoredFinding>> {
    let rows = sqlx::query(
        r#"
        SELECT id, run_id, idx, content, category, confidence, metadata_json, embedding_json, created_at
        FROM section_findings
        WHERE scope_id = ?1 AND section_id = ?2
        ORDER BY idx ASC
        "#,
    )
    .bind(scope_id)
    .bind(section_id.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(map_stored_finding).collect()
}

pub async fn count_findings(pool: &SqlitePool, scope_id: &str, section_id: SectionId) -> AppResult<i64> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total FROM section_findings WHERE scope_id = ?1 AND section_id = ?2",
    )
    .bind(scope_id)
    .bind(section_id.as_str())
    .fetch_one(pool)
    .await?;
    Ok(row.try_get("total")?)
}

pub async fn get_visualization(
    pool: &SqlitePool,
    scope_id: &str,
    section_id: SectionId,
) -> AppResult<Option<(String, VisualizationTree)>> {
    let maybe_row = sqlx::query(
        "SELECT run_id, tree_json FROM section_visualizations WHERE scope_id = ?1 AND section_id = ?2",
    )
    .bind(scope_id)
    .bind(section_id.as_str())
    .fetch_optional(pool)
    .await?;

    maybe_row
        .map(|row| -> AppResult<(String, VisualizationTree)> {
            let tree_json: String = row.try_get("tree_json")?;
            let tree = serde_json::from_str(&tree_json)
                .map_err(|err| AppError::Database(format!("invalid visualization json: {err}")))?;
            Ok((row.try_get("run_id")?, tree))
        })
        .transpose()
}

pub async fn list_highlights(
    pool: &SqlitePool,
    scope_id: &str,
    section_id: SectionId,
) -> AppResult<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT text
        FROM dashboard_highlights
        WHERE scope_id = ?1 AND section_id = ?2
        ORDER BY idx ASC
        "#,
    )
    .bind(scope_id)
    .bind(section_id.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| -> AppResult<String> { Ok(row.try_get("text")?) })
        .collect()
}

/// `None` when the section has never been persisted ("no data yet").
pub async fn get_section_snapshot(
    pool: &SqlitePool,
    scope_id: &str,
    section_id: SectionId,
) -> AppResult<Option<SectionSnapshot>> {
    let Some((run_id, visualization)) = get_visualization(pool, scope_id, section_id).await? else {
        return Ok(None);
    };
    Ok(Some(SectionSnapshot {
        scope_id: scope_id.to_string(),
        section_id,
        run_id,
        visualization,
        highlights: list_highlights(pool, scope_id, section_id).await?,
        findings: list_findings(pool, scope_id, section_id).await?,
    }))
}

fn map_stored_finding(row: sqlx::sqlite::SqliteRow) -> AppResult<StoredFinding> {
    let category_raw: String = row.try_get("category")?;
    let confidence: i64 = row.try_get("confidence")?;
    let metadata_raw: String = row.try_get("metadata_json")?;
    let embedding_raw: Option<String> = row.try_get("embedding_json")?;
    let created_at: String = row.try_get("created_at")?;
    let metadata: FindingMetadata = serde_json::from_str(&metadata_raw)
        .map_err(|err| AppError::Database(format!("invalid finding metadata: {err}")))?;

    Ok(StoredFinding {
        id: row.try_get("id")?,
        run_id: row.try_get("run_id")?,
        idx: row.try_get("idx")?,
        finding: SectionFinding {
            content: row.try_get("content")?,
            category: FindingCategory::parse(&category_raw)
                .ok_or_else(|| AppError::Database(format!("unknown category {category_raw}")))?,
            confidence: u8::try_from(confidence.clamp(0, 100)).unwrap_or(0),
            metadata,
        },
        embedding: embedding_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
        created_at: parse_timestamp(created_at)?,
    })
}
