use async_trait::async_trait;

use crate::{
    core::{
        errors::{AppError, AppResult},
        types::{PersistableFinding, SectionArtifacts, SectionId, SectionSnapshot},
        visualization::VisualizationTree,
    },
    db::{repositories::findings, Database},
};

/// Per-section persistence used by the section pipeline. Every write is
/// scoped by `(scope_id, section_id)`.
#[async_trait]
pub trait FindingsStore: Send + Sync {
    async fn delete_section_artifacts(&self, scope_id: &str, section_id: SectionId) -> AppResult<u64>;

    async fn insert_visualization(
        &self,
        scope_id: &str,
        section_id: SectionId,
        run_id: &str,
        tree: &VisualizationTree,
    ) -> AppResult<()>;

    async fn insert_dashboard_highlights(
        &self,
        scope_id: &str,
        section_id: SectionId,
        run_id: &str,
        highlights: &[String],
    ) -> AppResult<()>;

    async fn insert_findings(
        &self,
        scope_id: &str,
        section_id: SectionId,
        run_id: &str,
        rows: &[PersistableFinding],
    ) -> AppResult<()>;

    /// Writes visualization, highlights and findings in that order. A failure
    /// after an earlier write went through is reported as
    /// `PersistencePartialFailure`; the earlier rows stay in place.
    async fn persist_section_run(&self, artifacts: &SectionArtifacts) -> AppResult<()> {
        let SectionArtifacts {
            scope_id,
            section_id,
            run_id,
            visualization,
            highlights,
            findings,
        } = artifacts;

        self.insert_visualization(scope_id, *section_id, run_id, visualization)
            .await?;
        self.insert_dashboard_highlights(scope_id, *section_id, run_id, highlights)
            .await
            .map_err(|err| partial_failure("dashboard highlights", &["visualization"], err))?;
        self.insert_findings(scope_id, *section_id, run_id, findings)
            .await
            .map_err(|err| {
                partial_failure("findings", &["visualization", "dashboard highlights"], err)
            })?;
        Ok(())
    }
}

fn partial_failure(failed: &str, written: &[&str], err: AppError) -> AppError {
    AppError::PersistencePartialFailure(format!(
        "writing {failed} failed after {} were stored: {err}",
        written.join(" and ")
    ))
}

#[derive(Clone)]
pub struct SqliteFindingsStore {
    db: Database,
}

impl SqliteFindingsStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get_section_snapshot(
        &self,
        scope_id: &str,
        section_id: SectionId,
    ) -> AppResult<Option<SectionSnapshot>> {
        findings::get_section_snapshot(self.db.pool(), scope_id, section_id).await
    }
}

#[async_trait]
impl FindingsStore for SqliteFindingsStore {
    async fn delete_section_artifacts(&self, scope_id: &str, section_id: SectionId) -> AppResult<u64> {
        findings::delete_section_artifacts(self.db.pool(), scope_id, section_id).await
    }

    async fn insert_visualization(
        &self,
        scope_id: &str,
        section_id: SectionId,
        run_id: &str,
        tree: &VisualizationTree,
    ) -> AppResult<()> {
        let mut conn = self.db.pool().acquire().await?;
        findings::insert_visualization(&mut *conn, scope_id, section_id, run_id, tree).await
    }

    async fn insert_dashboard_highlights(
        &self,
        scope_id: &str,
        section_id: SectionId,
        run_id: &str,
        highlights: &[String],
    ) -> AppResult<()> {
        let mut conn = self.db.pool().acquire().await?;
        findings::insert_dashboard_highlights(&mut *conn, scope_id, section_id, run_id, highlights)
            .await
    }

    async fn insert_findings(
        &self,
        scope_id: &str,
        section_id: SectionId,
        run_id: &str,
        rows: &[PersistableFinding],
    ) -> AppResult<()> {
        let mut conn = self.db.pool().acquire().await?;
        findings::insert_findings(&mut *conn, scope_id, section_id, run_id, rows).await
    }

    /// All three writes share one transaction.
    async fn persist_section_run(&self, artifacts: &SectionArtifacts) -> AppResult<()> {
        let mut tx = self.db.pool().begin().await?;
        findings::insert_visualization(
            &mut *tx,
            &artifacts.scope_id,
            artifacts.section_id,
            &artifacts.run_id,
            &artifacts.visualization,
        )
        .await?;
        findings::insert_dashboard_highlights(
            &mut *tx,
            &artifacts.scope_id,
            artifacts.section_id,
            &artifacts.run_id,
            &artifacts.highlights,
        )
        .await?;
        findings::insert_findings(
            &mut *tx,
            &artifacts.scope_id,
            artifacts.section_id,
            &artifacts.run_id,
            &artifacts.findings,
        )
        .await?;
        tx.commit().await?;
        tracing::debug!(
            scope_id = %artifacts.scope_id,
            section_id = artifacts.section_id.as_str(),
            run_id = %artifacts.run_id,
            findings = artifacts.findings.len(),
            "section run persisted"
        );
        Ok(())
    }
}
