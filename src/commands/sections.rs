use serde_json::Value;

use crate::{
    commands::evidence::normalized_scope,
    core::{
        errors::{AppError, AppResult},
        scan_view::{section_availability as available_sections, ScanResultView},
        types::{
            GetSectionSnapshotResponse, RunSectionsResponse, SectionAvailabilityResponse, SectionId,
        },
    },
    db::repositories::findings,
    sections::pipeline::{SectionPipeline, SectionRunOptions},
    AppState,
};

fn parse_section(raw: &str) -> AppResult<SectionId> {
    SectionId::parse(raw).ok_or_else(|| AppError::InvalidInput(format!("unknown section {raw}")))
}

/// Runs the requested sections, or all of them when none are named.
pub async fn run_sections(
    pipeline: &SectionPipeline,
    scope_id: String,
    sections: Vec<String>,
    allow_web_enrichment: bool,
) -> AppResult<RunSectionsResponse> {
    let scope_id = normalized_scope(&scope_id)?;
    let section_ids = if sections.is_empty() {
        SectionId::ALL.to_vec()
    } else {
        sections
            .iter()
            .map(|raw| parse_section(raw))
            .collect::<AppResult<Vec<_>>>()?
    };
    let results = pipeline
        .run_sections(
            &scope_id,
            &section_ids,
            SectionRunOptions {
                allow_web_enrichment,
            },
        )
        .await;
    Ok(RunSectionsResponse { scope_id, results })
}

pub async fn get_section_snapshot(
    state: &AppState,
    scope_id: String,
    section_id: String,
) -> AppResult<GetSectionSnapshotResponse> {
    let scope_id = normalized_scope(&scope_id)?;
    let section_id = parse_section(&section_id)?;
    let snapshot = findings::get_section_snapshot(state.db.pool(), &scope_id, section_id).await?;
    Ok(GetSectionSnapshotResponse { snapshot })
}

pub async fn section_availability(scan: Value) -> AppResult<SectionAvailabilityResponse> {
    let view = ScanResultView::from_value(&scan);
    Ok(SectionAvailabilityResponse {
        available: available_sections(&view),
    })
}
