use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::kb::store::{KbRecord, KbStore};
use crate::kb::template::{load_template_for_role, RoleTemplate, TemplateLookup};
use crate::kb::writer::{CustomRoleWriter, NewRolePayload, SavedRole};
use crate::state::AppState;

#[derive(Serialize)]
pub struct KbListResponse {
    pub curated: usize,
    pub custom: usize,
    pub records: Vec<KbRecord>,
}

/// GET /api/v1/kb
pub async fn handle_list_kb(
    State(state): State<AppState>,
) -> Result<Json<KbListResponse>, AppError> {
    let records = state.store.load()?;
    let custom = records.iter().filter(|r| r.is_custom).count();
    Ok(Json(KbListResponse {
        curated: records.len() - custom,
        custom,
        records,
    }))
}

/// GET /api/v1/kb/:id/template
pub async fn handle_get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RoleTemplate>, AppError> {
    let record = state
        .store
        .find(&id)?
        .ok_or_else(|| AppError::NotFound(format!("Role {id} not found")))?;

    // The record already names its own file; it is the only candidate the chain needs.
    let template = load_template_for_role(
        TemplateLookup {
            file: Some(&record.entry.file),
            role_id: Some(record.id()),
            title: Some(record.title()),
            function: record.entry.function.as_deref(),
            seniority: record.entry.seniority.as_deref(),
        },
        std::slice::from_ref(&record),
    )?;
    Ok(Json(template))
}

/// POST /api/v1/kb/custom
pub async fn handle_save_custom(
    State(state): State<AppState>,
    Json(payload): Json<NewRolePayload>,
) -> Result<(StatusCode, Json<SavedRole>), AppError> {
    let saved = save_custom_role(state.store.clone(), payload).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

/// Runs the fsync-and-rename save off the async workers.
pub async fn save_custom_role(
    store: KbStore,
    payload: NewRolePayload,
) -> Result<SavedRole, AppError> {
    let saved = tokio::task::spawn_blocking(move || CustomRoleWriter::new(store).save(payload))
        .await
        .map_err(anyhow::Error::from)??;
    Ok(saved)
}
