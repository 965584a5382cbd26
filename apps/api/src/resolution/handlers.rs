use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::kb::template::{load_template_for_role, RoleTemplate, TemplateLookup};
use crate::kb::handlers::save_custom_role;
use crate::kb::writer::NewRolePayload;
use crate::resolution::extractor::{Extraction, ExtractionMeta, LlmBudget, PhraseSource};
use crate::resolution::matcher::{match_one, MatchResult};
use crate::resolution::session::{RoleView, Session, SessionView};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
}

#[derive(Deserialize)]
pub struct MatchRequest {
    pub phrase: String,
    /// Overrides the configured threshold for this call only. Wider than the 0 to 100
    /// range so out-of-range values reach validation instead of the JSON extractor.
    pub threshold: Option<u32>,
}

#[derive(Deserialize)]
pub struct AddRoleRequest {
    pub title: String,
}

#[derive(Deserialize)]
pub struct AcceptRequest {
    pub role_id: String,
}

#[derive(Serialize)]
pub struct IntakeResponse {
    #[serde(flatten)]
    pub session: SessionView,
    pub source: PhraseSource,
    pub extraction_meta: Option<ExtractionMeta>,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub refreshed: usize,
    pub session: SessionView,
}

fn session_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Session {id} not found"))
}

fn role_view(session: &Session, index: usize) -> Option<RoleView> {
    session.view().roles.into_iter().nth(index)
}

/// POST /api/v1/extract
/// Phrase extraction only. Runs on a throwaway budget; nothing is stored.
pub async fn handle_extract(
    State(state): State<AppState>,
    Json(req): Json<PromptRequest>,
) -> Result<Json<Extraction>, AppError> {
    let mut budget = LlmBudget::new(state.config.llm_call_cap);
    Ok(Json(state.extractor.extract(&req.prompt, &mut budget).await))
}

/// POST /api/v1/match
pub async fn handle_match(
    State(state): State<AppState>,
    Json(req): Json<MatchRequest>,
) -> Result<Json<MatchResult>, AppError> {
    let threshold = match req.threshold {
        None => state.config.fuzzy_threshold,
        Some(raw @ 0..=100) => raw as u8,
        Some(raw) => {
            return Err(AppError::Validation(format!(
                "threshold must be between 0 and 100, got {raw}"
            )))
        }
    };
    let kb = state.store.load()?;
    Ok(Json(match_one(&req.phrase, &kb, threshold)))
}

/// POST /api/v1/sessions
/// Intake: extracts phrases from the prompt and matches each one into a new session.
pub async fn handle_create_session(
    State(state): State<AppState>,
    Json(req): Json<PromptRequest>,
) -> Result<(StatusCode, Json<IntakeResponse>), AppError> {
    let kb = state.store.load()?;
    let mut session = Session::new(req.prompt, LlmBudget::new(state.config.llm_call_cap));

    let extraction = state
        .extractor
        .extract(&session.prompt, &mut session.llm)
        .await;
    for phrase in &extraction.phrases {
        session.add_role(match_one(phrase, &kb, state.config.fuzzy_threshold));
    }

    info!(
        "Session {} created with {} roles ({:?} extraction)",
        session.id,
        session.roles.len(),
        extraction.source
    );

    let response = IntakeResponse {
        session: session.view(),
        source: extraction.source,
        extraction_meta: extraction.meta,
    };
    state.sessions.write().await.insert(session.id, session);
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or_else(|| session_not_found(id))?;
    Ok(Json(session.view()))
}

/// DELETE /api/v1/sessions/:id
pub async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .sessions
        .write()
        .await
        .remove(&id)
        .ok_or_else(|| session_not_found(id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sessions/:id/roles
pub async fn handle_add_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddRoleRequest>,
) -> Result<(StatusCode, Json<RoleView>), AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::Validation("title must not be empty".to_string()));
    }
    let kb = state.store.load()?;

    let mut sessions = state.sessions.write().await;
    let session = sessions.get_mut(&id).ok_or_else(|| session_not_found(id))?;
    let index = session.add_role(match_one(&req.title, &kb, state.config.fuzzy_threshold));
    let view = role_view(session, index)
        .ok_or_else(|| anyhow::anyhow!("role {index} vanished right after being added"))?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// POST /api/v1/sessions/:id/refresh
pub async fn handle_refresh(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RefreshResponse>, AppError> {
    let kb = state.store.load()?;

    let mut sessions = state.sessions.write().await;
    let session = sessions.get_mut(&id).ok_or_else(|| session_not_found(id))?;
    let refreshed = session.refresh_pending(&kb, state.config.fuzzy_threshold);
    Ok(Json(RefreshResponse {
        refreshed,
        session: session.view(),
    }))
}

/// DELETE /api/v1/sessions/:id/roles/:idx
pub async fn handle_remove_role(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<SessionView>, AppError> {
    let mut sessions = state.sessions.write().await;
    let session = sessions.get_mut(&id).ok_or_else(|| session_not_found(id))?;
    session.remove_role(index)?;
    Ok(Json(session.view()))
}

/// POST /api/v1/sessions/:id/roles/:idx/accept
pub async fn handle_accept(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
    Json(req): Json<AcceptRequest>,
) -> Result<Json<RoleView>, AppError> {
    let kb = state.store.load()?;

    let mut sessions = state.sessions.write().await;
    let session = sessions.get_mut(&id).ok_or_else(|| session_not_found(id))?;
    session.accept(index, &req.role_id, &kb, state.config.fuzzy_threshold)?;
    info!("Session {id}: role #{index} matched to {}", req.role_id);

    let view = role_view(session, index)
        .ok_or_else(|| AppError::NotFound(format!("Role {index} not found")))?;
    Ok(Json(view))
}

/// POST /api/v1/sessions/:id/roles/:idx/custom
/// Saves a new custom template and finalizes the role with it. A blank title falls
/// back to the role's current title.
pub async fn handle_create_custom(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
    Json(mut payload): Json<NewRolePayload>,
) -> Result<(StatusCode, Json<RoleView>), AppError> {
    // Resolve the role before writing anything to disk.
    {
        let sessions = state.sessions.read().await;
        let session = sessions.get(&id).ok_or_else(|| session_not_found(id))?;
        let role = session.role(index)?;
        if payload.title.trim().is_empty() {
            payload.title = role.title.clone();
        }
    }

    // The sessions lock is not held across the blocking save.
    let saved = save_custom_role(state.store.clone(), payload).await?;

    let mut sessions = state.sessions.write().await;
    let Some(session) = sessions.get_mut(&id) else {
        warn!("Session {id} ended while custom role {} was being saved", saved.id);
        return Err(session_not_found(id));
    };
    session.finalize_custom(index, &saved)?;
    info!("Session {id}: role #{index} finalized with custom role {}", saved.id);

    let view = role_view(session, index)
        .ok_or_else(|| AppError::NotFound(format!("Role {index} not found")))?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/v1/sessions/:id/roles/:idx/template
pub async fn handle_role_template(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<RoleTemplate>, AppError> {
    let role = {
        let sessions = state.sessions.read().await;
        let session = sessions.get(&id).ok_or_else(|| session_not_found(id))?;
        session.role(index)?.clone()
    };
    let kb = state.store.load()?;
    let resolved_file = role
        .file
        .as_deref()
        .map(|f| state.store.resolve_file(f).to_string_lossy().into_owned());

    let template = load_template_for_role(
        TemplateLookup {
            file: resolved_file.as_deref(),
            role_id: role.role_id.as_deref(),
            title: Some(&role.title),
            function: None,
            seniority: None,
        },
        &kb,
    )?;
    Ok(Json(template))
}
