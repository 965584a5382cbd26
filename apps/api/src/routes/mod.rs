pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::kb::handlers as kb;
use crate::resolution::handlers as resolution;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Knowledge base
        .route("/api/v1/kb", get(kb::handle_list_kb))
        .route("/api/v1/kb/custom", post(kb::handle_save_custom))
        .route("/api/v1/kb/:id/template", get(kb::handle_get_template))
        // Stateless resolution
        .route("/api/v1/extract", post(resolution::handle_extract))
        .route("/api/v1/match", post(resolution::handle_match))
        // Sessions
        .route("/api/v1/sessions", post(resolution::handle_create_session))
        .route(
            "/api/v1/sessions/:id",
            get(resolution::handle_get_session).delete(resolution::handle_delete_session),
        )
        .route("/api/v1/sessions/:id/roles", post(resolution::handle_add_role))
        .route("/api/v1/sessions/:id/refresh", post(resolution::handle_refresh))
        .route(
            "/api/v1/sessions/:id/roles/:idx",
            delete(resolution::handle_remove_role),
        )
        .route(
            "/api/v1/sessions/:id/roles/:idx/accept",
            post(resolution::handle_accept),
        )
        .route(
            "/api/v1/sessions/:id/roles/:idx/custom",
            post(resolution::handle_create_custom),
        )
        .route(
            "/api/v1/sessions/:id/roles/:idx/template",
            get(resolution::handle_role_template),
        )
        .with_state(state)
}
