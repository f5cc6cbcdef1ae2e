//! REST surface for relay state and history.
//!
//! Thin plumbing over the store — no relay logic lives here.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::relay::directive::{RelayDirective, UserStatus};
use crate::store::Database;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub primary_user: String,
}

/// Build the Axum router with relay REST routes.
pub fn relay_routes(db: Arc<dyn Database>, primary_user: String) -> Router {
    let state = AppState { db, primary_user };

    Router::new()
        .route("/health", get(health))
        .route("/api/relay/status", get(get_status).post(set_status))
        .route("/api/relay/messages", get(list_messages))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "relay-assist"
    }))
}

async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.get_relay_state(&state.primary_user).await {
        Ok(directive) => {
            let directive = directive.unwrap_or_else(RelayDirective::default);
            (StatusCode::OK, Json(serde_json::json!({ "status": directive })))
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

#[derive(Deserialize)]
struct SetStatusRequest {
    status: String,
    #[serde(default)]
    context: Option<String>,
}

async fn set_status(
    State(state): State<AppState>,
    Json(body): Json<SetStatusRequest>,
) -> impl IntoResponse {
    let Ok(status) = body.status.parse::<UserStatus>() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Invalid status. Must be: available, busy, away, sleep, or dnd"
            })),
        );
    };

    if let Err(e) = state.db.set_status(&state.primary_user, status).await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        );
    }

    if let Some(ref context) = body.context {
        if let Err(e) = state
            .db
            .set_context(&state.primary_user, Some(context))
            .await
        {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            );
        }
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({ "success": true, "status": status })),
    )
}

#[derive(Deserialize)]
struct ListMessagesQuery {
    limit: Option<usize>,
}

async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<ListMessagesQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(50).min(500);
    match state.db.recent_records(limit).await {
        Ok(messages) => (
            StatusCode::OK,
            Json(serde_json::json!({ "messages": messages })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}
