use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::{auth::CurrentMember, error::AppError, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/sessions", get(list_sessions))
}

/// Staff see every recorded visit; members only their own.
async fn list_sessions(
    State(state): State<AppState>,
    current: CurrentMember,
) -> Result<Json<Value>, AppError> {
    let caller = current.require_active_subscription(state.clock.today())?;
    state
        .presence
        .reconcile_stale(state.config.stale_visit_minutes)
        .await?;

    let scope = if caller.is_staff {
        None
    } else {
        Some(caller.id)
    };
    let sessions = state.presence.list_sessions(scope, None).await?;
    Ok(Json(json!({
        "count": sessions.len(),
        "sessions": sessions,
    })))
}
