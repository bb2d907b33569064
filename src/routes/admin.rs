use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::info;

use crate::{auth::CurrentMember, error::AppError, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/stats", get(stats))
        .route("/admin/reset-gym-status", post(reset_gym_status))
}

async fn stats(
    State(state): State<AppState>,
    current: CurrentMember,
) -> Result<Json<Value>, AppError> {
    current.require_staff()?;

    let member_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members")
        .fetch_one(&state.db)
        .await?;
    let session_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM gym_sessions")
        .fetch_one(&state.db)
        .await?;
    let in_gym_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members WHERE is_in_gym = 1")
        .fetch_one(&state.db)
        .await?;

    Ok(Json(json!({
        "member_count": member_count,
        "session_count": session_count,
        "in_gym_count": in_gym_count,
    })))
}

/// Force-closes every open visit, regardless of age. A scheduled job hits
/// this nightly so nobody stays "in the gym" across midnight.
async fn reset_gym_status(
    State(state): State<AppState>,
    current: CurrentMember,
) -> Result<Json<Value>, AppError> {
    current.require_staff()?;

    let reset = state.presence.reconcile_stale(0).await?;
    info!(reset, "gym status reset for all members");
    Ok(Json(json!({ "reset": reset })))
}
