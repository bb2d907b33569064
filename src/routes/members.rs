use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::CurrentMember,
    error::AppError,
    models::member::{Member, MemberProfile},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_members))
        .route("/in-gym", get(in_gym_members))
        .route("/:id", get(member_detail).put(update_member))
        .route("/:id/enter", post(enter_gym))
        .route("/:id/exit", post(exit_gym))
        .route("/:id/sessions", get(member_recent_sessions))
}

const RECENT_SESSIONS_LIMIT: i64 = 50;

/// Closes stale visits before any presence or session data is served, so a
/// missed checkout never shows up as a live one.
async fn close_stale_visits(state: &AppState) -> Result<(), AppError> {
    state
        .presence
        .reconcile_stale(state.config.stale_visit_minutes)
        .await?;
    Ok(())
}

async fn list_members(
    State(state): State<AppState>,
    current: CurrentMember,
) -> Result<Json<Vec<MemberProfile>>, AppError> {
    current.require_staff()?;
    close_stale_visits(&state).await?;

    let members =
        sqlx::query_as::<_, Member>("SELECT * FROM members ORDER BY date_joined DESC")
            .fetch_all(&state.db)
            .await?;
    let today = state.clock.today();
    Ok(Json(members.iter().map(|m| m.profile(today)).collect()))
}

async fn in_gym_members(
    State(state): State<AppState>,
    current: CurrentMember,
) -> Result<Json<Value>, AppError> {
    let today = state.clock.today();
    current.require_active_subscription(today)?;
    close_stale_visits(&state).await?;

    let members = state.presence.members_in_gym().await?;
    let profiles: Vec<MemberProfile> = members.iter().map(|m| m.profile(today)).collect();
    Ok(Json(json!({
        "count": profiles.len(),
        "members": profiles,
    })))
}

async fn member_detail(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(member_id): Path<i64>,
) -> Result<Json<MemberProfile>, AppError> {
    let today = state.clock.today();
    let caller = current.require_active_subscription(today)?;
    if !caller.may_act_for(member_id) {
        return Err(AppError::Forbidden(
            "You can only view your own profile".into(),
        ));
    }
    close_stale_visits(&state).await?;

    let member = fetch_member(&state, member_id).await?;
    Ok(Json(member.profile(today)))
}

#[derive(Deserialize)]
struct MemberUpdatePayload {
    name: Option<String>,
    subscription_start: Option<NaiveDate>,
    subscription_end: Option<NaiveDate>,
}

async fn update_member(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(member_id): Path<i64>,
    Json(payload): Json<MemberUpdatePayload>,
) -> Result<Json<MemberProfile>, AppError> {
    current.require_staff()?;

    let member = fetch_member(&state, member_id).await?;
    let name = payload.name.unwrap_or(member.name);
    let subscription_start = payload
        .subscription_start
        .unwrap_or(member.subscription_start);
    let subscription_end = payload.subscription_end.or(member.subscription_end);

    sqlx::query(
        "UPDATE members SET name = ?1, subscription_start = ?2, subscription_end = ?3 \
         WHERE id = ?4",
    )
    .bind(&name)
    .bind(subscription_start)
    .bind(subscription_end)
    .bind(member_id)
    .execute(&state.db)
    .await?;

    let updated = fetch_member(&state, member_id).await?;
    Ok(Json(updated.profile(state.clock.today())))
}

async fn enter_gym(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(member_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let caller = current.require_active_subscription(state.clock.today())?;
    if !caller.may_act_for(member_id) {
        return Err(AppError::Forbidden(
            "You can only update your own gym status".into(),
        ));
    }
    close_stale_visits(&state).await?;

    state.presence.check_in(member_id).await?;
    Ok(Json(json!({ "success": "Welcome to the gym!" })))
}

async fn exit_gym(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(member_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let caller = current.require_active_subscription(state.clock.today())?;
    if !caller.may_act_for(member_id) {
        return Err(AppError::Forbidden(
            "You can only update your own gym status".into(),
        ));
    }
    close_stale_visits(&state).await?;

    let outcome = state.presence.check_out(member_id).await?;
    Ok(Json(json!({ "success": outcome.message() })))
}

async fn member_recent_sessions(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(member_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let caller = current.require_active_subscription(state.clock.today())?;
    if !caller.may_act_for(member_id) {
        return Err(AppError::Forbidden(
            "You can only view your own sessions".into(),
        ));
    }
    close_stale_visits(&state).await?;

    // Distinguish "no visits yet" from "no such member".
    fetch_member(&state, member_id).await?;

    let sessions = state
        .presence
        .list_sessions(Some(member_id), Some(RECENT_SESSIONS_LIMIT))
        .await?;
    Ok(Json(json!({
        "count": sessions.len(),
        "sessions": sessions,
    })))
}

async fn fetch_member(state: &AppState, member_id: i64) -> Result<Member, AppError> {
    sqlx::query_as::<_, Member>("SELECT * FROM members WHERE id = ?1")
        .bind(member_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::MemberNotFound)
}
