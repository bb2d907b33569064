use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{self, NewMember},
    error::AppError,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

#[derive(Deserialize)]
struct RegisterPayload {
    phone_number: String,
    name: String,
    password: String,
    subscription_start: Option<NaiveDate>,
    subscription_end: Option<NaiveDate>,
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<impl IntoResponse, AppError> {
    let member = auth::register_member(
        &state.db,
        &state.clock,
        NewMember {
            phone_number: payload.phone_number,
            name: payload.name,
            password: payload.password,
            is_staff: false,
            subscription_start: payload.subscription_start,
            subscription_end: payload.subscription_end,
        },
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(member.profile(state.clock.today())),
    ))
}

#[derive(Deserialize)]
struct LoginPayload {
    phone_number: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Json(payload): Json<LoginPayload>,
) -> Result<impl IntoResponse, AppError> {
    let member =
        auth::authenticate_member(&state.db, &payload.phone_number, &payload.password).await?;
    let session_id = auth::create_session(&state.db, &state.clock, member.id).await?;
    let jar = auth::apply_session_cookie(jar, &session_id);
    Ok((
        jar,
        Json(json!({ "user": member.profile(state.clock.today()) })),
    ))
}

async fn logout(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, AppError> {
    if let Some(cookie) = jar.get(auth::SESSION_COOKIE) {
        auth::destroy_session(&state.db, cookie.value()).await?;
    }
    Ok((
        auth::clear_session_cookie(jar),
        Json(json!({ "success": "Logged out" })),
    ))
}
