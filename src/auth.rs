use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar, SameSite};
use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::member::{subscription_active, Member},
    services::clock::Clock,
    state::AppState,
};

pub const SESSION_COOKIE: &str = "gym_session";

const AUTH_SESSION_DAYS: i64 = 30;

/// The caller identity resolved from the session cookie.
#[derive(Debug, Clone)]
pub struct AuthenticatedMember {
    pub id: i64,
    pub phone_number: String,
    pub name: String,
    pub is_staff: bool,
    pub subscription_start: NaiveDate,
    pub subscription_end: Option<NaiveDate>,
}

impl AuthenticatedMember {
    pub fn has_active_subscription(&self, as_of: NaiveDate) -> bool {
        subscription_active(self.subscription_start, self.subscription_end, as_of)
    }

    /// Per-member operations are allowed for the member themselves or any
    /// staff account.
    pub fn may_act_for(&self, member_id: i64) -> bool {
        self.is_staff || self.id == member_id
    }
}

impl From<Member> for AuthenticatedMember {
    fn from(member: Member) -> Self {
        Self {
            id: member.id,
            phone_number: member.phone_number,
            name: member.name,
            is_staff: member.is_staff,
            subscription_start: member.subscription_start,
            subscription_end: member.subscription_end,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CurrentMember(pub Option<AuthenticatedMember>);

#[async_trait]
impl FromRequestParts<AppState> for CurrentMember {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar: PrivateCookieJar<Key> = match PrivateCookieJar::from_request_parts(parts, state).await {
            Ok(jar) => jar,
            Err(never) => match never {},
        };
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(Self(None));
        };
        let member = load_session_member(&state.db, &state.clock, cookie.value()).await?;
        Ok(Self(member))
    }
}

impl CurrentMember {
    pub fn require_member(&self) -> Result<&AuthenticatedMember, AppError> {
        self.0.as_ref().ok_or(AppError::Unauthorized)
    }

    pub fn require_staff(&self) -> Result<&AuthenticatedMember, AppError> {
        let member = self.require_member()?;
        if member.is_staff {
            Ok(member)
        } else {
            Err(AppError::Forbidden("Staff access required".into()))
        }
    }

    /// An authenticated caller whose subscription covers today. Staff pass
    /// regardless of their own subscription window.
    pub fn require_active_subscription(
        &self,
        as_of: NaiveDate,
    ) -> Result<&AuthenticatedMember, AppError> {
        let member = self.require_member()?;
        if member.is_staff || member.has_active_subscription(as_of) {
            Ok(member)
        } else {
            Err(AppError::SubscriptionExpired)
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewMember {
    pub phone_number: String,
    pub name: String,
    pub password: String,
    pub is_staff: bool,
    pub subscription_start: Option<NaiveDate>,
    pub subscription_end: Option<NaiveDate>,
}

pub async fn register_member(
    db: &DbPool,
    clock: &Clock,
    new_member: NewMember,
) -> Result<Member, AppError> {
    let phone = new_member.phone_number.trim();
    if phone.is_empty() {
        return Err(AppError::BadRequest(
            "The Phone Number field must be set".into(),
        ));
    }

    let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM members WHERE phone_number = ?1")
        .bind(phone)
        .fetch_optional(db)
        .await?;
    if taken.is_some() {
        return Err(AppError::BadRequest(
            "A member with this phone number already exists".into(),
        ));
    }

    let password_hash = hash_password(&new_member.password)?;
    let subscription_start = new_member.subscription_start.unwrap_or_else(|| clock.today());

    let result = sqlx::query(
        "INSERT INTO members \
         (phone_number, name, password_hash, is_staff, subscription_start, subscription_end, \
          is_in_gym, entry_time, date_joined) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, ?7)",
    )
    .bind(phone)
    .bind(&new_member.name)
    .bind(&password_hash)
    .bind(new_member.is_staff)
    .bind(subscription_start)
    .bind(new_member.subscription_end)
    .bind(clock.now())
    .execute(db)
    .await?;

    let member = sqlx::query_as::<_, Member>("SELECT * FROM members WHERE id = ?1")
        .bind(result.last_insert_rowid())
        .fetch_one(db)
        .await?;
    Ok(member)
}

pub async fn authenticate_member(
    db: &DbPool,
    phone_number: &str,
    password: &str,
) -> Result<Member, AppError> {
    let member =
        sqlx::query_as::<_, Member>("SELECT * FROM members WHERE phone_number = ?1")
            .bind(phone_number)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::Unauthorized)?;

    if verify_password(password, &member.password_hash)? {
        Ok(member)
    } else {
        Err(AppError::Unauthorized)
    }
}

pub async fn create_session(db: &DbPool, clock: &Clock, member_id: i64) -> Result<String, AppError> {
    let session_id = Uuid::new_v4().to_string();
    let now = clock.now();
    sqlx::query(
        "INSERT INTO auth_sessions (id, member_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(&session_id)
    .bind(member_id)
    .bind(now)
    .bind(now + Duration::days(AUTH_SESSION_DAYS))
    .execute(db)
    .await?;
    Ok(session_id)
}

pub async fn destroy_session(db: &DbPool, session_id: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM auth_sessions WHERE id = ?1")
        .bind(session_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn load_session_member(
    db: &DbPool,
    clock: &Clock,
    session_id: &str,
) -> Result<Option<AuthenticatedMember>, AppError> {
    let member = sqlx::query_as::<_, Member>(
        "SELECT m.* FROM members m \
         JOIN auth_sessions s ON s.member_id = m.id \
         WHERE s.id = ?1 AND (s.expires_at IS NULL OR s.expires_at > ?2)",
    )
    .bind(session_id)
    .bind(clock.now())
    .fetch_optional(db)
    .await?;
    Ok(member.map(AuthenticatedMember::from))
}

pub fn apply_session_cookie(jar: PrivateCookieJar, session_id: &str) -> PrivateCookieJar {
    let cookie = Cookie::build((SESSION_COOKIE, session_id.to_owned()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    jar.add(cookie)
}

pub fn clear_session_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/").build())
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| AppError::Other(anyhow::anyhow!("password hashing failed: {err}")))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|err| AppError::Other(anyhow::anyhow!("stored password hash invalid: {err}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
