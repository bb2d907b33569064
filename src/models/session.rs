use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One completed gym visit. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GymSession {
    pub id: String,
    pub member_id: i64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub duration_minutes: f64,
}

/// A visit joined with the owning member's name, as served by the
/// session-listing endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionRecord {
    pub id: String,
    pub member_id: i64,
    pub member_name: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub duration_minutes: f64,
}
