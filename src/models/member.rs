use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A gym member: account identity, subscription window and presence state.
///
/// Presence invariant: `entry_time` is set if and only if `is_in_gym` is
/// true. Every mutation in [`crate::services::presence`] preserves it, and
/// checkout repairs rows that already violate it.
#[derive(Debug, Clone, FromRow)]
pub struct Member {
    pub id: i64,
    pub phone_number: String,
    pub name: String,
    pub password_hash: String,
    pub is_staff: bool,
    pub subscription_start: NaiveDate,
    pub subscription_end: Option<NaiveDate>,
    pub is_in_gym: bool,
    pub entry_time: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
}

impl Member {
    pub fn has_active_subscription(&self, as_of: NaiveDate) -> bool {
        subscription_active(self.subscription_start, self.subscription_end, as_of)
    }

    /// The JSON shape served to API clients. Validity is derived here, on
    /// every call, never stored.
    pub fn profile(&self, as_of: NaiveDate) -> MemberProfile {
        MemberProfile {
            id: self.id,
            phone_number: self.phone_number.clone(),
            name: self.name.clone(),
            subscription_start: self.subscription_start,
            subscription_end: self.subscription_end,
            is_in_gym: self.is_in_gym,
            date_joined: self.date_joined,
            has_active_subscription: self.has_active_subscription(as_of),
        }
    }
}

/// Whether a subscription window covers `as_of`.
///
/// Both ends are inclusive. A missing end date means the subscription runs
/// indefinitely once started; a start date in the future is not yet active.
pub fn subscription_active(start: NaiveDate, end: Option<NaiveDate>, as_of: NaiveDate) -> bool {
    match end {
        Some(end) => start <= as_of && as_of <= end,
        None => start <= as_of,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberProfile {
    pub id: i64,
    pub phone_number: String,
    pub name: String,
    pub subscription_start: NaiveDate,
    pub subscription_end: Option<NaiveDate>,
    pub is_in_gym: bool,
    pub date_joined: DateTime<Utc>,
    pub has_active_subscription: bool,
}
