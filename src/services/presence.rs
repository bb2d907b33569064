use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        member::Member,
        session::{GymSession, SessionRecord},
    },
    services::clock::Clock,
};

/// Outcome of a checkout.
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    /// Normal exit: exactly one visit record was written.
    Completed(GymSession),
    /// The member was flagged in the gym with no entry time on record.
    /// The flag was cleared and no visit was recorded.
    StatusReset,
}

impl CheckoutOutcome {
    pub fn message(&self) -> String {
        match self {
            CheckoutOutcome::Completed(session) => {
                format!(
                    "Goodbye! Your visit of {:.0} minutes has been recorded",
                    session.duration_minutes
                )
            }
            CheckoutOutcome::StatusReset => {
                "Your gym status was out of date and has been reset".to_string()
            }
        }
    }
}

/// Tracks who is inside the gym and turns completed stays into visit
/// records.
///
/// All writes to a member's presence state go through conditional updates
/// on `is_in_gym`, so two racing requests cannot both observe the same
/// state and both succeed.
#[derive(Clone)]
pub struct PresenceService {
    db: DbPool,
    clock: Clock,
}

impl PresenceService {
    pub fn new(db: DbPool, clock: Clock) -> Self {
        Self { db, clock }
    }

    /// Records a member entering the gym.
    ///
    /// Fails with [`AppError::AlreadyInGym`] when the member is already
    /// inside, without touching the row.
    pub async fn check_in(&self, member_id: i64) -> Result<DateTime<Utc>, AppError> {
        let now = self.clock.now();
        let result = sqlx::query(
            "UPDATE members SET is_in_gym = 1, entry_time = ?1 WHERE id = ?2 AND is_in_gym = 0",
        )
        .bind(now)
        .bind(member_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 1 {
            info!(member_id, "member checked in");
            return Ok(now);
        }

        // The guard rejected the update: the member is missing or inside.
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM members WHERE id = ?1")
            .bind(member_id)
            .fetch_optional(&self.db)
            .await?;
        match exists {
            Some(_) => Err(AppError::AlreadyInGym),
            None => Err(AppError::MemberNotFound),
        }
    }

    /// Records a member leaving the gym and writes the visit record.
    ///
    /// The session insert and the presence flip happen in one transaction;
    /// a crash between them can never leave a visit without the matching
    /// state change. A member flagged inside without an entry time gets
    /// their flag repaired instead of a visit (see
    /// [`CheckoutOutcome::StatusReset`]).
    pub async fn check_out(&self, member_id: i64) -> Result<CheckoutOutcome, AppError> {
        let mut tx = self.db.begin().await?;

        let row: Option<(bool, Option<DateTime<Utc>>)> =
            sqlx::query_as("SELECT is_in_gym, entry_time FROM members WHERE id = ?1")
                .bind(member_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((is_in_gym, entry_time)) = row else {
            return Err(AppError::MemberNotFound);
        };
        if !is_in_gym {
            return Err(AppError::NotInGym);
        }

        let Some(entry_time) = entry_time else {
            let result = sqlx::query(
                "UPDATE members SET is_in_gym = 0, entry_time = NULL \
                 WHERE id = ?1 AND is_in_gym = 1",
            )
            .bind(member_id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(AppError::NotInGym);
            }
            tx.commit().await?;
            warn!(
                member_id,
                "member was flagged in the gym without an entry time; status reset"
            );
            return Ok(CheckoutOutcome::StatusReset);
        };

        let exit_time = self.clock.now();
        let duration_minutes = (exit_time - entry_time).num_milliseconds() as f64 / 60_000.0;
        let session = GymSession {
            id: Uuid::new_v4().to_string(),
            member_id,
            entry_time,
            exit_time,
            duration_minutes,
        };

        sqlx::query(
            "INSERT INTO gym_sessions (id, member_id, entry_time, exit_time, duration_minutes) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&session.id)
        .bind(session.member_id)
        .bind(session.entry_time)
        .bind(session.exit_time)
        .bind(session.duration_minutes)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "UPDATE members SET is_in_gym = 0, entry_time = NULL WHERE id = ?1 AND is_in_gym = 1",
        )
        .bind(member_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            // Lost a race against another checkout; dropping the
            // transaction rolls the insert back.
            return Err(AppError::NotInGym);
        }

        tx.commit().await?;
        info!(
            member_id,
            minutes = session.duration_minutes,
            "member checked out"
        );
        Ok(CheckoutOutcome::Completed(session))
    }

    /// Force-closes visits of members still flagged inside past the
    /// threshold, giving each an accurate (if overlong) visit record.
    ///
    /// Members flagged inside with no entry time at all are picked up too
    /// and go through the repair branch. Each member is closed
    /// independently; a second call right after finds nothing and returns
    /// 0. The nightly reset and the inline pre-check both land here, only
    /// with different thresholds.
    pub async fn reconcile_stale(&self, threshold_minutes: i64) -> Result<u64, AppError> {
        let cutoff = self.clock.now() - Duration::minutes(threshold_minutes);
        let stale_ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM members \
             WHERE is_in_gym = 1 AND (entry_time IS NULL OR entry_time < ?1)",
        )
        .bind(cutoff)
        .fetch_all(&self.db)
        .await?;

        let mut closed = 0u64;
        for member_id in stale_ids {
            match self.check_out(member_id).await {
                Ok(_) => closed += 1,
                // Someone checked out (or was deleted) between the scan
                // and the transition; nothing left to close.
                Err(AppError::NotInGym) | Err(AppError::MemberNotFound) => {}
                Err(err) => return Err(err),
            }
        }

        if closed > 0 {
            info!(closed, threshold_minutes, "reconciled stale gym visits");
        }
        Ok(closed)
    }

    /// Completed visits, most recent entry first. `member_id = None` lists
    /// everyone's.
    pub async fn list_sessions(
        &self,
        member_id: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<SessionRecord>, AppError> {
        let records = sqlx::query_as::<_, SessionRecord>(
            "SELECT s.id, s.member_id, m.name AS member_name, \
                    s.entry_time, s.exit_time, s.duration_minutes \
             FROM gym_sessions s \
             JOIN members m ON m.id = s.member_id \
             WHERE (?1 IS NULL OR s.member_id = ?1) \
             ORDER BY s.entry_time DESC \
             LIMIT ?2",
        )
        .bind(member_id)
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.db)
        .await?;
        Ok(records)
    }

    /// Members currently inside the gym.
    pub async fn members_in_gym(&self) -> Result<Vec<Member>, AppError> {
        let members =
            sqlx::query_as::<_, Member>("SELECT * FROM members WHERE is_in_gym = 1 ORDER BY entry_time")
                .fetch_all(&self.db)
                .await?;
        Ok(members)
    }
}
