use std::{collections::HashMap, fmt, net::SocketAddr, sync::Arc};

use anyhow::Context;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use cucumber::{given, then, when, World as _};
use gymtrack::{
    auth::{self, NewMember},
    config::AppConfig,
    db::init_pool,
    error::AppError,
    models::member::Member,
    services::{
        clock::{Clock, ManualTimeSource},
        presence::CheckoutOutcome,
    },
    state::AppState,
};
use tempfile::TempDir;

#[derive(Debug, cucumber::World, Default)]
struct AppWorld {
    state: Option<TestState>,
    members: HashMap<String, i64>,
    last_failure: Option<AppError>,
    last_checkout: Option<CheckoutOutcome>,
    last_reconciled: Option<u64>,
    auth_session: Option<String>,
}

impl AppWorld {
    fn app_state(&self) -> &AppState {
        self.state
            .as_ref()
            .expect("state must be initialised first")
            .app()
    }

    fn clock(&self) -> &Arc<ManualTimeSource> {
        &self
            .state
            .as_ref()
            .expect("state must be initialised first")
            .clock
    }

    fn member_id(&self, name: &str) -> i64 {
        *self
            .members
            .get(name)
            .unwrap_or_else(|| panic!("member {name} was never created"))
    }

    async fn fetch_member(&self, name: &str) -> Member {
        sqlx::query_as::<_, Member>("SELECT * FROM members WHERE id = ?1")
            .bind(self.member_id(name))
            .fetch_one(&self.app_state().db)
            .await
            .expect("load member")
    }
}

struct TestState {
    app: AppState,
    clock: Arc<ManualTimeSource>,
    _root: TempDir,
}

impl fmt::Debug for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestState").finish()
    }
}

impl TestState {
    async fn new() -> anyhow::Result<Self> {
        let root = TempDir::new().context("create temp dir for bdd world")?;
        let db_path = root.path().join("bdd.sqlite");
        let database_url = format!("sqlite://{}", db_path.to_string_lossy());

        let config = AppConfig {
            database_url: database_url.clone(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            cookie_secret: "bdd-cookie-secret".into(),
            stale_visit_minutes: 90,
        };

        let db = init_pool(&config.database_url).await?;
        sqlx::migrate!("./migrations").run(&db).await?;

        let start = Utc
            .with_ymd_and_hms(2024, 5, 10, 8, 0, 0)
            .single()
            .context("valid start timestamp")?;
        let clock = Arc::new(ManualTimeSource::new(start));
        let app = AppState::new(config, db, Clock::from_source(clock.clone()));

        Ok(Self {
            app,
            clock,
            _root: root,
        })
    }

    fn app(&self) -> &AppState {
        &self.app
    }
}

#[given("a fresh gym")]
async fn given_fresh_gym(world: &mut AppWorld) {
    world.state = Some(TestState::new().await.expect("state"));
    world.members.clear();
    world.last_failure = None;
    world.last_checkout = None;
    world.last_reconciled = None;
    world.auth_session = None;
}

#[given(regex = r#"^a member "([^"]+)" with an active subscription$"#)]
async fn given_active_member(world: &mut AppWorld, name: String) {
    add_member(world, &name, 0, None).await;
}

#[given(regex = r#"^a member "([^"]+)" whose subscription runs from today for (\d+) days$"#)]
async fn given_windowed_member(world: &mut AppWorld, name: String, days: i64) {
    add_member(world, &name, 0, Some(days)).await;
}

#[given(regex = r#"^a member "([^"]+)" whose subscription starts in (\d+) days$"#)]
async fn given_future_member(world: &mut AppWorld, name: String, days: i64) {
    add_member(world, &name, days, None).await;
}

#[given(regex = r#"^a member "([^"]+)" whose subscription started (\d+) days ago with no end date$"#)]
async fn given_open_ended_member(world: &mut AppWorld, name: String, days_ago: i64) {
    add_member(world, &name, -days_ago, None).await;
}

#[given(
    regex = r#"^a member "([^"]+)" whose subscription started (\d+) days ago and ended (\d+) days ago$"#
)]
async fn given_expired_member(world: &mut AppWorld, name: String, start_ago: i64, end_ago: i64) {
    add_member(world, &name, -start_ago, Some(start_ago - end_ago)).await;
}

#[given(regex = r#"^"([^"]+)" is flagged in the gym without an entry time$"#)]
async fn given_anomalous_member(world: &mut AppWorld, name: String) {
    sqlx::query("UPDATE members SET is_in_gym = 1, entry_time = NULL WHERE id = ?1")
        .bind(world.member_id(&name))
        .execute(&world.app_state().db)
        .await
        .expect("flag member in gym");
}

#[when(regex = r#"^"([^"]+)" checks in$"#)]
async fn when_check_in(world: &mut AppWorld, name: String) {
    let member_id = world.member_id(&name);
    match world.app_state().presence.check_in(member_id).await {
        Ok(_) => world.last_failure = None,
        Err(err) => world.last_failure = Some(err),
    }
}

#[when(regex = r#"^"([^"]+)" checks out$"#)]
async fn when_check_out(world: &mut AppWorld, name: String) {
    let member_id = world.member_id(&name);
    match world.app_state().presence.check_out(member_id).await {
        Ok(outcome) => {
            world.last_checkout = Some(outcome);
            world.last_failure = None;
        }
        Err(err) => {
            world.last_checkout = None;
            world.last_failure = Some(err);
        }
    }
}

#[when(regex = r"^(\d+) minutes pass$")]
async fn when_minutes_pass(world: &mut AppWorld, minutes: i64) {
    world.clock().advance(Duration::minutes(minutes));
}

#[when(regex = r"^(\d+) days pass$")]
async fn when_days_pass(world: &mut AppWorld, days: i64) {
    world.clock().advance(Duration::days(days));
}

#[when(regex = r"^stale visits older than (\d+) minutes are reconciled$")]
async fn when_reconcile(world: &mut AppWorld, threshold: i64) {
    let closed = world
        .app_state()
        .presence
        .reconcile_stale(threshold)
        .await
        .expect("reconcile stale visits");
    world.last_reconciled = Some(closed);
}

#[then(regex = r#"^"([^"]+)" is in the gym$"#)]
async fn then_in_gym(world: &mut AppWorld, name: String) {
    let member = world.fetch_member(&name).await;
    assert!(member.is_in_gym);
    assert!(
        member.entry_time.is_some(),
        "a member in the gym must have an entry time"
    );
}

#[then(regex = r#"^"([^"]+)" is not in the gym$"#)]
async fn then_not_in_gym(world: &mut AppWorld, name: String) {
    let member = world.fetch_member(&name).await;
    assert!(!member.is_in_gym);
    assert!(
        member.entry_time.is_none(),
        "a member outside the gym must have no entry time"
    );
}

#[then(regex = r#"^the check-(?:in|out) fails with "([^"]+)"$"#)]
async fn then_transition_fails(world: &mut AppWorld, message: String) {
    let failure = world
        .last_failure
        .as_ref()
        .expect("a failed transition was expected");
    assert_eq!(failure.to_string(), message);
}

#[then("the check-out reports a status reset")]
async fn then_status_reset(world: &mut AppWorld) {
    assert!(
        matches!(world.last_checkout, Some(CheckoutOutcome::StatusReset)),
        "expected a status reset, got {:?}",
        world.last_checkout
    );
}

#[then(regex = r#"^"([^"]+)" has (\d+) recorded visits?$"#)]
async fn then_visit_count(world: &mut AppWorld, name: String, expected: usize) {
    let member_id = world.member_id(&name);
    let sessions = world
        .app_state()
        .presence
        .list_sessions(Some(member_id), None)
        .await
        .expect("list sessions");
    assert_eq!(sessions.len(), expected);
}

#[then(regex = r#"^the latest visit for "([^"]+)" lasted about (\d+) minutes$"#)]
async fn then_latest_visit_duration(world: &mut AppWorld, name: String, minutes: f64) {
    let member_id = world.member_id(&name);
    let sessions = world
        .app_state()
        .presence
        .list_sessions(Some(member_id), None)
        .await
        .expect("list sessions");
    let latest = sessions.first().expect("at least one visit expected");
    assert!(
        (latest.duration_minutes - minutes).abs() < 0.1,
        "expected about {minutes} minutes, got {}",
        latest.duration_minutes
    );
    let derived = (latest.exit_time - latest.entry_time).num_milliseconds() as f64 / 60_000.0;
    assert!((latest.duration_minutes - derived).abs() < 0.001);
}

#[then(regex = r"^the reconciliation closed (\d+) visits?$")]
async fn then_reconciled_count(world: &mut AppWorld, expected: u64) {
    assert_eq!(world.last_reconciled, Some(expected));
}

#[then(regex = r#"^"([^"]+)" has an active subscription$"#)]
async fn then_subscription_active(world: &mut AppWorld, name: String) {
    let member = world.fetch_member(&name).await;
    let today = world.app_state().clock.today();
    assert!(member.has_active_subscription(today));
}

#[then(regex = r#"^"([^"]+)" does not have an active subscription$"#)]
async fn then_subscription_inactive(world: &mut AppWorld, name: String) {
    let member = world.fetch_member(&name).await;
    let today = world.app_state().clock.today();
    assert!(!member.has_active_subscription(today));
}

#[when(regex = r#"^I register a member "([^"]+)" with phone "([^"]+)" and password "([^"]+)"$"#)]
async fn when_register(world: &mut AppWorld, name: String, phone: String, password: String) {
    let state = world.app_state();
    let result = auth::register_member(
        &state.db,
        &state.clock,
        NewMember {
            phone_number: phone,
            name: name.clone(),
            password,
            is_staff: false,
            subscription_start: None,
            subscription_end: None,
        },
    )
    .await;
    match result {
        Ok(member) => {
            world.members.insert(name, member.id);
            world.last_failure = None;
        }
        Err(err) => world.last_failure = Some(err),
    }
}

#[then(regex = r#"^the registration fails with "([^"]+)"$"#)]
async fn then_registration_fails(world: &mut AppWorld, message: String) {
    let failure = world
        .last_failure
        .as_ref()
        .expect("a failed registration was expected");
    assert_eq!(failure.to_string(), message);
}

#[then(regex = r#"^I can authenticate with phone "([^"]+)" and password "([^"]+)"$"#)]
async fn then_can_authenticate(world: &mut AppWorld, phone: String, password: String) {
    let member = auth::authenticate_member(&world.app_state().db, &phone, &password)
        .await
        .expect("authentication");
    assert_eq!(member.phone_number, phone);
}

#[then(regex = r#"^authentication with phone "([^"]+)" and password "([^"]+)" is rejected$"#)]
async fn then_authentication_rejected(world: &mut AppWorld, phone: String, password: String) {
    let result = auth::authenticate_member(&world.app_state().db, &phone, &password).await;
    assert!(matches!(result, Err(AppError::Unauthorized)));
}

#[when(regex = r#"^"([^"]+)" logs in$"#)]
async fn when_logs_in(world: &mut AppWorld, name: String) {
    let member_id = world.member_id(&name);
    let state = world.app_state();
    let session_id = auth::create_session(&state.db, &state.clock, member_id)
        .await
        .expect("create auth session");
    world.auth_session = Some(session_id);
}

#[then(regex = r#"^the auth session resolves to "([^"]+)"$"#)]
async fn then_session_resolves(world: &mut AppWorld, name: String) {
    let session_id = world.auth_session.as_ref().expect("a session was created");
    let state = world.app_state();
    let member = auth::load_session_member(&state.db, &state.clock, session_id)
        .await
        .expect("load session")
        .expect("session should resolve");
    assert_eq!(member.name, name);
}

#[when("the auth session is destroyed")]
async fn when_session_destroyed(world: &mut AppWorld) {
    let session_id = world
        .auth_session
        .clone()
        .expect("a session was created");
    auth::destroy_session(&world.app_state().db, &session_id)
        .await
        .expect("destroy session");
}

#[then("the auth session no longer resolves")]
async fn then_session_gone(world: &mut AppWorld) {
    let session_id = world.auth_session.as_ref().expect("a session was created");
    let state = world.app_state();
    let member = auth::load_session_member(&state.db, &state.clock, session_id)
        .await
        .expect("load session");
    assert!(member.is_none());
}

/// Creates a member whose subscription window is expressed in day offsets
/// relative to the current (simulated) day.
async fn add_member(
    world: &mut AppWorld,
    name: &str,
    start_offset_days: i64,
    end_offset_days: Option<i64>,
) {
    let state = world.app_state();
    let today = state.clock.today();
    let start = offset_date(today, start_offset_days);
    let end = end_offset_days.map(|days| offset_date(start, days));
    let phone = format!("0700{:06}", world.members.len() + 1);

    let member = auth::register_member(
        &state.db,
        &state.clock,
        NewMember {
            phone_number: phone,
            name: name.to_string(),
            password: "testpassword".into(),
            is_staff: false,
            subscription_start: Some(start),
            subscription_end: end,
        },
    )
    .await
    .expect("register member");
    world.members.insert(name.to_string(), member.id);
}

fn offset_date(from: NaiveDate, days: i64) -> NaiveDate {
    from + Duration::days(days)
}

#[tokio::main]
async fn main() {
    AppWorld::cucumber()
        .fail_on_skipped()
        .with_default_cli()
        .run("tests/features")
        .await;
}
