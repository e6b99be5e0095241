#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;

use rollcall::collaborators::{CredentialLookup, UpstreamPolicy};
use rollcall::collaborators::memory::{InMemoryAttendance, InMemoryCredentials, InMemorySchedules};
use rollcall::modules::{
    AttendanceReconciler, AuthenticationService, CheckInService, LessonCodeRegistry,
};
use rollcall::router::init_router;
use rollcall::state::AppState;
use rollcall_auth::TokenIssuer;
use rollcall_config::{AttendanceConfig, JwtConfig};
use rollcall_core::ManualClock;
use rollcall_core::password::hash_password_with_cost;
use rollcall_models::{Actor, Credential, LessonId, LessonSchedule, Role, SubjectId};

pub const SECRET: &str = "rollcall-test-secret-0123456789abcdef";
pub const TEST_COST: u32 = 4;

pub const TEACHER: &str = "T100";
pub const ADMIN: &str = "A001";
pub const LESSON: &str = "L-0900";

/// 2026-03-02 at `hour:minute` UTC.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0)
        .single()
        .expect("valid test timestamp")
}

pub fn subject(uin: &str) -> SubjectId {
    SubjectId::parse(uin).unwrap()
}

pub fn lesson(id: &str) -> LessonId {
    LessonId::parse(id).unwrap()
}

pub fn actor(uin: &str, role: Role) -> Actor {
    Actor::new(subject(uin), role)
}

pub fn credential(uin: &str, password: &str, role: Role) -> Credential {
    Credential {
        subject_id: subject(uin),
        secret_hash: hash_password_with_cost(password, TEST_COST).unwrap(),
        role,
    }
}

/// 09:00 to 10:00, taught by [`TEACHER`].
pub fn morning_lesson(roster: &[&str]) -> LessonSchedule {
    LessonSchedule {
        lesson_id: lesson(LESSON),
        teacher_id: subject(TEACHER),
        start_time: at(9, 0),
        end_time: at(10, 0),
        roster: roster.iter().map(|uin| subject(uin)).collect::<HashSet<_>>(),
    }
}

pub fn attendance_config() -> AttendanceConfig {
    AttendanceConfig {
        upstream_timeout: StdDuration::from_millis(200),
        ..AttendanceConfig::default()
    }
}

pub struct TestApp {
    pub clock: Arc<ManualClock>,
    pub credentials: Arc<InMemoryCredentials>,
    pub schedules: Arc<InMemorySchedules>,
    pub attendance: Arc<InMemoryAttendance>,
    pub tokens: Arc<TokenIssuer>,
    pub auth: Arc<AuthenticationService>,
    pub check_in: Arc<CheckInService>,
    pub state: AppState,
}

impl TestApp {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self::with_config(start, attendance_config())
    }

    pub fn with_config(start: DateTime<Utc>, config: AttendanceConfig) -> Self {
        let clock = ManualClock::new(start);
        let credentials = Arc::new(InMemoryCredentials::new());
        let schedules = Arc::new(InMemorySchedules::new());
        let attendance = Arc::new(InMemoryAttendance::new());
        let upstream = UpstreamPolicy::new(config.upstream_timeout);

        let jwt_config = JwtConfig::new(SECRET, 3600, "rollcall").unwrap();
        let tokens = Arc::new(TokenIssuer::new(&jwt_config, clock.clone()));
        let auth = Arc::new(AuthenticationService::new(
            credentials.clone(),
            tokens.clone(),
            upstream,
        ));

        let registry = Arc::new(LessonCodeRegistry::new(&config, clock.clone()));
        let reconciler = Arc::new(AttendanceReconciler::new(
            attendance.clone(),
            upstream,
            &config,
            clock.clone(),
        ));
        let check_in = Arc::new(CheckInService::new(
            schedules.clone(),
            registry,
            reconciler,
            upstream,
            &config,
            clock.clone(),
        ));

        let state = AppState::new(auth.clone(), check_in.clone(), CancellationToken::new());

        Self {
            clock,
            credentials,
            schedules,
            attendance,
            tokens,
            auth,
            check_in,
            state,
        }
    }

    pub fn router(&self) -> Router {
        init_router(self.state.clone())
    }

    pub async fn seed_credential(&self, credential: Credential) {
        assert!(self.credentials.insert(&credential).await.unwrap());
    }

    pub fn bearer(&self, uin: &str, role: Role) -> String {
        let issued = self.tokens.issue(&subject(uin), role).unwrap();
        format!("Bearer {}", issued.token)
    }
}

pub fn json_request(
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(bearer) = bearer {
        builder = builder.header("authorization", bearer);
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(bearer) = bearer {
        builder = builder.header("authorization", bearer);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}
