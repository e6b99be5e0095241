use std::sync::Arc;

use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use rollcall::background::sweeper;
use rollcall::collaborators::UpstreamPolicy;
use rollcall::collaborators::postgres::{PgAttendanceStore, PgCredentialStore, PgScheduleLookup};
use rollcall::logging::init_tracing;
use rollcall::metrics::{init_metrics, metrics_router};
use rollcall::modules::{
    AttendanceReconciler, AuthenticationService, CheckInService, LessonCodeRegistry,
};
use rollcall::router::init_router;
use rollcall::state::AppState;
use rollcall_auth::TokenIssuer;
use rollcall_config::{AttendanceConfig, JwtConfig, ServerConfig};
use rollcall_core::SystemClock;
use rollcall_db::init_db_pool;

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_tracing();

    let jwt_config = JwtConfig::from_env().expect("Invalid JWT configuration");
    let attendance_config = AttendanceConfig::from_env();
    let server_config = ServerConfig::from_env();

    let metrics_handle = init_metrics().expect("Failed to install metrics recorder");
    let db = init_db_pool().await.expect("Failed to connect to database");

    let clock = SystemClock::shared();
    let upstream = UpstreamPolicy::new(attendance_config.upstream_timeout);

    let tokens = Arc::new(TokenIssuer::new(&jwt_config, clock.clone()));
    let auth = Arc::new(AuthenticationService::new(
        Arc::new(PgCredentialStore::new(db.clone())),
        tokens,
        upstream,
    ));

    let registry = Arc::new(LessonCodeRegistry::new(&attendance_config, clock.clone()));
    let reconciler = Arc::new(AttendanceReconciler::new(
        Arc::new(PgAttendanceStore::new(db.clone())),
        upstream,
        &attendance_config,
        clock.clone(),
    ));
    let check_in = Arc::new(CheckInService::new(
        Arc::new(PgScheduleLookup::new(db.clone())),
        registry,
        reconciler,
        upstream,
        &attendance_config,
        clock,
    ));

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(sweeper::run(
        check_in.clone(),
        attendance_config.sweep_interval,
        shutdown.clone(),
    ));

    let state = AppState::new(auth, check_in, shutdown.clone());
    let mut app = init_router(state);
    if let Some(handle) = metrics_handle {
        app = app.merge(metrics_router(handle));
    }

    let listener = tokio::net::TcpListener::bind(&server_config.addr)
        .await
        .expect("Failed to bind listener");
    info!(addr = %server_config.addr, "Server running");

    let signal = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        error!(error = %e, "Sweeper task failed");
    }
    if let Err(e) = served {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
