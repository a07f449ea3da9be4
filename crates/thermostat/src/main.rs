//! Thermostat server
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Build the handler registry, view and session supervisor
//! 4. Start the clock and reload publishers
//! 5. Serve pages, websocket, health and metrics on one listener
//! 6. Wait for shutdown signal, then drain sessions

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use live_runtime::identity::SessionIdentity;
use live_runtime::observability::{health_router, init_metrics_recorder, HealthState};
use live_runtime::{SessionRuntime, SessionSupervisorHandle};
use thermostat::config::Config;
use thermostat::publishers::{spawn_clock, spawn_reload};
use thermostat::{build_routes, thermostat_registry, AppState, ThermostatView};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Deadline for draining sessions on shutdown.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thermostat=debug,live=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting thermostat");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        static_dir = %config.static_dir.display(),
        clock_interval_ms = config.runtime.clock_interval.as_millis(),
        reload_delay_ms = config.runtime.reload_delay.as_millis(),
        inbox_capacity = config.runtime.inbox_capacity,
        session_cookie_name = %config.runtime.session_cookie_name,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let health_state = Arc::new(HealthState::new());

    let identity = Arc::new(SessionIdentity::from_config(&config.runtime)?);
    let registry = thermostat_registry()?;
    let view = ThermostatView::new()?;
    let runtime = SessionRuntime::from_config(&config.runtime, registry, Arc::new(view));
    let supervisor = SessionSupervisorHandle::new(runtime);
    info!("Session supervisor started");

    // Publishers stop with the supervisor
    let clock = spawn_clock(
        supervisor.hub().clone(),
        config.runtime.clock_interval,
        supervisor.child_token(),
    );
    let reload = spawn_reload(
        supervisor.hub().clone(),
        config.runtime.reload_delay,
        supervisor.child_token(),
    );

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid bind address");
        format!("Invalid bind address: {e}")
    })?;

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );

    let state = AppState {
        supervisor: supervisor.clone(),
        identity,
    };
    let app = build_routes(state, &config.static_dir)
        .merge(health_router(Arc::clone(&health_state)))
        .merge(metrics_router);

    // Bind BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind listener");
        format!("Failed to bind {addr}: {e}")
    })?;

    let server_token = supervisor.child_token();
    let server = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            server_token.cancelled().await;
            info!("HTTP server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "HTTP server failed");
        }
    });

    health_state.mark_serving();
    info!(addr = %addr, "Thermostat running at http://{addr}/thermostat - press Ctrl+C to shutdown");

    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    health_state.mark_draining();

    clock.stop().await;
    reload.stop().await;

    // Closes every session, which ends every websocket, then cancels the
    // root token so the HTTP server stops too
    if let Err(e) = supervisor.shutdown(SHUTDOWN_DEADLINE).await {
        warn!(error = %e, "Session supervisor shutdown error");
    }

    if let Err(e) = server.await {
        warn!(error = %e, "HTTP server task failed");
    }

    info!("Thermostat shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
