//! Driftmere Engine - authoritative server for the grid-tile world.
//!
//! The engine serves clients over WebSocket, runs the NPC cycle worker,
//! and reaches durable state only through the repository ports. This
//! binary wires the ephemeral in-process adapter; deployments that attach
//! the relational collaborator swap it at this seam.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use driftmere_engine::api::connections::SessionRegistry;
use driftmere_engine::api::websocket::{ws_handler, WsState};
use driftmere_engine::app::App;
use driftmere_engine::config::AppConfig;
use driftmere_engine::cycle::run_npc_cycle_worker;
use driftmere_engine::infrastructure::clock::{SystemClock, SystemRandom};
use driftmere_engine::infrastructure::memory::MemoryWorld;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "driftmere_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Driftmere Engine");

    let config = AppConfig::from_env()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Database: {}", config.database_url);
    tracing::info!("  Base URL: {}", config.base_url);

    // The durable store is an external collaborator behind the repository
    // ports; this binary runs with the volatile adapter until one is
    // attached.
    tracing::warn!("Running with the ephemeral repository adapter; world state is volatile");
    let world = MemoryWorld::new();
    let repos = MemoryWorld::repositories(&world);

    let app = Arc::new(
        App::new(
            repos,
            Arc::new(SystemClock::new()),
            Arc::new(SystemRandom::new()),
            config.clone(),
        )
        .await,
    );
    let state = WsState {
        app: app.clone(),
        registry: Arc::new(SessionRegistry::new()),
    };
    tracing::info!("Application state initialized");

    // Background NPC cycle worker (harvest completion, cooldowns).
    let cycle_worker = {
        let state = state.clone();
        tokio::spawn(async move {
            tracing::info!("Starting NPC cycle worker");
            run_npc_cycle_worker(state).await;
        })
    };

    let router = Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, router);

    // Run until ctrl-c or an accepted restartServer command.
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
        _ = app.shutdown.notified() => {
            tracing::info!("Restart requested; shutting down");
        }
    }

    cycle_worker.abort();
    tracing::info!("Workers stopped");
    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}
