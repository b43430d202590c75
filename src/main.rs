//! Questline Back binary entrypoint wiring REST, WebSocket, SSE, and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dao;
mod dto;
mod error;
mod routes;
mod services;
mod state;

use config::AppConfig;
use dao::quest_store::memory::MemoryQuestStore;
use services::scheduler;
use state::{AppState, SharedState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_config = AppConfig::load();
    let app_state = AppState::new(app_config);

    bootstrap_store(app_state.clone()).await;

    // The reconciler rebuilds expiration timers from durable state shortly
    // after boot, then keeps running as the fallback for missed timers.
    tokio::spawn(scheduler::run_reconciler(app_state.clone()));

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Select and install the storage backend.
///
/// With `MONGO_URI` set (and the `mongo-store` feature compiled in), a
/// supervisor task owns the connection and toggles degraded mode as
/// connectivity changes. Otherwise the in-memory store serves small events
/// and local development.
async fn bootstrap_store(state: SharedState) {
    #[cfg(feature = "mongo-store")]
    {
        use crate::dao::quest_store::QuestStore;
        use crate::dao::quest_store::mongodb::{MongoConfig, MongoQuestStore};
        use crate::services::storage_supervisor;

        if let Ok(uri) = env::var("MONGO_URI") {
            let db_name = env::var("MONGO_DB").ok();
            tokio::spawn(storage_supervisor::run(state, move || {
                let uri = uri.clone();
                let db_name = db_name.clone();
                async move {
                    let mongo_config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
                    let store = MongoQuestStore::connect(mongo_config).await?;
                    Ok(Arc::new(store) as Arc<dyn QuestStore>)
                }
            }));
            return;
        }
    }

    info!("MONGO_URI not set; using the in-memory quest store");
    state
        .install_quest_store(Arc::new(MemoryQuestStore::new()))
        .await;
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
