//! acp-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, connects the pool,
//! runs migrations, spawns the background loops, and starts the HTTP
//! server. All route handlers live in `routes/`; shared state in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tokio::sync::watch;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use acp_config::RuntimeConfig;
use acp_daemon::{routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let config = RuntimeConfig::from_env()?;
    let pool = acp_db::connect_from_env().await?;
    acp_db::migrate(&pool).await?;

    let shared = Arc::new(AppState::new(pool, config));

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(Arc::clone(&shared.run_worker).run_loop(stop_rx.clone()));
    spawn_snapshot_loop(Arc::clone(&shared), stop_rx);

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = shared
        .config
        .daemon_addr
        .as_deref()
        .and_then(|a| a.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8790)));
    info!("acp-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal(stop_tx))
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

async fn shutdown_signal(stop_tx: watch::Sender<bool>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
    let _ = stop_tx.send(true);
}

/// Hourly pass: one daily snapshot per workspace that has agents. The job
/// is idempotent per (workspace, agent, date), so re-running within a day
/// writes nothing.
fn spawn_snapshot_loop(shared: Arc<AppState>, mut stop: watch::Receiver<bool>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(3600));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let today = chrono::Utc::now().date_naive();
                    let workspaces = match acp_db::agents::list_workspace_ids(&shared.pool).await {
                        Ok(list) => list,
                        Err(err) => {
                            warn!(error = %err, "snapshot loop: workspace enumeration failed");
                            continue;
                        }
                    };
                    for workspace_id in workspaces {
                        if let Err(err) = acp_worker::run_daily_snapshot(
                            &shared.pool,
                            &shared.broker,
                            &workspace_id,
                            today,
                        )
                        .await
                        {
                            warn!(%workspace_id, error = %err, "daily snapshot failed");
                        }
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        return;
                    }
                }
            }
        }
    });
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
