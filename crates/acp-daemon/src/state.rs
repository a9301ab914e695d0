//! Shared runtime state for acp-daemon.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use acp_config::RuntimeConfig;
use acp_events::Broker;
use acp_worker::RunWorker;

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
pub struct AppState {
    pub pool: PgPool,
    pub broker: Arc<Broker>,
    pub config: RuntimeConfig,
    pub run_worker: Arc<RunWorker>,
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(pool: PgPool, config: RuntimeConfig) -> Self {
        let broker = Arc::new(Broker::new());
        let run_worker = Arc::new(RunWorker::new(
            pool.clone(),
            Arc::clone(&broker),
            config.worker.clone(),
            config.egress.clone(),
            config.learning.clone(),
        ));

        Self {
            pool,
            broker,
            config,
            run_worker,
            build: BuildInfo {
                service: "acp-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}
