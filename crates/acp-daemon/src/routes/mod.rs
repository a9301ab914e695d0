//! Axum router and all HTTP handlers for acp-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub mod agents;
pub mod approvals;
pub mod egress;
pub mod evaluation;
pub mod policy;
pub mod principals;
pub mod rooms;
pub mod runs;
pub mod system;
pub mod workers;

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(system::health))
        .route("/v1/status", get(system::status))
        .route("/v1/principals/legacy/ensure", post(principals::ensure))
        .route("/v1/agents", post(agents::register))
        .route("/v1/agents/:id/skills/import", post(agents::skills_import))
        .route(
            "/v1/agents/:id/skills/review-pending",
            post(agents::skills_review_pending),
        )
        .route("/v1/agents/:id/snapshots", get(agents::snapshots))
        .route(
            "/v1/agents/:id/quarantine/lift",
            post(agents::quarantine_lift),
        )
        .route("/v1/rooms", post(rooms::create_room))
        .route("/v1/rooms/:id", get(rooms::get_room))
        .route("/v1/rooms/:id/threads", post(rooms::create_thread))
        .route("/v1/threads/:id/messages", post(rooms::create_message))
        .route("/v1/runs", post(runs::create_run))
        .route("/v1/runs/:id", get(runs::get_run))
        .route("/v1/runs/:id/start", post(runs::start_run))
        .route("/v1/runs/:id/complete", post(runs::complete_run))
        .route("/v1/runs/:id/cancel", post(runs::cancel_run))
        .route("/v1/runs/:id/steps", post(runs::create_step))
        .route("/v1/steps/:id/artifacts", post(runs::create_artifact))
        .route("/v1/artifacts", get(runs::list_artifacts))
        .route("/v1/artifacts/:id", get(runs::get_artifact))
        .route("/v1/policy/evaluate", post(policy::evaluate_policy))
        .route("/v1/approvals", post(approvals::create))
        .route("/v1/approvals/:id", get(approvals::get_approval))
        .route("/v1/approvals/:id/decide", post(approvals::decide))
        .route("/v1/egress/requests", post(egress::request))
        .route("/v1/scorecards", post(evaluation::create_scorecard))
        .route("/v1/scorecards/:id", get(evaluation::get_scorecard))
        .route("/v1/lessons", post(evaluation::create_lesson))
        .route("/v1/constraints", get(evaluation::list_constraints))
        .route("/v1/workers/runs/cycle", post(workers::run_cycle))
        .route("/v1/jobs/daily-snapshot", post(workers::daily_snapshot))
        .route("/v1/streams/rooms/:room_id", get(crate::stream::stream_room))
        .with_state(state)
}
