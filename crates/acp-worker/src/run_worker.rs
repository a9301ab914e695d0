//! Run worker.
//!
//! Claims queued runs with the database as the lease authority and executes
//! each run's declared runtime action through the egress controller. At most
//! one worker processes a given run: the claim is a `FOR UPDATE SKIP LOCKED`
//! update to `running` with a lease, and expired leases are swept back to
//! `queued` at the start of each cycle.

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use acp_config::{EgressConfig, LearningConfig, WorkerConfig};
use acp_db::runs::{self, RunRow, RunStatus};
use acp_egress::{request_egress, target_domain, EgressRequest};
use acp_events::log::append_event;
use acp_events::{Broker, EventContext, EventFrame, UnitOfWork};
use acp_policy::Decision;

/// Tally of one worker cycle.
///
/// `completed` counts runs whose declared action executed and was allowed;
/// `skipped` counts runs with no runtime descriptor (completed as succeeded
/// with empty output); `failed` counts runs whose action was blocked or
/// whose descriptor was unusable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CycleResult {
    pub claimed: i64,
    pub completed: i64,
    pub failed: i64,
    pub skipped: i64,
}

pub struct RunWorker {
    pool: sqlx::PgPool,
    broker: Arc<Broker>,
    worker_id: String,
    worker_cfg: WorkerConfig,
    egress_cfg: EgressConfig,
    learning_cfg: LearningConfig,
}

impl RunWorker {
    pub fn new(
        pool: sqlx::PgPool,
        broker: Arc<Broker>,
        worker_cfg: WorkerConfig,
        egress_cfg: EgressConfig,
        learning_cfg: LearningConfig,
    ) -> Self {
        Self {
            pool,
            broker,
            worker_id: format!("worker_{}", Uuid::new_v4().simple()),
            worker_cfg,
            egress_cfg,
            learning_cfg,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// One cycle: sweep stale leases, then claim and execute up to
    /// `batch_limit` queued runs.
    pub async fn run_cycle(&self, batch_limit: i64) -> Result<CycleResult> {
        {
            let mut conn = self.pool.acquire().await?;
            let reclaimed = runs::reclaim_stale_leases(&mut conn).await?;
            if !reclaimed.is_empty() {
                warn!(count = reclaimed.len(), "reclaimed stale run leases");
            }
        }

        let mut result = CycleResult::default();
        let claimed = self.claim_batch(batch_limit).await?;
        result.claimed = claimed.len() as i64;

        for run in claimed {
            match self.execute_run(&run).await? {
                RunOutcome::Completed => result.completed += 1,
                RunOutcome::Skipped => result.skipped += 1,
                RunOutcome::Failed => result.failed += 1,
            }
        }

        Ok(result)
    }

    /// Periodic loop: a cycle per tick, finishing the in-flight cycle before
    /// honoring the stop signal.
    pub async fn run_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(self.worker_cfg.interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_cycle(10).await {
                        warn!(error = %err, "run worker cycle failed");
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!(worker_id = %self.worker_id, "run worker stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Claim up to `batch_limit` queued runs in one transaction, emitting
    /// `run.started` per claim. Each event carries its run's correlation and
    /// is caused by the run's previous event (its create event for a fresh
    /// run). Frames publish only after the claim commits.
    async fn claim_batch(&self, batch_limit: i64) -> Result<Vec<RunRow>> {
        let mut tx = self.pool.begin().await?;
        let mut claimed = Vec::new();
        let mut frames: Vec<EventFrame> = Vec::new();

        for _ in 0..batch_limit {
            let Some(run) =
                runs::claim_one_queued(&mut tx, &self.worker_id, self.worker_cfg.lease_ttl_secs)
                    .await?
            else {
                break;
            };

            let mut ctx = EventContext::new(&run.workspace_id)
                .for_run(&run.run_id, &run.correlation_id)
                .caused_by(run.last_event_id.clone());
            if let Some(room_id) = &run.room_id {
                ctx = ctx.in_room(room_id.clone());
            }

            let record = append_event(
                &mut tx,
                &mut ctx,
                "run.started",
                json!({
                    "run_id": run.run_id,
                    "worker_id": self.worker_id,
                }),
            )
            .await?;
            runs::touch_last_event(&mut tx, &run.run_id, &record.event_id).await?;

            frames.push(EventFrame::from(&record));
            claimed.push(run);
        }

        tx.commit().await?;
        for frame in &frames {
            self.broker.publish(frame);
        }
        Ok(claimed)
    }

    /// Execute one claimed run inside one unit-of-work: tool call, egress
    /// adjudication, terminal transition, and every event commit together.
    async fn execute_run(&self, run: &RunRow) -> Result<RunOutcome> {
        let mut ctx = EventContext::new(&run.workspace_id)
            .for_run(&run.run_id, &run.correlation_id)
            .caused_by(run.last_event_id.clone());
        if let Some(room_id) = &run.room_id {
            ctx = ctx.in_room(room_id.clone());
        }
        let mut uow = UnitOfWork::begin(&self.pool, ctx).await?;

        // Causation chains off the run.started event just committed.
        let current = runs::fetch_run(uow.conn(), &run.workspace_id, &run.run_id).await?;
        if let Some(current) = current {
            uow.ctx_mut().parent_event_id = current.last_event_id;
        }

        let descriptor = run.input.pointer("/runtime/egress").cloned();
        let outcome = match descriptor {
            None => {
                self.finish_run(&mut uow, run, RunStatus::Succeeded, Some(json!({})), None)
                    .await?;
                RunOutcome::Skipped
            }
            Some(descriptor) => self.execute_egress(&mut uow, run, &descriptor).await?,
        };

        uow.commit(&self.broker).await?;
        Ok(outcome)
    }

    async fn execute_egress(
        &self,
        uow: &mut UnitOfWork,
        run: &RunRow,
        descriptor: &Value,
    ) -> Result<RunOutcome> {
        let action = descriptor.get("action").and_then(Value::as_str);
        let target_url = descriptor.get("target_url").and_then(Value::as_str);
        let method = descriptor.get("method").and_then(Value::as_str).unwrap_or("GET");

        let (Some(action), Some(target_url)) = (action, target_url) else {
            self.finish_run(
                uow,
                run,
                RunStatus::Failed,
                None,
                Some("invalid_egress_descriptor"),
            )
            .await?;
            return Ok(RunOutcome::Failed);
        };

        if target_domain(target_url).is_err() {
            self.finish_run(
                uow,
                run,
                RunStatus::Failed,
                None,
                Some("invalid_egress_descriptor"),
            )
            .await?;
            return Ok(RunOutcome::Failed);
        }

        let tool_call_id = runs::insert_tool_call(
            uow.conn(),
            &run.workspace_id,
            &run.run_id,
            "egress.request",
            descriptor,
        )
        .await?;

        let egress = request_egress(
            uow,
            &self.egress_cfg,
            &self.learning_cfg,
            &EgressRequest {
                action: action.to_string(),
                target_url: target_url.to_string(),
                method: method.to_string(),
                run_id: Some(run.run_id.clone()),
                actor_type: run.created_by_type.clone(),
                actor_id: run.created_by_id.clone(),
                principal_id: None,
                room_id: run.room_id.clone(),
                context: json!({}),
            },
        )
        .await?;

        if egress.decision == Decision::Allow {
            let output = json!({
                "egress_id": egress.egress_id,
                "decision": egress.decision.as_str(),
                "target_domain": egress.target_domain,
            });
            runs::complete_tool_call(uow.conn(), tool_call_id, "succeeded", Some(&output), None)
                .await?;
            self.finish_run(uow, run, RunStatus::Succeeded, Some(output), None)
                .await?;
            Ok(RunOutcome::Completed)
        } else {
            runs::complete_tool_call(
                uow.conn(),
                tool_call_id,
                "failed",
                None,
                Some(&egress.reason_code),
            )
            .await?;
            self.finish_run(uow, run, RunStatus::Failed, None, Some(&egress.reason_code))
                .await?;
            Ok(RunOutcome::Failed)
        }
    }

    /// Terminal transition plus its event. `complete_run` only moves a
    /// `running` row, so a concurrently-finished run mutates nothing here.
    async fn finish_run(
        &self,
        uow: &mut UnitOfWork,
        run: &RunRow,
        status: RunStatus,
        output: Option<Value>,
        error_reason_code: Option<&str>,
    ) -> Result<()> {
        let event_type = match status {
            RunStatus::Succeeded => "run.succeeded",
            _ => "run.failed",
        };
        let record = uow
            .append(
                event_type,
                json!({
                    "run_id": run.run_id,
                    "status": status.as_str(),
                    "reason_code": error_reason_code,
                }),
            )
            .await?;
        runs::complete_run(
            uow.conn(),
            &run.workspace_id,
            &run.run_id,
            status,
            output.as_ref(),
            error_reason_code,
            &record.event_id,
        )
        .await?;
        Ok(())
    }
}

enum RunOutcome {
    Completed,
    Skipped,
    Failed,
}
