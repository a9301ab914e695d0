//! Egress controller.
//!
//! Every outbound request is checked here before anything leaves the
//! workspace: policy first, then the per-domain hourly budget. The decision,
//! the ledger row, and the emitted events all ride the caller's
//! unit-of-work, so a rolled-back caller leaves no trace of the attempt.

use anyhow::{anyhow, Result};
use serde_json::json;
use tracing::info;
use url::Url;

use acp_config::{EgressConfig, LearningConfig};
use acp_db::{approvals, egress};
use acp_events::{ids, UnitOfWork};
use acp_learning::{observe_decision, redact_value};
use acp_policy::{evaluate, reason, snapshot::load_snapshot, Decision, PolicyInput};

/// One outbound request to adjudicate.
#[derive(Debug, Clone)]
pub struct EgressRequest {
    pub action: String,
    pub target_url: String,
    pub method: String,
    pub run_id: Option<String>,
    pub actor_type: String,
    pub actor_id: String,
    pub principal_id: Option<String>,
    pub room_id: Option<String>,
    pub context: serde_json::Value,
}

/// The adjudication result surfaced to callers.
#[derive(Debug, Clone)]
pub struct EgressOutcome {
    pub decision: Decision,
    pub reason_code: String,
    pub blocked: bool,
    pub egress_id: i64,
    pub target_domain: String,
    pub approval_id: Option<String>,
}

/// Extract the domain from a target URL.
pub fn target_domain(target_url: &str) -> Result<String> {
    let parsed = Url::parse(target_url).map_err(|e| anyhow!("invalid target_url: {e}"))?;
    parsed
        .host_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("target_url has no host"))
}

/// Adjudicate one egress request inside the caller's unit-of-work.
///
/// Emits `egress.requested`, `policy.evaluated`, the learning-pipeline
/// events on failure outcomes, and exactly one of
/// `egress.allowed | egress.blocked | egress.rate_limited`; persists the
/// `sec_egress_requests` ledger row.
pub async fn request_egress(
    uow: &mut UnitOfWork,
    egress_cfg: &EgressConfig,
    learning_cfg: &LearningConfig,
    req: &EgressRequest,
) -> Result<EgressOutcome> {
    let domain = target_domain(&req.target_url)?;
    let workspace_id = uow.ctx().workspace_id.clone();

    uow.append(
        "egress.requested",
        json!({
            "target_url": req.target_url,
            "target_domain": domain,
            "method": req.method,
            "action": req.action,
            "run_id": req.run_id,
        }),
    )
    .await?;

    let input = PolicyInput {
        action: req.action.clone(),
        actor_type: req.actor_type.clone(),
        actor_id: req.actor_id.clone(),
        principal_id: req.principal_id.clone(),
        room_id: req.room_id.clone(),
        target_url: Some(req.target_url.clone()),
        context: json!({
            "target_url": req.target_url,
            "target_domain": domain,
            "method": req.method,
            "extra": req.context,
        }),
    };

    let snapshot = load_snapshot(uow.conn(), &workspace_id, &input.action).await?;
    let decision = evaluate(&input, &snapshot);

    uow.append(
        "policy.evaluated",
        json!({
            "action": input.action,
            "actor_type": input.actor_type,
            "actor_id": input.actor_id,
            "decision": decision.decision.as_str(),
            "reason_code": decision.reason_code,
            "enforced": decision.enforced,
            "target_domain": domain,
        }),
    )
    .await?;

    // Failure outcomes feed the learning loop before the ledger row lands,
    // all inside the same transaction.
    observe_decision(uow, learning_cfg, &input, &decision).await?;

    // An approval-requiring request gets a pending approval created and
    // linked, so an operator can flip exactly this action class.
    let mut linked_approval = decision.approval_id.clone();
    if decision.decision == Decision::RequireApproval {
        let approval_id = ids::mint(ids::APPROVAL);
        let scope = match &req.room_id {
            Some(room_id) => json!({"type": "room", "room_id": room_id}),
            None => json!({"type": "workspace"}),
        };
        let context = redact_value(&json!({
            "target_url": req.target_url,
            "target_domain": domain,
            "method": req.method,
        }));
        let record = uow
            .append(
                "approval.created",
                json!({
                    "approval_id": approval_id,
                    "action": req.action,
                    "scope": scope,
                }),
            )
            .await?;
        approvals::insert_approval(
            uow.conn(),
            &workspace_id,
            &approval_id,
            &req.action,
            &scope,
            &context,
            &record.event_id,
        )
        .await?;
        linked_approval = Some(approval_id);
    }

    // Policy allowed: spend the hourly budget. The bucket is fixed, keyed
    // (workspace, domain, hour); the post-increment count decides.
    let (final_decision, final_reason, blocked, event_type) = if decision.decision
        == Decision::Allow
    {
        let count = egress::bump_rate_counter(uow.conn(), &workspace_id, &domain).await?;
        if count > egress_cfg.max_requests_per_hour {
            (
                Decision::Deny,
                reason::EGRESS_RATE_LIMIT_EXCEEDED.to_string(),
                true,
                "egress.rate_limited",
            )
        } else {
            (
                Decision::Allow,
                decision.reason_code.clone(),
                false,
                "egress.allowed",
            )
        }
    } else {
        (
            decision.decision,
            decision.reason_code.clone(),
            true,
            "egress.blocked",
        )
    };

    let egress_id = egress::insert_request(
        uow.conn(),
        &workspace_id,
        req.run_id.as_deref(),
        &req.target_url,
        &domain,
        &req.method,
        decision.decision.as_str(),
        blocked,
        linked_approval.as_deref(),
        Some(final_reason.as_str()),
    )
    .await?;

    uow.append(
        event_type,
        json!({
            "egress_id": egress_id,
            "decision": final_decision.as_str(),
            "reason_code": final_reason,
            "target_domain": domain,
            "run_id": req.run_id,
        }),
    )
    .await?;

    if blocked {
        info!(%domain, reason_code = %final_reason, "egress blocked");
    }

    Ok(EgressOutcome {
        decision: final_decision,
        reason_code: final_reason,
        blocked,
        egress_id,
        target_domain: domain,
        approval_id: linked_approval,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_extraction() {
        assert_eq!(target_domain("https://example.com/").unwrap(), "example.com");
        assert_eq!(
            target_domain("https://example.net/submit?x=1").unwrap(),
            "example.net"
        );
        assert!(target_domain("not a url").is_err());
        assert!(target_domain("mailto:ops@example.com").is_err());
    }
}
