//! Post-decision learning pipeline.
//!
//! Runs inside the caller's unit-of-work, so constraints, counters,
//! quarantine markers, and their events commit together with whatever the
//! decision gated.

use anyhow::Result;
use serde_json::json;
use tracing::info;

use acp_config::LearningConfig;
use acp_db::{agents, learning};
use acp_events::{ids, UnitOfWork};
use acp_policy::{Decision, PolicyDecision, PolicyInput};

use crate::redact::redact_value;

/// What one observation did.
#[derive(Debug, Clone, Default)]
pub struct LearningOutcome {
    pub constraint_id: Option<String>,
    pub constraint_seen_count: i64,
    pub mistake_seen_count: i64,
    pub repeated: bool,
    /// Agent quarantined by this observation, when the threshold tripped.
    pub quarantined_agent_id: Option<String>,
}

/// Category for a learned constraint, derived from the action shape.
fn derive_category(action: &str) -> &'static str {
    if action.contains('.') {
        "action"
    } else {
        "general"
    }
}

/// Observe one policy decision. `allow` outcomes are ignored; everything
/// else is redacted, learned, counted, and, for agent actors past the
/// threshold, quarantined.
pub async fn observe_decision(
    uow: &mut UnitOfWork,
    cfg: &LearningConfig,
    input: &PolicyInput,
    decision: &PolicyDecision,
) -> Result<LearningOutcome> {
    if decision.decision == Decision::Allow {
        return Ok(LearningOutcome::default());
    }

    let mut outcome = LearningOutcome::default();
    let reason_code = decision.reason_code.clone();

    // 1. Redact before anything derived from the context is stored.
    let redacted_context = redact_value(&input.context);

    // 2. Category from the action; the pattern is canonical JSON over the
    //    action and the redacted context, so identical failures dedupe and
    //    secrets can only appear as the literal REDACTED.
    let category = derive_category(&input.action);
    let pattern = serde_json::to_string(&json!({
        "action": input.action,
        "context": redacted_context,
    }))?;
    let guidance = format!(
        "Action '{}' resulted in {}; obtain an approval or adjust the request before retrying.",
        input.action,
        decision.decision.as_str(),
    );

    // 3. Upsert the constraint.
    let workspace_id = uow.ctx().workspace_id.clone();
    let constraint = learning::upsert_constraint(
        uow.conn(),
        &workspace_id,
        &ids::mint(ids::CONSTRAINT),
        &reason_code,
        category,
        &pattern,
        &guidance,
    )
    .await?;
    outcome.constraint_seen_count = constraint.seen_count;
    outcome.constraint_id = Some(constraint.constraint_id.clone());

    uow.append(
        "constraint.learned",
        json!({
            "constraint_id": constraint.constraint_id,
            "reason_code": reason_code,
            "category": category,
            "seen_count": constraint.seen_count,
        }),
    )
    .await?;

    // 4. The failure observation itself, redacted.
    uow.append(
        "learning.from_failure",
        json!({
            "action": input.action,
            "reason_code": reason_code,
            "redacted_context": redacted_context,
        }),
    )
    .await?;

    // 5. Mistake counter.
    let actor_key = input.actor_key();
    let seen_count =
        learning::bump_mistake_counter(uow.conn(), &workspace_id, &reason_code, &actor_key).await?;
    outcome.mistake_seen_count = seen_count;

    if seen_count >= 2 {
        outcome.repeated = true;
        uow.append(
            "mistake.repeated",
            json!({
                "repeat_count": seen_count,
                "reason_code": reason_code,
                "actor_key": actor_key,
            }),
        )
        .await?;
    }

    // 6. Auto-quarantine actionable agent actors at the threshold. The row
    //    update is a no-op once quarantined, but each trigger still emits
    //    its event.
    if seen_count >= cfg.quarantine_threshold {
        if let Some(agent) = resolve_agent(uow, input).await? {
            let quarantine_reason = format!("auto_repeated_{reason_code}");
            let record = uow
                .append(
                    "agent.quarantined",
                    json!({
                        "agent_id": agent.agent_id,
                        "mode": "auto",
                        "repeat_count": seen_count,
                        "trigger_reason_code": reason_code,
                    }),
                )
                .await?;
            let transitioned = agents::quarantine_agent(
                uow.conn(),
                &workspace_id,
                &agent.agent_id,
                &quarantine_reason,
                &record.event_id,
            )
            .await?;
            if transitioned {
                info!(agent_id = %agent.agent_id, %reason_code, "agent auto-quarantined");
            }
            outcome.quarantined_agent_id = Some(agent.agent_id);
        }
    }

    Ok(outcome)
}

/// Resolve the acting agent, if the actor is one.
async fn resolve_agent(
    uow: &mut UnitOfWork,
    input: &PolicyInput,
) -> Result<Option<agents::AgentRow>> {
    let workspace_id = uow.ctx().workspace_id.clone();

    if input.actor_type == "agent" {
        if let Some(agent) = agents::fetch_agent(uow.conn(), &workspace_id, &input.actor_id).await? {
            return Ok(Some(agent));
        }
    }
    if let Some(principal_id) = &input.principal_id {
        return agents::fetch_agent_by_principal(uow.conn(), &workspace_id, principal_id).await;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::derive_category;

    #[test]
    fn dotted_actions_are_action_category() {
        assert_eq!(derive_category("external.write"), "action");
        assert_eq!(derive_category("internal.read"), "action");
        assert_eq!(derive_category("adhoc"), "general");
    }
}
