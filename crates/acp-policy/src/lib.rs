//! Policy evaluation.
//!
//! [`evaluate`] is a pure function over the input and a point-in-time
//! [`PolicySnapshot`] and never writes. Snapshot loading (kill-switch env,
//! active approvals) lives in [`snapshot`]; everything downstream of a
//! decision (learned constraints, counters, quarantine) is a separate
//! post-decision pipeline.

pub mod snapshot;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use acp_config::EnforcementMode;

/// Actions with built-in rules.
pub const ACTION_EXTERNAL_WRITE: &str = "external.write";

/// Reason codes carried on every decision.
pub mod reason {
    pub const KILL_SWITCH_ACTIVE: &str = "kill_switch_active";
    pub const APPROVAL_ALLOWS_ACTION: &str = "approval_allows_action";
    pub const EXTERNAL_WRITE_REQUIRES_APPROVAL: &str = "external_write_requires_approval";
    pub const DEFAULT_ALLOW: &str = "default_allow";
    pub const EGRESS_RATE_LIMIT_EXCEEDED: &str = "egress_rate_limit_exceeded";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
    RequireApproval,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Deny => "deny",
            Decision::RequireApproval => "require_approval",
        }
    }
}

/// One evaluation request.
#[derive(Debug, Clone)]
pub struct PolicyInput {
    pub action: String,
    pub actor_type: String,
    pub actor_id: String,
    pub principal_id: Option<String>,
    pub room_id: Option<String>,
    pub target_url: Option<String>,
    pub context: Value,
}

impl PolicyInput {
    /// Stable key for per-actor mistake counting: the principal when known,
    /// else the legacy actor pair.
    pub fn actor_key(&self) -> String {
        match &self.principal_id {
            Some(p) => p.clone(),
            None => format!("{}:{}", self.actor_type, self.actor_id),
        }
    }
}

/// One approved approval, reduced to what scope matching needs.
#[derive(Debug, Clone)]
pub struct ApprovalGrant {
    pub approval_id: String,
    pub action: String,
    pub scope_type: String,
    pub room_id: Option<String>,
}

impl ApprovalGrant {
    fn matches(&self, input: &PolicyInput) -> bool {
        if self.action != input.action {
            return false;
        }
        match self.scope_type.as_str() {
            "workspace" => true,
            "room" => self.room_id.is_some() && self.room_id == input.room_id,
            _ => false,
        }
    }
}

/// Point-in-time inputs the evaluator reads.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    pub kill_switch_external_write: bool,
    pub enforcement_mode: EnforcementMode,
    pub approvals: Vec<ApprovalGrant>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyDecision {
    pub decision: Decision,
    pub reason_code: String,
    /// The approval that granted `allow`, when one matched.
    pub approval_id: Option<String>,
    /// False when the enforcement mode downgrades decisions to advisory.
    pub enforced: bool,
}

impl PolicyDecision {
    /// Whether callers must actually stop the action: a non-allow decision
    /// under an enforcing mode. Advisory mode still records the decision.
    pub fn is_blocking(&self) -> bool {
        self.enforced && self.decision != Decision::Allow
    }
}

/// Evaluate one action. First match wins:
/// kill switch -> active approval -> action rules -> default allow.
pub fn evaluate(input: &PolicyInput, snapshot: &PolicySnapshot) -> PolicyDecision {
    let enforced = snapshot.enforcement_mode.is_enforcing();

    if snapshot.kill_switch_external_write && input.action == ACTION_EXTERNAL_WRITE {
        return PolicyDecision {
            decision: Decision::Deny,
            reason_code: reason::KILL_SWITCH_ACTIVE.to_string(),
            approval_id: None,
            enforced,
        };
    }

    if let Some(grant) = snapshot.approvals.iter().find(|g| g.matches(input)) {
        return PolicyDecision {
            decision: Decision::Allow,
            reason_code: reason::APPROVAL_ALLOWS_ACTION.to_string(),
            approval_id: Some(grant.approval_id.clone()),
            enforced,
        };
    }

    if input.action == ACTION_EXTERNAL_WRITE {
        return PolicyDecision {
            decision: Decision::RequireApproval,
            reason_code: reason::EXTERNAL_WRITE_REQUIRES_APPROVAL.to_string(),
            approval_id: None,
            enforced,
        };
    }

    PolicyDecision {
        decision: Decision::Allow,
        reason_code: reason::DEFAULT_ALLOW.to_string(),
        approval_id: None,
        enforced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(action: &str, room_id: Option<&str>) -> PolicyInput {
        PolicyInput {
            action: action.to_string(),
            actor_type: "user".into(),
            actor_id: "ceo".into(),
            principal_id: None,
            room_id: room_id.map(str::to_string),
            target_url: None,
            context: json!({}),
        }
    }

    fn snapshot(kill_switch: bool, approvals: Vec<ApprovalGrant>) -> PolicySnapshot {
        PolicySnapshot {
            kill_switch_external_write: kill_switch,
            enforcement_mode: EnforcementMode::Enforce,
            approvals,
        }
    }

    fn room_grant(room_id: &str) -> ApprovalGrant {
        ApprovalGrant {
            approval_id: "apr_1".into(),
            action: ACTION_EXTERNAL_WRITE.into(),
            scope_type: "room".into(),
            room_id: Some(room_id.to_string()),
        }
    }

    #[test]
    fn external_write_without_approval_requires_approval() {
        let d = evaluate(&input(ACTION_EXTERNAL_WRITE, Some("rm_1")), &snapshot(false, vec![]));
        assert_eq!(d.decision, Decision::RequireApproval);
        assert_eq!(d.reason_code, reason::EXTERNAL_WRITE_REQUIRES_APPROVAL);
        assert!(d.is_blocking());
    }

    #[test]
    fn matching_room_approval_allows() {
        let d = evaluate(
            &input(ACTION_EXTERNAL_WRITE, Some("rm_1")),
            &snapshot(false, vec![room_grant("rm_1")]),
        );
        assert_eq!(d.decision, Decision::Allow);
        assert_eq!(d.reason_code, reason::APPROVAL_ALLOWS_ACTION);
        assert_eq!(d.approval_id.as_deref(), Some("apr_1"));
    }

    #[test]
    fn approval_for_other_room_does_not_match() {
        let d = evaluate(
            &input(ACTION_EXTERNAL_WRITE, Some("rm_2")),
            &snapshot(false, vec![room_grant("rm_1")]),
        );
        assert_eq!(d.decision, Decision::RequireApproval);
    }

    #[test]
    fn kill_switch_wins_over_approval() {
        let d = evaluate(
            &input(ACTION_EXTERNAL_WRITE, Some("rm_1")),
            &snapshot(true, vec![room_grant("rm_1")]),
        );
        assert_eq!(d.decision, Decision::Deny);
        assert_eq!(d.reason_code, reason::KILL_SWITCH_ACTIVE);
    }

    #[test]
    fn kill_switch_leaves_other_actions_alone() {
        let d = evaluate(&input("internal.read", None), &snapshot(true, vec![]));
        assert_eq!(d.decision, Decision::Allow);
        assert_eq!(d.reason_code, reason::DEFAULT_ALLOW);
    }

    #[test]
    fn advisory_mode_computes_but_does_not_block() {
        let mut snap = snapshot(false, vec![]);
        snap.enforcement_mode = EnforcementMode::Advisory;
        let d = evaluate(&input(ACTION_EXTERNAL_WRITE, None), &snap);
        assert_eq!(d.decision, Decision::RequireApproval);
        assert!(!d.is_blocking(), "advisory decisions must not block");
    }

    #[test]
    fn actor_key_prefers_principal() {
        let mut i = input("internal.read", None);
        assert_eq!(i.actor_key(), "user:ceo");
        i.principal_id = Some("prn_1".into());
        assert_eq!(i.actor_key(), "prn_1");
    }
}
