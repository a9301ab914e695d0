//! Snapshot loading for the evaluator.
//!
//! Read-only: kill-switch and enforcement flags come from the environment
//! (re-read per evaluation so a flipped kill switch binds on the next
//! decision), approvals from `proj_approvals`.

use anyhow::Result;
use sqlx::PgConnection;

use acp_config::PolicyEnv;

use crate::{ApprovalGrant, PolicySnapshot};

/// Build the evaluator's snapshot for `(workspace, action)`.
pub async fn load_snapshot(
    conn: &mut PgConnection,
    workspace_id: &str,
    action: &str,
) -> Result<PolicySnapshot> {
    let env = PolicyEnv::current();

    let approvals = acp_db::approvals::active_approvals(conn, workspace_id, action)
        .await?
        .into_iter()
        .map(|row| {
            let scope_type = row
                .scope
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or("workspace")
                .to_string();
            let room_id = row
                .scope
                .get("room_id")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            ApprovalGrant {
                approval_id: row.approval_id,
                action: row.action,
                scope_type,
                room_id,
            }
        })
        .collect();

    Ok(PolicySnapshot {
        kill_switch_external_write: env.kill_switch_external_write,
        enforcement_mode: env.enforcement_mode,
        approvals,
    })
}
