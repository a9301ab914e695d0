//! Inventory import and pending review.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use acp_db::skills;
use acp_events::{ids, UnitOfWork};

use crate::verify::{package_hash, reason, verify_package, SkillSubmission};

/// Classification counts over one submitted inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub total: i64,
    pub verified: i64,
    pub pending: i64,
    pub quarantined: i64,
}

/// Import one inventory for an agent.
///
/// Idempotent on `(agent, skill_id, version, hash)`: a second identical call
/// inserts nothing and returns the same summary, because the counts are
/// over the submitted packages' classifications, not over inserted rows.
pub async fn import_inventory(
    uow: &mut UnitOfWork,
    agent_id: &str,
    submissions: &[SkillSubmission],
) -> Result<ImportSummary> {
    let workspace_id = uow.ctx().workspace_id.clone();
    let mut summary = ImportSummary::default();

    for submission in submissions {
        let outcome = verify_package(submission);
        let hash = package_hash(submission);

        summary.total += 1;
        match outcome.status() {
            "verified" => summary.verified += 1,
            "pending" => summary.pending += 1,
            _ => summary.quarantined += 1,
        }

        skills::upsert_package(
            uow.conn(),
            &workspace_id,
            agent_id,
            &ids::mint(ids::SKILL_PACKAGE),
            &submission.skill_id,
            &submission.version,
            &hash,
            outcome.status(),
            outcome.reason(),
        )
        .await?;
    }

    uow.append(
        "agent.skills_imported",
        json!({
            "agent_id": agent_id,
            "summary": summary,
        }),
    )
    .await?;

    Ok(summary)
}

/// Review result for the pending re-verification pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReviewSummary {
    pub reviewed: i64,
    pub quarantined: i64,
}

/// Re-verify `pending` inventory entries.
///
/// The stored row has no manifest or signature to re-check; a package that
/// was pending at import time can only be promoted by re-importing it with a
/// signature. Review therefore demotes every pending entry to `quarantined`
/// with `verify_signature_required`.
pub async fn review_pending(uow: &mut UnitOfWork, agent_id: &str) -> Result<ReviewSummary> {
    let workspace_id = uow.ctx().workspace_id.clone();
    let pending = skills::list_pending_for_agent(uow.conn(), &workspace_id, agent_id).await?;

    let mut summary = ReviewSummary::default();
    for row in &pending {
        summary.reviewed += 1;
        let updated = skills::set_verification_status(
            uow.conn(),
            row.id,
            "quarantined",
            Some(reason::VERIFY_SIGNATURE_REQUIRED),
        )
        .await?;
        if updated {
            summary.quarantined += 1;
        }
    }

    uow.append(
        "agent.skills_reviewed",
        json!({
            "agent_id": agent_id,
            "reviewed": summary.reviewed,
            "quarantined": summary.quarantined,
        }),
    )
    .await?;

    Ok(summary)
}
