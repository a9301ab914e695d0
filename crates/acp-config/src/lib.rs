//! Runtime configuration for the control plane.
//!
//! This module is the single source of truth for environment resolution.
//!
//! # Contract
//! - Callers invoke [`RuntimeConfig::from_env`] once at startup and pass the
//!   result into constructors; never scatter `std::env::var` calls across the
//!   codebase.
//! - Error messages reference the env var NAME, never its value.
//! - The two policy flags are the one deliberate exception: they are re-read
//!   per evaluation via [`PolicyEnv::current`], because the kill switch must
//!   take effect on the next decision without a process restart.

use anyhow::{Context, Result};

/// Postgres connection string.
pub const ENV_DB_URL: &str = "DATABASE_URL";
/// "1" (or "true") denies all `external.write` actions.
pub const ENV_KILL_SWITCH_EXTERNAL_WRITE: &str = "POLICY_KILL_SWITCH_EXTERNAL_WRITE";
/// Anything other than "enforce" downgrades decisions to advisory.
pub const ENV_ENFORCEMENT_MODE: &str = "POLICY_ENFORCEMENT_MODE";
/// Per-(workspace, domain) hourly egress budget.
pub const ENV_EGRESS_MAX_PER_HOUR: &str = "EGRESS_MAX_REQUESTS_PER_HOUR";
/// "1" (or "true") enables the promotion loop on scorecard submission.
pub const ENV_PROMOTION_LOOP_ENABLED: &str = "PROMOTION_LOOP_ENABLED";
/// Daemon bind address, e.g. "127.0.0.1:8790".
pub const ENV_DAEMON_ADDR: &str = "ACP_DAEMON_ADDR";
/// Seconds between background run-worker cycles.
pub const ENV_WORKER_INTERVAL_SECS: &str = "ACP_WORKER_INTERVAL_SECS";
/// Seconds a claimed run lease stays valid before the stale sweep reclaims it.
pub const ENV_WORKER_LEASE_TTL_SECS: &str = "ACP_WORKER_LEASE_TTL_SECS";
/// Repeated-mistake count at which an agent is auto-quarantined.
pub const ENV_QUARANTINE_THRESHOLD: &str = "ACP_QUARANTINE_THRESHOLD";

/// How policy decisions are applied by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementMode {
    /// Decisions are binding: `require_approval` and `deny` block the action.
    Enforce,
    /// Decisions are computed and recorded but callers treat
    /// `require_approval` as advisory.
    Advisory,
}

impl EnforcementMode {
    /// Unset or "enforce" -> [`EnforcementMode::Enforce`]; any other value is
    /// an explicit advisory opt-out.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => EnforcementMode::Enforce,
            Some(v) if v.trim().eq_ignore_ascii_case("enforce") || v.trim().is_empty() => {
                EnforcementMode::Enforce
            }
            Some(_) => EnforcementMode::Advisory,
        }
    }

    pub fn is_enforcing(&self) -> bool {
        matches!(self, EnforcementMode::Enforce)
    }
}

/// Policy flags re-read on every snapshot build.
#[derive(Debug, Clone, Copy)]
pub struct PolicyEnv {
    pub kill_switch_external_write: bool,
    pub enforcement_mode: EnforcementMode,
}

impl PolicyEnv {
    /// Read the current flag values from the environment.
    pub fn current() -> Self {
        Self {
            kill_switch_external_write: env_flag(ENV_KILL_SWITCH_EXTERNAL_WRITE),
            enforcement_mode: EnforcementMode::parse(
                std::env::var(ENV_ENFORCEMENT_MODE).ok().as_deref(),
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EgressConfig {
    /// Fixed 1-hour-bucket budget per (workspace, target_domain).
    pub max_requests_per_hour: i64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub interval_secs: u64,
    pub lease_ttl_secs: i64,
}

#[derive(Debug, Clone)]
pub struct LearningConfig {
    /// Mistake-counter value at which an agent actor is quarantined.
    pub quarantine_threshold: i64,
}

#[derive(Debug, Clone)]
pub struct PromotionConfig {
    pub loop_enabled: bool,
}

/// Everything resolved at startup. Pass to constructors; do not re-read env.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub database_url: String,
    pub daemon_addr: Option<String>,
    pub egress: EgressConfig,
    pub worker: WorkerConfig,
    pub learning: LearningConfig,
    pub promotion: PromotionConfig,
}

impl RuntimeConfig {
    /// Resolve the full env surface.
    ///
    /// # Errors
    /// Only `DATABASE_URL` is required; the error names the variable and
    /// never echoes a value.
    pub fn from_env() -> Result<Self> {
        let database_url =
            std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

        Ok(Self {
            database_url,
            daemon_addr: non_empty(ENV_DAEMON_ADDR),
            egress: EgressConfig {
                max_requests_per_hour: env_i64(ENV_EGRESS_MAX_PER_HOUR, 100)?,
            },
            worker: WorkerConfig {
                interval_secs: env_i64(ENV_WORKER_INTERVAL_SECS, 5)? as u64,
                lease_ttl_secs: env_i64(ENV_WORKER_LEASE_TTL_SECS, 300)?,
            },
            learning: LearningConfig {
                quarantine_threshold: env_i64(ENV_QUARANTINE_THRESHOLD, 3)?,
            },
            promotion: PromotionConfig {
                loop_enabled: env_flag(ENV_PROMOTION_LOOP_ENABLED),
            },
        })
    }
}

/// "1" / "true" (case-insensitive) -> true; unset or anything else -> false.
pub fn env_flag(var_name: &str) -> bool {
    std::env::var(var_name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn non_empty(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn env_i64(var_name: &str, default: i64) -> Result<i64> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<i64>()
            .with_context(|| format!("env var {var_name} must be an integer")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforcement_mode_defaults_to_enforce() {
        assert_eq!(EnforcementMode::parse(None), EnforcementMode::Enforce);
        assert_eq!(EnforcementMode::parse(Some("")), EnforcementMode::Enforce);
        assert_eq!(
            EnforcementMode::parse(Some("enforce")),
            EnforcementMode::Enforce
        );
        assert_eq!(
            EnforcementMode::parse(Some("ENFORCE")),
            EnforcementMode::Enforce
        );
    }

    #[test]
    fn enforcement_mode_explicit_optout_is_advisory() {
        assert_eq!(
            EnforcementMode::parse(Some("observe")),
            EnforcementMode::Advisory
        );
        assert!(!EnforcementMode::parse(Some("off")).is_enforcing());
    }
}
