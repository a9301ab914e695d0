//! Learning loop: turns blocked or approval-requiring policy decisions into
//! redacted constraints, mistake counters, and (past a threshold) agent
//! quarantine.

pub mod pipeline;
pub mod redact;

pub use pipeline::{observe_decision, LearningOutcome};
pub use redact::{redact_text, redact_value, REDACTED};
