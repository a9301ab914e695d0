//! Skill-package verification and inventory import.

pub mod import;
pub mod verify;

pub use import::{import_inventory, review_pending, ImportSummary, ReviewSummary};
pub use verify::{
    expected_signature, package_hash, verify_package, SkillSubmission, VerificationOutcome,
};
