//! Package verification: a pure function with enumerated outcomes.
//!
//! A package is `verified` when its manifest carries a signature matching
//! the canonical manifest digest, `pending` when the manifest is unsigned,
//! and `quarantined` when the manifest is missing or the signature does not
//! match.

use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Reasons attached to non-verified classifications.
pub mod reason {
    pub const MANIFEST_MISSING: &str = "manifest_missing";
    pub const SIGNATURE_INVALID: &str = "signature_invalid";
    pub const SIGNATURE_MISSING: &str = "signature_missing";
    pub const VERIFY_SIGNATURE_REQUIRED: &str = "verify_signature_required";
}

/// One package as submitted to the import endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SkillSubmission {
    pub skill_id: String,
    pub version: String,
    #[serde(default)]
    pub manifest: Option<Value>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub hash_sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    Pending { reason: &'static str },
    Quarantined { reason: &'static str },
}

impl VerificationOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            VerificationOutcome::Verified => "verified",
            VerificationOutcome::Pending { .. } => "pending",
            VerificationOutcome::Quarantined { .. } => "quarantined",
        }
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            VerificationOutcome::Verified => None,
            VerificationOutcome::Pending { reason } => Some(reason),
            VerificationOutcome::Quarantined { reason } => Some(reason),
        }
    }
}

/// Classify one submission.
pub fn verify_package(submission: &SkillSubmission) -> VerificationOutcome {
    let Some(manifest) = &submission.manifest else {
        return VerificationOutcome::Quarantined {
            reason: reason::MANIFEST_MISSING,
        };
    };

    match &submission.signature {
        None => VerificationOutcome::Pending {
            reason: reason::SIGNATURE_MISSING,
        },
        Some(signature) => {
            if *signature == expected_signature(manifest, &submission.skill_id) {
                VerificationOutcome::Verified
            } else {
                VerificationOutcome::Quarantined {
                    reason: reason::SIGNATURE_INVALID,
                }
            }
        }
    }
}

/// The signature a trusted publisher would have produced: the SHA-256 of the
/// canonical manifest bound to the skill id.
pub fn expected_signature(manifest: &Value, skill_id: &str) -> String {
    let canonical = canonical_json(manifest);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.update(b"|");
    hasher.update(skill_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Content hash for the inventory idempotency key. Falls back to hashing the
/// identity pair when the manifest is absent, so a manifest-less submission
/// still dedupes against itself.
pub fn package_hash(submission: &SkillSubmission) -> String {
    if let Some(explicit) = &submission.hash_sha256 {
        return explicit.clone();
    }
    let mut hasher = Sha256::new();
    match &submission.manifest {
        Some(manifest) => hasher.update(canonical_json(manifest).as_bytes()),
        None => {
            hasher.update(submission.skill_id.as_bytes());
            hasher.update(b"@");
            hasher.update(submission.version.as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

/// Canonicalize by sorting keys recursively and emitting compact JSON.
fn canonical_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submission(manifest: Option<Value>, signature: Option<String>) -> SkillSubmission {
        SkillSubmission {
            skill_id: "skill.echo".into(),
            version: "1.0.0".into(),
            manifest,
            signature,
            hash_sha256: None,
        }
    }

    #[test]
    fn signed_manifest_verifies() {
        let manifest = json!({"name": "echo", "entry": "main"});
        let sig = expected_signature(&manifest, "skill.echo");
        let out = verify_package(&submission(Some(manifest), Some(sig)));
        assert_eq!(out, VerificationOutcome::Verified);
        assert_eq!(out.status(), "verified");
    }

    #[test]
    fn missing_manifest_quarantines() {
        let out = verify_package(&submission(None, None));
        assert_eq!(out.status(), "quarantined");
        assert_eq!(out.reason(), Some(reason::MANIFEST_MISSING));
    }

    #[test]
    fn unsigned_manifest_is_pending() {
        let out = verify_package(&submission(Some(json!({"name": "echo"})), None));
        assert_eq!(out.status(), "pending");
        assert_eq!(out.reason(), Some(reason::SIGNATURE_MISSING));
    }

    #[test]
    fn wrong_signature_quarantines() {
        let out = verify_package(&submission(
            Some(json!({"name": "echo"})),
            Some("not-the-signature".into()),
        ));
        assert_eq!(out.status(), "quarantined");
        assert_eq!(out.reason(), Some(reason::SIGNATURE_INVALID));
    }

    #[test]
    fn signature_is_key_order_independent() {
        let a = json!({"entry": "main", "name": "echo"});
        let b = json!({"name": "echo", "entry": "main"});
        assert_eq!(
            expected_signature(&a, "skill.echo"),
            expected_signature(&b, "skill.echo")
        );
    }

    #[test]
    fn package_hash_stable_for_identical_submission() {
        let s = submission(Some(json!({"name": "echo"})), None);
        assert_eq!(package_hash(&s), package_hash(&s.clone()));
    }
}
