//! Secret redaction.
//!
//! Anything that reaches a constraint pattern or a learning event passes
//! through here first. Matches are replaced with the literal `REDACTED`;
//! the original value never survives into stored material.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

pub const REDACTED: &str = "REDACTED";

/// Context keys whose values are secrets regardless of shape.
const SENSITIVE_KEYS: &[&str] = &["api_key", "token", "secret", "authorization"];

fn value_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            // Provider-style secret tokens, e.g. sk-live-Ab3_x9.
            Regex::new(r"sk-[a-z]+-[A-Za-z0-9_-]{6,}").expect("valid regex"),
            // Long hex blobs (raw keys, digests of secrets).
            Regex::new(r"\b[0-9a-fA-F]{32,}\b").expect("valid regex"),
            // Bearer credentials wherever they appear in text.
            Regex::new(r"(?i)bearer\s+[A-Za-z0-9._~+/=-]+").expect("valid regex"),
        ]
    })
}

fn query_param_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)([?&](?:api_key|token|secret|authorization)=)[^&\s"']+"#)
            .expect("valid regex")
    })
}

/// Redact secret-shaped substrings in one string.
pub fn redact_text(input: &str) -> String {
    let mut out = query_param_pattern()
        .replace_all(input, format!("${{1}}{REDACTED}").as_str())
        .into_owned();
    for pattern in value_patterns() {
        if pattern.is_match(&out) {
            out = pattern.replace_all(&out, REDACTED).into_owned();
        }
    }
    out
}

fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEYS
        .iter()
        .any(|k| key.eq_ignore_ascii_case(k))
}

/// Redact a JSON value recursively: sensitive keys lose their whole value,
/// every string is scanned for secret-shaped substrings.
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, val) in map {
                if is_sensitive_key(key) {
                    out.insert(key.clone(), Value::String(REDACTED.to_string()));
                } else {
                    out.insert(key.clone(), redact_value(val));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        Value::String(s) => Value::String(redact_text(s)),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_provider_tokens() {
        let out = redact_text("key is sk-live-Ab3dEf_9xk and more");
        assert!(!out.contains("sk-live-Ab3dEf_9xk"));
        assert!(out.contains(REDACTED));
    }

    #[test]
    fn redacts_long_hex_blobs() {
        let secret = "deadbeefdeadbeefdeadbeefdeadbeef";
        let out = redact_text(&format!("hash {secret} trailing"));
        assert!(!out.contains(secret));
        assert!(out.contains(REDACTED));
    }

    #[test]
    fn short_hex_survives() {
        let out = redact_text("commit deadbeef ok");
        assert!(out.contains("deadbeef"));
    }

    #[test]
    fn redacts_bearer_headers() {
        let out = redact_text("Authorization: Bearer abc.def-ghi");
        assert!(!out.contains("abc.def-ghi"));
    }

    #[test]
    fn redacts_named_query_params_keeping_the_name() {
        let out = redact_text("https://api.example.com/v1?x=1&api_key=supersecret123&y=2");
        assert!(!out.contains("supersecret123"));
        assert!(out.contains("api_key=REDACTED"));
        assert!(out.contains("y=2"));
    }

    #[test]
    fn redacts_sensitive_keys_in_nested_json() {
        let ctx = json!({
            "target": "https://example.net/submit",
            "headers": { "Authorization": "Bearer tok123abc" },
            "token": "plain-but-named-token",
            "nested": [{ "secret": "hunter2" }],
        });
        let out = redact_value(&ctx);
        let text = out.to_string();
        assert!(!text.contains("tok123abc"));
        assert!(!text.contains("plain-but-named-token"));
        assert!(!text.contains("hunter2"));
        assert_eq!(out["token"], REDACTED);
        assert_eq!(out["nested"][0]["secret"], REDACTED);
        assert_eq!(out["target"], "https://example.net/submit");
    }
}
