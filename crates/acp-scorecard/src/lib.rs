//! Scorecard rubric and the promotion-loop scorer.
//!
//! Both are deterministic functions: the rubric folds submitted dimension
//! scores into one overall value, and the promotion scorer maps an agent's
//! recent overall scores to an autonomy recommendation. The scorer is a
//! trait so a deployment can swap the rubric without touching the daemon.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Templates whose scorecards must cite a run as evidence.
const EVIDENCE_TEMPLATES: &[&str] = &["task_outcome", "incident_review"];

pub fn template_requires_evidence(template: &str) -> bool {
    EVIDENCE_TEMPLATES.contains(&template)
}

/// Validate submitted dimension scores: non-empty, every value in `0..=1`.
pub fn validate_scores(scores: &Value) -> Result<(), String> {
    let Some(map) = scores.as_object() else {
        return Err("scores must be an object of dimension -> value".to_string());
    };
    if map.is_empty() {
        return Err("scores must name at least one dimension".to_string());
    }
    for (dimension, value) in map {
        match value.as_f64() {
            Some(v) if (0.0..=1.0).contains(&v) => {}
            _ => {
                return Err(format!(
                    "score for dimension '{dimension}' must be a number in 0..=1"
                ))
            }
        }
    }
    Ok(())
}

/// Overall score: the unweighted mean of the dimension scores.
/// Call [`validate_scores`] first; invalid values fold as zero.
pub fn score_overall(scores: &Value) -> f64 {
    let Some(map) = scores.as_object() else {
        return 0.0;
    };
    if map.is_empty() {
        return 0.0;
    }
    let sum: f64 = map.values().filter_map(Value::as_f64).sum();
    sum / map.len() as f64
}

// ---------------------------------------------------------------------------
// Promotion loop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PromotionThresholds {
    /// Mean of recent overalls at or above this promotes.
    pub promote_mean_min: f64,
    /// A single recent overall below this blocks promotion.
    pub score_floor: f64,
    /// Mean strictly below this demotes.
    pub demote_mean_max: f64,
    /// How many recent scorecards the scorer considers.
    pub window: usize,
}

impl Default for PromotionThresholds {
    fn default() -> Self {
        Self {
            promote_mean_min: 0.8,
            score_floor: 0.5,
            demote_mean_max: 0.4,
            window: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyRecommendation {
    Promote,
    Hold,
    Demote,
}

impl AutonomyRecommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutonomyRecommendation::Promote => "promote",
            AutonomyRecommendation::Hold => "hold",
            AutonomyRecommendation::Demote => "demote",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PromotionReport {
    pub recommendation: AutonomyRecommendation,
    pub mean_score: f64,
    pub sample_count: usize,
    /// Human-readable reasons (empty when nothing blocked a promotion).
    pub reasons: Vec<String>,
}

/// Deterministic function over an agent's recent overall scores.
pub trait PromotionScorer {
    fn score(&self, recent_overalls: &[f64]) -> PromotionReport;
}

/// Default scorer: threshold rubric over the trailing window.
#[derive(Debug, Clone, Default)]
pub struct ThresholdScorer {
    pub thresholds: PromotionThresholds,
}

impl PromotionScorer for ThresholdScorer {
    fn score(&self, recent_overalls: &[f64]) -> PromotionReport {
        let thr = &self.thresholds;
        let window: Vec<f64> = recent_overalls.iter().copied().take(thr.window).collect();

        if window.is_empty() {
            return PromotionReport {
                recommendation: AutonomyRecommendation::Hold,
                mean_score: 0.0,
                sample_count: 0,
                reasons: vec!["no scorecards recorded yet".to_string()],
            };
        }

        let mean = window.iter().sum::<f64>() / window.len() as f64;
        let mut reasons = Vec::new();

        if mean < thr.demote_mean_max {
            reasons.push(format!(
                "mean score below demotion threshold: {:.3} < {:.3}",
                mean, thr.demote_mean_max
            ));
            return PromotionReport {
                recommendation: AutonomyRecommendation::Demote,
                mean_score: mean,
                sample_count: window.len(),
                reasons,
            };
        }

        if mean < thr.promote_mean_min {
            reasons.push(format!(
                "mean score below promotion threshold: {:.3} < {:.3}",
                mean, thr.promote_mean_min
            ));
        }
        if let Some(low) = window.iter().copied().find(|v| *v < thr.score_floor) {
            reasons.push(format!(
                "recent score below floor: {:.3} < {:.3}",
                low, thr.score_floor
            ));
        }

        let recommendation = if reasons.is_empty() {
            AutonomyRecommendation::Promote
        } else {
            AutonomyRecommendation::Hold
        };

        PromotionReport {
            recommendation,
            mean_score: mean,
            sample_count: window.len(),
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overall_is_mean_of_dimensions() {
        let scores = json!({"accuracy": 1.0, "latency": 0.5});
        assert!(validate_scores(&scores).is_ok());
        assert!((score_overall(&scores) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn rejects_out_of_range_and_empty_scores() {
        assert!(validate_scores(&json!({})).is_err());
        assert!(validate_scores(&json!({"a": 1.5})).is_err());
        assert!(validate_scores(&json!({"a": "high"})).is_err());
        assert!(validate_scores(&json!(["a"])).is_err());
    }

    #[test]
    fn evidence_templates_enumerated() {
        assert!(template_requires_evidence("task_outcome"));
        assert!(!template_requires_evidence("self_review"));
    }

    #[test]
    fn promotes_above_threshold() {
        let report = ThresholdScorer::default().score(&[0.9, 0.85, 0.95]);
        assert_eq!(report.recommendation, AutonomyRecommendation::Promote);
        assert!(report.reasons.is_empty());
    }

    #[test]
    fn single_low_score_blocks_promotion() {
        let report = ThresholdScorer::default().score(&[0.95, 0.95, 0.45, 0.95, 0.95]);
        assert_eq!(report.recommendation, AutonomyRecommendation::Hold);
        assert!(!report.reasons.is_empty());
    }

    #[test]
    fn demotes_below_floor_mean() {
        let report = ThresholdScorer::default().score(&[0.2, 0.3, 0.1]);
        assert_eq!(report.recommendation, AutonomyRecommendation::Demote);
    }

    #[test]
    fn empty_history_holds() {
        let report = ThresholdScorer::default().score(&[]);
        assert_eq!(report.recommendation, AutonomyRecommendation::Hold);
        assert_eq!(report.sample_count, 0);
    }

    #[test]
    fn window_limits_considered_scores() {
        // Six scores, window five: the oldest (bad) score is ignored.
        let report = ThresholdScorer::default().score(&[0.9, 0.9, 0.9, 0.9, 0.9, 0.1]);
        assert_eq!(report.recommendation, AutonomyRecommendation::Promote);
        assert_eq!(report.sample_count, 5);
    }
}
