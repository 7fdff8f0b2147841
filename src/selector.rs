//! Smart layer selection: detected issues in, a corrected layer set out.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::detectors::{DetectedIssue, HeuristicDetectors, IssueDetectors, Severity};
use crate::layers::{correct, LayerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimatedImpact {
    pub level: ImpactLevel,
    pub description: String,
    pub estimated_fix_time_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerRecommendation {
    pub recommended_layers: Vec<LayerId>,
    pub detected_issues: Vec<DetectedIssue>,
    pub reasoning: Vec<String>,
    pub confidence: f64,
    pub estimated_impact: EstimatedImpact,
}

impl LayerRecommendation {
    /// Occurrences the given layers are expected to fix.
    pub fn estimated_change_count(&self, layers: &[LayerId]) -> usize {
        self.detected_issues
            .iter()
            .filter(|i| layers.contains(&i.fixed_by_layer))
            .map(|i| i.occurrence_count)
            .sum()
    }
}

/// `min(0.9, 0.6 + high/total * 0.3)`, or 0.5 with nothing detected.
/// Critical issues count as high.
pub fn confidence(issues: &[DetectedIssue]) -> f64 {
    if issues.is_empty() {
        return 0.5;
    }
    let high = issues
        .iter()
        .filter(|i| i.severity >= Severity::High)
        .count();
    (0.6 + (high as f64 / issues.len() as f64) * 0.3).min(0.9)
}

pub fn estimate_impact(issues: &[DetectedIssue]) -> EstimatedImpact {
    let critical = issues
        .iter()
        .filter(|i| i.severity == Severity::Critical)
        .count();
    let total = issues.len();

    let (level, description) = if critical > 3 {
        (
            ImpactLevel::High,
            format!("{} critical issue(s) likely to break the build or runtime", critical),
        )
    } else if critical > 0 {
        (
            ImpactLevel::Medium,
            format!("{} critical issue(s) among {} detected", critical, total),
        )
    } else {
        (
            ImpactLevel::Low,
            format!("{} non-critical issue(s) detected", total),
        )
    };

    EstimatedImpact {
        level,
        description,
        estimated_fix_time_seconds: ((total as u64) * 10).max(30),
    }
}

pub struct LayerSelector<D = HeuristicDetectors> {
    detectors: D,
}

impl LayerSelector<HeuristicDetectors> {
    pub fn new() -> Self {
        LayerSelector {
            detectors: HeuristicDetectors,
        }
    }
}

impl Default for LayerSelector<HeuristicDetectors> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: IssueDetectors> LayerSelector<D> {
    pub fn with_detectors(detectors: D) -> Self {
        LayerSelector { detectors }
    }

    pub fn recommend(&self, source: &str, file_path: &str) -> LayerRecommendation {
        let issues = self.detectors.detect_all(source, file_path);

        let mut requested: BTreeSet<LayerId> = BTreeSet::new();
        requested.insert(LayerId::Configuration);
        requested.extend(issues.iter().map(|i| i.fixed_by_layer));
        let requested: Vec<LayerId> = requested.into_iter().collect();
        let correction = correct(&requested);

        let mut reasoning =
            vec!["Layer 1 (Configuration) always runs to establish a baseline.".to_string()];
        for layer in &correction.corrected {
            let fixing: Vec<&DetectedIssue> = issues
                .iter()
                .filter(|i| i.fixed_by_layer == *layer)
                .collect();
            if fixing.is_empty() {
                continue;
            }
            let kinds: BTreeSet<&str> = fixing.iter().map(|i| i.issue_type.as_str()).collect();
            let occurrences: usize = fixing.iter().map(|i| i.occurrence_count).sum();
            reasoning.push(format!(
                "Layer {}: {} occurrence(s) of {}",
                layer,
                occurrences,
                kinds.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }
        reasoning.extend(correction.warnings);

        LayerRecommendation {
            recommended_layers: correction.corrected,
            confidence: confidence(&issues),
            estimated_impact: estimate_impact(&issues),
            detected_issues: issues,
            reasoning,
        }
    }
}

#[cfg(feature = "napi")]
#[napi]
pub fn recommend_layers_native(code: String, filename: String) -> napi::Result<String> {
    let recommendation = LayerSelector::new().recommend(&code, &filename);
    serde_json::to_string(&recommendation)
        .map_err(|e| napi::Error::from_reason(format!("Serialization error: {}", e)))
}
