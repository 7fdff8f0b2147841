//! Layer catalogue and dependency correction.
//!
//! Layers form a chain: layer `n` requires every layer below it. A requested
//! selection is corrected to its downward closure before anything runs.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::ConfigurationError;

// ═══════════════════════════════════════════════════════════════════════════════
// LAYER IDS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LayerId {
    Configuration = 1,
    EntityCleanup = 2,
    Components = 3,
    Hydration = 4,
    NextJs = 5,
    Testing = 6,
}

impl LayerId {
    pub const ALL: [LayerId; 6] = [
        LayerId::Configuration,
        LayerId::EntityCleanup,
        LayerId::Components,
        LayerId::Hydration,
        LayerId::NextJs,
        LayerId::Testing,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            LayerId::Configuration => "Configuration",
            LayerId::EntityCleanup => "Entity Cleanup",
            LayerId::Components => "Components",
            LayerId::Hydration => "Hydration",
            LayerId::NextJs => "Next.js",
            LayerId::Testing => "Testing",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            LayerId::Configuration => "Normalizes tsconfig and next.config settings",
            LayerId::EntityCleanup => "Decodes HTML entities and cleans up legacy text patterns",
            LayerId::Components => "Adds missing keys, alt text and hook imports; prunes unused imports",
            LayerId::Hydration => "Guards browser storage access during server rendering",
            LayerId::NextJs => "Adds the \"use client\" directive to client components",
            LayerId::Testing => "Infers prop types and removes debugger statements",
        }
    }

    /// Critical layers gate the rest of the chain.
    pub fn critical(self) -> bool {
        matches!(
            self,
            LayerId::Configuration | LayerId::EntityCleanup | LayerId::Components
        )
    }

    /// Layers 1 and 2 are text rules, the rest need a parsed AST.
    pub fn requires_ast(self) -> bool {
        self.number() >= 3
    }

    /// Every layer strictly below this one.
    pub fn dependencies(self) -> Vec<LayerId> {
        LayerId::ALL
            .iter()
            .copied()
            .filter(|l| *l < self)
            .collect()
    }

    pub fn from_number(n: i64) -> Result<LayerId, ConfigurationError> {
        match n {
            1 => Ok(LayerId::Configuration),
            2 => Ok(LayerId::EntityCleanup),
            3 => Ok(LayerId::Components),
            4 => Ok(LayerId::Hydration),
            5 => Ok(LayerId::NextJs),
            6 => Ok(LayerId::Testing),
            other => Err(ConfigurationError::InvalidLayerId(other)),
        }
    }

    /// Parses a list of raw ids, rejecting the whole list on the first bad one.
    pub fn parse_list(raw: &[i64]) -> Result<Vec<LayerId>, ConfigurationError> {
        raw.iter().map(|n| LayerId::from_number(*n)).collect()
    }
}

impl TryFrom<u8> for LayerId {
    type Error = ConfigurationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        LayerId::from_number(i64::from(value))
    }
}

impl From<LayerId> for u8 {
    fn from(layer: LayerId) -> u8 {
        layer.number()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.number(), self.name())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEPENDENCY CORRECTION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyCorrection {
    pub corrected: Vec<LayerId>,
    pub warnings: Vec<String>,
    pub auto_added: Vec<LayerId>,
}

/// Completes `requested` with every missing dependency.
///
/// The result is deduplicated and ascending. Since dependencies only point
/// downward, a single pass over the request reaches the closure.
pub fn correct(requested: &[LayerId]) -> DependencyCorrection {
    let mut working: BTreeSet<LayerId> = requested.iter().copied().collect();
    let mut auto_added: BTreeSet<LayerId> = BTreeSet::new();
    let mut warnings = Vec::new();

    let mut ordered: Vec<LayerId> = requested.to_vec();
    ordered.sort();
    ordered.dedup();

    for layer in ordered {
        let missing: Vec<LayerId> = layer
            .dependencies()
            .into_iter()
            .filter(|dep| !working.contains(dep))
            .collect();

        if missing.is_empty() {
            continue;
        }

        let names: Vec<String> = missing.iter().map(|l| l.to_string()).collect();
        warnings.push(format!(
            "Layer {} requires {}. Auto-added missing dependencies.",
            layer,
            names.join(", ")
        ));

        for dep in missing {
            working.insert(dep);
            auto_added.insert(dep);
        }
    }

    DependencyCorrection {
        corrected: working.into_iter().collect(),
        warnings,
        auto_added: auto_added.into_iter().collect(),
    }
}

#[cfg(feature = "napi")]
#[napi]
pub fn correct_layers_native(layers_json: String) -> napi::Result<String> {
    let raw: Vec<i64> = serde_json::from_str(&layers_json)
        .map_err(|e| napi::Error::from_reason(format!("Layer list parse error: {}", e)))?;
    let layers = LayerId::parse_list(&raw).map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_string(&correct(&layers))
        .map_err(|e| napi::Error::from_reason(format!("Serialization error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components_pulls_in_lower_layers() {
        let result = correct(&[LayerId::Components]);
        assert_eq!(
            result.corrected,
            vec![LayerId::Configuration, LayerId::EntityCleanup, LayerId::Components]
        );
        assert_eq!(
            result.auto_added,
            vec![LayerId::Configuration, LayerId::EntityCleanup]
        );
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(
            result.warnings[0],
            "Layer 3 (Components) requires 1 (Configuration), 2 (Entity Cleanup). Auto-added missing dependencies."
        );
    }

    #[test]
    fn test_complete_selection_has_no_warnings() {
        let result = correct(&[LayerId::Configuration, LayerId::EntityCleanup]);
        assert!(result.warnings.is_empty());
        assert!(result.auto_added.is_empty());
    }

    #[test]
    fn test_duplicates_and_order_are_normalized() {
        let result = correct(&[
            LayerId::EntityCleanup,
            LayerId::Configuration,
            LayerId::EntityCleanup,
        ]);
        assert_eq!(
            result.corrected,
            vec![LayerId::Configuration, LayerId::EntityCleanup]
        );
    }

    #[test]
    fn test_empty_request_stays_empty() {
        let result = correct(&[]);
        assert!(result.corrected.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_second_layer_only_warns_for_what_is_missing() {
        let result = correct(&[LayerId::Configuration, LayerId::Hydration]);
        assert_eq!(
            result.auto_added,
            vec![LayerId::EntityCleanup, LayerId::Components]
        );
        assert!(result.warnings[0].starts_with("Layer 4 (Hydration) requires 2 (Entity Cleanup), 3 (Components)."));
    }

    #[test]
    fn test_invalid_ids_are_rejected() {
        assert_eq!(
            LayerId::from_number(7),
            Err(ConfigurationError::InvalidLayerId(7))
        );
        assert!(LayerId::parse_list(&[1, 0]).is_err());
        assert!(serde_json::from_str::<LayerId>("9").is_err());
        assert_eq!(serde_json::from_str::<LayerId>("4").unwrap(), LayerId::Hydration);
    }

    #[test]
    fn test_criticality() {
        let critical: Vec<u8> = LayerId::ALL
            .iter()
            .filter(|l| l.critical())
            .map(|l| l.number())
            .collect();
        assert_eq!(critical, vec![1, 2, 3]);
    }
}
