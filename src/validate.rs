//! Transformation validation.
//!
//! `validate(before, after)` decides whether a layer's output may replace its
//! input. Checks run in a fixed order and the first failing one wins:
//!
//! 1. identical text is always kept
//! 2. the `{}` / `()` balance must not change
//! 3. a file that parsed before must still parse
//! 4. no corruption signature may appear that was not already present
//! 5. no critical React import may disappear
//!
//! A revert is a value, not an error.

#[cfg(feature = "napi")]
use napi_derive::napi;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::imports::CRITICAL_IMPORTS;
use crate::semantic::{parses_cleanly, source_type_for};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub should_revert: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationOutcome {
    pub fn keep() -> Self {
        ValidationOutcome::default()
    }

    pub fn revert(reason: impl Into<String>) -> Self {
        ValidationOutcome {
            should_revert: true,
            reason: Some(reason.into()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BALANCE
// ═══════════════════════════════════════════════════════════════════════════════

/// `(opens - closes)` for braces and parentheses.
pub fn delimiter_balance(text: &str) -> (i64, i64) {
    text.chars().fold((0, 0), |(braces, parens), c| match c {
        '{' => (braces + 1, parens),
        '}' => (braces - 1, parens),
        '(' => (braces, parens + 1),
        ')' => (braces, parens - 1),
        _ => (braces, parens),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// CORRUPTION SIGNATURES
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref DOUBLE_CALL_RE: Regex = Regex::new(r"\(\)\s*=>\s*\(\)\s*=>").unwrap();
    static ref MALFORMED_ATTR_RE: Regex =
        Regex::new(r#"[\w-]+=(?:\{\{\{|"[^"\n]*"=)"#).unwrap();
    static ref BROKEN_ARROW_RE: Regex = Regex::new(r"=>\s*=>").unwrap();
    static ref IMPORT_LINE_RE: Regex =
        Regex::new(r#"(?m)^\s*import\s.+\sfrom\s+['"][^'"]+['"];?\s*$"#).unwrap();
    static ref DIRECTIVE_LINE_RE: Regex =
        Regex::new(r#"(?m)^\s*['"](use (?:client|server))['"];?\s*$"#).unwrap();
    static ref IMPORT_CLAUSE_RE: Regex =
        Regex::new(r#"\bimport\s+((?:type\s+)?[^;'"]*?)\s+from\s*['"][^'"]+['"]"#).unwrap();
    static ref WORD_RE: Regex = Regex::new(r"[A-Za-z_$][\w$]*").unwrap();
}

/// A known bad-transform artifact.
#[derive(Debug, Clone, Copy)]
pub struct CorruptionSignature {
    pub name: &'static str,
    detect: fn(&str) -> bool,
}

impl CorruptionSignature {
    pub fn matches(&self, text: &str) -> bool {
        (self.detect)(text)
    }
}

fn has_double_calls(text: &str) -> bool {
    DOUBLE_CALL_RE.is_match(text)
}

fn has_malformed_attributes(text: &str) -> bool {
    MALFORMED_ATTR_RE.is_match(text)
}

fn has_broken_arrows(text: &str) -> bool {
    BROKEN_ARROW_RE.is_match(text)
}

fn has_duplicate_imports(text: &str) -> bool {
    let mut seen = HashSet::new();
    IMPORT_LINE_RE
        .find_iter(text)
        .any(|m| !seen.insert(m.as_str().trim().trim_end_matches(';').to_string()))
}

fn has_duplicate_directives(text: &str) -> bool {
    let mut seen = HashSet::new();
    DIRECTIVE_LINE_RE
        .captures_iter(text)
        .any(|c| !seen.insert(c[1].to_string()))
}

pub const CORRUPTION_SIGNATURES: [CorruptionSignature; 5] = [
    CorruptionSignature {
        name: "Double function calls",
        detect: has_double_calls,
    },
    CorruptionSignature {
        name: "Malformed JSX attributes",
        detect: has_malformed_attributes,
    },
    CorruptionSignature {
        name: "Duplicate import blocks",
        detect: has_duplicate_imports,
    },
    CorruptionSignature {
        name: "Broken arrow functions",
        detect: has_broken_arrows,
    },
    CorruptionSignature {
        name: "Duplicate directives",
        detect: has_duplicate_directives,
    },
];

// ═══════════════════════════════════════════════════════════════════════════════
// IMPORT INTEGRITY
// ═══════════════════════════════════════════════════════════════════════════════

/// Whether some import clause in `text` binds `name`.
pub fn imports_name(text: &str, name: &str) -> bool {
    IMPORT_CLAUSE_RE.captures_iter(text).any(|c| {
        WORD_RE
            .find_iter(&c[1])
            .any(|w| w.as_str() == name)
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALIDATOR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformationValidator {
    file_path: Option<String>,
    parse_check: bool,
}

impl Default for TransformationValidator {
    fn default() -> Self {
        TransformationValidator {
            file_path: None,
            parse_check: true,
        }
    }
}

impl TransformationValidator {
    /// A validator that also parse-checks as the file type of `file_path`.
    pub fn for_path(file_path: &str) -> Self {
        TransformationValidator {
            file_path: Some(file_path.to_string()),
            parse_check: true,
        }
    }

    pub fn with_parse_check(mut self, enabled: bool) -> Self {
        self.parse_check = enabled;
        self
    }

    fn parses(&self, text: &str) -> Option<bool> {
        let path = self.file_path.as_deref()?;
        if source_type_for(path).is_some() {
            return Some(parses_cleanly(text, path));
        }
        let is_json = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        is_json.then(|| serde_json::from_str::<serde_json::Value>(text).is_ok())
    }

    pub fn validate(&self, before: &str, after: &str) -> ValidationOutcome {
        if before == after {
            return ValidationOutcome::keep();
        }

        let (braces_before, parens_before) = delimiter_balance(before);
        let (braces_after, parens_after) = delimiter_balance(after);
        if braces_before != braces_after {
            return ValidationOutcome::revert(format!(
                "Syntax check failed: brace balance changed from {} to {}",
                braces_before, braces_after
            ));
        }
        if parens_before != parens_after {
            return ValidationOutcome::revert(format!(
                "Syntax check failed: parenthesis balance changed from {} to {}",
                parens_before, parens_after
            ));
        }

        if self.parse_check {
            if let (Some(true), Some(false)) = (self.parses(before), self.parses(after)) {
                return ValidationOutcome::revert(
                    "Syntax check failed: transformed code no longer parses",
                );
            }
        }

        for signature in &CORRUPTION_SIGNATURES {
            if signature.matches(after) && !signature.matches(before) {
                return ValidationOutcome::revert(format!(
                    "Corruption detected: {}",
                    signature.name
                ));
            }
        }

        for name in CRITICAL_IMPORTS {
            if imports_name(before, name) && !imports_name(after, name) {
                return ValidationOutcome::revert(format!(
                    "Critical import '{}' was removed",
                    name
                ));
            }
        }

        ValidationOutcome::keep()
    }
}

/// Validates without a file type, so without the parse check.
pub fn validate(before: &str, after: &str) -> ValidationOutcome {
    TransformationValidator::default().validate(before, after)
}

#[cfg(feature = "napi")]
#[napi]
pub fn validate_transformation_native(
    before: String,
    after: String,
    file_path: Option<String>,
) -> napi::Result<String> {
    let validator = match file_path.as_deref() {
        Some(path) => TransformationValidator::for_path(path),
        None => TransformationValidator::default(),
    };
    serde_json::to_string(&validator.validate(&before, &after))
        .map_err(|e| napi::Error::from_reason(format!("Serialization error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text_is_kept() {
        assert_eq!(validate("a(", "a("), ValidationOutcome::keep());
    }

    #[test]
    fn test_balance_change_reverts() {
        let out = validate("f(a);", "f(a;");
        assert!(out.should_revert);
        assert!(out.reason.unwrap().contains("parenthesis"));
    }

    #[test]
    fn test_parse_check_only_blames_new_breakage() {
        let v = TransformationValidator::for_path("a.js");
        assert!(v.validate("let a = 1;", "let = 1;").should_revert);
        // Already broken before: not this layer's fault.
        assert!(!v.validate("let = 1;", "let = 2;").should_revert);
        assert!(!v
            .clone()
            .with_parse_check(false)
            .validate("let a = 1;", "let = 1;")
            .should_revert);
    }

    #[test]
    fn test_json_parse_check() {
        let v = TransformationValidator::for_path("tsconfig.json");
        assert!(v.validate("{\"a\": 1}", "{\"a\": 1,}").should_revert);
        assert!(!v.validate("{\"a\": 1}", "{\"a\": 2}").should_revert);
    }

    #[test]
    fn test_new_signature_reverts_but_existing_does_not() {
        let out = validate("<b onClick={handle} />", "<b onClick={() => () => handle()} />");
        assert_eq!(
            out.reason.as_deref(),
            Some("Corruption detected: Double function calls")
        );

        let already = "<b onClick={() => () => a()} />";
        assert!(!validate(already, &format!("{} ", already)).should_revert);
    }

    #[test]
    fn test_duplicate_import_and_directive_signatures() {
        let imp = "import a from 'a';\n";
        assert!(validate(imp, &format!("{}{}", imp, imp)).should_revert);
        let dir = "'use client';\n";
        let out = validate(dir, &format!("{}{}", dir, dir));
        assert_eq!(
            out.reason.as_deref(),
            Some("Corruption detected: Duplicate directives")
        );
    }

    #[test]
    fn test_removed_critical_import_names_it() {
        let out = validate(
            "import { useState, useMemo } from 'react';\n",
            "import { useMemo } from 'react';\n",
        );
        assert!(out.should_revert);
        assert!(out.reason.unwrap().contains("useState"));
    }

    #[test]
    fn test_imports_name_handles_multiline_clauses() {
        let text = "import React, {\n  useEffect,\n} from \"react\";";
        assert!(imports_name(text, "React"));
        assert!(imports_name(text, "useEffect"));
        assert!(!imports_name(text, "useState"));
    }
}
