//! Heuristic issue detectors over raw source text.
//!
//! Detectors never parse: they have to work on files the AST engine would
//! reject, which are exactly the files that need layers 1 and 2.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::layers::LayerId;
use crate::patterns::{FileKind, PatternLibrary};
use crate::semantic::{is_typescript_path, source_type_for, REACT_HOOKS};
use crate::validate::imports_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedIssue {
    #[serde(rename = "type")]
    pub issue_type: String,
    pub severity: Severity,
    pub description: String,
    pub fixed_by_layer: LayerId,
    pub pattern_name: String,
    pub occurrence_count: usize,
}

impl DetectedIssue {
    fn new(
        issue_type: &str,
        severity: Severity,
        fixed_by_layer: LayerId,
        pattern_name: &str,
        occurrence_count: usize,
        description: String,
    ) -> Self {
        DetectedIssue {
            issue_type: issue_type.to_string(),
            severity,
            description,
            fixed_by_layer,
            pattern_name: pattern_name.to_string(),
            occurrence_count,
        }
    }
}

/// One detector per layer. The selector runs all of them, in layer order.
pub trait IssueDetectors {
    fn configuration(&self, source: &str, file_path: &str) -> Vec<DetectedIssue>;
    fn patterns(&self, source: &str, file_path: &str) -> Vec<DetectedIssue>;
    fn components(&self, source: &str, file_path: &str) -> Vec<DetectedIssue>;
    fn hydration(&self, source: &str, file_path: &str) -> Vec<DetectedIssue>;
    fn nextjs(&self, source: &str, file_path: &str) -> Vec<DetectedIssue>;
    fn testing(&self, source: &str, file_path: &str) -> Vec<DetectedIssue>;

    fn detect_all(&self, source: &str, file_path: &str) -> Vec<DetectedIssue> {
        let mut issues = self.configuration(source, file_path);
        issues.extend(self.patterns(source, file_path));
        issues.extend(self.components(source, file_path));
        issues.extend(self.hydration(source, file_path));
        issues.extend(self.nextjs(source, file_path));
        issues.extend(self.testing(source, file_path));
        issues
    }
}

lazy_static! {
    static ref UNKEYED_MAP_RE: Regex = Regex::new(
        r"\.map\s*\(\s*(?:\([^)]*\)|[\w$]+)\s*=>\s*(?:\{\s*return\s*)?\(?\s*<([^>]*)>"
    )
    .unwrap();
    static ref IMG_RE: Regex = Regex::new(r"<img\b([^>]*)>").unwrap();
    static ref BARE_HOOK_CALL_RE: Regex =
        Regex::new(r"(?:^|[^.\w$])(use[A-Z][\w$]*)\s*\(").unwrap();
    static ref LOCAL_FUNCTION_RE: Regex =
        Regex::new(r"(?:function\s+|(?:const|let|var)\s+)(use[A-Z][\w$]*)\b").unwrap();
    static ref STORAGE_CALL_RE: Regex =
        Regex::new(r"(?:^|[^.\w$])(?:window\.)?(?:localStorage|sessionStorage)\.\w+\s*\(")
            .unwrap();
    static ref CLIENT_ONLY_RE: Regex =
        Regex::new(r"(?:^|[^.\w$])(?:use[A-Z][\w$]*\s*\(|(?:window|document|localStorage|sessionStorage)\.)")
            .unwrap();
    static ref DIRECTIVE_RE: Regex =
        Regex::new(r#"^\s*(?:#![^\n]*\n\s*)?['"]use (?:client|server)['"]"#).unwrap();
    static ref DEBUGGER_RE: Regex = Regex::new(r"(?m)(?:^|[;{}\s])debugger\s*;?").unwrap();
    static ref UNTYPED_COMPONENT_RE: Regex = Regex::new(
        r"(?m)^(?:export\s+(?:default\s+)?)?(?:function\s+([A-Z][\w$]*)\s*\(\s*\{[^}]*\}\s*\)|const\s+([A-Z][\w$]*)\s*=\s*\(\s*\{[^}]*\}\s*\)\s*=>)"
    )
    .unwrap();
}

fn is_test_file(file_path: &str) -> bool {
    let name = Path::new(file_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_path);
    name.contains(".test.") || name.contains(".spec.")
}

/// Detectors built from the pattern library and a handful of regexes.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicDetectors;

impl HeuristicDetectors {
    fn rule_issues(
        &self,
        layer: LayerId,
        source: &str,
        file_path: &str,
        classify: fn(&str) -> Option<(&'static str, Severity)>,
    ) -> Vec<DetectedIssue> {
        let kind = FileKind::of(file_path);
        PatternLibrary::standard()
            .rules_for(layer)
            .filter(|rule| rule.scope.admits(kind))
            .filter_map(|rule| {
                let (issue_type, severity) = classify(rule.name)?;
                let count = rule.count_changes(source);
                (count > 0).then(|| {
                    DetectedIssue::new(
                        issue_type,
                        severity,
                        layer,
                        rule.name,
                        count,
                        format!("{} occurrence(s) matched by rule {}", count, rule.name),
                    )
                })
            })
            .collect()
    }
}

fn classify_configuration(_rule: &str) -> Option<(&'static str, Severity)> {
    Some(("legacy-config", Severity::Medium))
}

fn classify_pattern(rule: &str) -> Option<(&'static str, Severity)> {
    match rule {
        "html-entity-quot" | "html-entity-amp" | "html-entity-apos" => {
            Some(("html-entities", Severity::High))
        }
        "console-log-debug" => Some(("console-log", Severity::Low)),
        "var-to-let" => Some(("var-declaration", Severity::Medium)),
        "as-any-suppression" => Some(("any-cast", Severity::Medium)),
        "fragment-open-shorthand" | "fragment-close-shorthand" => {
            Some(("verbose-fragment", Severity::Low))
        }
        "react-default-import" => Some(("namespace-react-import", Severity::Low)),
        "inline-style-kebab-keys" => Some(("inline-style-keys", Severity::Low)),
        "professional-content" => Some(("decorative-symbols", Severity::Low)),
        _ => None,
    }
}

impl IssueDetectors for HeuristicDetectors {
    fn configuration(&self, source: &str, file_path: &str) -> Vec<DetectedIssue> {
        self.rule_issues(
            LayerId::Configuration,
            source,
            file_path,
            classify_configuration,
        )
    }

    fn patterns(&self, source: &str, file_path: &str) -> Vec<DetectedIssue> {
        self.rule_issues(LayerId::EntityCleanup, source, file_path, classify_pattern)
    }

    fn components(&self, source: &str, file_path: &str) -> Vec<DetectedIssue> {
        if source_type_for(file_path).is_none() {
            return Vec::new();
        }
        let mut issues = Vec::new();

        let unkeyed = UNKEYED_MAP_RE
            .captures_iter(source)
            .filter(|c| !c[1].contains("key="))
            .count();
        if unkeyed > 0 {
            issues.push(DetectedIssue::new(
                "missing-key",
                Severity::High,
                LayerId::Components,
                "map-without-key",
                unkeyed,
                format!("{} .map() callback(s) render JSX without a key prop", unkeyed),
            ));
        }

        let declared: BTreeSet<&str> = LOCAL_FUNCTION_RE
            .captures_iter(source)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        let missing: BTreeSet<&str> = BARE_HOOK_CALL_RE
            .captures_iter(source)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .filter(|hook| REACT_HOOKS.contains(hook))
            .filter(|hook| !declared.contains(hook) && !imports_name(source, hook))
            .collect();
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().copied().collect();
            issues.push(DetectedIssue::new(
                "missing-hook-import",
                Severity::Critical,
                LayerId::Components,
                "hook-without-import",
                missing.len(),
                format!("React hook(s) used without an import: {}", names.join(", ")),
            ));
        }

        let no_alt = IMG_RE
            .captures_iter(source)
            .filter(|c| !c[1].contains("alt=") && !c[1].contains("{..."))
            .count();
        if no_alt > 0 {
            issues.push(DetectedIssue::new(
                "img-alt",
                Severity::Medium,
                LayerId::Components,
                "img-without-alt",
                no_alt,
                format!("{} <img> element(s) without an alt attribute", no_alt),
            ));
        }

        issues
    }

    fn hydration(&self, source: &str, file_path: &str) -> Vec<DetectedIssue> {
        if source_type_for(file_path).is_none() {
            return Vec::new();
        }
        // A guard on the same line counts; guards spanning blocks do not
        // register here, and the AST pass makes the final call.
        let unguarded = STORAGE_CALL_RE
            .find_iter(source)
            .filter(|m| {
                let line_start = source[..m.start()].rfind('\n').map_or(0, |i| i + 1);
                let line_end = source[m.end()..]
                    .find('\n')
                    .map_or(source.len(), |i| m.end() + i);
                !source[line_start..line_end].contains("typeof window")
            })
            .count();
        if unguarded == 0 {
            return Vec::new();
        }
        vec![DetectedIssue::new(
            "unguarded-storage",
            Severity::High,
            LayerId::Hydration,
            "storage-without-ssr-guard",
            unguarded,
            format!(
                "{} browser storage call(s) without a typeof window guard",
                unguarded
            ),
        )]
    }

    fn nextjs(&self, source: &str, file_path: &str) -> Vec<DetectedIssue> {
        if source_type_for(file_path).is_none()
            || is_test_file(file_path)
            || DIRECTIVE_RE.is_match(source)
        {
            return Vec::new();
        }
        let uses = CLIENT_ONLY_RE.find_iter(source).count();
        if uses == 0 {
            return Vec::new();
        }
        vec![DetectedIssue::new(
            "missing-use-client",
            Severity::Medium,
            LayerId::NextJs,
            "client-code-without-directive",
            1,
            format!(
                "{} hook or browser API use(s) in a module without 'use client'",
                uses
            ),
        )]
    }

    fn testing(&self, source: &str, file_path: &str) -> Vec<DetectedIssue> {
        if source_type_for(file_path).is_none() {
            return Vec::new();
        }
        let mut issues = Vec::new();

        let debuggers = DEBUGGER_RE.find_iter(source).count();
        if debuggers > 0 {
            issues.push(DetectedIssue::new(
                "debugger-statement",
                Severity::Low,
                LayerId::Testing,
                "debugger",
                debuggers,
                format!("{} debugger statement(s) left in source", debuggers),
            ));
        }

        if is_typescript_path(file_path) {
            let untyped = UNTYPED_COMPONENT_RE.captures_iter(source).count();
            if untyped > 0 {
                issues.push(DetectedIssue::new(
                    "untyped-props",
                    Severity::Low,
                    LayerId::Testing,
                    "component-without-props-type",
                    untyped,
                    format!("{} component(s) with untyped props", untyped),
                ));
            }
        }

        issues
    }
}
