//! Text rules for layers 1 and 2.
//!
//! Each rule is a regex plus either a replacement template (`$1` style) or a
//! function that sees the match and its surroundings. Rules run in list order,
//! once each, over the whole text, and every rule is idempotent on its own.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::layers::LayerId;

// ═══════════════════════════════════════════════════════════════════════════════
// FILE KINDS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    TsConfig,
    NextConfig,
    Json,
    Source,
    Other,
}

impl FileKind {
    pub fn of(file_path: &str) -> FileKind {
        let path = Path::new(file_path);
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(file_path)
            .to_ascii_lowercase();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        if ext == "json" && (name.starts_with("tsconfig") || name == "jsconfig.json") {
            return FileKind::TsConfig;
        }
        if name.starts_with("next.config.") {
            return FileKind::NextConfig;
        }
        match ext.as_str() {
            "json" => FileKind::Json,
            "js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs" | "mts" | "cts" => FileKind::Source,
            _ => FileKind::Other,
        }
    }

    pub fn is_config(self) -> bool {
        matches!(self, FileKind::TsConfig | FileKind::NextConfig)
    }
}

/// Which files a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileScope {
    TsConfig,
    NextConfig,
    /// Anything that is not a JSON document.
    Text,
}

impl FileScope {
    pub fn admits(self, kind: FileKind) -> bool {
        match self {
            FileScope::TsConfig => kind == FileKind::TsConfig,
            FileScope::NextConfig => kind == FileKind::NextConfig,
            FileScope::Text => !matches!(kind, FileKind::TsConfig | FileKind::Json),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RULES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleCategory {
    Configuration,
    HtmlEntity,
    TypeSuppression,
    Fragment,
    ImportStyle,
    Console,
    VarDeclaration,
    InlineStyle,
    ProfessionalContent,
}

/// One regex match handed to a computed replacement.
pub struct RuleMatch<'t> {
    pub captures: Captures<'t>,
    pub source: &'t str,
}

impl<'t> RuleMatch<'t> {
    pub fn text(&self) -> &'t str {
        self.captures.get(0).map_or("", |m| m.as_str())
    }

    pub fn start(&self) -> usize {
        self.captures.get(0).map_or(0, |m| m.start())
    }

    pub fn end(&self) -> usize {
        self.captures.get(0).map_or(0, |m| m.end())
    }

    pub fn group(&self, i: usize) -> Option<&'t str> {
        self.captures.get(i).map(|m| m.as_str())
    }

    pub fn named(&self, name: &str) -> Option<&'t str> {
        self.captures.name(name).map(|m| m.as_str())
    }

    /// Up to `radius` bytes on either side of the match, widened to char boundaries.
    pub fn context_window(&self, radius: usize) -> &'t str {
        let mut lo = self.start().saturating_sub(radius);
        while !self.source.is_char_boundary(lo) {
            lo -= 1;
        }
        let mut hi = (self.end() + radius).min(self.source.len());
        while !self.source.is_char_boundary(hi) {
            hi += 1;
        }
        &self.source[lo..hi]
    }

    /// The full line the match starts on.
    pub fn line(&self) -> &'t str {
        let start = self.start();
        let line_start = self.source[..start].rfind('\n').map_or(0, |i| i + 1);
        let line_end = self.source[start..]
            .find('\n')
            .map_or(self.source.len(), |i| start + i);
        &self.source[line_start..line_end]
    }
}

pub enum Replacement {
    /// Expanded with `Captures::expand`, so `$1` and `${name}` work.
    Template(&'static str),
    Computed(fn(&RuleMatch) -> String),
}

pub struct PatternRule {
    pub name: &'static str,
    pub category: RuleCategory,
    pub layer: LayerId,
    pub scope: FileScope,
    pub pattern: Regex,
    pub replacement: Replacement,
}

impl PatternRule {
    /// Rewrites every match and returns the new text plus the number of
    /// matches that actually changed.
    pub fn apply(&self, text: &str) -> (String, usize) {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let mut hits = 0;

        for caps in self.pattern.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let (start, end) = (whole.start(), whole.end());
            let rule_match = RuleMatch {
                captures: caps,
                source: text,
            };
            let replacement = match &self.replacement {
                Replacement::Template(template) => {
                    let mut expanded = String::new();
                    rule_match.captures.expand(template, &mut expanded);
                    expanded
                }
                Replacement::Computed(f) => f(&rule_match),
            };
            if replacement == text[start..end] {
                continue;
            }
            out.push_str(&text[last..start]);
            out.push_str(&replacement);
            last = end;
            hits += 1;
        }

        if hits == 0 {
            return (text.to_string(), 0);
        }
        out.push_str(&text[last..]);
        (out, hits)
    }

    /// Matches that would change, without rewriting.
    pub fn count_changes(&self, text: &str) -> usize {
        self.apply(text).1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleHit {
    pub rule: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleApplication {
    pub text: String,
    pub hits: Vec<RuleHit>,
}

impl RuleApplication {
    pub fn total_hits(&self) -> usize {
        self.hits.iter().map(|h| h.count).sum()
    }
}

pub struct PatternLibrary {
    rules: Vec<PatternRule>,
}

impl PatternLibrary {
    pub fn standard() -> &'static PatternLibrary {
        &STANDARD_LIBRARY
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&PatternRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn rules_for(&self, layer: LayerId) -> impl Iterator<Item = &PatternRule> {
        self.rules.iter().filter(move |r| r.layer == layer)
    }

    /// Runs the layer's rules that admit `file_path`, in order.
    pub fn apply_layer(&self, layer: LayerId, text: &str, file_path: &str) -> RuleApplication {
        let kind = FileKind::of(file_path);
        let mut current = text.to_string();
        let mut hits = Vec::new();

        for rule in self.rules_for(layer).filter(|r| r.scope.admits(kind)) {
            let (next, count) = rule.apply(&current);
            if count > 0 {
                hits.push(RuleHit {
                    rule: rule.name.to_string(),
                    count,
                });
                current = next;
            }
        }

        RuleApplication {
            text: current,
            hits,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPUTED REPLACEMENTS
// ═══════════════════════════════════════════════════════════════════════════════

fn suppress_any(m: &RuleMatch) -> String {
    // `as any[]` is an array cast, not an escape hatch.
    if m.group(2).is_some() {
        return m.text().to_string();
    }
    format!("{} /* @ts-ignore */", m.group(1).unwrap_or_default())
}

pub fn camel_to_kebab(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn kebab_style_keys(m: &RuleMatch) -> String {
    let body = m.group(1).unwrap_or_default();
    let rewritten = STYLE_KEY_RE.replace_all(body, |caps: &Captures| {
        format!(
            "{}{}'{}'{}:",
            &caps[1],
            &caps[2],
            camel_to_kebab(&caps[3]),
            &caps[4]
        )
    });
    format!("style={{{{{}}}}}", rewritten)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrowContext {
    Code,
    JsxText,
    /// Text after a `{child}` expression or a block; the glyph stays.
    Unclear,
}

const JSX_DELIMITERS: [char; 4] = ['<', '>', '{', '}'];

/// Where an arrow glyph sits, judged by the nearest JSX delimiters around it.
///
/// `<` and `>` are not allowed in JSX text, so a bare `->` there no longer
/// parses.
fn arrow_context(m: &RuleMatch) -> ArrowContext {
    let before = &m.source[..m.start()];
    let after = &m.source[m.end()..];
    let next = after
        .find(JSX_DELIMITERS)
        .and_then(|i| after[i..].chars().next());
    let opens_next = matches!(next, Some('<') | Some('{'));

    let Some(at) = before.rfind(JSX_DELIMITERS) else {
        return ArrowContext::Code;
    };
    match before[at..].chars().next() {
        Some('>') if before[..at].ends_with('=') => ArrowContext::Code,
        Some('>') if opens_next => ArrowContext::JsxText,
        Some('>') => ArrowContext::Unclear,
        Some('}') if opens_next => ArrowContext::Unclear,
        _ => ArrowContext::Code,
    }
}

fn professional_symbol(m: &RuleMatch) -> String {
    if let Some(keycap) = m.named("keycap") {
        let digit: String = keycap.chars().take(1).collect();
        return format!("{}.", digit);
    }
    if m.named("ten").is_some() {
        return "10.".to_string();
    }
    let arrow = if m.named("left").is_some() {
        Some("<-")
    } else if m.named("right").is_some() {
        Some("->")
    } else if m.named("both").is_some() {
        Some("<->")
    } else {
        None
    };
    if let Some(arrow) = arrow {
        return match arrow_context(m) {
            ArrowContext::Code => arrow.to_string(),
            ArrowContext::JsxText => format!("{{'{}'}}", arrow),
            ArrowContext::Unclear => m.text().to_string(),
        };
    }
    if m.named("tool").is_some() {
        if MARKDOWN_HEADER_RE.is_match(m.line()) {
            return m.text().to_string();
        }
        return String::new();
    }
    if m.named("perf").is_some() {
        return "[PERF]".to_string();
    }
    String::new()
}

// ═══════════════════════════════════════════════════════════════════════════════
// STANDARD RULE TABLE
// ═══════════════════════════════════════════════════════════════════════════════

const SYMBOL_PATTERN: &str = concat!(
    r"(?P<keycap>[0-9]\x{FE0F}?\x{20E3})",
    r"|(?P<ten>\x{1F51F})",
    r"|(?P<left>[\x{2190}\x{21D0}\x{2B05}]\x{FE0F}?)",
    r"|(?P<right>[\x{2192}\x{21D2}\x{27A1}]\x{FE0F}?)",
    r"|(?P<both>[\x{2194}\x{21D4}]\x{FE0F}?)",
    r"|(?P<tool>(?:\x{1F527}|\x{1F6E0}|\x{2699}|\x{1F528})\x{FE0F}? ?)",
    r"|(?P<perf>(?:\x{26A1}|\x{1F680})\x{FE0F}?)",
    r"|(?P<sweep>[\x{1F000}-\x{1FAFF}\x{2600}-\x{27BF}\x{2B50}\x{2B55}\x{200D}\x{FE0F}\x{20E3}]+ ?)",
);

lazy_static! {
    static ref STYLE_KEY_RE: Regex =
        Regex::new(r"(^|,)(\s*)([a-z][a-z0-9]*(?:[A-Z][a-z0-9]*)+)(\s*):").unwrap();
    static ref MARKDOWN_HEADER_RE: Regex =
        Regex::new(r"^\s*(?://+|\*|/\*+)?\s*#{1,6}\s").unwrap();
    static ref STANDARD_LIBRARY: PatternLibrary = PatternLibrary {
        rules: standard_rules(),
    };
}

fn rule(
    name: &'static str,
    category: RuleCategory,
    layer: LayerId,
    scope: FileScope,
    pattern: &str,
    replacement: Replacement,
) -> PatternRule {
    PatternRule {
        name,
        category,
        layer,
        scope,
        pattern: Regex::new(pattern).unwrap(),
        replacement,
    }
}

fn standard_rules() -> Vec<PatternRule> {
    use FileScope::*;
    use LayerId::{Configuration, EntityCleanup};
    use Replacement::*;
    use RuleCategory as C;

    vec![
        // Layer 1: configuration files
        rule(
            "tsconfig-target",
            C::Configuration,
            Configuration,
            TsConfig,
            r#"("target"\s*:\s*)"(?i:es3|es5)""#,
            Template(r#"${1}"ES2020""#),
        ),
        rule(
            "tsconfig-strict",
            C::Configuration,
            Configuration,
            TsConfig,
            r#"("strict"\s*:\s*)false\b"#,
            Template("${1}true"),
        ),
        rule(
            "next-config-app-dir",
            C::Configuration,
            Configuration,
            NextConfig,
            r"\bappDir\s*:\s*true\s*,?\s*",
            Template(""),
        ),
        rule(
            "next-config-strict-mode",
            C::Configuration,
            Configuration,
            NextConfig,
            r"\b(reactStrictMode\s*:\s*)false\b",
            Template("${1}true"),
        ),
        // Layer 2: source text
        // `&amp;` first, so `&amp;quot;` decodes fully in one run.
        rule(
            "html-entity-amp",
            C::HtmlEntity,
            EntityCleanup,
            Text,
            r"&(?:amp;)+",
            Template("&"),
        ),
        rule(
            "html-entity-quot",
            C::HtmlEntity,
            EntityCleanup,
            Text,
            r"&quot;",
            Template("\""),
        ),
        rule(
            "html-entity-apos",
            C::HtmlEntity,
            EntityCleanup,
            Text,
            r"&#x27;|&#39;",
            Template("'"),
        ),
        rule(
            "as-any-suppression",
            C::TypeSuppression,
            EntityCleanup,
            Text,
            r"([\w)\]])\s+as\s+any\b(\s*\[)?",
            Computed(suppress_any),
        ),
        rule(
            "fragment-open-shorthand",
            C::Fragment,
            EntityCleanup,
            Text,
            r"<React\.Fragment\s*>",
            Template("<>"),
        ),
        rule(
            "fragment-close-shorthand",
            C::Fragment,
            EntityCleanup,
            Text,
            r"</React\.Fragment\s*>",
            Template("</>"),
        ),
        rule(
            "react-default-import",
            C::ImportStyle,
            EntityCleanup,
            Text,
            r#"import\s+\*\s+as\s+React\s+from\s+(['"])react(['"])"#,
            Template("import React from ${1}react${2}"),
        ),
        rule(
            "console-log-debug",
            C::Console,
            EntityCleanup,
            Text,
            r"\bconsole\.log\b",
            Template("console.debug"),
        ),
        rule(
            "var-to-let",
            C::VarDeclaration,
            EntityCleanup,
            Text,
            r"(?m)(^|[\s;{}(])var\s+([A-Za-z_$])",
            Template("${1}let ${2}"),
        ),
        rule(
            "inline-style-kebab-keys",
            C::InlineStyle,
            EntityCleanup,
            Text,
            r"style=\{\{([^{}]*)\}\}",
            Computed(kebab_style_keys),
        ),
        rule(
            "professional-content",
            C::ProfessionalContent,
            EntityCleanup,
            Text,
            SYMBOL_PATTERN,
            Computed(professional_symbol),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(layer: LayerId, text: &str, path: &str) -> String {
        PatternLibrary::standard().apply_layer(layer, text, path).text
    }

    fn run_rule(name: &str, text: &str) -> String {
        PatternLibrary::standard()
            .rule(name)
            .expect("rule exists")
            .apply(text)
            .0
    }

    #[test]
    fn test_file_kinds() {
        assert_eq!(FileKind::of("tsconfig.json"), FileKind::TsConfig);
        assert_eq!(FileKind::of("app/tsconfig.base.json"), FileKind::TsConfig);
        assert_eq!(FileKind::of("next.config.mjs"), FileKind::NextConfig);
        assert_eq!(FileKind::of("package.json"), FileKind::Json);
        assert_eq!(FileKind::of("src/App.tsx"), FileKind::Source);
        assert_eq!(FileKind::of("README.md"), FileKind::Other);
    }

    #[test]
    fn test_tsconfig_rules() {
        let input = r#"{ "compilerOptions": { "target": "es5", "strict": false } }"#;
        let out = run(LayerId::Configuration, input, "tsconfig.json");
        assert_eq!(
            out,
            r#"{ "compilerOptions": { "target": "ES2020", "strict": true } }"#
        );
    }

    #[test]
    fn test_config_rules_skip_sources() {
        let input = r#"const cfg = { "strict": false };"#;
        assert_eq!(run(LayerId::Configuration, input, "src/cfg.ts"), input);
    }

    #[test]
    fn test_next_config_rules() {
        let input = "module.exports = {\n  experimental: {\n    appDir: true,\n  },\n  reactStrictMode: false,\n};\n";
        let out = run(LayerId::Configuration, input, "next.config.js");
        assert!(!out.contains("appDir"));
        assert!(out.contains("reactStrictMode: true"));
    }

    #[test]
    fn test_entities_decode() {
        let out = run(
            LayerId::EntityCleanup,
            "<p>&quot;Tom&#x27;s&quot; &amp;amp; Jerry&#39;s</p>",
            "a.tsx",
        );
        assert_eq!(out, "<p>\"Tom's\" & Jerry's</p>");
    }

    #[test]
    fn test_double_encoded_entities_decode_in_one_run() {
        let once = run(LayerId::EntityCleanup, "&amp;quot;x&amp;quot; &amp;#39;", "a.jsx");
        assert_eq!(once, "\"x\" '");
        assert_eq!(run(LayerId::EntityCleanup, &once, "a.jsx"), once);
    }

    #[test]
    fn test_as_any_becomes_comment() {
        assert_eq!(
            run_rule("as-any-suppression", "const x = (y as any).z;"),
            "const x = (y /* @ts-ignore */).z;"
        );
        assert_eq!(
            run_rule("as-any-suppression", "const list = [] as any[];"),
            "const list = [] as any[];"
        );
    }

    #[test]
    fn test_fragments_and_react_import() {
        let input = "import * as React from 'react';\nconst A = () => <React.Fragment><b /></React.Fragment>;";
        let out = run(LayerId::EntityCleanup, input, "a.jsx");
        assert_eq!(
            out,
            "import React from 'react';\nconst A = () => <><b /></>;"
        );
    }

    #[test]
    fn test_console_and_var() {
        let out = run(
            LayerId::EntityCleanup,
            "var a = 1;\nfor (var i = 0; i < 2; i++) { console.log(i); }",
            "a.js",
        );
        assert_eq!(
            out,
            "let a = 1;\nfor (let i = 0; i < 2; i++) { console.debug(i); }"
        );
    }

    #[test]
    fn test_var_inside_identifiers_is_untouched() {
        let input = "const variance = covar + 1;";
        assert_eq!(run_rule("var-to-let", input), input);
    }

    #[test]
    fn test_inline_style_keys() {
        let out = run_rule(
            "inline-style-kebab-keys",
            "<div style={{ backgroundColor: 'red', marginTop: 4, color: c }} />",
        );
        assert_eq!(
            out,
            "<div style={{ 'background-color': 'red', 'margin-top': 4, color: c }} />"
        );
    }

    #[test]
    fn test_professional_content_substitutions() {
        let out = run_rule(
            "professional-content",
            "// 1\u{FE0F}\u{20E3} Step \u{2192} next \u{26A1} fast \u{1F389} done",
        );
        assert_eq!(out, "// 1. Step -> next [PERF] fast done");
    }

    #[test]
    fn test_arrows_in_jsx_text_become_expressions() {
        assert_eq!(
            run_rule("professional-content", "const a = <p>Next \u{2192}</p>;"),
            "const a = <p>Next {'->'}</p>;"
        );
        assert_eq!(
            run_rule("professional-content", "<p>\n  \u{2190} Back {label}\n</p>"),
            "<p>\n  {'<-'} Back {label}\n</p>"
        );
        // Arrow functions and strings stay plain text.
        assert_eq!(
            run_rule("professional-content", "const f = () => \"a \u{2194} b\";"),
            "const f = () => \"a <-> b\";"
        );
        // After a child expression the context is ambiguous.
        let child = "<p>{count} \u{2192} items</p>";
        assert_eq!(run_rule("professional-content", child), child);
    }

    #[test]
    fn test_tool_glyph_kept_in_markdown_header() {
        let header = "## \u{1F527} Setup";
        assert_eq!(run_rule("professional-content", header), header);
        assert_eq!(
            run_rule("professional-content", "// \u{1F527} fix this"),
            "// fix this"
        );
    }

    #[test]
    fn test_every_rule_is_idempotent_on_samples() {
        let samples = [
            "&amp;amp;quot; &quot; &#39;",
            "x as any; y as any[]",
            "<React.Fragment></React.Fragment>",
            "var a; var b",
            "<i style={{ fontSize: 1, zIndex: 2 }} />",
            "\u{1F680}\u{FE0F} \u{1F527} \u{2705} ## \u{1F6E0} tools 3\u{20E3}",
        ];
        for rule in PatternLibrary::standard().rules() {
            for sample in samples {
                let (once, _) = rule.apply(sample);
                let (twice, hits) = rule.apply(&once);
                assert_eq!(once, twice, "rule {} not idempotent on {:?}", rule.name, sample);
                assert_eq!(hits, 0);
            }
        }
    }

    #[test]
    fn test_hits_are_reported_per_rule() {
        let app = PatternLibrary::standard().apply_layer(
            LayerId::EntityCleanup,
            "console.log(1); console.log(2);",
            "a.js",
        );
        assert_eq!(
            app.hits,
            vec![RuleHit {
                rule: "console-log-debug".to_string(),
                count: 2
            }]
        );
        assert_eq!(app.total_hits(), 2);
    }

    #[test]
    fn test_context_window_respects_char_boundaries() {
        let rule = PatternLibrary::standard().rule("console-log-debug").unwrap();
        let source = "\u{00e9}\u{00e9} console.log";
        let caps = rule.pattern.captures(source).unwrap();
        let m = RuleMatch { captures: caps, source };
        assert_eq!(m.context_window(4), source);
        assert_eq!(m.context_window(0), "console.log");
        assert_eq!(m.line(), source);
    }

    #[test]
    fn test_camel_to_kebab() {
        assert_eq!(camel_to_kebab("borderTopLeftRadius"), "border-top-left-radius");
        assert_eq!(camel_to_kebab("color"), "color");
    }
}
