//! Import maintenance: unused-import pruning and missing React hook imports.

use oxc_ast::ast::*;
use oxc_ast_visit::Visit;
use std::collections::HashMap;

use crate::codegen::{line_of, TextEdit};
use crate::engine::{AppliedTransformation, NodeKind, PassOutput, RewritePass};
use crate::semantic::{ParsedModule, REACT_HOOKS};

/// Names the transformation validator insists on keeping.
pub const CRITICAL_IMPORTS: [&str; 3] = ["React", "useState", "useEffect"];

const STYLESHEET_EXTENSIONS: [&str; 6] = [".css", ".scss", ".sass", ".less", ".styl", ".pcss"];

/// Imported for their side effects even when a binding exists.
pub fn is_side_effect_source(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    STYLESHEET_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) || lower.contains("polyfill")
}

// ═══════════════════════════════════════════════════════════════════════════════
// REFERENCES
// ═══════════════════════════════════════════════════════════════════════════════

/// Counts identifier references outside import declarations. Covers value
/// references, JSX tag names, type references and `export { x }` locals.
#[derive(Default)]
struct ReferenceCollector {
    counts: HashMap<String, usize>,
}

impl<'a> Visit<'a> for ReferenceCollector {
    fn visit_import_declaration(&mut self, _decl: &ImportDeclaration<'a>) {}

    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        *self.counts.entry(ident.name.to_string()).or_insert(0) += 1;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRUNING
// ═══════════════════════════════════════════════════════════════════════════════

enum Kept<'s> {
    Default(&'s str),
    Namespace(&'s str),
    Named(&'s str),
}

pub fn prune_unused_imports(module: &ParsedModule<'_>) -> PassOutput {
    let mut refs = ReferenceCollector::default();
    refs.visit_program(&module.program);

    let source = module.source;
    let mut out = PassOutput::default();

    for stmt in &module.program.body {
        let Statement::ImportDeclaration(decl) = stmt else {
            continue;
        };
        let Some(specifiers) = &decl.specifiers else {
            continue;
        };
        let module_name = decl.source.value.as_str();
        if specifiers.is_empty() || decl.import_kind.is_type() || is_side_effect_source(module_name)
        {
            continue;
        }

        let mut kept = Vec::new();
        let mut removed = Vec::new();
        for spec in specifiers {
            let (local, type_only, text) = match spec {
                ImportDeclarationSpecifier::ImportSpecifier(s) => (
                    s.local.name.as_str(),
                    s.import_kind.is_type(),
                    Kept::Named(&source[s.span.start as usize..s.span.end as usize]),
                ),
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                    (s.local.name.as_str(), false, Kept::Default(s.local.name.as_str()))
                }
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                    (s.local.name.as_str(), false, Kept::Namespace(s.local.name.as_str()))
                }
            };
            let used = type_only
                || CRITICAL_IMPORTS.contains(&local)
                || refs.counts.get(local).copied().unwrap_or(0) > 0;
            if used {
                kept.push(text);
            } else {
                removed.push(local.to_string());
            }
        }

        if removed.is_empty() {
            continue;
        }

        let line = line_of(source, decl.span.start);
        if kept.is_empty() {
            out.push(
                TextEdit::remove_line_aware(source, decl.span.start, decl.span.end),
                AppliedTransformation {
                    pass: RewritePass::ImportPruning,
                    node: NodeKind::Import,
                    line,
                    description: format!("Removed unused import from '{}'", module_name),
                    confidence: 0.95,
                },
            );
            continue;
        }

        // Import attributes would be lost by a rebuild.
        let tail = &source[decl.source.span.end as usize..decl.span.end as usize];
        if tail.contains("with") || tail.contains("assert") {
            continue;
        }

        let rebuilt = rebuild_import(
            &kept,
            &source[decl.source.span.start as usize..decl.source.span.end as usize],
            tail.trim_end().ends_with(';'),
        );
        out.push(
            TextEdit::replace(decl.span.start, decl.span.end, rebuilt),
            AppliedTransformation {
                pass: RewritePass::ImportPruning,
                node: NodeKind::Import,
                line,
                description: format!(
                    "Removed unused specifiers {} from '{}'",
                    removed.join(", "),
                    module_name
                ),
                confidence: 0.9,
            },
        );
    }

    out
}

fn rebuild_import(kept: &[Kept<'_>], source_literal: &str, semicolon: bool) -> String {
    let mut head = Vec::new();
    let mut named = Vec::new();
    for k in kept {
        match k {
            Kept::Default(name) => head.insert(0, name.to_string()),
            Kept::Namespace(name) => head.push(format!("* as {}", name)),
            Kept::Named(text) => named.push(*text),
        }
    }
    if !named.is_empty() {
        head.push(format!("{{ {} }}", named.join(", ")));
    }
    format!(
        "import {} from {}{}",
        head.join(", "),
        source_literal,
        if semicolon { ";" } else { "" }
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOOK IMPORTS
// ═══════════════════════════════════════════════════════════════════════════════

/// An edit that makes `names` importable from `react`.
///
/// Extends an existing value import's named list, adds a named list after a
/// default-only import, or inserts a new import after the directive prologue.
pub fn react_named_import_edit(module: &ParsedModule<'_>, names: &[&str]) -> Option<TextEdit> {
    if names.is_empty() {
        return None;
    }
    let joined = names.join(", ");

    for stmt in &module.program.body {
        let Statement::ImportDeclaration(decl) = stmt else {
            continue;
        };
        if decl.source.value != "react" || decl.import_kind.is_type() {
            continue;
        }
        let Some(specifiers) = &decl.specifiers else {
            continue;
        };

        let last_named = specifiers.iter().rev().find_map(|s| match s {
            ImportDeclarationSpecifier::ImportSpecifier(named) => Some(named.span.end),
            _ => None,
        });
        if let Some(end) = last_named {
            return Some(TextEdit::insert(end, format!(", {}", joined)));
        }

        let has_namespace = specifiers
            .iter()
            .any(|s| matches!(s, ImportDeclarationSpecifier::ImportNamespaceSpecifier(_)));
        if let (false, Some(ImportDeclarationSpecifier::ImportDefaultSpecifier(default))) =
            (has_namespace, specifiers.first())
        {
            return Some(TextEdit::insert(
                default.span.end,
                format!(", {{ {} }}", joined),
            ));
        }
    }

    let line = format!("import {{ {} }} from 'react';", joined);
    Some(insert_after_prologue(module, &line))
}

/// Inserts a full line after any hashbang and directives.
pub fn insert_after_prologue(module: &ParsedModule<'_>, line: &str) -> TextEdit {
    let source = module.source;
    let prologue_end = module
        .program
        .directives
        .last()
        .map(|d| d.span.end)
        .or_else(|| module.program.hashbang.as_ref().map(|h| h.span.end));

    match prologue_end {
        None => TextEdit::insert(0, format!("{}\n", line)),
        Some(end) => match source[end as usize..].find('\n') {
            Some(nl) => TextEdit::insert(end + nl as u32 + 1, format!("{}\n", line)),
            None => TextEdit::insert(source.len() as u32, format!("\n{}\n", line)),
        },
    }
}

pub fn add_missing_hook_imports(module: &ParsedModule<'_>) -> PassOutput {
    let ctx = &module.context;
    let missing: Vec<&str> = ctx
        .hooks
        .values()
        .filter(|h| h.bare && REACT_HOOKS.contains(&h.name.as_str()))
        .filter(|h| !ctx.is_declared(&h.name))
        .map(|h| h.name.as_str())
        .collect();

    let mut out = PassOutput::default();
    if let Some(edit) = react_named_import_edit(module, &missing) {
        let line = missing
            .iter()
            .filter_map(|m| ctx.hooks.get(*m).map(|h| h.first_line))
            .min()
            .unwrap_or(1);
        out.push(
            edit,
            AppliedTransformation {
                pass: RewritePass::HookImports,
                node: NodeKind::Import,
                line,
                description: format!("Imported {} from 'react'", missing.join(", ")),
                confidence: 0.95,
            },
        );
    }
    out
}
