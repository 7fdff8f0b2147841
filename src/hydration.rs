//! Server-rendering safety: storage guards and the client directive.

use lazy_static::lazy_static;
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_span::GetSpan;
use regex::Regex;
use std::path::Path;

use crate::codegen::{line_of, TextEdit};
use crate::engine::{AppliedTransformation, NodeKind, PassOutput, RewritePass};
use crate::semantic::ParsedModule;

pub const WINDOW_GUARD: &str = "typeof window !== \"undefined\"";

lazy_static! {
    static ref TYPEOF_WINDOW_RE: Regex = Regex::new(r"typeof\s+window\b").unwrap();
}

const STORAGE_OBJECTS: [&str; 2] = ["localStorage", "sessionStorage"];

/// `localStorage.x(...)`, `sessionStorage.x(...)` or the same through `window.`.
pub fn storage_object<'b>(call: &'b CallExpression<'_>) -> Option<&'b str> {
    let Expression::StaticMemberExpression(member) = &call.callee else {
        return None;
    };
    match &member.object {
        Expression::Identifier(id) if STORAGE_OBJECTS.contains(&id.name.as_str()) => {
            Some(id.name.as_str())
        }
        Expression::StaticMemberExpression(inner) => match &inner.object {
            Expression::Identifier(win)
                if win.name == "window"
                    && STORAGE_OBJECTS.contains(&inner.property.name.as_str()) =>
            {
                Some(inner.property.name.as_str())
            }
            _ => None,
        },
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SSR GUARDS
// ═══════════════════════════════════════════════════════════════════════════════

struct StorageGuard<'m, 'a> {
    module: &'m ParsedModule<'a>,
    guard_depth: usize,
    out: PassOutput,
}

impl StorageGuard<'_, '_> {
    fn mentions_window_check(&self, start: u32, end: u32) -> bool {
        TYPEOF_WINDOW_RE.is_match(&self.module.source[start as usize..end as usize])
    }

    fn guard(&mut self, call: &CallExpression<'_>, statement_level: bool) {
        let source = self.module.source;
        let call_text = &source[call.span.start as usize..call.span.end as usize];
        let object = storage_object(call).unwrap_or("storage");
        let replacement = if statement_level {
            format!("{} && {}", WINDOW_GUARD, call_text)
        } else {
            format!("({} && {})", WINDOW_GUARD, call_text)
        };
        self.out.push(
            TextEdit::replace(call.span.start, call.span.end, replacement),
            AppliedTransformation {
                pass: RewritePass::SsrGuards,
                node: NodeKind::Call,
                line: line_of(source, call.span.start),
                description: format!("Guarded {} access for server rendering", object),
                confidence: 0.85,
            },
        );
    }

    fn with_guard(&mut self, guarded: bool, f: impl FnOnce(&mut Self)) {
        if guarded {
            self.guard_depth += 1;
        }
        f(self);
        if guarded {
            self.guard_depth -= 1;
        }
    }
}

impl<'a> Visit<'a> for StorageGuard<'_, 'a> {
    fn visit_if_statement(&mut self, stmt: &IfStatement<'a>) {
        self.visit_expression(&stmt.test);
        let guarded = self.mentions_window_check(stmt.test.span().start, stmt.test.span().end);
        self.with_guard(guarded, |v| {
            v.visit_statement(&stmt.consequent);
            if let Some(alt) = &stmt.alternate {
                v.visit_statement(alt);
            }
        });
    }

    fn visit_conditional_expression(&mut self, expr: &ConditionalExpression<'a>) {
        self.visit_expression(&expr.test);
        let guarded = self.mentions_window_check(expr.test.span().start, expr.test.span().end);
        self.with_guard(guarded, |v| {
            v.visit_expression(&expr.consequent);
            v.visit_expression(&expr.alternate);
        });
    }

    fn visit_logical_expression(&mut self, expr: &LogicalExpression<'a>) {
        self.visit_expression(&expr.left);
        let guarded = self.mentions_window_check(expr.left.span().start, expr.left.span().end);
        self.with_guard(guarded, |v| v.visit_expression(&expr.right));
    }

    fn visit_expression_statement(&mut self, stmt: &ExpressionStatement<'a>) {
        if let Expression::CallExpression(call) = &stmt.expression {
            if self.guard_depth == 0 && storage_object(call).is_some() {
                self.guard(call, true);
                return;
            }
        }
        walk::walk_expression_statement(self, stmt);
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if self.guard_depth == 0 && storage_object(call).is_some() {
            self.guard(call, false);
            return;
        }
        walk::walk_call_expression(self, call);
    }
}

/// Wraps unguarded browser-storage calls in `typeof window !== "undefined" &&`.
pub fn guard_storage_access(module: &ParsedModule<'_>) -> PassOutput {
    let mut visitor = StorageGuard {
        module,
        guard_depth: 0,
        out: PassOutput::default(),
    };
    visitor.visit_program(&module.program);
    visitor.out
}

// ═══════════════════════════════════════════════════════════════════════════════
// USE CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

fn is_test_file(file_path: &str) -> bool {
    let name = Path::new(file_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_path);
    name.contains(".test.") || name.contains(".spec.")
}

/// Prepends `'use client';` to modules that use hooks or browser globals.
pub fn add_use_client(module: &ParsedModule<'_>, file_path: &str) -> PassOutput {
    let ctx = &module.context;
    let mut out = PassOutput::default();

    if is_test_file(file_path)
        || ctx.has_directive("use client")
        || ctx.has_directive("use server")
        || !(ctx.uses_hooks() || ctx.uses_browser_globals())
    {
        return out;
    }

    let reason = if ctx.uses_hooks() {
        let names: Vec<&str> = ctx.hooks.keys().map(|k| k.as_str()).collect();
        format!("uses hooks ({})", names.join(", "))
    } else {
        let names: Vec<&str> = ctx.browser_globals.iter().map(|k| k.as_str()).collect();
        format!("uses browser globals ({})", names.join(", "))
    };

    let source = module.source;
    let edit = match &module.program.hashbang {
        Some(hashbang) => match source[hashbang.span.end as usize..].find('\n') {
            Some(nl) => TextEdit::insert(hashbang.span.end + nl as u32 + 1, "'use client';\n"),
            None => TextEdit::insert(source.len() as u32, "\n'use client';\n"),
        },
        None => TextEdit::insert(0, "'use client';\n"),
    };
    out.push(
        edit,
        AppliedTransformation {
            pass: RewritePass::UseClientDirective,
            node: NodeKind::Directive,
            line: 1,
            description: format!("Added 'use client' directive: module {}", reason),
            confidence: 0.9,
        },
    );
    out
}
