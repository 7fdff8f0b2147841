//! Parsing and the per-file semantic context.
//!
//! A file is parsed once per pass with oxc, and one visitor walk builds the
//! `SemanticContext` the rewrite passes read from: imports, exports,
//! components, hooks, state variables, declared types and the external
//! packages the module depends on. The context is read-only once built.

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::SourceType;
use oxc_syntax::operator::UnaryOperator;
use oxc_syntax::scope::ScopeFlags;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use crate::codegen::line_of;
use crate::error::ParseError;

/// Globals that only exist in a browser.
pub const BROWSER_GLOBALS: [&str; 5] = [
    "window",
    "document",
    "localStorage",
    "sessionStorage",
    "navigator",
];

/// Hooks that ship with React and can be imported from `react`.
pub const REACT_HOOKS: [&str; 15] = [
    "useState",
    "useEffect",
    "useContext",
    "useReducer",
    "useCallback",
    "useMemo",
    "useRef",
    "useLayoutEffect",
    "useImperativeHandle",
    "useDebugValue",
    "useId",
    "useTransition",
    "useDeferredValue",
    "useSyncExternalStore",
    "useInsertionEffect",
];

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// oxc source type for a path, or `None` when the file is not JS/TS.
pub fn source_type_for(file_path: &str) -> Option<SourceType> {
    let ext = Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())?
        .to_ascii_lowercase();

    let base = SourceType::default().with_module(true);
    match ext.as_str() {
        "ts" | "mts" | "cts" => Some(base.with_typescript(true)),
        "tsx" => Some(base.with_typescript(true).with_jsx(true)),
        "js" | "jsx" | "mjs" | "cjs" => Some(base.with_jsx(true)),
        _ => None,
    }
}

pub fn is_typescript_path(file_path: &str) -> bool {
    source_type_for(file_path).is_some_and(|st| st.is_typescript())
}

/// `useX` where X starts uppercase, e.g. `useState`, `useCart`.
pub fn is_hook_name(name: &str) -> bool {
    name.len() > 3
        && name.starts_with("use")
        && name[3..].chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

pub fn is_component_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// `lodash/fp` -> `lodash`, `@scope/pkg/sub` -> `@scope/pkg`.
pub fn package_name(specifier: &str) -> Option<String> {
    if specifier.starts_with('.') || specifier.starts_with('/') || specifier.is_empty() {
        return None;
    }
    let mut parts = specifier.split('/');
    let first = parts.next()?;
    if first.starts_with('@') {
        let second = parts.next()?;
        return Some(format!("{}/{}", first, second));
    }
    Some(first.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTEXT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedImport {
    pub imported: String,
    pub local: String,
    pub type_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecord {
    pub source: String,
    pub default: Option<String>,
    pub namespace: Option<String>,
    pub named: Vec<NamedImport>,
    pub type_only: bool,
    pub side_effect_only: bool,
    pub line: u32,
}

impl ImportRecord {
    pub fn local_names(&self) -> impl Iterator<Item = &str> {
        self.default
            .iter()
            .chain(self.namespace.iter())
            .map(|s| s.as_str())
            .chain(self.named.iter().map(|n| n.local.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportKind {
    Named,
    Default,
    ReExport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub name: String,
    pub kind: ExportKind,
    pub type_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComponentKind {
    Function,
    Arrow,
    Wrapped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInfo {
    pub name: String,
    pub kind: ComponentKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookUsage {
    pub name: String,
    pub call_count: usize,
    /// Called as `useX()` rather than `React.useX()`.
    pub bare: bool,
    pub first_line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeKind {
    Interface,
    Alias,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDeclaration {
    pub name: String,
    pub kind: TypeKind,
    pub exported: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticContext {
    pub imports: Vec<ImportRecord>,
    pub exports: Vec<ExportRecord>,
    pub components: Vec<ComponentInfo>,
    pub hooks: BTreeMap<String, HookUsage>,
    pub state_variables: Vec<String>,
    pub types: Vec<TypeDeclaration>,
    pub external_dependencies: BTreeSet<String>,
    pub browser_globals: BTreeSet<String>,
    pub declared_bindings: HashSet<String>,
    pub directives: Vec<String>,
}

impl SemanticContext {
    pub fn imports_from<'c>(&'c self, source: &'c str) -> impl Iterator<Item = &'c ImportRecord> {
        self.imports.iter().filter(move |i| i.source == source)
    }

    /// Any import binds `local` in this module.
    pub fn imports_local(&self, local: &str) -> bool {
        self.imports
            .iter()
            .any(|i| i.local_names().any(|n| n == local))
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.declared_bindings.contains(name)
    }

    pub fn has_directive(&self, directive: &str) -> bool {
        self.directives.iter().any(|d| d == directive)
    }

    pub fn uses_hooks(&self) -> bool {
        !self.hooks.is_empty()
    }

    pub fn uses_browser_globals(&self) -> bool {
        !self.browser_globals.is_empty()
    }

    /// `React` is reachable as a default or namespace binding.
    pub fn react_binding(&self) -> Option<&str> {
        self.imports_from("react")
            .find_map(|i| i.default.as_deref().or(i.namespace.as_deref()))
    }

    pub fn is_exported(&self, name: &str) -> bool {
        self.exports.iter().any(|e| e.name == name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSING
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ParsedModule<'a> {
    pub program: Program<'a>,
    pub context: SemanticContext,
    pub source: &'a str,
    pub source_type: SourceType,
}

/// Parses `source` and builds its semantic context.
pub fn parse<'a>(
    allocator: &'a Allocator,
    source: &'a str,
    file_path: &str,
) -> Result<ParsedModule<'a>, ParseError> {
    let Some(source_type) = source_type_for(file_path) else {
        return Err(ParseError {
            file_path: file_path.to_string(),
            messages: vec!["unsupported file type".to_string()],
        });
    };

    let ret = Parser::new(allocator, source, source_type).parse();
    if ret.panicked || !ret.errors.is_empty() {
        return Err(ParseError {
            file_path: file_path.to_string(),
            messages: ret.errors.iter().map(|e| e.to_string()).collect(),
        });
    }

    let context = build_context(&ret.program, source);
    Ok(ParsedModule {
        program: ret.program,
        context,
        source,
        source_type,
    })
}

/// Whether `source` parses cleanly as the file type of `file_path`.
/// Files that are not JS/TS count as parseable.
pub fn parses_cleanly(source: &str, file_path: &str) -> bool {
    let Some(source_type) = source_type_for(file_path) else {
        return true;
    };
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type).parse();
    !ret.panicked && ret.errors.is_empty()
}

pub fn build_context(program: &Program<'_>, source: &str) -> SemanticContext {
    let mut collector = ContextCollector {
        source,
        ctx: SemanticContext::default(),
    };
    collector.ctx.directives = program
        .directives
        .iter()
        .map(|d| d.expression.value.to_string())
        .collect();
    collector.visit_program(program);

    let mut ctx = collector.ctx;
    let exported: HashSet<String> = ctx.exports.iter().map(|e| e.name.clone()).collect();
    for ty in &mut ctx.types {
        ty.exported = exported.contains(&ty.name);
    }
    ctx
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLECTOR
// ═══════════════════════════════════════════════════════════════════════════════

struct ContextCollector<'s> {
    source: &'s str,
    ctx: SemanticContext,
}

impl ContextCollector<'_> {
    fn record_hook(&mut self, name: &str, bare: bool, offset: u32) {
        let line = line_of(self.source, offset);
        let usage = self
            .ctx
            .hooks
            .entry(name.to_string())
            .or_insert_with(|| HookUsage {
                name: name.to_string(),
                call_count: 0,
                bare,
                first_line: line,
            });
        usage.call_count += 1;
        usage.bare |= bare;
    }

    fn record_component(&mut self, name: &str, kind: ComponentKind, offset: u32) {
        if self.ctx.components.iter().any(|c| c.name == name) {
            return;
        }
        self.ctx.components.push(ComponentInfo {
            name: name.to_string(),
            kind,
            line: line_of(self.source, offset),
        });
    }

    fn record_export(&mut self, name: &str, kind: ExportKind, type_only: bool) {
        self.ctx.exports.push(ExportRecord {
            name: name.to_string(),
            kind,
            type_only,
        });
    }

    fn record_declaration_exports(&mut self, decl: &Declaration<'_>, type_only: bool) {
        match decl {
            Declaration::VariableDeclaration(var) => {
                for d in &var.declarations {
                    let mut names = Vec::new();
                    binding_names(&d.id, &mut names);
                    for n in names {
                        self.record_export(&n, ExportKind::Named, type_only);
                    }
                }
            }
            Declaration::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    self.record_export(&id.name, ExportKind::Named, type_only);
                }
            }
            Declaration::ClassDeclaration(class) => {
                if let Some(id) = &class.id {
                    self.record_export(&id.name, ExportKind::Named, type_only);
                }
            }
            Declaration::TSInterfaceDeclaration(decl) => {
                self.record_export(&decl.id.name, ExportKind::Named, true);
            }
            Declaration::TSTypeAliasDeclaration(decl) => {
                self.record_export(&decl.id.name, ExportKind::Named, true);
            }
            Declaration::TSEnumDeclaration(decl) => {
                self.record_export(&decl.id.name, ExportKind::Named, type_only);
            }
            _ => {}
        }
    }
}

/// Binding names introduced by a pattern.
pub fn binding_names(pattern: &BindingPattern<'_>, out: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => out.push(id.name.to_string()),
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                binding_names(&prop.value, out);
            }
            if let Some(rest) = &obj.rest {
                binding_names(&rest.argument, out);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for elem in arr.elements.iter().flatten() {
                binding_names(elem, out);
            }
            if let Some(rest) = &arr.rest {
                binding_names(&rest.argument, out);
            }
        }
        BindingPattern::AssignmentPattern(assign) => binding_names(&assign.left, out),
    }
}

/// Name of the hook a callee invokes, bare or through `React.`.
pub fn hook_callee<'b>(callee: &'b Expression<'_>) -> Option<(&'b str, bool)> {
    match callee {
        Expression::Identifier(id) if is_hook_name(&id.name) => Some((id.name.as_str(), true)),
        Expression::StaticMemberExpression(member) => match &member.object {
            Expression::Identifier(obj)
                if obj.name == "React" && is_hook_name(&member.property.name) =>
            {
                Some((member.property.name.as_str(), false))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Finds any JSX below the node it is pointed at.
#[derive(Default)]
pub struct JsxFinder {
    pub found: bool,
}

impl<'a> Visit<'a> for JsxFinder {
    fn visit_jsx_element(&mut self, _elem: &JSXElement<'a>) {
        self.found = true;
    }

    fn visit_jsx_fragment(&mut self, _frag: &JSXFragment<'a>) {
        self.found = true;
    }
}

pub fn body_contains_jsx(body: &FunctionBody<'_>) -> bool {
    let mut finder = JsxFinder::default();
    finder.visit_function_body(body);
    finder.found
}

fn function_like_has_jsx(expr: &Expression<'_>) -> Option<ComponentKind> {
    match expr {
        Expression::ArrowFunctionExpression(arrow) => {
            body_contains_jsx(&arrow.body).then_some(ComponentKind::Arrow)
        }
        Expression::FunctionExpression(func) => func
            .body
            .as_ref()
            .filter(|b| body_contains_jsx(b))
            .map(|_| ComponentKind::Function),
        Expression::ParenthesizedExpression(paren) => function_like_has_jsx(&paren.expression),
        // memo(...), forwardRef(...), React.memo(...)
        Expression::CallExpression(call) => call
            .arguments
            .first()
            .and_then(|a| a.as_expression())
            .and_then(function_like_has_jsx)
            .map(|_| ComponentKind::Wrapped),
        _ => None,
    }
}

impl<'a> Visit<'a> for ContextCollector<'_> {
    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        let source = decl.source.value.to_string();
        let mut record = ImportRecord {
            source: source.clone(),
            type_only: decl.import_kind.is_type(),
            side_effect_only: decl.specifiers.is_none(),
            line: line_of(self.source, decl.span.start),
            ..ImportRecord::default()
        };

        if let Some(specifiers) = &decl.specifiers {
            for spec in specifiers {
                match spec {
                    ImportDeclarationSpecifier::ImportSpecifier(s) => {
                        record.named.push(NamedImport {
                            imported: s.imported.name().to_string(),
                            local: s.local.name.to_string(),
                            type_only: s.import_kind.is_type(),
                        });
                    }
                    ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                        record.default = Some(s.local.name.to_string());
                    }
                    ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                        record.namespace = Some(s.local.name.to_string());
                    }
                }
            }
        }

        if let Some(pkg) = package_name(&source) {
            self.ctx.external_dependencies.insert(pkg);
        }
        self.ctx.imports.push(record);
        walk::walk_import_declaration(self, decl);
    }

    fn visit_export_named_declaration(&mut self, decl: &ExportNamedDeclaration<'a>) {
        let type_only = decl.export_kind.is_type();
        if let Some(declaration) = &decl.declaration {
            self.record_declaration_exports(declaration, type_only);
        }
        let kind = if decl.source.is_some() {
            ExportKind::ReExport
        } else {
            ExportKind::Named
        };
        for spec in &decl.specifiers {
            let name = spec.exported.name().to_string();
            self.record_export(&name, kind, type_only || spec.export_kind.is_type());
        }
        if let Some(pkg) = decl.source.as_ref().and_then(|s| package_name(&s.value)) {
            self.ctx.external_dependencies.insert(pkg);
        }
        walk::walk_export_named_declaration(self, decl);
    }

    fn visit_export_default_declaration(&mut self, decl: &ExportDefaultDeclaration<'a>) {
        self.record_export("default", ExportKind::Default, false);
        walk::walk_export_default_declaration(self, decl);
    }

    fn visit_export_all_declaration(&mut self, decl: &ExportAllDeclaration<'a>) {
        self.record_export("*", ExportKind::ReExport, decl.export_kind.is_type());
        if let Some(pkg) = package_name(&decl.source.value) {
            self.ctx.external_dependencies.insert(pkg);
        }
        walk::walk_export_all_declaration(self, decl);
    }

    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        if let (Some(id), Some(body)) = (&func.id, &func.body) {
            if is_component_name(&id.name) && body_contains_jsx(body) {
                self.record_component(&id.name, ComponentKind::Function, func.span.start);
            }
        }
        walk::walk_function(self, func, flags);
    }

    fn visit_variable_declarator(&mut self, decl: &VariableDeclarator<'a>) {
        if let BindingPattern::BindingIdentifier(id) = &decl.id {
            if is_component_name(&id.name) {
                if let Some(kind) = decl.init.as_ref().and_then(function_like_has_jsx) {
                    self.record_component(&id.name, kind, decl.span.start);
                }
            }
        }

        if let (BindingPattern::ArrayPattern(arr), Some(Expression::CallExpression(call))) =
            (&decl.id, &decl.init)
        {
            if let Some((hook, _)) = hook_callee(&call.callee) {
                if hook == "useState" || hook == "useReducer" {
                    if let Some(Some(BindingPattern::BindingIdentifier(state))) =
                        arr.elements.first()
                    {
                        self.ctx.state_variables.push(state.name.to_string());
                    }
                }
            }
        }

        walk::walk_variable_declarator(self, decl);
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Some((hook, bare)) = hook_callee(&call.callee) {
            self.record_hook(hook, bare, call.span.start);
        }
        if let Expression::Identifier(id) = &call.callee {
            if id.name == "require" {
                if let Some(Expression::StringLiteral(lit)) =
                    call.arguments.first().and_then(|a| a.as_expression())
                {
                    if let Some(pkg) = package_name(&lit.value) {
                        self.ctx.external_dependencies.insert(pkg);
                    }
                }
            }
        }
        walk::walk_call_expression(self, call);
    }

    fn visit_unary_expression(&mut self, expr: &UnaryExpression<'a>) {
        // `typeof window` checks for the global, it does not use it.
        if expr.operator == UnaryOperator::Typeof
            && matches!(expr.argument, Expression::Identifier(_))
        {
            return;
        }
        walk::walk_unary_expression(self, expr);
    }

    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if BROWSER_GLOBALS.contains(&ident.name.as_str()) {
            self.ctx.browser_globals.insert(ident.name.to_string());
        }
    }

    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.ctx.declared_bindings.insert(ident.name.to_string());
    }

    fn visit_ts_interface_declaration(&mut self, decl: &TSInterfaceDeclaration<'a>) {
        self.ctx.types.push(TypeDeclaration {
            name: decl.id.name.to_string(),
            kind: TypeKind::Interface,
            exported: false,
        });
        walk::walk_ts_interface_declaration(self, decl);
    }

    fn visit_ts_type_alias_declaration(&mut self, decl: &TSTypeAliasDeclaration<'a>) {
        self.ctx.types.push(TypeDeclaration {
            name: decl.id.name.to_string(),
            kind: TypeKind::Alias,
            exported: false,
        });
        walk::walk_ts_type_alias_declaration(self, decl);
    }
}
