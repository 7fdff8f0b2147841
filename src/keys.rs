//! Missing `key` props on JSX produced inside `.map()` callbacks.
//!
//! Key expressions are chosen by a fixed policy, strongest first:
//! `item.id`, `item.key`, `item.uuid`, `item.name`, the callback's index
//! parameter, and finally a literal `index` (adding the parameter when the
//! callback does not declare one).

use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_span::{GetSpan, Span};
use std::collections::{BTreeSet, HashMap};

use crate::codegen::{line_of, TextEdit};
use crate::engine::{AppliedTransformation, NodeKind, PassOutput, RewritePass};
use crate::imports::react_named_import_edit;
use crate::semantic::ParsedModule;

/// (property, confidence) in preference order.
const KEY_POLICY: [(&str, f64); 4] = [("id", 0.9), ("key", 0.9), ("uuid", 0.8), ("name", 0.6)];
const INDEX_PARAM_CONFIDENCE: f64 = 0.4;
const LITERAL_INDEX_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub struct KeyChoice {
    pub expression: String,
    pub confidence: f64,
    pub note: Option<&'static str>,
    /// The callback needs an `index` parameter for the expression to resolve.
    pub needs_index_param: bool,
}

/// Applies the key policy.
///
/// `item` is the callback's item binding when it is a plain identifier,
/// `item_props` the properties known to exist on it, `destructured` the
/// `(key, local)` pairs when the item is destructured instead.
pub fn choose_key(
    item: Option<&str>,
    item_props: &BTreeSet<String>,
    destructured: &[(String, String)],
    index_param: Option<&str>,
) -> KeyChoice {
    for (prop, confidence) in KEY_POLICY {
        let note = (prop == "name").then_some("possibly non-unique");
        if let Some(item) = item {
            if item_props.contains(prop) {
                return KeyChoice {
                    expression: format!("{}.{}", item, prop),
                    confidence,
                    note,
                    needs_index_param: false,
                };
            }
        }
        if let Some((_, local)) = destructured.iter().find(|(k, _)| k == prop) {
            return KeyChoice {
                expression: local.clone(),
                confidence,
                note,
                needs_index_param: false,
            };
        }
    }

    if let Some(index) = index_param {
        return KeyChoice {
            expression: index.to_string(),
            confidence: INDEX_PARAM_CONFIDENCE,
            note: Some("index keys break on reorder"),
            needs_index_param: false,
        };
    }

    KeyChoice {
        expression: "index".to_string(),
        confidence: LITERAL_INDEX_CONFIDENCE,
        note: Some("index keys break on reorder"),
        needs_index_param: true,
    }
}

pub fn insert_missing_keys(module: &ParsedModule<'_>) -> PassOutput {
    let mut shapes = ArrayShapeCollector::default();
    shapes.visit_program(&module.program);

    let mut inserter = KeyInserter {
        module,
        shapes: shapes.shapes,
        out: PassOutput::default(),
        needs_fragment_import: false,
    };
    inserter.visit_program(&module.program);

    let mut out = inserter.out;
    if inserter.needs_fragment_import {
        if let Some(edit) = react_named_import_edit(module, &["Fragment"]) {
            out.push(
                edit,
                AppliedTransformation {
                    pass: RewritePass::MissingKeys,
                    node: NodeKind::Import,
                    line: 1,
                    description: "Imported Fragment from 'react' for a keyed fragment".to_string(),
                    confidence: 1.0,
                },
            );
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// ARRAY SHAPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Static object keys of `const NAME = [{...}, ...]` literals.
#[derive(Default)]
struct ArrayShapeCollector {
    shapes: HashMap<String, BTreeSet<String>>,
}

fn object_keys(array: &ArrayExpression<'_>) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    for elem in &array.elements {
        let Some(Expression::ObjectExpression(obj)) = elem.as_expression() else {
            continue;
        };
        for prop in &obj.properties {
            if let ObjectPropertyKind::ObjectProperty(p) = prop {
                match &p.key {
                    PropertyKey::StaticIdentifier(id) => {
                        keys.insert(id.name.to_string());
                    }
                    PropertyKey::StringLiteral(s) => {
                        keys.insert(s.value.to_string());
                    }
                    _ => {}
                }
            }
        }
    }
    keys
}

impl<'a> Visit<'a> for ArrayShapeCollector {
    fn visit_variable_declarator(&mut self, decl: &VariableDeclarator<'a>) {
        if let (BindingPattern::BindingIdentifier(id), Some(Expression::ArrayExpression(arr))) =
            (&decl.id, &decl.init)
        {
            self.shapes
                .entry(id.name.to_string())
                .or_default()
                .extend(object_keys(arr));
        }
        walk::walk_variable_declarator(self, decl);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CALLBACK ANALYSIS
// ═══════════════════════════════════════════════════════════════════════════════

/// Every identifier read inside a callback body.
#[derive(Default)]
struct ReadCollector {
    names: BTreeSet<String>,
}

impl<'a> Visit<'a> for ReadCollector {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        self.names.insert(ident.name.to_string());
    }
}

/// First of `index`, `_index`, `index2`, `index3`, ... that `taken` rejects.
///
/// An added parameter must not shadow anything the callback body reads.
pub fn fresh_index_name(taken: impl Fn(&str) -> bool) -> String {
    ["index", "_index"]
        .into_iter()
        .map(str::to_string)
        .chain((2..).map(|n| format!("index{}", n)))
        .find(|name| !taken(name))
        .unwrap_or_else(|| "index".to_string())
}

/// `item.prop` accesses on one binding.
struct MemberCollector<'n> {
    object: &'n str,
    props: BTreeSet<String>,
}

impl<'a> Visit<'a> for MemberCollector<'_> {
    fn visit_static_member_expression(&mut self, expr: &StaticMemberExpression<'a>) {
        if let Expression::Identifier(obj) = &expr.object {
            if obj.name == self.object {
                self.props.insert(expr.property.name.to_string());
            }
        }
        walk::walk_static_member_expression(self, expr);
    }
}

enum JsxRoot<'b, 'a> {
    Element(&'b JSXElement<'a>),
    Fragment(&'b JSXFragment<'a>),
}

fn roots_in_expression<'b, 'a>(expr: &'b Expression<'a>, out: &mut Vec<JsxRoot<'b, 'a>>) {
    match expr {
        Expression::JSXElement(elem) => out.push(JsxRoot::Element(elem)),
        Expression::JSXFragment(frag) => out.push(JsxRoot::Fragment(frag)),
        Expression::ParenthesizedExpression(paren) => roots_in_expression(&paren.expression, out),
        Expression::ConditionalExpression(cond) => {
            roots_in_expression(&cond.consequent, out);
            roots_in_expression(&cond.alternate, out);
        }
        Expression::LogicalExpression(logical) => roots_in_expression(&logical.right, out),
        _ => {}
    }
}

/// Returned JSX, without descending into nested functions.
fn roots_in_statements<'b, 'a>(stmts: &'b [Statement<'a>], out: &mut Vec<JsxRoot<'b, 'a>>) {
    for stmt in stmts {
        match stmt {
            Statement::ReturnStatement(ret) => {
                if let Some(arg) = &ret.argument {
                    roots_in_expression(arg, out);
                }
            }
            Statement::BlockStatement(block) => roots_in_statements(&block.body, out),
            Statement::IfStatement(if_stmt) => {
                roots_in_statements(std::slice::from_ref(&if_stmt.consequent), out);
                if let Some(alt) = &if_stmt.alternate {
                    roots_in_statements(std::slice::from_ref(alt), out);
                }
            }
            _ => {}
        }
    }
}

fn has_key_attribute(opening: &JSXOpeningElement<'_>) -> bool {
    opening.attributes.iter().any(|item| match item {
        JSXAttributeItem::Attribute(attr) => {
            matches!(&attr.name, JSXAttributeName::Identifier(id) if id.name == "key")
        }
        JSXAttributeItem::SpreadAttribute(_) => false,
    })
}

struct Callback<'b, 'a> {
    params: &'b FormalParameters<'a>,
    body: &'b FunctionBody<'a>,
    expression_body: bool,
}

fn callback_of<'b, 'a>(arg: &'b Argument<'a>) -> Option<Callback<'b, 'a>> {
    match arg.as_expression()? {
        Expression::ArrowFunctionExpression(arrow) => Some(Callback {
            params: &arrow.params,
            body: &arrow.body,
            expression_body: arrow.expression,
        }),
        Expression::FunctionExpression(func) => Some(Callback {
            params: &func.params,
            body: func.body.as_ref()?,
            expression_body: false,
        }),
        _ => None,
    }
}

fn static_key_name(key: &PropertyKey<'_>) -> Option<String> {
    match key {
        PropertyKey::StaticIdentifier(id) => Some(id.name.to_string()),
        PropertyKey::StringLiteral(s) => Some(s.value.to_string()),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INSERTER
// ═══════════════════════════════════════════════════════════════════════════════

struct KeyInserter<'m, 'a> {
    module: &'m ParsedModule<'a>,
    shapes: HashMap<String, BTreeSet<String>>,
    out: PassOutput,
    needs_fragment_import: bool,
}

impl<'m, 'a> KeyInserter<'m, 'a> {
    fn fragment_name(&mut self) -> String {
        let ctx = &self.module.context;
        if let Some(local) = ctx
            .imports_from("react")
            .flat_map(|i| i.named.iter())
            .find(|n| n.imported == "Fragment" && !n.type_only)
            .map(|n| n.local.clone())
        {
            return local;
        }
        if let Some(react) = ctx.react_binding() {
            return format!("{}.Fragment", react);
        }
        self.needs_fragment_import = true;
        "Fragment".to_string()
    }

    /// Where ` key={..}` goes: right after the tag name, unless type
    /// arguments follow it, then just before the closing `>` or `/>`.
    fn key_insertion_point(&self, opening: &JSXOpeningElement<'_>) -> u32 {
        let source = self.module.source;
        let name_end = opening.name.span().end;
        if !source[name_end as usize..].trim_start().starts_with('<') {
            return name_end;
        }
        let open = &source[opening.span.start as usize..opening.span.end as usize];
        if open.ends_with("/>") {
            opening.span.end - 2
        } else {
            opening.span.end - 1
        }
    }

    fn index_param_edit(&self, params: &FormalParameters<'_>, name: &str) -> TextEdit {
        let source = self.module.source;
        let parenthesized = source[params.span.start as usize..].starts_with('(');
        match params.items.first() {
            None => TextEdit::insert(params.span.end.saturating_sub(1), format!("_item, {}", name)),
            Some(first) if !parenthesized => {
                let text = &source[first.span.start as usize..first.span.end as usize];
                TextEdit::replace(
                    first.span.start,
                    first.span.end,
                    format!("({}, {})", text, name),
                )
            }
            Some(first) => TextEdit::insert(first.span.end, format!(", {}", name)),
        }
    }

    fn process_map_call(&mut self, call: &CallExpression<'a>) {
        let Expression::StaticMemberExpression(member) = &call.callee else {
            return;
        };
        if member.property.name != "map" {
            return;
        }
        let Some(callback) = call.arguments.first().and_then(callback_of) else {
            return;
        };

        let mut roots = Vec::new();
        if callback.expression_body {
            if let Some(Statement::ExpressionStatement(stmt)) = callback.body.statements.first() {
                roots_in_expression(&stmt.expression, &mut roots);
            }
        } else {
            roots_in_statements(&callback.body.statements, &mut roots);
        }

        let missing: Vec<&JsxRoot> = roots
            .iter()
            .filter(|root| match root {
                JsxRoot::Element(elem) => !has_key_attribute(&elem.opening_element),
                JsxRoot::Fragment(_) => true,
            })
            .collect();
        if missing.is_empty() {
            return;
        }

        let mut item_name: Option<String> = None;
        let mut destructured: Vec<(String, String)> = Vec::new();
        match callback.params.items.first().map(|p| &p.pattern) {
            Some(BindingPattern::BindingIdentifier(id)) => item_name = Some(id.name.to_string()),
            Some(BindingPattern::ObjectPattern(obj)) => {
                for prop in &obj.properties {
                    if let (Some(key), BindingPattern::BindingIdentifier(local)) =
                        (static_key_name(&prop.key), &prop.value)
                    {
                        destructured.push((key, local.name.to_string()));
                    } else if let (Some(key), BindingPattern::AssignmentPattern(assign)) =
                        (static_key_name(&prop.key), &prop.value)
                    {
                        if let BindingPattern::BindingIdentifier(local) = &assign.left {
                            destructured.push((key, local.name.to_string()));
                        }
                    }
                }
            }
            _ => {}
        }
        let index_param = match callback.params.items.get(1).map(|p| &p.pattern) {
            Some(BindingPattern::BindingIdentifier(id)) => Some(id.name.to_string()),
            _ => None,
        };

        let mut item_props = BTreeSet::new();
        if let Some(item) = &item_name {
            let mut members = MemberCollector {
                object: item,
                props: BTreeSet::new(),
            };
            members.visit_function_body(callback.body);
            item_props = members.props;

            let shape = match &member.object {
                Expression::Identifier(id) => self.shapes.get(id.name.as_str()).cloned(),
                Expression::ArrayExpression(arr) => Some(object_keys(arr)),
                _ => None,
            };
            item_props.extend(shape.unwrap_or_default());
        }

        let mut choice = choose_key(
            item_name.as_deref(),
            &item_props,
            &destructured,
            index_param.as_deref(),
        );
        if choice.needs_index_param {
            // A non-identifier second parameter leaves no slot for the index.
            if callback.params.items.len() > 1 || callback.params.rest.is_some() {
                return;
            }
            let mut reads = ReadCollector::default();
            reads.visit_function_body(callback.body);
            let ctx = &self.module.context;
            choice.expression =
                fresh_index_name(|name| ctx.is_declared(name) || reads.names.contains(name));
        }
        let description_suffix = choice
            .note
            .map(|n| format!(" ({})", n))
            .unwrap_or_default();

        for root in missing {
            match root {
                JsxRoot::Element(elem) => {
                    let at = self.key_insertion_point(&elem.opening_element);
                    self.out.push(
                        TextEdit::insert(at, format!(" key={{{}}}", choice.expression)),
                        AppliedTransformation {
                            pass: RewritePass::MissingKeys,
                            node: NodeKind::JsxElement,
                            line: line_of(self.module.source, elem.span.start),
                            description: format!(
                                "Added key={{{}}} to element returned from .map(){}",
                                choice.expression, description_suffix
                            ),
                            confidence: choice.confidence,
                        },
                    );
                }
                JsxRoot::Fragment(frag) => {
                    let name = self.fragment_name();
                    let open: Span = frag.opening_fragment.span;
                    let close: Span = frag.closing_fragment.span;
                    self.out.push(
                        TextEdit::replace(
                            open.start,
                            open.end,
                            format!("<{} key={{{}}}>", name, choice.expression),
                        ),
                        AppliedTransformation {
                            pass: RewritePass::MissingKeys,
                            node: NodeKind::JsxFragment,
                            line: line_of(self.module.source, frag.span.start),
                            description: format!(
                                "Replaced fragment shorthand with keyed {}{}",
                                name, description_suffix
                            ),
                            confidence: choice.confidence,
                        },
                    );
                    self.out.edits.push(TextEdit::replace(
                        close.start,
                        close.end,
                        format!("</{}>", name),
                    ));
                }
            }
        }

        if choice.needs_index_param {
            let edit = self.index_param_edit(callback.params, &choice.expression);
            self.out.edits.push(edit);
        }
    }
}

impl<'a> Visit<'a> for KeyInserter<'_, 'a> {
    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        self.process_map_call(call);
        walk::walk_call_expression(self, call);
    }
}
