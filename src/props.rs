//! Prop-type inference for untyped TypeScript components.
//!
//! Only top-level components are considered. A component whose first
//! parameter has no annotation gets a synthesized `interface <Name>Props`
//! right before its statement and the parameter is annotated with it.

use oxc_ast::ast::*;
use oxc_ast_visit::Visit;
use oxc_span::GetSpan;
use std::collections::{BTreeMap, BTreeSet};

use crate::codegen::{line_of, TextEdit};
use crate::engine::{AppliedTransformation, NodeKind, PassOutput, RewritePass};
use crate::semantic::{body_contains_jsx, is_component_name, is_typescript_path, ParsedModule};

const STRING_PROPS: [&str; 9] = [
    "className",
    "title",
    "label",
    "href",
    "src",
    "alt",
    "placeholder",
    "text",
    "variant",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropSpec {
    pub name: String,
    pub ty: String,
    pub optional: bool,
}

struct Candidate<'b, 'a> {
    name: &'b str,
    params: &'b FormalParameters<'a>,
    body: &'b FunctionBody<'a>,
    statement_start: u32,
}

fn has_upper_after(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase())
}

/// Type for a prop from its default value, then its name.
pub fn infer_type(name: &str, default: Option<&Expression<'_>>, react: Option<&str>) -> String {
    let from_default = default.and_then(|expr| match expr {
        Expression::StringLiteral(_) | Expression::TemplateLiteral(_) => Some("string"),
        Expression::NumericLiteral(_) => Some("number"),
        Expression::BooleanLiteral(_) => Some("boolean"),
        Expression::ArrayExpression(_) => Some("unknown[]"),
        Expression::ObjectExpression(_) => Some("Record<string, unknown>"),
        Expression::ArrowFunctionExpression(_) | Expression::FunctionExpression(_) => {
            Some("() => void")
        }
        _ => None,
    });
    if let Some(ty) = from_default {
        return ty.to_string();
    }

    if has_upper_after(name, "on") {
        return "() => void".to_string();
    }
    if name == "children" {
        return match react {
            Some(binding) => format!("{}.ReactNode", binding),
            None => "any".to_string(),
        };
    }
    if has_upper_after(name, "is") || has_upper_after(name, "has") {
        return "boolean".to_string();
    }
    if STRING_PROPS.contains(&name) {
        return "string".to_string();
    }
    "any".to_string()
}

/// Props read through the parameter: `props.a` and `const { b } = props`.
struct PropsAccessCollector<'n> {
    object: &'n str,
    react: Option<&'n str>,
    props: BTreeSet<String>,
    destructured: Vec<PropSpec>,
}

impl<'a> Visit<'a> for PropsAccessCollector<'_> {
    fn visit_static_member_expression(&mut self, expr: &StaticMemberExpression<'a>) {
        if let Expression::Identifier(obj) = &expr.object {
            if obj.name == self.object {
                self.props.insert(expr.property.name.to_string());
            }
        }
        oxc_ast_visit::walk::walk_static_member_expression(self, expr);
    }

    fn visit_variable_declarator(&mut self, decl: &VariableDeclarator<'a>) {
        if let (BindingPattern::ObjectPattern(obj), Some(Expression::Identifier(init))) =
            (&decl.id, &decl.init)
        {
            if init.name == self.object {
                self.destructured
                    .extend(object_pattern_props(obj, self.react));
            }
        }
        oxc_ast_visit::walk::walk_variable_declarator(self, decl);
    }
}

fn object_pattern_props(obj: &ObjectPattern<'_>, react: Option<&str>) -> Vec<PropSpec> {
    obj.properties
        .iter()
        .filter_map(|prop| {
            let name = match &prop.key {
                PropertyKey::StaticIdentifier(id) => id.name.to_string(),
                PropertyKey::StringLiteral(s) => s.value.to_string(),
                _ => return None,
            };
            let (default, optional) = match &prop.value {
                BindingPattern::AssignmentPattern(assign) => (Some(&assign.right), true),
                _ => (None, false),
            };
            let ty = match &prop.value {
                BindingPattern::ObjectPattern(_) | BindingPattern::ArrayPattern(_) => {
                    "any".to_string()
                }
                _ => infer_type(&name, default, react),
            };
            Some(PropSpec { name, ty, optional })
        })
        .collect()
}

fn collect_props(
    pattern: &BindingPattern<'_>,
    body: &FunctionBody<'_>,
    react: Option<&str>,
) -> Vec<PropSpec> {
    match pattern {
        BindingPattern::ObjectPattern(obj) => object_pattern_props(obj, react),
        BindingPattern::BindingIdentifier(id) => {
            let mut reads = PropsAccessCollector {
                object: id.name.as_str(),
                react,
                props: BTreeSet::new(),
                destructured: Vec::new(),
            };
            reads.visit_function_body(body);

            // A destructured default carries more type information than a bare read.
            let mut by_name: BTreeMap<String, PropSpec> = reads
                .props
                .into_iter()
                .map(|name| {
                    let ty = infer_type(&name, None, react);
                    let spec = PropSpec {
                        name: name.clone(),
                        ty,
                        optional: false,
                    };
                    (name, spec)
                })
                .collect();
            for spec in reads.destructured {
                by_name.insert(spec.name.clone(), spec);
            }
            by_name.into_values().collect()
        }
        _ => Vec::new(),
    }
}

/// Interface text placed at a statement start; `indent` re-indents the
/// statement that follows it.
fn render_interface(name: &str, props: &[PropSpec], indent: &str) -> String {
    let mut out = format!("interface {} {{\n", name);
    for p in props {
        out.push_str(&format!(
            "{}  {}{}: {};\n",
            indent,
            p.name,
            if p.optional { "?" } else { "" },
            p.ty
        ));
    }
    out.push_str(&format!("{}}}\n\n{}", indent, indent));
    out
}

fn next_char_after(source: &str, offset: u32) -> Option<char> {
    source[offset as usize..].trim_start().chars().next()
}

fn candidates_in<'b, 'a>(module: &'b ParsedModule<'a>) -> Vec<Candidate<'b, 'a>> {
    let source = module.source;
    let mut found = Vec::new();

    let from_function = |func: &'b Function<'a>, start: u32, found: &mut Vec<Candidate<'b, 'a>>| {
        if let (Some(id), Some(body)) = (&func.id, &func.body) {
            found.push(Candidate {
                name: id.name.as_str(),
                params: &func.params,
                body,
                statement_start: start,
            });
        }
    };

    let from_variables =
        |var: &'b VariableDeclaration<'a>, start: u32, found: &mut Vec<Candidate<'b, 'a>>| {
            for decl in &var.declarations {
                let BindingPattern::BindingIdentifier(id) = &decl.id else {
                    continue;
                };
                // `const X: FC<Props> = ...` is already typed.
                if next_char_after(source, id.span.end) == Some(':') {
                    continue;
                }
                match &decl.init {
                    Some(Expression::ArrowFunctionExpression(arrow)) => found.push(Candidate {
                        name: id.name.as_str(),
                        params: &arrow.params,
                        body: &arrow.body,
                        statement_start: start,
                    }),
                    Some(Expression::FunctionExpression(func)) => {
                        if let Some(body) = &func.body {
                            found.push(Candidate {
                                name: id.name.as_str(),
                                params: &func.params,
                                body,
                                statement_start: start,
                            });
                        }
                    }
                    _ => {}
                }
            }
        };

    for stmt in &module.program.body {
        let start = stmt.span().start;
        match stmt {
            Statement::FunctionDeclaration(func) => from_function(func, start, &mut found),
            Statement::VariableDeclaration(var) => from_variables(var, start, &mut found),
            Statement::ExportNamedDeclaration(export) => match &export.declaration {
                Some(Declaration::FunctionDeclaration(func)) => {
                    from_function(func, start, &mut found)
                }
                Some(Declaration::VariableDeclaration(var)) => {
                    from_variables(var, start, &mut found)
                }
                _ => {}
            },
            Statement::ExportDefaultDeclaration(export) => {
                if let ExportDefaultDeclarationKind::FunctionDeclaration(func) = &export.declaration
                {
                    from_function(func, start, &mut found);
                }
            }
            _ => {}
        }
    }

    found
        .into_iter()
        .filter(|c| is_component_name(c.name) && body_contains_jsx(c.body))
        .collect()
}

pub fn infer_prop_types(module: &ParsedModule<'_>, file_path: &str) -> PassOutput {
    let mut out = PassOutput::default();
    if !is_typescript_path(file_path) {
        return out;
    }

    let source = module.source;
    let ctx = &module.context;
    let react = ctx.react_binding();

    for candidate in candidates_in(module) {
        let Some(first) = candidate.params.items.first() else {
            continue;
        };
        let pattern_end = first.pattern.span().end;
        if matches!(next_char_after(source, pattern_end), Some(':' | '?' | '=')) {
            continue;
        }
        if matches!(first.pattern, BindingPattern::AssignmentPattern(_)) {
            continue;
        }

        let interface_name = format!("{}Props", candidate.name);
        if ctx.types.iter().any(|t| t.name == interface_name) || ctx.is_declared(&interface_name)
        {
            continue;
        }

        let props = collect_props(&first.pattern, candidate.body, react);
        if props.is_empty() {
            continue;
        }

        let line_start = source[..candidate.statement_start as usize]
            .rfind('\n')
            .map_or(0, |i| i + 1);
        let lead = &source[line_start..candidate.statement_start as usize];
        let indent = if lead.trim().is_empty() { lead } else { "" };

        let line = line_of(source, candidate.statement_start);
        out.push(
            TextEdit::insert(
                candidate.statement_start,
                render_interface(&interface_name, &props, indent),
            ),
            AppliedTransformation {
                pass: RewritePass::PropTypes,
                node: NodeKind::Declaration,
                line,
                description: format!(
                    "Declared {} with {} inferred prop(s) for {}",
                    interface_name,
                    props.len(),
                    candidate.name
                ),
                confidence: 0.7,
            },
        );

        let parenthesized = source[candidate.params.span.start as usize..].starts_with('(');
        let annotation = if parenthesized {
            TextEdit::insert(pattern_end, format!(": {}", interface_name))
        } else {
            let text = &source[first.span.start as usize..first.span.end as usize];
            TextEdit::replace(
                first.span.start,
                first.span.end,
                format!("({}: {})", text, interface_name),
            )
        };
        out.push(
            annotation,
            AppliedTransformation {
                pass: RewritePass::PropTypes,
                node: NodeKind::Parameter,
                line,
                description: format!("Annotated {} props as {}", candidate.name, interface_name),
                confidence: 0.7,
            },
        );
    }

    out
}
