//! Small accessibility and leftover-code fixes.

use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};

use crate::codegen::{line_of, TextEdit};
use crate::engine::{AppliedTransformation, NodeKind, PassOutput, RewritePass};
use crate::semantic::ParsedModule;

struct ImgAlt<'m, 'a> {
    module: &'m ParsedModule<'a>,
    out: PassOutput,
}

impl<'a> Visit<'a> for ImgAlt<'_, 'a> {
    fn visit_jsx_opening_element(&mut self, opening: &JSXOpeningElement<'a>) {
        let is_img = matches!(&opening.name, JSXElementName::Identifier(id) if id.name == "img");
        // A spread may already carry `alt`.
        let covered = opening.attributes.iter().any(|item| match item {
            JSXAttributeItem::Attribute(attr) => {
                matches!(&attr.name, JSXAttributeName::Identifier(id) if id.name == "alt")
            }
            JSXAttributeItem::SpreadAttribute(_) => true,
        });

        if is_img && !covered {
            let at = opening.span.start + 1 + "img".len() as u32;
            self.out.push(
                TextEdit::insert(at, " alt=\"\""),
                AppliedTransformation {
                    pass: RewritePass::ImgAlt,
                    node: NodeKind::JsxElement,
                    line: line_of(self.module.source, opening.span.start),
                    description: "Added empty alt attribute to <img>".to_string(),
                    confidence: 0.8,
                },
            );
        }
        walk::walk_jsx_opening_element(self, opening);
    }
}

pub fn add_img_alt(module: &ParsedModule<'_>) -> PassOutput {
    let mut visitor = ImgAlt {
        module,
        out: PassOutput::default(),
    };
    visitor.visit_program(&module.program);
    visitor.out
}

struct DebuggerRemoval<'m, 'a> {
    module: &'m ParsedModule<'a>,
    out: PassOutput,
}

impl<'a> Visit<'a> for DebuggerRemoval<'_, 'a> {
    fn visit_debugger_statement(&mut self, stmt: &DebuggerStatement) {
        let source = self.module.source;
        let (start, end) = (stmt.span.start, stmt.span.end);
        let before = source[..start as usize].trim_end().chars().last();

        // `if (x) debugger;` needs an empty statement in its place.
        let edit = match before {
            None | Some(';' | '{' | '}' | ':') => TextEdit::remove_line_aware(source, start, end),
            Some(_) => TextEdit::replace(start, end, ";"),
        };
        self.out.push(
            edit,
            AppliedTransformation {
                pass: RewritePass::DebuggerRemoval,
                node: NodeKind::Statement,
                line: line_of(source, start),
                description: "Removed debugger statement".to_string(),
                confidence: 0.95,
            },
        );
    }
}

pub fn remove_debugger_statements(module: &ParsedModule<'_>) -> PassOutput {
    let mut visitor = DebuggerRemoval {
        module,
        out: PassOutput::default(),
    };
    visitor.visit_program(&module.program);
    visitor.out
}
