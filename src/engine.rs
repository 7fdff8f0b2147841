//! AST rewrite passes for layers 3 to 6.
//!
//! Each pass parses the current text, collects span edits from the
//! `ParsedModule`, and splices them in with `codegen::emit`. Passes in a layer
//! run one after another, each on the previous pass's output.

#[cfg(feature = "napi")]
use napi_derive::napi;
use oxc_allocator::Allocator;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::codegen::{emit, MappedSpan, TextEdit};
use crate::error::LayerExecutionError;
use crate::layers::LayerId;
use crate::semantic::{parse, source_type_for, ParsedModule};
use crate::{hydration, hygiene, imports, keys, props};

// ═══════════════════════════════════════════════════════════════════════════════
// PASSES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RewritePass {
    MissingKeys,
    ImgAlt,
    HookImports,
    ImportPruning,
    SsrGuards,
    UseClientDirective,
    PropTypes,
    DebuggerRemoval,
}

impl RewritePass {
    pub fn name(self) -> &'static str {
        match self {
            RewritePass::MissingKeys => "missing-keys",
            RewritePass::ImgAlt => "img-alt",
            RewritePass::HookImports => "hook-imports",
            RewritePass::ImportPruning => "import-pruning",
            RewritePass::SsrGuards => "ssr-guards",
            RewritePass::UseClientDirective => "use-client-directive",
            RewritePass::PropTypes => "prop-types",
            RewritePass::DebuggerRemoval => "debugger-removal",
        }
    }

    /// The passes a layer runs, in order. Text layers have none.
    pub fn for_layer(layer: LayerId) -> &'static [RewritePass] {
        match layer {
            LayerId::Configuration | LayerId::EntityCleanup => &[],
            LayerId::Components => &[
                RewritePass::MissingKeys,
                RewritePass::ImgAlt,
                RewritePass::HookImports,
                RewritePass::ImportPruning,
            ],
            LayerId::Hydration => &[RewritePass::SsrGuards],
            LayerId::NextJs => &[RewritePass::UseClientDirective],
            LayerId::Testing => &[RewritePass::PropTypes, RewritePass::DebuggerRemoval],
        }
    }

    fn collect(self, module: &ParsedModule<'_>, file_path: &str) -> PassOutput {
        match self {
            RewritePass::MissingKeys => keys::insert_missing_keys(module),
            RewritePass::ImgAlt => hygiene::add_img_alt(module),
            RewritePass::HookImports => imports::add_missing_hook_imports(module),
            RewritePass::ImportPruning => imports::prune_unused_imports(module),
            RewritePass::SsrGuards => hydration::guard_storage_access(module),
            RewritePass::UseClientDirective => hydration::add_use_client(module, file_path),
            RewritePass::PropTypes => props::infer_prop_types(module, file_path),
            RewritePass::DebuggerRemoval => hygiene::remove_debugger_statements(module),
        }
    }
}

impl fmt::Display for RewritePass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The node kinds the passes touch. Everything else passes through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Import,
    Call,
    JsxElement,
    JsxFragment,
    Conditional,
    Directive,
    Parameter,
    Declaration,
    Statement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedTransformation {
    pub pass: RewritePass,
    pub node: NodeKind,
    pub line: u32,
    pub description: String,
    pub confidence: f64,
}

/// Edits and their descriptions, gathered from one parse.
#[derive(Debug, Default)]
pub struct PassOutput {
    pub edits: Vec<TextEdit>,
    pub applied: Vec<AppliedTransformation>,
}

impl PassOutput {
    pub fn push(&mut self, edit: TextEdit, applied: AppliedTransformation) {
        self.edits.push(edit);
        self.applied.push(applied);
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassResult {
    pub code: String,
    pub applied: Vec<AppliedTransformation>,
    pub source_map: Vec<MappedSpan>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Clone, Copy)]
pub struct AstEngine;

impl AstEngine {
    pub fn new() -> Self {
        AstEngine
    }

    /// Runs one pass. Files that are not JS/TS come back unchanged.
    pub fn run_pass(
        &self,
        pass: RewritePass,
        source: &str,
        file_path: &str,
    ) -> Result<PassResult, LayerExecutionError> {
        if source_type_for(file_path).is_none() {
            return Ok(PassResult {
                code: source.to_string(),
                applied: Vec::new(),
                source_map: Vec::new(),
            });
        }

        let allocator = Allocator::default();
        let module = parse(&allocator, source, file_path)?;
        let output = pass.collect(&module, file_path);
        debug!(
            pass = pass.name(),
            file = file_path,
            edits = output.edits.len(),
            "collected rewrite edits"
        );

        if output.is_empty() {
            return Ok(PassResult {
                code: source.to_string(),
                applied: Vec::new(),
                source_map: Vec::new(),
            });
        }

        let emitted = emit(source, output.edits)?;
        Ok(PassResult {
            code: emitted.code,
            applied: output.applied,
            source_map: emitted.source_map,
        })
    }

    /// Runs `passes` in order, each on the previous output.
    ///
    /// A parse failure on the original text is a `Parse` error. A later pass
    /// that cannot parse what an earlier pass produced is reported as
    /// `InvalidIntermediate` naming the pass that produced it.
    pub fn apply(
        &self,
        passes: &[RewritePass],
        source: &str,
        file_path: &str,
    ) -> Result<PassResult, LayerExecutionError> {
        let mut code = source.to_string();
        let mut applied = Vec::new();
        let mut source_map = Vec::new();
        let mut previous: Option<RewritePass> = None;

        for pass in passes {
            let result = match self.run_pass(*pass, &code, file_path) {
                Ok(result) => result,
                Err(LayerExecutionError::Parse(err)) => match previous {
                    Some(prev) => {
                        return Err(LayerExecutionError::InvalidIntermediate {
                            pass: prev.name().to_string(),
                        })
                    }
                    None => return Err(LayerExecutionError::Parse(err)),
                },
                Err(other) => return Err(other),
            };

            if !result.applied.is_empty() {
                previous = Some(*pass);
                source_map = result.source_map;
            }
            code = result.code;
            applied.extend(result.applied);
        }

        Ok(PassResult {
            code,
            applied,
            source_map,
        })
    }

    pub fn apply_layer(
        &self,
        layer: LayerId,
        source: &str,
        file_path: &str,
    ) -> Result<PassResult, LayerExecutionError> {
        self.apply(RewritePass::for_layer(layer), source, file_path)
    }
}

/// Runs one AST layer without validation or rollback.
#[cfg(feature = "napi")]
#[napi]
pub fn engine_bridge(code: String, filename: String, layer: u32) -> napi::Result<String> {
    let layer =
        LayerId::from_number(i64::from(layer)).map_err(|e| napi::Error::from_reason(e.to_string()))?;
    let result = AstEngine::new()
        .apply_layer(layer, &code, &filename)
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_string(&result)
        .map_err(|e| napi::Error::from_reason(format!("Serialization error: {}", e)))
}
