//! # Layerfix Native
//!
//! Layered, dependency-aware fixes for React, TypeScript and JavaScript
//! sources.
//!
//! ## Layers
//!
//! | Id | Layer          | Engine          |
//! |----|----------------|-----------------|
//! | 1  | Configuration  | pattern rules   |
//! | 2  | Entity Cleanup | pattern rules   |
//! | 3  | Components     | AST passes      |
//! | 4  | Hydration      | AST passes      |
//! | 5  | Next.js        | AST passes      |
//! | 6  | Testing        | AST passes      |
//!
//! Layer `n` requires every layer below it; requested selections are
//! completed before anything runs.
//!
//! ## Safety Invariants
//!
//! 1. **Validated commits**: a layer's output replaces the current text only
//!    after `validate::TransformationValidator` accepts it. Otherwise the
//!    layer is rolled back and its record says why.
//!
//! 2. **Isolated failures**: parse errors, generation errors and panics are
//!    recorded on the failing layer. The run continues with the next layer.
//!
//! 3. **Formatting preservation**: AST passes never print a tree. They emit
//!    byte-span edits, so untouched code keeps its exact text.
//!
//! 4. **No shared mutable state**: rule tables are built once and read-only.
//!    Every run, and every parse, owns its data.

#[cfg(feature = "napi")]
use napi_derive::napi;

pub mod batch;
pub mod codegen;
pub mod config;
pub mod detectors;
pub mod engine;
pub mod error;
pub mod hydration;
pub mod hygiene;
pub mod imports;
pub mod keys;
pub mod layers;
pub mod patterns;
pub mod pipeline;
pub mod props;
pub mod selector;
pub mod semantic;
pub mod sinks;
pub mod validate;

#[cfg(test)]
mod pipeline_tests;
#[cfg(test)]
mod property_tests;
#[cfg(test)]
mod safety_tests;

pub use batch::{discover_sources, load_sources, BatchReport, BatchRunner, SourceFile};
pub use config::{ApiRequest, LayerSelection, PipelineOptions, RunRequest};
pub use detectors::{DetectedIssue, HeuristicDetectors, IssueDetectors, Severity};
pub use engine::{AstEngine, PassResult, RewritePass};
pub use error::{ConfigurationError, GenError, LayerExecutionError, ParseError, SinkError};
pub use layers::{correct, DependencyCorrection, LayerId};
pub use patterns::PatternLibrary;
pub use pipeline::{
    run, ExecutionResult, LayerPipeline, LayerRecord, LayerRegistry, LayerStatus,
    LayerTransform, RunOutcome,
};
pub use selector::{LayerRecommendation, LayerSelector};
pub use sinks::{HistorySink, NotificationSink};
pub use validate::{validate, TransformationValidator, ValidationOutcome};

#[cfg(feature = "napi")]
pub use engine::engine_bridge;
#[cfg(feature = "napi")]
pub use layers::correct_layers_native;
#[cfg(feature = "napi")]
pub use pipeline::run_layers_native;
#[cfg(feature = "napi")]
pub use selector::recommend_layers_native;
#[cfg(feature = "napi")]
pub use validate::validate_transformation_native;

/// Installs a stderr `tracing` subscriber. `RUST_LOG` wins over `filter`;
/// calling it again is a no-op.
#[cfg(feature = "napi")]
#[napi]
pub fn init_logging(filter: Option<String>) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(filter.as_deref().unwrap_or("layerfix_native=info"))
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
