//! Safe layer execution.
//!
//! Each layer runs against the last committed text. Its output is validated
//! and either committed or rolled back, so a file is never left worse than
//! its last committed snapshot. Layer errors and panics are recorded and the
//! run moves on to the next layer.
//!
//! ```text
//! Pending -> Running(n) -> Committed(n) | RolledBack(n) | Failed(n) -> ... -> Done
//! ```

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{PipelineOptions, RunRequest};
use crate::detectors::{HeuristicDetectors, IssueDetectors};
use crate::engine::{AppliedTransformation, AstEngine};
use crate::error::{ConfigurationError, LayerExecutionError};
use crate::layers::{correct, LayerId};
use crate::patterns::{PatternLibrary, RuleHit};
use crate::selector::{LayerRecommendation, LayerSelector};
use crate::sinks::{HistoryEntry, HistorySink, NotificationSink, RunNotification};
use crate::validate::TransformationValidator;

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFORMS
// ═══════════════════════════════════════════════════════════════════════════════

/// What one layer produced, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerOutput {
    pub code: String,
    pub applied: Vec<AppliedTransformation>,
    pub rule_hits: Vec<RuleHit>,
}

impl LayerOutput {
    pub fn unchanged(source: &str) -> Self {
        LayerOutput {
            code: source.to_string(),
            ..LayerOutput::default()
        }
    }
}

pub trait LayerTransform: Send + Sync {
    fn layer(&self) -> LayerId;
    fn transform(&self, source: &str, file_path: &str) -> Result<LayerOutput, LayerExecutionError>;
}

/// Layers 1 and 2: ordered regex rules.
#[derive(Debug, Clone, Copy)]
pub struct PatternLayer {
    layer: LayerId,
}

impl PatternLayer {
    pub fn new(layer: LayerId) -> Self {
        PatternLayer { layer }
    }
}

impl LayerTransform for PatternLayer {
    fn layer(&self) -> LayerId {
        self.layer
    }

    fn transform(&self, source: &str, file_path: &str) -> Result<LayerOutput, LayerExecutionError> {
        let application = PatternLibrary::standard().apply_layer(self.layer, source, file_path);
        Ok(LayerOutput {
            code: application.text,
            applied: Vec::new(),
            rule_hits: application.hits,
        })
    }
}

/// Layers 3 to 6: AST rewrite passes.
#[derive(Debug, Clone, Copy)]
pub struct AstLayer {
    layer: LayerId,
    engine: AstEngine,
}

impl AstLayer {
    pub fn new(layer: LayerId) -> Self {
        AstLayer {
            layer,
            engine: AstEngine::new(),
        }
    }
}

impl LayerTransform for AstLayer {
    fn layer(&self) -> LayerId {
        self.layer
    }

    fn transform(&self, source: &str, file_path: &str) -> Result<LayerOutput, LayerExecutionError> {
        let result = self.engine.apply_layer(self.layer, source, file_path)?;
        Ok(LayerOutput {
            code: result.code,
            applied: result.applied,
            rule_hits: Vec::new(),
        })
    }
}

pub struct LayerRegistry {
    transforms: BTreeMap<LayerId, Box<dyn LayerTransform>>,
}

impl LayerRegistry {
    pub fn empty() -> Self {
        LayerRegistry {
            transforms: BTreeMap::new(),
        }
    }

    pub fn standard() -> Self {
        LayerId::ALL
            .iter()
            .fold(LayerRegistry::empty(), |registry, layer| {
                if layer.requires_ast() {
                    registry.with_transform(Box::new(AstLayer::new(*layer)))
                } else {
                    registry.with_transform(Box::new(PatternLayer::new(*layer)))
                }
            })
    }

    /// Registers `transform` for its layer, replacing any existing one.
    pub fn with_transform(mut self, transform: Box<dyn LayerTransform>) -> Self {
        self.transforms.insert(transform.layer(), transform);
        self
    }

    pub fn get(&self, layer: LayerId) -> Option<&dyn LayerTransform> {
        self.transforms.get(&layer).map(|t| t.as_ref())
    }
}

impl Default for LayerRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerStatus {
    Committed,
    RolledBack,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "layer", rename_all = "camelCase")]
pub enum ExecutionState {
    Pending,
    Running(LayerId),
    Committed(LayerId),
    RolledBack(LayerId),
    Failed(LayerId),
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerRecord {
    pub layer_id: LayerId,
    pub status: LayerStatus,
    pub success: bool,
    pub resulting_code: String,
    pub execution_time_ms: f64,
    pub change_count: usize,
    pub improvements: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub applied: Vec<AppliedTransformation>,
    pub rule_hits: Vec<RuleHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl LayerRecord {
    fn unsuccessful(
        layer: LayerId,
        status: LayerStatus,
        current: &str,
        elapsed_ms: f64,
    ) -> Self {
        LayerRecord {
            layer_id: layer,
            status,
            success: false,
            resulting_code: current.to_string(),
            execution_time_ms: elapsed_ms,
            change_count: 0,
            improvements: Vec::new(),
            revert_reason: None,
            error: None,
            applied: Vec::new(),
            rule_hits: Vec::new(),
            diff: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub file_path: String,
    pub success: bool,
    pub final_code: String,
    pub layers: Vec<LayerId>,
    pub per_layer_records: Vec<LayerRecord>,
    pub all_intermediate_states: Vec<String>,
    pub trace: Vec<ExecutionState>,
    pub total_execution_time_ms: f64,
    pub successful_layer_count: usize,
    pub dependency_warnings: Vec<String>,
    pub auto_added: Vec<LayerId>,
}

impl ExecutionResult {
    pub fn total_changes(&self) -> usize {
        self.per_layer_records.iter().map(|r| r.change_count).sum()
    }

    pub fn record(&self, layer: LayerId) -> Option<&LayerRecord> {
        self.per_layer_records.iter().find(|r| r.layer_id == layer)
    }

    /// One line for notifications and logs.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{}/{} layers succeeded for {} ({} change(s), {:.1}ms)",
            self.successful_layer_count,
            self.per_layer_records.len(),
            self.file_path,
            self.total_changes(),
            self.total_execution_time_ms
        );
        let failures: Vec<String> = self
            .per_layer_records
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                let why = r
                    .revert_reason
                    .as_deref()
                    .or(r.error.as_deref())
                    .unwrap_or("unknown");
                match r.status {
                    LayerStatus::RolledBack => format!("layer {} rolled back: {}", r.layer_id, why),
                    _ => format!("layer {} failed: {}", r.layer_id, why),
                }
            })
            .collect();
        if !failures.is_empty() {
            line.push_str("; ");
            line.push_str(&failures.join("; "));
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunReport {
    pub dry_run: bool,
    pub recommended_layers: Vec<LayerId>,
    pub analysis: LayerRecommendation,
    pub estimated_change_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunOutcome {
    DryRun(DryRunReport),
    Executed(ExecutionResult),
}

impl RunOutcome {
    pub fn executed(self) -> Option<ExecutionResult> {
        match self {
            RunOutcome::Executed(result) => Some(result),
            RunOutcome::DryRun(_) => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHANGE ACCOUNTING
// ═══════════════════════════════════════════════════════════════════════════════

/// Line-count delta plus the number of line positions whose text differs.
pub fn count_changes(before: &str, after: &str) -> usize {
    let a: Vec<&str> = before.lines().collect();
    let b: Vec<&str> = after.lines().collect();
    let differing = a.iter().zip(b.iter()).filter(|(x, y)| x != y).count();
    a.len().abs_diff(b.len()) + differing
}

fn occurrences(text: &str, needle: &str) -> usize {
    text.matches(needle).count()
}

fn entity_count(text: &str) -> usize {
    ["&quot;", "&amp;", "&#x27;", "&#39;"]
        .iter()
        .map(|e| occurrences(text, e))
        .sum()
}

fn import_count(text: &str) -> usize {
    text.lines()
        .filter(|l| l.trim_start().starts_with("import "))
        .count()
}

fn var_count(text: &str) -> usize {
    text.split(|c: char| !c.is_alphanumeric() && c != '_' && c != '$')
        .filter(|w| *w == "var")
        .count()
}

/// Fixed before/after predicates naming what a committed layer improved.
pub fn detect_improvements(before: &str, after: &str) -> Vec<String> {
    if before == after {
        return Vec::new();
    }
    let more = |needle: &str| occurrences(after, needle) > occurrences(before, needle);
    let fewer = |needle: &str| occurrences(after, needle) < occurrences(before, needle);

    let checks = [
        (
            "Normalized configuration",
            more("\"ES2020\"")
                || fewer("appDir")
                || more("reactStrictMode: true")
                || more("\"strict\": true"),
        ),
        (
            "Decoded HTML entities",
            entity_count(after) < entity_count(before),
        ),
        ("Replaced console.log with console.debug", fewer("console.log")),
        (
            "Replaced var declarations with let",
            var_count(after) < var_count(before),
        ),
        ("Added missing key props", more("key={")),
        ("Added alt attributes", more("alt=")),
        ("Updated imports", import_count(after) != import_count(before)),
        ("Added SSR guards", more("typeof window")),
        ("Added 'use client' directive", more("'use client'")),
        ("Added prop type definitions", more("interface ")),
        ("Removed debugger statements", fewer("debugger")),
    ];

    let found: Vec<String> = checks
        .iter()
        .filter(|(_, applies)| *applies)
        .map(|(label, _)| label.to_string())
        .collect();
    if found.is_empty() {
        return vec!["Code style improvements".to_string()];
    }
    found
}

pub fn unified_diff(before: &str, after: &str) -> String {
    let diff = TextDiff::from_lines(before, after);
    let mut output = String::new();

    for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
        if idx > 0 {
            output.push_str("...\n");
        }
        for op in group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Delete => "-",
                    ChangeTag::Insert => "+",
                    ChangeTag::Equal => " ",
                };
                output.push_str(sign);
                output.push_str(change.value());
                if change.missing_newline() {
                    output.push('\n');
                }
            }
        }
    }

    output
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

pub struct LayerPipeline<D = HeuristicDetectors> {
    registry: LayerRegistry,
    selector: LayerSelector<D>,
    history: Option<Box<dyn HistorySink>>,
    notifier: Option<Box<dyn NotificationSink>>,
}

impl LayerPipeline<HeuristicDetectors> {
    pub fn new() -> Self {
        LayerPipeline {
            registry: LayerRegistry::standard(),
            selector: LayerSelector::new(),
            history: None,
            notifier: None,
        }
    }
}

impl Default for LayerPipeline<HeuristicDetectors> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: IssueDetectors> LayerPipeline<D> {
    pub fn with_registry(mut self, registry: LayerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_selector<E: IssueDetectors>(self, selector: LayerSelector<E>) -> LayerPipeline<E> {
        LayerPipeline {
            registry: self.registry,
            selector,
            history: self.history,
            notifier: self.notifier,
        }
    }

    pub fn with_history(mut self, sink: Box<dyn HistorySink>) -> Self {
        self.history = Some(sink);
        self
    }

    pub fn with_notifier(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.notifier = Some(sink);
        self
    }

    pub fn recommend(&self, source: &str, file_path: &str) -> LayerRecommendation {
        self.selector.recommend(source, file_path)
    }

    /// Runs a request end to end. Only an invalid request is an error.
    pub fn run(&self, request: &RunRequest) -> Result<RunOutcome, ConfigurationError> {
        let options = &request.options;
        options.check_size(&request.file_path, &request.source)?;

        if request.dry_run {
            let analysis = self.selector.recommend(&request.source, &request.file_path);
            let recommended_layers = match &request.explicit_layers {
                Some(layers) => correct(layers).corrected,
                None => analysis.recommended_layers.clone(),
            };
            let estimated_change_count = analysis.estimated_change_count(&recommended_layers);
            return Ok(RunOutcome::DryRun(DryRunReport {
                dry_run: true,
                recommended_layers,
                analysis,
                estimated_change_count,
            }));
        }

        let requested = match &request.explicit_layers {
            Some(layers) => layers.clone(),
            None => {
                self.selector
                    .recommend(&request.source, &request.file_path)
                    .recommended_layers
            }
        };
        let result = self.execute(&request.source, &request.file_path, &requested, options);
        self.publish(&result, request.user_id.clone());
        Ok(RunOutcome::Executed(result))
    }

    /// Corrects `requested` and runs each layer in ascending order.
    pub fn execute(
        &self,
        source: &str,
        file_path: &str,
        requested: &[LayerId],
        options: &PipelineOptions,
    ) -> ExecutionResult {
        let run_start = Instant::now();
        let correction = correct(requested);
        for warning in &correction.warnings {
            debug!(file = file_path, "{}", warning);
        }

        let validator =
            TransformationValidator::for_path(file_path).with_parse_check(options.parse_check);
        let mut current = source.to_string();
        let mut states = vec![current.clone()];
        let mut trace = vec![ExecutionState::Pending];
        let mut records = Vec::with_capacity(correction.corrected.len());
        let mut ast_disabled: Option<String> = None;

        for &layer in &correction.corrected {
            trace.push(ExecutionState::Running(layer));
            debug!(file = file_path, layer = layer.number(), "running layer");
            let started = Instant::now();

            let disabled = ast_disabled.clone().filter(|_| layer.requires_ast());
            let record = match (disabled, self.registry.get(layer)) {
                (Some(reason), _) => {
                    let mut record = LayerRecord::unsuccessful(
                        layer,
                        LayerStatus::Failed,
                        &current,
                        elapsed_ms(started),
                    );
                    record.error = Some(reason);
                    record
                }
                (_, None) => {
                    let mut record = LayerRecord::unsuccessful(
                        layer,
                        LayerStatus::Failed,
                        &current,
                        elapsed_ms(started),
                    );
                    record.error = Some(format!("No transform registered for layer {}", layer));
                    record
                }
                (_, Some(transform)) => {
                    let outcome =
                        panic::catch_unwind(AssertUnwindSafe(|| transform.transform(&current, file_path)))
                            .unwrap_or_else(|payload| {
                                Err(LayerExecutionError::Panicked(panic_message(payload)))
                            });
                    self.settle(layer, outcome, &mut current, &validator, options, started, &mut ast_disabled)
                }
            };

            match record.status {
                LayerStatus::Committed => trace.push(ExecutionState::Committed(layer)),
                LayerStatus::RolledBack => trace.push(ExecutionState::RolledBack(layer)),
                LayerStatus::Failed => trace.push(ExecutionState::Failed(layer)),
            }
            if options.verbose {
                info!(
                    file = file_path,
                    layer = layer.number(),
                    status = ?record.status,
                    changes = record.change_count,
                    "layer finished"
                );
            }
            states.push(current.clone());
            records.push(record);
        }
        trace.push(ExecutionState::Done);

        let successful_layer_count = records.iter().filter(|r| r.success).count();
        ExecutionResult {
            file_path: file_path.to_string(),
            success: successful_layer_count == records.len(),
            final_code: current,
            layers: correction.corrected,
            per_layer_records: records,
            all_intermediate_states: states,
            trace,
            total_execution_time_ms: elapsed_ms(run_start),
            successful_layer_count,
            dependency_warnings: correction.warnings,
            auto_added: correction.auto_added,
        }
    }

    /// Validates a layer's output and commits or rolls it back.
    #[allow(clippy::too_many_arguments)]
    fn settle(
        &self,
        layer: LayerId,
        outcome: Result<LayerOutput, LayerExecutionError>,
        current: &mut String,
        validator: &TransformationValidator,
        options: &PipelineOptions,
        started: Instant,
        ast_disabled: &mut Option<String>,
    ) -> LayerRecord {
        let output = match outcome {
            Ok(output) => output,
            Err(err) => {
                warn!(layer = layer.number(), error = %err, "layer failed");
                if let LayerExecutionError::Parse(parse_err) = &err {
                    if parse_err.fallback_to_regex() {
                        *ast_disabled = Some(format!(
                            "AST layers disabled after parse failure: {}",
                            parse_err
                        ));
                    }
                }
                let mut record =
                    LayerRecord::unsuccessful(layer, LayerStatus::Failed, current, elapsed_ms(started));
                record.error = Some(err.to_string());
                return record;
            }
        };

        let check = validator.validate(current, &output.code);
        if check.should_revert {
            warn!(
                layer = layer.number(),
                reason = check.reason.as_deref().unwrap_or_default(),
                "layer rolled back"
            );
            let mut record =
                LayerRecord::unsuccessful(layer, LayerStatus::RolledBack, current, elapsed_ms(started));
            record.revert_reason = check.reason;
            return record;
        }

        let change_count = count_changes(current, &output.code);
        let improvements = detect_improvements(current, &output.code);
        let diff = (options.include_diff && change_count > 0)
            .then(|| unified_diff(current, &output.code));
        *current = output.code;

        LayerRecord {
            layer_id: layer,
            status: LayerStatus::Committed,
            success: true,
            resulting_code: current.clone(),
            execution_time_ms: elapsed_ms(started),
            change_count,
            improvements,
            revert_reason: None,
            error: None,
            applied: output.applied,
            rule_hits: output.rule_hits,
            diff,
        }
    }

    fn publish(&self, result: &ExecutionResult, user_id: Option<String>) {
        if let Some(history) = &self.history {
            if let Err(err) = history.record(&HistoryEntry::from_result(result, user_id)) {
                warn!(error = %err, "history sink failed");
            }
        }
        if let Some(notifier) = &self.notifier {
            if let Err(err) = notifier.notify(&RunNotification::from_result(result)) {
                warn!(error = %err, "notification sink failed");
            }
        }
    }
}

/// Runs the standard pipeline once.
pub fn run(
    source: &str,
    file_path: &str,
    dry_run: bool,
    explicit_layers: Option<&[LayerId]>,
    options: PipelineOptions,
) -> Result<RunOutcome, ConfigurationError> {
    let mut request = RunRequest::new(source, file_path)
        .dry_run(dry_run)
        .options(options);
    request.explicit_layers = explicit_layers.map(|l| l.to_vec());
    LayerPipeline::new().run(&request)
}

#[cfg(feature = "napi")]
#[napi]
pub fn run_layers_native(request_json: String, options_json: Option<String>) -> napi::Result<String> {
    let api: crate::config::ApiRequest = serde_json::from_str(&request_json)
        .map_err(|e| napi::Error::from_reason(format!("Invalid request: {}", e)))?;
    let options = match options_json {
        Some(json) => PipelineOptions::from_json(&json)
            .map_err(|e| napi::Error::from_reason(e.to_string()))?,
        None => PipelineOptions::default(),
    };
    let request = api
        .into_run_request(options)
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    let outcome = LayerPipeline::new()
        .with_notifier(Box::new(crate::sinks::TracingNotifier))
        .run(&request)
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_string(&outcome)
        .map_err(|e| napi::Error::from_reason(format!("Serialization error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_changes() {
        assert_eq!(count_changes("a\nb", "a\nb"), 0);
        assert_eq!(count_changes("a\nb", "a\nc"), 1);
        assert_eq!(count_changes("a", "x\ny\nz"), 3);
    }

    #[test]
    fn test_improvements() {
        assert_eq!(
            detect_improvements("console.log(1)", "console.debug(1)"),
            vec!["Replaced console.log with console.debug"]
        );
        assert_eq!(detect_improvements("a", "b"), vec!["Code style improvements"]);
        assert!(detect_improvements("a", "a").is_empty());
    }

    #[test]
    fn test_unified_diff_marks_lines() {
        let diff = unified_diff("a\nold\nc\n", "a\nnew\nc\n");
        assert!(diff.contains("-old\n"));
        assert!(diff.contains("+new\n"));
    }

    #[test]
    fn test_standard_registry_covers_every_layer() {
        let registry = LayerRegistry::standard();
        for layer in LayerId::ALL {
            assert_eq!(registry.get(layer).map(|t| t.layer()), Some(layer));
        }
    }
}
