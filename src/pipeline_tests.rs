//! Pipeline behavior: error isolation, fallbacks, reporting and sinks.

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::config::{PipelineOptions, RunRequest};
    use crate::detectors::{DetectedIssue, IssueDetectors, Severity};
    use crate::error::{ConfigurationError, LayerExecutionError, SinkError};
    use crate::layers::LayerId;
    use crate::pipeline::{
        ExecutionState, LayerOutput, LayerPipeline, LayerRegistry, LayerStatus, LayerTransform,
        RunOutcome,
    };
    use crate::selector::LayerSelector;
    use crate::sinks::{HistoryEntry, HistorySink, NotificationSink, RunNotification};

    struct Panics;

    impl LayerTransform for Panics {
        fn layer(&self) -> LayerId {
            LayerId::EntityCleanup
        }

        fn transform(&self, _: &str, _: &str) -> Result<LayerOutput, LayerExecutionError> {
            panic!("rule table exploded")
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        history: Arc<Mutex<Vec<HistoryEntry>>>,
        notes: Arc<Mutex<Vec<RunNotification>>>,
    }

    impl HistorySink for Recorder {
        fn record(&self, entry: &HistoryEntry) -> Result<(), SinkError> {
            self.history.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    impl NotificationSink for Recorder {
        fn notify(&self, notification: &RunNotification) -> Result<(), SinkError> {
            self.notes.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct Failing;

    impl HistorySink for Failing {
        fn record(&self, _: &HistoryEntry) -> Result<(), SinkError> {
            Err(SinkError {
                sink: "history".to_string(),
                reason: "offline".to_string(),
            })
        }
    }

    /// Reports one high-severity hydration issue for every file.
    struct AlwaysHydration;

    impl IssueDetectors for AlwaysHydration {
        fn configuration(&self, _: &str, _: &str) -> Vec<DetectedIssue> {
            Vec::new()
        }
        fn patterns(&self, _: &str, _: &str) -> Vec<DetectedIssue> {
            Vec::new()
        }
        fn components(&self, _: &str, _: &str) -> Vec<DetectedIssue> {
            Vec::new()
        }
        fn hydration(&self, _: &str, _: &str) -> Vec<DetectedIssue> {
            vec![DetectedIssue {
                issue_type: "unguarded-storage".to_string(),
                severity: Severity::High,
                description: "stub".to_string(),
                fixed_by_layer: LayerId::Hydration,
                pattern_name: "stub".to_string(),
                occurrence_count: 2,
            }]
        }
        fn nextjs(&self, _: &str, _: &str) -> Vec<DetectedIssue> {
            Vec::new()
        }
        fn testing(&self, _: &str, _: &str) -> Vec<DetectedIssue> {
            Vec::new()
        }
    }

    #[test]
    fn test_panicking_layer_is_recorded_and_run_continues() {
        let pipeline = LayerPipeline::new()
            .with_registry(LayerRegistry::standard().with_transform(Box::new(Panics)));
        let src = "const list = xs.map(x => <i>{x.id}</i>);\n";
        let result = pipeline.execute(
            src,
            "a.jsx",
            &[LayerId::Components],
            &PipelineOptions::default(),
        );

        let panicked = result.record(LayerId::EntityCleanup).unwrap();
        assert_eq!(panicked.status, LayerStatus::Failed);
        assert!(panicked
            .error
            .as_deref()
            .unwrap()
            .contains("rule table exploded"));

        let components = result.record(LayerId::Components).unwrap();
        assert_eq!(components.status, LayerStatus::Committed);
        assert!(result.final_code.contains("key={x.id}"));
    }

    #[test]
    fn test_parse_failure_disables_remaining_ast_layers() {
        let src = "const a = ;\nconsole.log(a);\n";
        let result = LayerPipeline::new().execute(
            src,
            "a.js",
            &[LayerId::Hydration],
            &PipelineOptions::default(),
        );

        // Text layers still ran.
        assert!(result.final_code.contains("console.debug"));
        let components = result.record(LayerId::Components).unwrap();
        assert_eq!(components.status, LayerStatus::Failed);
        let hydration = result.record(LayerId::Hydration).unwrap();
        assert!(hydration
            .error
            .as_deref()
            .unwrap()
            .starts_with("AST layers disabled after parse failure"));
        assert_eq!(result.successful_layer_count, 2);
        assert!(!result.success);
    }

    #[test]
    fn test_entity_cleanup_commits_with_arrow_in_jsx_text() {
        let result = LayerPipeline::new().execute(
            "const a = <p>&quot;Next \u{2192}</p>;\n",
            "a.jsx",
            &[LayerId::EntityCleanup],
            &PipelineOptions::default(),
        );
        let record = result.record(LayerId::EntityCleanup).unwrap();
        assert_eq!(record.status, LayerStatus::Committed);
        assert_eq!(result.final_code, "const a = <p>\"Next {'->'}</p>;\n");
    }

    #[test]
    fn test_trace_records_every_transition() {
        let result = LayerPipeline::new().execute(
            "export const a = 1;\n",
            "a.ts",
            &[LayerId::EntityCleanup],
            &PipelineOptions::default(),
        );
        assert_eq!(
            result.trace,
            vec![
                ExecutionState::Pending,
                ExecutionState::Running(LayerId::Configuration),
                ExecutionState::Committed(LayerId::Configuration),
                ExecutionState::Running(LayerId::EntityCleanup),
                ExecutionState::Committed(LayerId::EntityCleanup),
                ExecutionState::Done,
            ]
        );
        assert_eq!(result.auto_added, vec![LayerId::Configuration]);
        assert_eq!(result.dependency_warnings.len(), 1);
    }

    #[test]
    fn test_diff_and_improvements_on_commit() {
        let options = PipelineOptions::default().include_diff(true);
        let result = LayerPipeline::new().execute(
            "var a = 1;\nconsole.log(a);\n",
            "a.js",
            &[LayerId::EntityCleanup],
            &options,
        );
        let record = result.record(LayerId::EntityCleanup).unwrap();
        assert_eq!(record.change_count, 2);
        assert_eq!(
            record.improvements,
            vec![
                "Replaced console.log with console.debug",
                "Replaced var declarations with let"
            ]
        );
        let diff = record.diff.as_deref().unwrap();
        assert!(diff.contains("-var a = 1;\n"));
        assert!(diff.contains("+let a = 1;\n"));
        assert_eq!(record.rule_hits.len(), 2);

        // No diff for layers that changed nothing.
        assert!(result.record(LayerId::Configuration).unwrap().diff.is_none());
    }

    #[test]
    fn test_summary_names_failures() {
        let pipeline = LayerPipeline::new()
            .with_registry(LayerRegistry::standard().with_transform(Box::new(Panics)));
        let result = pipeline.execute(
            "x;\n",
            "a.js",
            &[LayerId::EntityCleanup],
            &PipelineOptions::default(),
        );
        let summary = result.summary();
        assert!(summary.starts_with("1/2 layers succeeded for a.js"));
        assert!(summary.contains("layer 2 (Entity Cleanup) failed: Layer panicked: rule table exploded"));
    }

    #[test]
    fn test_sinks_receive_executed_runs() {
        let recorder = Recorder::default();
        let pipeline = LayerPipeline::new()
            .with_history(Box::new(recorder.clone()))
            .with_notifier(Box::new(recorder.clone()));

        let mut request = RunRequest::new("console.log(1);\n", "a.js").layers(vec![LayerId::EntityCleanup]);
        request.user_id = Some("u-7".to_string());
        pipeline.run(&request).unwrap();

        let history = recorder.history.lock().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].filename, "a.js");
        assert_eq!(history[0].user_id.as_deref(), Some("u-7"));
        assert_eq!(
            history[0].layers,
            vec![LayerId::Configuration, LayerId::EntityCleanup]
        );

        let notes = recorder.notes.lock().unwrap();
        assert!(notes[0].success);
        assert!(notes[0].summary.starts_with("2/2 layers succeeded"));
    }

    #[test]
    fn test_sink_failure_does_not_fail_the_run() {
        let pipeline = LayerPipeline::new().with_history(Box::new(Failing));
        let outcome = pipeline
            .run(&RunRequest::new("x;\n", "a.js").layers(vec![LayerId::Configuration]))
            .unwrap();
        assert!(outcome.executed().unwrap().success);
    }

    #[test]
    fn test_dry_run_uses_injected_detectors() {
        let pipeline =
            LayerPipeline::new().with_selector(LayerSelector::with_detectors(AlwaysHydration));
        let outcome = pipeline
            .run(&RunRequest::new("x;\n", "a.js").dry_run(true))
            .unwrap();
        let RunOutcome::DryRun(report) = outcome else {
            panic!("expected a dry run");
        };
        assert!(report.dry_run);
        assert_eq!(
            report.recommended_layers,
            vec![
                LayerId::Configuration,
                LayerId::EntityCleanup,
                LayerId::Components,
                LayerId::Hydration
            ]
        );
        assert_eq!(report.estimated_change_count, 2);
        assert!((report.analysis.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_dry_run_with_explicit_layers_is_corrected() {
        let outcome = LayerPipeline::new()
            .run(
                &RunRequest::new("console.log(1); console.log(2);\n", "a.js")
                    .dry_run(true)
                    .layers(vec![LayerId::EntityCleanup]),
            )
            .unwrap();
        let RunOutcome::DryRun(report) = outcome else {
            panic!("expected a dry run");
        };
        assert_eq!(
            report.recommended_layers,
            vec![LayerId::Configuration, LayerId::EntityCleanup]
        );
        assert_eq!(report.estimated_change_count, 2);
    }

    #[test]
    fn test_oversized_source_is_rejected() {
        let options = PipelineOptions {
            max_file_bytes: 4,
            ..PipelineOptions::default()
        };
        let err = LayerPipeline::new()
            .run(&RunRequest::new("123456", "a.js").options(options))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::SourceTooLarge { size: 6, .. }));
    }

    #[test]
    fn test_outcome_serializes_camel_case() {
        let outcome = LayerPipeline::new()
            .run(&RunRequest::new("x;\n", "a.js").layers(vec![LayerId::Configuration]))
            .unwrap();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["finalCode"], "x;\n");
        assert_eq!(json["perLayerRecords"][0]["layerId"], 1);
        assert_eq!(json["perLayerRecords"][0]["status"], "committed");
        assert_eq!(json["trace"][0]["state"], "pending");
        assert_eq!(json["trace"][1]["layer"], 1);
    }
}
