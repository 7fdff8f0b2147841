//! Safety gate tests for the validator and rollback.
//!
//! These verify the guarantees a caller relies on:
//! - whitespace-only edits are never reverted
//! - a vanished critical import always reverts, naming the import
//! - a rolled-back or failed layer leaves the committed text untouched

#[cfg(test)]
mod tests {
    use crate::config::PipelineOptions;
    use crate::error::LayerExecutionError;
    use crate::layers::LayerId;
    use crate::pipeline::{LayerOutput, LayerPipeline, LayerRegistry, LayerStatus, LayerTransform};
    use crate::validate::{validate, TransformationValidator, CORRUPTION_SIGNATURES};
    use pretty_assertions::assert_eq;

    // ═══════════════════════════════════════════════════════════════════════════════
    // VALIDATOR SOUNDNESS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_whitespace_only_changes_are_kept() {
        let before = "import React, { useState } from 'react';\nfunction A() {\n  return <div>{useState(0)[0]}</div>;\n}\n";
        let after = "import React, { useState } from 'react';\n\nfunction A() {\n    return <div>{useState(0)[0]}</div>;\n}\n\n";
        let v = TransformationValidator::for_path("A.jsx");
        assert!(!v.validate(before, after).should_revert);
    }

    #[test]
    fn test_each_critical_import_is_named_when_removed() {
        let cases = [
            ("import React from 'react';\n", "React"),
            ("import { useState } from 'react';\n", "useState"),
            ("import { useEffect as e, useEffect } from 'react';\n", "useEffect"),
        ];
        for (before, name) in cases {
            let out = validate(before, "// gone\n");
            assert!(out.should_revert, "{}", name);
            assert!(out.reason.unwrap().contains(name));
        }
    }

    #[test]
    fn test_unrelated_import_removal_is_allowed() {
        let out = validate(
            "import React from 'react';\nimport { a } from './a';\n",
            "import React from 'react';\n",
        );
        assert!(!out.should_revert);
    }

    #[test]
    fn test_check_order_balance_before_signatures() {
        let out = validate("x", "() => () => {");
        assert!(out.reason.unwrap().starts_with("Syntax check failed"));
    }

    #[test]
    fn test_every_signature_has_a_positive_example() {
        let samples = [
            "onClick={() => () => go()}",
            "<a href=\"x\"=\"y\" />",
            "import a from 'a';\nimport a from 'a';\n",
            "const f = x => => x;",
            "'use client';\n'use client';\n",
        ];
        for (signature, sample) in CORRUPTION_SIGNATURES.iter().zip(samples) {
            assert!(signature.matches(sample), "{}", signature.name);
            assert!(!signature.matches("const ok = 1;\n"), "{}", signature.name);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // ROLLBACK
    // ═══════════════════════════════════════════════════════════════════════════════

    struct Emits {
        layer: LayerId,
        suffix: &'static str,
    }

    impl LayerTransform for Emits {
        fn layer(&self) -> LayerId {
            self.layer
        }

        fn transform(&self, source: &str, _: &str) -> Result<LayerOutput, LayerExecutionError> {
            Ok(LayerOutput {
                code: format!("{}{}", source, self.suffix),
                ..LayerOutput::default()
            })
        }
    }

    fn pipeline_with(transforms: Vec<Emits>) -> LayerPipeline {
        let registry = transforms
            .into_iter()
            .fold(LayerRegistry::standard(), |r, t| r.with_transform(Box::new(t)));
        LayerPipeline::new().with_registry(registry)
    }

    #[test]
    fn test_unbalanced_output_is_rolled_back() {
        let pipeline = pipeline_with(vec![Emits {
            layer: LayerId::EntityCleanup,
            suffix: "\nfunction broken() {\n",
        }]);
        let src = "export const a = 1;\n";
        let result = pipeline.execute(
            src,
            "a.js",
            &[LayerId::EntityCleanup],
            &PipelineOptions::default(),
        );
        let record = result.record(LayerId::EntityCleanup).unwrap();
        assert_eq!(record.status, LayerStatus::RolledBack);
        assert_eq!(record.change_count, 0);
        assert_eq!(record.resulting_code, src);
        assert_eq!(result.final_code, src);
        assert!(!result.success);
    }

    #[test]
    fn test_later_layers_run_on_last_committed_text() {
        let pipeline = pipeline_with(vec![
            Emits {
                layer: LayerId::Configuration,
                suffix: "// one\n",
            },
            Emits {
                layer: LayerId::EntityCleanup,
                suffix: "if (",
            },
            Emits {
                layer: LayerId::Components,
                suffix: "// three\n",
            },
        ]);
        let result = pipeline.execute(
            "",
            "a.js",
            &[LayerId::Components],
            &PipelineOptions::default(),
        );
        assert_eq!(result.final_code, "// one\n// three\n");
        assert_eq!(
            result.all_intermediate_states,
            vec!["", "// one\n", "// one\n", "// one\n// three\n"]
        );
        assert_eq!(result.successful_layer_count, 2);
    }

    #[test]
    fn test_output_never_parses_worse_than_input() {
        let pipeline = pipeline_with(vec![Emits {
            layer: LayerId::Configuration,
            suffix: "const = ;",
        }]);
        let result = pipeline.execute(
            "let ok = 1;\n",
            "a.js",
            &[LayerId::Configuration],
            &PipelineOptions::default(),
        );
        assert_eq!(result.final_code, "let ok = 1;\n");
        assert_eq!(
            result.per_layer_records[0].revert_reason.as_deref(),
            Some("Syntax check failed: transformed code no longer parses")
        );
    }
}
