//! Property tests for dependency correction, rule idempotence and the validator.

#[cfg(test)]
mod tests {
    use crate::config::PipelineOptions;
    use crate::error::LayerExecutionError;
    use crate::layers::{correct, LayerId};
    use crate::patterns::PatternLibrary;
    use crate::pipeline::{LayerOutput, LayerPipeline, LayerRegistry, LayerTransform};
    use crate::validate::{delimiter_balance, TransformationValidator};
    use proptest::prelude::*;

    /// Appends delimiters that leave the text unbalanced.
    struct Unbalancing {
        layer: LayerId,
        suffix: String,
    }

    impl LayerTransform for Unbalancing {
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

    fn layer_set() -> impl Strategy<Value = Vec<LayerId>> {
        proptest::collection::vec(1i64..=6, 0..8).prop_map(|raw| {
            raw.into_iter()
                .filter_map(|n| LayerId::from_number(n).ok())
                .collect()
        })
    }

    /// Fragments the text rules rewrite, glued with neutral filler.
    fn rule_text() -> impl Strategy<Value = String> {
        let token = prop::sample::select(vec![
            "console.log(1);",
            "var a = 1;",
            "<React.Fragment>",
            "</React.Fragment>",
            "&quot;",
            "&#39;",
            "import * as React from 'react';",
            "x",
            " ",
            "\n",
        ]);
        proptest::collection::vec(token, 0..24).prop_map(|tokens| tokens.concat())
    }

    /// Inputs every single rule should settle on after one run, including
    /// the config literals and content glyphs that only some rules touch.
    fn mixed_rule_text() -> impl Strategy<Value = String> {
        let token = prop::sample::select(vec![
            "&amp;",
            "&amp;quot;",
            "&quot;",
            "&#39;",
            "&#x27;",
            "x as any;",
            "y as any[]",
            "style={{ fontSize: 1 }}",
            "style={{ marginTop: 2, color: 'red' }}",
            "<React.Fragment>",
            "</React.Fragment>",
            "console.log(1);",
            "var a = 1;",
            "\u{1F680}",
            "\u{1F527} ",
            "\u{2705}",
            "3\u{FE0F}\u{20E3}",
            "// a \u{2192} b",
            "\u{2190}",
            "<p>",
            "</p>",
            "{label}",
            r#""target": "es5""#,
            r#""strict": false"#,
            "appDir: true,",
            "reactStrictMode: false",
            "x",
            " ",
            "\n",
        ]);
        proptest::collection::vec(token, 0..24).prop_map(|tokens| tokens.concat())
    }

    const STATEMENTS: [&str; 6] = [
        "import React from 'react';",
        "const a = 1;",
        "function f(x) { return x + 1; }",
        "if (a) { f(a); }",
        "const g = () => f(2);",
        "let list = [1, 2, 3];",
    ];

    fn whitespace() -> impl Strategy<Value = String> {
        proptest::collection::vec(prop::sample::select(vec![" ", "\n", "\t"]), 1..4)
            .prop_map(|ws| ws.concat())
    }

    proptest! {
        #[test]
        fn prop_correction_is_idempotent(requested in layer_set()) {
            let once = correct(&requested);
            let twice = correct(&once.corrected);
            prop_assert_eq!(&twice.corrected, &once.corrected);
            prop_assert!(twice.auto_added.is_empty());
            prop_assert!(twice.warnings.is_empty());
        }

        #[test]
        fn prop_correction_is_downward_closed_and_sorted(requested in layer_set()) {
            let corrected = correct(&requested).corrected;
            for layer in &corrected {
                for dep in layer.dependencies() {
                    prop_assert!(corrected.contains(&dep));
                }
            }
            prop_assert!(corrected.windows(2).all(|w| w[0] < w[1]));
            for layer in &requested {
                prop_assert!(corrected.contains(layer));
            }
        }

        #[test]
        fn prop_entity_cleanup_is_idempotent(text in rule_text()) {
            let library = PatternLibrary::standard();
            let once = library.apply_layer(LayerId::EntityCleanup, &text, "a.jsx");
            let twice = library.apply_layer(LayerId::EntityCleanup, &once.text, "a.jsx");
            prop_assert_eq!(&twice.text, &once.text);
            prop_assert!(twice.hits.is_empty());
        }

        #[test]
        fn prop_every_rule_is_idempotent(text in mixed_rule_text()) {
            for rule in PatternLibrary::standard().rules() {
                let (once, _) = rule.apply(&text);
                let (twice, hits) = rule.apply(&once);
                prop_assert_eq!(&twice, &once, "rule {}", rule.name);
                prop_assert_eq!(hits, 0, "rule {}", rule.name);
            }
        }

        #[test]
        fn prop_whitespace_between_statements_is_never_reverted(
            picks in proptest::collection::vec(0usize..STATEMENTS.len(), 1..8),
            gaps in proptest::collection::vec(whitespace(), 8),
        ) {
            let statements: Vec<&str> = picks.iter().map(|&i| STATEMENTS[i]).collect();
            let before = statements.join("\n");
            let mut after = String::new();
            for (stmt, gap) in statements.iter().zip(&gaps) {
                after.push_str(stmt);
                after.push_str(gap);
            }

            let outcome = TransformationValidator::for_path("a.js").validate(&before, &after);
            prop_assert!(!outcome.should_revert, "{:?}", outcome.reason);
        }

        #[test]
        fn prop_unbalanced_layer_output_never_commits(
            suffixes in proptest::collection::vec(
                prop::sample::select(vec!["{", "(", "}", ")", "{{", "((", "{)"]),
                6,
            ),
        ) {
            let registry = LayerId::ALL.iter().zip(&suffixes).fold(
                LayerRegistry::standard(),
                |registry, (layer, suffix)| {
                    registry.with_transform(Box::new(Unbalancing {
                        layer: *layer,
                        suffix: suffix.to_string(),
                    }))
                },
            );
            let src = "function f() { return g(1); }\n";
            let result = LayerPipeline::new().with_registry(registry).execute(
                src,
                "a.js",
                &[LayerId::Testing],
                &PipelineOptions::default(),
            );

            prop_assert_eq!(result.final_code.as_str(), src);
            prop_assert_eq!(delimiter_balance(&result.final_code), delimiter_balance(src));
            prop_assert_eq!(result.successful_layer_count, 0);
        }
    }

    #[test]
    fn test_every_subset_corrects_to_a_prefix() {
        // The chain makes every closure a prefix 1..=max.
        for mask in 0u8..64 {
            let requested: Vec<LayerId> = LayerId::ALL
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1u8 << *i) != 0)
                .map(|(_, l)| *l)
                .collect();
            let corrected = correct(&requested).corrected;
            let expected: Vec<LayerId> = match requested.iter().max() {
                Some(max) => LayerId::ALL
                    .iter()
                    .copied()
                    .filter(|l| l <= max)
                    .collect(),
                None => Vec::new(),
            };
            assert_eq!(corrected, expected, "mask {:#08b}", mask);
        }
    }
}
