//! Source discovery and parallel runs across files.
//!
//! Files are independent: each worker runs its own pipeline with its own
//! parser arenas, and the report keeps the input order.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::{PipelineOptions, RunRequest};
use crate::error::ConfigurationError;
use crate::layers::LayerId;
use crate::patterns::FileKind;
use crate::pipeline::{ExecutionResult, LayerPipeline, RunOutcome};
use crate::semantic::source_type_for;

const SKIPPED_DIRS: [&str; 6] = ["node_modules", ".next", ".git", "dist", "build", "coverage"];

// ═══════════════════════════════════════════════════════════════════════════════
// DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════════

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

fn is_candidate(path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    source_type_for(&path_str).is_some() || FileKind::of(&path_str).is_config()
}

/// JS/TS sources and known config files under `root`, in path order.
pub fn discover_sources(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_candidate(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    pub path: String,
    pub source: String,
}

/// Reads every path; unreadable files are logged and left out.
pub fn load_sources(paths: &[PathBuf]) -> Vec<SourceFile> {
    paths
        .iter()
        .filter_map(|path| match fs::read_to_string(path) {
            Ok(source) => Some(SourceFile {
                path: path.to_string_lossy().to_string(),
                source,
            }),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read source");
                None
            }
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH RUNS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct BatchRunner {
    pool: ThreadPool,
    workers: usize,
    options: PipelineOptions,
    layers: Option<Vec<LayerId>>,
}

impl BatchRunner {
    /// One worker per CPU core.
    pub fn new() -> Result<Self, ConfigurationError> {
        Self::with_workers(num_cpus::get())
    }

    pub fn with_workers(workers: usize) -> Result<Self, ConfigurationError> {
        if workers == 0 {
            return Err(ConfigurationError::WorkerPool(
                "worker count must be at least 1".to_string(),
            ));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("layerfix-worker-{}", i))
            .build()
            .map_err(|e| ConfigurationError::WorkerPool(e.to_string()))?;
        Ok(BatchRunner {
            pool,
            workers,
            options: PipelineOptions::default(),
            layers: None,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Explicit layers for every file; without them each file gets its own
    /// recommendation.
    pub fn layers(mut self, layers: Vec<LayerId>) -> Self {
        self.layers = Some(layers);
        self
    }

    fn run_one(&self, file: &SourceFile) -> BatchEntry {
        let request = RunRequest {
            source: file.source.clone(),
            file_path: file.path.clone(),
            dry_run: false,
            explicit_layers: self.layers.clone(),
            options: self.options.clone(),
            user_id: None,
        };
        match LayerPipeline::new().run(&request) {
            Ok(RunOutcome::Executed(result)) => BatchEntry {
                file_path: file.path.clone(),
                result: Some(result),
                error: None,
            },
            Ok(RunOutcome::DryRun(_)) => BatchEntry {
                file_path: file.path.clone(),
                result: None,
                error: Some("unexpected dry run".to_string()),
            },
            Err(err) => BatchEntry {
                file_path: file.path.clone(),
                result: None,
                error: Some(err.to_string()),
            },
        }
    }

    pub fn run(&self, files: &[SourceFile]) -> BatchReport {
        debug!(files = files.len(), workers = self.workers, "starting batch");
        let entries: Vec<BatchEntry> = self
            .pool
            .install(|| files.par_iter().map(|file| self.run_one(file)).collect());

        let succeeded = entries
            .iter()
            .filter(|e| e.result.as_ref().is_some_and(|r| r.success))
            .count();
        BatchReport {
            failed: entries.len() - succeeded,
            succeeded,
            entries,
        }
    }

    pub fn run_directory(&self, root: &Path) -> BatchReport {
        self.run(&load_sources(&discover_sources(root)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("layerfix-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        assert!(matches!(
            BatchRunner::with_workers(0),
            Err(ConfigurationError::WorkerPool(_))
        ));
    }

    #[test]
    fn test_discovery_skips_build_dirs_and_unknown_files() {
        let dir = scratch_dir("discover");
        fs::create_dir_all(dir.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(dir.join("src")).unwrap();
        fs::write(dir.join("node_modules/pkg/index.js"), "x").unwrap();
        fs::write(dir.join("src/App.tsx"), "x").unwrap();
        fs::write(dir.join("src/notes.md"), "x").unwrap();
        fs::write(dir.join("tsconfig.json"), "{}").unwrap();

        let found: Vec<String> = discover_sources(&dir)
            .iter()
            .map(|p| p.strip_prefix(&dir).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(found, vec!["src/App.tsx", "tsconfig.json"]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_batch_preserves_input_order() {
        let files: Vec<SourceFile> = (0..8)
            .map(|i| SourceFile {
                path: format!("f{}.js", i),
                source: format!("console.log({});\n", i),
            })
            .collect();
        let report = BatchRunner::with_workers(3)
            .unwrap()
            .layers(vec![LayerId::EntityCleanup])
            .run(&files);

        assert_eq!(report.succeeded, 8);
        for (i, entry) in report.entries.iter().enumerate() {
            assert_eq!(entry.file_path, format!("f{}.js", i));
            let result = entry.result.as_ref().unwrap();
            assert_eq!(result.final_code, format!("console.debug({});\n", i));
        }
    }

    #[test]
    fn test_oversized_files_are_reported_not_run() {
        let files = vec![SourceFile {
            path: "big.js".to_string(),
            source: "x".repeat(16),
        }];
        let report = BatchRunner::with_workers(1)
            .unwrap()
            .options(PipelineOptions {
                max_file_bytes: 8,
                ..PipelineOptions::default()
            })
            .run(&files);
        assert_eq!(report.failed, 1);
        assert!(report.entries[0].error.as_deref().unwrap().contains("byte limit"));
    }
}
