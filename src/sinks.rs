//! Fire-and-forget collaborators told about finished runs.
//!
//! A sink failure never affects the run: the pipeline logs it and moves on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SinkError;
use crate::layers::LayerId;
use crate::pipeline::ExecutionResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub result: ExecutionResult,
    pub layers: Vec<LayerId>,
    pub execution_time_ms: f64,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl HistoryEntry {
    pub fn from_result(result: &ExecutionResult, user_id: Option<String>) -> Self {
        HistoryEntry {
            filename: result.file_path.clone(),
            timestamp: Utc::now(),
            layers: result.layers.clone(),
            execution_time_ms: result.total_execution_time_ms,
            result: result.clone(),
            user_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunNotification {
    pub filename: String,
    pub success: bool,
    pub summary: String,
}

impl RunNotification {
    pub fn from_result(result: &ExecutionResult) -> Self {
        RunNotification {
            filename: result.file_path.clone(),
            success: result.success,
            summary: result.summary(),
        }
    }
}

pub trait HistorySink: Send + Sync {
    fn record(&self, entry: &HistoryEntry) -> Result<(), SinkError>;
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &RunNotification) -> Result<(), SinkError>;
}

/// Reports runs as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, notification: &RunNotification) -> Result<(), SinkError> {
        info!(
            file = %notification.filename,
            success = notification.success,
            "{}",
            notification.summary
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineOptions;
    use crate::pipeline::LayerPipeline;

    fn sample() -> ExecutionResult {
        LayerPipeline::new().execute(
            "console.log(1);\n",
            "a.js",
            &[LayerId::EntityCleanup],
            &PipelineOptions::default(),
        )
    }

    #[test]
    fn test_history_entry_copies_run_metadata() {
        let result = sample();
        let entry = HistoryEntry::from_result(&result, Some("u-1".to_string()));
        assert_eq!(entry.filename, "a.js");
        assert_eq!(entry.layers, result.layers);
        assert_eq!(entry.execution_time_ms, result.total_execution_time_ms);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["userId"], "u-1");
        assert!(json["timestamp"].is_string());
        assert_eq!(json["result"]["finalCode"], "console.debug(1);\n");
    }

    #[test]
    fn test_notification_carries_summary() {
        let result = sample();
        let note = RunNotification::from_result(&result);
        assert!(note.success);
        assert_eq!(note.summary, result.summary());
        assert!(TracingNotifier.notify(&note).is_ok());
    }
}
