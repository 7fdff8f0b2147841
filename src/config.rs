//! Run options and request shapes at the crate boundary.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::layers::LayerId;

pub const DEFAULT_MAX_FILE_BYTES: usize = 1024 * 1024;

fn default_true() -> bool {
    true
}

fn default_max_file_bytes() -> usize {
    DEFAULT_MAX_FILE_BYTES
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOptions {
    /// Log one `info` event per layer.
    #[serde(default)]
    pub verbose: bool,
    /// Attach a unified diff to every committed layer.
    #[serde(default)]
    pub include_diff: bool,
    /// Back the brace/paren check with a real parse.
    #[serde(default = "default_true")]
    pub parse_check: bool,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            verbose: false,
            include_diff: false,
            parse_check: true,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

impl PipelineOptions {
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let options: PipelineOptions = serde_json::from_str(json)
            .map_err(|e| ConfigurationError::InvalidOptions(e.to_string()))?;
        if options.max_file_bytes == 0 {
            return Err(ConfigurationError::InvalidOptions(
                "maxFileBytes must be greater than zero".to_string(),
            ));
        }
        Ok(options)
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn include_diff(mut self, include_diff: bool) -> Self {
        self.include_diff = include_diff;
        self
    }

    /// Rejects sources the pipeline will not touch.
    pub fn check_size(&self, file_path: &str, source: &str) -> Result<(), ConfigurationError> {
        if source.len() > self.max_file_bytes {
            return Err(ConfigurationError::SourceTooLarge {
                file_path: file_path.to_string(),
                size: source.len(),
                limit: self.max_file_bytes,
            });
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LAYER SELECTION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKeyword {
    Auto,
    All,
}

/// `"auto"`, `"all"` or an explicit list of layer ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayerSelection {
    Keyword(LayerKeyword),
    Explicit(Vec<i64>),
}

impl Default for LayerSelection {
    fn default() -> Self {
        LayerSelection::Keyword(LayerKeyword::Auto)
    }
}

impl LayerSelection {
    /// `None` means the selector decides.
    pub fn resolve(&self) -> Result<Option<Vec<LayerId>>, ConfigurationError> {
        match self {
            LayerSelection::Keyword(LayerKeyword::Auto) => Ok(None),
            LayerSelection::Keyword(LayerKeyword::All) => Ok(Some(LayerId::ALL.to_vec())),
            LayerSelection::Explicit(ids) => LayerId::parse_list(ids).map(Some),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REQUESTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything one pipeline run needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub source: String,
    pub file_path: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub explicit_layers: Option<Vec<LayerId>>,
    #[serde(default)]
    pub options: PipelineOptions,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl RunRequest {
    pub fn new(source: impl Into<String>, file_path: impl Into<String>) -> Self {
        RunRequest {
            source: source.into(),
            file_path: file_path.into(),
            dry_run: false,
            explicit_layers: None,
            options: PipelineOptions::default(),
            user_id: None,
        }
    }

    pub fn layers(mut self, layers: Vec<LayerId>) -> Self {
        self.explicit_layers = Some(layers);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }
}

/// The shape an HTTP or CLI front end hands in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    pub code: String,
    pub filename: String,
    #[serde(default)]
    pub layers: LayerSelection,
    #[serde(default)]
    pub apply_fixes: bool,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl ApiRequest {
    pub fn into_run_request(self, options: PipelineOptions) -> Result<RunRequest, ConfigurationError> {
        let explicit_layers = self.layers.resolve()?;
        Ok(RunRequest {
            source: self.code,
            file_path: self.filename,
            dry_run: !self.apply_fixes,
            explicit_layers,
            options,
            user_id: self.user_id,
        })
    }
}
