//! YAML and TOML configuration file support.
//!
//! A configuration file sets global quantization settings (`layout`,
//! `min_elements`, `excluded_layers`), run behaviour (`validate`, `strict`)
//! and the list of models to process. Without a file, [`Config::face_models`]
//! provides the built-in detector / recognizer pair.

use crate::batch::{int8_sibling, ModelJob};
use crate::errors::{QuantizeError, Result};
use crate::quantization::{QuantConfig, WeightLayout};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding the bundled face models, relative to the working directory.
pub const DEFAULT_MODEL_DIR: &str = "android/app/src/main/assets/models";

/// Top-level quantization configuration.
///
/// Can be loaded from a YAML or TOML file with [`Config::from_file`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default write-back layout. Defaults to `in-place`.
    #[serde(default)]
    pub layout: WeightLayout,

    /// Tensors with fewer elements stay FLOAT. Defaults to `0`.
    #[serde(default)]
    pub min_elements: usize,

    /// Initializer names never quantized, for every model.
    #[serde(default)]
    pub excluded_layers: Vec<String>,

    /// Load each produced model with the inference engine.
    #[serde(default)]
    pub validate: bool,

    /// Exit non-zero when any model fails.
    #[serde(default)]
    pub strict: bool,

    /// Models to quantize, in order.
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

/// Per-model settings and overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Display name. Defaults to the input file name.
    #[serde(default)]
    pub name: Option<String>,

    /// Path to the input ONNX model.
    pub input: String,

    /// Path for the quantized model. Defaults to the `*_int8` sibling.
    #[serde(default)]
    pub output: Option<String>,

    /// Override layout for this model.
    #[serde(default)]
    pub layout: Option<WeightLayout>,

    /// Extra names excluded for this model only.
    #[serde(default)]
    pub excluded_layers: Vec<String>,

    /// Skip this model if the output file already exists.
    #[serde(default)]
    pub skip_existing: bool,
}

impl ModelConfig {
    pub fn new(name: &str, input: impl Into<String>) -> Self {
        Self {
            name: Some(name.to_string()),
            input: input.into(),
            output: None,
            layout: None,
            excluded_layers: Vec::new(),
            skip_existing: false,
        }
    }

    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            Path::new(&self.input)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.input.clone())
        })
    }

    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(output) => PathBuf::from(output),
            None => int8_sibling(&self.input),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::face_models()
    }
}

impl Config {
    /// The SCRFD detector and ArcFace recognizer shipped with the app.
    pub fn face_models() -> Self {
        Self {
            layout: WeightLayout::default(),
            min_elements: 0,
            excluded_layers: Vec::new(),
            validate: false,
            strict: false,
            models: vec![
                ModelConfig::new(
                    "SCRFD Detector",
                    format!("{DEFAULT_MODEL_DIR}/scrfd_10g_bnkps.onnx"),
                ),
                ModelConfig::new(
                    "ArcFace Recognizer",
                    format!("{DEFAULT_MODEL_DIR}/w600k_r50.onnx"),
                ),
            ],
        }
    }

    /// Load a config from a YAML or TOML file (auto-detected by extension).
    ///
    /// # Errors
    ///
    /// Returns [`QuantizeError::Config`] on I/O, parse, or unsupported format errors.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path.extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| QuantizeError::Config { reason: "Config file has no extension".into() })?;

        let content = std::fs::read_to_string(path)
            .map_err(|e| QuantizeError::Config { reason: format!("Failed to read config file '{}': {e}", path.display()) })?;

        match extension {
            "yaml" | "yml" => Self::from_yaml(&content),
            "toml" => Self::from_toml(&content),
            _ => Err(QuantizeError::Config { reason: format!("Unsupported config format: {}", extension) }),
        }
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| QuantizeError::Config { reason: format!("Failed to parse YAML config: {e}") })
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| QuantizeError::Config { reason: format!("Failed to parse TOML config: {e}") })
    }

    /// Validate the configuration (non-empty model list and paths, distinct outputs).
    ///
    /// # Errors
    ///
    /// Returns [`QuantizeError::Config`] if any field is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(QuantizeError::Config { reason: "No models configured".into() });
        }

        for (idx, model) in self.models.iter().enumerate() {
            if model.input.is_empty() {
                return Err(QuantizeError::Config { reason: format!("Model {}: input path is empty", idx) });
            }
            if model.output.as_deref() == Some("") {
                return Err(QuantizeError::Config { reason: format!("Model {}: output path is empty", idx) });
            }
            if model.output_path() == Path::new(&model.input) {
                return Err(QuantizeError::Config {
                    reason: format!("Model {}: output would overwrite input '{}'", idx, model.input),
                });
            }
        }

        Ok(())
    }

    /// Effective layout for a model (model override or global default).
    pub fn get_layout(&self, model: &ModelConfig) -> WeightLayout {
        model.layout.unwrap_or(self.layout)
    }

    /// Quantizer settings for one model: global exclusions plus its own.
    pub fn quant_config(&self, model: &ModelConfig) -> QuantConfig {
        let mut excluded_layers = self.excluded_layers.clone();
        excluded_layers.extend(model.excluded_layers.iter().cloned());
        QuantConfig {
            layout: self.get_layout(model),
            min_elements: self.min_elements,
            excluded_layers,
        }
    }

    /// One job per configured model, in order.
    pub fn jobs(&self) -> Vec<ModelJob> {
        self.models
            .iter()
            .map(|m| ModelJob {
                name: m.display_name(),
                input: PathBuf::from(&m.input),
                output: m.output_path(),
                quant: self.quant_config(m),
                skip_existing: m.skip_existing,
            })
            .collect()
    }
}
