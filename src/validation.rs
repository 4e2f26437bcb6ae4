//! Load-time validation of produced models with the tract inference engine.

use crate::errors::{QuantizeError, Result};
use std::path::Path;
use tract_onnx::prelude::*;
use tracing::debug;

/// What the engine reported after building a runnable plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Graph input names, in declaration order.
    pub inputs: Vec<String>,
    /// Graph output names, in declaration order.
    pub outputs: Vec<String>,
}

/// Parse, optimize and plan the model at `path`.
///
/// Success means a runtime accepts the file as-is; no inference is run.
///
/// # Errors
///
/// [`QuantizeError::InputNotFound`] when `path` does not exist, otherwise
/// [`QuantizeError::Validation`] carrying the engine's message.
pub fn validate_loadable(path: impl AsRef<Path>) -> Result<ValidationReport> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(QuantizeError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    let fail = |stage: &str, e: TractError| QuantizeError::Validation {
        path: path.to_path_buf(),
        reason: format!("{stage}: {e}"),
    };

    let model = tract_onnx::onnx()
        .model_for_path(path)
        .map_err(|e| fail("parse failed", e))?;

    let inputs = outlet_names(&model, &model.inputs);
    let outputs = outlet_names(&model, &model.outputs);
    debug!(path = %path.display(), inputs = inputs.len(), outputs = outputs.len(), "model parsed");

    model
        .into_optimized()
        .map_err(|e| fail("optimization failed", e))?
        .into_runnable()
        .map_err(|e| fail("could not build runnable plan", e))?;

    Ok(ValidationReport { inputs, outputs })
}

/// Tensor names as labelled by the ONNX loader; unlabelled outlets fall back
/// to the producing node's name.
fn outlet_names(model: &InferenceModel, outlets: &[OutletId]) -> Vec<String> {
    outlets
        .iter()
        .map(|&o| match model.outlet_label(o) {
            Some(label) => label.to_string(),
            None => model.node(o.node).name.clone(),
        })
        .collect()
}
