//! Per-tensor affine UINT8 weight quantization.
//!
//! For a tensor with range `[min, max]`:
//!
//! ```text
//! scale      = (max - min) / 255
//! zero_point = round(-min / scale)
//! q          = saturate_u8(round(v / scale + zero_point))
//! v'         = (q - zero_point) * scale
//! ```
//!
//! Rounding is round-half-to-even and out-of-range results saturate to
//! `[0, 255]`. Intermediate arithmetic runs in `f64` against the `f32` scale
//! that is persisted in the model, so quantize and dequantize agree with what
//! a runtime reads back.

use crate::errors::{QuantizeError, Result};
use crate::onnx_utils::{OnnxModel, QuantizedWeightInput, WeightTensor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Lowest representable quantized value.
pub const QMIN: f64 = 0.0;
/// Highest representable quantized value.
pub const QMAX: f64 = 255.0;

// ===========================================================================
// Configuration
// ===========================================================================

/// How quantized weights are written back into the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeightLayout {
    /// Keep each initializer's name; retype it to UINT8 and annotate it with
    /// its scale / zero point.
    #[default]
    InPlace,
    /// Replace each initializer with a UINT8 tensor feeding a
    /// `DequantizeLinear` node. The result stays runnable by standard runtimes.
    Qdq,
}

impl fmt::Display for WeightLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightLayout::InPlace => write!(f, "in-place"),
            WeightLayout::Qdq => write!(f, "qdq"),
        }
    }
}

impl FromStr for WeightLayout {
    type Err = QuantizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "in-place" | "inplace" | "in_place" => Ok(WeightLayout::InPlace),
            "qdq" => Ok(WeightLayout::Qdq),
            _ => Err(QuantizeError::UnsupportedConfig {
                reason: format!("Unknown weight layout: '{}'. Valid layouts: in-place, qdq", s),
            }),
        }
    }
}

/// Quantization configuration
#[derive(Debug, Clone, Default)]
pub struct QuantConfig {
    pub layout: WeightLayout,
    /// Tensors with fewer elements are left in FLOAT. `0` quantizes everything.
    pub min_elements: usize,
    /// Initializer names that are never quantized.
    pub excluded_layers: Vec<String>,
}

impl QuantConfig {
    pub fn in_place() -> Self {
        Self::default()
    }

    pub fn qdq() -> Self {
        Self {
            layout: WeightLayout::Qdq,
            ..Self::default()
        }
    }

    pub fn with_layout(mut self, layout: WeightLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Whether `name` is listed in `excluded_layers`.
    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded_layers.iter().any(|l| l == name)
    }

    /// Whether a tensor passes the exclusion list and the size threshold.
    pub fn should_quantize(&self, name: &str, num_elements: usize) -> bool {
        !self.is_excluded(name) && num_elements >= self.min_elements
    }
}

// ===========================================================================
// Parameters
// ===========================================================================

/// Per-tensor quantization parameters (scale and zero point)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
    scale: f32,
    zero_point: i32,
    min: f32,
    max: f32,
}

impl QuantParams {
    /// Parameters mapping `min` to 0 and `max` to 255.
    ///
    /// # Errors
    ///
    /// [`QuantizeError::InvalidTensor`] for non-finite bounds, an empty or
    /// inverted range, or a range too narrow for its magnitude.
    pub fn from_range(min: f32, max: f32) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(QuantizeError::InvalidTensor {
                reason: format!("non-finite range [{min}, {max}]"),
            });
        }
        if max <= min {
            return Err(QuantizeError::InvalidTensor {
                reason: format!("degenerate range [{min}, {max}]"),
            });
        }

        let scale = ((f64::from(max) - f64::from(min)) / QMAX) as f32;
        if !(scale > 0.0 && scale.is_finite()) {
            return Err(QuantizeError::InvalidTensor {
                reason: format!("range [{min}, {max}] yields unusable scale {scale}"),
            });
        }

        let zero_point = (-f64::from(min) / f64::from(scale)).round_ties_even();
        if !(f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&zero_point) {
            return Err(QuantizeError::InvalidTensor {
                reason: format!("range [{min}, {max}] is too narrow for its magnitude"),
            });
        }

        Ok(Self {
            scale,
            zero_point: zero_point as i32,
            min,
            max,
        })
    }

    /// Like [`QuantParams::from_range`] after widening the range to include
    /// zero, so `zero_point` always lies in `[0, 255]`.
    pub fn from_range_including_zero(min: f32, max: f32) -> Result<Self> {
        Self::from_range(min.min(0.0), max.max(0.0))
    }

    /// Parameters appropriate for a write-back layout.
    pub fn for_layout(min: f32, max: f32, layout: WeightLayout) -> Result<Self> {
        match layout {
            WeightLayout::InPlace => Self::from_range(min, max),
            WeightLayout::Qdq => Self::from_range_including_zero(min, max),
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn zero_point(&self) -> i32 {
        self.zero_point
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    /// Quantize a value, saturating to `[0, 255]`.
    pub fn quantize(&self, value: f32) -> u8 {
        let q = (f64::from(value) / f64::from(self.scale) + f64::from(self.zero_point)).round_ties_even();
        // NaN saturates to 0 through the `as` cast
        q.clamp(QMIN, QMAX) as u8
    }

    /// Map a quantized value back to float.
    pub fn dequantize(&self, value: u8) -> f32 {
        ((i64::from(value) - i64::from(self.zero_point)) as f64 * f64::from(self.scale)) as f32
    }
}

/// Minimum and maximum of `data`, or `None` when it is empty or holds a
/// non-finite value.
pub fn finite_min_max(data: &[f32]) -> Option<(f32, f32)> {
    let mut iter = data.iter().copied();
    let first = iter.next()?;
    if !first.is_finite() {
        return None;
    }
    iter.try_fold((first, first), |(lo, hi), v| {
        v.is_finite().then(|| (lo.min(v), hi.max(v)))
    })
}

// ===========================================================================
// Quantized tensor
// ===========================================================================

/// Quantized tensor
#[derive(Debug, Clone)]
pub struct QuantizedTensor {
    pub data: Vec<u8>,
    pub shape: Vec<usize>,
    pub params: QuantParams,
}

impl QuantizedTensor {
    /// Quantize a float32 tensor over its own `[min, max]` range.
    ///
    /// # Errors
    ///
    /// [`QuantizeError::InvalidTensor`] for an empty tensor, a shape that does
    /// not match the data length, non-finite values, or a constant tensor.
    pub fn from_f32(data: &[f32], shape: Vec<usize>) -> Result<Self> {
        Self::from_f32_for_layout(data, shape, WeightLayout::InPlace)
    }

    /// Quantize a float32 tensor with the parameters `layout` calls for.
    pub fn from_f32_for_layout(data: &[f32], shape: Vec<usize>, layout: WeightLayout) -> Result<Self> {
        check_shape(data, &shape).map_err(|reason| QuantizeError::InvalidTensor { reason })?;
        let (min, max) = finite_min_max(data).ok_or_else(|| QuantizeError::InvalidTensor {
            reason: "tensor contains NaN or infinite values".into(),
        })?;
        let params = QuantParams::for_layout(min, max, layout)?;
        Self::from_f32_with_params(data, shape, params)
    }

    /// Quantize with caller-supplied parameters.
    pub fn from_f32_with_params(data: &[f32], shape: Vec<usize>, params: QuantParams) -> Result<Self> {
        check_shape(data, &shape).map_err(|reason| QuantizeError::InvalidTensor { reason })?;
        Ok(Self {
            data: data.iter().map(|&v| params.quantize(v)).collect(),
            shape,
            params,
        })
    }

    /// Dequantize back to float32
    pub fn to_f32(&self) -> Vec<f32> {
        self.data.iter().map(|&q| self.params.dequantize(q)).collect()
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    /// Mean squared error against the original values.
    pub fn quantization_error(&self, original: &[f32]) -> f32 {
        if original.is_empty() {
            return 0.0;
        }
        let sum: f64 = original
            .iter()
            .zip(&self.data)
            .map(|(&v, &q)| (f64::from(v) - f64::from(self.params.dequantize(q))).powi(2))
            .sum();
        (sum / original.len() as f64) as f32
    }

    /// Largest absolute reconstruction error against the original values.
    pub fn max_abs_error(&self, original: &[f32]) -> f32 {
        original
            .iter()
            .zip(&self.data)
            .map(|(&v, &q)| (v - self.params.dequantize(q)).abs())
            .fold(0.0, f32::max)
    }
}

/// Product of `shape`, or `None` on overflow.
pub fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

fn check_shape(data: &[f32], shape: &[usize]) -> std::result::Result<(), String> {
    if data.is_empty() {
        return Err("cannot quantize empty tensor".into());
    }
    match element_count(shape) {
        Some(expected) if expected == data.len() => Ok(()),
        Some(expected) => Err(format!(
            "shape {:?} expects {} elements but data has {}",
            shape,
            expected,
            data.len()
        )),
        None => Err(format!("shape {:?} overflows the element count", shape)),
    }
}

// ===========================================================================
// Reports
// ===========================================================================

/// Why a FLOAT initializer was left unmodified.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Excluded,
    BelowMinElements { min_elements: usize },
    Empty,
    NonFinite,
    /// Every element equals `value`; there is no range to map.
    Constant { value: f32 },
    /// The range is too narrow relative to its magnitude for an `f32` scale
    /// and `i32` zero point.
    NarrowRange,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Excluded => write!(f, "excluded by configuration"),
            SkipReason::BelowMinElements { min_elements } => {
                write!(f, "fewer than {min_elements} elements")
            }
            SkipReason::Empty => write!(f, "empty tensor"),
            SkipReason::NonFinite => write!(f, "contains NaN or infinite values"),
            SkipReason::Constant { value } => write!(f, "constant tensor (every element is {value})"),
            SkipReason::NarrowRange => write!(f, "range too narrow to quantize"),
        }
    }
}

/// Result of quantizing one weight.
#[derive(Debug, Clone)]
pub enum TensorOutcome {
    Quantized(QuantizedTensor),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TensorStatus {
    Quantized { scale: f32, zero_point: i32, mse: f32 },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TensorReport {
    pub name: String,
    pub num_elements: usize,
    pub status: TensorStatus,
}

/// What [`Quantizer::quantize_model`] did to each FLOAT initializer.
#[derive(Debug, Clone)]
pub struct QuantizeReport {
    pub layout: WeightLayout,
    pub tensors: Vec<TensorReport>,
}

impl QuantizeReport {
    pub fn quantized_count(&self) -> usize {
        self.tensors
            .iter()
            .filter(|t| matches!(t.status, TensorStatus::Quantized { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.tensors.len() - self.quantized_count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&str, &SkipReason)> {
        self.tensors.iter().filter_map(|t| match &t.status {
            TensorStatus::Skipped(reason) => Some((t.name.as_str(), reason)),
            TensorStatus::Quantized { .. } => None,
        })
    }

    /// Mean of the per-tensor MSE over quantized tensors.
    pub fn average_mse(&self) -> f32 {
        let errors: Vec<f32> = self
            .tensors
            .iter()
            .filter_map(|t| match t.status {
                TensorStatus::Quantized { mse, .. } => Some(mse),
                TensorStatus::Skipped(_) => None,
            })
            .collect();
        if errors.is_empty() {
            0.0
        } else {
            errors.iter().sum::<f32>() / errors.len() as f32
        }
    }
}

// ===========================================================================
// Quantizer
// ===========================================================================

/// Main quantizer
#[derive(Debug, Clone, Default)]
pub struct Quantizer {
    config: QuantConfig,
}

impl Quantizer {
    pub fn new(config: QuantConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QuantConfig {
        &self.config
    }

    /// Quantize one weight, or explain why it stays FLOAT.
    ///
    /// # Errors
    ///
    /// [`QuantizeError::InvalidTensor`] when the data length does not match
    /// the shape.
    pub fn quantize_weight(&self, weight: &WeightTensor) -> Result<TensorOutcome> {
        if weight.data.is_empty() {
            return Ok(TensorOutcome::Skipped(SkipReason::Empty));
        }
        if !self.config.should_quantize(&weight.name, weight.data.len()) {
            let reason = if self.config.is_excluded(&weight.name) {
                SkipReason::Excluded
            } else {
                SkipReason::BelowMinElements {
                    min_elements: self.config.min_elements,
                }
            };
            return Ok(TensorOutcome::Skipped(reason));
        }
        check_shape(&weight.data, &weight.shape).map_err(|reason| QuantizeError::InvalidTensor {
            reason: format!("'{}': {reason}", weight.name),
        })?;

        let Some((min, max)) = finite_min_max(&weight.data) else {
            return Ok(TensorOutcome::Skipped(SkipReason::NonFinite));
        };
        if min == max {
            return Ok(TensorOutcome::Skipped(SkipReason::Constant { value: min }));
        }

        let Ok(params) = QuantParams::for_layout(min, max, self.config.layout) else {
            return Ok(TensorOutcome::Skipped(SkipReason::NarrowRange));
        };
        let quantized = QuantizedTensor::from_f32_with_params(&weight.data, weight.shape.clone(), params)?;
        Ok(TensorOutcome::Quantized(quantized))
    }

    /// Quantize every eligible FLOAT initializer of `model` and write the
    /// results back with the configured layout.
    ///
    /// The model is only modified once every tensor has been processed, so an
    /// error leaves it untouched.
    pub fn quantize_model(&self, model: &mut OnnxModel) -> Result<QuantizeReport> {
        let weights = model.extract_weights()?;

        let mut tensors = Vec::with_capacity(weights.len());
        let mut write_back = Vec::new();

        for weight in &weights {
            let status = match self.quantize_weight(weight)? {
                TensorOutcome::Quantized(q) => {
                    let mse = q.quantization_error(&weight.data);
                    debug!(
                        tensor = %weight.name,
                        elements = weight.num_elements(),
                        scale = q.params.scale(),
                        zero_point = q.params.zero_point(),
                        mse,
                        "quantized"
                    );
                    let status = TensorStatus::Quantized {
                        scale: q.params.scale(),
                        zero_point: q.params.zero_point(),
                        mse,
                    };
                    write_back.push(QuantizedWeightInput {
                        original_name: weight.name.clone(),
                        values: q.data,
                        scale: q.params.scale(),
                        zero_point: q.params.zero_point(),
                    });
                    status
                }
                TensorOutcome::Skipped(reason) => {
                    match reason {
                        SkipReason::NonFinite | SkipReason::NarrowRange => {
                            warn!(tensor = %weight.name, "skipped: {reason}")
                        }
                        _ => debug!(tensor = %weight.name, "skipped: {reason}"),
                    }
                    TensorStatus::Skipped(reason)
                }
            };
            tensors.push(TensorReport {
                name: weight.name.clone(),
                num_elements: weight.num_elements(),
                status,
            });
        }

        model.apply_quantized(&write_back, self.config.layout)?;

        let report = QuantizeReport {
            layout: self.config.layout,
            tensors,
        };
        info!(
            quantized = report.quantized_count(),
            skipped = report.skipped_count(),
            layout = %report.layout,
            "weights quantized"
        );
        Ok(report)
    }
}
