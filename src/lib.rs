//! UINT8 weight quantization for the face detection and recognition ONNX models.

pub mod errors;
pub mod onnx_proto;
pub mod onnx_utils;
pub mod quantization;
pub mod batch;
pub mod validation;
pub mod config;

pub use errors::{QuantizeError, Result};
pub use onnx_utils::{ModelInfo, OnnxModel, WeightTensor, QuantizedWeightInfo};
pub use quantization::{Quantizer, QuantConfig, QuantParams, QuantizedTensor, QuantizeReport, WeightLayout};
pub use batch::{int8_sibling, run_batch, run_job, BatchSummary, ModelJob, SizeReport};
pub use validation::{validate_loadable, ValidationReport};
pub use config::Config;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
