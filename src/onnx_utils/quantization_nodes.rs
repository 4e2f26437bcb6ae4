//! Low-level builders for the graph elements that carry quantized weights.
//!
//! Every quantized weight is accompanied by its parameters so the produced
//! file can be dequantized later:
//!
//! ```text
//! In-place layout:
//!   "{name}"             UINT8 tensor, same shape as the original (renamed type only)
//!   "{name}_scale"       FLOAT scalar
//!   "{name}_zero_point"  INT32 scalar
//!   quantization_annotation { tensor_name: "{name}",
//!                             SCALE_TENSOR: "{name}_scale",
//!                             ZERO_POINT_TENSOR: "{name}_zero_point" }
//!
//! QDQ layout:
//!   "{name}_quantized"   UINT8 tensor, same shape as the original
//!   "{name}_scale"       FLOAT scalar
//!   "{name}_zero_point"  UINT8 scalar
//!   DequantizeLinear(["{name}_quantized", "{name}_scale", "{name}_zero_point"]) -> "{name}"
//! ```
//!
//! `DequantizeLinear` computes `y = (x - zero_point) * scale`, the same
//! formula as [`QuantParams::dequantize`](crate::quantization::QuantParams::dequantize).

use crate::onnx_proto::{
    tensor_proto, NodeProto, StringStringEntryProto, TensorAnnotation, TensorProto,
};

/// Annotation key naming the scale tensor of a quantized initializer.
pub const SCALE_TENSOR_KEY: &str = "SCALE_TENSOR";
/// Annotation key naming the zero-point tensor of a quantized initializer.
pub const ZERO_POINT_TENSOR_KEY: &str = "ZERO_POINT_TENSOR";

// ---------------------------------------------------------------------------
// Name generation
// ---------------------------------------------------------------------------

/// Canonical names for the graph elements derived from one weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantParamNames {
    /// `"{original}_quantized"`, the UINT8 weight tensor in QDQ layout
    pub quantized_name: String,
    /// `"{original}_scale"`
    pub scale_name: String,
    /// `"{original}_zero_point"`
    pub zero_point_name: String,
    /// `"DequantizeLinear_{original}"`
    pub node_name: String,
    /// The original tensor name. In QDQ layout it becomes the
    /// DequantizeLinear output, so downstream nodes see no change.
    pub output_name: String,
}

impl QuantParamNames {
    /// Derive every name from the original weight tensor name.
    pub fn from_original(original_name: &str) -> Self {
        Self {
            quantized_name:  format!("{}_quantized", original_name),
            scale_name:      format!("{}_scale", original_name),
            zero_point_name: format!("{}_zero_point", original_name),
            node_name:       format!("DequantizeLinear_{}", original_name),
            output_name:     original_name.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Node builder
// ---------------------------------------------------------------------------

/// Build a per-tensor `DequantizeLinear` node (opset >= 10).
pub fn build_dequantize_linear_node(names: &QuantParamNames) -> NodeProto {
    NodeProto {
        op_type: "DequantizeLinear".to_string(),
        name: names.node_name.clone(),
        input: vec![
            names.quantized_name.clone(),
            names.scale_name.clone(),
            names.zero_point_name.clone(),
        ],
        output: vec![names.output_name.clone()],
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Tensor builders
// ---------------------------------------------------------------------------

/// UINT8 tensor holding quantized weight values under `name`.
pub fn build_quantized_weight_tensor(name: &str, values: &[u8], shape: &[i64]) -> TensorProto {
    TensorProto {
        name: name.to_string(),
        data_type: tensor_proto::DataType::Uint8 as i32,
        dims: shape.to_vec(),
        raw_data: values.to_vec(),
        ..Default::default()
    }
}

/// Rank-0 FLOAT scale tensor.
pub fn build_scale_tensor(name: &str, scale: f32) -> TensorProto {
    TensorProto {
        name: name.to_string(),
        data_type: tensor_proto::DataType::Float as i32,
        float_data: vec![scale],
        ..Default::default()
    }
}

/// Rank-0 UINT8 zero-point tensor, the form `DequantizeLinear` expects
/// alongside a UINT8 input.
pub fn build_u8_zero_point_tensor(name: &str, zero_point: u8) -> TensorProto {
    TensorProto {
        name: name.to_string(),
        data_type: tensor_proto::DataType::Uint8 as i32,
        raw_data: vec![zero_point],
        ..Default::default()
    }
}

/// Rank-0 INT32 zero-point tensor. Used by the in-place layout, where the
/// zero point of an all-positive or all-negative tensor falls outside `[0, 255]`.
pub fn build_i32_zero_point_tensor(name: &str, zero_point: i32) -> TensorProto {
    TensorProto {
        name: name.to_string(),
        data_type: tensor_proto::DataType::Int32 as i32,
        int32_data: vec![zero_point],
        ..Default::default()
    }
}

/// Quantization annotation linking a tensor to its scale and zero point.
pub fn build_quant_annotation(names: &QuantParamNames) -> TensorAnnotation {
    TensorAnnotation {
        tensor_name: names.output_name.clone(),
        quant_parameter_tensor_names: vec![
            StringStringEntryProto {
                key: SCALE_TENSOR_KEY.to_string(),
                value: names.scale_name.clone(),
            },
            StringStringEntryProto {
                key: ZERO_POINT_TENSOR_KEY.to_string(),
                value: names.zero_point_name.clone(),
            },
        ],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
