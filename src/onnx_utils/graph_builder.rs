//! Graph-level operations for quantized ONNX models.
//!
//! Four responsibilities:
//!   1. **In-place transform**: retype FLOAT initializers to UINT8 and attach
//!      their scale / zero point as annotated sibling initializers
//!   2. **QDQ transform**: replace FLOAT initializers with UINT8 + DequantizeLinear
//!   3. **Connectivity validation**: walk the graph and verify every edge resolves
//!   4. **Opset management**: ensure the model declares a minimum opset

use crate::errors::{QuantizeError, Result};
use crate::onnx_proto::{
    tensor_proto, type_proto, GraphProto, ModelProto, OperatorSetIdProto, TensorProto,
};
use std::collections::{HashMap, HashSet};

use super::quantization_nodes::{
    build_dequantize_linear_node, build_i32_zero_point_tensor, build_quant_annotation,
    build_quantized_weight_tensor, build_scale_tensor, build_u8_zero_point_tensor,
    QuantParamNames,
};

/// `DequantizeLinear` with UINT8 input and a scalar zero point needs opset 10.
pub const MIN_QDQ_OPSET: i64 = 10;

// ===========================================================================
// Public types
// ===========================================================================

/// One weight to write back: FLOAT initializer -> UINT8 values + parameters.
#[derive(Debug, Clone)]
pub struct QuantizedWeightInput {
    /// Original initializer name (e.g. `"conv1.weight"`)
    pub original_name: String,
    /// Quantized values, one byte per element, in the original element order.
    pub values: Vec<u8>,
    /// Per-tensor scale.
    pub scale: f32,
    /// Per-tensor zero point. Must lie in `[0, 255]` for the QDQ layout.
    pub zero_point: i32,
}

/// Result of a graph-connectivity check.
#[derive(Debug)]
#[must_use]
pub struct ConnectivityReport {
    /// `true` if every node input resolves to a known tensor.
    pub valid: bool,
    /// Human-readable description of every dangling reference. Empty when valid.
    pub broken_refs: Vec<String>,
}

impl ConnectivityReport {
    /// Render the report as a printable string.
    pub fn summary(&self) -> String {
        if self.valid {
            "  Graph connectivity: OK\n".to_string()
        } else {
            let mut s = format!(
                "  Graph connectivity: BROKEN ({} dangling reference{})\n",
                self.broken_refs.len(),
                if self.broken_refs.len() == 1 { "" } else { "s" }
            );
            for (i, r) in self.broken_refs.iter().enumerate() {
                s.push_str(&format!("    {}. {}\n", i + 1, r));
            }
            s
        }
    }
}

// ===========================================================================
// Connectivity validation
// ===========================================================================

/// Walk the graph and verify every node input resolves to *something*.
///
/// A valid input is exactly one of:
///   • a declared graph input (`graph.input`)
///   • an initializer name (`graph.initializer`)
///   • the output of a node that appears **earlier** in `graph.node`
pub fn validate_graph_connectivity(graph: &GraphProto) -> ConnectivityReport {
    let mut known: HashSet<&str> = HashSet::new();

    for inp in &graph.input {
        known.insert(inp.name.as_str());
    }
    for init in &graph.initializer {
        known.insert(init.name.as_str());
    }

    let mut broken = Vec::new();

    for node in &graph.node {
        for name in &node.input {
            if name.is_empty() {
                continue; // optional input slot
            }
            if !known.contains(name.as_str()) {
                broken.push(format!(
                    "Node '{}' (op={}) → unknown input '{}'",
                    node.name, node.op_type, name
                ));
            }
        }
        for name in &node.output {
            if !name.is_empty() {
                known.insert(name.as_str());
            }
        }
    }

    ConnectivityReport {
        valid: broken.is_empty(),
        broken_refs: broken,
    }
}

// ===========================================================================
// Opset version management
// ===========================================================================

/// Ensure the default ONNX domain opset is at least `min_version`.
pub fn ensure_opset_version(model: &mut ModelProto, min_version: i64) {
    // The default ONNX domain is identified by an empty string (or "ai.onnx")
    for opset in model.opset_import.iter_mut() {
        if opset.domain.is_empty() || opset.domain == "ai.onnx" {
            if opset.version < min_version {
                opset.version = min_version;
            }
            return;
        }
    }

    model.opset_import.push(OperatorSetIdProto {
        domain: String::new(),
        version: min_version,
    });
}

// ===========================================================================
// Shared checks
// ===========================================================================

/// Number of elements described by an ONNX `dims` list (`1` for a scalar).
pub fn element_count(dims: &[i64]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| {
        usize::try_from(d).ok().and_then(|d| acc.checked_mul(d))
    })
}

/// Validate every input against the graph before anything is mutated, so a
/// failing transform leaves the graph untouched.
fn check_inputs<'a>(
    graph: &'a GraphProto,
    inputs: &[QuantizedWeightInput],
    generated_names: impl Fn(&QuantParamNames) -> Vec<String>,
) -> Result<HashMap<&'a str, usize>> {
    let index: HashMap<&str, usize> = graph
        .initializer
        .iter()
        .enumerate()
        .map(|(i, init)| (init.name.as_str(), i))
        .collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut new_names: HashSet<String> = HashSet::new();

    for inp in inputs {
        if !seen.insert(inp.original_name.as_str()) {
            return Err(QuantizeError::GraphTransform {
                reason: format!("Weight '{}' listed more than once", inp.original_name),
            });
        }

        let init = index
            .get(inp.original_name.as_str())
            .map(|&i| &graph.initializer[i])
            .ok_or_else(|| QuantizeError::GraphTransform {
                reason: format!(
                    "Weight '{}' not found in model initializers",
                    inp.original_name
                ),
            })?;

        if init.data_type != tensor_proto::DataType::Float as i32 {
            return Err(QuantizeError::GraphTransform {
                reason: format!(
                    "Weight '{}' is not a FLOAT tensor (data_type={})",
                    inp.original_name, init.data_type
                ),
            });
        }

        let expected = element_count(&init.dims).ok_or_else(|| QuantizeError::GraphTransform {
            reason: format!("Weight '{}' has invalid dims {:?}", inp.original_name, init.dims),
        })?;
        if inp.values.len() != expected {
            return Err(QuantizeError::GraphTransform {
                reason: format!(
                    "Weight '{}': {} quantized values but shape {:?} expects {}",
                    inp.original_name,
                    inp.values.len(),
                    init.dims,
                    expected
                ),
            });
        }

        for name in generated_names(&QuantParamNames::from_original(&inp.original_name)) {
            if index.contains_key(name.as_str()) || !new_names.insert(name.clone()) {
                return Err(QuantizeError::GraphTransform {
                    reason: format!(
                        "Cannot add '{}' for weight '{}': name already in use",
                        name, inp.original_name
                    ),
                });
            }
        }
    }

    Ok(index)
}

/// Drop every typed payload from a tensor, leaving name, dims and metadata.
fn clear_payload(t: &mut TensorProto) {
    t.float_data.clear();
    t.int32_data.clear();
    t.string_data.clear();
    t.int64_data.clear();
    t.double_data.clear();
    t.uint64_data.clear();
    t.raw_data.clear();
}

// ===========================================================================
// In-place transform
// ===========================================================================

/// Retype FLOAT initializers to UINT8 in place.
///
/// ### What happens per weight in `inputs`:
///
/// **Modified:** initializer `"{name}"` keeps its name and dims; its payload
/// becomes the raw quantized bytes and its `data_type` becomes UINT8. A graph
/// input with the same name (older IR versions list weights as inputs) is
/// retyped to UINT8 as well.
///
/// **Added:** `"{name}_scale"` (FLOAT scalar), `"{name}_zero_point"` (INT32
/// scalar) and a `quantization_annotation` entry pointing at both.
///
/// All checks run before the first mutation.
pub fn apply_inplace_transform(graph: &mut GraphProto, inputs: &[QuantizedWeightInput]) -> Result<()> {
    let index = check_inputs(graph, inputs, |names| {
        vec![names.scale_name.clone(), names.zero_point_name.clone()]
    })?;
    let positions: Vec<usize> = inputs
        .iter()
        .map(|inp| index[inp.original_name.as_str()])
        .collect();

    let targets: HashSet<&str> = inputs.iter().map(|i| i.original_name.as_str()).collect();
    for value_info in graph.input.iter_mut() {
        if !targets.contains(value_info.name.as_str()) {
            continue;
        }
        if let Some(type_proto::Value::TensorType(t)) =
            value_info.r#type.as_mut().and_then(|tp| tp.value.as_mut())
        {
            t.elem_type = tensor_proto::DataType::Uint8 as i32;
        }
    }

    for (inp, pos) in inputs.iter().zip(positions) {
        let init = &mut graph.initializer[pos];
        clear_payload(init);
        init.data_type = tensor_proto::DataType::Uint8 as i32;
        init.raw_data = inp.values.clone();
    }

    for inp in inputs {
        let names = QuantParamNames::from_original(&inp.original_name);
        graph.initializer.push(build_scale_tensor(&names.scale_name, inp.scale));
        graph
            .initializer
            .push(build_i32_zero_point_tensor(&names.zero_point_name, inp.zero_point));
        graph.quantization_annotation.push(build_quant_annotation(&names));
    }

    Ok(())
}

// ===========================================================================
// QDQ transform
// ===========================================================================

/// Replace FLOAT weight initializers with UINT8 equivalents + DequantizeLinear
/// nodes.
///
/// ### What happens per weight in `inputs`:
///
/// **Removed:**
///   - Initializer `"{name}"` (and a graph input of the same name, if any)
///
/// **Added (initializers):**
///   - `"{name}_quantized"`  UINT8, same shape as original
///   - `"{name}_scale"`      FLOAT scalar
///   - `"{name}_zero_point"` UINT8 scalar
///
/// **Added (node, prepended before all existing nodes):**
///   - `DequantizeLinear` with output = `"{name}"`
///
/// Because the DequantizeLinear output carries the original name, every
/// downstream node stays unchanged and connectivity holds by construction.
pub fn apply_qdq_transform(graph: &mut GraphProto, inputs: &[QuantizedWeightInput]) -> Result<()> {
    check_inputs(graph, inputs, |names| {
        vec![
            names.quantized_name.clone(),
            names.scale_name.clone(),
            names.zero_point_name.clone(),
        ]
    })?;

    let mut zero_points = Vec::with_capacity(inputs.len());
    for inp in inputs {
        let zp = u8::try_from(inp.zero_point).map_err(|_| QuantizeError::GraphTransform {
            reason: format!(
                "Weight '{}': zero point {} does not fit a UINT8 DequantizeLinear input",
                inp.original_name, inp.zero_point
            ),
        })?;
        zero_points.push(zp);
    }

    let dims: HashMap<String, Vec<i64>> = graph
        .initializer
        .iter()
        .map(|init| (init.name.clone(), init.dims.clone()))
        .collect();
    let targets: HashSet<&str> = inputs.iter().map(|i| i.original_name.as_str()).collect();

    // Some models list weights as both initializers AND graph inputs. Once a
    // DequantizeLinear node produces the name, the duplicate input must go.
    graph.initializer.retain(|init| !targets.contains(init.name.as_str()));
    graph.input.retain(|inp| !targets.contains(inp.name.as_str()));

    let mut dq_nodes = Vec::with_capacity(inputs.len());
    for (inp, zp) in inputs.iter().zip(zero_points) {
        let names = QuantParamNames::from_original(&inp.original_name);
        let shape = dims.get(&inp.original_name).map(Vec::as_slice).unwrap_or_default();

        graph
            .initializer
            .push(build_quantized_weight_tensor(&names.quantized_name, &inp.values, shape));
        graph.initializer.push(build_scale_tensor(&names.scale_name, inp.scale));
        graph
            .initializer
            .push(build_u8_zero_point_tensor(&names.zero_point_name, zp));

        dq_nodes.push(build_dequantize_linear_node(&names));
    }

    // DequantizeLinear nodes go first so their outputs are known when the
    // node list is walked in order.
    let existing = std::mem::take(&mut graph.node);
    graph.node = dq_nodes;
    graph.node.extend(existing);

    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
