//! ONNX model utilities: loading, weight extraction, quantized write-back,
//! saving, graph connectivity validation and quantized-model introspection.

pub mod graph_builder;
pub mod quantization_nodes;

use crate::errors::{QuantizeError, Result};
use crate::onnx_proto::{tensor_proto, GraphProto, ModelProto, StringStringEntryProto, TensorProto};
use crate::quantization::WeightLayout;
use prost::Message;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

pub use graph_builder::{ConnectivityReport, QuantizedWeightInput};
use quantization_nodes::{SCALE_TENSOR_KEY, ZERO_POINT_TENSOR_KEY};

/// Metadata key recording which [`WeightLayout`] produced a model.
pub const LAYOUT_METADATA_KEY: &str = "face_quant.layout";

/// Protobuf messages cannot exceed 2 GiB; larger models use external data.
const MAX_MODEL_SIZE: u64 = 2 * 1024 * 1024 * 1024;

// ===========================================================================
// Core types
// ===========================================================================

/// A loaded ONNX model.
///
/// The graph is held apart from the rest of the `ModelProto` so it is always
/// present; it is put back only while encoding.
pub struct OnnxModel {
    proto: ModelProto,
    graph: GraphProto,
}

impl std::fmt::Debug for OnnxModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxModel")
            .field("name", &self.graph.name)
            .field("num_nodes", &self.graph.node.len())
            .field("num_initializers", &self.graph.initializer.len())
            .finish()
    }
}

#[derive(Debug)]
pub struct ModelInfo {
    pub name: String,
    pub producer: String,
    pub ir_version: i64,
    pub model_version: i64,
    /// Default-domain opset, if declared.
    pub opset: Option<i64>,
    pub num_nodes: usize,
    pub num_initializers: usize,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Count and payload size of the initializers sharing one element type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DtypeSummary {
    pub count: usize,
    pub bytes: usize,
}

/// Quantization parameters recovered from a produced model.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedWeightInfo {
    pub name: String,
    pub layout: WeightLayout,
    pub scale: f32,
    pub zero_point: i32,
    pub num_elements: usize,
}

/// A FLOAT initializer decoded to `f32` values.
#[derive(Debug, Clone)]
pub struct WeightTensor {
    pub name: String,
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

impl WeightTensor {
    pub fn size_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    pub fn num_elements(&self) -> usize {
        self.data.len()
    }
}

// ===========================================================================
// OnnxModel: load / inspect
// ===========================================================================

impl OnnxModel {
    /// Read and decode an ONNX file.
    ///
    /// # Errors
    ///
    /// [`QuantizeError::InputNotFound`] when the file does not exist,
    /// [`QuantizeError::ModelLoad`] for I/O, size or protobuf errors.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let load_err = |reason: String| QuantizeError::ModelLoad {
            path: path.to_path_buf(),
            reason,
        };

        if !path.exists() {
            return Err(QuantizeError::InputNotFound { path: path.to_path_buf() });
        }

        let mut file = fs::File::open(path).map_err(|e| load_err(format!("failed to open: {e}")))?;

        let file_size = file
            .metadata()
            .map_err(|e| load_err(format!("failed to read metadata: {e}")))?
            .len();
        if file_size > MAX_MODEL_SIZE {
            return Err(load_err(format!(
                "model file too large: {:.2} GB (max: 2 GB)",
                file_size as f64 / (1024.0 * 1024.0 * 1024.0)
            )));
        }

        let mut buffer = Vec::with_capacity(file_size as usize);
        file.read_to_end(&mut buffer)
            .map_err(|e| load_err(format!("failed to read: {e}")))?;

        let proto = ModelProto::decode(buffer.as_slice())
            .map_err(|e| load_err(format!("failed to parse ONNX protobuf: {e}")))?;

        let model = Self::from_proto(proto).map_err(|e| load_err(e.to_string()))?;
        debug!(
            path = %path.display(),
            nodes = model.graph.node.len(),
            initializers = model.graph.initializer.len(),
            "loaded model"
        );
        Ok(model)
    }

    /// Wrap an in-memory `ModelProto`.
    ///
    /// # Errors
    ///
    /// [`QuantizeError::Other`] when the model has no graph.
    pub fn from_proto(mut proto: ModelProto) -> Result<Self> {
        let graph = proto
            .graph
            .take()
            .ok_or_else(|| QuantizeError::Other("model has no graph".into()))?;
        Ok(Self { proto, graph })
    }

    /// Reassemble the full `ModelProto`.
    pub fn into_proto(self) -> ModelProto {
        let mut proto = self.proto;
        proto.graph = Some(self.graph);
        proto
    }

    pub fn graph(&self) -> &GraphProto {
        &self.graph
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            name: self.graph.name.clone(),
            producer: format!("{} {}", self.proto.producer_name, self.proto.producer_version)
                .trim()
                .to_string(),
            ir_version: self.proto.ir_version,
            model_version: self.proto.model_version,
            opset: self
                .proto
                .opset_import
                .iter()
                .find(|o| o.domain.is_empty() || o.domain == "ai.onnx")
                .map(|o| o.version),
            num_nodes: self.graph.node.len(),
            num_initializers: self.graph.initializer.len(),
            inputs: self.graph.input.iter().map(|i| i.name.clone()).collect(),
            outputs: self.graph.output.iter().map(|o| o.name.clone()).collect(),
        }
    }

    /// Initializer count and payload bytes per element type name
    /// (`"FLOAT"`, `"UINT8"`, ...).
    pub fn initializer_summary(&self) -> BTreeMap<String, DtypeSummary> {
        let mut summary: BTreeMap<String, DtypeSummary> = BTreeMap::new();
        for init in &self.graph.initializer {
            let entry = summary.entry(dtype_name(init.data_type)).or_default();
            entry.count += 1;
            entry.bytes += payload_bytes(init);
        }
        summary
    }

    /// Decode every FLOAT initializer with inline data.
    ///
    /// Non-FLOAT initializers are not weights for our purposes and are
    /// ignored. FLOAT initializers stored in external data files are skipped
    /// with a warning.
    ///
    /// # Errors
    ///
    /// [`QuantizeError::InvalidTensor`] when a `raw_data` payload is not a
    /// whole number of `f32` values.
    pub fn extract_weights(&self) -> Result<Vec<WeightTensor>> {
        let mut weights = Vec::new();

        for init in &self.graph.initializer {
            if init.data_type != tensor_proto::DataType::Float as i32 {
                continue;
            }
            if init.data_location == tensor_proto::DataLocation::External as i32 {
                warn!(tensor = %init.name, "FLOAT initializer uses external data, leaving it as is");
                continue;
            }

            let shape: Vec<usize> = init.dims.iter().map(|&d| d.max(0) as usize).collect();
            let data = decode_f32(init)?;
            weights.push(WeightTensor {
                name: init.name.clone(),
                data,
                shape,
            });
        }

        Ok(weights)
    }

    /// Total payload size of all initializers in bytes.
    pub fn total_size_bytes(&self) -> usize {
        self.graph.initializer.iter().map(payload_bytes).sum()
    }

    /// Check that every node input in the graph resolves to a known tensor.
    pub fn validate_connectivity(&self) -> ConnectivityReport {
        graph_builder::validate_graph_connectivity(&self.graph)
    }
}

// ===========================================================================
// OnnxModel: quantized write-back and save
// ===========================================================================

impl OnnxModel {
    /// Write quantized weights back into the graph using `layout`.
    ///
    /// The layout is recorded in the model's `metadata_props`. For the QDQ
    /// layout the default-domain opset is raised to at least 10. With no
    /// weights the model is left untouched.
    pub fn apply_quantized(&mut self, weights: &[QuantizedWeightInput], layout: WeightLayout) -> Result<()> {
        if weights.is_empty() {
            return Ok(());
        }
        match layout {
            WeightLayout::InPlace => graph_builder::apply_inplace_transform(&mut self.graph, weights)?,
            WeightLayout::Qdq => {
                graph_builder::apply_qdq_transform(&mut self.graph, weights)?;
                graph_builder::ensure_opset_version(&mut self.proto, graph_builder::MIN_QDQ_OPSET);
            }
        }

        self.proto.metadata_props.retain(|p| p.key != LAYOUT_METADATA_KEY);
        self.proto.metadata_props.push(StringStringEntryProto {
            key: LAYOUT_METADATA_KEY.to_string(),
            value: layout.to_string(),
        });
        Ok(())
    }

    /// Serialize the model to `path`, replacing any existing file.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        self.proto.graph = Some(std::mem::take(&mut self.graph));
        let encoded = self.proto.encode_to_vec();
        self.graph = self.proto.graph.take().unwrap_or_default();

        fs::write(path, encoded).map_err(|e| QuantizeError::ModelSave {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "saved model");
        Ok(())
    }
}

// ===========================================================================
// OnnxModel: quantized model introspection
// ===========================================================================

impl OnnxModel {
    /// Recover per-weight quantization parameters from a produced model.
    ///
    /// In-place weights are found through `quantization_annotation`; QDQ
    /// weights through their `DequantizeLinear` nodes. Entries whose scale or
    /// zero-point tensors cannot be read are left out.
    pub fn load_quantized_info(&self) -> Vec<QuantizedWeightInfo> {
        let inits: HashMap<&str, &TensorProto> = self
            .graph
            .initializer
            .iter()
            .map(|i| (i.name.as_str(), i))
            .collect();
        let count_of = |name: &str| {
            inits
                .get(name)
                .and_then(|t| graph_builder::element_count(&t.dims))
                .unwrap_or(0)
        };

        let mut infos = Vec::new();

        for annotation in &self.graph.quantization_annotation {
            let param = |key: &str| {
                annotation
                    .quant_parameter_tensor_names
                    .iter()
                    .find(|e| e.key == key)
                    .and_then(|e| inits.get(e.value.as_str()).copied())
            };
            let scale = param(SCALE_TENSOR_KEY).and_then(scalar_f32);
            let zero_point = param(ZERO_POINT_TENSOR_KEY).and_then(scalar_i32);
            if let (Some(scale), Some(zero_point)) = (scale, zero_point) {
                infos.push(QuantizedWeightInfo {
                    name: annotation.tensor_name.clone(),
                    layout: WeightLayout::InPlace,
                    scale,
                    zero_point,
                    num_elements: count_of(&annotation.tensor_name),
                });
            }
        }

        for node in self.graph.node.iter().filter(|n| n.op_type == "DequantizeLinear") {
            let (Some(x), Some(scale), Some(zp), Some(out)) =
                (node.input.first(), node.input.get(1), node.input.get(2), node.output.first())
            else {
                continue;
            };
            let scale = inits.get(scale.as_str()).copied().and_then(scalar_f32);
            let zero_point = inits.get(zp.as_str()).copied().and_then(scalar_i32);
            if let (Some(scale), Some(zero_point)) = (scale, zero_point) {
                infos.push(QuantizedWeightInfo {
                    name: out.clone(),
                    layout: WeightLayout::Qdq,
                    scale,
                    zero_point,
                    num_elements: count_of(x),
                });
            }
        }

        infos
    }

    /// Layout recorded in `metadata_props` by [`OnnxModel::apply_quantized`].
    pub fn recorded_layout(&self) -> Option<WeightLayout> {
        self.proto
            .metadata_props
            .iter()
            .find(|p| p.key == LAYOUT_METADATA_KEY)
            .and_then(|p| p.value.parse().ok())
    }
}

// ===========================================================================
// Tensor payload helpers
// ===========================================================================

/// Decode a FLOAT tensor's payload from `raw_data` (little-endian) or
/// `float_data`.
pub fn decode_f32(init: &TensorProto) -> Result<Vec<f32>> {
    if !init.raw_data.is_empty() {
        if init.raw_data.len() % 4 != 0 {
            return Err(QuantizeError::InvalidTensor {
                reason: format!(
                    "'{}': raw_data length {} is not a multiple of 4",
                    init.name,
                    init.raw_data.len()
                ),
            });
        }
        Ok(init
            .raw_data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    } else {
        Ok(init.float_data.clone())
    }
}

fn scalar_f32(t: &TensorProto) -> Option<f32> {
    match t.float_data.first() {
        Some(&v) => Some(v),
        None => t
            .raw_data
            .get(..4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
    }
}

fn scalar_i32(t: &TensorProto) -> Option<i32> {
    match tensor_proto::DataType::try_from(t.data_type).ok()? {
        tensor_proto::DataType::Uint8 => t
            .raw_data
            .first()
            .map(|&b| i32::from(b))
            .or_else(|| t.int32_data.first().copied()),
        tensor_proto::DataType::Int8 => t
            .raw_data
            .first()
            .map(|&b| i32::from(b as i8))
            .or_else(|| t.int32_data.first().copied()),
        tensor_proto::DataType::Int32 => t.int32_data.first().copied().or_else(|| {
            t.raw_data
                .get(..4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        }),
        _ => None,
    }
}

/// Bytes held by a tensor's inline payload, whichever field carries it.
pub fn payload_bytes(t: &TensorProto) -> usize {
    t.raw_data.len()
        + t.float_data.len() * 4
        + t.int32_data.len() * 4
        + t.int64_data.len() * 8
        + t.double_data.len() * 8
        + t.uint64_data.len() * 8
        + t.string_data.iter().map(Vec::len).sum::<usize>()
}

/// Human-readable element type name (`"FLOAT"`, `"UINT8"`, ...).
pub fn dtype_name(data_type: i32) -> String {
    tensor_proto::DataType::try_from(data_type)
        .map(|d| d.as_str_name().to_string())
        .unwrap_or_else(|_| format!("UNKNOWN({data_type})"))
}
