//! End-to-end integration tests for face-quant.
//!
//! These tests construct ONNX models in memory (no model files checked into
//! the repo) and exercise load -> quantize -> save -> reload.

use face_quant::batch::{run_batch, JobStatus, ModelJob};
use face_quant::onnx_proto::{
    type_proto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto, TensorProto, TensorShapeProto,
    TypeProto, ValueInfoProto, tensor_proto, tensor_shape_proto,
};
use face_quant::quantization::{SkipReason, TensorStatus};
use face_quant::*;
use prost::Message;

// ===========================================================================
// Helpers
// ===========================================================================

fn float_tensor(name: &str, data: &[f32], dims: &[i64]) -> TensorProto {
    TensorProto {
        name:       name.to_string(),
        data_type:  tensor_proto::DataType::Float as i32,
        dims:       dims.to_vec(),
        float_data: data.to_vec(),
        ..Default::default()
    }
}

fn typed_input(name: &str, elem_type: tensor_proto::DataType) -> ValueInfoProto {
    ValueInfoProto {
        name: name.to_string(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type: elem_type as i32,
                shape: None,
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Minimal ONNX ModelProto with one Conv node and one weight tensor.
fn build_minimal_model(weight_data: &[f32], weight_shape: &[i64]) -> ModelProto {
    ModelProto {
        ir_version: 7,
        producer_name: "pytorch".to_string(),
        opset_import: vec![OperatorSetIdProto { domain: String::new(), version: 13 }],
        graph: Some(GraphProto {
            name: "test_graph".to_string(),
            input:  vec![ValueInfoProto { name: "input".to_string(),  ..Default::default() }],
            output: vec![ValueInfoProto { name: "output".to_string(), ..Default::default() }],
            initializer: vec![float_tensor("weight", weight_data, weight_shape)],
            node: vec![NodeProto {
                op_type: "Conv".to_string(),
                name:    "conv0".to_string(),
                input:   vec!["input".to_string(), "weight".to_string()],
                output:  vec!["output".to_string()],
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Detector-like graph: Conv -> Conv -> Reshape, with a bias, a constant
/// tensor and an INT64 shape initializer alongside the weights.
fn build_detector_like_model(opset: i64) -> ModelProto {
    let w1: Vec<f32> = (0..64).map(|i| (i as f32 - 32.0) * 0.05).collect();
    let w2: Vec<f32> = (0..128).map(|i| ((i * 7) % 19) as f32 * 0.1 - 0.9).collect();
    let bias: Vec<f32> = vec![0.1, -0.2, 0.3, -0.4];

    ModelProto {
        ir_version: 7,
        opset_import: vec![OperatorSetIdProto { domain: String::new(), version: opset }],
        graph: Some(GraphProto {
            name: "detector".to_string(),
            input: vec![
                typed_input("input.1", tensor_proto::DataType::Float),
                typed_input("conv1.weight", tensor_proto::DataType::Float),
            ],
            output: vec![ValueInfoProto { name: "score_8".to_string(), ..Default::default() }],
            initializer: vec![
                float_tensor("conv1.weight", &w1, &[4, 1, 4, 4]),
                float_tensor("conv1.bias", &bias, &[4]),
                float_tensor("conv2.weight", &w2, &[8, 4, 2, 2]),
                float_tensor("bn.mean", &[0.5; 8], &[8]),
                TensorProto {
                    name:       "shape_const".to_string(),
                    data_type:  tensor_proto::DataType::Int64 as i32,
                    dims:       vec![2],
                    int64_data: vec![1, -1],
                    ..Default::default()
                },
            ],
            node: vec![
                NodeProto {
                    op_type: "Conv".to_string(),
                    name:    "conv1".to_string(),
                    input:   vec!["input.1".into(), "conv1.weight".into(), "conv1.bias".into()],
                    output:  vec!["c1".to_string()],
                    ..Default::default()
                },
                NodeProto {
                    op_type: "Conv".to_string(),
                    name:    "conv2".to_string(),
                    input:   vec!["c1".into(), "conv2.weight".into()],
                    output:  vec!["c2".to_string()],
                    ..Default::default()
                },
                NodeProto {
                    op_type: "Add".to_string(),
                    name:    "shift".to_string(),
                    input:   vec!["c2".into(), "bn.mean".into()],
                    output:  vec!["c3".to_string()],
                    ..Default::default()
                },
                NodeProto {
                    op_type: "Reshape".to_string(),
                    name:    "flatten".to_string(),
                    input:   vec!["c3".into(), "shape_const".into()],
                    output:  vec!["score_8".to_string()],
                    ..Default::default()
                },
            ],
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn shaped_float(name: &str, dims: &[i64]) -> ValueInfoProto {
    ValueInfoProto {
        name: name.to_string(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type: tensor_proto::DataType::Float as i32,
                shape: Some(TensorShapeProto {
                    dim: dims
                        .iter()
                        .map(|&d| tensor_shape_proto::Dimension {
                            value: Some(tensor_shape_proto::dimension::Value::DimValue(d)),
                            ..Default::default()
                        })
                        .collect(),
                }),
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Fully typed `y = x[1,4] @ w[4,2]`, small enough for the engine to plan.
fn build_matmul_model() -> ModelProto {
    ModelProto {
        ir_version: 7,
        opset_import: vec![OperatorSetIdProto { domain: String::new(), version: 13 }],
        graph: Some(GraphProto {
            name: "embedding_head".to_string(),
            input:  vec![shaped_float("x", &[1, 4])],
            output: vec![shaped_float("y", &[1, 2])],
            initializer: vec![float_tensor(
                "w",
                &[-0.8, -0.3, 0.1, 0.4, 0.7, -0.5, 0.2, 0.9],
                &[4, 2],
            )],
            node: vec![NodeProto {
                op_type: "MatMul".to_string(),
                name:    "mm".to_string(),
                input:   vec!["x".to_string(), "w".to_string()],
                output:  vec!["y".to_string()],
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Encode a ModelProto to a tempfile and return the path.
fn write_model_to_tempfile(
    model: &ModelProto,
    dir: &tempfile::TempDir,
    name: &str,
) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut buf = Vec::new();
    model.encode(&mut buf).unwrap();
    std::fs::write(&path, buf).unwrap();
    path
}

fn initializer<'a>(model: &'a OnnxModel, name: &str) -> &'a TensorProto {
    model
        .graph()
        .initializer
        .iter()
        .find(|i| i.name == name)
        .unwrap_or_else(|| panic!("initializer '{name}' missing"))
}

fn original_initializer(proto: &ModelProto, name: &str) -> TensorProto {
    proto
        .graph
        .as_ref()
        .unwrap()
        .initializer
        .iter()
        .find(|i| i.name == name)
        .unwrap()
        .clone()
}

// ===========================================================================
// Single model
// ===========================================================================

#[test]
fn test_reference_values_in_place() {
    let model_proto = build_minimal_model(&[0.0, 1.0, 2.0, 255.0], &[4]);
    let dir = tempfile::tempdir().unwrap();
    let model_path = write_model_to_tempfile(&model_proto, &dir, "model.onnx");

    let mut model = OnnxModel::load(&model_path).unwrap();
    let report = Quantizer::default().quantize_model(&mut model).unwrap();
    assert_eq!(report.quantized_count(), 1);
    match &report.tensors[0].status {
        TensorStatus::Quantized { scale, zero_point, .. } => {
            assert_eq!(*scale, 1.0);
            assert_eq!(*zero_point, 0);
        }
        other => panic!("expected quantized, got {other:?}"),
    }

    let output_path = dir.path().join("model_int8.onnx");
    model.save(&output_path).unwrap();

    let reloaded = OnnxModel::load(&output_path).unwrap();
    let weight = initializer(&reloaded, "weight");
    assert_eq!(weight.data_type, tensor_proto::DataType::Uint8 as i32);
    assert_eq!(weight.dims, vec![4]);
    assert_eq!(weight.raw_data, vec![0, 1, 2, 255]);
    assert!(weight.float_data.is_empty());

    let info = reloaded.load_quantized_info();
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].name, "weight");
    assert_eq!(info[0].layout, WeightLayout::InPlace);
    assert_eq!(info[0].scale, 1.0);
    assert_eq!(info[0].zero_point, 0);
    assert_eq!(info[0].num_elements, 4);

    assert_eq!(reloaded.recorded_layout(), Some(WeightLayout::InPlace));
    assert!(reloaded.validate_connectivity().valid);
}

#[test]
fn test_constant_tensor_left_unchanged() {
    let model_proto = build_minimal_model(&[5.0, 5.0, 5.0], &[3]);
    let dir = tempfile::tempdir().unwrap();
    let model_path = write_model_to_tempfile(&model_proto, &dir, "model.onnx");

    let mut model = OnnxModel::load(&model_path).unwrap();
    let report = Quantizer::default().quantize_model(&mut model).unwrap();
    assert_eq!(report.quantized_count(), 0);
    assert_eq!(
        report.skipped().collect::<Vec<_>>(),
        vec![("weight", &SkipReason::Constant { value: 5.0 })]
    );

    let output_path = dir.path().join("model_int8.onnx");
    model.save(&output_path).unwrap();

    let reloaded = OnnxModel::load(&output_path).unwrap();
    assert_eq!(initializer(&reloaded, "weight"), &original_initializer(&model_proto, "weight"));
    assert!(reloaded.graph().quantization_annotation.is_empty());
}

#[test]
fn test_in_place_layout_on_detector_like_graph() {
    let model_proto = build_detector_like_model(11);
    let dir = tempfile::tempdir().unwrap();
    let model_path = write_model_to_tempfile(&model_proto, &dir, "det.onnx");

    let mut model = OnnxModel::load(&model_path).unwrap();
    let weights = model.extract_weights().unwrap();
    assert_eq!(weights.len(), 4, "INT64 initializer is not a weight");

    let report = Quantizer::default().quantize_model(&mut model).unwrap();
    assert_eq!(report.quantized_count(), 3);
    assert_eq!(report.skipped_count(), 1);

    let output_path = dir.path().join("det_int8.onnx");
    model.save(&output_path).unwrap();
    let reloaded = OnnxModel::load(&output_path).unwrap();

    // Non-FLOAT and constant initializers are byte-identical
    assert_eq!(initializer(&reloaded, "shape_const"), &original_initializer(&model_proto, "shape_const"));
    assert_eq!(initializer(&reloaded, "bn.mean"), &original_initializer(&model_proto, "bn.mean"));

    // Names, shapes and node wiring survive
    for name in ["conv1.weight", "conv1.bias", "conv2.weight"] {
        let t = initializer(&reloaded, name);
        assert_eq!(t.data_type, tensor_proto::DataType::Uint8 as i32, "{name}");
        assert_eq!(t.dims, original_initializer(&model_proto, name).dims, "{name}");
        assert!(initializer(&reloaded, &format!("{name}_scale")).float_data[0] > 0.0);
    }
    assert_eq!(reloaded.graph().node, model_proto.graph.as_ref().unwrap().node);

    // A graph input shadowing a weight is retyped with it
    let weight_input = reloaded.graph().input.iter().find(|i| i.name == "conv1.weight").unwrap();
    match weight_input.r#type.as_ref().and_then(|t| t.value.as_ref()) {
        Some(type_proto::Value::TensorType(t)) => {
            assert_eq!(t.elem_type, tensor_proto::DataType::Uint8 as i32)
        }
        other => panic!("unexpected type {other:?}"),
    }

    assert_eq!(reloaded.load_quantized_info().len(), 3);
    assert!(reloaded.validate_connectivity().valid);
}

#[test]
fn test_in_place_dequantize_accuracy() {
    let data: Vec<f32> = (0..256).map(|i| (i as f32 / 255.0) * 4.0 - 1.5).collect();
    let model_proto = build_minimal_model(&data, &[16, 16]);

    let mut model = OnnxModel::from_proto(model_proto).unwrap();
    Quantizer::default().quantize_model(&mut model).unwrap();

    let info = &model.load_quantized_info()[0];
    let bytes = &initializer(&model, "weight").raw_data;
    assert_eq!(bytes.len(), data.len());

    for (&original, &q) in data.iter().zip(bytes) {
        let restored = (i32::from(q) - info.zero_point) as f32 * info.scale;
        assert!(
            (restored - original).abs() <= info.scale,
            "{original} restored as {restored} (scale {})",
            info.scale
        );
    }
}

#[test]
fn test_qdq_layout_round_trip() {
    let model_proto = build_detector_like_model(9);
    let dir = tempfile::tempdir().unwrap();
    let model_path = write_model_to_tempfile(&model_proto, &dir, "det.onnx");

    let mut model = OnnxModel::load(&model_path).unwrap();
    let report = Quantizer::new(QuantConfig::qdq()).quantize_model(&mut model).unwrap();
    assert_eq!(report.quantized_count(), 3);

    let output_path = dir.path().join("det_int8.onnx");
    model.save(&output_path).unwrap();
    let reloaded = OnnxModel::load(&output_path).unwrap();

    let report = reloaded.validate_connectivity();
    assert!(report.valid, "Connectivity broken: {:?}", report.broken_refs);

    let graph = reloaded.graph();
    let dq_nodes = graph.node.iter().take_while(|n| n.op_type == "DequantizeLinear").count();
    assert_eq!(dq_nodes, 3, "DequantizeLinear nodes come first");
    assert!(graph.initializer.iter().all(|i| i.name != "conv1.weight"));
    assert!(graph.input.iter().all(|i| i.name != "conv1.weight"));

    let zp = initializer(&reloaded, "conv2.weight_zero_point");
    assert_eq!(zp.data_type, tensor_proto::DataType::Uint8 as i32);

    assert!(reloaded.info().opset.unwrap() >= 10);
    assert_eq!(reloaded.recorded_layout(), Some(WeightLayout::Qdq));

    let info = reloaded.load_quantized_info();
    assert_eq!(info.len(), 3);
    assert!(info.iter().all(|i| i.layout == WeightLayout::Qdq));
    assert!(info.iter().all(|i| (0..=255).contains(&i.zero_point)));
}

#[test]
fn test_min_elements_and_excluded_layers() {
    let mut model = OnnxModel::from_proto(build_detector_like_model(13)).unwrap();
    let config = QuantConfig {
        min_elements: 16,
        excluded_layers: vec!["conv2.weight".to_string()],
        ..QuantConfig::default()
    };
    let report = Quantizer::new(config).quantize_model(&mut model).unwrap();

    let status_of = |name: &str| {
        report
            .tensors
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.status.clone())
            .unwrap()
    };
    assert!(matches!(status_of("conv1.weight"), TensorStatus::Quantized { .. }));
    assert_eq!(
        status_of("conv1.bias"),
        TensorStatus::Skipped(SkipReason::BelowMinElements { min_elements: 16 })
    );
    assert_eq!(status_of("conv2.weight"), TensorStatus::Skipped(SkipReason::Excluded));
    assert_eq!(report.quantized_count(), 1);

    assert_eq!(
        initializer(&model, "conv2.weight").data_type,
        tensor_proto::DataType::Float as i32
    );
}

#[test]
fn test_non_finite_weight_is_skipped() {
    let mut model = OnnxModel::from_proto(build_minimal_model(&[0.0, f32::NAN, 1.0], &[3])).unwrap();
    let report = Quantizer::default().quantize_model(&mut model).unwrap();
    assert_eq!(report.quantized_count(), 0);
    assert_eq!(
        report.skipped().collect::<Vec<_>>(),
        vec![("weight", &SkipReason::NonFinite)]
    );
}

#[test]
fn test_shape_mismatch_fails_without_mutation() {
    let proto = build_minimal_model(&[0.0, 1.0, 2.0], &[2, 2]);
    let mut model = OnnxModel::from_proto(proto.clone()).unwrap();

    let err = Quantizer::default().quantize_model(&mut model).unwrap_err();
    assert!(matches!(err, QuantizeError::InvalidTensor { .. }));
    assert_eq!(model.into_proto(), proto);
}

#[test]
fn test_info_and_initializer_summary() {
    let model = OnnxModel::from_proto(build_detector_like_model(11)).unwrap();
    let info = model.info();
    assert_eq!(info.name, "detector");
    assert_eq!(info.opset, Some(11));
    assert_eq!(info.num_nodes, 4);
    assert_eq!(info.num_initializers, 5);
    assert_eq!(info.outputs, vec!["score_8"]);

    let summary = model.initializer_summary();
    assert_eq!(summary["FLOAT"].count, 4);
    assert_eq!(summary["FLOAT"].bytes, (64 + 4 + 128 + 8) * 4);
    assert_eq!(summary["INT64"].count, 1);
    assert_eq!(summary["INT64"].bytes, 16);
}

#[test]
fn test_error_variants_are_correct() {
    let err = OnnxModel::load("/nonexistent/scrfd_10g_bnkps.onnx").unwrap_err();
    assert!(matches!(err, QuantizeError::InputNotFound { .. }), "got {err:?}");

    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("bad.onnx");
    std::fs::write(&bad, [0xff, 0xff, 0xff]).unwrap();
    let err = OnnxModel::load(&bad).unwrap_err();
    assert!(matches!(err, QuantizeError::ModelLoad { .. }), "got {err:?}");

    let err = "int4".parse::<WeightLayout>().unwrap_err();
    assert!(matches!(err, QuantizeError::UnsupportedConfig { .. }));
}

// ===========================================================================
// Batch runner
// ===========================================================================

#[test]
fn test_batch_missing_and_present_models() {
    let dir = tempfile::tempdir().unwrap();
    let present = write_model_to_tempfile(&build_detector_like_model(11), &dir, "w600k_r50.onnx");
    let original_bytes = std::fs::read(&present).unwrap();

    let jobs = vec![
        ModelJob::new("SCRFD Detector", dir.path().join("scrfd_10g_bnkps.onnx"), QuantConfig::default()),
        ModelJob::new("ArcFace Recognizer", &present, QuantConfig::default()),
    ];
    let summary = run_batch(&jobs, false);

    assert_eq!(summary.total(), 2);
    assert_eq!(summary.success_count(), 1);
    assert_eq!(summary.failed_names(), vec!["SCRFD Detector"]);
    assert!(matches!(
        summary.results[0].status,
        JobStatus::Failed(QuantizeError::InputNotFound { .. })
    ));

    let output = dir.path().join("w600k_r50_int8.onnx");
    assert!(output.exists());
    assert!(!dir.path().join("scrfd_10g_bnkps_int8.onnx").exists());

    // The input is never rewritten
    assert_eq!(std::fs::read(&present).unwrap(), original_bytes);

    match &summary.results[1].status {
        JobStatus::Succeeded(success) => {
            assert_eq!(success.size.original_bytes, original_bytes.len() as u64);
            assert_eq!(
                success.size.quantized_bytes,
                std::fs::metadata(&output).unwrap().len()
            );
            assert_eq!(success.report.quantized_count(), 3);
            assert!(success.validation.is_none());
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[test]
fn test_batch_size_reduction() {
    let data: Vec<f32> = (0..4096).map(|i| ((i % 97) as f32 - 48.0) * 0.01).collect();
    let dir = tempfile::tempdir().unwrap();
    let path = write_model_to_tempfile(&build_minimal_model(&data, &[64, 64]), &dir, "big.onnx");

    let summary = run_batch(&[ModelJob::new("Big", &path, QuantConfig::default())], false);
    let JobStatus::Succeeded(success) = &summary.results[0].status else {
        panic!("expected success");
    };
    let reduction = success.size.reduction_percent();
    assert!(reduction > 70.0 && reduction < 76.0, "reduction {reduction:.1}%");
}

#[test]
fn test_batch_skip_existing() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model_to_tempfile(&build_minimal_model(&[0.0, 1.0], &[2]), &dir, "m.onnx");
    let output = dir.path().join("m_int8.onnx");
    std::fs::write(&output, b"keep me").unwrap();

    let mut job = ModelJob::new("M", &path, QuantConfig::default());
    job.skip_existing = true;
    let summary = run_batch(&[job], false);

    assert!(summary.all_succeeded());
    assert!(matches!(summary.results[0].status, JobStatus::SkippedExisting));
    assert_eq!(std::fs::read(&output).unwrap(), b"keep me");
}

#[test]
fn test_batch_validation_failure_is_not_job_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model_to_tempfile(&build_minimal_model(&[0.0, 1.0, 2.0, 3.0], &[4]), &dir, "m.onnx");

    let summary = run_batch(&[ModelJob::new("M", &path, QuantConfig::default())], true);
    assert!(summary.all_succeeded());
    match &summary.results[0].status {
        JobStatus::Succeeded(success) => assert!(success.validation.is_some()),
        other => panic!("expected success, got {other:?}"),
    }
}

#[test]
fn test_config_file_drives_batch() {
    let dir = tempfile::tempdir().unwrap();
    let det = write_model_to_tempfile(&build_detector_like_model(11), &dir, "det.onnx");
    let rec = write_model_to_tempfile(&build_minimal_model(&[0.0, 1.0, 2.0, 255.0], &[4]), &dir, "rec.onnx");
    let rec_out = dir.path().join("out").join("rec_q.onnx");

    let yaml = format!(
        "layout: qdq\nmodels:\n  - name: Detector\n    input: {}\n  - input: {}\n    output: {}\n    layout: in-place\n",
        det.display(),
        rec.display(),
        rec_out.display()
    );
    let config_path = dir.path().join("quant.yaml");
    std::fs::write(&config_path, yaml).unwrap();

    let config = Config::from_file(&config_path).unwrap();
    config.validate().unwrap();
    let summary = run_batch(&config.jobs(), config.validate);

    assert!(summary.all_succeeded(), "failed: {:?}", summary.failed_names());
    let det_out = OnnxModel::load(dir.path().join("det_int8.onnx")).unwrap();
    assert_eq!(det_out.recorded_layout(), Some(WeightLayout::Qdq));
    let rec_model = OnnxModel::load(&rec_out).unwrap();
    assert_eq!(rec_model.recorded_layout(), Some(WeightLayout::InPlace));
}

#[test]
fn test_overflowing_dims_fail_one_job_only() {
    let mut bad = build_minimal_model(&[1.0, 2.0], &[2]);
    bad.graph.as_mut().unwrap().initializer[0].dims = vec![1 << 62, 4];

    let dir = tempfile::tempdir().unwrap();
    let bad_path = write_model_to_tempfile(&bad, &dir, "bad.onnx");
    let good_path = write_model_to_tempfile(&build_minimal_model(&[0.0, 1.0], &[2]), &dir, "good.onnx");

    let jobs = vec![
        ModelJob::new("Bad", &bad_path, QuantConfig::default()),
        ModelJob::new("Good", &good_path, QuantConfig::default()),
    ];
    let summary = run_batch(&jobs, false);

    assert_eq!(summary.failed_names(), vec!["Bad"]);
    assert!(matches!(
        summary.results[0].status,
        JobStatus::Failed(QuantizeError::InvalidTensor { .. })
    ));
    assert!(!dir.path().join("bad_int8.onnx").exists());
    assert!(summary.results[1].is_success());
}

#[test]
fn test_qdq_output_loads_in_engine_and_in_place_does_not() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model_to_tempfile(&build_matmul_model(), &dir, "head.onnx");

    let original = validate_loadable(&path).unwrap();
    assert_eq!(original.inputs, vec!["x"]);
    assert_eq!(original.outputs, vec!["y"]);

    let qdq_path = dir.path().join("head_qdq.onnx");
    batch::quantize_file(&path, &qdq_path, &QuantConfig::qdq()).unwrap();
    let report = validate_loadable(&qdq_path).unwrap();
    assert_eq!(report.inputs.len(), 1);
    assert_eq!(report.outputs.len(), 1);
    assert_eq!(report.outputs, vec!["y"]);

    let in_place_path = dir.path().join("head_in_place.onnx");
    batch::quantize_file(&path, &in_place_path, &QuantConfig::in_place()).unwrap();
    let err = validate_loadable(&in_place_path).unwrap_err();
    assert!(matches!(err, QuantizeError::Validation { .. }), "got {err:?}");
}
