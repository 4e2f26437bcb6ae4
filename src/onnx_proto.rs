//! Prost-generated ONNX protobuf types.
//!
//! Generated at build time from `proto/onnx.proto3` with
//! [`prost-build`](https://docs.rs/prost-build) and
//! [`protox`](https://docs.rs/protox), so no system `protoc` is required.
//!
//! # Usage
//!
//! ```rust,ignore
//! use face_quant::onnx_proto::{ModelProto, tensor_proto};
//! use prost::Message;
//!
//! let proto = ModelProto::decode(bytes.as_ref())?;
//! let graph = proto.graph.as_ref().unwrap();
//! ```

// The generated file is named after the proto package (`onnx`).
include!(concat!(env!("OUT_DIR"), "/onnx.rs"));
