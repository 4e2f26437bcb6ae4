fn main() {
    // Compile the vendored ONNX proto3 schema with protox (pure-Rust protobuf
    // compiler, no system `protoc` needed) and generate prost bindings.
    let file_descriptor_set = protox::compile(["proto/onnx.proto3"], ["proto/"])
        .expect("failed to compile ONNX proto3 file");

    prost_build::Config::new()
        .compile_fds(file_descriptor_set)
        .expect("failed to generate prost bindings from ONNX proto3");

    println!("cargo:rerun-if-changed=proto/onnx.proto3");
}
