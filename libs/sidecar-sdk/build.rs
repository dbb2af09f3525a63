fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/dapr/proto/runtime/v1/lock.proto");
    println!("cargo:rerun-if-changed=proto");

    tonic_prost_build::configure()
        .build_client(true)
        .build_server(false)
        .compile_protos(&["proto/dapr/proto/runtime/v1/lock.proto"], &["proto"])?;

    Ok(())
}
