/// Generates the client and server bindings for `proto/echo.proto`.
///
/// Protobuf maps in the `echo` package are emitted as `BTreeMap` instead of
/// `HashMap`, so the headers echoed back by the service are visited in a
/// stable order when they are copied into a query result.
///
/// Generated code is available in Rust via:
///
/// ```rust
/// pub mod proto {
///     tonic::include_proto!("echo");
/// }
/// ```
fn main() {
    let mut config = tonic_prost_build::Config::new();
    config.btree_map([".echo"]);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/echo.proto"], &["proto"])
        .unwrap();
}
