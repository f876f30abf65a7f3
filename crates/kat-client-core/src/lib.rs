#![doc = include_str!("../README.md")]

mod common;
pub use common::*;

/// gRPC bindings generated from `proto/echo.proto`.
///
/// - [`echo_service_client::EchoServiceClient`] - client used by the runner.
/// - [`echo_service_server::EchoServiceServer`] - server side of the same
///   contract, handy for standing up a local echo backend.
///
/// The service is reachable at [`ECHO_PATH`](crate::ECHO_PATH).
pub mod proto {
    tonic::include_proto!("echo");
}
