//! Query execution engine.
//!
//! ## Structure
//!
//! - [`config`] - CLI/env settings, including the concurrency limit.
//! - [`telemetry`] - logging and optional OpenTelemetry export.
//! - [`limiter`] - the slot pool bounding in-flight queries.
//! - [`classify`] - picks WebSocket, gRPC or HTTP handling for a query.
//! - [`grpc`] - the echo service round trip and its transports.
//! - [`dispatch`] - runs one query from guard to result.
//! - [`batch`] - runs a whole batch and reads/writes batch files.

pub mod batch;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod grpc;
pub mod limiter;
pub mod telemetry;
