//! # Telemetry
//!
//! Logging is always on: a `tracing_subscriber` registry with an
//! [`EnvFilter`] (`RUST_LOG`, default `info`) and a `fmt` layer writing to
//! **stderr**. Standard output is reserved for the annotated batch.
//!
//! OpenTelemetry export is opt-in through Cargo features:
//!
//! - `otel-trace`: bridges `tracing` spans into an OpenTelemetry tracer. Each
//!   query runs inside a `query` span.
//! - `otel-metrics`: records query counters and durations through an
//!   OpenTelemetry meter.
//! - `otlp`: ships whatever the two features above produce to an OTLP/gRPC
//!   collector at `OTEL_EXPORTER_OTLP_ENDPOINT`.
//!
//! ```bash
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 \
//!     cargo run --features otel-trace,otel-metrics,otlp -- --input batch.json
//! ```

// Disallow using `otlp` without something to export
#[cfg(all(feature = "otlp", not(any(feature = "otel-trace", feature = "otel-metrics"))))]
compile_error!(
    "The 'otlp' feature requires at least one of 'otel-trace' or 'otel-metrics' to be enabled."
);

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(all(feature = "otlp", any(feature = "otel-metrics", feature = "otel-trace")))]
use opentelemetry_otlp::{Protocol, WithExportConfig};

#[cfg(feature = "otel-metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "otel-metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "otel-metrics")]
use std::sync::OnceLock;

#[cfg(any(feature = "otel-metrics", feature = "otel-trace"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "otel-metrics", feature = "otel-trace"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "otel-metrics", feature = "otel-trace"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "otel-trace")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel-trace")]
use opentelemetry_sdk::trace as sdktrace;

#[cfg(feature = "otlp")]
const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

pub struct TelemetryProviders {
    #[cfg(feature = "otel-trace")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "otel-metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes pending spans and metrics and shuts the providers down.
    pub fn shutdown(self) {
        #[cfg(feature = "otel-trace")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                tracing::error!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "otel-metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                tracing::error!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "otel-trace")]
    let tracer_provider = init_tracer()?;

    #[cfg(feature = "otel-metrics")]
    let meter_provider = init_metrics()?;

    #[cfg(any(feature = "otel-metrics", feature = "otel-trace"))]
    let scope = InstrumentationScope::builder("kat-client")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339()),
        );

    #[cfg(feature = "otel-trace")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "otel-metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "otel-trace")]
        tracer_provider,
        #[cfg(feature = "otel-metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "otel-metrics", feature = "otel-trace"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("kat-client")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "otlp")]
fn otlp_endpoint() -> anyhow::Result<String> {
    use anyhow::Context;

    std::env::var(OTLP_ENDPOINT_VAR).with_context(|| format!("missing `{OTLP_ENDPOINT_VAR}`"))
}

#[cfg(feature = "otel-metrics")]
fn init_metrics() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_timeout(std::time::Duration::from_secs(10))
            .with_endpoint(otlp_endpoint()?)
            .with_protocol(Protocol::Grpc)
            .build()
            .context("failed to build metrics exporter")?;

        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(feature = "otel-trace")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_timeout(std::time::Duration::from_secs(10))
            .with_endpoint(otlp_endpoint()?)
            .with_protocol(Protocol::Grpc)
            .build()
            .context("failed to build tracer exporter")?;

        builder.with_batch_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(feature = "otel-metrics")]
static QUERIES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static QUERIES_INFLIGHT: OnceLock<UpDownCounter<i64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static QUERY_ERRORS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static QUERY_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();

#[cfg(feature = "otel-metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = QUERIES.set(
        meter
            .u64_counter("queries")
            .with_description("Queries executed, by protocol")
            .build(),
    );

    let _ = QUERIES_INFLIGHT.set(
        meter
            .i64_up_down_counter("queries_inflight")
            .with_description("Queries holding a concurrency slot")
            .build(),
    );

    let _ = QUERY_ERRORS.set(
        meter
            .u64_counter("query_errors")
            .with_description("Queries whose result is an error")
            .build(),
    );

    let _ = QUERY_DURATION_MS.set(
        meter
            .f64_histogram("query_duration")
            .with_unit("ms")
            .with_description("Time from slot acquisition to result")
            .build(),
    );
}

// No-ops unless `otel-metrics` is enabled
#[cfg(feature = "otel-metrics")]
pub fn increment_queries(protocol: &'static str) {
    if let Some(counter) = QUERIES.get() {
        counter.add(1, &[KeyValue::new("protocol", protocol)]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn increment_queries(_protocol: &'static str) {}

#[cfg(feature = "otel-metrics")]
pub fn increment_queries_inflight() {
    if let Some(counter) = QUERIES_INFLIGHT.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn increment_queries_inflight() {}

#[cfg(feature = "otel-metrics")]
pub fn decrement_queries_inflight() {
    if let Some(counter) = QUERIES_INFLIGHT.get() {
        counter.add(-1, &[]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn decrement_queries_inflight() {}

#[cfg(feature = "otel-metrics")]
pub fn increment_query_errors() {
    if let Some(counter) = QUERY_ERRORS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn increment_query_errors() {}

#[cfg(feature = "otel-metrics")]
pub fn record_query_duration(duration_ms: f64) {
    if let Some(histogram) = QUERY_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn record_query_duration(_duration_ms: f64) {}
