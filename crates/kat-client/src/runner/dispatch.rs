//! Execution of a single query.
//!
//! A query moves through `Pending -> Classified -> Executing -> Completed`
//! exactly once. The only way out other than a result is the reused-spec
//! guard, which aborts the whole batch.

use crate::runner::{
    classify::{Protocol, classify},
    grpc::{EchoCall, EchoClient},
    limiter::ConcurrencyLimiter,
    telemetry::{increment_queries, increment_query_errors, record_query_duration},
};
use kat_client_core::{Error, QueryResult, QuerySpec, Result};
use tracing::Instrument;

pub const WEBSOCKET_UNSUPPORTED: &str = "Websocket queries are not supported.";
pub const HTTP_UNSUPPORTED: &str = "HTTP(S) queries are not supported.";

/// Runs one query at a time against a shared limiter and echo client.
#[derive(Debug)]
pub struct QueryDispatcher<'a, C> {
    limiter: &'a ConcurrencyLimiter,
    echo: &'a EchoClient<C>,
}

impl<C> Clone for QueryDispatcher<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for QueryDispatcher<'_, C> {}

impl<'a, C: EchoCall> QueryDispatcher<'a, C> {
    pub const fn new(limiter: &'a ConcurrencyLimiter, echo: &'a EchoClient<C>) -> Self {
        Self { limiter, echo }
    }

    /// Executes the query at position `index` of its batch.
    ///
    /// Waits for a concurrency slot, classifies the query, and runs the
    /// matching handler. The slot is released as soon as the handler returns.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateResult`] if `spec` already carries a result.
    pub async fn dispatch(self, index: usize, spec: &QuerySpec) -> Result<QueryResult> {
        if spec.has_result() {
            return Err(Error::DuplicateResult {
                index,
                url: spec.url.clone(),
            });
        }

        let span = tracing::info_span!(
            "query",
            index,
            url = %spec.url,
            method = spec.method(),
            protocol = tracing::field::Empty,
        );
        Ok(self.execute(spec).instrument(span).await)
    }

    async fn execute(self, spec: &QuerySpec) -> QueryResult {
        let slot = self.limiter.acquire().await;
        let start = std::time::Instant::now();
        tracing::trace!(
            "Acquired slot ({}/{} in use)",
            self.limiter.in_flight(),
            self.limiter.capacity()
        );

        let protocol = classify(spec);
        tracing::Span::current().record("protocol", protocol.as_str());
        tracing::debug!("Classified as {protocol}");
        increment_queries(protocol.as_str());

        let result = match protocol {
            Protocol::WebSocket => QueryResult::Unsupported(WEBSOCKET_UNSUPPORTED.to_owned()),
            Protocol::Grpc => self.echo.execute(spec).await,
            Protocol::Http => QueryResult::Unsupported(HTTP_UNSUPPORTED.to_owned()),
        };
        slot.release();

        record_query_duration(start.elapsed().as_secs_f64() * 1000.0);
        if let QueryResult::Error(message) = &result {
            increment_query_errors();
            tracing::warn!("{message}");
        }
        result
    }
}
