//! Batch execution and the batch file format.
//!
//! [`run_batch`] starts every query of a batch at once and waits for all of
//! them. Results come back in input order regardless of completion order.
//! A fatal error from any query abandons the rest of the batch.

use crate::runner::{
    dispatch::QueryDispatcher,
    grpc::{EchoCall, EchoClient},
    limiter::ConcurrencyLimiter,
};
use anyhow::Context;
use futures::future::try_join_all;
use kat_client_core::{AnnotatedQuery, QueryResult, QuerySpec, Result};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Runs all `specs` concurrently, bounded by `limiter`.
///
/// The returned results are index-aligned with `specs`.
///
/// # Errors
///
/// The first fatal error from any query, such as a spec that already carries
/// a result. No results are returned in that case.
pub async fn run_batch<C: EchoCall>(
    specs: &[QuerySpec],
    limiter: &ConcurrencyLimiter,
    echo: &EchoClient<C>,
) -> Result<Vec<QueryResult>> {
    let dispatcher = QueryDispatcher::new(limiter, echo);
    try_join_all(
        specs
            .iter()
            .enumerate()
            .map(|(index, spec)| dispatcher.dispatch(index, spec)),
    )
    .await
}

/// Reads a JSON array of query specs from `path`.
pub async fn load_batch(path: &Path) -> anyhow::Result<Vec<QuerySpec>> {
    let data = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_batch(&data).with_context(|| format!("Failed to parse {} as JSON", path.display()))
}

pub fn parse_batch(data: &str) -> serde_json::Result<Vec<QuerySpec>> {
    serde_json::from_str(data)
}

/// Renders specs and their results as a pretty-printed JSON array.
pub fn render_batch(specs: &[QuerySpec], results: &[QueryResult]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&AnnotatedQuery::zip(specs, results))
}

/// Writes the annotated batch to `path`, or to stdout for `/dev/stdout` and
/// `-`.
pub async fn save_batch(
    path: &Path,
    specs: &[QuerySpec],
    results: &[QueryResult],
) -> anyhow::Result<()> {
    let data = render_batch(specs, results).context("Failed to serialize results")?;

    if path == Path::new("/dev/stdout") || path == Path::new("-") {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(data.as_bytes()).await?;
        stdout.flush().await?;
        return Ok(());
    }

    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
