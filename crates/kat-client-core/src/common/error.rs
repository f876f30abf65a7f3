//! Fatal errors for a batch run.
//!
//! Per-query failures (bad RPC path, transport errors, unsupported protocols)
//! are never represented here. They are recorded on the query as a
//! [`QueryResult`](crate::QueryResult) and the batch keeps going. The variants
//! below abort the whole run and no output is written.
//!
//! ## Error Cases
//! - `DuplicateResult`: a query arrived already carrying a result, which means
//!   a spec object was reused.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified fatal error type for the query runner.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The query at `index` already had a `result` before execution began.
    #[error("Found pre-existing results in query #{index} ({url})")]
    DuplicateResult { index: usize, url: String },
}
