//! Shared types for loading, executing and reporting a query batch.
//!
//! - [`error`] - fatal errors that abort a batch run.
//! - [`headers`] - string-or-list header values and case-insensitive lookup.
//! - [`query`] - the query spec, its result, and the annotated output record.

pub mod error;
pub mod headers;
pub mod query;

pub use error::{Error, Result};
pub use headers::{HeaderMatch, HeaderValues, Headers, find_header, find_headers};
pub use query::{AnnotatedQuery, DEFAULT_METHOD, ECHO_PATH, QueryResult, QuerySpec, ResponseHeaders};
