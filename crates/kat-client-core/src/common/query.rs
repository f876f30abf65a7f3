//! Query specs and their results.
//!
//! A batch file is a JSON array of [`QuerySpec`] objects. Executing a spec
//! produces exactly one [`QueryResult`]; the pair is written back out as an
//! [`AnnotatedQuery`], which is the original object plus a `result` key.
//!
//! Specs are never mutated. The runner keeps results in a separate list that
//! is index-aligned with the input, so output order always matches input
//! order no matter when each query finished.

use super::headers::Headers;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// RPC path of the only gRPC method the runner knows how to call.
pub const ECHO_PATH: &str = "/echo.EchoService/Echo";

/// Method assumed when a spec does not name one.
pub const DEFAULT_METHOD: &str = "GET";

/// Response metadata name to every value returned for it, in server order.
pub type ResponseHeaders = IndexMap<String, Vec<String>>;

/// One declarative network call from a batch file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Absolute URL; the scheme selects WebSocket handling and, for gRPC, the
    /// path names the RPC.
    pub url: String,

    #[serde(default)]
    pub headers: Headers,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// A `result` present on input, `Some(Value::Null)` for an explicit
    /// `null`. Only read to reject reused specs; the real result is attached
    /// on output by [`AnnotatedQuery`].
    #[serde(default, deserialize_with = "present", skip_serializing)]
    pub result: Option<Value>,

    /// Any other fields, passed through to the output untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Marks a key as present even when its value is `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl QuerySpec {
    pub fn new(url: impl Into<String>, headers: Headers) -> Self {
        Self {
            url: url.into(),
            headers,
            ..Self::default()
        }
    }

    /// The request method, falling back to [`DEFAULT_METHOD`].
    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or(DEFAULT_METHOD)
    }

    /// Whether this spec arrived with a result already attached.
    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }
}

/// Outcome of executing one [`QuerySpec`].
///
/// Serialized with the variant name as the only key, e.g.
/// `{"error": "..."}`, so a result always carries exactly one of `headers`,
/// `error` or `unsupported`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryResult {
    /// Metadata returned by a successful exchange.
    Headers(ResponseHeaders),
    /// Why the exchange failed.
    Error(String),
    /// The query's protocol has no handler.
    Unsupported(String),
}

impl QueryResult {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// A spec paired with its result, serialized as one flat JSON object.
#[derive(Debug, Serialize)]
pub struct AnnotatedQuery<'a> {
    #[serde(flatten)]
    pub spec: &'a QuerySpec,
    pub result: &'a QueryResult,
}

impl<'a> AnnotatedQuery<'a> {
    /// Pairs each spec with the result at the same position.
    pub fn zip(specs: &'a [QuerySpec], results: &'a [QueryResult]) -> Vec<Self> {
        specs
            .iter()
            .zip(results)
            .map(|(spec, result)| Self { spec, result })
            .collect()
    }
}
