//! Request header values as they appear in a batch file.
//!
//! A header is either a single string or an ordered list of strings. Both
//! shapes are accepted on input and written back unchanged; anything that
//! inspects header values goes through [`HeaderValues::values`], which always
//! yields a list.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Header name to value(s), in the order the batch file listed them.
pub type Headers = IndexMap<String, HeaderValues>;

/// A header value that is either a lone string or a multi-valued list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValues {
    Single(String),
    Multi(Vec<String>),
}

impl HeaderValues {
    /// Returns the values as an ordered list, wrapping a single string.
    pub fn values(&self) -> Vec<String> {
        match self {
            Self::Single(value) => vec![value.clone()],
            Self::Multi(values) => values.clone(),
        }
    }
}

impl From<&str> for HeaderValues {
    fn from(value: &str) -> Self {
        Self::Single(value.to_owned())
    }
}

impl From<Vec<String>> for HeaderValues {
    fn from(values: Vec<String>) -> Self {
        Self::Multi(values)
    }
}

/// A header found by [`find_header`] or [`find_headers`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderMatch<'a> {
    /// The header name with its original casing.
    pub name: &'a str,
    /// The header's values, normalized to a list.
    pub values: Vec<String>,
}

/// Looks up `name` case-insensitively.
///
/// The first matching entry wins. Returns `None` when no header matches.
pub fn find_header<'a>(headers: &'a Headers, name: &str) -> Option<HeaderMatch<'a>> {
    find_headers(headers, name).next()
}

/// Every entry whose name equals `name` case-insensitively, in batch file
/// order. A map can hold `Content-Type` and `content-type` side by side.
pub fn find_headers<'a>(
    headers: &'a Headers,
    name: &str,
) -> impl Iterator<Item = HeaderMatch<'a>> {
    headers
        .iter()
        .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(key, values)| HeaderMatch {
            name: key.as_str(),
            values: values.values(),
        })
}
