use core::fmt;
use kat_client_core::{QuerySpec, find_headers};

const GRPC_CONTENT_TYPE: &str = "application/grpc";

/// Execution path chosen for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    WebSocket,
    Grpc,
    Http,
}

impl Protocol {
    pub const fn as_str(self) -> &'static str {
        match self {
            Protocol::WebSocket => "websocket",
            Protocol::Grpc => "grpc",
            Protocol::Http => "http",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks the execution path for `spec`. First match wins:
///
/// 1. `ws:` / `wss:` URL scheme: [`Protocol::WebSocket`], whatever the
///    headers say.
/// 2. Any `content-type` value equal to `application/grpc` (ignoring case),
///    under any casing of the header name: [`Protocol::Grpc`].
/// 3. Everything else: [`Protocol::Http`].
pub fn classify(spec: &QuerySpec) -> Protocol {
    if is_websocket(&spec.url) {
        Protocol::WebSocket
    } else if is_grpc(spec) {
        Protocol::Grpc
    } else {
        Protocol::Http
    }
}

fn is_websocket(url: &str) -> bool {
    url.split_once(':')
        .is_some_and(|(scheme, _)| scheme.eq_ignore_ascii_case("ws") || scheme.eq_ignore_ascii_case("wss"))
}

fn is_grpc(spec: &QuerySpec) -> bool {
    find_headers(&spec.headers, "content-type").any(|found| {
        found
            .values
            .iter()
            .any(|value| value.eq_ignore_ascii_case(GRPC_CONTENT_TYPE))
    })
}
