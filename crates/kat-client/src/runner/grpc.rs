//! The gRPC query handler.
//!
//! [`EchoClient`] performs one `echo.EchoService/Echo` round trip for a query
//! and folds the outcome into a [`QueryResult`]:
//!
//! - the URL path must be exactly [`ECHO_PATH`], otherwise no call is made;
//! - the request carries a fixed set of fixture metadata asking the echo
//!   service to reflect `x-requested-header` back with status `0` (the
//!   query's own headers are not forwarded);
//! - on success, the echoed response headers become `result.headers`;
//! - on failure, `result.error` is `Request failed: [<code>] <message>`.
//!
//! The wire exchange sits behind [`EchoCall`]. [`Transport`] implements it for
//! gRPC-Web and for native gRPC over HTTP/2. Plain `http` gRPC-Web goes out
//! over HTTP/1.1 like a browser would send it; `https` gRPC-Web rides a TLS
//! channel and lets ALPN pick the protocol.

use crate::runner::config::Transport;
use core::future::Future;
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use kat_client_core::{
    ECHO_PATH, QueryResult, QuerySpec, ResponseHeaders,
    proto::{EchoRequest, EchoResponse, echo_service_client::EchoServiceClient},
};
use tonic::{
    Request, Status,
    body::Body,
    codegen::http,
    metadata::MetadataValue,
    transport::{Channel, ClientTlsConfig, Uri},
};
use tonic_web::{GrpcWebCall, GrpcWebClientLayer};
use tower::ServiceBuilder;
use url::{Origin, Url};

/// Metadata sent with every echo request.
const FIXTURE_METADATA: [(&str, &str); 3] = [
    ("requested-status", "0"),
    ("x-requested-header", "ok"),
    ("requested-headers", "x-requested-header"),
];

/// One unary call to the echo service at `origin`.
pub trait EchoCall {
    fn echo(
        &self,
        origin: Uri,
        request: Request<EchoRequest>,
    ) -> impl Future<Output = Result<EchoResponse, Status>>;
}

impl EchoCall for Transport {
    async fn echo(
        &self,
        origin: Uri,
        request: Request<EchoRequest>,
    ) -> Result<EchoResponse, Status> {
        match self {
            Transport::GrpcWeb if is_secure(&origin) => echo_grpc_web_tls(origin, request).await,
            Transport::GrpcWeb => echo_grpc_web(origin, request).await,
            Transport::Grpc => echo_grpc(origin, request).await,
        }
    }
}

fn is_secure(origin: &Uri) -> bool {
    origin.scheme_str() == Some("https")
}

/// gRPC-Web over HTTP/1.1. Each call gets its own client, so nothing is
/// pooled between queries.
async fn echo_grpc_web(origin: Uri, request: Request<EchoRequest>) -> Result<EchoResponse, Status> {
    let client = Client::builder(TokioExecutor::new()).build_http();
    let service = ServiceBuilder::new()
        .layer(GrpcWebClientLayer::new())
        .map_err(|err: hyper_util::client::legacy::Error| unavailable(&err))
        .service(client);

    let mut client = EchoServiceClient::with_origin(service, origin);
    let response = client.echo(request).await?;
    Ok(response.into_inner())
}

/// gRPC-Web framing on top of a TLS channel.
async fn echo_grpc_web_tls(
    origin: Uri,
    request: Request<EchoRequest>,
) -> Result<EchoResponse, Status> {
    let channel = connect(origin.clone()).await?;
    let service = ServiceBuilder::new()
        .layer(GrpcWebClientLayer::new())
        .map_request(|req: http::Request<GrpcWebCall<Body>>| req.map(Body::new))
        .map_err(|err: tonic::transport::Error| unavailable(&err))
        .service(channel);

    let mut client = EchoServiceClient::with_origin(service, origin);
    let response = client.echo(request).await?;
    Ok(response.into_inner())
}

/// Native gRPC over HTTP/2, with TLS for `https` origins.
async fn echo_grpc(origin: Uri, request: Request<EchoRequest>) -> Result<EchoResponse, Status> {
    let channel = connect(origin).await?;
    let mut client = EchoServiceClient::new(channel);
    let response = client.echo(request).await?;
    Ok(response.into_inner())
}

/// Opens a channel to `origin`, negotiating TLS against the bundled webpki roots
/// when the scheme is `https`.
async fn connect(origin: Uri) -> Result<Channel, Status> {
    let secure = is_secure(&origin);
    let mut endpoint = Channel::builder(origin);
    if secure {
        endpoint = endpoint
            .tls_config(ClientTlsConfig::new().with_webpki_roots())
            .map_err(|err| unavailable(&err))?;
    }
    endpoint.connect().await.map_err(|err| unavailable(&err))
}

/// Transport failures carry their whole source chain; the top-level error
/// alone is just "transport error" or "client error (Connect)".
fn unavailable(err: &(dyn std::error::Error + 'static)) -> Status {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    Status::unavailable(message)
}

/// Runs gRPC queries against the echo service.
#[derive(Debug, Clone)]
pub struct EchoClient<C> {
    transport: C,
}

impl<C: EchoCall> EchoClient<C> {
    pub const fn new(transport: C) -> Self {
        Self { transport }
    }

    /// Executes `spec` and returns its result. Never fails; every problem is
    /// reported as [`QueryResult::Error`].
    pub async fn execute(&self, spec: &QuerySpec) -> QueryResult {
        let url = match Url::parse(&spec.url) {
            Ok(url) => url,
            Err(err) => return QueryResult::Error(format!("Invalid URL {}: {err}", spec.url)),
        };

        if url.path() != ECHO_PATH {
            return QueryResult::Error(format!("GRPC path {} is not {ECHO_PATH}", url.path()));
        }

        let origin = match origin_uri(&url) {
            Ok(origin) => origin,
            Err(reason) => return QueryResult::Error(format!("Invalid URL {}: {reason}", spec.url)),
        };

        tracing::debug!("Calling {ECHO_PATH} at {origin}");
        match self.transport.echo(origin, fixture_request()).await {
            Ok(response) => QueryResult::Headers(response_headers(response)),
            Err(status) => QueryResult::Error(format!(
                "Request failed: [{}] {}",
                status.code() as i32,
                status.message()
            )),
        }
    }
}

fn origin_uri(url: &Url) -> Result<Uri, String> {
    match url.origin() {
        origin @ Origin::Tuple(..) => origin
            .ascii_serialization()
            .parse::<Uri>()
            .map_err(|err| err.to_string()),
        Origin::Opaque(_) => Err("no network origin".to_owned()),
    }
}

fn fixture_request() -> Request<EchoRequest> {
    let mut request = Request::new(EchoRequest::default());
    let metadata = request.metadata_mut();
    for (name, value) in FIXTURE_METADATA {
        metadata.insert(name, MetadataValue::from_static(value));
    }
    request
}

/// Groups the echoed response headers by name, keeping every value.
fn response_headers(response: EchoResponse) -> ResponseHeaders {
    let mut headers = ResponseHeaders::new();
    for (name, value) in response.response.map(|r| r.headers).unwrap_or_default() {
        headers.entry(name).or_default().push(value);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use kat_client_core::{
        Headers,
        proto::{
            EchoedResponse,
            echo_service_server::{EchoService, EchoServiceServer},
        },
    };
    use std::{collections::BTreeMap, net::SocketAddr, sync::Mutex};
    use core::time::Duration;
    use tokio::{net::TcpListener, time::timeout};
    use tokio_stream::wrappers::TcpListenerStream;
    use tonic::{Code, Response, metadata::MetadataMap, transport::Server};
    use tonic_web::GrpcWebLayer;

    enum Reply {
        Headers(&'static [(&'static str, &'static str)]),
        Fail(Code, &'static str),
    }

    struct FakeEcho {
        reply: Reply,
        calls: AtomicUsize,
        seen: Mutex<Vec<(Uri, MetadataMap)>>,
    }

    impl FakeEcho {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl EchoCall for &FakeEcho {
        async fn echo(
            &self,
            origin: Uri,
            request: Request<EchoRequest>,
        ) -> Result<EchoResponse, Status> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((origin, request.metadata().clone()));
            match self.reply {
                Reply::Headers(pairs) => Ok(EchoResponse {
                    response: Some(EchoedResponse {
                        headers: pairs
                            .iter()
                            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                            .collect(),
                    }),
                    ..EchoResponse::default()
                }),
                Reply::Fail(code, message) => Err(Status::new(code, message)),
            }
        }
    }

    fn grpc_spec(url: &str) -> QuerySpec {
        let mut headers = Headers::new();
        headers.insert("content-type".to_owned(), "application/grpc".into());
        QuerySpec::new(url, headers)
    }

    fn headers(pairs: &[(&str, &str)]) -> QueryResult {
        let mut headers = ResponseHeaders::new();
        for (name, value) in pairs {
            headers
                .entry((*name).to_owned())
                .or_default()
                .push((*value).to_owned());
        }
        QueryResult::Headers(headers)
    }

    #[tokio::test]
    async fn wrong_path_fails_without_calling() {
        let fake = FakeEcho::new(Reply::Headers(&[]));
        let client = EchoClient::new(&fake);

        let result = client.execute(&grpc_spec("http://x/wrong/path")).await;
        assert_eq!(
            result,
            QueryResult::Error("GRPC path /wrong/path is not /echo.EchoService/Echo".to_owned())
        );
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unparseable_url_is_a_captured_error() {
        let fake = FakeEcho::new(Reply::Headers(&[]));
        let result = EchoClient::new(&fake).execute(&grpc_spec("not a url")).await;
        assert!(
            matches!(&result, QueryResult::Error(msg) if msg.starts_with("Invalid URL not a url")),
            "{result:?}"
        );
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn echoed_headers_become_the_result() {
        let fake = FakeEcho::new(Reply::Headers(&[("x-foo", "bar"), ("x-baz", "qux")]));
        let result = EchoClient::new(&fake)
            .execute(&grpc_spec("http://x/echo.EchoService/Echo"))
            .await;
        assert_eq!(result, headers(&[("x-baz", "qux"), ("x-foo", "bar")]));
    }

    #[tokio::test]
    async fn missing_response_yields_empty_headers() {
        let fake = FakeEcho::new(Reply::Headers(&[]));
        let result = EchoClient::new(&fake)
            .execute(&grpc_spec("http://x/echo.EchoService/Echo"))
            .await;
        assert_eq!(result, QueryResult::Headers(ResponseHeaders::new()));
    }

    #[tokio::test]
    async fn call_goes_to_the_origin_with_fixture_metadata() {
        let fake = FakeEcho::new(Reply::Headers(&[]));
        let mut spec = grpc_spec("http://gateway:8080/echo.EchoService/Echo?x=1");
        spec.headers.insert("x-original".to_owned(), "dropped".into());
        EchoClient::new(&fake).execute(&spec).await;

        let seen = fake.seen.lock().unwrap();
        let (origin, metadata) = &seen[0];
        assert_eq!(origin.scheme_str(), Some("http"));
        assert_eq!(origin.authority().map(|a| a.as_str()), Some("gateway:8080"));
        let value = |name: &str| metadata.get(name).and_then(|v| v.to_str().ok());
        assert_eq!(value("requested-status"), Some("0"));
        assert_eq!(value("x-requested-header"), Some("ok"));
        assert_eq!(value("requested-headers"), Some("x-requested-header"));
        assert!(metadata.get("x-original").is_none());
        assert!(metadata.get("content-type").is_none());
    }

    #[tokio::test]
    async fn failure_status_is_formatted_with_its_code() {
        let fake = FakeEcho::new(Reply::Fail(Code::Unavailable, "upstream connect error"));
        let result = EchoClient::new(&fake)
            .execute(&grpc_spec("http://x/echo.EchoService/Echo"))
            .await;
        assert_eq!(
            result,
            QueryResult::Error("Request failed: [14] upstream connect error".to_owned())
        );
    }

    /// Minimal echo backend: reflects the headers named in
    /// `requested-headers`, or fails with a fixed code.
    struct FixtureEcho {
        fail_with: Option<Code>,
    }

    #[tonic::async_trait]
    impl EchoService for FixtureEcho {
        async fn echo(
            &self,
            request: Request<EchoRequest>,
        ) -> Result<Response<EchoResponse>, Status> {
            if let Some(code) = self.fail_with {
                return Err(Status::new(code, "fixture failure"));
            }
            let metadata = request.metadata();
            let requested = metadata
                .get("requested-headers")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            let headers: BTreeMap<String, String> = requested
                .split(',')
                .map(str::trim)
                .filter_map(|name| {
                    let value = metadata.get(name)?.to_str().ok()?;
                    Some((name.to_owned(), value.to_owned()))
                })
                .collect();
            Ok(Response::new(EchoResponse {
                backend: "fixture".to_owned(),
                request: None,
                response: Some(EchoedResponse { headers }),
            }))
        }
    }

    async fn serve(echo: FixtureEcho) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(
            Server::builder()
                .accept_http1(true)
                .layer(GrpcWebLayer::new())
                .add_service(EchoServiceServer::new(echo))
                .serve_with_incoming(TcpListenerStream::new(listener)),
        );
        addr
    }

    #[tokio::test]
    async fn grpc_web_round_trip() {
        let addr = serve(FixtureEcho { fail_with: None }).await;
        let result = EchoClient::new(Transport::GrpcWeb)
            .execute(&grpc_spec(&format!("http://{addr}{ECHO_PATH}")))
            .await;
        assert_eq!(result, headers(&[("x-requested-header", "ok")]));
    }

    #[tokio::test]
    async fn native_grpc_round_trip() {
        let addr = serve(FixtureEcho { fail_with: None }).await;
        let result = EchoClient::new(Transport::Grpc)
            .execute(&grpc_spec(&format!("http://{addr}{ECHO_PATH}")))
            .await;
        assert_eq!(result, headers(&[("x-requested-header", "ok")]));
    }

    #[tokio::test]
    async fn non_ok_status_is_captured() {
        let addr = serve(FixtureEcho {
            fail_with: Some(Code::PermissionDenied),
        })
        .await;
        for transport in [Transport::GrpcWeb, Transport::Grpc] {
            let result = EchoClient::new(transport)
                .execute(&grpc_spec(&format!("http://{addr}{ECHO_PATH}")))
                .await;
            assert_eq!(
                result,
                QueryResult::Error("Request failed: [7] fixture failure".to_owned()),
                "{transport}"
            );
        }
    }

    #[tokio::test]
    async fn refused_connection_reports_its_cause() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        for transport in [Transport::GrpcWeb, Transport::Grpc] {
            let result = EchoClient::new(transport)
                .execute(&grpc_spec(&format!("http://{addr}{ECHO_PATH}")))
                .await;
            let QueryResult::Error(message) = &result else {
                panic!("{transport}: {result:?}");
            };
            assert!(message.starts_with("Request failed: [14] "), "{transport}: {message}");
            assert!(message.contains("tcp connect error"), "{transport}: {message}");
        }
    }

    #[tokio::test]
    async fn https_origins_are_dialed_with_tls() {
        for transport in [Transport::GrpcWeb, Transport::Grpc] {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            // Accept and hang up mid-handshake.
            let accepted = tokio::spawn(async move { listener.accept().await.is_ok() });

            let result = EchoClient::new(transport)
                .execute(&grpc_spec(&format!("https://{addr}{ECHO_PATH}")))
                .await;
            assert!(
                matches!(&result, QueryResult::Error(msg) if msg.starts_with("Request failed: [14] ")),
                "{transport}: {result:?}"
            );

            let accepted = timeout(Duration::from_secs(5), accepted).await;
            assert!(matches!(accepted, Ok(Ok(true))), "{transport}: no connection attempted");
        }
    }
}
