use clap::{Parser, ValueEnum};
use core::num::NonZeroUsize;
use std::{ffi::OsString, fmt, path::PathBuf};

/// Number of queries allowed in flight when no valid limit is configured.
pub const DEFAULT_QUERY_LIMIT: NonZeroUsize = NonZeroUsize::new(25).unwrap();

/// Environment variable holding the concurrency limit.
pub const QUERY_LIMIT_VAR: &str = "KAT_QUERY_LIMIT";

/// Long options that older callers pass with a single dash (`-input`).
const SINGLE_DASH_LONG_ARGS: [&str; 2] = ["-input", "-output"];

/// Command line and environment settings for the `kat-client` binary.
///
/// The input is a JSON array of query specs; the output is the same array
/// with a `result` attached to every entry.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "kat-client",
    version,
    about = "Runs a batch of protocol conformance queries and records the results"
)]
pub struct CliArgs {
    /// Batch file to read.
    #[arg(long, default_value = "/dev/stdin")]
    pub input: PathBuf,

    /// Where to write the annotated batch. `/dev/stdout` and `-` write to
    /// standard output.
    #[arg(long, default_value = "/dev/stdout")]
    pub output: PathBuf,

    /// Maximum number of queries executing at once.
    ///
    /// Anything other than a positive integer is ignored with a warning and
    /// the default of 25 is used instead.
    ///
    /// Environment variable: `KAT_QUERY_LIMIT`
    #[arg(long, env = "KAT_QUERY_LIMIT")]
    pub query_limit: Option<String>,

    /// Wire protocol used for gRPC queries.
    ///
    /// Environment variable: `KAT_GRPC_TRANSPORT`
    #[arg(long, env = "KAT_GRPC_TRANSPORT", value_enum, default_value_t = Transport::GrpcWeb)]
    pub transport: Transport,
}

impl CliArgs {
    /// Parses the process arguments after rewriting single-dash long options.
    pub fn parse_normalized() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }
}

/// How gRPC queries reach the echo service.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// gRPC-Web over HTTP/1.1, as a browser would send it.
    GrpcWeb,
    /// Native gRPC over HTTP/2.
    Grpc,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::GrpcWeb => write!(f, "grpc-web"),
            Transport::Grpc => write!(f, "grpc"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub query_limit: NonZeroUsize,
    pub transport: Transport,
}

impl TryFrom<CliArgs> for RunnerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        Ok(Self {
            query_limit: parse_query_limit(args.query_limit.as_deref()),
            input: args.input,
            output: args.output,
            transport: args.transport,
        })
    }
}

/// Resolves the configured query limit, falling back to
/// [`DEFAULT_QUERY_LIMIT`] when the value is missing or not a positive
/// integer.
pub fn parse_query_limit(raw: Option<&str>) -> NonZeroUsize {
    let Some(raw) = raw else {
        return DEFAULT_QUERY_LIMIT;
    };
    match raw.trim().parse::<NonZeroUsize>() {
        Ok(limit) => limit,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {QUERY_LIMIT_VAR} value {raw:?} ({err}); using default query limit {DEFAULT_QUERY_LIMIT}"
            );
            DEFAULT_QUERY_LIMIT
        }
    }
}

/// Rewrites `-input`/`-output` (and their `=value` forms) to `--input` and
/// `--output`. Every other argument passes through as-is.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some(text)
                if SINGLE_DASH_LONG_ARGS
                    .iter()
                    .any(|long| text == *long || text.starts_with(&format!("{long}="))) =>
            {
                OsString::from(format!("-{text}"))
            }
            _ => arg,
        })
        .collect()
}
