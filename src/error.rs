//! Error types for mimic crate.

use std::fmt;
use std::io;
use std::time::Duration;

use crate::response::Response;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by user-supplied hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while building clients and executing requests.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Opening the transport-level connection failed (direct or via proxy).
    #[error("Dial error: {0}")]
    Dial(String),

    /// TLS handshake failed or the TLS client could not be configured.
    #[error("TLS handshake error: {0}")]
    Handshake(String),

    /// Protocol negotiation ended in a state the transport cache cannot use.
    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// URL scheme other than http/https.
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Proxy string is neither `host:port` nor `host:port:user:pass`.
    #[error("Proxy format corrupted, cannot parse: {0}")]
    ProxyFormat(String),

    /// Proxy refused or broke the tunnel.
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// The per-call deadline elapsed before the network attempt finished.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// A request-stage hook failed; nothing was sent.
    #[error("Request middleware failed: {0}")]
    RequestMiddleware(#[source] BoxError),

    /// A response-stage hook failed after a successful round trip.
    ///
    /// The partially processed response is kept so callers can inspect it.
    #[error("Response middleware failed: {source}")]
    ResponseMiddleware {
        response: Box<Response>,
        #[source]
        source: BoxError,
    },

    /// The status validation hook rejected the final response.
    #[error("Status {status} rejected: {source}")]
    StatusRejected {
        status: u16,
        response: Box<Response>,
        #[source]
        source: BoxError,
    },

    /// Body decompression failed.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Every counted attempt of the retry policy failed.
    #[error("Retry limit exceeded after {attempts} attempts")]
    RetryExhausted { attempts: usize },

    /// Redirect limit exceeded.
    #[error("Redirect limit exceeded ({count} redirects)")]
    RedirectLimit { count: u32 },

    /// HTTP/1.1 framing or request construction error.
    #[error("HTTP protocol error: {0}")]
    HttpProtocol(String),

    /// HTTP/2 error from the frame layer.
    #[error("HTTP/2 error: {0}")]
    Http2(#[from] h2::Error),

    /// Invalid header name or value.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Fieldless classification of [`Error`], used by retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Dial,
    Handshake,
    ProtocolMismatch,
    UnsupportedScheme,
    ProxyFormat,
    Proxy,
    Timeout,
    RequestMiddleware,
    ResponseMiddleware,
    StatusRejected,
    Decode,
    RetryExhausted,
    RedirectLimit,
    HttpProtocol,
    Http2,
    InvalidHeader,
    Url,
    Json,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Dial(_) => ErrorKind::Dial,
            Self::Handshake(_) => ErrorKind::Handshake,
            Self::ProtocolMismatch(_) => ErrorKind::ProtocolMismatch,
            Self::UnsupportedScheme(_) => ErrorKind::UnsupportedScheme,
            Self::ProxyFormat(_) => ErrorKind::ProxyFormat,
            Self::Proxy(_) => ErrorKind::Proxy,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::RequestMiddleware(_) => ErrorKind::RequestMiddleware,
            Self::ResponseMiddleware { .. } => ErrorKind::ResponseMiddleware,
            Self::StatusRejected { .. } => ErrorKind::StatusRejected,
            Self::Decode(_) => ErrorKind::Decode,
            Self::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            Self::RedirectLimit { .. } => ErrorKind::RedirectLimit,
            Self::HttpProtocol(_) => ErrorKind::HttpProtocol,
            Self::Http2(_) => ErrorKind::Http2,
            Self::InvalidHeader(_) => ErrorKind::InvalidHeader,
            Self::Url(_) => ErrorKind::Url,
            Self::Json(_) => ErrorKind::Json,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Response carried alongside the error, if any.
    ///
    /// Only response-stage failures carry one; request-stage and network
    /// failures never do.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::ResponseMiddleware { response, .. } | Self::StatusRejected { response, .. } => {
                Some(response)
            }
            _ => None,
        }
    }

    /// Take the carried response out of the error.
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::ResponseMiddleware { response, .. } | Self::StatusRejected { response, .. } => {
                Some(*response)
            }
            _ => None,
        }
    }

    /// Whether this is the per-call deadline firing.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Create a dial error.
    pub fn dial(message: impl Into<String>) -> Self {
        Self::Dial(message.into())
    }

    /// Create a TLS handshake error.
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake(message.into())
    }

    /// Create a proxy error.
    pub fn proxy(message: impl Into<String>) -> Self {
        Self::Proxy(message.into())
    }

    /// Create an HTTP protocol error.
    pub fn http_protocol(message: impl Into<String>) -> Self {
        Self::HttpProtocol(message.into())
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Create an IO error with custom message.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(io::Error::other(message.into()))
    }
}
