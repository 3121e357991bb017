//! # Mimic
//!
//! HTTP client that impersonates a browser on the wire.
//!
//! Every connection carries a spoofed TLS ClientHello (BoringSSL) and, when
//! HTTP/2 is negotiated, the browser's SETTINGS. Requests go out over
//! HTTP/1.1 or HTTP/2 depending on what the server picks through ALPN, with
//! one cached transport per destination, optional HTTP CONNECT or SOCKS5
//! proxies, middleware hooks, retries and a cookie store.

pub mod client;
pub mod cookie;
pub mod decode;
pub mod error;
pub mod fingerprint;
pub mod middleware;
pub mod proxy;
pub mod request;
pub mod response;
pub mod retry;
pub mod transport;

pub use client::{Client, ClientBuilder, Config, DEFAULT_TIMEOUT, MAX_REDIRECTS};
pub use cookie::{Cookie, CookieJar, CookieStore};
pub use error::{BoxError, Error, ErrorKind, Result};
pub use fingerprint::{Http2Settings, PseudoHeader, SettingId, TlsFingerprint, TlsProfile};
pub use proxy::{ProxyDescriptor, ProxyScheme};
pub use request::{Request, RequestBuilder};
pub use response::Response;
pub use retry::RetryPolicy;
pub use transport::round_trip::TransportStats;

pub use http::{Method, StatusCode};
pub use url::Url;
