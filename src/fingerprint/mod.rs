//! TLS and HTTP/2 fingerprinting configuration.

pub mod http2;
pub mod profiles;
pub mod tls;

pub use http2::{Http2Settings, SettingId};
pub use tls::TlsFingerprint;

/// HTTP/2 pseudo-header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoHeader {
    Method,
    Authority,
    Scheme,
    Path,
}

impl PseudoHeader {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Method => ":method",
            Self::Authority => ":authority",
            Self::Scheme => ":scheme",
            Self::Path => ":path",
        }
    }
}

/// Spoofed client identity applied to every connection and request of a client.
///
/// Immutable once handed to a client; swap the whole client configuration to
/// change it.
///
/// Limitation: [`TlsProfile::pseudo_header_order`] is not applied on the
/// wire. HTTP/2 requests carry pseudo-headers in the order the `h2` crate
/// encodes them (`:method :scheme :authority :path`) whatever the profile says.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsProfile {
    /// ClientHello shape.
    pub tls: TlsFingerprint,
    /// SETTINGS sent on HTTP/2 connections.
    pub http2: Http2Settings,
    /// Header value overrides, matched case-insensitively against request headers.
    pub headers: Vec<(String, String)>,
    /// Wire order for request headers; unlisted headers follow in their own order.
    pub header_order: Vec<String>,
    /// Pseudo-header order of the impersonated browser.
    ///
    /// Metadata only: not applied to HTTP/2 requests.
    pub pseudo_header_order: Vec<PseudoHeader>,
}

impl TlsProfile {
    /// Profile with the given handshake and nothing else.
    pub fn new(tls: TlsFingerprint) -> Self {
        Self {
            tls,
            ..Self::default()
        }
    }

    /// Set the HTTP/2 SETTINGS.
    pub fn with_http2(mut self, http2: Http2Settings) -> Self {
        self.http2 = http2;
        self
    }

    /// Add a header value override.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the header wire order.
    pub fn with_header_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.header_order = order.into_iter().map(Into::into).collect();
        self
    }

    /// Record the pseudo-header order. Not applied on the wire.
    pub fn with_pseudo_header_order(mut self, order: Vec<PseudoHeader>) -> Self {
        self.pseudo_header_order = order;
        self
    }

    /// Override value for `name`, if the profile has one.
    pub fn header_override(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
