//! HTTP transport implementations.
//!
//! - TLS handshake dialer with ALPN detection via tokio-boring
//! - HTTP/1.1 over raw I/O, HTTP/2 via the h2 crate
//! - Per-destination transport cache

pub mod connector;
pub mod h1;
pub mod h2_native;
pub mod round_trip;

use std::fmt;

use url::{Host, Url};

use crate::error::{Error, Result};

/// URL scheme accepted by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

/// Where a request goes: one transport-cache slot per distinct [`Destination::key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Destination {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Resolve a request URL; a missing port defaults to the scheme's port.
    pub fn from_url(url: &Url) -> Result<Self> {
        let scheme = match url.scheme().to_ascii_lowercase().as_str() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(Error::UnsupportedScheme(other.to_string())),
        };
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_ascii_lowercase(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(Error::http_protocol(format!("URL has no host: {}", url))),
        };
        let port = url.port().unwrap_or(scheme.default_port());
        Ok(Self::new(scheme, host, port))
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Bare host, used as the TLS server name.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_tls(&self) -> bool {
        self.scheme == Scheme::Https
    }

    /// Canonical `host:port` (IPv6 hosts bracketed).
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Transport cache key: `scheme://host:port`.
    pub fn key(&self) -> String {
        format!("{}://{}", self.scheme.as_str(), self.authority())
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}
