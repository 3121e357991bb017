//! BoringSSL TLS connector.
//!
//! Builds one `SslConnector` per client configuration from the identity
//! profile and performs handshakes over streams handed out by a [`Dialer`].
//!
//! [`Dialer`]: crate::proxy::Dialer

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use boring::ssl::{SslConnector, SslMethod, SslSessionCacheMode, SslVerifyMode};
use boring::x509::X509;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_boring::SslStream;

use crate::error::{Error, Result};
use crate::fingerprint::tls::TlsFingerprint;

/// ALPN wire list offered in every ClientHello.
const ALPN_PROTOCOLS: &[u8] = b"\x02h2\x08http/1.1";

/// Negotiated ALPN protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlpnProtocol {
    /// HTTP/2 ("h2")
    H2,
    /// HTTP/1.1 ("http/1.1")
    Http1,
    /// No ALPN negotiated or unknown protocol
    Unknown,
}

impl AlpnProtocol {
    /// Protocol selected during the handshake of `stream`.
    pub fn of(stream: &SslStream<TcpStream>) -> Self {
        match stream.ssl().selected_alpn_protocol() {
            Some(b"h2") => Self::H2,
            Some(b"http/1.1") => Self::Http1,
            _ => Self::Unknown,
        }
    }

    pub fn is_h2(&self) -> bool {
        matches!(self, Self::H2)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::H2 => "h2",
            Self::Http1 => "http/1.1",
            Self::Unknown => "none",
        }
    }
}

/// Spoofed-identity TLS client.
#[derive(Clone)]
pub struct TlsConnector {
    connector: SslConnector,
    accept_invalid_certs: bool,
}

impl TlsConnector {
    /// Build the TLS client for one client configuration.
    pub fn new(
        fingerprint: &TlsFingerprint,
        accept_invalid_certs: bool,
        root_certs: &[Vec<u8>],
    ) -> Result<Self> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(|e| Error::handshake(format!("Failed to create SSL connector: {}", e)))?;

        for cert_bytes in root_certs {
            let cert = X509::from_der(cert_bytes).or_else(|_| X509::from_pem(cert_bytes));
            match cert {
                Ok(cert) => {
                    builder.cert_store_mut().add_cert(cert).map_err(|e| {
                        Error::handshake(format!("Failed to add root certificate: {}", e))
                    })?;
                }
                Err(e) => tracing::warn!("Ignoring unparsable root certificate: {}", e),
            }
        }

        fingerprint.apply(&mut builder)?;

        if accept_invalid_certs {
            builder.set_verify(SslVerifyMode::NONE);
        }

        // Session tickets and IDs like a browser.
        builder.set_session_cache_mode(SslSessionCacheMode::CLIENT);

        builder
            .set_alpn_protos(ALPN_PROTOCOLS)
            .map_err(|e| Error::handshake(format!("Failed to set ALPN: {}", e)))?;

        Ok(Self {
            connector: builder.build(),
            accept_invalid_certs,
        })
    }

    /// Run the client handshake over `stream` with `host` as server name.
    ///
    /// The stream is dropped (closed) when the handshake fails.
    pub async fn handshake(&self, host: &str, stream: TcpStream) -> Result<SslStream<TcpStream>> {
        let mut config = self
            .connector
            .configure()
            .map_err(|e| Error::handshake(format!("Failed to configure SSL: {}", e)))?;
        if self.accept_invalid_certs {
            config.set_verify_hostname(false);
        }

        let stream = tokio_boring::connect(config, host, stream)
            .await
            .map_err(|e| Error::handshake(format!("TLS handshake with {} failed: {}", host, e)))?;

        tracing::debug!(
            "TLS handshake with {} complete, ALPN {}",
            host,
            AlpnProtocol::of(&stream).as_str()
        );
        Ok(stream)
    }
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector")
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish_non_exhaustive()
    }
}

/// Stream that can be either HTTP (plain TCP) or HTTPS (TLS).
#[derive(Debug)]
pub enum MaybeHttpsStream {
    /// Plain TCP stream for HTTP.
    Http(TcpStream),
    /// TLS-wrapped stream for HTTPS.
    Https(SslStream<TcpStream>),
}

impl AsyncRead for MaybeHttpsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_read(cx, buf),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeHttpsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_write(cx, buf),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_flush(cx),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_shutdown(cx),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
