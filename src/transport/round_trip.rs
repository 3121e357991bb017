//! Per-client protocol transport cache.
//!
//! The first request to a destination dials, performs the spoofed TLS
//! handshake, reads the negotiated ALPN and builds the matching wire
//! transport. The just-handshaked connection is parked in a pending stash so
//! the new transport's first dial consumes it instead of handshaking again.
//!
//! The cache is only populated after negotiation finishes, so concurrent
//! first requests to the same destination may each handshake. The first
//! transport stored wins; the other connections are closed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio_boring::SslStream;

use crate::error::{Error, Result};
use crate::fingerprint::http2::Http2Settings;
use crate::proxy::Dialer;
use crate::request::Request;
use crate::transport::connector::{AlpnProtocol, TlsConnector};
use crate::transport::h1::H1Transport;
use crate::transport::h2_native::H2Transport;
use crate::transport::{Destination, Scheme};

/// Wire transport cached for one destination.
pub enum CachedTransport {
    Http1(H1Transport),
    Http2(H2Transport),
}

impl CachedTransport {
    pub fn is_h2(&self) -> bool {
        matches!(self, Self::Http2(_))
    }

    async fn round_trip(&self, shared: &Shared, request: &Request) -> Result<http::Response<Bytes>> {
        match self {
            Self::Http1(transport) => transport.round_trip(shared, request).await,
            Self::Http2(transport) => transport.round_trip(shared, request).await,
        }
    }
}

/// Snapshot of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Destinations with a cached transport.
    pub cached_destinations: usize,
    /// Handshaked connections waiting for their transport's first dial.
    pub pending_connections: usize,
    /// TLS handshakes completed since the cache was created.
    pub tls_handshakes: usize,
    /// Handshakes that built a new transport.
    pub negotiations: usize,
}

/// Outcome of the TLS dial routine.
enum Dialed {
    /// A connection for an already cached transport.
    Stream(SslStream<TcpStream>),
    /// A transport was built and the connection stashed for it.
    Negotiated,
}

#[derive(Default)]
struct CacheState {
    transports: HashMap<String, Arc<CachedTransport>>,
    pending: HashMap<String, SslStream<TcpStream>>,
}

/// State shared by the round tripper and the transports it builds.
pub struct Shared {
    dialer: Dialer,
    tls: TlsConnector,
    http2: Http2Settings,
    state: Mutex<CacheState>,
    tls_handshakes: AtomicUsize,
    negotiations: AtomicUsize,
}

impl Shared {
    pub(crate) fn dialer(&self) -> &Dialer {
        &self.dialer
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, key: &str) -> Option<Arc<CachedTransport>> {
        self.state().transports.get(key).cloned()
    }

    /// Dial callback of the cached transports: a stashed connection if there
    /// is one, otherwise a fresh dial and handshake.
    pub(crate) async fn connect_tls(&self, dest: &Destination) -> Result<SslStream<TcpStream>> {
        match self.dial_tls(dest).await? {
            Dialed::Stream(stream) => Ok(stream),
            Dialed::Negotiated => self.state().pending.remove(&dest.key()).ok_or_else(|| {
                Error::ProtocolMismatch(format!("no connection stashed for {}", dest))
            }),
        }
    }

    async fn dial_tls(&self, dest: &Destination) -> Result<Dialed> {
        let key = dest.key();

        let stashed = self.state().pending.remove(&key);
        if let Some(stream) = stashed {
            tracing::trace!("Using stashed connection for {}", key);
            return Ok(Dialed::Stream(stream));
        }

        // Dial and handshake outside the lock.
        let raw = self.dialer.dial(dest).await?;
        let stream = self.tls.handshake(dest.host(), raw).await?;
        self.tls_handshakes.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state();
        if state.transports.contains_key(&key) {
            return Ok(Dialed::Stream(stream));
        }

        let alpn = AlpnProtocol::of(&stream);
        let transport = if alpn.is_h2() {
            CachedTransport::Http2(H2Transport::new(dest.clone(), self.http2.clone()))
        } else {
            // No ALPN or http/1.1: assume HTTP/1.x over TLS.
            CachedTransport::Http1(H1Transport::new(dest.clone()))
        };
        tracing::debug!("Negotiated {} for {}", alpn.as_str(), key);

        state.transports.insert(key.clone(), Arc::new(transport));
        state.pending.insert(key, stream);
        self.negotiations.fetch_add(1, Ordering::SeqCst);

        Ok(Dialed::Negotiated)
    }

    /// Build the transport for a destination on a cache miss.
    async fn negotiate(&self, dest: &Destination) -> Result<()> {
        if dest.scheme() == Scheme::Http {
            self.state()
                .transports
                .entry(dest.key())
                .or_insert_with(|| Arc::new(CachedTransport::Http1(H1Transport::new(dest.clone()))));
            return Ok(());
        }

        match self.dial_tls(dest).await? {
            Dialed::Negotiated => Ok(()),
            Dialed::Stream(stream) => {
                // Lost the race to another first request.
                tracing::debug!("Closing redundant handshake to {}", dest);
                drop(stream);
                Ok(())
            }
        }
    }
}

/// Round-trip entry point of one client configuration.
///
/// Cloning shares the cache; a rebind builds a new one.
#[derive(Clone)]
pub struct RoundTripper {
    inner: Arc<Shared>,
}

impl RoundTripper {
    pub fn new(dialer: Dialer, tls: TlsConnector, http2: Http2Settings) -> Self {
        Self {
            inner: Arc::new(Shared {
                dialer,
                tls,
                http2,
                state: Mutex::new(CacheState::default()),
                tls_handshakes: AtomicUsize::new(0),
                negotiations: AtomicUsize::new(0),
            }),
        }
    }

    /// Send one request through the destination's cached transport,
    /// negotiating the transport first if there is none.
    pub async fn round_trip(&self, request: &Request) -> Result<http::Response<Bytes>> {
        let dest = Destination::from_url(&request.url)?;
        let key = dest.key();

        let transport = match self.inner.lookup(&key) {
            Some(transport) => transport,
            None => {
                tracing::debug!("No transport cached for {}, negotiating", key);
                self.inner.negotiate(&dest).await?;
                self.inner.lookup(&key).ok_or_else(|| {
                    Error::ProtocolMismatch(format!("negotiation left no transport for {}", key))
                })?
            }
        };

        transport.round_trip(&self.inner, request).await
    }

    /// Whether the cached transport for `dest` speaks HTTP/2.
    pub fn is_h2(&self, dest: &Destination) -> Option<bool> {
        self.inner.lookup(&dest.key()).map(|transport| transport.is_h2())
    }

    pub fn stats(&self) -> TransportStats {
        let state = self.inner.state();
        TransportStats {
            cached_destinations: state.transports.len(),
            pending_connections: state.pending.len(),
            tls_handshakes: self.inner.tls_handshakes.load(Ordering::SeqCst),
            negotiations: self.inner.negotiations.load(Ordering::SeqCst),
        }
    }
}

impl std::fmt::Debug for RoundTripper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundTripper")
            .field("dialer", &self.inner.dialer)
            .field("stats", &self.stats())
            .finish()
    }
}
