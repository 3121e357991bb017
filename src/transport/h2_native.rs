//! HTTP/2 wire transport over the `h2` crate.
//!
//! One multiplexed connection per destination, configured with the profile's
//! ordered SETTINGS. A dead connection is replaced on the next request through
//! the same TLS dial routine that negotiated the destination.

use bytes::Bytes;
use h2::client::{Builder, SendRequest};
use http::header::{HeaderName, HeaderValue};
use http::Uri;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_boring::SslStream;

use crate::error::{Error, Result};
use crate::fingerprint::http2::Http2Settings;
use crate::request::Request;
use crate::transport::round_trip::Shared;
use crate::transport::Destination;

/// Chrome's total connection-level window size (~15MB).
/// Chrome sends initial 65535 + WINDOW_UPDATE of 15663105 = 15728640 total.
const CHROME_CONNECTION_WINDOW_SIZE: u32 = 15728640;

/// Headers that are meaningless (or forbidden) on an HTTP/2 stream.
const CONNECTION_HEADERS: &[&str] = &[
    "connection",
    "host",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
];

/// HTTP/2 transport bound to one destination.
pub struct H2Transport {
    destination: Destination,
    settings: Http2Settings,
    sender: Mutex<Option<SendRequest<Bytes>>>,
}

impl H2Transport {
    pub fn new(destination: Destination, settings: Http2Settings) -> Self {
        Self {
            destination,
            settings,
            sender: Mutex::new(None),
        }
    }

    pub(crate) async fn round_trip(
        &self,
        shared: &Shared,
        request: &Request,
    ) -> Result<http::Response<Bytes>> {
        let mut sender = self.ready_sender(shared).await?;
        let has_body = request.body.is_some();

        let (response_future, mut send_stream) =
            sender.send_request(build_request(request)?, !has_body)?;
        if let Some(body) = &request.body {
            send_stream.send_data(body.clone(), true)?;
        }

        let (parts, mut recv) = response_future.await?.into_parts();

        let mut body = Vec::new();
        while let Some(chunk) = recv.data().await {
            let chunk = chunk?;
            body.extend_from_slice(&chunk);
            let _ = recv.flow_control().release_capacity(chunk.len());
        }

        Ok(http::Response::from_parts(parts, Bytes::from(body)))
    }

    /// A sender with stream capacity, reconnecting if the current one is gone.
    async fn ready_sender(&self, shared: &Shared) -> Result<SendRequest<Bytes>> {
        let current = self.sender.lock().await.clone();
        if let Some(sender) = current {
            if let Ok(ready) = sender.ready().await {
                return Ok(ready);
            }
        }

        let mut slot = self.sender.lock().await;
        // Another request may have reconnected while we waited.
        if let Some(sender) = slot.clone() {
            match sender.ready().await {
                Ok(ready) => return Ok(ready),
                Err(e) => {
                    tracing::debug!(
                        "HTTP/2 connection to {} unusable, reconnecting: {}",
                        self.destination,
                        e
                    );
                }
            }
        }

        let stream = shared.connect_tls(&self.destination).await?;
        let sender = self.handshake(stream).await?;
        *slot = Some(sender.clone());
        drop(slot);

        Ok(sender.ready().await?)
    }

    async fn handshake(&self, stream: SslStream<TcpStream>) -> Result<SendRequest<Bytes>> {
        let mut builder = Builder::new();
        self.settings.apply(&mut builder);
        builder.initial_connection_window_size(CHROME_CONNECTION_WINDOW_SIZE);

        let (sender, connection) = builder
            .handshake(stream)
            .await
            .map_err(|e| Error::http_protocol(format!("HTTP/2 handshake failed: {}", e)))?;

        let destination = self.destination.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!("HTTP/2 connection to {} closed: {}", destination, e);
            }
        });

        tracing::debug!("HTTP/2 connection to {} established", self.destination);
        Ok(sender)
    }
}

/// Translate a request into the `http` form `h2` sends.
fn build_request(request: &Request) -> Result<http::Request<()>> {
    let url = &request.url;
    let authority = match &request.host {
        Some(host) => host.clone(),
        None => url[url::Position::BeforeHost..url::Position::BeforePath].to_string(),
    };
    let path = &url[url::Position::BeforePath..url::Position::AfterQuery];
    let uri = Uri::builder()
        .scheme(url.scheme())
        .authority(authority.as_str())
        .path_and_query(if path.is_empty() { "/" } else { path })
        .build()
        .map_err(|e| Error::http_protocol(format!("Invalid request URI {}: {}", url, e)))?;

    let mut builder = http::Request::builder()
        .method(request.method.clone())
        .uri(uri)
        .version(http::Version::HTTP_2);

    for (name, value) in &request.headers {
        if name.starts_with(':') || is_connection_header(name) {
            continue;
        }
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidHeader(format!("{}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::InvalidHeader(format!("{}: {}", name, e)))?;
        builder = builder.header(name, value);
    }

    builder
        .body(())
        .map_err(|e| Error::http_protocol(format!("Failed to build HTTP/2 request: {}", e)))
}

fn is_connection_header(name: &str) -> bool {
    CONNECTION_HEADERS
        .iter()
        .any(|header| header.eq_ignore_ascii_case(name))
}
