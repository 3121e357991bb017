use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use boring::ssl::SslAcceptor;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use super::mock_server::ServerStats;

/// HTTP/2 mock server over TLS, built on the `h2` server.
///
/// `/delay/{ms}` sleeps before answering; every path answers `200 Hello h2`
/// with an `x-path` header echoing the request path.
pub struct MockH2Server {
    listener: TcpListener,
    port: u16,
    stats: Arc<ServerStats>,
    handshake_delay: Duration,
}

impl MockH2Server {
    pub async fn new() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            port,
            stats: Arc::new(ServerStats::default()),
            handshake_delay: Duration::ZERO,
        })
    }

    /// Hold every accepted connection this long before the TLS handshake.
    pub fn with_handshake_delay(mut self, delay: Duration) -> Self {
        self.handshake_delay = delay;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url_tls(&self) -> String {
        format!("https://127.0.0.1:{}", self.port)
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        self.stats.clone()
    }

    pub fn start_tls(self, acceptor: SslAcceptor) -> tokio::task::JoinHandle<()> {
        let acceptor = Arc::new(acceptor);
        tokio::spawn(async move {
            while let Ok((stream, _)) = self.listener.accept().await {
                self.stats.connections.fetch_add(1, Ordering::SeqCst);
                let acceptor = acceptor.clone();
                let stats = self.stats.clone();
                let delay = self.handshake_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let tls = match tokio_boring::accept(&acceptor, stream).await {
                        Ok(tls) => tls,
                        Err(e) => {
                            tracing::debug!("TLS accept failed: {}", e);
                            return;
                        }
                    };
                    let mut connection = match h2::server::handshake(tls).await {
                        Ok(connection) => connection,
                        Err(e) => {
                            tracing::debug!("h2 handshake failed: {}", e);
                            return;
                        }
                    };
                    while let Some(Ok((request, respond))) = connection.accept().await {
                        stats.requests.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(respond_to(request, respond));
                    }
                });
            }
        })
    }
}

async fn respond_to(
    request: http::Request<h2::RecvStream>,
    mut respond: h2::server::SendResponse<Bytes>,
) {
    let path = request.uri().path().to_string();
    if let Some(ms) = path.strip_prefix("/delay/") {
        let ms = ms.parse().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    let response = http::Response::builder()
        .status(200)
        .header("x-path", path)
        .body(())
        .unwrap();
    if let Ok(mut send) = respond.send_response(response, false) {
        let _ = send.send_data(Bytes::from_static(b"Hello h2"), true);
    }
}

/// Accept one TLS connection, read the client preface and its first SETTINGS
/// frame, then hang up. Resolves with `(id, value)` pairs in wire order.
pub async fn capture_settings(
    acceptor: SslAcceptor,
) -> std::io::Result<(u16, oneshot::Receiver<Vec<(u16, u32)>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut tls) = tokio_boring::accept(&acceptor, stream).await else {
            return;
        };

        let mut preface = [0u8; 24];
        if tls.read_exact(&mut preface).await.is_err()
            || &preface[..] != b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n"
        {
            return;
        }

        let mut header = [0u8; 9];
        if tls.read_exact(&mut header).await.is_err() || header[3] != 0x04 {
            return;
        }
        let length = u32::from_be_bytes([0, header[0], header[1], header[2]]) as usize;
        let mut payload = vec![0u8; length];
        if tls.read_exact(&mut payload).await.is_err() {
            return;
        }

        let settings = payload
            .chunks_exact(6)
            .map(|entry| {
                (
                    u16::from_be_bytes([entry[0], entry[1]]),
                    u32::from_be_bytes([entry[2], entry[3], entry[4], entry[5]]),
                )
            })
            .collect();
        let _ = tx.send(settings);
    });

    Ok((port, rx))
}
