use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use boring::ssl::SslAcceptor;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::timeout;

/// Connection and request counters of a mock server.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections: AtomicUsize,
    pub requests: AtomicUsize,
}

impl ServerStats {
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Keep-alive HTTP/1.1 mock server, plain or over TLS.
///
/// Routes:
/// - `/delay/{ms}`: sleep, then `200 delayed`
/// - `/gzip`: gzip-encoded `hello gzip`
/// - `/redirect/{n}`: `302` to `/redirect/{n-1}`, `/redirect/0` answers `200 done`
/// - `/redirect-loop`: `302` to itself
/// - `/see-other`: `303` to `/echo`
/// - `/temporary`: `307` to `/echo`
/// - `/set-cookie/{name}/{value}`: `200` with `Set-Cookie: name=value; Path=/`
/// - `/status/{code}`: empty response with that status
/// - `/echo`: method, headers in received order, then the body
/// - anything else: `200 Hello`
pub struct MockHttpServer {
    listener: TcpListener,
    port: u16,
    stats: Arc<ServerStats>,
}

impl MockHttpServer {
    pub async fn new() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            port,
            stats: Arc::new(ServerStats::default()),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn url_tls(&self) -> String {
        format!("https://127.0.0.1:{}", self.port)
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        self.stats.clone()
    }

    /// Serve plain HTTP in a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Ok((stream, _)) = self.listener.accept().await {
                self.stats.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(handle_connection(stream, self.stats.clone()));
            }
        })
    }

    /// Serve HTTPS in a background task.
    pub fn start_tls(self, acceptor: SslAcceptor) -> tokio::task::JoinHandle<()> {
        let acceptor = Arc::new(acceptor);
        tokio::spawn(async move {
            while let Ok((stream, _)) = self.listener.accept().await {
                self.stats.connections.fetch_add(1, Ordering::SeqCst);
                let acceptor = acceptor.clone();
                let stats = self.stats.clone();
                tokio::spawn(async move {
                    match tokio_boring::accept(&acceptor, stream).await {
                        Ok(tls) => handle_connection(tls, stats).await,
                        Err(e) => tracing::debug!("TLS accept failed: {}", e),
                    }
                });
            }
        })
    }
}

struct ParsedRequest {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl ParsedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Reply {
    fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    fn redirect(status: u16, location: &str) -> Self {
        Self {
            status,
            headers: vec![("Location".into(), location.into())],
            body: Vec::new(),
        }
    }
}

/// Serve requests until the peer closes, asks to close, or idles out.
async fn handle_connection<S>(mut stream: S, stats: Arc<ServerStats>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(8192);
    loop {
        let request = match read_request(&mut stream, &mut buf).await {
            Some(request) => request,
            None => return,
        };
        stats.requests.fetch_add(1, Ordering::SeqCst);

        let close = request
            .header("connection")
            .map(|value| value.eq_ignore_ascii_case("close"))
            .unwrap_or(false);
        let reply = route(&request).await;

        let mut head = format!("HTTP/1.1 {} Mock\r\n", reply.status);
        for (name, value) in &reply.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str(&format!("Content-Length: {}\r\n", reply.body.len()));
        if close {
            head.push_str("Connection: close\r\n");
        }
        head.push_str("\r\n");

        let mut out = head.into_bytes();
        out.extend_from_slice(&reply.body);
        if stream.write_all(&out).await.is_err() || stream.flush().await.is_err() {
            return;
        }
        if close {
            let _ = stream.shutdown().await;
            return;
        }
    }
}

async fn read_request<S>(stream: &mut S, buf: &mut Vec<u8>) -> Option<ParsedRequest>
where
    S: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 4096];
    let head_len = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = timeout(Duration::from_secs(10), stream.read(&mut chunk))
            .await
            .ok()?
            .ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let (method, path, headers) = {
        let mut raw_headers = [httparse::EMPTY_HEADER; 64];
        let mut parsed = httparse::Request::new(&mut raw_headers);
        parsed.parse(&buf[..head_len]).ok()?;
        let headers: Vec<(String, String)> = parsed
            .headers
            .iter()
            .map(|h| {
                (
                    h.name.to_string(),
                    String::from_utf8_lossy(h.value).into_owned(),
                )
            })
            .collect();
        (
            parsed.method?.to_string(),
            parsed.path?.to_string(),
            headers,
        )
    };

    let body_len = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_len + body_len {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = buf[head_len..head_len + body_len].to_vec();
    buf.drain(..head_len + body_len);
    Some(ParsedRequest {
        method,
        path,
        headers,
        body,
    })
}

async fn route(request: &ParsedRequest) -> Reply {
    let path = request.path.split('?').next().unwrap_or("/");
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    match segments.as_slice() {
        ["delay", ms] => {
            let ms = ms.parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Reply::ok("delayed")
        }
        ["gzip"] => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(b"hello gzip").unwrap();
            let mut reply = Reply::ok(encoder.finish().unwrap());
            reply
                .headers
                .push(("Content-Encoding".into(), "gzip".into()));
            reply
        }
        ["redirect", n] => match n.parse::<u32>().unwrap_or(0) {
            0 => Reply::ok("done"),
            n => Reply::redirect(302, &format!("/redirect/{}", n - 1)),
        },
        ["redirect-loop"] => Reply::redirect(302, "/redirect-loop"),
        ["see-other"] => Reply::redirect(303, "/echo"),
        ["temporary"] => Reply::redirect(307, "/echo"),
        ["set-cookie", name, value] => {
            let mut reply = Reply::ok("cookie set");
            reply
                .headers
                .push(("Set-Cookie".into(), format!("{}={}; Path=/", name, value)));
            reply
        }
        ["status", code] => Reply {
            status: code.parse().unwrap_or(500),
            headers: Vec::new(),
            body: Vec::new(),
        },
        ["echo"] => {
            let mut body = format!("{}\n", request.method);
            for (name, value) in &request.headers {
                body.push_str(&format!("{}: {}\n", name, value));
            }
            body.push('\n');
            let mut body = body.into_bytes();
            body.extend_from_slice(&request.body);
            Reply::ok(body)
        }
        _ => Reply::ok("Hello"),
    }
}
