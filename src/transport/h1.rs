//! HTTP/1.1 wire transport.
//!
//! Uses httparse for response parsing and raw I/O so request headers go out
//! exactly in the order the request carries them. Each transport keeps its
//! own small idle pool of keep-alive connections for one destination.

use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode, Version};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::request::Request;
use crate::transport::connector::MaybeHttpsStream;
use crate::transport::round_trip::Shared;
use crate::transport::Destination;

/// Maximum response header size (64KB).
const MAX_HEADERS_SIZE: usize = 64 * 1024;

/// Maximum number of headers to parse.
const MAX_HEADERS_COUNT: usize = 100;

/// Idle keep-alive connections kept per destination.
const MAX_IDLE_PER_HOST: usize = 6;

/// HTTP/1.1 transport bound to one destination.
pub struct H1Transport {
    destination: Destination,
    idle: Mutex<Vec<H1Connection>>,
}

impl H1Transport {
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Idle connections currently pooled.
    pub fn idle_connections(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub(crate) async fn round_trip(
        &self,
        shared: &Shared,
        request: &Request,
    ) -> Result<http::Response<Bytes>> {
        let target = request_target(request);
        let host = request.host_header();

        if let Some(mut conn) = self.checkout() {
            match conn
                .send_request(&request.method, &target, &host, &request.headers, request.body.as_ref())
                .await
            {
                Ok(response) => {
                    self.checkin(conn);
                    return Ok(response);
                }
                Err(e) => {
                    tracing::debug!(
                        "Reused HTTP/1.1 connection to {} failed, dialing fresh: {}",
                        self.destination,
                        e
                    );
                }
            }
        }

        let stream = if self.destination.is_tls() {
            MaybeHttpsStream::Https(shared.connect_tls(&self.destination).await?)
        } else {
            MaybeHttpsStream::Http(shared.dialer().dial(&self.destination).await?)
        };

        let mut conn = H1Connection::new(stream);
        let response = conn
            .send_request(&request.method, &target, &host, &request.headers, request.body.as_ref())
            .await?;
        self.checkin(conn);
        Ok(response)
    }

    fn checkout(&self) -> Option<H1Connection> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop()
    }

    fn checkin(&self, conn: H1Connection) {
        if conn.should_close() {
            return;
        }
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < MAX_IDLE_PER_HOST {
            idle.push(conn);
        }
    }
}

/// Origin-form request target (`/path?query`).
fn request_target(request: &Request) -> String {
    let target = &request.url[url::Position::BeforePath..url::Position::AfterQuery];
    if target.is_empty() {
        "/".to_string()
    } else {
        target.to_string()
    }
}

/// One HTTP/1.1 connection.
pub struct H1Connection {
    stream: MaybeHttpsStream,
    /// Whether the connection should be closed after the current response.
    should_close: bool,
}

impl H1Connection {
    pub fn new(stream: MaybeHttpsStream) -> Self {
        Self {
            stream,
            should_close: false,
        }
    }

    /// Check if the connection should be closed (not reusable).
    pub fn should_close(&self) -> bool {
        self.should_close
    }

    /// Send one request and read its response.
    pub async fn send_request(
        &mut self,
        method: &Method,
        target: &str,
        host: &str,
        headers: &[(String, String)],
        body: Option<&Bytes>,
    ) -> Result<http::Response<Bytes>> {
        let head = build_request_head(method, target, host, headers, body)?;
        self.stream
            .write_all(&head)
            .await
            .map_err(|e| Error::http_protocol(format!("Failed to write request: {}", e)))?;

        if let Some(body) = body {
            self.stream
                .write_all(body)
                .await
                .map_err(|e| Error::http_protocol(format!("Failed to write body: {}", e)))?;
        }

        self.stream
            .flush()
            .await
            .map_err(|e| Error::http_protocol(format!("Failed to flush: {}", e)))?;

        self.read_response(method).await
    }

    /// Read responses until a final (non-1xx) one arrives.
    async fn read_response(&mut self, method: &Method) -> Result<http::Response<Bytes>> {
        // Bytes after a 1xx response may already hold the start of the next one.
        let mut buffer = Vec::with_capacity(8192);

        loop {
            while find_header_end(&buffer).is_none() {
                if buffer.len() >= MAX_HEADERS_SIZE {
                    return Err(Error::http_protocol("Response headers too large"));
                }
                let mut read_buf = [0u8; 8192];
                let n = self
                    .stream
                    .read(&mut read_buf)
                    .await
                    .map_err(|e| Error::http_protocol(format!("Failed to read response: {}", e)))?;
                if n == 0 {
                    return Err(Error::http_protocol(
                        "Connection closed before response complete",
                    ));
                }
                buffer.extend_from_slice(&read_buf[..n]);
            }

            let (response, consumed) = self.parse_response(&buffer, method).await?;
            buffer.drain(..consumed.min(buffer.len()));

            if response.status().is_informational() {
                continue;
            }
            return Ok(response);
        }
    }

    /// Parse head and body, returning the response and the bytes of `buffer` used.
    async fn parse_response(
        &mut self,
        buffer: &[u8],
        request_method: &Method,
    ) -> Result<(http::Response<Bytes>, usize)> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
        let mut parsed = httparse::Response::new(&mut headers);

        let headers_len = match parsed
            .parse(buffer)
            .map_err(|e| Error::http_protocol(format!("Failed to parse response: {}", e)))?
        {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => {
                return Err(Error::http_protocol("Incomplete response headers"));
            }
        };

        let code = parsed
            .code
            .ok_or_else(|| Error::http_protocol("Missing status code"))?;
        let status = StatusCode::from_u16(code)
            .map_err(|_| Error::http_protocol(format!("Invalid status code {}", code)))?;
        let version = match parsed.version {
            Some(0) => Version::HTTP_10,
            _ => Version::HTTP_11,
        };

        let mut header_map = HeaderMap::with_capacity(parsed.headers.len());
        for header in parsed.headers.iter().filter(|h| !h.name.is_empty()) {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|e| Error::InvalidHeader(format!("{}: {}", header.name, e)))?;
            let value = HeaderValue::from_bytes(header.value)
                .map_err(|e| Error::InvalidHeader(format!("{}: {}", header.name, e)))?;
            header_map.append(name, value);
        }

        let connection = header_value(&header_map, "connection").map(str::to_ascii_lowercase);
        match (&connection, version) {
            (Some(conn), _) if conn.contains("close") => self.should_close = true,
            (Some(conn), Version::HTTP_10) if conn.contains("keep-alive") => {}
            (_, Version::HTTP_10) => self.should_close = true,
            _ => {}
        }

        let mut response = http::Response::new(Bytes::new());
        *response.status_mut() = status;
        *response.version_mut() = version;

        // HEAD, 1xx, 204 and 304 never carry a body.
        let has_body = !matches!(code, 100..=199 | 204 | 304) && *request_method != Method::HEAD;
        if !has_body {
            *response.headers_mut() = header_map;
            return Ok((response, headers_len));
        }

        let transfer_encoding = header_value(&header_map, "transfer-encoding");
        let is_chunked = transfer_encoding
            .and_then(|v| v.split(',').next_back())
            .map(|last| last.trim().eq_ignore_ascii_case("chunked"))
            .unwrap_or(false);

        // Transfer-Encoding overrides Content-Length.
        let content_length = match (transfer_encoding, header_value(&header_map, "content-length")) {
            (None, Some(cl)) => Some(parse_content_length(cl)?),
            _ => None,
        };
        let close_delimited = !is_chunked && content_length.is_none();

        let body_start = &buffer[headers_len..];
        let (body, consumed) = if is_chunked {
            (self.read_chunked_body(body_start.to_vec()).await?, buffer.len())
        } else if let Some(len) = content_length {
            let body = self.read_fixed_body(body_start, len).await?;
            (body, headers_len + body_start.len().min(len))
        } else {
            self.should_close = true;
            (self.read_until_close(body_start).await?, buffer.len())
        };

        if close_delimited {
            tracing::trace!("Close-delimited HTTP/1.1 body of {} bytes", body.len());
        }

        *response.headers_mut() = header_map;
        *response.body_mut() = body;
        Ok((response, consumed))
    }

    async fn read_until_close(&mut self, initial: &[u8]) -> Result<Bytes> {
        let mut body = initial.to_vec();
        let mut read_buf = [0u8; 8192];
        loop {
            let n = self.stream.read(&mut read_buf).await.map_err(|e| {
                Error::http_protocol(format!("Failed to read body (close-delimited): {}", e))
            })?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&read_buf[..n]);
        }
        Ok(Bytes::from(body))
    }

    async fn read_fixed_body(&mut self, initial: &[u8], content_length: usize) -> Result<Bytes> {
        let initial_len = initial.len().min(content_length);
        let mut body = Vec::with_capacity(content_length);
        body.extend_from_slice(&initial[..initial_len]);

        let mut chunk = [0u8; 8192];
        while body.len() < content_length {
            let remaining = (content_length - body.len()).min(chunk.len());
            let n = self
                .stream
                .read(&mut chunk[..remaining])
                .await
                .map_err(|e| Error::http_protocol(format!("Failed to read body: {}", e)))?;
            if n == 0 {
                return Err(Error::http_protocol(format!(
                    "Connection closed before receiving full body (got {} of {} bytes)",
                    body.len(),
                    content_length
                )));
            }
            body.extend_from_slice(&chunk[..n]);
        }

        Ok(Bytes::from(body))
    }

    /// chunked-body = *chunk last-chunk trailer-section CRLF
    async fn read_chunked_body(&mut self, initial: Vec<u8>) -> Result<Bytes> {
        let mut body = Vec::new();
        let mut buffer = initial;
        let mut read_buf = [0u8; 8192];

        loop {
            let (chunk_size, line_end) = loop {
                if let Some(found) = find_chunk_size(&buffer) {
                    break found;
                }
                let n = self.stream.read(&mut read_buf).await.map_err(|e| {
                    Error::http_protocol(format!("Failed to read chunk size: {}", e))
                })?;
                if n == 0 {
                    return Err(Error::http_protocol(
                        "Connection closed while reading chunk size",
                    ));
                }
                buffer.extend_from_slice(&read_buf[..n]);
            };
            buffer.drain(..line_end);

            if chunk_size == 0 {
                self.consume_trailers(&mut buffer).await?;
                break;
            }

            let chunk_end = chunk_size + 2;
            while buffer.len() < chunk_end {
                let n = self.stream.read(&mut read_buf).await.map_err(|e| {
                    Error::http_protocol(format!("Failed to read chunk data: {}", e))
                })?;
                if n == 0 {
                    return Err(Error::http_protocol(
                        "Connection closed while reading chunk data",
                    ));
                }
                buffer.extend_from_slice(&read_buf[..n]);
            }

            body.extend_from_slice(&buffer[..chunk_size]);
            buffer.drain(..chunk_end);
        }

        Ok(Bytes::from(body))
    }

    /// Skip trailer fields up to the terminating empty line.
    async fn consume_trailers(&mut self, buffer: &mut Vec<u8>) -> Result<()> {
        let mut read_buf = [0u8; 4096];
        loop {
            if let Some(pos) = find_crlf(buffer) {
                buffer.drain(..pos + 2);
                if pos == 0 {
                    return Ok(());
                }
                continue;
            }

            let n = self
                .stream
                .read(&mut read_buf)
                .await
                .map_err(|e| Error::http_protocol(format!("Failed to read trailers: {}", e)))?;
            if n == 0 {
                return Ok(());
            }
            buffer.extend_from_slice(&read_buf[..n]);
        }
    }
}

/// Serialize the request line and headers, keeping caller header order.
fn build_request_head(
    method: &Method,
    target: &str,
    host: &str,
    headers: &[(String, String)],
    body: Option<&Bytes>,
) -> Result<Vec<u8>> {
    for (name, value) in headers {
        validate_header_name(name)?;
        validate_header_value(value)?;
    }
    validate_header_value(host)?;

    let mut head = Vec::with_capacity(1024);
    head.extend_from_slice(method.as_str().as_bytes());
    head.push(b' ');
    head.extend_from_slice(target.as_bytes());
    head.extend_from_slice(b" HTTP/1.1\r\nHost: ");
    head.extend_from_slice(host.as_bytes());
    head.extend_from_slice(b"\r\n");

    let has = |wanted: &str| headers.iter().any(|(name, _)| name.eq_ignore_ascii_case(wanted));

    for (name, value) in headers {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        head.extend_from_slice(name.as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }

    if !has("connection") {
        head.extend_from_slice(b"Connection: keep-alive\r\n");
    }

    // No Content-Length alongside Transfer-Encoding.
    if let Some(body) = body {
        if !has("transfer-encoding") && !has("content-length") {
            head.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        }
    }

    head.extend_from_slice(b"\r\n");
    Ok(head)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Find the end of HTTP headers (\r\n\r\n).
fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|i| i + 4)
}

/// Parse a chunk size line, returning (size, end_of_line_position).
fn find_chunk_size(buffer: &[u8]) -> Option<(usize, usize)> {
    let line_end = find_crlf(buffer)?;
    let line = std::str::from_utf8(&buffer[..line_end]).ok()?;
    let size_part = line.split(';').next()?;
    let size = usize::from_str_radix(size_part.trim(), 16).ok()?;
    Some((size, line_end + 2))
}

fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|window| window == b"\r\n")
}

/// Header names must be RFC 9110 tokens.
fn validate_header_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.bytes().all(is_tchar) {
        return Err(Error::InvalidHeader(format!("Invalid header name: {:?}", name)));
    }
    Ok(())
}

fn is_tchar(b: u8) -> bool {
    matches!(b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'^' | b'_' | b'`' | b'|' | b'~' | b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z'
    )
}

/// Header values must not contain NUL, CR, or LF.
fn validate_header_value(value: &str) -> Result<()> {
    if value.bytes().any(|b| b == 0 || b == b'\r' || b == b'\n') {
        return Err(Error::InvalidHeader(
            "Invalid character in header value (CR/LF/NUL not allowed)".into(),
        ));
    }
    Ok(())
}

/// Multiple comma-separated values must all be identical.
fn parse_content_length(value: &str) -> Result<usize> {
    let mut lengths = value.split(',').map(|part| {
        part.trim()
            .parse::<usize>()
            .map_err(|_| Error::http_protocol(format!("Invalid Content-Length: {}", value)))
    });

    let first = lengths
        .next()
        .ok_or_else(|| Error::http_protocol("Empty Content-Length"))??;
    for length in lengths {
        if length? != first {
            return Err(Error::http_protocol(format!(
                "Conflicting Content-Length values: {}",
                value
            )));
        }
    }
    Ok(first)
}
