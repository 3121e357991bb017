//! HTTP response returned by the client.

use bytes::Bytes;
use http::header::HeaderMap;
use http::{StatusCode, Version};
use url::Url;

use crate::error::{BoxError, Error, Result};

/// Final response of a call: decoded body plus the underlying wire response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Wire response; its body is the raw, still-encoded bytes.
    inner: http::Response<Bytes>,
    body: Bytes,
    url: Url,
}

impl Response {
    pub(crate) fn new(inner: http::Response<Bytes>, body: Bytes, url: Url) -> Self {
        Self { inner, body, url }
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// Status line text, e.g. `200 OK`.
    pub fn status_text(&self) -> String {
        let status = self.status();
        match status.canonical_reason() {
            Some(reason) => format!("{} {}", status.as_u16(), reason),
            None => status.as_u16().to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }

    pub fn is_redirect(&self) -> bool {
        self.status().is_redirection()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// First value of `name`, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|value| value.to_str().ok())
    }

    /// Decoded body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Replace the decoded body (for response middleware).
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Body exactly as received, before Content-Encoding decoding.
    pub fn raw_body(&self) -> &Bytes {
        self.inner.body()
    }

    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| Error::decode(format!("UTF-8 decode error: {}", e)))
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(Error::from)
    }

    /// URL the response was served from, after redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn http_version(&self) -> Version {
        self.inner.version()
    }

    /// Error describing an unexpected status, for logging or validators.
    pub fn status_error(&self) -> BoxError {
        format!(
            "server responded with unexpected status code: {}",
            self.status().as_u16()
        )
        .into()
    }

    /// Underlying wire response.
    pub fn as_http(&self) -> &http::Response<Bytes> {
        &self.inner
    }

    pub fn into_http(self) -> http::Response<Bytes> {
        self.inner
    }
}
