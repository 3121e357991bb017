//! Outgoing requests and the request builder.

use bytes::Bytes;
use http::Method;
use serde::Serialize;
use url::Url;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::fingerprint::TlsProfile;
use crate::response::Response;
use crate::retry::RetryPolicy;

/// An HTTP request as it goes through middleware and onto the wire.
///
/// Headers are an ordered list; the order here is the order on the wire.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    /// Host header (HTTP/1.1) or `:authority` (HTTP/2) override.
    pub host: Option<String>,
    /// Retry policy replacing the client's for this request.
    pub retry: Option<RetryPolicy>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
            host: None,
            retry: None,
        }
    }

    /// First value of `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Set `name`, replacing every existing value in place of the first one.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.headers.iter().position(|(key, _)| key.eq_ignore_ascii_case(&name)) {
            Some(first) => {
                self.headers[first].1 = value;
                let mut index = 0;
                self.headers.retain(|(key, _)| {
                    let keep = index <= first || !key.eq_ignore_ascii_case(&name);
                    index += 1;
                    keep
                });
            }
            None => self.headers.push((name, value)),
        }
    }

    /// Append `name` without touching existing values.
    pub fn append_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    }

    /// Value sent as the HTTP/1.1 Host header.
    pub fn host_header(&self) -> String {
        match &self.host {
            Some(host) => host.clone(),
            None => self.url[url::Position::BeforeHost..url::Position::BeforePath].to_string(),
        }
    }

    /// Rewrite headers the profile overrides, then sort by the profile's order.
    ///
    /// Only headers already on the request are rewritten; unlisted headers
    /// keep their relative order after the listed ones.
    pub(crate) fn apply_profile(&mut self, profile: &TlsProfile) {
        for (name, value) in self.headers.iter_mut() {
            if let Some(spoofed) = profile.header_override(name) {
                *value = spoofed.to_string();
            }
        }

        if profile.header_order.is_empty() {
            return;
        }
        let rank = |name: &str| {
            profile
                .header_order
                .iter()
                .position(|ordered| ordered.eq_ignore_ascii_case(name))
                .unwrap_or(usize::MAX)
        };
        // Stable sort keeps unlisted headers in insertion order.
        self.headers.sort_by_key(|(name, _)| rank(name));
    }
}

/// Builder for a request sent through a [`Client`].
///
/// Errors are deferred until [`RequestBuilder::send`].
#[must_use = "a RequestBuilder does nothing until sent"]
pub struct RequestBuilder {
    client: Client,
    request: Result<Request>,
}

impl RequestBuilder {
    pub(crate) fn new(client: Client, method: Method, url: &str) -> Self {
        let request = Url::parse(url)
            .map(|url| Request::new(method, url))
            .map_err(Error::from);
        Self { client, request }
    }

    /// Add a header, keeping call order.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Ok(request) = &mut self.request {
            request.append_header(name, value);
        }
        self
    }

    /// Add several headers in order.
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if let Ok(request) = &mut self.request {
            for (name, value) in headers {
                request.append_header(name, value);
            }
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        if let Ok(request) = &mut self.request {
            request.body = Some(body.into());
        }
        self
    }

    /// Append url-encoded query pairs.
    pub fn query<K: AsRef<str>, V: AsRef<str>>(mut self, pairs: &[(K, V)]) -> Self {
        if let Ok(request) = &mut self.request {
            request
                .url
                .query_pairs_mut()
                .extend_pairs(pairs.iter().map(|(k, v)| (k.as_ref(), v.as_ref())));
        }
        self
    }

    /// Url-encoded form body; sets `content-type` unless already present.
    pub fn form<K: AsRef<str>, V: AsRef<str>>(mut self, pairs: &[(K, V)]) -> Self {
        if let Ok(request) = &mut self.request {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
                .finish();
            request.body = Some(Bytes::from(encoded));
            if request.header("content-type").is_none() {
                request.append_header("content-type", "application/x-www-form-urlencoded");
            }
        }
        self
    }

    /// JSON body; sets `content-type` unless already present.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.request = self.request.and_then(|mut request| {
            request.body = Some(Bytes::from(serde_json::to_vec(value)?));
            if request.header("content-type").is_none() {
                request.append_header("content-type", "application/json");
            }
            Ok(request)
        });
        self
    }

    /// Override the client's retry policy for this request.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        if let Ok(request) = &mut self.request {
            request.retry = Some(policy);
        }
        self
    }

    /// Override the Host header / `:authority`.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        if let Ok(request) = &mut self.request {
            request.host = Some(host.into());
        }
        self
    }

    /// Finish building without sending.
    pub fn build(self) -> Result<Request> {
        self.request
    }

    pub async fn send(self) -> Result<Response> {
        let request = self.request?;
        self.client.execute(request).await
    }
}
