//! RFC 6265 cookies and the pluggable cookie store.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use url::Url;

/// One cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Empty means "the host of the URL it is stored for".
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    /// Seconds; zero or negative deletes the cookie when stored.
    pub max_age: Option<i64>,
}

impl Cookie {
    /// Session cookie scoped to the URL it will be stored for.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: String::new(),
            path: "/".to_string(),
            secure: false,
            http_only: false,
            same_site: None,
            expires: None,
            max_age: None,
        }
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = normalize_domain(domain);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Parse a `Set-Cookie` value received from `request_url`.
    pub fn parse(header: &str, request_url: &Url) -> Option<Self> {
        let mut parts = header.split(';').map(str::trim);
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie::new(name, value.trim().trim_matches('"'));
        cookie.domain = normalize_domain(request_url.host_str()?);
        cookie.path = default_path(request_url);

        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((key, val)) => (key.trim(), val.trim()),
                None => (attr, ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                "domain" if !val.is_empty() => {
                    let domain = normalize_domain(val);
                    if !domain_matches(&cookie.domain, &domain) {
                        return None;
                    }
                    cookie.domain = domain;
                }
                "path" if val.starts_with('/') => cookie.path = val.to_string(),
                "expires" => cookie.expires = parse_cookie_date(val),
                "max-age" => cookie.max_age = val.parse().ok(),
                "samesite" => cookie.same_site = Some(val.to_string()),
                _ => {}
            }
        }
        Some(cookie)
    }

    /// Whether this cookie is already expired (or marked for deletion).
    pub fn is_expired(&self) -> bool {
        if matches!(self.max_age, Some(age) if age <= 0) {
            return true;
        }
        matches!(self.expires, Some(expires) if expires <= Utc::now())
    }

    /// Whether this cookie should be sent to `url`.
    pub fn matches_url(&self, url: &Url) -> bool {
        let host = match url.host_str() {
            Some(host) => host.to_ascii_lowercase(),
            None => return false,
        };
        if self.secure && url.scheme() != "https" {
            return false;
        }
        if self.is_expired() {
            return false;
        }
        if host != self.domain && !host.ends_with(&format!(".{}", self.domain)) {
            return false;
        }

        let path = url.path();
        path == self.path || path.starts_with(&format!("{}/", self.path.trim_end_matches('/')))
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Storage behind a client's cookie handling.
///
/// The client stores every `Set-Cookie` it receives and attaches matching
/// cookies to every request it sends.
pub trait CookieStore: Send + Sync {
    /// Store cookies received from `url`. Expired cookies delete their match.
    fn set_cookies(&self, url: &Url, cookies: Vec<Cookie>);

    /// Cookies to send to `url`.
    fn cookies(&self, url: &Url) -> Vec<Cookie>;
}

/// In-memory cookie jar keyed by domain, then path and name.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: Mutex<HashMap<String, HashMap<(String, String), Cookie>>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(HashMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl CookieStore for CookieJar {
    fn set_cookies(&self, url: &Url, cookies: Vec<Cookie>) {
        let host = match url.host_str() {
            Some(host) => normalize_domain(host),
            None => return,
        };
        let mut jar = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);

        for mut cookie in cookies {
            if cookie.domain.is_empty() {
                cookie.domain = host.clone();
            }
            if cookie.path.is_empty() {
                cookie.path = "/".to_string();
            }
            let key = (cookie.path.clone(), cookie.name.clone());

            if cookie.is_expired() {
                if let Some(domain) = jar.get_mut(&cookie.domain) {
                    domain.remove(&key);
                }
                continue;
            }

            if let Some(age) = cookie.max_age {
                // Out-of-range ages keep the cookie without an expiry.
                cookie.expires = ChronoDuration::try_seconds(age)
                    .and_then(|age| Utc::now().checked_add_signed(age));
            }
            jar.entry(cookie.domain.clone()).or_default().insert(key, cookie);
        }
    }

    fn cookies(&self, url: &Url) -> Vec<Cookie> {
        let jar = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        let mut matching: Vec<Cookie> = jar
            .values()
            .flat_map(HashMap::values)
            .filter(|cookie| cookie.matches_url(url))
            .cloned()
            .collect();
        // Longer paths first.
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()).then_with(|| a.name.cmp(&b.name)));
        matching
    }
}

/// `Cookie` request header value for `url`, if any cookie matches.
pub(crate) fn cookie_header(store: &dyn CookieStore, url: &Url) -> Option<String> {
    let cookies = store.cookies(url);
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .iter()
            .map(Cookie::to_string)
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// RFC 6265 section 5.1.3 domain matching of a request host.
fn domain_matches(host: &str, domain: &str) -> bool {
    if host == domain {
        return true;
    }
    host.parse::<std::net::IpAddr>().is_err() && host.ends_with(&format!(".{}", domain))
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Directory of the request path, per RFC 6265 section 5.1.4.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => path[..index].to_string(),
    }
}

fn parse_cookie_date(date_str: &str) -> Option<DateTime<Utc>> {
    for fmt in [
        "%a, %d %b %Y %H:%M:%S GMT",
        "%a, %d-%b-%Y %H:%M:%S GMT",
        "%a, %d-%b-%y %H:%M:%S GMT",
    ] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(date_str, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    date_str
        .parse::<i64>()
        .ok()
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}
