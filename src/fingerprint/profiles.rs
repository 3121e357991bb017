//! Browser fingerprint profiles.

use super::http2::{Http2Settings, SettingId};
use super::tls::TlsFingerprint;
use super::{PseudoHeader, TlsProfile};

/// Chrome on Windows user agent.
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Safari on iOS user agent.
pub const SAFARI_IOS_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1";

impl TlsProfile {
    /// Chrome on Windows.
    ///
    /// SETTINGS are left empty so connections use the browser-like default.
    pub fn chrome() -> Self {
        TlsProfile::new(TlsFingerprint::chrome())
            .with_header(
                "sec-ch-ua",
                r#""Not/A)Brand";v="8", "Chromium";v="126", "Google Chrome";v="126""#,
            )
            .with_header("sec-ch-ua-mobile", "?0")
            .with_header("sec-ch-ua-platform", r#""Windows""#)
            .with_header("user-agent", CHROME_USER_AGENT)
            .with_header_order([
                "sec-ch-ua",
                "sec-ch-ua-mobile",
                "sec-ch-ua-platform",
                "upgrade-insecure-requests",
                "user-agent",
                "accept",
                "sec-fetch-site",
                "sec-fetch-mode",
                "sec-fetch-user",
                "sec-fetch-dest",
                "accept-encoding",
                "accept-language",
                "cookie",
            ])
            .with_pseudo_header_order(vec![
                PseudoHeader::Method,
                PseudoHeader::Authority,
                PseudoHeader::Scheme,
                PseudoHeader::Path,
            ])
    }

    /// Safari on iOS, with its own SETTINGS order and push disabled.
    pub fn safari_ios() -> Self {
        TlsProfile::new(TlsFingerprint::safari())
            .with_http2(
                Http2Settings::new()
                    .setting(SettingId::HeaderTableSize, 4096)
                    .setting(SettingId::MaxConcurrentStreams, 100)
                    .setting(SettingId::InitialWindowSize, 2097152)
                    .setting(SettingId::MaxFrameSize, 16384)
                    .setting(SettingId::MaxHeaderListSize, u32::MAX)
                    .without_push(),
            )
            .with_header("user-agent", SAFARI_IOS_USER_AGENT)
            .with_pseudo_header_order(vec![
                PseudoHeader::Method,
                PseudoHeader::Path,
                PseudoHeader::Authority,
                PseudoHeader::Scheme,
            ])
    }
}
