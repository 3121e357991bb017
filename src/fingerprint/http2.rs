//! HTTP/2 fingerprint configuration (SETTINGS frame).
//!
//! The SETTINGS id/value pairs and the order they are listed in are part of
//! the Akamai HTTP/2 fingerprint, so they are kept as an ordered list rather
//! than a struct of optional fields.

use h2::client::Builder;

/// HTTP/2 SETTINGS identifiers (RFC 9113 Section 6.5.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingId {
    HeaderTableSize,
    EnablePush,
    MaxConcurrentStreams,
    InitialWindowSize,
    MaxFrameSize,
    MaxHeaderListSize,
}

impl SettingId {
    /// Wire identifier of this setting.
    pub fn code(&self) -> u16 {
        match self {
            Self::HeaderTableSize => 0x1,
            Self::EnablePush => 0x2,
            Self::MaxConcurrentStreams => 0x3,
            Self::InitialWindowSize => 0x4,
            Self::MaxFrameSize => 0x5,
            Self::MaxHeaderListSize => 0x6,
        }
    }
}

/// Ordered SETTINGS list plus push handling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Http2Settings {
    settings: Vec<(SettingId, u32)>,
    /// Refuse server push regardless of the SETTINGS list.
    pub disable_push: bool,
}

impl Http2Settings {
    /// Empty list; the transport falls back to [`Http2Settings::browser_default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Browser-like defaults used when a profile carries no SETTINGS.
    pub fn browser_default() -> Self {
        Self::new()
            .setting(SettingId::HeaderTableSize, 65536)
            .setting(SettingId::MaxConcurrentStreams, 1000)
            .setting(SettingId::InitialWindowSize, 6291456)
            .setting(SettingId::MaxHeaderListSize, 262144)
    }

    /// Set a value; a repeated id keeps its original position.
    pub fn setting(mut self, id: SettingId, value: u32) -> Self {
        match self.settings.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = value,
            None => self.settings.push((id, value)),
        }
        self
    }

    /// Disable server push.
    pub fn without_push(mut self) -> Self {
        self.disable_push = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    /// Value configured for `id`.
    pub fn get(&self, id: SettingId) -> Option<u32> {
        self.settings
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, value)| *value)
    }

    /// Settings in send order.
    pub fn iter(&self) -> impl Iterator<Item = (SettingId, u32)> + '_ {
        self.settings.iter().copied()
    }

    /// This list, or the browser default when empty. `disable_push` is kept.
    pub fn effective(&self) -> Self {
        if self.is_empty() {
            Self {
                disable_push: self.disable_push,
                ..Self::browser_default()
            }
        } else {
            self.clone()
        }
    }

    /// Configure an `h2` client builder in list order.
    pub(crate) fn apply(&self, builder: &mut Builder) {
        let effective = self.effective();
        let mut push = !effective.disable_push;
        for (id, value) in effective.iter() {
            match id {
                SettingId::HeaderTableSize => {
                    builder.header_table_size(value);
                }
                SettingId::EnablePush => push = push && value != 0,
                SettingId::MaxConcurrentStreams => {
                    builder.max_concurrent_streams(value);
                }
                SettingId::InitialWindowSize => {
                    builder.initial_window_size(value);
                }
                SettingId::MaxFrameSize => {
                    builder.max_frame_size(value);
                }
                SettingId::MaxHeaderListSize => {
                    builder.max_header_list_size(value);
                }
            }
        }
        builder.enable_push(push);
    }
}
