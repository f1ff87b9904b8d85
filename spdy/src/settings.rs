// Copyright (C) 2024, the spdy crate authors.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
//     * Redistributions of source code must retain the above copyright notice,
//       this list of conditions and the following disclaimer.
//
//     * Redistributions in binary form must reproduce the above copyright
//       notice, this list of conditions and the following disclaimer in the
//       documentation and/or other materials provided with the distribution.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS
// IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO,
// THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR
// PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR
// CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL,
// EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO,
// PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR
// PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF
// LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING
// NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS
// SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::collections::HashMap;

use smallvec::SmallVec;

pub const SETTINGS_HEADER_TABLE_SIZE: u16 = 0x1;
pub const SETTINGS_ENABLE_PUSH: u16 = 0x2;
pub const SETTINGS_MAX_CONCURRENT_STREAMS: u16 = 0x3;
pub const SETTINGS_INITIAL_WINDOW_SIZE: u16 = 0x4;
pub const SETTINGS_MAX_FRAME_SIZE: u16 = 0x5;

/// Raw (id, value) pairs as carried by a SETTINGS frame.
pub type SettingsEntries = SmallVec<[(u16, u32); 8]>;

/// The subset of negotiable settings the session acts on.
///
/// Unknown identifiers are preserved on parse and ignored on apply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Settings {
    pub max_concurrent_streams: Option<u32>,
    pub initial_window_size: Option<u32>,
    pub enable_push: Option<u32>,
}

impl Settings {
    pub fn from_entries(entries: &[(u16, u32)]) -> Settings {
        let mut settings = Settings::default();

        for (id, value) in entries {
            match *id {
                SETTINGS_MAX_CONCURRENT_STREAMS =>
                    settings.max_concurrent_streams = Some(*value),

                SETTINGS_INITIAL_WINDOW_SIZE =>
                    settings.initial_window_size = Some(*value),

                SETTINGS_ENABLE_PUSH => settings.enable_push = Some(*value),

                _ => (),
            }
        }

        settings
    }

    pub fn to_entries(&self) -> SettingsEntries {
        let mut entries = SettingsEntries::new();

        if let Some(v) = self.max_concurrent_streams {
            entries.push((SETTINGS_MAX_CONCURRENT_STREAMS, v));
        }

        if let Some(v) = self.initial_window_size {
            entries.push((SETTINGS_INITIAL_WINDOW_SIZE, v));
        }

        if let Some(v) = self.enable_push {
            entries.push((SETTINGS_ENABLE_PUSH, v));
        }

        entries
    }

    /// Overlays `other` on top of `self`, keeping values `other` omits.
    pub fn merge(&mut self, other: &Settings) {
        if other.max_concurrent_streams.is_some() {
            self.max_concurrent_streams = other.max_concurrent_streams;
        }

        if other.initial_window_size.is_some() {
            self.initial_window_size = other.initial_window_size;
        }

        if other.enable_push.is_some() {
            self.enable_push = other.enable_push;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.max_concurrent_streams.is_none() &&
            self.initial_window_size.is_none() &&
            self.enable_push.is_none()
    }
}

/// Persistence of per-origin settings across sessions.
///
/// This mechanism is a legacy of the SPDY settings-persistence flags and is
/// deprecated in later protocol versions; a fresh deployment can use
/// [`NoopSettingsStore`].
///
/// [`NoopSettingsStore`]: struct.NoopSettingsStore.html
pub trait SettingsStore {
    /// Returns the settings last recorded for `origin`.
    fn get(&self, origin: &str) -> Option<Settings>;

    /// Records `settings` for `origin`.
    fn set(&mut self, origin: &str, settings: Settings);
}

/// A [`SettingsStore`] that persists nothing.
///
/// [`SettingsStore`]: trait.SettingsStore.html
#[derive(Default)]
pub struct NoopSettingsStore;

impl SettingsStore for NoopSettingsStore {
    fn get(&self, _origin: &str) -> Option<Settings> {
        None
    }

    fn set(&mut self, _origin: &str, _settings: Settings) {}
}

/// An in-memory [`SettingsStore`].
///
/// [`SettingsStore`]: trait.SettingsStore.html
#[derive(Default)]
pub struct MemorySettingsStore {
    map: HashMap<String, Settings>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, origin: &str) -> Option<Settings> {
        self.map.get(origin).cloned()
    }

    fn set(&mut self, origin: &str, settings: Settings) {
        if settings.is_empty() {
            return;
        }

        self.map.insert(origin.to_string(), settings);
    }
}
