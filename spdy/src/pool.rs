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

//! Keyed lookup and reuse of sessions.
//!
//! The pool owns every [`Session`] for an HTTP client context and dedups
//! concurrent connection attempts for the same key: while a connect is in
//! flight, further requesters join it instead of opening a second
//! transport. The pool is a plain owned value, injected where needed, not
//! a process-wide singleton.
//!
//! [`Session`]: ../struct.Session.html

use std::collections::HashMap;

use log::debug;
use log::trace;

use crate::settings::SettingsStore;
use crate::Config;
use crate::Error;
use crate::Result;
use crate::Session;
use crate::TransportSecurity;

/// Identity of a session within the pool.
///
/// Direct and proxied routes to the same physical host are distinct
/// entries; a session reached directly is never handed to a request
/// configured for a proxy, and vice versa.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct SessionKey {
    pub host: String,
    pub port: u16,
    pub proxy: Option<String>,
    pub privacy_mode: bool,
}

impl SessionKey {
    pub fn new(host: &str, port: u16) -> SessionKey {
        SessionKey {
            host: host.to_string(),
            port,
            proxy: None,
            privacy_mode: false,
        }
    }

    pub fn with_proxy(host: &str, port: u16, proxy: &str) -> SessionKey {
        SessionKey {
            host: host.to_string(),
            port,
            proxy: Some(proxy.to_string()),
            privacy_mode: false,
        }
    }

    /// The origin string used for settings persistence.
    pub fn origin(&self) -> String {
        format!("https://{}:{}", self.host, self.port)
    }
}

/// Outcome of a pool lookup.
pub enum Lookup<'a> {
    /// An available session exists for the key.
    Available(&'a mut Session),

    /// No session yet; a connection attempt is in flight. `initiated` is
    /// true for the caller that started it, false for callers that joined
    /// an attempt already in progress.
    Connecting { initiated: bool, waiters: usize },
}

/// Keyed collection of sessions with single-flight establishment.
pub struct SessionPool {
    sessions: HashMap<SessionKey, Session>,

    /// In-flight connection attempts, by key, with their waiter counts.
    pending: HashMap<SessionKey, usize>,

    store: Box<dyn SettingsStore>,
}

impl SessionPool {
    pub fn new(store: Box<dyn SettingsStore>) -> SessionPool {
        SessionPool {
            sessions: HashMap::new(),
            pending: HashMap::new(),
            store,
        }
    }

    /// Finds an available session for `key`, or registers the caller on
    /// the (single) in-flight connection attempt.
    pub fn request(&mut self, key: &SessionKey) -> Lookup<'_> {
        // A draining or closed session cannot take new streams; fall
        // through to establishing a replacement.
        let usable = self
            .sessions
            .get(key)
            .map(Session::is_available)
            .unwrap_or(false);

        if usable {
            return Lookup::Available(self.sessions.get_mut(key).unwrap());
        }

        let waiters = self.pending.entry(key.clone()).or_insert(0);
        *waiters += 1;

        let initiated = *waiters == 1;

        if initiated {
            debug!("pool: starting connect for {key:?}");
        } else {
            trace!("pool: joining in-flight connect for {key:?}");
        }

        Lookup::Connecting {
            initiated,
            waiters: *waiters,
        }
    }

    /// Completes an in-flight connection attempt.
    ///
    /// The new session is seeded with any settings previously persisted
    /// for the origin. Every waiter registered via [`request()`] is served
    /// by this one session.
    ///
    /// [`request()`]: struct.SessionPool.html#method.request
    pub fn complete_connect(
        &mut self, key: &SessionKey, config: &Config,
        security: TransportSecurity,
    ) -> Result<&mut Session> {
        if self.pending.remove(key).is_none() {
            return Err(Error::InvalidState);
        }

        let seed = self.store.get(&key.origin());

        let session = Session::connect(&key.origin(), config, security, seed)?;

        Ok(self.sessions.entry(key.clone()).or_insert(session))
    }

    /// Abandons an in-flight connection attempt (e.g. transport failure);
    /// waiters observe the failure and may retry, starting a fresh
    /// attempt.
    pub fn abort_connect(&mut self, key: &SessionKey) {
        self.pending.remove(key);
    }

    pub fn get_mut(&mut self, key: &SessionKey) -> Option<&mut Session> {
        self.sessions.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops sessions that have reached their terminal state, persisting
    /// the settings their peers advertised for future sessions to the
    /// same origin.
    pub fn purge_closed(&mut self) {
        let closed: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.is_closed())
            .map(|(k, _)| k.clone())
            .collect();

        for key in closed {
            if let Some(session) = self.sessions.remove(&key) {
                self.store.set(&key.origin(), session.peer_settings().clone());

                debug!("pool: purged closed session for {key:?}");
            }
        }
    }

    /// Closes every session in the pool with `err`.
    pub fn close_all(&mut self, err: Error) {
        for session in self.sessions.values_mut() {
            session.close(err);
        }

        self.purge_closed();
    }

    /// Closes only sessions with no active streams; busy sessions keep
    /// serving until they drain on their own.
    pub fn close_idle(&mut self, err: Error) {
        for session in self.sessions.values_mut() {
            if session.active_stream_count() == 0 {
                session.close(err);
            }
        }

        self.purge_closed();
    }
}
