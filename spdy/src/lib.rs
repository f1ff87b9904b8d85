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

//! Client-side multiplexed HTTP session engine.
//!
//! This crate implements the client half of a SPDY-style framed protocol:
//! many concurrent request/response exchanges over a single transport
//! connection, with priority scheduling, per-stream and per-session flow
//! control, server push, and session pooling.
//!
//! The [`Session`] is transport-agnostic: it never touches a socket.
//! Bytes read from the transport are fed in with [`recv()`], bytes to be
//! written are pulled out with [`send()`], and protocol happenings are
//! observed via [`poll()`]. This keeps the protocol logic synchronous and
//! deterministic regardless of how the application does I/O.
//!
//! ## Connecting a session
//!
//! ```no_run
//! let config = spdy::Config::new()?;
//!
//! let mut session = spdy::Session::connect(
//!     "https://www.example.org",
//!     &config,
//!     spdy::TransportSecurity::modern(),
//!     None,
//! )?;
//! # Ok::<(), spdy::Error>(())
//! ```
//!
//! ## Issuing a request
//!
//! ```no_run
//! # let config = spdy::Config::new()?;
//! # let mut session = spdy::Session::connect(
//! #     "https://www.example.org",
//! #     &config,
//! #     spdy::TransportSecurity::modern(),
//! #     None,
//! # )?;
//! let headers = vec![
//!     spdy::Header::new(b":method", b"GET"),
//!     spdy::Header::new(b":scheme", b"https"),
//!     spdy::Header::new(b":authority", b"www.example.org"),
//!     spdy::Header::new(b":path", b"/index.html"),
//! ];
//!
//! let request = session.request_stream(&headers, spdy::Priority::Medium, true)?;
//!
//! // Flush whatever the session wants to put on the wire.
//! let mut out = [0; 1500];
//!
//! while let Ok(written) = session.send(&mut out) {
//!     // write out[..written] to the transport
//! }
//! # Ok::<(), spdy::Error>(())
//! ```
//!
//! ## Processing events
//!
//! After feeding transport bytes in with [`recv()`], the application
//! drains pending events:
//!
//! ```no_run
//! # let config = spdy::Config::new()?;
//! # let mut session = spdy::Session::connect(
//! #     "https://www.example.org",
//! #     &config,
//! #     spdy::TransportSecurity::modern(),
//! #     None,
//! # )?;
//! loop {
//!     match session.poll() {
//!         Ok((request, spdy::Event::Headers { list, .. })) => {
//!             // response headers for `request`
//!         },
//!
//!         Ok((request, spdy::Event::Data)) => {
//!             let mut body = [0; 4096];
//!
//!             while let Ok(read) = session.recv_body(request, &mut body) {
//!                 // process body[..read]
//!             }
//!         },
//!
//!         Ok((request, spdy::Event::Finished)) => {
//!             // response complete
//!         },
//!
//!         Ok((_, _)) => (),
//!
//!         Err(spdy::Error::Done) => break,
//!
//!         Err(e) => panic!("session error: {e:?}"),
//!     }
//! }
//! # Ok::<(), spdy::Error>(())
//! ```
//!
//! [`Session`]: struct.Session.html
//! [`recv()`]: struct.Session.html#method.recv
//! [`send()`]: struct.Session.html#method.send
//! [`poll()`]: struct.Session.html#method.poll

#![allow(clippy::upper_case_acronyms)]

#[macro_use]
extern crate log;

use std::cmp;

use std::collections::HashMap;
use std::collections::VecDeque;

use crate::frame::Frame;
use crate::scheduler::PendingQueue;
use crate::scheduler::UnstallQueue;
use crate::settings::Settings;
use crate::settings::SettingsEntries;
use crate::stream::Stream;

pub use crate::error::Error;
pub use crate::error::Result;
pub use crate::error::WireErrorCode;
pub use crate::header::Header;
pub use crate::header::HeaderMap;
pub use crate::header::NameValue;
pub use crate::scheduler::Priority;

/// The default per-stream and per-session flow-control window.
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 64 * 1024;

/// The largest DATA payload emitted in, or accepted from, a single frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024;

/// Concurrency assumed before the peer advertises a limit.
pub const DEFAULT_MAX_CONCURRENT_STREAMS: usize = 100;

/// Upper bound applied to any advertised concurrency limit.
pub const MAX_CONCURRENT_STREAMS_LIMIT: usize = 256;

/// Control frames jump every stream band.
const BAND_CONTROL: usize = 0;

const BAND_COUNT: usize = scheduler::PRIORITY_COUNT + 1;

fn stream_band(priority: Priority) -> usize {
    priority as usize + 1
}

/// TLS protocol versions, oldest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Ssl3,
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

/// Cipher suites that never qualify, regardless of TLS version: NULL,
/// export-grade and RC4 suites.
const WEAK_CIPHER_SUITES: &[u16] = &[0x0000, 0x0001, 0x0002, 0x0004, 0x0005];

/// Security properties negotiated by the underlying transport.
///
/// The protocol rides on an already-established TLS connection; the
/// session only validates that what was negotiated meets the protocol's
/// floor before agreeing to speak over it.
#[derive(Clone, Copy, Debug)]
pub struct TransportSecurity {
    pub version: TlsVersion,

    /// The negotiated cipher suite, as an IANA identifier.
    pub cipher_suite: u16,
}

impl TransportSecurity {
    pub fn new(version: TlsVersion, cipher_suite: u16) -> TransportSecurity {
        TransportSecurity {
            version,
            cipher_suite,
        }
    }

    /// TLS 1.3 with AES-128-GCM-SHA256.
    pub fn modern() -> TransportSecurity {
        TransportSecurity::new(TlsVersion::Tls13, 0x1301)
    }

    /// TLS 1.0 with RC4, below any acceptable floor.
    pub fn legacy() -> TransportSecurity {
        TransportSecurity::new(TlsVersion::Tls10, 0x0005)
    }

    pub fn is_adequate(&self, min_version: TlsVersion) -> bool {
        self.version >= min_version &&
            !WEAK_CIPHER_SUITES.contains(&self.cipher_suite)
    }
}

/// Stores configuration shared between multiple sessions.
#[derive(Clone)]
pub struct Config {
    initial_window_size: u32,
    max_frame_payload: usize,
    trusted_proxy: Option<String>,
    push_enabled: bool,
    min_tls_version: TlsVersion,
}

impl Config {
    /// Creates a config object with the default values.
    pub fn new() -> Result<Config> {
        Ok(Config {
            initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            max_frame_payload: DEFAULT_MAX_FRAME_SIZE,
            trusted_proxy: None,
            push_enabled: true,
            min_tls_version: TlsVersion::Tls12,
        })
    }

    /// Sets the per-stream receive window advertised to the peer.
    ///
    /// Values beyond the 31-bit window range are ignored.
    pub fn set_initial_window_size(&mut self, v: u32) {
        if v as i64 <= stream::MAX_WINDOW_SIZE {
            self.initial_window_size = v;
        }
    }

    /// Designates a `host:port` proxy whose sessions may push resources
    /// for any origin, except content over https.
    pub fn set_trusted_proxy(&mut self, proxy: &str) {
        self.trusted_proxy = Some(proxy.to_string());
    }

    /// Sets whether the peer is allowed to push streams.
    pub fn set_push_enabled(&mut self, v: bool) {
        self.push_enabled = v;
    }

    /// Sets the minimum TLS version a transport must have negotiated.
    pub fn set_min_tls_version(&mut self, v: TlsVersion) {
        self.min_tls_version = v;
    }
}

/// A protocol happening on a request stream, reported by [`poll()`].
///
/// Session-scoped events are reported under request ID `0`.
///
/// [`poll()`]: struct.Session.html#method.poll
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Response headers were received. `has_body` is false when the
    /// headers carried the end of the response.
    Headers { list: Vec<Header>, has_body: bool },

    /// Response body bytes are available via [`recv_body()`].
    ///
    /// This event is edge-triggered: it is reported once when the buffer
    /// becomes non-empty, and re-armed once the buffer is drained.
    ///
    /// [`recv_body()`]: struct.Session.html#method.recv_body
    Data,

    /// The response completed and every body byte was delivered.
    Finished,

    /// The stream was reset, carrying the wire error code.
    Reset(u64),

    /// The request was abandoned before completing, with nothing of it
    /// reaching the peer's application.
    Aborted,

    /// The peer announced it will accept no new streams.
    GoAway,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionState {
    /// Accepting new streams.
    Available,

    /// A GOAWAY was received; existing streams run to completion but new
    /// ones are refused.
    Draining,

    /// Terminal.
    Closed,
}

/// Frames serialized and waiting for the transport, in priority bands.
///
/// A frame is never interleaved with another: once a frame's first byte is
/// copied out, subsequent [`emit()`] calls keep draining that frame before
/// considering any band, even if a higher-band frame arrives in between.
///
/// [`emit()`]: struct.WriteQueue.html#method.emit
struct WriteQueue {
    bands: Vec<VecDeque<Vec<u8>>>,

    /// The partially emitted frame, with its emit offset.
    current: Option<(Vec<u8>, usize)>,
}

impl WriteQueue {
    fn new(bands: usize) -> WriteQueue {
        WriteQueue {
            bands: (0..bands).map(|_| VecDeque::new()).collect(),
            current: None,
        }
    }

    fn push(&mut self, band: usize, frame: Vec<u8>) {
        self.bands[band].push_back(frame);
    }

    /// Copies queued bytes into `out`, highest band first.
    fn emit(&mut self, out: &mut [u8]) -> usize {
        let mut off = 0;

        while off < out.len() {
            if self.current.is_none() {
                match self.bands.iter_mut().find_map(VecDeque::pop_front) {
                    Some(frame) => self.current = Some((frame, 0)),

                    None => break,
                }
            }

            let Some((frame, pos)) = self.current.as_mut() else {
                break;
            };

            let n = cmp::min(out.len() - off, frame.len() - *pos);
            out[off..off + n].copy_from_slice(&frame[*pos..*pos + n]);

            off += n;
            *pos += n;

            if *pos == frame.len() {
                self.current = None;
            }
        }

        off
    }

    fn is_empty(&self) -> bool {
        self.current.is_none() && self.bands.iter().all(VecDeque::is_empty)
    }
}

/// A multiplexed client session over a single transport connection.
///
/// Requests are identified by the opaque ID returned from
/// [`request_stream()`]; wire stream IDs are allocated internally, in
/// activation order, and never exposed. This is what lets a
/// higher-priority request queued later take a lower wire ID than an
/// earlier one, and lets a refused stream retry under a fresh wire ID
/// without the caller noticing.
///
/// [`request_stream()`]: struct.Session.html#method.request_stream
pub struct Session {
    trace_id: String,

    state: SessionState,

    origin_scheme: String,
    origin_host: String,
    origin_port: u16,

    /// Next client-initiated wire stream ID (odd, monotonic).
    next_stream_id: u64,

    next_request_id: u64,

    /// Highest peer-initiated (even) wire stream ID seen.
    last_peer_stream_id: u64,

    max_concurrent_streams: usize,

    /// The peer's advertised per-stream window, applied to new streams
    /// and retroactively to existing ones when it changes.
    peer_initial_window: i64,

    /// The per-stream receive window we advertise.
    local_initial_window: i64,

    session_send_window: i64,
    session_recv_window: i64,
    session_init_recv_window: i64,

    /// Session-level bytes consumed by the caller but not yet returned to
    /// the peer via WINDOW_UPDATE.
    session_unacked: i64,

    max_frame_payload: usize,

    streams: HashMap<u64, Stream>,

    /// Wire stream ID to request ID, for active streams only.
    wire_ids: HashMap<u64, u64>,

    pending: PendingQueue,

    unstall: UnstallQueue,

    /// Accepted pushed streams not yet matched to a request, by URL.
    unclaimed_pushes: HashMap<String, u64>,

    writes: WriteQueue,

    /// Transport bytes not yet forming a complete frame.
    partial: Vec<u8>,

    events: VecDeque<(u64, Event)>,

    goaway_sent: bool,

    peer_settings: Settings,

    trusted_proxy: Option<String>,

    push_enabled: bool,

    error: Option<Error>,
}

impl Session {
    /// Creates a session for `origin` over an established transport.
    ///
    /// `seed` carries settings persisted from a previous session to the
    /// same origin; they apply as if the peer had already sent them.
    pub fn connect(
        origin: &str, config: &Config, security: TransportSecurity,
        seed: Option<Settings>,
    ) -> Result<Session> {
        if !security.is_adequate(config.min_tls_version) {
            return Err(Error::InadequateSecurity);
        }

        let parsed = url::Url::parse(origin).map_err(|_| Error::InvalidState)?;

        let host = parsed
            .host_str()
            .ok_or(Error::InvalidState)?
            .to_string();

        let port = parsed.port_or_known_default().ok_or(Error::InvalidState)?;

        let mut session = Session {
            trace_id: format!("{host}:{port}"),
            state: SessionState::Available,
            origin_scheme: parsed.scheme().to_string(),
            origin_host: host,
            origin_port: port,
            next_stream_id: 1,
            next_request_id: 1,
            last_peer_stream_id: 0,
            max_concurrent_streams: DEFAULT_MAX_CONCURRENT_STREAMS,
            peer_initial_window: DEFAULT_INITIAL_WINDOW_SIZE as i64,
            local_initial_window: config.initial_window_size as i64,
            session_send_window: DEFAULT_INITIAL_WINDOW_SIZE as i64,
            session_recv_window: DEFAULT_INITIAL_WINDOW_SIZE as i64,
            session_init_recv_window: DEFAULT_INITIAL_WINDOW_SIZE as i64,
            session_unacked: 0,
            max_frame_payload: config.max_frame_payload,
            streams: HashMap::new(),
            wire_ids: HashMap::new(),
            pending: PendingQueue::new(),
            unstall: UnstallQueue::new(),
            unclaimed_pushes: HashMap::new(),
            writes: WriteQueue::new(BAND_COUNT),
            partial: Vec::new(),
            events: VecDeque::new(),
            goaway_sent: false,
            peer_settings: Settings::default(),
            trusted_proxy: config.trusted_proxy.clone(),
            push_enabled: config.push_enabled,
            error: None,
        };

        if let Some(seed) = seed {
            debug!("{} seeding persisted settings {seed:?}", session.trace_id);

            session.apply_settings(&seed)?;
            session.peer_settings.merge(&seed);
        }

        // The initial SETTINGS advertises our per-stream receive window.
        let mut entries = SettingsEntries::new();
        entries.push((
            settings::SETTINGS_INITIAL_WINDOW_SIZE,
            config.initial_window_size,
        ));

        if !config.push_enabled {
            entries.push((settings::SETTINGS_ENABLE_PUSH, 0));
        }

        session.queue_frame(BAND_CONTROL, &Frame::Settings {
            entries,
            ack: false,
        })?;

        debug!("{} session created", session.trace_id);

        Ok(session)
    }

    /// Starts a request, returning its request ID.
    ///
    /// `fin` indicates the request has no body. The stream is activated
    /// immediately if the concurrency limit allows, otherwise it waits in
    /// the pending queue in `(priority, arrival)` order.
    ///
    /// If the request's URL matches an unclaimed pushed stream, that
    /// stream is adopted instead and no bytes hit the wire; any response
    /// state it already accumulated is delivered as events.
    pub fn request_stream(
        &mut self, headers: &[Header], priority: Priority, fin: bool,
    ) -> Result<u64> {
        match self.state {
            SessionState::Available => (),
            SessionState::Draining => return Err(Error::GoAway),
            SessionState::Closed => return Err(Error::InvalidState),
        }

        let url = header::url_from_headers(headers);

        if let Some(url) = &url {
            if let Some(req) = self.unclaimed_pushes.remove(url) {
                return self.claim_push(req, priority);
            }
        }

        let req = self.next_request_id;
        self.next_request_id += 1;

        let stream = Stream::new(
            headers.to_vec(),
            priority,
            fin,
            self.peer_initial_window,
            self.local_initial_window,
            url,
        );

        self.streams.insert(req, stream);
        self.pending.push(priority, req);

        trace!("{} new request {req} prio={priority:?}", self.trace_id);

        self.process_pending()?;

        Ok(req)
    }

    /// Appends request body bytes, optionally finishing the request.
    ///
    /// The bytes are buffered and emitted as DATA frames as flow control
    /// allows; a pending stream's body is held until activation.
    pub fn send_body(
        &mut self, request: u64, body: &[u8], fin: bool,
    ) -> Result<usize> {
        if self.state == SessionState::Closed {
            return Err(Error::InvalidState);
        }

        let Some(stream) = self.streams.get_mut(&request) else {
            return Err(Error::InvalidStreamState(request));
        };

        if stream.is_push ||
            stream.is_closed() ||
            stream.headers_fin ||
            stream.send_buf.is_fin()
        {
            return Err(Error::InvalidStreamState(request));
        }

        stream.send_buf.write(body, fin);

        let active = stream.is_active();

        if active {
            self.flush_stream(request)?;
        }

        Ok(body.len())
    }

    /// Reads received response body bytes for `request` into `out`.
    ///
    /// Consumed bytes are credited back to the stream and session receive
    /// windows; WINDOW_UPDATE frames are emitted once half of the
    /// respective initial window has accumulated.
    pub fn recv_body(
        &mut self, request: u64, out: &mut [u8],
    ) -> Result<usize> {
        let (n, update, remote_done) = {
            let Some(stream) = self.streams.get_mut(&request) else {
                return Err(Error::Done);
            };

            let n = stream.recv_buf.read(out);

            if n == 0 && !stream.remote_done() {
                return Err(Error::Done);
            }

            // No point topping up a window the peer is done with.
            let update = if stream.remote_done() {
                None
            } else {
                stream.consume(n).map(|delta| (stream.id, delta))
            };

            if stream.recv_buf.is_empty() {
                stream.data_event_armed = false;
            }

            (n, update, stream.remote_done())
        };

        if let Some((stream_id, delta)) = update {
            self.queue_frame(BAND_CONTROL, &Frame::WindowUpdate {
                stream_id,
                delta,
            })?;
        }

        self.session_consume(n)?;

        if remote_done {
            self.maybe_finish(request)?;
        }

        if n == 0 {
            return Err(Error::Done);
        }

        Ok(n)
    }

    /// Returns the next pending event, or [`Done`] when there is none.
    ///
    /// [`Done`]: enum.Error.html#variant.Done
    pub fn poll(&mut self) -> Result<(u64, Event)> {
        self.events.pop_front().ok_or(Error::Done)
    }

    /// Cancels a request.
    ///
    /// An active stream is reset with CANCEL; a pending one is dropped
    /// with no wire effect at all. No event is reported either way.
    pub fn cancel(&mut self, request: u64) -> Result<()> {
        let Some(stream) = self.streams.get(&request) else {
            return Ok(());
        };

        if stream.id != 0 && !stream.is_closed() {
            let frame = Frame::RstStream {
                stream_id: stream.id,
                error_code: WireErrorCode::Cancel as u32,
            };

            self.queue_frame(BAND_CONTROL, &frame)?;
        }

        trace!("{} cancelled request {request}", self.trace_id);

        self.teardown_stream(request, None)
    }

    /// Processes bytes received from the transport.
    ///
    /// Incomplete trailing frames are buffered until more bytes arrive,
    /// so the transport can deliver data in arbitrary chunks.
    pub fn recv(&mut self, buf: &[u8]) -> Result<usize> {
        if self.state == SessionState::Closed {
            return Err(Error::InvalidState);
        }

        trace!("{} rx {} bytes", self.trace_id, buf.len());

        self.partial.extend_from_slice(buf);

        let mut off = 0;

        let res = loop {
            let avail = self.partial.len() - off;

            if avail < frame::FRAME_HEADER_SIZE {
                break Ok(());
            }

            let hdr = &self.partial[off..off + 3];
            let payload_len = ((hdr[0] as usize) << 16) |
                ((hdr[1] as usize) << 8) |
                hdr[2] as usize;

            if payload_len > self.max_frame_payload {
                break Err(self.fatal(Error::FrameSize));
            }

            let frame_len = frame::FRAME_HEADER_SIZE + payload_len;

            if avail < frame_len {
                break Ok(());
            }

            let frame = {
                let mut b = octets::Octets::with_slice(
                    &self.partial[off..off + frame_len],
                );

                Frame::from_bytes(&mut b)
            };

            off += frame_len;

            let frame = match frame {
                Ok(frame) => frame,

                Err(e) => break Err(self.fatal(e)),
            };

            trace!("{} rx frm {frame:?}", self.trace_id);

            if let Err(e) = self.process_frame(frame) {
                break Err(e);
            }
        };

        self.partial.drain(..off);

        res.map(|_| buf.len())
    }

    /// Copies frames queued for the transport into `out`.
    ///
    /// Returns [`Done`] when there is nothing to write. A short `out`
    /// gets a frame prefix; the remainder is picked up by the next call,
    /// never reordered or duplicated.
    ///
    /// [`Done`]: enum.Error.html#variant.Done
    pub fn send(&mut self, out: &mut [u8]) -> Result<usize> {
        let written = self.writes.emit(out);

        if written == 0 {
            return Err(Error::Done);
        }

        trace!("{} tx {written} bytes", self.trace_id);

        Ok(written)
    }

    /// Closes the session: a GOAWAY is queued and every request still in
    /// flight is aborted.
    pub fn close(&mut self, err: Error) {
        self.shutdown(err);
    }

    /// Whether the session accepts new streams.
    pub fn is_available(&self) -> bool {
        self.state == SessionState::Available
    }

    /// Whether a received GOAWAY is letting existing streams finish.
    pub fn is_draining(&self) -> bool {
        self.state == SessionState::Draining
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// The error the session was closed with, if any.
    pub fn error(&self) -> Option<Error> {
        self.error
    }

    /// The settings the peer has advertised over the session's lifetime,
    /// suitable for persisting via a
    /// [`SettingsStore`](settings/trait.SettingsStore.html).
    pub fn peer_settings(&self) -> &Settings {
        &self.peer_settings
    }

    /// Number of streams currently holding a wire stream ID.
    pub fn active_stream_count(&self) -> usize {
        self.wire_ids.len()
    }

    pub fn max_concurrent_streams(&self) -> usize {
        self.max_concurrent_streams
    }

    /// Whether frames are queued for the transport.
    pub fn wants_write(&self) -> bool {
        !self.writes.is_empty()
    }

    fn process_frame(&mut self, frame: Frame) -> Result<()> {
        match frame {
            Frame::Data {
                stream_id,
                payload,
                fin,
            } => self.on_data(stream_id, payload, fin),

            Frame::Headers {
                stream_id,
                headers,
                fin,
                ..
            } => self.on_headers(stream_id, headers, fin),

            Frame::RstStream {
                stream_id,
                error_code,
            } => self.on_rst_stream(stream_id, error_code),

            Frame::Settings { entries, ack } => self.on_settings(entries, ack),

            Frame::PushPromise {
                stream_id,
                promised_stream_id,
                headers,
            } => self.on_push_promise(stream_id, promised_stream_id, headers),

            Frame::GoAway {
                last_stream_id,
                error_code,
            } => self.on_goaway(last_stream_id, error_code),

            Frame::WindowUpdate { stream_id, delta } =>
                self.on_window_update(stream_id, delta),

            Frame::Unknown { raw_type, .. } => {
                trace!(
                    "{} ignoring unknown frame type {raw_type:#x}",
                    self.trace_id
                );

                Ok(())
            },
        }
    }

    fn on_data(
        &mut self, stream_id: u64, payload: Vec<u8>, fin: bool,
    ) -> Result<()> {
        let len = payload.len();

        self.session_recv_window -= len as i64;

        if self.session_recv_window < 0 {
            return Err(self.fatal(Error::FlowControl));
        }

        let Some(&req) = self.wire_ids.get(&stream_id) else {
            // Data for a reset or unknown stream is discarded, but its
            // session window cost is returned right away.
            self.session_consume(len)?;

            return Ok(());
        };

        let Some(stream) = self.streams.get_mut(&req) else {
            return Ok(());
        };

        if !stream.reply_received() {
            self.session_consume(len)?;

            return self.reset_stream(req, Error::InvalidState);
        }

        if stream.recv_data(len).is_err() {
            self.session_consume(len)?;

            return self.reset_stream(req, Error::FlowControl);
        }

        stream.response_data_received = true;
        stream.recv_buf.push(payload);

        if fin {
            stream.on_remote_fin();
        }

        if stream.claimed &&
            !stream.data_event_armed &&
            !stream.recv_buf.is_empty()
        {
            stream.data_event_armed = true;
            self.events.push_back((req, Event::Data));
        }

        if fin {
            self.maybe_finish(req)?;
        }

        Ok(())
    }

    fn on_headers(
        &mut self, stream_id: u64, headers: Vec<Header>, fin: bool,
    ) -> Result<()> {
        if stream_id == 0 {
            return Err(self.fatal(Error::InvalidFrame));
        }

        let Some(&req) = self.wire_ids.get(&stream_id) else {
            // Replies for streams we already tore down are stale, not a
            // violation: client streams we reset or finished, and pushed
            // streams we refused or cancelled before the peer saw our
            // RST_STREAM.
            if stream_id % 2 == 1 && stream_id < self.next_stream_id {
                return Ok(());
            }

            if stream_id % 2 == 0 && stream_id <= self.last_peer_stream_id {
                return Ok(());
            }

            return Err(self.fatal(Error::InvalidState));
        };

        let Some(stream) = self.streams.get_mut(&req) else {
            return Ok(());
        };

        if stream.on_reply(&headers).is_err() {
            debug!(
                "{} duplicate reply on stream {stream_id}",
                self.trace_id
            );

            return self.reset_stream(req, Error::InvalidState);
        }

        if stream.claimed {
            self.events.push_back((req, Event::Headers {
                list: headers,
                has_body: !fin,
            }));
        }

        if fin {
            stream.on_remote_fin();

            self.maybe_finish(req)?;
        }

        Ok(())
    }

    fn on_rst_stream(&mut self, stream_id: u64, error_code: u32) -> Result<()> {
        let Some(&req) = self.wire_ids.get(&stream_id) else {
            return Ok(());
        };

        let retry = match self.streams.get(&req) {
            Some(stream) =>
                error_code == WireErrorCode::RefusedStream as u32 &&
                    self.state == SessionState::Available &&
                    !stream.retried &&
                    !stream.response_data_received &&
                    stream.send_buf.emitted() == 0,

            None => false,
        };

        if retry {
            debug!(
                "{} stream {stream_id} refused, retrying",
                self.trace_id
            );

            return self.retry_stream(req);
        }

        trace!(
            "{} stream {stream_id} reset by peer err={error_code}",
            self.trace_id
        );

        self.teardown_stream(req, Some(Event::Reset(error_code as u64)))
    }

    fn on_settings(&mut self, entries: SettingsEntries, ack: bool) -> Result<()> {
        if ack {
            return Ok(());
        }

        let settings = Settings::from_entries(&entries);

        self.apply_settings(&settings)?;
        self.peer_settings.merge(&settings);

        // Every non-ack SETTINGS gets exactly one ack.
        self.queue_frame(BAND_CONTROL, &Frame::Settings {
            entries: SettingsEntries::new(),
            ack: true,
        })
    }

    fn on_push_promise(
        &mut self, associated: u64, promised: u64, headers: Vec<Header>,
    ) -> Result<()> {
        if !self.push_enabled {
            return Err(self.fatal(Error::InvalidState));
        }

        // Promised IDs are even and strictly increasing.
        if promised == 0 ||
            promised % 2 != 0 ||
            promised <= self.last_peer_stream_id
        {
            return Err(self.fatal(Error::InvalidState));
        }

        self.last_peer_stream_id = promised;

        if self.state != SessionState::Available {
            return self.refuse_push(promised, WireErrorCode::RefusedStream);
        }

        let assoc_req = match self.wire_ids.get(&associated) {
            Some(&req) if associated % 2 == 1 => Some(req),

            _ => None,
        };

        let Some(assoc_req) = assoc_req else {
            return self.refuse_push(promised, WireErrorCode::RefusedStream);
        };

        let Some(url) = header::url_from_headers(&headers) else {
            return self.refuse_push(promised, WireErrorCode::ProtocolError);
        };

        let Ok(push_url) = url::Url::parse(&url) else {
            return self.refuse_push(promised, WireErrorCode::ProtocolError);
        };

        let proxy_session = self.trusted_proxy.as_deref() ==
            Some(format!("{}:{}", self.origin_host, self.origin_port).as_str());

        if proxy_session {
            // A trusted proxy may push for any origin, but never content
            // that would have been fetched over https.
            if push_url.scheme() == "https" {
                return self.refuse_push(promised, WireErrorCode::RefusedStream);
            }
        } else {
            let assoc_url = self
                .streams
                .get(&assoc_req)
                .and_then(|s| s.url.as_deref())
                .and_then(|u| url::Url::parse(u).ok());

            let same_origin = match &assoc_url {
                Some(a) =>
                    a.scheme() == push_url.scheme() &&
                        a.host_str() == push_url.host_str() &&
                        a.port_or_known_default() ==
                            push_url.port_or_known_default(),

                None =>
                    push_url.scheme() == self.origin_scheme &&
                        push_url.host_str() ==
                            Some(self.origin_host.as_str()) &&
                        push_url.port_or_known_default() ==
                            Some(self.origin_port),
            };

            if !same_origin {
                debug!(
                    "{} refusing cross-origin push {url}",
                    self.trace_id
                );

                return self.refuse_push(promised, WireErrorCode::RefusedStream);
            }
        }

        if self.unclaimed_pushes.contains_key(&url) {
            debug!("{} duplicate push for {url}", self.trace_id);

            return self.refuse_push(promised, WireErrorCode::ProtocolError);
        }

        let req = self.next_request_id;
        self.next_request_id += 1;

        let stream = Stream::new_pushed(
            promised,
            headers,
            Priority::Idle,
            self.local_initial_window,
            url.clone(),
        );

        self.streams.insert(req, stream);
        self.wire_ids.insert(promised, req);
        self.unclaimed_pushes.insert(url.clone(), req);

        debug!(
            "{} accepted push {url} as stream {promised}",
            self.trace_id
        );

        Ok(())
    }

    fn refuse_push(&mut self, promised: u64, code: WireErrorCode) -> Result<()> {
        self.queue_frame(BAND_CONTROL, &Frame::RstStream {
            stream_id: promised,
            error_code: code as u32,
        })
    }

    fn on_goaway(&mut self, last_stream_id: u64, error_code: u32) -> Result<()> {
        debug!(
            "{} goaway last={last_stream_id} err={error_code}",
            self.trace_id
        );

        // Duplicate GOAWAYs are idempotent.
        if self.state != SessionState::Available {
            return Ok(());
        }

        self.state = SessionState::Draining;

        self.events.push_back((0, Event::GoAway));

        // Pending requests never reached the wire.
        for req in self.pending.drain() {
            self.streams.remove(&req);
            self.events.push_back((req, Event::Aborted));
        }

        // Client streams beyond the last-accepted ID were never processed
        // by the peer.
        let doomed: Vec<u64> = self
            .wire_ids
            .iter()
            .filter(|(id, _)| **id > last_stream_id && **id % 2 == 1)
            .map(|(_, req)| *req)
            .collect();

        for req in doomed {
            self.teardown_stream(req, Some(Event::Aborted))?;
        }

        self.maybe_drained();

        Ok(())
    }

    fn on_window_update(&mut self, stream_id: u64, delta: u32) -> Result<()> {
        if stream_id == 0 {
            if delta == 0 {
                return Err(self.fatal(Error::InvalidState));
            }

            if delta as i64 > stream::MAX_WINDOW_SIZE - self.session_send_window
            {
                return Err(self.fatal(Error::FlowControl));
            }

            self.session_send_window += delta as i64;

            return self.resume_stalled();
        }

        let Some(&req) = self.wire_ids.get(&stream_id) else {
            return Ok(());
        };

        if delta == 0 {
            return self.reset_stream(req, Error::FlowControl);
        }

        let Some(stream) = self.streams.get_mut(&req) else {
            return Ok(());
        };

        if stream.increase_send_window(delta).is_err() {
            return self.reset_stream(req, Error::FlowControl);
        }

        self.flush_stream(req)
    }

    fn apply_settings(&mut self, settings: &Settings) -> Result<()> {
        if let Some(v) = settings.max_concurrent_streams {
            self.max_concurrent_streams =
                cmp::min(v as usize, MAX_CONCURRENT_STREAMS_LIMIT);

            trace!(
                "{} max concurrent streams={}",
                self.trace_id,
                self.max_concurrent_streams
            );
        }

        if let Some(v) = settings.initial_window_size {
            if v as i64 <= stream::MAX_WINDOW_SIZE {
                let delta = v as i64 - self.peer_initial_window;
                self.peer_initial_window = v as i64;

                // Applies retroactively to every stream, pending ones
                // included; windows may go negative and stall.
                for stream in self.streams.values_mut() {
                    stream.adjust_send_window(delta);
                }

                if delta > 0 {
                    let active: Vec<u64> =
                        self.wire_ids.values().copied().collect();

                    for req in active {
                        self.flush_stream(req)?;
                    }
                }
            } else {
                debug!(
                    "{} ignoring out-of-range initial window {v}",
                    self.trace_id
                );
            }
        }

        self.process_pending()
    }

    /// Activates pending streams while the concurrency limit allows.
    fn process_pending(&mut self) -> Result<()> {
        loop {
            if self.state != SessionState::Available {
                break;
            }

            let active = self
                .wire_ids
                .keys()
                .filter(|id| **id % 2 == 1)
                .count();

            if active >= self.max_concurrent_streams {
                break;
            }

            let Some(req) = self.pending.pop() else {
                break;
            };

            self.activate_stream(req)?;
        }

        Ok(())
    }

    fn activate_stream(&mut self, req: u64) -> Result<()> {
        let (frame, band) = {
            let Some(stream) = self.streams.get_mut(&req) else {
                return Ok(());
            };

            let id = self.next_stream_id;
            self.next_stream_id += 2;

            stream.activate(id, stream.headers_fin);

            self.wire_ids.insert(id, req);

            trace!(
                "{} activating request {req} as stream {id}",
                self.trace_id
            );

            let frame = Frame::Headers {
                stream_id: id,
                priority: stream.priority.to_wire(),
                headers: stream.request_headers.clone(),
                fin: stream.headers_fin,
            };

            (frame, stream_band(stream.priority))
        };

        self.queue_frame(band, &frame)?;

        // Body bytes may have been queued while the stream was pending.
        self.flush_stream(req)
    }

    /// Emits DATA frames for `req` while flow control allows.
    fn flush_stream(&mut self, req: u64) -> Result<()> {
        loop {
            let (frame, band) = {
                let Some(stream) = self.streams.get_mut(&req) else {
                    return Ok(());
                };

                if !stream.is_active() {
                    return Ok(());
                }

                if !stream.can_emit(self.session_send_window) {
                    // Only a session-window stall goes on the unstall
                    // queue; a stream-window stall resumes via that
                    // stream's own WINDOW_UPDATE.
                    if !stream.send_buf.is_empty() &&
                        stream.send_window() > 0 &&
                        self.session_send_window <= 0
                    {
                        self.unstall.push(stream.priority, req);
                    }

                    return Ok(());
                }

                let band = stream_band(stream.priority);

                if stream.send_buf.is_empty() {
                    // A bare fin consumes no window.
                    stream.on_local_fin();

                    (
                        Frame::Data {
                            stream_id: stream.id,
                            payload: Vec::new(),
                            fin: true,
                        },
                        band,
                    )
                } else {
                    let max = cmp::min(
                        self.max_frame_payload as i64,
                        cmp::min(
                            stream.send_window(),
                            self.session_send_window,
                        ),
                    ) as usize;

                    let Some((chunk, fin)) = stream.send_buf.emit(max) else {
                        return Ok(());
                    };

                    stream.sub_send_window(chunk.len());
                    self.session_send_window -= chunk.len() as i64;

                    if fin {
                        stream.on_local_fin();
                    }

                    (
                        Frame::Data {
                            stream_id: stream.id,
                            payload: chunk,
                            fin,
                        },
                        band,
                    )
                }
            };

            self.queue_frame(band, &frame)?;

            self.maybe_finish(req)?;
        }
    }

    /// Resumes streams stalled on the session window, highest priority
    /// first, until the window runs out again.
    fn resume_stalled(&mut self) -> Result<()> {
        while self.session_send_window > 0 {
            let Some(req) = self.unstall.pop() else {
                break;
            };

            self.flush_stream(req)?;
        }

        Ok(())
    }

    /// Delivers the Finished event once the response is complete and
    /// drained, and reaps the stream once both sides are done with it.
    fn maybe_finish(&mut self, req: u64) -> Result<()> {
        let (freed, done) = {
            let Some(stream) = self.streams.get_mut(&req) else {
                return Ok(());
            };

            if stream.claimed &&
                stream.reply_received() &&
                stream.remote_done() &&
                stream.recv_buf.is_empty() &&
                !stream.finished_delivered
            {
                stream.finished_delivered = true;
                self.events.push_back((req, Event::Finished));
            }

            let mut freed = false;

            if stream.is_closed() && stream.id != 0 {
                // Closing releases the wire ID and its concurrency slot.
                self.wire_ids.remove(&stream.id);
                self.unstall.remove(req);
                stream.id = 0;

                freed = true;
            }

            (freed, stream.is_closed() && stream.finished_delivered)
        };

        if done {
            self.streams.remove(&req);
        }

        if freed {
            self.process_pending()?;
        }

        self.maybe_drained();

        Ok(())
    }

    /// Resets a stream because of a peer violation: a RST_STREAM with the
    /// error's wire code is sent and the caller observes a Reset event.
    fn reset_stream(&mut self, req: u64, error: Error) -> Result<()> {
        let code = error.to_wire() as u32;

        if let Some(stream) = self.streams.get(&req) {
            if stream.id != 0 {
                let frame = Frame::RstStream {
                    stream_id: stream.id,
                    error_code: code,
                };

                self.queue_frame(BAND_CONTROL, &frame)?;
            }
        }

        self.teardown_stream(req, Some(Event::Reset(code as u64)))
    }

    /// Removes a stream and all bookkeeping that points at it.
    ///
    /// Buffered-but-undelivered received bytes are re-credited to the
    /// session window. `event` is delivered only for claimed streams; an
    /// unclaimed push disappears without a trace.
    fn teardown_stream(&mut self, req: u64, event: Option<Event>) -> Result<()> {
        let Some(mut stream) = self.streams.remove(&req) else {
            return Ok(());
        };

        let dropped = stream.reset();
        self.session_consume(dropped)?;

        if stream.id != 0 {
            self.wire_ids.remove(&stream.id);
            self.unstall.remove(req);
        } else {
            self.pending.remove(req);
        }

        if stream.is_push {
            if let Some(url) = &stream.url {
                if self.unclaimed_pushes.get(url) == Some(&req) {
                    self.unclaimed_pushes.remove(url);
                }
            }
        }

        if stream.claimed {
            if let Some(event) = event {
                self.events.push_back((req, event));
            }
        }

        self.process_pending()?;

        self.maybe_drained();

        Ok(())
    }

    /// Re-queues a refused stream under the same request ID; it will get
    /// a fresh wire ID on its next activation.
    fn retry_stream(&mut self, req: u64) -> Result<()> {
        let Some(stream) = self.streams.get_mut(&req) else {
            return Ok(());
        };

        let old_id = stream.id;
        self.wire_ids.remove(&old_id);
        self.unstall.remove(req);

        let headers = std::mem::take(&mut stream.request_headers);
        let send_buf = std::mem::take(&mut stream.send_buf);
        let url = stream.url.take();
        let priority = stream.priority;
        let fin = stream.headers_fin;

        let mut fresh = Stream::new(
            headers,
            priority,
            fin,
            self.peer_initial_window,
            self.local_initial_window,
            url,
        );

        fresh.send_buf = send_buf;
        fresh.retried = true;

        self.streams.insert(req, fresh);
        self.pending.push(priority, req);

        self.process_pending()
    }

    /// Adopts an unclaimed pushed stream for a caller request, replaying
    /// whatever response state already arrived as events.
    fn claim_push(&mut self, req: u64, priority: Priority) -> Result<u64> {
        debug!("{} claiming pushed stream as request {req}", self.trace_id);

        {
            let Some(stream) = self.streams.get_mut(&req) else {
                return Err(Error::InvalidState);
            };

            stream.claimed = true;
            stream.priority = priority;

            if let Some(map) = &stream.response_headers {
                let has_body =
                    !(stream.remote_done() && stream.recv_buf.is_empty());

                self.events.push_back((req, Event::Headers {
                    list: map.to_list(),
                    has_body,
                }));
            }

            if !stream.recv_buf.is_empty() {
                stream.data_event_armed = true;
                self.events.push_back((req, Event::Data));
            }
        }

        self.maybe_finish(req)?;

        Ok(req)
    }

    /// Credits consumed bytes back to the session receive window.
    fn session_consume(&mut self, n: usize) -> Result<()> {
        if n == 0 {
            return Ok(());
        }

        self.session_recv_window += n as i64;
        self.session_unacked += n as i64;

        if self.session_unacked > self.session_init_recv_window / 2 {
            let delta = self.session_unacked as u32;
            self.session_unacked = 0;

            self.queue_frame(BAND_CONTROL, &Frame::WindowUpdate {
                stream_id: 0,
                delta,
            })?;
        }

        Ok(())
    }

    /// A drained session has no reason to stay open.
    fn maybe_drained(&mut self) {
        if self.state == SessionState::Draining && self.wire_ids.is_empty() {
            debug!("{} drained", self.trace_id);

            self.state = SessionState::Closed;
        }
    }

    /// Records a session-fatal error and returns it for propagation.
    fn fatal(&mut self, err: Error) -> Error {
        debug!("{} fatal error: {err:?}", self.trace_id);

        self.shutdown(err);

        err
    }

    fn shutdown(&mut self, err: Error) {
        if self.state == SessionState::Closed {
            return;
        }

        debug!("{} closing session: {err:?}", self.trace_id);

        if !self.goaway_sent {
            self.goaway_sent = true;

            let frame = Frame::GoAway {
                last_stream_id: self.last_peer_stream_id,
                error_code: err.to_wire() as u32,
            };

            let _ = self.queue_frame(BAND_CONTROL, &frame);
        }

        self.state = SessionState::Closed;
        self.error = Some(err);

        for req in self.pending.drain() {
            self.streams.remove(&req);
            self.events.push_back((req, Event::Aborted));
        }

        let active: Vec<u64> = self.wire_ids.values().copied().collect();

        for req in active {
            if let Some(stream) = self.streams.remove(&req) {
                if stream.claimed {
                    self.events.push_back((req, Event::Aborted));
                }
            }
        }

        self.wire_ids.clear();
        self.unclaimed_pushes.clear();
        self.unstall = UnstallQueue::new();
        self.streams.clear();
    }

    /// Serializes a frame onto the write queue.
    fn queue_frame(&mut self, band: usize, frame: &Frame) -> Result<()> {
        trace!("{} tx frm {frame:?}", self.trace_id);

        let mut buf = vec![0; frame.wire_len()];

        let mut b = octets::OctetsMut::with_slice(&mut buf);
        frame.to_bytes(&mut b)?;

        self.writes.push(band, buf);

        Ok(())
    }
}

mod error;
pub mod frame;
mod header;
pub mod pool;
mod scheduler;
pub mod settings;
mod stream;

pub mod testing;

#[cfg(test)]
mod tests {
    use super::*;

    use crate::frame::Frame;
    use crate::settings::SETTINGS_INITIAL_WINDOW_SIZE;
    use crate::settings::SETTINGS_MAX_CONCURRENT_STREAMS;
    use crate::testing;

    use rstest::rstest;

    fn new_session() -> Session {
        testing::new_session()
    }

    /// Feeds serialized frames into the session as transport bytes.
    fn recv_frames(session: &mut Session, frames: &[Frame]) {
        let buf = testing::encode_frames(frames);
        session.recv(&buf).unwrap();
    }

    fn settings_frame(entries: &[(u16, u32)]) -> Frame {
        let mut e = SettingsEntries::new();
        e.extend_from_slice(entries);

        Frame::Settings {
            entries: e,
            ack: false,
        }
    }

    fn reply_headers(stream_id: u64, fin: bool) -> Frame {
        Frame::Headers {
            stream_id,
            priority: 0,
            headers: testing::response_headers(),
            fin,
        }
    }

    #[test]
    fn get_round_trip() {
        let mut s = new_session();

        let req = s
            .request_stream(
                &testing::get_request_headers("/"),
                Priority::Medium,
                true,
            )
            .unwrap();

        let frames = testing::drain_frames(&mut s);

        // Initial SETTINGS, then the request headers with fin.
        assert!(matches!(frames[0], Frame::Settings { ack: false, .. }));
        assert!(matches!(
            frames[1],
            Frame::Headers {
                stream_id: 1,
                fin: true,
                ..
            }
        ));

        recv_frames(&mut s, &[reply_headers(1, false), Frame::Data {
            stream_id: 1,
            payload: b"hello world".to_vec(),
            fin: true,
        }]);

        assert_eq!(
            s.poll(),
            Ok((req, Event::Headers {
                list: testing::response_headers(),
                has_body: true,
            }))
        );
        assert_eq!(s.poll(), Ok((req, Event::Data)));

        let mut body = [0; 64];
        assert_eq!(s.recv_body(req, &mut body), Ok(11));
        assert_eq!(&body[..11], b"hello world");

        assert_eq!(s.poll(), Ok((req, Event::Finished)));
        assert_eq!(s.poll(), Err(Error::Done));

        // The stream is gone.
        assert_eq!(s.recv_body(req, &mut body), Err(Error::Done));
        assert_eq!(s.active_stream_count(), 0);
    }

    #[test]
    fn response_split_across_reads() {
        let mut s = new_session();

        let req = s
            .request_stream(
                &testing::get_request_headers("/"),
                Priority::Medium,
                true,
            )
            .unwrap();

        let buf = testing::encode_frames(&[reply_headers(1, false), Frame::Data {
            stream_id: 1,
            payload: b"abc".to_vec(),
            fin: true,
        }]);

        // Deliver the reply one byte at a time.
        for byte in &buf {
            s.recv(std::slice::from_ref(byte)).unwrap();
        }

        assert!(matches!(s.poll(), Ok((r, Event::Headers { .. })) if r == req));
        assert_eq!(s.poll(), Ok((req, Event::Data)));
    }

    #[test]
    fn partial_send_preserves_byte_order() {
        let mut s = new_session();

        s.request_stream(
            &testing::get_request_headers("/"),
            Priority::Medium,
            true,
        )
        .unwrap();

        // Drain through a 3-byte window and compare against a full drain.
        let mut dribbled = Vec::new();
        let mut out = [0; 3];

        while let Ok(n) = s.send(&mut out) {
            dribbled.extend_from_slice(&out[..n]);
        }

        let frames = testing::decode_frames(&dribbled);
        assert!(matches!(frames[0], Frame::Settings { .. }));
        assert!(matches!(frames[1], Frame::Headers { stream_id: 1, .. }));
    }

    #[test]
    fn priority_orders_activation() {
        let mut s = new_session();

        recv_frames(&mut s, &[settings_frame(&[(
            SETTINGS_MAX_CONCURRENT_STREAMS,
            1,
        )])]);

        let low = s
            .request_stream(
                &testing::get_request_headers("/low"),
                Priority::Low,
                true,
            )
            .unwrap();

        s.request_stream(
            &testing::get_request_headers("/medium"),
            Priority::Medium,
            true,
        )
        .unwrap();

        s.request_stream(
            &testing::get_request_headers("/highest"),
            Priority::Highest,
            true,
        )
        .unwrap();

        // Only the first request went out.
        let frames = testing::drain_frames(&mut s);
        let headers: Vec<&Frame> = frames
            .iter()
            .filter(|f| matches!(f, Frame::Headers { .. }))
            .collect();
        assert_eq!(headers.len(), 1);

        // Finishing it activates the highest-priority waiter, not the
        // earlier-queued medium one.
        recv_frames(&mut s, &[reply_headers(1, true)]);

        assert_eq!(s.poll(), Ok((low, Event::Headers {
            list: testing::response_headers(),
            has_body: false,
        })));
        assert_eq!(s.poll(), Ok((low, Event::Finished)));

        let frames = testing::drain_frames(&mut s);

        match &frames[..] {
            [Frame::Headers {
                stream_id,
                headers,
                ..
            }] => {
                // Wire IDs stay monotonic even though activation jumped
                // the queue.
                assert_eq!(*stream_id, 3);
                assert_eq!(
                    header::url_from_headers(headers).as_deref(),
                    Some("https://www.example.org/highest")
                );
            },

            other => panic!("unexpected frames: {other:?}"),
        }
    }

    #[test]
    fn settings_acked_exactly_once() {
        let mut s = new_session();

        recv_frames(&mut s, &[
            settings_frame(&[(SETTINGS_MAX_CONCURRENT_STREAMS, 5)]),
            settings_frame(&[(SETTINGS_INITIAL_WINDOW_SIZE, 1024)]),
        ]);

        let frames = testing::drain_frames(&mut s);

        let acks = frames
            .iter()
            .filter(|f| matches!(f, Frame::Settings { ack: true, .. }))
            .count();

        assert_eq!(acks, 2);
        assert_eq!(s.max_concurrent_streams(), 5);
    }

    #[test]
    fn concurrency_limit_is_clamped() {
        let mut s = new_session();

        recv_frames(&mut s, &[settings_frame(&[(
            SETTINGS_MAX_CONCURRENT_STREAMS,
            100_000,
        )])]);

        assert_eq!(s.max_concurrent_streams(), MAX_CONCURRENT_STREAMS_LIMIT);
    }

    #[test]
    fn stream_window_limits_data() {
        let mut s = new_session();

        // Peer shrinks the per-stream window before the request starts.
        recv_frames(&mut s, &[settings_frame(&[(
            SETTINGS_INITIAL_WINDOW_SIZE,
            4,
        )])]);

        let req = s
            .request_stream(
                &testing::post_request_headers("/upload"),
                Priority::Medium,
                false,
            )
            .unwrap();

        s.send_body(req, b"abcdefgh", true).unwrap();

        let frames = testing::drain_frames(&mut s);
        let data: Vec<&Frame> = frames
            .iter()
            .filter(|f| matches!(f, Frame::Data { .. }))
            .collect();

        match data[..] {
            [Frame::Data { payload, fin, .. }] => {
                assert_eq!(payload, b"abcd");
                assert!(!fin);
            },

            _ => panic!("expected exactly one DATA frame: {data:?}"),
        }

        // The peer reopens the window; the rest goes out in order.
        recv_frames(&mut s, &[Frame::WindowUpdate {
            stream_id: 1,
            delta: 4,
        }]);

        let frames = testing::drain_frames(&mut s);

        match &frames[..] {
            [Frame::Data { payload, fin, .. }] => {
                assert_eq!(payload, b"efgh");
                assert!(*fin);
            },

            other => panic!("unexpected frames: {other:?}"),
        }
    }

    #[test]
    fn session_window_stall_and_resume() {
        let mut s = new_session();

        // Per-stream window larger than the session window, so the
        // session window is the binding constraint.
        recv_frames(&mut s, &[settings_frame(&[(
            SETTINGS_INITIAL_WINDOW_SIZE,
            100_000,
        )])]);

        let req = s
            .request_stream(
                &testing::post_request_headers("/upload"),
                Priority::Medium,
                false,
            )
            .unwrap();

        let body = vec![7u8; 70_000];
        s.send_body(req, &body, true).unwrap();

        let sent: usize = testing::drain_frames(&mut s)
            .iter()
            .filter_map(|f| match f {
                Frame::Data { payload, .. } => Some(payload.len()),
                _ => None,
            })
            .sum();

        assert_eq!(sent, DEFAULT_INITIAL_WINDOW_SIZE as usize);

        // Replenishing the session window resumes the stalled stream.
        recv_frames(&mut s, &[Frame::WindowUpdate {
            stream_id: 0,
            delta: 10_000,
        }]);

        let frames = testing::drain_frames(&mut s);

        let resumed: usize = frames
            .iter()
            .filter_map(|f| match f {
                Frame::Data { payload, .. } => Some(payload.len()),
                _ => None,
            })
            .sum();

        assert_eq!(resumed, 70_000 - DEFAULT_INITIAL_WINDOW_SIZE as usize);

        assert!(matches!(
            frames.last(),
            Some(Frame::Data { fin: true, .. })
        ));
    }

    #[test]
    fn window_overflow_resets_stream() {
        let mut s = new_session();

        let req = s
            .request_stream(
                &testing::post_request_headers("/upload"),
                Priority::Medium,
                false,
            )
            .unwrap();

        recv_frames(&mut s, &[Frame::WindowUpdate {
            stream_id: 1,
            delta: i32::MAX as u32,
        }]);

        let frames = testing::drain_frames(&mut s);

        assert!(frames.iter().any(|f| matches!(
            f,
            Frame::RstStream {
                stream_id: 1,
                error_code,
            } if *error_code == WireErrorCode::FlowControlError as u32
        )));

        assert_eq!(
            s.poll(),
            Ok((req, Event::Reset(WireErrorCode::FlowControlError as u64)))
        );

        // The session itself survives.
        assert!(s.is_available());
    }

    #[test]
    fn zero_delta_on_session_window_is_fatal() {
        let mut s = new_session();

        let res = s.recv(&testing::encode_frames(&[Frame::WindowUpdate {
            stream_id: 0,
            delta: 0,
        }]));

        assert!(res.is_err());
        assert!(s.is_closed());

        // The session announced the failure before dying.
        let frames = testing::drain_frames(&mut s);
        assert!(frames.iter().any(|f| matches!(f, Frame::GoAway { .. })));
    }

    #[test]
    fn zero_delta_on_stream_resets_stream() {
        let mut s = new_session();

        s.request_stream(
            &testing::get_request_headers("/"),
            Priority::Medium,
            true,
        )
        .unwrap();

        recv_frames(&mut s, &[Frame::WindowUpdate {
            stream_id: 1,
            delta: 0,
        }]);

        assert!(s.is_available());
        assert_eq!(s.active_stream_count(), 0);
    }

    #[test]
    fn stream_recv_overrun_resets_stream() {
        let mut config = Config::new().unwrap();
        config.set_initial_window_size(8);

        let mut s = Session::connect(
            "https://www.example.org",
            &config,
            TransportSecurity::modern(),
            None,
        )
        .unwrap();

        let req = s
            .request_stream(
                &testing::get_request_headers("/"),
                Priority::Medium,
                true,
            )
            .unwrap();

        recv_frames(&mut s, &[reply_headers(1, false), Frame::Data {
            stream_id: 1,
            payload: vec![0; 9],
            fin: false,
        }]);

        let frames = testing::drain_frames(&mut s);

        assert!(frames.iter().any(|f| matches!(
            f,
            Frame::RstStream {
                stream_id: 1,
                error_code,
            } if *error_code == WireErrorCode::FlowControlError as u32
        )));

        // Headers made it out before the violation.
        assert!(matches!(s.poll(), Ok((r, Event::Headers { .. })) if r == req));
        assert_eq!(
            s.poll(),
            Ok((req, Event::Reset(WireErrorCode::FlowControlError as u64)))
        );
    }

    #[test]
    fn consumed_bytes_produce_window_update() {
        let mut config = Config::new().unwrap();
        config.set_initial_window_size(8);

        let mut s = Session::connect(
            "https://www.example.org",
            &config,
            TransportSecurity::modern(),
            None,
        )
        .unwrap();

        let req = s
            .request_stream(
                &testing::get_request_headers("/"),
                Priority::Medium,
                true,
            )
            .unwrap();

        recv_frames(&mut s, &[reply_headers(1, false), Frame::Data {
            stream_id: 1,
            payload: b"abcdef".to_vec(),
            fin: false,
        }]);

        let mut body = [0; 16];
        assert_eq!(s.recv_body(req, &mut body), Ok(6));

        // Six consumed bytes cross half of the 8-byte initial window.
        let frames = testing::drain_frames(&mut s);

        assert!(frames.iter().any(|f| matches!(
            f,
            Frame::WindowUpdate {
                stream_id: 1,
                delta: 6,
            }
        )));
    }

    #[test]
    fn settings_decrease_stalls_until_update() {
        let mut s = new_session();

        let req = s
            .request_stream(
                &testing::post_request_headers("/upload"),
                Priority::Medium,
                false,
            )
            .unwrap();

        s.send_body(req, b"hello", false).unwrap();
        testing::drain_frames(&mut s);

        // Window becomes 3 - 5 = -2 retroactively.
        recv_frames(&mut s, &[settings_frame(&[(
            SETTINGS_INITIAL_WINDOW_SIZE,
            3,
        )])]);

        s.send_body(req, b"more", false).unwrap();

        let frames = testing::drain_frames(&mut s);
        assert!(!frames.iter().any(|f| matches!(f, Frame::Data { .. })));

        // A 10-byte update brings the window to 8; everything flows.
        recv_frames(&mut s, &[Frame::WindowUpdate {
            stream_id: 1,
            delta: 10,
        }]);

        let frames = testing::drain_frames(&mut s);

        assert!(frames.iter().any(|f| matches!(
            f,
            Frame::Data { payload, .. } if payload == b"more"
        )));
    }

    #[test]
    fn out_of_range_initial_window_ignored() {
        let mut s = new_session();

        recv_frames(&mut s, &[settings_frame(&[(
            SETTINGS_INITIAL_WINDOW_SIZE,
            i32::MAX as u32 + 1,
        )])]);

        assert!(s.is_available());

        // New streams still get the default window: an 8 KiB body fits.
        let req = s
            .request_stream(
                &testing::post_request_headers("/upload"),
                Priority::Medium,
                false,
            )
            .unwrap();

        s.send_body(req, &vec![0; 8192], true).unwrap();

        let sent: usize = testing::drain_frames(&mut s)
            .iter()
            .filter_map(|f| match f {
                Frame::Data { payload, .. } => Some(payload.len()),
                _ => None,
            })
            .sum();

        assert_eq!(sent, 8192);
    }

    #[test]
    fn duplicate_reply_resets_stream() {
        let mut s = new_session();

        let req = s
            .request_stream(
                &testing::get_request_headers("/"),
                Priority::Medium,
                true,
            )
            .unwrap();

        recv_frames(&mut s, &[
            reply_headers(1, false),
            reply_headers(1, false),
        ]);

        let frames = testing::drain_frames(&mut s);

        assert!(frames.iter().any(|f| matches!(
            f,
            Frame::RstStream {
                stream_id: 1,
                error_code,
            } if *error_code == WireErrorCode::ProtocolError as u32
        )));

        assert!(matches!(s.poll(), Ok((r, Event::Headers { .. })) if r == req));
        assert_eq!(
            s.poll(),
            Ok((req, Event::Reset(WireErrorCode::ProtocolError as u64)))
        );
    }

    #[test]
    fn data_before_reply_resets_stream() {
        let mut s = new_session();

        s.request_stream(
            &testing::get_request_headers("/"),
            Priority::Medium,
            true,
        )
        .unwrap();

        recv_frames(&mut s, &[Frame::Data {
            stream_id: 1,
            payload: b"early".to_vec(),
            fin: false,
        }]);

        let frames = testing::drain_frames(&mut s);

        assert!(frames.iter().any(|f| matches!(
            f,
            Frame::RstStream { stream_id: 1, .. }
        )));
    }

    #[test]
    fn frames_for_unknown_streams_ignored() {
        let mut s = new_session();

        recv_frames(&mut s, &[
            Frame::Data {
                stream_id: 99,
                payload: b"stray".to_vec(),
                fin: false,
            },
            Frame::WindowUpdate {
                stream_id: 99,
                delta: 100,
            },
            Frame::RstStream {
                stream_id: 99,
                error_code: 8,
            },
        ]);

        assert!(s.is_available());
        assert_eq!(s.poll(), Err(Error::Done));
    }

    #[test]
    fn refused_stream_retries_invisibly() {
        let mut s = new_session();

        let req = s
            .request_stream(
                &testing::get_request_headers("/"),
                Priority::Medium,
                true,
            )
            .unwrap();

        testing::drain_frames(&mut s);

        recv_frames(&mut s, &[Frame::RstStream {
            stream_id: 1,
            error_code: WireErrorCode::RefusedStream as u32,
        }]);

        // No event surfaced; the request went out again under a new
        // wire ID.
        assert_eq!(s.poll(), Err(Error::Done));

        let frames = testing::drain_frames(&mut s);
        assert!(matches!(
            frames[..],
            [Frame::Headers { stream_id: 3, .. }]
        ));

        // A second refusal is surfaced.
        recv_frames(&mut s, &[Frame::RstStream {
            stream_id: 3,
            error_code: WireErrorCode::RefusedStream as u32,
        }]);

        assert_eq!(
            s.poll(),
            Ok((req, Event::Reset(WireErrorCode::RefusedStream as u64)))
        );
    }

    #[test]
    fn refusal_after_response_data_is_not_retried() {
        let mut s = new_session();

        let req = s
            .request_stream(
                &testing::get_request_headers("/"),
                Priority::Medium,
                true,
            )
            .unwrap();

        recv_frames(&mut s, &[
            reply_headers(1, false),
            Frame::Data {
                stream_id: 1,
                payload: b"partial".to_vec(),
                fin: false,
            },
            Frame::RstStream {
                stream_id: 1,
                error_code: WireErrorCode::RefusedStream as u32,
            },
        ]);

        assert!(matches!(s.poll(), Ok((r, Event::Headers { .. })) if r == req));
        assert_eq!(s.poll(), Ok((req, Event::Data)));
        assert_eq!(
            s.poll(),
            Ok((req, Event::Reset(WireErrorCode::RefusedStream as u64)))
        );
    }

    #[test]
    fn goaway_drains_and_aborts() {
        let mut s = new_session();

        recv_frames(&mut s, &[settings_frame(&[(
            SETTINGS_MAX_CONCURRENT_STREAMS,
            2,
        )])]);

        let a = s
            .request_stream(
                &testing::get_request_headers("/a"),
                Priority::Medium,
                true,
            )
            .unwrap();

        let b = s
            .request_stream(
                &testing::get_request_headers("/b"),
                Priority::Medium,
                true,
            )
            .unwrap();

        let c = s
            .request_stream(
                &testing::get_request_headers("/c"),
                Priority::Medium,
                true,
            )
            .unwrap();

        // Streams 1 and 3 are active, c is pending. The peer accepts
        // only stream 1.
        recv_frames(&mut s, &[Frame::GoAway {
            last_stream_id: 1,
            error_code: 0,
        }]);

        assert!(s.is_draining());
        assert_eq!(s.poll(), Ok((0, Event::GoAway)));
        assert_eq!(s.poll(), Ok((c, Event::Aborted)));
        assert_eq!(s.poll(), Ok((b, Event::Aborted)));

        // New requests are refused while draining.
        assert_eq!(
            s.request_stream(
                &testing::get_request_headers("/d"),
                Priority::Medium,
                true,
            ),
            Err(Error::GoAway)
        );

        // The accepted stream runs to completion, then the session is
        // done.
        recv_frames(&mut s, &[reply_headers(1, true)]);

        assert!(matches!(s.poll(), Ok((r, Event::Headers { .. })) if r == a));
        assert_eq!(s.poll(), Ok((a, Event::Finished)));

        assert!(s.is_closed());
    }

    #[test]
    fn duplicate_goaway_is_idempotent() {
        let mut s = new_session();

        let req = s
            .request_stream(
                &testing::get_request_headers("/"),
                Priority::Medium,
                true,
            )
            .unwrap();

        let goaway = Frame::GoAway {
            last_stream_id: 0,
            error_code: 0,
        };

        recv_frames(&mut s, &[goaway.clone(), goaway]);

        // One GoAway event and one abort, no matter how many GOAWAY
        // frames arrive.
        assert_eq!(s.poll(), Ok((0, Event::GoAway)));
        assert_eq!(s.poll(), Ok((req, Event::Aborted)));
        assert_eq!(s.poll(), Err(Error::Done));
    }

    #[test]
    fn push_same_origin_accept_claim() {
        let mut s = new_session();

        let _assoc = s
            .request_stream(
                &testing::get_request_headers("/"),
                Priority::Medium,
                true,
            )
            .unwrap();

        recv_frames(&mut s, &[Frame::PushPromise {
            stream_id: 1,
            promised_stream_id: 2,
            headers: testing::push_headers(
                "https",
                "www.example.org",
                "/style.css",
            ),
        }]);

        assert_eq!(s.active_stream_count(), 2);

        // Response arrives before anyone asks for the resource; nothing
        // is observable yet.
        recv_frames(&mut s, &[reply_headers(2, false), Frame::Data {
            stream_id: 2,
            payload: b"body".to_vec(),
            fin: true,
        }]);

        assert_eq!(s.poll(), Err(Error::Done));

        // A request for the pushed URL adopts the stream, with no new
        // frames emitted.
        testing::drain_frames(&mut s);

        let req = s
            .request_stream(
                &testing::get_request_headers("/style.css"),
                Priority::Medium,
                true,
            )
            .unwrap();

        let frames = testing::drain_frames(&mut s);
        assert!(frames.is_empty());

        assert_eq!(s.poll(), Ok((req, Event::Headers {
            list: testing::response_headers(),
            has_body: true,
        })));
        assert_eq!(s.poll(), Ok((req, Event::Data)));

        let mut body = [0; 16];
        assert_eq!(s.recv_body(req, &mut body), Ok(4));
        assert_eq!(&body[..4], b"body");

        assert_eq!(s.poll(), Ok((req, Event::Finished)));
    }

    #[test]
    fn push_cross_origin_refused() {
        let mut s = new_session();

        s.request_stream(
            &testing::get_request_headers("/"),
            Priority::Medium,
            true,
        )
        .unwrap();

        recv_frames(&mut s, &[Frame::PushPromise {
            stream_id: 1,
            promised_stream_id: 2,
            headers: testing::push_headers(
                "https",
                "evil.example.org",
                "/style.css",
            ),
        }]);

        let frames = testing::drain_frames(&mut s);

        assert!(frames.iter().any(|f| matches!(
            f,
            Frame::RstStream {
                stream_id: 2,
                error_code,
            } if *error_code == WireErrorCode::RefusedStream as u32
        )));

        assert_eq!(s.active_stream_count(), 1);
    }

    #[test]
    fn late_frames_on_refused_push_ignored() {
        let mut s = new_session();

        let req = s
            .request_stream(
                &testing::get_request_headers("/"),
                Priority::Medium,
                true,
            )
            .unwrap();

        recv_frames(&mut s, &[Frame::PushPromise {
            stream_id: 1,
            promised_stream_id: 2,
            headers: testing::push_headers(
                "https",
                "evil.example.org",
                "/style.css",
            ),
        }]);

        testing::drain_frames(&mut s);

        // The peer may have HEADERS and DATA for the promised stream in
        // flight before it sees our RST_STREAM. They are stale, not a
        // violation.
        recv_frames(&mut s, &[reply_headers(2, false), Frame::Data {
            stream_id: 2,
            payload: b"late".to_vec(),
            fin: true,
        }]);

        assert!(s.is_available());
        assert_eq!(s.poll(), Err(Error::Done));

        // The client stream is unaffected.
        recv_frames(&mut s, &[reply_headers(1, true)]);

        assert!(matches!(s.poll(), Ok((r, Event::Headers { .. })) if r == req));
        assert_eq!(s.poll(), Ok((req, Event::Finished)));
    }

    #[test]
    fn push_duplicate_url_reset() {
        let mut s = new_session();

        s.request_stream(
            &testing::get_request_headers("/"),
            Priority::Medium,
            true,
        )
        .unwrap();

        let push = testing::push_headers("https", "www.example.org", "/a.js");

        recv_frames(&mut s, &[
            Frame::PushPromise {
                stream_id: 1,
                promised_stream_id: 2,
                headers: push.clone(),
            },
            Frame::PushPromise {
                stream_id: 1,
                promised_stream_id: 4,
                headers: push,
            },
        ]);

        let frames = testing::drain_frames(&mut s);

        assert!(frames.iter().any(|f| matches!(
            f,
            Frame::RstStream {
                stream_id: 4,
                error_code,
            } if *error_code == WireErrorCode::ProtocolError as u32
        )));

        // The first push survives.
        assert_eq!(s.active_stream_count(), 2);
    }

    #[test]
    fn push_without_associated_stream_refused() {
        let mut s = new_session();

        recv_frames(&mut s, &[Frame::PushPromise {
            stream_id: 11,
            promised_stream_id: 2,
            headers: testing::push_headers(
                "https",
                "www.example.org",
                "/a.js",
            ),
        }]);

        let frames = testing::drain_frames(&mut s);

        assert!(frames.iter().any(|f| matches!(
            f,
            Frame::RstStream {
                stream_id: 2,
                error_code,
            } if *error_code == WireErrorCode::RefusedStream as u32
        )));
    }

    #[test]
    fn push_stale_promised_id_is_fatal() {
        let mut s = new_session();

        s.request_stream(
            &testing::get_request_headers("/"),
            Priority::Medium,
            true,
        )
        .unwrap();

        let push = testing::push_headers("https", "www.example.org", "/a.js");

        recv_frames(&mut s, &[Frame::PushPromise {
            stream_id: 1,
            promised_stream_id: 4,
            headers: push.clone(),
        }]);

        // Promised IDs must increase; going back to 2 is fatal.
        let res = s.recv(&testing::encode_frames(&[Frame::PushPromise {
            stream_id: 1,
            promised_stream_id: 2,
            headers: push,
        }]));

        assert!(res.is_err());
        assert!(s.is_closed());
    }

    #[test]
    fn trusted_proxy_may_push_cross_origin() {
        let mut config = Config::new().unwrap();
        config.set_trusted_proxy("proxy.example.org:443");

        let mut s = Session::connect(
            "https://proxy.example.org",
            &config,
            TransportSecurity::modern(),
            None,
        )
        .unwrap();

        s.request_stream(
            &[
                Header::new(b":method", b"GET"),
                Header::new(b":scheme", b"http"),
                Header::new(b":authority", b"proxy.example.org"),
                Header::new(b":path", b"/"),
            ],
            Priority::Medium,
            true,
        )
        .unwrap();

        // Cross-origin, but plain http: allowed through the proxy.
        recv_frames(&mut s, &[Frame::PushPromise {
            stream_id: 1,
            promised_stream_id: 2,
            headers: testing::push_headers(
                "http",
                "other.example.org",
                "/a.js",
            ),
        }]);

        assert_eq!(s.active_stream_count(), 2);

        // Secure content must not come from a proxy push.
        recv_frames(&mut s, &[Frame::PushPromise {
            stream_id: 1,
            promised_stream_id: 4,
            headers: testing::push_headers(
                "https",
                "other.example.org",
                "/b.js",
            ),
        }]);

        let frames = testing::drain_frames(&mut s);

        assert!(frames.iter().any(|f| matches!(
            f,
            Frame::RstStream {
                stream_id: 4,
                error_code,
            } if *error_code == WireErrorCode::RefusedStream as u32
        )));
    }

    #[test]
    fn cancel_active_stream() {
        let mut s = new_session();

        let req = s
            .request_stream(
                &testing::get_request_headers("/"),
                Priority::Medium,
                true,
            )
            .unwrap();

        testing::drain_frames(&mut s);

        s.cancel(req).unwrap();

        let frames = testing::drain_frames(&mut s);

        assert!(frames.iter().any(|f| matches!(
            f,
            Frame::RstStream {
                stream_id: 1,
                error_code,
            } if *error_code == WireErrorCode::Cancel as u32
        )));

        assert_eq!(s.poll(), Err(Error::Done));
        assert_eq!(s.active_stream_count(), 0);

        // Late server frames for the cancelled stream are ignored.
        recv_frames(&mut s, &[reply_headers(1, true)]);
        assert_eq!(s.poll(), Err(Error::Done));
    }

    #[test]
    fn cancel_pending_stream_has_no_wire_effect() {
        let mut s = new_session();

        recv_frames(&mut s, &[settings_frame(&[(
            SETTINGS_MAX_CONCURRENT_STREAMS,
            1,
        )])]);

        s.request_stream(
            &testing::get_request_headers("/a"),
            Priority::Medium,
            true,
        )
        .unwrap();

        let pending = s
            .request_stream(
                &testing::get_request_headers("/b"),
                Priority::Medium,
                true,
            )
            .unwrap();

        testing::drain_frames(&mut s);

        s.cancel(pending).unwrap();

        assert!(testing::drain_frames(&mut s).is_empty());

        // Completing the active stream must not resurrect the cancelled
        // one.
        recv_frames(&mut s, &[reply_headers(1, true)]);

        let frames = testing::drain_frames(&mut s);
        assert!(!frames.iter().any(|f| matches!(f, Frame::Headers { .. })));
    }

    #[test]
    fn close_aborts_everything() {
        let mut s = new_session();

        let req = s
            .request_stream(
                &testing::get_request_headers("/"),
                Priority::Medium,
                true,
            )
            .unwrap();

        s.close(Error::TransportError);

        assert!(s.is_closed());
        assert_eq!(s.error(), Some(Error::TransportError));
        assert_eq!(s.poll(), Ok((req, Event::Aborted)));

        let frames = testing::drain_frames(&mut s);
        assert!(frames.iter().any(|f| matches!(
            f,
            Frame::GoAway { error_code, .. }
                if *error_code == WireErrorCode::InternalError as u32
        )));

        assert_eq!(
            s.request_stream(
                &testing::get_request_headers("/"),
                Priority::Medium,
                true,
            ),
            Err(Error::InvalidState)
        );
    }

    #[rstest]
    #[case(TlsVersion::Tls12, 0x1301, true)]
    #[case(TlsVersion::Tls13, 0xc02f, true)]
    #[case(TlsVersion::Tls11, 0x1301, false)]
    #[case(TlsVersion::Ssl3, 0x1301, false)]
    #[case(TlsVersion::Tls13, 0x0005, false)]
    #[case(TlsVersion::Tls13, 0x0000, false)]
    fn transport_adequacy(
        #[case] version: TlsVersion, #[case] cipher_suite: u16,
        #[case] adequate: bool,
    ) {
        assert_eq!(
            TransportSecurity::new(version, cipher_suite)
                .is_adequate(TlsVersion::Tls12),
            adequate
        );
    }

    #[test]
    fn inadequate_security_refused() {
        let config = Config::new().unwrap();

        let res = Session::connect(
            "https://www.example.org",
            &config,
            TransportSecurity::legacy(),
            None,
        );

        assert_eq!(res.err(), Some(Error::InadequateSecurity));

        // A modern version with a banned cipher is just as inadequate.
        let res = Session::connect(
            "https://www.example.org",
            &config,
            TransportSecurity::new(TlsVersion::Tls13, 0x0004),
            None,
        );

        assert_eq!(res.err(), Some(Error::InadequateSecurity));
    }

    #[test]
    fn post_body_buffered_while_pending() {
        let mut s = new_session();

        recv_frames(&mut s, &[settings_frame(&[(
            SETTINGS_MAX_CONCURRENT_STREAMS,
            1,
        )])]);

        s.request_stream(
            &testing::get_request_headers("/a"),
            Priority::Medium,
            true,
        )
        .unwrap();

        let post = s
            .request_stream(
                &testing::post_request_headers("/upload"),
                Priority::Medium,
                false,
            )
            .unwrap();

        // Body written before the stream ever activates.
        s.send_body(post, b"payload", true).unwrap();

        testing::drain_frames(&mut s);

        recv_frames(&mut s, &[reply_headers(1, true)]);

        let frames = testing::drain_frames(&mut s);

        let mut saw_headers = false;
        let mut saw_data = false;

        for frame in &frames {
            match frame {
                Frame::Headers { stream_id: 3, .. } => saw_headers = true,

                Frame::Data {
                    stream_id: 3,
                    payload,
                    fin: true,
                } => {
                    assert!(saw_headers, "DATA before HEADERS");
                    assert_eq!(payload, b"payload");
                    saw_data = true;
                },

                _ => (),
            }
        }

        assert!(saw_data);
    }
}
