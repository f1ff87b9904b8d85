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

use crate::header::Header;
use crate::header::HeaderMap;
use crate::scheduler::Priority;

use crate::Error;
use crate::Result;

pub use recv_buf::RecvBuf;
pub use send_buf::SendBuf;

/// The maximum value a flow-control window can reach (31-bit signed range).
pub const MAX_WINDOW_SIZE: i64 = i32::MAX as i64;

/// A stream's lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Created but not yet activated (no wire ID, nothing sent).
    Idle,

    /// Request headers sent, both directions open.
    Open,

    /// The local side sent its fin; only receiving remains.
    HalfClosedLocal,

    /// The remote side sent its fin; only sending remains.
    HalfClosedRemote,

    /// Both sides finished, or the stream was reset.
    Closed,
}

/// Per-request stream state: header assembly, body buffering, and
/// flow-control windows.
pub struct Stream {
    /// Wire stream ID; 0 until the stream is activated.
    pub id: u64,

    pub priority: Priority,

    state: State,

    /// Send window. May legitimately go negative after a retroactive
    /// SETTINGS_INITIAL_WINDOW_SIZE decrease; sending is blocked whenever
    /// it is not positive.
    send_window: i64,

    recv_window: i64,

    init_recv_window: i64,

    /// Bytes consumed by the caller but not yet returned to the peer via
    /// WINDOW_UPDATE.
    unacked_recv_bytes: i64,

    pub request_headers: Vec<Header>,

    pub response_headers: Option<HeaderMap>,

    pub recv_buf: RecvBuf,

    pub send_buf: SendBuf,

    /// Whether this stream was created by a server push.
    pub is_push: bool,

    /// The request's absolute URL (always present for pushed streams).
    pub url: Option<String>,

    local_fin_sent: bool,

    remote_fin_received: bool,

    reply_received: bool,

    /// Whether any response DATA was received; gates the transparent
    /// REFUSED_STREAM retry.
    pub response_data_received: bool,

    /// Whether this request was already retried after a REFUSED_STREAM.
    pub retried: bool,

    /// Whether a Data event has been delivered for the currently buffered
    /// bytes; re-armed when the buffer drains.
    pub data_event_armed: bool,

    /// Whether the request headers carry the local fin (no request body).
    pub headers_fin: bool,

    /// Pushed streams are unclaimed until a client request matches their
    /// URL; no events are delivered for an unclaimed stream.
    pub claimed: bool,

    /// Whether the Finished event was already delivered.
    pub finished_delivered: bool,
}

impl Stream {
    pub fn new(
        request_headers: Vec<Header>, priority: Priority, fin: bool,
        send_window: i64, recv_window: i64, url: Option<String>,
    ) -> Stream {
        Stream {
            id: 0,
            priority,
            state: State::Idle,
            send_window,
            recv_window,
            init_recv_window: recv_window,
            unacked_recv_bytes: 0,
            request_headers,
            response_headers: None,
            recv_buf: RecvBuf::new(),
            send_buf: SendBuf::new(),
            is_push: false,
            url,
            local_fin_sent: false,
            remote_fin_received: false,
            reply_received: false,
            response_data_received: false,
            retried: false,
            data_event_armed: false,
            headers_fin: fin,
            claimed: true,
            finished_delivered: false,
        }
    }

    /// Creates a server-pushed stream, already activated under `id`.
    ///
    /// The local side never sends on a pushed stream, so it starts out
    /// half-closed locally.
    pub fn new_pushed(
        id: u64, promise_headers: Vec<Header>, priority: Priority,
        recv_window: i64, url: String,
    ) -> Stream {
        let mut stream = Stream::new(
            promise_headers,
            priority,
            false,
            0,
            recv_window,
            Some(url),
        );

        stream.id = id;
        stream.is_push = true;
        stream.state = State::HalfClosedLocal;
        stream.local_fin_sent = true;
        stream.claimed = false;

        stream
    }

    /// Activates the stream under the allocated wire ID.
    ///
    /// `fin` indicates the request headers carry the end of the local side
    /// (no request body).
    pub fn activate(&mut self, id: u64, fin: bool) {
        debug_assert_eq!(self.state, State::Idle);

        self.id = id;
        self.state = State::Open;

        if fin {
            self.on_local_fin();
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.id != 0 && self.state != State::Closed
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    pub fn reply_received(&self) -> bool {
        self.reply_received
    }

    pub fn remote_done(&self) -> bool {
        self.remote_fin_received
    }

    /// Records the initial response headers.
    ///
    /// A second reply on the same stream is a protocol error.
    pub fn on_reply(&mut self, headers: &[Header]) -> Result<()> {
        if self.reply_received {
            return Err(Error::InvalidState);
        }

        self.reply_received = true;
        self.response_headers = Some(HeaderMap::from_list(headers));

        Ok(())
    }

    /// Accounts for `len` received body bytes against the receive window.
    ///
    /// A negative window means the peer overran the advertised limit.
    pub fn recv_data(&mut self, len: usize) -> Result<()> {
        self.recv_window -= len as i64;

        if self.recv_window < 0 {
            return Err(Error::FlowControl);
        }

        Ok(())
    }

    /// Credits `n` consumed bytes back to the receive window, returning a
    /// WINDOW_UPDATE delta once enough bytes accumulate.
    pub fn consume(&mut self, n: usize) -> Option<u32> {
        self.recv_window += n as i64;
        self.unacked_recv_bytes += n as i64;

        if self.unacked_recv_bytes > self.init_recv_window / 2 {
            let delta = self.unacked_recv_bytes as u32;
            self.unacked_recv_bytes = 0;

            return Some(delta);
        }

        None
    }

    pub fn send_window(&self) -> i64 {
        self.send_window
    }

    /// Applies a WINDOW_UPDATE to the send window.
    ///
    /// An increment that would push the window past [`MAX_WINDOW_SIZE`] is
    /// a flow-control error, not a silent wraparound.
    ///
    /// [`MAX_WINDOW_SIZE`]: constant.MAX_WINDOW_SIZE.html
    pub fn increase_send_window(&mut self, delta: u32) -> Result<()> {
        if delta as i64 > MAX_WINDOW_SIZE - self.send_window {
            return Err(Error::FlowControl);
        }

        self.send_window += delta as i64;

        Ok(())
    }

    /// Applies a retroactive SETTINGS_INITIAL_WINDOW_SIZE delta.
    ///
    /// The result may be negative; sending stalls until WINDOW_UPDATEs
    /// bring the window back above zero.
    pub fn adjust_send_window(&mut self, delta: i64) {
        self.send_window += delta;
    }

    pub fn sub_send_window(&mut self, n: usize) {
        self.send_window -= n as i64;
    }

    pub fn on_local_fin(&mut self) {
        self.local_fin_sent = true;

        self.state = match self.state {
            State::Open => State::HalfClosedLocal,
            State::HalfClosedRemote => State::Closed,
            s => s,
        };
    }

    pub fn on_remote_fin(&mut self) {
        self.remote_fin_received = true;

        self.state = match self.state {
            State::Open => State::HalfClosedRemote,
            State::HalfClosedLocal => State::Closed,
            s => s,
        };
    }

    /// Transitions to Closed immediately (RST_STREAM or cancellation),
    /// discarding buffered-but-undelivered data. Returns the number of
    /// discarded received bytes, which the session must re-credit to its
    /// own receive window.
    pub fn reset(&mut self) -> usize {
        self.state = State::Closed;

        self.recv_buf.clear()
    }

    /// Whether body bytes are pending and both windows allow sending.
    ///
    /// A bare fin (empty DATA frame) consumes no window and is always
    /// emittable.
    pub fn can_emit(&self, session_send_window: i64) -> bool {
        if self.local_fin_sent {
            return false;
        }

        if self.send_buf.is_empty() {
            return self.send_buf.fin_pending();
        }

        self.send_window > 0 && session_send_window > 0
    }
}

mod recv_buf;
mod send_buf;
