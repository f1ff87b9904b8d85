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

//! Utilities for writing session tests: canned header lists, frame
//! serialization helpers, and a default test session.

use crate::frame::Frame;

use crate::Config;
use crate::Header;
use crate::Session;
use crate::TransportSecurity;

/// A session to `https://www.example.org` with default config over an
/// adequately secure transport.
pub fn new_session() -> Session {
    let config = Config::new().unwrap();

    Session::connect(
        "https://www.example.org",
        &config,
        TransportSecurity::modern(),
        None,
    )
    .unwrap()
}

/// Request headers for a bodyless GET of `path` on the test origin.
pub fn get_request_headers(path: &str) -> Vec<Header> {
    vec![
        Header::new(b":method", b"GET"),
        Header::new(b":scheme", b"https"),
        Header::new(b":authority", b"www.example.org"),
        Header::new(b":path", path.as_bytes()),
    ]
}

/// Request headers for a POST of `path` on the test origin.
pub fn post_request_headers(path: &str) -> Vec<Header> {
    vec![
        Header::new(b":method", b"POST"),
        Header::new(b":scheme", b"https"),
        Header::new(b":authority", b"www.example.org"),
        Header::new(b":path", path.as_bytes()),
    ]
}

/// A minimal 200 response header list.
pub fn response_headers() -> Vec<Header> {
    vec![Header::new(b":status", b"200")]
}

/// Promise headers spelling the pushed resource's URL.
pub fn push_headers(scheme: &str, authority: &str, path: &str) -> Vec<Header> {
    vec![
        Header::new(b":scheme", scheme.as_bytes()),
        Header::new(b":authority", authority.as_bytes()),
        Header::new(b":path", path.as_bytes()),
    ]
}

/// Serializes frames back to back, as a server would put them on the wire.
pub fn encode_frames(frames: &[Frame]) -> Vec<u8> {
    let len: usize = frames.iter().map(Frame::wire_len).sum();

    let mut buf = vec![0; len];

    let mut b = octets::OctetsMut::with_slice(&mut buf);

    for frame in frames {
        frame.to_bytes(&mut b).unwrap();
    }

    buf
}

/// Parses a byte stream of back-to-back frames.
pub fn decode_frames(buf: &[u8]) -> Vec<Frame> {
    let mut b = octets::Octets::with_slice(buf);

    let mut frames = Vec::new();

    while b.cap() > 0 {
        frames.push(Frame::from_bytes(&mut b).unwrap());
    }

    frames
}

/// Drains everything the session has queued for the transport and parses
/// it back into frames.
pub fn drain_frames(session: &mut Session) -> Vec<Frame> {
    let mut buf = Vec::new();

    let mut chunk = [0; 4096];

    while let Ok(n) = session.send(&mut chunk) {
        buf.extend_from_slice(&chunk[..n]);
    }

    decode_frames(&buf)
}
