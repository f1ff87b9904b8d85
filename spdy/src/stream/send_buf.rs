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

use std::cmp;

use std::collections::VecDeque;

/// Buffer of request body bytes not yet emitted as DATA frames.
///
/// Bytes are emitted in write order; a chunk cut short by flow control
/// leaves the remainder buffered, so a stalled stream resumes with exactly
/// the unsent bytes, in order, with no duplication or loss.
#[derive(Debug, Default)]
pub struct SendBuf {
    chunks: VecDeque<Vec<u8>>,

    /// Emit offset into the front chunk.
    off: usize,

    len: usize,

    /// Whether the caller has finished writing the body.
    fin: bool,

    /// Total bytes emitted so far.
    emitted: u64,
}

impl SendBuf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends body bytes, optionally marking the end of the body.
    pub fn write(&mut self, data: &[u8], fin: bool) {
        if !data.is_empty() {
            self.len += data.len();
            self.chunks.push_back(data.to_vec());
        }

        if fin {
            self.fin = true;
        }
    }

    /// Cuts the next chunk of at most `max` bytes.
    ///
    /// Returns the chunk and whether it carries the end of the body (the
    /// buffer is emptied and the caller marked fin). Returns `None` when
    /// there is nothing to emit, including the case of a fin with no data
    /// left, which the caller must check via [`fin_pending()`].
    ///
    /// [`fin_pending()`]: struct.SendBuf.html#method.fin_pending
    pub fn emit(&mut self, max: usize) -> Option<(Vec<u8>, bool)> {
        if self.len == 0 || max == 0 {
            return None;
        }

        let mut chunk = Vec::with_capacity(cmp::min(max, self.len));

        while chunk.len() < max {
            let Some(front) = self.chunks.front() else {
                break;
            };

            let n = cmp::min(max - chunk.len(), front.len() - self.off);
            chunk.extend_from_slice(&front[self.off..self.off + n]);

            self.off += n;

            if self.off == front.len() {
                self.chunks.pop_front();
                self.off = 0;
            }
        }

        self.len -= chunk.len();
        self.emitted += chunk.len() as u64;

        Some((chunk, self.len == 0 && self.fin))
    }

    /// Whether a fin still needs to be emitted with no bytes left to carry
    /// it (e.g. an empty body, or a fin written after the last chunk was
    /// already cut).
    pub fn fin_pending(&self) -> bool {
        self.fin && self.len == 0
    }

    pub fn is_fin(&self) -> bool {
        self.fin
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total bytes emitted as DATA so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}
