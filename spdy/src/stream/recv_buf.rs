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

/// Buffer of received body bytes awaiting delivery to the caller.
///
/// Chunks are delivered in DATA-frame arrival order; a partial read leaves
/// the remainder of the front chunk in place.
#[derive(Debug, Default)]
pub struct RecvBuf {
    chunks: VecDeque<Vec<u8>>,

    /// Read offset into the front chunk.
    off: usize,

    len: usize,
}

impl RecvBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: Vec<u8>) {
        if data.is_empty() {
            return;
        }

        self.len += data.len();
        self.chunks.push_back(data);
    }

    /// Copies buffered bytes into `out`, returning the amount copied.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let mut copied = 0;

        while copied < out.len() {
            let Some(front) = self.chunks.front() else {
                break;
            };

            let n = cmp::min(out.len() - copied, front.len() - self.off);
            out[copied..copied + n]
                .copy_from_slice(&front[self.off..self.off + n]);

            copied += n;
            self.off += n;

            if self.off == front.len() {
                self.chunks.pop_front();
                self.off = 0;
            }
        }

        self.len -= copied;

        copied
    }

    /// Discards all buffered bytes, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.len;

        self.chunks.clear();
        self.off = 0;
        self.len = 0;

        dropped
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_in_arrival_order() {
        let mut buf = RecvBuf::new();

        buf.push(b"hello".to_vec());
        buf.push(b" ".to_vec());
        buf.push(b"world".to_vec());

        let mut out = [0; 16];
        let n = buf.read(&mut out);

        assert_eq!(&out[..n], b"hello world");
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_read() {
        let mut buf = RecvBuf::new();

        buf.push(b"abcdef".to_vec());

        let mut out = [0; 4];
        assert_eq!(buf.read(&mut out), 4);
        assert_eq!(&out, b"abcd");
        assert_eq!(buf.len(), 2);

        assert_eq!(buf.read(&mut out), 2);
        assert_eq!(&out[..2], b"ef");
        assert!(buf.is_empty());
    }

    #[test]
    fn clear_reports_dropped() {
        let mut buf = RecvBuf::new();

        buf.push(b"abc".to_vec());
        buf.push(b"de".to_vec());

        let mut out = [0; 1];
        buf.read(&mut out);

        assert_eq!(buf.clear(), 4);
        assert!(buf.is_empty());
    }
}
