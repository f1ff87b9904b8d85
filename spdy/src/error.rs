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

/// A specialized [`Result`] type for spdy operations.
///
/// This type is used throughout the public API for any operation that can
/// produce an error.
///
/// [`Result`]: https://doc.rust-lang.org/std/result/enum.Result.html
pub type Result<T> = std::result::Result<T, Error>;

/// A session error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// There is no more work to do.
    Done,

    /// The provided buffer is too short.
    BufferTooShort,

    /// A frame's advertised length exceeds the maximum payload size.
    FrameSize,

    /// The received frame cannot be parsed.
    InvalidFrame,

    /// The operation cannot be completed because the session is in an
    /// invalid state.
    InvalidState,

    /// The operation cannot be completed because the stream is in an
    /// invalid state.
    ///
    /// The request ID is provided as associated data.
    InvalidStreamState(u64),

    /// A flow control limit was violated, or a window increment would
    /// overflow the 31-bit window range.
    FlowControl,

    /// A header block could not be decoded.
    Compression,

    /// The negotiated transport security is below the minimum required for
    /// this protocol version.
    InadequateSecurity,

    /// The session is draining after a GOAWAY and cannot accept new
    /// streams.
    GoAway,

    /// The stream was aborted before completing, either by session
    /// shutdown or because its ID falls beyond a GOAWAY's last-good ID.
    Aborted,

    /// The underlying transport failed.
    TransportError,
}

/// RST_STREAM and GOAWAY status codes sent on the wire.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WireErrorCode {
    /// Graceful shutdown, no error.
    NoError              = 0x0,
    /// The peer detected an unspecific protocol error.
    ProtocolError        = 0x1,
    /// The peer encountered an unexpected internal error.
    InternalError        = 0x2,
    /// The peer violated the flow-control protocol.
    FlowControlError     = 0x3,
    /// The peer received a frame on a fully closed stream.
    StreamClosed         = 0x5,
    /// A frame's size violated the advertised limits.
    FrameSizeError       = 0x6,
    /// The stream was refused before any processing was performed on it.
    RefusedStream        = 0x7,
    /// The stream is no longer needed.
    Cancel               = 0x8,
    /// A header block could not be maintained or decoded.
    CompressionError     = 0x9,
    /// The negotiated transport properties are not acceptable.
    InadequateSecurity   = 0xc,
}

impl Error {
    pub(crate) fn to_wire(self) -> u64 {
        match self {
            Error::Done => WireErrorCode::NoError as u64,
            Error::FrameSize => WireErrorCode::FrameSizeError as u64,
            Error::FlowControl => WireErrorCode::FlowControlError as u64,
            Error::Compression => WireErrorCode::CompressionError as u64,
            Error::InadequateSecurity =>
                WireErrorCode::InadequateSecurity as u64,
            Error::Aborted | Error::TransportError =>
                WireErrorCode::InternalError as u64,
            _ => WireErrorCode::ProtocolError as u64,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl From<octets::BufferTooShortError> for Error {
    fn from(_err: octets::BufferTooShortError) -> Self {
        Error::BufferTooShort
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_wire() {
        assert_eq!(
            Error::FlowControl.to_wire(),
            WireErrorCode::FlowControlError as u64
        );
        assert_eq!(
            Error::Compression.to_wire(),
            WireErrorCode::CompressionError as u64
        );
        assert_eq!(
            Error::InvalidState.to_wire(),
            WireErrorCode::ProtocolError as u64
        );
        assert_eq!(
            Error::TransportError.to_wire(),
            WireErrorCode::InternalError as u64
        );
    }
}
