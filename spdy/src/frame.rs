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

use crate::header;
use crate::header::Header;
use crate::settings::SettingsEntries;

use crate::Error;
use crate::Result;

pub const DATA_FRAME_TYPE_ID: u8 = 0x0;
pub const HEADERS_FRAME_TYPE_ID: u8 = 0x1;
pub const RST_STREAM_FRAME_TYPE_ID: u8 = 0x3;
pub const SETTINGS_FRAME_TYPE_ID: u8 = 0x4;
pub const PUSH_PROMISE_FRAME_TYPE_ID: u8 = 0x5;
pub const GOAWAY_FRAME_TYPE_ID: u8 = 0x7;
pub const WINDOW_UPDATE_FRAME_TYPE_ID: u8 = 0x8;

pub const FLAG_END_STREAM: u8 = 0x1;
pub const FLAG_ACK: u8 = 0x1;

/// Size of the fixed frame header: u24 payload length, u8 type, u8 flags,
/// u31 stream ID.
pub const FRAME_HEADER_SIZE: usize = 9;

const STREAM_ID_MASK: u32 = 0x7fff_ffff;

/// A protocol frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Data {
        stream_id: u64,
        payload: Vec<u8>,
        fin: bool,
    },

    Headers {
        stream_id: u64,
        priority: u8,
        headers: Vec<Header>,
        fin: bool,
    },

    RstStream {
        stream_id: u64,
        error_code: u32,
    },

    Settings {
        entries: SettingsEntries,
        ack: bool,
    },

    PushPromise {
        stream_id: u64,
        promised_stream_id: u64,
        headers: Vec<Header>,
    },

    GoAway {
        last_stream_id: u64,
        error_code: u32,
    },

    WindowUpdate {
        stream_id: u64,
        delta: u32,
    },

    Unknown {
        raw_type: u8,
        stream_id: u64,
        payload_length: usize,
    },
}

impl Frame {
    /// Parses a single complete frame (header and payload).
    ///
    /// The caller is responsible for buffering until at least the length
    /// advertised in the frame header is available; a short buffer is
    /// reported as [`BufferTooShort`].
    ///
    /// [`BufferTooShort`]: enum.Error.html#variant.BufferTooShort
    pub fn from_bytes(b: &mut octets::Octets) -> Result<Frame> {
        let payload_len = b.get_u24()? as usize;
        let frame_type = b.get_u8()?;
        let flags = b.get_u8()?;
        let stream_id = (b.get_u32()? & STREAM_ID_MASK) as u64;

        let mut payload = b.get_bytes(payload_len)?;

        let frame = match frame_type {
            DATA_FRAME_TYPE_ID => Frame::Data {
                stream_id,
                payload: payload.to_vec(),
                fin: flags & FLAG_END_STREAM != 0,
            },

            HEADERS_FRAME_TYPE_ID => {
                let priority = payload.get_u8().map_err(|_| Error::InvalidFrame)?;

                Frame::Headers {
                    stream_id,
                    priority,
                    headers: header::decode_block(&mut payload)?,
                    fin: flags & FLAG_END_STREAM != 0,
                }
            },

            RST_STREAM_FRAME_TYPE_ID => {
                if payload_len != 4 {
                    return Err(Error::FrameSize);
                }

                Frame::RstStream {
                    stream_id,
                    error_code: payload.get_u32()?,
                }
            },

            SETTINGS_FRAME_TYPE_ID =>
                parse_settings(&mut payload, payload_len, flags)?,

            PUSH_PROMISE_FRAME_TYPE_ID => Frame::PushPromise {
                stream_id,
                promised_stream_id: (payload.get_u32()? & STREAM_ID_MASK)
                    as u64,
                headers: header::decode_block(&mut payload)?,
            },

            GOAWAY_FRAME_TYPE_ID => {
                if payload_len != 8 {
                    return Err(Error::FrameSize);
                }

                Frame::GoAway {
                    last_stream_id: (payload.get_u32()? & STREAM_ID_MASK)
                        as u64,
                    error_code: payload.get_u32()?,
                }
            },

            WINDOW_UPDATE_FRAME_TYPE_ID => {
                if payload_len != 4 {
                    return Err(Error::FrameSize);
                }

                Frame::WindowUpdate {
                    stream_id,
                    delta: payload.get_u32()? & STREAM_ID_MASK,
                }
            },

            _ => Frame::Unknown {
                raw_type: frame_type,
                stream_id,
                payload_length: payload_len,
            },
        };

        Ok(frame)
    }

    pub fn to_bytes(&self, b: &mut octets::OctetsMut) -> Result<usize> {
        let before = b.cap();

        match self {
            Frame::Data {
                stream_id,
                payload,
                fin,
            } => {
                let flags = if *fin { FLAG_END_STREAM } else { 0 };
                put_frame_header(
                    b,
                    payload.len(),
                    DATA_FRAME_TYPE_ID,
                    flags,
                    *stream_id,
                )?;

                b.put_bytes(payload)?;
            },

            Frame::Headers {
                stream_id,
                priority,
                headers,
                fin,
            } => {
                let flags = if *fin { FLAG_END_STREAM } else { 0 };
                put_frame_header(
                    b,
                    1 + header::block_wire_len(headers),
                    HEADERS_FRAME_TYPE_ID,
                    flags,
                    *stream_id,
                )?;

                b.put_u8(*priority)?;
                header::encode_block(headers, b)?;
            },

            Frame::RstStream {
                stream_id,
                error_code,
            } => {
                put_frame_header(b, 4, RST_STREAM_FRAME_TYPE_ID, 0, *stream_id)?;

                b.put_u32(*error_code)?;
            },

            Frame::Settings { entries, ack } => {
                let flags = if *ack { FLAG_ACK } else { 0 };
                put_frame_header(
                    b,
                    entries.len() * 6,
                    SETTINGS_FRAME_TYPE_ID,
                    flags,
                    0,
                )?;

                for (id, value) in entries {
                    b.put_u16(*id)?;
                    b.put_u32(*value)?;
                }
            },

            Frame::PushPromise {
                stream_id,
                promised_stream_id,
                headers,
            } => {
                put_frame_header(
                    b,
                    4 + header::block_wire_len(headers),
                    PUSH_PROMISE_FRAME_TYPE_ID,
                    0,
                    *stream_id,
                )?;

                b.put_u32(*promised_stream_id as u32)?;
                header::encode_block(headers, b)?;
            },

            Frame::GoAway {
                last_stream_id,
                error_code,
            } => {
                put_frame_header(b, 8, GOAWAY_FRAME_TYPE_ID, 0, 0)?;

                b.put_u32(*last_stream_id as u32)?;
                b.put_u32(*error_code)?;
            },

            Frame::WindowUpdate { stream_id, delta } => {
                put_frame_header(b, 4, WINDOW_UPDATE_FRAME_TYPE_ID, 0, *stream_id)?;

                b.put_u32(*delta & STREAM_ID_MASK)?;
            },

            Frame::Unknown { .. } => unreachable!(),
        }

        Ok(before - b.cap())
    }

    /// Returns the total number of bytes the frame occupies on the wire.
    pub fn wire_len(&self) -> usize {
        let payload_len = match self {
            Frame::Data { payload, .. } => payload.len(),

            Frame::Headers { headers, .. } =>
                1 + header::block_wire_len(headers),

            Frame::RstStream { .. } => 4,

            Frame::Settings { entries, .. } => entries.len() * 6,

            Frame::PushPromise { headers, .. } =>
                4 + header::block_wire_len(headers),

            Frame::GoAway { .. } => 8,

            Frame::WindowUpdate { .. } => 4,

            Frame::Unknown { payload_length, .. } => *payload_length,
        };

        FRAME_HEADER_SIZE + payload_len
    }
}

fn put_frame_header(
    b: &mut octets::OctetsMut, payload_len: usize, frame_type: u8, flags: u8,
    stream_id: u64,
) -> Result<()> {
    b.put_u24(payload_len as u32)?;
    b.put_u8(frame_type)?;
    b.put_u8(flags)?;
    b.put_u32(stream_id as u32 & STREAM_ID_MASK)?;

    Ok(())
}

fn parse_settings(
    payload: &mut octets::Octets, payload_len: usize, flags: u8,
) -> Result<Frame> {
    if payload_len % 6 != 0 {
        return Err(Error::FrameSize);
    }

    let mut entries = SettingsEntries::new();

    for _ in 0..payload_len / 6 {
        entries.push((payload.get_u16()?, payload.get_u32()?));
    }

    Ok(Frame::Settings {
        entries,
        ack: flags & FLAG_ACK != 0,
    })
}
