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

use std::fmt;
use std::fmt::Write;

use crate::Error;
use crate::Result;

/// A trait for types with associated string name and value.
pub trait NameValue {
    /// Returns the object's name.
    fn name(&self) -> &[u8];

    /// Returns the object's value.
    fn value(&self) -> &[u8];
}

impl NameValue for (&[u8], &[u8]) {
    fn name(&self) -> &[u8] {
        self.0
    }

    fn value(&self) -> &[u8] {
        self.1
    }
}

/// An owned name-value pair representing a raw HTTP header.
#[derive(Clone, PartialEq, Eq)]
pub struct Header(Vec<u8>, Vec<u8>);

fn try_print_as_readable(hdr: &[u8], f: &mut fmt::Formatter) -> fmt::Result {
    match std::str::from_utf8(hdr) {
        Ok(s) => f.write_str(&s.escape_default().to_string()),
        Err(_) => write!(f, "{hdr:?}"),
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char('"')?;
        try_print_as_readable(&self.0, f)?;
        f.write_str(": ")?;
        try_print_as_readable(&self.1, f)?;
        f.write_char('"')
    }
}

impl Header {
    /// Creates a new header.
    ///
    /// Both `name` and `value` will be cloned.
    pub fn new(name: &[u8], value: &[u8]) -> Self {
        Self(name.to_vec(), value.to_vec())
    }
}

impl NameValue for Header {
    fn name(&self) -> &[u8] {
        &self.0
    }

    fn value(&self) -> &[u8] {
        &self.1
    }
}

/// An ordered header collection.
///
/// Insertion order is preserved. A second value inserted under an existing
/// name is concatenated to the first with a NUL separator instead of
/// replacing it, matching multi-valued cookie semantics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<Header>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from a decoded header list, merging duplicates.
    pub fn from_list<T: NameValue>(list: &[T]) -> Self {
        let mut map = Self::new();

        for h in list {
            map.insert(h.name(), h.value());
        }

        map
    }

    /// Inserts a header, NUL-concatenating the value on a duplicate name.
    pub fn insert(&mut self, name: &[u8], value: &[u8]) {
        if let Some(existing) =
            self.entries.iter_mut().find(|h| h.0 == name)
        {
            existing.1.push(0);
            existing.1.extend_from_slice(value);
            return;
        }

        self.entries.push(Header::new(name, value));
    }

    /// Returns the merged value for `name`, if present.
    pub fn get(&self, name: &[u8]) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|h| h.0 == name)
            .map(|h| h.1.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_list(&self) -> Vec<Header> {
        self.entries.clone()
    }
}

/// Returns the absolute URL spelled by a request header list's
/// pseudo-headers, or `None` when any of them is missing.
pub fn url_from_headers<T: NameValue>(list: &[T]) -> Option<String> {
    let mut scheme = None;
    let mut authority = None;
    let mut path = None;

    for h in list {
        match h.name() {
            b":scheme" => scheme = std::str::from_utf8(h.value()).ok(),
            b":authority" | b":host" =>
                authority = std::str::from_utf8(h.value()).ok(),
            b":path" => path = std::str::from_utf8(h.value()).ok(),
            _ => (),
        }
    }

    Some(format!("{}://{}{}", scheme?, authority?, path?))
}

/// Returns the number of bytes a header list occupies on the wire.
pub fn block_wire_len<T: NameValue>(list: &[T]) -> usize {
    let mut len = 2;

    for h in list {
        len += 4 + h.name().len() + h.value().len();
    }

    len
}

/// Serializes a header list into a plain length-prefixed block.
pub fn encode_block<T: NameValue>(
    list: &[T], b: &mut octets::OctetsMut,
) -> Result<()> {
    b.put_u16(list.len() as u16)?;

    for h in list {
        b.put_u16(h.name().len() as u16)?;
        b.put_bytes(h.name())?;
        b.put_u16(h.value().len() as u16)?;
        b.put_bytes(h.value())?;
    }

    Ok(())
}

/// Parses a plain length-prefixed header block.
///
/// Any truncation or length mismatch is a [`Compression`] error, as the
/// block is the frame's (notionally compressed) header payload.
///
/// [`Compression`]: enum.Error.html#variant.Compression
pub fn decode_block(b: &mut octets::Octets) -> Result<Vec<Header>> {
    let count = b.get_u16().map_err(|_| Error::Compression)?;

    let mut list = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let name_len = b.get_u16().map_err(|_| Error::Compression)? as usize;
        let name = b.get_bytes(name_len).map_err(|_| Error::Compression)?;

        let value_len = b.get_u16().map_err(|_| Error::Compression)? as usize;
        let value = b.get_bytes(value_len).map_err(|_| Error::Compression)?;

        if name.is_empty() {
            return Err(Error::Compression);
        }

        list.push(Header(name.to_vec(), value.to_vec()));
    }

    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_concatenate() {
        let mut map = HeaderMap::new();
        map.insert(b"set-cookie", b"a=1");
        map.insert(b"set-cookie", b"b=2");
        map.insert(b"content-type", b"text/html");

        assert_eq!(map.len(), 2);
        assert_eq!(map.get(b"set-cookie"), Some(&b"a=1\0b=2"[..]));
        assert_eq!(map.get(b"content-type"), Some(&b"text/html"[..]));
    }

    #[test]
    fn block_roundtrip() {
        let list = vec![
            Header::new(b":method", b"GET"),
            Header::new(b":path", b"/"),
            Header::new(b"cookie", b"k=v"),
        ];

        let mut buf = vec![0; block_wire_len(&list)];
        let mut b = octets::OctetsMut::with_slice(&mut buf);
        encode_block(&list, &mut b).unwrap();

        let mut b = octets::Octets::with_slice(&buf);
        let parsed = decode_block(&mut b).unwrap();

        assert_eq!(parsed, list);
    }

    #[test]
    fn truncated_block_is_compression_error() {
        let list = vec![Header::new(b":method", b"GET")];

        let mut buf = vec![0; block_wire_len(&list)];
        let mut b = octets::OctetsMut::with_slice(&mut buf);
        encode_block(&list, &mut b).unwrap();

        let mut b = octets::Octets::with_slice(&buf[..buf.len() - 2]);
        assert_eq!(decode_block(&mut b), Err(Error::Compression));
    }

    #[test]
    fn empty_header_name_rejected() {
        let mut buf = vec![0; 6];
        let mut b = octets::OctetsMut::with_slice(&mut buf);
        b.put_u16(1).unwrap();
        b.put_u16(0).unwrap();
        b.put_u16(0).unwrap();

        let mut b = octets::Octets::with_slice(&buf);
        assert_eq!(decode_block(&mut b), Err(Error::Compression));
    }

    #[test]
    fn url_from_request_headers() {
        let list = vec![
            Header::new(b":method", b"GET"),
            Header::new(b":scheme", b"https"),
            Header::new(b":authority", b"www.example.org"),
            Header::new(b":path", b"/foo.dat"),
        ];

        assert_eq!(
            url_from_headers(&list).as_deref(),
            Some("https://www.example.org/foo.dat")
        );

        let incomplete = vec![Header::new(b":path", b"/foo.dat")];
        assert_eq!(url_from_headers(&incomplete), None);
    }
}
