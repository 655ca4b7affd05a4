// This file is part of Astarte.
//
// Copyright 2025, 2026 SECO Mind Srl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! Binary codec between [`Value`] and the canonical CBOR subset used on the wire.
//!
//! The decoder only accepts definite length items, bignum tags (2 and 3) and the `false`, `true`
//! and `null` simple values. The encoder always emits the shortest header for a given argument,
//! so encoding a decoded value reproduces the canonical bytes.

use std::io::{Read, Write};

use crate::error::ErrorKind;
use crate::value::{Integer, Map, Value};
use crate::Error;

/// Maximum nesting of arrays and maps.
pub const MAX_DEPTH: usize = 128;

/// Upper bound of the memory reserved from an untrusted length.
const PREALLOC_LIMIT: usize = 4096;

const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_NEGATIVE: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_TAG: u8 = 6;
const MAJOR_SIMPLE: u8 = 7;

const TAG_POSITIVE_BIGNUM: u64 = 2;
const TAG_NEGATIVE_BIGNUM: u64 = 3;

const SIMPLE_FALSE: u8 = 20;
const SIMPLE_TRUE: u8 = 21;
const SIMPLE_NULL: u8 = 22;

const INFO_INDEFINITE: u8 = 31;

/// Encodes a value into a new buffer.
pub fn to_vec(value: &Value) -> Result<Vec<u8>, Error> {
    let mut encoder = Encoder::new(Vec::new());

    encoder.encode(value)?;

    Ok(encoder.into_inner())
}

/// Decodes exactly one value from the buffer.
///
/// Empty input and trailing bytes are both errors.
pub fn from_slice(buf: &[u8]) -> Result<Value, Error> {
    let mut decoder = Decoder::new(buf);

    let value = decoder
        .next_value()?
        .ok_or(Error::new(ErrorKind::Decode, "empty input"))?;

    if !decoder.into_inner().is_empty() {
        return Err(Error::new(ErrorKind::Decode, "trailing bytes after item"));
    }

    Ok(value)
}

/// Streaming decoder reading one item at a time.
#[derive(Debug)]
pub struct Decoder<R> {
    reader: R,
}

impl<R> Decoder<R>
where
    R: Read,
{
    /// Creates a decoder over a byte source.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Returns the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Reads the next item.
    ///
    /// Returns `None` when the source ends before the first byte of an item.
    pub fn next_value(&mut self) -> Result<Option<Value>, Error> {
        let mut header = [0u8; 1];

        loop {
            match self.reader.read(&mut header) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(error = %err, "couldn't read item header");

                    return Err(Error::new(ErrorKind::Io, "reading item header"));
                }
            }
        }

        self.item(header[0], 0).map(Some)
    }

    fn item(&mut self, header: u8, depth: usize) -> Result<Value, Error> {
        if depth > MAX_DEPTH {
            return Err(Error::new(ErrorKind::Decode, "nesting too deep"));
        }

        let major = header >> 5;
        let info = header & 0x1f;

        match major {
            MAJOR_UNSIGNED => {
                let arg = self.argument(info)?;

                Ok(Value::Integer(Integer::from(arg)))
            }
            MAJOR_NEGATIVE => {
                let arg = self.argument(info)?;

                Ok(Value::Integer(Integer::from_parts(true, &arg.to_be_bytes())))
            }
            MAJOR_BYTES => {
                let len = self.length(info)?;

                self.read_bytes(len).map(Value::Bytes)
            }
            MAJOR_TEXT => {
                let len = self.length(info)?;
                let bytes = self.read_bytes(len)?;

                String::from_utf8(bytes)
                    .map(Value::Text)
                    .map_err(|_| Error::new(ErrorKind::Decode, "text is not valid utf-8"))
            }
            MAJOR_ARRAY => {
                let len = self.length(info)?;
                let mut items = Vec::with_capacity(len.min(PREALLOC_LIMIT));

                for _ in 0..len {
                    let header = self.read_byte()?;
                    items.push(self.item(header, depth + 1)?);
                }

                Ok(Value::Array(items))
            }
            MAJOR_MAP => {
                let len = self.length(info)?;
                let mut map = Map::new();

                for _ in 0..len {
                    let header = self.read_byte()?;
                    let key = self.item(header, depth + 1)?;
                    let header = self.read_byte()?;
                    let value = self.item(header, depth + 1)?;

                    map.try_insert(key, value)?;
                }

                Ok(Value::Map(map))
            }
            MAJOR_TAG => {
                let tag = self.argument(info)?;

                if tag != TAG_POSITIVE_BIGNUM && tag != TAG_NEGATIVE_BIGNUM {
                    #[cfg(feature = "tracing")]
                    tracing::error!(tag, "unsupported tag");

                    return Err(Error::new(ErrorKind::Decode, "unsupported tag"));
                }

                let header = self.read_byte()?;
                if header >> 5 != MAJOR_BYTES {
                    return Err(Error::new(
                        ErrorKind::Decode,
                        "bignum content is not a byte string",
                    ));
                }

                let len = self.length(header & 0x1f)?;
                let magnitude = self.read_bytes(len)?;

                Ok(Value::Integer(Integer::from_parts(
                    tag == TAG_NEGATIVE_BIGNUM,
                    &magnitude,
                )))
            }
            MAJOR_SIMPLE => match info {
                SIMPLE_FALSE => Ok(Value::Bool(false)),
                SIMPLE_TRUE => Ok(Value::Bool(true)),
                SIMPLE_NULL => Ok(Value::Null),
                _ => Err(Error::new(ErrorKind::Decode, "unsupported simple value")),
            },
            _ => Err(Error::new(ErrorKind::Decode, "invalid major type")),
        }
    }

    /// Reads the argument of the header with the given additional information.
    fn argument(&mut self, info: u8) -> Result<u64, Error> {
        match info {
            0..=23 => Ok(u64::from(info)),
            24 => {
                let [b] = self.read_array::<1>()?;

                Ok(u64::from(b))
            }
            25 => self.read_array().map(u16::from_be_bytes).map(u64::from),
            26 => self.read_array().map(u32::from_be_bytes).map(u64::from),
            27 => self.read_array().map(u64::from_be_bytes),
            INFO_INDEFINITE => Err(Error::new(
                ErrorKind::Decode,
                "indefinite length items are not supported",
            )),
            _ => Err(Error::new(
                ErrorKind::Decode,
                "reserved additional information",
            )),
        }
    }

    fn length(&mut self, info: u8) -> Result<usize, Error> {
        let len = self.argument(info)?;

        usize::try_from(len).map_err(|_| Error::new(ErrorKind::OutOfRange, "item length"))
    }

    fn read_byte(&mut self) -> Result<u8, Error> {
        self.read_array::<1>().map(|[b]| b)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut buf = [0u8; N];

        self.reader.read_exact(&mut buf).map_err(|err| {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::new(ErrorKind::Decode, "truncated item")
            } else {
                Error::new(ErrorKind::Io, "reading item")
            }
        })?;

        Ok(buf)
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::with_capacity(len.min(PREALLOC_LIMIT));

        let limit = u64::try_from(len).map_err(|_| Error::new(ErrorKind::OutOfRange, "length"))?;

        let read = (&mut self.reader)
            .take(limit)
            .read_to_end(&mut buf)
            .map_err(|_| Error::new(ErrorKind::Io, "reading item content"))?;

        if read != len {
            return Err(Error::new(ErrorKind::Decode, "truncated item"));
        }

        Ok(buf)
    }
}

impl<R> Iterator for Decoder<R>
where
    R: Read,
{
    type Item = Result<Value, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_value().transpose()
    }
}

/// Encoder writing values in canonical form.
#[derive(Debug)]
pub struct Encoder<W> {
    writer: W,
}

impl<W> Encoder<W>
where
    W: Write,
{
    /// Creates an encoder over a byte sink.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Writes a value.
    pub fn encode(&mut self, value: &Value) -> Result<(), Error> {
        match value {
            Value::Null => self.write(&[MAJOR_SIMPLE << 5 | SIMPLE_NULL]),
            Value::Bool(false) => self.write(&[MAJOR_SIMPLE << 5 | SIMPLE_FALSE]),
            Value::Bool(true) => self.write(&[MAJOR_SIMPLE << 5 | SIMPLE_TRUE]),
            Value::Integer(int) => self.integer(int),
            Value::Bytes(bytes) => {
                self.header(MAJOR_BYTES, len_arg(bytes.len())?)?;
                self.write(bytes)
            }
            Value::Text(text) => {
                self.header(MAJOR_TEXT, len_arg(text.len())?)?;
                self.write(text.as_bytes())
            }
            Value::Array(items) => {
                self.header(MAJOR_ARRAY, len_arg(items.len())?)?;

                items.iter().try_for_each(|item| self.encode(item))
            }
            Value::Map(map) => {
                self.header(MAJOR_MAP, len_arg(map.len())?)?;

                map.iter().try_for_each(|(k, v)| {
                    self.encode(k)?;
                    self.encode(v)
                })
            }
        }
    }

    fn integer(&mut self, int: &Integer) -> Result<(), Error> {
        let major = if int.is_negative() {
            MAJOR_NEGATIVE
        } else {
            MAJOR_UNSIGNED
        };

        if let Some(arg) = int.magnitude_u64() {
            return self.header(major, arg);
        }

        let tag = if int.is_negative() {
            TAG_NEGATIVE_BIGNUM
        } else {
            TAG_POSITIVE_BIGNUM
        };

        self.header(MAJOR_TAG, tag)?;
        self.header(MAJOR_BYTES, len_arg(int.magnitude().len())?)?;
        self.write(int.magnitude())
    }

    fn header(&mut self, major: u8, arg: u64) -> Result<(), Error> {
        let major = major << 5;

        // The `as` casts are lossless, each arm checks the range.
        match arg {
            0..=23 => self.write(&[major | arg as u8]),
            24..=0xff => self.write(&[major | 24, arg as u8]),
            0x100..=0xffff => {
                self.write(&[major | 25])?;
                self.write(&(arg as u16).to_be_bytes())
            }
            0x1_0000..=0xffff_ffff => {
                self.write(&[major | 26])?;
                self.write(&(arg as u32).to_be_bytes())
            }
            _ => {
                self.write(&[major | 27])?;
                self.write(&arg.to_be_bytes())
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        self.writer.write_all(buf).map_err(|err| {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %err, "couldn't write encoded value");

            Error::new(ErrorKind::Write, "encoded value")
        })
    }
}

fn len_arg(len: usize) -> Result<u64, Error> {
    u64::try_from(len).map_err(|_| Error::new(ErrorKind::OutOfRange, "length"))
}
