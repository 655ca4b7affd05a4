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

//! Framing of every protocol message.
//!
//! On the wire an envelope is the array:
//!
//! ```cddl
//! Envelope = [
//!     length: uint,       ;; length of the whole encoded array
//!     msgId: uint,
//!     protocolVersion: uint,
//!     protocolInfo: { * tstr => any },
//!     body: any
//! ]
//! ```
//!
//! The session token travels in the protocol info under the `"token"` key.

use crate::codec;
use crate::error::ErrorKind;
use crate::v101::{Message, Msgtype, Protver, PROTOCOL_VERSION};
use crate::value::{Map, Value};
use crate::Error;

/// Key of the session token in the protocol info.
pub const TOKEN_KEY: &str = "token";

/// Maximum number of passes to compute the fixed point of the length field.
const MAX_LENGTH_PASSES: usize = 4;

/// Message framing: identifier, version, side channel information and body.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    msg_id: Msgtype,
    protocol_version: Protver,
    protocol_info: Map,
    body: Value,
}

impl Envelope {
    /// Creates an envelope with the current protocol version and no token.
    pub fn new(msg_id: Msgtype, body: Value) -> Self {
        Self {
            msg_id,
            protocol_version: PROTOCOL_VERSION,
            protocol_info: Map::new(),
            body,
        }
    }

    /// Creates the envelope for a typed message.
    pub fn from_message<M>(message: &M) -> Result<Self, Error>
    where
        M: Message,
    {
        message.encode().map(|body| Self::new(M::MSG_TYPE, body))
    }

    /// Sets the session token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.set_token(token);

        self
    }

    /// Sets the session token.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.protocol_info
            .insert(TOKEN_KEY, Value::Text(token.into()));
    }

    /// Returns the session token, if any.
    pub fn token(&self) -> Option<&str> {
        self.protocol_info.get_text(TOKEN_KEY).and_then(Value::as_text)
    }

    /// Message identifier.
    pub fn msg_id(&self) -> Msgtype {
        self.msg_id
    }

    /// Version of the protocol.
    pub fn protocol_version(&self) -> Protver {
        self.protocol_version
    }

    /// Side channel information of the message.
    pub fn protocol_info(&self) -> &Map {
        &self.protocol_info
    }

    /// Body of the message.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Returns the body of the message.
    pub fn into_body(self) -> Value {
        self.body
    }

    /// Returns true if this is an error message.
    pub fn is_error(&self) -> bool {
        self.msg_id == crate::v101::error::ErrorMessage::MSG_TYPE
    }

    /// Decodes the body as the given message type.
    ///
    /// Fails if the message identifier doesn't match the one of the type.
    pub fn message<M>(&self) -> Result<M, Error>
    where
        M: Message,
    {
        if self.msg_id != M::MSG_TYPE {
            #[cfg(feature = "tracing")]
            tracing::error!(
                expected = M::MSG_TYPE,
                received = self.msg_id,
                "unexpected message type"
            );

            return Err(Error::new(ErrorKind::Message, "unexpected message type"));
        }

        M::decode(&self.body)
    }

    fn to_value(&self, length: u64) -> Value {
        Value::Array(vec![
            Value::from(length),
            Value::from(self.msg_id),
            Value::from(self.protocol_version),
            Value::Map(self.protocol_info.clone()),
            self.body.clone(),
        ])
    }

    /// Encodes the envelope.
    ///
    /// The length field depends on its own encoded size, so it's computed until it reaches a
    /// fixed point.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut length = 0;

        for _ in 0..MAX_LENGTH_PASSES {
            let buf = codec::to_vec(&self.to_value(length))?;

            let actual = u64::try_from(buf.len())
                .map_err(|_| Error::new(ErrorKind::OutOfRange, "envelope length"))?;

            if actual == length {
                return Ok(buf);
            }

            length = actual;
        }

        Err(Error::new(ErrorKind::Encode, "envelope length"))
    }

    /// Decodes an envelope and validates its length field.
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let value = codec::from_slice(buf)?;

        let Value::Array(items) = value else {
            return Err(Error::new(ErrorKind::Decode, "envelope is not an array"));
        };

        let [length, msg_id, protocol_version, protocol_info, body]: [Value; 5] = items
            .try_into()
            .map_err(|_| Error::new(ErrorKind::Decode, "envelope must have 5 items"))?;

        let length: u64 = length.to_int()?;
        if usize::try_from(length).ok() != Some(buf.len()) {
            #[cfg(feature = "tracing")]
            tracing::error!(length, actual = buf.len(), "envelope length mismatch");

            return Err(Error::new(ErrorKind::Invalid, "envelope length"));
        }

        let Value::Map(protocol_info) = protocol_info else {
            return Err(Error::new(ErrorKind::Decode, "envelope protocol info"));
        };

        if let Some(token) = protocol_info.get_text(TOKEN_KEY) {
            if token.as_text().is_none() {
                return Err(Error::new(ErrorKind::Decode, "envelope token"));
            }
        }

        Ok(Self {
            msg_id: msg_id.to_int()?,
            protocol_version: protocol_version.to_int()?,
            protocol_info,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::tests::from_hex;
    use crate::v101::di::done::Done;

    use super::*;

    #[test]
    fn encode_hello() {
        let envelope = Envelope::new(60, Value::Array(vec![Value::from(1u8)]));

        let buf = envelope.encode().unwrap();

        // [9, 60, 101, {}, [1]]
        assert_eq!(buf, from_hex("8509183c1865a08101"));

        let back = Envelope::decode(&buf).unwrap();

        assert_eq!(back, envelope);
    }

    #[test]
    fn length_fixed_point() {
        // the length doesn't fit in the initial byte
        let envelope = Envelope::new(60, Value::bytes(vec![0; 17]));

        let buf = envelope.encode().unwrap();

        assert_eq!(buf.len(), 26);
        assert_eq!(buf[..3], [0x85, 0x18, 26]);

        let back = Envelope::decode(&buf).unwrap();
        assert_eq!(back.body(), envelope.body());
    }

    #[test]
    fn token_roundtrip() {
        let envelope = Envelope::new(62, Value::Null).with_token("abcd");

        assert_eq!(envelope.token(), Some("abcd"));

        let back = Envelope::decode(&envelope.encode().unwrap()).unwrap();

        assert_eq!(back.token(), Some("abcd"));
        assert_eq!(back.msg_id(), 62);
        assert_eq!(back.protocol_version(), PROTOCOL_VERSION);
    }

    #[test]
    fn missing_token() {
        let envelope = Envelope::new(10, Value::Null);

        assert_eq!(envelope.token(), None);
    }

    #[test]
    fn wrong_length() {
        let mut buf = Envelope::new(60, Value::Null).encode().unwrap();
        // patch the length field
        buf[1] = 3;

        let err = Envelope::decode(&buf).unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn wrong_shape() {
        let buf = codec::to_vec(&Value::Array(vec![Value::from(2u8), Value::Null])).unwrap();

        let err = Envelope::decode(&buf).unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn typed_message() {
        let envelope = Envelope::from_message(&Done).unwrap();

        assert_eq!(envelope.msg_id(), Done::MSG_TYPE);
        assert_eq!(envelope.body(), &Value::Array(Vec::new()));

        let done: Done = envelope.message().unwrap();
        assert_eq!(done, Done);

        let other = Envelope::new(11, Value::Array(Vec::new()));
        let err = other.message::<Done>().unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::Message);
    }
}
