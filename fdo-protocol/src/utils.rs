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

//! Utilities to serialize and deserialize CBOR structures.

use std::fmt::{Debug, Display};
use std::marker::PhantomData;
use std::ops::Deref;

use coset::{AsCborValue, CborSerializable, CoseSign1};
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::error::ErrorKind;
use crate::Error;

/// Encodes a serializable type into CBOR bytes.
pub fn cbor_encode<T>(value: &T) -> Result<Vec<u8>, Error>
where
    T: Serialize + ?Sized,
{
    let mut buf = Vec::new();

    ciborium::into_writer(value, &mut buf).map_err(|err| {
        #[cfg(feature = "tracing")]
        tracing::error!(error = %err, "couldn't encode cbor value");

        Error::new(ErrorKind::Encode, "cbor value")
    })?;

    Ok(buf)
}

/// Decodes CBOR bytes into a deserializable type.
///
/// The bytes are first checked by the strict [`codec`](crate::codec), so anything outside of the
/// protocol subset is rejected.
pub fn cbor_decode<T>(buf: &[u8]) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    crate::codec::from_slice(buf)?;

    ciborium::from_reader(buf).map_err(|err| {
        #[cfg(feature = "tracing")]
        tracing::error!(error = %err, "couldn't decode cbor value");

        Error::new(ErrorKind::Decode, "cbor value")
    })
}

/// Serializes a COSE object as its untagged CBOR structure.
pub(crate) fn serialize_cose<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: AsCborValue + Clone,
    S: serde::Serializer,
{
    value
        .clone()
        .to_cbor_value()
        .map_err(serde::ser::Error::custom)?
        .serialize(serializer)
}

/// Deserializes an untagged COSE object.
pub(crate) fn deserialize_cose<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: AsCborValue,
    D: serde::Deserializer<'de>,
{
    let value = ciborium::Value::deserialize(deserializer)?;

    T::from_cbor_value(value).map_err(serde::de::Error::custom)
}

/// A `bstr` for an encoded `cbor` value.
///
/// The bytes are kept once computed or received, so hashes and signatures over the wrapped value
/// are always computed on the exact bytes sent on the wire.
#[derive(Debug, Clone)]
pub struct CborBstr<T> {
    bytes: OnceCell<ByteBuf>,
    value: T,
}

impl<T> CborBstr<T> {
    /// Create a new CborBstr value.
    pub fn new(value: T) -> Self {
        Self {
            bytes: OnceCell::default(),
            value,
        }
    }

    /// Returns the encoded value as a CBOR byte string.
    pub fn bytes(&self) -> Result<&[u8], Error>
    where
        T: Serialize,
    {
        self.bytes
            .get_or_try_init(|| cbor_encode(&self.value).map(ByteBuf::from))
            .map(|bytes| bytes.as_slice())
    }

    /// Returns the inner value.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for CborBstr<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T> PartialEq for CborBstr<T>
where
    T: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Serialize for CborBstr<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let bytes = self.bytes().map_err(serde::ser::Error::custom)?;

        serde_bytes::Bytes::new(bytes).serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for CborBstr<T>
where
    T: DeserializeOwned,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = ByteBuf::deserialize(deserializer)?;

        let value: T = cbor_decode(bytes.as_slice()).map_err(serde::de::Error::custom)?;

        Ok(CborBstr {
            value,
            bytes: OnceCell::with_value(bytes),
        })
    }
}

/// A `COSE_Sign1` object, untagged, carrying a CBOR encoded payload of type `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct Signed<T> {
    sign: CoseSign1,
    _marker: PhantomData<T>,
}

impl<T> Signed<T> {
    /// Wraps a signed object.
    pub fn new(sign: CoseSign1) -> Self {
        Self {
            sign,
            _marker: PhantomData,
        }
    }

    /// Returns the COSE object.
    pub fn sign(&self) -> &CoseSign1 {
        &self.sign
    }

    /// Returns the COSE object.
    pub fn into_sign(self) -> CoseSign1 {
        self.sign
    }

    /// Returns the encoded payload.
    pub fn payload_bytes(&self) -> Result<&[u8], Error> {
        self.sign
            .payload
            .as_deref()
            .ok_or(Error::new(ErrorKind::Invalid, "COSE_Sign1 payload is missing"))
    }

    /// Decodes the payload.
    ///
    /// The signature is not checked.
    pub fn payload(&self) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        cbor_decode(self.payload_bytes()?)
    }

    /// Decodes the value of an unprotected header parameter.
    pub fn unprotected<V>(&self, label: i64) -> Result<Option<V>, Error>
    where
        V: DeserializeOwned,
    {
        let label = coset::Label::Int(label);

        let Some(value) = self
            .sign
            .unprotected
            .rest
            .iter()
            .find_map(|(l, value)| (*l == label).then_some(value))
        else {
            return Ok(None);
        };

        value.deserialized().map(Some).map_err(|err| {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %err, "couldn't decode unprotected header");

            Error::new(ErrorKind::Decode, "unprotected header")
        })
    }

    /// Encodes the untagged COSE object.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        self.sign.clone().to_vec().map_err(|err| {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %err, "couldn't encode COSE_Sign1");

            Error::new(ErrorKind::Encode, "COSE_Sign1")
        })
    }
}

impl<T> Serialize for Signed<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_cose(&self.sign, serializer)
    }
}

impl<'de, T> Deserialize<'de> for Signed<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserialize_cose(deserializer).map(Self::new)
    }
}

/// Array with one or more element.
///
/// ```cddl
/// OneOrMore = [ + bstr ]
/// ```
pub type OneOrMore<T> = Repetition<1, T>;

/// A repeated CBOR value with a minimum number of elements.
///
/// ```cddl
/// Repeated = [ 2* bstr ]
/// ```
///
/// This requires at least one element, use a [Vec] if you want 0 or more.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Repetition<const MIN: usize, T>(Vec<T>);

impl<const MIN: usize, T> Repetition<MIN, T> {
    /// Creates the collection if it has at least `MIN` elements.
    pub fn new(values: Vec<T>) -> Option<Self> {
        (values.len() >= MIN).then_some(Self(values))
    }

    /// Returns the first element of the collection.
    pub fn first(&self) -> Option<&T> {
        self.0.first()
    }
}

impl<const MIN: usize, T> Deref for Repetition<MIN, T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const MIN: usize, T> Serialize for Repetition<MIN, T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de, const MIN: usize, T> Deserialize<'de> for Repetition<MIN, T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let values = Vec::<T>::deserialize(deserializer)?;
        let len = values.len();

        Self::new(values).ok_or_else(|| {
            serde::de::Error::invalid_length(len, &"at least the minimum number of elements")
        })
    }
}

/// New type to debug print a byte slice as hex.
pub struct Hex<'a>(&'a [u8]);

impl<'a> Hex<'a> {
    /// Create a new instance for the slice.
    pub fn new(items: &'a [u8]) -> Self {
        Self(items)
    }
}

impl Debug for Hex<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self, f)
    }
}

impl Display for Hex<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn cbor_bstr_roundtrip() {
        let bstr = CborBstr::new((42u8, "foo".to_string()));

        let buf = cbor_encode(&bstr).unwrap();

        // bstr(4) [42, "foo"]
        assert_eq!(buf, [0x46, 0x82, 0x18, 0x2a, 0x63, b'f', b'o', b'o']);

        let back: CborBstr<(u8, String)> = cbor_decode(&buf).unwrap();

        assert_eq!(back, bstr);
        assert_eq!(back.bytes().unwrap(), bstr.bytes().unwrap());
    }

    #[test]
    fn cbor_bstr_keeps_received_bytes() {
        let buf = [0x45, 0x82, 0x01, 0x62, b'h', b'i'];

        let back: CborBstr<(u8, String)> = cbor_decode(&buf).unwrap();

        assert_eq!(*back, (1, "hi".to_string()));

        assert_eq!(back.bytes().unwrap(), &buf[1..]);
    }

    #[test]
    fn cbor_bstr_deref() {
        let bstr = CborBstr::new(vec![1u8, 2]);

        assert_eq!(bstr.len(), 2);
        assert_eq!(bstr.into_inner(), vec![1, 2]);
    }

    #[test]
    fn cbor_decode_rejects_indefinite() {
        // indefinite length array
        let res = cbor_decode::<Vec<u8>>(&[0x9f, 0x01, 0xff]);

        assert!(res.is_err());
    }

    #[test]
    fn signed_payload() {
        let sign = coset::CoseSign1Builder::new()
            .payload(cbor_encode(&(1u8, "two".to_string())).unwrap())
            .signature(vec![0; 4])
            .build();

        let signed = Signed::<(u8, String)>::new(sign);

        assert_eq!(signed.payload().unwrap(), (1, "two".to_string()));

        let buf = cbor_encode(&signed).unwrap();
        assert_eq!(buf, signed.to_bytes().unwrap());

        // untagged array of 4 items
        assert_eq!(buf[0], 0x84);

        let back: Signed<(u8, String)> = cbor_decode(&buf).unwrap();
        assert_eq!(back, signed);
    }

    #[test]
    fn signed_unprotected_header() {
        let header = coset::HeaderBuilder::new()
            .value(256, ciborium::Value::Bytes(vec![1, 2]))
            .build();

        let sign = coset::CoseSign1Builder::new()
            .unprotected(header)
            .payload(vec![0xf6])
            .build();

        let signed = Signed::<()>::new(sign);

        let value: Option<ByteBuf> = signed.unprotected(256).unwrap();
        assert_eq!(value, Some(ByteBuf::from(vec![1, 2])));

        let missing: Option<ByteBuf> = signed.unprotected(257).unwrap();
        assert_eq!(missing, None);

        assert!(signed.unprotected::<String>(256).is_err());
    }

    #[test]
    fn signed_missing_payload() {
        let signed = Signed::<u8>::new(coset::CoseSign1Builder::new().build());

        let err = signed.payload().unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn one_or_more_roundtrip() {
        let one_or_more = OneOrMore::new(vec![42u8]).unwrap();

        let buf = cbor_encode(&one_or_more).unwrap();
        assert_eq!(buf, [0x81, 0x18, 0x2a]);

        let back: OneOrMore<u8> = cbor_decode(&buf).unwrap();

        assert_eq!(back, one_or_more);
    }

    #[test]
    fn one_or_more_empty() {
        assert_eq!(OneOrMore::<u8>::new(vec![]), None);

        let res = cbor_decode::<OneOrMore<u8>>(&[0x80]);

        assert!(res.is_err());
    }

    #[test]
    fn one_or_more_first() {
        let one_or_more = OneOrMore::new(vec![42u8, 7]).unwrap();

        assert_eq!(one_or_more.first(), Some(&42));
        assert_eq!(one_or_more.len(), 2);
    }

    #[test]
    fn hex_display() {
        let value = [0xde, 0xad, 0xbe, 0xef];

        let hex = Hex::new(&value);

        insta::assert_snapshot!(hex, @"deadbeef");
        insta::assert_debug_snapshot!(hex, @"deadbeef");
    }
}
