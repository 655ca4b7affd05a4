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

//! Self describing value used for every field of every protocol message.
//!
//! The [`Value`] mirrors the subset of CBOR data items the protocol uses. Maps keep the insertion
//! order of their keys, so re-encoding a decoded value is deterministic.

use std::fmt::{Debug, Display};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ErrorKind;
use crate::utils::Hex;
use crate::Error;

/// Integer with arbitrary precision.
///
/// Stored as a sign and a big-endian magnitude using the CBOR convention: a negative integer
/// represents the value `-1 - magnitude`. The magnitude never has leading zero bytes, so two
/// equal integers always have the same representation.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Integer {
    negative: bool,
    magnitude: Vec<u8>,
}

impl Integer {
    /// Creates an integer from a sign and a big-endian magnitude.
    ///
    /// When `negative` is true the value is `-1 - magnitude`.
    pub fn from_parts(negative: bool, magnitude: &[u8]) -> Self {
        let start = magnitude
            .iter()
            .position(|b| *b != 0)
            .unwrap_or(magnitude.len());

        Self {
            negative,
            magnitude: magnitude[start..].to_vec(),
        }
    }

    /// Returns true if the integer is lower than zero.
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Big-endian magnitude, without leading zeros.
    pub fn magnitude(&self) -> &[u8] {
        &self.magnitude
    }

    /// Returns the magnitude if it fits in 64 bits.
    pub(crate) fn magnitude_u64(&self) -> Option<u64> {
        if self.magnitude.len() > 8 {
            return None;
        }

        let mut buf = [0u8; 8];
        buf[8 - self.magnitude.len()..].copy_from_slice(&self.magnitude);

        Some(u64::from_be_bytes(buf))
    }

    fn magnitude_u128(&self) -> Option<u128> {
        if self.magnitude.len() > 16 {
            return None;
        }

        let mut buf = [0u8; 16];
        buf[16 - self.magnitude.len()..].copy_from_slice(&self.magnitude);

        Some(u128::from_be_bytes(buf))
    }

    /// Converts to an [`i128`] if the value is in range.
    pub fn to_i128(&self) -> Option<i128> {
        let magnitude = i128::try_from(self.magnitude_u128()?).ok()?;

        if self.negative {
            Some(-1 - magnitude)
        } else {
            Some(magnitude)
        }
    }

    /// Converts to an [`u128`] if the value is in range.
    pub fn to_u128(&self) -> Option<u128> {
        if self.negative {
            return None;
        }

        self.magnitude_u128()
    }
}

impl From<u128> for Integer {
    fn from(value: u128) -> Self {
        Self::from_parts(false, &value.to_be_bytes())
    }
}

impl From<i128> for Integer {
    fn from(value: i128) -> Self {
        if value < 0 {
            // !value == -1 - value, which is always positive here
            Self::from_parts(true, &(!value).to_be_bytes())
        } else {
            Self::from_parts(false, &value.to_be_bytes())
        }
    }
}

macro_rules! impl_integer_conversion {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Integer {
                fn from(value: $t) -> Self {
                    Self::from(i128::from(value))
                }
            }

            impl TryFrom<&Integer> for $t {
                type Error = Error;

                fn try_from(value: &Integer) -> Result<Self, Self::Error> {
                    value
                        .to_i128()
                        .and_then(|v| <$t>::try_from(v).ok())
                        .ok_or(Error::new(ErrorKind::OutOfRange, concat!("integer for ", stringify!($t))))
                }
            }

            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    Value::Integer(Integer::from(value))
                }
            }
        )*
    };
}

impl_integer_conversion!(u8, u16, u32, u64, i8, i16, i32, i64);

impl Debug for Integer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for Integer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(value) = self.to_i128() {
            return write!(f, "{value}");
        }

        if let Some(value) = self.to_u128() {
            return write!(f, "{value}");
        }

        if self.negative {
            write!(f, "-1-0x{}", Hex::new(&self.magnitude))
        } else {
            write!(f, "0x{}", Hex::new(&self.magnitude))
        }
    }
}

/// Ordered association of unique keys to values.
///
/// Iteration and encoding follow the insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Map(Vec<(Value, Value)>);

impl Map {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Inserts a value, replacing in place the value of an existing key.
    ///
    /// Returns the replaced value if any.
    pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();

        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, old)) => Some(std::mem::replace(old, value)),
            None => {
                self.0.push((key, value));

                None
            }
        }
    }

    /// Builder style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<Value>, value: impl Into<Value>) -> Self {
        self.insert(key, value);

        self
    }

    /// Inserts a new key, fails if it's already present.
    pub(crate) fn try_insert(&mut self, key: Value, value: Value) -> Result<(), Error> {
        if self.contains_key(&key) {
            return Err(Error::new(ErrorKind::Decode, "duplicate map key"));
        }

        self.0.push((key, value));

        Ok(())
    }

    /// Returns the value for the key.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.0.iter().find_map(|(k, v)| (k == key).then_some(v))
    }

    /// Returns the value for an integer key.
    pub fn get_int(&self, key: i64) -> Option<&Value> {
        self.get(&Value::from(key))
    }

    /// Returns the value for a text key.
    pub fn get_text(&self, key: &str) -> Option<&Value> {
        self.0
            .iter()
            .find_map(|(k, v)| (k.as_text() == Some(key)).then_some(v))
    }

    /// Checks if the key is present.
    pub fn contains_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    /// Removes a key, keeping the order of the remaining ones.
    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let idx = self.0.iter().position(|(k, _)| k == key)?;

        Some(self.0.remove(idx).1)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.0.iter().map(|(k, v)| (k, v))
    }
}

impl FromIterator<(Value, Value)> for Map {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let mut map = Map::new();

        for (k, v) in iter {
            map.insert(k, v);
        }

        map
    }
}

impl IntoIterator for Map {
    type Item = (Value, Value);
    type IntoIter = std::vec::IntoIter<(Value, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A dynamically typed protocol value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// The null literal.
    Null,
    /// A boolean.
    Bool(bool),
    /// Integer with arbitrary precision.
    Integer(Integer),
    /// Byte string.
    Bytes(Vec<u8>),
    /// UTF-8 text string.
    Text(String),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Ordered association of values.
    Map(Map),
}

impl Value {
    /// Creates a byte string value.
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(bytes.into())
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean, if it's one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer, if it's one.
    pub fn as_integer(&self) -> Option<&Integer> {
        match self {
            Value::Integer(i) => Some(i),
            _ => None,
        }
    }

    /// Returns the bytes, if it's a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the text, if it's a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Returns the array elements, if it's an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the map, if it's one.
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Converts an integer value into a primitive.
    pub fn to_int<T>(&self) -> Result<T, Error>
    where
        T: for<'a> TryFrom<&'a Integer, Error = Error>,
    {
        self.as_integer()
            .ok_or(Error::new(ErrorKind::Invalid, "value is not an integer"))
            .and_then(T::try_from)
    }

    /// Name of the variant, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Integer(i) => f.debug_tuple("Integer").field(i).finish(),
            Value::Bytes(b) => f.debug_tuple("Bytes").field(&Hex::new(b)).finish(),
            Value::Text(t) => f.debug_tuple("Text").field(t).finish(),
            Value::Array(a) => f.debug_tuple("Array").field(a).finish(),
            Value::Map(m) => f.debug_map().entries(m.iter()).finish(),
        }
    }
}

/// Diagnostic notation, close to the one of RFC 8949.
impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Bytes(b) => write!(f, "h'{}'", Hex::new(b)),
            Value::Text(t) => write!(f, "{t:?}"),
            Value::Array(a) => {
                write!(f, "[")?;
                for (i, v) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Integer> for Value {
    fn from(value: Integer) -> Self {
        Value::Integer(value)
    }
}

impl From<u128> for Value {
    fn from(value: u128) -> Self {
        Value::Integer(value.into())
    }
}

impl From<i128> for Value {
    fn from(value: i128) -> Self {
        Value::Integer(value.into())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<Map> for Value {
    fn from(value: Map) -> Self {
        Value::Map(value)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Converts a serializable type into a [`Value`].
///
/// The type is serialized with ciborium and the bytes are decoded with the strict codec, so the
/// result only contains items the protocol accepts.
pub fn to_value<T>(value: &T) -> Result<Value, Error>
where
    T: Serialize + ?Sized,
{
    let mut buf = Vec::new();

    ciborium::into_writer(value, &mut buf).map_err(|err| {
        #[cfg(feature = "tracing")]
        tracing::error!(error = %err, "couldn't serialize value");

        Error::new(ErrorKind::Encode, "typed value")
    })?;

    crate::codec::from_slice(&buf)
}

/// Converts a [`Value`] into a deserializable type.
pub fn from_value<T>(value: &Value) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    let buf = crate::codec::to_vec(value)?;

    ciborium::from_reader(buf.as_slice()).map_err(|err| {
        #[cfg(feature = "tracing")]
        tracing::error!(error = %err, kind = value.kind_name(), "couldn't deserialize value");

        Error::new(ErrorKind::Decode, "typed value")
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn integer_from_primitives() {
        let cases: [(i128, bool, &[u8]); 6] = [
            (0, false, &[]),
            (1, false, &[1]),
            (255, false, &[0xff]),
            (256, false, &[1, 0]),
            (-1, true, &[]),
            (-256, true, &[0xff]),
        ];

        for (value, negative, magnitude) in cases {
            let int = Integer::from(value);

            assert_eq!(int.is_negative(), negative, "sign of {value}");
            assert_eq!(int.magnitude(), magnitude, "magnitude of {value}");
            assert_eq!(int.to_i128(), Some(value));
        }
    }

    #[test]
    fn integer_extremes() {
        let min = Integer::from(i128::MIN);
        assert_eq!(min.to_i128(), Some(i128::MIN));

        let max = Integer::from(u128::MAX);
        assert_eq!(max.to_i128(), None);
        assert_eq!(max.to_u128(), Some(u128::MAX));

        let big = Integer::from_parts(false, &[1; 20]);
        assert_eq!(big.to_u128(), None);
        assert_eq!(big.magnitude().len(), 20);
    }

    #[test]
    fn integer_strips_leading_zeros() {
        let a = Integer::from_parts(false, &[0, 0, 1, 2]);
        let b = Integer::from(258u16);

        assert_eq!(a, b);
    }

    #[test]
    fn integer_try_into_primitive() {
        let value = Integer::from(300u16);

        assert_eq!(u16::try_from(&value).unwrap(), 300);
        assert!(u8::try_from(&value).is_err());

        let negative = Integer::from(-3i8);
        assert!(u64::try_from(&negative).is_err());
        assert_eq!(i64::try_from(&negative).unwrap(), -3);
    }

    #[test]
    fn map_keeps_insertion_order() {
        let mut map = Map::new();
        map.insert(3, "c");
        map.insert(1, "a");
        map.insert("two", "b");

        let keys: Vec<String> = map.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, ["3", "1", "\"two\""]);

        let old = map.insert(1, "z");
        assert_eq!(old, Some(Value::from("a")));

        let keys: Vec<String> = map.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, ["3", "1", "\"two\""]);
        assert_eq!(map.get_int(1), Some(&Value::from("z")));
        assert_eq!(map.get_text("two"), Some(&Value::from("b")));
    }

    #[test]
    fn map_remove() {
        let mut map = Map::new().with(1, 1).with(2, 2).with(3, 3);

        assert_eq!(map.remove(&Value::from(2)), Some(Value::from(2)));
        assert_eq!(map.len(), 2);
        assert_eq!(map.remove(&Value::from(2)), None);
    }

    #[test]
    fn value_display() {
        let value = Value::Array(vec![
            Value::Null,
            Value::Bool(true),
            Value::from(-10),
            Value::bytes([0xca, 0xfe]),
            Value::from("hi"),
            Value::Map(Map::new().with(1, "a")),
        ]);

        insta::assert_snapshot!(value, @r#"[null, true, -10, h'cafe', "hi", {1: "a"}]"#);
    }

    #[test]
    fn typed_conversion() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Pair(u16, String);

        let pair = Pair(42, "answer".to_string());

        let value = to_value(&pair).unwrap();
        assert_eq!(
            value,
            Value::Array(vec![Value::from(42), Value::from("answer")])
        );

        let back: Pair = from_value(&value).unwrap();
        assert_eq!(back, pair);
    }

    #[test]
    fn to_int() {
        let value = Value::from(7u8);

        assert_eq!(value.to_int::<u16>().unwrap(), 7);
        assert!(Value::Null.to_int::<u16>().is_err());
    }
}
