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

//! Protocol digests and signatures

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::error::ErrorKind;
use crate::utils::Hex;
use crate::Error;

/// Crypto hash
///
/// ```cddl
/// Hash = [
///     hashtype: int, ;; negative values possible
///     hash: bstr
/// ]
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Hash {
    hashtype: Hashtype,
    hash: ByteBuf,
}

impl Hash {
    /// Creates the hash if the length matches the one of the type.
    pub fn new(hashtype: Hashtype, hash: Vec<u8>) -> Option<Self> {
        (hash.len() == hashtype.digest_len()).then(|| Self {
            hashtype,
            hash: ByteBuf::from(hash),
        })
    }

    /// Create a [`SHA256`](Hashtype::Sha256)
    pub fn with_sha256(hash: Vec<u8>) -> Option<Self> {
        Self::new(Hashtype::Sha256, hash)
    }

    /// Create a [`SHA384`](Hashtype::Sha384)
    pub fn with_sha384(hash: Vec<u8>) -> Option<Self> {
        Self::new(Hashtype::Sha384, hash)
    }

    /// Returns the [`Hashtype`]
    pub fn hash_type(&self) -> Hashtype {
        self.hashtype
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.hash
    }
}

impl Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self { hashtype, hash } = self;

        f.debug_struct("Hash")
            .field("hashtype", &hashtype)
            .field("hash", &Hex::new(hash))
            .finish()
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self { hashtype, hash } = self;

        (hashtype, hash).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (hashtype, hash): (Hashtype, ByteBuf) = Deserialize::deserialize(deserializer)?;

        Self::new(hashtype, hash.into_vec())
            .ok_or_else(|| serde::de::Error::custom("hash length doesn't match the hashtype"))
    }
}

/// A HMAC RFC2104 is encoded as a hash.
///
/// ```cddl
/// HMac = Hash
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HMac(Hash);

impl HMac {
    /// Create an [`HMAC-SHA256`](Hashtype::HmacSha256)
    pub fn with_sha256(hash: Vec<u8>) -> Option<Self> {
        Hash::new(Hashtype::HmacSha256, hash).map(Self)
    }

    /// Create an [`HMAC-SHA384`](Hashtype::HmacSha384)
    pub fn with_sha384(hash: Vec<u8>) -> Option<Self> {
        Hash::new(Hashtype::HmacSha384, hash).map(Self)
    }

    /// Return the hash type.
    pub fn hash_type(&self) -> Hashtype {
        self.0.hash_type()
    }
}

impl AsRef<[u8]> for HMac {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl Serialize for HMac {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HMac {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hash = Hash::deserialize(deserializer)?;

        if hash.hash_type().is_hmac() {
            Ok(HMac(hash))
        } else {
            Err(serde::de::Error::custom("invalid hashtype, not a hmac type"))
        }
    }
}

/// ```cddl
/// hashtype = (
///     SHA256: -16,
///     SHA384: -43,
///     HMAC-SHA256: 5,
///     HMAC-SHA384: 6
/// )
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
#[repr(i8)]
pub enum Hashtype {
    /// Sha256 Hash digest
    Sha256 = -16,
    /// Sha384 Hash digest
    Sha384 = -43,
    /// HMAC-SHA256 signature
    HmacSha256 = 5,
    /// HMAC-SHA384 signature
    HmacSha384 = 6,
}

impl Hashtype {
    /// Check if the hash type is a HMAC
    pub fn is_hmac(&self) -> bool {
        match self {
            Hashtype::HmacSha256 | Hashtype::HmacSha384 => true,
            Hashtype::Sha256 | Hashtype::Sha384 => false,
        }
    }

    /// Check if the hash type is a Digest
    pub fn is_hash(&self) -> bool {
        !self.is_hmac()
    }

    /// Length in bytes of the digest.
    pub fn digest_len(&self) -> usize {
        match self {
            Hashtype::Sha256 | Hashtype::HmacSha256 => 32,
            Hashtype::Sha384 | Hashtype::HmacSha384 => 48,
        }
    }
}

impl TryFrom<i8> for Hashtype {
    type Error = Error;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        let value = match value {
            -16 => Hashtype::Sha256,
            -43 => Hashtype::Sha384,
            5 => Hashtype::HmacSha256,
            6 => Hashtype::HmacSha384,
            _ => return Err(Error::new(ErrorKind::OutOfRange, "for HashType")),
        };

        Ok(value)
    }
}

impl From<Hashtype> for i8 {
    fn from(value: Hashtype) -> Self {
        value as i8
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;

    use crate::tests::from_hex;
    use crate::utils::{cbor_decode, cbor_encode};

    use super::*;

    const SHA256: &str = "7424985ee56213b1b0f3699408ac88eae810e6e25596213fc62f1301f96b7d80";
    const SHA384: &str = "8d1e5565befe593307d98a73b4ce7aa22e94ed8d7812ce8393bc42373360bee6a404c283f3662b0d7c4745a34f97d900";

    pub(crate) fn create_hash() -> Hash {
        // Not a valid hash
        Hash::with_sha256(from_hex(SHA256)).unwrap()
    }

    pub(crate) fn create_hmac() -> HMac {
        // Not a valid hash
        HMac::with_sha256(from_hex(
            "7611e85222ca622f3fddf9ef93b7385754ce5e3381e778e9149f130e485974e1",
        ))
        .unwrap()
    }

    #[test]
    fn hash_roundtrip() {
        let case = create_hash();

        let buf = cbor_encode(&case).unwrap();

        assert_eq!(buf, from_hex(&format!("822f5820{SHA256}")));

        let res: Hash = cbor_decode(&buf).unwrap();

        assert_eq!(res, case);
    }

    #[test]
    fn hmac_roundtrip() {
        let case = create_hmac();

        let buf = cbor_encode(&case).unwrap();

        assert_eq!(buf[..3], [0x82, 0x05, 0x58]);

        let res: HMac = cbor_decode(&buf).unwrap();

        assert_eq!(res, case);
    }

    #[test]
    fn hmac_rejects_digest() {
        let buf = cbor_encode(&create_hash()).unwrap();

        assert!(cbor_decode::<HMac>(&buf).is_err());
    }

    #[test]
    fn hash_rejects_wrong_length() {
        let buf = cbor_encode(&(Hashtype::Sha256, ByteBuf::from(vec![0u8; 31]))).unwrap();

        assert!(cbor_decode::<Hash>(&buf).is_err());
    }

    #[test]
    fn hash_debug() {
        let case = create_hash();

        insta::assert_debug_snapshot!(case, @r#"
        Hash {
            hashtype: Sha256,
            hash: 7424985ee56213b1b0f3699408ac88eae810e6e25596213fc62f1301f96b7d80,
        }
        "#);
    }

    #[test]
    fn hash_type_roundtrip() {
        let cases = [
            (Hashtype::Sha256, 0x2f),
            (Hashtype::Sha384, 0x38),
            (Hashtype::HmacSha256, 0x05),
            (Hashtype::HmacSha384, 0x06),
        ];

        for (case, first) in cases {
            let buf = cbor_encode(&case).unwrap();

            assert_eq!(buf[0], first);

            let res: Hashtype = cbor_decode(&buf).unwrap();

            assert_eq!(res, case);
        }
    }

    #[test]
    fn hash_type_try_from_error() {
        let err = Hashtype::try_from(42).unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::OutOfRange);
    }

    #[test]
    fn hash_type_is_hmac_or_hash() {
        let cases = [
            (Hashtype::Sha256, true, false, 32),
            (Hashtype::Sha384, true, false, 48),
            (Hashtype::HmacSha256, false, true, 32),
            (Hashtype::HmacSha384, false, true, 48),
        ];

        for (case, is_hash, is_hmac, len) in cases {
            assert_eq!(case.is_hash(), is_hash);
            assert_eq!(case.is_hmac(), is_hmac);
            assert_eq!(case.digest_len(), len);
        }
    }

    #[test]
    fn hash_create() {
        assert!(Hash::with_sha256(from_hex(SHA256)).is_some());
        assert_eq!(Hash::with_sha256(from_hex(SHA384)), None);
        assert!(Hash::with_sha384(from_hex(SHA384)).is_some());
        assert_eq!(Hash::with_sha384(from_hex(SHA256)), None);
        assert_eq!(HMac::with_sha384(from_hex(SHA256)), None);
    }
}
