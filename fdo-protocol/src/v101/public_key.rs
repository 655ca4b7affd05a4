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

//! Public Key encoding for signature keys.

use std::borrow::Cow;
use std::fmt::Debug;

use coset::iana::{self, EnumI64};
use coset::{AsCborValue, CoseKey, KeyType, Label};
use serde::de::Visitor;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::error::ErrorKind;
use crate::utils::Hex;
use crate::Error;

/// ```cddl
/// PublicKey = [
///     pkType,
///     pkEnc,
///     pkBody
/// ]
/// ```
#[derive(Clone, PartialEq)]
pub struct PublicKey {
    pk_type: PkType,
    pk_body: PkBody,
}

impl PublicKey {
    /// Creates a public key, the encoding is derived from the body.
    pub fn new(pk_type: PkType, pk_body: PkBody) -> Self {
        Self { pk_type, pk_body }
    }

    /// Creates a public key from an uncompressed SEC1 point.
    pub fn with_sec1(pk_type: PkType, point: Vec<u8>) -> Self {
        Self::new(pk_type, PkBody::Crypto(ByteBuf::from(point)))
    }

    /// Returns the [`PkType`]
    pub fn pk_type(&self) -> PkType {
        self.pk_type
    }

    /// Returns the [`PkEnc`]
    pub fn pk_enc(&self) -> PkEnc {
        self.pk_body.enc()
    }

    /// Returns the [`PkBody`]
    pub fn pk_body(&self) -> &PkBody {
        &self.pk_body
    }

    /// Returns the public key as an uncompressed SEC1 point.
    pub fn key(&self) -> Result<Cow<'_, [u8]>, Error> {
        let point_len = self.pk_type.point_len().ok_or(Error::new(
            ErrorKind::Crypto,
            "only elliptic curve keys are supported",
        ))?;

        match &self.pk_body {
            PkBody::Crypto(point) => {
                if point.len() != point_len {
                    return Err(Error::new(ErrorKind::Invalid, "public key point length"));
                }

                Ok(Cow::Borrowed(point.as_slice()))
            }
            PkBody::X509(der) => spki_point(der, point_len).map(Cow::Borrowed),
            PkBody::CoseKey(key) => cose_point(key, point_len).map(Cow::Owned),
        }
    }
}

/// Extracts the point from the BIT STRING at the end of a DER SubjectPublicKeyInfo.
fn spki_point(der: &[u8], point_len: usize) -> Result<&[u8], Error> {
    let start = der
        .len()
        .checked_sub(point_len)
        .ok_or(Error::new(ErrorKind::Invalid, "x509 public key length"))?;

    // BIT STRING with no unused bits
    let (prefix, point) = der.split_at(start);
    if prefix.last() != Some(&0) || point.first() != Some(&SEC1_UNCOMPRESSED) {
        return Err(Error::new(ErrorKind::Invalid, "x509 public key point"));
    }

    Ok(point)
}

fn cose_point(key: &CoseKey, point_len: usize) -> Result<Vec<u8>, Error> {
    if key.kty != KeyType::Assigned(iana::KeyType::EC2) {
        return Err(Error::new(ErrorKind::Invalid, "cose key is not EC2"));
    }

    let param = |label: iana::Ec2KeyParameter| {
        key.params
            .iter()
            .find(|(l, _)| *l == Label::Int(label.to_i64()))
            .and_then(|(_, v)| v.as_bytes())
            .ok_or(Error::new(ErrorKind::Invalid, "cose key missing coordinate"))
    };

    let x = param(iana::Ec2KeyParameter::X)?;
    let y = param(iana::Ec2KeyParameter::Y)?;

    let mut point = Vec::with_capacity(point_len);
    point.push(SEC1_UNCOMPRESSED);
    point.extend_from_slice(x);
    point.extend_from_slice(y);

    if point.len() != point_len {
        return Err(Error::new(ErrorKind::Invalid, "cose key coordinates length"));
    }

    Ok(point)
}

const SEC1_UNCOMPRESSED: u8 = 0x04;

impl Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self { pk_type, pk_body } = self;

        f.debug_struct("PublicKey")
            .field("pk_type", pk_type)
            .field("pk_enc", &pk_body.enc())
            .field("pk_body", pk_body)
            .finish()
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self { pk_type, pk_body } = self;

        (pk_type, pk_body.enc(), pk_body).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PubKeyVisitor;

        impl<'de> Visitor<'de> for PubKeyVisitor {
            type Value = PublicKey;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(formatter, "expecting a PublicKey CBOR sequence")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                if let Some(len) = seq.size_hint() {
                    if len != 3 {
                        return Err(serde::de::Error::invalid_length(
                            len,
                            &"should be a sequence of 3 elements",
                        ));
                    }
                }

                let pk_type = seq.next_element::<PkType>()?.ok_or_else(|| {
                    serde::de::Error::invalid_length(0, &"should be a sequence of 3 elements")
                })?;
                let pk_enc = seq.next_element::<PkEnc>()?.ok_or_else(|| {
                    serde::de::Error::invalid_length(1, &"should be a sequence of 3 elements")
                })?;

                let missing =
                    || serde::de::Error::invalid_length(2, &"should be a sequence of 3 elements");

                let pk_body = match pk_enc {
                    PkEnc::Crypto => PkBody::Crypto(seq.next_element()?.ok_or_else(missing)?),
                    PkEnc::X509 => PkBody::X509(seq.next_element()?.ok_or_else(missing)?),
                    PkEnc::CoseKey => {
                        let value = seq
                            .next_element::<ciborium::Value>()?
                            .ok_or_else(missing)?;

                        let key = CoseKey::from_cbor_value(value)
                            .map_err(serde::de::Error::custom)?;

                        PkBody::CoseKey(key)
                    }
                };

                Ok(PublicKey { pk_type, pk_body })
            }
        }

        deserializer.deserialize_seq(PubKeyVisitor)
    }
}

/// KeyType is an FDO pkType enum.
///
/// ```cddl
/// pkType = (
///     RSA2048RESTR: 1, ;; RSA 2048 with restricted key/exponent (PKCS1 1.5 encoding)
///     RSAPKCS:      5, ;; RSA key, PKCS1, v1.5
///     RSAPSS:       6, ;; RSA key, PSS
///     SECP256R1:    10, ;; ECDSA secp256r1 = NIST-P-256 = prime256v1
///     SECP384R1:    11, ;; ECDSA secp384r1 = NIST-P-384
/// )
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum PkType {
    /// RSA 2048 with restricted key/exponent (PKCS1 1.5 encoding)
    Rsa2048Restr = 1,
    /// RSA key, PKCS1, v1.5
    RsaPkcs = 5,
    /// RSA key, PSS
    RsaPss = 6,
    /// ECDSA secp256r1 = NIST-P-256 = prime256v1
    Secp256R1 = 10,
    /// ECDSA secp384r1 = NIST-P-384
    Secp384R1 = 11,
}

impl PkType {
    /// Length of an uncompressed SEC1 point, only for elliptic curves.
    pub fn point_len(&self) -> Option<usize> {
        match self {
            PkType::Secp256R1 => Some(1 + 2 * 32),
            PkType::Secp384R1 => Some(1 + 2 * 48),
            PkType::Rsa2048Restr | PkType::RsaPkcs | PkType::RsaPss => None,
        }
    }
}

impl TryFrom<u8> for PkType {
    type Error = crate::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let value = match value {
            1 => PkType::Rsa2048Restr,
            5 => PkType::RsaPkcs,
            6 => PkType::RsaPss,
            10 => PkType::Secp256R1,
            11 => PkType::Secp384R1,
            _ => return Err(Error::new(ErrorKind::OutOfRange, "for PkType")),
        };

        Ok(value)
    }
}

impl From<PkType> for u8 {
    fn from(value: PkType) -> Self {
        value as u8
    }
}

/// Encoding of the PublicKey body
///
/// ```cddl
/// pkEnc = (
///     Crypto:       0      ;; applies to crypto with its own encoding
///     X509:         1,     ;; X509 DER encoding, applies to RSA and ECDSA
///     COSEKEY:      3      ;; COSE key encoding
/// )
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum PkEnc {
    /// Applies to crypto with its own encoding, for EC keys the SEC1 point.
    Crypto = 0,
    /// X509 DER encoding, applies to RSA and ECDSA
    X509 = 1,
    /// COSE key encoding
    CoseKey = 3,
}

impl TryFrom<u8> for PkEnc {
    type Error = crate::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let value = match value {
            0 => PkEnc::Crypto,
            1 => PkEnc::X509,
            3 => PkEnc::CoseKey,
            _ => return Err(Error::new(ErrorKind::OutOfRange, "for PkEnc")),
        };

        Ok(value)
    }
}

impl From<PkEnc> for u8 {
    fn from(value: PkEnc) -> Self {
        value as u8
    }
}

/// Body of a [`PublicKey`], it depends on the [`PkEnc`].
#[derive(Clone, PartialEq)]
pub enum PkBody {
    /// Uncompressed SEC1 point.
    Crypto(ByteBuf),
    /// X509 DER encoding of the SubjectPublicKeyInfo
    X509(ByteBuf),
    /// COSE key encoding
    CoseKey(CoseKey),
}

impl PkBody {
    /// Encoding of the body.
    pub fn enc(&self) -> PkEnc {
        match self {
            PkBody::Crypto(_) => PkEnc::Crypto,
            PkBody::X509(_) => PkEnc::X509,
            PkBody::CoseKey(_) => PkEnc::CoseKey,
        }
    }
}

impl Debug for PkBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Crypto(key) => f.debug_tuple("Crypto").field(&Hex::new(key)).finish(),
            Self::X509(der) => f.debug_tuple("X509").field(&Hex::new(der)).finish(),
            Self::CoseKey(key) => f.debug_tuple("CoseKey").field(key).finish(),
        }
    }
}

impl Serialize for PkBody {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            PkBody::Crypto(buf) | PkBody::X509(buf) => buf.serialize(serializer),
            PkBody::CoseKey(cose_key) => cose_key
                .clone()
                .to_cbor_value()
                .map_err(serde::ser::Error::custom)?
                .serialize(serializer),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use coset::CoseKeyBuilder;
    use pretty_assertions::assert_eq;

    use crate::tests::from_hex;
    use crate::utils::{cbor_decode, cbor_encode};

    use super::*;

    // Point of a P-256 public key
    pub(crate) const EC_POINT: &str = "04\
        60fed4ba255a9d31c961eb74c6356d68c049b8923b61fa6ce669622e60f29fb6\
        7903fe1008b8bc99a41ae9e95628bc64f2f1b20c2d7e9f5177a3c294d4462299";

    // DER prefix of a P-256 SubjectPublicKeyInfo
    const SPKI_PREFIX: &str = "3059301306072a8648ce3d020106082a8648ce3d030107034200";

    pub(crate) fn create_public_key() -> PublicKey {
        PublicKey::with_sec1(PkType::Secp256R1, from_hex(EC_POINT))
    }

    fn cose_key() -> CoseKey {
        let point = from_hex(EC_POINT);

        CoseKeyBuilder::new_ec2_pub_key(
            iana::EllipticCurve::P_256,
            point[1..33].to_vec(),
            point[33..].to_vec(),
        )
        .build()
    }

    fn pub_key_cases() -> [PkBody; 3] {
        [
            PkBody::Crypto(ByteBuf::from(from_hex(EC_POINT))),
            PkBody::X509(ByteBuf::from(from_hex(&format!("{SPKI_PREFIX}{EC_POINT}")))),
            PkBody::CoseKey(cose_key()),
        ]
    }

    #[test]
    fn public_key_roundtrip() {
        for case in pub_key_cases() {
            let pub_key = PublicKey::new(PkType::Secp256R1, case);

            let buf = cbor_encode(&pub_key).unwrap();

            // [10, enc, ..]
            assert_eq!(buf[..3], [0x83, 0x0a, u8::from(pub_key.pk_enc())]);

            let res: PublicKey = cbor_decode(&buf).unwrap();

            assert_eq!(res, pub_key);
        }
    }

    #[test]
    fn pubkey_get_key() {
        let exp = from_hex(EC_POINT);

        for case in pub_key_cases() {
            let pub_key = PublicKey::new(PkType::Secp256R1, case);

            assert_eq!(pub_key.key().unwrap().as_ref(), exp.as_slice());
        }
    }

    #[test]
    fn pubkey_wrong_length() {
        let pub_key = PublicKey::with_sec1(PkType::Secp384R1, from_hex(EC_POINT));

        let err = pub_key.key().unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::Invalid);

        let pub_key = PublicKey::with_sec1(PkType::RsaPss, from_hex(EC_POINT));

        let err = pub_key.key().unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::Crypto);
    }

    #[test]
    fn public_key_debug() {
        let pub_key = PublicKey::with_sec1(PkType::Secp256R1, vec![4, 1, 2]);

        insta::assert_debug_snapshot!(pub_key, @r#"
        PublicKey {
            pk_type: Secp256R1,
            pk_enc: Crypto,
            pk_body: Crypto(
                040102,
            ),
        }
        "#);
    }

    #[test]
    fn pk_type_roundtrip() {
        let cases = [
            PkType::Rsa2048Restr,
            PkType::RsaPkcs,
            PkType::RsaPss,
            PkType::Secp256R1,
            PkType::Secp384R1,
        ];

        for case in cases {
            let buf = cbor_encode(&case).unwrap();

            assert_eq!(buf, [u8::from(case)]);

            let res: PkType = cbor_decode(&buf).unwrap();

            assert_eq!(res, case);
        }
    }

    #[test]
    fn public_key_err() {
        let cases = [
            Vec::new(),
            vec![ciborium::Value::Integer(10.into())],
            vec![
                ciborium::Value::Integer(10.into()),
                ciborium::Value::Integer(0.into()),
            ],
            // x5chain is not supported
            vec![
                ciborium::Value::Integer(10.into()),
                ciborium::Value::Integer(2.into()),
                ciborium::Value::Bytes(vec![1]),
            ],
        ];

        for case in cases {
            let buf = cbor_encode(&ciborium::Value::Array(case)).unwrap();

            assert!(cbor_decode::<PublicKey>(&buf).is_err());
        }
    }
}
