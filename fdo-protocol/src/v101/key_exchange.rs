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

//! Key exchange parameters, in either direction.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::error::ErrorKind;
use crate::Error;

/// Returns the value as a Key
pub trait AsEccKey<const N: usize, const M: usize> {
    /// Return the x param of the ECC
    fn x(&self) -> &[u8; N];

    /// Return the y param of the ECC
    fn y(&self) -> &[u8; N];

    /// Return the key SEC.1 uncompressed key.
    fn as_key(&self) -> [u8; M] {
        let mut array = [0u8; M];

        array[0] = 0x4;
        let slice = &mut array[1..(N + 1)];
        debug_assert_eq!(slice.len(), N);
        slice.copy_from_slice(self.x());

        let slice = &mut array[(N + 1)..];
        debug_assert_eq!(slice.len(), N);
        slice.copy_from_slice(self.y());

        array
    }
}

/// Parameters for a key exchange with ECC keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcdhParams<'a, const N: usize> {
    x: &'a [u8; N],
    y: &'a [u8; N],
    rand: &'a [u8],
}

impl<'a, const N: usize> EcdhParams<'a, N> {
    /// Return the random part
    pub fn rand(&self) -> &'a [u8] {
        self.rand
    }
}

impl<'a> EcdhParams<'a, 32> {
    /// Create the P-256 params
    pub fn with_p256(x: &'a [u8; 32], y: &'a [u8; 32], rand: &'a [u8]) -> Self {
        Self { x, y, rand }
    }
}

impl<'a> EcdhParams<'a, 48> {
    /// Create the P-256 params
    pub fn with_p384(x: &'a [u8; 48], y: &'a [u8; 48], rand: &'a [u8]) -> Self {
        Self { x, y, rand }
    }
}

impl<'a> AsEccKey<32, 65> for EcdhParams<'a, 32> {
    fn x(&self) -> &[u8; 32] {
        self.x
    }

    fn y(&self) -> &[u8; 32] {
        self.y
    }
}

impl<'a> AsEccKey<48, 97> for EcdhParams<'a, 48> {
    fn x(&self) -> &[u8; 48] {
        self.x
    }

    fn y(&self) -> &[u8; 48] {
        self.y
    }
}

impl<'a, const N: usize> TryFrom<&'a [u8]> for EcdhParams<'a, N> {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<EcdhParams<'_, N>, Self::Error> {
        let (x, rest) = parse_len_prefixed_array(value).ok_or(Error::new(
            ErrorKind::Invalid,
            "for len prefixed slice EcdhParams",
        ))?;

        let (y, rest) = parse_len_prefixed_array(rest).ok_or(Error::new(
            ErrorKind::Invalid,
            "for len prefixed slice EcdhParams",
        ))?;
        let (rand, rest) = parse_len_prefixed_slice(rest).ok_or(Error::new(
            ErrorKind::Invalid,
            "for len prefixed slice EcdhParams",
        ))?;

        if !rest.is_empty() {
            return Err(Error::new(
                ErrorKind::Invalid,
                "for remaining bytes in EcdhParams",
            ));
        }

        Ok(EcdhParams { x, y, rand })
    }
}

fn parse_len_prefixed_array<const N: usize>(bytes: &[u8]) -> Option<(&[u8; N], &[u8])> {
    let (slice, rest) = parse_len_prefixed_slice(bytes)?;

    let array = slice
        .try_into()
        .inspect_err(|err| {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %err, "wrong slice size, expected {N}");
        })
        .ok()?;

    Some((array, rest))
}

fn parse_len_prefixed_slice(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let (blen, rest) = bytes.split_first_chunk::<2>()?;

    let len: usize = u16::from_be_bytes(*blen).into();

    let first = rest.get(..len)?;
    let second = rest.get(len..)?;

    Some((first, second))
}

fn encode_len_prefixed<const N: usize>(params: &EcdhParams<'_, N>) -> Result<ByteBuf, Error> {
    let mut buf = Vec::with_capacity(3 * 2 + 2 * N + params.rand.len());

    for item in [params.x.as_slice(), params.y.as_slice(), params.rand] {
        let len = u16::try_from(item.len())
            .map_err(|_| Error::new(ErrorKind::OutOfRange, "ecdh param len too big"))?;

        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(item);
    }

    Ok(ByteBuf::from(buf))
}

/// Key exchange from owner to device.
///
/// ```cddl
/// KeyExchange /= (
///     xAKeyExchange: bstr,
///     xBKeyExchange: bstr
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[repr(transparent)]
pub struct XAKeyExchange(ByteBuf);

impl XAKeyExchange {
    /// Create the XAKeyExchange from [`EcdhParams`]
    pub fn create<const N: usize>(params: EcdhParams<'_, N>) -> Result<Self, Error> {
        encode_len_prefixed(&params).map(Self)
    }

    /// Returns the [`EcdhParams`] of the exchange.
    pub fn parse_ecdh_p256(&self) -> Result<EcdhParams<'_, 32>, crate::Error> {
        EcdhParams::try_from(self.as_ref())
    }
}

impl AsRef<[u8]> for XAKeyExchange {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Key exchange from device to owner.
///
/// ```cddl
/// KeyExchange /= (
///     xAKeyExchange: bstr,
///     xBKeyExchange: bstr
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[repr(transparent)]
pub struct XBKeyExchange(ByteBuf);

impl XBKeyExchange {
    /// Create the XBKeyExchange from [`EcdhParams`]
    pub fn create<const N: usize>(params: EcdhParams<'_, N>) -> Result<Self, Error> {
        encode_len_prefixed(&params).map(Self)
    }

    /// Returns the [`EcdhParams`] of the exchange.
    pub fn parse_ecdh_p256(&self) -> Result<EcdhParams<'_, 32>, crate::Error> {
        EcdhParams::try_from(self.as_ref())
    }
}

impl AsRef<[u8]> for XBKeyExchange {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// ```cddl
/// IVData = bstr
/// ```
pub type IvData = ByteBuf;

/// Session cryptography algorithms
///
/// Encoded as the text name of the suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum KexSuitNames {
    /// Diffie-Hellman key exchange method using a standard Diffie-Hellman mechanism.
    ///
    /// With a standard NIST exponent and 2048-bit modulus (RFC3526, id 14). This is the preferred
    /// method for RSA2048RESTR Owner keys.
    DHKEXid14,
    /// Diffie-Hellman key exchange method using a standard Diffie-Hellman mechanism
    ///
    /// With a standard National Institute of Standards and Technology (NIST) exponent and 3072-bit
    /// modulus. (RFC3526, id 15), This is the preferred method for RSA 3072-bit Owner keys.
    DHKEXid15,
    /// Asymmetric key exchange method uses the encryption by an Owner key based on RSA2048RESTR.
    ///
    /// This method is useful in FIDO Device Onboard Client environments where Diffie-Hellman
    /// computation is slow or difficult to code.
    ASYMKEX2048,
    /// The Asymmetric key exchange method uses the encryption by an Owner key based on RSA with 3072-bit key.
    ASYMKEX3072,
    /// The ECDH method uses a standard Diffie-Hellman mechanism for ECDSA keys.
    ///
    /// The ECC keys follow NIST P-256 (SECP256R1)
    ECDH256,
    /// Standard Diffie-Hellman mechanism ECC NIST P-384 (SECP384R1)
    ECDH384,
}

impl KexSuitNames {
    /// Name of the suite.
    pub fn as_str(&self) -> &'static str {
        match self {
            KexSuitNames::DHKEXid14 => "DHKEXid14",
            KexSuitNames::DHKEXid15 => "DHKEXid15",
            KexSuitNames::ASYMKEX2048 => "ASYMKEX2048",
            KexSuitNames::ASYMKEX3072 => "ASYMKEX3072",
            KexSuitNames::ECDH256 => "ECDH256",
            KexSuitNames::ECDH384 => "ECDH384",
        }
    }
}

impl TryFrom<String> for KexSuitNames {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = match value.as_str() {
            "DHKEXid14" => KexSuitNames::DHKEXid14,
            "DHKEXid15" => KexSuitNames::DHKEXid15,
            "ASYMKEX2048" => KexSuitNames::ASYMKEX2048,
            "ASYMKEX3072" => KexSuitNames::ASYMKEX3072,
            "ECDH256" => KexSuitNames::ECDH256,
            "ECDH384" => KexSuitNames::ECDH384,
            _ => return Err(Error::new(ErrorKind::OutOfRange, "for KexSuitNames")),
        };

        Ok(value)
    }
}

impl From<KexSuitNames> for String {
    fn from(value: KexSuitNames) -> Self {
        value.as_str().to_string()
    }
}

impl Display for KexSuitNames {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
