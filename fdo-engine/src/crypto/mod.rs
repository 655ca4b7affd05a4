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

//! Crypto operations like signing, hashing and encryption.
//!
//! The [`Crypto`] trait abstracts the secrets held by a device, while the free functions are the
//! primitives shared by the devices and the servers.

use std::future::Future;

use aws_lc_rs::constant_time;
use coset::iana::Algorithm as CoseAlgorithm;
use coset::{CoseSign1, HeaderBuilder};
use fdo_protocol::error::ErrorKind;
use fdo_protocol::v101::hash_hmac::{HMac, Hash, Hashtype};
use fdo_protocol::v101::key_exchange::{KexSuitNames, XAKeyExchange, XBKeyExchange};
use fdo_protocol::v101::public_key::{PkType, PublicKey};
use fdo_protocol::v101::sign_info::DeviceSgType;
use fdo_protocol::v101::Nonce;
use fdo_protocol::Error;
use serde_bytes::ByteArray;
use tracing::{debug, error};

use self::session::SessionKey;

pub(crate) mod kdf;
pub mod keys;
pub mod session;
pub mod software;

/// Cryptographic operations needed by a device for FDO.
pub trait Crypto: Send {
    /// Public key type
    fn pk_type(&self) -> PkType;

    /// Device Signing information.
    ///
    /// Is used to encode parameters for the device attestation signature.
    fn sign_info_type(&self) -> DeviceSgType;

    /// Key exchange parameters.
    fn kex_suit(&self) -> KexSuitNames;

    /// Encryption algorithm for `CoseEncrypt0` objects
    fn cipher_suite(&self) -> CoseAlgorithm;

    /// Public part of the device attestation key.
    fn public_key(&mut self) -> impl Future<Output = Result<PublicKey, Error>> + Send;

    /// Create a hmac secret and return it sealed.
    fn hmac_secret(&mut self) -> impl Future<Output = Result<Vec<u8>, Error>> + Send;

    /// Signs the data using the provided sealed secret.
    fn hmac(
        &mut self,
        sealed: &[u8],
        data: &[u8],
    ) -> impl Future<Output = Result<HMac, Error>> + Send;

    /// Verifies an HMac signature with a provided sealed secret.
    fn verify_hmac(
        &mut self,
        sealed: &[u8],
        hmac: &HMac,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Signs a payload into a COSE Sign1 object with the device key.
    fn cose_sign(
        &mut self,
        unprotected: HeaderBuilder,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<CoseSign1, Error>> + Send;

    /// Creates a random [`Nonce`]
    fn create_nonce(&mut self) -> impl Future<Output = Result<Nonce, Error>> + Send {
        std::future::ready(nonce())
    }

    /// Used in the key exchange.
    ///
    /// Generates an ephemeral key for the communication with the owner.
    fn key_exchange(
        &mut self,
        ow_key: &XAKeyExchange,
    ) -> impl Future<Output = Result<(XBKeyExchange, SessionKey), Error>> + Send {
        std::future::ready(session::device_key_exchange(ow_key))
    }
}

/// Fills an array with random bytes.
pub fn random<const N: usize>() -> Result<[u8; N], Error> {
    let mut buf = [0u8; N];

    aws_lc_rs::rand::fill(&mut buf).map_err(|_| Error::new(ErrorKind::Crypto, "to fill random"))?;

    Ok(buf)
}

/// Creates a random [`Nonce`]
pub fn nonce() -> Result<Nonce, Error> {
    random::<16>().map(ByteArray::new)
}

fn digest_alg(hash_type: Hashtype) -> Result<&'static aws_lc_rs::digest::Algorithm, Error> {
    match hash_type {
        Hashtype::Sha256 => Ok(&aws_lc_rs::digest::SHA256),
        Hashtype::Sha384 => Ok(&aws_lc_rs::digest::SHA384),
        Hashtype::HmacSha256 | Hashtype::HmacSha384 => {
            Err(Error::new(ErrorKind::Invalid, "hmac type instead of hash"))
        }
    }
}

fn hmac_alg(hash_type: Hashtype) -> Result<aws_lc_rs::hmac::Algorithm, Error> {
    match hash_type {
        Hashtype::HmacSha256 => Ok(aws_lc_rs::hmac::HMAC_SHA256),
        Hashtype::HmacSha384 => Ok(aws_lc_rs::hmac::HMAC_SHA384),
        Hashtype::Sha256 | Hashtype::Sha384 => {
            Err(Error::new(ErrorKind::Invalid, "hash type for hmac"))
        }
    }
}

/// Computes a digest
pub fn hash(hash_type: Hashtype, data: &[u8]) -> Result<Hash, Error> {
    let digest = aws_lc_rs::digest::digest(digest_alg(hash_type)?, data);

    Hash::new(hash_type, digest.as_ref().to_vec()).ok_or(Error::new(ErrorKind::Invalid, "digest"))
}

/// Hash algorithm matching the strength of a public key.
pub fn hash_type_for_key(key: &PublicKey) -> Hashtype {
    match key.pk_type() {
        PkType::Secp384R1 => Hashtype::Sha384,
        PkType::Secp256R1 | PkType::Rsa2048Restr | PkType::RsaPkcs | PkType::RsaPss => {
            Hashtype::Sha256
        }
    }
}

/// HMAC algorithm of the voucher header for a device key.
pub fn hmac_type_for_key(key: &PublicKey) -> Hashtype {
    match hash_type_for_key(key) {
        Hashtype::Sha384 => Hashtype::HmacSha384,
        _ => Hashtype::HmacSha256,
    }
}

/// Computes a digest with the algorithm matching the strength of the key.
pub fn hash_for_key(key: &PublicKey, data: &[u8]) -> Result<Hash, Error> {
    hash(hash_type_for_key(key), data)
}

/// Verifies an Hash
pub fn verify_hash(to_check: &Hash, data: &[u8]) -> Result<(), Error> {
    let digest = aws_lc_rs::digest::digest(digest_alg(to_check.hash_type())?, data);

    constant_time::verify_slices_are_equal(to_check.as_ref(), digest.as_ref())
        .map_err(|_| Error::new(ErrorKind::Invalid, "hash mismatch"))
}

/// Computes an HMac over the data.
pub fn hmac(hash_type: Hashtype, secret: &[u8], data: &[u8]) -> Result<HMac, Error> {
    let key = aws_lc_rs::hmac::Key::new(hmac_alg(hash_type)?, secret);

    let tag = aws_lc_rs::hmac::sign(&key, data);

    let hmac = match hash_type {
        Hashtype::HmacSha384 => HMac::with_sha384(tag.as_ref().to_vec()),
        _ => HMac::with_sha256(tag.as_ref().to_vec()),
    };

    hmac.ok_or(Error::new(ErrorKind::Invalid, "to create hmac"))
}

/// Verifies an HMac over the data.
pub fn verify_hmac(secret: &[u8], hmac: &HMac, data: &[u8]) -> Result<(), Error> {
    let key = aws_lc_rs::hmac::Key::new(hmac_alg(hmac.hash_type())?, secret);

    aws_lc_rs::hmac::verify(&key, data, hmac.as_ref())
        .map_err(|_| Error::new(ErrorKind::Crypto, "to verify hmac"))
}

/// Algorithm used to sign with a key of the given type.
pub fn cose_alg_for(pk_type: PkType) -> Result<CoseAlgorithm, Error> {
    match pk_type {
        PkType::Secp256R1 => Ok(CoseAlgorithm::ES256),
        PkType::Secp384R1 => Ok(CoseAlgorithm::ES384),
        PkType::Rsa2048Restr | PkType::RsaPkcs | PkType::RsaPss => Err(Error::new(
            ErrorKind::Crypto,
            "only elliptic curve keys are supported",
        )),
    }
}

/// Verifies a COSE signature.
pub fn verify_cose_signature(sign: &CoseSign1, pub_key: &PublicKey) -> Result<(), Error> {
    let alg = sign
        .protected
        .header
        .alg
        .as_ref()
        .and_then(|alg| match alg {
            coset::RegisteredLabelWithPrivate::Assigned(alg) => Some(alg),
            coset::RegisteredLabelWithPrivate::PrivateUse(_)
            | coset::RegisteredLabelWithPrivate::Text(_) => None,
        })
        .ok_or(Error::new(ErrorKind::Invalid, "missing alg header"))?;

    debug!(
        pub_key = ?pub_key.pk_type(),
        algo = ?alg,
        "checking algorithm and public key"
    );

    let verification = match (pub_key.pk_type(), alg) {
        (PkType::Secp256R1, CoseAlgorithm::ES256) => &aws_lc_rs::signature::ECDSA_P256_SHA256_FIXED,
        (PkType::Secp384R1, CoseAlgorithm::ES384) => &aws_lc_rs::signature::ECDSA_P384_SHA384_FIXED,
        _ => {
            return Err(Error::new(
                ErrorKind::Crypto,
                "unsupported or invalid cose signing algorithm and public key pair",
            ))
        }
    };

    let key = pub_key.key()?;
    let key = aws_lc_rs::signature::UnparsedPublicKey::new(verification, key.as_ref());

    sign.verify_signature(&[], |signature, message| key.verify(message, signature))
        .map_err(|err| {
            error!(error = %err, "cose signature mismatch");

            Error::new(ErrorKind::Crypto, "to verify cose signature")
        })
}

/// Splits an uncompressed SEC1 point in its coordinates.
pub(crate) fn parse_ecc_params<const N: usize>(buf: &[u8]) -> Result<(&[u8; N], &[u8; N]), Error> {
    // 0x4 || x || y
    if buf.len() != 1 + N + N {
        debug!(key_len = buf.len());

        return Err(Error::new(ErrorKind::Invalid, "ecc key length"));
    }

    let Some((0x4, point)) = buf.split_first() else {
        return Err(Error::new(ErrorKind::Invalid, "ecc first byte encoding"));
    };

    let (x, y) = point.split_at(N);

    let x: &[u8; N] = x
        .try_into()
        .map_err(|_| Error::new(ErrorKind::Invalid, "x param length"))?;

    let y: &[u8; N] = y
        .try_into()
        .map_err(|_| Error::new(ErrorKind::Invalid, "y param length"))?;

    Ok((x, y))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::keys::SigningKey;
    use super::*;

    #[test]
    fn hash_and_verify() {
        let digest = hash(Hashtype::Sha256, b"fdo").unwrap();

        assert_eq!(digest.hash_type(), Hashtype::Sha256);
        verify_hash(&digest, b"fdo").unwrap();

        let err = verify_hash(&digest, b"other").unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn hash_rejects_hmac_type() {
        let err = hash(Hashtype::HmacSha256, b"fdo").unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn hash_follows_key_strength() {
        let p384 = SigningKey::generate(PkType::Secp384R1).unwrap();

        let digest = hash_for_key(&p384.public_key(), b"fdo").unwrap();

        assert_eq!(digest.hash_type(), Hashtype::Sha384);
        assert_eq!(digest.as_ref().len(), 48);
    }

    #[test]
    fn hmac_follows_key_strength() {
        let p256 = SigningKey::generate(PkType::Secp256R1).unwrap();
        let p384 = SigningKey::generate(PkType::Secp384R1).unwrap();

        assert_eq!(hmac_type_for_key(&p256.public_key()), Hashtype::HmacSha256);
        assert_eq!(hmac_type_for_key(&p384.public_key()), Hashtype::HmacSha384);
    }

    #[test]
    fn hmac_and_verify() {
        let secret = random::<32>().unwrap();

        let tag = hmac(Hashtype::HmacSha256, &secret, b"header").unwrap();

        verify_hmac(&secret, &tag, b"header").unwrap();
        verify_hmac(&secret, &tag, b"changed").unwrap_err();
        verify_hmac(&[0; 32], &tag, b"header").unwrap_err();
    }

    #[test]
    fn cose_signature_with_wrong_key() {
        let signer = SigningKey::generate(PkType::Secp256R1).unwrap();
        let other = SigningKey::generate(PkType::Secp256R1).unwrap();

        let sign = signer
            .sign_cose(HeaderBuilder::new(), b"payload".to_vec())
            .unwrap();

        verify_cose_signature(&sign, &signer.public_key()).unwrap();

        let err = verify_cose_signature(&sign, &other.public_key()).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::Crypto);
    }

    #[test]
    fn cose_signature_with_mismatched_curve() {
        let signer = SigningKey::generate(PkType::Secp256R1).unwrap();
        let other = SigningKey::generate(PkType::Secp384R1).unwrap();

        let sign = signer
            .sign_cose(HeaderBuilder::new(), b"payload".to_vec())
            .unwrap();

        verify_cose_signature(&sign, &other.public_key()).unwrap_err();
    }

    #[test]
    fn parse_p384_point() {
        let mut point = vec![0x4];
        point.extend([1; 48]);
        point.extend([2; 48]);

        let (x, y) = parse_ecc_params::<48>(&point).unwrap();

        assert_eq!(x, &[1; 48]);
        assert_eq!(y, &[2; 48]);

        parse_ecc_params::<32>(&point).unwrap_err();
    }
}
