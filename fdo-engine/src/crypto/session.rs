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

//! Key exchange and encryption of the TO2 messages after `TO2.ProveDevice`.

use std::fmt::Debug;

use aws_lc_rs::aead::{Aad, RandomizedNonceKey, AES_256_GCM};
use aws_lc_rs::agreement::{self, UnparsedPublicKey, ECDH_P256};
use aws_lc_rs::encoding::{AsBigEndian, EcPrivateKeyBin};
use coset::{CborSerializable, CoseEncrypt0, CoseEncrypt0Builder, HeaderBuilder};
use fdo_protocol::codec;
use fdo_protocol::error::ErrorKind;
use fdo_protocol::v101::key_exchange::{AsEccKey, EcdhParams, XAKeyExchange, XBKeyExchange};
use fdo_protocol::{Error, Value};
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use tracing::{debug, error};
use zeroize::{Zeroize, Zeroizing};

use super::{kdf, parse_ecc_params, random};

const LABEL: &[u8; 8] = b"FIDO-KDF";
// Context rand is "" for ECDH256
const CONTEXT: &[u8; 22] = b"AutomaticOnboardTunnel";

const KEY_LEN: usize = 32;

/// Size of the random part of the key exchange for ECDH256.
const RAND_LEN: usize = 16;

/// Symmetric key of a TO2 session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey(Zeroizing<[u8; KEY_LEN]>);

impl SessionKey {
    /// Derive the key from the shared secret `shx || deviceRand || ownerRand`.
    fn derive(sh_x: &[u8], device_rand: &[u8], owner_rand: &[u8]) -> Result<Self, Error> {
        let mut sh_se = Zeroizing::new(Vec::with_capacity(
            sh_x.len() + device_rand.len() + owner_rand.len(),
        ));
        sh_se.extend_from_slice(sh_x);
        sh_se.extend_from_slice(device_rand);
        sh_se.extend_from_slice(owner_rand);

        let mut output_key = Zeroizing::new([0u8; KEY_LEN]);

        kdf::counter_mode(
            aws_lc_rs::hmac::HMAC_SHA256,
            &sh_se,
            LABEL,
            CONTEXT,
            output_key.as_mut_slice(),
        )?;

        Ok(Self(output_key))
    }

    fn aead(&self) -> Result<RandomizedNonceKey, Error> {
        RandomizedNonceKey::new(&AES_256_GCM, self.0.as_slice())
            .map_err(|_| Error::new(ErrorKind::Crypto, "to create randomized nonce"))
    }

    /// Encrypts a message body into a `COSE_Encrypt0` object.
    pub fn seal(&self, body: &Value) -> Result<Value, Error> {
        let key = self.aead()?;

        let payload = codec::to_vec(body)?;

        let protected = HeaderBuilder::new()
            .algorithm(coset::iana::Algorithm::A256GCM)
            .build();

        let mut nonce = None;

        let builder = CoseEncrypt0Builder::new()
            .protected(protected)
            .try_create_ciphertext(&payload, &[], |plain, aad| {
                let mut in_out = Vec::from(plain);

                let gen_nonce = key
                    .seal_in_place_append_tag(Aad::from(aad), &mut in_out)
                    .map_err(|_| Error::new(ErrorKind::Crypto, "to encrypt message"))?;
                nonce = Some(gen_nonce);

                Ok::<_, Error>(in_out)
            })?;

        let nonce = nonce.ok_or(Error::new(ErrorKind::Invalid, "nonce not created"))?;

        let unprotected = HeaderBuilder::new().iv(nonce.as_ref().to_vec()).build();

        let enc = builder.unprotected(unprotected).build().to_vec().map_err(|err| {
            error!(error = %err, "couldn't encode COSE_Encrypt0");

            Error::new(ErrorKind::Encode, "COSE_Encrypt0")
        })?;

        codec::from_slice(&enc)
    }

    /// Decrypts a `COSE_Encrypt0` message body.
    pub fn open(&self, body: &Value) -> Result<Value, Error> {
        let enc = CoseEncrypt0::from_slice(&codec::to_vec(body)?).map_err(|err| {
            error!(error = %err, "couldn't decode COSE_Encrypt0");

            Error::new(ErrorKind::Decode, "COSE_Encrypt0")
        })?;

        let alg = enc.protected.header.alg.as_ref().ok_or(Error::new(
            ErrorKind::Invalid,
            "missing alg header in cose object",
        ))?;

        if *alg != coset::RegisteredLabelWithPrivate::Assigned(coset::iana::Algorithm::A256GCM) {
            debug!(?alg);

            return Err(Error::new(ErrorKind::Invalid, "invalid cose algorithm"));
        }

        let key = self.aead()?;

        let nonce = aws_lc_rs::aead::Nonce::try_assume_unique_for_key(&enc.unprotected.iv)
            .map_err(|_| Error::new(ErrorKind::Crypto, "to create aead nonce"))?;

        let plain = enc.decrypt_ciphertext(
            &[],
            || Error::new(ErrorKind::Invalid, "missing cypher text"),
            |ciphertext, aad| {
                let mut in_out = Vec::from(ciphertext);

                let len = key
                    .open_in_place(nonce, Aad::from(aad), &mut in_out)
                    .map_err(|_| Error::new(ErrorKind::Crypto, "to decrypt message"))?
                    .len();

                // remove the tag
                in_out.truncate(len);

                Ok(in_out)
            },
        )?;

        codec::from_slice(&plain)
    }
}

impl Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(REDACTED)")
    }
}

impl Serialize for SessionKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde_bytes::Bytes::new(self.0.as_slice()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SessionKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = Zeroizing::new(ByteBuf::deserialize(deserializer)?.into_vec());

        let key = <[u8; KEY_LEN]>::try_from(bytes.as_slice())
            .map_err(|_| serde::de::Error::custom("session key length"))?;

        Ok(Self(Zeroizing::new(key)))
    }
}

fn point_params<'a>(point: &'a [u8], rand: &'a [u8]) -> Result<EcdhParams<'a, 32>, Error> {
    let (x, y) = parse_ecc_params::<32>(point)?;

    Ok(EcdhParams::with_p256(x, y, rand))
}

/// Owner half of an ECDH256 exchange, kept between `TO2.HelloDevice` and `TO2.ProveDevice`.
#[derive(Clone, Serialize, Deserialize)]
pub struct OwnerKeyExchange {
    private: ByteBuf,
    owner_rand: ByteBuf,
}

impl OwnerKeyExchange {
    /// Generates the owner parameters, returning the ones to send to the device.
    pub fn generate() -> Result<(XAKeyExchange, Self), Error> {
        let private = agreement::PrivateKey::generate(&ECDH_P256)
            .map_err(|_| Error::new(ErrorKind::Crypto, "to create agreement key"))?;

        let owner_rand = random::<RAND_LEN>()?;

        let public = private
            .compute_public_key()
            .map_err(|_| Error::new(ErrorKind::Crypto, "to compute the public key"))?;

        let xa_key_exchange = XAKeyExchange::create(point_params(public.as_ref(), &owner_rand)?)?;

        let private: EcPrivateKeyBin = private
            .as_be_bytes()
            .map_err(|_| Error::new(ErrorKind::Crypto, "to export agreement key"))?;

        let this = Self {
            private: ByteBuf::from(private.as_ref()),
            owner_rand: ByteBuf::from(owner_rand),
        };

        Ok((xa_key_exchange, this))
    }

    /// Completes the exchange with the device parameters.
    pub fn derive(&self, xb_key_exchange: &XBKeyExchange) -> Result<SessionKey, Error> {
        let private = agreement::PrivateKey::from_private_key(&ECDH_P256, &self.private)
            .map_err(|_| Error::new(ErrorKind::Crypto, "to import agreement key"))?;

        let device = xb_key_exchange.parse_ecdh_p256()?;

        let device_key = UnparsedPublicKey::new(&ECDH_P256, device.as_key());

        agreement::agree(
            &private,
            &device_key,
            Error::new(ErrorKind::Crypto, "failed key agreement"),
            |sh_x: &[u8]| SessionKey::derive(sh_x, device.rand(), &self.owner_rand),
        )
    }
}

impl Drop for OwnerKeyExchange {
    fn drop(&mut self) {
        self.private.as_mut_slice().zeroize();
    }
}

impl Debug for OwnerKeyExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerKeyExchange")
            .field("private", &"REDACTED")
            .finish_non_exhaustive()
    }
}

/// Device half of an ECDH256 exchange.
pub(crate) fn device_key_exchange(
    ow_key: &XAKeyExchange,
) -> Result<(XBKeyExchange, SessionKey), Error> {
    let rng = aws_lc_rs::rand::SystemRandom::new();

    let dv_priv_key = agreement::EphemeralPrivateKey::generate(&ECDH_P256, &rng)
        .map_err(|_| Error::new(ErrorKind::Crypto, "to create agreement key"))?;

    let dv_rand = random::<RAND_LEN>()?;

    let dv_pub_key = dv_priv_key
        .compute_public_key()
        .map_err(|_| Error::new(ErrorKind::Crypto, "to compute the public key"))?;

    let xb_key_exchange = XBKeyExchange::create(point_params(dv_pub_key.as_ref(), &dv_rand)?)?;

    let ow_params = ow_key.parse_ecdh_p256()?;

    let ow_pub_key = UnparsedPublicKey::new(&ECDH_P256, ow_params.as_key());

    let key = agreement::agree_ephemeral(
        dv_priv_key,
        &ow_pub_key,
        Error::new(ErrorKind::Crypto, "failed key agreement"),
        |sh_x: &[u8]| SessionKey::derive(sh_x, &dv_rand, ow_params.rand()),
    )?;

    Ok((xb_key_exchange, key))
}

#[cfg(test)]
mod tests {
    use fdo_protocol::Map;
    use pretty_assertions::assert_eq;

    use super::*;

    fn exchange() -> (SessionKey, SessionKey) {
        let (xa, owner) = OwnerKeyExchange::generate().unwrap();

        let (xb, device_key) = device_key_exchange(&xa).unwrap();

        let owner_key = owner.derive(&xb).unwrap();

        (owner_key, device_key)
    }

    #[test]
    fn both_sides_derive_same_key() {
        let (owner, device) = exchange();

        assert_eq!(owner, device);
    }

    #[test]
    fn seal_and_open() {
        let (owner, device) = exchange();

        let body = Value::Array(vec![
            Value::Bool(true),
            Value::Map(Map::new().with(1, Value::Text("fdo".to_string()))),
        ]);

        let sealed = owner.seal(&body).unwrap();
        assert_ne!(sealed, body);

        let opened = device.open(&sealed).unwrap();
        assert_eq!(opened, body);
    }

    #[test]
    fn open_with_other_key_fails() {
        let (owner, _) = exchange();
        let (other, _) = exchange();

        let sealed = owner.seal(&Value::Null).unwrap();

        let err = other.open(&sealed).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::Crypto);
    }

    #[test]
    fn plaintext_is_not_accepted() {
        let (owner, _) = exchange();

        let err = owner.open(&Value::Array(vec![Value::Null])).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn owner_exchange_survives_serialization() {
        let (xa, owner) = OwnerKeyExchange::generate().unwrap();

        let bytes = fdo_protocol::utils::cbor_encode(&owner).unwrap();
        let restored: OwnerKeyExchange = fdo_protocol::utils::cbor_decode(&bytes).unwrap();

        let (xb, device) = device_key_exchange(&xa).unwrap();

        assert_eq!(restored.derive(&xb).unwrap(), device);
    }

    #[test]
    fn debug_is_redacted() {
        let (key, _) = exchange();

        insta::assert_snapshot!(format!("{key:?}"), @"SessionKey(REDACTED)");
    }
}
