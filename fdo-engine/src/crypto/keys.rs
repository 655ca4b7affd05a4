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

//! Signing keys held by the manufacturer, the rendezvous and the owner services.

use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{EcdsaKeyPair, EcdsaSigningAlgorithm, KeyPair};
use coset::{CoseSign1, CoseSign1Builder, HeaderBuilder};
use fdo_protocol::error::ErrorKind;
use fdo_protocol::v101::public_key::{PkType, PublicKey};
use fdo_protocol::Error;
use tracing::{error, instrument};
use zeroize::Zeroizing;

use super::cose_alg_for;

fn signing_alg(pk_type: PkType) -> Result<&'static EcdsaSigningAlgorithm, Error> {
    match pk_type {
        PkType::Secp256R1 => Ok(&aws_lc_rs::signature::ECDSA_P256_SHA256_FIXED_SIGNING),
        PkType::Secp384R1 => Ok(&aws_lc_rs::signature::ECDSA_P384_SHA384_FIXED_SIGNING),
        PkType::Rsa2048Restr | PkType::RsaPkcs | PkType::RsaPss => Err(Error::new(
            ErrorKind::Crypto,
            "only elliptic curve keys are supported",
        )),
    }
}

/// An elliptic curve private key producing COSE signatures.
pub struct SigningKey {
    pk_type: PkType,
    pkcs8: Zeroizing<Vec<u8>>,
    pair: EcdsaKeyPair,
}

impl SigningKey {
    /// Generates a new random key.
    pub fn generate(pk_type: PkType) -> Result<Self, Error> {
        let alg = signing_alg(pk_type)?;

        let doc = EcdsaKeyPair::generate_pkcs8(alg, &SystemRandom::new())
            .map_err(|_| Error::new(ErrorKind::Crypto, "to generate signing key"))?;

        Self::from_pkcs8(pk_type, doc.as_ref())
    }

    /// Parses a PKCS#8 v1 document.
    pub fn from_pkcs8(pk_type: PkType, pkcs8: &[u8]) -> Result<Self, Error> {
        let alg = signing_alg(pk_type)?;

        let pair = EcdsaKeyPair::from_pkcs8(alg, pkcs8).map_err(|err| {
            error!(error = %err, "couldn't parse signing key");

            Error::new(ErrorKind::Crypto, "to parse signing key")
        })?;

        Ok(Self {
            pk_type,
            pkcs8: Zeroizing::new(pkcs8.to_vec()),
            pair,
        })
    }

    /// Returns the PKCS#8 document of the key.
    pub fn pkcs8(&self) -> &[u8] {
        &self.pkcs8
    }

    /// Type of the key.
    pub fn pk_type(&self) -> PkType {
        self.pk_type
    }

    /// Public key with the point encoding.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::with_sec1(self.pk_type, self.pair.public_key().as_ref().to_vec())
    }

    /// Checks if the public key is the one of this key.
    pub fn matches(&self, public_key: &PublicKey) -> bool {
        public_key.pk_type() == self.pk_type
            && public_key
                .key()
                .is_ok_and(|point| point.as_ref() == self.pair.public_key().as_ref())
    }

    /// Signs a payload into a COSE Sign1 object.
    pub fn sign_cose(
        &self,
        unprotected: HeaderBuilder,
        payload: Vec<u8>,
    ) -> Result<CoseSign1, Error> {
        let protected = HeaderBuilder::new()
            .algorithm(cose_alg_for(self.pk_type)?)
            .build();

        let rng = SystemRandom::new();

        let sign = CoseSign1Builder::new()
            .protected(protected)
            .unprotected(unprotected.build())
            .payload(payload)
            .try_create_signature(&[], |bytes| {
                let sign = self
                    .pair
                    .sign(&rng, bytes)
                    .map_err(|_| Error::new(ErrorKind::Crypto, "to sign cose"))?;

                Ok::<_, Error>(sign.as_ref().to_vec())
            })?
            .build();

        Ok(sign)
    }
}

impl Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("pk_type", &self.pk_type)
            .field("pkcs8", &"REDACTED")
            .finish_non_exhaustive()
    }
}

/// Finds the private key for a public key.
pub trait KeyResolver: Send + Sync {
    /// Returns the signing key for the public key, if known.
    fn resolve(&self, public_key: &PublicKey) -> Result<Option<Arc<SigningKey>>, Error>;

    /// Returns a signing key of the given type, if any.
    fn resolve_alg(&self, pk_type: PkType) -> Result<Option<Arc<SigningKey>>, Error>;
}

/// In memory set of signing keys.
#[derive(Debug, Default)]
pub struct KeyRing {
    keys: RwLock<Vec<Arc<SigningKey>>>,
}

impl KeyRing {
    /// Creates an empty key ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key to the ring.
    #[instrument(skip_all, fields(pk_type = ?key.pk_type()))]
    pub fn insert(&self, key: Arc<SigningKey>) -> Result<(), Error> {
        let mut keys = self
            .keys
            .write()
            .map_err(|_| Error::new(ErrorKind::Resource, "key ring lock poisoned"))?;

        keys.push(key);

        Ok(())
    }
}

impl KeyResolver for KeyRing {
    fn resolve(&self, public_key: &PublicKey) -> Result<Option<Arc<SigningKey>>, Error> {
        let keys = self
            .keys
            .read()
            .map_err(|_| Error::new(ErrorKind::Resource, "key ring lock poisoned"))?;

        Ok(keys.iter().find(|key| key.matches(public_key)).cloned())
    }

    fn resolve_alg(&self, pk_type: PkType) -> Result<Option<Arc<SigningKey>>, Error> {
        let keys = self
            .keys
            .read()
            .map_err(|_| Error::new(ErrorKind::Resource, "key ring lock poisoned"))?;

        Ok(keys.iter().find(|key| key.pk_type == pk_type).cloned())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn pkcs8_roundtrip_keeps_public_key() {
        let key = SigningKey::generate(PkType::Secp256R1).unwrap();

        let parsed = SigningKey::from_pkcs8(PkType::Secp256R1, key.pkcs8()).unwrap();

        assert_eq!(parsed.public_key(), key.public_key());
        assert!(parsed.matches(&key.public_key()));
    }

    #[test]
    fn rsa_is_not_supported() {
        let err = SigningKey::generate(PkType::RsaPss).unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::Crypto);
    }

    #[test]
    fn debug_is_redacted() {
        let key = SigningKey::generate(PkType::Secp256R1).unwrap();

        insta::assert_snapshot!(
            format!("{key:?}"),
            @r#"SigningKey { pk_type: Secp256R1, pkcs8: "REDACTED", .. }"#
        );
    }

    #[test]
    fn key_ring_resolves_known_keys() {
        let ring = KeyRing::new();
        let known = Arc::new(SigningKey::generate(PkType::Secp256R1).unwrap());
        let unknown = SigningKey::generate(PkType::Secp256R1).unwrap();

        ring.insert(Arc::clone(&known)).unwrap();

        let found = ring.resolve(&known.public_key()).unwrap().unwrap();
        assert_eq!(found.public_key(), known.public_key());

        assert!(ring.resolve(&unknown.public_key()).unwrap().is_none());
    }

    #[test]
    fn key_ring_resolves_by_type() {
        let ring = KeyRing::new();
        let p256 = Arc::new(SigningKey::generate(PkType::Secp256R1).unwrap());
        let p384 = Arc::new(SigningKey::generate(PkType::Secp384R1).unwrap());

        ring.insert(Arc::clone(&p256)).unwrap();
        assert!(ring.resolve_alg(PkType::Secp384R1).unwrap().is_none());

        ring.insert(Arc::clone(&p384)).unwrap();

        let found = ring.resolve_alg(PkType::Secp384R1).unwrap().unwrap();
        assert_eq!(found.public_key(), p384.public_key());

        let found = ring.resolve_alg(PkType::Secp256R1).unwrap().unwrap();
        assert_eq!(found.public_key(), p256.public_key());
    }
}
