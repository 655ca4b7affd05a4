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

//! Software based crypto operations.

use aws_lc_rs::aead::{Aad, RandomizedNonceKey};
use aws_lc_rs::rand::{SecureRandom, SystemRandom};
use coset::iana::Algorithm as CoseAlgorithm;
use coset::{CborSerializable, CoseEncrypt0, CoseEncrypt0Builder, CoseSign1, HeaderBuilder};
use fdo_protocol::error::ErrorKind;
use fdo_protocol::v101::hash_hmac::HMac;
use fdo_protocol::v101::key_exchange::KexSuitNames;
use fdo_protocol::v101::public_key::{PkType, PublicKey};
use fdo_protocol::v101::sign_info::DeviceSgType;
use fdo_protocol::Error;
use tracing::{debug, error, instrument};
use zeroize::Zeroizing;

use crate::storage::Storage;

use super::keys::SigningKey;
use super::Crypto;

const AES_256_KEY_FILE: &str = "aes-256-key.bin";
const PRIVATE_ECC_KEY_FILE: &str = "private-key.ecc.p8";

const HMAC_SECRET_LEN: usize = aws_lc_rs::digest::SHA256_OUTPUT_LEN;

/// Device keys kept in a [`Storage`].
///
/// The HMAC secret is sealed with an AES-256-GCM key stored next to the signing key.
#[derive(Debug)]
pub struct SoftwareCrypto<S> {
    rng: SystemRandom,
    storage: S,
    signing_key: SigningKey,
}

impl<S> SoftwareCrypto<S>
where
    S: Storage,
{
    /// Loads the keys from the storage, creating them the first time.
    #[instrument(skip_all)]
    pub async fn create(storage: S) -> Result<Self, Error> {
        let rng = SystemRandom::new();

        if !storage.exists(AES_256_KEY_FILE).await? {
            debug!("creating sealing key");

            let mut key = Zeroizing::new(vec![0; 32]);

            rng.fill(key.as_mut_slice())
                .map_err(|_| Error::new(ErrorKind::Crypto, "to generate key"))?;

            storage.write_immutable(AES_256_KEY_FILE, &key).await?;
        }

        if !storage.exists(PRIVATE_ECC_KEY_FILE).await? {
            debug!("creating signing key");

            let key = SigningKey::generate(PkType::Secp256R1)?;

            storage
                .write_immutable(PRIVATE_ECC_KEY_FILE, key.pkcs8())
                .await?;
        }

        let pkcs8 = storage
            .read_secret(PRIVATE_ECC_KEY_FILE)
            .await?
            .ok_or(Error::new(ErrorKind::Io, "signing key is missing"))?;

        let signing_key = SigningKey::from_pkcs8(PkType::Secp256R1, &pkcs8)?;

        Ok(Self {
            rng,
            storage,
            signing_key,
        })
    }

    async fn sealing_key(&self) -> Result<RandomizedNonceKey, Error> {
        let key = self
            .storage
            .read_secret(AES_256_KEY_FILE)
            .await?
            .ok_or(Error::new(ErrorKind::Io, "key file is missing"))?;

        RandomizedNonceKey::new(&aws_lc_rs::aead::AES_256_GCM, &key)
            .map_err(|_| Error::new(ErrorKind::Crypto, "to create randomized nonce"))
    }

    async fn unseal(&self, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
        let enc = CoseEncrypt0::from_slice(sealed).map_err(|err| {
            error!(error = %err, "couldn't decode sealed secret");

            Error::new(ErrorKind::Decode, "sealed secret")
        })?;

        let alg = enc.protected.header.alg.as_ref().ok_or(Error::new(
            ErrorKind::Invalid,
            "missing alg header in cose object",
        ))?;

        if *alg != coset::RegisteredLabelWithPrivate::Assigned(CoseAlgorithm::A256GCM) {
            return Err(Error::new(ErrorKind::Invalid, "invalid cose algorithm"));
        }

        let key = self.sealing_key().await?;

        let nonce = aws_lc_rs::aead::Nonce::try_assume_unique_for_key(&enc.unprotected.iv)
            .map_err(|_| Error::new(ErrorKind::Invalid, "iv for nonce"))?;

        enc.decrypt_ciphertext(
            &[],
            || Error::new(ErrorKind::Invalid, "missing chiphertext"),
            |ciphertext, aad| {
                let mut ciphertext = Vec::from(ciphertext);

                let len = key
                    .open_in_place(nonce, Aad::from(aad), &mut ciphertext)
                    .map_err(|_| Error::new(ErrorKind::Crypto, "to aead decrypt secret"))?
                    .len();

                ciphertext.truncate(len);

                Ok(ciphertext)
            },
        )
        .map(Zeroizing::new)
    }

    async fn seal(&self, secret: &[u8]) -> Result<Vec<u8>, Error> {
        let key = self.sealing_key().await?;

        let protected = HeaderBuilder::new()
            .algorithm(CoseAlgorithm::A256GCM)
            .build();

        let mut nonce = None;

        let builder = CoseEncrypt0Builder::new()
            .protected(protected)
            .try_create_ciphertext(secret, &[], |plain, aad| {
                let mut in_out = Vec::from(plain);

                let gen_nonce = key
                    .seal_in_place_append_tag(Aad::from(aad), &mut in_out)
                    .map_err(|_| Error::new(ErrorKind::Crypto, "to AEAD encrypt"))?;

                nonce = Some(gen_nonce);

                Ok::<_, Error>(in_out)
            })?;

        let nonce = nonce.ok_or(Error::new(ErrorKind::Invalid, "nonce not created"))?;

        let unprotected = HeaderBuilder::new().iv(nonce.as_ref().to_vec()).build();

        builder
            .unprotected(unprotected)
            .build()
            .to_vec()
            .map_err(|err| {
                error!(error = %err, "couldn't encode sealed secret");

                Error::new(ErrorKind::Encode, "sealed secret")
            })
    }
}

impl<S> Crypto for SoftwareCrypto<S>
where
    S: Storage,
{
    fn pk_type(&self) -> PkType {
        self.signing_key.pk_type()
    }

    fn sign_info_type(&self) -> DeviceSgType {
        DeviceSgType::StSecP256R1
    }

    fn kex_suit(&self) -> KexSuitNames {
        KexSuitNames::ECDH256
    }

    fn cipher_suite(&self) -> CoseAlgorithm {
        CoseAlgorithm::A256GCM
    }

    async fn public_key(&mut self) -> Result<PublicKey, Error> {
        Ok(self.signing_key.public_key())
    }

    async fn hmac_secret(&mut self) -> Result<Vec<u8>, Error> {
        let mut hmac_secret = Zeroizing::new(vec![0; HMAC_SECRET_LEN]);

        self.rng
            .fill(hmac_secret.as_mut_slice())
            .map_err(|_| Error::new(ErrorKind::Crypto, "to generate hmac secret"))?;

        self.seal(&hmac_secret).await
    }

    async fn hmac(&mut self, sealed: &[u8], data: &[u8]) -> Result<HMac, Error> {
        let secret = self.unseal(sealed).await?;

        let hmac_type = super::hmac_type_for_key(&self.signing_key.public_key());

        super::hmac(hmac_type, &secret, data)
    }

    async fn verify_hmac(&mut self, sealed: &[u8], hmac: &HMac, data: &[u8]) -> Result<(), Error> {
        let secret = self.unseal(sealed).await?;

        super::verify_hmac(&secret, hmac, data)
    }

    async fn cose_sign(
        &mut self,
        unprotected: HeaderBuilder,
        payload: Vec<u8>,
    ) -> Result<CoseSign1, Error> {
        self.signing_key.sign_cose(unprotected, payload)
    }
}
