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

//! Construction, extension and verification of the ownership voucher chain.
//!
//! Every entry is signed by the key of the previous one (the manufacturer key for the first) and
//! is bound to it by `prevHash`. The key in the last entry is the only one that can extend the
//! chain or prove the ownership of the device.

use std::fmt::Display;

use coset::HeaderBuilder;
use fdo_protocol::error::ErrorKind;
use fdo_protocol::utils::{cbor_encode, CborBstr};
use fdo_protocol::v101::device_cert::{DeviceCert, DeviceCertPayload, OvDevCertChain};
use fdo_protocol::v101::hash_hmac::{Hash, Hashtype};
use fdo_protocol::v101::ownership_voucher::{OvEntry, OvEntryPayload, OvHeader, OwnershipVoucher};
use fdo_protocol::v101::public_key::PublicKey;
use fdo_protocol::v101::Guid;
use fdo_protocol::Error;
use tracing::{debug, error};

use crate::crypto::keys::SigningKey;
use crate::crypto::{self, hash_type_for_key};

/// Failure while walking the chain, with the index of the first broken entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainError {
    index: usize,
    kind: ErrorKind,
    ctx: &'static str,
}

impl ChainError {
    fn new(index: usize, kind: ErrorKind, ctx: &'static str) -> Self {
        Self { index, kind, ctx }
    }

    fn from_err(index: usize, err: Error) -> Self {
        Self::new(index, *err.kind(), err.ctx())
    }

    /// Index of the first broken entry.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Kind of the underlying error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entry {}: {} {}", self.index, self.kind, self.ctx)
    }
}

impl std::error::Error for ChainError {}

impl From<ChainError> for Error {
    fn from(value: ChainError) -> Self {
        Error::new(ErrorKind::Voucher, value.ctx)
    }
}

/// `guid || deviceInfo`, covered by the `hdrInfoHash` of every entry.
fn hdr_info(header: &OvHeader) -> Vec<u8> {
    let mut info = header.ov_guid.to_vec();
    info.extend_from_slice(header.ov_device_info.as_bytes());

    info
}

/// Incremental verification of the entries of a voucher.
///
/// Used by the device in TO2 while receiving the entries one at a time.
#[derive(Debug)]
pub struct ChainVerifier {
    hdr_info: Vec<u8>,
    prev: Vec<u8>,
    owner_key: PublicKey,
    next: usize,
}

impl ChainVerifier {
    /// Starts the walk from the header, with the manufacturer key.
    pub fn new(header: &CborBstr<OvHeader>) -> Result<Self, ChainError> {
        let prev = header
            .bytes()
            .map_err(|err| ChainError::from_err(0, err))?
            .to_vec();

        Ok(Self {
            hdr_info: hdr_info(header),
            prev,
            owner_key: header.ov_pub_key.clone(),
            next: 0,
        })
    }

    /// Verifies the next entry of the chain.
    pub fn push(&mut self, index: usize, entry: &OvEntry) -> Result<(), ChainError> {
        if index != self.next {
            return Err(ChainError::new(
                index,
                ErrorKind::Invalid,
                "entry out of order",
            ));
        }

        crypto::verify_cose_signature(entry.sign(), &self.owner_key).map_err(|err| {
            error!(index, error = %err, "entry signature");

            ChainError::from_err(index, err)
        })?;

        let payload = entry
            .payload()
            .map_err(|err| ChainError::from_err(index, err))?;

        crypto::verify_hash(payload.prev(), &self.prev).map_err(|err| {
            error!(index, error = %err, "entry previous hash");

            ChainError::new(index, ErrorKind::Voucher, "previous entry hash mismatch")
        })?;

        crypto::verify_hash(payload.hdr(), &self.hdr_info).map_err(|err| {
            error!(index, error = %err, "entry header info hash");

            ChainError::new(index, ErrorKind::Voucher, "header info hash mismatch")
        })?;

        self.prev = entry
            .to_bytes()
            .map_err(|err| ChainError::from_err(index, err))?;
        self.owner_key = payload.take_pubkey();
        self.next += 1;

        debug!(index, "entry verified");

        Ok(())
    }

    /// Number of entries verified.
    pub fn verified(&self) -> usize {
        self.next
    }

    /// Current owner key, the one of the last verified entry.
    pub fn owner_key(&self) -> &PublicKey {
        &self.owner_key
    }

    /// Ends the walk returning the final owner key.
    pub fn finish(self) -> PublicKey {
        self.owner_key
    }
}

/// Verifies the whole chain and returns the final owner key.
///
/// A voucher without entries is still owned by the manufacturer.
pub fn verify(voucher: &OwnershipVoucher) -> Result<PublicKey, ChainError> {
    let mut verifier = ChainVerifier::new(voucher.header_tag())?;

    for (index, entry) in voucher.entries().iter().enumerate() {
        verifier.push(index, entry)?;
    }

    Ok(verifier.finish())
}

/// Owner key of the last entry, without verifying the chain.
pub fn final_owner_key(voucher: &OwnershipVoucher) -> Result<PublicKey, Error> {
    match voucher.entries().last() {
        Some(entry) => entry.payload().map(OvEntryPayload::take_pubkey),
        None => Ok(voucher.header().ov_pub_key.clone()),
    }
}

/// Digest identifying a public key in the access lists.
///
/// Always SHA-384 of the encoded key, whatever the strength of the key.
pub fn key_hash(key: &PublicKey) -> Result<Hash, Error> {
    crypto::hash(Hashtype::Sha384, &cbor_encode(key)?)
}

/// Hashes of the manufacturer key and of every owner key in the chain.
pub fn key_hashes(voucher: &OwnershipVoucher) -> Result<Vec<Hash>, Error> {
    let mut hashes = vec![key_hash(&voucher.header().ov_pub_key)?];

    for entry in voucher.entries() {
        let payload = entry.payload()?;

        hashes.push(key_hash(payload.pubkey())?);
    }

    Ok(hashes)
}

/// Appends an entry transferring the ownership to the new key.
///
/// The signer must hold the current final owner key.
pub fn extend(
    voucher: &mut OwnershipVoucher,
    new_owner: PublicKey,
    signer: &SigningKey,
) -> Result<(), Error> {
    let current = final_owner_key(voucher)?;

    if !signer.matches(&current) {
        error!("signer is not the final owner of the voucher");

        return Err(Error::new(
            ErrorKind::Voucher,
            "signer is not the final owner key",
        ));
    }

    let hash_type = hash_type_for_key(&voucher.header().ov_pub_key);

    let prev = match voucher.entries().last() {
        Some(entry) => crypto::hash(hash_type, &entry.to_bytes()?)?,
        None => crypto::hash(hash_type, voucher.header_bytes()?)?,
    };

    let hdr = crypto::hash(hash_type, &hdr_info(voucher.header()))?;

    let payload = OvEntryPayload::new(prev, hdr, new_owner);

    let sign = signer.sign_cose(HeaderBuilder::new(), cbor_encode(&payload)?)?;

    voucher.push_entry(OvEntry::new(sign));

    debug!(entries = voucher.entries().len(), "voucher extended");

    Ok(())
}

/// Issues the certificate binding the device key to the GUID, signed by the manufacturer.
pub fn issue_device_cert(
    manufacturer: &SigningKey,
    guid: Guid,
    serial_number: String,
    device_key: PublicKey,
) -> Result<DeviceCert, Error> {
    let payload = DeviceCertPayload::new(guid, serial_number, device_key);

    manufacturer
        .sign_cose(HeaderBuilder::new(), cbor_encode(&payload)?)
        .map(DeviceCert::new)
}

/// Hash of the encoded device certificate chain.
pub fn cert_chain_hash(chain: &OvDevCertChain, hash_type: Hashtype) -> Result<Hash, Error> {
    crypto::hash(hash_type, &cbor_encode(chain)?)
}

/// Extracts the device attestation key from the certificate chain of the voucher.
///
/// The first certificate must be signed by the manufacturer key, be issued for the GUID and match
/// the chain hash in the header.
pub fn device_public_key(voucher: &OwnershipVoucher) -> Result<PublicKey, Error> {
    let header = voucher.header();

    let chain = voucher
        .dev_cert_chain()
        .ok_or(Error::new(ErrorKind::Voucher, "missing device cert chain"))?;

    let chain_hash = header
        .ov_dev_cert_chain_hash
        .as_ref()
        .ok_or(Error::new(ErrorKind::Voucher, "missing device cert chain hash"))?;

    crypto::verify_hash(chain_hash, &cbor_encode(chain)?)
        .map_err(|_| Error::new(ErrorKind::Voucher, "device cert chain hash mismatch"))?;

    let cert = chain
        .first()
        .ok_or(Error::new(ErrorKind::Voucher, "empty device cert chain"))?;

    crypto::verify_cose_signature(cert.sign(), &header.ov_pub_key)
        .map_err(|_| Error::new(ErrorKind::Voucher, "device cert signature"))?;

    let payload = cert.payload()?;

    if *payload.guid() != header.ov_guid {
        return Err(Error::new(ErrorKind::Voucher, "device cert guid mismatch"));
    }

    Ok(payload.device_pub_key().clone())
}
