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

//! The Ownership Voucher is a structured digital document that links the Manufacturer with the
//! Owner.
//!
//! It is formed as a chain of signed public keys, each signature of a public key authorizing the
//! possessor of the corresponding private key to take ownership of the Device or pass ownership
//! through another link in the chain.

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::utils::{CborBstr, Signed};
use crate::Error;

use super::device_cert::OvDevCertChain;
use super::hash_hmac::{HMac, Hash};
use super::public_key::PublicKey;
use super::rendezvous_info::RendezvousInfo;
use super::{Guid, Protver, PROTOCOL_VERSION};

/// Ownership Voucher top level structure
///
/// ```cddl
/// OwnershipVoucher = [
///     OVProtVer:      protver,           ;; protocol version
///     OVHeaderTag:    bstr .cbor OVHeader,
///     OVHeaderHMac:   HMac,              ;; hmac[DCHmacSecret, OVHeader]
///     OVDevCertChain: OVDevCertChainOrNull,
///     OVEntryArray:   OVEntries
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OwnershipVoucher {
    ov_prot_ver: Protver,
    ov_header_tag: CborBstr<OvHeader>,
    ov_header_hmac: HMac,
    ov_dev_cert_chain: OvDevCertChainOrNull,
    ov_entry_array: OvEntries,
}

impl OwnershipVoucher {
    /// Creates a voucher without entries.
    pub fn new(
        ov_header: CborBstr<OvHeader>,
        ov_header_hmac: HMac,
        ov_dev_cert_chain: OvDevCertChainOrNull,
    ) -> Self {
        Self {
            ov_prot_ver: PROTOCOL_VERSION,
            ov_header_tag: ov_header,
            ov_header_hmac,
            ov_dev_cert_chain,
            ov_entry_array: Vec::new(),
        }
    }

    /// Returns the protocol version.
    pub fn prot_ver(&self) -> Protver {
        self.ov_prot_ver
    }

    /// Returns the header.
    pub fn header(&self) -> &OvHeader {
        &self.ov_header_tag
    }

    /// Returns the header with its encoding.
    pub fn header_tag(&self) -> &CborBstr<OvHeader> {
        &self.ov_header_tag
    }

    /// Returns the encoded header, as covered by the HMAC.
    pub fn header_bytes(&self) -> Result<&[u8], Error> {
        self.ov_header_tag.bytes()
    }

    /// Returns the GUID of the device.
    pub fn guid(&self) -> &Guid {
        &self.ov_header_tag.ov_guid
    }

    /// Returns the HMAC of the header.
    pub fn hmac(&self) -> &HMac {
        &self.ov_header_hmac
    }

    /// Replaces the HMAC of the header.
    pub fn set_hmac(&mut self, hmac: HMac) {
        self.ov_header_hmac = hmac;
    }

    /// Returns the device certificate chain.
    pub fn dev_cert_chain(&self) -> Option<&OvDevCertChain> {
        self.ov_dev_cert_chain.as_ref()
    }

    /// Returns the entries.
    pub fn entries(&self) -> &[OvEntry] {
        &self.ov_entry_array
    }

    /// Appends an entry.
    ///
    /// The entry is not validated, it's done while extending the voucher.
    pub fn push_entry(&mut self, entry: OvEntry) {
        self.ov_entry_array.push(entry);
    }
}

impl Serialize for OwnershipVoucher {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self {
            ov_prot_ver,
            ov_header_tag,
            ov_header_hmac,
            ov_dev_cert_chain,
            ov_entry_array,
        } = self;

        (
            ov_prot_ver,
            ov_header_tag,
            ov_header_hmac,
            ov_dev_cert_chain,
            ov_entry_array,
        )
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for OwnershipVoucher {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (ov_prot_ver, ov_header_tag, ov_header_hmac, ov_dev_cert_chain, ov_entry_array) =
            Deserialize::deserialize(deserializer)?;

        Ok(Self {
            ov_prot_ver,
            ov_header_tag,
            ov_header_hmac,
            ov_dev_cert_chain,
            ov_entry_array,
        })
    }
}

/// ```cddl
/// ;; Ownership Voucher header, also used in TO1 protocol
/// OVHeader = [
///     OVHProtVer:        protver,        ;; protocol version
///     OVGuid:            Guid,           ;; guid
///     OVRVInfo:          RendezvousInfo, ;; rendezvous instructions
///     OVDeviceInfo:      tstr,           ;; DeviceInfo
///     OVPubKey:          PublicKey,      ;; mfg public key
///     OVDevCertChainHash:OVDevCertChainHashOrNull
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OvHeader {
    /// Protocol version
    pub ovh_prot_ver: Protver,
    /// Guid of the device
    pub ov_guid: Guid,
    /// Rendezvous instructions
    pub ov_rv_info: RendezvousInfo,
    /// Device info
    pub ov_device_info: String,
    /// Manufacturer public key
    pub ov_pub_key: PublicKey,
    /// Hash of the device certificate chain
    pub ov_dev_cert_chain_hash: OvDevCertChainHashOrNull,
}

impl Serialize for OvHeader {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self {
            ovh_prot_ver,
            ov_guid,
            ov_rv_info,
            ov_device_info,
            ov_pub_key,
            ov_dev_cert_chain_hash,
        } = self;

        (
            ovh_prot_ver,
            ov_guid,
            ov_rv_info,
            ov_device_info,
            ov_pub_key,
            ov_dev_cert_chain_hash,
        )
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for OvHeader {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (ovh_prot_ver, ov_guid, ov_rv_info, ov_device_info, ov_pub_key, ov_dev_cert_chain_hash) =
            Deserialize::deserialize(deserializer)?;

        Ok(Self {
            ovh_prot_ver,
            ov_guid,
            ov_rv_info,
            ov_device_info,
            ov_pub_key,
            ov_dev_cert_chain_hash,
        })
    }
}

/// ```cddl
/// OVDevCertChainHashOrNull = Hash / null
/// ```
pub type OvDevCertChainHashOrNull = Option<Hash>;

/// ```cddl
/// OVDevCertChainOrNull = OVDevCertChain / null
/// ```
pub type OvDevCertChainOrNull = Option<OvDevCertChain>;

/// ```cddl
/// OVEntries = [ * OVEntry ]
/// ```
pub type OvEntries = Vec<OvEntry>;

/// ```cddl
/// ;; ...each entry is a COSE Sign1 object with a payload
/// OVEntry = CoseSignature
/// $COSEProtectedHeaders //= (
///     1: OVSignType
/// )
/// $COSEPayloads /= (
///    OVEntryPayload
///)
/// ```
pub type OvEntry = Signed<OvEntryPayload>;

/// ```cddl
/// ;; ... each payload contains the hash of the previous entry
/// ;; and the signature of the public key to verify the next signature
/// ;; (or the Owner, in the last entry).
/// OVEntryPayload = [
///     OVEHashPrevEntry: Hash,
///     OVEHashHdrInfo:   Hash,  ;; hash[GUID||DeviceInfo] in header
///     OVEExtra:         null / bstr .cbor OVEExtraInfo
///     OVEPubKey:        PublicKey
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OvEntryPayload {
    ov_e_hash_prev_entry: Hash,
    ov_e_hash_hdr_info: Hash,
    ov_e_extra: Option<ByteBuf>,
    ov_e_pubkey: PublicKey,
}

impl OvEntryPayload {
    /// Creates a payload without extra information.
    pub fn new(ov_e_hash_prev_entry: Hash, ov_e_hash_hdr_info: Hash, ov_e_pubkey: PublicKey) -> Self {
        Self {
            ov_e_hash_prev_entry,
            ov_e_hash_hdr_info,
            ov_e_extra: None,
            ov_e_pubkey,
        }
    }

    /// Hash of the previous entry, or the header for the first one.
    pub fn prev(&self) -> &Hash {
        &self.ov_e_hash_prev_entry
    }

    /// Hash of the GUID and device info.
    pub fn hdr(&self) -> &Hash {
        &self.ov_e_hash_hdr_info
    }

    /// Public key authorized by this entry.
    pub fn pubkey(&self) -> &PublicKey {
        &self.ov_e_pubkey
    }

    /// Returns the public key authorized by this entry.
    pub fn take_pubkey(self) -> PublicKey {
        self.ov_e_pubkey
    }
}

impl Serialize for OvEntryPayload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self {
            ov_e_hash_prev_entry,
            ov_e_hash_hdr_info,
            ov_e_extra,
            ov_e_pubkey,
        } = self;

        (
            ov_e_hash_prev_entry,
            ov_e_hash_hdr_info,
            ov_e_extra,
            ov_e_pubkey,
        )
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for OvEntryPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (ov_e_hash_prev_entry, ov_e_hash_hdr_info, ov_e_extra, ov_e_pubkey) =
            Deserialize::deserialize(deserializer)?;

        Ok(Self {
            ov_e_hash_prev_entry,
            ov_e_hash_hdr_info,
            ov_e_extra,
            ov_e_pubkey,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use coset::CoseSign1Builder;
    use pretty_assertions::assert_eq;

    use crate::utils::{cbor_decode, cbor_encode};
    use crate::v101::device_cert::tests::create_device_cert;
    use crate::v101::hash_hmac::tests::{create_hash, create_hmac};
    use crate::v101::public_key::tests::create_public_key;
    use crate::v101::rendezvous_info::tests::create_rv_info;
    use crate::v101::tests::create_guid;

    use super::*;

    pub(crate) fn create_header() -> OvHeader {
        OvHeader {
            ovh_prot_ver: PROTOCOL_VERSION,
            ov_guid: create_guid(),
            ov_rv_info: create_rv_info(),
            ov_device_info: "model".to_string(),
            ov_pub_key: create_public_key(),
            ov_dev_cert_chain_hash: Some(create_hash()),
        }
    }

    fn create_entry() -> OvEntry {
        let payload = OvEntryPayload::new(create_hash(), create_hash(), create_public_key());

        let sign = CoseSign1Builder::new()
            .payload(cbor_encode(&payload).unwrap())
            .signature(vec![0; 64])
            .build();

        OvEntry::new(sign)
    }

    pub(crate) fn create_voucher() -> OwnershipVoucher {
        let mut voucher = OwnershipVoucher::new(
            CborBstr::new(create_header()),
            create_hmac(),
            Some(vec![create_device_cert()]),
        );

        voucher.push_entry(create_entry());

        voucher
    }

    #[test]
    fn voucher_roundtrip() {
        let voucher = create_voucher();

        let buf = cbor_encode(&voucher).unwrap();

        // [101, h'..', ..]
        assert_eq!(buf[..3], [0x85, 0x18, 0x65]);

        let res: OwnershipVoucher = cbor_decode(&buf).unwrap();

        assert_eq!(res, voucher);
        assert_eq!(res.header_bytes().unwrap(), voucher.header_bytes().unwrap());
        assert_eq!(res.entries().len(), 1);
        assert_eq!(res.guid(), &create_guid());
        assert_eq!(res.dev_cert_chain().map(Vec::len), Some(1));
    }

    #[test]
    fn voucher_set_hmac() {
        let mut voucher = create_voucher();

        let hmac = HMac::with_sha256(vec![7; 32]).unwrap();
        voucher.set_hmac(hmac.clone());

        assert_eq!(*voucher.hmac(), hmac);
    }

    #[test]
    fn entry_payload() {
        let entry = create_entry();

        let payload = entry.payload().unwrap();

        assert_eq!(*payload.prev(), create_hash());
        assert_eq!(*payload.hdr(), create_hash());
        assert_eq!(payload.take_pubkey(), create_public_key());
    }

    #[test]
    fn entry_payload_extra_is_null() {
        let payload = OvEntryPayload::new(create_hash(), create_hash(), create_public_key());

        let value = crate::to_value(&payload).unwrap();

        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 4);
        assert!(items[2].is_null());
    }
}
