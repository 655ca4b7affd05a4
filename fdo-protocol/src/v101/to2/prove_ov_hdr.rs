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

//! Prove Ownership Voucher Header, Type 61
//!
//! From Owner Onboarding Service to Device.
//!
//! This message serves several purposes:
//!
//! - The Owner begins sending the Ownership Voucher to the device (only the header is in this
//!   message).
//! - The Owner signs the message with the Owner key (the last key in the Ownership Voucher),
//!   allowing the Device to verify (later on) that the Owner controls this private key.
//! - The Owner starts the key exchange protocol by sending the initial key exchange parameter
//!   xAKeyExchange (e.g., in Diffie Hellman, the parameter ‘A’) to the Device.
//!
//! The unprotected headers carry the nonce for the TO2.ProveDevice and the owner public key, see
//! [`CUPH_NONCE`](crate::v101::eat_signature::CUPH_NONCE) and
//! [`CUPH_OWNER_PUBKEY`](crate::v101::eat_signature::CUPH_OWNER_PUBKEY).

use serde::{Deserialize, Serialize};

use crate::utils::{CborBstr, Signed};
use crate::v101::hash_hmac::{HMac, Hash};
use crate::v101::key_exchange::XAKeyExchange;
use crate::v101::ownership_voucher::OvHeader;
use crate::v101::sign_info::EBSigInfo;
use crate::v101::{Message, Msgtype, NonceTo2ProveOv};

/// ```cddl
/// TO2.ProveOVHdr = CoseSignature
/// TO2ProveOVHdrUnprotectedHeaders = (
///     CUPHNonce:       NonceTO2ProveDv, ;; nonce is used below in TO2.ProveDevice and TO2.Done
///     CUPHOwnerPubKey: PublicKey ;; Owner key, as convenience to Device
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProveOvHdr(pub Signed<ProveOvHdrPayload>);

/// ```cddl
/// TO2ProveOVHdrPayload = [
///     bstr .cbor OVHeader,     ;; Ownership Voucher header
///     NumOVEntries, ;; number of ownership voucher entries
///     HMac,         ;; Ownership Voucher "hmac" of hdr
///     NonceTO2ProveOV, ;; nonce from TO2.HelloDevice
///     eBSigInfo,    ;; Device attestation signature info
///     xAKeyExchange,;; Key exchange first step
///     helloDeviceHash: Hash, ;; hash of HelloDevice message
///     maxOwnerMessageSize
/// ]
/// NumOVEntries = uint8
/// maxOwnerMessageSize = uint16
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ProveOvHdrPayload {
    /// Ownership Voucher header
    pub ov_header: CborBstr<OvHeader>,
    /// Number of ownership voucher entries
    pub num_ov_entries: u8,
    /// Ownership Voucher HMAC of the header
    pub hmac: HMac,
    /// Nonce from the TO2.HelloDevice
    pub nonce_to2_prove_ov: NonceTo2ProveOv,
    /// Signature information for the device
    pub eb_sign_info: EBSigInfo,
    /// Key exchange first step
    pub xa_key_exchange: XAKeyExchange,
    /// Hash of the encoded TO2.HelloDevice body
    pub hello_device_hash: Hash,
    /// Maximum message size the owner can receive
    pub max_owner_message_size: u16,
}

impl Serialize for ProveOvHdrPayload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self {
            ov_header,
            num_ov_entries,
            hmac,
            nonce_to2_prove_ov,
            eb_sign_info,
            xa_key_exchange,
            hello_device_hash,
            max_owner_message_size,
        } = self;

        (
            ov_header,
            num_ov_entries,
            hmac,
            nonce_to2_prove_ov,
            eb_sign_info,
            xa_key_exchange,
            hello_device_hash,
            max_owner_message_size,
        )
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ProveOvHdrPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (
            ov_header,
            num_ov_entries,
            hmac,
            nonce_to2_prove_ov,
            eb_sign_info,
            xa_key_exchange,
            hello_device_hash,
            max_owner_message_size,
        ) = Deserialize::deserialize(deserializer)?;

        Ok(Self {
            ov_header,
            num_ov_entries,
            hmac,
            nonce_to2_prove_ov,
            eb_sign_info,
            xa_key_exchange,
            hello_device_hash,
            max_owner_message_size,
        })
    }
}

impl Message for ProveOvHdr {
    const MSG_TYPE: Msgtype = 61;
}
