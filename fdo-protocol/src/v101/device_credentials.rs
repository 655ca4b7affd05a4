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

//! The Device Credential type indicates those values which must be persisted in the Device (e.g.,
//! during manufacturing) to prepare it for FIDO Device Onboard onboarding.

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use super::hash_hmac::Hash;
use super::rendezvous_info::RendezvousInfo;
use super::{Guid, Protver};

/// Persisted device credentials after DI.
///
/// The stored DCGuid, DCRVInfo and DCPubKeyHash fields are updated during the TO2 protocol. See
/// TO2.SetupDevice for details. These fields must be stored in a non-volatile, mutable storage
/// medium.
///
/// ```cddl
/// DeviceCredential = [
///     DCActive:     bool,
///     DCProtVer:    protver,
///     DCHmacSecret: bstr,           ;; confidentiality required
///     DCDeviceInfo: tstr,
///     DCGuid:       Guid,           ;; modified in TO2
///     DCRVInfo:     RendezvousInfo, ;; modified in TO2
///     DCPubKeyHash: Hash            ;; modified in TO2
/// ]
///
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCredential {
    /// Indicates whether FIDO Device Onboard is active.
    ///
    /// When a device is manufactured, this field is initialized to True, indicating that FIDO
    /// Device Onboard must start when the device is powered on. When the TO2 protocol is
    /// successful, this field is set to False, indicating that FIDO Device Onboard should remain
    /// dormant.
    pub dc_active: bool,
    /// Specifies the protocol version.
    pub dc_prot_ver: Protver,
    /// Contains a secret.
    ///
    /// Initialized with a random value by the Device during the DI protocol or equivalent Device
    /// initialization.
    ///
    /// Requires confidentiality, it's stored sealed by the device key.
    pub dc_hmac_secret: ByteBuf,
    /// Device information.
    ///
    /// Is a text string that is used by the manufacturer to indicate the device type, sufficient to
    /// allow an onboarding procedure or script to be selected by the Owner.
    pub dc_device_info: String,
    /// Current device’s GUID.
    ///
    /// To be used for the next ownership transfer.
    ///
    /// Modified in TO2
    pub dc_guid: Guid,
    /// Contains instructions on how to find the Secure Device Onboard Rendezvous Server.
    ///
    /// Modified in TO2
    pub dc_rv_info: RendezvousInfo,
    /// Is a hash of the manufacturer’s public key, which must match the hash of OwnershipVoucher.OVHeader.OVPubKey
    ///
    /// Modified in TO2
    pub dc_pub_key_hash: Hash,
}

impl Serialize for DeviceCredential {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self {
            dc_active,
            dc_prot_ver,
            dc_hmac_secret,
            dc_device_info,
            dc_guid,
            dc_rv_info,
            dc_pub_key_hash,
        } = self;

        (
            dc_active,
            dc_prot_ver,
            dc_hmac_secret,
            dc_device_info,
            dc_guid,
            dc_rv_info,
            dc_pub_key_hash,
        )
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DeviceCredential {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (
            dc_active,
            dc_prot_ver,
            dc_hmac_secret,
            dc_device_info,
            dc_guid,
            dc_rv_info,
            dc_pub_key_hash,
        ) = Deserialize::deserialize(deserializer)?;

        Ok(Self {
            dc_active,
            dc_prot_ver,
            dc_hmac_secret,
            dc_device_info,
            dc_guid,
            dc_rv_info,
            dc_pub_key_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::utils::{cbor_decode, cbor_encode};
    use crate::v101::hash_hmac::tests::create_hash;
    use crate::v101::rendezvous_info::tests::create_rv_info;
    use crate::v101::tests::create_guid;
    use crate::v101::PROTOCOL_VERSION;

    use super::*;

    #[test]
    fn device_credential_roundtrip() {
        let creds = DeviceCredential {
            dc_active: true,
            dc_prot_ver: PROTOCOL_VERSION,
            dc_hmac_secret: ByteBuf::from(vec![1, 2, 3]),
            dc_device_info: "model".to_string(),
            dc_guid: create_guid(),
            dc_rv_info: create_rv_info(),
            dc_pub_key_hash: create_hash(),
        };

        let buf = cbor_encode(&creds).unwrap();

        // [true, 101, ..]
        assert_eq!(buf[..4], [0x87, 0xf5, 0x18, 0x65]);

        let res: DeviceCredential = cbor_decode(&buf).unwrap();

        assert_eq!(res, creds);
    }
}
