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

//! Setup Device, Type 65
//!
//! From Owner Onboarding Service to Device ROE.
//!
//! This message prepares for ownership transfer, where the credentials previously used to take over
//! the device are replaced, based on the new credentials downloaded from the Owner Onboarding
//! Service. These credentials were: previously programmed by the DI protocol; programmed using
//! another technique from the DI protocol; or previously updated by this message.

use serde::{Deserialize, Serialize};

use crate::utils::Signed;
use crate::v101::public_key::PublicKey;
use crate::v101::rendezvous_info::RendezvousInfo;
use crate::v101::{Guid, Message, Msgtype, NonceTo2SetupDv};

/// ```cddl
/// TO2.SetupDevice = CoseSignature
/// Owner2Key = PublicKey
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SetupDevice(pub Signed<SetupDevicePayload>);

/// ```cddl
/// TO2SetupDevicePayload = [
///     RendezvousInfo, ;; RendezvousInfo replacement
///     Guid,           ;; GUID replacement
///     NonceTO2SetupDv,         ;; proves freshness of signature
///     Owner2Key       ;; Replacement for Owner key
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SetupDevicePayload {
    /// Replacement rendezvous information
    pub rendezvous_info: RendezvousInfo,
    /// Replacement GUID
    pub guid: Guid,
    /// Nonce from the TO2.ProveDevice
    pub nonce_to2_setup_dv: NonceTo2SetupDv,
    /// Replacement owner key
    pub owner2_key: PublicKey,
}

impl Serialize for SetupDevicePayload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self {
            rendezvous_info,
            guid,
            nonce_to2_setup_dv,
            owner2_key,
        } = self;

        (rendezvous_info, guid, nonce_to2_setup_dv, owner2_key).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SetupDevicePayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (rendezvous_info, guid, nonce_to2_setup_dv, owner2_key) =
            Deserialize::deserialize(deserializer)?;

        Ok(Self {
            rendezvous_info,
            guid,
            nonce_to2_setup_dv,
            owner2_key,
        })
    }
}

impl Message for SetupDevice {
    const MSG_TYPE: Msgtype = 65;
}

#[cfg(test)]
mod tests {
    use coset::CoseSign1Builder;
    use pretty_assertions::assert_eq;

    use crate::utils::cbor_encode;
    use crate::v101::public_key::tests::create_public_key;
    use crate::v101::rendezvous_info::tests::create_rv_info;
    use crate::v101::tests::{create_guid, create_nonce};

    use super::*;

    #[test]
    fn setup_device_roundtrip() {
        let payload = SetupDevicePayload {
            rendezvous_info: create_rv_info(),
            guid: create_guid(),
            nonce_to2_setup_dv: NonceTo2SetupDv(create_nonce()),
            owner2_key: create_public_key(),
        };

        let setup = SetupDevice(Signed::new(
            CoseSign1Builder::new()
                .payload(cbor_encode(&payload).unwrap())
                .signature(vec![5; 64])
                .build(),
        ));

        let value = setup.encode().unwrap();

        let res = SetupDevice::decode(&value).unwrap();

        assert_eq!(res, setup);
        assert_eq!(res.0.payload().unwrap(), payload);
    }
}
