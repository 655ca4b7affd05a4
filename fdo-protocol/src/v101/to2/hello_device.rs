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

//! Hello Device, Type 60
//!
//! From Device ROE to Owner Onboarding Service
//!
//! First message in the TO2.
//!
//! Sets up new owner for proof of ownership.
//!
//! The maxDeviceMessageSize indicates the maximum sized FIDO Device Onboard message the Device is
//! able to receive, buffer, and decode. A value of zero indicates the default message size. The
//! Owner may use this value to adjust the size of messages sent to the device, but only starting
//! with TO2.OVNextEntry. The default message size applies to TO2.ProveOVHdr.

use serde::{Deserialize, Serialize};

use crate::v101::key_exchange::KexSuitNames;
use crate::v101::sign_info::EASigInfo;
use crate::v101::{ClientMessage, Guid, InitialMessage, Message, Msgtype, NonceTo2ProveOv};

use super::prove_ov_hdr::ProveOvHdr;

/// ```cddl
/// TO2.HelloDevice = [
///     maxDeviceMessageSize,
///     Guid,
///     NonceTO2ProveOV,
///     kexSuiteName,
///     cipherSuiteName,
///     eASigInfo  ;; Device attestation signature info
/// ]
/// maxDeviceMessageSize = uint16
/// kexSuiteName = tstr
/// cipherSuiteName = CipherSuites
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HelloDevice {
    /// Maximum message size the device can receive, zero for the default
    pub max_device_message_size: u16,
    /// GUID of the device
    pub guid: Guid,
    /// Nonce the owner signs in the TO2.ProveOVHdr
    pub nonce_to2_prove_ov: NonceTo2ProveOv,
    /// Key exchange suite
    pub kex_suite_name: KexSuitNames,
    /// COSE algorithm identifier of the session cipher
    pub cipher_suite_name: i64,
    /// Device attestation signature info
    pub ea_sign_info: EASigInfo,
}

impl Serialize for HelloDevice {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self {
            max_device_message_size,
            guid,
            nonce_to2_prove_ov,
            kex_suite_name,
            cipher_suite_name,
            ea_sign_info,
        } = self;

        (
            max_device_message_size,
            guid,
            nonce_to2_prove_ov,
            kex_suite_name,
            cipher_suite_name,
            ea_sign_info,
        )
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HelloDevice {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (
            max_device_message_size,
            guid,
            nonce_to2_prove_ov,
            kex_suite_name,
            cipher_suite_name,
            ea_sign_info,
        ) = Deserialize::deserialize(deserializer)?;

        Ok(Self {
            max_device_message_size,
            guid,
            nonce_to2_prove_ov,
            kex_suite_name,
            cipher_suite_name,
            ea_sign_info,
        })
    }
}

impl Message for HelloDevice {
    const MSG_TYPE: Msgtype = 60;
}

impl ClientMessage for HelloDevice {
    type Response = ProveOvHdr;
}

impl InitialMessage for HelloDevice {}

#[cfg(test)]
mod tests {
    use coset::iana::EnumI64;
    use pretty_assertions::assert_eq;

    use crate::value::Value;
    use crate::v101::sign_info::{DeviceSgType, SigInfo};
    use crate::v101::tests::{create_guid, create_nonce};

    use super::*;

    #[test]
    fn hello_device_roundtrip() {
        let hello = HelloDevice {
            max_device_message_size: 1400,
            guid: create_guid(),
            nonce_to2_prove_ov: NonceTo2ProveOv(create_nonce()),
            kex_suite_name: KexSuitNames::ECDH256,
            cipher_suite_name: coset::iana::Algorithm::A256GCM.to_i64(),
            ea_sign_info: EASigInfo(SigInfo::new(DeviceSgType::StSecP256R1)),
        };

        let value = hello.encode().unwrap();

        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 6);
        assert_eq!(items[3], Value::from("ECDH256"));
        assert_eq!(items[4], Value::from(3u8));

        let res = HelloDevice::decode(&value).unwrap();

        assert_eq!(res, hello);
    }

    #[test]
    fn hello_device_unknown_kex() {
        let mut value = HelloDevice {
            max_device_message_size: 0,
            guid: create_guid(),
            nonce_to2_prove_ov: NonceTo2ProveOv(create_nonce()),
            kex_suite_name: KexSuitNames::ECDH384,
            cipher_suite_name: coset::iana::Algorithm::A256GCM.to_i64(),
            ea_sign_info: EASigInfo(SigInfo::new(DeviceSgType::StSecP384R1)),
        }
        .encode()
        .unwrap();

        if let Value::Array(items) = &mut value {
            items[3] = Value::from("ECDH521");
        }

        assert!(HelloDevice::decode(&value).is_err());
    }
}
