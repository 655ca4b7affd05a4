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

//! Certificates that bind the device key to its identity.
//!
//! The device proves possession of its key with a self signed [`CertRequest`] during DI. The
//! manufacturer answers with a [`DeviceCert`], signed with the manufacturer key, that ends up in
//! the device certificate chain of the Ownership Voucher.

use serde::{Deserialize, Serialize};

use crate::utils::Signed;

use super::public_key::PublicKey;
use super::Guid;

/// Self signed certificate request of the device.
///
/// ```cddl
/// CertRequest = COSE_Sign1 ;; payload is CertRequestPayload
/// ```
pub type CertRequest = Signed<CertRequestPayload>;

/// ```cddl
/// CertRequestPayload = [
///     serialNumber: tstr,
///     deviceInfo:   tstr,
///     devicePubKey: PublicKey
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CertRequestPayload {
    serial_number: String,
    device_info: String,
    device_pub_key: PublicKey,
}

impl CertRequestPayload {
    /// Creates the payload for the request.
    pub fn new(serial_number: String, device_info: String, device_pub_key: PublicKey) -> Self {
        Self {
            serial_number,
            device_info,
            device_pub_key,
        }
    }

    /// Returns the serial number.
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// Returns the device info.
    pub fn device_info(&self) -> &str {
        &self.device_info
    }

    /// Returns the public key of the device.
    pub fn device_pub_key(&self) -> &PublicKey {
        &self.device_pub_key
    }
}

impl Serialize for CertRequestPayload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self {
            serial_number,
            device_info,
            device_pub_key,
        } = self;

        (serial_number, device_info, device_pub_key).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CertRequestPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (serial_number, device_info, device_pub_key) = Deserialize::deserialize(deserializer)?;

        Ok(Self {
            serial_number,
            device_info,
            device_pub_key,
        })
    }
}

/// Device certificate issued by the manufacturer.
///
/// ```cddl
/// DeviceCert = COSE_Sign1 ;; payload is DeviceCertPayload
/// ```
pub type DeviceCert = Signed<DeviceCertPayload>;

/// Chain of device certificates, from the device to the issuer.
///
/// ```cddl
/// OVDevCertChain = [ + DeviceCert ]
/// ```
pub type OvDevCertChain = Vec<DeviceCert>;

/// ```cddl
/// DeviceCertPayload = [
///     guid:         Guid,
///     serialNumber: tstr,
///     devicePubKey: PublicKey
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCertPayload {
    guid: Guid,
    serial_number: String,
    device_pub_key: PublicKey,
}

impl DeviceCertPayload {
    /// Creates the payload for the certificate.
    pub fn new(guid: Guid, serial_number: String, device_pub_key: PublicKey) -> Self {
        Self {
            guid,
            serial_number,
            device_pub_key,
        }
    }

    /// Returns the GUID of the device.
    pub fn guid(&self) -> &Guid {
        &self.guid
    }

    /// Returns the serial number.
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// Returns the public key of the device.
    pub fn device_pub_key(&self) -> &PublicKey {
        &self.device_pub_key
    }
}

impl Serialize for DeviceCertPayload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self {
            guid,
            serial_number,
            device_pub_key,
        } = self;

        (guid, serial_number, device_pub_key).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DeviceCertPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (guid, serial_number, device_pub_key) = Deserialize::deserialize(deserializer)?;

        Ok(Self {
            guid,
            serial_number,
            device_pub_key,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use coset::CoseSign1Builder;
    use pretty_assertions::assert_eq;

    use crate::utils::{cbor_decode, cbor_encode};
    use crate::v101::public_key::tests::create_public_key;
    use crate::v101::tests::create_guid;

    use super::*;

    pub(crate) fn create_device_cert() -> DeviceCert {
        let payload = DeviceCertPayload::new(
            create_guid(),
            "AABCCDDDEEF".to_string(),
            create_public_key(),
        );

        let sign = CoseSign1Builder::new()
            .payload(cbor_encode(&payload).unwrap())
            .signature(vec![0; 64])
            .build();

        DeviceCert::new(sign)
    }

    #[test]
    fn device_cert_payload() {
        let cert = create_device_cert();

        let payload = cert.payload().unwrap();

        assert_eq!(*payload.guid(), create_guid());
        assert_eq!(payload.serial_number(), "AABCCDDDEEF");
        assert_eq!(*payload.device_pub_key(), create_public_key());
    }

    #[test]
    fn cert_request_roundtrip() {
        let payload = CertRequestPayload::new(
            "AABCCDDDEEF".to_string(),
            "model".to_string(),
            create_public_key(),
        );

        let buf = cbor_encode(&payload).unwrap();

        // ["AABCCDDDEEF", "model", [10, 0, h'04..']]
        assert_eq!(buf[..2], [0x83, 0x6b]);

        let res: CertRequestPayload = cbor_decode(&buf).unwrap();

        assert_eq!(res, payload);
        assert_eq!(res.device_info(), "model");
    }
}
