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

//! The App Start message starts the Device Initialization part of protocol.
//!
//! The device sends its manufacturing information, together with a self signed certificate request
//! that proves possession of the device key.

use serde::{Deserialize, Serialize};

use crate::v101::device_cert::CertRequest;
use crate::v101::public_key::PkType;
use crate::v101::{ClientMessage, InitialMessage, Message, Msgtype};

use super::set_credentials::SetCredentials;

/// ```cddl
/// DI.AppStart = [
///     DeviceMfgInfo: DeviceMfgInfo
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AppStart {
    /// Manufacturing information of the device
    pub device_mfg_info: DeviceMfgInfo,
}

impl Serialize for AppStart {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self { device_mfg_info } = self;

        (device_mfg_info,).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AppStart {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (device_mfg_info,) = Deserialize::deserialize(deserializer)?;

        Ok(Self { device_mfg_info })
    }
}

/// Manufacturing information of the device.
///
/// ```cddl
/// DeviceMfgInfo = [
///     deviceInfo:   tstr,
///     serialNumber: tstr,
///     pkType:       pkType,
///     csr:          CertRequest
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMfgInfo {
    /// Type of the device, used by the owner to select an onboarding procedure
    pub device_info: String,
    /// Serial number of the device
    pub serial_number: String,
    /// Type of the device key
    pub pk_type: PkType,
    /// Self signed certificate request
    pub csr: CertRequest,
}

impl Serialize for DeviceMfgInfo {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self {
            device_info,
            serial_number,
            pk_type,
            csr,
        } = self;

        (device_info, serial_number, pk_type, csr).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DeviceMfgInfo {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (device_info, serial_number, pk_type, csr) = Deserialize::deserialize(deserializer)?;

        Ok(Self {
            device_info,
            serial_number,
            pk_type,
            csr,
        })
    }
}

impl Message for AppStart {
    const MSG_TYPE: Msgtype = 10;
}

impl ClientMessage for AppStart {
    type Response = SetCredentials;
}

impl InitialMessage for AppStart {}

#[cfg(test)]
mod tests {
    use coset::CoseSign1Builder;
    use pretty_assertions::assert_eq;

    use crate::utils::cbor_encode;
    use crate::v101::device_cert::CertRequestPayload;
    use crate::v101::public_key::tests::create_public_key;
    use crate::value::Value;

    use super::*;

    #[test]
    fn app_start_roundtrip() {
        let payload = CertRequestPayload::new(
            "AABCCDDDEEF".to_string(),
            "model".to_string(),
            create_public_key(),
        );

        let csr = CertRequest::new(
            CoseSign1Builder::new()
                .payload(cbor_encode(&payload).unwrap())
                .signature(vec![1; 64])
                .build(),
        );

        let app_start = AppStart {
            device_mfg_info: DeviceMfgInfo {
                device_info: "model".to_string(),
                serial_number: "AABCCDDDEEF".to_string(),
                pk_type: PkType::Secp256R1,
                csr,
            },
        };

        let value = app_start.encode().unwrap();

        // [[deviceInfo, serialNumber, pkType, csr]]
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 1);
        let info = items[0].as_array().unwrap();
        assert_eq!(info.len(), 4);
        assert_eq!(info[1], Value::from("AABCCDDDEEF"));
        assert_eq!(info[2], Value::from(10u8));

        let res = AppStart::decode(&value).unwrap();

        assert_eq!(res, app_start);
        assert_eq!(
            res.device_mfg_info.csr.payload().unwrap().serial_number(),
            "AABCCDDDEEF"
        );
    }
}
