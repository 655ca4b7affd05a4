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

//! Device Service Info Ready, Type 66
//!
//! From Device to Owner Onboarding Service.
//!
//! This message signals a state change between the authentication phase of the protocol and the
//! provisioning phase (ServiceInfo) negotiation.
//!
//! A null HMAC indicates acceptance of the credential reuse protocol.

use serde::{Deserialize, Serialize};

use crate::v101::hash_hmac::HMac;
use crate::v101::{ClientMessage, Message, Msgtype};

use super::owner_service_info_ready::OwnerServiceInfoReady;

/// ```cddl
/// TO2.DeviceServiceInfoReady = [
///     ReplacementHMac, ;; Replacement for DI.SetHMac.HMac or equivalent
///     maxOwnerServiceInfoSz    ;; maximum size service info that Device can receive
/// ]
/// ReplacementHMac = HMac / null
/// maxOwnerServiceInfoSz = uint16 / null
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceServiceInfoReady {
    /// HMAC of the replacement header, none for credential reuse
    pub replacement_hmac: Option<HMac>,
    /// Maximum size of the service info the device can receive
    pub max_owner_service_info_sz: Option<u16>,
}

impl Serialize for DeviceServiceInfoReady {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self { replacement_hmac, max_owner_service_info_sz } = self;

        (replacement_hmac, max_owner_service_info_sz).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DeviceServiceInfoReady {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (replacement_hmac, max_owner_service_info_sz) = Deserialize::deserialize(deserializer)?;

        Ok(Self { replacement_hmac, max_owner_service_info_sz })
    }
}

impl Message for DeviceServiceInfoReady {
    const MSG_TYPE: Msgtype = 66;
}

impl ClientMessage for DeviceServiceInfoReady {
    type Response = OwnerServiceInfoReady;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::v101::hash_hmac::tests::create_hmac;
    use crate::value::Value;

    use super::*;

    #[test]
    fn device_service_info_ready_roundtrip() {
        let ready = DeviceServiceInfoReady {
            replacement_hmac: Some(create_hmac()),
            max_owner_service_info_sz: Some(1300),
        };

        let value = ready.encode().unwrap();

        let res = DeviceServiceInfoReady::decode(&value).unwrap();

        assert_eq!(res, ready);
    }

    #[test]
    fn device_service_info_ready_reuse() {
        let ready = DeviceServiceInfoReady {
            replacement_hmac: None,
            max_owner_service_info_sz: None,
        };

        let value = ready.encode().unwrap();

        assert_eq!(value, Value::Array(vec![Value::Null, Value::Null]));

        let res = DeviceServiceInfoReady::decode(&value).unwrap();

        assert_eq!(res, ready);
    }
}
