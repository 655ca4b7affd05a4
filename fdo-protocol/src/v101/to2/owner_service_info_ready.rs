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

//! Owner Service Info Ready, Type 67
//!
//! From Owner Onboarding Service to Device.
//!
//! This message responds to TO2.DeviceServiceInfoReady and indicates that the Owner Onboarding
//! Service is ready to start ServiceInfo.

use serde::{Deserialize, Serialize};

use crate::v101::{Message, Msgtype};

/// ```cddl
/// TO2.OwnerServiceInfoReady  = [
///     maxDeviceServiceInfoSz    ;; maximum size service info that Owner can receive
/// ]
/// maxDeviceServiceInfoSz = uint16 / null
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerServiceInfoReady {
    /// Maximum size of the service info the owner can receive
    pub max_device_service_info_sz: Option<u16>,
}

impl Serialize for OwnerServiceInfoReady {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self { max_device_service_info_sz } = self;

        (max_device_service_info_sz,).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for OwnerServiceInfoReady {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (max_device_service_info_sz,) = Deserialize::deserialize(deserializer)?;

        Ok(Self { max_device_service_info_sz })
    }
}

impl Message for OwnerServiceInfoReady {
    const MSG_TYPE: Msgtype = 67;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn owner_service_info_ready_roundtrip() {
        for case in [None, Some(1300)] {
            let ready = OwnerServiceInfoReady {
                max_device_service_info_sz: case,
            };

            let value = ready.encode().unwrap();

            let res = OwnerServiceInfoReady::decode(&value).unwrap();

            assert_eq!(res, ready);
        }
    }
}
