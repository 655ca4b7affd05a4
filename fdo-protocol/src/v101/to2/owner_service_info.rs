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

//! Owner Service Info, Type 69
//!
//! From Owner Onboarding Service to Device.
//!
//! Sends as many Owner to Device ServiceInfo entries as will conveniently fit into a message, based
//! on protocol and implementation constraints. This message is part of a loop with
//! TO2.DeviceServiceInfo.

use serde::{Deserialize, Serialize};

use crate::v101::service_info::ServiceInfo;
use crate::v101::{Message, Msgtype};

/// ```cddl
/// TO2.OwnerServiceInfo = [
///     IsMoreServiceInfo,
///     IsDone,
///     ServiceInfo
/// ]
/// IsDone = bool
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerServiceInfo {
    /// More service info will follow
    pub is_more_service_info: bool,
    /// The owner has no more service info to send
    pub is_done: bool,
    /// Service info entries
    pub service_info: ServiceInfo,
}

impl Serialize for OwnerServiceInfo {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self { is_more_service_info, is_done, service_info } = self;

        (is_more_service_info, is_done, service_info).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for OwnerServiceInfo {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (is_more_service_info, is_done, service_info) = Deserialize::deserialize(deserializer)?;

        Ok(Self { is_more_service_info, is_done, service_info })
    }
}

impl Message for OwnerServiceInfo {
    const MSG_TYPE: Msgtype = 69;
}
