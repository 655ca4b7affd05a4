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

//! Device signed and owned secret in the Ownership Voucher.
//!
//! The device returns the HMAC of the internal secret and the DI.SetCredentials.OVHeader tag. The
//! manufacturer combines this HMAC with its own transmitted information to create an Ownership
//! Voucher with zero entries.

use serde::{Deserialize, Serialize};

use crate::v101::hash_hmac::HMac;
use crate::v101::{ClientMessage, Message, Msgtype};

use super::done::Done;

/// ```cddl
/// DI.SetHMAC = [
///     Hmac: HMac
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SetHmac {
    /// HMAC of the ownership voucher header
    pub hmac: HMac,
}

impl Serialize for SetHmac {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self { hmac } = self;

        (hmac,).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SetHmac {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (hmac,) = Deserialize::deserialize(deserializer)?;

        Ok(Self { hmac })
    }
}

impl Message for SetHmac {
    const MSG_TYPE: Msgtype = 12;
}

impl ClientMessage for SetHmac {
    type Response = Done;
}
