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

//! Done2, Type 71
//!
//! From Owner Onboarding Service to Device ROE.
//!
//! Responds to TO2.Done, indicating the end of the TO2 protocol. The nonce is the one the device
//! sent in TO2.ProveDevice.

use serde::{Deserialize, Serialize};

use crate::v101::{Message, Msgtype, NonceTo2SetupDv};

/// ```cddl
/// TO2.Done2 = [
///     NonceTO2SetupDv ;; Nonce generated by Device ROE
///                     ;; ...and sent to Owner Onboarding Service in Msg TO2.ProveDevice
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Done2 {
    /// Nonce from the TO2.ProveDevice
    pub nonce_to2_setup_dv: NonceTo2SetupDv,
}

impl Serialize for Done2 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self { nonce_to2_setup_dv } = self;

        (nonce_to2_setup_dv,).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Done2 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (nonce_to2_setup_dv,) = Deserialize::deserialize(deserializer)?;

        Ok(Self { nonce_to2_setup_dv })
    }
}

impl Message for Done2 {
    const MSG_TYPE: Msgtype = 71;
}
