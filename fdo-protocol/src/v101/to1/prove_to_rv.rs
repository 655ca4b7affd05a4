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

//! Proves validity of device identity to the Rendezvous Server.
//!
//! For the Device seeking its owner, and indicates its GUID.

use serde::{Deserialize, Serialize};

use crate::utils::{deserialize_cose, serialize_cose};
use crate::v101::eat_signature::EaToken;
use crate::v101::{ClientMessage, Message, Msgtype};

use super::rv_redirect::RvRedirect;

/// ```cddl
/// TO1.ProveToRV = EAToken
/// $$EATPayloadBase //= (
///     EAT-NONCE: NonceTO1Proof
/// )
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ProveToRv {
    /// Token signed with the device key
    pub ea_token: EaToken,
}

impl Serialize for ProveToRv {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_cose(&self.ea_token, serializer)
    }
}

impl<'de> Deserialize<'de> for ProveToRv {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserialize_cose(deserializer).map(|ea_token| Self { ea_token })
    }
}

impl Message for ProveToRv {
    const MSG_TYPE: Msgtype = 32;
}

impl ClientMessage for ProveToRv {
    type Response = RvRedirect;
}
