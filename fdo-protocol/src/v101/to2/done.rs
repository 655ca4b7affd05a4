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

//! Done, Type 70
//!
//! From Device ROE to Owner Onboarding Service.
//!
//! Indicates successful completion of the Transfer of Ownership. The nonce proves the message is
//! part of this same session.

use serde::{Deserialize, Serialize};

use crate::v101::{ClientMessage, Message, Msgtype, NonceTo2ProveDv};

use super::done2::Done2;

/// ```cddl
/// TO2.Done = [
///     NonceTO2ProveDv ;; Nonce generated by Owner Onboarding Service
///                     ;; ...and sent to Device ROE in Msg TO2.ProveOVHdr
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Done {
    /// Nonce from the TO2.ProveOVHdr
    pub nonce_to2_prove_dv: NonceTo2ProveDv,
}

impl Serialize for Done {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self { nonce_to2_prove_dv } = self;

        (nonce_to2_prove_dv,).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Done {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (nonce_to2_prove_dv,) = Deserialize::deserialize(deserializer)?;

        Ok(Self { nonce_to2_prove_dv })
    }
}

impl Message for Done {
    const MSG_TYPE: Msgtype = 70;
}

impl ClientMessage for Done {
    type Response = Done2;
}
