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

//! Response to the TO0.Hello.
//!
//! The Rendezvous Server sends a nonce that the owner must include in the signed TO0.OwnerSign, as a
//! guarantee of freshness.

use serde::{Deserialize, Serialize};

use crate::v101::{Message, Msgtype, NonceTo0Sign};

/// ```cddl
/// TO0.HelloAck = [
///     NonceTO0Sign
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HelloAck {
    /// Nonce to include in the TO0.OwnerSign
    pub nonce_to0_sign: NonceTo0Sign,
}

impl Serialize for HelloAck {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self { nonce_to0_sign } = self;

        (nonce_to0_sign,).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HelloAck {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (nonce_to0_sign,) = Deserialize::deserialize(deserializer)?;

        Ok(Self { nonce_to0_sign })
    }
}

impl Message for HelloAck {
    const MSG_TYPE: Msgtype = 21;
}
