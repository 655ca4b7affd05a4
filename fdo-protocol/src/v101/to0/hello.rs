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

//! Starts the TO0 protocol.
//!
//! The Owner Onboarding Service connects to the Rendezvous Server to register the device. The
//! message has no content.

use serde::{Deserialize, Serialize};

use crate::v101::{ClientMessage, InitialMessage, Message, Msgtype};

use super::hello_ack::HelloAck;

/// First message of the TO0 protocol.
///
/// ```cddl
/// TO0.Hello = [] ;; empty message
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Hello;

impl Serialize for Hello {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self {} = self;

        const EMPTY: [ciborium::Value; 0] = [];

        EMPTY.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Hello {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let []: [ciborium::Value; 0] = Deserialize::deserialize(deserializer)?;

        Ok(Self {})
    }
}

impl Message for Hello {
    const MSG_TYPE: Msgtype = 20;
}

impl ClientMessage for Hello {
    type Response = HelloAck;
}

impl InitialMessage for Hello {}
