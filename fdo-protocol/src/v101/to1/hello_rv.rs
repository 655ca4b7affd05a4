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

//! Establishes the presence of the device at the Rendezvous Server.
//!
//! The “Guid” parameter is the GUID of the Device. This is used as an index by the Rendezvous
//! Server to look up information associated with the Device. If the Rendezvous Server does include
//! a record for this Guid, processing in this protocol continues.
//!
//! If the Rendezvous Server does not include a record for this Guid, then it returns an ERROR
//! message and terminates the TO1 protocol (see error RESOURCE_NOT_FOUND). The Device will continue
//! to try to onboard, perhaps using a different Rendezvous Server or perhaps finding the Guid on
//! this one at a later time, following the mandated interpretation of RendezvousInfo.

use serde::{Deserialize, Serialize};

use crate::v101::sign_info::EASigInfo;
use crate::v101::{ClientMessage, Guid, InitialMessage, Message, Msgtype};

use super::hello_rv_ack::HelloRvAck;

/// ```cddl
/// TO1.HelloRV = [
///     Guid,
///     eASigInfo
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HelloRv {
    /// The device GUID.
    pub guid: Guid,
    /// Signature information of the device
    pub ea_sign_info: EASigInfo,
}

impl Serialize for HelloRv {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self { guid, ea_sign_info } = self;

        (guid, ea_sign_info).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HelloRv {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (guid, ea_sign_info) = Deserialize::deserialize(deserializer)?;

        Ok(Self { guid, ea_sign_info })
    }
}

impl Message for HelloRv {
    const MSG_TYPE: Msgtype = 30;
}

impl ClientMessage for HelloRv {
    type Response = HelloRvAck;
}

impl InitialMessage for HelloRv {}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::tests::from_hex;
    use crate::codec::to_vec;
    use crate::v101::sign_info::{DeviceSgType, SigInfo};
    use crate::v101::tests::create_guid;

    use super::*;

    #[test]
    fn hello_rv_roundtrip() {
        let hello = HelloRv {
            guid: create_guid(),
            ea_sign_info: EASigInfo(SigInfo::new(DeviceSgType::StSecP256R1)),
        };

        let value = hello.encode().unwrap();

        assert_eq!(
            to_vec(&value).unwrap(),
            from_hex("825043bc9e0f731a4e7f947c5d03b0c1e483822640")
        );

        let res = HelloRv::decode(&value).unwrap();

        assert_eq!(res, hello);
    }
}
