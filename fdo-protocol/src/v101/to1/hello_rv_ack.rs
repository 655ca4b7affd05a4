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

//! Sets up Device for next message.
//!
//! The NonceTO1Proof tag contains a nonce to use as a guarantee of signature freshness in the
//! TO1.ProveTORV. The eBSigInfo variable contains signature related information.

use serde::{Deserialize, Serialize};

use crate::v101::sign_info::EBSigInfo;
use crate::v101::{Message, Msgtype, NonceTo1Proof};

/// ```cddl
/// TO1.HelloRVAck = [
///     NonceTO1Proof,
///     eBSigInfo
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HelloRvAck {
    /// Nonce to sign in the TO1.ProveToRV
    pub nonce_to1_proof: NonceTo1Proof,
    /// Signature information for the device
    pub eb_sign_info: EBSigInfo,
}

impl Serialize for HelloRvAck {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self { nonce_to1_proof, eb_sign_info } = self;

        (nonce_to1_proof, eb_sign_info).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HelloRvAck {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (nonce_to1_proof, eb_sign_info) = Deserialize::deserialize(deserializer)?;

        Ok(Self { nonce_to1_proof, eb_sign_info })
    }
}

impl Message for HelloRvAck {
    const MSG_TYPE: Msgtype = 31;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::v101::sign_info::{DeviceSgType, SigInfo};
    use crate::v101::tests::create_nonce;

    use super::*;

    #[test]
    fn hello_rv_ack_roundtrip() {
        let ack = HelloRvAck {
            nonce_to1_proof: NonceTo1Proof(create_nonce()),
            eb_sign_info: EBSigInfo(SigInfo::new(DeviceSgType::StSecP384R1)),
        };

        let value = ack.encode().unwrap();

        let res = HelloRvAck::decode(&value).unwrap();

        assert_eq!(res, ack);
    }
}
