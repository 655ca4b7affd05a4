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

//! Completes the TO1 protocol.
//!
//! Indicates to the Device ROE that a new Owner is indeed waiting for it, and may be found by
//! connecting to any of the entries in to1dBlobPayload.RVTO2Addr containing network address
//! information.

use serde::{Deserialize, Serialize};

use crate::utils::Signed;
use crate::v101::hash_hmac::Hash;
use crate::v101::rv_to2_addr::RvTo2Addr;
use crate::v101::{Message, Msgtype};

/// ```cddl
/// TO1.RVRedirect = to1d
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RvRedirect(pub To1d);

/// Blob registered by the owner in TO0, signed with the owner key.
///
/// ```cddl
/// to1d = CoseSignature
/// $COSEPayloads /= (
///     to1dBlobPayload
/// )
/// ```
pub type To1d = Signed<To1dPayload>;

/// ```cddl
/// to1dBlobPayload = [
///     to1dRV:       RVTO2Addr, ;; choices to access TO2 protocol
///     to1dTo0dHash: Hash       ;; Hash of to0d from same to0 message
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct To1dPayload {
    /// Addresses of the owner onboarding service
    pub to1d_rv: RvTo2Addr,
    /// Hash of the to0d in the same TO0.OwnerSign
    pub to1d_to0d_hash: Hash,
}

impl Serialize for To1dPayload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self {
            to1d_rv,
            to1d_to0d_hash,
        } = self;

        (to1d_rv, to1d_to0d_hash).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for To1dPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (to1d_rv, to1d_to0d_hash) = Deserialize::deserialize(deserializer)?;

        Ok(Self {
            to1d_rv,
            to1d_to0d_hash,
        })
    }
}

impl Message for RvRedirect {
    const MSG_TYPE: Msgtype = 33;
}

#[cfg(test)]
pub(crate) mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use coset::CoseSign1Builder;
    use pretty_assertions::assert_eq;

    use crate::utils::{cbor_encode, OneOrMore};
    use crate::v101::hash_hmac::tests::create_hash;
    use crate::v101::rv_to2_addr::RvTo2AddrEntry;
    use crate::v101::TransportProtocol;

    use super::*;

    pub(crate) fn create_to1d_payload() -> To1dPayload {
        let entry = RvTo2AddrEntry::new(
            Some(IpAddr::V4(Ipv4Addr::LOCALHOST).into()),
            None,
            8042,
            TransportProtocol::Http,
        );

        To1dPayload {
            to1d_rv: OneOrMore::new(vec![entry]).unwrap(),
            to1d_to0d_hash: create_hash(),
        }
    }

    pub(crate) fn create_to1d() -> To1d {
        let sign = CoseSign1Builder::new()
            .payload(cbor_encode(&create_to1d_payload()).unwrap())
            .signature(vec![2; 64])
            .build();

        To1d::new(sign)
    }

    #[test]
    fn rv_redirect_roundtrip() {
        let redirect = RvRedirect(create_to1d());

        let value = redirect.encode().unwrap();

        assert_eq!(value.as_array().map(|items| items.len()), Some(4));

        let res = RvRedirect::decode(&value).unwrap();

        assert_eq!(res, redirect);
        assert_eq!(res.0.payload().unwrap(), create_to1d_payload());
    }
}
