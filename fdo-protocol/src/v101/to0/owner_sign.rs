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

//! Registers the device at the Rendezvous Server.
//!
//! The owner sends the Ownership Voucher together with the signed blob the device will receive in
//! TO1. The Rendezvous Server verifies the voucher, the signature of the blob with the owner key, and
//! that the blob refers to this exact to0d by its hash.

use serde::{Deserialize, Serialize};

use crate::utils::CborBstr;
use crate::v101::ownership_voucher::OwnershipVoucher;
use crate::v101::to1::rv_redirect::To1d;
use crate::v101::{ClientMessage, Message, Msgtype, NonceTo0Sign};

use super::accept_owner::AcceptOwner;

/// ```cddl
/// TO0.OwnerSign = [
///     to0d: bstr .cbor to0d,
///     to1d: to1d
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerSign {
    /// Voucher and requested registration time
    pub to0d: CborBstr<To0d>,
    /// Blob signed by the owner key, returned to the device in TO1
    pub to1d: To1d,
}

impl Serialize for OwnerSign {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self { to0d, to1d } = self;

        (to0d, to1d).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for OwnerSign {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (to0d, to1d) = Deserialize::deserialize(deserializer)?;

        Ok(Self { to0d, to1d })
    }
}

/// ```cddl
/// to0d = [
///     OwnershipVoucher: OwnershipVoucher,
///     WaitSeconds: uint32,
///     NonceTO0Sign: NonceTO0Sign
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct To0d {
    /// Voucher of the device to register
    pub ownership_voucher: OwnershipVoucher,
    /// Requested time to keep the registration
    pub wait_seconds: u32,
    /// Nonce from the TO0.HelloAck
    pub nonce_to0_sign: NonceTo0Sign,
}

impl Serialize for To0d {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self {
            ownership_voucher,
            wait_seconds,
            nonce_to0_sign,
        } = self;

        (ownership_voucher, wait_seconds, nonce_to0_sign).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for To0d {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (ownership_voucher, wait_seconds, nonce_to0_sign) =
            Deserialize::deserialize(deserializer)?;

        Ok(Self {
            ownership_voucher,
            wait_seconds,
            nonce_to0_sign,
        })
    }
}

impl Message for OwnerSign {
    const MSG_TYPE: Msgtype = 22;
}

impl ClientMessage for OwnerSign {
    type Response = AcceptOwner;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::v101::ownership_voucher::tests::create_voucher;
    use crate::v101::tests::create_nonce;
    use crate::v101::to1::rv_redirect::tests::create_to1d;

    use super::*;

    #[test]
    fn owner_sign_roundtrip() {
        let owner_sign = OwnerSign {
            to0d: CborBstr::new(To0d {
                ownership_voucher: create_voucher(),
                wait_seconds: 3600,
                nonce_to0_sign: create_nonce(),
            }),
            to1d: create_to1d(),
        };

        let value = owner_sign.encode().unwrap();

        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].as_bytes().unwrap(),
            owner_sign.to0d.bytes().unwrap()
        );

        let res = OwnerSign::decode(&value).unwrap();

        assert_eq!(res, owner_sign);
        assert_eq!(res.to0d.wait_seconds, 3600);
    }
}
