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

//! Prove Device, Type 64
//!
//! From Device to Owner Onboarding Service.
//!
//! Proves the provenance of the Device to the new owner, using the entity attestation token based
//! on the challenge NonceTO2ProveDv sent as TO2.ProveOVHdr.UnprotectedHeaders.CUPHNonce. The
//! signature is verified using the device public key of the Ownership Voucher. If the signature
//! cannot be verified, or fails to verify, the connection is terminated with an error message.
//!
//! The unprotected header [`EUPH_NONCE`](crate::v101::eat_signature::EUPH_NONCE) carries the
//! NonceTO2SetupDv used in TO2.SetupDevice and TO2.Done2.
//!
//! Subsequent message bodies are protected for confidentiality and integrity.

use serde::{Deserialize, Serialize};

use crate::utils::{deserialize_cose, serialize_cose};
use crate::v101::eat_signature::EaToken;
use crate::v101::key_exchange::XBKeyExchange;
use crate::v101::{ClientMessage, Message, Msgtype};

use super::setup_device::SetupDevice;

/// ```cddl
/// TO2.ProveDevice = EAToken
/// $$EATPayloadBase //= (
///     EAT-NONCE: NonceTO2ProveDv
/// )
/// $EATUnprotectedHeaders /= (
///     EUPHNonce: NonceTO2SetupDv ;; NonceTO2SetupDv is used in TO2.SetupDevice and TO2.Done2
/// )
/// $EATPayloads /= (
///     TO2ProveDevicePayload
/// )
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ProveDevice {
    /// Token signed with the device key
    pub ea_token: EaToken,
}

impl Serialize for ProveDevice {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_cose(&self.ea_token, serializer)
    }
}

impl<'de> Deserialize<'de> for ProveDevice {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserialize_cose(deserializer).map(|ea_token| Self { ea_token })
    }
}

/// Value of the FDO claim in the TO2.ProveDevice token.
///
/// ```cddl
/// TO2ProveDevicePayload = [
///     xBKeyExchange
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ProveDevicePayload {
    /// Key exchange second step
    pub xb_key_exchange: XBKeyExchange,
}

impl Serialize for ProveDevicePayload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self { xb_key_exchange } = self;

        (xb_key_exchange,).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ProveDevicePayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (xb_key_exchange,) = Deserialize::deserialize(deserializer)?;

        Ok(Self { xb_key_exchange })
    }
}

impl Message for ProveDevice {
    const MSG_TYPE: Msgtype = 64;
}

impl ClientMessage for ProveDevice {
    type Response = SetupDevice;
}

#[cfg(test)]
mod tests {
    use coset::{CoseSign1Builder, HeaderBuilder};
    use pretty_assertions::assert_eq;

    use crate::v101::eat_signature::{EatPayload, EUPH_NONCE};
    use crate::v101::key_exchange::EcdhParams;
    use crate::v101::tests::{create_guid, create_nonce};
    use crate::v101::NonceTo2SetupDv;
    use crate::value::{from_value, to_value};

    use super::*;

    #[test]
    fn prove_device_roundtrip() {
        let fdo = ProveDevicePayload {
            xb_key_exchange: XBKeyExchange::create(EcdhParams::with_p256(
                &[5; 32],
                &[6; 32],
                &[7; 16],
            ))
            .unwrap(),
        };

        let claims =
            EatPayload::new(create_nonce(), &create_guid()).with_fdo(to_value(&fdo).unwrap());

        let setup_nonce = NonceTo2SetupDv([8; 16].into());

        let ea_token = CoseSign1Builder::new()
            .unprotected(
                HeaderBuilder::new()
                    .value(
                        EUPH_NONCE,
                        ciborium::Value::serialized(&setup_nonce).unwrap(),
                    )
                    .build(),
            )
            .payload(claims.to_bytes().unwrap())
            .signature(vec![1; 64])
            .build();

        let prove = ProveDevice { ea_token };

        let value = prove.encode().unwrap();

        let res = ProveDevice::decode(&value).unwrap();

        assert_eq!(res, prove);

        let res_claims = EatPayload::from_bytes(res.ea_token.payload.as_deref().unwrap()).unwrap();
        let res_fdo: ProveDevicePayload = from_value(res_claims.fdo().unwrap()).unwrap();

        assert_eq!(res_fdo, fdo);
    }
}
