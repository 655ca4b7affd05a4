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

//! EAT signatures are used for entity attestation of Devices.

use crate::error::ErrorKind;
use crate::value::{Map, Value};
use crate::{codec, Error};

use super::{Guid, Nonce};

/// ```cddl
/// ;; This is an untagged COSE_Sign1 object:
/// EAToken = EATokenBase
///
/// EATokenBase  = [
///    protected:   bytes .cbor $EATProtectedHeaders,
///    unprotected: $EATUnprotectedHeaders
///    payload:     bytes .cbor EATPayloadBaseMap
///    signature:   bstr
/// ]
/// EATPayloadBaseMap = { EATPayloadBase }
/// $$EATPayloadBase //= (
///     EAT-FDO => $EATPayloads,
///     EAT-NONCE => Nonce,
///     EAT-UEID  => EAT-GUID,
///     EATOtherClaims
/// )
/// ;; EAT claim tags, defined by the EAT draft or IANA, see appendix
/// ;; EAT-NONCE
/// ;; EAT-UEID
///
/// ;; FIDO Device Onboard specific EAT claim tag, see appendix
/// ;;EAT-FDO
/// ;;EATMAROEPrefix
/// ;;EUPHNonce
///
/// ;; EAT GUID is a EAT-UEID with the first byte
/// ;; as EAT-RAND and subsequent bytes containing
/// ;; the FIDO Device Onboard GUID
/// EAT-GUID = bstr .size 17
/// EAT-RAND = 1
///
/// ;; Use the socket/plug feature of CBOR here.
/// $$EATProtectedHeaders //= ()
/// $$EATUnprotectedHeaders //= (
///     EATMAROEPrefix: MAROEPrefix
/// )
/// $EATPayloads /= ()
/// ```
pub type EaToken = coset::CoseSign1;

/// ```cddl
/// EAT-NONCE      = 10 ;; iana assignment
/// ```
pub const EAT_NONCE: i64 = 10;

/// ```cddl
/// EAT-UEID       = 256 ;; iana assignment
/// ```
pub const EAT_UEID: i64 = 256;

/// ```cddl
/// EAT-FDO        = -257 ;; iana assignment
/// ```
pub const EAT_FDO: i64 = -257;

/// ```cddl
/// EATMAROEPrefix = -258 ;; iana assignment
/// ```
pub const EATMAROE_PREFIX: i64 = -258;

/// ```cddl
/// EUPHNonce      = -259 ;; iana assignment
/// ```
pub const EUPH_NONCE: i64 = -259;

/// ```cddl
/// CUPHNonce       = 256 ;; bstr
/// ```
pub const CUPH_NONCE: i64 = 256;

/// ```cddl
/// CUPHOwnerPubKey = 257 ;; PublicKey
/// ```
pub const CUPH_OWNER_PUBKEY: i64 = 257;

/// Claims in the payload of an [`EaToken`].
#[derive(Debug, Clone, PartialEq)]
pub struct EatPayload {
    nonce: Nonce,
    ueid: Vec<u8>,
    fdo: Option<Value>,
}

impl EatPayload {
    /// Creates the payload for the device with the given GUID.
    pub fn new(nonce: Nonce, guid: &Guid) -> Self {
        Self {
            nonce,
            ueid: guid.ueid().to_vec(),
            fdo: None,
        }
    }

    /// Sets the FDO specific claim.
    pub fn with_fdo(mut self, fdo: Value) -> Self {
        self.fdo = Some(fdo);

        self
    }

    /// Returns the nonce claim.
    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// Returns the FDO specific claim.
    pub fn fdo(&self) -> Option<&Value> {
        self.fdo.as_ref()
    }

    /// Checks the UEID claim matches the GUID.
    pub fn is_device(&self, guid: &Guid) -> bool {
        self.ueid == guid.ueid()
    }

    /// Encodes the claims map.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut map = Map::new()
            .with(EAT_NONCE, Value::bytes(self.nonce.as_slice()))
            .with(EAT_UEID, Value::bytes(self.ueid.as_slice()));

        if let Some(fdo) = &self.fdo {
            map.insert(EAT_FDO, fdo.clone());
        }

        codec::to_vec(&Value::Map(map))
    }

    /// Decodes the claims map.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        let value = codec::from_slice(buf)?;

        let map = value
            .as_map()
            .ok_or(Error::new(ErrorKind::Decode, "eat payload is not a map"))?;

        let nonce = map
            .get_int(EAT_NONCE)
            .and_then(Value::as_bytes)
            .and_then(|bytes| <[u8; 16]>::try_from(bytes).ok())
            .ok_or(Error::new(ErrorKind::Decode, "eat nonce claim"))?;

        let ueid = map
            .get_int(EAT_UEID)
            .and_then(Value::as_bytes)
            .ok_or(Error::new(ErrorKind::Decode, "eat ueid claim"))?;

        Ok(Self {
            nonce: Nonce::from(nonce),
            ueid: ueid.to_vec(),
            fdo: map.get_int(EAT_FDO).cloned(),
        })
    }
}
