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

//! The manufacturing station sends credentials to the Device.
//!
//! The credentials in OVHeader are identical to the OVHeader field of the Ownership Voucher. Note
//! that OVHeader is wrapped in a byte string, as it is in the Ownership Voucher.

use serde::{Deserialize, Serialize};

use crate::utils::CborBstr;
use crate::v101::ownership_voucher::OvHeader;
use crate::v101::{Message, Msgtype};

/// ```cddl
/// DI.SetCredentials = [
///     bstr .cbor OVHeader
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SetCredentials {
    /// Ownership voucher header
    pub ov_header: CborBstr<OvHeader>,
}

impl Serialize for SetCredentials {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self { ov_header } = self;

        (ov_header,).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SetCredentials {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (ov_header,) = Deserialize::deserialize(deserializer)?;

        Ok(Self { ov_header })
    }
}

impl Message for SetCredentials {
    const MSG_TYPE: Msgtype = 11;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::v101::ownership_voucher::tests::create_header;

    use super::*;

    #[test]
    fn set_credentials_roundtrip() {
        let set_credentials = SetCredentials {
            ov_header: CborBstr::new(create_header()),
        };

        let value = set_credentials.encode().unwrap();

        let res = SetCredentials::decode(&value).unwrap();

        assert_eq!(res, set_credentials);
        assert_eq!(
            res.ov_header.bytes().unwrap(),
            set_credentials.ov_header.bytes().unwrap()
        );
    }
}
