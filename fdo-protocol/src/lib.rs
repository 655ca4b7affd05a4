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

//! Protocol types and wire format for FIDO Device Onboard.
//!
//! The crate contains the self describing [`Value`] model, the strict CBOR [`codec`], the message
//! [`Envelope`](envelope::Envelope) and the typed message bodies of every sub-protocol in
//! [`v101`].

#![warn(missing_docs)]

pub mod codec;
pub mod envelope;
pub mod error;
pub mod utils;
pub mod v101;
pub mod value;

pub use self::envelope::Envelope;
pub use self::error::Error;
pub use self::value::{from_value, to_value, Integer, Map, Value};

/// Latest supported version of the protocol.
pub use self::v101 as latest;

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;

    pub(crate) fn from_hex(hex: &str) -> Vec<u8> {
        assert_eq!(hex.len() % 2, 0);
        assert!(hex.is_ascii());

        hex.as_bytes()
            .chunks_exact(2)
            .map(|str| {
                let str = std::str::from_utf8(str).expect("should be hex");

                u8::from_str_radix(str, 16).expect("should be hex")
            })
            .collect()
    }
}
