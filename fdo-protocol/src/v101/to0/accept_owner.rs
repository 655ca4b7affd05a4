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

//! Completes the TO0 protocol.
//!
//! The Rendezvous Server accepted the registration and returns the number of seconds it will keep
//! it, which is never more than the requested time.

use serde::{Deserialize, Serialize};

use crate::v101::{Message, Msgtype};

/// ```cddl
/// TO0.AcceptOwner = [
///     WaitSeconds
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptOwner {
    /// Granted registration time in seconds
    pub wait_seconds: u32,
}

impl Serialize for AcceptOwner {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self { wait_seconds } = self;

        (wait_seconds,).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AcceptOwner {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (wait_seconds,) = Deserialize::deserialize(deserializer)?;

        Ok(Self { wait_seconds })
    }
}

impl Message for AcceptOwner {
    const MSG_TYPE: Msgtype = 23;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::value::Value;

    use super::*;

    #[test]
    fn accept_owner_roundtrip() {
        let accept = AcceptOwner { wait_seconds: 60 };

        let value = accept.encode().unwrap();

        assert_eq!(value, Value::Array(vec![Value::from(60u32)]));

        let res = AcceptOwner::decode(&value).unwrap();

        assert_eq!(res, accept);
    }

    #[test]
    fn accept_owner_negative() {
        let value = Value::Array(vec![Value::from(-1i64)]);

        assert!(AcceptOwner::decode(&value).is_err());
    }
}
