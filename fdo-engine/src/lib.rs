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

#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

//! FIDO Device Onboard protocol engine.
//!
//! Contains the server dispatcher for the DI, TO0, TO1 and TO2 exchanges, the ownership voucher
//! chain and the device and owner drivers.

pub mod client;
pub mod crypto;
pub mod server;
pub mod srv_info;
pub mod storage;
pub mod voucher;

pub mod di;
pub mod to0;
pub mod to1;
pub mod to2;

mod time;

pub use fdo_protocol;
pub use rustls;
pub use url;

pub use self::crypto::Crypto;
pub use self::storage::Storage;

/// Context of the device for the FDO protocol
#[derive(Debug)]
pub struct Ctx<'a, C, S> {
    crypto: &'a mut C,
    storage: &'a mut S,
}

impl<'a, C, S> Ctx<'a, C, S> {
    /// Creates a new context.
    pub fn new(crypto: &'a mut C, storage: &'a mut S) -> Self
    where
        C: Crypto,
        S: Storage,
    {
        Self { crypto, storage }
    }
}
