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

//! Configuration of the server exchanges.

use fdo_protocol::v101::public_key::{PkType, PublicKey};
use fdo_protocol::v101::rendezvous_info::RendezvousInfo;
use fdo_protocol::v101::service_info::ServiceInfo;

pub use crate::srv_info::DEFAULT_MTU;

/// Default maximum time a TO0 registration is kept.
pub const DEFAULT_MAX_WAIT_SECONDS: u32 = 3600;

/// Key signing the device certificates and the first voucher entry.
///
/// The private part is found with the [`KeyResolver`](crate::crypto::keys::KeyResolver).
#[derive(Debug, Clone, PartialEq)]
pub enum ManufacturerKey {
    /// Exactly this key.
    Key(PublicKey),
    /// Any key of the type.
    Type(PkType),
}

/// Manufacturer configuration for DI.
#[derive(Debug, Clone)]
pub struct DiConfig {
    /// Key of the manufacturer.
    pub manufacturer_key: ManufacturerKey,
    /// Rendezvous directives written in the voucher header.
    pub rv_info: RendezvousInfo,
    /// Owner the voucher is extended to right after DI.
    pub default_owner: Option<PublicKey>,
}

impl DiConfig {
    /// Creates the configuration without a default owner.
    pub fn new(manufacturer_key: PublicKey, rv_info: RendezvousInfo) -> Self {
        Self {
            manufacturer_key: ManufacturerKey::Key(manufacturer_key),
            rv_info,
            default_owner: None,
        }
    }

    /// Signs with the first known key of the type.
    pub fn with_key_type(pk_type: PkType, rv_info: RendezvousInfo) -> Self {
        Self {
            manufacturer_key: ManufacturerKey::Type(pk_type),
            rv_info,
            default_owner: None,
        }
    }
}

/// Rendezvous configuration for TO0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct To0Config {
    /// Upper bound for the wait seconds granted to an owner.
    pub max_wait_seconds: u32,
}

impl Default for To0Config {
    fn default() -> Self {
        Self {
            max_wait_seconds: DEFAULT_MAX_WAIT_SECONDS,
        }
    }
}

/// Owner configuration for TO2.
#[derive(Debug, Clone)]
pub struct To2Config {
    /// Key the voucher is extended to at the end of TO2, the current owner key if missing.
    pub replacement_owner_key: Option<PublicKey>,
    /// Service info sent to the device.
    pub owner_service_info: ServiceInfo,
    /// Size of the service info messages accepted by the owner.
    pub mtu: u16,
    /// Maximum message size advertised in `TO2.ProveOVHdr`, 0 for the protocol default.
    pub max_message_size: u16,
    /// Accept a device keeping its credentials.
    pub allow_credential_reuse: bool,
}

impl Default for To2Config {
    fn default() -> Self {
        Self {
            replacement_owner_key: None,
            owner_service_info: ServiceInfo::new(),
            mtu: DEFAULT_MTU,
            max_message_size: 0,
            allow_credential_reuse: true,
        }
    }
}

/// Configuration of all the exchanges served by a dispatcher.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// DI is refused when missing.
    pub di: Option<DiConfig>,
    /// TO0 configuration.
    pub to0: To0Config,
    /// TO2 configuration.
    pub to2: To2Config,
}

impl ServerConfig {
    /// Server for the manufacturer.
    pub fn manufacturer(di: DiConfig) -> Self {
        Self {
            di: Some(di),
            ..Default::default()
        }
    }
}
