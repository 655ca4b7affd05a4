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

//! Per token state of the server exchanges.

use std::fmt::Display;

use fdo_protocol::utils::CborBstr;
use fdo_protocol::v101::device_cert::OvDevCertChain;
use fdo_protocol::v101::hash_hmac::{HMac, Hashtype};
use fdo_protocol::v101::ownership_voucher::OvHeader;
use fdo_protocol::v101::public_key::PublicKey;
use fdo_protocol::v101::service_info::ServiceInfo;
use fdo_protocol::v101::{Guid, Msgtype, Nonce};
use serde::{Deserialize, Serialize};

use crate::crypto::session::{OwnerKeyExchange, SessionKey};

/// Sub-protocol a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exchange {
    /// Device Initialize
    Di,
    /// Owner registration to the rendezvous
    To0,
    /// Device lookup of the owner
    To1,
    /// Transfer of the ownership
    To2,
}

impl Exchange {
    /// Exchange served for a message id.
    pub fn for_msg(msg_id: Msgtype) -> Option<Self> {
        match msg_id {
            10..=13 => Some(Self::Di),
            20..=23 => Some(Self::To0),
            30..=33 => Some(Self::To1),
            60..=71 => Some(Self::To2),
            _ => None,
        }
    }

    /// Message starting the exchange.
    pub fn initial(&self) -> Msgtype {
        match self {
            Exchange::Di => 10,
            Exchange::To0 => 20,
            Exchange::To1 => 30,
            Exchange::To2 => 60,
        }
    }
}

impl Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Exchange::Di => write!(f, "DI"),
            Exchange::To0 => write!(f, "TO0"),
            Exchange::To1 => write!(f, "TO1"),
            Exchange::To2 => write!(f, "TO2"),
        }
    }
}

/// State saved between two messages of an exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionState {
    /// Device Initialize
    Di(DiState),
    /// Owner registration
    To0(To0State),
    /// Device lookup
    To1(To1State),
    /// Ownership transfer
    To2(To2State),
}

impl SessionState {
    /// Exchange of the state.
    pub fn exchange(&self) -> Exchange {
        match self {
            SessionState::Di(_) => Exchange::Di,
            SessionState::To0(_) => Exchange::To0,
            SessionState::To1(_) => Exchange::To1,
            SessionState::To2(_) => Exchange::To2,
        }
    }

    /// Checks if the message can be received next.
    pub fn accepts(&self, msg_id: Msgtype) -> bool {
        match self {
            SessionState::Di(DiState::SetHmac { .. }) => msg_id == 12,
            SessionState::To0(To0State::OwnerSign { .. }) => msg_id == 22,
            SessionState::To1(To1State::ProveToRv { .. }) => msg_id == 32,
            SessionState::To2(To2State::ProveOvHdr(_)) => msg_id == 62 || msg_id == 64,
            SessionState::To2(To2State::Setup(_)) => msg_id == 66,
            SessionState::To2(To2State::ServiceInfo(_)) => msg_id == 68,
            SessionState::To2(To2State::Done(_)) => msg_id == 70,
        }
    }
}

/// DI waiting for `DI.SetHMAC`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DiState {
    /// Credentials sent to the device
    SetHmac {
        /// Header sent in `DI.SetCredentials`
        ov_header: CborBstr<OvHeader>,
        /// Certificates issued for the device
        dev_cert_chain: OvDevCertChain,
        /// HMAC expected from the device
        hmac_type: Hashtype,
    },
}

/// TO0 waiting for `TO0.OwnerSign`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum To0State {
    /// Nonce sent to the owner
    OwnerSign {
        /// Nonce to sign
        nonce: Nonce,
    },
}

/// TO1 waiting for `TO1.ProveToRV`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum To1State {
    /// Nonce sent to the device
    ProveToRv {
        /// Device to prove
        guid: Guid,
        /// Nonce in the attestation
        nonce: Nonce,
    },
}

/// TO2 states, after `TO2.HelloDevice`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum To2State {
    /// Entries are read and the device proves itself.
    ProveOvHdr(Box<To2Prove>),
    /// Waiting for `TO2.DeviceServiceInfoReady`.
    Setup(Box<To2Session>),
    /// Exchanging service info.
    ServiceInfo(Box<To2Session>),
    /// Waiting for `TO2.Done`.
    Done(Box<To2Session>),
}

/// State of TO2 before the key exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct To2Prove {
    /// Device in transfer
    pub guid: Guid,
    /// Entries in the voucher
    pub num_entries: u8,
    /// Index of the entry the device must request next
    pub next_entry: u8,
    /// Nonce the device signs in `TO2.ProveDevice`
    pub nonce_prove_dv: Nonce,
    /// Owner part of the key exchange
    pub key_exchange: OwnerKeyExchange,
    /// Final owner key of the voucher
    pub owner_key: PublicKey,
}

/// State of TO2 after the key exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct To2Session {
    /// Device in transfer
    pub guid: Guid,
    /// Entries in the voucher, to detect concurrent transfers
    pub num_entries: u8,
    /// Key protecting the messages
    pub session_key: SessionKey,
    /// Nonce for `TO2.Done`
    pub nonce_prove_dv: Nonce,
    /// Nonce for `TO2.Done2`
    pub nonce_setup_dv: Nonce,
    /// Final owner key of the voucher
    pub owner_key: PublicKey,
    /// Next owner key, sent in `TO2.SetupDevice`
    pub owner2_key: PublicKey,
    /// New header HMAC, missing on credential reuse
    pub replacement_hmac: Option<HMac>,
    /// Size of the service info messages accepted by the device
    pub device_mtu: u16,
    /// The device sent all its service info
    pub device_done: bool,
    /// Service info received from the device
    pub device_service_info: ServiceInfo,
    /// Next owner service info message to send
    pub cursor: usize,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn exchange_for_msg() {
        let cases = [
            (10, Some(Exchange::Di)),
            (13, Some(Exchange::Di)),
            (14, None),
            (20, Some(Exchange::To0)),
            (23, Some(Exchange::To0)),
            (33, Some(Exchange::To1)),
            (59, None),
            (60, Some(Exchange::To2)),
            (71, Some(Exchange::To2)),
            (255, None),
        ];

        for (msg_id, exp) in cases {
            assert_eq!(Exchange::for_msg(msg_id), exp, "msg {msg_id}");
        }
    }

    #[test]
    fn initial_messages_belong_to_exchange() {
        for exchange in [Exchange::Di, Exchange::To0, Exchange::To1, Exchange::To2] {
            assert_eq!(Exchange::for_msg(exchange.initial()), Some(exchange));
        }
    }

    #[test]
    fn exchange_display() {
        insta::assert_snapshot!(Exchange::To2.to_string(), @"TO2");
    }

    #[test]
    fn states_accept_next_message_only() {
        let to0 = SessionState::To0(To0State::OwnerSign {
            nonce: Nonce::new([1; 16]),
        });
        assert!(to0.accepts(22));
        assert!(!to0.accepts(20));
        assert_eq!(to0.exchange(), Exchange::To0);

        let to1 = SessionState::To1(To1State::ProveToRv {
            guid: Guid::new([2; 16]),
            nonce: Nonce::new([3; 16]),
        });
        assert!(to1.accepts(32));
        assert!(!to1.accepts(30));
        assert!(!to1.accepts(22));
    }

    #[test]
    fn state_survives_encoding() {
        let state = SessionState::To1(To1State::ProveToRv {
            guid: Guid::new([2; 16]),
            nonce: Nonce::new([3; 16]),
        });

        let bytes = fdo_protocol::utils::cbor_encode(&state).unwrap();
        let decoded: SessionState = fdo_protocol::utils::cbor_decode(&bytes).unwrap();

        let SessionState::To1(To1State::ProveToRv { guid, nonce }) = decoded else {
            panic!("wrong state {decoded:?}");
        };

        assert_eq!(guid, Guid::new([2; 16]));
        assert_eq!(nonce, Nonce::new([3; 16]));
    }
}
