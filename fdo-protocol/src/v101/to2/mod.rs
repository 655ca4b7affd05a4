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

//! Transfer Ownership Protocol 2 (TO2).
//!
//! The device connects to the new owner, both sides prove their identities, and a key exchange
//! establishes an encrypted session. The owner then replaces the device credentials and the two
//! sides exchange service info.
//!
//! All the messages after the TO2.ProveDevice are encrypted with the session key.

pub mod device_service_info;
pub mod device_service_info_ready;
pub mod done;
pub mod done2;
pub mod get_ov_next_entry;
pub mod hello_device;
pub mod owner_service_info;
pub mod owner_service_info_ready;
pub mod ov_next_entry;
pub mod prove_device;
pub mod prove_ov_hdr;
pub mod setup_device;
