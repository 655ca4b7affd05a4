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

//! Transfer Ownership Protocol 0 (TO0).
//!
//! The Owner Onboarding Service registers itself at the Rendezvous Server, so that the device can
//! find its new owner in the TO1 protocol. The registration is kept for a limited amount of time.

pub mod accept_owner;
pub mod hello;
pub mod hello_ack;
pub mod owner_sign;
