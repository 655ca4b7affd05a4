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

//! Hooks on the lifecycle of the server sessions.

use fdo_protocol::v101::Msgtype;
use fdo_protocol::Error;
use tracing::{debug, info, warn};

use super::session::Exchange;

/// Receives the lifecycle events of the sessions.
///
/// All the methods default to doing nothing.
pub trait SessionListener: Send + Sync {
    /// An initial message was received.
    fn starting(&self, _exchange: Exchange, _msg_id: Msgtype) {}

    /// A session was created.
    fn started(&self, _exchange: Exchange, _token: &str) {}

    /// A message for an existing session was received.
    fn continuing(&self, _exchange: Exchange, _msg_id: Msgtype) {}

    /// The session advanced to the next message.
    fn continued(&self, _exchange: Exchange, _token: &str) {}

    /// The exchange completed successfully.
    fn completed(&self, _exchange: Exchange) {}

    /// The exchange failed, the session is removed.
    fn failed(&self, _exchange: Option<Exchange>, _msg_id: Msgtype, _error: &Error) {}
}

/// Ignores all the events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl SessionListener for NoopListener {}

/// Logs the events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogListener;

impl SessionListener for LogListener {
    fn starting(&self, exchange: Exchange, msg_id: Msgtype) {
        debug!(%exchange, msg_id, "starting session");
    }

    fn started(&self, exchange: Exchange, _token: &str) {
        info!(%exchange, "session started");
    }

    fn continuing(&self, exchange: Exchange, msg_id: Msgtype) {
        debug!(%exchange, msg_id, "continuing session");
    }

    fn continued(&self, exchange: Exchange, _token: &str) {
        debug!(%exchange, "session continued");
    }

    fn completed(&self, exchange: Exchange) {
        info!(%exchange, "session completed");
    }

    fn failed(&self, exchange: Option<Exchange>, msg_id: Msgtype, error: &Error) {
        match exchange {
            Some(exchange) => warn!(%exchange, msg_id, %error, "session failed"),
            None => warn!(msg_id, %error, "message refused"),
        }
    }
}
