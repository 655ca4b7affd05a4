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

//! In-process transport to a [`Dispatcher`].

use std::collections::HashMap;
use std::sync::Arc;

use fdo_protocol::error::ErrorKind;
use fdo_protocol::{Envelope, Error};
use tracing::{error, trace};
use url::Url;

use crate::server::Dispatcher;

use super::{Connector, Transport};

/// Sends the requests to a dispatcher in the same process.
///
/// Messages go through the wire encoding in both directions.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    dispatcher: Arc<Dispatcher>,
}

impl LoopbackTransport {
    /// Creates the transport to the dispatcher.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl Transport for LoopbackTransport {
    async fn send(&mut self, request: Envelope) -> Result<Envelope, Error> {
        let request = Envelope::decode(&request.encode()?)?;

        trace!(msg_id = request.msg_id(), "loopback request");

        let result = self.dispatcher.dispatch(&request);

        trace!(msg_id = result.reply.msg_id(), done = result.done, "loopback reply");

        Envelope::decode(&result.reply.encode()?)
    }
}

/// Resolves the host of an address to an in-process dispatcher.
#[derive(Debug, Clone, Default)]
pub struct LoopbackConnector {
    hosts: HashMap<String, Arc<Dispatcher>>,
}

impl LoopbackConnector {
    /// Creates a connector without hosts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes the host to the dispatcher.
    pub fn with_host(mut self, host: impl Into<String>, dispatcher: Arc<Dispatcher>) -> Self {
        self.hosts.insert(host.into(), dispatcher);

        self
    }
}

impl Connector for LoopbackConnector {
    type Transport = LoopbackTransport;

    fn connect(&self, base_url: &Url) -> Result<Self::Transport, Error> {
        let host = base_url.host_str().unwrap_or_default();

        self.hosts
            .get(host)
            .cloned()
            .map(LoopbackTransport::new)
            .ok_or_else(|| {
                error!(%base_url, "unknown loopback host");

                Error::new(ErrorKind::Io, "couldn't connect")
            })
    }
}
