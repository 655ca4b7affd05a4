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

//! Server side of the protocol.
//!
//! The [`Dispatcher`] receives one [`Envelope`] per request, selects the step of the exchange
//! from the message id and the state saved for the session token, and returns the reply.
//! Nothing is kept in memory between two requests, the state goes through the
//! [`SessionStore`](stores::SessionStore).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use fdo_protocol::error::ErrorKind;
use fdo_protocol::utils::Hex;
use fdo_protocol::v101::error::{ErrorCode, ErrorMessage};
use fdo_protocol::v101::ownership_voucher::OwnershipVoucher;
use fdo_protocol::v101::public_key::{PkType, PublicKey};
use fdo_protocol::v101::{Guid, Message, Msgtype};
use fdo_protocol::{Envelope, Error, Value};
use tracing::{debug, error, info, warn};

use crate::crypto;
use crate::crypto::keys::{KeyResolver, SigningKey};

use self::config::ServerConfig;
use self::listener::{LogListener, SessionListener};
use self::session::{Exchange, SessionState, To2State};
use self::stores::{
    AccessList, DeviceAccess, MemoryRedirectStore, MemorySessionStore, MemoryVoucherStore,
    RedirectStore, SessionStore, VoucherStore,
};

pub mod config;
pub mod listener;
pub mod session;
pub mod stores;

mod di;
mod to0;
mod to1;
mod to2;

/// Reply to a request.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResult {
    /// Message to send back
    pub reply: Envelope,
    /// The exchange is over, successfully or not
    pub done: bool,
}

/// Collaborators used by the steps.
#[derive(Clone)]
pub struct Services {
    /// Session state by token
    pub sessions: Arc<dyn SessionStore>,
    /// Ownership vouchers
    pub vouchers: Arc<dyn VoucherStore>,
    /// TO0 registrations
    pub redirects: Arc<dyn RedirectStore>,
    /// Devices refused by the rendezvous
    pub access: Arc<dyn DeviceAccess>,
    /// Private keys of the manufacturer and the owners
    pub keys: Arc<dyn KeyResolver>,
}

impl Services {
    /// All the stores in memory, with the given keys.
    pub fn in_memory(keys: Arc<dyn KeyResolver>) -> Self {
        Self {
            sessions: Arc::new(MemorySessionStore::new()),
            vouchers: Arc::new(MemoryVoucherStore::new()),
            redirects: Arc::new(MemoryRedirectStore::new()),
            access: Arc::new(AccessList::new()),
            keys,
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// Outcome of a step.
#[derive(Debug)]
pub(crate) enum Step {
    /// Reply and wait for the next message.
    Continue {
        reply: Envelope,
        state: SessionState,
    },
    /// Last reply of the exchange.
    Done { reply: Envelope },
}

impl Step {
    pub(crate) fn next<M>(reply: &M, state: SessionState) -> Result<Self, Error>
    where
        M: Message,
    {
        Envelope::from_message(reply).map(|reply| Step::Continue { reply, state })
    }

    pub(crate) fn done<M>(reply: &M) -> Result<Self, Error>
    where
        M: Message,
    {
        Envelope::from_message(reply).map(|reply| Step::Done { reply })
    }
}

/// What a step can access.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StepCtx<'a> {
    pub(crate) config: &'a ServerConfig,
    pub(crate) services: &'a Services,
}

impl StepCtx<'_> {
    /// Private key for the public key.
    pub(crate) fn signing_key(&self, public_key: &PublicKey) -> Result<Arc<SigningKey>, Error> {
        self.services.keys.resolve(public_key)?.ok_or_else(|| {
            error!(pk_type = ?public_key.pk_type(), "signing key not found");

            Error::new(ErrorKind::Resource, "signing key not found")
        })
    }

    /// First signing key of the type.
    pub(crate) fn signing_key_alg(&self, pk_type: PkType) -> Result<Arc<SigningKey>, Error> {
        self.services.keys.resolve_alg(pk_type)?.ok_or_else(|| {
            error!(?pk_type, "no signing key of the type");

            Error::new(ErrorKind::Resource, "signing key not found")
        })
    }

    /// Voucher of the device.
    pub(crate) fn voucher(&self, guid: &Guid) -> Result<OwnershipVoucher, Error> {
        self.services.vouchers.load(guid)?.ok_or_else(|| {
            error!(%guid, "voucher not found");

            Error::new(ErrorKind::Resource, "voucher not found")
        })
    }
}

/// Drives the DI, TO0, TO1 and TO2 exchanges.
pub struct Dispatcher {
    config: ServerConfig,
    services: Services,
    listener: Arc<dyn SessionListener>,
}

impl Dispatcher {
    /// Creates the dispatcher, logging the session events.
    pub fn new(config: ServerConfig, services: Services) -> Self {
        Self {
            config,
            services,
            listener: Arc::new(LogListener),
        }
    }

    /// Replaces the listener of the session events.
    pub fn with_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listener = listener;

        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the collaborators.
    pub fn services(&self) -> &Services {
        &self.services
    }

    fn ctx(&self) -> StepCtx<'_> {
        StepCtx {
            config: &self.config,
            services: &self.services,
        }
    }

    /// Handles a request.
    ///
    /// Every error ends the session with an ERROR reply.
    pub fn dispatch(&self, request: &Envelope) -> DispatchResult {
        let msg_id = request.msg_id();

        if request.is_error() {
            return self.peer_error(request);
        }

        let Some(exchange) = Exchange::for_msg(msg_id) else {
            error!(msg_id, "unknown message type");

            let err = Error::new(ErrorKind::Message, "unknown message type");

            self.listener.failed(None, msg_id, &err);

            return error_reply(msg_id, &err);
        };

        let result = if msg_id == exchange.initial() {
            self.start(exchange, request)
        } else {
            self.resume(exchange, request)
        };

        match result {
            Ok(result) => result,
            Err(err) => {
                self.listener.failed(Some(exchange), msg_id, &err);

                error_reply(msg_id, &err)
            }
        }
    }

    fn start(&self, exchange: Exchange, request: &Envelope) -> Result<DispatchResult, Error> {
        self.listener.starting(exchange, request.msg_id());

        if let Some(token) = request.token() {
            warn!("initial message with a session token, dropping the old session");

            self.services.sessions.delete(token)?;
        }

        let ctx = self.ctx();

        let step = match exchange {
            Exchange::Di => di::app_start(ctx, request)?,
            Exchange::To0 => to0::hello(ctx, request)?,
            Exchange::To1 => to1::hello_rv(ctx, request)?,
            Exchange::To2 => to2::hello_device(ctx, request)?,
        };

        match step {
            Step::Continue { reply, state } => {
                let token = new_token()?;

                self.services.sessions.create(&token, &state)?;

                self.listener.started(exchange, &token);

                Ok(DispatchResult {
                    reply: reply.with_token(token),
                    done: false,
                })
            }
            Step::Done { reply } => {
                self.listener.completed(exchange);

                Ok(DispatchResult { reply, done: true })
            }
        }
    }

    fn resume(&self, exchange: Exchange, request: &Envelope) -> Result<DispatchResult, Error> {
        let token = request.token().ok_or_else(|| {
            error!("missing session token");

            Error::new(ErrorKind::Session, "missing token")
        })?;

        let state = self.services.sessions.load(token)?.ok_or_else(|| {
            error!("unknown session token");

            Error::new(ErrorKind::Session, "unknown token")
        })?;

        let result = self.advance(exchange, token, state, request);

        if result.is_err() {
            if let Err(err) = self.services.sessions.delete(token) {
                error!(error = %err, "couldn't delete failed session");
            }
        }

        result
    }

    fn advance(
        &self,
        exchange: Exchange,
        token: &str,
        state: SessionState,
        request: &Envelope,
    ) -> Result<DispatchResult, Error> {
        let msg_id = request.msg_id();

        if state.exchange() != exchange || !state.accepts(msg_id) {
            error!(
                session = %state.exchange(),
                msg_id,
                "message not expected by the session"
            );

            return Err(Error::new(ErrorKind::Message, "unexpected message"));
        }

        self.listener.continuing(exchange, msg_id);

        let ctx = self.ctx();

        let step = match (state, msg_id) {
            (SessionState::Di(state), 12) => di::set_hmac(ctx, state, request)?,
            (SessionState::To0(state), 22) => to0::owner_sign(ctx, state, request)?,
            (SessionState::To1(state), 32) => to1::prove_to_rv(ctx, state, request)?,
            (SessionState::To2(To2State::ProveOvHdr(state)), 62) => {
                to2::get_ov_next_entry(ctx, state, request)?
            }
            (SessionState::To2(To2State::ProveOvHdr(state)), 64) => {
                to2::prove_device(ctx, state, request)?
            }
            (SessionState::To2(To2State::Setup(state)), 66) => {
                to2::device_service_info_ready(ctx, state, request)?
            }
            (SessionState::To2(To2State::ServiceInfo(state)), 68) => {
                to2::device_service_info(ctx, state, request)?
            }
            (SessionState::To2(To2State::Done(state)), 70) => to2::done(ctx, state, request)?,
            (state, msg_id) => {
                error!(session = %state.exchange(), msg_id, "no step for the message");

                return Err(Error::new(ErrorKind::Message, "unexpected message"));
            }
        };

        match step {
            Step::Continue { reply, state } => {
                self.services.sessions.store(token, &state)?;

                self.listener.continued(exchange, token);

                Ok(DispatchResult {
                    reply: reply.with_token(token),
                    done: false,
                })
            }
            Step::Done { reply } => {
                self.services.sessions.delete(token)?;

                self.listener.completed(exchange);

                Ok(DispatchResult { reply, done: true })
            }
        }
    }

    fn peer_error(&self, request: &Envelope) -> DispatchResult {
        match request.message::<ErrorMessage>() {
            Ok(msg) => warn!(%msg, "error received from peer"),
            Err(err) => warn!(error = %err, "malformed error received from peer"),
        }

        let mut exchange = None;

        if let Some(token) = request.token() {
            match self.services.sessions.load(token) {
                Ok(state) => exchange = state.map(|state| state.exchange()),
                Err(err) => error!(error = %err, "couldn't load session"),
            }

            if let Err(err) = self.services.sessions.delete(token) {
                error!(error = %err, "couldn't delete session");
            }
        }

        let err = Error::new(ErrorKind::Message, "error received from peer");

        self.listener.failed(exchange, request.msg_id(), &err);

        error_reply(request.msg_id(), &err)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn new_token() -> Result<String, Error> {
    crypto::random::<16>().map(|bytes| Hex::new(&bytes).to_string())
}

/// Fixed text for each code, the details are only logged.
fn error_str(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::InvalidJwtToken => "invalid session token",
        ErrorCode::InvalidOwnershipVoucher => "invalid ownership voucher",
        ErrorCode::InvalidOwnerSignBody => "invalid owner sign body",
        ErrorCode::InvalidIpAddress => "invalid ip address",
        ErrorCode::InvalidGuid => "invalid guid",
        ErrorCode::ResourceNotFound => "resource not found",
        ErrorCode::MessageBodyError => "invalid message body",
        ErrorCode::InvalidMessageError => "invalid message",
        ErrorCode::CredReuseError => "credential reuse refused",
        ErrorCode::InternalServerError => "internal server error",
    }
}

fn error_reply(prev_msg_id: Msgtype, err: &Error) -> DispatchResult {
    let code = ErrorCode::for_kind(*err.kind());

    info!(%code, prev_msg_id, error = %err, "replying with error");

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|elapsed| elapsed.as_secs());

    let msg = ErrorMessage::new(code, prev_msg_id, error_str(code), timestamp, None);

    let reply = Envelope::from_message(&msg).unwrap_or_else(|err| {
        error!(error = %err, "couldn't encode error message");

        Envelope::new(ErrorMessage::MSG_TYPE, Value::Null)
    });

    debug!("session ended with error");

    DispatchResult { reply, done: true }
}
