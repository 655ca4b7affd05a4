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

//! Client for the FDO protocol.

use std::future::Future;

use fdo_protocol::error::ErrorKind;
use fdo_protocol::v101::error::{ErrorCode, ErrorMessage};
use fdo_protocol::v101::{ClientMessage, InitialMessage, Message, Msgtype};
use fdo_protocol::{Envelope, Error};
use tracing::{error, trace, warn};
use url::Url;

use crate::crypto::session::SessionKey;

pub mod http;
pub mod loopback;

/// Carries a request to the server and returns its reply.
pub trait Transport: Send {
    /// Sends the request and waits for the reply.
    fn send(&mut self, request: Envelope) -> impl Future<Output = Result<Envelope, Error>> + Send;
}

/// Creates a [`Transport`] for a server address.
pub trait Connector: Send + Sync {
    /// Transport to the server.
    type Transport: Transport;

    /// Connects to the server at the base URL.
    fn connect(&self, base_url: &Url) -> Result<Self::Transport, Error>;
}

/// Checks the reply is the expected message.
///
/// An error message from the server is logged and returned as an error.
fn parse_reply<M>(reply: &Envelope) -> Result<M, Error>
where
    M: Message,
{
    if reply.is_error() {
        match reply.message::<ErrorMessage>() {
            Ok(error) => error!(%error, "error message received"),
            Err(err) => error!(error = %err, "couldn't decode error message"),
        }

        return Err(Error::new(ErrorKind::Message, "error message received"));
    }

    reply.message()
}

/// Initial client to start a session
#[derive(Debug)]
pub struct InitialClient<T> {
    transport: T,
}

impl<T> InitialClient<T>
where
    T: Transport,
{
    /// Creates the client
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Sends the first message of an exchange, returning the session token.
    pub(crate) async fn send<M>(&mut self, msg: &M) -> Result<(M::Response, String), Error>
    where
        M: InitialMessage,
    {
        let reply = self.transport.send(Envelope::from_message(msg)?).await?;

        let response = parse_reply::<M::Response>(&reply)?;

        let token = reply
            .token()
            .ok_or(Error::new(ErrorKind::Session, "missing session token"))?
            .to_string();

        trace!(msg_id = M::MSG_TYPE, "session started");

        Ok((response, token))
    }

    /// Sets the token for the session
    pub(crate) fn into_session(self, token: String) -> AuthClient<T> {
        AuthClient {
            token,
            transport: self.transport,
        }
    }
}

/// Client in a session with the server.
#[derive(Debug)]
pub(crate) struct AuthClient<T> {
    token: String,
    transport: T,
}

impl<T> AuthClient<T>
where
    T: Transport,
{
    /// Sends a message with the current session
    pub(crate) async fn send<M>(&mut self, msg: &M) -> Result<M::Response, Error>
    where
        M: ClientMessage,
    {
        let reply = self.send_msg(Envelope::from_message(msg)?).await?;

        parse_reply(&reply)
    }

    /// Reports an error to the server, ending the session.
    pub(crate) async fn send_err(&mut self, err_msg: &ErrorMessage) -> Result<(), Error> {
        let request = Envelope::from_message(err_msg)?.with_token(self.token.as_str());

        let reply = self.transport.send(request).await?;

        trace!(msg_id = reply.msg_id(), "error message sent");

        Ok(())
    }

    /// Reports the error to the server, then returns it.
    pub(crate) async fn abort(&mut self, err: Error, prev_msg_id: Msgtype) -> Error {
        if let Err(send_err) = self.send_err(&device_error(&err, prev_msg_id)).await {
            warn!(error = %send_err, "couldn't report the error to the server");
        }

        err
    }

    async fn send_msg(&mut self, request: Envelope) -> Result<Envelope, Error> {
        let reply = self
            .transport
            .send(request.with_token(self.token.as_str()))
            .await?;

        match reply.token() {
            Some(token) if token != self.token => {
                error!("session token changed");

                Err(Error::new(ErrorKind::Session, "session token changed"))
            }
            _ => Ok(reply),
        }
    }

    /// Protects the rest of the session with the key.
    pub(crate) fn into_encrypted(self, key: SessionKey) -> EncryptedClient<T> {
        EncryptedClient { key, inner: self }
    }
}

/// Client in a session protected by the session key.
#[derive(Debug)]
pub(crate) struct EncryptedClient<T> {
    key: SessionKey,
    inner: AuthClient<T>,
}

impl<T> EncryptedClient<T>
where
    T: Transport,
{
    fn open<M>(&self, reply: &Envelope) -> Result<M, Error>
    where
        M: Message,
    {
        if reply.is_error() {
            return parse_reply(reply);
        }

        if reply.msg_id() != M::MSG_TYPE {
            error!(
                expected = M::MSG_TYPE,
                received = reply.msg_id(),
                "unexpected message type"
            );

            return Err(Error::new(ErrorKind::Message, "unexpected message type"));
        }

        M::decode(&self.key.open(reply.body())?)
    }

    /// Sends a plain message, expecting an encrypted response.
    pub(crate) async fn send_plain<M>(&mut self, msg: &M) -> Result<M::Response, Error>
    where
        M: ClientMessage,
    {
        let reply = self.inner.send_msg(Envelope::from_message(msg)?).await?;

        self.open(&reply)
    }

    /// Sends an encrypted message.
    pub(crate) async fn send<M>(&mut self, msg: &M) -> Result<M::Response, Error>
    where
        M: ClientMessage,
    {
        let body = self.key.seal(&msg.encode()?)?;

        let reply = self.inner.send_msg(Envelope::new(M::MSG_TYPE, body)).await?;

        self.open(&reply)
    }

    /// Reports the error to the server, then returns it.
    pub(crate) async fn abort(&mut self, err: Error, prev_msg_id: Msgtype) -> Error {
        self.inner.abort(err, prev_msg_id).await
    }
}

/// Base URL of a server from the scheme, host and port.
pub(crate) fn base_url(scheme: &str, host: &url::Host<String>, port: u16) -> Result<Url, Error> {
    Url::parse(&format!("{scheme}://{host}:{port}")).map_err(|err| {
        error!(error = %err, %host, "couldn't parse URL");

        Error::new(ErrorKind::Invalid, "url")
    })
}

/// Message sent to the server when the device aborts the exchange.
pub(crate) fn device_error(err: &Error, prev_msg_id: Msgtype) -> ErrorMessage {
    ErrorMessage::new(
        ErrorCode::for_kind(*err.kind()),
        prev_msg_id,
        err.kind().to_string(),
        None,
        None,
    )
}

#[cfg(test)]
mod tests {
    use std::net::Ipv6Addr;

    use pretty_assertions::assert_eq;
    use url::Host;

    use super::*;

    #[test]
    fn base_url_of_hosts() {
        let url = base_url("https", &Host::Domain("rv.local".to_string()), 8041).unwrap();
        insta::assert_snapshot!(url, @"https://rv.local:8041/");

        let url = base_url("http", &Host::Ipv6(Ipv6Addr::LOCALHOST), 80).unwrap();
        insta::assert_snapshot!(url, @"http://[::1]/");
    }

    #[test]
    fn device_error_hides_details() {
        let err = Error::new(ErrorKind::Crypto, "to verify hmac");

        let msg = device_error(&err, 61);

        assert_eq!(msg.error_code(), 101);
        assert_eq!(msg.prev_msg_id(), 61);
        insta::assert_snapshot!(msg.error_str(), @"couldn't complete crypto operation");
    }
}
