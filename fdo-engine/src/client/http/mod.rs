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

//! FDO client for the HTTP protocol

use std::time::Duration;

use fdo_protocol::codec;
use fdo_protocol::error::ErrorKind;
use fdo_protocol::utils::Hex;
use fdo_protocol::v101::error::ErrorMessage;
use fdo_protocol::v101::{Message, Msgtype};
use fdo_protocol::{Envelope, Error};
use http::header::AUTHORIZATION;
use http::{header, HeaderMap, StatusCode};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;
use rustls::ClientConfig;
use tracing::{error, trace, warn};
use url::Url;

use self::retry::HttpRetry;

use super::{Connector, Transport};

mod retry;

const CBOR_MIME: HeaderValue = HeaderValue::from_static("application/cbor");
const MESSAGE_TYPE_HEADER: HeaderName = HeaderName::from_static("message-type");
const BEARER: &str = "Bearer ";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Transport for the HTTP or HTTPS protocol
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: Url,
    retry: HttpRetry,
    inner: reqwest::Client,
}

impl HttpTransport {
    /// Create the HTTP client from a base_url
    pub fn create(base_url: Url, tls: ClientConfig) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, CBOR_MIME);

        let inner = reqwest::ClientBuilder::new()
            .use_preconfigured_tls(tls)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|err| {
                error!(error = %err, "couldn't build the client");

                Error::new(ErrorKind::Invalid, "client")
            })?;

        Ok(Self {
            base_url,
            retry: HttpRetry::new(),
            inner,
        })
    }

    fn make_url(&self, request: &Envelope) -> Result<Url, Error> {
        make_url(&self.base_url, request)
    }

    fn create_req(&self, request: &Envelope) -> Result<reqwest::Request, Error> {
        let body = codec::to_vec(request.body())?;

        let mut req = reqwest::Request::new(Method::POST, self.make_url(request)?);
        req.body_mut().replace(body.into());

        let headers = req.headers_mut();
        headers.insert(MESSAGE_TYPE_HEADER, request.msg_id().into());

        if let Some(token) = request.token() {
            headers.insert(AUTHORIZATION, bearer(token)?);
        }

        Ok(req)
    }

    async fn handle_response(mut resp: reqwest::Response) -> Result<Envelope, Error> {
        let status = resp.status();

        trace!(%status, "HTTP response status");

        let headers = resp.headers();
        let msg_type = get_message_type(headers)?;

        match status {
            StatusCode::OK => {}
            _ if msg_type == ErrorMessage::MSG_TYPE => {
                trace!(%status, "HTTP response with ErrorMessage");
            }
            status => {
                error!(%status, "response has invalid status code");

                return Err(Error::new(
                    ErrorKind::Io,
                    "invalid HTTP status code in response",
                ));
            }
        }

        check_content_type(headers)?;
        let token = get_token(resp.headers_mut())?;

        let bytes = resp.bytes().await.map_err(|err| {
            error!(error = %err, "couldn't read response body");

            Error::new(ErrorKind::Io, "read response body")
        })?;

        trace!(msg = %Hex::new(&bytes));

        let mut reply = Envelope::new(msg_type, codec::from_slice(&bytes)?);

        if let Some(token) = token {
            reply.set_token(token);
        }

        Ok(reply)
    }

    async fn send_with_retry(&mut self, req: reqwest::Request) -> Result<reqwest::Response, Error> {
        let req_cl = req.try_clone();

        let mut resp = self.send_single(req).await;

        let Some(req) = req_cl else {
            warn!("couldn't clone the request");

            return resp;
        };

        while let Some(retry) = self.retry.retry(&resp) {
            retry.await;

            let Some(req_cl) = req.try_clone() else {
                return resp;
            };

            resp = self.send_single(req_cl).await;
        }

        resp
    }

    async fn send_single(&self, req: reqwest::Request) -> Result<reqwest::Response, Error> {
        self.inner.execute(req).await.map_err(|err| {
            error!(error = %err, "couldn't send HTTP request");

            Error::new(ErrorKind::Io, "send HTTP request")
        })
    }
}

impl Transport for HttpTransport {
    async fn send(&mut self, request: Envelope) -> Result<Envelope, Error> {
        let req = self.create_req(&request)?;

        let resp = self.send_with_retry(req).await?;

        Self::handle_response(resp).await
    }
}

/// Connects with HTTP to the servers.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    tls: ClientConfig,
}

impl HttpConnector {
    /// Creates the connector with the TLS configuration for the HTTPS addresses.
    pub fn new(tls: ClientConfig) -> Self {
        Self { tls }
    }
}

impl Connector for HttpConnector {
    type Transport = HttpTransport;

    fn connect(&self, base_url: &Url) -> Result<Self::Transport, Error> {
        HttpTransport::create(base_url.clone(), self.tls.clone())
    }
}

/// `{base}/fdo/{protocolVersion}/msg/{msgId}`
fn make_url(base_url: &Url, request: &Envelope) -> Result<Url, Error> {
    base_url
        .join(&format!(
            "/fdo/{}/msg/{}",
            request.protocol_version(),
            request.msg_id()
        ))
        .map_err(|err| {
            error!(error = %err, "couldn't parse URL");

            Error::new(ErrorKind::Invalid, "url")
        })
}

fn bearer(token: &str) -> Result<HeaderValue, Error> {
    let mut value = HeaderValue::from_str(&format!("{BEARER}{token}")).map_err(|err| {
        error!(error = %err, "invalid session token for the header");

        Error::new(ErrorKind::Invalid, "HTTP authorization header")
    })?;

    value.set_sensitive(true);

    Ok(value)
}

fn get_message_type(headers: &HeaderMap) -> Result<Msgtype, Error> {
    let msg_type = headers.get(MESSAGE_TYPE_HEADER).ok_or(Error::new(
        ErrorKind::Invalid,
        "message type header in response",
    ))?;

    let msg_type = msg_type.to_str().map_err(|err| {
        error!(error = %err, "couldn't convert header value to string");

        Error::new(ErrorKind::Invalid, "UTF-8 string")
    })?;

    msg_type.parse().map_err(|err| {
        error!(error = %err, msg_type, "couldn't parse message-type");

        Error::new(ErrorKind::Invalid, "message-type")
    })
}

/// Session token of the `Authorization: Bearer` header, if present.
fn get_token(headers: &mut HeaderMap) -> Result<Option<String>, Error> {
    let Some(header) = headers.remove(AUTHORIZATION) else {
        return Ok(None);
    };

    let token = header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix(BEARER))
        .ok_or(Error::new(ErrorKind::Invalid, "HTTP authorization header"))?;

    Ok(Some(token.to_string()))
}

fn check_content_type(headers: &HeaderMap) -> Result<(), Error> {
    let content_type = headers.get(header::CONTENT_TYPE).ok_or(Error::new(
        ErrorKind::Invalid,
        "HTTP Content-Type header missing",
    ))?;

    if content_type != CBOR_MIME {
        let content_type = String::from_utf8_lossy(content_type.as_bytes());

        error!(%content_type, "invalid CONTENT_TYPE header");

        return Err(Error::new(ErrorKind::Invalid, "HTTP mime type"));
    }

    Ok(())
}
