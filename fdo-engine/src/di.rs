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

//! Device Initialize Protocol (DI)
//!
//! The protocol’s function is to embed the ownership and manufacturing credentials into the newly
//! created device’s ROE. This prepares the device and establishes the first in a chain for creating
//! an Ownership Voucher with which to transfer ownership of the device.

use coset::HeaderBuilder;
use fdo_protocol::utils::{cbor_decode, cbor_encode};
use fdo_protocol::v101::device_cert::CertRequestPayload;
use fdo_protocol::v101::device_credentials::DeviceCredential;
use fdo_protocol::v101::di::app_start::{AppStart, DeviceMfgInfo};
use fdo_protocol::v101::di::done::Done;
use fdo_protocol::v101::di::set_credentials::SetCredentials;
use fdo_protocol::v101::di::set_hmac::SetHmac;
use fdo_protocol::v101::hash_hmac::Hash;
use fdo_protocol::v101::PROTOCOL_VERSION;
use fdo_protocol::Error;
use serde_bytes::ByteBuf;
use tracing::{debug, error, info};

use crate::client::{AuthClient, InitialClient, Transport};
use crate::crypto::{hash_for_key, Crypto};
use crate::storage::Storage;
use crate::Ctx;

pub(crate) const DEVICE_CREDS: &str = "device_creds.cbor";

/// Reads the existing credentials if they exists.
pub async fn read_credentials<S>(storage: &S) -> Result<Option<DeviceCredential>, Error>
where
    S: Storage,
{
    let Some(creds) = storage.read(DEVICE_CREDS).await? else {
        return Ok(None);
    };

    let device_credentials: DeviceCredential = cbor_decode(&creds)
        .inspect_err(|err| error!(error = %err, "couldn't decode device credentials"))?;

    info!("retrieved existing device credentials");

    Ok(Some(device_credentials))
}

/// Di protocol.
#[derive(Debug)]
pub struct Di<S> {
    state: S,
}

impl<'a, T> Di<Start<'a, T>>
where
    T: Transport,
{
    /// Create the client to start the Di protocol
    pub fn new(client: InitialClient<T>, device_info: &'a str, serial_no: &'a str) -> Self {
        Self {
            state: Start {
                device_info,
                serial_no,
                client,
            },
        }
    }

    /// Create the device credentials
    pub async fn create_credentials<C, S>(
        self,
        ctx: &mut Ctx<'_, C, S>,
    ) -> Result<DeviceCredential, Error>
    where
        C: Crypto,
        S: Storage,
    {
        if let Some(done) = read_credentials(&*ctx.storage).await? {
            return Ok(done);
        }

        debug!(
            device_info = self.state.device_info,
            serial_no = self.state.serial_no,
            "credentials not found, running device initialization"
        );

        let set_creds = self.run(ctx).await?;

        let set_hmac = set_creds.run(ctx).await?;

        let dc = set_hmac.run(ctx).await?;

        Ok(dc)
    }

    /// Request signed with the device key.
    async fn app_start<C, S>(&self, ctx: &mut Ctx<'_, C, S>) -> Result<AppStart, Error>
    where
        C: Crypto,
    {
        let device_pub_key = ctx.crypto.public_key().await?;

        let payload = CertRequestPayload::new(
            self.state.serial_no.to_string(),
            self.state.device_info.to_string(),
            device_pub_key,
        );

        let csr = ctx
            .crypto
            .cose_sign(HeaderBuilder::new(), cbor_encode(&payload)?)
            .await?;

        Ok(AppStart {
            device_mfg_info: DeviceMfgInfo {
                device_info: self.state.device_info.to_string(),
                serial_number: self.state.serial_no.to_string(),
                pk_type: ctx.crypto.pk_type(),
                csr: fdo_protocol::utils::Signed::new(csr),
            },
        })
    }

    async fn run<C, S>(mut self, ctx: &mut Ctx<'_, C, S>) -> Result<Di<Credentials<T>>, Error>
    where
        C: Crypto,
    {
        let app_start = self.app_start(ctx).await?;

        let (set_creds, auth) = self.state.client.send(&app_start).await?;

        info!("DI.AppStart successful");

        Ok(Di {
            state: Credentials {
                creds: set_creds,
                client: self.state.client.into_session(auth),
            },
        })
    }
}

/// Start state of the FDO protocol
#[derive(Debug)]
pub struct Start<'a, T> {
    device_info: &'a str,
    serial_no: &'a str,
    client: InitialClient<T>,
}

/// Header received from the manufacturer.
#[derive(Debug)]
pub struct Credentials<T> {
    creds: SetCredentials,
    client: AuthClient<T>,
}

impl<T> Di<Credentials<T>>
where
    T: Transport,
{
    async fn run<C, S>(self, ctx: &mut Ctx<'_, C, S>) -> Result<Di<Hmac<T>>, Error>
    where
        C: Crypto,
    {
        let hash = self.owner_key_hash()?;

        let secret = ctx.crypto.hmac_secret().await?;

        let ov_header = self.state.creds.ov_header;

        let hmac = ctx.crypto.hmac(&secret, ov_header.bytes()?).await?;

        info!(guid = %ov_header.ov_guid);

        let device_creds = DeviceCredential {
            dc_active: true,
            dc_prot_ver: PROTOCOL_VERSION,
            dc_hmac_secret: ByteBuf::from(secret),
            dc_device_info: ov_header.ov_device_info.clone(),
            dc_guid: ov_header.ov_guid,
            dc_rv_info: ov_header.ov_rv_info.clone(),
            dc_pub_key_hash: hash,
        };

        info!("DI.SetCredentials successful");

        Ok(Di {
            state: Hmac {
                hmac: SetHmac { hmac },
                device_creds,
                client: self.state.client,
            },
        })
    }

    /// Hash of the manufacturer key, checked against the voucher header in TO2.
    fn owner_key_hash(&self) -> Result<Hash, Error> {
        let ov_pub_key = &self.state.creds.ov_header.ov_pub_key;

        hash_for_key(ov_pub_key, &cbor_encode(ov_pub_key)?)
    }
}

/// Credentials waiting for the voucher to be stored.
#[derive(Debug)]
pub struct Hmac<T> {
    hmac: SetHmac,
    device_creds: DeviceCredential,
    client: AuthClient<T>,
}

impl<T> Di<Hmac<T>>
where
    T: Transport,
{
    async fn run<C, S>(mut self, ctx: &mut Ctx<'_, C, S>) -> Result<DeviceCredential, Error>
    where
        S: Storage,
    {
        let Done = self.state.client.send(&self.state.hmac).await?;

        info!("DI.SetHmac successful");

        ctx.storage
            .write(DEVICE_CREDS, &cbor_encode(&self.state.device_creds)?)
            .await?;

        info!(guid = %self.state.device_creds.dc_guid, "DI.Done credentials stored");

        Ok(self.state.device_creds)
    }
}
