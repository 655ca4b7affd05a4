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

//! Transfer Ownership Protocol 2 (TO2)
//!
//! Transfer Ownership Protocol 2 (TO2) is an interaction between the Device ROE and the Owner
//! Onboarding Service where the transfer of ownership to the new Owner actually happens.

use std::net::IpAddr;

use coset::iana::EnumI64;
use coset::HeaderBuilder;
use fdo_protocol::codec;
use fdo_protocol::error::ErrorKind;
use fdo_protocol::utils::cbor_encode;
use fdo_protocol::v101::device_credentials::DeviceCredential;
use fdo_protocol::v101::eat_signature::{EatPayload, CUPH_NONCE, CUPH_OWNER_PUBKEY, EUPH_NONCE};
use fdo_protocol::v101::public_key::PublicKey;
use fdo_protocol::v101::rv_to2_addr::{RvTo2Addr, RvTo2AddrEntry};
use fdo_protocol::v101::service_info::Devmod;
use fdo_protocol::v101::sign_info::{EASigInfo, SigInfo};
use fdo_protocol::v101::to1::rv_redirect::{RvRedirect, To1d};
use fdo_protocol::v101::to2::device_service_info::DeviceServiceInfo;
use fdo_protocol::v101::to2::device_service_info_ready::DeviceServiceInfoReady;
use fdo_protocol::v101::to2::done::Done;
use fdo_protocol::v101::to2::get_ov_next_entry::GetOvNextEntry;
use fdo_protocol::v101::to2::hello_device::HelloDevice;
use fdo_protocol::v101::to2::ov_next_entry::OvNextEntry;
use fdo_protocol::v101::to2::prove_device::{ProveDevice, ProveDevicePayload};
use fdo_protocol::v101::to2::prove_ov_hdr::{ProveOvHdr, ProveOvHdrPayload};
use fdo_protocol::v101::to2::setup_device::{SetupDevice, SetupDevicePayload};
use fdo_protocol::v101::{Message, Nonce, NonceTo2ProveDv, NonceTo2ProveOv, TransportProtocol};
use fdo_protocol::Error;
use tracing::{debug, error, info, instrument, warn};
use url::{Host, Url};

use crate::client::{base_url, AuthClient, Connector, EncryptedClient, InitialClient, Transport};
use crate::crypto::{verify_cose_signature, verify_hash, Crypto};
use crate::di::DEVICE_CREDS;
use crate::srv_info::{self, ServiceInfoDecode, DEFAULT_MTU};
use crate::voucher::ChainVerifier;
use crate::{Ctx, Storage};

/// Use the protocol default.
const MAX_DEVICE_MESSAGE_SIZE: u16 = 0;

fn entry_urls(idx: usize, acc: &mut Vec<Url>, scheme: &str, addr: &RvTo2AddrEntry) -> Result<(), Error> {
    if addr.rv_dns().is_none() && addr.rv_ip().is_none() {
        error!(idx, "address is missing both ip and domain name");

        return Err(Error::new(
            ErrorKind::Invalid,
            "RvTo2AddrEntry missing ip and domain",
        ));
    }

    if let Some(dns) = addr.rv_dns() {
        debug!(idx, %dns, "adding dns address");

        acc.push(base_url(scheme, &Host::Domain(dns.to_string()), addr.rv_port())?);
    }

    if let Some(ip) = addr.rv_ip() {
        let ip = IpAddr::from(*ip);

        debug!(idx, %ip, "adding ip address");

        let host = match ip {
            IpAddr::V4(ipv4_addr) => Host::Ipv4(ipv4_addr),
            IpAddr::V6(ipv6_addr) => Host::Ipv6(ipv6_addr),
        };

        acc.push(base_url(scheme, &host, addr.rv_port())?);
    }

    Ok(())
}

/// Addresses of the owner onboarding service, in the order they are tried.
fn owner_urls(value: &RvTo2Addr) -> Result<Vec<Url>, Error> {
    value
        .iter()
        .enumerate()
        .try_fold(Vec::new(), |mut acc, (idx, addr)| {
            match addr.rv_protocol() {
                TransportProtocol::Http => {
                    entry_urls(idx, &mut acc, "http", addr)?;
                }
                TransportProtocol::Https => {
                    entry_urls(idx, &mut acc, "https", addr)?;
                }
                TransportProtocol::Tcp
                | TransportProtocol::Tls
                | TransportProtocol::CoAp
                | TransportProtocol::CoAps => {
                    warn!(protocol = ?addr.rv_protocol(), "not supported");
                }
            }

            Ok(acc)
        })
}

/// Choices of the device for the transfer.
#[derive(Debug, Clone, Copy)]
struct Options {
    reuse_credentials: bool,
    max_owner_service_info_sz: Option<u16>,
}

/// TO2 protocol
#[derive(Debug)]
pub struct To2<'a, D, S> {
    device_creds: DeviceCredential,
    sn: &'a str,
    service_info: D,
    options: Options,
    state: S,
}

/// Fist state of TO2
#[derive(Debug)]
pub struct Hello {
    to1d: To1d,
    addresses: Vec<Url>,
}

impl<'a, D> To2<'a, D, Hello> {
    /// Create the TO2 client
    pub fn create(
        device_creds: DeviceCredential,
        redirect: RvRedirect,
        sn: &'a str,
        service_info: D,
    ) -> Result<Self, Error> {
        let addresses = owner_urls(&redirect.0.payload()?.to1d_rv)?;

        Ok(Self {
            device_creds,
            sn,
            service_info,
            options: Options {
                reuse_credentials: false,
                max_owner_service_info_sz: None,
            },
            state: Hello {
                to1d: redirect.0,
                addresses,
            },
        })
    }

    /// Keeps the current credentials instead of replacing the HMAC secret.
    pub fn with_credential_reuse(mut self, reuse: bool) -> Self {
        self.options.reuse_credentials = reuse;

        self
    }

    /// Size of the owner service info messages accepted by the device.
    pub fn with_max_service_info_size(mut self, size: u16) -> Self {
        self.options.max_owner_service_info_sz = Some(size);

        self
    }

    /// Changes the owner
    pub async fn to2_change<C, S, K>(
        self,
        ctx: &mut Ctx<'_, C, S>,
        connector: &K,
    ) -> Result<(To2<'a, D, DvDone<K::Transport>>, D::Output), Error>
    where
        C: Crypto,
        K: Connector,
        D: ServiceInfoDecode,
    {
        info!(guid = %self.device_creds.dc_guid, "TO2 started");

        let prove_ov = self.run(ctx, connector).await?;
        let verify = prove_ov.run(ctx).await?;
        let prove_dv = verify.run().await?;
        let setup = prove_dv.run(ctx).await?;
        let ready = setup.run(ctx).await?;

        ready.run().await
    }

    async fn hello<C, S>(&self, ctx: &mut Ctx<'_, C, S>) -> Result<HelloDevice, Error>
    where
        C: Crypto,
    {
        let nonce = ctx.crypto.create_nonce().await?;

        Ok(HelloDevice {
            max_device_message_size: MAX_DEVICE_MESSAGE_SIZE,
            guid: self.device_creds.dc_guid,
            nonce_to2_prove_ov: NonceTo2ProveOv(nonce),
            kex_suite_name: ctx.crypto.kex_suit(),
            cipher_suite_name: ctx.crypto.cipher_suite().to_i64(),
            ea_sign_info: EASigInfo(SigInfo::new(ctx.crypto.sign_info_type())),
        })
    }

    async fn run<C, S, K>(
        self,
        ctx: &mut Ctx<'_, C, S>,
        connector: &K,
    ) -> Result<To2<'a, D, Prove<K::Transport>>, Error>
    where
        C: Crypto,
        K: Connector,
    {
        for url in &self.state.addresses {
            match self.connect(ctx, connector, url).await {
                Ok((hello_device, hdr, client)) => {
                    return Ok(To2 {
                        device_creds: self.device_creds,
                        sn: self.sn,
                        service_info: self.service_info,
                        options: self.options,
                        state: Prove {
                            hello_device,
                            to1d: self.state.to1d,
                            hdr,
                            client,
                        },
                    });
                }
                Err(err) => {
                    error!(error = %err, %url, "tried connecting to server");
                }
            }
        }

        Err(Error::new(
            ErrorKind::Io,
            "to connect with the ownership server",
        ))
    }

    async fn connect<C, S, K>(
        &self,
        ctx: &mut Ctx<'_, C, S>,
        connector: &K,
        base_url: &Url,
    ) -> Result<(HelloDevice, ProveOvHdr, AuthClient<K::Transport>), Error>
    where
        C: Crypto,
        K: Connector,
    {
        let mut client = InitialClient::new(connector.connect(base_url)?);

        let hello = self.hello(ctx).await?;

        let (hdr, token) = client.send(&hello).await?;

        info!("TO2.HelloDevice sent");

        Ok((hello, hdr, client.into_session(token)))
    }
}

/// Header of the voucher proved by the owner.
#[derive(Debug)]
pub struct Prove<T> {
    hello_device: HelloDevice,
    to1d: To1d,
    hdr: ProveOvHdr,
    client: AuthClient<T>,
}

impl<'a, D, T> To2<'a, D, Prove<T>>
where
    T: Transport,
{
    async fn run<C, S>(mut self, ctx: &mut Ctx<'_, C, S>) -> Result<To2<'a, D, VerifyChain<T>>, Error>
    where
        C: Crypto,
    {
        let (payload, owner_key, nonce_prove_dv) = match self.verify(ctx).await {
            Ok(verified) => verified,
            Err(err) => return Err(self.state.client.abort(err, ProveOvHdr::MSG_TYPE).await),
        };

        info!("TO2.ProveOVHdr verified");

        Ok(To2 {
            device_creds: self.device_creds,
            sn: self.sn,
            service_info: self.service_info,
            options: self.options,
            state: VerifyChain {
                payload,
                owner_key,
                nonce_prove_dv,
                client: self.state.client,
            },
        })
    }

    /// Checks the header against the device credentials.
    async fn verify<C, S>(
        &self,
        ctx: &mut Ctx<'_, C, S>,
    ) -> Result<(ProveOvHdrPayload, PublicKey, Nonce), Error>
    where
        C: Crypto,
    {
        let hdr = &self.state.hdr.0;

        let owner_key: PublicKey = hdr
            .unprotected(CUPH_OWNER_PUBKEY)?
            .ok_or(Error::new(ErrorKind::Message, "missing owner public key"))?;

        // 1. Signed by the advertised owner key
        verify_cose_signature(hdr.sign(), &owner_key)
            .inspect_err(|_| error!("couldn't verify TO2.ProveOVHdr signature"))?;

        let payload = hdr.payload()?;

        if payload.nonce_to2_prove_ov != self.state.hello_device.nonce_to2_prove_ov {
            error!("TO2.ProveOVHdr nonce mismatch");

            return Err(Error::new(ErrorKind::Message, "prove ov nonce mismatch"));
        }

        if payload.ov_header.ov_guid != self.device_creds.dc_guid {
            error!(guid = %payload.ov_header.ov_guid, "voucher for another device");

            return Err(Error::new(ErrorKind::Message, "voucher guid mismatch"));
        }

        // 2. Manufacturer key of the credentials
        verify_hash(
            &self.device_creds.dc_pub_key_hash,
            &cbor_encode(&payload.ov_header.ov_pub_key)?,
        )
        .inspect_err(|_| error!("couldn't verify manufacturer public key hash"))?;

        // 3. Header HMAC with the device secret
        ctx.crypto
            .verify_hmac(
                &self.device_creds.dc_hmac_secret,
                &payload.hmac,
                payload.ov_header.bytes()?,
            )
            .await
            .inspect_err(|_| error!("couldn't verify the voucher header hmac"))?;

        // 4. Hash of the HelloDevice sent
        let hello = codec::to_vec(&self.state.hello_device.encode()?)?;

        verify_hash(&payload.hello_device_hash, &hello)
            .inspect_err(|_| error!("couldn't verify hello device hash"))?;

        // Redirect signed by the same owner
        verify_cose_signature(self.state.to1d.sign(), &owner_key)
            .inspect_err(|_| error!("couldn't verify TO1.RVRedirect to1d signature"))?;

        let nonce_prove_dv: Nonce = hdr
            .unprotected(CUPH_NONCE)?
            .ok_or(Error::new(ErrorKind::Message, "missing prove device nonce"))?;

        Ok((payload, owner_key, nonce_prove_dv))
    }
}

/// Entries of the voucher to verify.
#[derive(Debug)]
pub struct VerifyChain<T> {
    payload: ProveOvHdrPayload,
    owner_key: PublicKey,
    nonce_prove_dv: Nonce,
    client: AuthClient<T>,
}

impl<'a, D, T> To2<'a, D, VerifyChain<T>>
where
    T: Transport,
{
    async fn run(mut self) -> Result<To2<'a, D, ProveDv<T>>, Error> {
        if let Err(err) = self.verify_chain().await {
            return Err(self.state.client.abort(err, OvNextEntry::MSG_TYPE).await);
        }

        info!("TO2.OVNextEntry chain verified");

        Ok(To2 {
            device_creds: self.device_creds,
            sn: self.sn,
            service_info: self.service_info,
            options: self.options,
            state: ProveDv {
                payload: self.state.payload,
                owner_key: self.state.owner_key,
                nonce_prove_dv: self.state.nonce_prove_dv,
                client: self.state.client,
            },
        })
    }

    /// Requests and verifies every entry, the last one must be the advertised owner.
    #[instrument(skip_all, fields(num_ov_entries = self.state.payload.num_ov_entries))]
    async fn verify_chain(&mut self) -> Result<(), Error> {
        let num_ov_entries = self.state.payload.num_ov_entries;

        if num_ov_entries == 0 {
            return Err(Error::new(
                ErrorKind::Voucher,
                "number of entries must be greater than 0",
            ));
        }

        let mut verifier = ChainVerifier::new(&self.state.payload.ov_header)?;

        for ov_entry_num in 0..num_ov_entries {
            let OvNextEntry {
                ov_entry_num: received,
                ov_entry,
            } = self
                .state
                .client
                .send(&GetOvNextEntry { ov_entry_num })
                .await?;

            if received != ov_entry_num {
                error!(ov_entry_num, received, "wrong entry received");

                return Err(Error::new(ErrorKind::Message, "voucher entry number"));
            }

            verifier.push(usize::from(ov_entry_num), &ov_entry)?;

            debug!(ov_entry_num, "entry verified");
        }

        if *verifier.owner_key() != self.state.owner_key {
            error!("final key mismatch");

            return Err(Error::new(ErrorKind::Voucher, "final key mismatch"));
        }

        Ok(())
    }
}

/// Device attestation and key exchange.
#[derive(Debug)]
pub struct ProveDv<T> {
    payload: ProveOvHdrPayload,
    owner_key: PublicKey,
    nonce_prove_dv: Nonce,
    client: AuthClient<T>,
}

impl<'a, D, T> To2<'a, D, ProveDv<T>>
where
    T: Transport,
{
    async fn run<C, S>(self, ctx: &mut Ctx<'_, C, S>) -> Result<To2<'a, D, Setup<T>>, Error>
    where
        C: Crypto,
    {
        let (xb_key_exchange, key) = ctx
            .crypto
            .key_exchange(&self.state.payload.xa_key_exchange)
            .await?;

        info!("TO2.ProveDevice key exchange generated");

        let fdo = fdo_protocol::to_value(&ProveDevicePayload { xb_key_exchange })?;

        let eat = EatPayload::new(self.state.nonce_prove_dv, &self.device_creds.dc_guid)
            .with_fdo(fdo)
            .to_bytes()?;

        let nonce_setup_dv = ctx.crypto.create_nonce().await?;

        let unprotected = HeaderBuilder::new().value(
            EUPH_NONCE,
            ciborium::Value::Bytes(nonce_setup_dv.to_vec()),
        );

        let ea_token = ctx.crypto.cose_sign(unprotected, eat).await?;

        Ok(To2 {
            device_creds: self.device_creds,
            sn: self.sn,
            service_info: self.service_info,
            options: self.options,
            state: Setup {
                payload: self.state.payload,
                owner_key: self.state.owner_key,
                nonce_prove_dv: self.state.nonce_prove_dv,
                nonce_setup_dv,
                prove_dv: ProveDevice { ea_token },
                client: self.state.client.into_encrypted(key),
            },
        })
    }
}

/// New credentials sent by the owner.
#[derive(Debug)]
pub struct Setup<T> {
    payload: ProveOvHdrPayload,
    owner_key: PublicKey,
    nonce_prove_dv: Nonce,
    nonce_setup_dv: Nonce,
    prove_dv: ProveDevice,
    client: EncryptedClient<T>,
}

impl<'a, D, T> To2<'a, D, Setup<T>>
where
    T: Transport,
{
    async fn run<C, S>(mut self, ctx: &mut Ctx<'_, C, S>) -> Result<To2<'a, D, DvReady<T>>, Error>
    where
        C: Crypto,
    {
        let SetupDevice(setup) = self.state.client.send_plain(&self.state.prove_dv).await?;

        info!("TO2.ProveDevice succeeded");

        let setup = match self.verify_setup(&setup) {
            Ok(setup) => setup,
            Err(err) => return Err(self.state.client.abort(err, SetupDevice::MSG_TYPE).await),
        };

        info!("TO2.SetupDevice verified");

        let hmac_secret = if self.options.reuse_credentials {
            debug!("reusing the device credentials");

            None
        } else {
            Some(ctx.crypto.hmac_secret().await?)
        };

        let replacement_hmac = match &hmac_secret {
            Some(secret) => Some(
                ctx.crypto
                    .hmac(secret, self.state.payload.ov_header.bytes()?)
                    .await?,
            ),
            None => None,
        };

        Ok(To2 {
            device_creds: self.device_creds,
            sn: self.sn,
            service_info: self.service_info,
            options: self.options,
            state: DvReady {
                dv_srv_info_ready: DeviceServiceInfoReady {
                    replacement_hmac,
                    max_owner_service_info_sz: self.options.max_owner_service_info_sz,
                },
                done: DvDone {
                    nonce_prove_dv: self.state.nonce_prove_dv,
                    nonce_setup_dv: self.state.nonce_setup_dv,
                    setup,
                    hmac_secret,
                    client: self.state.client,
                },
            },
        })
    }

    /// Signed by the current owner, for the nonce of the device.
    fn verify_setup(
        &self,
        setup: &fdo_protocol::utils::Signed<SetupDevicePayload>,
    ) -> Result<SetupDevicePayload, Error> {
        verify_cose_signature(setup.sign(), &self.state.owner_key)
            .inspect_err(|_| error!("couldn't verify TO2.SetupDevice signature"))?;

        let payload = setup.payload()?;

        if payload.nonce_to2_setup_dv.0 != self.state.nonce_setup_dv {
            error!("TO2.SetupDevice nonce mismatch");

            return Err(Error::new(ErrorKind::Message, "setup device nonce mismatch"));
        }

        Ok(payload)
    }
}

/// Service info exchange.
#[derive(Debug)]
pub struct DvReady<T> {
    dv_srv_info_ready: DeviceServiceInfoReady,
    done: DvDone<T>,
}

impl<'a, D, T> To2<'a, D, DvReady<T>>
where
    T: Transport,
{
    async fn run(mut self) -> Result<(To2<'a, D, DvDone<T>>, D::Output), Error>
    where
        D: ServiceInfoDecode,
    {
        let client = &mut self.state.done.client;

        let own_srv_info_ready = client.send(&self.state.dv_srv_info_ready).await?;

        let owner_mtu = own_srv_info_ready
            .max_device_service_info_sz
            .filter(|mtu| *mtu > 0)
            .unwrap_or(DEFAULT_MTU);

        info!(owner_mtu, "TO2.DeviceServiceInfoReady done");

        let devmod = Devmod::for_platform(
            self.device_creds.dc_device_info.clone(),
            Some(self.sn.to_string()),
        )
        .service_info()?;

        self.service_info.reset()?;

        let chunks = srv_info::chunk(&devmod, owner_mtu)?;

        let mut own_srv_info = None;

        for chunk in chunks {
            debug!(items = chunk.items.len(), is_more = chunk.is_more, "sending devmod");

            let reply = client
                .send(&DeviceServiceInfo {
                    is_more_service_info: chunk.is_more,
                    service_info: chunk.items,
                })
                .await?;

            own_srv_info = Some(reply);
        }

        info!("TO2.DeviceServiceInfo sent");

        let mut own_srv_info = own_srv_info.ok_or(Error::new(
            ErrorKind::Message,
            "missing owner service info",
        ))?;

        loop {
            info!(
                len = own_srv_info.service_info.len(),
                is_done = own_srv_info.is_done,
                "TO2.OwnerServiceInfo received"
            );

            for kv in &own_srv_info.service_info {
                self.service_info.decode(kv)?;
            }

            if own_srv_info.is_done {
                break;
            }

            own_srv_info = client
                .send(&DeviceServiceInfo {
                    is_more_service_info: false,
                    service_info: Vec::new(),
                })
                .await?;
        }

        let output = self.service_info.finalize()?;

        info!("TO2.OwnerServiceInfo done");

        let this = To2 {
            device_creds: self.device_creds,
            sn: self.sn,
            service_info: self.service_info,
            options: self.options,
            state: self.state.done,
        };

        Ok((this, output))
    }
}

/// Final message for the FDO
#[derive(Debug)]
pub struct DvDone<T> {
    nonce_prove_dv: Nonce,
    nonce_setup_dv: Nonce,
    setup: SetupDevicePayload,
    hmac_secret: Option<Vec<u8>>,
    client: EncryptedClient<T>,
}

impl<D, T> To2<'_, D, DvDone<T>>
where
    T: Transport,
{
    /// Finishes the transfer protocol, storing the new credentials.
    pub async fn done<C, S>(mut self, ctx: &mut Ctx<'_, C, S>) -> Result<DeviceCredential, Error>
    where
        S: Storage,
    {
        let done2 = self
            .state
            .client
            .send(&Done {
                nonce_to2_prove_dv: NonceTo2ProveDv(self.state.nonce_prove_dv),
            })
            .await?;

        if done2.nonce_to2_setup_dv.0 != self.state.nonce_setup_dv {
            error!("TO2.Done2 nonce mismatch");

            return Err(Error::new(ErrorKind::Message, "setup device nonce mismatch"));
        }

        let SetupDevicePayload {
            rendezvous_info,
            guid,
            ..
        } = self.state.setup;

        let mut device_creds = self.device_creds;

        device_creds.dc_guid = guid;
        device_creds.dc_rv_info = rendezvous_info;

        if let Some(secret) = self.state.hmac_secret {
            device_creds.dc_hmac_secret = serde_bytes::ByteBuf::from(secret);
        }

        ctx.storage
            .overwrite(DEVICE_CREDS, &cbor_encode(&device_creds)?)
            .await?;

        info!(%guid, "TO2.Done2 credentials stored");

        Ok(device_creds)
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use fdo_protocol::v101::IpAddress;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn owner_addresses() {
        let addr = RvTo2Addr::new(vec![
            RvTo2AddrEntry::new(
                Some(IpAddress::from(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)))),
                Some("owner.local".to_string()),
                8043,
                TransportProtocol::Https,
            ),
            RvTo2AddrEntry::new(None, Some("coap.local".to_string()), 5683, TransportProtocol::CoAp),
            RvTo2AddrEntry::new(None, Some("owner.local".to_string()), 8080, TransportProtocol::Http),
        ])
        .unwrap();

        let urls: Vec<String> = owner_urls(&addr).unwrap().iter().map(Url::to_string).collect();

        assert_eq!(
            urls,
            [
                "https://owner.local:8043/",
                "https://10.0.0.2:8043/",
                "http://owner.local:8080/",
            ]
        );
    }

    #[test]
    fn owner_address_without_host() {
        let addr =
            RvTo2Addr::new(vec![RvTo2AddrEntry::new(None, None, 8043, TransportProtocol::Https)])
                .unwrap();

        let err = owner_urls(&addr).unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::Invalid);
    }
}
