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

//! Transfer Ownership Protocol 1 (TO1).
//!
//! Transfer Ownership Protocol 1 (TO1) finishes the rendezvous started between the New Owner and
//! the Rendezvous Server in the Transfer Ownership Protocol 0 (TO0). In this protocol, the Device
//! ROE communicates with the Rendezvous Server and obtains the IP addressing info for the
//! prospective new Owner

use std::net::IpAddr;
use std::time::Duration;

use coset::HeaderBuilder;
use fdo_protocol::error::ErrorKind;
use fdo_protocol::v101::device_credentials::DeviceCredential;
use fdo_protocol::v101::eat_signature::EatPayload;
use fdo_protocol::v101::rendezvous_info::{RendezvousDirective, RvProtocolValue, RvVariable};
use fdo_protocol::v101::sign_info::{EASigInfo, SigInfo};
use fdo_protocol::v101::to1::hello_rv::HelloRv;
use fdo_protocol::v101::to1::prove_to_rv::ProveToRv;
use fdo_protocol::v101::to1::rv_redirect::RvRedirect;
use fdo_protocol::v101::{DnsAddress, IpAddress, NonceTo1Proof, Port};
use fdo_protocol::Error;
use tracing::{debug, error, info, warn};
use url::{Host, Url};

use crate::client::{base_url, AuthClient, Connector, InitialClient};
use crate::crypto::Crypto;
use crate::time::{add_random_jitter, DEFAULT_DELAY};
use crate::Ctx;

/// Rounds over the rendezvous directives before giving up.
const DEFAULT_ROUNDS: usize = 10;

macro_rules! builder_replace_opt {
    ($this:ident, $field:ident, $value:expr) => {
        if $this.$field.replace($value).is_some() {
            return Err(Error::new(
                ErrorKind::Invalid,
                concat!(stringify!($field), " was overwritten"),
            ));
        }
    };
}

/// Addresses of a rendezvous server for the device.
#[derive(Debug, Default)]
struct RvDevBuilder {
    ip: Option<IpAddr>,
    dns: Option<DnsAddress>,
    port: Option<Port>,
    protocol: Option<RvProtocolValue>,
    delay: Option<Duration>,
}

impl RvDevBuilder {
    fn try_from(value: &RendezvousDirective) -> Result<Option<Self>, Error> {
        let mut this = RvDevBuilder::default();

        for instr in value.iter() {
            match instr.rv_variable {
                RvVariable::DevOnly => {
                    debug!("device only instruction");
                }
                RvVariable::OwnerOnly => {
                    debug!("owner instruction skipping");

                    return Ok(None);
                }
                RvVariable::IPAddress => {
                    let ip: IpAddress = instr.value()?;

                    builder_replace_opt!(this, ip, ip.into());
                }
                RvVariable::DevPort => {
                    let port: Port = instr.value()?;

                    builder_replace_opt!(this, port, port);
                }
                RvVariable::Dns => {
                    let dns: DnsAddress = instr.value()?;

                    builder_replace_opt!(this, dns, dns);
                }
                RvVariable::Protocol => {
                    let proto: RvProtocolValue = instr.value()?;

                    builder_replace_opt!(this, protocol, proto);
                }
                RvVariable::Delaysec => {
                    let delay: u32 = instr.value()?;

                    builder_replace_opt!(this, delay, Duration::from_secs(delay.into()));
                }
                RvVariable::OwnerPort
                | RvVariable::SvCertHash
                | RvVariable::ClCertHash
                | RvVariable::UserInput
                | RvVariable::WifiSsid
                | RvVariable::WifiPw
                | RvVariable::Medium => {
                    debug!(variable = ?instr.rv_variable, "skipping instruction");
                }
                RvVariable::Bypass | RvVariable::ExtRV => {
                    warn!("rv bypass not supported");

                    return Ok(None);
                }
            }
        }

        Ok(Some(this))
    }

    fn delay(&self) -> Duration {
        self.delay.unwrap_or(DEFAULT_DELAY)
    }

    /// Addresses to try in order, HTTPS before HTTP.
    fn urls(&self) -> Result<Vec<Url>, Error> {
        let schemes: &[(&str, u16)] = match self.protocol.unwrap_or(RvProtocolValue::Rest) {
            RvProtocolValue::Rest => &[("https", 443), ("http", 80)],
            RvProtocolValue::Https => &[("https", 443)],
            RvProtocolValue::Http => &[("http", 80)],
            protocol @ (RvProtocolValue::Tcp
            | RvProtocolValue::Tls
            | RvProtocolValue::CoapTcp
            | RvProtocolValue::CoapUdp) => {
                warn!(?protocol, "protocol not supported");

                &[]
            }
        };

        let mut hosts = Vec::with_capacity(2);

        if let Some(dns) = &self.dns {
            hosts.push(Host::Domain(dns.clone()));
        }

        if let Some(ip) = self.ip {
            hosts.push(match ip {
                IpAddr::V4(ipv4_addr) => Host::Ipv4(ipv4_addr),
                IpAddr::V6(ipv6_addr) => Host::Ipv6(ipv6_addr),
            });
        }

        if hosts.is_empty() {
            return Err(Error::new(ErrorKind::Invalid, "address is unset"));
        }

        let mut urls = Vec::with_capacity(schemes.len() * hosts.len());

        for (scheme, default_port) in schemes {
            for host in &hosts {
                urls.push(base_url(
                    scheme,
                    host,
                    self.port.unwrap_or(*default_port),
                )?);
            }
        }

        Ok(urls)
    }
}

/// Transfer ownership protocol to contact the Rendezvous Server.
#[derive(Debug)]
pub struct To1<'a, S> {
    device_creds: &'a DeviceCredential,
    state: S,
}

/// Hello message to the Rendezvous Server
#[derive(Debug)]
pub struct Hello {
    rounds: usize,
}

impl<'a> To1<'a, Hello> {
    /// Create the TO1 Client
    pub fn new(device_creds: &'a DeviceCredential) -> Self {
        Self {
            device_creds,
            state: Hello {
                rounds: DEFAULT_ROUNDS,
            },
        }
    }

    /// Sets the rounds over the rendezvous directives, at least one.
    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.state.rounds = rounds.max(1);

        self
    }

    /// Tries to retrieve the [`RvRedirect`].
    pub async fn rv_owner<C, S, K>(
        self,
        ctx: &mut Ctx<'_, C, S>,
        connector: &K,
    ) -> Result<RvRedirect, Error>
    where
        C: Crypto,
        K: Connector,
    {
        let ack = self.run(ctx, connector).await?;

        let prove = ack.run(ctx).await?;

        let redirect = prove.run().await?;

        info!("TO1 done");

        Ok(redirect)
    }

    async fn run<C, S, K>(
        self,
        ctx: &mut Ctx<'_, C, S>,
        connector: &K,
    ) -> Result<To1<'a, Ack<K::Transport>>, Error>
    where
        C: Crypto,
        K: Connector,
    {
        let mut delay = None;

        for round in 0..self.state.rounds {
            debug!(round, "contacting the rendezvous servers");

            for directive in self.device_creds.dc_rv_info.iter() {
                let Some(rv) = RvDevBuilder::try_from(directive)? else {
                    continue;
                };

                // No delay before the first try
                if let Some(delay) = delay.take() {
                    let delay = add_random_jitter(delay);

                    info!(seconds = delay.as_secs(), "waiting before retrying");

                    tokio::time::sleep(delay).await;
                }

                if let Some(ack) = self.follow_instr(ctx, connector, &rv).await? {
                    info!("TO1.HelloRV done");

                    return Ok(To1 {
                        device_creds: self.device_creds,
                        state: ack,
                    });
                }

                delay = Some(rv.delay());
            }
        }

        error!("no rendezvous server accepted the device");

        Err(Error::new(ErrorKind::Io, "rendezvous server not reached"))
    }

    async fn follow_instr<C, S, K>(
        &self,
        ctx: &mut Ctx<'_, C, S>,
        connector: &K,
        rv: &RvDevBuilder,
    ) -> Result<Option<Ack<K::Transport>>, Error>
    where
        C: Crypto,
        K: Connector,
    {
        for url in rv.urls()? {
            debug!(%url, "contacting rv");

            match self.hello(ctx, connector, &url).await {
                Ok(ack) => return Ok(Some(ack)),
                Err(err) => {
                    error!(error = %err, %url, "failure while contacting rv server");
                }
            }
        }

        Ok(None)
    }

    async fn hello<C, S, K>(
        &self,
        ctx: &mut Ctx<'_, C, S>,
        connector: &K,
        url: &Url,
    ) -> Result<Ack<K::Transport>, Error>
    where
        C: Crypto,
        K: Connector,
    {
        let mut client = InitialClient::new(connector.connect(url)?);

        let hello = HelloRv {
            guid: self.device_creds.dc_guid,
            ea_sign_info: EASigInfo(SigInfo::new(ctx.crypto.sign_info_type())),
        };

        let (ack, token) = client.send(&hello).await?;

        debug!(eb_sign_info = ?ack.eb_sign_info, "ack received");

        Ok(Ack {
            client: client.into_session(token),
            nonce: ack.nonce_to1_proof,
        })
    }
}

/// Nonce to sign for the rendezvous server.
#[derive(Debug)]
pub struct Ack<T> {
    client: AuthClient<T>,
    nonce: NonceTo1Proof,
}

impl<'a, T> To1<'a, Ack<T>>
where
    T: crate::client::Transport,
{
    async fn run<C, S>(self, ctx: &mut Ctx<'_, C, S>) -> Result<To1<'a, Prove<T>>, Error>
    where
        C: Crypto,
    {
        let eat = EatPayload::new(self.state.nonce.0, &self.device_creds.dc_guid);

        let sign = ctx
            .crypto
            .cose_sign(HeaderBuilder::new(), eat.to_bytes()?)
            .await?;

        info!("TO1.HelloRVAck signed");

        Ok(To1 {
            device_creds: self.device_creds,
            state: Prove {
                client: self.state.client,
                proof: ProveToRv { ea_token: sign },
            },
        })
    }
}

/// Proof of the device identity.
#[derive(Debug)]
pub struct Prove<T> {
    client: AuthClient<T>,
    proof: ProveToRv,
}

impl<T> To1<'_, Prove<T>>
where
    T: crate::client::Transport,
{
    async fn run(mut self) -> Result<RvRedirect, Error> {
        let redirect = self.state.client.send(&self.state.proof).await?;

        info!("TO1.ProveToRV sent");

        // The owner addresses must be readable before succeeding
        let payload = redirect.0.payload()?;

        debug!(to1d_rv = ?payload.to1d_rv);

        info!("TO1.RVRedirect received");

        Ok(redirect)
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use fdo_protocol::v101::rendezvous_info::RendezvousInstr;
    use pretty_assertions::assert_eq;

    use super::*;

    fn directive(instrs: Vec<RendezvousInstr>) -> RendezvousDirective {
        RendezvousDirective::new(instrs).unwrap()
    }

    #[test]
    fn urls_of_dns_and_ip() {
        let ip = IpAddress::from(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));

        let rv = RvDevBuilder::try_from(&directive(vec![
            RendezvousInstr::new(RvVariable::Dns, &"rv.local").unwrap(),
            RendezvousInstr::new(RvVariable::IPAddress, &ip).unwrap(),
            RendezvousInstr::new(RvVariable::DevPort, &8041u16).unwrap(),
        ]))
        .unwrap()
        .unwrap();

        let urls: Vec<String> = rv.urls().unwrap().iter().map(Url::to_string).collect();

        assert_eq!(
            urls,
            [
                "https://rv.local:8041/",
                "https://10.0.0.1:8041/",
                "http://rv.local:8041/",
                "http://10.0.0.1:8041/",
            ]
        );
        assert_eq!(rv.delay(), DEFAULT_DELAY);
    }

    #[test]
    fn protocol_and_delay() {
        let rv = RvDevBuilder::try_from(&directive(vec![
            RendezvousInstr::new(RvVariable::Dns, &"rv.local").unwrap(),
            RendezvousInstr::new(RvVariable::Protocol, &RvProtocolValue::Http).unwrap(),
            RendezvousInstr::new(RvVariable::Delaysec, &30u32).unwrap(),
        ]))
        .unwrap()
        .unwrap();

        let urls: Vec<String> = rv.urls().unwrap().iter().map(Url::to_string).collect();

        assert_eq!(urls, ["http://rv.local/"]);
        assert_eq!(rv.delay(), Duration::from_secs(30));
    }

    #[test]
    fn owner_only_directive_is_skipped() {
        let rv = RvDevBuilder::try_from(&directive(vec![
            RendezvousInstr::flag(RvVariable::OwnerOnly),
            RendezvousInstr::new(RvVariable::Dns, &"owner.local").unwrap(),
        ]))
        .unwrap();

        assert!(rv.is_none());
    }

    #[test]
    fn repeated_instruction() {
        let err = RvDevBuilder::try_from(&directive(vec![
            RendezvousInstr::new(RvVariable::DevPort, &80u16).unwrap(),
            RendezvousInstr::new(RvVariable::DevPort, &81u16).unwrap(),
        ]))
        .unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn directive_without_address() {
        let rv = RvDevBuilder::try_from(&directive(vec![RendezvousInstr::new(
            RvVariable::DevPort,
            &80u16,
        )
        .unwrap()]))
        .unwrap()
        .unwrap();

        assert!(rv.urls().is_err());
    }
}
