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

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eyre::{bail, eyre, OptionExt};
use fdo_engine::client::http::HttpConnector;
use fdo_engine::client::loopback::{LoopbackConnector, LoopbackTransport};
use fdo_engine::client::InitialClient;
use fdo_engine::crypto::keys::{KeyRing, SigningKey};
use fdo_engine::crypto::software::SoftwareCrypto;
use fdo_engine::di::{read_credentials, Di};
use fdo_engine::server::config::{DiConfig, ServerConfig, To0Config, To2Config};
use fdo_engine::server::stores::{
    AccessList, MemoryRedirectStore, MemorySessionStore, MemoryVoucherStore, VoucherStore,
};
use fdo_engine::server::{Dispatcher, Services};
use fdo_engine::srv_info::{CollectServiceInfo, DEFAULT_MTU};
use fdo_engine::storage::FileStorage;
use fdo_engine::to0::To0;
use fdo_engine::to1::To1;
use fdo_engine::to2::To2;
use fdo_engine::{voucher, Crypto, Ctx, Storage};
use fdo_protocol::utils::Hex;
use fdo_protocol::v101::public_key::PkType;
use fdo_protocol::v101::rendezvous_info::{
    RendezvousDirective, RendezvousInfo, RendezvousInstr, RvProtocolValue, RvVariable,
};
use fdo_protocol::v101::rv_to2_addr::{RvTo2Addr, RvTo2AddrEntry};
use fdo_protocol::v101::service_info::ServiceInfoKv;
use fdo_protocol::v101::TransportProtocol;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::CertificateDer;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const SERIAL: &str = "AABCCDDDEEF";
const DEVICE_INFO: &str = "fdo-device";
const RV_HOST: &str = "rv.local";
const RV_PORT: u16 = 8041;
const OWNER_HOST: &str = "owner.local";
const OWNER_PORT: u16 = 8043;

#[derive(Debug, Parser)]
struct Cli {
    /// Directory with the keys and credentials of the device
    #[arg(long, default_value = ".tmp/fdo-device")]
    storage: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Prints the stored device credentials
    Inspect,
    /// Runs DI, TO0, TO1 and TO2 with in-process servers
    Loopback {
        #[arg(long, default_value = SERIAL)]
        serial_no: String,

        #[arg(long, default_value = DEVICE_INFO)]
        device_info: String,

        /// Seconds the owner asks the rendezvous to keep the registration
        #[arg(long, default_value_t = 3600)]
        wait_seconds: u32,

        /// Upper bound of the seconds granted by the rendezvous
        #[arg(long, default_value_t = 3600)]
        max_wait_seconds: u32,

        /// Service info message size of the owner
        #[arg(long, default_value_t = DEFAULT_MTU)]
        mtu: u16,

        /// Keep the credentials at the end of TO2
        #[arg(long)]
        reuse_credentials: bool,

        /// Saves the GUID to file
        #[arg(long)]
        export_guid: Option<PathBuf>,
    },
    /// Runs TO1 and TO2 with the servers in the device credentials, over HTTP
    Onboard {
        /// PEM certificates trusted for HTTPS
        #[arg(long)]
        ca_cert: Option<PathBuf>,

        #[arg(long, default_value = SERIAL)]
        serial_no: String,

        /// Keep the credentials at the end of TO2
        #[arg(long)]
        reuse_credentials: bool,
    },
}

/// Manufacturer, rendezvous and owner served by the same dispatcher.
struct Servers {
    dispatcher: Arc<Dispatcher>,
    vouchers: Arc<MemoryVoucherStore>,
    manufacturer: Arc<SigningKey>,
    owner: Arc<SigningKey>,
}

impl Servers {
    fn create(max_wait_seconds: u32, mtu: u16) -> eyre::Result<Self> {
        let manufacturer = Arc::new(SigningKey::generate(PkType::Secp256R1)?);
        let owner = Arc::new(SigningKey::generate(PkType::Secp256R1)?);

        let keys = KeyRing::new();
        keys.insert(Arc::clone(&manufacturer))?;
        keys.insert(Arc::clone(&owner))?;

        let vouchers = Arc::new(MemoryVoucherStore::new());

        let services = Services {
            sessions: Arc::new(MemorySessionStore::new()),
            vouchers: vouchers.clone(),
            redirects: Arc::new(MemoryRedirectStore::new()),
            access: Arc::new(AccessList::new()),
            keys: Arc::new(keys),
        };

        let config = ServerConfig {
            di: Some(DiConfig::new(manufacturer.public_key(), rv_info()?)),
            to0: To0Config { max_wait_seconds },
            to2: To2Config {
                owner_service_info: vec![ServiceInfoKv::new("fdo_sys:active", &true)?],
                mtu,
                ..Default::default()
            },
        };

        Ok(Self {
            dispatcher: Arc::new(Dispatcher::new(config, services)),
            vouchers,
            manufacturer,
            owner,
        })
    }

    fn transport(&self) -> LoopbackTransport {
        LoopbackTransport::new(Arc::clone(&self.dispatcher))
    }

    fn connector(&self) -> LoopbackConnector {
        LoopbackConnector::new()
            .with_host(RV_HOST, Arc::clone(&self.dispatcher))
            .with_host(OWNER_HOST, Arc::clone(&self.dispatcher))
    }
}

fn rv_info() -> eyre::Result<RendezvousInfo> {
    let directive = RendezvousDirective::new(vec![
        RendezvousInstr::new(RvVariable::Dns, &RV_HOST)?,
        RendezvousInstr::new(RvVariable::DevPort, &RV_PORT)?,
        RendezvousInstr::new(RvVariable::Protocol, &RvProtocolValue::Http)?,
    ])
    .ok_or_eyre("empty directive")?;

    RendezvousInfo::new(vec![directive]).ok_or_eyre("empty rendezvous info")
}

fn tls_config(ca_cert: Option<PathBuf>) -> eyre::Result<rustls::ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();

    if let Some(path) = ca_cert {
        for cert in CertificateDer::pem_file_iter(&path)? {
            roots.add(cert?)?;
        }

        info!(path = %path.display(), certs = roots.len(), "trusted certificates loaded");
    }

    Ok(rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth())
}

#[allow(clippy::too_many_arguments)]
async fn loopback<C, S>(
    ctx: &mut Ctx<'_, C, S>,
    serial_no: &str,
    device_info: &str,
    wait_seconds: u32,
    max_wait_seconds: u32,
    mtu: u16,
    reuse_credentials: bool,
    export_guid: Option<PathBuf>,
) -> eyre::Result<()>
where
    C: Crypto,
    S: Storage,
{
    let servers = Servers::create(max_wait_seconds, mtu)?;

    let creds = Di::new(InitialClient::new(servers.transport()), device_info, serial_no)
        .create_credentials(ctx)
        .await?;

    let guid = creds.dc_guid;

    info!(%guid, "device initialized");

    if let Some(path) = export_guid {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        tokio::fs::write(&path, Hex::new(guid.as_ref()).to_string()).await?;

        info!(path = %path.display(), "guid exported");
    }

    let mut ov = servers
        .vouchers
        .load(&guid)?
        .ok_or_else(|| eyre!("voucher missing for {guid}, was the device initialized before?"))?;

    voucher::extend(&mut ov, servers.owner.public_key(), &servers.manufacturer)?;
    servers.vouchers.replace(0, &ov)?;

    info!(entries = ov.entries().len(), "voucher sold to the owner");

    let owner_addr = RvTo2Addr::new(vec![RvTo2AddrEntry::new(
        None,
        Some(OWNER_HOST.to_string()),
        OWNER_PORT,
        TransportProtocol::Http,
    )])
    .ok_or_eyre("empty owner address")?;

    let granted = To0::new(ov, owner_addr, wait_seconds)
        .register(servers.transport(), &servers.owner)
        .await?;

    info!(granted, "owner registered");

    let connector = servers.connector();

    let redirect = To1::new(&creds).rv_owner(ctx, &connector).await?;

    let (to2, service_info) = To2::create(creds, redirect, serial_no, CollectServiceInfo::new())?
        .with_credential_reuse(reuse_credentials)
        .to2_change(ctx, &connector)
        .await?;

    for kv in &service_info {
        info!(key = kv.key(), value = %Hex::new(kv.value_as_bytes()), "owner service info");
    }

    let creds = to2.done(ctx).await?;

    let ov = servers
        .vouchers
        .load(&creds.dc_guid)?
        .ok_or_eyre("voucher missing after TO2")?;

    info!(guid = %creds.dc_guid, entries = ov.entries().len(), "ownership transferred");

    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive("info".parse()?)
                .from_env_lossy(),
        )
        .try_init()?;

    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| eyre!("couldn't install crypto provider"))?;

    let mut storage = FileStorage::open(cli.storage).await?;
    let mut crypto = SoftwareCrypto::create(storage.clone()).await?;

    match cli.command {
        Command::Inspect => {
            let Some(dc) = read_credentials(&storage).await? else {
                info!("device credentials missing, DI not yet completed");

                return Ok(());
            };

            info!(?dc);
        }
        Command::Loopback {
            serial_no,
            device_info,
            wait_seconds,
            max_wait_seconds,
            mtu,
            reuse_credentials,
            export_guid,
        } => {
            if read_credentials(&storage).await?.is_some() {
                bail!("device already initialized, use a new storage directory");
            }

            let mut ctx = Ctx::new(&mut crypto, &mut storage);

            loopback(
                &mut ctx,
                &serial_no,
                &device_info,
                wait_seconds,
                max_wait_seconds,
                mtu,
                reuse_credentials,
                export_guid,
            )
            .await?;
        }
        Command::Onboard {
            ca_cert,
            serial_no,
            reuse_credentials,
        } => {
            let Some(dc) = read_credentials(&storage).await? else {
                bail!("device credentials missing, DI not yet completed");
            };

            let connector = HttpConnector::new(tls_config(ca_cert)?);

            let mut ctx = Ctx::new(&mut crypto, &mut storage);

            let rv = To1::new(&dc).rv_owner(&mut ctx, &connector).await?;

            let (to2, service_info) =
                To2::create(dc.clone(), rv, &serial_no, CollectServiceInfo::new())?
                    .with_credential_reuse(reuse_credentials)
                    .to2_change(&mut ctx, &connector)
                    .await?;

            info!(items = service_info.len(), "owner service info received");

            let dc = to2.done(&mut ctx).await?;

            info!(guid = %dc.dc_guid, "ownership transferred");
        }
    }

    Ok(())
}
