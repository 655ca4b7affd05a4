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

//! Onboarding of a device through the manufacturer, rendezvous and owner exchanges.

use std::sync::Arc;

use fdo_engine::client::loopback::{LoopbackConnector, LoopbackTransport};
use fdo_engine::client::InitialClient;
use fdo_engine::crypto::keys::{KeyRing, SigningKey};
use fdo_engine::crypto::software::SoftwareCrypto;
use fdo_engine::crypto::Crypto;
use fdo_engine::di::{read_credentials, Di};
use fdo_engine::fdo_protocol::error::ErrorKind;
use fdo_engine::fdo_protocol::v101::device_credentials::DeviceCredential;
use fdo_engine::fdo_protocol::v101::ownership_voucher::OwnershipVoucher;
use fdo_engine::fdo_protocol::v101::public_key::PkType;
use fdo_engine::fdo_protocol::v101::rendezvous_info::{
    RendezvousDirective, RendezvousInfo, RendezvousInstr, RvProtocolValue, RvVariable,
};
use fdo_engine::fdo_protocol::v101::rv_to2_addr::{RvTo2Addr, RvTo2AddrEntry};
use fdo_engine::fdo_protocol::v101::service_info::ServiceInfoKv;
use fdo_engine::fdo_protocol::v101::TransportProtocol;
use fdo_engine::server::config::{DiConfig, ServerConfig, To2Config};
use fdo_engine::server::stores::{
    AccessList, MemoryRedirectStore, MemorySessionStore, MemoryVoucherStore, RedirectStore,
    VoucherStore,
};
use fdo_engine::server::{Dispatcher, Services};
use fdo_engine::srv_info::CollectServiceInfo;
use fdo_engine::storage::MemoryStorage;
use fdo_engine::to0::To0;
use fdo_engine::to1::To1;
use fdo_engine::to2::To2;
use fdo_engine::{voucher, Ctx};
use pretty_assertions::assert_eq;

const SERIAL: &str = "AABCCDDDEEF";
const RV_HOST: &str = "rv.local";
const OWNER_HOST: &str = "owner.local";

struct Deployment {
    dispatcher: Arc<Dispatcher>,
    vouchers: Arc<MemoryVoucherStore>,
    redirects: Arc<MemoryRedirectStore>,
    access: Arc<AccessList>,
    manufacturer: Arc<SigningKey>,
    owner: Arc<SigningKey>,
}

fn rv_info() -> RendezvousInfo {
    let directive = RendezvousDirective::new(vec![
        RendezvousInstr::new(RvVariable::Dns, &RV_HOST).unwrap(),
        RendezvousInstr::new(RvVariable::DevPort, &8041u16).unwrap(),
        RendezvousInstr::new(RvVariable::Protocol, &RvProtocolValue::Http).unwrap(),
    ])
    .unwrap();

    RendezvousInfo::new(vec![directive]).unwrap()
}

fn owner_address() -> RvTo2Addr {
    RvTo2Addr::new(vec![RvTo2AddrEntry::new(
        None,
        Some(OWNER_HOST.to_string()),
        8043,
        TransportProtocol::Http,
    )])
    .unwrap()
}

fn owner_service_info() -> Vec<ServiceInfoKv> {
    vec![
        ServiceInfoKv::new("fdo_sys:active", &true).unwrap(),
        ServiceInfoKv::new("fdo_sys:filedesc", &"setup.sh").unwrap(),
    ]
}

impl Deployment {
    fn new() -> Self {
        let manufacturer = Arc::new(SigningKey::generate(PkType::Secp256R1).unwrap());
        let owner = Arc::new(SigningKey::generate(PkType::Secp256R1).unwrap());

        let keys = KeyRing::new();
        keys.insert(Arc::clone(&manufacturer)).unwrap();
        keys.insert(Arc::clone(&owner)).unwrap();

        let vouchers = Arc::new(MemoryVoucherStore::new());
        let redirects = Arc::new(MemoryRedirectStore::new());
        let access = Arc::new(AccessList::new());

        let services = Services {
            sessions: Arc::new(MemorySessionStore::new()),
            vouchers: vouchers.clone(),
            redirects: redirects.clone(),
            access: access.clone(),
            keys: Arc::new(keys),
        };

        let config = ServerConfig {
            di: Some(DiConfig::new(manufacturer.public_key(), rv_info())),
            to2: To2Config {
                owner_service_info: owner_service_info(),
                ..Default::default()
            },
            ..Default::default()
        };

        Self {
            dispatcher: Arc::new(Dispatcher::new(config, services)),
            vouchers,
            redirects,
            access,
            manufacturer,
            owner,
        }
    }

    fn transport(&self) -> LoopbackTransport {
        LoopbackTransport::new(Arc::clone(&self.dispatcher))
    }

    fn connector(&self) -> LoopbackConnector {
        LoopbackConnector::new()
            .with_host(RV_HOST, Arc::clone(&self.dispatcher))
            .with_host(OWNER_HOST, Arc::clone(&self.dispatcher))
    }

    fn voucher(&self, creds: &DeviceCredential) -> OwnershipVoucher {
        self.vouchers.load(&creds.dc_guid).unwrap().unwrap()
    }

    /// Extends the voucher of the device from the manufacturer to the owner.
    fn sell(&self, creds: &DeviceCredential) -> OwnershipVoucher {
        let mut ov = self.voucher(creds);

        voucher::extend(&mut ov, self.owner.public_key(), &self.manufacturer).unwrap();

        self.vouchers.replace(0, &ov).unwrap();

        ov
    }
}

struct Device {
    storage: MemoryStorage,
    crypto: SoftwareCrypto<MemoryStorage>,
}

impl Device {
    async fn new() -> Self {
        let storage = MemoryStorage::new();
        let crypto = SoftwareCrypto::create(storage.clone()).await.unwrap();

        Self { storage, crypto }
    }

    fn ctx(&mut self) -> Ctx<'_, SoftwareCrypto<MemoryStorage>, MemoryStorage> {
        Ctx::new(&mut self.crypto, &mut self.storage)
    }

    async fn initialize(&mut self, deployment: &Deployment) -> DeviceCredential {
        let client = InitialClient::new(deployment.transport());

        Di::new(client, "fdo-device", SERIAL)
            .create_credentials(&mut self.ctx())
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn device_initialization() {
    let deployment = Deployment::new();
    let mut device = Device::new().await;

    let creds = device.initialize(&deployment).await;

    let ov = deployment.voucher(&creds);
    assert_eq!(*ov.guid(), creds.dc_guid);
    assert!(ov.entries().is_empty());
    assert_eq!(ov.header().ov_rv_info, rv_info());
    assert_eq!(ov.header().ov_pub_key, deployment.manufacturer.public_key());

    device
        .crypto
        .verify_hmac(&creds.dc_hmac_secret, ov.hmac(), ov.header_bytes().unwrap())
        .await
        .unwrap();

    let device_key = voucher::device_public_key(&ov).unwrap();
    assert_eq!(device_key, device.crypto.public_key().await.unwrap());
}

#[tokio::test]
async fn owner_registration() {
    let deployment = Deployment::new();
    let mut device = Device::new().await;

    let creds = device.initialize(&deployment).await;
    let ov = deployment.sell(&creds);
    assert_eq!(ov.entries().len(), 1);

    let requested = 7200;
    let granted = To0::new(ov, owner_address(), requested)
        .register(deployment.transport(), &deployment.owner)
        .await
        .unwrap();

    assert!(granted <= requested, "{granted} > {requested}");

    let redirect = deployment.redirects.load(&creds.dc_guid).unwrap().unwrap();
    assert_eq!(redirect.to1d.payload().unwrap().to1d_rv, owner_address());
}

#[tokio::test]
async fn denied_device_is_not_redirected() {
    let deployment = Deployment::new();
    let mut device = Device::new().await;

    let creds = device.initialize(&deployment).await;
    let ov = deployment.sell(&creds);

    To0::new(ov, owner_address(), 3600)
        .register(deployment.transport(), &deployment.owner)
        .await
        .unwrap();

    deployment.access.deny(creds.dc_guid).unwrap();

    let err = To1::new(&creds)
        .with_rounds(1)
        .rv_owner(&mut device.ctx(), &deployment.connector())
        .await
        .unwrap_err();

    assert_eq!(*err.kind(), ErrorKind::Io);
}

#[tokio::test]
async fn ownership_transfer() {
    let deployment = Deployment::new();
    let mut device = Device::new().await;

    let creds = device.initialize(&deployment).await;
    let ov = deployment.sell(&creds);

    To0::new(ov, owner_address(), 3600)
        .register(deployment.transport(), &deployment.owner)
        .await
        .unwrap();

    let connector = deployment.connector();

    let redirect = To1::new(&creds)
        .rv_owner(&mut device.ctx(), &connector)
        .await
        .unwrap();

    let (to2, service_info) = To2::create(
        creds.clone(),
        redirect,
        SERIAL,
        CollectServiceInfo::modules(["fdo_sys"]),
    )
    .unwrap()
    .to2_change(&mut device.ctx(), &connector)
    .await
    .unwrap();

    assert_eq!(service_info, owner_service_info());

    let new_creds = to2.done(&mut device.ctx()).await.unwrap();

    assert_eq!(new_creds.dc_guid, creds.dc_guid);
    assert_eq!(new_creds.dc_pub_key_hash, creds.dc_pub_key_hash);
    assert_ne!(new_creds.dc_hmac_secret, creds.dc_hmac_secret);

    let stored = read_credentials(&device.storage).await.unwrap();
    assert_eq!(stored.as_ref(), Some(&new_creds));

    // Exactly one more entry, to the same owner
    let ov = deployment.voucher(&creds);
    assert_eq!(ov.entries().len(), 2);
    assert_eq!(
        voucher::verify(&ov).unwrap(),
        deployment.owner.public_key()
    );

    device
        .crypto
        .verify_hmac(&new_creds.dc_hmac_secret, ov.hmac(), ov.header_bytes().unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn ownership_transfer_reusing_credentials() {
    let deployment = Deployment::new();
    let mut device = Device::new().await;

    let creds = device.initialize(&deployment).await;
    let ov = deployment.sell(&creds);

    To0::new(ov, owner_address(), 3600)
        .register(deployment.transport(), &deployment.owner)
        .await
        .unwrap();

    let connector = deployment.connector();

    let redirect = To1::new(&creds)
        .rv_owner(&mut device.ctx(), &connector)
        .await
        .unwrap();

    let (to2, ()) = To2::create(
        creds.clone(),
        redirect,
        SERIAL,
        fdo_engine::srv_info::SkipServiceInfo::default(),
    )
    .unwrap()
    .with_credential_reuse(true)
    .to2_change(&mut device.ctx(), &connector)
    .await
    .unwrap();

    let new_creds = to2.done(&mut device.ctx()).await.unwrap();

    assert_eq!(new_creds, creds);
    assert_eq!(deployment.voucher(&creds).entries().len(), 1);
}
