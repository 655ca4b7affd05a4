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

//! Manufacturer side of the Device Initialize Protocol (DI)

use std::sync::Arc;

use fdo_protocol::error::ErrorKind;
use fdo_protocol::utils::CborBstr;
use fdo_protocol::v101::di::app_start::AppStart;
use fdo_protocol::v101::di::done::Done;
use fdo_protocol::v101::di::set_credentials::SetCredentials;
use fdo_protocol::v101::di::set_hmac::SetHmac;
use fdo_protocol::v101::ownership_voucher::{OvHeader, OwnershipVoucher};
use fdo_protocol::v101::{Guid, PROTOCOL_VERSION};
use fdo_protocol::{Envelope, Error};
use tracing::{debug, error, info};

use crate::crypto::keys::SigningKey;
use crate::crypto::{self, hash_type_for_key, hmac_type_for_key};
use crate::server::config::{DiConfig, ManufacturerKey};
use crate::voucher;

use super::session::{DiState, SessionState};
use super::{Step, StepCtx};

fn config<'a>(ctx: &StepCtx<'a>) -> Result<&'a DiConfig, Error> {
    ctx.config.di.as_ref().ok_or_else(|| {
        error!("device initialization is not enabled");

        Error::new(ErrorKind::Resource, "device initialization not enabled")
    })
}

fn manufacturer(ctx: &StepCtx<'_>, config: &DiConfig) -> Result<Arc<SigningKey>, Error> {
    match &config.manufacturer_key {
        ManufacturerKey::Key(key) => ctx.signing_key(key),
        ManufacturerKey::Type(pk_type) => ctx.signing_key_alg(*pk_type),
    }
}

/// Checks the request of the device and sends the voucher header.
pub(super) fn app_start(ctx: StepCtx<'_>, request: &Envelope) -> Result<Step, Error> {
    let config = config(&ctx)?;

    let AppStart { device_mfg_info } = request.message()?;

    let csr = device_mfg_info.csr.payload()?;
    let device_key = csr.device_pub_key();

    if device_key.pk_type() != device_mfg_info.pk_type {
        error!(
            expected = ?device_mfg_info.pk_type,
            actual = ?device_key.pk_type(),
            "device key type mismatch"
        );

        return Err(Error::new(ErrorKind::Invalid, "device key type"));
    }

    if csr.serial_number() != device_mfg_info.serial_number
        || csr.device_info() != device_mfg_info.device_info
    {
        error!("device info in the request doesn't match the signed one");

        return Err(Error::new(ErrorKind::Invalid, "cert request info mismatch"));
    }

    crypto::verify_cose_signature(device_mfg_info.csr.sign(), device_key)
        .inspect_err(|_| error!("couldn't verify the cert request signature"))?;

    debug!("cert request verified");

    let manufacturer = manufacturer(&ctx, config)?;
    let manufacturer_key = manufacturer.public_key();

    let guid = Guid::new(crypto::random()?);

    let chain = vec![voucher::issue_device_cert(
        &manufacturer,
        guid,
        device_mfg_info.serial_number,
        device_key.clone(),
    )?];

    let chain_hash = voucher::cert_chain_hash(&chain, hash_type_for_key(&manufacturer_key))?;

    let ov_header = CborBstr::new(OvHeader {
        ovh_prot_ver: PROTOCOL_VERSION,
        ov_guid: guid,
        ov_rv_info: config.rv_info.clone(),
        ov_device_info: device_mfg_info.device_info,
        ov_pub_key: manufacturer_key,
        ov_dev_cert_chain_hash: Some(chain_hash),
    });

    let hmac_type = hmac_type_for_key(device_key);

    info!(%guid, ?hmac_type, "DI.AppStart accepted");

    let reply = SetCredentials {
        ov_header: ov_header.clone(),
    };

    Step::next(
        &reply,
        SessionState::Di(DiState::SetHmac {
            ov_header,
            dev_cert_chain: chain,
            hmac_type,
        }),
    )
}

/// Stores the voucher with the HMAC computed by the device.
pub(super) fn set_hmac(ctx: StepCtx<'_>, state: DiState, request: &Envelope) -> Result<Step, Error> {
    let config = config(&ctx)?;

    let DiState::SetHmac {
        ov_header,
        dev_cert_chain,
        hmac_type,
    } = state;

    let SetHmac { hmac } = request.message()?;

    if hmac.hash_type() != hmac_type {
        error!(expected = ?hmac_type, actual = ?hmac.hash_type(), "wrong hmac type");

        return Err(Error::new(ErrorKind::Invalid, "hmac type"));
    }

    let mut voucher = OwnershipVoucher::new(ov_header, hmac, Some(dev_cert_chain));

    if let Some(owner) = &config.default_owner {
        let manufacturer = ctx.signing_key(&voucher.header().ov_pub_key)?;

        voucher::extend(&mut voucher, owner.clone(), &manufacturer)?;

        debug!("voucher extended to the default owner");
    }

    ctx.services.vouchers.insert(&voucher)?;

    info!(guid = %voucher.guid(), entries = voucher.entries().len(), "DI.SetHMAC stored voucher");

    Step::done(&Done)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use coset::HeaderBuilder;
    use fdo_protocol::utils::{cbor_encode, Signed};
    use fdo_protocol::v101::device_cert::CertRequestPayload;
    use fdo_protocol::v101::di::app_start::DeviceMfgInfo;
    use fdo_protocol::v101::hash_hmac::{HMac, Hashtype};
    use fdo_protocol::v101::public_key::{PkType, PublicKey};
    use pretty_assertions::assert_eq;

    use crate::crypto::keys::SigningKey;
    use crate::server::config::ServerConfig;
    use crate::server::stores::VoucherStore;
    use crate::server::tests::{error_code, Server};
    use crate::voucher::tests::create_rv_info;

    use super::*;

    fn manufacturer(default_owner: Option<PublicKey>) -> Server {
        let mfg = Arc::new(SigningKey::generate(PkType::Secp256R1).unwrap());

        let mut di = DiConfig::new(mfg.public_key(), create_rv_info());
        di.default_owner = default_owner;

        let server = Server::new(ServerConfig::manufacturer(di));
        server.keys.insert(mfg).unwrap();

        server
    }

    fn device() -> SigningKey {
        SigningKey::generate(PkType::Secp256R1).unwrap()
    }

    fn app_start(device: &SigningKey, signer: &SigningKey) -> Envelope {
        let payload = CertRequestPayload::new(
            "AABCCDDDEEF".to_string(),
            "fdo-test".to_string(),
            device.public_key(),
        );

        let csr = Signed::new(
            signer
                .sign_cose(HeaderBuilder::new(), cbor_encode(&payload).unwrap())
                .unwrap(),
        );

        Envelope::from_message(&AppStart {
            device_mfg_info: DeviceMfgInfo {
                device_info: "fdo-test".to_string(),
                serial_number: "AABCCDDDEEF".to_string(),
                pk_type: device.pk_type(),
                csr,
            },
        })
        .unwrap()
    }

    fn run_di(server: &Server, device: &SigningKey) -> (OwnershipVoucher, Vec<u8>) {
        let result = server.dispatcher.dispatch(&app_start(device, device));
        assert!(!result.done);

        let token = result.reply.token().unwrap().to_string();
        let SetCredentials { ov_header } = result.reply.message().unwrap();

        let secret = crypto::random::<32>().unwrap().to_vec();
        let hmac_type = hmac_type_for_key(&device.public_key());
        let hmac = crypto::hmac(hmac_type, &secret, ov_header.bytes().unwrap()).unwrap();

        let request = Envelope::from_message(&SetHmac { hmac })
            .unwrap()
            .with_token(token);

        let result = server.dispatcher.dispatch(&request);
        assert!(result.done);
        assert_eq!(result.reply.msg_id(), 13);

        let voucher = server.vouchers.load(&ov_header.ov_guid).unwrap().unwrap();

        (voucher, secret)
    }

    #[test]
    fn creates_voucher_without_entries() {
        let server = manufacturer(None);
        let device = device();

        let (voucher, secret) = run_di(&server, &device);

        assert!(voucher.entries().is_empty());
        assert_eq!(voucher.header().ov_device_info, "fdo-test");
        crypto::verify_hmac(&secret, voucher.hmac(), voucher.header_bytes().unwrap()).unwrap();

        assert_eq!(
            voucher::device_public_key(&voucher).unwrap(),
            device.public_key()
        );
        assert!(server.sessions.is_empty().unwrap());
    }

    #[test]
    fn extends_to_default_owner() {
        let owner = SigningKey::generate(PkType::Secp256R1).unwrap();
        let server = manufacturer(Some(owner.public_key()));

        let (voucher, _) = run_di(&server, &device());

        assert_eq!(voucher.entries().len(), 1);
        assert_eq!(voucher::verify(&voucher).unwrap(), owner.public_key());
    }

    #[test]
    fn manufacturer_key_by_type() {
        let p256 = Arc::new(SigningKey::generate(PkType::Secp256R1).unwrap());
        let p384 = Arc::new(SigningKey::generate(PkType::Secp384R1).unwrap());

        let di = DiConfig::with_key_type(PkType::Secp384R1, create_rv_info());
        let server = Server::new(ServerConfig::manufacturer(di));
        server.keys.insert(p256).unwrap();
        server.keys.insert(Arc::clone(&p384)).unwrap();

        let device = SigningKey::generate(PkType::Secp384R1).unwrap();
        let (voucher, secret) = run_di(&server, &device);

        assert_eq!(voucher.header().ov_pub_key, p384.public_key());
        assert_eq!(voucher.hmac().hash_type(), Hashtype::HmacSha384);
        crypto::verify_hmac(&secret, voucher.hmac(), voucher.header_bytes().unwrap()).unwrap();
        assert_eq!(
            voucher::device_public_key(&voucher).unwrap(),
            device.public_key()
        );
    }

    #[test]
    fn missing_key_type() {
        let di = DiConfig::with_key_type(PkType::Secp384R1, create_rv_info());
        let server = Server::new(ServerConfig::manufacturer(di));
        server
            .keys
            .insert(Arc::new(SigningKey::generate(PkType::Secp256R1).unwrap()))
            .unwrap();

        let device = device();
        let result = server.dispatcher.dispatch(&app_start(&device, &device));

        assert_eq!(error_code(&result), 6);
        assert!(server.sessions.is_empty().unwrap());
    }

    #[test]
    fn request_signed_by_other_key() {
        let server = manufacturer(None);

        let result = server.dispatcher.dispatch(&app_start(&device(), &device()));

        assert_eq!(error_code(&result), 101);
        assert!(server.sessions.is_empty().unwrap());
    }

    #[test]
    fn wrong_hmac_type() {
        let server = manufacturer(None);
        let device = device();

        let result = server.dispatcher.dispatch(&app_start(&device, &device));
        let token = result.reply.token().unwrap().to_string();

        let hmac = HMac::with_sha384(vec![0; 48]).unwrap();
        let request = Envelope::from_message(&SetHmac { hmac })
            .unwrap()
            .with_token(token);

        let result = server.dispatcher.dispatch(&request);
        assert_eq!(error_code(&result), 100);
    }

    #[test]
    fn disabled_without_config() {
        let server = Server::new(ServerConfig::default());
        let device = device();

        let result = server.dispatcher.dispatch(&app_start(&device, &device));

        assert_eq!(error_code(&result), 6);
    }
}
