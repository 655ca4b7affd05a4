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

//! Transfer Ownership Protocol 0 (TO0)
//!
//! The owner registers the address of its onboarding service with the rendezvous server, so the
//! device can find it during TO1.

use coset::HeaderBuilder;
use fdo_protocol::error::ErrorKind;
use fdo_protocol::utils::{cbor_encode, CborBstr, Signed};
use fdo_protocol::v101::ownership_voucher::OwnershipVoucher;
use fdo_protocol::v101::rv_to2_addr::RvTo2Addr;
use fdo_protocol::v101::to0::hello::Hello;
use fdo_protocol::v101::to0::owner_sign::{OwnerSign, To0d};
use fdo_protocol::v101::to1::rv_redirect::To1dPayload;
use fdo_protocol::v101::NonceTo0Sign;
use fdo_protocol::Error;
use tracing::{debug, error, info};

use crate::client::{InitialClient, Transport};
use crate::crypto::hash_for_key;
use crate::crypto::keys::SigningKey;
use crate::voucher;

/// Registration of a voucher with a rendezvous server.
#[derive(Debug, Clone)]
pub struct To0 {
    ownership_voucher: OwnershipVoucher,
    rv_to2_addr: RvTo2Addr,
    wait_seconds: u32,
}

impl To0 {
    /// Registers the owner addresses for the device of the voucher, for the requested seconds.
    pub fn new(
        ownership_voucher: OwnershipVoucher,
        rv_to2_addr: RvTo2Addr,
        wait_seconds: u32,
    ) -> Self {
        Self {
            ownership_voucher,
            rv_to2_addr,
            wait_seconds,
        }
    }

    /// Creates the signed registration for the nonce sent by the rendezvous server.
    ///
    /// The owner key must be the last owner of the voucher.
    pub fn owner_sign(&self, nonce: NonceTo0Sign, owner: &SigningKey) -> Result<OwnerSign, Error> {
        let to0d = CborBstr::new(To0d {
            ownership_voucher: self.ownership_voucher.clone(),
            wait_seconds: self.wait_seconds,
            nonce_to0_sign: nonce,
        });

        let owner_key = owner.public_key();

        let payload = To1dPayload {
            to1d_rv: self.rv_to2_addr.clone(),
            to1d_to0d_hash: hash_for_key(&owner_key, to0d.bytes()?)?,
        };

        let to1d = owner.sign_cose(HeaderBuilder::new(), cbor_encode(&payload)?)?;

        Ok(OwnerSign {
            to0d,
            to1d: Signed::new(to1d),
        })
    }

    /// Runs the exchange, returning the seconds granted by the rendezvous server.
    pub async fn register<T>(&self, transport: T, owner: &SigningKey) -> Result<u32, Error>
    where
        T: Transport,
    {
        let guid = *self.ownership_voucher.guid();

        if !voucher::final_owner_key(&self.ownership_voucher).is_ok_and(|key| owner.matches(&key)) {
            error!(%guid, "the key is not the owner of the voucher");

            return Err(Error::new(ErrorKind::Voucher, "not the voucher owner"));
        }

        let mut client = InitialClient::new(transport);

        let (ack, token) = client.send(&Hello).await?;

        info!(%guid, "TO0.Hello successful");

        let owner_sign = self.owner_sign(ack.nonce_to0_sign, owner)?;

        let mut client = client.into_session(token);

        let accept = client.send(&owner_sign).await?;

        debug!(
            requested = self.wait_seconds,
            granted = accept.wait_seconds,
            "registration accepted"
        );

        info!(%guid, wait_seconds = accept.wait_seconds, "TO0.OwnerSign successful");

        Ok(accept.wait_seconds)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fdo_protocol::v101::public_key::PkType;
    use fdo_protocol::v101::rv_to2_addr::RvTo2AddrEntry;
    use fdo_protocol::v101::TransportProtocol;
    use pretty_assertions::assert_eq;

    use crate::client::loopback::LoopbackTransport;
    use crate::crypto::keys::KeyRing;
    use crate::crypto::{nonce, verify_cose_signature, verify_hash};
    use crate::server::config::ServerConfig;
    use crate::server::{Dispatcher, Services};
    use crate::voucher::tests::create_voucher;

    use super::*;

    fn rv_to2_addr() -> RvTo2Addr {
        RvTo2Addr::new(vec![RvTo2AddrEntry::new(
            None,
            Some("owner.local".to_string()),
            8043,
            TransportProtocol::Https,
        )])
        .unwrap()
    }

    #[test]
    fn to1d_binds_the_registration() {
        let mfg = SigningKey::generate(PkType::Secp256R1).unwrap();
        let device = SigningKey::generate(PkType::Secp256R1).unwrap();

        let to0 = To0::new(create_voucher(&mfg, &device), rv_to2_addr(), 120);

        let nonce = nonce().unwrap();
        let owner_sign = to0.owner_sign(nonce, &mfg).unwrap();

        assert_eq!(owner_sign.to0d.nonce_to0_sign, nonce);
        assert_eq!(owner_sign.to0d.wait_seconds, 120);

        verify_cose_signature(owner_sign.to1d.sign(), &mfg.public_key()).unwrap();

        let payload = owner_sign.to1d.payload().unwrap();
        assert_eq!(payload.to1d_rv, rv_to2_addr());
        verify_hash(&payload.to1d_to0d_hash, owner_sign.to0d.bytes().unwrap()).unwrap();
    }

    fn rendezvous() -> LoopbackTransport {
        let services = Services::in_memory(Arc::new(KeyRing::new()));

        LoopbackTransport::new(Arc::new(Dispatcher::new(ServerConfig::default(), services)))
    }

    #[tokio::test]
    async fn registers_with_rendezvous() {
        let mfg = SigningKey::generate(PkType::Secp256R1).unwrap();
        let device = SigningKey::generate(PkType::Secp256R1).unwrap();

        let to0 = To0::new(create_voucher(&mfg, &device), rv_to2_addr(), 120);

        let granted = to0.register(rendezvous(), &mfg).await.unwrap();

        assert_eq!(granted, 120);
    }

    #[tokio::test]
    async fn refuses_other_owner() {
        let mfg = SigningKey::generate(PkType::Secp256R1).unwrap();
        let device = SigningKey::generate(PkType::Secp256R1).unwrap();

        let to0 = To0::new(create_voucher(&mfg, &device), rv_to2_addr(), 120);

        let err = to0.register(rendezvous(), &device).await.unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::Voucher);
    }
}
