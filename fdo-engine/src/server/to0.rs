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

//! Rendezvous side of the Transfer Ownership Protocol 0 (TO0)

use std::time::Duration;

use fdo_protocol::error::ErrorKind;
use fdo_protocol::v101::to0::accept_owner::AcceptOwner;
use fdo_protocol::v101::to0::hello::Hello;
use fdo_protocol::v101::to0::hello_ack::HelloAck;
use fdo_protocol::v101::to0::owner_sign::OwnerSign;
use fdo_protocol::{Envelope, Error};
use tracing::{debug, error, info};

use crate::crypto;
use crate::voucher;

use super::session::{SessionState, To0State};
use super::stores::Redirect;
use super::{Step, StepCtx};

/// Sends the nonce the owner signs.
pub(super) fn hello(_ctx: StepCtx<'_>, request: &Envelope) -> Result<Step, Error> {
    let Hello = request.message()?;

    let nonce = crypto::nonce()?;

    info!("TO0.Hello accepted");

    Step::next(
        &HelloAck {
            nonce_to0_sign: nonce,
        },
        SessionState::To0(To0State::OwnerSign { nonce }),
    )
}

/// Verifies the voucher and registers the owner addresses.
pub(super) fn owner_sign(
    ctx: StepCtx<'_>,
    state: To0State,
    request: &Envelope,
) -> Result<Step, Error> {
    let To0State::OwnerSign { nonce } = state;

    let OwnerSign { to0d, to1d } = request.message()?;

    if to0d.nonce_to0_sign != nonce {
        error!("TO0 nonce mismatch");

        return Err(Error::new(ErrorKind::Message, "nonce mismatch"));
    }

    let ov = &to0d.ownership_voucher;
    let guid = *ov.guid();

    let owner_key = voucher::verify(ov).map_err(|err| {
        error!(%guid, error = %err, "couldn't verify the voucher chain");

        Error::from(err)
    })?;

    debug!(%guid, entries = ov.entries().len(), "voucher verified");

    crypto::verify_cose_signature(to1d.sign(), &owner_key)
        .inspect_err(|_| error!("couldn't verify the to1d signature"))?;

    let to1d_payload = to1d.payload()?;

    crypto::verify_hash(&to1d_payload.to1d_to0d_hash, to0d.bytes()?).map_err(|_| {
        error!("to0d hash mismatch");

        Error::new(ErrorKind::Message, "to0d hash mismatch")
    })?;

    let device_key = voucher::device_public_key(ov)?;

    if ctx.services.access.is_denied(&guid)? {
        error!(%guid, "device denied");

        return Err(Error::new(ErrorKind::Resource, "device denied"));
    }

    if !ctx.services.access.trusts_keys(&voucher::key_hashes(ov)?)? {
        error!(%guid, "voucher keys not trusted");

        return Err(Error::new(ErrorKind::Resource, "voucher keys not trusted"));
    }

    let granted = to0d.wait_seconds.min(ctx.config.to0.max_wait_seconds);

    ctx.services.redirects.store(
        &guid,
        Redirect { to1d, device_key },
        Duration::from_secs(granted.into()),
    )?;

    info!(%guid, requested = to0d.wait_seconds, granted, "TO0.OwnerSign registered owner");

    Step::done(&AcceptOwner {
        wait_seconds: granted,
    })
}

#[cfg(test)]
mod tests {
    use fdo_protocol::utils::cbor_encode;
    use fdo_protocol::v101::public_key::PkType;
    use fdo_protocol::v101::rv_to2_addr::{RvTo2Addr, RvTo2AddrEntry};
    use fdo_protocol::v101::{Guid, TransportProtocol};
    use pretty_assertions::assert_eq;

    use crate::crypto::keys::SigningKey;
    use crate::server::config::{ServerConfig, To0Config};
    use crate::server::stores::RedirectStore;
    use crate::server::tests::{error_code, Server};
    use crate::server::DispatchResult;
    use crate::to0::To0;
    use crate::voucher::tests::create_voucher;

    use super::*;

    fn create_rv_to2_addr() -> RvTo2Addr {
        RvTo2Addr::new(vec![RvTo2AddrEntry::new(
            None,
            Some("owner.local".to_string()),
            8043,
            TransportProtocol::Http,
        )])
        .unwrap()
    }

    struct Fixture {
        server: Server,
        mfg: SigningKey,
        owner: SigningKey,
        to0: To0,
    }

    fn fixture(wait_seconds: u32) -> Fixture {
        let server = Server::new(ServerConfig {
            to0: To0Config {
                max_wait_seconds: 600,
            },
            ..Default::default()
        });

        let mfg = SigningKey::generate(PkType::Secp256R1).unwrap();
        let device = SigningKey::generate(PkType::Secp256R1).unwrap();
        let owner = SigningKey::generate(PkType::Secp256R1).unwrap();

        let mut ov = create_voucher(&mfg, &device);
        voucher::extend(&mut ov, owner.public_key(), &mfg).unwrap();

        Fixture {
            server,
            mfg,
            owner,
            to0: To0::new(ov, create_rv_to2_addr(), wait_seconds),
        }
    }

    fn hello(server: &Server) -> (String, HelloAck) {
        let result = server
            .dispatcher
            .dispatch(&Envelope::from_message(&Hello).unwrap());

        let token = result.reply.token().unwrap().to_string();

        (token, result.reply.message().unwrap())
    }

    #[test]
    fn registers_and_bounds_wait() {
        let Fixture {
            server, owner, to0, ..
        } = fixture(3600);

        let (token, ack) = hello(&server);

        let owner_sign = to0.owner_sign(ack.nonce_to0_sign, &owner).unwrap();
        let request = Envelope::from_message(&owner_sign)
            .unwrap()
            .with_token(token);

        let result = server.dispatcher.dispatch(&request);
        assert!(result.done);

        let AcceptOwner { wait_seconds } = result.reply.message().unwrap();
        assert_eq!(wait_seconds, 600);

        let redirect = server.redirects.load(&Guid::new([7; 16])).unwrap().unwrap();
        assert_eq!(
            cbor_encode(&redirect.to1d).unwrap(),
            cbor_encode(&owner_sign.to1d).unwrap()
        );
    }

    #[test]
    fn wrong_nonce() {
        let Fixture {
            server, owner, to0, ..
        } = fixture(60);

        let (token, _) = hello(&server);

        let owner_sign = to0.owner_sign(crypto::nonce().unwrap(), &owner).unwrap();
        let request = Envelope::from_message(&owner_sign)
            .unwrap()
            .with_token(token);

        let result = server.dispatcher.dispatch(&request);
        assert_eq!(error_code(&result), 101);
        assert!(server.redirects.load(&Guid::new([7; 16])).unwrap().is_none());
    }

    #[test]
    fn to1d_signed_by_previous_owner() {
        let Fixture { server, to0, .. } = fixture(60);
        let other = SigningKey::generate(PkType::Secp256R1).unwrap();

        let (token, ack) = hello(&server);

        let owner_sign = to0.owner_sign(ack.nonce_to0_sign, &other).unwrap();
        let request = Envelope::from_message(&owner_sign)
            .unwrap()
            .with_token(token);

        let result = server.dispatcher.dispatch(&request);
        assert_eq!(error_code(&result), 101);
        assert!(server.redirects.load(&Guid::new([7; 16])).unwrap().is_none());
    }

    fn register(fixture: &Fixture) -> DispatchResult {
        let (token, ack) = hello(&fixture.server);

        let owner_sign = fixture
            .to0
            .owner_sign(ack.nonce_to0_sign, &fixture.owner)
            .unwrap();
        let request = Envelope::from_message(&owner_sign)
            .unwrap()
            .with_token(token);

        fixture.server.dispatcher.dispatch(&request)
    }

    #[test]
    fn denied_device_is_not_registered() {
        let fixture = fixture(60);
        fixture.server.access.deny(Guid::new([7; 16])).unwrap();

        let result = register(&fixture);

        assert_eq!(error_code(&result), 6);
        assert!(fixture
            .server
            .redirects
            .load(&Guid::new([7; 16]))
            .unwrap()
            .is_none());
    }

    #[test]
    fn denied_manufacturer_key() {
        let fixture = fixture(60);
        let mfg = voucher::key_hash(&fixture.mfg.public_key()).unwrap();
        fixture.server.access.deny_key(mfg).unwrap();

        let result = register(&fixture);

        assert_eq!(error_code(&result), 6);
        assert!(fixture
            .server
            .redirects
            .load(&Guid::new([7; 16]))
            .unwrap()
            .is_none());
    }

    #[test]
    fn allowed_owner_key() {
        let fixture = fixture(60);
        let other = SigningKey::generate(PkType::Secp256R1).unwrap();
        let other = voucher::key_hash(&other.public_key()).unwrap();
        fixture.server.access.allow_key(other).unwrap();

        let result = register(&fixture);
        assert_eq!(error_code(&result), 6);

        let owner = voucher::key_hash(&fixture.owner.public_key()).unwrap();
        fixture.server.access.allow_key(owner).unwrap();

        let result = register(&fixture);
        assert!(result.done);
        assert!(fixture
            .server
            .redirects
            .load(&Guid::new([7; 16]))
            .unwrap()
            .is_some());
    }
}
