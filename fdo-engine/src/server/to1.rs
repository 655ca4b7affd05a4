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

//! Rendezvous side of the Transfer Ownership Protocol 1 (TO1)

use fdo_protocol::error::ErrorKind;
use fdo_protocol::v101::eat_signature::EatPayload;
use fdo_protocol::v101::sign_info::{DeviceSgType, EBSigInfo};
use fdo_protocol::v101::to1::hello_rv::HelloRv;
use fdo_protocol::v101::to1::hello_rv_ack::HelloRvAck;
use fdo_protocol::v101::to1::prove_to_rv::ProveToRv;
use fdo_protocol::v101::to1::rv_redirect::RvRedirect;
use fdo_protocol::v101::{Guid, NonceTo1Proof};
use fdo_protocol::{Envelope, Error};
use tracing::{debug, error, info};

use crate::crypto;

use super::session::{SessionState, To1State};
use super::stores::Redirect;
use super::{Step, StepCtx};

fn redirect(ctx: &StepCtx<'_>, guid: &Guid) -> Result<Redirect, Error> {
    if ctx.services.access.is_denied(guid)? {
        error!(%guid, "device is denied");

        return Err(Error::new(ErrorKind::Resource, "device denied"));
    }

    ctx.services.redirects.load(guid)?.ok_or_else(|| {
        error!(%guid, "no owner registered for the device");

        Error::new(ErrorKind::Resource, "redirect not found")
    })
}

/// Checks the device is known and sends the nonce to sign.
pub(super) fn hello_rv(ctx: StepCtx<'_>, request: &Envelope) -> Result<Step, Error> {
    let HelloRv { guid, ea_sign_info } = request.message()?;

    let redirect = redirect(&ctx, &guid)?;

    let expected = DeviceSgType::for_pk_type(redirect.device_key.pk_type());
    if expected != Some(ea_sign_info.0.sg_type()) {
        error!(
            ?expected,
            actual = ?ea_sign_info.0.sg_type(),
            "signature type doesn't match the device key"
        );

        return Err(Error::new(ErrorKind::Message, "signature type"));
    }

    let nonce = crypto::nonce()?;

    info!(%guid, "TO1.HelloRV accepted");

    Step::next(
        &HelloRvAck {
            nonce_to1_proof: NonceTo1Proof(nonce),
            eb_sign_info: EBSigInfo(ea_sign_info.0),
        },
        SessionState::To1(To1State::ProveToRv { guid, nonce }),
    )
}

/// Verifies the attestation of the device and sends the owner addresses.
pub(super) fn prove_to_rv(
    ctx: StepCtx<'_>,
    state: To1State,
    request: &Envelope,
) -> Result<Step, Error> {
    let To1State::ProveToRv { guid, nonce } = state;

    let ProveToRv { ea_token } = request.message()?;

    let redirect = redirect(&ctx, &guid)?;

    crypto::verify_cose_signature(&ea_token, &redirect.device_key)
        .inspect_err(|_| error!(%guid, "couldn't verify the device attestation"))?;

    let payload = ea_token
        .payload
        .as_deref()
        .ok_or(Error::new(ErrorKind::Invalid, "missing eat payload"))
        .and_then(EatPayload::from_bytes)?;

    if *payload.nonce() != nonce {
        error!(%guid, "TO1 nonce mismatch");

        return Err(Error::new(ErrorKind::Message, "nonce mismatch"));
    }

    if !payload.is_device(&guid) {
        error!(%guid, "attestation is for another device");

        return Err(Error::new(ErrorKind::Message, "ueid mismatch"));
    }

    debug!(%guid, "device attestation verified");

    info!(%guid, "TO1.ProveToRV redirecting device");

    Step::done(&RvRedirect(redirect.to1d))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use coset::{CoseSign1Builder, HeaderBuilder};
    use fdo_protocol::utils::cbor_encode;
    use fdo_protocol::v101::public_key::PkType;
    use fdo_protocol::v101::sign_info::{EASigInfo, SigInfo};
    use fdo_protocol::v101::to1::rv_redirect::To1d;
    use fdo_protocol::v101::Nonce;
    use pretty_assertions::assert_eq;

    use crate::crypto::keys::SigningKey;
    use crate::server::config::ServerConfig;
    use crate::server::stores::RedirectStore;
    use crate::server::tests::{error_code, Server};

    use super::*;

    fn guid() -> Guid {
        Guid::new([7; 16])
    }

    fn registered() -> (Server, SigningKey, To1d) {
        let server = Server::new(ServerConfig::default());
        let device = SigningKey::generate(PkType::Secp256R1).unwrap();

        let to1d = To1d::new(CoseSign1Builder::new().payload(vec![0x80]).build());

        server
            .redirects
            .store(
                &guid(),
                Redirect {
                    to1d: to1d.clone(),
                    device_key: device.public_key(),
                },
                Duration::from_secs(60),
            )
            .unwrap();

        (server, device, to1d)
    }

    fn hello_rv(guid: Guid) -> Envelope {
        Envelope::from_message(&HelloRv {
            guid,
            ea_sign_info: EASigInfo(SigInfo::new(DeviceSgType::StSecP256R1)),
        })
        .unwrap()
    }

    fn prove(device: &SigningKey, nonce: Nonce, guid: &Guid, token: &str) -> Envelope {
        let payload = EatPayload::new(nonce, guid).to_bytes().unwrap();

        let ea_token = device.sign_cose(HeaderBuilder::new(), payload).unwrap();

        Envelope::from_message(&ProveToRv { ea_token })
            .unwrap()
            .with_token(token)
    }

    #[test]
    fn redirects_registered_device() {
        let (server, device, to1d) = registered();

        let result = server.dispatcher.dispatch(&hello_rv(guid()));
        let token = result.reply.token().unwrap().to_string();
        let ack: HelloRvAck = result.reply.message().unwrap();

        let result = server
            .dispatcher
            .dispatch(&prove(&device, ack.nonce_to1_proof.0, &guid(), &token));

        assert!(result.done);
        let RvRedirect(redirected) = result.reply.message().unwrap();
        assert_eq!(
            cbor_encode(&redirected).unwrap(),
            cbor_encode(&to1d).unwrap()
        );
    }

    #[test]
    fn denied_device() {
        let (server, _, _) = registered();
        server.access.deny(guid()).unwrap();

        let result = server.dispatcher.dispatch(&hello_rv(guid()));

        assert_eq!(error_code(&result), 6);
        assert!(server.sessions.is_empty().unwrap());
    }

    #[test]
    fn unknown_device() {
        let (server, _, _) = registered();

        let result = server.dispatcher.dispatch(&hello_rv(Guid::new([8; 16])));

        assert_eq!(error_code(&result), 6);
    }

    #[test]
    fn proof_signed_by_other_key() {
        let (server, _, _) = registered();
        let other = SigningKey::generate(PkType::Secp256R1).unwrap();

        let result = server.dispatcher.dispatch(&hello_rv(guid()));
        let token = result.reply.token().unwrap().to_string();
        let ack: HelloRvAck = result.reply.message().unwrap();

        let result = server
            .dispatcher
            .dispatch(&prove(&other, ack.nonce_to1_proof.0, &guid(), &token));

        assert_eq!(error_code(&result), 101);
        assert!(server.sessions.is_empty().unwrap());
    }

    #[test]
    fn proof_with_stale_nonce() {
        let (server, device, _) = registered();

        let result = server.dispatcher.dispatch(&hello_rv(guid()));
        let token = result.reply.token().unwrap().to_string();

        let result = server
            .dispatcher
            .dispatch(&prove(&device, Nonce::new([0; 16]), &guid(), &token));

        assert_eq!(error_code(&result), 101);
    }
}
