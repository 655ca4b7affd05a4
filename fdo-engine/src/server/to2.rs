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

//! Owner side of the Transfer Ownership Protocol 2 (TO2)

use coset::iana::{Algorithm, EnumI64};
use coset::HeaderBuilder;
use fdo_protocol::codec;
use fdo_protocol::error::ErrorKind;
use fdo_protocol::utils::{cbor_encode, Signed};
use fdo_protocol::v101::eat_signature::{EatPayload, CUPH_NONCE, CUPH_OWNER_PUBKEY, EUPH_NONCE};
use fdo_protocol::v101::key_exchange::KexSuitNames;
use fdo_protocol::v101::sign_info::{DeviceSgType, EBSigInfo};
use fdo_protocol::v101::to2::device_service_info::DeviceServiceInfo;
use fdo_protocol::v101::to2::device_service_info_ready::DeviceServiceInfoReady;
use fdo_protocol::v101::to2::done::Done;
use fdo_protocol::v101::to2::done2::Done2;
use fdo_protocol::v101::to2::get_ov_next_entry::GetOvNextEntry;
use fdo_protocol::v101::to2::hello_device::HelloDevice;
use fdo_protocol::v101::to2::ov_next_entry::OvNextEntry;
use fdo_protocol::v101::to2::owner_service_info::OwnerServiceInfo;
use fdo_protocol::v101::to2::owner_service_info_ready::OwnerServiceInfoReady;
use fdo_protocol::v101::to2::prove_device::{ProveDevice, ProveDevicePayload};
use fdo_protocol::v101::to2::prove_ov_hdr::{ProveOvHdr, ProveOvHdrPayload};
use fdo_protocol::v101::to2::setup_device::{SetupDevice, SetupDevicePayload};
use fdo_protocol::v101::{Message, Nonce, NonceTo2SetupDv};
use fdo_protocol::{from_value, Envelope, Error};
use tracing::{debug, error, info, warn};

use crate::crypto::session::{OwnerKeyExchange, SessionKey};
use crate::crypto::{self, hash_for_key};
use crate::srv_info;
use crate::voucher;

use super::config::DEFAULT_MTU;
use super::session::{SessionState, To2Prove, To2Session, To2State};
use super::{Step, StepCtx};

/// Encrypts the reply with the session key.
fn sealed<M>(key: &SessionKey, msg: &M) -> Result<Envelope, Error>
where
    M: Message,
{
    key.seal(&msg.encode()?)
        .map(|body| Envelope::new(M::MSG_TYPE, body))
}

/// Decrypts the request with the session key.
fn open<M>(key: &SessionKey, request: &Envelope) -> Result<M, Error>
where
    M: Message,
{
    M::decode(&key.open(request.body())?)
}

fn header_value<T>(value: &T) -> Result<ciborium::Value, Error>
where
    T: serde::Serialize,
{
    ciborium::Value::serialized(value).map_err(|err| {
        error!(error = %err, "couldn't encode header value");

        Error::new(ErrorKind::Encode, "unprotected header value")
    })
}

/// Proves the ownership of the voucher and starts the key exchange.
pub(super) fn hello_device(ctx: StepCtx<'_>, request: &Envelope) -> Result<Step, Error> {
    let HelloDevice {
        max_device_message_size,
        guid,
        nonce_to2_prove_ov,
        kex_suite_name,
        cipher_suite_name,
        ea_sign_info,
    } = request.message()?;

    if kex_suite_name != KexSuitNames::ECDH256 {
        error!(kex = kex_suite_name.as_str(), "unsupported key exchange");

        return Err(Error::new(ErrorKind::Message, "unsupported key exchange"));
    }

    if cipher_suite_name != Algorithm::A256GCM.to_i64() {
        error!(cipher = cipher_suite_name, "unsupported cipher suite");

        return Err(Error::new(ErrorKind::Message, "unsupported cipher suite"));
    }

    let ov = ctx.voucher(&guid)?;

    if ov.entries().is_empty() {
        error!(%guid, "voucher was never extended to an owner");

        return Err(Error::new(ErrorKind::Voucher, "voucher without entries"));
    }

    let owner_key = voucher::verify(&ov).map_err(|err| {
        error!(%guid, error = %err, "couldn't verify the voucher chain");

        Error::from(err)
    })?;

    let owner = ctx.signing_key(&owner_key)?;

    let device_key = voucher::device_public_key(&ov)?;

    if DeviceSgType::for_pk_type(device_key.pk_type()) != Some(ea_sign_info.0.sg_type()) {
        error!(%guid, "signature type doesn't match the device key");

        return Err(Error::new(ErrorKind::Message, "signature type"));
    }

    let num_ov_entries = u8::try_from(ov.entries().len())
        .map_err(|_| Error::new(ErrorKind::OutOfRange, "too many voucher entries"))?;

    let (xa_key_exchange, key_exchange) = OwnerKeyExchange::generate()?;

    let nonce_prove_dv = crypto::nonce()?;

    let hello_device_hash = hash_for_key(&owner_key, &codec::to_vec(request.body())?)?;

    debug!(%guid, max_device_message_size, num_ov_entries, "sending voucher header");

    let payload = ProveOvHdrPayload {
        ov_header: ov.header_tag().clone(),
        num_ov_entries,
        hmac: ov.hmac().clone(),
        nonce_to2_prove_ov,
        eb_sign_info: EBSigInfo(ea_sign_info.0),
        xa_key_exchange,
        hello_device_hash,
        max_owner_message_size: ctx.config.to2.max_message_size,
    };

    let unprotected = HeaderBuilder::new()
        .value(CUPH_NONCE, ciborium::Value::Bytes(nonce_prove_dv.to_vec()))
        .value(CUPH_OWNER_PUBKEY, header_value(&owner_key)?);

    let sign = owner.sign_cose(unprotected, cbor_encode(&payload)?)?;

    info!(%guid, "TO2.HelloDevice accepted");

    Step::next(
        &ProveOvHdr(Signed::new(sign)),
        SessionState::To2(To2State::ProveOvHdr(Box::new(To2Prove {
            guid,
            num_entries: num_ov_entries,
            next_entry: 0,
            nonce_prove_dv,
            key_exchange,
            owner_key,
        }))),
    )
}

/// Sends a voucher entry to the device.
pub(super) fn get_ov_next_entry(
    ctx: StepCtx<'_>,
    mut state: Box<To2Prove>,
    request: &Envelope,
) -> Result<Step, Error> {
    let GetOvNextEntry { ov_entry_num } = request.message()?;

    if ov_entry_num >= state.num_entries {
        error!(ov_entry_num, num_entries = state.num_entries, "entry out of range");

        return Err(Error::new(ErrorKind::OutOfRange, "voucher entry number"));
    }

    if ov_entry_num != state.next_entry {
        error!(ov_entry_num, expected = state.next_entry, "voucher entry out of order");

        return Err(Error::new(ErrorKind::Message, "voucher entry out of order"));
    }

    let ov = ctx.voucher(&state.guid)?;

    let entry = ov
        .entries()
        .get(usize::from(ov_entry_num))
        .filter(|_| ov.entries().len() == usize::from(state.num_entries))
        .ok_or_else(|| {
            error!(guid = %state.guid, "voucher changed during the transfer");

            Error::new(ErrorKind::Voucher, "voucher changed concurrently")
        })?;

    debug!(guid = %state.guid, ov_entry_num, "sending voucher entry");

    let reply = OvNextEntry {
        ov_entry_num,
        ov_entry: entry.clone(),
    };

    state.next_entry += 1;

    Step::next(&reply, SessionState::To2(To2State::ProveOvHdr(state)))
}

/// Verifies the device attestation and completes the key exchange.
pub(super) fn prove_device(
    ctx: StepCtx<'_>,
    state: Box<To2Prove>,
    request: &Envelope,
) -> Result<Step, Error> {
    let To2Prove {
        guid,
        num_entries,
        next_entry,
        nonce_prove_dv,
        key_exchange,
        owner_key,
    } = *state;

    if next_entry != num_entries {
        error!(%guid, next_entry, num_entries, "device proved before reading the voucher");

        return Err(Error::new(ErrorKind::Message, "voucher entries not read"));
    }

    let ProveDevice { ea_token } = request.message()?;

    let ov = ctx.voucher(&guid)?;
    let device_key = voucher::device_public_key(&ov)?;

    crypto::verify_cose_signature(&ea_token, &device_key)
        .inspect_err(|_| error!(%guid, "couldn't verify the device attestation"))?;

    let payload = ea_token
        .payload
        .as_deref()
        .ok_or(Error::new(ErrorKind::Invalid, "missing eat payload"))
        .and_then(EatPayload::from_bytes)?;

    if *payload.nonce() != nonce_prove_dv {
        error!(%guid, "TO2 prove device nonce mismatch");

        return Err(Error::new(ErrorKind::Message, "nonce mismatch"));
    }

    if !payload.is_device(&guid) {
        error!(%guid, "attestation is for another device");

        return Err(Error::new(ErrorKind::Message, "ueid mismatch"));
    }

    let ProveDevicePayload { xb_key_exchange } = payload
        .fdo()
        .ok_or(Error::new(ErrorKind::Message, "missing fdo claim"))
        .and_then(from_value)?;

    let nonce_setup_dv: Nonce = Signed::<()>::new(ea_token)
        .unprotected(EUPH_NONCE)?
        .ok_or(Error::new(ErrorKind::Message, "missing setup device nonce"))?;

    let session_key = key_exchange.derive(&xb_key_exchange)?;

    debug!(%guid, "session key derived");

    let owner2_key = ctx
        .config
        .to2
        .replacement_owner_key
        .clone()
        .unwrap_or_else(|| owner_key.clone());

    let owner = ctx.signing_key(&owner_key)?;

    let setup = SetupDevicePayload {
        rendezvous_info: ov.header().ov_rv_info.clone(),
        guid,
        nonce_to2_setup_dv: NonceTo2SetupDv(nonce_setup_dv),
        owner2_key: owner2_key.clone(),
    };

    let sign = owner.sign_cose(HeaderBuilder::new(), cbor_encode(&setup)?)?;

    let reply = sealed(&session_key, &SetupDevice(Signed::new(sign)))?;

    info!(%guid, "TO2.ProveDevice accepted");

    Ok(Step::Continue {
        reply,
        state: SessionState::To2(To2State::Setup(Box::new(To2Session {
            guid,
            num_entries,
            session_key,
            nonce_prove_dv,
            nonce_setup_dv,
            owner_key,
            owner2_key,
            replacement_hmac: None,
            device_mtu: DEFAULT_MTU,
            device_done: false,
            device_service_info: Vec::new(),
            cursor: 0,
        }))),
    })
}

/// Receives the replacement HMAC and the device MTU.
pub(super) fn device_service_info_ready(
    ctx: StepCtx<'_>,
    mut state: Box<To2Session>,
    request: &Envelope,
) -> Result<Step, Error> {
    let DeviceServiceInfoReady {
        replacement_hmac,
        max_owner_service_info_sz,
    } = open(&state.session_key, request)?;

    match &replacement_hmac {
        None if !ctx.config.to2.allow_credential_reuse => {
            error!(guid = %state.guid, "credential reuse refused");

            return Err(Error::new(ErrorKind::CredReuse, "credential reuse"));
        }
        None => {
            debug!(guid = %state.guid, "device keeps its credentials");
        }
        Some(hmac) if !hmac.hash_type().is_hmac() => {
            error!(hash_type = ?hmac.hash_type(), "replacement hmac type");

            return Err(Error::new(ErrorKind::Invalid, "replacement hmac type"));
        }
        Some(_) => {
            debug!(guid = %state.guid, "replacement hmac received");
        }
    }

    state.replacement_hmac = replacement_hmac;
    state.device_mtu = max_owner_service_info_sz
        .filter(|mtu| *mtu > 0)
        .unwrap_or(DEFAULT_MTU);

    let reply = sealed(
        &state.session_key,
        &OwnerServiceInfoReady {
            max_device_service_info_sz: Some(ctx.config.to2.mtu),
        },
    )?;

    info!(guid = %state.guid, device_mtu = state.device_mtu, "TO2.DeviceServiceInfoReady accepted");

    Ok(Step::Continue {
        reply,
        state: SessionState::To2(To2State::ServiceInfo(state)),
    })
}

/// Collects the device service info, then streams the owner one.
pub(super) fn device_service_info(
    ctx: StepCtx<'_>,
    mut state: Box<To2Session>,
    request: &Envelope,
) -> Result<Step, Error> {
    let DeviceServiceInfo {
        is_more_service_info,
        service_info,
    } = open(&state.session_key, request)?;

    if !state.device_done {
        debug!(items = service_info.len(), is_more_service_info, "device service info");

        state.device_service_info.extend(service_info);

        if is_more_service_info {
            let reply = sealed(
                &state.session_key,
                &OwnerServiceInfo {
                    is_more_service_info: false,
                    is_done: false,
                    service_info: Vec::new(),
                },
            )?;

            return Ok(Step::Continue {
                reply,
                state: SessionState::To2(To2State::ServiceInfo(state)),
            });
        }

        state.device_done = true;

        info!(
            guid = %state.guid,
            items = state.device_service_info.len(),
            "device service info received"
        );
    } else if !service_info.is_empty() || is_more_service_info {
        warn!(guid = %state.guid, "device sent service info after it was done");

        return Err(Error::new(ErrorKind::Message, "device service info after done"));
    }

    let chunk = srv_info::chunk(&ctx.config.to2.owner_service_info, state.device_mtu)?
        .into_iter()
        .nth(state.cursor)
        .ok_or(Error::new(ErrorKind::Message, "owner service info already sent"))?;

    state.cursor += 1;

    debug!(
        cursor = state.cursor,
        items = chunk.items.len(),
        is_done = chunk.is_done,
        "sending owner service info"
    );

    let reply = sealed(
        &state.session_key,
        &OwnerServiceInfo {
            is_more_service_info: chunk.is_more,
            is_done: chunk.is_done,
            service_info: chunk.items,
        },
    )?;

    let next = if chunk.is_done {
        To2State::Done(state)
    } else {
        To2State::ServiceInfo(state)
    };

    Ok(Step::Continue {
        reply,
        state: SessionState::To2(next),
    })
}

/// Extends the voucher to the next owner and ends the transfer.
pub(super) fn done(ctx: StepCtx<'_>, state: Box<To2Session>, request: &Envelope) -> Result<Step, Error> {
    let Done { nonce_to2_prove_dv } = open(&state.session_key, request)?;

    if nonce_to2_prove_dv.0 != state.nonce_prove_dv {
        error!(guid = %state.guid, "TO2 done nonce mismatch");

        return Err(Error::new(ErrorKind::Message, "nonce mismatch"));
    }

    match &state.replacement_hmac {
        Some(hmac) => {
            let mut ov = ctx.voucher(&state.guid)?;

            let owner = ctx.signing_key(&state.owner_key)?;

            voucher::extend(&mut ov, state.owner2_key.clone(), &owner)?;
            ov.set_hmac(hmac.clone());

            ctx.services
                .vouchers
                .replace(usize::from(state.num_entries), &ov)?;

            info!(guid = %state.guid, entries = ov.entries().len(), "voucher extended to the next owner");
        }
        None => {
            info!(guid = %state.guid, "credentials reused, voucher unchanged");
        }
    }

    let reply = sealed(
        &state.session_key,
        &Done2 {
            nonce_to2_setup_dv: NonceTo2SetupDv(state.nonce_setup_dv),
        },
    )?;

    info!(guid = %state.guid, "TO2.Done completed");

    Ok(Step::Done { reply })
}
