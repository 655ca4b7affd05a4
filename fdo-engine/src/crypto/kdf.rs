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

//! Key derivation of the session key.
//!
//! SP 800-108 KDF in counter mode with HMAC as PRF, an 8 bit counter and a 16 bit output length.
//!
//! <https://nvlpubs.nist.gov/nistpubs/SpecialPublications/NIST.SP.800-108r1-upd1.pdf>

use aws_lc_rs::hmac;
use fdo_protocol::error::ErrorKind;
use fdo_protocol::Error;

/// Fills the output with `K(1) || K(2) || ...` truncated to its length.
///
/// Each block is `K(i) = PRF(secret, [i]_8 || label || 0x00 || context || [L]_16)`, with `L` the
/// output length in bits.
pub(crate) fn counter_mode(
    alg: hmac::Algorithm,
    secret: &[u8],
    label: &[u8],
    context: &[u8],
    output: &mut [u8],
) -> Result<(), Error> {
    let block_len = alg.digest_algorithm().output_len;

    let out_bits = output
        .len()
        .checked_mul(8)
        .and_then(|bits| u16::try_from(bits).ok())
        .ok_or(Error::new(ErrorKind::OutOfRange, "kdf output length"))?
        .to_be_bytes();

    let key = hmac::Key::new(alg, secret);

    for (idx, block) in output.chunks_mut(block_len).enumerate() {
        let counter = u8::try_from(idx + 1)
            .map_err(|_| Error::new(ErrorKind::OutOfRange, "kdf counter"))?;

        let mut prf = hmac::Context::with_key(&key);
        prf.update(&[counter]);
        prf.update(label);
        prf.update(&[0x00]);
        prf.update(context);
        prf.update(&out_bits);

        let tag = prf.sign();

        // The last block can be shorter
        let len = block.len();
        block.copy_from_slice(&tag.as_ref()[..len]);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use fdo_protocol::utils::Hex;
    use pretty_assertions::assert_eq;

    use super::*;

    const LABEL: &[u8] = b"FIDO-KDF";
    const CONTEXT: &[u8] = b"AutomaticOnboardTunnel";

    #[test]
    fn single_block() {
        let mut out = [0u8; 32];

        counter_mode(hmac::HMAC_SHA256, b"shared secret", LABEL, CONTEXT, &mut out).unwrap();

        insta::assert_snapshot!(
            Hex::new(&out),
            @"f9bc6e72ee7fa8c700dd8f378a06d996ea99ab2148d23b7c37503c5941c6adb4"
        );
    }

    #[test]
    fn truncated_last_block() {
        let mut out = [0u8; 80];

        counter_mode(hmac::HMAC_SHA256, b"shared secret", LABEL, CONTEXT, &mut out).unwrap();

        insta::assert_snapshot!(
            Hex::new(&out),
            @"e80da38fb71f069dcd5fae0e68fb6bda5cae7ca338bd53188e54af99036a480bc34f12a2ef4135e3eab99262b764fa7b762fbfdcb48bd43c349ad61492bd0ef1c5787981b813f3ba19f452b8e6d5651f"
        );
    }

    #[test]
    fn context_changes_key() {
        let mut first = [0u8; 32];
        let mut second = [0u8; 32];

        counter_mode(hmac::HMAC_SHA256, b"k", LABEL, b"a", &mut first).unwrap();
        counter_mode(hmac::HMAC_SHA256, b"k", LABEL, b"b", &mut second).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn output_too_long() {
        let mut out = vec![0u8; 8192];

        let err = counter_mode(hmac::HMAC_SHA256, b"k", LABEL, CONTEXT, &mut out).unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::OutOfRange);
    }
}
