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

//! Error returned by the protocol.
//!
//! The error message is a “catch-all” whenever processing cannot continue. This includes protocol
//! errors and any trust or security violations.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

use super::{Message, Msgtype};

/// The error message indicates that the previous protocol message could not be processed.
///
/// ```cddl
/// ErrorMessage = [
///     EMErrorCode: uint16,
///     EMPrevMsgID: uint8,
///     EMErrorStr:  tstr,
///     EMErrorTs:   timestamp / null,
///     EMErrorCID:  correlationId / null
/// ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    // Error code
    e_m_error_code: u16,
    // Message ID (type) of the previous message
    e_m_prev_msg_id: Msgtype,
    // Error string
    e_m_error_str: String,
    // UTC timestamp in seconds
    e_m_error_ts: Option<u64>,
    // Unique id associated with this request
    e_m_error_c_i_d: Option<u128>,
}

impl ErrorMessage {
    /// Create the error message
    pub fn new(
        e_m_error_code: ErrorCode,
        e_m_prev_msg_id: Msgtype,
        e_m_error_str: impl Into<String>,
        e_m_error_ts: Option<u64>,
        e_m_error_c_i_d: Option<u128>,
    ) -> Self {
        Self {
            e_m_error_code: e_m_error_code.into(),
            e_m_prev_msg_id,
            e_m_error_str: e_m_error_str.into(),
            e_m_error_ts,
            e_m_error_c_i_d,
        }
    }

    /// Returns the error code
    pub fn error_code(&self) -> u16 {
        self.e_m_error_code
    }

    /// Returns the message id of the message that caused the error
    pub fn prev_msg_id(&self) -> Msgtype {
        self.e_m_prev_msg_id
    }

    /// Returns the error string
    pub fn error_str(&self) -> &str {
        &self.e_m_error_str
    }

    /// Returns the timestamp of the error
    pub fn timestamp(&self) -> Option<u64> {
        self.e_m_error_ts
    }

    /// Returns the code if it's one of the known ones
    pub fn known_code(&self) -> Option<ErrorCode> {
        let code = match self.e_m_error_code {
            1 => ErrorCode::InvalidJwtToken,
            2 => ErrorCode::InvalidOwnershipVoucher,
            3 => ErrorCode::InvalidOwnerSignBody,
            4 => ErrorCode::InvalidIpAddress,
            5 => ErrorCode::InvalidGuid,
            6 => ErrorCode::ResourceNotFound,
            100 => ErrorCode::MessageBodyError,
            101 => ErrorCode::InvalidMessageError,
            102 => ErrorCode::CredReuseError,
            500 => ErrorCode::InternalServerError,
            _ => return None,
        };

        Some(code)
    }
}

impl Display for ErrorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(code) = self.known_code() {
            write!(f, "error_code: {code}")?;
        } else {
            write!(f, "error_code: {}", self.e_m_error_code)?;
        }

        write!(
            f,
            ", prev_msg_id : {}, error_str: {:?}, error_ts: {:?}, c_i_d: {:?}",
            self.e_m_prev_msg_id, self.e_m_error_str, self.e_m_error_ts, self.e_m_error_c_i_d
        )
    }
}

impl Serialize for ErrorMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let Self {
            e_m_error_code,
            e_m_prev_msg_id,
            e_m_error_str,
            e_m_error_ts,
            e_m_error_c_i_d,
        } = self;

        (
            e_m_error_code,
            e_m_prev_msg_id,
            e_m_error_str,
            e_m_error_ts,
            e_m_error_c_i_d,
        )
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ErrorMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (e_m_error_code, e_m_prev_msg_id, e_m_error_str, e_m_error_ts, e_m_error_c_i_d) =
            Deserialize::deserialize(deserializer)?;

        Ok(Self {
            e_m_error_code,
            e_m_prev_msg_id,
            e_m_error_str,
            e_m_error_ts,
            e_m_error_c_i_d,
        })
    }
}

impl Message for ErrorMessage {
    const MSG_TYPE: Msgtype = 255;
}

/// The “EMErrorCode” in the ErrorMessage is an error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u16)]
pub enum ErrorCode {
    /// Token is invalid or the session is not in the expected state.
    InvalidJwtToken = 1,
    /// Ownership Voucher is invalid.
    InvalidOwnershipVoucher = 2,
    /// Owner sign body is invalid.
    InvalidOwnerSignBody = 3,
    /// IP address is invalid.
    InvalidIpAddress = 4,
    /// GUID is invalid.
    InvalidGuid = 5,
    /// Requested resource is not available on the server.
    ResourceNotFound = 6,
    /// Message body is structurally unsound.
    MessageBodyError = 100,
    /// Message structurally sound, but failed validation tests.
    InvalidMessageError = 101,
    /// Credential reuse rejected.
    CredReuseError = 102,
    /// Something went wrong which couldn't be classified otherwise.
    InternalServerError = 500,
}

impl ErrorCode {
    /// Returns the code sent on the wire for an error of the given kind.
    pub fn for_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Session => ErrorCode::InvalidJwtToken,
            ErrorKind::Voucher => ErrorCode::InvalidOwnershipVoucher,
            ErrorKind::Resource => ErrorCode::ResourceNotFound,
            ErrorKind::Decode | ErrorKind::Encode | ErrorKind::Invalid | ErrorKind::OutOfRange => {
                ErrorCode::MessageBodyError
            }
            ErrorKind::Message | ErrorKind::Crypto => ErrorCode::InvalidMessageError,
            ErrorKind::CredReuse => ErrorCode::CredReuseError,
            ErrorKind::Io | ErrorKind::Write => ErrorCode::InternalServerError,
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::InvalidJwtToken => write!(f, "INVALID_JWT_TOKEN"),
            ErrorCode::InvalidOwnershipVoucher => write!(f, "INVALID_OWNERSHIP_VOUCHER"),
            ErrorCode::InvalidOwnerSignBody => write!(f, "INVALID_OWNER_SIGN_BODY"),
            ErrorCode::InvalidIpAddress => write!(f, "INVALID_IP_ADDRESS"),
            ErrorCode::InvalidGuid => write!(f, "INVALID_GUID"),
            ErrorCode::ResourceNotFound => write!(f, "RESOURCE_NOT_FOUND"),
            ErrorCode::MessageBodyError => write!(f, "MESSAGE_BODY_ERROR"),
            ErrorCode::InvalidMessageError => write!(f, "INVALID_MESSAGE_ERROR"),
            ErrorCode::CredReuseError => write!(f, "CRED_REUSE_ERROR"),
            ErrorCode::InternalServerError => write!(f, "INTERNAL_SERVER_ERROR"),
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(value: ErrorCode) -> Self {
        value as u16
    }
}
