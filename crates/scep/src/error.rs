//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Error taxonomy for the SCEP service.
//!
//! Four classes with distinct surfacing rules:
//! - `ProtocolInput` — malformed HTTP surface input, reported as 400/405 plaintext
//! - `MessageDecoding` — a pkiMessage that failed verification or parsing, reported
//!   as 500 (the sender is unauthenticated, so no CertRep is emitted for it)
//! - `Operation` — a domain refusal from the CA backend, reported as a CertRep
//!   FAILURE carrying the failInfo
//! - `Internal` — faults while constructing the reply, reported as 500

use crate::types::FailInfo;
use thiserror::Error;

pub type ScepResult<T> = Result<T, ScepError>;

/// A domain refusal raised by the CA backend.
///
/// Carries the SCEP failInfo that the CertRep FAILURE reply will advertise,
/// plus a server-side reason that is logged but never sent to the client.
#[derive(Debug, Clone, Error)]
#[error("operation refused ({fail_info}): {reason}")]
pub struct OperationFailure {
    pub fail_info: FailInfo,
    pub reason: String,
}

impl OperationFailure {
    pub fn new(fail_info: FailInfo, reason: impl Into<String>) -> Self {
        Self {
            fail_info,
            reason: reason.into(),
        }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(FailInfo::BadRequest, reason)
    }

    pub fn bad_cert_id(reason: impl Into<String>) -> Self {
        Self::new(FailInfo::BadCertId, reason)
    }

    pub fn bad_message_check(reason: impl Into<String>) -> Self {
        Self::new(FailInfo::BadMessageCheck, reason)
    }
}

#[derive(Debug, Error)]
pub enum ScepError {
    /// Client sent something the HTTP surface cannot route.
    #[error("{0}")]
    ProtocolInput(String),

    /// Wrong HTTP method for the requested operation.
    #[error("method not allowed, expected {allow}")]
    MethodNotAllowed { allow: &'static str },

    /// The pkiMessage failed CMS parsing, signature verification, attribute
    /// extraction, or inner decryption.
    #[error("pkiMessage decoding failed: {0}")]
    MessageDecoding(String),

    /// Backend domain refusal; mapped to CertRep FAILURE by the handler.
    #[error(transparent)]
    Operation(#[from] OperationFailure),

    /// Crypto or encoding fault while building the reply.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScepError {
    pub fn decoding(context: &str, err: impl std::fmt::Display) -> Self {
        ScepError::MessageDecoding(format!("{context}: {err}"))
    }

    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        ScepError::Internal(format!("{context}: {err}"))
    }

    /// HTTP status this error surfaces as when it escapes to the dispatcher.
    pub fn status_code(&self) -> u16 {
        match self {
            ScepError::ProtocolInput(_) => 400,
            ScepError::MethodNotAllowed { .. } => 405,
            ScepError::MessageDecoding(_) => 500,
            ScepError::Operation(_) => 200,
            ScepError::Internal(_) => 500,
        }
    }
}

impl From<der::Error> for ScepError {
    fn from(err: der::Error) -> Self {
        ScepError::MessageDecoding(format!("ASN.1 error: {err}"))
    }
}
