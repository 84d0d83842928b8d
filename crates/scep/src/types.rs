//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Core SCEP protocol vocabulary: operations, message types, status codes,
//! transaction ids, nonces, and capability tokens.
//!
//! Numeric wire values are carried as PrintableString decimals inside signed
//! attributes; the enums here hold the numeric identity and the codec does the
//! string conversion.

use rand::{CryptoRng, RngCore};
use std::fmt;

/// HTTP-level SCEP operation, selected by the `operation` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetCaCaps,
    GetCaCert,
    GetNextCaCert,
    PkiOperation,
}

impl Operation {
    /// Parse the `operation` query parameter, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "getcacaps" => Some(Operation::GetCaCaps),
            "getcacert" => Some(Operation::GetCaCert),
            "getnextcacert" => Some(Operation::GetNextCaCert),
            "pkioperation" => Some(Operation::PkiOperation),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::GetCaCaps => "GetCACaps",
            Operation::GetCaCert => "GetCACert",
            Operation::GetNextCaCert => "GetNextCACert",
            Operation::PkiOperation => "PKIOperation",
        };
        f.write_str(name)
    }
}

/// SCEP messageType signed attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    CertRep = 3,
    RenewalReq = 17,
    PkcsReq = 19,
    GetCertInitial = 20,
    GetCert = 21,
    GetCrl = 22,
}

impl MessageType {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            3 => Some(MessageType::CertRep),
            17 => Some(MessageType::RenewalReq),
            19 => Some(MessageType::PkcsReq),
            20 => Some(MessageType::GetCertInitial),
            21 => Some(MessageType::GetCert),
            22 => Some(MessageType::GetCrl),
            _ => None,
        }
    }

    pub fn as_wire(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::CertRep => "CertRep",
            MessageType::RenewalReq => "RenewalReq",
            MessageType::PkcsReq => "PKCSReq",
            MessageType::GetCertInitial => "GetCertInitial",
            MessageType::GetCert => "GetCert",
            MessageType::GetCrl => "GetCRL",
        };
        f.write_str(name)
    }
}

/// SCEP pkiStatus signed attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PkiStatus {
    Success = 0,
    Failure = 2,
    Pending = 3,
}

impl PkiStatus {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(PkiStatus::Success),
            2 => Some(PkiStatus::Failure),
            3 => Some(PkiStatus::Pending),
            _ => None,
        }
    }

    pub fn as_wire(self) -> u8 {
        self as u8
    }
}

/// SCEP failInfo signed attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FailInfo {
    BadAlg = 0,
    BadMessageCheck = 1,
    BadRequest = 2,
    BadTime = 3,
    BadCertId = 4,
}

impl FailInfo {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(FailInfo::BadAlg),
            1 => Some(FailInfo::BadMessageCheck),
            2 => Some(FailInfo::BadRequest),
            3 => Some(FailInfo::BadTime),
            4 => Some(FailInfo::BadCertId),
            _ => None,
        }
    }

    pub fn as_wire(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for FailInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailInfo::BadAlg => "badAlg",
            FailInfo::BadMessageCheck => "badMessageCheck",
            FailInfo::BadRequest => "badRequest",
            FailInfo::BadTime => "badTime",
            FailInfo::BadCertId => "badCertId",
        };
        f.write_str(name)
    }
}

/// Client-chosen transaction identifier, echoed verbatim in every reply.
///
/// Opaque printable-string octets; the server never interprets the contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 16 random octets binding a request to its reply.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Nonce([u8; 16]);

impl Nonce {
    pub const LEN: usize = 16;

    /// Generate a fresh nonce from the given CSPRNG.
    ///
    /// The RNG is a caller-supplied dependency so tests can be deterministic.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let mut bytes = [0u8; Self::LEN];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; Self::LEN]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", hex::encode(self.0))
    }
}

/// A single GetCACaps capability token (closed vocabulary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
    GetNextCaCert,
    PostPkiOperation,
    Renewal,
    Sha1,
    Sha256,
    Sha512,
    Des3,
    Aes,
    ScepStandard,
}

impl Capability {
    pub fn token(self) -> &'static str {
        match self {
            Capability::GetNextCaCert => "GetNextCACert",
            Capability::PostPkiOperation => "POSTPKIOperation",
            Capability::Renewal => "Renewal",
            Capability::Sha1 => "SHA-1",
            Capability::Sha256 => "SHA-256",
            Capability::Sha512 => "SHA-512",
            Capability::Des3 => "DES3",
            Capability::Aes => "AES",
            Capability::ScepStandard => "SCEPStandard",
        }
    }
}

/// Ordered, de-duplicated set of capability tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(Vec<Capability>);

impl Capabilities {
    pub fn new(caps: impl IntoIterator<Item = Capability>) -> Self {
        let mut caps: Vec<Capability> = caps.into_iter().collect();
        caps.sort();
        caps.dedup();
        Self(caps)
    }

    pub fn contains(&self, cap: Capability) -> bool {
        self.0.contains(&cap)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    /// Wire rendering: each token followed by a newline.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for cap in &self.0 {
            out.push_str(cap.token());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_operation_parse_is_case_insensitive() {
        assert_eq!(Operation::parse("GetCACaps"), Some(Operation::GetCaCaps));
        assert_eq!(Operation::parse("getcacert"), Some(Operation::GetCaCert));
        assert_eq!(
            Operation::parse("PKIOPERATION"),
            Some(Operation::PkiOperation)
        );
        assert_eq!(Operation::parse("GetNextCACert"), Some(Operation::GetNextCaCert));
        assert_eq!(Operation::parse("Enroll"), None);
        assert_eq!(Operation::parse(""), None);
    }

    #[test]
    fn test_message_type_wire_roundtrip() {
        for mt in [
            MessageType::CertRep,
            MessageType::RenewalReq,
            MessageType::PkcsReq,
            MessageType::GetCertInitial,
            MessageType::GetCert,
            MessageType::GetCrl,
        ] {
            assert_eq!(MessageType::from_wire(mt.as_wire()), Some(mt));
        }
        assert_eq!(MessageType::from_wire(42), None);
    }

    #[test]
    fn test_fail_info_wire_values() {
        assert_eq!(FailInfo::BadAlg.as_wire(), 0);
        assert_eq!(FailInfo::BadMessageCheck.as_wire(), 1);
        assert_eq!(FailInfo::BadRequest.as_wire(), 2);
        assert_eq!(FailInfo::BadTime.as_wire(), 3);
        assert_eq!(FailInfo::BadCertId.as_wire(), 4);
    }

    #[test]
    fn test_nonce_generation_is_not_constant() {
        let a = Nonce::generate(&mut OsRng);
        let b = Nonce::generate(&mut OsRng);
        assert_ne!(a, b);
    }

    #[test]
    fn test_nonce_from_slice_rejects_wrong_length() {
        assert!(Nonce::from_slice(&[0u8; 16]).is_some());
        assert!(Nonce::from_slice(&[0u8; 15]).is_none());
        assert!(Nonce::from_slice(&[0u8; 17]).is_none());
    }

    #[test]
    fn test_capabilities_render_newline_terminated() {
        let caps = Capabilities::new([Capability::Aes, Capability::Renewal, Capability::Aes]);
        let rendered = caps.render();
        assert_eq!(rendered, "Renewal\nAES\n");
        assert!(caps.contains(Capability::Renewal));
        assert!(!caps.contains(Capability::Des3));
    }
}
