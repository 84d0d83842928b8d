//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! ASN.1 glue the `cms`/`x509-cert` types do not provide directly.
//!
//! Covers the SCEP-specific `IssuerAndSubject` structure, degenerate
//! SignedData construction (certificate or CRL carriers with no signer),
//! and ContentInfo wrapping/unwrapping.

use crate::error::{ScepError, ScepResult};
use crate::oid;
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::revocation::{RevocationInfoChoice, RevocationInfoChoices};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerInfos,
};
use der::asn1::SetOfVec;
use der::{Any, Decode, Encode, Sequence};
use x509_cert::crl::CertificateList;
use x509_cert::name::Name;
use x509_cert::Certificate;

/// IssuerAndSubject ::= SEQUENCE { issuer Name, subject Name }
///
/// Identifies a pending enrolment in a GetCertInitial poll.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct IssuerAndSubject {
    pub issuer: Name,
    pub subject: Name,
}

/// The IssuerAndSerialNumber that names `cert` on the wire.
pub fn issuer_and_serial(cert: &Certificate) -> IssuerAndSerialNumber {
    IssuerAndSerialNumber {
        issuer: cert.tbs_certificate.issuer.clone(),
        serial_number: cert.tbs_certificate.serial_number.clone(),
    }
}

/// Parse outer bytes as a ContentInfo-wrapped SignedData.
pub fn parse_signed_data(bytes: &[u8]) -> ScepResult<SignedData> {
    let content_info =
        ContentInfo::from_der(bytes).map_err(|e| ScepError::decoding("ContentInfo", e))?;
    if content_info.content_type != oid::ID_SIGNED_DATA {
        return Err(ScepError::MessageDecoding(format!(
            "expected signedData, got {}",
            content_info.content_type
        )));
    }
    content_info
        .content
        .decode_as::<SignedData>()
        .map_err(|e| ScepError::decoding("SignedData", e))
}

/// Wrap a SignedData in its ContentInfo and emit DER.
pub fn encode_signed_data(signed_data: &SignedData) -> ScepResult<Vec<u8>> {
    let content_info = ContentInfo {
        content_type: oid::ID_SIGNED_DATA,
        content: Any::encode_from(signed_data)
            .map_err(|e| ScepError::internal("SignedData wrap", e))?,
    };
    content_info
        .to_der()
        .map_err(|e| ScepError::internal("ContentInfo encode", e))
}

/// Certificates carried in a SignedData certificate set, in iteration order.
pub fn certificates_of(signed_data: &SignedData) -> Vec<Certificate> {
    let mut certs = Vec::new();
    if let Some(set) = &signed_data.certificates {
        for choice in set.0.iter() {
            if let CertificateChoices::Certificate(cert) = choice {
                certs.push(cert.clone());
            }
        }
    }
    certs
}

/// Build a degenerate SignedData carrying only a certificate set.
///
/// No signer, no content; the standard CMS vehicle for shipping a chain.
pub fn degenerate_certs(certs: &[Certificate]) -> ScepResult<Vec<u8>> {
    let mut set = SetOfVec::new();
    for cert in certs {
        set.insert(CertificateChoices::Certificate(cert.clone()))
            .map_err(|e| ScepError::internal("certificate set", e))?;
    }
    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::new(),
        encap_content_info: empty_content(),
        certificates: Some(CertificateSet(set)),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::new()),
    };
    encode_signed_data(&signed_data)
}

/// Build a degenerate SignedData carrying a CRL set.
///
/// `crl` may be absent; the CRL set is then empty, which clients treat as
/// "no revocations published".
pub fn degenerate_crl(crl: Option<&CertificateList>) -> ScepResult<Vec<u8>> {
    let crls = match crl {
        Some(crl) => {
            let mut set = SetOfVec::new();
            set.insert(RevocationInfoChoice::Crl(crl.clone()))
                .map_err(|e| ScepError::internal("CRL set", e))?;
            Some(RevocationInfoChoices(set))
        }
        None => Some(RevocationInfoChoices(SetOfVec::new())),
    };
    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::new(),
        encap_content_info: empty_content(),
        certificates: None,
        crls,
        signer_infos: SignerInfos(SetOfVec::new()),
    };
    encode_signed_data(&signed_data)
}

fn empty_content() -> EncapsulatedContentInfo {
    EncapsulatedContentInfo {
        econtent_type: oid::ID_DATA,
        econtent: None,
    }
}
