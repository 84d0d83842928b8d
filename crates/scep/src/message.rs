//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! pkiMessage codec: the signed-and-enveloped CMS layer of SCEP.
//!
//! Decoding verifies the outer SignedData against the signer certificate it
//! carries, reads the SCEP signed attributes, decrypts the inner EnvelopedData
//! with the recipient identity, and produces a typed [`PkiMessage`].
//!
//! Encoding builds a CertRep: the inner reply (if any) is enveloped to the
//! request's signer certificate, then wrapped in a SignedData signed by the
//! server identity with the SCEP attributes echoing transaction id and nonce.

use crate::asn1::{self, IssuerAndSubject};
use crate::crypto;
use crate::envelope::{self, ContentAlgorithm};
use crate::error::{ScepError, ScepResult};
use crate::oid;
use crate::types::{FailInfo, MessageType, Nonce, PkiStatus, TransactionId};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::CmsVersion;
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
};
use der::asn1::{
    GeneralizedTime, ObjectIdentifier, OctetString, PrintableString, PrintableStringRef, SetOfVec,
    UtcTime,
};
use der::{Any, Decode, Encode};
use rand::{CryptoRng, RngCore};
use rsa::RsaPrivateKey;
use spki::AlgorithmIdentifierOwned;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use x509_cert::attr::Attribute;
use x509_cert::request::CertReq;
use x509_cert::Certificate;

/// A decoded client request or server reply.
#[derive(Debug, Clone)]
pub enum PkiMessage {
    PkcsReq {
        trans_id: TransactionId,
        sender_nonce: Option<Nonce>,
        csr: CertReq,
    },
    RenewalReq {
        trans_id: TransactionId,
        sender_nonce: Option<Nonce>,
        csr: CertReq,
    },
    GetCert {
        trans_id: TransactionId,
        sender_nonce: Option<Nonce>,
        iasn: IssuerAndSerialNumber,
    },
    GetCertInitial {
        trans_id: TransactionId,
        sender_nonce: Option<Nonce>,
        ias: IssuerAndSubject,
    },
    GetCrl {
        trans_id: TransactionId,
        sender_nonce: Option<Nonce>,
        iasn: IssuerAndSerialNumber,
    },
    CertRep(CertRep),
}

impl PkiMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            PkiMessage::PkcsReq { .. } => MessageType::PkcsReq,
            PkiMessage::RenewalReq { .. } => MessageType::RenewalReq,
            PkiMessage::GetCert { .. } => MessageType::GetCert,
            PkiMessage::GetCertInitial { .. } => MessageType::GetCertInitial,
            PkiMessage::GetCrl { .. } => MessageType::GetCrl,
            PkiMessage::CertRep(_) => MessageType::CertRep,
        }
    }

    pub fn trans_id(&self) -> &TransactionId {
        match self {
            PkiMessage::PkcsReq { trans_id, .. }
            | PkiMessage::RenewalReq { trans_id, .. }
            | PkiMessage::GetCert { trans_id, .. }
            | PkiMessage::GetCertInitial { trans_id, .. }
            | PkiMessage::GetCrl { trans_id, .. } => trans_id,
            PkiMessage::CertRep(rep) => &rep.trans_id,
        }
    }

    pub fn sender_nonce(&self) -> Option<Nonce> {
        match self {
            PkiMessage::PkcsReq { sender_nonce, .. }
            | PkiMessage::RenewalReq { sender_nonce, .. }
            | PkiMessage::GetCert { sender_nonce, .. }
            | PkiMessage::GetCertInitial { sender_nonce, .. }
            | PkiMessage::GetCrl { sender_nonce, .. } => *sender_nonce,
            PkiMessage::CertRep(rep) => rep.sender_nonce,
        }
    }
}

/// The server-to-client reply.
///
/// When built for encoding, `sender_nonce` is normally `None` and a fresh
/// nonce is drawn from the encoder's RNG; a decoded CertRep carries the nonce
/// read off the wire.
#[derive(Debug, Clone)]
pub struct CertRep {
    pub trans_id: TransactionId,
    pub sender_nonce: Option<Nonce>,
    /// Echo of the request's senderNonce.
    pub recipient_nonce: Option<Nonce>,
    pub outcome: CertRepOutcome,
}

#[derive(Debug, Clone)]
pub enum CertRepOutcome {
    /// DER of the inner (degenerate) SignedData carrying certs or a CRL.
    Success(Vec<u8>),
    Pending,
    Failure(FailInfo),
}

impl CertRepOutcome {
    pub fn status(&self) -> PkiStatus {
        match self {
            CertRepOutcome::Success(_) => PkiStatus::Success,
            CertRepOutcome::Pending => PkiStatus::Pending,
            CertRepOutcome::Failure(_) => PkiStatus::Failure,
        }
    }
}

/// A decoded pkiMessage together with the certificate that signed it.
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    pub message: PkiMessage,
    /// The client's signing certificate, taken from the SignedData
    /// certificate set; the reply envelope is addressed to it.
    pub signer: Certificate,
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decoder bound to a recipient identity (the key that opens the envelopes).
pub struct MessageDecoder<'a> {
    recipient_cert: &'a Certificate,
    recipient_key: &'a RsaPrivateKey,
    check_signing_time: bool,
}

impl<'a> MessageDecoder<'a> {
    pub fn new(recipient_cert: &'a Certificate, recipient_key: &'a RsaPrivateKey) -> Self {
        Self {
            recipient_cert,
            recipient_key,
            check_signing_time: true,
        }
    }

    /// Skip validating the signed-attribute signing time against the signer
    /// certificate validity window. Default is strict checking.
    pub fn without_signing_time_check(mut self) -> Self {
        self.check_signing_time = false;
        self
    }

    pub fn decode(&self, bytes: &[u8]) -> ScepResult<DecodedMessage> {
        let signed_data = asn1::parse_signed_data(bytes)?;

        let mut signer_infos = signed_data.signer_infos.0.iter();
        let signer_info = signer_infos
            .next()
            .ok_or_else(|| ScepError::MessageDecoding("no signerInfo".into()))?;
        if signer_infos.next().is_some() {
            return Err(ScepError::MessageDecoding(
                "multiple signerInfos are not supported".into(),
            ));
        }

        let signer = find_signer_certificate(&signed_data, signer_info)?;
        let content = signed_data
            .encap_content_info
            .econtent
            .as_ref()
            .map(|any| any.value().to_vec())
            .unwrap_or_default();

        self.verify_signer(signer_info, &signer, &content)?;

        let attrs = signer_info
            .signed_attrs
            .as_ref()
            .ok_or_else(|| ScepError::MessageDecoding("missing signed attributes".into()))?;

        let message_type = required_numeric(attrs, &oid::SCEP_MESSAGE_TYPE, "messageType")?;
        let message_type = MessageType::from_wire(message_type).ok_or_else(|| {
            ScepError::MessageDecoding(format!("unknown messageType {message_type}"))
        })?;
        let trans_id = TransactionId::new(required_printable(
            attrs,
            &oid::SCEP_TRANS_ID,
            "transactionID",
        )?);
        // Tolerated when absent; some clients omit it.
        let sender_nonce = nonce_attr(attrs, &oid::SCEP_SENDER_NONCE)?;

        let message = match message_type {
            MessageType::CertRep => {
                PkiMessage::CertRep(self.decode_cert_rep(attrs, trans_id, sender_nonce, &content)?)
            }
            MessageType::PkcsReq => {
                let csr = CertReq::from_der(&self.open(&content)?)
                    .map_err(|e| ScepError::decoding("PKCS#10 request", e))?;
                PkiMessage::PkcsReq {
                    trans_id,
                    sender_nonce,
                    csr,
                }
            }
            MessageType::RenewalReq => {
                let csr = CertReq::from_der(&self.open(&content)?)
                    .map_err(|e| ScepError::decoding("PKCS#10 request", e))?;
                PkiMessage::RenewalReq {
                    trans_id,
                    sender_nonce,
                    csr,
                }
            }
            MessageType::GetCert => {
                let iasn = IssuerAndSerialNumber::from_der(&self.open(&content)?)
                    .map_err(|e| ScepError::decoding("IssuerAndSerialNumber", e))?;
                PkiMessage::GetCert {
                    trans_id,
                    sender_nonce,
                    iasn,
                }
            }
            MessageType::GetCrl => {
                let iasn = IssuerAndSerialNumber::from_der(&self.open(&content)?)
                    .map_err(|e| ScepError::decoding("IssuerAndSerialNumber", e))?;
                PkiMessage::GetCrl {
                    trans_id,
                    sender_nonce,
                    iasn,
                }
            }
            MessageType::GetCertInitial => {
                let ias = IssuerAndSubject::from_der(&self.open(&content)?)
                    .map_err(|e| ScepError::decoding("IssuerAndSubject", e))?;
                PkiMessage::GetCertInitial {
                    trans_id,
                    sender_nonce,
                    ias,
                }
            }
        };

        Ok(DecodedMessage { message, signer })
    }

    fn decode_cert_rep(
        &self,
        attrs: &SetOfVec<Attribute>,
        trans_id: TransactionId,
        sender_nonce: Option<Nonce>,
        content: &[u8],
    ) -> ScepResult<CertRep> {
        let status = required_numeric(attrs, &oid::SCEP_PKI_STATUS, "pkiStatus")?;
        let status = PkiStatus::from_wire(status)
            .ok_or_else(|| ScepError::MessageDecoding(format!("unknown pkiStatus {status}")))?;
        let recipient_nonce = nonce_attr(attrs, &oid::SCEP_RECIPIENT_NONCE)?;
        if recipient_nonce.is_none() {
            return Err(ScepError::MessageDecoding("missing recipientNonce".into()));
        }

        let outcome = match status {
            PkiStatus::Success => CertRepOutcome::Success(self.open(content)?),
            PkiStatus::Pending => CertRepOutcome::Pending,
            PkiStatus::Failure => {
                let fail_info = required_numeric(attrs, &oid::SCEP_FAIL_INFO, "failInfo")?;
                let fail_info = FailInfo::from_wire(fail_info).ok_or_else(|| {
                    ScepError::MessageDecoding(format!("unknown failInfo {fail_info}"))
                })?;
                CertRepOutcome::Failure(fail_info)
            }
        };

        Ok(CertRep {
            trans_id,
            sender_nonce,
            recipient_nonce,
            outcome,
        })
    }

    /// Decrypt the enveloped inner content with the recipient identity.
    fn open(&self, content: &[u8]) -> ScepResult<Vec<u8>> {
        if content.is_empty() {
            return Err(ScepError::MessageDecoding(
                "missing enveloped content".into(),
            ));
        }
        envelope::decrypt(self.recipient_cert, self.recipient_key, content)
    }

    fn verify_signer(
        &self,
        signer_info: &SignerInfo,
        signer: &Certificate,
        content: &[u8],
    ) -> ScepResult<()> {
        let attrs = signer_info
            .signed_attrs
            .as_ref()
            .ok_or_else(|| ScepError::MessageDecoding("missing signed attributes".into()))?;

        // The messageDigest attribute must match the encapsulated content.
        let expected = crypto::digest(&signer_info.digest_alg.oid, content)?;
        let message_digest = octet_attr(attrs, &oid::ID_MESSAGE_DIGEST)?
            .ok_or_else(|| ScepError::MessageDecoding("missing messageDigest".into()))?;
        if message_digest != expected {
            return Err(ScepError::MessageDecoding(
                "messageDigest does not match content".into(),
            ));
        }

        // The signature is computed over the DER of the attribute SET.
        let signed = attrs
            .to_der()
            .map_err(|e| ScepError::decoding("signed attributes", e))?;
        let public_key = crypto::public_key_from_cert(signer)?;
        crypto::verify_signature(
            &public_key,
            &signer_info.digest_alg.oid,
            &signed,
            signer_info.signature.as_bytes(),
        )?;

        if self.check_signing_time {
            check_signing_time(attrs, signer)?;
        }
        Ok(())
    }
}

fn find_signer_certificate(
    signed_data: &SignedData,
    signer_info: &SignerInfo,
) -> ScepResult<Certificate> {
    let iasn = match &signer_info.sid {
        SignerIdentifier::IssuerAndSerialNumber(iasn) => iasn,
        SignerIdentifier::SubjectKeyIdentifier(_) => {
            return Err(ScepError::MessageDecoding(
                "subjectKeyIdentifier signer references are not supported".into(),
            ))
        }
    };
    let set = signed_data
        .certificates
        .as_ref()
        .ok_or_else(|| ScepError::MessageDecoding("no certificates in signedData".into()))?;
    for choice in set.0.iter() {
        if let CertificateChoices::Certificate(cert) = choice {
            if cert.tbs_certificate.issuer == iasn.issuer
                && cert.tbs_certificate.serial_number == iasn.serial_number
            {
                return Ok(cert.clone());
            }
        }
    }
    Err(ScepError::MessageDecoding(
        "signer certificate not present in certificate set".into(),
    ))
}

/// Reject messages whose signingTime falls outside the signer certificate's
/// validity window. Absent signingTime passes.
fn check_signing_time(attrs: &SetOfVec<Attribute>, signer: &Certificate) -> ScepResult<()> {
    let Some(any) = find_attr(attrs, &oid::ID_SIGNING_TIME) else {
        return Ok(());
    };
    let signing_time = decode_time(any)?;
    let validity = &signer.tbs_certificate.validity;
    let not_before = validity.not_before.to_unix_duration();
    let not_after = validity.not_after.to_unix_duration();
    if signing_time < not_before || signing_time > not_after {
        return Err(ScepError::MessageDecoding(
            "signingTime outside signer certificate validity".into(),
        ));
    }
    Ok(())
}

fn decode_time(any: &Any) -> ScepResult<Duration> {
    if let Ok(utc) = any.decode_as::<UtcTime>() {
        return Ok(utc.to_unix_duration());
    }
    let generalized = any
        .decode_as::<GeneralizedTime>()
        .map_err(|e| ScepError::decoding("signingTime", e))?;
    Ok(generalized.to_unix_duration())
}

// ---------------------------------------------------------------------------
// Signed attribute access
// ---------------------------------------------------------------------------

fn find_attr<'a>(attrs: &'a SetOfVec<Attribute>, wanted: &ObjectIdentifier) -> Option<&'a Any> {
    attrs
        .iter()
        .find(|attr| attr.oid == *wanted)
        .and_then(|attr| attr.values.iter().next())
}

fn printable_attr(
    attrs: &SetOfVec<Attribute>,
    wanted: &ObjectIdentifier,
) -> ScepResult<Option<String>> {
    match find_attr(attrs, wanted) {
        None => Ok(None),
        Some(any) => {
            let value = PrintableStringRef::try_from(any)
                .map_err(|e| ScepError::decoding("printable attribute", e))?;
            Ok(Some(value.as_str().to_owned()))
        }
    }
}

fn required_printable(
    attrs: &SetOfVec<Attribute>,
    wanted: &ObjectIdentifier,
    name: &str,
) -> ScepResult<String> {
    printable_attr(attrs, wanted)?
        .ok_or_else(|| ScepError::MessageDecoding(format!("missing {name} attribute")))
}

fn required_numeric(
    attrs: &SetOfVec<Attribute>,
    wanted: &ObjectIdentifier,
    name: &str,
) -> ScepResult<u8> {
    let text = required_printable(attrs, wanted, name)?;
    text.parse::<u8>()
        .map_err(|_| ScepError::MessageDecoding(format!("non-numeric {name} attribute: {text}")))
}

fn octet_attr(
    attrs: &SetOfVec<Attribute>,
    wanted: &ObjectIdentifier,
) -> ScepResult<Option<Vec<u8>>> {
    match find_attr(attrs, wanted) {
        None => Ok(None),
        Some(any) => {
            let value = any
                .decode_as::<OctetString>()
                .map_err(|e| ScepError::decoding("octet attribute", e))?;
            Ok(Some(value.as_bytes().to_vec()))
        }
    }
}

fn nonce_attr(attrs: &SetOfVec<Attribute>, wanted: &ObjectIdentifier) -> ScepResult<Option<Nonce>> {
    match octet_attr(attrs, wanted)? {
        None => Ok(None),
        Some(bytes) => Nonce::from_slice(&bytes)
            .map(Some)
            .ok_or_else(|| ScepError::MessageDecoding("nonce is not 16 octets".into())),
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Server identity used to sign outgoing CertReps.
pub struct SigningIdentity<'a> {
    pub certificate: &'a Certificate,
    pub key: &'a RsaPrivateKey,
    /// Full chain placed in the reply's certificate set, signer first.
    pub chain: &'a [Certificate],
}

/// Encode a CertRep for `recipient` (the request's signer certificate).
///
/// SUCCESS replies envelope the inner SignedData to the recipient with
/// `algorithm`; PENDING and FAILURE replies carry no encapsulated content.
/// A fresh senderNonce is drawn from `rng` unless the reply pins one.
pub fn encode_cert_rep(
    reply: &CertRep,
    recipient: &Certificate,
    identity: &SigningIdentity<'_>,
    algorithm: ContentAlgorithm,
    rng: &mut (impl RngCore + CryptoRng),
) -> ScepResult<Vec<u8>> {
    let econtent = match &reply.outcome {
        CertRepOutcome::Success(inner) => {
            let enveloped = envelope::encrypt(recipient, inner, algorithm, &mut *rng)?;
            let octets =
                OctetString::new(enveloped).map_err(|e| ScepError::internal("content", e))?;
            Some(Any::encode_from(&octets).map_err(|e| ScepError::internal("content wrap", e))?)
        }
        CertRepOutcome::Pending | CertRepOutcome::Failure(_) => None,
    };
    let content_bytes = econtent
        .as_ref()
        .map(|any| any.value().to_vec())
        .unwrap_or_default();

    let sender_nonce = reply
        .sender_nonce
        .unwrap_or_else(|| Nonce::generate(rng));

    let mut attrs: SetOfVec<Attribute> = SetOfVec::new();
    push_attr(
        &mut attrs,
        oid::ID_CONTENT_TYPE,
        Any::encode_from(&oid::ID_DATA).map_err(|e| ScepError::internal("contentType", e))?,
    )?;
    push_attr(
        &mut attrs,
        oid::ID_MESSAGE_DIGEST,
        octet_value(&crypto::digest(&oid::ID_SHA256, &content_bytes)?)?,
    )?;
    push_attr(&mut attrs, oid::ID_SIGNING_TIME, now_utc_value()?)?;
    push_attr(
        &mut attrs,
        oid::SCEP_MESSAGE_TYPE,
        printable_value(&MessageType::CertRep.as_wire().to_string())?,
    )?;
    push_attr(
        &mut attrs,
        oid::SCEP_PKI_STATUS,
        printable_value(&reply.outcome.status().as_wire().to_string())?,
    )?;
    if let CertRepOutcome::Failure(fail_info) = &reply.outcome {
        push_attr(
            &mut attrs,
            oid::SCEP_FAIL_INFO,
            printable_value(&fail_info.as_wire().to_string())?,
        )?;
    }
    push_attr(
        &mut attrs,
        oid::SCEP_TRANS_ID,
        printable_value(reply.trans_id.as_str())?,
    )?;
    push_attr(
        &mut attrs,
        oid::SCEP_SENDER_NONCE,
        octet_value(sender_nonce.as_bytes())?,
    )?;
    if let Some(recipient_nonce) = &reply.recipient_nonce {
        push_attr(
            &mut attrs,
            oid::SCEP_RECIPIENT_NONCE,
            octet_value(recipient_nonce.as_bytes())?,
        )?;
    }

    let signed = attrs
        .to_der()
        .map_err(|e| ScepError::internal("signed attributes", e))?;
    let signature = crypto::sign_sha256(identity.key, &signed)?;

    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(asn1::issuer_and_serial(identity.certificate)),
        digest_alg: AlgorithmIdentifierOwned {
            oid: oid::ID_SHA256,
            parameters: None,
        },
        signed_attrs: Some(attrs),
        signature_algorithm: AlgorithmIdentifierOwned {
            oid: oid::RSA_ENCRYPTION,
            parameters: Some(Any::null()),
        },
        signature: OctetString::new(signature).map_err(|e| ScepError::internal("signature", e))?,
        unsigned_attrs: None,
    };

    let mut digest_algorithms = SetOfVec::new();
    digest_algorithms
        .insert(AlgorithmIdentifierOwned {
            oid: oid::ID_SHA256,
            parameters: None,
        })
        .map_err(|e| ScepError::internal("digest algorithms", e))?;

    let mut certificates = SetOfVec::new();
    let chain: &[Certificate] = if identity.chain.is_empty() {
        std::slice::from_ref(identity.certificate)
    } else {
        identity.chain
    };
    for cert in chain {
        certificates
            .insert(CertificateChoices::Certificate(cert.clone()))
            .map_err(|e| ScepError::internal("certificate set", e))?;
    }

    let mut signer_infos = SetOfVec::new();
    signer_infos
        .insert(signer_info)
        .map_err(|e| ScepError::internal("signer infos", e))?;

    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms,
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: oid::ID_DATA,
            econtent,
        },
        certificates: Some(CertificateSet(certificates)),
        crls: None,
        signer_infos: SignerInfos(signer_infos),
    };

    asn1::encode_signed_data(&signed_data)
}

/// Sign a certificate set with no encapsulated content.
///
/// This is the GetNextCACert response shape: the next CA chain travels in the
/// certificate set of a SignedData signed by the current server identity, so
/// clients can authenticate the rollover chain against the key they already
/// trust.
pub fn encode_signed_cert_set(
    certs: &[Certificate],
    identity: &SigningIdentity<'_>,
) -> ScepResult<Vec<u8>> {
    let mut attrs: SetOfVec<Attribute> = SetOfVec::new();
    push_attr(
        &mut attrs,
        oid::ID_CONTENT_TYPE,
        Any::encode_from(&oid::ID_DATA).map_err(|e| ScepError::internal("contentType", e))?,
    )?;
    push_attr(
        &mut attrs,
        oid::ID_MESSAGE_DIGEST,
        octet_value(&crypto::digest(&oid::ID_SHA256, &[])?)?,
    )?;
    push_attr(&mut attrs, oid::ID_SIGNING_TIME, now_utc_value()?)?;

    let signed = attrs
        .to_der()
        .map_err(|e| ScepError::internal("signed attributes", e))?;
    let signature = crypto::sign_sha256(identity.key, &signed)?;

    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(asn1::issuer_and_serial(identity.certificate)),
        digest_alg: AlgorithmIdentifierOwned {
            oid: oid::ID_SHA256,
            parameters: None,
        },
        signed_attrs: Some(attrs),
        signature_algorithm: AlgorithmIdentifierOwned {
            oid: oid::RSA_ENCRYPTION,
            parameters: Some(Any::null()),
        },
        signature: OctetString::new(signature).map_err(|e| ScepError::internal("signature", e))?,
        unsigned_attrs: None,
    };

    let mut digest_algorithms = SetOfVec::new();
    digest_algorithms
        .insert(AlgorithmIdentifierOwned {
            oid: oid::ID_SHA256,
            parameters: None,
        })
        .map_err(|e| ScepError::internal("digest algorithms", e))?;

    let mut certificates = SetOfVec::new();
    certificates
        .insert(CertificateChoices::Certificate(identity.certificate.clone()))
        .map_err(|e| ScepError::internal("certificate set", e))?;
    for cert in certs {
        certificates
            .insert(CertificateChoices::Certificate(cert.clone()))
            .map_err(|e| ScepError::internal("certificate set", e))?;
    }

    let mut signer_infos = SetOfVec::new();
    signer_infos
        .insert(signer_info)
        .map_err(|e| ScepError::internal("signer infos", e))?;

    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms,
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: oid::ID_DATA,
            econtent: None,
        },
        certificates: Some(CertificateSet(certificates)),
        crls: None,
        signer_infos: SignerInfos(signer_infos),
    };

    asn1::encode_signed_data(&signed_data)
}

fn push_attr(
    attrs: &mut SetOfVec<Attribute>,
    oid: ObjectIdentifier,
    value: Any,
) -> ScepResult<()> {
    let values =
        SetOfVec::try_from(vec![value]).map_err(|e| ScepError::internal("attribute value", e))?;
    attrs
        .insert(Attribute { oid, values })
        .map_err(|e| ScepError::internal("attribute", e))
}

fn printable_value(text: &str) -> ScepResult<Any> {
    let value =
        PrintableString::new(text).map_err(|e| ScepError::internal("printable string", e))?;
    Any::encode_from(&value).map_err(|e| ScepError::internal("printable string", e))
}

fn octet_value(bytes: &[u8]) -> ScepResult<Any> {
    let value =
        OctetString::new(bytes.to_vec()).map_err(|e| ScepError::internal("octet string", e))?;
    Any::encode_from(&value).map_err(|e| ScepError::internal("octet string", e))
}

fn now_utc_value() -> ScepResult<Any> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| ScepError::internal("clock", e))?;
    let time = UtcTime::from_unix_duration(now).map_err(|e| ScepError::internal("signingTime", e))?;
    Any::encode_from(&time).map_err(|e| ScepError::internal("signingTime", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;
    use rand::rngs::OsRng;

    #[test]
    fn test_cert_rep_pending_roundtrip() {
        let server = testkit::TestCa::generate("CN=SCEP Server");
        let client = testkit::TestClient::generate("CN=client", server.certificate());

        let request_nonce = Nonce::generate(&mut OsRng);
        let reply = CertRep {
            trans_id: TransactionId::new("transaction-0001"),
            sender_nonce: None,
            recipient_nonce: Some(request_nonce),
            outcome: CertRepOutcome::Pending,
        };
        let der = encode_cert_rep(
            &reply,
            client.certificate(),
            &server.signing_identity(),
            ContentAlgorithm::DesEde3Cbc,
            &mut OsRng,
        )
        .expect("encode");

        let decoded = client.decode_reply(&der).expect("decode");
        assert_eq!(decoded.trans_id.as_str(), "transaction-0001");
        assert_eq!(decoded.recipient_nonce, Some(request_nonce));
        assert!(decoded.sender_nonce.is_some());
        assert!(matches!(decoded.outcome, CertRepOutcome::Pending));
    }

    #[test]
    fn test_cert_rep_failure_carries_fail_info() {
        let server = testkit::TestCa::generate("CN=SCEP Server");
        let client = testkit::TestClient::generate("CN=client", server.certificate());

        let reply = CertRep {
            trans_id: TransactionId::new("transaction-0002"),
            sender_nonce: None,
            recipient_nonce: Some(Nonce::generate(&mut OsRng)),
            outcome: CertRepOutcome::Failure(FailInfo::BadCertId),
        };
        let der = encode_cert_rep(
            &reply,
            client.certificate(),
            &server.signing_identity(),
            ContentAlgorithm::DesEde3Cbc,
            &mut OsRng,
        )
        .expect("encode");

        let decoded = client.decode_reply(&der).expect("decode");
        match decoded.outcome {
            CertRepOutcome::Failure(info) => assert_eq!(info, FailInfo::BadCertId),
            other => panic!("expected failure outcome, got {other:?}"),
        }
    }

    #[test]
    fn test_cert_rep_success_envelopes_to_recipient() {
        let server = testkit::TestCa::generate("CN=SCEP Server");
        let client = testkit::TestClient::generate("CN=client", server.certificate());
        let inner = asn1::degenerate_certs(std::slice::from_ref(server.certificate()))
            .expect("degenerate");

        let reply = CertRep {
            trans_id: TransactionId::new("transaction-0003"),
            sender_nonce: None,
            recipient_nonce: Some(Nonce::generate(&mut OsRng)),
            outcome: CertRepOutcome::Success(inner.clone()),
        };
        let der = encode_cert_rep(
            &reply,
            client.certificate(),
            &server.signing_identity(),
            ContentAlgorithm::DesEde3Cbc,
            &mut OsRng,
        )
        .expect("encode");

        let decoded = client.decode_reply(&der).expect("decode");
        match decoded.outcome {
            CertRepOutcome::Success(recovered) => assert_eq!(recovered, inner),
            other => panic!("expected success outcome, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_wrong_signature() {
        let server = testkit::TestCa::generate("CN=SCEP Server");
        let client = testkit::TestClient::generate("CN=client", server.certificate());

        let mut der = client
            .pkcs_req("CN=device", Some("password"), "transaction-0004")
            .expect("request");
        // Flip a byte near the end, inside the signature value.
        let index = der.len() - 10;
        der[index] ^= 0xff;

        let decoder = MessageDecoder::new(server.certificate(), server.key());
        assert!(decoder.decode(&der).is_err());
    }

    #[test]
    fn test_decode_request_extracts_attributes() {
        let server = testkit::TestCa::generate("CN=SCEP Server");
        let client = testkit::TestClient::generate("CN=client", server.certificate());

        let der = client
            .pkcs_req("CN=device", Some("password"), "transaction-0005")
            .expect("request");
        let decoder = MessageDecoder::new(server.certificate(), server.key());
        let decoded = decoder.decode(&der).expect("decode");

        assert_eq!(decoded.message.message_type(), MessageType::PkcsReq);
        assert_eq!(decoded.message.trans_id().as_str(), "transaction-0005");
        assert!(decoded.message.sender_nonce().is_some());
        match decoded.message {
            PkiMessage::PkcsReq { csr, .. } => {
                assert_eq!(
                    testkit::subject_string(&csr.info.subject),
                    "CN=device".to_string()
                );
            }
            other => panic!("expected PKCSReq, got {:?}", other.message_type()),
        }
    }
}
