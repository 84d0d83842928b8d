//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Test PKI fixtures and a minimal SCEP client.
//!
//! Everything a test needs to exercise the server end-to-end: throwaway RSA
//! identities, a self-signed CA that can issue leaf certificates, a client
//! that builds signed-and-enveloped pkiMessages and decodes CertRep replies,
//! and a `CaBackend` with a simple challenge-password policy.

use crate::asn1::IssuerAndSubject;
use crate::backend::CaBackend;
use crate::crypto;
use crate::envelope::{self, ContentAlgorithm};
use crate::error::{OperationFailure, ScepError, ScepResult};
use crate::message::{CertRep, MessageDecoder, PkiMessage, SigningIdentity};
use crate::oid;
use crate::types::{Capabilities, Capability, MessageType, Nonce, TransactionId};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::CmsVersion;
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
};
use der::asn1::{
    BitString, ObjectIdentifier, OctetString, PrintableString, PrintableStringRef, SetOfVec,
    UtcTime, Utf8StringRef,
};
use der::{Any, Encode};
use rand::rngs::OsRng;
use rsa::pkcs8::EncodePublicKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use x509_cert::attr::Attribute;
use x509_cert::certificate::{TbsCertificate, Version};
use x509_cert::crl::CertificateList;
use x509_cert::name::Name;
use x509_cert::request::{CertReq, CertReqInfo};
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::{Time, Validity};
use x509_cert::Certificate;

/// Small keys keep debug-mode keygen within test budgets.
const TEST_KEY_BITS: usize = 1024;

static SERIAL: AtomicU64 = AtomicU64::new(2);

pub fn name(value: &str) -> Name {
    Name::from_str(value).expect("RFC 4514 name")
}

pub fn subject_string(value: &Name) -> String {
    value.to_string()
}

fn next_serial() -> Vec<u8> {
    let value = SERIAL.fetch_add(1, Ordering::Relaxed);
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    bytes[first..].to_vec()
}

fn spki_of(key: &RsaPublicKey) -> SubjectPublicKeyInfoOwned {
    let der = key.to_public_key_der().expect("SPKI encode");
    use der::Decode;
    SubjectPublicKeyInfoOwned::from_der(der.as_bytes()).expect("SPKI decode")
}

fn validity_window() -> Validity {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch");
    window(now - Duration::from_secs(300), now + Duration::from_secs(365 * 24 * 3600))
}

/// Validity window that ended a year ago.
fn expired_window() -> Validity {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch");
    window(
        now - Duration::from_secs(2 * 365 * 24 * 3600),
        now - Duration::from_secs(365 * 24 * 3600),
    )
}

fn window(not_before: Duration, not_after: Duration) -> Validity {
    Validity {
        not_before: Time::UtcTime(UtcTime::from_unix_duration(not_before).expect("time")),
        not_after: Time::UtcTime(UtcTime::from_unix_duration(not_after).expect("time")),
    }
}

fn build_certificate(
    issuer: &Name,
    subject: &Name,
    spki: SubjectPublicKeyInfoOwned,
    signing_key: &RsaPrivateKey,
) -> Certificate {
    build_certificate_with_validity(issuer, subject, spki, signing_key, validity_window())
}

fn build_certificate_with_validity(
    issuer: &Name,
    subject: &Name,
    spki: SubjectPublicKeyInfoOwned,
    signing_key: &RsaPrivateKey,
    validity: Validity,
) -> Certificate {
    let algorithm = AlgorithmIdentifierOwned {
        oid: oid::SHA256_WITH_RSA,
        parameters: Some(Any::null()),
    };
    let tbs = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(&next_serial()).expect("serial"),
        signature: algorithm.clone(),
        issuer: issuer.clone(),
        validity,
        subject: subject.clone(),
        subject_public_key_info: spki,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
    };
    let tbs_der = tbs.to_der().expect("TBS encode");
    let signature = crypto::sign_sha256(signing_key, &tbs_der).expect("TBS sign");
    Certificate {
        tbs_certificate: tbs,
        signature_algorithm: algorithm,
        signature: BitString::from_bytes(&signature).expect("signature bits"),
    }
}

// ---------------------------------------------------------------------------
// TestCa
// ---------------------------------------------------------------------------

/// Self-signed CA with an RSA key; doubles as the server identity.
pub struct TestCa {
    key: RsaPrivateKey,
    cert: Certificate,
}

impl TestCa {
    pub fn generate(subject: &str) -> Self {
        let key = RsaPrivateKey::new(&mut OsRng, TEST_KEY_BITS).expect("RSA keygen");
        let subject = name(subject);
        let cert = build_certificate(&subject, &subject, spki_of(&key.to_public_key()), &key);
        Self { key, cert }
    }

    pub fn certificate(&self) -> &Certificate {
        &self.cert
    }

    pub fn key(&self) -> &RsaPrivateKey {
        &self.key
    }

    pub fn signing_identity(&self) -> SigningIdentity<'_> {
        SigningIdentity {
            certificate: &self.cert,
            key: &self.key,
            chain: std::slice::from_ref(&self.cert),
        }
    }

    /// Issue a leaf certificate for the CSR's subject and public key.
    pub fn issue(&self, subject: &Name, spki: SubjectPublicKeyInfoOwned) -> Certificate {
        build_certificate(&self.cert.tbs_certificate.subject, subject, spki, &self.key)
    }
}

// ---------------------------------------------------------------------------
// TestClient
// ---------------------------------------------------------------------------

/// Minimal SCEP client: builds pkiMessages and decodes CertRep replies.
pub struct TestClient {
    key: RsaPrivateKey,
    cert: Certificate,
    server_cert: Certificate,
}

impl TestClient {
    /// Fresh enrolment identity: a self-signed certificate over a new key,
    /// as SCEP clients present before they hold a CA-issued one.
    pub fn generate(subject: &str, server_cert: &Certificate) -> Self {
        let key = RsaPrivateKey::new(&mut OsRng, TEST_KEY_BITS).expect("RSA keygen");
        let subject = name(subject);
        let cert = build_certificate(&subject, &subject, spki_of(&key.to_public_key()), &key);
        Self {
            key,
            cert,
            server_cert: server_cert.clone(),
        }
    }

    /// Enrolment identity whose self-signed certificate expired a year ago.
    pub fn generate_expired(subject: &str, server_cert: &Certificate) -> Self {
        let key = RsaPrivateKey::new(&mut OsRng, TEST_KEY_BITS).expect("RSA keygen");
        let subject = name(subject);
        let cert = build_certificate_with_validity(
            &subject,
            &subject,
            spki_of(&key.to_public_key()),
            &key,
            expired_window(),
        );
        Self {
            key,
            cert,
            server_cert: server_cert.clone(),
        }
    }

    /// Client identity backed by an existing certificate (renewal flows).
    pub fn with_identity(
        key: RsaPrivateKey,
        cert: Certificate,
        server_cert: &Certificate,
    ) -> Self {
        Self {
            key,
            cert,
            server_cert: server_cert.clone(),
        }
    }

    pub fn certificate(&self) -> &Certificate {
        &self.cert
    }

    pub fn key(&self) -> &RsaPrivateKey {
        &self.key
    }

    /// Build a PKCS#10 request for a fresh key pair, returning the CSR and
    /// the generated key.
    pub fn fresh_csr(
        subject: &str,
        challenge: Option<&str>,
    ) -> ScepResult<(CertReq, RsaPrivateKey)> {
        let key = RsaPrivateKey::new(&mut OsRng, TEST_KEY_BITS)
            .map_err(|e| ScepError::internal("RSA keygen", e))?;
        let csr = build_csr(&name(subject), &key, challenge)?;
        Ok((csr, key))
    }

    /// CSR over this client's own key.
    pub fn csr(&self, subject: &str, challenge: Option<&str>) -> ScepResult<CertReq> {
        build_csr(&name(subject), &self.key, challenge)
    }

    pub fn pkcs_req(
        &self,
        subject: &str,
        challenge: Option<&str>,
        trans_id: &str,
    ) -> ScepResult<Vec<u8>> {
        let csr = self.csr(subject, challenge)?;
        self.pkcs_req_with(&csr, trans_id, Nonce::generate(&mut OsRng))
    }

    pub fn pkcs_req_with(&self, csr: &CertReq, trans_id: &str, nonce: Nonce) -> ScepResult<Vec<u8>> {
        let inner = csr
            .to_der()
            .map_err(|e| ScepError::internal("CSR encode", e))?;
        self.pki_message(MessageType::PkcsReq, &inner, trans_id, nonce)
    }

    pub fn renewal_req(&self, csr: &CertReq, trans_id: &str, nonce: Nonce) -> ScepResult<Vec<u8>> {
        let inner = csr
            .to_der()
            .map_err(|e| ScepError::internal("CSR encode", e))?;
        self.pki_message(MessageType::RenewalReq, &inner, trans_id, nonce)
    }

    pub fn get_cert(
        &self,
        iasn: &IssuerAndSerialNumber,
        trans_id: &str,
        nonce: Nonce,
    ) -> ScepResult<Vec<u8>> {
        let inner = iasn
            .to_der()
            .map_err(|e| ScepError::internal("IssuerAndSerialNumber encode", e))?;
        self.pki_message(MessageType::GetCert, &inner, trans_id, nonce)
    }

    pub fn get_crl(
        &self,
        iasn: &IssuerAndSerialNumber,
        trans_id: &str,
        nonce: Nonce,
    ) -> ScepResult<Vec<u8>> {
        let inner = iasn
            .to_der()
            .map_err(|e| ScepError::internal("IssuerAndSerialNumber encode", e))?;
        self.pki_message(MessageType::GetCrl, &inner, trans_id, nonce)
    }

    pub fn get_cert_initial(
        &self,
        ias: &IssuerAndSubject,
        trans_id: &str,
        nonce: Nonce,
    ) -> ScepResult<Vec<u8>> {
        let inner = ias
            .to_der()
            .map_err(|e| ScepError::internal("IssuerAndSubject encode", e))?;
        self.pki_message(MessageType::GetCertInitial, &inner, trans_id, nonce)
    }

    /// Sign-and-envelope a request the way a conforming client does.
    pub fn pki_message(
        &self,
        message_type: MessageType,
        inner: &[u8],
        trans_id: &str,
        nonce: Nonce,
    ) -> ScepResult<Vec<u8>> {
        let enveloped =
            envelope::encrypt(&self.server_cert, inner, ContentAlgorithm::DesEde3Cbc, &mut OsRng)?;
        let econtent_octets =
            OctetString::new(enveloped).map_err(|e| ScepError::internal("content", e))?;
        let econtent =
            Any::encode_from(&econtent_octets).map_err(|e| ScepError::internal("content", e))?;
        let content_bytes = econtent.value().to_vec();

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
            printable_value(&message_type.as_wire().to_string())?,
        )?;
        push_attr(
            &mut attrs,
            oid::SCEP_TRANS_ID,
            printable_value(trans_id)?,
        )?;
        push_attr(
            &mut attrs,
            oid::SCEP_SENDER_NONCE,
            octet_value(nonce.as_bytes())?,
        )?;

        let signed = attrs
            .to_der()
            .map_err(|e| ScepError::internal("signed attributes", e))?;
        let signature = crypto::sign_sha256(&self.key, &signed)?;

        let signer_info = SignerInfo {
            version: CmsVersion::V1,
            sid: SignerIdentifier::IssuerAndSerialNumber(crate::asn1::issuer_and_serial(
                &self.cert,
            )),
            digest_alg: AlgorithmIdentifierOwned {
                oid: oid::ID_SHA256,
                parameters: None,
            },
            signed_attrs: Some(attrs),
            signature_algorithm: AlgorithmIdentifierOwned {
                oid: oid::RSA_ENCRYPTION,
                parameters: Some(Any::null()),
            },
            signature: OctetString::new(signature)
                .map_err(|e| ScepError::internal("signature", e))?,
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
            .insert(CertificateChoices::Certificate(self.cert.clone()))
            .map_err(|e| ScepError::internal("certificate set", e))?;

        let mut signer_infos = SetOfVec::new();
        signer_infos
            .insert(signer_info)
            .map_err(|e| ScepError::internal("signer infos", e))?;

        let signed_data = SignedData {
            version: CmsVersion::V1,
            digest_algorithms,
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: oid::ID_DATA,
                econtent: Some(econtent),
            },
            certificates: Some(CertificateSet(certificates)),
            crls: None,
            signer_infos: SignerInfos(signer_infos),
        };

        crate::asn1::encode_signed_data(&signed_data)
    }

    /// Decode a CertRep addressed to this client.
    pub fn decode_reply(&self, reply: &[u8]) -> ScepResult<CertRep> {
        let decoder = MessageDecoder::new(&self.cert, &self.key);
        let decoded = decoder.decode(reply)?;
        match decoded.message {
            PkiMessage::CertRep(rep) => Ok(rep),
            other => Err(ScepError::MessageDecoding(format!(
                "expected CertRep, got {}",
                other.message_type()
            ))),
        }
    }
}

fn build_csr(
    subject: &Name,
    key: &RsaPrivateKey,
    challenge: Option<&str>,
) -> ScepResult<CertReq> {
    let mut attributes = SetOfVec::new();
    if let Some(challenge) = challenge {
        let value = printable_value(challenge)?;
        let values =
            SetOfVec::try_from(vec![value]).map_err(|e| ScepError::internal("attribute", e))?;
        attributes
            .insert(Attribute {
                oid: oid::ID_CHALLENGE_PASSWORD,
                values,
            })
            .map_err(|e| ScepError::internal("attribute", e))?;
    }

    let info = CertReqInfo {
        version: x509_cert::request::Version::V1,
        subject: subject.clone(),
        public_key: spki_of(&key.to_public_key()),
        attributes,
    };
    let info_der = info
        .to_der()
        .map_err(|e| ScepError::internal("CertReqInfo encode", e))?;
    let signature = crypto::sign_sha256(key, &info_der)?;
    Ok(CertReq {
        info,
        algorithm: AlgorithmIdentifierOwned {
            oid: oid::SHA256_WITH_RSA,
            parameters: Some(Any::null()),
        },
        signature: BitString::from_bytes(&signature)
            .map_err(|e| ScepError::internal("signature bits", e))?,
    })
}

/// Extract the PKCS#9 challengePassword from a CSR, if present.
pub fn challenge_password(csr: &CertReq) -> Option<String> {
    let attr = csr
        .info
        .attributes
        .iter()
        .find(|attr| attr.oid == oid::ID_CHALLENGE_PASSWORD)?;
    let any = attr.values.iter().next()?;
    if let Ok(value) = PrintableStringRef::try_from(any) {
        return Some(value.as_str().to_owned());
    }
    Utf8StringRef::try_from(any)
        .ok()
        .map(|value| value.as_str().to_owned())
}

// ---------------------------------------------------------------------------
// TestBackend
// ---------------------------------------------------------------------------

/// CA backend with the policy the end-to-end scenarios expect:
/// challengePassword "password" issues immediately, `CN=Poll` subjects stay
/// pending, anything else is refused with badRequest.
pub struct TestBackend {
    ca: TestCa,
    issued: Mutex<Vec<Certificate>>,
    ra: Option<Certificate>,
    next_ca: Vec<Certificate>,
    renewal: bool,
}

impl TestBackend {
    pub fn new() -> Self {
        Self {
            ca: TestCa::generate("CN=Test SCEP CA"),
            issued: Mutex::new(Vec::new()),
            ra: None,
            next_ca: Vec::new(),
            renewal: true,
        }
    }

    pub fn without_renewal(mut self) -> Self {
        self.renewal = false;
        self
    }

    /// Add an RA certificate so GetCACert returns a chain instead of a
    /// single certificate.
    pub fn with_ra(mut self) -> Self {
        let ra_key = RsaPrivateKey::new(&mut OsRng, TEST_KEY_BITS).expect("RSA keygen");
        let ra_cert = self
            .ca
            .issue(&name("CN=Test SCEP RA"), spki_of(&ra_key.to_public_key()));
        self.ra = Some(ra_cert);
        self
    }

    pub fn with_next_ca(mut self, certs: Vec<Certificate>) -> Self {
        self.next_ca = certs;
        self
    }

    pub fn ca(&self) -> &TestCa {
        &self.ca
    }

    fn issue(&self, csr: &CertReq) -> Certificate {
        let cert = self
            .ca
            .issue(&csr.info.subject, csr.info.public_key.clone());
        self.issued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(cert.clone());
        cert
    }
}

impl Default for TestBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaBackend for TestBackend {
    fn capabilities(&self, _identifier: &str) -> Capabilities {
        Capabilities::new([
            Capability::GetNextCaCert,
            Capability::PostPkiOperation,
            Capability::Renewal,
            Capability::Sha1,
            Capability::Sha256,
            Capability::Sha512,
            Capability::Des3,
            Capability::Aes,
            Capability::ScepStandard,
        ])
    }

    fn ca_certificates(&self, _identifier: &str) -> Vec<Certificate> {
        let mut certs = vec![self.ca.cert.clone()];
        certs.extend(self.ra.clone());
        certs
    }

    fn next_ca_certificates(&self, _identifier: &str) -> Vec<Certificate> {
        self.next_ca.clone()
    }

    fn get_cert(
        &self,
        issuer: &Name,
        serial: &SerialNumber,
    ) -> Result<Vec<Certificate>, OperationFailure> {
        let issued = self
            .issued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(issued
            .iter()
            .filter(|cert| {
                cert.tbs_certificate.issuer == *issuer
                    && cert.tbs_certificate.serial_number == *serial
            })
            .cloned()
            .collect())
    }

    fn get_cert_initial(
        &self,
        _issuer: &Name,
        _subject: &Name,
        _trans_id: &TransactionId,
    ) -> Result<Vec<Certificate>, OperationFailure> {
        // Nothing is ever approved out-of-band here; polls stay pending.
        Ok(Vec::new())
    }

    fn get_crl(
        &self,
        _issuer: &Name,
        _serial: &SerialNumber,
    ) -> Result<Option<CertificateList>, OperationFailure> {
        Ok(None)
    }

    fn enrol(
        &self,
        csr: &CertReq,
        _signer: &Certificate,
        _trans_id: &TransactionId,
    ) -> Result<Vec<Certificate>, OperationFailure> {
        if csr.info.subject == name("CN=Poll") {
            return Ok(Vec::new());
        }
        match challenge_password(csr) {
            Some(password) if password == "password" => Ok(vec![self.issue(csr)]),
            Some(_) => Err(OperationFailure::bad_request("wrong challengePassword")),
            None => Err(OperationFailure::bad_request("missing challengePassword")),
        }
    }

    fn renew(
        &self,
        csr: &CertReq,
        signer: &Certificate,
        _trans_id: &TransactionId,
    ) -> Result<Vec<Certificate>, OperationFailure> {
        if !self.renewal {
            return Err(OperationFailure::bad_request(
                "renewal not supported by this CA",
            ));
        }
        // Renewal authenticates with a previously issued certificate.
        if signer.tbs_certificate.issuer != self.ca.cert.tbs_certificate.subject {
            return Err(OperationFailure::bad_request(
                "renewal signer was not issued by this CA",
            ));
        }
        Ok(vec![self.issue(csr)])
    }

    fn recipient_certificate(&self) -> &Certificate {
        &self.ca.cert
    }

    fn recipient_key(&self) -> &RsaPrivateKey {
        &self.ca.key
    }

    fn signer_certificate(&self) -> &Certificate {
        &self.ca.cert
    }

    fn signer_key(&self) -> &RsaPrivateKey {
        &self.ca.key
    }
}

// ---------------------------------------------------------------------------
// Attribute value helpers (shared with the client encoder)
// ---------------------------------------------------------------------------

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
    let time =
        UtcTime::from_unix_duration(now).map_err(|e| ScepError::internal("signingTime", e))?;
    Any::encode_from(&time).map_err(|e| ScepError::internal("signingTime", e))
}
