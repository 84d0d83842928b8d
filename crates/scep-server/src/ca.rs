//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! In-memory CA backend for the standalone server.
//!
//! Issues certificates to enrolments that present the configured challenge
//! password, keeps issued certificates in memory for GetCert, and allows
//! renewal for clients that authenticate with a certificate it issued.
//! Useful for demos and smoke tests; production deployments implement
//! `CaBackend` against a real CA.

use anyhow::{Context, Result};
use der::asn1::{BitString, UtcTime};
use der::{Any, Decode, DecodePem, Encode};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use trustedge_scep::{CaBackend, Capabilities, Capability, OperationFailure, TransactionId};
use x509_cert::attr::Attribute;
use x509_cert::certificate::{TbsCertificate, Version};
use x509_cert::crl::CertificateList;
use x509_cert::name::Name;
use x509_cert::request::CertReq;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::{Time, Validity};
use x509_cert::Certificate;

const CHALLENGE_PASSWORD_OID: der::asn1::ObjectIdentifier =
    der::asn1::ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.7");
const SHA256_WITH_RSA: der::asn1::ObjectIdentifier =
    der::asn1::ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

const LEAF_VALIDITY_DAYS: u64 = 365;

pub struct MemoryCa {
    key: RsaPrivateKey,
    cert: Certificate,
    challenge: String,
    issued: Mutex<Vec<Certificate>>,
    serial: AtomicU64,
}

impl MemoryCa {
    /// Generate an ephemeral CA: a 2048-bit RSA key under a self-signed
    /// certificate. Everything is lost on process exit.
    pub fn generate(subject: &str, challenge: &str) -> Result<Self> {
        let key = RsaPrivateKey::new(&mut OsRng, 2048).context("CA key generation")?;
        let name = Name::from_str(subject).context("CA subject")?;
        let serial = AtomicU64::new(2);
        let cert = build_certificate(
            &name,
            &name,
            spki_of(&key.to_public_key())?,
            &key,
            1,
            10 * 365,
        )?;
        Ok(Self {
            key,
            cert,
            challenge: challenge.to_string(),
            issued: Mutex::new(Vec::new()),
            serial,
        })
    }

    /// Load the CA identity from a PKCS#8 PEM key and a certificate PEM.
    pub fn from_pem_files(
        key_path: &Path,
        cert_path: &Path,
        challenge: &str,
    ) -> Result<Self> {
        let key = RsaPrivateKey::read_pkcs8_pem_file(key_path)
            .with_context(|| format!("reading CA key from {}", key_path.display()))?;
        let pem = std::fs::read_to_string(cert_path)
            .with_context(|| format!("reading CA certificate from {}", cert_path.display()))?;
        let cert = Certificate::from_pem(pem.as_bytes()).context("parsing CA certificate")?;
        Ok(Self {
            key,
            cert,
            challenge: challenge.to_string(),
            issued: Mutex::new(Vec::new()),
            serial: AtomicU64::new(2),
        })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.cert
    }

    fn issue(&self, csr: &CertReq) -> Result<Certificate, OperationFailure> {
        let serial = self.serial.fetch_add(1, Ordering::Relaxed);
        let cert = build_certificate(
            &self.cert.tbs_certificate.subject,
            &csr.info.subject,
            csr.info.public_key.clone(),
            &self.key,
            serial,
            LEAF_VALIDITY_DAYS,
        )
        .map_err(|e| OperationFailure::bad_request(format!("issuance failed: {e}")))?;
        self.issued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(cert.clone());
        Ok(cert)
    }
}

impl CaBackend for MemoryCa {
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
        vec![self.cert.clone()]
    }

    fn next_ca_certificates(&self, _identifier: &str) -> Vec<Certificate> {
        // No rollover chain is staged for the in-memory CA.
        Vec::new()
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
        // This CA issues synchronously; nothing is ever parked as pending.
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
        match challenge_password(csr) {
            Some(password) if password == self.challenge => Ok(vec![self.issue(csr)?]),
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
        if signer.tbs_certificate.issuer != self.cert.tbs_certificate.subject {
            return Err(OperationFailure::bad_request(
                "renewal signer was not issued by this CA",
            ));
        }
        Ok(vec![self.issue(csr)?])
    }

    fn recipient_certificate(&self) -> &Certificate {
        &self.cert
    }

    fn recipient_key(&self) -> &RsaPrivateKey {
        &self.key
    }

    fn signer_certificate(&self) -> &Certificate {
        &self.cert
    }

    fn signer_key(&self) -> &RsaPrivateKey {
        &self.key
    }
}

fn spki_of(key: &RsaPublicKey) -> Result<SubjectPublicKeyInfoOwned> {
    let der = key.to_public_key_der().context("SPKI encode")?;
    SubjectPublicKeyInfoOwned::from_der(der.as_bytes()).context("SPKI decode")
}

fn build_certificate(
    issuer: &Name,
    subject: &Name,
    spki: SubjectPublicKeyInfoOwned,
    signing_key: &RsaPrivateKey,
    serial: u64,
    validity_days: u64,
) -> Result<Certificate> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("clock before epoch")?;
    let not_before =
        UtcTime::from_unix_duration(now - Duration::from_secs(300)).context("notBefore")?;
    let not_after =
        UtcTime::from_unix_duration(now + Duration::from_secs(validity_days * 24 * 3600))
            .context("notAfter")?;

    let algorithm = AlgorithmIdentifierOwned {
        oid: SHA256_WITH_RSA,
        parameters: Some(Any::null()),
    };
    let serial_bytes = serial.to_be_bytes();
    let first = serial_bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(serial_bytes.len() - 1);
    let tbs = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(&serial_bytes[first..]).context("serial")?,
        signature: algorithm.clone(),
        issuer: issuer.clone(),
        validity: Validity {
            not_before: Time::UtcTime(not_before),
            not_after: Time::UtcTime(not_after),
        },
        subject: subject.clone(),
        subject_public_key_info: spki,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
    };
    let tbs_der = tbs.to_der().context("TBS encode")?;
    let signature = trustedge_scep::crypto::sign_sha256(signing_key, &tbs_der)
        .map_err(|e| anyhow::anyhow!("TBS sign: {e}"))?;
    Ok(Certificate {
        tbs_certificate: tbs,
        signature_algorithm: algorithm,
        signature: BitString::from_bytes(&signature).context("signature bits")?,
    })
}

fn challenge_password(csr: &CertReq) -> Option<String> {
    let attr: &Attribute = csr
        .info
        .attributes
        .iter()
        .find(|attr| attr.oid == CHALLENGE_PASSWORD_OID)?;
    let any = attr.values.iter().next()?;
    if let Ok(value) = der::asn1::PrintableStringRef::try_from(any) {
        return Some(value.as_str().to_owned());
    }
    der::asn1::Utf8StringRef::try_from(any)
        .ok()
        .map(|value| value.as_str().to_owned())
}
