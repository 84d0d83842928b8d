//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! CA backend contract.
//!
//! The SCEP core never decides which CSRs to accept, how certificates are
//! signed, or where anything is stored; all of that sits behind this trait.
//! Domain refusals come back as [`OperationFailure`] and are surfaced to the
//! client as CertRep FAILURE with the carried failInfo. Empty result lists
//! have per-operation meaning (unknown cert, still pending) and are mapped by
//! the operation handlers.

use crate::error::OperationFailure;
use crate::types::{Capabilities, TransactionId};
use rsa::RsaPrivateKey;
use x509_cert::crl::CertificateList;
use x509_cert::name::Name;
use x509_cert::request::CertReq;
use x509_cert::serial_number::SerialNumber;
use x509_cert::Certificate;

pub trait CaBackend: Send + Sync {
    /// Capability tokens advertised via GetCACaps.
    fn capabilities(&self, identifier: &str) -> Capabilities;

    /// CA (or RA followed by CA) certificates returned by GetCACert.
    fn ca_certificates(&self, identifier: &str) -> Vec<Certificate>;

    /// Next CA chain for rollover; empty disables GetNextCACert.
    fn next_ca_certificates(&self, identifier: &str) -> Vec<Certificate>;

    /// Previously issued certificates matching issuer and serial.
    /// Empty means the certificate is unknown.
    fn get_cert(
        &self,
        issuer: &Name,
        serial: &SerialNumber,
    ) -> Result<Vec<Certificate>, OperationFailure>;

    /// Poll for a pending enrolment. Empty means still pending.
    fn get_cert_initial(
        &self,
        issuer: &Name,
        subject: &Name,
        trans_id: &TransactionId,
    ) -> Result<Vec<Certificate>, OperationFailure>;

    /// Current CRL for the named certificate, or `None` when the CA does not
    /// publish one.
    fn get_crl(
        &self,
        issuer: &Name,
        serial: &SerialNumber,
    ) -> Result<Option<CertificateList>, OperationFailure>;

    /// Enrol a new certificate. Empty means accepted but pending manual
    /// approval; the client polls with GetCertInitial.
    fn enrol(
        &self,
        csr: &CertReq,
        signer: &Certificate,
        trans_id: &TransactionId,
    ) -> Result<Vec<Certificate>, OperationFailure>;

    /// Renew an existing certificate. The default refuses; backends that
    /// advertise the `Renewal` capability override this.
    fn renew(
        &self,
        csr: &CertReq,
        signer: &Certificate,
        trans_id: &TransactionId,
    ) -> Result<Vec<Certificate>, OperationFailure> {
        let _ = (csr, signer, trans_id);
        Err(OperationFailure::bad_request(
            "renewal not supported by this CA",
        ))
    }

    // -- Server identity ----------------------------------------------------

    /// Certificate clients envelope their pkiMessages to.
    fn recipient_certificate(&self) -> &Certificate;

    /// Private key that opens incoming envelopes.
    fn recipient_key(&self) -> &RsaPrivateKey;

    /// Certificate that signs outgoing CertReps. May equal the recipient
    /// certificate.
    fn signer_certificate(&self) -> &Certificate;

    /// Private key for outgoing CertRep signatures.
    fn signer_key(&self) -> &RsaPrivateKey;

    /// Chain placed in the reply certificate set, signer first.
    fn signer_chain(&self) -> Vec<Certificate> {
        vec![self.signer_certificate().clone()]
    }
}
