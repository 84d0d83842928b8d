//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! PKIOperation transaction handling.
//!
//! Maps decoded pkiMessages onto CA backend calls, and backend outcomes onto
//! CertRep replies with the correct pkiStatus and failInfo. Backend domain
//! refusals become CertRep FAILURE; everything else propagates to the
//! dispatcher as an HTTP-level error.

use crate::asn1;
use crate::backend::CaBackend;
use crate::envelope::ContentAlgorithm;
use crate::error::{OperationFailure, ScepError, ScepResult};
use crate::message::{
    encode_cert_rep, CertRep, CertRepOutcome, MessageDecoder, PkiMessage, SigningIdentity,
};
use crate::types::FailInfo;
use rand::{CryptoRng, RngCore};
use tracing::{debug, warn};
use x509_cert::Certificate;

/// Handler for the PKIOperation flow: decode, execute, encode.
pub struct PkiOperationHandler<'a> {
    backend: &'a dyn CaBackend,
    algorithm: ContentAlgorithm,
    check_signing_time: bool,
}

impl<'a> PkiOperationHandler<'a> {
    pub fn new(backend: &'a dyn CaBackend) -> Self {
        Self {
            backend,
            algorithm: ContentAlgorithm::DesEde3Cbc,
            check_signing_time: true,
        }
    }

    /// Content-encryption algorithm for reply envelopes.
    pub fn with_algorithm(mut self, algorithm: ContentAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn without_signing_time_check(mut self) -> Self {
        self.check_signing_time = false;
        self
    }

    /// Run a full PKIOperation: raw signedData in, raw CertRep signedData out.
    pub fn process(
        &self,
        raw: &[u8],
        rng: &mut (impl RngCore + CryptoRng),
    ) -> ScepResult<Vec<u8>> {
        let decoder = MessageDecoder::new(
            self.backend.recipient_certificate(),
            self.backend.recipient_key(),
        );
        let decoder = if self.check_signing_time {
            decoder
        } else {
            decoder.without_signing_time_check()
        };
        let decoded = decoder.decode(raw)?;

        debug!(
            message_type = %decoded.message.message_type(),
            trans_id = %decoded.message.trans_id(),
            "decoded pkiMessage"
        );

        let reply = self.execute(&decoded.message, &decoded.signer)?;

        let chain = self.backend.signer_chain();
        let identity = SigningIdentity {
            certificate: self.backend.signer_certificate(),
            key: self.backend.signer_key(),
            chain: &chain,
        };
        encode_cert_rep(&reply, &decoded.signer, &identity, self.algorithm, rng)
    }

    /// Map a decoded request onto a backend call and build the CertRep.
    pub fn execute(&self, message: &PkiMessage, signer: &Certificate) -> ScepResult<CertRep> {
        let outcome = match message {
            PkiMessage::GetCert { iasn, .. } => {
                match self.backend.get_cert(&iasn.issuer, &iasn.serial_number) {
                    Ok(certs) if certs.is_empty() => {
                        CertRepOutcome::Failure(FailInfo::BadCertId)
                    }
                    Ok(certs) => CertRepOutcome::Success(asn1::degenerate_certs(&certs)?),
                    Err(failure) => refuse(message, failure),
                }
            }
            PkiMessage::GetCertInitial { ias, trans_id, .. } => {
                match self
                    .backend
                    .get_cert_initial(&ias.issuer, &ias.subject, trans_id)
                {
                    Ok(certs) if certs.is_empty() => CertRepOutcome::Pending,
                    Ok(certs) => CertRepOutcome::Success(asn1::degenerate_certs(&certs)?),
                    Err(failure) => refuse(message, failure),
                }
            }
            PkiMessage::GetCrl { iasn, .. } => {
                match self.backend.get_crl(&iasn.issuer, &iasn.serial_number) {
                    Ok(crl) => CertRepOutcome::Success(asn1::degenerate_crl(crl.as_ref())?),
                    Err(failure) => refuse(message, failure),
                }
            }
            PkiMessage::PkcsReq { csr, trans_id, .. } => {
                match self.backend.enrol(csr, signer, trans_id) {
                    Ok(certs) if certs.is_empty() => CertRepOutcome::Pending,
                    Ok(certs) => CertRepOutcome::Success(asn1::degenerate_certs(&certs)?),
                    Err(failure) => refuse(message, failure),
                }
            }
            PkiMessage::RenewalReq { csr, trans_id, .. } => {
                match self.backend.renew(csr, signer, trans_id) {
                    Ok(certs) if certs.is_empty() => CertRepOutcome::Pending,
                    Ok(certs) => CertRepOutcome::Success(asn1::degenerate_certs(&certs)?),
                    Err(failure) => refuse(message, failure),
                }
            }
            PkiMessage::CertRep(_) => {
                return Err(ScepError::MessageDecoding(
                    "CertRep is not a valid client request".into(),
                ))
            }
        };

        Ok(CertRep {
            trans_id: message.trans_id().clone(),
            sender_nonce: None,
            recipient_nonce: message.sender_nonce(),
            outcome,
        })
    }
}

fn refuse(message: &PkiMessage, failure: OperationFailure) -> CertRepOutcome {
    warn!(
        message_type = %message.message_type(),
        trans_id = %message.trans_id(),
        fail_info = %failure.fail_info,
        reason = %failure.reason,
        "backend refused operation"
    );
    CertRepOutcome::Failure(failure.fail_info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::IssuerAndSubject;
    use crate::testkit::{self, TestBackend};
    use crate::types::{Nonce, TransactionId};
    use cms::cert::IssuerAndSerialNumber;
    use rand::rngs::OsRng;
    use x509_cert::serial_number::SerialNumber;

    fn request_parts() -> (TransactionId, Option<Nonce>) {
        (
            TransactionId::new("transaction-exec"),
            Some(Nonce::generate(&mut OsRng)),
        )
    }

    #[test]
    fn test_get_cert_unknown_serial_fails_bad_cert_id() {
        let backend = TestBackend::new();
        let handler = PkiOperationHandler::new(&backend);
        let (trans_id, sender_nonce) = request_parts();

        let message = PkiMessage::GetCert {
            trans_id,
            sender_nonce,
            iasn: IssuerAndSerialNumber {
                issuer: testkit::name("CN=Example"),
                serial_number: SerialNumber::new(&[0]).expect("serial"),
            },
        };
        let reply = handler
            .execute(&message, backend.signer_certificate())
            .expect("execute");
        match reply.outcome {
            CertRepOutcome::Failure(info) => assert_eq!(info, FailInfo::BadCertId),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_get_cert_initial_empty_is_pending() {
        let backend = TestBackend::new();
        let handler = PkiOperationHandler::new(&backend);
        let (trans_id, sender_nonce) = request_parts();

        let message = PkiMessage::GetCertInitial {
            trans_id,
            sender_nonce,
            ias: IssuerAndSubject {
                issuer: testkit::name("CN=Test SCEP CA"),
                subject: testkit::name("CN=Poll"),
            },
        };
        let reply = handler
            .execute(&message, backend.signer_certificate())
            .expect("execute");
        assert!(matches!(reply.outcome, CertRepOutcome::Pending));
    }

    #[test]
    fn test_reply_echoes_trans_id_and_nonce() {
        let backend = TestBackend::new();
        let handler = PkiOperationHandler::new(&backend);
        let nonce = Nonce::generate(&mut OsRng);

        let message = PkiMessage::GetCrl {
            trans_id: TransactionId::new("transaction-crl"),
            sender_nonce: Some(nonce),
            iasn: IssuerAndSerialNumber {
                issuer: testkit::name("CN=Test SCEP CA"),
                serial_number: SerialNumber::new(&[1]).expect("serial"),
            },
        };
        let reply = handler
            .execute(&message, backend.signer_certificate())
            .expect("execute");
        assert_eq!(reply.trans_id.as_str(), "transaction-crl");
        assert_eq!(reply.recipient_nonce, Some(nonce));
        assert!(matches!(reply.outcome, CertRepOutcome::Success(_)));
    }

    #[test]
    fn test_default_renew_refuses_bad_request() {
        let backend = TestBackend::new().without_renewal();
        let handler = PkiOperationHandler::new(&backend);
        let (trans_id, sender_nonce) = request_parts();
        let client = testkit::TestClient::generate("CN=renewer", backend.recipient_certificate());
        let csr = client.csr("CN=renewer", Some("password")).expect("csr");

        let message = PkiMessage::RenewalReq {
            trans_id,
            sender_nonce,
            csr,
        };
        let reply = handler
            .execute(&message, client.certificate())
            .expect("execute");
        match reply.outcome {
            CertRepOutcome::Failure(info) => assert_eq!(info, FailInfo::BadRequest),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
