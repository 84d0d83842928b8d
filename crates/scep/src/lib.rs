//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! # TrustEdge SCEP
//!
//! Server core for the Simple Certificate Enrollment Protocol: PKI clients
//! obtain CA certificates, enrol and renew end-entity certificates, retrieve
//! previously issued certificates and CRLs, and poll pending requests — all
//! over signed-and-enveloped CMS payloads carried on HTTP.
//!
//! ## Architecture
//!
//! - [`oid`] / [`asn1`] — ASN.1 and CMS structure glue
//! - [`envelope`] — EnvelopedData codec for the inner pkiMessage content
//! - [`message`] — pkiMessage codec: verify, decode, and sign CertRep replies
//! - [`transact`] — maps decoded requests onto CA operations and outcomes
//!   onto CertRep status
//! - [`backend`] — the `CaBackend` trait; all issuance policy lives behind it
//! - [`http`] — axum dispatcher: operation routing, method policy, response
//!   framing
//!
//! The core is stateless: every pkiMessage is handled within one HTTP request,
//! and pending-enrolment state is entirely the backend's concern.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use trustedge_scep::http::{create_router, AppState};
//! use trustedge_scep::CaBackend;
//!
//! # async fn serve(backend: Arc<dyn CaBackend>) -> anyhow::Result<()> {
//! let router = create_router(AppState::new(backend));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

pub mod asn1;
pub mod backend;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod http;
pub mod message;
pub mod oid;
pub mod transact;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testkit;

pub use backend::CaBackend;
pub use envelope::ContentAlgorithm;
pub use error::{OperationFailure, ScepError, ScepResult};
pub use message::{CertRep, CertRepOutcome, MessageDecoder, PkiMessage, SigningIdentity};
pub use transact::PkiOperationHandler;
pub use types::{
    Capabilities, Capability, FailInfo, MessageType, Nonce, Operation, PkiStatus, TransactionId,
};
