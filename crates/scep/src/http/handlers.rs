//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! The SCEP request dispatcher.
//!
//! Parses `operation`/`message` query parameters, enforces per-operation
//! method policy, runs the selected handler, and frames the response with the
//! SCEP content types. Handler faults surface as plain-text 4xx/5xx bodies,
//! never as stack traces and never as an unauthenticated CertRep.

use crate::asn1;
use crate::error::ScepError;
use crate::message::{encode_signed_cert_set, SigningIdentity};
use crate::transact::PkiOperationHandler;
use crate::types::Operation;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use der::Encode;
use rand::rngs::OsRng;
use std::collections::HashMap;
use tracing::{info, warn};

use super::state::AppState;

const CONTENT_TYPE_CA_CERT: &str = "application/x-x509-ca-cert";
const CONTENT_TYPE_CA_RA_CERT: &str = "application/x-x509-ca-ra-cert";
const CONTENT_TYPE_NEXT_CA_CERT: &str = "application/x-x509-next-ca-cert";
const CONTENT_TYPE_PKI_MESSAGE: &str = "application/x-pki-message";

#[derive(serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// GET /healthz — returns service health status.
pub async fn health_handler() -> axum::response::Json<HealthResponse> {
    axum::response::Json(HealthResponse {
        status: "OK".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// The single SCEP endpoint. Accepts every method; policy is enforced per
/// operation inside [`dispatch`].
pub async fn scep_handler(
    State(state): State<AppState>,
    method: Method,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    dispatch(&state, &method, &params, &body).into_response()
}

/// Framed SCEP response: status, optional content type, optional Allow
/// header, body.
pub(crate) struct ScepResponse {
    status: StatusCode,
    content_type: Option<&'static str>,
    allow: Option<&'static str>,
    body: Vec<u8>,
}

impl ScepResponse {
    fn ok(content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: Some(content_type),
            allow: None,
            body,
        }
    }

    fn text(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            content_type: Some("text/plain"),
            allow: None,
            body: body.as_bytes().to_vec(),
        }
    }

    fn method_not_allowed(allow: &'static str) -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            content_type: None,
            allow: Some(allow),
            body: Vec::new(),
        }
    }

    pub(crate) fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ScepResponse {
    fn into_response(self) -> Response {
        let mut builder = Response::builder().status(self.status);
        if let Some(content_type) = self.content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        if let Some(allow) = self.allow {
            builder = builder.header(header::ALLOW, allow);
        }
        builder
            .body(axum::body::Body::from(self.body))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

/// Route a parsed SCEP request to its operation handler.
pub(crate) fn dispatch(
    state: &AppState,
    method: &Method,
    params: &HashMap<String, String>,
    body: &[u8],
) -> ScepResponse {
    let Some(operation) = params.get("operation") else {
        return ScepResponse::text(StatusCode::BAD_REQUEST, "Missing \"operation\" parameter.");
    };
    let Some(operation) = Operation::parse(operation) else {
        return ScepResponse::text(StatusCode::BAD_REQUEST, "Invalid \"operation\" parameter.");
    };
    let message = params.get("message").map(String::as_str).unwrap_or("");

    let response = match operation {
        Operation::GetCaCaps => get_ca_caps(state, method, message),
        Operation::GetCaCert => get_ca_cert(state, method, message),
        Operation::GetNextCaCert => get_next_ca_cert(state, method, message),
        Operation::PkiOperation => pki_operation(state, method, message, body),
    };

    info!(%operation, status = %response.status(), "dispatched SCEP operation");
    response
}

fn require_get(method: &Method) -> Option<ScepResponse> {
    (*method != Method::GET).then(|| ScepResponse::method_not_allowed("GET"))
}

fn get_ca_caps(state: &AppState, method: &Method, identifier: &str) -> ScepResponse {
    if let Some(rejection) = require_get(method) {
        return rejection;
    }
    let caps = state.backend.capabilities(identifier);
    ScepResponse::ok("text/plain", caps.render().into_bytes())
}

fn get_ca_cert(state: &AppState, method: &Method, identifier: &str) -> ScepResponse {
    if let Some(rejection) = require_get(method) {
        return rejection;
    }
    let certs = state.backend.ca_certificates(identifier);
    match certs.as_slice() {
        [] => ScepResponse::text(
            StatusCode::INTERNAL_SERVER_ERROR,
            "GetCaCert failed to obtain CA from store",
        ),
        // A lone CA certificate goes out as raw DER, not a SignedData wrapper.
        [cert] => match cert.to_der() {
            Ok(der) => ScepResponse::ok(CONTENT_TYPE_CA_CERT, der),
            Err(e) => internal_error("GetCACert", &ScepError::internal("certificate encode", e)),
        },
        _ => match asn1::degenerate_certs(&certs) {
            Ok(der) => ScepResponse::ok(CONTENT_TYPE_CA_RA_CERT, der),
            Err(e) => internal_error("GetCACert", &e),
        },
    }
}

fn get_next_ca_cert(state: &AppState, method: &Method, identifier: &str) -> ScepResponse {
    if let Some(rejection) = require_get(method) {
        return rejection;
    }
    let certs = state.backend.next_ca_certificates(identifier);
    if certs.is_empty() {
        return ScepResponse::text(StatusCode::NOT_IMPLEMENTED, "GetNextCACert Not Supported");
    }
    let chain = state.backend.signer_chain();
    let identity = SigningIdentity {
        certificate: state.backend.signer_certificate(),
        key: state.backend.signer_key(),
        chain: &chain,
    };
    match encode_signed_cert_set(&certs, &identity) {
        Ok(der) => ScepResponse::ok(CONTENT_TYPE_NEXT_CA_CERT, der),
        Err(e) => internal_error("GetNextCACert", &e),
    }
}

fn pki_operation(state: &AppState, method: &Method, message: &str, body: &[u8]) -> ScepResponse {
    let raw = if *method == Method::GET {
        if message.is_empty() {
            return ScepResponse::text(StatusCode::BAD_REQUEST, "Missing \"message\" parameter.");
        }
        // Clients that URL-decode Base64 turn '+' into ' '; undo that before
        // decoding.
        match BASE64.decode(message.replace(' ', "+")) {
            Ok(bytes) => bytes,
            Err(_) => {
                return ScepResponse::text(
                    StatusCode::BAD_REQUEST,
                    "Invalid \"message\" parameter.",
                )
            }
        }
    } else if *method == Method::POST {
        body.to_vec()
    } else {
        return ScepResponse::method_not_allowed("GET, POST");
    };

    let handler = PkiOperationHandler::new(state.backend.as_ref()).with_algorithm(state.algorithm);
    let handler = if state.check_signing_time {
        handler
    } else {
        handler.without_signing_time_check()
    };

    match handler.process(&raw, &mut OsRng) {
        Ok(reply) => ScepResponse::ok(CONTENT_TYPE_PKI_MESSAGE, reply),
        Err(e) => internal_error("PKIOperation", &e),
    }
}

/// Surface a handler fault as a short plain-text reason.
fn internal_error(operation: &str, err: &ScepError) -> ScepResponse {
    warn!(operation, error = %err, "SCEP operation failed");
    let status = match err.status_code() {
        400 => StatusCode::BAD_REQUEST,
        405 => StatusCode::METHOD_NOT_ALLOWED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    ScepResponse::text(status, &format!("{operation} failed: {err}"))
}
