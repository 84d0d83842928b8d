//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Wiring tests for the standalone server: the in-memory CA behind the real
//! router serves the SCEP surface end to end.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use std::sync::Arc;
use trustedge_scep_server::ca::MemoryCa;
use trustedge_scep::http::{create_router, AppState, SCEP_PATH};
use trustedge_scep::testkit::TestClient;
use trustedge_scep::CertRepOutcome;

#[tokio::test]
async fn test_router_health_and_ca_cert() {
    let backend = MemoryCa::generate("CN=Boot Test CA", "password").expect("CA");
    let ca_cert = backend.certificate().clone();
    let router = create_router(AppState::new(Arc::new(backend)));

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("{SCEP_PATH}?operation=GetCACert"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    use der::Encode;
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.to_vec(), ca_cert.to_der().expect("DER"));
}

#[tokio::test]
async fn test_enrolment_through_router() {
    let backend = MemoryCa::generate("CN=Boot Test CA", "password").expect("CA");
    let ca_cert = backend.certificate().clone();
    let router = create_router(AppState::new(Arc::new(backend)));

    let client = TestClient::generate("CN=boot-device", &ca_cert);
    let raw = client
        .pkcs_req("CN=boot-device", Some("password"), "trans-boot")
        .expect("request");

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("{SCEP_PATH}?operation=PKIOperation"))
                .header(header::CONTENT_TYPE, "application/x-pki-message")
                .body(Body::from(raw))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let reply = client.decode_reply(&body).expect("reply");
    assert!(matches!(reply.outcome, CertRepOutcome::Success(_)));
}
