//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! HTTP surface tests: operation parsing, method policy, Base64 tolerance,
//! and response framing, driven through the axum router with oneshot
//! requests.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use der::Encode;
use rand::rngs::OsRng;
use std::sync::Arc;
use tower::ServiceExt;
use trustedge_scep::asn1;
use trustedge_scep::http::{create_router, AppState, SCEP_PATH};
use trustedge_scep::testkit::{TestBackend, TestClient};
use trustedge_scep::{CaBackend, CertRepOutcome, Nonce};

fn router_for(backend: TestBackend) -> (Router, Arc<TestBackend>) {
    let backend = Arc::new(backend);
    let router = create_router(AppState::new(backend.clone()));
    (router, backend)
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body")
        .to_vec()
}

fn content_type(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap_or_default().to_string())
        .unwrap_or_default()
}

/// GetCACaps returns the newline-terminated capability list as text/plain.
#[tokio::test]
async fn test_get_ca_caps() {
    let (router, _backend) = router_for(TestBackend::new());

    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("{SCEP_PATH}?operation=GetCACaps"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(content_type(&response).starts_with("text/plain"));
    let body = String::from_utf8(body_bytes(response).await).expect("utf8");
    assert!(body.ends_with('\n'));
    assert!(body.lines().any(|line| line == "POSTPKIOperation"));
    assert!(body.lines().any(|line| line == "Renewal"));
    assert!(body.lines().any(|line| line == "SCEPStandard"));
}

/// GetNextCACert without a staged next CA answers 501.
#[tokio::test]
async fn test_get_next_ca_cert_unsupported() {
    let (router, _backend) = router_for(TestBackend::new());

    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("{SCEP_PATH}?operation=GetNextCACert&message=bad"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body_bytes(response).await, b"GetNextCACert Not Supported");
}

/// GetNextCACert with a staged chain returns a signed SignedData.
#[tokio::test]
async fn test_get_next_ca_cert_signed_response() {
    let next = trustedge_scep::testkit::TestCa::generate("CN=Next CA");
    let (router, _backend) =
        router_for(TestBackend::new().with_next_ca(vec![next.certificate().clone()]));

    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("{SCEP_PATH}?operation=GetNextCACert"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), "application/x-x509-next-ca-cert");
    let body = body_bytes(response).await;
    let signed_data = asn1::parse_signed_data(&body).expect("SignedData");
    assert_eq!(signed_data.signer_infos.0.len(), 1);
    assert!(asn1::certificates_of(&signed_data).len() >= 2);
}

/// A request with no query parameters is a 400 with the canonical message.
#[tokio::test]
async fn test_missing_operation_parameter() {
    let (router, _backend) = router_for(TestBackend::new());

    let response = router
        .oneshot(
            Request::builder()
                .uri(SCEP_PATH)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = String::from_utf8(body_bytes(response).await).expect("utf8");
    assert!(body.contains("Missing \"operation\" parameter."));
}

/// Unknown operation values are a 400 with the canonical message.
#[tokio::test]
async fn test_invalid_operation_parameter() {
    let (router, _backend) = router_for(TestBackend::new());

    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("{SCEP_PATH}?operation=Enroll"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = String::from_utf8(body_bytes(response).await).expect("utf8");
    assert!(body.contains("Invalid \"operation\" parameter."));
}

/// Non-GET methods on GET-only operations answer 405 with an Allow header.
#[tokio::test]
async fn test_method_discipline_on_get_only_operations() {
    for operation in ["GetCACaps", "GetCACert", "GetNextCACert"] {
        let (router, _backend) = router_for(TestBackend::new());
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("{SCEP_PATH}?operation={operation}"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            response
                .headers()
                .get(header::ALLOW)
                .and_then(|v| v.to_str().ok()),
            Some("GET")
        );
        assert!(body_bytes(response).await.is_empty());
    }
}

/// Methods other than GET/POST on PKIOperation answer 405 listing both.
#[tokio::test]
async fn test_method_discipline_on_pki_operation() {
    let (router, _backend) = router_for(TestBackend::new());

    let response = router
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("{SCEP_PATH}?operation=PKIOperation"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response
            .headers()
            .get(header::ALLOW)
            .and_then(|v| v.to_str().ok()),
        Some("GET, POST")
    );
}

/// A single CA certificate goes out as raw DER with the CA cert media type.
#[tokio::test]
async fn test_get_ca_cert_single_is_raw_der() {
    let (router, backend) = router_for(TestBackend::new());

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
    assert_eq!(content_type(&response), "application/x-x509-ca-cert");
    let expected = backend
        .recipient_certificate()
        .to_der()
        .expect("certificate DER");
    assert_eq!(body_bytes(response).await, expected);
}

/// Multiple CA/RA certificates go out as a degenerate SignedData.
#[tokio::test]
async fn test_get_ca_cert_chain_is_degenerate_signed_data() {
    let (router, _backend) = router_for(TestBackend::new().with_ra());

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
    assert_eq!(content_type(&response), "application/x-x509-ca-ra-cert");
    let body = body_bytes(response).await;
    let signed_data = asn1::parse_signed_data(&body).expect("SignedData");
    assert!(signed_data.signer_infos.0.is_empty());
    assert_eq!(asn1::certificates_of(&signed_data).len(), 2);
}

/// PKIOperation over POST carries the raw signedData body.
#[tokio::test]
async fn test_pki_operation_post() {
    let (router, backend) = router_for(TestBackend::new());
    let client = TestClient::generate("CN=poster", backend.recipient_certificate());
    let raw = client
        .pkcs_req("CN=poster", Some("password"), "trans-post")
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
    assert_eq!(content_type(&response), "application/x-pki-message");
    let reply = client
        .decode_reply(&body_bytes(response).await)
        .expect("reply");
    assert!(matches!(reply.outcome, CertRepOutcome::Success(_)));
}

/// PKIOperation over GET decodes the Base64 message parameter, including
/// when a URL-decoding client turned '+' into spaces.
#[tokio::test]
async fn test_pki_operation_get_base64_space_tolerance() {
    let (router, backend) = router_for(TestBackend::new());
    let client = TestClient::generate("CN=getter", backend.recipient_certificate());
    let raw = client
        .get_cert(
            &asn1::issuer_and_serial(backend.recipient_certificate()),
            "trans-get",
            Nonce::generate(&mut OsRng),
        )
        .expect("request");

    let encoded = BASE64.encode(&raw);
    // Leave '+' unescaped, exactly as a client that URL-decoded its own
    // Base64 would; the query parser turns them into spaces.
    let query_value = encoded.replace('/', "%2F").replace('=', "%3D");

    let response = router
        .oneshot(
            Request::builder()
                .uri(format!(
                    "{SCEP_PATH}?operation=PKIOperation&message={query_value}"
                ))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), "application/x-pki-message");
    assert!(client.decode_reply(&body_bytes(response).await).is_ok());
}

/// PKIOperation over GET without a message parameter is a 400.
#[tokio::test]
async fn test_pki_operation_get_missing_message() {
    let (router, _backend) = router_for(TestBackend::new());

    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("{SCEP_PATH}?operation=PKIOperation"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// A garbage pkiMessage never produces a CertRep; it surfaces as a 500.
#[tokio::test]
async fn test_pki_operation_garbage_is_500() {
    let (router, _backend) = router_for(TestBackend::new());

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("{SCEP_PATH}?operation=PKIOperation"))
                .body(Body::from(vec![0x30, 0x03, 0x01, 0x01, 0x00]))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

/// GET /healthz responds 200 with `{"status":"OK","version":...}`.
#[tokio::test]
async fn test_healthz() {
    let (router, _backend) = router_for(TestBackend::new());

    let response = router
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).expect("valid JSON");
    assert_eq!(body["status"], "OK");
    assert!(body.get("version").is_some());
}
