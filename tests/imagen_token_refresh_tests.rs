//! Integration Tests for Access Token Refresh
//!
//! UNIT UNDER TEST: ImagenConnector with send_with_token_refresh
//!
//! BUSINESS RESPONSIBILITY:
//!   - Obtain access tokens for the service account through the JWT bearer grant
//!   - Authenticate image requests with the cached token
//!   - Recover from an expired token by refreshing and resubmitting once
//!   - Give up after a single refresh instead of looping
//!
//! TEST COVERAGE:
//!   - Token request form: grant type and a verifiable signed assertion
//!   - Expired token: exactly one refresh and one resubmission
//!   - Token still rejected after refresh: terminal transport error
//!   - Authorization failures that are not expiry: no refresh
//!   - Safety filter rejection mapped to the policy message

mod common;

use ai_manager::connectors::imagen::CONTENT_POLICY_MESSAGE;
use ai_manager::{ErrorKind, PromptResponse, PurposeKind};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use common::{
    imagen_instance, raw, token_body, Harness, SERVICE_ACCOUNT_EMAIL, SERVICE_ACCOUNT_PUBLIC_KEY,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn expired_body() -> serde_json::Value {
    json!({
        "error": {
            "code": 401,
            "message": "Request had invalid authentication credentials.",
            "status": "UNAUTHENTICATED"
        }
    })
}

fn prediction_body() -> serde_json::Value {
    json!({
        "predictions": [{"mimeType": "image/png", "bytesBase64Encoded": BASE64.encode(b"imagen png")}]
    })
}

/// Token endpoint answering `token-1` first and `token-2` afterwards.
async fn mount_rotating_tokens(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("token-1")))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("token-2")))
        .with_priority(2)
        .expect(expected_calls.saturating_sub(1))
        .mount(server)
        .await;
}

#[derive(Debug, Deserialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
}

#[tokio::test]
async fn test_token_request_uses_signed_jwt_bearer_assertion() {
    // Test verifies the token endpoint receives the JWT bearer grant with an
    // assertion signed by the service account key

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("token-1")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/predict"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(prediction_body()))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new();
    harness.serve(PurposeKind::ImgGen, &imagen_instance(&server.uri()), 10);

    let response = harness
        .manager(PurposeKind::ImgGen)
        .perform_request("A lighthouse", "block_imggen", 1, &raw(json!({})))
        .await;
    assert!(response.is_success(), "{response:?}");

    let requests = server.received_requests().await.expect("requests are recorded");
    let token_request = requests
        .iter()
        .find(|r| r.url.path() == "/token")
        .expect("token endpoint was called");
    let form = form_fields(&String::from_utf8_lossy(&token_request.body));
    assert_eq!(
        form.get("grant_type").map(String::as_str),
        Some("urn:ietf:params:oauth:grant-type:jwt-bearer")
    );
    assert!(!form.contains_key("client_secret"));

    let token_uri = format!("{}/token", server.uri());
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[token_uri.as_str()]);
    let claims = decode::<Claims>(
        form.get("assertion").expect("assertion is sent"),
        &DecodingKey::from_rsa_pem(SERVICE_ACCOUNT_PUBLIC_KEY.as_bytes()).expect("public key"),
        &validation,
    )
    .expect("assertion signature verifies")
    .claims;
    assert_eq!(claims.iss, SERVICE_ACCOUNT_EMAIL);
    assert_eq!(claims.aud, token_uri);
    assert_eq!(claims.scope, "https://www.googleapis.com/auth/cloud-platform");
}

/// Decode an `application/x-www-form-urlencoded` body.
fn form_fields(body: &str) -> HashMap<String, String> {
    let url = reqwest::Url::parse(&format!("http://form.local/?{body}")).expect("form body");
    url.query_pairs().into_owned().collect()
}

#[tokio::test]
async fn test_expired_token_is_refreshed_exactly_once() {
    let server = MockServer::start().await;
    mount_rotating_tokens(&server, 2).await;
    Mock::given(method("POST"))
        .and(path("/v1/predict"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(expired_body()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/predict"))
        .and(header("authorization", "Bearer token-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(prediction_body()))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new();
    harness.serve(PurposeKind::ImgGen, &imagen_instance(&server.uri()), 10);

    let response = harness
        .manager(PurposeKind::ImgGen)
        .perform_request("A lighthouse", "block_imggen", 1, &raw(json!({"filename": "lighthouse.png"})))
        .await;

    let url = response.content().expect("request succeeds after refresh");
    assert_eq!(harness.blobs.get(url), Some(b"imagen png".to_vec()));
    assert_eq!(response.usage().map(|u| u.total), Some(1.0));
}

#[tokio::test]
async fn test_second_expiry_is_terminal_transport_error() {
    // Test verifies the connector resubmits once and then gives up

    let server = MockServer::start().await;
    mount_rotating_tokens(&server, 2).await;
    Mock::given(method("POST"))
        .and(path("/v1/predict"))
        .respond_with(ResponseTemplate::new(401).set_body_json(expired_body()))
        .expect(2)
        .mount(&server)
        .await;

    let harness = Harness::new();
    harness.serve(PurposeKind::ImgGen, &imagen_instance(&server.uri()), 10);

    let response = harness
        .manager(PurposeKind::ImgGen)
        .perform_request("A lighthouse", "block_imggen", 1, &raw(json!({})))
        .await;

    assert_eq!(response.error_kind(), Some(ErrorKind::TransportError));
    assert_eq!(response.error_code(), Some(500));
    assert_eq!(harness.usage_requests(PurposeKind::ImgGen), 0);
}

#[tokio::test]
async fn test_permission_failure_is_not_treated_as_expiry() {
    let server = MockServer::start().await;
    mount_rotating_tokens(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/v1/predict"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": 401, "message": "caller lacks permission", "status": "PERMISSION_DENIED"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new();
    harness.serve(PurposeKind::ImgGen, &imagen_instance(&server.uri()), 10);

    let response = harness
        .manager(PurposeKind::ImgGen)
        .perform_request("A lighthouse", "block_imggen", 1, &raw(json!({})))
        .await;

    assert_eq!(response.error_kind(), Some(ErrorKind::ProviderError));
    assert_eq!(response.error_code(), Some(401));
}

#[tokio::test]
async fn test_cached_token_is_reused_between_requests() {
    let server = MockServer::start().await;
    mount_rotating_tokens(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/v1/predict"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(prediction_body()))
        .expect(2)
        .mount(&server)
        .await;

    let harness = Harness::new();
    harness.serve(PurposeKind::ImgGen, &imagen_instance(&server.uri()), 10);
    let manager = harness.manager(PurposeKind::ImgGen);

    for _ in 0..2 {
        let response = manager
            .perform_request("A lighthouse", "block_imggen", 1, &raw(json!({})))
            .await;
        assert!(response.is_success(), "{response:?}");
    }
}

#[tokio::test]
async fn test_safety_filter_rejection_uses_policy_message() {
    let server = MockServer::start().await;
    mount_rotating_tokens(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/v1/predict"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "Image generation failed", "status": "INVALID_ARGUMENT"}
        })))
        .mount(&server)
        .await;

    let harness = Harness::new();
    harness.serve(PurposeKind::ImgGen, &imagen_instance(&server.uri()), 10);

    let response = harness
        .manager(PurposeKind::ImgGen)
        .perform_request("Something filtered", "block_imggen", 1, &raw(json!({})))
        .await;

    match response {
        PromptResponse::Error { code, message, .. } => {
            assert_eq!(code, 400);
            assert_eq!(message, CONTENT_POLICY_MESSAGE);
        }
        other => panic!("expected an error response, got {other:?}"),
    }
}
