// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serial_test::serial;

use super::*;

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

#[tokio::test]
async fn none_auth_yields_only_custom_headers() {
    let mut headers = HashMap::new();
    headers.insert("X-Trace".to_string(), "on".to_string());
    let resolved = resolve_headers(&AuthConfig::None, &headers, &client()).await.unwrap();
    assert_eq!(resolved, vec![("X-Trace".to_string(), "on".to_string())]);
}

#[tokio::test]
#[serial]
async fn bearer_token_expands_placeholders() {
    std::env::set_var("AUTH_TEST_TOKEN", "tok-123");
    let auth = AuthConfig::Bearer { token: "${AUTH_TEST_TOKEN}".to_string() };
    let resolved = resolve_headers(&auth, &HashMap::new(), &client()).await.unwrap();
    std::env::remove_var("AUTH_TEST_TOKEN");

    assert_eq!(
        resolved,
        vec![("Authorization".to_string(), "Bearer tok-123".to_string())]
    );
}

#[tokio::test]
#[serial]
async fn unset_placeholder_is_an_auth_failure() {
    std::env::remove_var("AUTH_TEST_MISSING");
    let auth = AuthConfig::Bearer { token: "${AUTH_TEST_MISSING}".to_string() };
    let err = resolve_headers(&auth, &HashMap::new(), &client()).await.unwrap_err();
    assert!(matches!(err, SpawnError::AuthFailed(_)));
}

#[tokio::test]
async fn basic_auth_encodes_credentials() {
    let auth = AuthConfig::Basic { user: "alice".to_string(), pass: "s3cret".to_string() };
    let resolved = resolve_headers(&auth, &HashMap::new(), &client()).await.unwrap();
    // base64("alice:s3cret")
    assert_eq!(
        resolved,
        vec![("Authorization".to_string(), "Basic YWxpY2U6czNjcmV0".to_string())]
    );
}

#[tokio::test]
async fn unreachable_token_endpoint_is_connect_refused() {
    let auth = AuthConfig::ClientCredentials {
        client_id: "id".to_string(),
        client_secret: "secret".to_string(),
        token_url: "http://127.0.0.1:1/token".to_string(),
        scope: None,
    };
    let err = resolve_headers(&auth, &HashMap::new(), &client()).await.unwrap_err();
    assert!(matches!(err, SpawnError::ConnectRefused(_)));
}
