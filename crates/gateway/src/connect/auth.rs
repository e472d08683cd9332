// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection-time auth resolution.
//!
//! Configs keep `${VAR}` placeholders; everything here expands them against
//! the process environment and turns the auth kind into request headers,
//! fetching a client-credentials token when the spell asks for one.

use std::collections::HashMap;

use base64::Engine as _;
use serde::Deserialize;
use tracing::debug;

use grim_core::{expand_env, AuthConfig, SecretError};

use super::SpawnError;

/// Resolve the header list for a remote spell: custom headers first, then
/// whatever the auth kind contributes.
pub async fn resolve_headers(
    auth: &AuthConfig,
    headers: &HashMap<String, String>,
    http: &reqwest::Client,
) -> Result<Vec<(String, String)>, SpawnError> {
    let mut resolved = Vec::with_capacity(headers.len() + 1);
    for (name, value) in headers {
        resolved.push((name.clone(), expand(value)?));
    }

    match auth {
        AuthConfig::None => {}
        AuthConfig::Bearer { token } => {
            resolved.push(("Authorization".to_string(), format!("Bearer {}", expand(token)?)));
        }
        AuthConfig::Basic { user, pass } => {
            let credentials = format!("{}:{}", expand(user)?, expand(pass)?);
            let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
            resolved.push(("Authorization".to_string(), format!("Basic {encoded}")));
        }
        AuthConfig::ClientCredentials { client_id, client_secret, token_url, scope }
        | AuthConfig::Oauth2 { client_id, client_secret, token_url, scope } => {
            let token = fetch_token(
                http,
                &expand(token_url)?,
                &expand(client_id)?,
                &expand(client_secret)?,
                scope.as_deref(),
            )
            .await?;
            resolved.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
    }

    Ok(resolved)
}

fn expand(value: &str) -> Result<String, SpawnError> {
    expand_env(value).map_err(auth_failed)
}

fn auth_failed(err: SecretError) -> SpawnError {
    SpawnError::AuthFailed(err.to_string())
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Client-credentials grant against the spell's token endpoint.
async fn fetch_token(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    scope: Option<&str>,
) -> Result<String, SpawnError> {
    debug!(token_url, "fetching client-credentials token");

    let mut form = vec![
        ("grant_type", "client_credentials"),
        ("client_id", client_id),
        ("client_secret", client_secret),
    ];
    if let Some(scope) = scope {
        form.push(("scope", scope));
    }

    let response = http.post(token_url).form(&form).send().await.map_err(|err| {
        if err.is_connect() {
            SpawnError::ConnectRefused(token_url.to_string())
        } else {
            SpawnError::AuthFailed(err.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(SpawnError::AuthFailed(format!(
            "token endpoint returned {}",
            response.status()
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|err| SpawnError::AuthFailed(format!("malformed token response: {err}")))?;
    Ok(token.access_token)
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
