//! Token endpoint calls
//!
//! Three interactions with the backend's JWT endpoints:
//! 1. Obtain a pair from username + password (login)
//! 2. Refresh an access token from the stored refresh token
//! 3. Verify a token
//!
//! These go straight to the raw `Transport`, never through the authenticated
//! client: a refresh call must not itself trigger 401 handling.

use common::Secret;
use serde::Deserialize;
use tracing::debug;
use transport::{ApiRequest, ApiResponse, StatusCode, Transport};

use crate::constants::{REFRESH_PATH, TOKEN_PATH, VERIFY_PATH};
use crate::error::{Error, Result};

/// Response from the obtain-pair endpoint.
///
/// The backend has shipped both `access`/`refresh` and
/// `access_token`/`refresh_token` spellings; both are accepted.
#[derive(Debug, Deserialize)]
pub struct TokenPair {
    #[serde(alias = "access_token")]
    pub access: Secret<String>,
    #[serde(alias = "refresh_token")]
    pub refresh: Secret<String>,
}

/// Successful refresh outcome.
///
/// `refresh` is only present when the backend rotates refresh tokens.
#[derive(Debug)]
pub struct RefreshedToken {
    pub access: Secret<String>,
    pub refresh: Option<Secret<String>>,
}

/// Raw refresh response body; `access` is validated before it becomes a
/// `RefreshedToken`.
#[derive(Deserialize)]
struct RefreshBody {
    #[serde(default, alias = "access_token")]
    access: Option<Secret<String>>,
    #[serde(default, alias = "refresh_token")]
    refresh: Option<Secret<String>>,
}

/// Exchange username + password for a token pair.
pub async fn obtain_pair(
    transport: &dyn Transport,
    username: &str,
    password: &str,
) -> Result<TokenPair> {
    let request = ApiRequest::post(TOKEN_PATH)
        .json(&serde_json::json!({ "username": username, "password": password }))
        .map_err(|e| Error::Http(e.to_string()))?;

    let response = transport
        .send(&request)
        .await
        .map_err(|e| Error::Http(format!("token request failed: {e}")))?;

    if !response.is_success() {
        let status = response.status;
        let body = body_snippet(&response);
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
            return Err(Error::InvalidCredentials(format!(
                "token endpoint returned {status}: {body}"
            )));
        }
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let pair: TokenPair = response
        .json()
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))?;
    if pair.access.expose().is_empty() {
        return Err(Error::TokenExchange("no access token received".into()));
    }
    debug!(username, "obtained token pair");
    Ok(pair)
}

/// Mint a new access token using a refresh token.
///
/// Any non-2xx response is unrecoverable from the caller's point of view;
/// 401/403 are reported as `InvalidCredentials` so callers can tell a revoked
/// token from a backend fault.
pub async fn refresh_access(transport: &dyn Transport, refresh: &str) -> Result<RefreshedToken> {
    let request = ApiRequest::post(REFRESH_PATH)
        .json(&serde_json::json!({ "refresh": refresh }))
        .map_err(|e| Error::Http(e.to_string()))?;

    let response = transport
        .send(&request)
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status;
    if !status.is_success() {
        let body = body_snippet(&response);
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }
        return Err(Error::TokenRefresh(format!(
            "refresh endpoint returned {status}: {body}"
        )));
    }

    let body: RefreshBody = response
        .json()
        .map_err(|e| Error::TokenRefresh(format!("invalid refresh response: {e}")))?;
    match body.access {
        Some(access) if !access.expose().is_empty() => Ok(RefreshedToken {
            access,
            refresh: body.refresh.filter(|r| !r.expose().is_empty()),
        }),
        _ => Err(Error::TokenRefresh(
            "no access token in refresh response".into(),
        )),
    }
}

/// Ask the backend whether `token` is still valid.
///
/// 2xx means valid; 400/401 mean invalid or expired. Anything else is an
/// error because it says nothing about the token.
pub async fn verify(transport: &dyn Transport, token: &str) -> Result<bool> {
    let request = ApiRequest::post(VERIFY_PATH)
        .json(&serde_json::json!({ "token": token }))
        .map_err(|e| Error::Http(e.to_string()))?;

    let response = transport
        .send(&request)
        .await
        .map_err(|e| Error::Http(format!("token verify request failed: {e}")))?;

    match response.status {
        s if s.is_success() => Ok(true),
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Ok(false),
        s => Err(Error::Http(format!(
            "verify endpoint returned {s}: {}",
            body_snippet(&response)
        ))),
    }
}

/// First 200 characters of a response body for error messages.
fn body_snippet(response: &ApiResponse) -> String {
    let text = response.text();
    if text.is_empty() {
        return String::from("<no body>");
    }
    text.chars().take(200).collect()
}
