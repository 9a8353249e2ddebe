//! Authenticated API client
//!
//! `ApiClient` owns the credential store, the dispatcher and the refresh
//! coordinator. Every call goes through `request()`:
//!
//! 1. Dispatch with the stored access token (`Attempt::Initial`)
//! 2. Non-401 → 2xx resolves, anything else becomes `Error::Status`
//! 3. 401 → ask the coordinator for a new token (one refresh, shared)
//! 4. Replay once with the new token (`Attempt::Replay`); its outcome is final

use std::sync::Arc;

use marketplace_auth::{CredentialStore, ME_PATH};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use transport::{ApiRequest, ApiResponse, MultipartForm, Transport};
use uuid::Uuid;

use crate::coordinator::{Recovery, RefreshCoordinator};
use crate::dispatch::{Attempt, Dispatcher};
use crate::error::{Error, Result};
use crate::metrics;

/// Result of `/auth/me/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub user: Option<serde_json::Value>,
    #[serde(default = "default_roles", deserialize_with = "roles_or_default")]
    pub roles: Vec<String>,
    #[serde(default)]
    pub vendor_id: Option<i64>,
}

impl Profile {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_vendor(&self) -> bool {
        self.vendor_id.is_some() || self.has_role("vendor")
    }
}

fn default_roles() -> Vec<String> {
    vec!["buyer".to_string()]
}

/// `null` roles count as missing.
fn roles_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_else(default_roles))
}

pub struct ApiClient {
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
    dispatcher: Dispatcher,
    coordinator: RefreshCoordinator,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("transport", &self.transport.id())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<CredentialStore>) -> Self {
        Self {
            dispatcher: Dispatcher::new(transport.clone(), store.clone()),
            coordinator: RefreshCoordinator::new(store.clone(), transport.clone()),
            transport,
            store,
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Whether a token refresh is in flight right now.
    pub async fn is_refreshing(&self) -> bool {
        self.coordinator.is_refreshing().await
    }

    /// Send `request`, transparently renewing an expired access token.
    ///
    /// Resolves with the response on 2xx. A non-2xx status is returned as
    /// `Error::Status`. A 401 is retried at most once, after a refresh; if
    /// the refresh fails, credentials are cleared and `Error::Refresh` is
    /// returned. A logout or login that lands while the refresh is in flight
    /// is kept, and the call fails with `Error::Refresh(Superseded)`.
    /// Cancelling `cancel` aborts the call with `Error::Cancelled`.
    pub async fn request(
        &self,
        request: ApiRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<ApiResponse> {
        let request_id = format!("req_{}", Uuid::new_v4().as_simple());
        let span = info_span!(
            "api_request",
            request_id = %request_id,
            method = %request.method,
            path = %request.path,
        );
        self.execute(&request, cancel).instrument(span).await
    }

    async fn execute(
        &self,
        request: &ApiRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<ApiResponse> {
        let response = self.dispatcher.send(request, Attempt::Initial, cancel).await?;
        if !response.is_unauthorized() {
            return into_result(response);
        }

        match self.coordinator.recover().await {
            Recovery::Refreshed(access) => self.replay(request, &access, cancel).await,
            Recovery::NoRefreshToken => Err(Error::from_response(response)),
            Recovery::Failed(e) => Err(Error::Refresh(e)),
        }
    }

    /// Re-send `request` once with `access`. A second 401 is final.
    async fn replay(
        &self,
        request: &ApiRequest,
        access: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<ApiResponse> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            debug!("cancelled while waiting for refresh, skipping replay");
            return Err(Error::Cancelled);
        }

        let replay = request.clone().with_bearer(access)?;
        metrics::record_replay();
        let response = self.dispatcher.send(&replay, Attempt::Replay, cancel).await?;
        if response.is_unauthorized() {
            warn!("replay rejected with 401 after refresh");
        }
        into_result(response)
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.request(ApiRequest::get(path), None).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.request(ApiRequest::post(path).json(body)?, None).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.request(ApiRequest::put(path).json(body)?, None).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.request(ApiRequest::patch(path).json(body)?, None).await
    }

    /// POST `form` as `multipart/form-data` (product images, shop logos).
    ///
    /// The form is re-encoded for a replay, so a refreshed request carries
    /// every part again.
    pub async fn post_multipart(&self, path: &str, form: MultipartForm) -> Result<ApiResponse> {
        self.request(ApiRequest::post(path).multipart(form), None).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.request(ApiRequest::delete(path), None).await
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.get(path).await?;
        decode(&response)
    }

    pub async fn set_access_token(&self, token: Option<String>) {
        self.store.set_access(token).await;
    }

    pub async fn set_refresh_token(&self, token: Option<String>) {
        self.store.set_refresh(token).await;
    }

    pub async fn clear_tokens(&self) {
        self.store.clear().await;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.store.access().await.is_some()
    }

    /// Exchange username + password for a token pair and store it.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let pair = marketplace_auth::obtain_pair(self.transport.as_ref(), username, password)
            .await
            .map_err(Error::Auth)?;
        self.store
            .set_pair(pair.access.expose().clone(), pair.refresh.expose().clone())
            .await;
        info!(username, "logged in");
        Ok(())
    }

    pub async fn logout(&self) {
        self.store.clear().await;
        info!("logged out");
    }

    /// Profile of the authenticated user.
    pub async fn current_user(&self) -> Result<Profile> {
        self.get_json(ME_PATH).await
    }

    /// Restore a session from stored credentials.
    ///
    /// `Ok(None)` when no access token is stored. If the profile cannot be
    /// loaded the stored credentials are cleared and the error returned.
    pub async fn hydrate(&self) -> Result<Option<Profile>> {
        if !self.is_authenticated().await {
            debug!("no stored access token, skipping hydration");
            return Ok(None);
        }
        match self.current_user().await {
            Ok(profile) => Ok(Some(profile)),
            Err(e) => {
                warn!(error = %e, "session hydration failed, clearing credentials");
                self.store.clear().await;
                Err(e)
            }
        }
    }

    /// Ask the backend whether the stored access token is valid.
    ///
    /// `false` without a stored token.
    pub async fn verify_access(&self) -> Result<bool> {
        let Some(token) = self.store.access().await else {
            return Ok(false);
        };
        marketplace_auth::verify(self.transport.as_ref(), &token)
            .await
            .map_err(Error::Auth)
    }
}

fn into_result(response: ApiResponse) -> Result<ApiResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(Error::from_response(response))
    }
}

fn decode<T: DeserializeOwned>(response: &ApiResponse) -> Result<T> {
    response.json().map_err(|e| Error::Decode(e.to_string()))
}
