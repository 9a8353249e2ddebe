//! Request dispatcher
//!
//! The single path every outgoing request takes. The bearer header is read
//! from the credential store at send time, never captured earlier, so a
//! request that starts after a refresh carries the new token.

use std::sync::Arc;
use std::time::Instant;

use marketplace_auth::CredentialStore;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use transport::{ApiRequest, ApiResponse, Transport};

use crate::error::{Error, Result};
use crate::metrics;

/// Which send this is for a given caller request.
///
/// A 401 on `Initial` may trigger a refresh; a 401 on `Replay` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Initial,
    Replay,
}

impl Attempt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Replay => "replay",
        }
    }
}

pub(crate) struct Dispatcher {
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
}

impl Dispatcher {
    pub(crate) fn new(transport: Arc<dyn Transport>, store: Arc<CredentialStore>) -> Self {
        Self { transport, store }
    }

    /// Send `request` with the current access token attached.
    ///
    /// Any status is returned as `Ok`; deciding what a 401 means is the
    /// caller's job. Cancellation before or during the round trip yields
    /// `Error::Cancelled`.
    pub(crate) async fn send(
        &self,
        request: &ApiRequest,
        attempt: Attempt,
        cancel: Option<&CancellationToken>,
    ) -> Result<ApiResponse> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(Error::Cancelled);
        }

        let outgoing = self.prepare(request).await?;
        let started = Instant::now();
        let result = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(attempt = attempt.as_str(), "request cancelled in flight");
                    return Err(Error::Cancelled);
                }
                result = self.transport.send(&outgoing) => result,
            },
            None => self.transport.send(&outgoing).await,
        };

        match result {
            Ok(response) => {
                metrics::record_request(
                    outgoing.method.as_str(),
                    response.status.as_u16(),
                    attempt,
                    started.elapsed().as_secs_f64(),
                );
                debug!(
                    attempt = attempt.as_str(),
                    status = response.status.as_u16(),
                    transport = self.transport.id(),
                    "response"
                );
                Ok(response)
            }
            Err(e) => {
                let error_type = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connection"
                } else {
                    "other"
                };
                metrics::record_transport_error(error_type);
                Err(Error::Transport(e))
            }
        }
    }

    /// Copy of `request` carrying the stored access token, if there is one.
    ///
    /// Without a stored token the caller's headers go out unchanged.
    async fn prepare(&self, request: &ApiRequest) -> Result<ApiRequest> {
        let mut outgoing = request.clone();
        if let Some(token) = self.store.access().await {
            outgoing.set_bearer(&token)?;
            debug!("attached bearer token");
        }
        Ok(outgoing)
    }
}
