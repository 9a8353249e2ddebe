//! Single-flight token refresh
//!
//! When a request comes back 401, its caller asks the coordinator for a new
//! access token. The first caller starts the one refresh call; callers that
//! arrive while it is in flight are queued behind it. When the refresh
//! settles the queue is drained in one pass, in enqueue order: everyone gets
//! the new token, or everyone gets the same error.
//!
//! ```text
//!        401, refresh token stored
//! Idle ─────────────────────────────▶ Refreshing { waiters: [leader] }
//!  ▲                                     │  401 → push waiter
//!  │        refresh settled              │
//!  └─────── drain waiters ◀──────────────┘
//! ```
//!
//! The refresh runs on its own task, so dropping the caller that started it
//! does not strand the queue.

use std::sync::Arc;

use marketplace_auth::{CredentialStore, refresh_access};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};
use transport::Transport;

use crate::metrics;

type Outcome = std::result::Result<String, marketplace_auth::Error>;

enum RefreshState {
    Idle,
    Refreshing { waiters: Vec<oneshot::Sender<Outcome>> },
}

/// What a caller holding a 401 should do next.
#[derive(Debug)]
pub(crate) enum Recovery {
    /// Replay with this access token.
    Refreshed(String),
    /// Nothing to refresh with; credentials were cleared. Surface the 401.
    NoRefreshToken,
    /// The refresh failed; credentials were cleared.
    Failed(marketplace_auth::Error),
}

#[derive(Clone)]
pub(crate) struct RefreshCoordinator {
    state: Arc<Mutex<RefreshState>>,
    store: Arc<CredentialStore>,
    transport: Arc<dyn Transport>,
}

impl RefreshCoordinator {
    pub(crate) fn new(store: Arc<CredentialStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RefreshState::Idle)),
            store,
            transport,
        }
    }

    pub(crate) async fn is_refreshing(&self) -> bool {
        matches!(*self.state.lock().await, RefreshState::Refreshing { .. })
    }

    /// Obtain a fresh access token after a 401, joining an in-flight refresh
    /// if there is one.
    pub(crate) async fn recover(&self) -> Recovery {
        let Some(refresh) = self.store.refresh().await else {
            warn!("401 without a refresh token, clearing credentials");
            self.store.clear().await;
            return Recovery::NoRefreshToken;
        };

        let (tx, rx) = oneshot::channel();
        let leader = {
            let mut state = self.state.lock().await;
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    waiters.push(tx);
                    false
                }
                idle @ RefreshState::Idle => {
                    *idle = RefreshState::Refreshing { waiters: vec![tx] };
                    true
                }
            }
        };

        if leader {
            info!("access token rejected, refreshing");
            let this = self.clone();
            tokio::spawn(async move { this.run_refresh(refresh).await });
        } else {
            debug!("refresh already in flight, queued");
            metrics::record_queued_waiter();
        }

        match rx.await {
            Ok(Ok(access)) => Recovery::Refreshed(access),
            Ok(Err(e)) => Recovery::Failed(e),
            Err(_) => Recovery::Failed(marketplace_auth::Error::TokenRefresh(
                "refresh task ended without settling".into(),
            )),
        }
    }

    /// Perform the refresh call, update the store, then settle every waiter.
    ///
    /// The store is only touched while it still holds `refresh`: a logout
    /// or login during the call wins, and the waiters get `Superseded`.
    async fn run_refresh(&self, refresh: String) {
        let outcome = match refresh_access(self.transport.as_ref(), &refresh).await {
            Ok(refreshed) => {
                let access = refreshed.access.expose().clone();
                let rotated = refreshed.refresh.map(|t| t.expose().clone());
                let is_rotated = rotated.is_some();
                if self
                    .store
                    .apply_refresh(&refresh, access.clone(), rotated)
                    .await
                {
                    if is_rotated {
                        debug!("refresh token rotated");
                    }
                    metrics::record_refresh("success");
                    info!("access token refreshed");
                    Ok(access)
                } else {
                    warn!("credentials changed during refresh, discarding new token");
                    metrics::record_refresh("superseded");
                    Err(marketplace_auth::Error::Superseded)
                }
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, clearing credentials");
                if !self.store.clear_if_refresh(&refresh).await {
                    debug!("credentials replaced during refresh, keeping them");
                }
                metrics::record_refresh("failure");
                Err(e)
            }
        };

        let waiters = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, RefreshState::Idle) {
                RefreshState::Refreshing { waiters } => waiters,
                RefreshState::Idle => Vec::new(),
            }
        };
        debug!(waiters = waiters.len(), "settling refresh queue");
        for waiter in waiters {
            // A dropped receiver means that caller went away
            let _ = waiter.send(outcome.clone());
        }
    }
}
