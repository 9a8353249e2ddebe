//! Authenticated API client for the marketplace backend
//!
//! Attaches the stored bearer token to every request, and recovers from an
//! expired access token without the caller noticing:
//! 1. A request comes back 401
//! 2. One refresh call runs; other 401s arriving meanwhile wait for it
//! 3. The refresh settles and every waiter is resolved in one pass
//! 4. Each waiter replays its request once with the new token
//! 5. If the refresh fails, credentials are wiped and every waiter fails
//!
//! Network failures are surfaced immediately and never retried.

mod coordinator;
mod dispatch;

pub mod client;
pub mod error;
pub mod metrics;

pub use client::{ApiClient, Profile};
pub use dispatch::Attempt;
pub use error::{Error, ErrorCode, Result, extract_message};
pub use tokio_util::sync::CancellationToken;
pub use transport::{ApiRequest, ApiResponse, FormPart, Method, MultipartForm, StatusCode};
