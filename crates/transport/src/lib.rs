//! HTTP transport abstraction for the marketplace REST API
//!
//! Defines the `Transport` trait that decouples the authenticated client from
//! the HTTP stack. `ReqwestTransport` is the production implementation; the
//! client, the token endpoint helpers and the tests all talk to the backend
//! through the same trait object.
//!
//! A transport resolves the request path against the API base URL, sends
//! exactly what it is given and returns the response verbatim, including
//! non-2xx statuses. Credential attachment and 401 handling belong to the
//! layers above.

pub mod error;
pub mod request;
pub mod reqwest_transport;

pub use error::{Error, Result};
pub use request::{ApiRequest, ApiResponse, FormPart, MultipartForm};
pub use reqwest::{Method, StatusCode, header};
pub use reqwest_transport::ReqwestTransport;

use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by transports.
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;

/// Abstraction over the HTTP round trip to the marketplace backend.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    /// Identifier for logging (e.g. "reqwest")
    fn id(&self) -> &str;

    /// Send one request and return the response, whatever its status.
    ///
    /// Errors are reserved for the cases where no response was received at
    /// all (connect failure, timeout, body read failure).
    fn send<'a>(&'a self, request: &'a ApiRequest) -> SendFuture<'a>;
}
