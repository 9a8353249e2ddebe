//! Marketplace JWT authentication library
//!
//! Credential storage and token endpoint calls for the marketplace backend.
//! This crate knows nothing about request retries; the 401 → refresh →
//! replay cycle lives in `marketplace-client`.
//!
//! Credential flow:
//! 1. Login calls `token::obtain_pair()` with username + password
//! 2. Pair stored via `CredentialStore::set_pair()`
//! 3. On a 401 the client calls `token::refresh_access()` with the refresh token
//! 4. New access token saved via `CredentialStore::set_access()`
//! 5. Logout or a rejected refresh wipes both via `CredentialStore::clear()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::CredentialStore;
pub use error::{Error, Result};
pub use token::{RefreshedToken, TokenPair, obtain_pair, refresh_access, verify};
