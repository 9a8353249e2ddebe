//! Marketplace backend endpoint constants
//!
//! Paths are relative to the API base URL. They match the SimpleJWT routes
//! mounted by the backend under `/api/auth/`.

/// API base used when neither config nor environment provides one
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api";

/// Obtain an access/refresh pair from username + password
pub const TOKEN_PATH: &str = "/auth/token/";

/// Mint a new access token from a refresh token
pub const REFRESH_PATH: &str = "/auth/token/refresh/";

/// Check whether a token is still valid
pub const VERIFY_PATH: &str = "/auth/token/verify/";

/// Current user profile (user, roles, vendor id)
pub const ME_PATH: &str = "/auth/me/";
