//! SDK error types, error codes, and last-error storage for the C API.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use thiserror::Error;

// ── Error codes ─────────────────────────────────────────────────────────────

pub const SUCCESS: i32 = 0;
pub const ERROR_INVALID_PARAM: i32 = -1;
pub const ERROR_NOT_INITIALIZED: i32 = -2;
pub const ERROR_BUSY: i32 = -3;
pub const ERROR_UNAUTHORIZED: i32 = -4;
pub const ERROR_INTERNAL: i32 = -5;
pub const ERROR_AUTH: i32 = -6;
pub const ERROR_NETWORK: i32 = -7;
pub const ERROR_CONFIG: i32 = -8;

// ── Protocol errors ─────────────────────────────────────────────────────────

/// Failure of a single exchange or profile call.
///
/// Every variant is terminal for the current attempt; nothing is retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Identity token missing from the authorization result")]
    IdentityTokenMissing,

    #[error("Identity token is not valid UTF-8")]
    TokenNotDecodable,

    #[error("Failed to encode request body: {0}")]
    RequestEncodingFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid HTTP response")]
    InvalidResponse,

    #[error("HTTP error: status {0}")]
    HttpError(u16),

    #[error("Failed to decode response body: {0}")]
    ResponseDecodingFailed(String),

    #[error("Unauthorized: no session token")]
    Unauthorized,
}

/// Failure of a full sign-in attempt, tagged with the stage that raised it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignInError {
    #[error("A sign-in attempt is already in progress")]
    InProgress,

    #[error("Authorization failed: {0}")]
    Ceremony(String),

    #[error("Unsupported credential type: {0}")]
    UnsupportedCredential(&'static str),

    #[error("Token exchange failed: {0}")]
    Exchange(AuthError),

    #[error("Profile fetch failed: {0}")]
    Profile(AuthError),

    #[error("Sign-in cancelled by sign-out")]
    Cancelled,
}

impl SignInError {
    /// The underlying protocol error, if this failure came from a network stage.
    pub fn auth_error(&self) -> Option<&AuthError> {
        match self {
            SignInError::Exchange(e) | SignInError::Profile(e) => Some(e),
            _ => None,
        }
    }
}

// ── SdkError enum ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Not initialized")]
    NotInitialized,

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SdkError {
    /// Map this error to its integer error code for the C API.
    pub fn code(&self) -> i32 {
        match self {
            SdkError::Auth(_) => ERROR_AUTH,
            SdkError::Network(_) => ERROR_NETWORK,
            SdkError::Unauthorized => ERROR_UNAUTHORIZED,
            SdkError::Config(_) => ERROR_CONFIG,
            SdkError::InvalidParam(_) => ERROR_INVALID_PARAM,
            SdkError::NotInitialized => ERROR_NOT_INITIALIZED,
            SdkError::Busy(_) => ERROR_BUSY,
            SdkError::Internal(_) => ERROR_INTERNAL,
        }
    }
}

impl From<AuthError> for SdkError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Transport(_) => SdkError::Network(err.to_string()),
            AuthError::Unauthorized => SdkError::Unauthorized,
            other => SdkError::Auth(other.to_string()),
        }
    }
}

impl From<SignInError> for SdkError {
    fn from(err: SignInError) -> Self {
        match err {
            SignInError::InProgress => SdkError::Busy(err.to_string()),
            SignInError::Exchange(AuthError::Transport(_))
            | SignInError::Profile(AuthError::Transport(_)) => SdkError::Network(err.to_string()),
            SignInError::Profile(AuthError::Unauthorized) => SdkError::Unauthorized,
            other => SdkError::Auth(other.to_string()),
        }
    }
}

// ── Last-error storage ──────────────────────────────────────────────────────

static LAST_ERROR: Lazy<Mutex<Option<String>>> = Lazy::new(|| Mutex::new(None));
static LAST_ERROR_CODE: Lazy<Mutex<i32>> = Lazy::new(|| Mutex::new(SUCCESS));

/// Store an `SdkError`, recording both the message and code.
pub fn set_sdk_error(err: &SdkError) {
    *LAST_ERROR_CODE.lock() = err.code();
    *LAST_ERROR.lock() = Some(err.to_string());
}

/// Clear the stored error.
pub fn clear_error() {
    *LAST_ERROR.lock() = None;
    *LAST_ERROR_CODE.lock() = SUCCESS;
}

/// Take the last error message, leaving `None` behind.
pub fn take_last_error() -> Option<String> {
    LAST_ERROR.lock().take()
}

/// Return the last error code without clearing it.
pub fn last_error_code() -> i32 {
    *LAST_ERROR_CODE.lock()
}
