//! Authentication types for the Sign in with Apple SDK

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const TOKEN_MASK_PREFIX_LEN: usize = 6;
const TOKEN_MASK_SUFFIX_LEN: usize = 4;

/// Sign-in state
#[derive(Debug, Clone, PartialEq)]
pub enum SignInState {
    /// No attempt running
    Idle,
    /// Identity token being exchanged for a session
    Exchanging,
    /// Session established, profile request in flight
    FetchingProfile,
    /// Signed in
    Succeeded(UserProfile),
    /// Last attempt failed
    Failed(String),
}

impl SignInState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, SignInState::Exchanging | SignInState::FetchingProfile)
    }

    pub fn status_text(&self) -> &'static str {
        match self {
            SignInState::Idle => "Signed out",
            SignInState::Exchanging => "Exchanging identity token...",
            SignInState::FetchingProfile => "Fetching profile...",
            SignInState::Succeeded(_) => "Signed in",
            SignInState::Failed(_) => "Error",
        }
    }

    /// Convert to FFI-friendly integer code
    pub fn as_code(&self) -> i32 {
        match self {
            SignInState::Idle => 0,
            SignInState::Exchanging => 1,
            SignInState::FetchingProfile => 2,
            SignInState::Succeeded(_) => 3,
            SignInState::Failed(_) => -1,
        }
    }
}

impl Default for SignInState {
    fn default() -> Self {
        SignInState::Idle
    }
}

/// Authenticated user profile, as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Response body shared by `/api/auth/siwa` and `/api/users/me`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    pub user: UserProfile,
}

/// Request body for `/api/auth/siwa`.
///
/// The assertion's email is never sent; the backend reads it from the
/// identity token claims.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiwaAuthRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub apple_identity_token: String,
}

/// Identity assertion produced by one Apple ID authorization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityAssertion {
    /// Provider-signed identity token (compact JWS bytes)
    pub token: Option<Vec<u8>>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl IdentityAssertion {
    pub fn new(token: impl Into<Vec<u8>>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, first_name: Option<String>, last_name: Option<String>) -> Self {
        self.first_name = first_name;
        self.last_name = last_name;
        self
    }
}

/// Person name components as reported by the authorization ceremony.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullName {
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
}

/// Raw Apple ID credential handed over by the native ceremony.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppleIdCredential {
    pub identity_token: Option<Vec<u8>>,
    pub email: Option<String>,
    pub full_name: Option<FullName>,
}

impl From<AppleIdCredential> for IdentityAssertion {
    fn from(credential: AppleIdCredential) -> Self {
        let full_name = credential.full_name.unwrap_or_default();
        IdentityAssertion {
            token: credential.identity_token,
            email: credential.email,
            first_name: full_name.given_name,
            last_name: full_name.family_name,
        }
    }
}

/// Credential kinds an authorization ceremony can yield.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationCredential {
    AppleId(AppleIdCredential),
    /// Saved keychain password; not exchangeable with the backend.
    Password { user: String, password: String },
}

impl AuthorizationCredential {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthorizationCredential::AppleId(_) => "apple_id",
            AuthorizationCredential::Password { .. } => "password",
        }
    }
}

/// Error reported by the native ceremony (user cancelled, no network, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CeremonyError {
    pub description: String,
}

/// Result of one authorization ceremony.
pub type CeremonyOutcome = Result<AuthorizationCredential, CeremonyError>;

/// Session issued by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub issued_at: DateTime<Utc>,
}

impl Session {
    /// Time since the backend issued this session.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.issued_at
    }
}

/// Shorten a bearer token for log output.
pub fn mask_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let len = trimmed.len();
    if len <= TOKEN_MASK_PREFIX_LEN + TOKEN_MASK_SUFFIX_LEN || !trimmed.is_ascii() {
        return "*".repeat(len.min(8));
    }

    let prefix = &trimmed[..TOKEN_MASK_PREFIX_LEN];
    let suffix = &trimmed[len - TOKEN_MASK_SUFFIX_LEN..];
    format!("{prefix}...{suffix}")
}
