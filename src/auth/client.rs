//! HTTP client for the relying-party backend.
//!
//! Two calls: `POST /api/auth/siwa` trades an Apple identity token for a
//! session token and profile, `GET /api/users/me` reads the profile back
//! with that session token.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use super::response::parse_response;
use super::session::SessionStore;
use super::transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, TransportError,
};
use super::types::{mask_token, IdentityAssertion, SiwaAuthRequest, UserProfile, UserResponse};
use crate::config::SdkConfig;
use crate::error::{AuthError, SdkError};

const SIWA_PATH: &str = "/api/auth/siwa";
const PROFILE_PATH: &str = "/api/users/me";
const JSON_CONTENT_TYPE: &str = "application/json";

pub struct AuthClient {
    base_url: String,
    timeout: Duration,
    transport: Arc<dyn HttpTransport>,
    session: Arc<SessionStore>,
}

impl AuthClient {
    /// Client backed by `reqwest`, configured from `config`.
    pub fn from_config(config: &SdkConfig, session: Arc<SessionStore>) -> Result<Self, SdkError> {
        let transport = ReqwestTransport::new(config.timeout(), &config.user_agent)
            .map_err(|e| SdkError::Internal(e.0))?;
        Ok(Self::with_transport(
            config.base_url.clone(),
            config.timeout(),
            Arc::new(transport),
            session,
        ))
    }

    pub fn with_transport(
        base_url: impl Into<String>,
        timeout: Duration,
        transport: Arc<dyn HttpTransport>,
        session: Arc<SessionStore>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            transport,
            session,
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Exchange an identity assertion for a backend session.
    ///
    /// On success the issued access token (possibly none) replaces the
    /// session slot and the user's profile is returned.
    pub async fn exchange_identity_assertion(
        &self,
        assertion: IdentityAssertion,
    ) -> Result<UserProfile, AuthError> {
        let token = assertion.token.ok_or(AuthError::IdentityTokenMissing)?;
        let token = String::from_utf8(token).map_err(|_| AuthError::TokenNotDecodable)?;

        debug!(
            "Exchanging identity token {} (email hint present: {})",
            mask_token(&token),
            assertion.email.is_some()
        );

        let body = SiwaAuthRequest {
            first_name: assertion.first_name,
            last_name: assertion.last_name,
            apple_identity_token: token,
        };
        let body = serde_json::to_vec(&body)
            .map_err(|e| AuthError::RequestEncodingFailed(e.to_string()))?;

        let request = HttpRequest::new(Method::Post, self.url(SIWA_PATH))
            .header("Content-Type", JSON_CONTENT_TYPE)
            .body(body);

        let response: UserResponse = parse_response(self.send(request).await)?;

        match response.access_token.as_deref() {
            Some(t) => info!("Identity token exchanged, session {}", mask_token(t)),
            None => warn!("Identity token exchanged but backend issued no access token"),
        }
        self.session.set(response.access_token);

        Ok(response.user)
    }

    /// Fetch the signed-in user's profile.
    ///
    /// Fails with `Unauthorized` without touching the network when no
    /// session token is held.
    pub async fn fetch_profile(&self) -> Result<UserProfile, AuthError> {
        let access_token = self.session.access_token().ok_or(AuthError::Unauthorized)?;

        let request = HttpRequest::new(Method::Get, self.url(PROFILE_PATH))
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", JSON_CONTENT_TYPE);

        let response: UserResponse = parse_response(self.send(request).await)?;
        debug!("Fetched profile for user {}", response.user.id);
        Ok(response.user)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportError(format!(
                "Request timed out after {}s",
                self.timeout.as_secs_f64()
            ))),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
