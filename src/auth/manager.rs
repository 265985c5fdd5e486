//! Authentication manager - drives a sign-in attempt from identity assertion
//! to signed-in profile, and owns the session for later profile calls.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rand::Rng;

use super::client::AuthClient;
use super::session::SessionStore;
use super::types::{
    AuthorizationCredential, CeremonyOutcome, IdentityAssertion, SignInState, UserProfile,
};
use crate::config::SdkConfig;
use crate::error::{AuthError, SdkError, SignInError};

type StateListener = Box<dyn Fn(&SignInState) + Send + Sync>;

/// Clears the in-flight flag when an attempt ends, including when its
/// future is dropped part-way.
struct AttemptGuard<'a>(&'a AtomicBool);

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Authentication manager.
pub struct AuthManager {
    state: Mutex<SignInState>,
    in_flight: AtomicBool,
    /// Bumped on every sign-out, only while `state` is locked. An attempt
    /// started under an older epoch no longer owns the state or session.
    epoch: AtomicU64,
    client: AuthClient,
    listener: Option<StateListener>,
}

impl AuthManager {
    /// Create a manager talking to the backend described by `config`.
    pub fn new(config: &SdkConfig) -> Result<Self, SdkError> {
        info!("Initializing AuthManager for backend {}", config.base_url);
        let client = AuthClient::from_config(config, Arc::new(SessionStore::new()))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: AuthClient) -> Self {
        Self {
            state: Mutex::new(SignInState::Idle),
            in_flight: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            client,
            listener: None,
        }
    }

    /// Install a callback invoked on every state transition.
    pub fn set_state_listener(&mut self, listener: impl Fn(&SignInState) + Send + Sync + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Get the current sign-in state.
    pub fn state(&self) -> SignInState {
        self.state.lock().clone()
    }

    /// Check if a user is signed in with a live session.
    pub fn is_signed_in(&self) -> bool {
        matches!(self.state(), SignInState::Succeeded(_)) && self.client.session().has_token()
    }

    /// Profile from the last successful sign-in.
    pub fn current_user(&self) -> Option<UserProfile> {
        match self.state() {
            SignInState::Succeeded(user) => Some(user),
            _ => None,
        }
    }

    /// Feed the result of a native authorization ceremony.
    pub async fn complete_authorization(
        &self,
        outcome: CeremonyOutcome,
    ) -> Result<UserProfile, SignInError> {
        let credential = match outcome {
            Ok(credential) => credential,
            Err(e) => {
                warn!("Authorization ceremony failed: {}", e.description);
                return Err(SignInError::Ceremony(e.description));
            }
        };

        match credential {
            AuthorizationCredential::AppleId(apple_id) => self.sign_in(apple_id.into()).await,
            other @ AuthorizationCredential::Password { .. } => {
                warn!("Ignoring {} credential; only Apple ID can be exchanged", other.kind());
                Err(SignInError::UnsupportedCredential(other.kind()))
            }
        }
    }

    /// Exchange `assertion` for a session, then fetch the profile.
    ///
    /// Stages run strictly in order with no retries. A call made while
    /// another attempt is running is rejected with `InProgress`. If
    /// `sign_out` runs before the attempt finishes, its result is dropped
    /// and the call fails with `Cancelled`.
    pub async fn sign_in(&self, assertion: IdentityAssertion) -> Result<UserProfile, SignInError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Rejecting sign-in: another attempt is in flight");
            return Err(SignInError::InProgress);
        }
        let _guard = AttemptGuard(&self.in_flight);

        let epoch = self.epoch.load(Ordering::Acquire);
        let attempt: u32 = rand::thread_rng().gen();
        info!("[{:08x}] Sign-in started", attempt);
        if !self.advance(epoch, SignInState::Exchanging) {
            return Err(self.discard(attempt));
        }

        if let Err(e) = self.client.exchange_identity_assertion(assertion).await {
            return Err(self.fail(attempt, epoch, SignInError::Exchange(e)));
        }

        if !self.advance(epoch, SignInState::FetchingProfile) {
            return Err(self.discard(attempt));
        }
        let profile = match self.client.fetch_profile().await {
            Ok(profile) => profile,
            Err(e) => return Err(self.fail(attempt, epoch, SignInError::Profile(e))),
        };

        if !self.advance(epoch, SignInState::Succeeded(profile.clone())) {
            return Err(self.discard(attempt));
        }
        info!("[{:08x}] Signed in as user {}", attempt, profile.id);
        Ok(profile)
    }

    /// Fetch the profile with the current session.
    pub async fn fetch_profile(&self) -> Result<UserProfile, AuthError> {
        self.client.fetch_profile().await
    }

    /// Drop the session and return to idle. An attempt still in flight is
    /// superseded and will not touch the state or session again.
    pub fn sign_out(&self) {
        match self.client.session().session() {
            Some(session) => info!("Signing out (session age {}s)", session.age().num_seconds()),
            None => info!("Signing out"),
        }
        {
            let mut state = self.state.lock();
            self.epoch.fetch_add(1, Ordering::AcqRel);
            self.client.session().clear();
            *state = SignInState::Idle;
        }
        if self.in_flight.load(Ordering::Acquire) {
            info!("Sign-out supersedes the sign-in attempt in flight");
        }
        debug!("Sign-in state -> {}", SignInState::Idle.status_text());
        self.notify(&SignInState::Idle);
    }

    /// Clear error state.
    pub fn clear_error(&self) {
        let cleared = {
            let mut state = self.state.lock();
            if matches!(*state, SignInState::Failed(_)) {
                *state = SignInState::Idle;
                true
            } else {
                false
            }
        };
        if cleared {
            self.notify(&SignInState::Idle);
        }
    }

    /// Access the underlying backend client.
    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    fn fail(&self, attempt: u32, epoch: u64, err: SignInError) -> SignInError {
        if !self.advance(epoch, SignInState::Failed(err.to_string())) {
            return self.discard(attempt);
        }
        error!("[{:08x}] Sign-in failed: {}", attempt, err);
        err
    }

    /// Move to `next` unless a sign-out has happened since `epoch`.
    fn advance(&self, epoch: u64, next: SignInState) -> bool {
        {
            let mut state = self.state.lock();
            if self.epoch.load(Ordering::Acquire) != epoch {
                return false;
            }
            *state = next.clone();
        }
        debug!("Sign-in state -> {}", next.status_text());
        self.notify(&next);
        true
    }

    fn discard(&self, attempt: u32) -> SignInError {
        // The exchange may have stored a token after the sign-out cleared it.
        self.client.session().clear();
        warn!("[{:08x}] Sign-in superseded by sign-out; result discarded", attempt);
        SignInError::Cancelled
    }

    fn notify(&self, state: &SignInState) {
        if let Some(listener) = &self.listener {
            listener(state);
        }
    }
}
