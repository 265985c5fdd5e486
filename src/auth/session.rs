//! In-memory session context shared by the exchange and profile clients.

use chrono::Utc;
use log::debug;
use parking_lot::RwLock;

use super::types::{mask_token, Session};

/// Holds the current session token for the lifetime of the process, or
/// until cleared on sign-out. Nothing is persisted.
#[derive(Debug, Default)]
pub struct SessionStore {
    slot: RwLock<Option<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored token. `None` empties the slot.
    pub fn set(&self, access_token: Option<String>) {
        let session = access_token.map(|access_token| {
            debug!("Storing session token {}", mask_token(&access_token));
            Session {
                access_token,
                issued_at: Utc::now(),
            }
        });
        if session.is_none() {
            debug!("Backend issued no session token; session slot emptied");
        }
        *self.slot.write() = session;
    }

    pub fn access_token(&self) -> Option<String> {
        self.slot.read().as_ref().map(|s| s.access_token.clone())
    }

    pub fn session(&self) -> Option<Session> {
        self.slot.read().clone()
    }

    pub fn has_token(&self) -> bool {
        self.slot.read().is_some()
    }

    pub fn clear(&self) {
        *self.slot.write() = None;
    }
}
