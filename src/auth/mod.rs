//! Authentication module for the Sign in with Apple SDK
//!
//! Exchanges an Apple identity token with the relying-party backend:
//! - `POST /api/auth/siwa` trades the token for a session and profile
//! - `GET /api/users/me` reads the profile back with the session token
//! - Session token held in memory only

pub mod client;
pub mod manager;
pub mod response;
pub mod session;
pub mod transport;
pub mod types;

pub use client::AuthClient;
pub use manager::AuthManager;
pub use session::SessionStore;
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, TransportError,
};
pub use types::*;
