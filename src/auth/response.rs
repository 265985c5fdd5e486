//! Shared response handling for the exchange and profile calls.

use serde::de::DeserializeOwned;

use super::transport::{HttpResponse, TransportError};
use crate::error::AuthError;

/// Turn a raw transport outcome into a decoded body.
///
/// Checks run in a fixed order and stop at the first failure: transport
/// error, malformed response, non-2xx status, undecodable body.
pub fn parse_response<T: DeserializeOwned>(
    outcome: Result<HttpResponse, TransportError>,
) -> Result<T, AuthError> {
    let response = outcome.map_err(|e| AuthError::Transport(e.0))?;

    if !(100..=599).contains(&response.status) {
        return Err(AuthError::InvalidResponse);
    }

    if !(200..=299).contains(&response.status) {
        return Err(AuthError::HttpError(response.status));
    }

    serde_json::from_slice(&response.body)
        .map_err(|e| AuthError::ResponseDecodingFailed(e.to_string()))
}
