//! Error types for fleet API clients.

use thiserror::Error;

use super::MachineState;

/// Errors raised by fleet API clients.
///
/// Variants are deliberately explicit so callers can branch exhaustively on
/// the failure class instead of inspecting wrapped errors or status codes.
/// The not-found class in particular drives the destruction-race diagnosis
/// during provisioning.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FleetError {
    /// Raised when the requested resource does not exist (HTTP 404 class).
    #[error("not found: {resource}")]
    NotFound {
        /// Description of the missing resource, usually a machine ID.
        resource: String,
    },
    /// Raised when the API rejects a request.
    #[error("fleet API error (status {status}): {message}")]
    Api {
        /// HTTP status code reported by the API.
        status: u16,
        /// Message body returned by the API.
        message: String,
    },
    /// Raised when the request never reaches the API or the connection drops.
    #[error("fleet transport error: {message}")]
    Transport {
        /// Underlying client error string.
        message: String,
    },
    /// Raised when a state wait does not converge within its budget.
    #[error("machine {machine_id} did not reach {state} within {secs}s")]
    WaitTimeout {
        /// Machine being waited on.
        machine_id: String,
        /// Target lifecycle state.
        state: MachineState,
        /// Wait budget in seconds.
        secs: u64,
    },
    /// Raised when a response body cannot be decoded.
    #[error("failed to decode fleet API response: {message}")]
    Decode {
        /// Decoder error string.
        message: String,
    },
}

impl FleetError {
    /// Returns `true` for the not-found failure class.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
