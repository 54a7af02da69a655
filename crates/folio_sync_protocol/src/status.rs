//! Cloud provider status taxonomy.

use std::fmt;

/// Outcome classification for a cloud provider call.
///
/// The engine decides retry behavior from the status alone: network
/// failures are retryable with backoff, authorization failures and missing
/// resources are surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudStatus {
    /// The call succeeded.
    Ok,
    /// Transient transport failure; safe to retry.
    NetworkError,
    /// The provider rejected the caller's credentials.
    AuthError,
    /// The addressed resource does not exist.
    NotFound,
}

impl CloudStatus {
    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::NetworkError)
    }

    /// Returns true if the call succeeded.
    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for CloudStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "ok",
            Self::NetworkError => "network error",
            Self::AuthError => "auth error",
            Self::NotFound => "not found",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_errors_are_retryable() {
        assert!(CloudStatus::NetworkError.is_retryable());
        assert!(!CloudStatus::Ok.is_retryable());
        assert!(!CloudStatus::AuthError.is_retryable());
        assert!(!CloudStatus::NotFound.is_retryable());
    }
}
