//! Error taxonomy for the token lifecycle engine.
//!
//! Every lifecycle step reports failure as an explicit [`Error`] value; the
//! orchestrator never recovers an error locally, it short-circuits and returns
//! the first failure. Only the `*_or_panic` convenience wrappers convert an
//! error into a panic, for callers that prefer that style.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the token lifecycle engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Token carries no signature segment.
    #[error("token has no signature")]
    MissingSignature,

    /// Signature check failed against the single verification key.
    #[error("token signature is invalid")]
    InvalidSignature,

    /// Malformed structure, disallowed algorithm, or exhausted verification
    /// candidates.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The `exp` claim is in the past (beyond the allowed drift).
    #[error("token is expired")]
    TokenExpired,

    /// The `nbf` or `iat` claim is in the future (beyond the allowed drift).
    #[error("token is not yet valid")]
    TokenNotYetValid,

    /// The `iss` claim does not match the configured issuer.
    #[error("token issuer does not match the configured issuer")]
    InvalidIssuer,

    /// The `aud` claim does not match the expected audience.
    #[error("token audience does not match the expected audience")]
    InvalidAudience,

    /// The `typ` claim does not match the expected type.
    #[error("token type does not match the expected type")]
    InvalidType,

    /// A literal expected claim did not match; names the offending key.
    #[error("claim {0:?} does not match the expected value")]
    InvalidClaim(String),

    /// Exchange refused: the source token's type is not in the allowed set.
    #[error("token type {found:?} cannot be exchanged here (allowed: {allowed:?})")]
    IncorrectTokenType {
        /// Type declared by the source token.
        found: String,
        /// Types the exchange was willing to accept.
        allowed: Vec<String>,
    },

    /// A remote key locator pointed at an origin outside the allow-list.
    /// Returned before any network call is made.
    #[error("key source {0} is not a trusted origin")]
    UntrustedKeySource(String),

    /// No usable key material could be produced from the secret descriptor.
    #[error("key resolution failed: {0}")]
    KeyResolutionFailed(String),

    /// Invalid or missing configuration. Fatal at initialization.
    #[error("configuration error: {0}")]
    Config(String),

    /// Application-specific reason returned by a hook or the subject
    /// serializer, passed through verbatim.
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Application-specific failure with a verbatim reason, for hook and
    /// serializer implementations.
    pub fn custom(reason: impl Into<String>) -> Self {
        Self::Custom(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offending_claim() {
        let err = Error::InvalidClaim("org_id".to_string());
        assert!(err.to_string().contains("org_id"));
    }

    #[test]
    fn incorrect_token_type_reports_both_sides() {
        let err = Error::IncorrectTokenType {
            found: "access".to_string(),
            allowed: vec!["refresh".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("access"));
        assert!(msg.contains("refresh"));
    }

    #[test]
    fn custom_reason_is_verbatim() {
        assert_eq!(Error::custom("token was revoked").to_string(), "token was revoked");
    }
}
