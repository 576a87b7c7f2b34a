//! Lifecycle hook dispatch.
//!
//! A [`Hooks`] implementation is selected once at engine construction and
//! invoked at fixed lifecycle points. Every method has a pass-through
//! default, so implementations override only what they need. Hooks that
//! return `Err` veto the step; the error is passed through verbatim.
//!
//! The `on_verify` hook is the extension point for an external revocation
//! ledger: look up the claim set's `jti` and return an error to reject a
//! revoked token.

use async_trait::async_trait;

use crate::claims::Claims;
use crate::error::Result;

/// Configurable lifecycle callbacks.
#[async_trait]
pub trait Hooks: Send + Sync {
    /// Runs after claims construction, before signing. May adjust the claim
    /// set or veto the mint by returning an error.
    ///
    /// `subject` and `token_type` are informational snapshots; the values
    /// that reach the token live in `claims` (`sub`, `typ`), so an
    /// implementation that needs to rewrite them edits the claim set.
    async fn before_encode_and_sign(
        &self,
        subject: &str,
        token_type: &str,
        claims: Claims,
    ) -> Result<Claims> {
        let _ = (subject, token_type);
        Ok(claims)
    }

    /// Runs after a token is produced. Observational: an error here is
    /// logged by the engine and does not fail the mint.
    async fn after_encode_and_sign(&self, claims: &Claims, token: &str) -> Result<()> {
        let _ = (claims, token);
        Ok(())
    }

    /// Runs after signature and claim verification both passed. May replace
    /// the claim set or veto the verification by returning an error.
    async fn on_verify(&self, claims: Claims, token: &str) -> Result<Claims> {
        let _ = token;
        Ok(claims)
    }

    /// Runs after a refresh produced its replacement token. Observational.
    async fn on_refresh(
        &self,
        old_token: &str,
        old_claims: &Claims,
        new_token: &str,
        new_claims: &Claims,
    ) -> Result<()> {
        let _ = (old_token, old_claims, new_token, new_claims);
        Ok(())
    }

    /// Runs after an exchange produced its replacement token. Observational.
    async fn on_exchange(
        &self,
        old_token: &str,
        old_claims: &Claims,
        new_token: &str,
        new_claims: &Claims,
    ) -> Result<()> {
        let _ = (old_token, old_claims, new_token, new_claims);
        Ok(())
    }

    /// Runs when a token is revoked. An external tracking store would mark
    /// the claim set's `jti` invalid here. May veto by returning an error.
    async fn on_revoke(&self, claims: Claims, token: &str) -> Result<Claims> {
        let _ = token;
        Ok(claims)
    }
}

/// The default hook set: every callback passes through.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

#[async_trait]
impl Hooks for NoopHooks {}
