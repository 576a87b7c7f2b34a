//! Claim verification against expected literals and time/issuer/audience
//! rules.
//!
//! Checks run in a fixed order and short-circuit on the first failure; the
//! order only decides which single reason is surfaced. The chain is
//! pluggable: [`ClaimVerifier::with_check`] appends custom [`ClaimCheck`]s
//! after the standard ones.

use serde_json::{Map, Value};
use tracing::debug;

use crate::claims::{Claims, current_timestamp};
use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// What the caller expects of a decoded claim set. All fields are optional;
/// an empty value checks only the standard time/issuer rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expectations {
    /// Expected `aud` claim.
    pub audience: Option<String>,
    /// Expected `typ` claim.
    pub token_type: Option<String>,
    /// Arbitrary literal claims that must match exactly.
    pub literal: Map<String, Value>,
}

impl Expectations {
    /// No expectations beyond the standard rules.
    pub fn none() -> Self {
        Self::default()
    }

    /// Require an exact `aud` claim.
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Require an exact `typ` claim.
    pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    /// Require an exact value for an arbitrary claim key.
    pub fn claim(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.literal.insert(key.into(), value.into());
        self
    }
}

/// Shared context handed to every check: configuration, the current time,
/// and the allowed drift in seconds.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    /// Engine configuration.
    pub config: &'a EngineConfig,
    /// Current wall-clock time, integer seconds.
    pub now: i64,
    /// Allowed clock drift, seconds.
    pub drift: i64,
}

/// A single pluggable claim check.
pub trait ClaimCheck: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Pass or fail the claim set. The first failing check aborts the chain.
    fn check(&self, claims: &Claims, expected: &Expectations, ctx: &CheckContext<'_>)
    -> Result<()>;
}

struct IssuerCheck;

impl ClaimCheck for IssuerCheck {
    fn name(&self) -> &'static str {
        "issuer"
    }

    fn check(
        &self,
        claims: &Claims,
        _expected: &Expectations,
        ctx: &CheckContext<'_>,
    ) -> Result<()> {
        if !ctx.config.verify_issuer {
            return Ok(());
        }
        if claims.issuer() == Some(ctx.config.issuer()) {
            Ok(())
        } else {
            Err(Error::InvalidIssuer)
        }
    }
}

struct NotBeforeCheck;

impl ClaimCheck for NotBeforeCheck {
    fn name(&self) -> &'static str {
        "not-before"
    }

    fn check(
        &self,
        claims: &Claims,
        _expected: &Expectations,
        ctx: &CheckContext<'_>,
    ) -> Result<()> {
        match claims.not_before() {
            Some(nbf) if nbf > ctx.now + ctx.drift => Err(Error::TokenNotYetValid),
            _ => Ok(()),
        }
    }
}

struct IssuedAtCheck;

impl ClaimCheck for IssuedAtCheck {
    fn name(&self) -> &'static str {
        "issued-at"
    }

    fn check(
        &self,
        claims: &Claims,
        _expected: &Expectations,
        ctx: &CheckContext<'_>,
    ) -> Result<()> {
        match claims.issued_at() {
            Some(iat) if iat > ctx.now + ctx.drift => Err(Error::TokenNotYetValid),
            _ => Ok(()),
        }
    }
}

struct ExpiryCheck;

impl ClaimCheck for ExpiryCheck {
    fn name(&self) -> &'static str {
        "expiry"
    }

    fn check(
        &self,
        claims: &Claims,
        _expected: &Expectations,
        ctx: &CheckContext<'_>,
    ) -> Result<()> {
        match claims.expires_at() {
            Some(exp) if exp <= ctx.now - ctx.drift => Err(Error::TokenExpired),
            _ => Ok(()),
        }
    }
}

struct AudienceCheck;

impl ClaimCheck for AudienceCheck {
    fn name(&self) -> &'static str {
        "audience"
    }

    fn check(
        &self,
        claims: &Claims,
        expected: &Expectations,
        _ctx: &CheckContext<'_>,
    ) -> Result<()> {
        match &expected.audience {
            Some(audience) if claims.audience() != Some(audience.as_str()) => {
                Err(Error::InvalidAudience)
            }
            _ => Ok(()),
        }
    }
}

struct TypeCheck;

impl ClaimCheck for TypeCheck {
    fn name(&self) -> &'static str {
        "type"
    }

    fn check(
        &self,
        claims: &Claims,
        expected: &Expectations,
        _ctx: &CheckContext<'_>,
    ) -> Result<()> {
        match &expected.token_type {
            Some(token_type) if claims.token_type() != Some(token_type.as_str()) => {
                Err(Error::InvalidType)
            }
            _ => Ok(()),
        }
    }
}

struct LiteralClaimsCheck;

impl ClaimCheck for LiteralClaimsCheck {
    fn name(&self) -> &'static str {
        "literal-claims"
    }

    fn check(
        &self,
        claims: &Claims,
        expected: &Expectations,
        _ctx: &CheckContext<'_>,
    ) -> Result<()> {
        for (key, value) in &expected.literal {
            if claims.get(key) != Some(value) {
                return Err(Error::InvalidClaim(key.clone()));
            }
        }
        Ok(())
    }
}

/// The ordered chain of claim checks.
pub struct ClaimVerifier {
    checks: Vec<Box<dyn ClaimCheck>>,
}

impl ClaimVerifier {
    /// The standard chain: issuer, not-before, issued-at, expiry, audience,
    /// type, literal claims.
    pub fn standard() -> Self {
        Self {
            checks: vec![
                Box::new(IssuerCheck),
                Box::new(NotBeforeCheck),
                Box::new(IssuedAtCheck),
                Box::new(ExpiryCheck),
                Box::new(AudienceCheck),
                Box::new(TypeCheck),
                Box::new(LiteralClaimsCheck),
            ],
        }
    }

    /// Append a custom check after the standard chain.
    pub fn with_check(mut self, check: Box<dyn ClaimCheck>) -> Self {
        self.checks.push(check);
        self
    }

    /// Run the chain; the first failure is returned.
    pub fn verify(
        &self,
        claims: &Claims,
        expected: &Expectations,
        config: &EngineConfig,
    ) -> Result<()> {
        let ctx = CheckContext {
            config,
            now: current_timestamp(),
            drift: config.clock_drift().as_secs() as i64,
        };
        for check in &self.checks {
            if let Err(e) = check.check(claims, expected, &ctx) {
                debug!(check = check.name(), error = %e, "claim verification failed");
                return Err(e);
            }
        }
        Ok(())
    }
}

impl Default for ClaimVerifier {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for ClaimVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.checks.iter().map(|c| c.name()).collect();
        f.debug_struct("ClaimVerifier").field("checks", &names).finish()
    }
}
