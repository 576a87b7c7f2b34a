//! The lifecycle orchestrator: the public operation surface of the engine.
//!
//! A [`TokenEngine`] sequences claims construction, hook dispatch, key
//! resolution, the codec, and the claim verifier, and defines the state
//! transitions between token instances: a minted token verifies any number
//! of times; refresh and exchange each produce a new minted token and mark
//! the source for revocation; revocation itself is a hook invocation, not a
//! ledger.
//!
//! Every call resolves its own secret material and reads the clock itself:
//! the engine holds no mutable state and is safe to share across tasks.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::claims::{self, Claims, PermissionsEncoder};
use crate::codec::{HeaderParams, JwtCodec, TokenCodec, TokenHeader};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::hooks::{Hooks, NoopHooks};
use crate::keys::{self, HttpKeyFetcher, KeyFetcher, KeyLocator};
use crate::serialize::SubjectSerializer;
use crate::verify::{ClaimVerifier, Expectations};

/// Claims dropped before re-minting on refresh and exchange, forcing fresh
/// values.
const REGENERATED_CLAIMS: [&str; 4] = ["jti", "iat", "exp", "nbf"];

/// The token lifecycle engine.
pub struct TokenEngine<S: SubjectSerializer> {
    config: EngineConfig,
    serializer: S,
    codec: Arc<dyn TokenCodec>,
    hooks: Arc<dyn Hooks>,
    verifier: ClaimVerifier,
    permissions: Option<Arc<dyn PermissionsEncoder>>,
    key_fetcher: Arc<dyn KeyFetcher>,
}

/// Builder for [`TokenEngine`], selecting the codec, hook set, claim
/// verifier, permissions encoder, and key fetcher at configuration time.
pub struct TokenEngineBuilder<S: SubjectSerializer> {
    config: EngineConfig,
    serializer: S,
    codec: Option<Arc<dyn TokenCodec>>,
    hooks: Option<Arc<dyn Hooks>>,
    verifier: Option<ClaimVerifier>,
    permissions: Option<Arc<dyn PermissionsEncoder>>,
    key_fetcher: Option<Arc<dyn KeyFetcher>>,
}

impl<S: SubjectSerializer> TokenEngineBuilder<S> {
    /// Replace the default [`JwtCodec`].
    pub fn codec(mut self, codec: Arc<dyn TokenCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Install a hook set. Defaults to [`NoopHooks`].
    pub fn hooks(mut self, hooks: Arc<dyn Hooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Replace the standard claim verifier chain.
    pub fn verifier(mut self, verifier: ClaimVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Install a permissions encoder for the opaque `"pems"` sub-map.
    pub fn permissions(mut self, encoder: Arc<dyn PermissionsEncoder>) -> Self {
        self.permissions = Some(encoder);
        self
    }

    /// Replace the default HTTP key fetcher, e.g. to add caching or retries.
    pub fn key_fetcher(mut self, fetcher: Arc<dyn KeyFetcher>) -> Self {
        self.key_fetcher = Some(fetcher);
        self
    }

    /// Assemble the engine.
    pub fn build(self) -> TokenEngine<S> {
        TokenEngine {
            config: self.config,
            serializer: self.serializer,
            codec: self.codec.unwrap_or_else(|| Arc::new(JwtCodec)),
            hooks: self.hooks.unwrap_or_else(|| Arc::new(NoopHooks)),
            verifier: self.verifier.unwrap_or_default(),
            permissions: self.permissions,
            key_fetcher: self
                .key_fetcher
                .unwrap_or_else(|| Arc::new(HttpKeyFetcher::new())),
        }
    }
}

impl<S: SubjectSerializer> TokenEngine<S> {
    /// An engine with all default collaborators.
    pub fn new(config: EngineConfig, serializer: S) -> Self {
        Self::builder(config, serializer).build()
    }

    /// Start building an engine with custom collaborators.
    pub fn builder(config: EngineConfig, serializer: S) -> TokenEngineBuilder<S> {
        TokenEngineBuilder {
            config,
            serializer,
            codec: None,
            hooks: None,
            verifier: None,
            permissions: None,
            key_fetcher: None,
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Mint a signed token for a resource.
    ///
    /// Sequence: subject serialization → claims construction →
    /// `before_encode_and_sign` hook (may veto) → signing-key resolution →
    /// codec encode → `after_encode_and_sign` hook (best-effort).
    pub async fn encode_and_sign(
        &self,
        resource: &S::Resource,
        token_type: Option<&str>,
        caller_claims: Map<String, Value>,
    ) -> Result<(String, Claims)> {
        let subject = self.serializer.for_token(resource).await?;
        self.mint(&subject, token_type, caller_claims).await
    }

    async fn mint(
        &self,
        subject: &str,
        token_type: Option<&str>,
        caller_claims: Map<String, Value>,
    ) -> Result<(String, Claims)> {
        let claims = claims::build(
            subject,
            token_type,
            caller_claims,
            &self.config,
            self.permissions.as_deref(),
        )?;
        let minted_type = claims
            .token_type()
            .unwrap_or(self.config.default_token_type.as_str())
            .to_string();
        let claims = self
            .hooks
            .before_encode_and_sign(subject, &minted_type, claims)
            .await?;

        let (key, algorithm) = keys::signing_key(&self.config)?;
        let token = self
            .codec
            .encode(&claims, &key, algorithm, &HeaderParams::default())?;

        if let Err(e) = self.hooks.after_encode_and_sign(&claims, &token).await {
            warn!(error = %e, "after_encode_and_sign hook failed");
        }
        debug!(subject, token_type = %minted_type, "minted token");
        Ok((token, claims))
    }

    /// Decode a wire token, check its signature against the candidate keys,
    /// verify its claims, and run the `on_verify` hook.
    ///
    /// The header-declared algorithm is authoritative: it must be a member
    /// of the configured allow-list or the token is rejected before any key
    /// work. A header carrying a remote key locator takes the trust-gated
    /// fetch path instead of the configured secret.
    pub async fn decode_and_verify(
        &self,
        token: &str,
        expected: &Expectations,
    ) -> Result<Claims> {
        let header = self.codec.peek_header(token)?;
        if !self.config.allowed_algorithms.contains(&header.algorithm) {
            warn!(algorithm = ?header.algorithm, "token algorithm not in the allow-list");
            return Err(Error::InvalidToken(format!(
                "algorithm {:?} is not allowed",
                header.algorithm
            )));
        }

        let candidates = match &header.key_url {
            Some(url) => {
                let locator = KeyLocator {
                    url: url.clone(),
                    key_id: header.key_id.clone(),
                };
                vec![
                    keys::remote_candidate(
                        &self.config,
                        self.key_fetcher.as_ref(),
                        &locator,
                        header.algorithm,
                    )
                    .await?,
                ]
            }
            None => keys::verification_candidates(&self.config, header.algorithm)?,
        };

        let claims = self.codec.verify_signature(token, &candidates)?;
        self.verifier.verify(&claims, expected, &self.config)?;
        self.hooks.on_verify(claims, token).await
    }

    /// [`Self::decode_and_verify`] for callers that treat failure as fatal.
    ///
    /// # Panics
    ///
    /// Panics when verification fails.
    pub async fn decode_and_verify_or_panic(
        &self,
        token: &str,
        expected: &Expectations,
    ) -> Claims {
        match self.decode_and_verify(token, expected).await {
            Ok(claims) => claims,
            Err(e) => panic!("token verification failed: {e}"),
        }
    }

    /// Verify a token and mint its replacement with the same subject, type,
    /// and custom claims but fresh `jti`/`iat`/`exp` (and no `nbf` unless
    /// re-supplied in `overrides`). The original is revoked best-effort
    /// after the replacement exists.
    ///
    /// Any verification failure on the input aborts the whole operation
    /// before a new token is minted.
    pub async fn refresh(
        &self,
        token: &str,
        overrides: Map<String, Value>,
    ) -> Result<(String, Claims)> {
        let old_claims = self.decode_and_verify(token, &Expectations::none()).await?;
        let subject = require_subject(&old_claims)?;
        let token_type = old_claims.token_type().map(str::to_string);

        let mut next = old_claims.clone().into_map();
        for key in REGENERATED_CLAIMS {
            next.remove(key);
        }
        for (key, value) in overrides {
            next.insert(key, value);
        }

        let (new_token, new_claims) = self.mint(&subject, token_type.as_deref(), next).await?;
        self.revoke_superseded(token, &old_claims).await;
        if let Err(e) = self
            .hooks
            .on_refresh(token, &old_claims, &new_token, &new_claims)
            .await
        {
            warn!(error = %e, "on_refresh hook failed");
        }
        Ok((new_token, new_claims))
    }

    /// [`Self::refresh`] for callers that treat failure as fatal.
    ///
    /// # Panics
    ///
    /// Panics when the refresh fails.
    pub async fn refresh_or_panic(
        &self,
        token: &str,
        overrides: Map<String, Value>,
    ) -> (String, Claims) {
        match self.refresh(token, overrides).await {
            Ok(minted) => minted,
            Err(e) => panic!("token refresh failed: {e}"),
        }
    }

    /// Verify a token, assert its type is one of `from_types`, and mint a
    /// replacement of `to_type` with fresh `jti`/`iat`/`exp`. On a type
    /// mismatch nothing is minted and the original stays intact.
    pub async fn exchange(
        &self,
        token: &str,
        from_types: &[&str],
        to_type: &str,
        overrides: Map<String, Value>,
    ) -> Result<(String, Claims)> {
        let old_claims = self.decode_and_verify(token, &Expectations::none()).await?;
        let found = old_claims.token_type().unwrap_or_default().to_string();
        if !from_types.contains(&found.as_str()) {
            debug!(%found, ?from_types, "exchange refused: source type not allowed");
            return Err(Error::IncorrectTokenType {
                found,
                allowed: from_types.iter().map(|t| (*t).to_string()).collect(),
            });
        }
        let subject = require_subject(&old_claims)?;

        let mut next = old_claims.clone().into_map();
        for key in REGENERATED_CLAIMS {
            next.remove(key);
        }
        next.insert("typ".to_string(), Value::String(to_type.to_string()));
        for (key, value) in overrides {
            next.insert(key, value);
        }

        let (new_token, new_claims) = self.mint(&subject, Some(to_type), next).await?;
        self.revoke_superseded(token, &old_claims).await;
        if let Err(e) = self
            .hooks
            .on_exchange(token, &old_claims, &new_token, &new_claims)
            .await
        {
            warn!(error = %e, "on_exchange hook failed");
        }
        Ok((new_token, new_claims))
    }

    /// Invoke the revocation hook for a token. The engine holds no
    /// revocation ledger; revoking an already-invalid or already-expired
    /// token is not an error at this layer.
    pub async fn revoke(&self, token: &str, claims: Claims) -> Result<Claims> {
        self.hooks.on_revoke(claims, token).await
    }

    /// Best-effort revocation of a token superseded by refresh or exchange.
    async fn revoke_superseded(&self, token: &str, claims: &Claims) {
        if let Err(e) = self.hooks.on_revoke(claims.clone(), token).await {
            warn!(error = %e, "revocation hook failed for superseded token");
        }
    }

    /// Decode the token header without verifying the signature.
    pub fn peek_header(&self, token: &str) -> Result<TokenHeader> {
        self.codec.peek_header(token)
    }

    /// Decode the token claims without verifying the signature.
    pub fn peek_claims(&self, token: &str) -> Result<Claims> {
        self.codec.peek_claims(token)
    }

    /// Recover the resource behind a verified claim set through the subject
    /// serializer.
    pub async fn resource_for_claims(&self, claims: &Claims) -> Result<S::Resource> {
        let subject = require_subject(claims)?;
        self.serializer.from_token(&subject).await
    }
}

fn require_subject(claims: &Claims) -> Result<String> {
    claims
        .subject()
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidToken("token has no sub claim".to_string()))
}

impl<S: SubjectSerializer> std::fmt::Debug for TokenEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEngine")
            .field("config", &self.config)
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}
