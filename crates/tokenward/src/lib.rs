//! # tokenward
//!
//! A pluggable token-based authentication core: mint, verify, refresh,
//! exchange, and revoke signed claims tokens without prescribing storage,
//! transport, or framework.
//!
//! ## Architecture
//!
//! The [`TokenEngine`] orchestrates five swappable collaborators:
//!
//! - **Codec** ([`TokenCodec`]): the wire format. The default is
//!   [`JwtCodec`], JSON Web Tokens in JWS compact serialization.
//! - **Subject serializer** ([`SubjectSerializer`]): maps application
//!   resources to the `sub` claim and back.
//! - **Hooks** ([`Hooks`]): lifecycle callbacks that can veto a mint or a
//!   verification, or observe refresh, exchange, and revocation. An external
//!   revocation ledger plugs in here.
//! - **Claim verifier** ([`ClaimVerifier`]): the ordered chain of claim
//!   checks, extensible with custom [`ClaimCheck`]s.
//! - **Key fetcher** ([`KeyFetcher`]): resolves remote key documents for
//!   tokens whose header names one, behind an origin allow-list that is
//!   checked before any network call.
//!
//! Secrets are described, not stored: a [`SecretDescriptor`] may hold raw
//! bytes, PEM material, a JWK, a [`ConfigValue`] resolved fresh at every
//! call, or an ordered sequence of candidates for key rotation.
//!
//! ## Verification flow
//!
//! 1. Decode the header; the declared algorithm must be on the configured
//!    allow-list before any key work happens.
//! 2. Resolve candidate keys (local descriptor, or the trust-gated remote
//!    path) and check the signature.
//! 3. Run the claim checks: issuer, not-before, issued-at, expiry, audience,
//!    type, then caller-supplied literals, short-circuiting on the first
//!    failure.
//! 4. Invoke the `on_verify` hook, which may still veto.
//!
//! ## Quick start
//!
//! ```rust
//! use serde_json::{Map, json};
//! use tokenward::{
//!     EngineConfig, Expectations, IdentitySerializer, SecretDescriptor, TokenEngine,
//! };
//!
//! # tokio_test::block_on(async {
//! let config = EngineConfig::builder()
//!     .issuer("my-app")
//!     .secret(SecretDescriptor::bytes(b"change-me".to_vec()))
//!     .default_ttl(json!({ "count": 15, "unit": "minutes" }))
//!     .build()
//!     .unwrap();
//! let engine = TokenEngine::new(config, IdentitySerializer);
//!
//! let mut claims = Map::new();
//! claims.insert("role".to_string(), json!("admin"));
//! let (token, _) = engine
//!     .encode_and_sign(&"user:42".to_string(), None, claims)
//!     .await
//!     .unwrap();
//!
//! let verified = engine
//!     .decode_and_verify(&token, &Expectations::none().claim("role", "admin"))
//!     .await
//!     .unwrap();
//! assert_eq!(verified.subject(), Some("user:42"));
//! # });
//! ```

pub mod claims;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod keys;
pub mod serialize;
pub mod verify;

pub use claims::{Claims, PermissionsEncoder};
pub use codec::{HeaderParams, JwtCodec, TokenCodec, TokenHeader};
pub use config::{ConfigValue, EngineConfig, EngineConfigBuilder, TtlUnit};
pub use engine::{TokenEngine, TokenEngineBuilder};
pub use error::{Error, Result};
pub use hooks::{Hooks, NoopHooks};
pub use keys::{CandidateKey, HttpKeyFetcher, KeyFetcher, KeyLocator, SecretDescriptor};
pub use serialize::{IdentitySerializer, SubjectSerializer};
pub use verify::{CheckContext, ClaimCheck, ClaimVerifier, Expectations};

// `Url` appears in the `KeyFetcher` signature; re-export it so implementors
// do not need their own `url` dependency.
pub use url::Url;
