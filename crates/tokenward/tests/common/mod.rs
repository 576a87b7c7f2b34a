//! Common test utilities for integration tests
//!
//! Provides a preconfigured engine, a hook set that records every lifecycle
//! callback it receives, and a mock JWKS server for the remote-key path.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::Algorithm;
use serde_json::json;
use tokenward::{
    Claims, EngineConfig, EngineConfigBuilder, Error, Hooks, IdentitySerializer, Result,
    SecretDescriptor, TokenEngine,
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const TEST_SECRET: &[u8] = b"integration-test-secret";

/// A config builder with the common test settings applied: HS256, a one hour
/// default TTL, and the shared symmetric secret.
pub fn test_config() -> EngineConfigBuilder {
    EngineConfig::builder()
        .issuer("tokenward-test")
        .secret(SecretDescriptor::bytes(TEST_SECRET.to_vec()))
        .allowed_algorithms(vec![Algorithm::HS256])
        .default_ttl(json!(3_600))
}

/// An engine over [`test_config`] with all default collaborators.
pub fn test_engine() -> TokenEngine<IdentitySerializer> {
    TokenEngine::new(
        test_config().build().expect("test config must build"),
        IdentitySerializer,
    )
}

/// Hook set that records the name of every callback it receives, and can be
/// armed to veto mints or verifications.
#[derive(Default)]
pub struct RecordingHooks {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub veto_mint: bool,
    pub veto_verify: bool,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<String> {
        self.calls.lock().expect("hook call log poisoned").clone()
    }

    fn record(&self, name: &str) {
        self.calls
            .lock()
            .expect("hook call log poisoned")
            .push(name.to_string());
    }
}

#[async_trait]
impl Hooks for RecordingHooks {
    async fn before_encode_and_sign(
        &self,
        _subject: &str,
        _token_type: &str,
        claims: Claims,
    ) -> Result<Claims> {
        self.record("before_encode_and_sign");
        if self.veto_mint {
            return Err(Error::custom("mint vetoed by policy"));
        }
        Ok(claims)
    }

    async fn after_encode_and_sign(&self, _claims: &Claims, _token: &str) -> Result<()> {
        self.record("after_encode_and_sign");
        Ok(())
    }

    async fn on_verify(&self, claims: Claims, _token: &str) -> Result<Claims> {
        self.record("on_verify");
        if self.veto_verify {
            return Err(Error::custom("token was revoked"));
        }
        Ok(claims)
    }

    async fn on_refresh(
        &self,
        _old_token: &str,
        _old_claims: &Claims,
        _new_token: &str,
        _new_claims: &Claims,
    ) -> Result<()> {
        self.record("on_refresh");
        Ok(())
    }

    async fn on_exchange(
        &self,
        _old_token: &str,
        _old_claims: &Claims,
        _new_token: &str,
        _new_claims: &Claims,
    ) -> Result<()> {
        self.record("on_exchange");
        Ok(())
    }

    async fn on_revoke(&self, claims: Claims, _token: &str) -> Result<Claims> {
        self.record("on_revoke");
        Ok(claims)
    }
}

/// Mock server hosting a JWKS document.
pub struct MockKeyServer {
    pub server: MockServer,
    pub jwks_url: String,
}

impl MockKeyServer {
    /// Start a server whose `/jwks.json` serves a single symmetric key under
    /// `kid`, derived from `secret`.
    pub async fn start_with_oct_key(kid: &str, secret: &[u8]) -> Self {
        let server = MockServer::start().await;
        let jwk = json!({
            "kty": "oct",
            "kid": kid,
            "alg": "HS256",
            "k": URL_SAFE_NO_PAD.encode(secret),
        });
        Mock::given(method("GET"))
            .and(path("/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": [jwk] })))
            .mount(&server)
            .await;

        let jwks_url = format!("{}/jwks.json", server.uri());
        Self { server, jwks_url }
    }

    /// Origin of the mock server, for the trusted-origin allow-list.
    pub fn origin(&self) -> String {
        self.server.uri()
    }
}
