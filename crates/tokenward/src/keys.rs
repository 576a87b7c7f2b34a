//! Secret/key material resolution.
//!
//! A [`SecretDescriptor`] is turned into concrete signing or verification key
//! material at every call. Nothing here is cached across calls, since
//! secrets may rotate or be fetched remotely. For signing exactly one key is
//! used (the first candidate of a sequence); for verification every candidate
//! is tried in order until a signature check passes.
//!
//! Tokens whose header carries a remote key locator (`jku` + `kid`) take the
//! trust-gated path in [`remote_candidate`]: the locator origin is checked
//! against the configured allow-list *before any network call*, and only then
//! is the key document fetched through the [`KeyFetcher`] seam.

use std::fmt;

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use secrecy::{ExposeSecret, SecretVec};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::{ConfigValue, EngineConfig};
use crate::error::{Error, Result};

/// Signing/verification key material, or a recipe for obtaining it.
pub enum SecretDescriptor {
    /// Raw symmetric key bytes for the HMAC algorithms.
    Bytes(SecretVec<u8>),
    /// PEM-encoded asymmetric material. `private` signs, `public` verifies.
    Pem {
        /// PEM-encoded private key, required for signing.
        private: Option<String>,
        /// PEM-encoded public key, required for verification.
        public: Option<String>,
    },
    /// A JSON Web Key object (verification only).
    Jwk(Value),
    /// Resolved through the configuration resolver at the point of use. A
    /// string resolves to symmetric bytes; an object with a `kty` field is
    /// treated as a JWK.
    Config(ConfigValue),
    /// An ordered sequence of candidates, tried front to back during
    /// verification. Signing uses the first element.
    Many(Vec<SecretDescriptor>),
}

impl SecretDescriptor {
    /// Raw symmetric key bytes.
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(SecretVec::new(bytes.into()))
    }

    /// A PEM-encoded key pair.
    pub fn pem(private: Option<String>, public: Option<String>) -> Self {
        Self::Pem { private, public }
    }

    /// A JSON Web Key object.
    pub fn jwk(jwk: Value) -> Self {
        Self::Jwk(jwk)
    }

    /// A secret resolved through the configuration resolver at use time.
    pub fn config(value: ConfigValue) -> Self {
        Self::Config(value)
    }

    /// An ordered sequence of candidate descriptors.
    pub fn many(descriptors: Vec<SecretDescriptor>) -> Self {
        Self::Many(descriptors)
    }
}

impl fmt::Debug for SecretDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(_) => f.write_str("Bytes([REDACTED])"),
            Self::Pem { private, public } => f
                .debug_struct("Pem")
                .field("private", &private.as_ref().map(|_| "[REDACTED]"))
                .field("public", &public.is_some())
                .finish(),
            Self::Jwk(_) => f.write_str("Jwk([REDACTED])"),
            Self::Config(value) => f.debug_tuple("Config").field(value).finish(),
            Self::Many(inner) => f.debug_tuple("Many").field(inner).finish(),
        }
    }
}

/// One verification candidate: a decoding key tried under a single algorithm.
pub struct CandidateKey {
    pub(crate) key: DecodingKey,
    pub(crate) algorithm: Algorithm,
}

impl CandidateKey {
    /// Build a candidate from a decoding key and the algorithm it is valid
    /// under.
    pub fn new(key: DecodingKey, algorithm: Algorithm) -> Self {
        Self { key, algorithm }
    }
}

impl fmt::Debug for CandidateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Resolved key material, one per descriptor leaf.
enum Material {
    Symmetric(Vec<u8>),
    Pem {
        private: Option<String>,
        public: Option<String>,
    },
    Jwk(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlgorithmFamily {
    Hmac,
    Rsa,
    Ec,
    Ed,
}

fn family(algorithm: Algorithm) -> AlgorithmFamily {
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => AlgorithmFamily::Hmac,
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => AlgorithmFamily::Rsa,
        Algorithm::ES256 | Algorithm::ES384 => AlgorithmFamily::Ec,
        _ => AlgorithmFamily::Ed,
    }
}

/// Flatten a descriptor into ordered material leaves, resolving any
/// [`ConfigValue`] references fresh.
fn materials(descriptor: &SecretDescriptor, out: &mut Vec<Result<Material>>) {
    match descriptor {
        SecretDescriptor::Bytes(bytes) => {
            out.push(Ok(Material::Symmetric(bytes.expose_secret().clone())));
        }
        SecretDescriptor::Pem { private, public } => out.push(Ok(Material::Pem {
            private: private.clone(),
            public: public.clone(),
        })),
        SecretDescriptor::Jwk(jwk) => out.push(Ok(Material::Jwk(jwk.clone()))),
        SecretDescriptor::Config(value) => out.push(resolve_config_material(value)),
        SecretDescriptor::Many(inner) => {
            for descriptor in inner {
                materials(descriptor, out);
            }
        }
    }
}

fn resolve_config_material(value: &ConfigValue) -> Result<Material> {
    match value.resolve() {
        Value::String(secret) => Ok(Material::Symmetric(secret.into_bytes())),
        Value::Object(map) if map.contains_key("kty") => Ok(Material::Jwk(Value::Object(map))),
        Value::Object(map) => {
            let as_str = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
            let private = as_str("private");
            let public = as_str("public");
            if private.is_none() && public.is_none() {
                return Err(Error::KeyResolutionFailed(
                    "resolved key object has neither \"kty\" nor PEM fields".to_string(),
                ));
            }
            Ok(Material::Pem { private, public })
        }
        Value::Null => Err(Error::KeyResolutionFailed(
            "secret descriptor resolved to no value".to_string(),
        )),
        other => Err(Error::KeyResolutionFailed(format!(
            "secret descriptor resolved to unsupported shape: {other}"
        ))),
    }
}

/// Resolve the signing key: the first candidate of the descriptor, encoded
/// for the first algorithm on the allow-list.
///
/// # Errors
///
/// Returns [`Error::KeyResolutionFailed`] when no usable signing material can
/// be produced.
pub(crate) fn signing_key(config: &EngineConfig) -> Result<(EncodingKey, Algorithm)> {
    let algorithm = config.allowed_algorithms[0];
    let mut leaves = Vec::new();
    materials(&config.secret, &mut leaves);
    let material = leaves
        .into_iter()
        .next()
        .ok_or_else(|| Error::KeyResolutionFailed("secret descriptor is empty".to_string()))??;

    let key = match (family(algorithm), &material) {
        (AlgorithmFamily::Hmac, Material::Symmetric(bytes)) => EncodingKey::from_secret(bytes),
        (AlgorithmFamily::Rsa, Material::Pem { private: Some(pem), .. }) => {
            EncodingKey::from_rsa_pem(pem.as_bytes())
                .map_err(|e| Error::KeyResolutionFailed(format!("invalid RSA private key: {e}")))?
        }
        (AlgorithmFamily::Ec, Material::Pem { private: Some(pem), .. }) => {
            EncodingKey::from_ec_pem(pem.as_bytes())
                .map_err(|e| Error::KeyResolutionFailed(format!("invalid EC private key: {e}")))?
        }
        (AlgorithmFamily::Ed, Material::Pem { private: Some(pem), .. }) => {
            EncodingKey::from_ed_pem(pem.as_bytes())
                .map_err(|e| Error::KeyResolutionFailed(format!("invalid Ed private key: {e}")))?
        }
        (_, Material::Jwk(_)) => {
            return Err(Error::KeyResolutionFailed(
                "cannot sign with a bare JWK; provide PEM or symmetric material".to_string(),
            ));
        }
        _ => {
            return Err(Error::KeyResolutionFailed(format!(
                "secret material does not fit signing algorithm {algorithm:?}"
            )));
        }
    };
    Ok((key, algorithm))
}

/// Resolve the ordered verification candidates for a token whose header
/// declares `header_alg`. Leaves that cannot produce a key under that
/// algorithm are skipped.
///
/// # Errors
///
/// Returns [`Error::KeyResolutionFailed`] when no candidate at all can be
/// produced.
pub(crate) fn verification_candidates(
    config: &EngineConfig,
    header_alg: Algorithm,
) -> Result<Vec<CandidateKey>> {
    let mut leaves = Vec::new();
    materials(&config.secret, &mut leaves);

    let mut candidates = Vec::new();
    for leaf in leaves {
        let material = match leaf {
            Ok(material) => material,
            Err(e) => {
                warn!(error = %e, "skipping unresolvable verification candidate");
                continue;
            }
        };
        match decoding_key(&material, header_alg) {
            Some(key) => candidates.push(CandidateKey::new(key, header_alg)),
            None => debug!(
                algorithm = ?header_alg,
                "secret material does not fit the declared algorithm, skipping"
            ),
        }
    }

    if candidates.is_empty() {
        return Err(Error::KeyResolutionFailed(format!(
            "no verification candidate available for algorithm {header_alg:?}"
        )));
    }
    Ok(candidates)
}

fn decoding_key(material: &Material, algorithm: Algorithm) -> Option<DecodingKey> {
    match (family(algorithm), material) {
        (AlgorithmFamily::Hmac, Material::Symmetric(bytes)) => {
            Some(DecodingKey::from_secret(bytes))
        }
        (AlgorithmFamily::Rsa, Material::Pem { public: Some(pem), .. }) => {
            DecodingKey::from_rsa_pem(pem.as_bytes()).ok()
        }
        (AlgorithmFamily::Ec, Material::Pem { public: Some(pem), .. }) => {
            DecodingKey::from_ec_pem(pem.as_bytes()).ok()
        }
        (AlgorithmFamily::Ed, Material::Pem { public: Some(pem), .. }) => {
            DecodingKey::from_ed_pem(pem.as_bytes()).ok()
        }
        (_, Material::Jwk(value)) => {
            let jwk: Jwk = serde_json::from_value(value.clone()).ok()?;
            DecodingKey::from_jwk(&jwk).ok()
        }
        _ => None,
    }
}

/// A token-header reference to a remotely hosted public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLocator {
    /// URL of the key document (the header's `jku`).
    pub url: String,
    /// Identifier of the key inside the document (the header's `kid`).
    pub key_id: Option<String>,
}

/// Fetches remote key documents. The default implementation is
/// [`HttpKeyFetcher`]; tests and callers wanting retry or caching wrap their
/// own around it.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    /// Fetch the raw document at `url`. Implementations must bound the fetch
    /// with their own timeout policy: a failure degrades to a verification
    /// error, never a hang.
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>>;
}

/// Remote key fetcher over HTTPS with a 10 second request timeout.
#[derive(Debug, Clone)]
pub struct HttpKeyFetcher {
    client: reqwest::Client,
    timeout: std::time::Duration,
}

const DEFAULT_FETCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

impl HttpKeyFetcher {
    /// Create a fetcher with the default timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a fetcher with a custom request timeout.
    pub fn with_timeout(timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, timeout }
    }
}

impl Default for HttpKeyFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        // The request-level timeout keeps the fetch bounded even when the
        // client builder fell back to a default client.
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::InvalidToken(format!("key document fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::InvalidToken(format!(
                "key document fetch returned {}",
                response.status()
            )));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::InvalidToken(format!("key document read failed: {e}")))?;
        Ok(body.to_vec())
    }
}

fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Whether a locator origin is trusted: either it appears on the configured
/// allow-list, or it equals the issuer origin when the issuer parses as a
/// URL.
fn origin_trusted(config: &EngineConfig, origin: &str) -> bool {
    let matches_entry = |entry: &str| match Url::parse(entry) {
        Ok(url) => origin_of(&url) == origin,
        Err(_) => entry == origin,
    };
    if config.trusted_key_origins.iter().any(|o| matches_entry(o)) {
        return true;
    }
    matches_entry(&config.issuer)
}

/// Resolve the single verification candidate for a token that references a
/// remote key.
///
/// The locator origin is tested against the allow-list first; on mismatch
/// this returns [`Error::UntrustedKeySource`] without touching the network.
/// Every failure past the gate (fetch, parse, missing `kid`, unusable key)
/// degrades to [`Error::InvalidToken`].
pub(crate) async fn remote_candidate(
    config: &EngineConfig,
    fetcher: &dyn KeyFetcher,
    locator: &KeyLocator,
    header_alg: Algorithm,
) -> Result<CandidateKey> {
    let url = Url::parse(&locator.url)
        .map_err(|e| Error::InvalidToken(format!("invalid key locator url: {e}")))?;
    let origin = origin_of(&url);
    if !origin_trusted(config, &origin) {
        warn!(%origin, "refusing key fetch from untrusted origin");
        return Err(Error::UntrustedKeySource(origin));
    }

    let body = fetcher.fetch(&url).await?;
    let jwks: JwkSet = serde_json::from_slice(&body)
        .map_err(|e| Error::InvalidToken(format!("malformed remote key document: {e}")))?;
    let jwk = match &locator.key_id {
        Some(kid) => jwks.find(kid),
        None => jwks.keys.first(),
    }
    .ok_or_else(|| Error::InvalidToken("no matching key in remote document".to_string()))?;

    let key = DecodingKey::from_jwk(jwk)
        .map_err(|e| Error::InvalidToken(format!("unusable remote key: {e}")))?;
    debug!(%origin, key_id = ?locator.key_id, "resolved remote verification key");
    Ok(CandidateKey::new(key, header_alg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_with(secret: SecretDescriptor) -> EngineConfig {
        EngineConfig::builder()
            .issuer("https://issuer.example.com")
            .secret(secret)
            .allowed_algorithms(vec![Algorithm::HS256])
            .build()
            .unwrap()
    }

    #[test]
    fn signing_uses_first_candidate_of_a_sequence() {
        let config = config_with(SecretDescriptor::many(vec![
            SecretDescriptor::bytes(b"first".to_vec()),
            SecretDescriptor::bytes(b"second".to_vec()),
        ]));
        let (_, algorithm) = signing_key(&config).unwrap();
        assert_eq!(algorithm, Algorithm::HS256);
    }

    #[test]
    fn signing_fails_without_material() {
        let config = config_with(SecretDescriptor::many(vec![]));
        assert!(matches!(
            signing_key(&config),
            Err(Error::KeyResolutionFailed(_))
        ));
    }

    #[test]
    fn signing_rejects_bare_jwk() {
        let config = config_with(SecretDescriptor::jwk(json!({ "kty": "oct", "k": "AAAA" })));
        assert!(matches!(
            signing_key(&config),
            Err(Error::KeyResolutionFailed(_))
        ));
    }

    #[test]
    fn config_descriptor_resolves_string_to_symmetric_material() {
        let config = config_with(SecretDescriptor::config(ConfigValue::literal("s3cret")));
        assert!(signing_key(&config).is_ok());
    }

    #[test]
    fn config_descriptor_resolving_to_null_is_a_resolution_failure() {
        let config = config_with(SecretDescriptor::config(ConfigValue::env(
            "TOKENWARD_TEST_MISSING_SECRET",
        )));
        assert!(matches!(
            signing_key(&config),
            Err(Error::KeyResolutionFailed(_))
        ));
    }

    #[test]
    fn verification_yields_all_sequence_candidates_in_order() {
        let config = config_with(SecretDescriptor::many(vec![
            SecretDescriptor::bytes(b"first".to_vec()),
            SecretDescriptor::bytes(b"second".to_vec()),
        ]));
        let candidates = verification_candidates(&config, Algorithm::HS256).unwrap();
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn verification_skips_material_of_the_wrong_family() {
        // A PEM-only descriptor cannot serve an HMAC token.
        let config = config_with(SecretDescriptor::pem(None, Some("not-a-key".to_string())));
        assert!(matches!(
            verification_candidates(&config, Algorithm::HS256),
            Err(Error::KeyResolutionFailed(_))
        ));
    }

    #[test]
    fn issuer_origin_is_trusted_by_default() {
        let config = config_with(SecretDescriptor::bytes(b"secret".to_vec()));
        assert!(origin_trusted(&config, "https://issuer.example.com"));
        assert!(!origin_trusted(&config, "https://attacker.example.net"));
    }

    #[test]
    fn explicit_allow_list_entries_are_trusted() {
        let config = EngineConfig::builder()
            .issuer("tokenward-app")
            .secret(SecretDescriptor::bytes(b"secret".to_vec()))
            .trust_key_origin("https://keys.example.com")
            .build()
            .unwrap();
        assert!(origin_trusted(&config, "https://keys.example.com"));
        assert!(!origin_trusted(&config, "https://issuer.example.com"));
    }

    #[tokio::test]
    async fn untrusted_origin_fails_before_any_fetch() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingFetcher(AtomicUsize);

        #[async_trait]
        impl KeyFetcher for CountingFetcher {
            async fn fetch(&self, _url: &Url) -> Result<Vec<u8>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            }
        }

        let config = config_with(SecretDescriptor::bytes(b"secret".to_vec()));
        let fetcher = CountingFetcher(AtomicUsize::new(0));
        let locator = KeyLocator {
            url: "https://attacker.example.net/jwks.json".to_string(),
            key_id: Some("kid-1".to_string()),
        };

        let err = remote_candidate(&config, &fetcher, &locator, Algorithm::HS256)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UntrustedKeySource(_)));
        assert_eq!(fetcher.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn debug_never_prints_secret_material() {
        let descriptor = SecretDescriptor::bytes(b"super-secret".to_vec());
        let rendered = format!("{descriptor:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
