//! The token codec capability contract and its JWT default.
//!
//! A [`TokenCodec`] owns the wire format: encode a claim set to a token
//! string, inspect a token without verifying it, and check a token's
//! signature against a list of candidate keys. Claim verification is *not*
//! the codec's job (that belongs to [`crate::verify`]), so the signature
//! check here disables every temporal and audience rule of the underlying
//! library.
//!
//! [`JwtCodec`] is the default implementation: a JSON-based compact
//! three-part structure (header, payload, signature) via `jsonwebtoken`.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, Validation, errors::ErrorKind};
use serde_json::{Map, Value};
use tracing::debug;

use crate::claims::Claims;
use crate::error::{Error, Result};
use crate::keys::CandidateKey;

/// Optional header fields supplied at encode time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderParams {
    /// `kid`: identifier of the signing key.
    pub key_id: Option<String>,
    /// `jku`: URL of a remote document holding the verification key.
    pub key_url: Option<String>,
}

/// Decoded token header, available without signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// The declared signing algorithm.
    pub algorithm: Algorithm,
    /// The `kid` header field, if present.
    pub key_id: Option<String>,
    /// The `jku` header field, if present.
    pub key_url: Option<String>,
    /// The `typ` header field, if present.
    pub token_type: Option<String>,
}

/// Capability set a token format module must provide.
///
/// The default is [`JwtCodec`]; any conforming implementation can be swapped
/// in at engine construction.
pub trait TokenCodec: Send + Sync {
    /// Encode a claim set into a wire token signed with `key` under
    /// `algorithm`.
    fn encode(
        &self,
        claims: &Claims,
        key: &EncodingKey,
        algorithm: Algorithm,
        params: &HeaderParams,
    ) -> Result<String>;

    /// Decode the header without verifying the signature.
    fn peek_header(&self, token: &str) -> Result<TokenHeader>;

    /// Decode the claims without verifying the signature.
    fn peek_claims(&self, token: &str) -> Result<Claims>;

    /// Check the token signature against the candidates, in order, and
    /// return the decoded claims of the first candidate that passes.
    fn verify_signature(&self, token: &str, candidates: &[CandidateKey]) -> Result<Claims>;
}

/// The default codec: JSON Web Tokens in JWS compact serialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct JwtCodec;

/// Split a compact token into its three segments.
///
/// Structural problems are always [`Error::InvalidToken`]; a present-but-empty
/// signature segment is [`Error::MissingSignature`] when one is required.
fn split_token(token: &str, require_signature: bool) -> Result<(&str, &str, &str)> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => {
            if require_signature && signature.is_empty() {
                return Err(Error::MissingSignature);
            }
            Ok((header, payload, signature))
        }
        _ => Err(Error::InvalidToken(
            "expected three dot-separated segments".to_string(),
        )),
    }
}

impl TokenCodec for JwtCodec {
    fn encode(
        &self,
        claims: &Claims,
        key: &EncodingKey,
        algorithm: Algorithm,
        params: &HeaderParams,
    ) -> Result<String> {
        let mut header = Header::new(algorithm);
        header.kid = params.key_id.clone();
        header.jku = params.key_url.clone();
        jsonwebtoken::encode(&header, claims, key)
            .map_err(|e| Error::Config(format!("token encoding failed: {e}")))
    }

    fn peek_header(&self, token: &str) -> Result<TokenHeader> {
        split_token(token, false)?;
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| Error::InvalidToken(format!("malformed header: {e}")))?;
        Ok(TokenHeader {
            algorithm: header.alg,
            key_id: header.kid,
            key_url: header.jku,
            token_type: header.typ,
        })
    }

    fn peek_claims(&self, token: &str) -> Result<Claims> {
        let (_, payload, _) = split_token(token, false)?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| Error::InvalidToken(format!("malformed payload encoding: {e}")))?;
        let map: Map<String, Value> = serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidToken(format!("malformed payload: {e}")))?;
        Ok(Claims::from_map(map))
    }

    fn verify_signature(&self, token: &str, candidates: &[CandidateKey]) -> Result<Claims> {
        split_token(token, true)?;
        if candidates.is_empty() {
            return Err(Error::KeyResolutionFailed(
                "no verification candidate available".to_string(),
            ));
        }

        let mut signature_mismatches = 0usize;
        for (index, candidate) in candidates.iter().enumerate() {
            let mut validation = Validation::new(candidate.algorithm);
            validation.required_spec_claims = Default::default();
            validation.validate_exp = false;
            validation.validate_nbf = false;
            validation.validate_aud = false;

            match jsonwebtoken::decode::<Claims>(token, &candidate.key, &validation) {
                Ok(data) => {
                    debug!(candidate = index, "signature verified");
                    return Ok(data.claims);
                }
                Err(e) => match e.kind() {
                    ErrorKind::InvalidSignature => {
                        signature_mismatches += 1;
                    }
                    _ => {
                        return Err(Error::InvalidToken(format!("malformed token: {e}")));
                    }
                },
            }
        }

        if candidates.len() == 1 && signature_mismatches == 1 {
            return Err(Error::InvalidSignature);
        }
        Err(Error::InvalidToken(
            "no verification candidate matched the signature".to_string(),
        ))
    }
}
