//! Claims payload and the standard-claim builder.
//!
//! [`Claims`] is an order-preserving JSON map with typed accessors for the
//! reserved keys (`iss`, `sub`, `aud`, `typ`, `iat`, `exp`, `nbf`, `jti`).
//! A claims value is immutable once returned to the caller; refresh and
//! exchange always produce a new value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::{EngineConfig, ttl_seconds};
use crate::error::{Error, Result};

/// Pseudo-claim carrying a per-mint TTL override. Consumed by the builder,
/// never emitted into the token.
const TTL_KEY: &str = "ttl";

/// Claim key holding the opaque permission sub-map.
const PERMISSIONS_KEY: &str = "pems";

/// The key-value payload asserted inside a token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(pub(crate) Map<String, Value>);

impl Claims {
    /// Wrap an existing claims map.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Look up a claim by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    fn str_claim(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    fn int_claim(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    /// The `iss` claim.
    pub fn issuer(&self) -> Option<&str> {
        self.str_claim("iss")
    }

    /// The `sub` claim.
    pub fn subject(&self) -> Option<&str> {
        self.str_claim("sub")
    }

    /// The `aud` claim.
    pub fn audience(&self) -> Option<&str> {
        self.str_claim("aud")
    }

    /// The `typ` claim.
    pub fn token_type(&self) -> Option<&str> {
        self.str_claim("typ")
    }

    /// The `iat` claim, in integer seconds.
    pub fn issued_at(&self) -> Option<i64> {
        self.int_claim("iat")
    }

    /// The `exp` claim, in integer seconds.
    pub fn expires_at(&self) -> Option<i64> {
        self.int_claim("exp")
    }

    /// The `nbf` claim, in integer seconds.
    pub fn not_before(&self) -> Option<i64> {
        self.int_claim("nbf")
    }

    /// The `jti` claim, the unique token identifier.
    pub fn token_id(&self) -> Option<&str> {
        self.str_claim("jti")
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Unwrap into the underlying map.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Encodes the opaque permission sub-map extracted from caller claims. The
/// encoding scheme is entirely the collaborator's concern; without one
/// configured, the sub-map passes through unchanged.
pub trait PermissionsEncoder: Send + Sync {
    /// Encode the permission value for embedding under `"pems"`.
    fn encode_permissions(&self, permissions: &Value) -> Result<Value>;
}

pub(crate) fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Construct the full claim set for a mint.
///
/// Caller-supplied claim values always win over computed defaults; `jti` and
/// `iat` are honored from caller input only when explicitly present (refresh
/// drops them first, forcing new values). A `"ttl"` pseudo-claim overrides
/// the configured TTL for this mint and never reaches the token.
pub(crate) fn build(
    subject: &str,
    requested_type: Option<&str>,
    caller_claims: Map<String, Value>,
    config: &EngineConfig,
    permissions: Option<&dyn PermissionsEncoder>,
) -> Result<Claims> {
    let mut claims = Map::new();
    for (key, value) in caller_claims {
        claims.insert(key.trim().to_string(), value);
    }

    let ttl_override = claims.remove(TTL_KEY);
    let permission_map = claims.remove(PERMISSIONS_KEY);

    let token_type = claims
        .get("typ")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| requested_type.map(str::to_string))
        .unwrap_or_else(|| config.default_token_type.clone());

    let ttl = match &ttl_override {
        Some(value) => ttl_seconds(value)?,
        None => config.ttl_for(&token_type)?,
    };

    let iat = claims
        .get("iat")
        .and_then(Value::as_i64)
        .unwrap_or_else(current_timestamp);
    let exp = match claims.get("exp").and_then(Value::as_i64) {
        Some(exp) => exp,
        None => iat.checked_add(ttl as i64).ok_or_else(|| {
            Error::Config(format!("iat ({iat}) plus ttl ({ttl}) overflows the timestamp range"))
        })?,
    };
    if exp <= iat {
        return Err(Error::Config(format!(
            "exp ({exp}) must be strictly greater than iat ({iat})"
        )));
    }

    claims
        .entry("iss".to_string())
        .or_insert_with(|| Value::String(config.issuer.clone()));
    claims
        .entry("sub".to_string())
        .or_insert_with(|| Value::String(subject.to_string()));
    let audience_default = claims
        .get("sub")
        .cloned()
        .unwrap_or_else(|| Value::String(subject.to_string()));
    claims.entry("aud".to_string()).or_insert(audience_default);
    claims.insert("typ".to_string(), Value::String(token_type));
    claims.insert("iat".to_string(), Value::from(iat));
    claims.insert("exp".to_string(), Value::from(exp));
    claims
        .entry("jti".to_string())
        .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));

    if let Some(raw) = permission_map {
        let encoded = match permissions {
            Some(encoder) => encoder.encode_permissions(&raw)?,
            None => raw,
        };
        claims.insert(PERMISSIONS_KEY.to_string(), encoded);
    }

    Ok(Claims(claims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SecretDescriptor;
    use serde_json::json;

    fn test_config() -> EngineConfig {
        EngineConfig::builder()
            .issuer("tokenward-test")
            .secret(SecretDescriptor::bytes(b"secret".to_vec()))
            .default_ttl(json!(3_600))
            .build()
            .unwrap()
    }

    fn build_simple(claims: Map<String, Value>) -> Claims {
        build("user:42", None, claims, &test_config(), None).unwrap()
    }

    #[test]
    fn fills_all_reserved_claims() {
        let claims = build_simple(Map::new());
        assert_eq!(claims.issuer(), Some("tokenward-test"));
        assert_eq!(claims.subject(), Some("user:42"));
        assert_eq!(claims.audience(), Some("user:42"));
        assert_eq!(claims.token_type(), Some("access"));
        assert!(claims.token_id().is_some());
        let iat = claims.issued_at().unwrap();
        assert_eq!(claims.expires_at().unwrap(), iat + 3_600);
    }

    #[test]
    fn requested_type_and_caller_type_precedence() {
        let config = test_config();
        let claims = build("user:42", Some("refresh"), Map::new(), &config, None).unwrap();
        assert_eq!(claims.token_type(), Some("refresh"));

        let mut caller = Map::new();
        caller.insert("typ".to_string(), json!("magic-link"));
        let claims = build("user:42", Some("refresh"), caller, &config, None).unwrap();
        assert_eq!(claims.token_type(), Some("magic-link"));
    }

    #[test]
    fn caller_supplied_claims_win_over_defaults() {
        let mut caller = Map::new();
        caller.insert("aud".to_string(), json!("mobile-app"));
        caller.insert("iss".to_string(), json!("other-issuer"));
        caller.insert("some".to_string(), json!("claim"));
        let claims = build_simple(caller);
        assert_eq!(claims.audience(), Some("mobile-app"));
        assert_eq!(claims.issuer(), Some("other-issuer"));
        assert_eq!(claims.get("some"), Some(&json!("claim")));
    }

    #[test]
    fn ttl_pseudo_claim_overrides_config_and_is_removed() {
        let mut caller = Map::new();
        caller.insert("ttl".to_string(), json!({ "count": "2", "unit": "minutes" }));
        let claims = build_simple(caller);
        let iat = claims.issued_at().unwrap();
        assert_eq!(claims.expires_at().unwrap(), iat + 120);
        assert!(claims.get("ttl").is_none());
    }

    #[test]
    fn explicit_iat_is_honored_and_drives_exp() {
        let mut caller = Map::new();
        caller.insert("iat".to_string(), json!(1_000_000));
        let claims = build_simple(caller);
        assert_eq!(claims.issued_at(), Some(1_000_000));
        assert_eq!(claims.expires_at(), Some(1_003_600));
    }

    #[test]
    fn exp_not_after_iat_is_rejected() {
        let mut caller = Map::new();
        caller.insert("iat".to_string(), json!(2_000));
        caller.insert("exp".to_string(), json!(2_000));
        let err = build("user:42", None, caller, &test_config(), None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn iat_near_the_timestamp_ceiling_is_rejected_not_a_panic() {
        let mut caller = Map::new();
        caller.insert("iat".to_string(), json!(i64::MAX - 10));
        let err = build("user:42", None, caller, &test_config(), None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn nbf_is_only_present_when_caller_supplies_it() {
        assert_eq!(build_simple(Map::new()).not_before(), None);

        let mut caller = Map::new();
        caller.insert("nbf".to_string(), json!(123));
        assert_eq!(build_simple(caller).not_before(), Some(123));
    }

    #[test]
    fn caller_keys_are_normalized() {
        let mut caller = Map::new();
        caller.insert("  role ".to_string(), json!("admin"));
        let claims = build_simple(caller);
        assert_eq!(claims.get("role"), Some(&json!("admin")));
    }

    #[test]
    fn permission_map_passes_through_without_encoder() {
        let mut caller = Map::new();
        caller.insert("pems".to_string(), json!({ "default": ["read"] }));
        let claims = build_simple(caller);
        assert_eq!(claims.get("pems"), Some(&json!({ "default": ["read"] })));
    }

    #[test]
    fn permission_map_goes_through_the_encoder() {
        struct BitEncoder;
        impl PermissionsEncoder for BitEncoder {
            fn encode_permissions(&self, _permissions: &Value) -> Result<Value> {
                Ok(json!({ "default": 0b01 }))
            }
        }

        let mut caller = Map::new();
        caller.insert("pems".to_string(), json!({ "default": ["read"] }));
        let claims = build("user:42", None, caller, &test_config(), Some(&BitEncoder)).unwrap();
        assert_eq!(claims.get("pems"), Some(&json!({ "default": 0b01 })));
    }

    #[test]
    fn fresh_jti_each_mint() {
        let a = build_simple(Map::new());
        let b = build_simple(Map::new());
        assert_ne!(a.token_id(), b.token_id());
    }
}
