//! Engine configuration and the configuration-value resolver.
//!
//! Every secret, TTL, and algorithm choice flows through [`ConfigValue`]: a
//! closed tagged-variant descriptor resolved to a concrete value at the point
//! of use. Resolution is never cached (secrets rotate) and never recursive:
//! a resolver function that returns another descriptor is a caller bug, not
//! something this layer unwraps.
//!
//! [`EngineConfig`] is constructed once at startup through
//! [`EngineConfigBuilder`]; missing required configuration fails `build()` and
//! prevents the engine from starting.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::keys::SecretDescriptor;

type ResolverFn = dyn Fn() -> Value + Send + Sync;
type ResolverWithArgsFn = dyn Fn(&[Value]) -> Value + Send + Sync;

/// A configuration descriptor resolved to a concrete value at the point of
/// use.
///
/// # Example
///
/// ```rust
/// use tokenward::ConfigValue;
/// use serde_json::json;
///
/// let literal = ConfigValue::literal(3600);
/// assert_eq!(literal.resolve(), json!(3600));
///
/// let computed = ConfigValue::resolver(|| json!({ "count": 15, "unit": "minutes" }));
/// assert_eq!(computed.resolve()["unit"], json!("minutes"));
/// ```
#[derive(Clone)]
pub enum ConfigValue {
    /// A literal value, returned unchanged.
    Literal(Value),
    /// A named process environment variable. An absent variable resolves to
    /// `Value::Null`, never an error.
    Env(String),
    /// A zero-argument resolver function.
    Resolver(Arc<ResolverFn>),
    /// A resolver function with a bound argument list.
    ResolverWithArgs {
        /// The function to invoke.
        resolver: Arc<ResolverWithArgsFn>,
        /// Arguments bound at configuration time.
        args: Vec<Value>,
    },
}

impl ConfigValue {
    /// A literal value.
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// A reference to a process environment variable.
    pub fn env(name: impl Into<String>) -> Self {
        Self::Env(name.into())
    }

    /// A zero-argument resolver invoked at every point of use. Side effects
    /// (network calls, file reads) and their timeouts are the resolver's own
    /// responsibility.
    pub fn resolver(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self::Resolver(Arc::new(f))
    }

    /// A resolver invoked with a bound argument list at every point of use.
    pub fn resolver_with_args(
        f: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
        args: Vec<Value>,
    ) -> Self {
        Self::ResolverWithArgs {
            resolver: Arc::new(f),
            args,
        }
    }

    /// Resolve this descriptor to a concrete value.
    ///
    /// Resolution is not recursive: a resolver that returns another
    /// descriptor-shaped value is handed back as-is.
    pub fn resolve(&self) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Env(name) => match std::env::var(name) {
                Ok(value) => Value::String(value),
                Err(_) => Value::Null,
            },
            Self::Resolver(f) => f(),
            Self::ResolverWithArgs { resolver, args } => resolver(args),
        }
    }
}

impl fmt::Debug for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Env(name) => f.debug_tuple("Env").field(name).finish(),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
            Self::ResolverWithArgs { args, .. } => {
                f.debug_struct("ResolverWithArgs").field("args", args).finish()
            }
        }
    }
}

impl From<Value> for ConfigValue {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

/// Units accepted in a `{count, unit}` TTL descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlUnit {
    /// Plain seconds.
    Seconds,
    /// 60 seconds.
    Minutes,
    /// 3600 seconds.
    Hours,
    /// 86400 seconds.
    Days,
    /// 604800 seconds.
    Weeks,
}

impl TtlUnit {
    fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "second" | "seconds" => Ok(Self::Seconds),
            "minute" | "minutes" => Ok(Self::Minutes),
            "hour" | "hours" => Ok(Self::Hours),
            "day" | "days" => Ok(Self::Days),
            "week" | "weeks" => Ok(Self::Weeks),
            other => Err(Error::Config(format!("unknown ttl unit {other:?}"))),
        }
    }

    fn seconds(self) -> u64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 3_600,
            Self::Days => 86_400,
            Self::Weeks => 604_800,
        }
    }
}

fn ttl_count(value: &Value) -> Result<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| Error::Config(format!("ttl count {n} is not a positive integer"))),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| Error::Config(format!("ttl count {s:?} is not a numeral"))),
        other => Err(Error::Config(format!("ttl count has unsupported shape: {other}"))),
    }
}

/// Convert a resolved TTL value into a second count.
///
/// Accepts a literal second count (number or numeral string), a
/// `{count, unit}` object, or a `[count, unit]` pair. The result must be
/// strictly positive so that `exp` always lands after `iat`.
pub(crate) fn ttl_seconds(value: &Value) -> Result<u64> {
    let seconds = match value {
        Value::Number(_) | Value::String(_) => ttl_count(value)?,
        Value::Object(map) => {
            let count = map
                .get("count")
                .ok_or_else(|| Error::Config("ttl object is missing \"count\"".to_string()))?;
            let unit = map
                .get("unit")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::Config("ttl object is missing \"unit\"".to_string()))?;
            ttl_count(count)? * TtlUnit::parse(unit)?.seconds()
        }
        Value::Array(pair) => match pair.as_slice() {
            [count, Value::String(unit)] => ttl_count(count)? * TtlUnit::parse(unit)?.seconds(),
            _ => {
                return Err(Error::Config(
                    "ttl pair must be [count, unit]".to_string(),
                ));
            }
        },
        Value::Null => return Err(Error::Config("ttl resolved to no value".to_string())),
        other => return Err(Error::Config(format!("ttl has unsupported shape: {other}"))),
    };
    if seconds == 0 {
        return Err(Error::Config("ttl must be greater than zero".to_string()));
    }
    Ok(seconds)
}

/// Engine configuration, constructed once at startup and threaded through
/// every call. The engine keeps no other state.
#[derive(Debug)]
pub struct EngineConfig {
    pub(crate) issuer: String,
    pub(crate) secret: SecretDescriptor,
    pub(crate) allowed_algorithms: Vec<Algorithm>,
    pub(crate) default_token_type: String,
    pub(crate) default_ttl: ConfigValue,
    pub(crate) ttl_per_type: HashMap<String, ConfigValue>,
    pub(crate) clock_drift: Duration,
    pub(crate) verify_issuer: bool,
    pub(crate) trusted_key_origins: Vec<String>,
}

impl EngineConfig {
    /// Start building a configuration.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// The configured issuer identity, stamped into `iss`.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Algorithms accepted for signing and verification.
    pub fn allowed_algorithms(&self) -> &[Algorithm] {
        &self.allowed_algorithms
    }

    /// Allowed clock drift for the time-based claim checks.
    pub fn clock_drift(&self) -> Duration {
        self.clock_drift
    }

    /// Resolve the TTL for a token type, in seconds. The per-type table wins
    /// over the default TTL. Resolution happens fresh on every call.
    pub(crate) fn ttl_for(&self, token_type: &str) -> Result<u64> {
        let descriptor = self
            .ttl_per_type
            .get(token_type)
            .unwrap_or(&self.default_ttl);
        ttl_seconds(&descriptor.resolve())
    }
}

/// Builder for [`EngineConfig`]. Missing issuer or secret fails `build()`:
/// configuration errors are fatal at initialization.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    issuer: Option<String>,
    secret: Option<SecretDescriptor>,
    allowed_algorithms: Option<Vec<Algorithm>>,
    default_token_type: Option<String>,
    default_ttl: Option<ConfigValue>,
    ttl_per_type: HashMap<String, ConfigValue>,
    clock_drift: Option<Duration>,
    verify_issuer: bool,
    trusted_key_origins: Vec<String>,
}

impl EngineConfigBuilder {
    /// Set the issuer identity. Required.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set the signing/verification secret descriptor. Required.
    pub fn secret(mut self, secret: SecretDescriptor) -> Self {
        self.secret = Some(secret);
        self
    }

    /// Replace the algorithm allow-list. Defaults to `HS512`.
    pub fn allowed_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.allowed_algorithms = Some(algorithms);
        self
    }

    /// Set the token type used when the caller does not request one.
    /// Defaults to `"access"`.
    pub fn default_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.default_token_type = Some(token_type.into());
        self
    }

    /// Set the default TTL descriptor. Defaults to four weeks.
    pub fn default_ttl(mut self, ttl: impl Into<ConfigValue>) -> Self {
        self.default_ttl = Some(ttl.into());
        self
    }

    /// Set a TTL descriptor for one token type, overriding the default.
    pub fn ttl_for_type(mut self, token_type: impl Into<String>, ttl: impl Into<ConfigValue>) -> Self {
        self.ttl_per_type.insert(token_type.into(), ttl.into());
        self
    }

    /// Set the allowed clock drift for time-based claim checks. Defaults to
    /// zero.
    pub fn clock_drift(mut self, drift: Duration) -> Self {
        self.clock_drift = Some(drift);
        self
    }

    /// Enable or disable issuer verification during decode. Disabled by
    /// default.
    pub fn verify_issuer(mut self, verify: bool) -> Self {
        self.verify_issuer = verify;
        self
    }

    /// Add an origin to the remote-key-fetch allow-list. The issuer origin is
    /// always trusted when the issuer parses as a URL.
    pub fn trust_key_origin(mut self, origin: impl Into<String>) -> Self {
        self.trusted_key_origins.push(origin.into());
        self
    }

    /// Validate and produce the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the issuer or secret is missing, or the
    /// algorithm allow-list is empty.
    pub fn build(self) -> Result<EngineConfig> {
        let issuer = self
            .issuer
            .ok_or_else(|| Error::Config("issuer is required".to_string()))?;
        let secret = self
            .secret
            .ok_or_else(|| Error::Config("secret descriptor is required".to_string()))?;
        let allowed_algorithms = self
            .allowed_algorithms
            .unwrap_or_else(|| vec![Algorithm::HS512]);
        if allowed_algorithms.is_empty() {
            return Err(Error::Config(
                "algorithm allow-list must not be empty".to_string(),
            ));
        }
        Ok(EngineConfig {
            issuer,
            secret,
            allowed_algorithms,
            default_token_type: self
                .default_token_type
                .unwrap_or_else(|| "access".to_string()),
            default_ttl: self
                .default_ttl
                .unwrap_or_else(|| ConfigValue::literal(json!({ "count": 4, "unit": "weeks" }))),
            ttl_per_type: self.ttl_per_type,
            clock_drift: self.clock_drift.unwrap_or(Duration::ZERO),
            verify_issuer: self.verify_issuer,
            trusted_key_origins: self.trusted_key_origins,
        })
    }
}
