//! Validated settings for the token manager and the registry client.
//!
//! Settings come from a fluent [`SettingsBuilder`], from environment variables via
//! [`Settings::from_env`], or from a JSON document via [`Settings::from_json_str`]. Every path
//! ends in [`SettingsBuilder::build`], which enforces the same invariants.

/// Builder API for assembling settings.
pub mod builder;
/// Deployment environments and their endpoint sets.
pub mod environment;

pub use builder::*;
pub use environment::*;

// std
use std::path::PathBuf;
// self
use crate::{_prelude::*, auth::TokenSecret, error::ConfigError};

/// Default bound on every outbound HTTP call.
pub const DEFAULT_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(15);

/// Attempt budget and backoff for transport retries of the primary registry request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
	/// Total attempts, including the first one.
	pub attempts: u32,
	/// Delay before the second attempt; doubled for each further attempt.
	pub base_delay: StdDuration,
	/// Upper bound for a single delay.
	pub max_delay: StdDuration,
}
impl RetryPolicy {
	/// Retries without sleeping between attempts.
	pub const fn immediate(attempts: u32) -> Self {
		Self { attempts, base_delay: StdDuration::ZERO, max_delay: StdDuration::ZERO }
	}

	/// Delay to wait after the given failed attempt (1-based).
	pub fn delay_after(&self, attempt: u32) -> StdDuration {
		let exponent = attempt.saturating_sub(1).min(16);
		let delay = self.base_delay.saturating_mul(1 << exponent);

		delay.min(self.max_delay)
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			attempts: 3,
			base_delay: StdDuration::from_millis(200),
			max_delay: StdDuration::from_secs(2),
		}
	}
}

/// Immutable settings consumed by the broker.
#[derive(Clone, Debug)]
pub struct Settings {
	/// Maskinporten integration (client) identifier; the assertion issuer.
	pub client_id: String,
	/// Key identifier placed in the assertion header.
	pub key_id: String,
	/// Space-delimited scopes requested in every assertion.
	pub scope: String,
	/// Optional consumer organization number.
	pub org_number: Option<String>,
	/// Optional target resources for the assertion.
	pub resource: Vec<String>,
	/// Credential bundle path.
	pub cert_path: PathBuf,
	/// Password for an encrypted private key.
	pub cert_password: Option<TokenSecret>,
	/// Selected environment.
	pub environment: Environment,
	/// Resolved endpoints, including any overrides.
	pub endpoints: Endpoints,
	/// Keeps raw registry payloads on normalized records and logs response bodies.
	pub debug: bool,
	/// Initial state of the cache-enabled flag.
	pub cache_enabled: bool,
	/// Bound on each outbound HTTP call.
	pub request_timeout: StdDuration,
	/// Transport retry policy for the primary registry request.
	pub retry: RetryPolicy,
}
impl Settings {
	/// Creates a builder for the provided client and key identifiers.
	pub fn builder(client_id: impl Into<String>, key_id: impl Into<String>) -> SettingsBuilder {
		SettingsBuilder::new(client_id, key_id)
	}

	/// Reads settings from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_env_with(|key| std::env::var(key).ok())
	}

	/// Reads settings through an arbitrary variable lookup.
	///
	/// Recognized variables: `SVV_CLIENT_ID`, `SVV_KEY_ID`, `SVV_CERT_PATH` (required),
	/// `SVV_CERT_PASSWORD`, `SVV_ORG_NUMBER`, `SVV_SCOPE`, `SVV_API_ENVIRONMENT` (default
	/// `prod`), `SVV_DEBUG`, and `SVV_CACHE_ENABLED` (default on).
	pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |key: &str| {
			lookup(key).map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
		};
		let client_id =
			var("SVV_CLIENT_ID").ok_or(ConfigError::MissingField { field: "client_id" })?;
		let key_id = var("SVV_KEY_ID").ok_or(ConfigError::MissingField { field: "key_id" })?;
		let cert_path =
			var("SVV_CERT_PATH").ok_or(ConfigError::MissingField { field: "cert_path" })?;
		let mut builder = Self::builder(client_id, key_id).cert_path(cert_path);

		if let Some(password) = var("SVV_CERT_PASSWORD") {
			builder = builder.cert_password(password);
		}
		if let Some(org_number) = var("SVV_ORG_NUMBER") {
			builder = builder.org_number(org_number);
		}
		if let Some(scope) = var("SVV_SCOPE") {
			builder = builder.scope(scope);
		}
		if let Some(environment) = var("SVV_API_ENVIRONMENT") {
			builder = builder.environment(environment.parse()?);
		}
		if let Some(debug) = var("SVV_DEBUG") {
			builder = builder.debug(parse_flag("debug", &debug)?);
		}
		if let Some(enabled) = var("SVV_CACHE_ENABLED") {
			builder = builder.cache_enabled(parse_flag("cache_enabled", &enabled)?);
		}

		builder.build()
	}

	/// Deserializes a JSON settings document, reporting the failing field path on error.
	pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(json);
		let document: SettingsDocument = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ConfigError::InvalidDocument { source })?;

		document.into_builder().build()
	}
}

/// Wire form of a JSON settings document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsDocument {
	client_id: String,
	key_id: String,
	cert_path: PathBuf,
	#[serde(default)]
	cert_password: Option<String>,
	#[serde(default)]
	environment: Environment,
	#[serde(default)]
	scope: Option<String>,
	#[serde(default)]
	org_number: Option<String>,
	#[serde(default)]
	resource: Vec<String>,
	#[serde(default)]
	debug: bool,
	#[serde(default)]
	cache_enabled: Option<bool>,
	#[serde(default)]
	request_timeout_secs: Option<u64>,
	#[serde(default)]
	retry_attempts: Option<u32>,
	#[serde(default)]
	token_endpoint: Option<Url>,
	#[serde(default)]
	audience: Option<String>,
	#[serde(default)]
	registry_base: Option<Url>,
}
impl SettingsDocument {
	fn into_builder(self) -> SettingsBuilder {
		let mut builder = Settings::builder(self.client_id, self.key_id)
			.cert_path(self.cert_path)
			.environment(self.environment)
			.resource(self.resource)
			.debug(self.debug);

		if let Some(password) = self.cert_password {
			builder = builder.cert_password(password);
		}
		if let Some(scope) = self.scope {
			builder = builder.scope(scope);
		}
		if let Some(org_number) = self.org_number {
			builder = builder.org_number(org_number);
		}
		if let Some(enabled) = self.cache_enabled {
			builder = builder.cache_enabled(enabled);
		}
		if let Some(secs) = self.request_timeout_secs {
			builder = builder.request_timeout(StdDuration::from_secs(secs));
		}
		if let Some(attempts) = self.retry_attempts {
			builder = builder.retry_policy(RetryPolicy { attempts, ..RetryPolicy::default() });
		}
		if let Some(url) = self.token_endpoint {
			builder = builder.token_endpoint(url);
		}
		if let Some(audience) = self.audience {
			builder = builder.audience(audience);
		}
		if let Some(url) = self.registry_base {
			builder = builder.registry_base(url);
		}

		builder
	}
}

fn parse_flag(field: &'static str, raw: &str) -> Result<bool, ConfigError> {
	match raw.to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(ConfigError::InvalidValue { field, value: raw.to_owned() }),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn env_lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map = pairs
			.iter()
			.map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
			.collect::<HashMap<_, _>>();

		move |key| map.get(key).cloned()
	}

	#[test]
	fn env_settings_default_to_prod_with_cache_on() {
		let settings = Settings::from_env_with(env_lookup(&[
			("SVV_CLIENT_ID", "client-1"),
			("SVV_KEY_ID", "kid-1"),
			("SVV_CERT_PATH", "/etc/svv/client.pem"),
		]))
		.expect("Minimal environment should produce settings.");

		assert_eq!(settings.environment, Environment::Prod);
		assert_eq!(settings.endpoints.token.as_str(), "https://maskinporten.no/token");
		assert_eq!(settings.scope, DEFAULT_SCOPE);
		assert!(settings.cache_enabled);
		assert!(!settings.debug);
		assert_eq!(settings.request_timeout, DEFAULT_REQUEST_TIMEOUT);
		assert_eq!(settings.retry, RetryPolicy::default());
	}

	#[test]
	fn env_settings_honor_flags_and_environment() {
		let settings = Settings::from_env_with(env_lookup(&[
			("SVV_CLIENT_ID", "client-1"),
			("SVV_KEY_ID", "kid-1"),
			("SVV_CERT_PATH", "/etc/svv/client.pem"),
			("SVV_CERT_PASSWORD", "hunter2"),
			("SVV_API_ENVIRONMENT", "test"),
			("SVV_DEBUG", "yes"),
			("SVV_CACHE_ENABLED", "0"),
			("SVV_ORG_NUMBER", "987654321"),
		]))
		.expect("Full environment should produce settings.");

		assert_eq!(settings.environment, Environment::Test);
		assert_eq!(settings.endpoints.audience, "https://test.maskinporten.no/");
		assert!(settings.debug);
		assert!(!settings.cache_enabled);
		assert_eq!(settings.org_number.as_deref(), Some("987654321"));
		assert!(!format!("{settings:?}").contains("hunter2"));
	}

	#[test]
	fn env_settings_reject_missing_and_malformed_values() {
		let missing = Settings::from_env_with(env_lookup(&[("SVV_CLIENT_ID", "client-1")]))
			.expect_err("Missing key id should fail.");

		assert!(matches!(missing, ConfigError::MissingField { field: "key_id" }));

		let malformed = Settings::from_env_with(env_lookup(&[
			("SVV_CLIENT_ID", "client-1"),
			("SVV_KEY_ID", "kid-1"),
			("SVV_CERT_PATH", "/etc/svv/client.pem"),
			("SVV_DEBUG", "maybe"),
		]))
		.expect_err("Unparseable flag should fail.");

		assert!(matches!(malformed, ConfigError::InvalidValue { field: "debug", .. }));
	}

	#[test]
	fn json_document_reports_failing_path() {
		let err = Settings::from_json_str(
			r#"{"client_id":"c","key_id":"k","cert_path":"/x.pem","environment":"staging"}"#,
		)
		.expect_err("Unknown environment should fail.");
		let ConfigError::InvalidDocument { source } = err else {
			panic!("Expected an invalid document error, got {err:?}.");
		};

		assert_eq!(source.path().to_string(), "environment");
	}

	#[test]
	fn json_document_applies_overrides() {
		let settings = Settings::from_json_str(
			r#"{
				"client_id": "c",
				"key_id": "k",
				"cert_path": "/x.pem",
				"environment": "test",
				"request_timeout_secs": 30,
				"retry_attempts": 5,
				"registry_base": "http://localhost:8080"
			}"#,
		)
		.expect("Document with overrides should produce settings.");

		assert_eq!(settings.request_timeout, StdDuration::from_secs(30));
		assert_eq!(settings.retry.attempts, 5);
		assert_eq!(settings.endpoints.registry.as_str(), "http://localhost:8080/");
		assert_eq!(settings.endpoints.token.as_str(), "https://test.maskinporten.no/token");
	}

	#[test]
	fn retry_delays_grow_and_saturate() {
		let policy = RetryPolicy::default();

		assert_eq!(policy.delay_after(1), StdDuration::from_millis(200));
		assert_eq!(policy.delay_after(2), StdDuration::from_millis(400));
		assert_eq!(policy.delay_after(10), StdDuration::from_secs(2));
		assert_eq!(RetryPolicy::immediate(3).delay_after(2), StdDuration::ZERO);
	}
}
