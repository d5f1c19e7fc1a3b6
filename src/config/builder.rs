// std
use std::{net::IpAddr, path::PathBuf};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::{
		DEFAULT_REQUEST_TIMEOUT, DEFAULT_SCOPE, Endpoints, Environment, RetryPolicy, Settings,
	},
	error::ConfigError,
};

/// Builder for [`Settings`] values.
#[derive(Debug)]
pub struct SettingsBuilder {
	/// Maskinporten integration identifier.
	pub client_id: String,
	/// Key identifier for the assertion header.
	pub key_id: String,
	/// Requested scopes; defaults to [`DEFAULT_SCOPE`].
	pub scope: String,
	/// Optional consumer organization number.
	pub org_number: Option<String>,
	/// Optional assertion resources.
	pub resource: Vec<String>,
	/// Credential bundle path.
	pub cert_path: Option<PathBuf>,
	/// Password for an encrypted private key.
	pub cert_password: Option<TokenSecret>,
	/// Selected environment.
	pub environment: Environment,
	/// Token endpoint override.
	pub token_endpoint: Option<Url>,
	/// Audience override.
	pub audience: Option<String>,
	/// Registry base override.
	pub registry_base: Option<Url>,
	/// Debug flag.
	pub debug: bool,
	/// Initial cache-enabled flag.
	pub cache_enabled: bool,
	/// Bound on each outbound HTTP call.
	pub request_timeout: StdDuration,
	/// Transport retry policy.
	pub retry: RetryPolicy,
}
impl SettingsBuilder {
	/// Creates a builder seeded with production defaults.
	pub fn new(client_id: impl Into<String>, key_id: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			key_id: key_id.into(),
			scope: DEFAULT_SCOPE.into(),
			org_number: None,
			resource: Vec::new(),
			cert_path: None,
			cert_password: None,
			environment: Environment::default(),
			token_endpoint: None,
			audience: None,
			registry_base: None,
			debug: false,
			cache_enabled: true,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			retry: RetryPolicy::default(),
		}
	}

	/// Sets the credential bundle path.
	pub fn cert_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.cert_path = Some(path.into());

		self
	}

	/// Sets the private key password.
	pub fn cert_password(mut self, password: impl Into<String>) -> Self {
		self.cert_password = Some(TokenSecret::new(password));

		self
	}

	/// Selects the environment; explicit endpoint overrides still win.
	pub fn environment(mut self, environment: Environment) -> Self {
		self.environment = environment;

		self
	}

	/// Overrides the requested scopes.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = scope.into();

		self
	}

	/// Sets the consumer organization number.
	pub fn org_number(mut self, org_number: impl Into<String>) -> Self {
		self.org_number = Some(org_number.into());

		self
	}

	/// Replaces the assertion resources.
	pub fn resource<I>(mut self, resource: I) -> Self
	where
		I: IntoIterator<Item = String>,
	{
		self.resource = resource.into_iter().collect();

		self
	}

	/// Overrides the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Overrides the audience claim.
	pub fn audience(mut self, audience: impl Into<String>) -> Self {
		self.audience = Some(audience.into());

		self
	}

	/// Overrides the registry base URL.
	pub fn registry_base(mut self, url: Url) -> Self {
		self.registry_base = Some(url);

		self
	}

	/// Sets the debug flag.
	pub fn debug(mut self, debug: bool) -> Self {
		self.debug = debug;

		self
	}

	/// Sets the initial cache-enabled flag.
	pub fn cache_enabled(mut self, enabled: bool) -> Self {
		self.cache_enabled = enabled;

		self
	}

	/// Overrides the per-request timeout.
	pub fn request_timeout(mut self, timeout: StdDuration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Overrides the transport retry policy.
	pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Consumes the builder and validates the resulting settings.
	pub fn build(self) -> Result<Settings, ConfigError> {
		let client_id = required("client_id", self.client_id)?;
		let key_id = required("key_id", self.key_id)?;
		let scope = required("scope", self.scope)?;
		let cert_path = self
			.cert_path
			.filter(|path| !path.as_os_str().is_empty())
			.ok_or(ConfigError::MissingField { field: "cert_path" })?;
		let defaults = self.environment.endpoints()?;
		let endpoints = Endpoints {
			token: self.token_endpoint.unwrap_or(defaults.token),
			audience: self.audience.unwrap_or(defaults.audience),
			registry: self.registry_base.unwrap_or(defaults.registry),
		};

		validate_endpoint("token", &endpoints.token)?;
		validate_endpoint("registry", &endpoints.registry)?;

		if self.request_timeout.is_zero() {
			return Err(ConfigError::InvalidValue {
				field: "request_timeout",
				value: format!("{:?}", self.request_timeout),
			});
		}
		if self.retry.attempts == 0 {
			return Err(ConfigError::InvalidValue { field: "retry_attempts", value: "0".into() });
		}

		Ok(Settings {
			client_id,
			key_id,
			scope,
			org_number: self.org_number.filter(|value| !value.trim().is_empty()),
			resource: self.resource.into_iter().filter(|value| !value.is_empty()).collect(),
			cert_path,
			cert_password: self.cert_password.filter(|secret| !secret.is_empty()),
			environment: self.environment,
			endpoints,
			debug: self.debug,
			cache_enabled: self.cache_enabled,
			request_timeout: self.request_timeout,
			retry: self.retry,
		})
	}
}

fn required(field: &'static str, value: String) -> Result<String, ConfigError> {
	let trimmed = value.trim();

	if trimmed.is_empty() {
		Err(ConfigError::MissingField { field })
	} else {
		Ok(trimmed.to_owned())
	}
}

/// Endpoints must use HTTPS; plain HTTP is tolerated for loopback hosts only.
fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ConfigError> {
	if url.scheme() == "https" || (url.scheme() == "http" && is_loopback(url)) {
		Ok(())
	} else {
		Err(ConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host_str() {
		Some("localhost") => true,
		Some(host) => host
			.trim_start_matches('[')
			.trim_end_matches(']')
			.parse::<IpAddr>()
			.is_ok_and(|ip| ip.is_loopback()),
		None => false,
	}
}
