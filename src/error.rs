//! Crate-level error types shared across the signer, the cache, and the lookup flows.

// std
use std::path::PathBuf;
// self
use crate::{_prelude::*, cache::StoreError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const MASKED_REGISTRY_CODES: [(&str, &str); 3] = [
	("OPPLYSNINGER_UTILGJENGELIG", "This vehicle information is not available for public access."),
	("FNR_ETTERNAVN_UKJENT", "Owner information could not be found."),
	("UGYLDIG_DTG", "Invalid date parameter."),
];
const QUOTA_MESSAGE: &str = "Query limit exceeded. Please try again later.";

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credential loading or assertion signing failed.
	#[error(transparent)]
	Credential(#[from] CredentialError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Cache backend failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		StoreError,
	),

	/// Token endpoint could not be reached.
	#[error("Token request failed before the authorization server answered.")]
	TokenRequestFailed {
		/// Underlying transport failure.
		#[source]
		source: TransportError,
	},
	/// Authorization server rejected the assertion or answered without a token.
	#[error("Authorization server rejected the token request: {}.", describe_token_error(.error, .description.as_deref()))]
	TokenError {
		/// OAuth error code (or a local placeholder when the server sent none).
		error: String,
		/// Optional `error_description` from the server.
		description: Option<String>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Registration number does not match `^[A-Z0-9]{1,8}$` after normalization.
	#[error("Registration number `{input}` is not a valid Norwegian plate.")]
	InvalidRegistrationFormat {
		/// Raw caller input.
		input: String,
	},
	/// Registry could not be reached after exhausting the retry budget.
	#[error("Registry request failed after {attempts} attempt(s).")]
	ApiRequestFailed {
		/// Number of attempts performed.
		attempts: u32,
		/// Last transport failure.
		#[source]
		source: TransportError,
	},
	/// Registry answered with a non-200 final status.
	#[error("Registry answered with HTTP {status}.")]
	ApiError {
		/// HTTP status code of the final attempt.
		status: u16,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
		/// Truncated response body, kept for operators.
		body: Option<String>,
	},
	/// Registry body is not valid JSON.
	#[error("Registry returned malformed JSON.")]
	ResponseParseError {
		/// Structured parsing failure.
		#[source]
		source: serde_json::Error,
	},
	/// Registry reported that no vehicle matches the registration number.
	#[error("Registry reported an error for this registration: {message}.")]
	NotFound {
		/// Upstream `feilmelding` text.
		message: String,
	},
	/// Registry answered without a vehicle payload.
	#[error("Registry response carried no vehicle data.")]
	NoVehicleData,
	/// Registry answered 200 with an error or quota envelope.
	#[error("Registry returned an error envelope: {message}.")]
	InvalidApiResponse {
		/// Upstream `feilmelding` text.
		message: String,
		/// Remaining quota reported by the registry, if present.
		remaining_quota: Option<i64>,
	},
}
impl Error {
	/// Returns the flat taxonomy tag for this error.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Credential(e) => e.kind(),
			Self::Config(_) => ErrorKind::Config,
			Self::Storage(_) => ErrorKind::Storage,
			Self::TokenRequestFailed { .. } => ErrorKind::TokenRequestFailed,
			Self::TokenError { .. } => ErrorKind::TokenError,
			Self::InvalidRegistrationFormat { .. } => ErrorKind::InvalidRegistrationFormat,
			Self::ApiRequestFailed { .. } => ErrorKind::ApiRequestFailed,
			Self::ApiError { .. } => ErrorKind::ApiError,
			Self::ResponseParseError { .. } => ErrorKind::ResponseParseError,
			Self::NotFound { .. } => ErrorKind::NotFound,
			Self::NoVehicleData => ErrorKind::NoVehicleData,
			Self::InvalidApiResponse { .. } => ErrorKind::InvalidApiResponse,
		}
	}

	/// Stable snake_case code for this error.
	pub fn code(&self) -> &'static str {
		self.kind().code()
	}

	/// End-user message for this error.
	///
	/// Registry messages carrying one of the masked registry codes, and quota failures, get their
	/// dedicated wording; everything else falls back to [`ErrorKind::user_message`].
	pub fn user_message(&self) -> &'static str {
		match self {
			Self::ApiError { status: 422, .. } => QUOTA_MESSAGE,
			Self::InvalidApiResponse { remaining_quota: Some(_), .. } => QUOTA_MESSAGE,
			Self::NotFound { message } | Self::InvalidApiResponse { message, .. } =>
				masked_registry_message(message).unwrap_or_else(|| self.kind().user_message()),
			_ => self.kind().user_message(),
		}
	}

	pub(crate) fn token_error(
		error: impl Into<String>,
		description: Option<String>,
		status: Option<u16>,
	) -> Self {
		Self::TokenError { error: error.into(), description, status }
	}
}

/// Flat error taxonomy with stable codes and end-user messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	/// Credential file is missing.
	CertificateNotFound,
	/// Credential file exists but could not be read.
	KeyReadError,
	/// Private key could not be decoded or decrypted.
	KeyLoadFailed,
	/// RS256 signing failed.
	SigningFailed,
	/// Token endpoint unreachable.
	TokenRequestFailed,
	/// Token endpoint rejected the grant.
	TokenError,
	/// Registration number failed validation.
	InvalidRegistrationFormat,
	/// Registry unreachable after retries.
	ApiRequestFailed,
	/// Registry answered with a non-200 status.
	ApiError,
	/// Registry body is not JSON.
	ResponseParseError,
	/// Registry reported an unknown vehicle.
	NotFound,
	/// Registry answered without a vehicle payload.
	NoVehicleData,
	/// Registry answered with an error envelope.
	InvalidApiResponse,
	/// Settings failed validation.
	Config,
	/// Cache backend failed.
	Storage,
}
impl ErrorKind {
	/// Returns the stable snake_case code.
	pub const fn code(self) -> &'static str {
		match self {
			Self::CertificateNotFound => "cert_not_found",
			Self::KeyReadError => "key_read_failed",
			Self::KeyLoadFailed => "cert_load_failed",
			Self::SigningFailed => "jwt_signing_failed",
			Self::TokenRequestFailed => "token_request_failed",
			Self::TokenError => "token_error",
			Self::InvalidRegistrationFormat => "invalid_reg",
			Self::ApiRequestFailed => "api_request_failed",
			Self::ApiError => "api_error",
			Self::ResponseParseError => "response_parse_error",
			Self::NotFound => "not_found",
			Self::NoVehicleData => "no_vehicle_data",
			Self::InvalidApiResponse => "invalid_api_response",
			Self::Config => "config_error",
			Self::Storage => "storage_error",
		}
	}

	/// Returns the single end-user message mapped to this kind.
	pub const fn user_message(self) -> &'static str {
		match self {
			Self::CertificateNotFound | Self::Config =>
				"System configuration error. Please contact support.",
			Self::KeyReadError | Self::KeyLoadFailed =>
				"System security error. Please contact support.",
			Self::SigningFailed => "Authentication error. Please try again later.",
			Self::TokenRequestFailed | Self::TokenError =>
				"Authentication failed. Please try again later.",
			Self::InvalidRegistrationFormat =>
				"Invalid registration number format. Please check and try again.",
			Self::ApiRequestFailed | Self::ApiError =>
				"Vehicle information service is currently unavailable. Please try again later.",
			Self::NotFound =>
				"No vehicle found with this registration number. Please check and try again.",
			Self::ResponseParseError
			| Self::NoVehicleData
			| Self::InvalidApiResponse
			| Self::Storage =>
				"An error occurred while retrieving vehicle information. Please try again later.",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.code())
	}
}

/// Credential loading and signing failures.
#[derive(Debug, ThisError)]
pub enum CredentialError {
	/// Configured credential file does not exist.
	#[error("Credential file {} does not exist.", .path.display())]
	CertificateNotFound {
		/// Configured path.
		path: PathBuf,
	},
	/// Credential file exists but could not be read.
	#[error("Credential file {} could not be read.", .path.display())]
	KeyReadError {
		/// Configured path.
		path: PathBuf,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
	/// Private key is missing, malformed, or the password does not unlock it.
	#[error("Private key could not be loaded: {reason}.")]
	KeyLoadFailed {
		/// Human-readable cause.
		reason: String,
	},
	/// The RS256 primitive rejected the signing input.
	#[error("Assertion signing failed.")]
	SigningFailed {
		/// Underlying JWT library failure.
		#[source]
		source: jsonwebtoken::errors::Error,
	},
}
impl CredentialError {
	/// Returns the flat taxonomy tag for this error.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::CertificateNotFound { .. } => ErrorKind::CertificateNotFound,
			Self::KeyReadError { .. } => ErrorKind::KeyReadError,
			Self::KeyLoadFailed { .. } => ErrorKind::KeyLoadFailed,
			Self::SigningFailed { .. } => ErrorKind::SigningFailed,
		}
	}

	pub(crate) fn key_load(reason: impl Display) -> Self {
		Self::KeyLoadFailed { reason: reason.to_string() }
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A required setting was not supplied.
	#[error("Setting `{field}` is required.")]
	MissingField {
		/// Setting name.
		field: &'static str,
	},
	/// A setting carries a value that cannot be interpreted.
	#[error("Setting `{field}` has an invalid value `{value}`.")]
	InvalidValue {
		/// Setting name.
		field: &'static str,
		/// Offending value.
		value: String,
	},
	/// A URL setting cannot be parsed.
	#[error("Setting `{field}` is not a valid URL.")]
	InvalidUrl {
		/// Setting name.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Settings document could not be deserialized.
	#[error("Settings document is invalid.")]
	InvalidDocument {
		/// Structured parsing failure including the failing field path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, timeout, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {endpoint}.")]
	Network {
		/// Endpoint label.
		endpoint: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Request exceeded the configured timeout.
	#[error("Request to {endpoint} timed out.")]
	Timeout {
		/// Endpoint label.
		endpoint: &'static str,
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(endpoint: &'static str, src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { endpoint, source: Box::new(src) }
	}

	/// Classifies a reqwest failure for the named endpoint.
	pub fn from_reqwest(endpoint: &'static str, e: ReqwestError) -> Self {
		if e.is_timeout() {
			Self::Timeout { endpoint, source: Box::new(e) }
		} else {
			Self::network(endpoint, e)
		}
	}
}

fn describe_token_error(error: &str, description: Option<&str>) -> String {
	match description {
		Some(description) if !description.is_empty() => format!("{error} ({description})"),
		_ => error.to_owned(),
	}
}

fn masked_registry_message(message: &str) -> Option<&'static str> {
	MASKED_REGISTRY_CODES
		.iter()
		.find(|(code, _)| message.contains(code))
		.map(|(_, user_message)| *user_message)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn masked_registry_codes_override_not_found_message() {
		let err = Error::NotFound { message: "OPPLYSNINGER_UTILGJENGELIG".into() };

		assert_eq!(err.code(), "not_found");
		assert_eq!(
			err.user_message(),
			"This vehicle information is not available for public access."
		);

		let plain = Error::NotFound { message: "KJORETOY_IKKE_FUNNET".into() };

		assert_eq!(
			plain.user_message(),
			"No vehicle found with this registration number. Please check and try again."
		);
	}

	#[test]
	fn quota_failures_use_the_quota_message() {
		let status = Error::ApiError { status: 422, retry_after: None, body: None };
		let envelope = Error::InvalidApiResponse {
			message: "Quota exceeded".into(),
			remaining_quota: Some(0),
		};

		assert_eq!(status.user_message(), QUOTA_MESSAGE);
		assert_eq!(envelope.user_message(), QUOTA_MESSAGE);
		assert_eq!(envelope.kind(), ErrorKind::InvalidApiResponse);
	}

	#[test]
	fn credential_errors_keep_their_kind_through_the_wrapper() {
		let err: Error =
			CredentialError::CertificateNotFound { path: "/missing.pem".into() }.into();

		assert_eq!(err.kind(), ErrorKind::CertificateNotFound);
		assert_eq!(err.code(), "cert_not_found");
		assert_eq!(err.user_message(), "System configuration error. Please contact support.");
		assert!(err.to_string().contains("/missing.pem"));
	}

	#[test]
	fn token_error_display_includes_description() {
		let err = Error::token_error("invalid_scope", Some("scope not allowed".into()), Some(400));

		assert_eq!(
			err.to_string(),
			"Authorization server rejected the token request: invalid_scope (scope not allowed)."
		);
		assert_eq!(err.kind().to_string(), "token_error");
	}
}
