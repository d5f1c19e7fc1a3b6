//! Health report types produced by [`RegistryBroker::run_full_diagnostics`] and
//! [`TokenManager::test_token_generation`].
//!
//! Reports are built fresh on every run and never cached. Each check carries its own
//! [`CheckStatus`], so one failing stage never hides the others.
//!
//! [`RegistryBroker::run_full_diagnostics`]: crate::flows::RegistryBroker::run_full_diagnostics
//! [`TokenManager::test_token_generation`]: crate::flows::TokenManager::test_token_generation

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, auth::CertificateInfo, config::Environment};

/// Status of a single diagnostic check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
	/// Check passed.
	Ok,
	/// Check passed with a caveat worth an operator's attention.
	Warning,
	/// Check failed.
	Failed,
	/// Check did not run because an earlier stage produced nothing to test with.
	#[default]
	Skipped,
}
impl CheckStatus {
	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Ok => "ok",
			Self::Warning => "warning",
			Self::Failed => "failed",
			Self::Skipped => "skipped",
		}
	}
}
impl Display for CheckStatus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Credential file and certificate validity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateCheck {
	/// Outcome.
	pub status: CheckStatus,
	/// Configured credential path.
	pub path: String,
	/// Parsed certificate, when the bundle has one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub certificate: Option<CertificateInfo>,
	/// `true` once the certificate's validity window has ended.
	pub expired: bool,
	/// Error code, on failure.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// Operator-facing detail.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

/// Assertion construction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtCheck {
	/// Outcome.
	pub status: CheckStatus,
	/// Number of compact segments produced.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub segments: Option<usize>,
	/// Length of the compact serialization in bytes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub length: Option<usize>,
	/// Error code, on failure.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// Operator-facing detail.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

/// Token acquisition.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCheck {
	/// Outcome.
	pub status: CheckStatus,
	/// `true` when the token came from the cache.
	pub cache_hit: bool,
	/// Short token prefix for operator logs.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub preview: Option<String>,
	/// Expiry read from the token payload, or the cached record's expiry for opaque tokens.
	#[serde(
		default,
		with = "time::serde::rfc3339::option",
		skip_serializing_if = "Option::is_none"
	)]
	pub expires_at: Option<OffsetDateTime>,
	/// Scope read from the token payload or echoed by the server.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<String>,
	/// Error code, on failure.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// Operator-facing detail.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

/// Registry reachability.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointCheck {
	/// Outcome.
	pub status: CheckStatus,
	/// URL probed.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	/// HTTP status returned by the registry.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub http_status: Option<u16>,
	/// Response headers.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub headers: BTreeMap<String, String>,
	/// Round-trip latency in milliseconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub latency_ms: Option<u64>,
	/// Error code, on failure.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// Operator-facing detail.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

/// Full health report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticReport {
	/// When the run started.
	#[serde(with = "time::serde::rfc3339")]
	pub timestamp: OffsetDateTime,
	/// Environment the run targeted.
	pub environment: Environment,
	/// Credential file and certificate.
	pub certificate: CertificateCheck,
	/// Assertion construction.
	pub jwt: JwtCheck,
	/// Token acquisition.
	pub token: TokenCheck,
	/// Registry reachability.
	pub endpoint: EndpointCheck,
}
impl DiagnosticReport {
	/// Returns `true` when no check failed or was skipped.
	pub fn healthy(&self) -> bool {
		[self.certificate.status, self.jwt.status, self.token.status, self.endpoint.status]
			.iter()
			.all(|status| matches!(status, CheckStatus::Ok | CheckStatus::Warning))
	}
}

/// One step of the token-generation self test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStep {
	/// Step label: `certificate_file`, `private_key`, `assertion`, or `token`.
	pub step: String,
	/// Outcome.
	pub status: CheckStatus,
	/// Operator-facing detail.
	pub message: String,
}

/// Token-generation self test, stopped at the first failing step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGenerationReport {
	/// Steps that ran, in order.
	pub steps: Vec<GenerationStep>,
	/// `true` when every step passed and a token was obtained.
	pub success: bool,
	/// Error code of the failing step.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}
impl TokenGenerationReport {
	pub(crate) fn pass(&mut self, step: &str, message: impl Into<String>) {
		self.steps.push(GenerationStep {
			step: step.into(),
			status: CheckStatus::Ok,
			message: message.into(),
		});
	}

	pub(crate) fn fail(mut self, step: &str, error: &Error) -> Self {
		self.steps.push(GenerationStep {
			step: step.into(),
			status: CheckStatus::Failed,
			message: error.to_string(),
		});
		self.error = Some(error.code().into());

		self
	}
}

/// Claims read, without verification, from a JWT-shaped bearer token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
	/// Expiry, seconds since the Unix epoch.
	#[serde(default)]
	pub exp: Option<i64>,
	/// Granted scope.
	#[serde(default)]
	pub scope: Option<String>,
}
impl TokenClaims {
	/// Expiry as an instant.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.exp.and_then(|exp| OffsetDateTime::from_unix_timestamp(exp).ok())
	}
}

/// Decodes the payload segment of a JWT-shaped token. Returns `None` for opaque tokens.
pub fn peek_token_claims(token: &str) -> Option<TokenClaims> {
	let mut segments = token.split('.');
	let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
		(Some(_), Some(payload), Some(_), None) => payload,
		_ => return None,
	};
	let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;

	serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn jwt_with_payload(payload: &str) -> String {
		format!("eyJhbGciOiJub25lIn0.{}.sig", URL_SAFE_NO_PAD.encode(payload))
	}

	#[test]
	fn token_claims_are_read_without_verification() {
		let token =
			jwt_with_payload(r#"{"exp":1700000000,"scope":"svv:kjoretoy/kjoretoyopplysninger"}"#);
		let claims = peek_token_claims(&token).expect("JWT-shaped token should decode.");

		assert_eq!(claims.scope.as_deref(), Some("svv:kjoretoy/kjoretoyopplysninger"));
		assert_eq!(claims.expires_at().map(OffsetDateTime::unix_timestamp), Some(1_700_000_000));
	}

	#[test]
	fn opaque_tokens_yield_nothing() {
		assert!(peek_token_claims("tok123").is_none());
		assert!(peek_token_claims("a.b").is_none());
		assert!(peek_token_claims("a.!!!.c").is_none());
	}

	#[test]
	fn skipped_checks_make_the_report_unhealthy() {
		let mut report = DiagnosticReport {
			timestamp: OffsetDateTime::now_utc(),
			environment: Environment::Test,
			certificate: CertificateCheck { status: CheckStatus::Ok, ..Default::default() },
			jwt: JwtCheck { status: CheckStatus::Ok, ..Default::default() },
			token: TokenCheck { status: CheckStatus::Warning, ..Default::default() },
			endpoint: EndpointCheck { status: CheckStatus::Ok, ..Default::default() },
		};

		assert!(report.healthy());

		report.endpoint.status = CheckStatus::Skipped;

		assert!(!report.healthy());
		assert_eq!(
			serde_json::to_value(report.endpoint.status).expect("Status should serialize."),
			"skipped"
		);
	}
}
