//! JWT-bearer assertion claims and the RS256 signer that produces them.

// std
use std::{
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
};
// crates.io
use jsonwebtoken::{Algorithm, Header};
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	auth::{Credential, TokenSecret},
	config::Settings,
	error::CredentialError,
};

/// Authorization servers reject assertions that live longer than this.
pub const ASSERTION_LIFETIME: Duration = Duration::seconds(120);

/// Claim set presented to the authorization server. Built fresh for every signing call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
	/// Issuer; the integration's client identifier.
	pub iss: String,
	/// Audience; the authorization server URL for the selected environment.
	pub aud: String,
	/// Space-delimited scopes being requested.
	pub scope: String,
	/// Issued-at, seconds since the Unix epoch.
	pub iat: i64,
	/// Expiry, always `iat + 120`.
	pub exp: i64,
	/// Unique assertion identifier.
	pub jti: String,
	/// Optional target resources.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub resource: Vec<String>,
	/// Optional consumer organization number.
	#[serde(default, rename = "consumer_org", skip_serializing_if = "Option::is_none")]
	pub org_number: Option<String>,
}
impl AssertionClaims {
	/// Creates claims issued now with a random `jti`.
	pub fn new(
		issuer: impl Into<String>,
		audience: impl Into<String>,
		scope: impl Into<String>,
	) -> Self {
		Self::issued_at(issuer, audience, scope, OffsetDateTime::now_utc())
	}

	/// Creates claims issued at the provided instant.
	pub fn issued_at(
		issuer: impl Into<String>,
		audience: impl Into<String>,
		scope: impl Into<String>,
		instant: OffsetDateTime,
	) -> Self {
		let iat = instant.unix_timestamp();

		Self {
			iss: issuer.into(),
			aud: audience.into(),
			scope: scope.into(),
			iat,
			exp: iat + ASSERTION_LIFETIME.whole_seconds(),
			jti: Uuid::new_v4().to_string(),
			resource: Vec::new(),
			org_number: None,
		}
	}

	/// Builds the claims a token exchange needs from validated settings.
	pub fn from_settings(settings: &Settings) -> Self {
		Self::new(&settings.client_id, &settings.endpoints.audience, &settings.scope)
			.with_resource(settings.resource.iter().cloned())
			.with_org_number(settings.org_number.clone())
	}

	/// Adds target resources.
	pub fn with_resource<I>(mut self, resource: I) -> Self
	where
		I: IntoIterator<Item = String>,
	{
		self.resource.extend(resource);

		self
	}

	/// Sets or clears the consumer organization number.
	pub fn with_org_number(mut self, org_number: Option<String>) -> Self {
		self.org_number = org_number.filter(|value| !value.is_empty());

		self
	}
}

/// Compact `header.payload.signature` assertion. Single use.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedAssertion(String);
impl SignedAssertion {
	/// Returns the compact serialization.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Number of `.`-separated segments (three for a well-formed JWS).
	pub fn segment_count(&self) -> usize {
		self.0.split('.').count()
	}

	/// Length of the compact serialization in bytes.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` for an empty assertion.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl Debug for SignedAssertion {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "SignedAssertion({} bytes)", self.0.len())
	}
}

/// Produces RS256 assertions from the configured credential file.
///
/// The credential is read on first use and memoized; a failed load is not cached, so a fixed
/// file on disk is picked up by the next call.
pub struct CredentialSigner {
	path: PathBuf,
	password: Option<TokenSecret>,
	key_id: String,
	credential: Mutex<Option<Arc<Credential>>>,
	signatures: AtomicU64,
}
impl CredentialSigner {
	/// Creates a signer for the credential file at `path`.
	pub fn new(
		path: impl Into<PathBuf>,
		password: Option<TokenSecret>,
		key_id: impl Into<String>,
	) -> Self {
		Self {
			path: path.into(),
			password,
			key_id: key_id.into(),
			credential: Mutex::new(None),
			signatures: AtomicU64::new(0),
		}
	}

	/// Creates a signer from validated settings.
	pub fn from_settings(settings: &Settings) -> Self {
		Self::new(&settings.cert_path, settings.cert_password.clone(), &settings.key_id)
	}

	/// Path of the credential file.
	pub fn path(&self) -> &std::path::Path {
		&self.path
	}

	/// Number of signatures produced so far.
	pub fn signatures(&self) -> u64 {
		self.signatures.load(Ordering::Relaxed)
	}

	/// Returns the loaded credential, reading it from disk on first use.
	pub fn credential(&self) -> Result<Arc<Credential>, CredentialError> {
		let mut slot = self.credential.lock();

		if let Some(credential) = slot.as_ref() {
			return Ok(credential.clone());
		}

		let credential = Arc::new(Credential::load(&self.path, self.password.as_ref())?);

		*slot = Some(credential.clone());

		Ok(credential)
	}

	/// Signs `claims` with RS256, adding `kid` and, when available, `x5c` to the header.
	pub fn sign(&self, claims: &AssertionClaims) -> Result<SignedAssertion, CredentialError> {
		let credential = self.credential()?;
		let mut header = Header::new(Algorithm::RS256);

		header.kid = Some(self.key_id.clone());
		header.x5c = credential.certificate_chain_entry().map(|entry| vec![entry.to_owned()]);

		let compact = jsonwebtoken::encode(&header, claims, credential.encoding_key())
			.map_err(|source| CredentialError::SigningFailed { source })?;

		self.signatures.fetch_add(1, Ordering::Relaxed);
		tracing::debug!(kid = %self.key_id, jti = %claims.jti, "Signed JWT-bearer assertion.");

		Ok(SignedAssertion(compact))
	}
}
impl Debug for CredentialSigner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialSigner")
			.field("path", &self.path)
			.field("password_set", &self.password.is_some())
			.field("key_id", &self.key_id)
			.field("loaded", &self.credential.lock().is_some())
			.finish()
	}
}
