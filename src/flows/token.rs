//! JWT-bearer token exchange with cache reuse.
//!
//! [`TokenManager::get_access_token`] returns the cached bearer token while it is unexpired and
//! the cache is enabled, without signing or calling the authorization server. Otherwise it signs
//! fresh claims, posts them with the `urn:ietf:params:oauth:grant-type:jwt-bearer` grant, and
//! caches the result for the server's `expires_in` minus [`EXPIRY_MARGIN`]. Any failure clears
//! the cached token.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use reqwest::header::ACCEPT;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, AssertionClaims, CredentialSigner, read_pem},
	cache::{CacheValue, TOKEN_KEY, TOKEN_TTL, TokenCache},
	config::Settings,
	diagnostics::TokenGenerationReport,
	http::{HttpResponse, ReqwestHttpClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Grant type sent with every assertion.
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Subtracted from the server's `expires_in` before caching.
pub const EXPIRY_MARGIN: Duration = Duration::seconds(60);
/// Largest `expires_in` accepted from the server; values outside `0..=MAX_EXPIRES_IN` fall back
/// to [`TOKEN_TTL`].
pub const MAX_EXPIRES_IN: i64 = 86_400;

const TOKEN_ENDPOINT: &str = "token";

/// Thread-safe counters for token acquisition.
#[derive(Debug, Default)]
pub struct TokenMetrics {
	attempts: AtomicU64,
	cache_hits: AtomicU64,
	signings: AtomicU64,
	exchanges: AtomicU64,
	failures: AtomicU64,
}
impl TokenMetrics {
	/// Total calls to [`TokenManager::get_access_token`].
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Calls answered from the cache.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Assertions signed.
	pub fn signings(&self) -> u64 {
		self.signings.load(Ordering::Relaxed)
	}

	/// Requests sent to the token endpoint.
	pub fn exchanges(&self) -> u64 {
		self.exchanges.load(Ordering::Relaxed)
	}

	/// Calls that ended in an error.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	fn record(counter: &AtomicU64) {
		counter.fetch_add(1, Ordering::Relaxed);
	}
}

/// Token endpoint response body. Every field is optional so error bodies parse too.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TokenResponse {
	/// Issued bearer token.
	#[serde(default)]
	pub access_token: Option<String>,
	/// Token lifetime in seconds.
	#[serde(default)]
	pub expires_in: Option<i64>,
	/// Granted scope.
	#[serde(default)]
	pub scope: Option<String>,
	/// Token type, normally `Bearer`.
	#[serde(default)]
	pub token_type: Option<String>,
	/// OAuth error code.
	#[serde(default)]
	pub error: Option<String>,
	/// OAuth error description.
	#[serde(default)]
	pub error_description: Option<String>,
}

/// Obtains, caches, and invalidates bearer tokens.
pub struct TokenManager {
	settings: Arc<Settings>,
	cache: Arc<TokenCache>,
	signer: CredentialSigner,
	http_client: ReqwestHttpClient,
	metrics: Arc<TokenMetrics>,
}
impl TokenManager {
	/// Creates a manager sharing the broker's settings, cache, and transport.
	pub fn new(
		settings: Arc<Settings>,
		cache: Arc<TokenCache>,
		http_client: ReqwestHttpClient,
	) -> Self {
		let signer = CredentialSigner::from_settings(&settings);

		Self { settings, cache, signer, http_client, metrics: Default::default() }
	}

	/// Signer used for every exchange.
	pub fn signer(&self) -> &CredentialSigner {
		&self.signer
	}

	/// Shared acquisition counters.
	pub fn metrics(&self) -> Arc<TokenMetrics> {
		self.metrics.clone()
	}

	/// Returns a bearer token, reusing the cached one unless `force_new` is set.
	pub async fn get_access_token(&self, force_new: bool) -> Result<AccessToken> {
		const KIND: FlowKind = FlowKind::TokenExchange;

		TokenMetrics::record(&self.metrics.attempts);

		if !force_new {
			if let Some(token) = self.cached_token().await? {
				TokenMetrics::record(&self.metrics.cache_hits);
				tracing::debug!(token = %token.secret.preview(8), "Reusing cached access token.");

				return Ok(token);
			}
		}

		let span = FlowSpan::new(KIND, "get_access_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.exchange()).await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		if let Err(e) = &result {
			TokenMetrics::record(&self.metrics.failures);
			tracing::warn!(error = %e, code = e.code(), "Token acquisition failed.");

			if let Err(clear) = self.invalidate().await {
				tracing::warn!(error = %clear, "Failed to clear cached token after failure.");
			}
		}

		result
	}

	/// Returns the cached token without touching the network.
	pub async fn cached_token(&self) -> Result<Option<AccessToken>> {
		match self.cache.get(TOKEN_KEY).await? {
			Some(CacheValue::Token(token)) if !token.is_expired() => Ok(Some(token)),
			_ => Ok(None),
		}
	}

	/// Deletes the cached token so the next call performs a fresh exchange.
	pub async fn invalidate(&self) -> Result<()> {
		if self.cache.delete(TOKEN_KEY).await? {
			tracing::info!("Cached access token invalidated.");
		}

		Ok(())
	}

	/// Walks certificate file, private key, assertion, and token acquisition, stopping at the
	/// first failing step.
	pub async fn test_token_generation(&self) -> TokenGenerationReport {
		let mut report = TokenGenerationReport::default();
		let path = self.signer.path();

		if let Err(e) = read_pem(path) {
			return report.fail("certificate_file", &e.into());
		}

		report.pass("certificate_file", format!("Credential file found at {}.", path.display()));

		let credential = match self.signer.credential() {
			Ok(credential) => credential,
			Err(e) => return report.fail("private_key", &e.into()),
		};

		let chain = if credential.certificate_chain_entry().is_some() { "with" } else { "without" };

		report.pass(
			"private_key",
			format!("Private key loaded as {:?}, {chain} certificate.", credential.key_format()),
		);

		match self.signer.sign(&AssertionClaims::from_settings(&self.settings)) {
			Ok(assertion) => report.pass(
				"assertion",
				format!(
					"Assertion created ({} bytes, {} segments).",
					assertion.len(),
					assertion.segment_count()
				),
			),
			Err(e) => return report.fail("assertion", &e.into()),
		}

		match self.get_access_token(false).await {
			Ok(token) => {
				let preview = token.secret.preview(8);

				report.pass("token", format!("Access token obtained ({preview})."));
				report.success = true;

				report
			},
			Err(e) => report.fail("token", &e),
		}
	}

	async fn exchange(&self) -> Result<AccessToken> {
		let claims = AssertionClaims::from_settings(&self.settings);
		let assertion = self.signer.sign(&claims)?;

		TokenMetrics::record(&self.metrics.signings);

		let request = self
			.http_client
			.post(self.settings.endpoints.token.clone())
			.header(ACCEPT, "application/json")
			.form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())]);

		TokenMetrics::record(&self.metrics.exchanges);

		let response = self
			.http_client
			.execute(TOKEN_ENDPOINT, request)
			.await
			.map_err(|source| Error::TokenRequestFailed { source })?;
		let issued_at = OffsetDateTime::now_utc();
		let body = parse_token_response(&response)?;
		let (lifetime, ttl) = match body.expires_in {
			Some(secs) if (0..=MAX_EXPIRES_IN).contains(&secs) =>
				(Duration::seconds(secs), Duration::seconds(secs) - EXPIRY_MARGIN),
			Some(secs) => {
				tracing::warn!(expires_in = secs, "Ignoring out-of-range token lifetime.");

				(TOKEN_TTL, TOKEN_TTL)
			},
			None => (TOKEN_TTL, TOKEN_TTL),
		};
		let Some(secret) = body.access_token.filter(|token| !token.is_empty()) else {
			let status = Some(response.status());

			return Err(Error::token_error("token_error", body.error_description, status));
		};
		let token = AccessToken::new(secret, issued_at, lifetime, body.scope);

		if ttl.is_positive() {
			self.cache.set_with_ttl(TOKEN_KEY, CacheValue::Token(token.clone()), ttl).await?;
		} else {
			tracing::warn!(expires_in = body.expires_in, "Token lifetime too short to cache.");
		}

		tracing::info!(
			token = %token.secret.preview(8),
			expires_in = lifetime.whole_seconds(),
			"Obtained new access token."
		);

		Ok(token)
	}
}
impl Debug for TokenManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("token_endpoint", &self.settings.endpoints.token.as_str())
			.field("signer", &self.signer)
			.field("metrics", &self.metrics)
			.finish()
	}
}

fn parse_token_response(response: &HttpResponse) -> Result<TokenResponse> {
	let status = response.status();
	let mut de = serde_json::Deserializer::from_str(&response.body);
	let parsed = serde_path_to_error::deserialize::<_, TokenResponse>(&mut de);

	match parsed {
		Ok(body) if status == 200 => Ok(body),
		Ok(body) => Err(Error::token_error(
			body.error.unwrap_or_else(|| "token_error".into()),
			body.error_description,
			Some(status),
		)),
		Err(e) => {
			tracing::debug!(status, body = %response.excerpt(), "Unparseable token response.");

			Err(Error::token_error(
				"token_error",
				Some(format!("Token endpoint returned unparseable JSON at {}.", e.path())),
				Some(status),
			))
		},
	}
}
