//! Registry lookups with transport retries and the 401 fallback ladder.
//!
//! The primary request is the bulk shape, retried on transport failures under the configured
//! [`RetryPolicy`](crate::config::RetryPolicy). A 401 answer walks the ladder once: the flat
//! body on the same endpoint, then a token refresh and the per-registration endpoint. Each
//! fallback step is a single attempt. Any other non-200 status surfaces immediately.
//!
//! The ladder can hide a misconfigured credential behind what looks like a shape problem; the
//! final 401 still surfaces as [`Error::ApiError`] with the registry's body excerpt.

// crates.io
use reqwest::{RequestBuilder, header::ACCEPT};
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	cache::{self, CacheValue, CachedFailure, ERROR_TTL, TokenCache, VEHICLE_TTL},
	config::Settings,
	flows::TokenManager,
	http::{HttpResponse, ReqwestHttpClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	registration::RegistrationNumber,
	registry::{self, RequestShape},
	vehicle::{self, VehicleRecord},
};

/// Throwaway plate used by connectivity probes.
pub const PROBE_REGISTRATION: &str = "AA00000";

const REGISTRY_ENDPOINT: &str = "registry";
const UNAUTHORIZED: u16 = 401;

/// Looks up vehicles in the registry and caches normalized records.
pub struct VehicleClient {
	settings: Arc<Settings>,
	cache: Arc<TokenCache>,
	tokens: Arc<TokenManager>,
	http_client: ReqwestHttpClient,
}
impl VehicleClient {
	/// Creates a client sharing the broker's settings, cache, token manager, and transport.
	pub fn new(
		settings: Arc<Settings>,
		cache: Arc<TokenCache>,
		tokens: Arc<TokenManager>,
		http_client: ReqwestHttpClient,
	) -> Self {
		Self { settings, cache, tokens, http_client }
	}

	/// Returns the normalized record for `input`, serving cached answers when possible.
	pub async fn get_vehicle_by_registration(&self, input: &str) -> Result<VehicleRecord> {
		const KIND: FlowKind = FlowKind::VehicleLookup;

		let reg = RegistrationNumber::parse(input)?;
		let span = FlowSpan::new(KIND, "get_vehicle_by_registration");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.lookup(&reg)).await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		if let Err(e) = &result {
			tracing::warn!(
				registration = %reg,
				code = e.code(),
				error = %e,
				"Vehicle lookup failed."
			);
		}

		result
	}

	/// Sends one bulk-shape request for [`PROBE_REGISTRATION`] without retries or fallbacks.
	pub async fn probe(&self, token: &AccessToken) -> Result<HttpResponse> {
		let reg = RegistrationNumber::parse(PROBE_REGISTRATION)?;

		self.send_once(RequestShape::Bulk, &reg, token).await
	}

	async fn lookup(&self, reg: &RegistrationNumber) -> Result<VehicleRecord> {
		let key = cache::vehicle_key(reg);

		match self.cache.get(&key).await? {
			Some(CacheValue::Vehicle(record)) => {
				tracing::debug!(registration = %reg, "Serving cached vehicle record.");

				return Ok(*record);
			},
			Some(CacheValue::Failure(failure)) => {
				tracing::debug!(registration = %reg, "Serving cached registry failure.");

				return Err(Error::NotFound { message: failure.message });
			},
			_ => {},
		}

		let token = self.tokens.get_access_token(false).await?;
		let response = self.fetch(reg, &token).await?;

		if response.status() != 200 {
			return Err(Error::ApiError {
				status: response.status(),
				retry_after: response.metadata.retry_after,
				body: Some(response.excerpt()),
			});
		}

		let payload = match registry::extract_payload(&response.body) {
			Ok(payload) => payload,
			Err(Error::NotFound { message }) => {
				let failure = CachedFailure { code: "not_found".into(), message: message.clone() };

				self.cache.set_with_ttl(&key, CacheValue::Failure(failure), ERROR_TTL).await?;

				return Err(Error::NotFound { message });
			},
			Err(e) => return Err(e),
		};
		let mut record = vehicle::normalize(&payload);

		if self.settings.debug {
			record.raw = Some(payload);
		}

		self.cache
			.set_with_ttl(&key, CacheValue::Vehicle(Box::new(record.clone())), VEHICLE_TTL)
			.await?;
		tracing::info!(registration = %reg, "Vehicle record fetched.");

		Ok(record)
	}

	async fn fetch(&self, reg: &RegistrationNumber, token: &AccessToken) -> Result<HttpResponse> {
		let mut response = self.send_with_retry(RequestShape::Bulk, reg, token).await?;

		if response.status() == UNAUTHORIZED {
			tracing::warn!(
				registration = %reg,
				body = %response.excerpt(),
				"Bulk request rejected with 401; retrying with a flat body."
			);

			response = self.send_once(RequestShape::Flat, reg, token).await?;
		}
		if response.status() == UNAUTHORIZED {
			tracing::warn!(
				registration = %reg,
				body = %response.excerpt(),
				"Flat request rejected with 401; refreshing the token for the direct endpoint."
			);

			self.tokens.invalidate().await?;

			let token = self.tokens.get_access_token(false).await?;

			response = self.send_once(RequestShape::Direct, reg, &token).await?;
		}

		Ok(response)
	}

	async fn send_with_retry(
		&self,
		shape: RequestShape,
		reg: &RegistrationNumber,
		token: &AccessToken,
	) -> Result<HttpResponse> {
		let policy = self.settings.retry;
		let mut attempt = 1;

		loop {
			let request = self.request(shape, reg, token)?;

			match self.http_client.execute(REGISTRY_ENDPOINT, request).await {
				Ok(response) => return Ok(response),
				Err(source) if attempt >= policy.attempts =>
					return Err(Error::ApiRequestFailed { attempts: attempt, source }),
				Err(e) => {
					let delay = policy.delay_after(attempt);

					tracing::warn!(
						shape = shape.as_str(),
						attempt,
						max_attempts = policy.attempts,
						delay_ms = delay.as_millis() as u64,
						error = %e,
						"Registry request failed; retrying."
					);

					if !delay.is_zero() {
						tokio::time::sleep(delay).await;
					}

					attempt += 1;
				},
			}
		}
	}

	async fn send_once(
		&self,
		shape: RequestShape,
		reg: &RegistrationNumber,
		token: &AccessToken,
	) -> Result<HttpResponse> {
		let request = self.request(shape, reg, token)?;

		self.http_client
			.execute(REGISTRY_ENDPOINT, request)
			.await
			.map_err(|source| Error::ApiRequestFailed { attempts: 1, source })
	}

	fn request(
		&self,
		shape: RequestShape,
		reg: &RegistrationNumber,
		token: &AccessToken,
	) -> Result<RequestBuilder> {
		let url = shape.url(&self.settings.endpoints, reg)?;
		let builder =
			if shape.is_post() { self.http_client.post(url) } else { self.http_client.get(url) };
		let builder = builder.bearer_auth(token.bearer()).header(ACCEPT, "application/json");

		Ok(match shape.body(reg) {
			Some(body) => builder.json(&body),
			None => builder,
		})
	}
}
impl Debug for VehicleClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("VehicleClient")
			.field("registry", &self.settings.endpoints.registry.as_str())
			.field("retry", &self.settings.retry)
			.finish()
	}
}
