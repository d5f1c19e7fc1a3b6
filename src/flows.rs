//! Flow orchestrators behind the [`RegistryBroker`] facade.

pub mod diagnostics;
pub mod lookup;
pub mod token;

pub use lookup::*;
pub use token::*;

// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	cache::{CacheBackend, TokenCache},
	config::Settings,
	http::ReqwestHttpClient,
	response::LookupResponse,
	vehicle::VehicleRecord,
};

/// Coordinates token acquisition, registry lookups, and diagnostics for one integration.
///
/// The broker owns the settings, the shared cache, and a single HTTP client so the token
/// manager and the vehicle client agree on timeouts and cache state. Every call runs its
/// pipeline sequentially; concurrent cache misses may each reach the network.
pub struct RegistryBroker {
	settings: Arc<Settings>,
	cache: Arc<TokenCache>,
	tokens: Arc<TokenManager>,
	vehicles: VehicleClient,
}
impl RegistryBroker {
	/// Creates a broker with an in-memory cache and a client bounded by the configured timeout.
	pub fn new(settings: Settings) -> Result<Self> {
		let cache = Arc::new(TokenCache::in_memory(settings.cache_enabled));
		let http_client = ReqwestHttpClient::with_timeout(settings.request_timeout)?;

		Ok(Self::with_http_client(settings, cache, http_client))
	}

	/// Creates a broker whose cache lives in the provided backend.
	pub fn with_cache_backend(
		settings: Settings,
		backend: Arc<dyn CacheBackend>,
	) -> Result<Self> {
		let cache = Arc::new(TokenCache::new(backend, settings.cache_enabled));
		let http_client = ReqwestHttpClient::with_timeout(settings.request_timeout)?;

		Ok(Self::with_http_client(settings, cache, http_client))
	}

	/// Creates a broker that reuses the caller-provided cache and transport.
	pub fn with_http_client(
		settings: Settings,
		cache: Arc<TokenCache>,
		http_client: ReqwestHttpClient,
	) -> Self {
		let settings = Arc::new(settings);
		let tokens =
			Arc::new(TokenManager::new(settings.clone(), cache.clone(), http_client.clone()));
		let vehicles =
			VehicleClient::new(settings.clone(), cache.clone(), tokens.clone(), http_client);

		Self { settings, cache, tokens, vehicles }
	}

	/// Returns a bearer token, reusing the cached one unless `force_new` is set.
	pub async fn get_access_token(&self, force_new: bool) -> Result<AccessToken> {
		self.tokens.get_access_token(force_new).await
	}

	/// Looks up a vehicle by registration number.
	pub async fn get_vehicle_by_registration(&self, registration: &str) -> Result<VehicleRecord> {
		self.vehicles.get_vehicle_by_registration(registration).await
	}

	/// Looks up a vehicle and wraps the outcome in a caller-facing envelope.
	pub async fn lookup(&self, registration: &str) -> LookupResponse {
		LookupResponse::from_result(&self.get_vehicle_by_registration(registration).await)
	}

	/// Turns caching on or off without touching stored entries.
	pub fn set_cache_enabled(&self, enabled: bool) {
		self.cache.set_enabled(enabled);
	}

	/// Removes every cached token and vehicle record. Call on teardown.
	pub async fn clear_cache(&self) -> Result<usize> {
		self.cache.clear_all().await
	}

	/// Token manager shared with the vehicle client.
	pub fn token_manager(&self) -> &TokenManager {
		&self.tokens
	}

	/// Vehicle client.
	pub fn vehicle_client(&self) -> &VehicleClient {
		&self.vehicles
	}

	/// Shared cache.
	pub fn cache(&self) -> &TokenCache {
		&self.cache
	}

	/// Validated settings.
	pub fn settings(&self) -> &Settings {
		&self.settings
	}
}
impl Debug for RegistryBroker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RegistryBroker")
			.field("client_id", &self.settings.client_id)
			.field("environment", &self.settings.environment)
			.field("cache", &self.cache)
			.finish()
	}
}
