//! Expiring key-value cache shared by the token manager and the registry client.
//!
//! [`TokenCache`] namespaces every key under [`NAMESPACE`], infers a TTL from the key's role
//! when the caller does not pass one, and honors a per-instance enabled flag: while disabled,
//! reads report absent and writes are dropped, but existing entries survive. Storage is
//! delegated to a [`CacheBackend`] so deployments can pick [`MemoryStore`] or [`FileStore`].

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// std
use std::sync::atomic::{AtomicBool, Ordering};
// self
use crate::{
	_prelude::*, auth::AccessToken, registration::RegistrationNumber, vehicle::VehicleRecord,
};

/// Group prefix isolating this crate's entries from unrelated cached data.
pub const NAMESPACE: &str = "svv_vehicle_lookup_";
/// Key under which the current bearer token is cached.
pub const TOKEN_KEY: &str = "svv_access_token";
/// Default lifetime for cached tokens; just under the one-hour server lifetime.
pub const TOKEN_TTL: Duration = Duration::seconds(3_500);
/// Lifetime for successful vehicle lookups.
pub const VEHICLE_TTL: Duration = Duration::hours(6);
/// Lifetime for cached registry failures.
pub const ERROR_TTL: Duration = Duration::minutes(5);

/// Boxed future returned by [`CacheBackend`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract. Keys arrive fully namespaced.
pub trait CacheBackend
where
	Self: Send + Sync,
{
	/// Fetches the entry stored under `key`, expired or not.
	fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<CacheEntry>>;

	/// Stores or replaces the entry under `key`.
	fn store<'a>(&'a self, key: &'a str, entry: CacheEntry) -> StoreFuture<'a, ()>;

	/// Removes the entry under `key`, reporting whether one existed.
	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

	/// Removes every entry whose key starts with `prefix`, returning how many were dropped.
	fn remove_prefix<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, usize>;
}

/// Error type produced by [`CacheBackend`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Registry failure remembered for [`ERROR_TTL`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFailure {
	/// Stable error code.
	pub code: String,
	/// Upstream message.
	pub message: String,
}

/// Cached payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CacheValue {
	/// Bearer token.
	Token(AccessToken),
	/// Normalized vehicle record.
	Vehicle(Box<VehicleRecord>),
	/// Registry failure (negative cache).
	Failure(CachedFailure),
}
impl CacheValue {
	/// Returns `true` for failure entries.
	pub fn is_failure(&self) -> bool {
		matches!(self, Self::Failure(_))
	}
}

/// Stored value plus its absolute expiry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
	/// Cached payload.
	pub value: CacheValue,
	/// Instant after which the entry must not be served.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
}
impl CacheEntry {
	/// Returns `true` if the entry has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}
}

/// Namespaced, switchable cache over a [`CacheBackend`].
pub struct TokenCache {
	backend: Arc<dyn CacheBackend>,
	enabled: AtomicBool,
}
impl TokenCache {
	/// Wraps a backend with the provided initial enabled flag.
	pub fn new(backend: Arc<dyn CacheBackend>, enabled: bool) -> Self {
		Self { backend, enabled: AtomicBool::new(enabled) }
	}

	/// Creates a cache over a fresh [`MemoryStore`].
	pub fn in_memory(enabled: bool) -> Self {
		Self::new(Arc::new(MemoryStore::default()), enabled)
	}

	/// Prefixes `key` with [`NAMESPACE`].
	pub fn namespaced(key: &str) -> String {
		format!("{NAMESPACE}{key}")
	}

	/// TTL implied by a key's role: tokens, failures, and everything else (vehicle data).
	pub fn infer_ttl(key: &str, value: &CacheValue) -> Duration {
		if value.is_failure() {
			ERROR_TTL
		} else if key.contains("token") {
			TOKEN_TTL
		} else {
			VEHICLE_TTL
		}
	}

	/// Toggles the enabled flag without touching stored entries.
	pub fn set_enabled(&self, enabled: bool) {
		self.enabled.store(enabled, Ordering::SeqCst);
		tracing::debug!(enabled, "Cache flag changed.");
	}

	/// Returns the current enabled flag.
	pub fn is_enabled(&self) -> bool {
		self.enabled.load(Ordering::SeqCst)
	}

	/// Returns the unexpired value under `key`, or `None` when absent, expired, or disabled.
	pub async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
		Ok(self.live_entry(key).await?.map(|entry| entry.value))
	}

	/// Stores `value` with a TTL inferred from the key's role.
	pub async fn set(&self, key: &str, value: CacheValue) -> Result<()> {
		let ttl = Self::infer_ttl(key, &value);

		self.set_with_ttl(key, value, ttl).await
	}

	/// Stores `value` for `ttl`. A no-op while disabled or for non-positive TTLs.
	pub async fn set_with_ttl(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<()> {
		if !self.is_enabled() {
			tracing::debug!(key, "Cache disabled; dropping write.");

			return Ok(());
		}
		if !ttl.is_positive() {
			return Ok(());
		}

		let entry = CacheEntry { value, expires_at: OffsetDateTime::now_utc() + ttl };
		let key = Self::namespaced(key);

		<dyn CacheBackend>::store(self.backend.as_ref(), &key, entry).await?;

		Ok(())
	}

	/// Removes the entry under `key` regardless of the enabled flag.
	pub async fn delete(&self, key: &str) -> Result<bool> {
		let key = Self::namespaced(key);

		Ok(<dyn CacheBackend>::remove(self.backend.as_ref(), &key).await?)
	}

	/// Removes every entry in the namespace regardless of the enabled flag.
	pub async fn clear_all(&self) -> Result<usize> {
		let removed = <dyn CacheBackend>::remove_prefix(self.backend.as_ref(), NAMESPACE).await?;

		tracing::info!(removed, "Cleared cache namespace.");

		Ok(removed)
	}

	/// Remaining lifetime of the entry under `key`, honoring the enabled flag.
	pub async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>> {
		let now = OffsetDateTime::now_utc();

		Ok(self.live_entry(key).await?.map(|entry| entry.expires_at - now))
	}

	async fn live_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
		if !self.is_enabled() {
			return Ok(None);
		}

		let namespaced = Self::namespaced(key);
		let Some(entry) = <dyn CacheBackend>::load(self.backend.as_ref(), &namespaced).await?
		else {
			tracing::debug!(key, "Cache miss.");

			return Ok(None);
		};

		if entry.is_expired_at(OffsetDateTime::now_utc()) {
			tracing::debug!(key, "Cache entry expired.");
			<dyn CacheBackend>::remove(self.backend.as_ref(), &namespaced).await?;

			return Ok(None);
		}

		tracing::debug!(key, "Cache hit.");

		Ok(Some(entry))
	}
}
impl Debug for TokenCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCache").field("enabled", &self.is_enabled()).finish()
	}
}

/// Cache key for a registration's vehicle data.
pub fn vehicle_key(registration: &RegistrationNumber) -> String {
	format!("vehicle_data_{registration}")
}
