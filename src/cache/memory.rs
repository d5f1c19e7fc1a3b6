//! Thread-safe in-memory [`CacheBackend`] for single-process deployments and tests.

// self
use crate::{
	_prelude::*,
	cache::{CacheBackend, CacheEntry, StoreError, StoreFuture},
};

type EntryMap = Arc<RwLock<HashMap<String, CacheEntry>>>;

/// Thread-safe storage backend that keeps entries in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(EntryMap);
impl MemoryStore {
	/// Number of stored entries, expired ones included.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Returns the raw entry under a fully namespaced key.
	pub fn entry(&self, key: &str) -> Option<CacheEntry> {
		self.0.read().get(key).cloned()
	}

	fn remove_prefix_now(map: EntryMap, prefix: &str) -> Result<usize, StoreError> {
		let mut guard = map.write();
		let before = guard.len();

		guard.retain(|key, _| !key.starts_with(prefix));

		Ok(before - guard.len())
	}
}
impl CacheBackend for MemoryStore {
	fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<CacheEntry>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(key).cloned()) })
	}

	fn store<'a>(&'a self, key: &'a str, entry: CacheEntry) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			let mut guard = map.write();
			let now = OffsetDateTime::now_utc();

			guard.retain(|_, entry| !entry.is_expired_at(now));
			guard.insert(key.to_owned(), entry);

			Ok(())
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.write().remove(key).is_some()) })
	}

	fn remove_prefix<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, usize> {
		let map = self.0.clone();

		Box::pin(async move { Self::remove_prefix_now(map, prefix) })
	}
}
