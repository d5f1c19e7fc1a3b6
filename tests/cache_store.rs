// std
use std::{
	env, fs,
	path::{Path, PathBuf},
	process,
};
// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use svv_lookup::{
	_preludet::*,
	cache::{CacheBackend, FileStore, TOKEN_KEY, TokenCache},
	flows::RegistryBroker,
	registry::BULK_PATH,
};

fn temp_path() -> PathBuf {
	let unique = format!(
		"svv_lookup_cache_store_{}_{}.json",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	);

	env::temp_dir().join(unique)
}

fn file_broker(base_url: &str, path: &Path) -> RegistryBroker {
	let settings = mock_settings(base_url).build().expect("Test settings should validate.");
	let backend: Arc<dyn CacheBackend> =
		Arc::new(FileStore::open(path).expect("Failed to open file store snapshot."));
	let cache = Arc::new(TokenCache::new(backend, settings.cache_enabled));

	RegistryBroker::with_http_client(settings, cache, test_reqwest_http_client())
}

#[tokio::test]
async fn restarted_broker_serves_token_and_record_from_disk() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "access_token": "tok123", "expires_in": 3600 }));
		})
		.await;
	let registry = server
		.mock_async(|when, then| {
			when.method(POST).path(BULK_PATH);
			then.status(200).header("content-type", "application/json").json_body(json!([{
				"kjoretoydata": {
					"kjoretoyId": { "kjennemerke": "CD67890" },
					"godkjenning": { "tekniskGodkjenning": { "fabrikat": "Volvo" } }
				}
			}]));
		})
		.await;
	let path = temp_path();
	let first = file_broker(&server.base_url(), &path)
		.get_vehicle_by_registration("CD67890")
		.await
		.expect("First lookup should succeed.");

	let restarted = file_broker(&server.base_url(), &path);
	let second = restarted
		.get_vehicle_by_registration("cd 67890")
		.await
		.expect("Lookup after restart should be served from disk.");

	assert_eq!(first, second);
	assert!(
		restarted
			.cache()
			.get(TOKEN_KEY)
			.await
			.expect("Cache read should succeed.")
			.is_some()
	);

	token.assert_calls_async(1).await;
	registry.assert_calls_async(1).await;

	assert_eq!(restarted.clear_cache().await.expect("Clearing the cache should succeed."), 2);
	assert!(
		file_broker(&server.base_url(), &path)
			.cache()
			.get(TOKEN_KEY)
			.await
			.expect("Cache read should succeed.")
			.is_none()
	);

	fs::remove_file(&path).unwrap_or_else(|e| {
		panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
	});
}
