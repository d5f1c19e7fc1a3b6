//! Looks up one vehicle against a local mock of Maskinporten and the registry, persisting the
//! bearer token and the normalized record in a JSON file cache.

// std
use std::{path::Path, sync::Arc};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
use url::Url;
// self
use svv_lookup::{
	cache::{CacheBackend, FileStore, TokenCache},
	config::{RetryPolicy, Settings},
	flows::RegistryBroker,
	http::ReqwestHttpClient,
	registry::BULK_PATH,
	reqwest::Client,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"Bearer\",\"expires_in\":120}",
			);
		})
		.await;
	let registry_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(BULK_PATH).header("authorization", "Bearer demo-access");
			then.status(200).header("content-type", "application/json").json_body(json!([{
				"kjoretoydata": {
					"kjoretoyId": { "kjennemerke": "EL12345" },
					"godkjenning": {
						"tekniskGodkjenning": {
							"fabrikat": "Tesla",
							"handelsbetegnelse": "Model 3",
							"motor": { "drivstoff": { "kodeNavn": "Elektrisitet" } }
						}
					}
				}
			}]));
		})
		.await;
	let cert_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/client.pem");
	let settings = Settings::builder("demo-client", "demo-kid")
		.cert_path(cert_path)
		.token_endpoint(Url::parse(&server.url("/token"))?)
		.audience(server.url("/"))
		.registry_base(Url::parse(&server.base_url())?)
		.retry_policy(RetryPolicy::immediate(2))
		.build()?;
	let cache_path = std::env::temp_dir().join("svv-lookup-demo.json");
	let backend: Arc<dyn CacheBackend> = Arc::new(FileStore::open(&cache_path)?);
	let cache = Arc::new(TokenCache::new(backend, settings.cache_enabled));
	// The mock server presents a self-signed certificate.
	let http_client = ReqwestHttpClient::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.timeout(settings.request_timeout)
			.build()?,
	);
	let broker = RegistryBroker::with_http_client(settings, cache, http_client);
	let response = broker.lookup("el 12345").await;

	println!("{}", serde_json::to_string_pretty(&response)?);
	println!("Cache snapshot written to {}.", cache_path.display());

	broker.clear_cache().await?;
	token_mock.assert_async().await;
	registry_mock.assert_async().await;

	Ok(())
}
