//! Maskinporten-authenticated vehicle registry lookups: signed JWT-bearer grants, cached bearer
//! tokens, a registry client that survives flaky request shapes, and normalized vehicle records.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod flows;
pub mod http;
pub mod obs;
pub mod registration;
pub mod registry;
pub mod response;
pub mod vehicle;
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests.

	pub use crate::_prelude::*;

	// std
	use std::path::{Path, PathBuf};
	// self
	use crate::{
		cache::{CacheBackend, MemoryStore, TokenCache},
		config::{RetryPolicy, SettingsBuilder},
		flows::RegistryBroker,
		http::ReqwestHttpClient,
	};

	/// Client identifier used by every test settings document.
	pub const TEST_CLIENT_ID: &str = "svv-test-client";
	/// Key identifier used by every test settings document.
	pub const TEST_KEY_ID: &str = "svv-test-kid";

	/// Returns the absolute path of a PEM fixture under `tests/fixtures`.
	pub fn fixture_path(name: &str) -> PathBuf {
		Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
	}

	/// Settings builder pointed at a local mock server for both the token endpoint and the
	/// registry, signing with the unencrypted fixture key and retrying without delays.
	pub fn mock_settings(base_url: &str) -> SettingsBuilder {
		let base = base_url.trim_end_matches('/');

		crate::config::Settings::builder(TEST_CLIENT_ID, TEST_KEY_ID)
			.cert_path(fixture_path("client.pem"))
			.token_endpoint(
				Url::parse(&format!("{base}/token"))
					.expect("Mock token endpoint should parse successfully."),
			)
			.audience(format!("{base}/"))
			.registry_base(Url::parse(base).expect("Mock registry base should parse successfully."))
			.retry_policy(RetryPolicy::immediate(3))
	}

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Builds a broker backed by an in-memory cache, returning the backend for inspection.
	pub fn build_test_broker(builder: SettingsBuilder) -> (RegistryBroker, Arc<MemoryStore>) {
		let settings = builder.build().expect("Test settings should validate.");
		let backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn CacheBackend> = backend.clone();
		let cache = Arc::new(TokenCache::new(store, settings.cache_enabled));
		let http_client = test_reqwest_http_client();
		let broker = RegistryBroker::with_http_client(settings, cache, http_client);

		(broker, backend)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value;
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
