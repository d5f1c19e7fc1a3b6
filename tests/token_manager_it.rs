// crates.io
use httpmock::{Mock, prelude::*};
use serde_json::json;
// self
use svv_lookup::{
	_preludet::*,
	auth::AccessToken,
	cache::{CacheValue, TOKEN_KEY, TokenCache},
	config::RetryPolicy,
	diagnostics::CheckStatus,
};

async fn mock_token<'a>(server: &'a MockServer, token: &str, expires_in: i64) -> Mock<'a> {
	let body = json!({ "access_token": token, "token_type": "Bearer", "expires_in": expires_in });

	server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("content-type", "application/x-www-form-urlencoded");
			then.status(200).header("content-type", "application/json").json_body(body);
		})
		.await
}

#[tokio::test]
async fn cached_token_is_reused_without_signing_or_network() {
	let server = MockServer::start_async().await;
	let mock = mock_token(&server, "tok123", 3600).await;
	let (broker, _store) = build_test_broker(mock_settings(&server.base_url()));
	let first = broker.get_access_token(false).await.expect("First token request should succeed.");
	let metrics = broker.token_manager().metrics();
	let signings = metrics.signings();
	let exchanges = metrics.exchanges();
	let second = broker.get_access_token(false).await.expect("Cached token should be served.");

	assert_eq!(first.bearer(), "tok123");
	assert_eq!(second.bearer(), "tok123");
	assert_eq!(metrics.signings(), signings);
	assert_eq!(metrics.exchanges(), exchanges);
	assert_eq!(metrics.cache_hits(), 1);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn forced_refresh_always_signs_and_calls_the_server() {
	let server = MockServer::start_async().await;
	let mock = mock_token(&server, "tok123", 3600).await;
	let (broker, _store) = build_test_broker(mock_settings(&server.base_url()));

	broker.get_access_token(false).await.expect("Initial token request should succeed.");
	broker.get_access_token(true).await.expect("Forced refresh should succeed.");

	let metrics = broker.token_manager().metrics();

	assert_eq!(metrics.signings(), 2);
	assert_eq!(metrics.exchanges(), 2);
	assert_eq!(metrics.cache_hits(), 0);

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn rejected_grant_surfaces_token_error_and_clears_cache() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_scope\"}");
		})
		.await;
	let (broker, store) = build_test_broker(mock_settings(&server.base_url()));
	let stale = AccessToken::new("stale", OffsetDateTime::now_utc(), Duration::hours(1), None);

	broker
		.cache()
		.set(TOKEN_KEY, CacheValue::Token(stale))
		.await
		.expect("Seeding the cache should succeed.");

	let err =
		broker.get_access_token(true).await.expect_err("Rejected grant should surface an error.");

	assert!(matches!(
		err,
		Error::TokenError { ref error, status: Some(400), .. } if error == "invalid_scope"
	));
	assert_eq!(err.code(), "token_error");
	assert!(store.entry(&TokenCache::namespaced(TOKEN_KEY)).is_none());
	assert_eq!(broker.token_manager().metrics().failures(), 1);

	mock.assert_async().await;
}

#[tokio::test]
async fn missing_access_token_is_a_token_error() {
	let server = MockServer::start_async().await;
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body("{\"expires_in\":60}");
		})
		.await;
	let (broker, store) = build_test_broker(mock_settings(&server.base_url()));
	let err = broker
		.get_access_token(false)
		.await
		.expect_err("Success status without a token should still fail.");

	assert!(matches!(err, Error::TokenError { status: Some(200), .. }));
	assert!(store.is_empty());
}

#[tokio::test]
async fn cache_ttl_follows_expires_in_minus_margin() {
	let server = MockServer::start_async().await;
	let _mock = mock_token(&server, "tok123", 3600).await;
	let (broker, store) = build_test_broker(mock_settings(&server.base_url()));
	let before = OffsetDateTime::now_utc();

	broker.get_access_token(false).await.expect("Token request should succeed.");

	let entry = store
		.entry(&TokenCache::namespaced(TOKEN_KEY))
		.expect("Token should be cached under the fixed key.");
	let ttl = entry.expires_at - before;

	assert!(ttl <= Duration::seconds(3_541), "TTL too long: {ttl}");
	assert!(ttl >= Duration::seconds(3_530), "TTL too short: {ttl}");
}

#[tokio::test]
async fn short_lived_tokens_are_returned_but_not_cached() {
	let server = MockServer::start_async().await;
	let mock = mock_token(&server, "brief", 30).await;
	let (broker, store) = build_test_broker(mock_settings(&server.base_url()));
	let token = broker.get_access_token(false).await.expect("Token request should succeed.");

	assert_eq!(token.bearer(), "brief");
	assert!(store.is_empty());

	broker.get_access_token(false).await.expect("Second token request should succeed.");

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn out_of_range_expires_in_falls_back_to_the_default_lifetime() {
	for expires_in in [9_000_000_000_000_000, i64::MIN] {
		let server = MockServer::start_async().await;
		let mock = mock_token(&server, "odd", expires_in).await;
		let (broker, store) = build_test_broker(mock_settings(&server.base_url()));
		let before = OffsetDateTime::now_utc();
		let token = broker.get_access_token(false).await.expect("Token request should succeed.");
		let entry = store
			.entry(&TokenCache::namespaced(TOKEN_KEY))
			.expect("Token should be cached with the default lifetime.");
		let ttl = entry.expires_at - before;

		assert_eq!(token.bearer(), "odd");
		assert!(!token.is_expired());
		assert!(token.expires_at - before <= Duration::seconds(3_501), "{expires_in}");
		assert!(ttl <= Duration::seconds(3_501), "TTL too long for {expires_in}: {ttl}");
		assert!(ttl >= Duration::seconds(3_490), "TTL too short for {expires_in}: {ttl}");

		broker.get_access_token(false).await.expect("Cached token should be served.");

		mock.assert_calls_async(1).await;
	}
}

#[tokio::test]
async fn unreachable_token_endpoint_is_a_request_failure() {
	let settings = mock_settings("http://127.0.0.1:1").retry_policy(RetryPolicy::immediate(1));
	let (broker, _store) = build_test_broker(settings);
	let err = broker
		.get_access_token(false)
		.await
		.expect_err("Closed port should surface a transport failure.");

	assert!(matches!(err, Error::TokenRequestFailed { .. }));
	assert_eq!(err.code(), "token_request_failed");
}

#[tokio::test]
async fn token_generation_self_test_reports_each_step() {
	let server = MockServer::start_async().await;
	let _mock = mock_token(&server, "tok123", 3600).await;
	let (broker, _store) = build_test_broker(mock_settings(&server.base_url()));
	let report = broker.token_manager().test_token_generation().await;
	let steps = report.steps.iter().map(|step| step.step.as_str()).collect::<Vec<_>>();

	assert!(report.success);
	assert_eq!(steps, ["certificate_file", "private_key", "assertion", "token"]);
	assert!(report.steps.iter().all(|step| step.status == CheckStatus::Ok));
}

#[tokio::test]
async fn token_generation_self_test_stops_at_missing_certificate() {
	let server = MockServer::start_async().await;
	let mock = mock_token(&server, "tok123", 3600).await;
	let settings = mock_settings(&server.base_url()).cert_path(fixture_path("absent.pem"));
	let (broker, _store) = build_test_broker(settings);
	let report = broker.token_manager().test_token_generation().await;

	assert!(!report.success);
	assert_eq!(report.steps.len(), 1);
	assert_eq!(report.steps[0].status, CheckStatus::Failed);
	assert_eq!(report.error.as_deref(), Some("cert_not_found"));

	mock.assert_calls_async(0).await;
}
