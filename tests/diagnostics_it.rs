// crates.io
use httpmock::{Mock, prelude::*};
use serde_json::json;
// self
use svv_lookup::{
	_preludet::*,
	config::Environment,
	diagnostics::CheckStatus,
	flows::PROBE_REGISTRATION,
	registry::BULK_PATH,
};

async fn mock_token(server: &MockServer) -> Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"access_token": "tok123",
				"expires_in": 3600,
				"scope": "svv:kjoretoy/kjoretoyopplysninger"
			}));
		})
		.await
}

async fn mock_probe(server: &MockServer, status: u16) -> Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path(BULK_PATH)
				.json_body(json!([{ "kjennemerke": PROBE_REGISTRATION }]));
			then.status(status)
				.header("content-type", "application/json")
				.header("x-request-id", "probe-1")
				.json_body(json!([{ "feilmelding": "KJORETOY_IKKE_FUNNET" }]));
		})
		.await
}

#[tokio::test]
async fn healthy_setup_passes_every_check() {
	let server = MockServer::start_async().await;
	let _token = mock_token(&server).await;
	let probe = mock_probe(&server, 200).await;
	let (broker, _store) = build_test_broker(mock_settings(&server.base_url()));
	let report = broker.run_full_diagnostics().await;

	assert!(report.healthy(), "{report:#?}");
	assert_eq!(report.environment, Environment::Prod);
	assert_eq!(report.certificate.status, CheckStatus::Ok);
	assert!(!report.certificate.expired);
	assert!(report.certificate.certificate.is_some());
	assert_eq!(report.jwt.segments, Some(3));
	assert_eq!(report.token.status, CheckStatus::Ok);
	assert!(!report.token.cache_hit);
	assert_eq!(report.token.scope.as_deref(), Some("svv:kjoretoy/kjoretoyopplysninger"));
	assert!(report.token.expires_at.is_some());
	assert_eq!(report.endpoint.status, CheckStatus::Ok);
	assert_eq!(report.endpoint.http_status, Some(200));
	assert_eq!(
		report.endpoint.headers.get("x-request-id").map(String::as_str),
		Some("probe-1")
	);
	assert!(report.endpoint.url.as_deref().is_some_and(|url| url.ends_with(BULK_PATH)));

	probe.assert_async().await;
}

#[tokio::test]
async fn second_run_reports_a_cache_hit() {
	let server = MockServer::start_async().await;
	let token = mock_token(&server).await;
	let _probe = mock_probe(&server, 200).await;
	let (broker, _store) = build_test_broker(mock_settings(&server.base_url()));

	broker.run_full_diagnostics().await;

	let report = broker.run_full_diagnostics().await;

	assert!(report.token.cache_hit);

	token.assert_calls_async(1).await;
}

#[tokio::test]
async fn token_failure_skips_the_endpoint_probe() {
	let server = MockServer::start_async().await;
	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.json_body(json!({ "error": "invalid_client" }));
		})
		.await;
	let probe = mock_probe(&server, 200).await;
	let (broker, _store) = build_test_broker(mock_settings(&server.base_url()));
	let report = broker.run_full_diagnostics().await;

	assert!(!report.healthy());
	assert_eq!(report.certificate.status, CheckStatus::Ok);
	assert_eq!(report.jwt.status, CheckStatus::Ok);
	assert_eq!(report.token.status, CheckStatus::Failed);
	assert_eq!(report.token.error.as_deref(), Some("token_error"));
	assert_eq!(report.endpoint.status, CheckStatus::Skipped);

	probe.assert_calls_async(0).await;
}

#[tokio::test]
async fn forbidden_probe_fails_the_endpoint_check() {
	let server = MockServer::start_async().await;
	let _token = mock_token(&server).await;
	let _probe = mock_probe(&server, 403).await;
	let (broker, _store) = build_test_broker(mock_settings(&server.base_url()));
	let report = broker.run_full_diagnostics().await;

	assert_eq!(report.endpoint.status, CheckStatus::Failed);
	assert_eq!(report.endpoint.http_status, Some(403));
	let message = report.endpoint.message.as_deref().unwrap_or_default();

	assert!(message.contains("KJORETOY_IKKE_FUNNET"), "{message}");
}

#[tokio::test]
async fn key_only_bundle_warns_but_still_signs() {
	let server = MockServer::start_async().await;
	let _token = mock_token(&server).await;
	let _probe = mock_probe(&server, 200).await;
	let settings = mock_settings(&server.base_url()).cert_path(fixture_path("key-only.pem"));
	let (broker, _store) = build_test_broker(settings);
	let report = broker.run_full_diagnostics().await;

	assert_eq!(report.certificate.status, CheckStatus::Warning);
	assert!(report.certificate.certificate.is_none());
	assert_eq!(report.jwt.status, CheckStatus::Ok);
	assert!(report.healthy());
}

#[tokio::test]
async fn missing_credential_fails_every_local_check() {
	let server = MockServer::start_async().await;
	let token = mock_token(&server).await;
	let settings = mock_settings(&server.base_url()).cert_path(fixture_path("absent.pem"));
	let (broker, _store) = build_test_broker(settings);
	let report = broker.run_full_diagnostics().await;
	let json = serde_json::to_value(&report).expect("Report should serialize.");

	assert_eq!(report.certificate.status, CheckStatus::Failed);
	assert_eq!(report.certificate.error.as_deref(), Some("cert_not_found"));
	assert_eq!(report.jwt.status, CheckStatus::Failed);
	assert_eq!(report.token.status, CheckStatus::Failed);
	assert_eq!(report.endpoint.status, CheckStatus::Skipped);
	assert_eq!(json["endpoint"]["status"], "skipped");

	token.assert_calls_async(0).await;
}
