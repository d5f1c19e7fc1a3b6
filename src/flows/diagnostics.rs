//! End-to-end health report.
//!
//! Checks run in order (certificate, assertion, token, endpoint) and each records its own
//! status. Only the endpoint probe depends on an earlier stage: it needs a token and is
//! skipped without one.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, AssertionClaims, inspect_certificate},
	diagnostics::{
		CertificateCheck, CheckStatus, DiagnosticReport, EndpointCheck, JwtCheck, TokenCheck,
		peek_token_claims,
	},
	flows::{PROBE_REGISTRATION, RegistryBroker},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	registration::RegistrationNumber,
	registry::RequestShape,
};

impl RegistryBroker {
	/// Runs every check and returns the report. Never fails; problems are reported per check.
	pub async fn run_full_diagnostics(&self) -> DiagnosticReport {
		const KIND: FlowKind = FlowKind::Diagnostics;

		let span = FlowSpan::new(KIND, "run_full_diagnostics");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let report = span
			.instrument(async move {
				let timestamp = OffsetDateTime::now_utc();
				let certificate = self.check_certificate();
				let jwt = self.check_jwt();
				let (token, access_token) = self.check_token().await;
				let endpoint = match access_token {
					Some(access_token) => self.check_endpoint(&access_token).await,
					None => EndpointCheck {
						message: Some("Skipped because no access token was obtained.".into()),
						..Default::default()
					},
				};

				DiagnosticReport {
					timestamp,
					environment: self.settings().environment,
					certificate,
					jwt,
					token,
					endpoint,
				}
			})
			.await;
		let outcome = if report.healthy() { FlowOutcome::Success } else { FlowOutcome::Failure };

		obs::record_flow_outcome(KIND, outcome);
		tracing::info!(
			certificate = %report.certificate.status,
			jwt = %report.jwt.status,
			token = %report.token.status,
			endpoint = %report.endpoint.status,
			"Diagnostics finished."
		);

		report
	}

	fn check_certificate(&self) -> CertificateCheck {
		let _span = FlowSpan::new(FlowKind::Diagnostics, "check_certificate").entered();
		let path = &self.settings().cert_path;
		let mut check =
			CertificateCheck { path: path.display().to_string(), ..Default::default() };

		match inspect_certificate(path) {
			Ok(Some(info)) => {
				let now = OffsetDateTime::now_utc();

				check.expired = info.is_expired_at(now);

				if check.expired {
					check.status = CheckStatus::Failed;
					check.message = Some(format!("Certificate expired at {}.", info.valid_to));
				} else if info.is_pending_at(now) {
					check.status = CheckStatus::Warning;
					check.message =
						Some(format!("Certificate is not valid before {}.", info.valid_from));
				} else {
					check.status = CheckStatus::Ok;
				}

				check.certificate = Some(info);
			},
			Ok(None) => {
				check.status = CheckStatus::Warning;
				check.message =
					Some("Credential file holds no certificate; x5c is omitted.".into());
			},
			Err(e) => {
				check.status = CheckStatus::Failed;
				check.error = Some(e.kind().code().into());
				check.message = Some(e.to_string());
			},
		}

		check
	}

	fn check_jwt(&self) -> JwtCheck {
		let _span = FlowSpan::new(FlowKind::Diagnostics, "check_jwt").entered();
		let claims = AssertionClaims::from_settings(self.settings());

		match self.token_manager().signer().sign(&claims) {
			Ok(assertion) => JwtCheck {
				status: if assertion.segment_count() == 3 {
					CheckStatus::Ok
				} else {
					CheckStatus::Failed
				},
				segments: Some(assertion.segment_count()),
				length: Some(assertion.len()),
				..Default::default()
			},
			Err(e) => JwtCheck {
				status: CheckStatus::Failed,
				error: Some(e.kind().code().into()),
				message: Some(e.to_string()),
				..Default::default()
			},
		}
	}

	async fn check_token(&self) -> (TokenCheck, Option<AccessToken>) {
		let tokens = self.token_manager();
		let cache_hit = matches!(tokens.cached_token().await, Ok(Some(_)));

		match tokens.get_access_token(false).await {
			Ok(token) => {
				let claims = peek_token_claims(token.bearer()).unwrap_or_default();
				let check = TokenCheck {
					status: CheckStatus::Ok,
					cache_hit,
					preview: Some(token.secret.preview(8)),
					expires_at: claims.expires_at().or(Some(token.expires_at)),
					scope: claims.scope.or_else(|| token.scope.clone()),
					..Default::default()
				};

				(check, Some(token))
			},
			Err(e) => {
				let check = TokenCheck {
					status: CheckStatus::Failed,
					cache_hit,
					error: Some(e.code().into()),
					message: Some(e.to_string()),
					..Default::default()
				};

				(check, None)
			},
		}
	}

	async fn check_endpoint(&self, token: &AccessToken) -> EndpointCheck {
		let url = RegistrationNumber::parse(PROBE_REGISTRATION)
			.ok()
			.and_then(|reg| RequestShape::Bulk.url(&self.settings().endpoints, &reg).ok())
			.map(String::from);

		match self.vehicle_client().probe(token).await {
			Ok(response) => {
				let status = match response.status() {
					200..=299 => CheckStatus::Ok,
					401 | 403 | 500..=u16::MAX => CheckStatus::Failed,
					_ => CheckStatus::Warning,
				};

				EndpointCheck {
					status,
					url,
					http_status: Some(response.status()),
					latency_ms: Some(response.elapsed.as_millis() as u64),
					message: (status != CheckStatus::Ok).then(|| response.excerpt()),
					headers: response.headers,
					..Default::default()
				}
			},
			Err(e) => EndpointCheck {
				status: CheckStatus::Failed,
				url,
				error: Some(e.code().into()),
				message: Some(e.to_string()),
				..Default::default()
			},
		}
	}
}
