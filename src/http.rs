//! Transport primitives shared by the token exchange and the registry client.
//!
//! [`ReqwestHttpClient`] bounds every call with the configured timeout and never follows
//! redirects. Each call yields an [`HttpResponse`] whose [`ResponseMetadata`] (status and
//! `Retry-After` hint) feeds error classification, while transport failures surface as
//! [`TransportError`] tagged with the endpoint they were meant for.

// std
use std::{ops::Deref, time::Instant};
// crates.io
use reqwest::{
	RequestBuilder,
	header::{HeaderMap, RETRY_AFTER},
	redirect::Policy,
};
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
};

/// Longest body excerpt kept in logs and error values.
pub const BODY_EXCERPT_LEN: usize = 500;

/// Metadata captured from the most recent HTTP response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the endpoint.
	pub status: u16,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Buffered response handed back to the flows.
#[derive(Clone, Debug)]
pub struct HttpResponse {
	/// Status and retry hint.
	pub metadata: ResponseMetadata,
	/// Response headers, lowercased names.
	pub headers: BTreeMap<String, String>,
	/// Response body decoded as text.
	pub body: String,
	/// Round-trip latency.
	pub elapsed: StdDuration,
}
impl HttpResponse {
	/// Shorthand for the status code.
	pub fn status(&self) -> u16 {
		self.metadata.status
	}

	/// Body truncated to [`BODY_EXCERPT_LEN`] characters.
	pub fn excerpt(&self) -> String {
		excerpt(&self.body)
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient(pub ReqwestClient);
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client bounded by `timeout` that does not follow redirects.
	pub fn with_timeout(timeout: StdDuration) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.timeout(timeout)
			.connect_timeout(timeout)
			.redirect(Policy::none())
			.build()?;

		Ok(Self(client))
	}

	/// Sends a prepared request and buffers the response.
	pub async fn execute(
		&self,
		endpoint: &'static str,
		request: RequestBuilder,
	) -> Result<HttpResponse, TransportError> {
		let started = Instant::now();
		let response =
			request.send().await.map_err(|e| TransportError::from_reqwest(endpoint, e))?;
		let status = response.status().as_u16();
		let retry_after = parse_retry_after(response.headers());
		let headers = response
			.headers()
			.iter()
			.filter_map(|(name, value)| {
				value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
			})
			.collect();
		let body = response.text().await.map_err(|e| TransportError::from_reqwest(endpoint, e))?;
		let elapsed = started.elapsed();

		tracing::debug!(
			endpoint,
			status,
			elapsed_ms = elapsed.as_millis() as u64,
			body = %excerpt(&body),
			"HTTP response received."
		);

		Ok(HttpResponse {
			metadata: ResponseMetadata { status, retry_after },
			headers,
			body,
			elapsed,
		})
	}
}
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

/// Truncates `body` to [`BODY_EXCERPT_LEN`] characters.
pub fn excerpt(body: &str) -> String {
	match body.char_indices().nth(BODY_EXCERPT_LEN) {
		Some((cut, _)) => format!("{}...", &body[..cut]),
		None => body.to_owned(),
	}
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(i64::try_from(secs).ok()?));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
