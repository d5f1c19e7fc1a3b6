//! Bearer token record issued by the authorization server.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Bearer token issued by a JWT-bearer exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
	/// Bearer value; callers must avoid logging it.
	pub secret: TokenSecret,
	/// Instant the token was received.
	#[serde(with = "time::serde::rfc3339")]
	pub issued_at: OffsetDateTime,
	/// Expiry instant derived from the server's `expires_in` (or the fallback lifetime).
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
	/// Scope echoed by the authorization server, if any.
	pub scope: Option<String>,
}
impl AccessToken {
	/// Creates a token issued at `issued_at` that lives for `lifetime`.
	pub fn new(
		secret: impl Into<String>,
		issued_at: OffsetDateTime,
		lifetime: Duration,
		scope: Option<String>,
	) -> Self {
		let expires_at = issued_at.saturating_add(lifetime);

		Self { secret: TokenSecret::new(secret), issued_at, expires_at, scope }
	}

	/// Returns the bearer value for an `Authorization` header.
	pub fn bearer(&self) -> &str {
		self.secret.expose()
	}

	/// Returns `true` if the token has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Returns `true` if the token is expired relative to the current clock.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}

	/// Remaining lifetime at the provided instant, clamped at zero.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - instant;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("secret", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("scope", &self.scope)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn expiry_checks_follow_the_lifetime() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let token = AccessToken::new("tok123", issued, Duration::hours(1), None);

		assert_eq!(token.expires_at, macros::datetime!(2025-01-01 01:00 UTC));
		assert!(!token.is_expired_at(macros::datetime!(2025-01-01 00:59 UTC)));
		assert!(token.is_expired_at(macros::datetime!(2025-01-01 01:00 UTC)));
		assert_eq!(
			token.remaining_at(macros::datetime!(2025-01-01 00:30 UTC)),
			Duration::minutes(30)
		);
		assert_eq!(token.remaining_at(macros::datetime!(2025-01-01 02:00 UTC)), Duration::ZERO);
	}

	#[test]
	fn oversized_lifetime_saturates_instead_of_overflowing() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let token = AccessToken::new("tok123", issued, Duration::MAX, None);

		assert!(token.expires_at > issued);
		assert!(!token.is_expired_at(macros::datetime!(9000-01-01 00:00 UTC)));

		let past = AccessToken::new("tok123", issued, Duration::MIN, None);

		assert!(past.is_expired_at(issued));
	}

	#[test]
	fn debug_output_redacts_the_bearer() {
		let token =
			AccessToken::new("tok123", OffsetDateTime::now_utc(), Duration::minutes(5), None);
		let rendered = format!("{token:?}");

		assert!(rendered.contains("<redacted>"));
		assert!(!rendered.contains("tok123"));
	}
}
