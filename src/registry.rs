//! Registry wire formats: request shapes for the fallback ladder and response decoding.
//!
//! The registry has answered the same lookup in several shapes over time. [`RegistryAnswer`]
//! decodes a response body into exactly one variant, trying the known shapes in a fixed
//! priority order:
//!
//! 1. a quota envelope (`gjenstaendeKvote`), even on HTTP 200;
//! 2. an empty body (`null`, `[]`, `{}`, `""`);
//! 3. a result array whose first element carries `feilmelding`;
//! 4. an object carrying `feilmelding` without `kjoretoydata`;
//! 5. the vehicle payload itself, from `[0].kjoretoydata`, then `.kjoretoydata`, then the bare
//!    object.

// self
use crate::{
	_prelude::*, config::Endpoints, error::ConfigError, registration::RegistrationNumber,
};

/// Bulk lookup path, used by the primary request and the flat-body fallback.
pub const BULK_PATH: &str = "/kjoretoyoppslag/bulk/kjennemerke";
/// Per-registration lookup path prefix, used by the last fallback step.
pub const DIRECT_PATH: &str = "/kjoretoyoppslag/kjennemerke/";

/// Request variants tried by the lookup client, in ladder order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestShape {
	/// `POST` [`BULK_PATH`] with `[{"kjennemerke": reg}]`.
	Bulk,
	/// `POST` [`BULK_PATH`] with `{"kjennemerke": reg}`.
	Flat,
	/// `GET` [`DIRECT_PATH`]`{reg}` without a body.
	Direct,
}
impl RequestShape {
	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Bulk => "bulk",
			Self::Flat => "flat",
			Self::Direct => "direct",
		}
	}

	/// Resolves the URL this shape targets.
	pub fn url(self, endpoints: &Endpoints, reg: &RegistrationNumber) -> Result<Url, ConfigError> {
		match self {
			Self::Bulk | Self::Flat => endpoints.registry_url(BULK_PATH),
			Self::Direct => endpoints.registry_url(&format!("{DIRECT_PATH}{reg}")),
		}
	}

	/// JSON body for this shape, if it sends one.
	pub fn body(self, reg: &RegistrationNumber) -> Option<Value> {
		let item = serde_json::json!({ "kjennemerke": reg.as_str() });

		match self {
			Self::Bulk => Some(Value::Array(vec![item])),
			Self::Flat => Some(item),
			Self::Direct => None,
		}
	}

	/// Returns `true` for shapes sent with `POST`.
	pub const fn is_post(self) -> bool {
		!matches!(self, Self::Direct)
	}
}
impl Display for RequestShape {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// A registry response body decoded into the one shape it matches.
#[derive(Clone, Debug, PartialEq)]
pub enum RegistryAnswer {
	/// Quota or error envelope delivered with a success status.
	Envelope {
		/// Upstream `feilmelding`, or a placeholder when absent.
		message: String,
		/// Remaining quota, when the registry reported a number.
		remaining_quota: Option<i64>,
	},
	/// Body decoded to an empty value.
	Empty,
	/// Registry reported a lookup error for this registration.
	LookupError {
		/// Upstream `feilmelding`.
		message: String,
	},
	/// Vehicle payload ready for normalization; `None` when no known shape carried one.
	Vehicle(Option<Value>),
}
impl RegistryAnswer {
	/// Decodes a raw response body.
	pub fn decode(body: &str) -> Result<Self> {
		let value = if body.trim().is_empty() {
			Value::Null
		} else {
			serde_json::from_str::<Value>(body)
				.map_err(|source| Error::ResponseParseError { source })?
		};

		Ok(Self::from_value(value))
	}

	/// Classifies an already parsed body.
	pub fn from_value(value: Value) -> Self {
		if let Some(quota) = value.get("gjenstaendeKvote") {
			return Self::Envelope {
				message: message_of(&value).unwrap_or_else(|| "Unknown API error".into()),
				remaining_quota: quota.as_i64(),
			};
		}
		if is_empty(&value) {
			return Self::Empty;
		}

		match value {
			Value::Array(mut results) => {
				let first = results.swap_remove(0);

				if let Some(message) = message_of(&first) {
					return Self::LookupError { message };
				}

				Self::Vehicle(take_field(first, "kjoretoydata"))
			},
			Value::Object(mut object) => {
				if let Some(nested) = object.remove("kjoretoydata") {
					return Self::Vehicle(Some(nested).filter(|v| !is_empty(v)));
				}
				if let Some(message) = object.get("feilmelding").and_then(message_text) {
					return Self::LookupError { message };
				}

				Self::Vehicle(Some(Value::Object(object)))
			},
			_ => Self::Vehicle(None),
		}
	}

	/// Converts the answer into the vehicle payload or the error it stands for.
	pub fn into_payload(self) -> Result<Value> {
		match self {
			Self::Envelope { message, remaining_quota } =>
				Err(Error::InvalidApiResponse { message, remaining_quota }),
			Self::Empty | Self::Vehicle(None) => Err(Error::NoVehicleData),
			Self::LookupError { message } => Err(Error::NotFound { message }),
			Self::Vehicle(Some(payload)) => Ok(payload),
		}
	}
}

/// Decodes `body` and extracts the vehicle payload in one step.
pub fn extract_payload(body: &str) -> Result<Value> {
	RegistryAnswer::decode(body)?.into_payload()
}

fn is_empty(value: &Value) -> bool {
	match value {
		Value::Null => true,
		Value::String(s) => s.is_empty(),
		Value::Array(items) => items.is_empty(),
		Value::Object(map) => map.is_empty(),
		Value::Bool(b) => !b,
		Value::Number(_) => false,
	}
}

fn message_of(value: &Value) -> Option<String> {
	value.get("feilmelding").and_then(message_text)
}

fn message_text(value: &Value) -> Option<String> {
	match value {
		Value::String(s) if !s.is_empty() => Some(s.clone()),
		Value::Null | Value::String(_) => None,
		other => Some(other.to_string()),
	}
}

fn take_field(value: Value, field: &str) -> Option<Value> {
	match value {
		Value::Object(mut object) => object.remove(field).filter(|v| !is_empty(v)),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	fn reg() -> RegistrationNumber {
		RegistrationNumber::parse("AB12345").expect("Fixture plate should parse.")
	}

	#[test]
	fn request_shapes_build_expected_urls_and_bodies() {
		let mut endpoints = crate::config::Environment::Test
			.endpoints()
			.expect("Test endpoints should parse.");

		endpoints.registry = Url::parse("http://127.0.0.1:9000/").expect("Base should parse.");

		assert_eq!(
			RequestShape::Bulk.url(&endpoints, &reg()).expect("Bulk URL should build.").as_str(),
			"http://127.0.0.1:9000/kjoretoyoppslag/bulk/kjennemerke"
		);
		assert_eq!(
			RequestShape::Direct.url(&endpoints, &reg()).expect("Direct URL should build.").path(),
			"/kjoretoyoppslag/kjennemerke/AB12345"
		);
		assert_eq!(RequestShape::Bulk.body(&reg()), Some(json!([{ "kjennemerke": "AB12345" }])));
		assert_eq!(RequestShape::Flat.body(&reg()), Some(json!({ "kjennemerke": "AB12345" })));
		assert_eq!(RequestShape::Direct.body(&reg()), None);
	}

	#[test]
	fn quota_envelope_wins_over_everything_else() {
		let err = extract_payload(r#"{"gjenstaendeKvote":0,"feilmelding":"Quota exceeded"}"#)
			.expect_err("Quota envelope should be rejected.");

		assert!(matches!(
			err,
			Error::InvalidApiResponse { ref message, remaining_quota: Some(0) }
				if message == "Quota exceeded"
		));
	}

	#[test]
	fn empty_bodies_carry_no_vehicle_data() {
		for body in ["", "null", "[]", "{}", "\"\""] {
			assert!(
				matches!(extract_payload(body), Err(Error::NoVehicleData)),
				"Unexpected decode for {body:?}"
			);
		}
	}

	#[test]
	fn malformed_json_is_a_parse_error() {
		assert!(matches!(extract_payload("{not json"), Err(Error::ResponseParseError { .. })));
	}

	#[test]
	fn lookup_errors_map_to_not_found() {
		let array = extract_payload(r#"[{"feilmelding":"KJORETOY_IKKE_FUNNET"}]"#);
		let object = extract_payload(r#"{"feilmelding":"OPPLYSNINGER_UTILGJENGELIG"}"#);

		assert!(matches!(
			array,
			Err(Error::NotFound { ref message }) if message == "KJORETOY_IKKE_FUNNET"
		));
		assert!(matches!(object, Err(Error::NotFound { .. })));
	}

	#[test]
	fn payload_extraction_follows_priority_order() {
		let nested_array = json!([{ "kjoretoydata": { "kjoretoyId": { "kjennemerke": "A1" } } }]);
		let nested_object = json!({ "kjoretoydata": { "kjoretoyId": { "kjennemerke": "B2" } } });
		let bare = json!({ "kjoretoyId": { "kjennemerke": "C3" } });

		for (body, expected) in [(nested_array, "A1"), (nested_object, "B2"), (bare, "C3")] {
			let payload =
				extract_payload(&body.to_string()).expect("Known shape should yield a payload.");

			assert_eq!(payload["kjoretoyId"]["kjennemerke"], expected);
		}
	}

	#[test]
	fn arrays_without_nested_payload_carry_no_vehicle_data() {
		assert!(matches!(
			extract_payload(r#"[{"kjennemerke":"AB12345"}]"#),
			Err(Error::NoVehicleData)
		));
		assert!(matches!(extract_payload(r#"{"kjoretoydata":{}}"#), Err(Error::NoVehicleData)));
	}
}
