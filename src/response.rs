//! Caller-facing envelope for lookup results.
//!
//! Raw upstream text only reaches `message`, which is meant for operators; end users get
//! `user_message`, which always comes from the fixed table on [`ErrorKind`].

// self
use crate::{
	_prelude::*,
	error::ErrorKind,
	vehicle::{Completeness, VehicleRecord},
};

/// Code reported when a 200 answer lacks required vehicle fields.
pub const INVALID_RESPONSE_CODE: &str = "invalid_response";

/// Serializable outcome of one lookup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LookupResponse {
	/// `true` for complete and partial records.
	pub success: bool,
	/// Normalized record, present on success.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<VehicleRecord>,
	/// Stable error code, present on failure.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// Operator-facing detail.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	/// End-user message, present on failure.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_message: Option<String>,
	/// Completeness grade of the record, present on success.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub completeness: Option<Completeness>,
}
impl LookupResponse {
	/// Builds the envelope for a lookup result.
	pub fn from_result(result: &Result<VehicleRecord>) -> Self {
		match result {
			Ok(record) => Self::from_record(record),
			Err(e) => Self::from_error(e),
		}
	}

	/// Envelope for a record; records missing required fields are reported as failures.
	pub fn from_record(record: &VehicleRecord) -> Self {
		if let Completeness::Invalid { missing } = &record.completeness {
			return Self {
				success: false,
				data: None,
				error: Some(INVALID_RESPONSE_CODE.into()),
				message: Some(format!("Registry payload is missing {}.", missing.join(", "))),
				user_message: Some(ErrorKind::InvalidApiResponse.user_message().into()),
				completeness: Some(record.completeness.clone()),
			};
		}

		Self {
			success: true,
			data: Some(record.clone()),
			error: None,
			message: None,
			user_message: None,
			completeness: Some(record.completeness.clone()),
		}
	}

	/// Envelope for a failed lookup.
	pub fn from_error(error: &Error) -> Self {
		Self {
			success: false,
			data: None,
			error: Some(error.code().into()),
			message: Some(error.to_string()),
			user_message: Some(error.user_message().into()),
			completeness: None,
		}
	}

	/// Returns `true` when the record lacks optional fields.
	pub fn is_partial(&self) -> bool {
		matches!(self.completeness, Some(Completeness::Partial { .. }))
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::vehicle;

	#[test]
	fn partial_records_still_succeed() {
		let payload = json!({
			"kjoretoyId": { "kjennemerke": "AB12345" },
			"godkjenning": { "tekniskGodkjenning": { "fabrikat": "Toyota" } }
		});
		let response = LookupResponse::from_result(&Ok(vehicle::normalize(&payload)));

		assert!(response.success);
		assert!(response.is_partial());
		assert_eq!(
			response.completeness,
			Some(Completeness::Partial {
				missing: vec!["periodiskKjoretoyKontroll".into(), "registrering.historikk".into()]
			})
		);
	}

	#[test]
	fn invalid_records_are_reported_as_failures() {
		let response = LookupResponse::from_result(&Ok(vehicle::normalize(&json!({ "x": 1 }))));

		assert!(!response.success);
		assert!(response.data.is_none());
		assert_eq!(response.error.as_deref(), Some(INVALID_RESPONSE_CODE));
	}

	#[test]
	fn errors_expose_code_and_masked_user_message() {
		let err = Error::NotFound { message: "FNR_ETTERNAVN_UKJENT".into() };
		let response = LookupResponse::from_result(&Err(err));
		let json = serde_json::to_value(&response).expect("Response should serialize.");

		assert_eq!(json["success"], false);
		assert_eq!(json["error"], "not_found");
		assert_eq!(json["user_message"], "Owner information could not be found.");
		assert!(json.get("data").is_none());
	}
}
