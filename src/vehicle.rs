//! Normalized vehicle records built from raw registry payloads.
//!
//! [`normalize`] never fails: every missing field becomes an empty string or an empty JSON
//! value, so callers always receive a best-effort [`VehicleRecord`]. [`classify`] grades the
//! same payload separately so the response layer can tell complete, partial, and unusable
//! answers apart.

// self
use crate::_prelude::*;

const REQUIRED_FIELDS: [&str; 2] = ["kjoretoyId.kjennemerke", "godkjenning"];
const OPTIONAL_FIELDS: [&str; 2] = ["periodiskKjoretoyKontroll", "registrering.historikk"];

/// Normalized registry answer, split into free teaser data and paid protected data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
	/// Data shown free of charge.
	pub teaser: Teaser,
	/// Owner identity and registration data.
	pub protected: Protected,
	/// How much of the payload the registry actually delivered.
	pub completeness: Completeness,
	/// Raw extracted payload, kept only when debug mode is on.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub raw: Option<Value>,
}

/// Free-of-charge vehicle summary.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teaser {
	/// Registration number as the registry spells it.
	pub reg_number: String,
	/// Make.
	pub brand: String,
	/// Commercial model name.
	pub model: String,
	/// First registration date in Norway.
	pub first_registration: String,
	/// Vehicle class label.
	pub vehicle_class: String,
	/// Engine summary.
	pub engine: Engine,
	/// Date of the last approved periodic inspection.
	pub last_inspection: String,
	/// Deadline for the next periodic inspection.
	pub next_inspection: String,
}

/// Engine summary.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engine {
	/// Fuel label.
	pub fuel_type: String,
	/// Displacement in cubic centimetres.
	pub displacement: String,
	/// Power output in kilowatts.
	pub power: String,
}

/// Data gated behind payment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Protected {
	/// Registered owner.
	pub owner: Owner,
	/// Registration history exactly as the registry returned it.
	pub registration_history: Value,
	/// Registration status exactly as the registry returned it.
	pub registration_status: Value,
}

/// Registered owner.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Owner {
	/// Private person.
	Person {
		/// Full name.
		name: String,
		/// Display address.
		address: String,
	},
	/// Company or other legal entity.
	Organization {
		/// Registered name.
		name: String,
		/// Display address.
		address: String,
		/// Organization number.
		org_number: String,
	},
	/// Registry did not say.
	#[default]
	Unknown,
}

/// Outcome of grading a payload against the fields the lookup depends on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Completeness {
	/// Every expected field is present.
	#[default]
	Complete,
	/// Required fields are present but some optional ones are missing.
	Partial {
		/// Dotted paths of the missing optional fields.
		missing: Vec<String>,
	},
	/// Required fields are missing; the record is not usable.
	Invalid {
		/// Dotted paths of the missing required fields.
		missing: Vec<String>,
	},
}
impl Completeness {
	/// Returns `true` unless the payload lacked a required field.
	pub fn is_usable(&self) -> bool {
		!matches!(self, Self::Invalid { .. })
	}
}

/// Maps a raw vehicle payload into a [`VehicleRecord`]. The `raw` slot is left empty.
pub fn normalize(payload: &Value) -> VehicleRecord {
	let approval = lookup(payload, "godkjenning.tekniskGodkjenning");
	let motor = approval.and_then(|approval| approval.get("motor"));
	let inspection = payload.get("periodiskKjoretoyKontroll");
	let registration = payload.get("registrering");
	let teaser = Teaser {
		reg_number: text_at(payload, "kjoretoyId.kjennemerke"),
		brand: approval.map(|approval| text_at(approval, "fabrikat")).unwrap_or_default(),
		model: approval.map(|approval| text_at(approval, "handelsbetegnelse")).unwrap_or_default(),
		first_registration: text_at(
			payload,
			"forstegangsregistrering.registrertForstegangNorgeDato",
		),
		vehicle_class: approval
			.map(|approval| text_at(approval, "kjoretoyklasse.kodeNavn"))
			.unwrap_or_default(),
		engine: motor
			.map(|motor| Engine {
				fuel_type: text_at(motor, "drivstoff.kodeNavn"),
				displacement: text_at(motor, "slagvolum"),
				power: text_at(motor, "motorytelse"),
			})
			.unwrap_or_default(),
		last_inspection: inspection.map(|i| text_at(i, "sistGodkjent")).unwrap_or_default(),
		next_inspection: inspection.map(|i| text_at(i, "kontrollfrist")).unwrap_or_default(),
	};
	let protected = Protected {
		owner: registration
			.and_then(|registration| registration.get("registrertEier"))
			.map(owner)
			.unwrap_or_default(),
		registration_history: registration
			.and_then(|registration| registration.get("historikk"))
			.cloned()
			.unwrap_or(Value::Null),
		registration_status: registration
			.and_then(|registration| registration.get("registreringsstatus"))
			.cloned()
			.unwrap_or(Value::Null),
	};

	VehicleRecord { teaser, protected, completeness: classify(payload), raw: None }
}

/// Grades a raw payload: required fields first, then optional ones.
pub fn classify(payload: &Value) -> Completeness {
	let missing_required = missing(payload, &REQUIRED_FIELDS);

	if !missing_required.is_empty() {
		return Completeness::Invalid { missing: missing_required };
	}

	let missing_optional = missing(payload, &OPTIONAL_FIELDS);

	if missing_optional.is_empty() {
		Completeness::Complete
	} else {
		Completeness::Partial { missing: missing_optional }
	}
}

fn owner(raw: &Value) -> Owner {
	if let Some(person) = raw.get("person") {
		return Owner::Person { name: text_at(person, "navn"), address: address(person) };
	}

	match raw.get("eier").or_else(|| raw.get("enhet")) {
		Some(entity) => Owner::Organization {
			name: text_at(entity, "navn"),
			address: address(entity),
			org_number: text_at(entity, "organisasjonsnummer"),
		},
		None => Owner::Unknown,
	}
}

fn address(holder: &Value) -> String {
	let Some(raw) = holder.get("adresse") else {
		return String::new();
	};
	let mut parts = Vec::with_capacity(2);
	let street = text_at(raw, "adresselinje1");

	if !street.is_empty() {
		parts.push(street);
	}
	if let (Some(code), Some(city)) = (raw.get("postnummer"), raw.get("poststed")) {
		parts.push(format!("{} {}", scalar_text(code), scalar_text(city)));
	}

	parts.join(", ")
}

fn missing(payload: &Value, paths: &[&str]) -> Vec<String> {
	paths
		.iter()
		.filter(|path| lookup(payload, path).is_none_or(Value::is_null))
		.map(|path| (*path).to_owned())
		.collect()
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
	path.split('.').try_fold(value, |current, segment| current.get(segment))
}

fn text_at(value: &Value, path: &str) -> String {
	lookup(value, path).map(scalar_text).unwrap_or_default()
}

fn scalar_text(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		Value::Number(n) => n.to_string(),
		Value::Bool(b) => b.to_string(),
		_ => String::new(),
	}
}
