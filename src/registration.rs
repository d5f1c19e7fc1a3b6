//! Normalized Norwegian registration numbers.

// std
use std::ops::Deref;
// self
use crate::_prelude::*;

/// Longest plate the registry accepts.
pub const MAX_LEN: usize = 8;

/// Registration number (plate) after uppercasing and whitespace removal.
///
/// Holds 1 to 8 characters from `A-Z0-9`; anything else is rejected before a request is built.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegistrationNumber(String);
impl RegistrationNumber {
	/// Normalizes and validates raw caller input.
	pub fn parse(input: impl AsRef<str>) -> Result<Self> {
		let raw = input.as_ref();
		let normalized = raw
			.chars()
			.filter(|c| !c.is_whitespace())
			.map(|c| c.to_ascii_uppercase())
			.collect::<String>();
		let valid = (1..=MAX_LEN).contains(&normalized.len())
			&& normalized.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());

		if valid {
			Ok(Self(normalized))
		} else {
			Err(Error::InvalidRegistrationFormat { input: raw.to_owned() })
		}
	}

	/// Returns the normalized plate.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Deref for RegistrationNumber {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for RegistrationNumber {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Debug for RegistrationNumber {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("RegistrationNumber").field(&self.0).finish()
	}
}
impl Display for RegistrationNumber {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl FromStr for RegistrationNumber {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}
impl TryFrom<String> for RegistrationNumber {
	type Error = Error;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::parse(value)
	}
}
impl From<RegistrationNumber> for String {
	fn from(value: RegistrationNumber) -> Self {
		value.0
	}
}
