// self
use crate::{_prelude::*, error::ConfigError};

/// Default Maskinporten scope for vehicle information.
pub const DEFAULT_SCOPE: &str = "svv:kjoretoy/kjoretoyopplysninger";

/// Deployment environment selecting the authorization server and registry hosts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
	/// Maskinporten test tenant and the registry's test host.
	Test,
	#[default]
	/// Production Maskinporten and registry.
	Prod,
}
impl Environment {
	/// Returns a stable label suitable for reports and log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Test => "test",
			Self::Prod => "prod",
		}
	}

	/// Token endpoint URL.
	pub const fn token_url(self) -> &'static str {
		match self {
			Self::Test => "https://test.maskinporten.no/token",
			Self::Prod => "https://maskinporten.no/token",
		}
	}

	/// Audience claim expected by the authorization server.
	pub const fn audience(self) -> &'static str {
		match self {
			Self::Test => "https://test.maskinporten.no/",
			Self::Prod => "https://maskinporten.no/",
		}
	}

	/// Registry base URL.
	pub const fn registry_url(self) -> &'static str {
		match self {
			Self::Test => "https://akfell-datautlevering-sisdinky.utv.atlas.vegvesen.no",
			Self::Prod => "https://akfell-datautlevering.atlas.vegvesen.no",
		}
	}

	/// Builds the default endpoint set for this environment.
	pub fn endpoints(self) -> Result<Endpoints, ConfigError> {
		Ok(Endpoints {
			token: parse_url("token_endpoint", self.token_url())?,
			audience: self.audience().to_owned(),
			registry: parse_url("registry_base", self.registry_url())?,
		})
	}
}
impl Display for Environment {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for Environment {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"test" => Ok(Self::Test),
			"prod" | "production" => Ok(Self::Prod),
			_ => Err(ConfigError::InvalidValue { field: "environment", value: s.to_owned() }),
		}
	}
}

/// Resolved endpoints used by the token manager and the registry client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
	/// Authorization server token endpoint.
	pub token: Url,
	/// Audience claim for assertions.
	pub audience: String,
	/// Registry base URL; request paths are appended to it.
	pub registry: Url,
}
impl Endpoints {
	/// Joins a registry path onto the base URL, keeping any base path prefix.
	pub fn registry_url(&self, path: &str) -> Result<Url, ConfigError> {
		let base = self.registry.as_str().trim_end_matches('/');

		parse_url("registry_base", &format!("{base}{path}"))
	}
}

pub(crate) fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { field, source })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn environments_resolve_their_hosts() {
		let test = Environment::Test.endpoints().expect("Test endpoints should parse.");
		let prod = Environment::Prod.endpoints().expect("Prod endpoints should parse.");

		assert_eq!(test.token.as_str(), "https://test.maskinporten.no/token");
		assert_eq!(test.audience, "https://test.maskinporten.no/");
		assert_eq!(prod.token.as_str(), "https://maskinporten.no/token");
		assert_eq!(prod.registry.host_str(), Some("akfell-datautlevering.atlas.vegvesen.no"));
	}

	#[test]
	fn environment_parses_case_insensitively() {
		assert_eq!("TEST".parse::<Environment>().expect("TEST should parse."), Environment::Test);
		assert_eq!(
			"production".parse::<Environment>().expect("production should parse."),
			Environment::Prod
		);
		assert!("staging".parse::<Environment>().is_err());
	}

	#[test]
	fn registry_url_keeps_base_path_prefix() {
		let mut endpoints = Environment::Test.endpoints().expect("Test endpoints should parse.");

		endpoints.registry =
			Url::parse("http://127.0.0.1:9000/proxy/").expect("Proxy base should parse.");

		let url = endpoints
			.registry_url("/kjoretoyoppslag/bulk/kjennemerke")
			.expect("Joined registry URL should parse.");

		assert_eq!(url.as_str(), "http://127.0.0.1:9000/proxy/kjoretoyoppslag/bulk/kjennemerke");
	}
}
