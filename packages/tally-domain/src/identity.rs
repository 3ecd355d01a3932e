use std::fmt;

use serde::{Deserialize, Serialize};

use crate::filters::SearchFilters;

const IDENTITY_DOMAIN: &[u8] = b"tally.search_filters";
const IDENTITY_SCHEMA_VERSION: u8 = 1;
const PREFIX_LEN: usize = 12;

/// Hex-encoded 256-bit digest of a search's billable facets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterIdentity(String);
impl FilterIdentity {
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Short form for log lines.
	pub fn prefix(&self) -> &str {
		let len = self.0.len().min(PREFIX_LEN);

		&self.0[..len]
	}
}
impl fmt::Display for FilterIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Dedup key: one per user per distinct search.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
	pub user_id: String,
	pub identity: FilterIdentity,
}
impl SessionKey {
	pub fn new(user_id: impl Into<String>, identity: FilterIdentity) -> Self {
		Self { user_id: user_id.into(), identity }
	}
}

/// Derives the identity of a search.
///
/// Fields are fed to the hasher in a fixed order, each with a presence tag and text fields with
/// a length prefix, so neither input order nor adjacent values can collide. Surrounding
/// whitespace is ignored and a blank string counts as absent.
pub fn identity(filters: &SearchFilters) -> FilterIdentity {
	let mut hasher = blake3::Hasher::new();

	hasher.update(IDENTITY_DOMAIN);
	hasher.update(&[IDENTITY_SCHEMA_VERSION]);

	write_text(&mut hasher, filters.industry.as_deref());
	write_text(&mut hasher, filters.country.as_deref());
	write_text(&mut hasher, filters.state.as_deref());
	write_text(&mut hasher, filters.city.as_deref());
	write_flag(&mut hasher, filters.has_email);
	write_flag(&mut hasher, filters.has_phone);
	write_flag(&mut hasher, filters.has_website);
	write_flag(&mut hasher, filters.verified);

	FilterIdentity(hasher.finalize().to_hex().to_string())
}

fn write_text(hasher: &mut blake3::Hasher, value: Option<&str>) {
	match value.map(str::trim).filter(|text| !text.is_empty()) {
		Some(text) => {
			hasher.update(&[1]);
			hasher.update(&(text.len() as u64).to_le_bytes());
			hasher.update(text.as_bytes());
		},
		None => {
			hasher.update(&[0]);
		},
	}
}

fn write_flag(hasher: &mut blake3::Hasher, value: Option<bool>) {
	let tag = match value {
		None => 0_u8,
		Some(false) => 1,
		Some(true) => 2,
	};

	hasher.update(&[tag]);
}
