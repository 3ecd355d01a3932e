use std::fmt;

use serde::{Deserialize, Serialize};

/// The account a usage credit is charged against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum QuotaScope {
	Personal(String),
	Organization(String),
}
impl QuotaScope {
	/// Organization quota wins whenever the request acts on behalf of one.
	pub fn resolve(user_id: &str, organization_id: Option<&str>) -> Self {
		match organization_id.map(str::trim).filter(|id| !id.is_empty()) {
			Some(org_id) => Self::Organization(org_id.to_string()),
			None => Self::Personal(user_id.to_string()),
		}
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Self::Personal(_) => "personal",
			Self::Organization(_) => "organization",
		}
	}

	pub fn id(&self) -> &str {
		match self {
			Self::Personal(id) | Self::Organization(id) => id,
		}
	}
}
impl fmt::Display for QuotaScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.kind(), self.id())
	}
}
