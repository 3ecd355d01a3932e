use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 25;
pub const MAX_PAGE_SIZE: u32 = 500;

/// The billable facets of a lead search.
///
/// Every field here takes part in the search identity. Pagination lives in [`Pagination`] so it
/// can never leak into the identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub industry: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub country: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub city: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub has_email: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub has_phone: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub has_website: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub verified: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
	#[serde(default = "default_page")]
	pub page: u32,
	#[serde(default = "default_page_size")]
	pub page_size: u32,
}
impl Pagination {
	pub fn new(page: u32, page_size: u32) -> Self {
		Self { page, page_size }
	}

	/// Returns a message describing the first invalid field, if any.
	pub fn check(&self) -> Option<String> {
		if self.page == 0 {
			return Some("page must be 1 or greater.".to_string());
		}
		if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
			return Some(format!("page_size must be between 1 and {MAX_PAGE_SIZE}."));
		}

		None
	}

	pub fn offset(&self) -> u64 {
		u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
	}
}
impl Default for Pagination {
	fn default() -> Self {
		Self { page: default_page(), page_size: default_page_size() }
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
	#[serde(flatten)]
	pub filters: SearchFilters,
	#[serde(flatten)]
	pub pagination: Pagination,
}

fn default_page() -> u32 {
	1
}

fn default_page_size() -> u32 {
	DEFAULT_PAGE_SIZE
}
