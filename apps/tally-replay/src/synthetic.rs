use serde_json::Value;

use tally_domain::{Pagination, SearchFilters};
use tally_service::{BoxFuture, SearchExecutor, SearchPage, UsageMeter};

const MAX_SYNTHETIC_TOTAL: u64 = 500;

/// Result volumes derived from the search identity, so replays are reproducible.
pub struct SyntheticSearch;
impl SyntheticSearch {
	pub fn total_for(filters: &SearchFilters) -> u64 {
		let identity = UsageMeter::identity(filters);
		let seed = u64::from_str_radix(&identity.as_str()[..8], 16).unwrap_or(0);

		seed % (MAX_SYNTHETIC_TOTAL + 1)
	}
}
impl SearchExecutor for SyntheticSearch {
	fn execute<'a>(
		&'a self,
		filters: &'a SearchFilters,
		pagination: Pagination,
	) -> BoxFuture<'a, color_eyre::Result<SearchPage>> {
		Box::pin(async move {
			let identity = UsageMeter::identity(filters);
			let total = Self::total_for(filters);
			let start = pagination.offset().min(total);
			let end = (start + u64::from(pagination.page_size)).min(total);
			let items = (start..end)
				.map(|row| serde_json::json!({ "id": format!("{}-{row}", identity.prefix()) }))
				.collect();

			Ok(SearchPage { items, total })
		})
	}

	fn fetch<'a>(&'a self, record_id: &'a str) -> BoxFuture<'a, color_eyre::Result<Option<Value>>> {
		Box::pin(async move {
			if record_id.starts_with("missing") {
				return Ok(None);
			}

			Ok(Some(serde_json::json!({ "id": record_id })))
		})
	}

	fn estimate<'a>(&'a self, filters: &'a SearchFilters) -> BoxFuture<'a, color_eyre::Result<u64>> {
		Box::pin(async move { Ok(Self::total_for(filters)) })
	}
}
