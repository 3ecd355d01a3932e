use std::{sync::Arc, time::Duration};

use serde::Serialize;
use serde_json::Value;
use tokio::time::{self, Instant};

use tally_domain::{FilterIdentity, QuotaScope, SearchFilters, SearchRequest};

use crate::{
	Error, Result, SearchExecutor,
	meter::UsageMeter,
	usage_log::{UsageAction, UsageLogger, UsageRecord},
};

/// What the authentication layer knows about the caller.
#[derive(Debug, Clone)]
pub struct RequestContext {
	pub user_id: String,
	pub organization_id: Option<String>,
	pub timeout: Option<Duration>,
}
impl RequestContext {
	pub fn new(user_id: impl Into<String>) -> Self {
		Self { user_id: user_id.into(), organization_id: None, timeout: None }
	}

	pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
		self.organization_id = Some(organization_id.into());

		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	pub fn scope(&self) -> QuotaScope {
		QuotaScope::resolve(&self.user_id, self.organization_id.as_deref())
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchPage {
	pub items: Vec<Value>,
	pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
	pub items: Vec<Value>,
	pub total: u64,
	pub page: u32,
	pub page_size: u32,
	pub charged: bool,
	pub identity: FilterIdentity,
}

#[derive(Debug, Clone, Serialize)]
pub struct LookupResponse {
	pub record: Option<Value>,
	pub charged: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewResponse {
	pub estimated_total: u64,
	pub identity: FilterIdentity,
}

/// Runs metering around the search collaborator.
pub struct SearchOrchestrator {
	meter: UsageMeter,
	search: Arc<dyn SearchExecutor>,
	usage_log: UsageLogger,
	search_timeout: Duration,
}
impl SearchOrchestrator {
	pub fn new(
		meter: UsageMeter,
		search: Arc<dyn SearchExecutor>,
		usage_log: UsageLogger,
		search_timeout: Duration,
	) -> Self {
		Self { meter, search, usage_log, search_timeout }
	}

	pub fn meter(&self) -> &UsageMeter {
		&self.meter
	}

	pub fn usage_log(&self) -> &UsageLogger {
		&self.usage_log
	}

	pub async fn search(&self, ctx: &RequestContext, req: &SearchRequest) -> Result<SearchResponse> {
		if let Some(message) = req.pagination.check() {
			return Err(Error::InvalidRequest { message });
		}

		let deadline = ctx.timeout.map(|timeout| Instant::now() + timeout);
		let scope = ctx.scope();
		let decision = self.meter.charge(&ctx.user_id, &req.filters, &scope, deadline).await?;
		let search_deadline = deadline.unwrap_or_else(|| Instant::now() + self.search_timeout);
		let page = time::timeout_at(search_deadline, self.search.execute(&req.filters, req.pagination))
			.await
			.map_err(|_| Error::Timeout { operation: "search execution" })??;

		self.usage_log.submit(UsageRecord::new(
			&ctx.user_id,
			UsageAction::Search,
			page.items.len() as i64,
			serde_json::json!({
				"identity": decision.identity,
				"page": req.pagination.page,
				"page_size": req.pagination.page_size,
				"charged": decision.charged,
				"scope": scope,
			}),
		));

		Ok(SearchResponse {
			items: page.items,
			total: page.total,
			page: req.pagination.page,
			page_size: req.pagination.page_size,
			charged: decision.charged,
			identity: decision.identity,
		})
	}

	/// Fetches one record. Every lookup is billed, found or not.
	pub async fn lookup(&self, ctx: &RequestContext, record_id: &str) -> Result<LookupResponse> {
		if record_id.trim().is_empty() {
			return Err(Error::InvalidRequest { message: "record_id must be non-empty.".to_string() });
		}

		let deadline = ctx.timeout.map(|timeout| Instant::now() + timeout);
		let scope = ctx.scope();

		self.meter.charge_lookup(&scope, deadline).await?;

		let fetch_deadline = deadline.unwrap_or_else(|| Instant::now() + self.search_timeout);
		let record = time::timeout_at(fetch_deadline, self.search.fetch(record_id))
			.await
			.map_err(|_| Error::Timeout { operation: "record fetch" })??;

		self.usage_log.submit(UsageRecord::new(
			&ctx.user_id,
			UsageAction::Lookup,
			i64::from(record.is_some()),
			serde_json::json!({ "record_id": record_id, "scope": scope }),
		));

		Ok(LookupResponse { record, charged: true })
	}

	/// Estimates result volume. Free, and invisible to session tracking.
	pub async fn preview(
		&self,
		ctx: &RequestContext,
		filters: &SearchFilters,
	) -> Result<PreviewResponse> {
		let timeout = ctx.timeout.unwrap_or(self.search_timeout);
		let estimated_total = time::timeout(timeout, self.search.estimate(filters))
			.await
			.map_err(|_| Error::Timeout { operation: "search estimate" })??;

		Ok(PreviewResponse { estimated_total, identity: UsageMeter::identity(filters) })
	}
}
