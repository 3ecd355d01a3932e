pub mod meter;
pub mod orchestrator;
pub mod quota;
pub mod session;
pub mod usage_log;

mod error;

pub use error::{Error, Result};
pub use meter::{ChargeDecision, UsageMeter};
pub use orchestrator::{
	LookupResponse, PreviewResponse, RequestContext, SearchOrchestrator, SearchPage,
	SearchResponse,
};
pub use quota::{MemoryQuota, PgQuota, QuotaLimits, QuotaOutcome};
pub use session::{SearchSession, SessionStore, SweepHandle};
pub use usage_log::{
	PgUsageLog, TracingUsageLog, UsageAction, UsageLogWorker, UsageLogger, UsageRecord,
};

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

use tally_config::Config;
use tally_domain::{Pagination, QuotaScope, SearchFilters};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Atomic per-scope credit counter.
pub trait QuotaStore
where
	Self: Send + Sync,
{
	fn increment<'a>(
		&'a self,
		scope: &'a QuotaScope,
		amount: i64,
	) -> BoxFuture<'a, color_eyre::Result<QuotaOutcome>>;
}

pub trait SearchExecutor
where
	Self: Send + Sync,
{
	fn execute<'a>(
		&'a self,
		filters: &'a SearchFilters,
		pagination: Pagination,
	) -> BoxFuture<'a, color_eyre::Result<SearchPage>>;

	fn fetch<'a>(&'a self, record_id: &'a str) -> BoxFuture<'a, color_eyre::Result<Option<Value>>>;

	fn estimate<'a>(&'a self, filters: &'a SearchFilters) -> BoxFuture<'a, color_eyre::Result<u64>>;
}

pub trait UsageLogSink
where
	Self: Send + Sync,
{
	fn append<'a>(&'a self, record: &'a UsageRecord) -> BoxFuture<'a, color_eyre::Result<()>>;
}

#[derive(Clone)]
pub struct Collaborators {
	pub quota: Arc<dyn QuotaStore>,
	pub search: Arc<dyn SearchExecutor>,
	pub usage_log: Arc<dyn UsageLogSink>,
}
impl Collaborators {
	pub fn new(
		quota: Arc<dyn QuotaStore>,
		search: Arc<dyn SearchExecutor>,
		usage_log: Arc<dyn UsageLogSink>,
	) -> Self {
		Self { quota, search, usage_log }
	}
}

/// The metering subsystem with its background tasks.
pub struct TallyService {
	pub orchestrator: SearchOrchestrator,
	sweep: SweepHandle,
	usage_worker: Option<UsageLogWorker>,
}
impl TallyService {
	/// Wires the session store, meter and usage log worker. Must be called inside a tokio
	/// runtime.
	pub fn start(cfg: &Config, collaborators: Collaborators) -> Self {
		let (sessions, sweep) =
			SessionStore::spawn(cfg.metering.session_ttl(), cfg.metering.sweep_interval());
		let meter = UsageMeter::new(sessions, collaborators.quota, cfg.metering.quota_timeout());
		let (usage_log, usage_worker) = if cfg.usage_log.enabled {
			let (logger, worker) =
				UsageLogger::spawn(collaborators.usage_log, cfg.usage_log.queue_capacity);

			(logger, Some(worker))
		} else {
			(UsageLogger::disabled(), None)
		};
		let orchestrator = SearchOrchestrator::new(
			meter,
			collaborators.search,
			usage_log,
			cfg.metering.search_timeout(),
		);

		tracing::info!(
			session_ttl_secs = cfg.metering.session_ttl_secs,
			sweep_interval_secs = cfg.metering.sweep_interval_secs,
			usage_log = cfg.usage_log.enabled,
			"Metering started."
		);

		Self { orchestrator, sweep, usage_worker }
	}

	/// Stops the sweep and drains the usage log. Returns the number of usage records written.
	pub async fn shutdown(self) -> u64 {
		let Self { orchestrator, sweep, usage_worker } = self;

		sweep.shutdown().await;

		let written = match usage_worker {
			Some(worker) => worker.shutdown().await,
			None => 0,
		};

		tracing::info!(
			written,
			dropped = orchestrator.usage_log().dropped(),
			"Metering stopped."
		);

		written
	}
}
