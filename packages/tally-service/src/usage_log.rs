use std::sync::{
	Arc,
	atomic::{AtomicU64, Ordering},
};

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::{
	sync::{
		mpsc::{self, error::TrySendError},
		watch,
	},
	task::JoinHandle,
};

use tally_storage::db::Db;

use crate::{BoxFuture, UsageLogSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageAction {
	Search,
	Lookup,
}
impl UsageAction {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Search => "search",
			Self::Lookup => "lookup",
		}
	}
}

#[derive(Debug, Clone)]
pub struct UsageRecord {
	pub user_id: String,
	pub action: UsageAction,
	pub count: i64,
	pub metadata: Value,
	pub recorded_at: OffsetDateTime,
}
impl UsageRecord {
	pub fn new(user_id: &str, action: UsageAction, count: i64, metadata: Value) -> Self {
		Self {
			user_id: user_id.to_string(),
			action,
			count,
			metadata,
			recorded_at: OffsetDateTime::now_utc(),
		}
	}
}

/// Appends usage rows to the `usage_logs` table.
pub struct PgUsageLog {
	db: Db,
}
impl PgUsageLog {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}
impl UsageLogSink for PgUsageLog {
	fn append<'a>(&'a self, record: &'a UsageRecord) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async move {
			tally_storage::usage::append(
				&self.db,
				&record.user_id,
				record.action.as_str(),
				record.count,
				&record.metadata,
				record.recorded_at,
			)
			.await?;

			Ok(())
		})
	}
}

/// Emits usage as structured log events instead of persisting it.
pub struct TracingUsageLog;
impl UsageLogSink for TracingUsageLog {
	fn append<'a>(&'a self, record: &'a UsageRecord) -> BoxFuture<'a, color_eyre::Result<()>> {
		tracing::info!(
			target: "tally::usage",
			user_id = %record.user_id,
			action = record.action.as_str(),
			count = record.count,
			metadata = %record.metadata,
			"Usage recorded."
		);

		Box::pin(async { Ok(()) })
	}
}

/// Request-side handle to the usage log queue. Never blocks and never fails the caller.
#[derive(Clone)]
pub struct UsageLogger {
	tx: Option<mpsc::Sender<UsageRecord>>,
	dropped: Arc<AtomicU64>,
}
impl UsageLogger {
	/// Starts the single writer task on the current tokio runtime.
	pub fn spawn(sink: Arc<dyn UsageLogSink>, capacity: usize) -> (Self, UsageLogWorker) {
		let (tx, rx) = mpsc::channel(capacity.max(1));
		let (stop_tx, stop_rx) = watch::channel(false);
		let task = tokio::spawn(run_usage_log(sink, rx, stop_rx));
		let logger = Self { tx: Some(tx), dropped: Arc::new(AtomicU64::new(0)) };

		(logger, UsageLogWorker { stop: stop_tx, task })
	}

	pub fn disabled() -> Self {
		Self { tx: None, dropped: Arc::new(AtomicU64::new(0)) }
	}

	pub fn submit(&self, record: UsageRecord) {
		let Some(tx) = self.tx.as_ref() else {
			return;
		};

		match tx.try_send(record) {
			Ok(()) => {},
			Err(TrySendError::Full(record)) => {
				let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;

				tracing::warn!(
					user_id = %record.user_id,
					action = record.action.as_str(),
					dropped,
					"Usage log queue full. Dropping record."
				);
			},
			Err(TrySendError::Closed(record)) => {
				let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;

				tracing::warn!(
					user_id = %record.user_id,
					action = record.action.as_str(),
					dropped,
					"Usage log worker stopped. Dropping record."
				);
			},
		}
	}

	pub fn dropped(&self) -> u64 {
		self.dropped.load(Ordering::Relaxed)
	}
}

pub struct UsageLogWorker {
	stop: watch::Sender<bool>,
	task: JoinHandle<u64>,
}
impl UsageLogWorker {
	/// Closes intake, drains what is already queued, and returns the number of records written.
	pub async fn shutdown(self) -> u64 {
		let _ = self.stop.send(true);

		match self.task.await {
			Ok(written) => written,
			Err(err) => {
				tracing::error!(error = %err, "Usage log worker failed.");

				0
			},
		}
	}
}

async fn run_usage_log(
	sink: Arc<dyn UsageLogSink>,
	mut rx: mpsc::Receiver<UsageRecord>,
	mut stop: watch::Receiver<bool>,
) -> u64 {
	let mut written = 0;
	let mut stopping = false;

	loop {
		let record = if stopping {
			rx.recv().await
		} else {
			let next = tokio::select! {
				record = rx.recv() => Some(record),
				_ = stop.changed() => None,
			};
			let Some(record) = next else {
				rx.close();
				stopping = true;

				continue;
			};

			record
		};
		let Some(record) = record else {
			break;
		};

		match sink.append(&record).await {
			Ok(()) => written += 1,
			Err(err) => {
				tracing::error!(
					error = %err,
					user_id = %record.user_id,
					action = record.action.as_str(),
					"Usage log append failed."
				);
			},
		}
	}

	tracing::debug!(written, "Usage log worker stopped.");

	written
}
