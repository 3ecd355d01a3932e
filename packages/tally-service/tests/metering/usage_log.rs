use std::{sync::Arc, time::Duration};

use tally_domain::{Pagination, SearchRequest};
use tally_service::{
	RequestContext, SearchOrchestrator, UsageAction, UsageLogger, UsageRecord,
};

use super::{CountingQuota, FailingSink, RecordingSink, StubSearch, meter_with, tattoo_us};

fn record(user_id: &str) -> UsageRecord {
	UsageRecord::new(user_id, UsageAction::Search, 1, serde_json::json!({}))
}

#[tokio::test]
async fn full_queue_drops_instead_of_blocking() {
	let sink = Arc::new(RecordingSink::default());
	let (logger, worker) = UsageLogger::spawn(sink.clone(), 1);

	// The worker cannot run before this test yields, so only the first record fits.
	logger.submit(record("u1"));
	logger.submit(record("u2"));
	logger.submit(record("u3"));

	assert_eq!(logger.dropped(), 2);
	assert_eq!(worker.shutdown().await, 1);
	assert_eq!(sink.records()[0].user_id, "u1");
}

#[tokio::test]
async fn shutdown_drains_queued_records() {
	let sink = Arc::new(RecordingSink::default());
	let (logger, worker) = UsageLogger::spawn(sink.clone(), 8);

	for user in ["a", "b", "c", "d"] {
		logger.submit(record(user));
	}

	assert_eq!(worker.shutdown().await, 4);

	let users: Vec<_> = sink.records().into_iter().map(|record| record.user_id).collect();

	assert_eq!(users, vec!["a", "b", "c", "d"]);

	logger.submit(record("late"));

	assert_eq!(logger.dropped(), 1);
}

#[tokio::test]
async fn sink_failures_never_fail_the_request() {
	let (logger, worker) = UsageLogger::spawn(Arc::new(FailingSink), 8);
	let quota = Arc::new(CountingQuota::new(100));
	let orchestrator = SearchOrchestrator::new(
		meter_with(quota),
		Arc::new(StubSearch { total: 3, fail: false }),
		logger,
		Duration::from_secs(5),
	);
	let response = orchestrator
		.search(
			&RequestContext::new("u1"),
			&SearchRequest { filters: tattoo_us(), pagination: Pagination::new(1, 25) },
		)
		.await
		.expect("Search must succeed when the usage log fails.");

	assert!(response.charged);
	assert_eq!(response.items.len(), 3);
	assert_eq!(worker.shutdown().await, 0);
}

#[tokio::test]
async fn disabled_logger_discards_silently() {
	let logger = UsageLogger::disabled();

	logger.submit(record("u1"));

	assert_eq!(logger.dropped(), 0);
}
