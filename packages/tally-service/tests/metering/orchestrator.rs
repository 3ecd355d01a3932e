use std::{sync::Arc, time::Duration};

use tally_domain::{Pagination, QuotaScope, SearchRequest};
use tally_service::{
	Collaborators, Error, RequestContext, SearchOrchestrator, TallyService, UsageAction,
	UsageLogger,
};

use super::{CountingQuota, RecordingSink, StubSearch, meter_with, personal, tattoo_us};

fn orchestrator(quota: Arc<CountingQuota>, search: StubSearch) -> SearchOrchestrator {
	SearchOrchestrator::new(
		meter_with(quota),
		Arc::new(search),
		UsageLogger::disabled(),
		Duration::from_secs(5),
	)
}

fn request(page: u32, page_size: u32) -> SearchRequest {
	SearchRequest { filters: tattoo_us(), pagination: Pagination::new(page, page_size) }
}

#[tokio::test]
async fn search_pages_share_one_charge() {
	let quota = Arc::new(CountingQuota::new(100));
	let orchestrator = orchestrator(quota.clone(), StubSearch { total: 60, fail: false });
	let ctx = RequestContext::new("u1");
	let first = orchestrator.search(&ctx, &request(1, 25)).await.expect("Page one failed.");
	let second = orchestrator.search(&ctx, &request(2, 25)).await.expect("Page two failed.");
	let third = orchestrator.search(&ctx, &request(3, 25)).await.expect("Page three failed.");

	assert!(first.charged);
	assert!(!second.charged);
	assert!(!third.charged);
	assert_eq!(first.identity, second.identity);
	assert_eq!(first.items.len(), 25);
	assert_eq!(third.items.len(), 10);
	assert_eq!(third.total, 60);
	assert_eq!(quota.inner.used(&personal("u1")), 1);
}

#[tokio::test]
async fn organization_context_charges_organization_quota() {
	let quota = Arc::new(CountingQuota::new(100));
	let orchestrator = orchestrator(quota.clone(), StubSearch { total: 5, fail: false });
	let alice = RequestContext::new("alice").with_organization("acme");
	let bob = RequestContext::new("bob").with_organization("acme");
	let org = QuotaScope::Organization("acme".to_string());

	orchestrator.search(&alice, &request(1, 25)).await.expect("Alice search failed.");
	orchestrator.search(&alice, &request(2, 25)).await.expect("Alice page two failed.");
	// Sessions belong to users, so a teammate running the same search pays again.
	let bob_first = orchestrator.search(&bob, &request(1, 25)).await.expect("Bob search failed.");

	assert!(bob_first.charged);
	assert_eq!(quota.inner.used(&org), 2);
	assert_eq!(quota.inner.used(&personal("alice")), 0);
}

#[tokio::test]
async fn exhausted_quota_fails_search_before_execution() {
	let quota = Arc::new(CountingQuota::new(0));
	let orchestrator = orchestrator(quota.clone(), StubSearch { total: 5, fail: false });
	let err = orchestrator
		.search(&RequestContext::new("u1"), &request(1, 25))
		.await
		.expect_err("Expected quota exhaustion.");

	assert!(matches!(err, Error::QuotaExceeded { .. }));
	assert!(orchestrator.meter().sessions().is_empty());
}

#[tokio::test]
async fn invalid_pagination_is_rejected_without_charging() {
	let quota = Arc::new(CountingQuota::new(100));
	let orchestrator = orchestrator(quota.clone(), StubSearch { total: 5, fail: false });
	let err = orchestrator
		.search(&RequestContext::new("u1"), &request(0, 25))
		.await
		.expect_err("Expected invalid request.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
	assert_eq!(quota.calls(), 0);
}

#[tokio::test]
async fn search_backend_failure_is_a_dependency_error() {
	let quota = Arc::new(CountingQuota::new(100));
	let orchestrator = orchestrator(quota.clone(), StubSearch { total: 5, fail: true });
	let err = orchestrator
		.search(&RequestContext::new("u1"), &request(1, 25))
		.await
		.expect_err("Expected dependency error.");

	assert!(matches!(err, Error::Dependency { .. }), "Unexpected error: {err}");
}

#[tokio::test]
async fn lookups_charge_every_time_even_when_missing() {
	let quota = Arc::new(CountingQuota::new(100));
	let orchestrator = orchestrator(quota.clone(), StubSearch { total: 5, fail: false });
	let ctx = RequestContext::new("u1");
	let found = orchestrator.lookup(&ctx, "lead-1").await.expect("Lookup failed.");
	let again = orchestrator.lookup(&ctx, "lead-1").await.expect("Lookup failed.");
	let missing = orchestrator.lookup(&ctx, "missing-2").await.expect("Lookup failed.");

	assert!(found.record.is_some());
	assert!(again.charged);
	assert!(missing.record.is_none());
	assert_eq!(quota.inner.used(&personal("u1")), 3);
	assert!(orchestrator.meter().sessions().is_empty());
}

#[tokio::test]
async fn preview_never_charges_or_opens_a_session() {
	let quota = Arc::new(CountingQuota::new(100));
	let orchestrator = orchestrator(quota.clone(), StubSearch { total: 42, fail: false });
	let ctx = RequestContext::new("u1");
	let preview = orchestrator.preview(&ctx, &tattoo_us()).await.expect("Preview failed.");

	assert_eq!(preview.estimated_total, 42);
	assert_eq!(quota.calls(), 0);
	assert!(orchestrator.meter().sessions().is_empty());

	let search = orchestrator.search(&ctx, &request(1, 10)).await.expect("Search failed.");

	assert!(search.charged);
	assert_eq!(search.identity, preview.identity);
}

#[tokio::test]
async fn service_wires_usage_log_and_shuts_down() {
	let cfg: tally_config::Config = toml::from_str(
		"[service]\nlog_level = \"info\"\n\n[usage_log]\nqueue_capacity = 16\n",
	)
	.expect("Failed to parse config.");
	let quota = Arc::new(CountingQuota::new(100));
	let sink = Arc::new(RecordingSink::default());
	let service = TallyService::start(
		&cfg,
		Collaborators::new(quota.clone(), Arc::new(StubSearch { total: 30, fail: false }), sink.clone()),
	);
	let ctx = RequestContext::new("u1");

	service.orchestrator.search(&ctx, &request(1, 25)).await.expect("Page one failed.");
	service.orchestrator.search(&ctx, &request(2, 25)).await.expect("Page two failed.");
	service.orchestrator.lookup(&ctx, "lead-7").await.expect("Lookup failed.");

	let written = service.shutdown().await;
	let records = sink.records();

	assert_eq!(written, 3);
	assert_eq!(records.len(), 3);
	assert_eq!(records[0].action, UsageAction::Search);
	assert_eq!(records[0].count, 25);
	assert_eq!(records[0].metadata["charged"], serde_json::json!(true));
	assert_eq!(records[1].count, 5);
	assert_eq!(records[1].metadata["charged"], serde_json::json!(false));
	assert_eq!(records[1].metadata["page"], serde_json::json!(2));
	assert_eq!(records[2].action, UsageAction::Lookup);
	assert_eq!(quota.inner.used(&personal("u1")), 2);
}
