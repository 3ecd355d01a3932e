use std::{sync::Arc, time::Duration};

use tokio::{
	sync::Barrier,
	time::{self, Instant},
};

use tally_domain::SearchFilters;
use tally_service::{Error, UsageMeter};

use super::{CountingQuota, FailingQuota, TTL, meter_with, personal, tattoo_us};

#[tokio::test]
async fn repeated_pages_charge_once() {
	let quota = Arc::new(CountingQuota::new(100));
	let meter = meter_with(quota.clone());
	let scope = personal("u1");

	for attempt in 0..10 {
		let decision = meter
			.charge("u1", &tattoo_us(), &scope, None)
			.await
			.expect("Expected charge to succeed.");

		assert_eq!(decision.charged, attempt == 0);
		assert_eq!(decision.identity, UsageMeter::identity(&tattoo_us()));
	}

	assert_eq!(quota.calls(), 1);
	assert_eq!(quota.inner.used(&scope), 1);
}

#[tokio::test(start_paused = true)]
async fn paging_within_ttl_is_free_and_expiry_charges_again() {
	let quota = Arc::new(CountingQuota::new(100));
	let meter = meter_with(quota.clone());
	let scope = personal("u1");

	let page_one = meter.charge("u1", &tattoo_us(), &scope, None).await.expect("Page one failed.");

	assert!(page_one.charged);

	time::sleep(Duration::from_secs(60)).await;

	let page_two = meter.charge("u1", &tattoo_us(), &scope, None).await.expect("Page two failed.");

	assert!(!page_two.charged);

	time::sleep(TTL).await;

	let after_expiry =
		meter.charge("u1", &tattoo_us(), &scope, None).await.expect("Repeat search failed.");

	assert!(after_expiry.charged);
	assert_eq!(quota.inner.used(&scope), 2);
}

#[tokio::test(start_paused = true)]
async fn session_expires_exactly_at_ttl() {
	let quota = Arc::new(CountingQuota::new(100));
	let meter = meter_with(quota.clone());
	let scope = personal("u1");

	meter.charge("u1", &tattoo_us(), &scope, None).await.expect("First charge failed.");
	time::sleep(TTL - Duration::from_secs(1)).await;

	let before = meter.charge("u1", &tattoo_us(), &scope, None).await.expect("Charge failed.");

	assert!(!before.charged);

	time::sleep(Duration::from_secs(1)).await;

	let at_ttl = meter.charge("u1", &tattoo_us(), &scope, None).await.expect("Charge failed.");

	assert!(at_ttl.charged);
}

#[tokio::test]
async fn different_filters_and_users_charge_separately() {
	let quota = Arc::new(CountingQuota::new(100));
	let meter = meter_with(quota.clone());
	let with_email = SearchFilters { has_email: Some(true), ..tattoo_us() };

	assert!(meter.charge("u1", &tattoo_us(), &personal("u1"), None).await.expect("Failed.").charged);
	assert!(meter.charge("u1", &with_email, &personal("u1"), None).await.expect("Failed.").charged);
	assert!(meter.charge("u2", &tattoo_us(), &personal("u2"), None).await.expect("Failed.").charged);
	assert_eq!(quota.calls(), 3);
	assert_eq!(meter.sessions().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_pages_charge_exactly_once() {
	let quota = Arc::new(CountingQuota::with_delay(100, Duration::from_millis(25)));
	let meter = Arc::new(meter_with(quota.clone()));
	let barrier = Arc::new(Barrier::new(8));
	let mut handles = Vec::new();

	for _ in 0..8 {
		let meter = meter.clone();
		let barrier = barrier.clone();

		handles.push(tokio::spawn(async move {
			barrier.wait().await;

			meter.charge("u1", &tattoo_us(), &personal("u1"), None).await
		}));
	}

	let mut charged = 0;

	for handle in handles {
		let decision = handle.await.expect("Task panicked.").expect("Charge failed.");

		if decision.charged {
			charged += 1;
		}
	}

	assert_eq!(charged, 1);
	assert_eq!(quota.calls(), 1);
	assert_eq!(quota.inner.used(&personal("u1")), 1);
}

#[tokio::test]
async fn exhausted_quota_leaves_no_session() {
	let quota = Arc::new(CountingQuota::new(1));
	let meter = meter_with(quota.clone());
	let scope = personal("u1");
	let barber = SearchFilters { industry: Some("barber".to_string()), ..tattoo_us() };

	meter.charge("u1", &tattoo_us(), &scope, None).await.expect("First charge failed.");

	let err = meter
		.charge("u1", &barber, &scope, None)
		.await
		.expect_err("Expected quota to be exhausted.");

	assert!(matches!(err, Error::QuotaExceeded { .. }));
	assert!(!err.is_retryable());
	assert_eq!(meter.sessions().len(), 1);

	let again = meter.charge("u1", &barber, &scope, None).await.expect_err("Still exhausted.");

	assert!(matches!(again, Error::QuotaExceeded { .. }));

	quota.inner.reset(&scope);

	let replenished =
		meter.charge("u1", &barber, &scope, None).await.expect("Expected charge after reset.");

	assert!(replenished.charged);
	assert_eq!(meter.sessions().len(), 2);
}

#[tokio::test]
async fn quota_store_failure_is_a_dependency_error() {
	let meter = meter_with(Arc::new(FailingQuota));
	let err = meter
		.charge("u1", &tattoo_us(), &personal("u1"), None)
		.await
		.expect_err("Expected dependency error.");

	assert!(matches!(err, Error::Dependency { .. }), "Unexpected error: {err}");
	assert!(err.is_retryable());
	assert!(meter.sessions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_quota_store_respects_deadline() {
	let quota = Arc::new(CountingQuota::with_delay(100, Duration::from_secs(30)));
	let meter = meter_with(quota.clone());
	let deadline = Instant::now() + Duration::from_millis(50);
	let err = meter
		.charge("u1", &tattoo_us(), &personal("u1"), Some(deadline))
		.await
		.expect_err("Expected timeout.");

	assert!(matches!(err, Error::Timeout { .. }), "Unexpected error: {err}");
	assert!(err.is_retryable());
	assert!(meter.sessions().is_empty());
	assert_eq!(quota.inner.used(&personal("u1")), 0);
}

#[tokio::test]
async fn lookups_always_charge() {
	let quota = Arc::new(CountingQuota::new(2));
	let meter = meter_with(quota.clone());
	let scope = personal("u1");

	meter.charge_lookup(&scope, None).await.expect("First lookup failed.");
	meter.charge_lookup(&scope, None).await.expect("Second lookup failed.");

	let err = meter.charge_lookup(&scope, None).await.expect_err("Expected quota exhaustion.");

	assert!(matches!(err, Error::QuotaExceeded { .. }));
	assert_eq!(quota.calls(), 3);
	assert!(meter.sessions().is_empty());
}
