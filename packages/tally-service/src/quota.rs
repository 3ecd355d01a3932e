use std::{
	collections::HashMap,
	sync::{Mutex, MutexGuard},
};

use tally_domain::QuotaScope;
use tally_storage::db::Db;

use crate::{BoxFuture, QuotaStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaOutcome {
	Granted { used: i64, limit: i64 },
	Exhausted { used: i64, limit: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
	pub personal: i64,
	pub organization: i64,
}
impl QuotaLimits {
	pub fn from_config(cfg: &tally_config::Quota) -> Self {
		Self { personal: cfg.personal_limit, organization: cfg.organization_limit }
	}

	pub fn limit_for(&self, scope: &QuotaScope) -> i64 {
		match scope {
			QuotaScope::Personal(_) => self.personal,
			QuotaScope::Organization(_) => self.organization,
		}
	}
}

/// Process-local ledger. The check and the add happen under one lock, so concurrent callers
/// for the same scope can never overshoot the limit.
pub struct MemoryQuota {
	limits: QuotaLimits,
	counters: Mutex<HashMap<QuotaScope, i64>>,
}
impl MemoryQuota {
	pub fn new(limits: QuotaLimits) -> Self {
		Self { limits, counters: Mutex::new(HashMap::new()) }
	}

	pub fn used(&self, scope: &QuotaScope) -> i64 {
		self.counters().get(scope).copied().unwrap_or(0)
	}

	pub fn reset(&self, scope: &QuotaScope) {
		self.counters().remove(scope);
	}

	pub fn try_increment(&self, scope: &QuotaScope, amount: i64) -> QuotaOutcome {
		let limit = self.limits.limit_for(scope);
		let mut counters = self.counters();
		let used = counters.entry(scope.clone()).or_insert(0);

		if *used + amount > limit {
			return QuotaOutcome::Exhausted { used: *used, limit };
		}

		*used += amount;

		QuotaOutcome::Granted { used: *used, limit }
	}

	fn counters(&self) -> MutexGuard<'_, HashMap<QuotaScope, i64>> {
		self.counters.lock().unwrap_or_else(|err| err.into_inner())
	}
}
impl QuotaStore for MemoryQuota {
	fn increment<'a>(
		&'a self,
		scope: &'a QuotaScope,
		amount: i64,
	) -> BoxFuture<'a, color_eyre::Result<QuotaOutcome>> {
		let outcome = self.try_increment(scope, amount);

		Box::pin(async move { Ok(outcome) })
	}
}

/// Counters kept in the `quota_counters` table.
pub struct PgQuota {
	db: Db,
	limits: QuotaLimits,
}
impl PgQuota {
	pub fn new(db: Db, limits: QuotaLimits) -> Self {
		Self { db, limits }
	}
}
impl QuotaStore for PgQuota {
	fn increment<'a>(
		&'a self,
		scope: &'a QuotaScope,
		amount: i64,
	) -> BoxFuture<'a, color_eyre::Result<QuotaOutcome>> {
		Box::pin(async move {
			let limit = self.limits.limit_for(scope);
			let result =
				tally_storage::quota::increment(&self.db, scope.kind(), scope.id(), amount, limit)
					.await?;

			Ok(if result.granted {
				QuotaOutcome::Granted { used: result.used, limit: result.limit }
			} else {
				QuotaOutcome::Exhausted { used: result.used, limit: result.limit }
			})
		})
	}
}
