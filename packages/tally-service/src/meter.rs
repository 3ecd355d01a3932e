use std::{
	collections::HashMap,
	sync::{Arc, Mutex, MutexGuard},
	time::Duration,
};

use tokio::{
	sync::{Mutex as AsyncMutex, OwnedMutexGuard},
	time::{self, Instant},
};

use tally_domain::{FilterIdentity, QuotaScope, SearchFilters, SessionKey};

use crate::{Error, QuotaStore, Result, quota::QuotaOutcome, session::SessionStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeDecision {
	pub charged: bool,
	pub identity: FilterIdentity,
}

/// Decides whether a request costs a search credit.
///
/// A search is charged once per user per distinct identity while its session is live. Pages
/// after the first ride on that session for free.
pub struct UsageMeter {
	sessions: Arc<SessionStore>,
	quota: Arc<dyn QuotaStore>,
	quota_timeout: Duration,
	gates: ChargeGates,
}
impl UsageMeter {
	pub fn new(
		sessions: Arc<SessionStore>,
		quota: Arc<dyn QuotaStore>,
		quota_timeout: Duration,
	) -> Self {
		Self { sessions, quota, quota_timeout, gates: ChargeGates::default() }
	}

	pub fn sessions(&self) -> &Arc<SessionStore> {
		&self.sessions
	}

	pub fn identity(filters: &SearchFilters) -> FilterIdentity {
		tally_domain::identity(filters)
	}

	/// Charges one credit for a search unless the user already paid for it.
	///
	/// A rejected or failed increment leaves no session behind. Concurrent first pages for the
	/// same key queue on a per-key gate, so only one of them reaches the quota store.
	pub async fn charge(
		&self,
		user_id: &str,
		filters: &SearchFilters,
		scope: &QuotaScope,
		deadline: Option<Instant>,
	) -> Result<ChargeDecision> {
		let deadline = deadline.unwrap_or_else(|| Instant::now() + self.quota_timeout);
		let identity = Self::identity(filters);
		let key = SessionKey::new(user_id, identity.clone());

		if self.sessions.exists(&key) {
			tracing::debug!(user_id, identity = identity.prefix(), "Search session live. Not charging.");

			return Ok(ChargeDecision { charged: false, identity });
		}

		let _permit = time::timeout_at(deadline, self.gates.acquire(&key))
			.await
			.map_err(|_| Error::Timeout { operation: "charge gate" })?;

		if self.sessions.exists(&key) {
			tracing::debug!(
				user_id,
				identity = identity.prefix(),
				"Search session created by a concurrent request. Not charging."
			);

			return Ok(ChargeDecision { charged: false, identity });
		}

		self.increment(scope, deadline).await?;
		self.sessions.create(key, user_id, Instant::now());

		tracing::debug!(user_id, identity = identity.prefix(), %scope, "Search charged.");

		Ok(ChargeDecision { charged: true, identity })
	}

	/// Charges one credit for a single-record fetch. Lookups never deduplicate.
	pub async fn charge_lookup(&self, scope: &QuotaScope, deadline: Option<Instant>) -> Result<()> {
		let deadline = deadline.unwrap_or_else(|| Instant::now() + self.quota_timeout);

		self.increment(scope, deadline).await
	}

	async fn increment(&self, scope: &QuotaScope, deadline: Instant) -> Result<()> {
		let outcome = time::timeout_at(deadline, self.quota.increment(scope, 1))
			.await
			.map_err(|_| Error::Timeout { operation: "quota increment" })??;

		match outcome {
			QuotaOutcome::Granted { used, limit } => {
				tracing::debug!(%scope, used, limit, "Quota credit granted.");

				Ok(())
			},
			QuotaOutcome::Exhausted { used, limit } => {
				tracing::info!(%scope, used, limit, "Quota exhausted.");

				Err(Error::QuotaExceeded { scope: scope.clone() })
			},
		}
	}
}

/// One async mutex per key with a charge in flight.
///
/// Holders and waiters each own a [`GateRef`]. The entry leaves the map when the last of them
/// drops, including a waiter whose acquire was cancelled by its deadline.
#[derive(Default)]
struct ChargeGates {
	gates: Mutex<HashMap<SessionKey, Gate>>,
}
impl ChargeGates {
	async fn acquire(&self, key: &SessionKey) -> GatePermit<'_> {
		let mutex = {
			let mut gates = self.lock();
			let gate = gates.entry(key.clone()).or_default();

			gate.refs += 1;

			gate.mutex.clone()
		};
		let gate = GateRef { gates: self, key: key.clone() };
		let guard = mutex.lock_owned().await;

		GatePermit { _guard: guard, _gate: gate }
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.lock().len()
	}

	fn lock(&self) -> MutexGuard<'_, HashMap<SessionKey, Gate>> {
		self.gates.lock().unwrap_or_else(|err| err.into_inner())
	}
}

#[derive(Default)]
struct Gate {
	mutex: Arc<AsyncMutex<()>>,
	refs: usize,
}

struct GateRef<'a> {
	gates: &'a ChargeGates,
	key: SessionKey,
}
impl Drop for GateRef<'_> {
	fn drop(&mut self) {
		let mut gates = self.gates.lock();
		let Some(gate) = gates.get_mut(&self.key) else { return };

		gate.refs = gate.refs.saturating_sub(1);

		if gate.refs == 0 {
			gates.remove(&self.key);
		}
	}
}

struct GatePermit<'a> {
	_guard: OwnedMutexGuard<()>,
	_gate: GateRef<'a>,
}
