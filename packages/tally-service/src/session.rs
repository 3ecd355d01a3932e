use std::{
	collections::HashMap,
	sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
	time::Duration,
};

use tokio::{
	sync::watch,
	task::JoinHandle,
	time::{self, Instant, MissedTickBehavior},
};

use tally_domain::SessionKey;

/// Proof that a user already paid for a distinct search.
#[derive(Debug, Clone)]
pub struct SearchSession {
	pub user_id: String,
	pub created_at: Instant,
}
impl SearchSession {
	fn is_live_at(&self, now: Instant, ttl: Duration) -> bool {
		now.saturating_duration_since(self.created_at) < ttl
	}
}

/// In-memory map from `(user, search identity)` to the session that paid for it.
///
/// Lookups re-check age, so an entry older than the TTL is invisible even before the sweep
/// removes it. The lock is only held for a single map operation.
pub struct SessionStore {
	ttl: Duration,
	sessions: RwLock<HashMap<SessionKey, SearchSession>>,
}
impl SessionStore {
	pub fn new(ttl: Duration) -> Self {
		Self { ttl, sessions: RwLock::new(HashMap::new()) }
	}

	/// Builds a store and starts its sweep task on the current tokio runtime.
	pub fn spawn(ttl: Duration, sweep_interval: Duration) -> (Arc<Self>, SweepHandle) {
		let store = Arc::new(Self::new(ttl));
		let (stop_tx, stop_rx) = watch::channel(false);
		let task = tokio::spawn(run_sweep(store.clone(), sweep_interval, stop_rx));

		(store, SweepHandle { stop: stop_tx, task: Some(task) })
	}

	pub fn exists(&self, key: &SessionKey) -> bool {
		self.exists_at(key, Instant::now())
	}

	pub fn exists_at(&self, key: &SessionKey, now: Instant) -> bool {
		self.read().get(key).map(|session| session.is_live_at(now, self.ttl)).unwrap_or(false)
	}

	/// Inserts or refreshes the session for `key`.
	pub fn create(&self, key: SessionKey, user_id: &str, now: Instant) {
		let session = SearchSession { user_id: user_id.to_string(), created_at: now };

		self.write().insert(key, session);
	}

	pub fn sweep(&self) -> usize {
		self.sweep_at(Instant::now())
	}

	pub fn sweep_at(&self, now: Instant) -> usize {
		let mut sessions = self.write();
		let before = sessions.len();

		sessions.retain(|_, session| session.is_live_at(now, self.ttl));

		before - sessions.len()
	}

	pub fn len(&self) -> usize {
		self.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.read().is_empty()
	}

	// The map holds no invariant a panicking writer could break, so poisoning is ignored.
	fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionKey, SearchSession>> {
		self.sessions.read().unwrap_or_else(|err| err.into_inner())
	}

	fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionKey, SearchSession>> {
		self.sessions.write().unwrap_or_else(|err| err.into_inner())
	}
}

/// Owns the sweep task. Dropping the handle also stops the sweep.
pub struct SweepHandle {
	stop: watch::Sender<bool>,
	task: Option<JoinHandle<()>>,
}
impl SweepHandle {
	pub async fn shutdown(mut self) {
		let _ = self.stop.send(true);

		if let Some(task) = self.task.take()
			&& let Err(err) = task.await
		{
			tracing::error!(error = %err, "Session sweep task failed.");
		}
	}
}
impl Drop for SweepHandle {
	fn drop(&mut self) {
		let _ = self.stop.send(true);
	}
}

async fn run_sweep(store: Arc<SessionStore>, interval: Duration, mut stop: watch::Receiver<bool>) {
	let mut ticker = time::interval_at(Instant::now() + interval, interval);

	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			_ = ticker.tick() => {
				let removed = store.sweep();

				if removed > 0 {
					tracing::debug!(removed, remaining = store.len(), "Swept expired search sessions.");
				}
			},
			_ = stop.changed() => break,
		}
	}

	tracing::debug!("Session sweep stopped.");
}
