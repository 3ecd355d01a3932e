use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	#[serde(default)]
	pub metering: Metering,
	#[serde(default)]
	pub usage_log: UsageLog,
	#[serde(default)]
	pub quota: Quota,
	#[serde(default)]
	pub storage: Storage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Metering {
	/// How long a charged search stays free to page through.
	pub session_ttl_secs: u64,
	/// How often expired sessions are removed from memory. Lookups re-check age on their own.
	pub sweep_interval_secs: u64,
	/// Upper bound on a single quota increment when the request carries no deadline.
	pub quota_timeout_ms: u64,
	pub search_timeout_ms: u64,
}
impl Metering {
	pub fn session_ttl(&self) -> Duration {
		Duration::from_secs(self.session_ttl_secs)
	}

	pub fn sweep_interval(&self) -> Duration {
		Duration::from_secs(self.sweep_interval_secs)
	}

	pub fn quota_timeout(&self) -> Duration {
		Duration::from_millis(self.quota_timeout_ms)
	}

	pub fn search_timeout(&self) -> Duration {
		Duration::from_millis(self.search_timeout_ms)
	}
}
impl Default for Metering {
	fn default() -> Self {
		Self {
			session_ttl_secs: 300,
			sweep_interval_secs: 300,
			quota_timeout_ms: 2_000,
			search_timeout_ms: 10_000,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UsageLog {
	pub enabled: bool,
	pub queue_capacity: usize,
}
impl Default for UsageLog {
	fn default() -> Self {
		Self { enabled: true, queue_capacity: 1_024 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Quota {
	pub personal_limit: i64,
	pub organization_limit: i64,
}
impl Default for Quota {
	fn default() -> Self {
		Self { personal_limit: 100, organization_limit: 1_000 }
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
	pub postgres: Option<Postgres>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}
