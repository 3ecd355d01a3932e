mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Config, Metering, Postgres, Quota, Service, Storage, UsageLog};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}

	for (label, value) in [
		("metering.session_ttl_secs", cfg.metering.session_ttl_secs),
		("metering.sweep_interval_secs", cfg.metering.sweep_interval_secs),
		("metering.quota_timeout_ms", cfg.metering.quota_timeout_ms),
		("metering.search_timeout_ms", cfg.metering.search_timeout_ms),
	] {
		if value == 0 {
			return Err(Error::Validation { message: format!("{label} must be greater than zero.") });
		}
	}

	if cfg.usage_log.queue_capacity == 0 {
		return Err(Error::Validation {
			message: "usage_log.queue_capacity must be greater than zero.".to_string(),
		});
	}
	if cfg.quota.personal_limit <= 0 {
		return Err(Error::Validation {
			message: "quota.personal_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.quota.organization_limit <= 0 {
		return Err(Error::Validation {
			message: "quota.organization_limit must be greater than zero.".to_string(),
		});
	}

	if let Some(postgres) = cfg.storage.postgres.as_ref()
		&& postgres.pool_max_conns == 0
	{
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg
		.storage
		.postgres
		.as_ref()
		.map(|postgres| postgres.dsn.trim().is_empty())
		.unwrap_or(false)
	{
		cfg.storage.postgres = None;
	}
}
