use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaIncrement {
	pub granted: bool,
	pub used: i64,
	pub limit: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuotaCounter {
	pub scope_kind: String,
	pub scope_id: String,
	pub used: i64,
	pub quota_limit: i64,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UsageLogEntry {
	pub log_id: Uuid,
	pub user_id: String,
	pub action: String,
	pub count: i64,
	pub metadata: Value,
	pub created_at: OffsetDateTime,
}
