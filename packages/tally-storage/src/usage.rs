use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, db::Db, models::UsageLogEntry};

pub async fn append(
	db: &Db,
	user_id: &str,
	action: &str,
	count: i64,
	metadata: &Value,
	created_at: OffsetDateTime,
) -> Result<Uuid> {
	let log_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO usage_logs (log_id, user_id, action, count, metadata, created_at)
VALUES ($1, $2, $3, $4, $5, $6)",
	)
	.bind(log_id)
	.bind(user_id)
	.bind(action)
	.bind(count)
	.bind(metadata)
	.bind(created_at)
	.execute(&db.pool)
	.await?;

	Ok(log_id)
}

pub async fn list_for_user(db: &Db, user_id: &str, limit: i64) -> Result<Vec<UsageLogEntry>> {
	let entries = sqlx::query_as::<_, UsageLogEntry>(
		"\
SELECT log_id, user_id, action, count, metadata, created_at
FROM usage_logs
WHERE user_id = $1
ORDER BY created_at DESC
LIMIT $2",
	)
	.bind(user_id)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(entries)
}
