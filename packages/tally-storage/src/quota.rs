use crate::{
	Error, Result,
	db::Db,
	models::{QuotaCounter, QuotaIncrement},
};

/// Adds `amount` to the scope's counter unless that would pass its limit.
///
/// The counter row is seeded with `limit` on first use. The conditional `UPDATE` is a single
/// statement, so concurrent callers for the same scope serialize on the row lock and at most
/// `limit` units are ever granted.
pub async fn increment(
	db: &Db,
	scope_kind: &str,
	scope_id: &str,
	amount: i64,
	limit: i64,
) -> Result<QuotaIncrement> {
	if amount <= 0 {
		return Err(Error::InvalidArgument(format!(
			"Quota increment amount must be positive, got {amount}."
		)));
	}

	ensure_counter(db, scope_kind, scope_id, limit).await?;

	let granted: Option<(i64, i64)> = sqlx::query_as(
		"\
UPDATE quota_counters
SET used = used + $3, updated_at = now()
WHERE scope_kind = $1 AND scope_id = $2 AND used + $3 <= quota_limit
RETURNING used, quota_limit",
	)
	.bind(scope_kind)
	.bind(scope_id)
	.bind(amount)
	.fetch_optional(&db.pool)
	.await?;

	if let Some((used, limit)) = granted {
		return Ok(QuotaIncrement { granted: true, used, limit });
	}

	let (used, limit): (i64, i64) = sqlx::query_as(
		"SELECT used, quota_limit FROM quota_counters WHERE scope_kind = $1 AND scope_id = $2",
	)
	.bind(scope_kind)
	.bind(scope_id)
	.fetch_one(&db.pool)
	.await?;

	Ok(QuotaIncrement { granted: false, used, limit })
}

pub async fn fetch_counter(
	db: &Db,
	scope_kind: &str,
	scope_id: &str,
) -> Result<Option<QuotaCounter>> {
	let counter = sqlx::query_as::<_, QuotaCounter>(
		"\
SELECT scope_kind, scope_id, used, quota_limit, updated_at
FROM quota_counters
WHERE scope_kind = $1 AND scope_id = $2",
	)
	.bind(scope_kind)
	.bind(scope_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(counter)
}

/// Clears the usage of a scope, typically at the start of a billing period.
pub async fn reset(db: &Db, scope_kind: &str, scope_id: &str) -> Result<()> {
	sqlx::query(
		"UPDATE quota_counters SET used = 0, updated_at = now() WHERE scope_kind = $1 AND scope_id = $2",
	)
	.bind(scope_kind)
	.bind(scope_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

async fn ensure_counter(db: &Db, scope_kind: &str, scope_id: &str, limit: i64) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO quota_counters (scope_kind, scope_id, used, quota_limit)
VALUES ($1, $2, 0, $3)
ON CONFLICT (scope_kind, scope_id) DO NOTHING",
	)
	.bind(scope_kind)
	.bind(scope_id)
	.bind(limit)
	.execute(&db.pool)
	.await?;

	Ok(())
}
