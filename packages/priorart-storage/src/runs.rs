//! Queue of server-side search runs. One row per triggered (disclosure, domain) search; workers
//! claim rows with a lease and report back.

use serde_json::Value;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{
	Result,
	db::Db,
	models::{RunStatus, SearchRun},
};

const RUN_COLUMNS: &str = "\
run_id,
	disclosure_id,
	domain,
	disclosure,
	status,
	attempts,
	last_error,
	result_count,
	available_at,
	created_at,
	updated_at,
	finished_at";

pub struct Enqueued {
	pub run: SearchRun,
	/// An active run for the same pair already existed and was returned instead.
	pub reused: bool,
}

/// Inserts a PENDING run unless a PENDING or RUNNING run for the same pair exists.
pub async fn enqueue(
	db: &Db,
	disclosure_id: &str,
	domain: &str,
	disclosure: &Value,
	now: OffsetDateTime,
) -> Result<Enqueued> {
	let mut tx = db.pool.begin().await?;
	let inserted: Option<SearchRun> = sqlx::query_as(&format!(
		"\
INSERT INTO search_runs (
	run_id,
	disclosure_id,
	domain,
	disclosure,
	status,
	available_at,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, 'PENDING', $5, $5, $5)
ON CONFLICT (disclosure_id, domain) WHERE status IN ('PENDING', 'RUNNING') DO NOTHING
RETURNING {RUN_COLUMNS}"
	))
	.bind(Uuid::new_v4())
	.bind(disclosure_id)
	.bind(domain)
	.bind(disclosure)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let outcome = match inserted {
		Some(run) => Enqueued { run, reused: false },
		None => {
			let run: SearchRun = sqlx::query_as(&format!(
				"\
SELECT {RUN_COLUMNS}
FROM search_runs
WHERE disclosure_id = $1 AND domain = $2 AND status IN ('PENDING', 'RUNNING')
ORDER BY created_at DESC
LIMIT 1"
			))
			.bind(disclosure_id)
			.bind(domain)
			.fetch_one(&mut *tx)
			.await?;

			Enqueued { run, reused: true }
		},
	};

	tx.commit().await?;

	Ok(outcome)
}

/// Claims the oldest runnable run: a PENDING run whose backoff has elapsed, or a RUNNING run whose
/// lease expired. The claimed run stays invisible to other workers for `lease`. Each claim counts
/// as an attempt, so a run whose worker keeps dying still runs out of attempts.
pub async fn claim_next(db: &Db, now: OffsetDateTime, lease: Duration) -> Result<Option<SearchRun>> {
	let mut tx = db.pool.begin().await?;
	let row: Option<SearchRun> = sqlx::query_as(&format!(
		"\
SELECT {RUN_COLUMNS}
FROM search_runs
WHERE status IN ('PENDING', 'RUNNING') AND available_at <= $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED"
	))
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let run = if let Some(mut run) = row {
		let lease_until = now + lease;

		sqlx::query(
			"\
UPDATE search_runs
SET status = 'RUNNING', attempts = attempts + 1, available_at = $1, updated_at = $2
WHERE run_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(run.run_id)
		.execute(&mut *tx)
		.await?;

		run.status = RunStatus::Running.as_str().to_string();
		run.attempts += 1;
		run.available_at = lease_until;
		run.updated_at = now;

		Some(run)
	} else {
		None
	};

	tx.commit().await?;

	Ok(run)
}

pub async fn mark_done(db: &Db, run_id: Uuid, result_count: i32, now: OffsetDateTime) -> Result<()> {
	sqlx::query(
		"\
UPDATE search_runs
SET status = 'DONE',
	result_count = $1,
	last_error = NULL,
	updated_at = $2,
	finished_at = $2
WHERE run_id = $3",
	)
	.bind(result_count)
	.bind(now)
	.bind(run_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Puts the run back in the queue, runnable again at `available_at`.
pub async fn mark_retry(
	db: &Db,
	run_id: Uuid,
	attempts: i32,
	error: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE search_runs
SET status = 'PENDING',
	attempts = $1,
	last_error = $2,
	available_at = $3,
	updated_at = $4
WHERE run_id = $5",
	)
	.bind(attempts)
	.bind(error)
	.bind(available_at)
	.bind(now)
	.bind(run_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn mark_failed(
	db: &Db,
	run_id: Uuid,
	attempts: i32,
	error: &str,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE search_runs
SET status = 'FAILED',
	attempts = $1,
	last_error = $2,
	updated_at = $3,
	finished_at = $3
WHERE run_id = $4",
	)
	.bind(attempts)
	.bind(error)
	.bind(now)
	.bind(run_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn get(db: &Db, run_id: Uuid) -> Result<Option<SearchRun>> {
	let run = sqlx::query_as(&format!("SELECT {RUN_COLUMNS} FROM search_runs WHERE run_id = $1"))
		.bind(run_id)
		.fetch_optional(&db.pool)
		.await?;

	Ok(run)
}

/// Most recently created run for the pair, in any state.
pub async fn latest(db: &Db, disclosure_id: &str, domain: &str) -> Result<Option<SearchRun>> {
	let run = sqlx::query_as(&format!(
		"\
SELECT {RUN_COLUMNS}
FROM search_runs
WHERE disclosure_id = $1 AND domain = $2
ORDER BY created_at DESC
LIMIT 1"
	))
	.bind(disclosure_id)
	.bind(domain)
	.fetch_optional(&db.pool)
	.await?;

	Ok(run)
}
