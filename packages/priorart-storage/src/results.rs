use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, db::Db, models::RankedResultRow};
use priorart_domain::RankedResult;

/// Writes one ranked result keyed by `(disclosure_id, candidate_id)`. A re-run overwrites the
/// stored fields, except that an `add_to_report` flag a reviewer has already set is kept.
pub async fn upsert(db: &Db, result: &RankedResult, run_id: Option<Uuid>) -> Result<()> {
	let candidate = &result.candidate;

	sqlx::query(
		"\
INSERT INTO ranked_results (
	disclosure_id,
	candidate_id,
	domain,
	rank,
	title,
	summary,
	published,
	contributors,
	citation_count,
	reference_count,
	venue,
	url,
	relevance_score,
	decision,
	rationale,
	matched_keywords,
	add_to_report,
	run_id,
	search_timestamp
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
ON CONFLICT (disclosure_id, candidate_id) DO UPDATE
SET domain = EXCLUDED.domain,
	rank = EXCLUDED.rank,
	title = EXCLUDED.title,
	summary = EXCLUDED.summary,
	published = EXCLUDED.published,
	contributors = EXCLUDED.contributors,
	citation_count = EXCLUDED.citation_count,
	reference_count = EXCLUDED.reference_count,
	venue = EXCLUDED.venue,
	url = EXCLUDED.url,
	relevance_score = EXCLUDED.relevance_score,
	decision = EXCLUDED.decision,
	rationale = EXCLUDED.rationale,
	matched_keywords = EXCLUDED.matched_keywords,
	add_to_report = CASE
		WHEN ranked_results.reviewed_at IS NULL THEN EXCLUDED.add_to_report
		ELSE ranked_results.add_to_report
	END,
	run_id = EXCLUDED.run_id,
	search_timestamp = EXCLUDED.search_timestamp",
	)
	.bind(result.disclosure_id.as_str())
	.bind(candidate.candidate_id.as_str())
	.bind(result.domain.as_str())
	.bind(result.rank as i32)
	.bind(candidate.title.as_str())
	.bind(candidate.summary.as_deref())
	.bind(candidate.published.as_deref())
	.bind(Json(&candidate.contributors))
	.bind(candidate.citation_count.map(saturating_i64))
	.bind(candidate.reference_count.map(saturating_i64))
	.bind(candidate.venue.as_deref())
	.bind(candidate.url.as_deref())
	.bind(result.relevance_score)
	.bind(result.decision.as_str())
	.bind(result.rationale.as_str())
	.bind(Json(&result.matched_keywords))
	.bind(result.add_to_report)
	.bind(run_id)
	.bind(result.search_timestamp)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Deletes the pair's results that are not in `keep`, leaving rows a reviewer has touched. Called
/// after a run persists its selection so the stored set matches the latest run. Returns the number
/// of rows removed.
pub async fn prune_stale(
	db: &Db,
	disclosure_id: &str,
	domain: &str,
	keep: &[String],
) -> Result<u64> {
	let deleted = sqlx::query(
		"\
DELETE FROM ranked_results
WHERE disclosure_id = $1
	AND domain = $2
	AND reviewed_at IS NULL
	AND NOT (candidate_id = ANY($3))",
	)
	.bind(disclosure_id)
	.bind(domain)
	.bind(keep)
	.execute(&db.pool)
	.await?;

	Ok(deleted.rows_affected())
}

/// Every stored result for a disclosure, optionally limited to one domain, best first.
pub async fn query_all(
	db: &Db,
	disclosure_id: &str,
	domain: Option<&str>,
) -> Result<Vec<RankedResult>> {
	let rows: Vec<RankedResultRow> = sqlx::query_as(
		"\
SELECT
	disclosure_id,
	candidate_id,
	domain,
	rank,
	title,
	summary,
	published,
	contributors,
	citation_count,
	reference_count,
	venue,
	url,
	relevance_score,
	decision,
	rationale,
	matched_keywords,
	add_to_report,
	reviewed_at,
	run_id,
	search_timestamp
FROM ranked_results
WHERE disclosure_id = $1 AND ($2::text IS NULL OR domain = $2)
ORDER BY domain ASC, relevance_score DESC, candidate_id ASC",
	)
	.bind(disclosure_id)
	.bind(domain)
	.fetch_all(&db.pool)
	.await?;

	rows.into_iter().map(RankedResultRow::into_ranked).collect()
}

pub async fn count(db: &Db, disclosure_id: &str, domain: &str) -> Result<i64> {
	let count: i64 = sqlx::query_scalar(
		"SELECT count(*) FROM ranked_results WHERE disclosure_id = $1 AND domain = $2",
	)
	.bind(disclosure_id)
	.bind(domain)
	.fetch_one(&db.pool)
	.await?;

	Ok(count)
}

/// Records a reviewer decision. Returns `false` when no such result exists.
pub async fn set_report_flag(
	db: &Db,
	disclosure_id: &str,
	candidate_id: &str,
	add_to_report: bool,
	now: OffsetDateTime,
) -> Result<bool> {
	let updated = sqlx::query(
		"\
UPDATE ranked_results
SET add_to_report = $1, reviewed_at = $2
WHERE disclosure_id = $3 AND candidate_id = $4",
	)
	.bind(add_to_report)
	.bind(now)
	.bind(disclosure_id)
	.bind(candidate_id)
	.execute(&db.pool)
	.await?;

	Ok(updated.rows_affected() > 0)
}

fn saturating_i64(value: u64) -> i64 {
	i64::try_from(value).unwrap_or(i64::MAX)
}
