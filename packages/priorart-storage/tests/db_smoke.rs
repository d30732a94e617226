use time::{Duration, OffsetDateTime};

use priorart_config::Postgres;
use priorart_domain::{Decision, Domain, Provenance, RankedResult, SearchCandidate};
use priorart_storage::{
	db::Db,
	models::RunStatus,
	results, runs,
};
use priorart_testkit::TestDatabase;

async fn bootstrap(test_db: &TestDatabase) -> Db {
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	db
}

fn ranked(candidate_id: &str, score: f32, decision: Decision) -> RankedResult {
	ranked_for("DISC-100", candidate_id, score, decision)
}

fn ranked_for(disclosure_id: &str, candidate_id: &str, score: f32, decision: Decision) -> RankedResult {
	RankedResult {
		disclosure_id: disclosure_id.to_string(),
		domain: Domain::Patents,
		rank: 1,
		candidate: SearchCandidate {
			candidate_id: candidate_id.to_string(),
			domain: Domain::Patents,
			title: "Biliary stent".to_string(),
			summary: Some("A stent.".to_string()),
			published: Some("2020-01-07".to_string()),
			contributors: vec!["Ada Lovelace".to_string()],
			citation_count: Some(12),
			reference_count: None,
			venue: None,
			url: None,
			provenance: vec![Provenance {
				query: "stent".to_string(),
				keywords: vec!["stent".to_string()],
			}],
		},
		relevance_score: score,
		decision,
		rationale: "Same delivery mechanism.".to_string(),
		matched_keywords: vec!["stent".to_string()],
		add_to_report: decision == Decision::Keep,
		search_timestamp: OffsetDateTime::now_utc(),
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PRIORART_PG_DSN to run."]
async fn db_connects_and_bootstraps() {
	let Some(base_dsn) = priorart_testkit::env_dsn() else {
		eprintln!("Skipping db_connects_and_bootstraps; set PRIORART_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrap(&test_db).await;

	// Bootstrapping twice must be harmless.
	db.ensure_schema().await.expect("Failed to re-run schema.");

	for table in ["search_runs", "ranked_results"] {
		let count: i64 = sqlx::query_scalar(
			"SELECT count(*) FROM information_schema.tables WHERE table_name = $1",
		)
		.bind(table)
		.fetch_one(&db.pool)
		.await
		.expect("Failed to query schema tables.");

		assert_eq!(count, 1, "missing table {table}");
	}

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PRIORART_PG_DSN to run."]
async fn active_runs_are_not_duplicated() {
	let Some(base_dsn) = priorart_testkit::env_dsn() else {
		eprintln!("Skipping active_runs_are_not_duplicated; set PRIORART_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrap(&test_db).await;
	let now = OffsetDateTime::now_utc();
	let payload = serde_json::json!({ "id": "DISC-100", "keywords": ["stent"] });
	let first =
		runs::enqueue(&db, "DISC-100", "patents", &payload, now).await.expect("Enqueue failed.");
	let second =
		runs::enqueue(&db, "DISC-100", "patents", &payload, now).await.expect("Enqueue failed.");
	let other =
		runs::enqueue(&db, "DISC-100", "papers", &payload, now).await.expect("Enqueue failed.");

	assert!(!first.reused);
	assert!(second.reused);
	assert_eq!(first.run.run_id, second.run.run_id);
	assert_ne!(first.run.run_id, other.run.run_id);

	let claimed = runs::claim_next(&db, now, Duration::seconds(60))
		.await
		.expect("Claim failed.")
		.expect("Expected a runnable run.");

	assert_eq!(claimed.status().expect("status"), RunStatus::Running);
	assert_eq!(claimed.attempts, 1);

	runs::mark_done(&db, claimed.run_id, 3, now).await.expect("Mark done failed.");

	let third =
		runs::enqueue(&db, "DISC-100", claimed.domain.as_str(), &payload, now)
			.await
			.expect("Enqueue failed.");

	assert!(!third.reused, "finished runs must not absorb new triggers");

	let done = runs::get(&db, claimed.run_id).await.expect("Get failed.").expect("Run exists.");

	assert_eq!(done.status().expect("status"), RunStatus::Done);
	assert_eq!(done.result_count, 3);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PRIORART_PG_DSN to run."]
async fn reviewer_flags_survive_reruns() {
	let Some(base_dsn) = priorart_testkit::env_dsn() else {
		eprintln!("Skipping reviewer_flags_survive_reruns; set PRIORART_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrap(&test_db).await;

	results::upsert(&db, &ranked("US1", 0.9, Decision::Keep), None).await.expect("Upsert failed.");
	results::upsert(&db, &ranked("US2", 0.4, Decision::Drop), None).await.expect("Upsert failed.");

	let flagged = results::set_report_flag(&db, "DISC-100", "US2", true, OffsetDateTime::now_utc())
		.await
		.expect("Flag update failed.");

	assert!(flagged);
	assert!(
		!results::set_report_flag(&db, "DISC-100", "US404", true, OffsetDateTime::now_utc())
			.await
			.expect("Flag update failed.")
	);

	// Re-run with a different score for US2; the reviewer's flag must stay.
	results::upsert(&db, &ranked("US2", 0.5, Decision::Drop), None).await.expect("Upsert failed.");

	let stored = results::query_all(&db, "DISC-100", Some("patents")).await.expect("Query failed.");

	assert_eq!(stored.len(), 2);
	assert_eq!(stored[0].candidate_id(), "US1");
	assert!(stored[1].add_to_report);
	assert_eq!(stored[1].relevance_score, 0.5);
	assert_eq!(results::count(&db, "DISC-100", "patents").await.expect("Count failed."), 2);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PRIORART_PG_DSN to run."]
async fn expired_leases_count_as_attempts() {
	let Some(base_dsn) = priorart_testkit::env_dsn() else {
		eprintln!("Skipping expired_leases_count_as_attempts; set PRIORART_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrap(&test_db).await;
	let now = OffsetDateTime::now_utc();
	let payload = serde_json::json!({ "id": "DISC-101", "keywords": ["stent"] });
	let run = runs::enqueue(&db, "DISC-101", "patents", &payload, now)
		.await
		.expect("Enqueue failed.")
		.run;
	let lease = Duration::seconds(60);
	let first = runs::claim_next(&db, now, lease)
		.await
		.expect("Claim failed.")
		.expect("Expected a runnable run.");

	assert_eq!(first.run_id, run.run_id);
	assert_eq!(first.attempts, 1);
	assert!(runs::claim_next(&db, now, lease).await.expect("Claim failed.").is_none());

	// The first worker never reported back; the run is claimable again once the lease ends.
	let later = now + Duration::seconds(61);
	let second = runs::claim_next(&db, later, lease)
		.await
		.expect("Claim failed.")
		.expect("Expected the expired run.");

	assert_eq!(second.run_id, run.run_id);
	assert_eq!(second.attempts, 2);

	let stored = runs::get(&db, run.run_id).await.expect("Get failed.").expect("Run exists.");

	assert_eq!(stored.attempts, 2);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PRIORART_PG_DSN to run."]
async fn rerun_replaces_unselected_results() {
	let Some(base_dsn) = priorart_testkit::env_dsn() else {
		eprintln!("Skipping rerun_replaces_unselected_results; set PRIORART_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrap(&test_db).await;
	let cap = 8;
	let first_run: Vec<String> = (0..cap).map(|n| format!("US{n}")).collect();
	let second_run: Vec<String> = (100..100 + cap).map(|n| format!("US{n}")).collect();

	for id in &first_run {
		results::upsert(&db, &ranked(id, 0.8, Decision::Keep), None).await.expect("Upsert failed.");
	}

	// Another disclosure and the other domain are out of reach of the prune.
	results::upsert(&db, &ranked_for("DISC-200", "US0", 0.8, Decision::Keep), None)
		.await
		.expect("Upsert failed.");
	assert!(
		results::set_report_flag(&db, "DISC-100", "US3", true, OffsetDateTime::now_utc())
			.await
			.expect("Flag update failed.")
	);

	for id in &second_run {
		results::upsert(&db, &ranked(id, 0.9, Decision::Keep), None).await.expect("Upsert failed.");
	}

	let removed = results::prune_stale(&db, "DISC-100", "patents", &second_run)
		.await
		.expect("Prune failed.");

	// Seven unreviewed leftovers go; the reviewed US3 stays.
	assert_eq!(removed, 7);

	let stored = results::query_all(&db, "DISC-100", Some("patents")).await.expect("Query failed.");
	let ids: Vec<&str> = stored.iter().map(RankedResult::candidate_id).collect();

	assert_eq!(stored.len(), cap + 1);
	assert!(ids.contains(&"US3"));
	assert!(second_run.iter().all(|id| ids.contains(&id.as_str())));
	assert_eq!(results::count(&db, "DISC-200", "patents").await.expect("Count failed."), 1);

	// Without the reviewed row the stored set is exactly the latest selection.
	results::prune_stale(&db, "DISC-200", "patents", &[]).await.expect("Prune failed.");
	assert_eq!(results::count(&db, "DISC-200", "patents").await.expect("Count failed."), 0);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
