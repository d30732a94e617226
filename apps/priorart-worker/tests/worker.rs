use std::{
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::Value;
use time::OffsetDateTime;
use tokio::time::Instant;

use priorart_config::Config;
use priorart_domain::{Domain, PaperQuery, PatentQuery, SearchCandidate, SearchEnvelope, SearchPage};
use priorart_providers::RateLimiter;
use priorart_service::{BoxFuture, PriorArtService, Providers, RelevanceOracle, RetrievalBackend};
use priorart_storage::{db::Db, models::RunStatus, runs};
use priorart_testkit::TestDatabase;
use priorart_worker::worker::{WorkerPolicy, process_once, run_worker};

const SAMPLE_CONFIG: &str =
	include_str!("../../../packages/priorart-config/tests/fixtures/sample_config.toml");

/// Every backend call fails with the same error.
struct Failing {
	fatal: bool,
}
impl Failing {
	fn error(&self) -> priorart_providers::Error {
		if self.fatal {
			priorart_providers::Error::Auth { message: "Key revoked.".to_string() }
		} else {
			priorart_providers::Error::RetryExhausted {
				attempts: 5,
				last_error: "Status 503.".to_string(),
			}
		}
	}
}
impl RetrievalBackend<PatentQuery> for Failing {
	fn search<'a>(
		&'a self,
		_query: &'a PatentQuery,
		_limit: u32,
	) -> BoxFuture<'a, priorart_providers::Result<SearchPage>> {
		let err = self.error();

		Box::pin(async move { Err(err) })
	}
}
impl RetrievalBackend<PaperQuery> for Failing {
	fn search<'a>(
		&'a self,
		_query: &'a PaperQuery,
		_limit: u32,
	) -> BoxFuture<'a, priorart_providers::Result<SearchPage>> {
		let err = self.error();

		Box::pin(async move { Err(err) })
	}
}
impl RelevanceOracle for Failing {
	fn judge<'a>(
		&'a self,
		_messages: &'a [Value],
	) -> BoxFuture<'a, priorart_providers::Result<Vec<Value>>> {
		let err = self.error();

		Box::pin(async move { Err(err) })
	}
}

/// Patent backend behind one shared limiter that records how many searches overlap.
struct SlowPatents {
	limiter: RateLimiter,
	active: AtomicUsize,
	peak: AtomicUsize,
	starts: Mutex<Vec<Instant>>,
}
impl SlowPatents {
	fn new(min_interval: Duration) -> Self {
		Self {
			limiter: RateLimiter::new(min_interval),
			active: AtomicUsize::new(0),
			peak: AtomicUsize::new(0),
			starts: Mutex::new(Vec::new()),
		}
	}
}
impl RetrievalBackend<PatentQuery> for SlowPatents {
	fn search<'a>(
		&'a self,
		query: &'a PatentQuery,
		_limit: u32,
	) -> BoxFuture<'a, priorart_providers::Result<SearchPage>> {
		Box::pin(async move {
			self.limiter.acquire().await;
			self.starts.lock().unwrap_or_else(|err| err.into_inner()).push(Instant::now());

			let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;

			self.peak.fetch_max(now_active, Ordering::SeqCst);
			tokio::time::sleep(Duration::from_millis(400)).await;
			self.active.fetch_sub(1, Ordering::SeqCst);

			let candidate = SearchCandidate {
				candidate_id: format!("US-{}", query.keyword),
				domain: Domain::Patents,
				title: format!("Patent about {}", query.keyword),
				summary: None,
				published: None,
				contributors: Vec::new(),
				citation_count: Some(1),
				reference_count: None,
				venue: None,
				url: None,
				provenance: Vec::new(),
			};

			Ok(SearchPage {
				candidates: vec![candidate],
				envelope: SearchEnvelope { total: Some(1), offset: 0, next: None },
			})
		})
	}
}

/// Keeps every candidate it is shown.
struct KeepAll;
impl RelevanceOracle for KeepAll {
	fn judge<'a>(
		&'a self,
		messages: &'a [Value],
	) -> BoxFuture<'a, priorart_providers::Result<Vec<Value>>> {
		let user: Value = messages
			.get(1)
			.and_then(|m| m["content"].as_str())
			.and_then(|content| serde_json::from_str(content).ok())
			.unwrap_or(Value::Null);
		let judgments = user["candidates"]
			.as_array()
			.map(|items| {
				items
					.iter()
					.map(|c| {
						serde_json::json!({
							"candidate_id": c["candidate_id"],
							"score": 0.9,
							"decision": "KEEP",
							"rationale": "Same mechanism.",
						})
					})
					.collect()
			})
			.unwrap_or_default();

		Box::pin(async move { Ok(judgments) })
	}
}

async fn connect(test_db: &TestDatabase) -> (Config, Db) {
	let mut cfg: Config = toml::from_str(SAMPLE_CONFIG).expect("Sample config should parse.");

	cfg.storage.postgres.dsn = test_db.dsn().to_string();

	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	(cfg, db)
}

async fn service(test_db: &TestDatabase, fatal: bool) -> PriorArtService {
	let (cfg, db) = connect(test_db).await;
	let backend = Arc::new(Failing { fatal });
	let providers = Providers::new(backend.clone(), backend.clone(), backend);

	PriorArtService::new(cfg, db, providers)
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PRIORART_PG_DSN to run."]
async fn transient_failures_requeue_and_fatal_failures_stop() {
	let Some(base_dsn) = priorart_testkit::env_dsn() else {
		eprintln!("Skipping worker test; set PRIORART_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let payload = serde_json::json!({ "id": "DISC-77", "keywords": ["stent"] });

	{
		let service = service(&test_db, false).await;
		let policy = WorkerPolicy::from_config(&service.cfg.worker);
		let run = runs::enqueue(&service.db, "DISC-77", "patents", &payload, OffsetDateTime::now_utc())
			.await
			.expect("Enqueue failed.")
			.run;

		assert!(process_once(&service, &policy).await.expect("Processing failed."));

		let stored = runs::get(&service.db, run.run_id).await.expect("Get failed.").expect("Run exists.");

		assert_eq!(stored.status().expect("status"), RunStatus::Pending);
		// The claim itself counts as the attempt.
		assert_eq!(stored.attempts, 1);
		assert!(stored.available_at > OffsetDateTime::now_utc());
		// Backed off, so nothing is claimable yet.
		assert!(!process_once(&service, &policy).await.expect("Processing failed."));
	}
	{
		let service = service(&test_db, true).await;
		let policy = WorkerPolicy::from_config(&service.cfg.worker);
		let run = runs::enqueue(&service.db, "DISC-77", "papers", &payload, OffsetDateTime::now_utc())
			.await
			.expect("Enqueue failed.")
			.run;

		assert!(process_once(&service, &policy).await.expect("Processing failed."));

		let stored = runs::get(&service.db, run.run_id).await.expect("Get failed.").expect("Run exists.");

		assert_eq!(stored.status().expect("status"), RunStatus::Failed);
		assert_eq!(stored.attempts, 1);
		assert!(stored.last_error.unwrap_or_default().contains("Key revoked."));
	}

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PRIORART_PG_DSN to run."]
async fn claimed_runs_execute_concurrently_behind_one_limiter() {
	let Some(base_dsn) = priorart_testkit::env_dsn() else {
		eprintln!("Skipping worker test; set PRIORART_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let (mut cfg, db) = connect(&test_db).await;

	cfg.worker.concurrency = 2;
	cfg.worker.poll_interval_ms = 50;

	let min_interval = Duration::from_millis(150);
	let patents = Arc::new(SlowPatents::new(min_interval));
	let providers = Providers::new(patents.clone(), Arc::new(Failing { fatal: true }), Arc::new(KeepAll));
	let policy = WorkerPolicy::from_config(&cfg.worker);
	let service = Arc::new(PriorArtService::new(cfg, db, providers));
	let mut run_ids = Vec::new();

	for id in ["DISC-201", "DISC-202"] {
		let payload = serde_json::json!({ "id": id, "keywords": ["stent"] });
		let run = runs::enqueue(&service.db, id, "patents", &payload, OffsetDateTime::now_utc())
			.await
			.expect("Enqueue failed.")
			.run;

		run_ids.push(run.run_id);
	}

	// The worker loop never returns on its own.
	let _ = tokio::time::timeout(Duration::from_secs(3), run_worker(service.clone(), policy)).await;

	for run_id in run_ids {
		let stored = runs::get(&service.db, run_id).await.expect("Get failed.").expect("Run exists.");

		assert_eq!(stored.status().expect("status"), RunStatus::Done);
		assert_eq!(stored.result_count, 1);
	}

	assert_eq!(patents.peak.load(Ordering::SeqCst), 2);

	let starts = patents.starts.lock().unwrap_or_else(|err| err.into_inner()).clone();

	assert_eq!(starts.len(), 2);
	assert!(starts[1] - starts[0] >= min_interval);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
