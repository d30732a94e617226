use std::{sync::Arc, time::Duration as StdDuration};

use time::{Duration, OffsetDateTime};
use tokio::{task::JoinSet, time as tokio_time};

use crate::Result;
use priorart_domain::Disclosure;
use priorart_service::PriorArtService;
use priorart_storage::{models::SearchRun, runs};

const MAX_RUN_ERROR_CHARS: usize = 1_024;

#[derive(Debug, Clone, Copy)]
pub struct WorkerPolicy {
	pub poll_interval: StdDuration,
	pub lease: Duration,
	pub max_run_attempts: u32,
	pub base_backoff_ms: i64,
	pub max_backoff_ms: i64,
	pub concurrency: usize,
}
impl WorkerPolicy {
	pub fn from_config(cfg: &priorart_config::Worker) -> Self {
		Self {
			poll_interval: StdDuration::from_millis(cfg.poll_interval_ms),
			lease: Duration::seconds(cfg.lease_seconds),
			max_run_attempts: cfg.max_run_attempts.max(1),
			base_backoff_ms: cfg.base_backoff_ms,
			max_backoff_ms: cfg.max_backoff_ms,
			concurrency: cfg.concurrency.max(1) as usize,
		}
	}

	pub fn backoff_for_attempt(&self, attempt: i32) -> Duration {
		let attempts = attempt.max(1) as u32;
		let exp = attempts.saturating_sub(1).min(10);
		let base = self.base_backoff_ms.saturating_mul(1 << exp);

		Duration::milliseconds(base.min(self.max_backoff_ms))
	}
}

/// What happens to a run whose search failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
	Retry { attempts: i32, available_at: OffsetDateTime },
	Fail { attempts: i32 },
}

/// `attempt` is the attempt that just failed; claiming a run counts it.
pub fn disposition(
	policy: &WorkerPolicy,
	attempt: i32,
	fatal: bool,
	now: OffsetDateTime,
) -> Disposition {
	let attempts = attempt.max(1);

	if fatal || attempts >= policy.max_run_attempts as i32 {
		return Disposition::Fail { attempts };
	}

	Disposition::Retry { attempts, available_at: now + policy.backoff_for_attempt(attempts) }
}

/// Claims runs until `policy.concurrency` are in flight and executes them as tasks of this
/// process. Every task shares the service's providers, so the per-backend spacing is enforced
/// across all of them. Run one worker process per deployment.
pub async fn run_worker(service: Arc<PriorArtService>, policy: WorkerPolicy) -> color_eyre::Result<()> {
	tracing::info!(
		poll_interval_ms = policy.poll_interval.as_millis() as u64,
		max_run_attempts = policy.max_run_attempts,
		concurrency = policy.concurrency,
		"Search worker started."
	);

	let mut in_flight = JoinSet::new();

	loop {
		while let Some(joined) = in_flight.try_join_next() {
			log_task_exit(joined);
		}

		if in_flight.len() >= policy.concurrency {
			if let Some(joined) = in_flight.join_next().await {
				log_task_exit(joined);
			}

			continue;
		}

		match claim(&service, &policy).await {
			Ok(Some(run)) => {
				let service = service.clone();

				in_flight.spawn(async move { execute(&service, &policy, run).await });

				// Fill the free slots before sleeping.
				continue;
			},
			Ok(None) => {},
			Err(err) => tracing::error!(error = %err, "Search run claim failed."),
		}

		tokio::select! {
			_ = tokio_time::sleep(policy.poll_interval) => {},
			Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => log_task_exit(joined),
		}
	}
}

fn log_task_exit(joined: std::result::Result<Result<()>, tokio::task::JoinError>) {
	match joined {
		Ok(Ok(())) => {},
		Ok(Err(err)) => tracing::error!(error = %err, "Search run processing failed."),
		Err(err) => tracing::error!(error = %err, "Search run task panicked."),
	}
}

/// Claims and executes one run in the calling task. Returns whether a run was claimed.
pub async fn process_once(service: &PriorArtService, policy: &WorkerPolicy) -> Result<bool> {
	let Some(run) = claim(service, policy).await? else {
		return Ok(false);
	};

	execute(service, policy, run).await?;

	Ok(true)
}

pub async fn claim(service: &PriorArtService, policy: &WorkerPolicy) -> Result<Option<SearchRun>> {
	Ok(runs::claim_next(&service.db, OffsetDateTime::now_utc(), policy.lease).await?)
}

pub async fn execute(service: &PriorArtService, policy: &WorkerPolicy, run: SearchRun) -> Result<()> {
	let now = OffsetDateTime::now_utc();

	// Only a worker that died mid-run gets here: every handled failure is recorded below.
	if run.attempts > policy.max_run_attempts as i32 {
		let error_text = format!(
			"Lease expired on the final attempt. Last error: {}",
			run.last_error.as_deref().unwrap_or("none")
		);
		let error_text = sanitize_run_error(&error_text);

		runs::mark_failed(&service.db, run.run_id, run.attempts, &error_text, now).await?;
		tracing::error!(
			run_id = %run.run_id,
			disclosure_id = %run.disclosure_id,
			domain = %run.domain,
			attempt = run.attempts,
			"Search run abandoned by its worker too often."
		);

		return Ok(());
	}

	let domain = run.domain()?;
	let disclosure: Disclosure = match serde_json::from_value(run.disclosure.clone()) {
		Ok(disclosure) => disclosure,
		Err(err) => {
			let error_text = sanitize_run_error(&format!("Unreadable disclosure payload: {err}"));

			runs::mark_failed(&service.db, run.run_id, run.attempts, &error_text, now).await?;
			tracing::error!(run_id = %run.run_id, error = %error_text, "Search run rejected.");

			return Ok(());
		},
	};

	tracing::info!(
		run_id = %run.run_id,
		disclosure_id = %disclosure.id,
		domain = %domain,
		attempt = run.attempts,
		"Search run claimed."
	);

	match service.run_search(&disclosure, domain, Some(run.run_id)).await {
		Ok(outcome) => {
			let count = i32::try_from(outcome.persisted).unwrap_or(i32::MAX);

			runs::mark_done(&service.db, run.run_id, count, OffsetDateTime::now_utc()).await?;
			tracing::info!(
				run_id = %run.run_id,
				disclosure_id = %disclosure.id,
				domain = %domain,
				persisted = outcome.persisted,
				"Search run finished."
			);
		},
		Err(err) => record_failure(service, policy, &run, &err).await?,
	}

	Ok(())
}

async fn record_failure(
	service: &PriorArtService,
	policy: &WorkerPolicy,
	run: &SearchRun,
	err: &priorart_service::Error,
) -> Result<()> {
	let now = OffsetDateTime::now_utc();
	let error_text = sanitize_run_error(&err.to_string());

	match disposition(policy, run.attempts, err.is_fatal(), now) {
		Disposition::Retry { attempts, available_at } => {
			runs::mark_retry(&service.db, run.run_id, attempts, &error_text, available_at, now)
				.await?;
			tracing::warn!(
				run_id = %run.run_id,
				disclosure_id = %run.disclosure_id,
				domain = %run.domain,
				attempt = attempts,
				retry_in_ms = (available_at - now).whole_milliseconds() as i64,
				error = %error_text,
				"Search run failed. Re-queued."
			);
		},
		Disposition::Fail { attempts } => {
			runs::mark_failed(&service.db, run.run_id, attempts, &error_text, now).await?;
			tracing::error!(
				run_id = %run.run_id,
				disclosure_id = %run.disclosure_id,
				domain = %run.domain,
				attempt = attempts,
				fatal = err.is_fatal(),
				error = %error_text,
				"Search run failed permanently."
			);
		},
	}

	Ok(())
}

/// Strips credentials from an error before it is stored on the run row, and bounds its length.
pub fn sanitize_run_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "client_secret", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = raw.split(sep).next().unwrap_or(raw);

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_RUN_ERROR_CHARS {
		out = out.chars().take(MAX_RUN_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	fn policy() -> WorkerPolicy {
		WorkerPolicy {
			poll_interval: StdDuration::from_millis(500),
			lease: Duration::seconds(900),
			max_run_attempts: 3,
			base_backoff_ms: 5_000,
			max_backoff_ms: 12_000,
			concurrency: 2,
		}
	}

	#[test]
	fn backoff_doubles_and_caps() {
		let policy = policy();

		assert_eq!(policy.backoff_for_attempt(0), Duration::seconds(5));
		assert_eq!(policy.backoff_for_attempt(1), Duration::seconds(5));
		assert_eq!(policy.backoff_for_attempt(2), Duration::seconds(10));
		assert_eq!(policy.backoff_for_attempt(3), Duration::seconds(12));
		assert_eq!(policy.backoff_for_attempt(40), Duration::seconds(12));
	}

	#[test]
	fn transient_failures_retry_until_the_run_budget_is_spent() {
		let now = datetime!(2026-03-01 09:00 UTC);

		assert_eq!(
			disposition(&policy(), 1, false, now),
			Disposition::Retry { attempts: 1, available_at: now + Duration::seconds(5) }
		);
		assert_eq!(
			disposition(&policy(), 2, false, now),
			Disposition::Retry { attempts: 2, available_at: now + Duration::seconds(10) }
		);
		assert_eq!(disposition(&policy(), 3, false, now), Disposition::Fail { attempts: 3 });
	}

	#[test]
	fn fatal_failures_are_never_retried() {
		let now = datetime!(2026-03-01 09:00 UTC);

		assert_eq!(disposition(&policy(), 1, true, now), Disposition::Fail { attempts: 1 });
	}

	#[test]
	fn run_errors_are_redacted_and_bounded() {
		let text = "Credential request failed: Authorization: Bearer sk-live-123 client_secret=hunter2";
		let sanitized = sanitize_run_error(text);

		assert!(!sanitized.contains("sk-live-123"));
		assert!(!sanitized.contains("hunter2"));
		assert!(sanitized.contains("client_secret=[REDACTED]"));

		let long = "x".repeat(MAX_RUN_ERROR_CHARS + 10);

		assert_eq!(sanitize_run_error(&long).chars().count(), MAX_RUN_ERROR_CHARS + 3);
	}
}
