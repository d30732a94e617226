use std::time::Duration;

use uuid::Uuid;

use crate::ResultStore;
use priorart_domain::RankedResult;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistReport {
	pub written: usize,
	/// Candidate ids whose write still failed after every attempt.
	pub failed: Vec<String>,
	/// Results of earlier runs dropped because this run did not select them.
	pub pruned: u64,
}

/// Upserts each result independently, retrying a failed write up to `cfg.attempts` times. One
/// record failing never stops the others. Once anything was written, earlier results for the same
/// pair that this selection no longer contains are removed, unless a reviewer has touched them.
pub async fn persist_all(
	store: &dyn ResultStore,
	results: &[RankedResult],
	run_id: Option<Uuid>,
	cfg: &priorart_config::Persistence,
) -> PersistReport {
	let attempts = cfg.attempts.max(1);
	let delay = Duration::from_millis(cfg.retry_delay_ms);
	let mut report = PersistReport::default();

	for result in results {
		let mut written = false;

		for attempt in 1..=attempts {
			match store.upsert(result, run_id).await {
				Ok(()) => {
					written = true;

					break;
				},
				Err(err) => {
					tracing::warn!(
						disclosure_id = %result.disclosure_id,
						domain = %result.domain,
						candidate_id = %result.candidate_id(),
						attempt,
						error = %err,
						"Result write failed."
					);

					if attempt < attempts {
						tokio::time::sleep(delay).await;
					}
				},
			}
		}

		if written {
			report.written += 1;
		} else {
			tracing::error!(
				disclosure_id = %result.disclosure_id,
				domain = %result.domain,
				candidate_id = %result.candidate_id(),
				"Giving up on result write."
			);

			report.failed.push(result.candidate_id().to_string());
		}
	}

	if report.written > 0
		&& let Some(first) = results.first()
	{
		let keep: Vec<String> = results.iter().map(|r| r.candidate_id().to_string()).collect();

		match store.prune_stale(&first.disclosure_id, first.domain.as_str(), &keep).await {
			Ok(pruned) => report.pruned = pruned,
			Err(err) => tracing::warn!(
				disclosure_id = %first.disclosure_id,
				domain = %first.domain,
				error = %err,
				"Failed to remove results the latest run did not select."
			),
		}
	}

	report
}
