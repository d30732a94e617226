use std::{
	collections::HashSet,
	sync::{Arc, Mutex},
	time::Duration,
};

use time::OffsetDateTime;
use tokio::time::Instant;

use crate::{
	Error, Result,
	client::{RemoteStatus, SearchApi},
	job::{JobKey, JobState, PollPolicy, SearchJob},
	snapshot::SnapshotStore,
};
use priorart_domain::{Disclosure, Domain};

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
	Complete(RemoteStatus),
	/// The attempt cap ran out before the results were ready; the caller reports
	/// "no results found". The snapshot is kept and the next run resumes polling.
	NotReady { attempts: u32 },
	Failed { message: String },
	Abandoned,
}

/// Wall clock that advances with Tokio's clock, so paused-time tests drive it too.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
	wall: OffsetDateTime,
	start: Instant,
}
impl Clock {
	pub fn system() -> Self {
		Self::starting_at(OffsetDateTime::now_utc())
	}

	pub fn starting_at(wall: OffsetDateTime) -> Self {
		Self { wall, start: Instant::now() }
	}

	pub fn now(&self) -> OffsetDateTime {
		self.wall + self.start.elapsed()
	}
}

pub struct Poller {
	api: Arc<dyn SearchApi>,
	snapshots: Arc<dyn SnapshotStore>,
	policy: PollPolicy,
	clock: Clock,
	active: Mutex<HashSet<JobKey>>,
}
impl Poller {
	pub fn new(
		api: Arc<dyn SearchApi>,
		snapshots: Arc<dyn SnapshotStore>,
		policy: PollPolicy,
		clock: Clock,
	) -> Self {
		Self { api, snapshots, policy, clock, active: Mutex::new(HashSet::new()) }
	}

	/// Drives the job for `(disclosure, domain)` to a terminal state, resuming from the stored
	/// snapshot if one exists. A job that previously ran out of poll attempts is polled again with
	/// a fresh budget. A second concurrent call for the same key is refused.
	pub async fn run(&self, disclosure: &Disclosure, domain: Domain) -> Result<PollOutcome> {
		let key = JobKey { disclosure_id: disclosure.id.clone(), domain };
		let _guard = ActiveGuard::acquire(&self.active, &key)?;
		let mut job = match self.snapshots.load(&key).await? {
			Some(job) => {
				tracing::info!(
					disclosure_id = %key.disclosure_id,
					domain = %key.domain,
					state = %job.state,
					attempts = job.attempt_count,
					"Resuming search job."
				);

				job
			},
			None => SearchJob::new(key.clone()),
		};

		if job.resume_polling() {
			tracing::info!(
				disclosure_id = %key.disclosure_id,
				domain = %key.domain,
				"Polling again with a fresh attempt budget."
			);
			self.snapshots.save(&job).await?;
		}

		loop {
			if let Some(outcome) = outcome_for(&job) {
				return Ok(outcome);
			}

			let now = self.clock.now();

			if job.check_abandon(now, &self.policy) {
				tracing::warn!(
					disclosure_id = %key.disclosure_id,
					domain = %key.domain,
					attempts = job.attempt_count,
					"Search job abandoned after its deadline."
				);
				self.snapshots.save(&job).await?;

				continue;
			}

			match job.state {
				JobState::NotStarted => {
					let token = self.api.trigger(disclosure, domain).await?;

					job.triggered(token, self.clock.now());

					tracing::info!(
						disclosure_id = %key.disclosure_id,
						domain = %key.domain,
						job_token = %token,
						"Search triggered."
					);
				},
				JobState::Triggered => job.acknowledged(),
				JobState::WaitingFixedDelay => {
					if !job.start_polling(now, &self.policy) {
						self.sleep_until(&job, job.delay_ends_at(&self.policy)).await;

						continue;
					}
				},
				JobState::Polling => {
					if let Some(at) = job.next_poll_at(&self.policy)
						&& now < at
					{
						self.sleep_until(&job, Some(at)).await;

						continue;
					}

					self.poll_once(&mut job).await?;
				},
				JobState::Complete | JobState::Failed | JobState::Abandoned => continue,
			}

			self.snapshots.save(&job).await?;
		}
	}

	async fn poll_once(&self, job: &mut SearchJob) -> Result<()> {
		let Some(token) = job.job_token else {
			return Err(Error::MissingToken {
				key: job.key.to_string(),
				state: job.state.to_string(),
			});
		};

		match self.api.status(token).await {
			Ok(status) => {
				tracing::debug!(
					disclosure_id = %job.key.disclosure_id,
					domain = %job.key.domain,
					attempt = job.attempt_count + 1,
					status = %status.status,
					count = status.count,
					"Search job polled."
				);

				job.record_poll(self.clock.now(), status, &self.policy);
			},
			Err(err) => {
				tracing::warn!(
					disclosure_id = %job.key.disclosure_id,
					domain = %job.key.domain,
					attempt = job.attempt_count + 1,
					error = %err,
					"Status request failed."
				);

				job.record_poll_error(self.clock.now(), err.to_string(), &self.policy);
			},
		}

		Ok(())
	}

	/// Sleeps until `at` or the job's abandon deadline, whichever comes first.
	async fn sleep_until(&self, job: &SearchJob, at: Option<OffsetDateTime>) {
		let deadline = match (at, job.abandon_at(&self.policy)) {
			(Some(at), Some(abandon)) => at.min(abandon),
			(Some(at), None) => at,
			(None, Some(abandon)) => abandon,
			(None, None) => return,
		};
		let wait = Duration::try_from(deadline - self.clock.now()).unwrap_or_default();

		tokio::time::sleep(wait).await;
	}
}

fn outcome_for(job: &SearchJob) -> Option<PollOutcome> {
	match job.state {
		JobState::Complete =>
			Some(PollOutcome::Complete(job.last_result.clone().unwrap_or_default())),
		JobState::Failed if job.exhausted =>
			Some(PollOutcome::NotReady { attempts: job.attempt_count }),
		JobState::Failed => Some(PollOutcome::Failed {
			message: job.last_error.clone().unwrap_or_else(|| "Search failed.".to_string()),
		}),
		JobState::Abandoned => Some(PollOutcome::Abandoned),
		_ => None,
	}
}

struct ActiveGuard<'a> {
	active: &'a Mutex<HashSet<JobKey>>,
	key: JobKey,
}
impl<'a> ActiveGuard<'a> {
	fn acquire(active: &'a Mutex<HashSet<JobKey>>, key: &JobKey) -> Result<Self> {
		let mut set = active.lock().unwrap_or_else(|err| err.into_inner());

		if !set.insert(key.clone()) {
			return Err(Error::Busy { key: key.to_string() });
		}

		Ok(Self { active, key: key.clone() })
	}
}
impl Drop for ActiveGuard<'_> {
	fn drop(&mut self) {
		self.active.lock().unwrap_or_else(|err| err.into_inner()).remove(&self.key);
	}
}
