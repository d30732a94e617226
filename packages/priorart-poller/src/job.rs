//! Client-side record of one long-running domain search.
//!
//! The job moves NOT_STARTED → TRIGGERED → WAITING_FIXED_DELAY → POLLING and ends in COMPLETE,
//! FAILED or ABANDONED. Every transition takes the current time explicitly so the machine is a
//! pure function of its inputs; the poll loop persists a snapshot after each one. Once a trigger is
//! recorded the job never triggers again unless [`SearchJob::reset`] is called. A job that ran out
//! of poll attempts keeps its token and goes back to POLLING on the next run.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use priorart_domain::Domain;

use crate::client::RemoteStatus;

pub const NO_RESULTS_FOUND: &str = "no results found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
	NotStarted,
	Triggered,
	WaitingFixedDelay,
	Polling,
	Complete,
	Failed,
	Abandoned,
}
impl JobState {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::NotStarted => "NOT_STARTED",
			Self::Triggered => "TRIGGERED",
			Self::WaitingFixedDelay => "WAITING_FIXED_DELAY",
			Self::Polling => "POLLING",
			Self::Complete => "COMPLETE",
			Self::Failed => "FAILED",
			Self::Abandoned => "ABANDONED",
		}
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Complete | Self::Failed | Self::Abandoned)
	}
}
impl fmt::Display for JobState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
	pub disclosure_id: String,
	pub domain: Domain,
}
impl fmt::Display for JobKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.disclosure_id, self.domain)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
	pub initial_delay: Duration,
	pub poll_interval: Duration,
	pub max_attempts: u32,
	/// Measured from the trigger.
	pub abandon_after: Duration,
	pub expected_count: u32,
}
impl PollPolicy {
	pub fn from_config(cfg: &priorart_config::Poller) -> Self {
		Self {
			initial_delay: Duration::from_millis(cfg.initial_delay_ms),
			poll_interval: Duration::from_millis(cfg.poll_interval_ms),
			max_attempts: cfg.max_attempts.max(1),
			abandon_after: Duration::from_millis(cfg.abandon_after_ms),
			expected_count: cfg.expected_count,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchJob {
	pub key: JobKey,
	pub state: JobState,
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub trigger_timestamp: Option<OffsetDateTime>,
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub last_poll_timestamp: Option<OffsetDateTime>,
	#[serde(default)]
	pub attempt_count: u32,
	#[serde(default)]
	pub job_token: Option<Uuid>,
	#[serde(default)]
	pub last_error: Option<String>,
	#[serde(default)]
	pub last_result: Option<RemoteStatus>,
	/// Set when FAILED was reached by running out of poll attempts rather than by the server.
	#[serde(default)]
	pub exhausted: bool,
}
impl SearchJob {
	pub fn new(key: JobKey) -> Self {
		Self {
			key,
			state: JobState::NotStarted,
			trigger_timestamp: None,
			last_poll_timestamp: None,
			attempt_count: 0,
			job_token: None,
			last_error: None,
			last_result: None,
			exhausted: false,
		}
	}

	/// The only way back to NOT_STARTED.
	pub fn reset(&mut self) {
		*self = Self::new(self.key.clone());
	}

	pub fn is_terminal(&self) -> bool {
		self.state.is_terminal()
	}

	pub fn triggered(&mut self, job_token: Uuid, now: OffsetDateTime) {
		if self.state != JobState::NotStarted {
			return;
		}

		self.state = JobState::Triggered;
		self.job_token = Some(job_token);
		self.trigger_timestamp = Some(now);
	}

	pub fn acknowledged(&mut self) {
		if self.state == JobState::Triggered {
			self.state = JobState::WaitingFixedDelay;
		}
	}

	/// When the fixed delay ends, or `None` outside WAITING_FIXED_DELAY.
	pub fn delay_ends_at(&self, policy: &PollPolicy) -> Option<OffsetDateTime> {
		(self.state == JobState::WaitingFixedDelay)
			.then_some(self.trigger_timestamp)
			.flatten()
			.map(|at| at + policy.initial_delay)
	}

	pub fn start_polling(&mut self, now: OffsetDateTime, policy: &PollPolicy) -> bool {
		match self.delay_ends_at(policy) {
			Some(at) if now >= at => {
				self.state = JobState::Polling;

				true
			},
			_ => false,
		}
	}

	/// Earliest time the next status request may go out.
	pub fn next_poll_at(&self, policy: &PollPolicy) -> Option<OffsetDateTime> {
		if self.state != JobState::Polling {
			return None;
		}

		self.last_poll_timestamp
			.map(|last| last + policy.poll_interval)
			.or_else(|| self.trigger_timestamp.map(|at| at + policy.initial_delay))
	}

	pub fn abandon_at(&self, policy: &PollPolicy) -> Option<OffsetDateTime> {
		self.trigger_timestamp.map(|at| at + policy.abandon_after)
	}

	/// Moves any non-terminal, triggered job past its absolute deadline to ABANDONED.
	pub fn check_abandon(&mut self, now: OffsetDateTime, policy: &PollPolicy) -> bool {
		if self.is_terminal() {
			return false;
		}

		match self.abandon_at(policy) {
			Some(at) if now >= at => {
				self.state = JobState::Abandoned;

				true
			},
			_ => false,
		}
	}

	/// Folds one status answer into the job.
	pub fn record_poll(&mut self, now: OffsetDateTime, status: RemoteStatus, policy: &PollPolicy) {
		if self.state != JobState::Polling {
			return;
		}

		self.attempt_count += 1;
		self.last_poll_timestamp = Some(now);

		let complete = status.ready && status.count >= i64::from(policy.expected_count);
		let failed_remotely = status.status.eq_ignore_ascii_case("FAILED");

		if let Some(error) = status.last_error.clone() {
			self.last_error = Some(error);
		}

		self.last_result = Some(status);

		if complete {
			self.state = JobState::Complete;
		} else if failed_remotely {
			self.state = JobState::Failed;
		} else {
			self.fail_if_exhausted(policy);
		}
	}

	/// Counts a status request that could not be answered. Only the attempt cap turns it fatal.
	pub fn record_poll_error(&mut self, now: OffsetDateTime, error: String, policy: &PollPolicy) {
		if self.state != JobState::Polling {
			return;
		}

		self.attempt_count += 1;
		self.last_poll_timestamp = Some(now);
		self.last_error = Some(error);
		self.fail_if_exhausted(policy);
	}

	/// Reopens a job that ran out of poll attempts: back to POLLING with a fresh attempt budget and
	/// the same token. Jobs that failed on the server, or never got a token, stay as they are.
	pub fn resume_polling(&mut self) -> bool {
		if self.state != JobState::Failed || !self.exhausted || self.job_token.is_none() {
			return false;
		}

		self.state = JobState::Polling;
		self.attempt_count = 0;
		self.exhausted = false;
		self.last_error = None;

		true
	}

	fn fail_if_exhausted(&mut self, policy: &PollPolicy) {
		if self.attempt_count >= policy.max_attempts {
			self.state = JobState::Failed;
			self.exhausted = true;
			self.last_error = Some(NO_RESULTS_FOUND.to_string());
		}
	}
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	fn policy() -> PollPolicy {
		PollPolicy {
			initial_delay: Duration::from_secs(60),
			poll_interval: Duration::from_secs(30),
			max_attempts: 3,
			abandon_after: Duration::from_secs(3_600),
			expected_count: 1,
		}
	}

	fn job() -> SearchJob {
		SearchJob::new(JobKey { disclosure_id: "DISC-9".to_string(), domain: Domain::Papers })
	}

	fn status(state: &str, ready: bool, count: i64) -> RemoteStatus {
		RemoteStatus {
			status: state.to_string(),
			ready,
			count,
			attempts: 1,
			last_error: None,
			results: None,
		}
	}

	fn polling_job(now: OffsetDateTime) -> SearchJob {
		let mut job = job();

		job.triggered(Uuid::nil(), now);
		job.acknowledged();
		assert!(job.start_polling(now + Duration::from_secs(60), &policy()));

		job
	}

	#[test]
	fn fixed_delay_gates_polling() {
		let t0 = datetime!(2026-03-01 09:00 UTC);
		let mut job = job();

		job.triggered(Uuid::nil(), t0);
		job.acknowledged();

		assert_eq!(job.state, JobState::WaitingFixedDelay);
		assert!(!job.start_polling(t0 + Duration::from_secs(59), &policy()));
		assert!(job.start_polling(t0 + Duration::from_secs(60), &policy()));
		assert_eq!(job.next_poll_at(&policy()), Some(t0 + Duration::from_secs(60)));
	}

	#[test]
	fn a_recorded_trigger_is_never_replaced() {
		let t0 = datetime!(2026-03-01 09:00 UTC);
		let mut job = job();
		let token = Uuid::new_v4();

		job.triggered(token, t0);
		job.triggered(Uuid::new_v4(), t0 + Duration::from_secs(5));

		assert_eq!(job.job_token, Some(token));
		assert_eq!(job.trigger_timestamp, Some(t0));
	}

	#[test]
	fn attempt_cap_fails_with_no_results_found() {
		let t0 = datetime!(2026-03-01 09:00 UTC);
		let mut job = polling_job(t0);

		for n in 0..3 {
			job.record_poll(t0 + Duration::from_secs(60 + n * 30), status("RUNNING", false, 0), &policy());
		}

		assert_eq!(job.state, JobState::Failed);
		assert!(job.exhausted);
		assert_eq!(job.last_error.as_deref(), Some(NO_RESULTS_FOUND));
		assert_eq!(job.attempt_count, 3);
	}

	#[test]
	fn exhausted_job_resumes_with_its_token() {
		let t0 = datetime!(2026-03-01 09:00 UTC);
		let mut job = polling_job(t0);

		for n in 0..3 {
			job.record_poll(t0 + Duration::from_secs(60 + n * 30), status("RUNNING", false, 0), &policy());
		}

		assert!(job.resume_polling());
		assert_eq!(job.state, JobState::Polling);
		assert_eq!(job.attempt_count, 0);
		assert_eq!(job.job_token, Some(Uuid::nil()));
		assert_eq!(job.trigger_timestamp, Some(t0));
		assert!(!job.exhausted);
		assert!(!job.resume_polling());

		let mut failed = polling_job(t0);

		failed.record_poll(t0 + Duration::from_secs(60), status("FAILED", false, 0), &policy());

		assert!(!failed.resume_polling());
		assert_eq!(failed.state, JobState::Failed);
	}

	#[test]
	fn ready_with_too_few_results_keeps_polling() {
		let t0 = datetime!(2026-03-01 09:00 UTC);
		let mut job = polling_job(t0);
		let strict = PollPolicy { expected_count: 2, ..policy() };

		job.record_poll(t0 + Duration::from_secs(60), status("DONE", true, 1), &strict);

		assert_eq!(job.state, JobState::Polling);

		job.record_poll(t0 + Duration::from_secs(90), status("DONE", true, 2), &strict);

		assert_eq!(job.state, JobState::Complete);
	}

	#[test]
	fn server_failure_is_terminal_without_exhaustion() {
		let t0 = datetime!(2026-03-01 09:00 UTC);
		let mut job = polling_job(t0);
		let mut failed = status("FAILED", false, 0);

		failed.last_error = Some("Credential request failed.".to_string());
		job.record_poll(t0 + Duration::from_secs(60), failed, &policy());

		assert_eq!(job.state, JobState::Failed);
		assert!(!job.exhausted);
		assert_eq!(job.last_error.as_deref(), Some("Credential request failed."));
	}

	#[test]
	fn deadline_abandons_any_open_state_and_reset_clears_it() {
		let t0 = datetime!(2026-03-01 09:00 UTC);
		let mut job = job();

		job.triggered(Uuid::nil(), t0);
		job.acknowledged();

		assert!(!job.check_abandon(t0 + Duration::from_secs(3_599), &policy()));
		assert!(job.check_abandon(t0 + Duration::from_secs(3_600), &policy()));
		assert_eq!(job.state, JobState::Abandoned);

		job.reset();

		assert_eq!(job.state, JobState::NotStarted);
		assert_eq!(job.job_token, None);
		assert_eq!(job.attempt_count, 0);
	}

	#[test]
	fn snapshot_uses_upper_case_state_names() {
		let t0 = datetime!(2026-03-01 09:00 UTC);
		let job = polling_job(t0);
		let json = serde_json::to_value(&job).expect("Job should serialize.");

		assert_eq!(json["state"], "POLLING");
		assert_eq!(json["trigger_timestamp"], "2026-03-01T09:00:00Z");

		let back: SearchJob = serde_json::from_value(json).expect("Job should deserialize.");

		assert_eq!(back, job);
	}
}
