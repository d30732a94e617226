//! Request pacing and retry shared by every outbound backend call.
//!
//! Each backend gets one [`RateLimiter`], a single serialized clock that every pipeline instance in
//! the process queues on. Transient failures (429, 5xx, timeouts, connection errors) back off
//! exponentially with random jitter; anything else surfaces immediately.

use std::{future::Future, sync::Arc, time::Duration};

use reqwest::{Client, RequestBuilder, Response, StatusCode, header::RETRY_AFTER};
use tokio::{
	sync::Mutex,
	time::{self, Instant},
};

use crate::{Error, Result};
use priorart_domain::Domain;

const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug)]
pub struct RateLimiter {
	min_interval: Duration,
	next_slot: Mutex<Option<Instant>>,
}
impl RateLimiter {
	pub fn new(min_interval: Duration) -> Self {
		Self { min_interval, next_slot: Mutex::new(None) }
	}

	pub fn min_interval(&self) -> Duration {
		self.min_interval
	}

	/// Waits until this caller may start a request. The lock is held across the wait so callers
	/// are released one at a time, in arrival order.
	pub async fn acquire(&self) {
		let mut next_slot = self.next_slot.lock().await;

		if let Some(at) = *next_slot
			&& at > Instant::now()
		{
			time::sleep_until(at).await;
		}

		*next_slot = Some(Instant::now() + self.min_interval);
	}
}

/// Per-domain limiters. Clones share the same clocks.
#[derive(Debug, Clone)]
pub struct RateLimiters {
	patents: Arc<RateLimiter>,
	papers: Arc<RateLimiter>,
}
impl RateLimiters {
	pub fn new(patents: Duration, papers: Duration) -> Self {
		Self { patents: Arc::new(RateLimiter::new(patents)), papers: Arc::new(RateLimiter::new(papers)) }
	}

	pub fn from_config(cfg: &priorart_config::Providers) -> Self {
		Self::new(
			Duration::from_millis(cfg.patents.min_interval_ms),
			Duration::from_millis(cfg.papers.min_interval_ms),
		)
	}

	pub fn for_domain(&self, domain: Domain) -> Arc<RateLimiter> {
		match domain {
			Domain::Patents => self.patents.clone(),
			Domain::Papers => self.papers.clone(),
		}
	}
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub jitter_ratio: f64,
}
impl RetryPolicy {
	pub fn from_config(cfg: &priorart_config::Retry) -> Self {
		Self {
			max_attempts: cfg.max_attempts.max(1),
			base_delay: Duration::from_millis(cfg.base_delay_ms),
			max_delay: Duration::from_millis(cfg.max_delay_ms),
			jitter_ratio: f64::from(cfg.jitter_ratio).clamp(0.0, 1.0),
		}
	}

	/// Delay after the `attempt`-th failure (1-based). A server-provided `Retry-After` replaces the
	/// computed backoff; either way the result never exceeds `max_delay`.
	pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
		if let Some(wait) = retry_after {
			return wait.min(self.max_delay);
		}

		let exponent = attempt.saturating_sub(1).min(30) as i32;
		let base = self.base_delay.as_secs_f64() * 2_f64.powi(exponent);
		let jitter = base * self.jitter_ratio * rand::random::<f64>();

		Duration::from_secs_f64((base + jitter).min(self.max_delay.as_secs_f64()))
	}
}

/// Why a single attempt failed.
#[derive(Debug)]
pub enum AttemptError {
	Transient { message: String, retry_after: Option<Duration> },
	Fatal(Error),
}
impl From<Error> for AttemptError {
	fn from(err: Error) -> Self {
		Self::Fatal(err)
	}
}

/// Runs `op` until it succeeds, fails fatally, or `policy.max_attempts` transient failures have
/// been seen. `op` receives the 1-based attempt number.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, backend: &str, mut op: F) -> Result<T>
where
	F: FnMut(u32) -> Fut,
	Fut: Future<Output = Result<T, AttemptError>>,
{
	let mut attempt = 1;

	loop {
		match op(attempt).await {
			Ok(value) => return Ok(value),
			Err(AttemptError::Fatal(err)) => return Err(err),
			Err(AttemptError::Transient { message, retry_after }) => {
				if attempt >= policy.max_attempts {
					tracing::error!(backend, attempt, error = %message, "Retries exhausted.");

					return Err(Error::RetryExhausted { attempts: attempt, last_error: message });
				}

				let delay = policy.delay_for(attempt, retry_after);

				tracing::warn!(
					backend,
					attempt,
					delay_ms = delay.as_millis() as u64,
					error = %message,
					"Transient backend failure. Backing off."
				);

				time::sleep(delay).await;

				attempt += 1;
			},
		}
	}
}

/// HTTP client bound to one backend's limiter and retry policy.
#[derive(Debug, Clone)]
pub struct RateLimitedClient {
	http: Client,
	limiter: Arc<RateLimiter>,
	policy: RetryPolicy,
	backend: &'static str,
}
impl RateLimitedClient {
	pub fn new(
		backend: &'static str,
		timeout: Duration,
		limiter: Arc<RateLimiter>,
		policy: RetryPolicy,
	) -> Result<Self> {
		let http = Client::builder().timeout(timeout).build()?;

		Ok(Self { http, limiter, policy, backend })
	}

	/// Sends the request produced by `build`, taking a limiter slot before every attempt.
	/// Returns the first successful response.
	pub async fn send<F>(&self, build: F) -> Result<Response>
	where
		F: Fn(&Client) -> Result<RequestBuilder>,
	{
		let build = &build;
		let this = self;

		retry(&self.policy, self.backend, |_| async move {
			this.limiter.acquire().await;

			let request = build(&this.http)?;
			let response = match request.send().await {
				Ok(response) => response,
				Err(err) if is_transient(&err) =>
					return Err(AttemptError::Transient { message: err.to_string(), retry_after: None }),
				Err(err) => return Err(AttemptError::Fatal(err.into())),
			};

			classify(response).await
		})
		.await
	}
}

async fn classify(response: Response) -> Result<Response, AttemptError> {
	let status = response.status();

	if status.is_success() {
		return Ok(response);
	}

	let retry_after = parse_retry_after(&response);
	let body = response.text().await.unwrap_or_default();

	if is_retryable_status(status) {
		return Err(AttemptError::Transient {
			message: format!("Backend returned {status}."),
			retry_after,
		});
	}

	Err(AttemptError::Fatal(Error::Permanent {
		status: status.as_u16(),
		body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
	}))
}

fn is_retryable_status(status: StatusCode) -> bool {
	status == StatusCode::TOO_MANY_REQUESTS
		|| status == StatusCode::REQUEST_TIMEOUT
		|| status.is_server_error()
}

fn is_transient(err: &reqwest::Error) -> bool {
	err.is_timeout() || err.is_connect() || err.is_request()
}

fn parse_retry_after(response: &Response) -> Option<Duration> {
	response
		.headers()
		.get(RETRY_AFTER)
		.and_then(|value| value.to_str().ok())
		.and_then(|raw| raw.trim().parse::<u64>().ok())
		.map(Duration::from_secs)
}
