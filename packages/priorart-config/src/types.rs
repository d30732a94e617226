use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub retry: Retry,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub quality: Quality,
	#[serde(default)]
	pub evaluation: Evaluation,
	#[serde(default)]
	pub selection: Selection,
	#[serde(default)]
	pub persistence: Persistence,
	#[serde(default)]
	pub worker: Worker,
	#[serde(default)]
	pub poller: Poller,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub patents: BackendConfig,
	pub papers: BackendConfig,
	pub oracle: LlmProviderConfig,
	/// Optional. When set, bearer credentials for both backends are fetched from the broker on
	/// every call and the static `api_key` values are ignored.
	pub token_broker: Option<TokenBrokerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
	pub api_base: String,
	pub path: String,
	pub api_key: Option<String>,
	pub timeout_ms: u64,
	/// Minimum spacing between two requests to this backend, shared by every pipeline instance.
	pub min_interval_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenBrokerConfig {
	pub url: String,
	pub client_id: String,
	pub client_secret: String,
	pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Retry {
	pub max_attempts: u32,
	pub base_delay_ms: u64,
	/// Ceiling for any single backoff delay, jitter included.
	pub max_delay_ms: u64,
	pub jitter_ratio: f32,
}
impl Default for Retry {
	fn default() -> Self {
		Self { max_attempts: 5, base_delay_ms: 1_000, max_delay_ms: 30_000, jitter_ratio: 0.5 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Search {
	/// Candidates kept per domain, by citation count, before the oracle sees them.
	pub prefilter_k: u32,
	pub page_size: u32,
	pub max_paper_queries: u32,
	/// Optional lower bound on the patent grant date, formatted as `YYYY-MM-DD`.
	pub granted_after: Option<String>,
}
impl Default for Search {
	fn default() -> Self {
		Self { prefilter_k: 40, page_size: 50, max_paper_queries: 4, granted_after: None }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Quality {
	pub too_broad_total: u64,
	pub too_narrow_total: u64,
	pub max_attempts: u32,
}
impl Default for Quality {
	fn default() -> Self {
		Self { too_broad_total: 10_000, too_narrow_total: 2, max_attempts: 3 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Evaluation {
	pub batch_size: u32,
	pub max_abstract_chars: u32,
}
impl Default for Evaluation {
	fn default() -> Self {
		Self { batch_size: 15, max_abstract_chars: 1_500 }
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Selection {
	pub patents: PatentSelection,
	pub papers: PaperSelection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PatentSelection {
	pub cap: u32,
	/// Score in 0.0-1.0.
	pub keep_threshold: f32,
}
impl Default for PatentSelection {
	fn default() -> Self {
		Self { cap: 8, keep_threshold: 0.7 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaperSelection {
	pub cap: u32,
	/// Score in 0-10.
	pub keep_threshold: f32,
}
impl Default for PaperSelection {
	fn default() -> Self {
		Self { cap: 8, keep_threshold: 7.0 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Persistence {
	pub attempts: u32,
	pub retry_delay_ms: u64,
}
impl Default for Persistence {
	fn default() -> Self {
		Self { attempts: 3, retry_delay_ms: 200 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Worker {
	pub poll_interval_ms: u64,
	/// How long a claimed run stays invisible to other workers.
	pub lease_seconds: i64,
	pub max_run_attempts: u32,
	pub base_backoff_ms: i64,
	pub max_backoff_ms: i64,
	/// Runs executed at once by one worker process. They share the process's rate limiters.
	pub concurrency: u32,
}
impl Default for Worker {
	fn default() -> Self {
		Self {
			poll_interval_ms: 500,
			lease_seconds: 900,
			max_run_attempts: 3,
			base_backoff_ms: 5_000,
			max_backoff_ms: 300_000,
			concurrency: 4,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Poller {
	pub api_base: String,
	pub initial_delay_ms: u64,
	pub poll_interval_ms: u64,
	pub max_attempts: u32,
	/// Absolute lifetime of a job measured from its trigger, regardless of state.
	pub abandon_after_ms: u64,
	/// Persisted results needed before a job counts as complete.
	pub expected_count: u32,
	pub snapshot_dir: String,
}
impl Default for Poller {
	fn default() -> Self {
		Self {
			api_base: "http://127.0.0.1:8080".to_string(),
			initial_delay_ms: 60_000,
			poll_interval_ms: 30_000,
			max_attempts: 20,
			abandon_after_ms: 3_600_000,
			expected_count: 1,
			snapshot_dir: ".priorart/jobs".to_string(),
		}
	}
}
