mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	BackendConfig, Config, Evaluation, LlmProviderConfig, PaperSelection, PatentSelection,
	Persistence, Poller, Postgres, Providers, Quality, Retry, Search, Selection, Service, Storage,
	TokenBrokerConfig, Worker,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}

	for (label, backend) in
		[("providers.patents", &cfg.providers.patents), ("providers.papers", &cfg.providers.papers)]
	{
		if backend.api_base.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label}.api_base must be non-empty.") });
		}
		if backend.timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("{label}.timeout_ms must be greater than zero."),
			});
		}
		if backend.min_interval_ms == 0 {
			return Err(Error::Validation {
				message: format!("{label}.min_interval_ms must be greater than zero."),
			});
		}
		if cfg.providers.token_broker.is_none() && backend.api_key.is_none() {
			return Err(Error::Validation {
				message: format!(
					"{label}.api_key must be non-empty when providers.token_broker is not set."
				),
			});
		}
	}

	if cfg.providers.oracle.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.oracle.api_key must be non-empty.".to_string(),
		});
	}
	if !cfg.providers.oracle.temperature.is_finite() {
		return Err(Error::Validation {
			message: "providers.oracle.temperature must be a finite number.".to_string(),
		});
	}

	if let Some(broker) = cfg.providers.token_broker.as_ref() {
		for (label, value) in [
			("providers.token_broker.url", &broker.url),
			("providers.token_broker.client_id", &broker.client_id),
			("providers.token_broker.client_secret", &broker.client_secret),
		] {
			if value.trim().is_empty() {
				return Err(Error::Validation { message: format!("{label} must be non-empty.") });
			}
		}
	}

	validate_retry(cfg)?;
	validate_search(cfg)?;
	validate_selection(cfg)?;

	if cfg.persistence.attempts == 0 {
		return Err(Error::Validation {
			message: "persistence.attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "worker.poll_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.lease_seconds <= 0 {
		return Err(Error::Validation {
			message: "worker.lease_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.max_run_attempts == 0 {
		return Err(Error::Validation {
			message: "worker.max_run_attempts must be greater than zero.".to_string(),
		});
	}
	if !(1..=32).contains(&cfg.worker.concurrency) {
		return Err(Error::Validation {
			message: "worker.concurrency must be in the range 1-32.".to_string(),
		});
	}
	if cfg.worker.base_backoff_ms <= 0 || cfg.worker.max_backoff_ms < cfg.worker.base_backoff_ms {
		return Err(Error::Validation {
			message: "worker.base_backoff_ms must be positive and no greater than worker.max_backoff_ms."
				.to_string(),
		});
	}

	validate_poller(&cfg.poller)?;

	Ok(())
}

fn validate_retry(cfg: &Config) -> Result<()> {
	let retry = &cfg.retry;

	if retry.max_attempts == 0 {
		return Err(Error::Validation {
			message: "retry.max_attempts must be greater than zero.".to_string(),
		});
	}
	if retry.base_delay_ms == 0 {
		return Err(Error::Validation {
			message: "retry.base_delay_ms must be greater than zero.".to_string(),
		});
	}
	if retry.max_delay_ms < retry.base_delay_ms {
		return Err(Error::Validation {
			message: "retry.max_delay_ms must be greater than or equal to retry.base_delay_ms."
				.to_string(),
		});
	}
	if !retry.jitter_ratio.is_finite() || !(0.0..=1.0).contains(&retry.jitter_ratio) {
		return Err(Error::Validation {
			message: "retry.jitter_ratio must be in the range 0.0-1.0.".to_string(),
		});
	}

	Ok(())
}

fn validate_search(cfg: &Config) -> Result<()> {
	if !(1..=200).contains(&cfg.search.prefilter_k) {
		return Err(Error::Validation {
			message: "search.prefilter_k must be in the range 1-200.".to_string(),
		});
	}
	if !(1..=100).contains(&cfg.search.page_size) {
		return Err(Error::Validation {
			message: "search.page_size must be in the range 1-100.".to_string(),
		});
	}
	if !(3..=5).contains(&cfg.search.max_paper_queries) {
		return Err(Error::Validation {
			message: "search.max_paper_queries must be in the range 3-5.".to_string(),
		});
	}
	if let Some(date) = cfg.search.granted_after.as_deref()
		&& !is_iso_date(date)
	{
		return Err(Error::Validation {
			message: "search.granted_after must be formatted as YYYY-MM-DD.".to_string(),
		});
	}
	if !(1..=3).contains(&cfg.quality.max_attempts) {
		return Err(Error::Validation {
			message: "quality.max_attempts must be in the range 1-3.".to_string(),
		});
	}
	if cfg.quality.too_narrow_total >= cfg.quality.too_broad_total {
		return Err(Error::Validation {
			message: "quality.too_narrow_total must be less than quality.too_broad_total."
				.to_string(),
		});
	}
	if cfg.evaluation.batch_size == 0 {
		return Err(Error::Validation {
			message: "evaluation.batch_size must be greater than zero.".to_string(),
		});
	}
	if cfg.evaluation.max_abstract_chars == 0 {
		return Err(Error::Validation {
			message: "evaluation.max_abstract_chars must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_selection(cfg: &Config) -> Result<()> {
	let patents = &cfg.selection.patents;
	let papers = &cfg.selection.papers;

	for (label, cap) in [("selection.patents.cap", patents.cap), ("selection.papers.cap", papers.cap)]
	{
		if !(1..=20).contains(&cap) {
			return Err(Error::Validation { message: format!("{label} must be in the range 1-20.") });
		}
	}

	if !patents.keep_threshold.is_finite() || !(0.0..=1.0).contains(&patents.keep_threshold) {
		return Err(Error::Validation {
			message: "selection.patents.keep_threshold must be in the range 0.0-1.0.".to_string(),
		});
	}
	if !papers.keep_threshold.is_finite() || !(0.0..=10.0).contains(&papers.keep_threshold) {
		return Err(Error::Validation {
			message: "selection.papers.keep_threshold must be in the range 0-10.".to_string(),
		});
	}

	Ok(())
}

fn validate_poller(poller: &Poller) -> Result<()> {
	if poller.api_base.trim().is_empty() {
		return Err(Error::Validation {
			message: "poller.api_base must be non-empty.".to_string(),
		});
	}
	if poller.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "poller.poll_interval_ms must be greater than zero.".to_string(),
		});
	}
	if poller.max_attempts == 0 {
		return Err(Error::Validation {
			message: "poller.max_attempts must be greater than zero.".to_string(),
		});
	}
	if poller.abandon_after_ms <= poller.initial_delay_ms {
		return Err(Error::Validation {
			message: "poller.abandon_after_ms must be greater than poller.initial_delay_ms."
				.to_string(),
		});
	}
	if poller.expected_count == 0 {
		return Err(Error::Validation {
			message: "poller.expected_count must be greater than zero.".to_string(),
		});
	}
	if poller.snapshot_dir.trim().is_empty() {
		return Err(Error::Validation {
			message: "poller.snapshot_dir must be non-empty.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	for backend in [&mut cfg.providers.patents, &mut cfg.providers.papers] {
		if backend.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
			backend.api_key = None;
		}
	}
	if cfg.search.granted_after.as_deref().map(|date| date.trim().is_empty()).unwrap_or(false) {
		cfg.search.granted_after = None;
	}
}

fn is_iso_date(value: &str) -> bool {
	let bytes = value.as_bytes();

	bytes.len() == 10
		&& bytes[4] == b'-'
		&& bytes[7] == b'-'
		&& bytes.iter().enumerate().all(|(idx, b)| idx == 4 || idx == 7 || b.is_ascii_digit())
}
