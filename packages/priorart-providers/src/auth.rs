use std::{sync::Arc, time::Duration};

use reqwest::Client;
use serde::Deserialize;

use crate::{BoxFuture, Error, Result};
use priorart_config::{Providers, TokenBrokerConfig};
use priorart_domain::Domain;

/// Source of the bearer credential attached to every backend request.
pub trait TokenBroker
where
	Self: Send + Sync,
{
	fn token<'a>(&'a self, domain: Domain) -> BoxFuture<'a, Result<String>>;
}

/// Fixed per-backend keys from the config file.
pub struct StaticTokens {
	patents: String,
	papers: String,
}
impl StaticTokens {
	pub fn new(patents: impl Into<String>, papers: impl Into<String>) -> Self {
		Self { patents: patents.into(), papers: papers.into() }
	}

	pub fn from_config(cfg: &Providers) -> Result<Self> {
		let key = |label: &str, value: Option<&String>| {
			value.cloned().ok_or_else(|| Error::InvalidConfig {
				message: format!("providers.{label}.api_key is required without a token broker."),
			})
		};

		Ok(Self::new(
			key("patents", cfg.patents.api_key.as_ref())?,
			key("papers", cfg.papers.api_key.as_ref())?,
		))
	}
}
impl TokenBroker for StaticTokens {
	fn token<'a>(&'a self, domain: Domain) -> BoxFuture<'a, Result<String>> {
		let token = match domain {
			Domain::Patents => self.patents.clone(),
			Domain::Papers => self.papers.clone(),
		};

		Box::pin(async move { Ok(token) })
	}
}

/// Client-credentials exchange against an external broker. A fresh token is requested for every
/// call; any failure is reported as [`Error::Auth`] and never retried.
pub struct HttpTokenBroker {
	http: Client,
	cfg: TokenBrokerConfig,
}
impl HttpTokenBroker {
	pub fn new(cfg: &TokenBrokerConfig) -> Result<Self> {
		let http = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self { http, cfg: cfg.clone() })
	}

	async fn fetch(&self, domain: Domain) -> Result<String> {
		let body = serde_json::json!({
			"grant_type": "client_credentials",
			"client_id": self.cfg.client_id,
			"client_secret": self.cfg.client_secret,
			"scope": domain.as_str(),
		});
		let response = self
			.http
			.post(&self.cfg.url)
			.json(&body)
			.send()
			.await
			.map_err(|err| Error::Auth { message: err.to_string() })?;
		let status = response.status();

		if !status.is_success() {
			return Err(Error::Auth { message: format!("Token broker returned {status}.") });
		}

		let payload: TokenResponse = response
			.json()
			.await
			.map_err(|err| Error::Auth { message: format!("Token broker response: {err}") })?;

		if payload.access_token.trim().is_empty() {
			return Err(Error::Auth { message: "Token broker returned an empty token.".to_string() });
		}

		Ok(payload.access_token)
	}
}
impl TokenBroker for HttpTokenBroker {
	fn token<'a>(&'a self, domain: Domain) -> BoxFuture<'a, Result<String>> {
		Box::pin(self.fetch(domain))
	}
}

#[derive(Deserialize)]
struct TokenResponse {
	access_token: String,
}

/// The broker when one is configured, static keys otherwise.
pub fn from_config(cfg: &Providers) -> Result<Arc<dyn TokenBroker>> {
	match cfg.token_broker.as_ref() {
		Some(broker) => Ok(Arc::new(HttpTokenBroker::new(broker)?)),
		None => Ok(Arc::new(StaticTokens::from_config(cfg)?)),
	}
}
