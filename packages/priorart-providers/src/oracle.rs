use std::{
	sync::{Arc, LazyLock},
	time::Duration,
};

use regex::Regex;
use serde_json::Value;

use crate::{Error, RateLimitedClient, RateLimiter, Result, RetryPolicy};
use priorart_config::LlmProviderConfig;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$")
		.expect("Fence pattern is hardcoded and must be valid.")
});

/// OpenAI-compatible chat endpoint used as the relevance oracle.
pub struct OracleClient {
	client: RateLimitedClient,
	cfg: LlmProviderConfig,
	url: String,
}
impl OracleClient {
	pub fn new(cfg: &LlmProviderConfig, policy: RetryPolicy) -> Result<Self> {
		let client = RateLimitedClient::new(
			"oracle",
			Duration::from_millis(cfg.timeout_ms),
			Arc::new(RateLimiter::new(Duration::ZERO)),
			policy,
		)?;

		Ok(Self { client, url: format!("{}{}", cfg.api_base, cfg.path), cfg: cfg.clone() })
	}

	pub fn model(&self) -> &str {
		&self.cfg.model
	}

	/// Sends one chat completion and returns the raw judgment entries. Transport failures follow
	/// the shared retry policy; content that is not a judgment list is
	/// [`Error::InvalidResponse`].
	pub async fn judge(&self, messages: &[Value]) -> Result<Vec<Value>> {
		let headers = crate::auth_headers(&self.cfg.api_key, &self.cfg.default_headers)?;
		let body = serde_json::json!({
			"model": self.cfg.model,
			"temperature": self.cfg.temperature,
			"messages": messages,
		});
		let response = self
			.client
			.send(|http| Ok(http.post(&self.url).headers(headers.clone()).json(&body)))
			.await?;
		let json: Value = response.json().await?;

		parse_judgments(json)
	}
}

/// Accepts a chat completion envelope or a bare JSON body. The content may be
/// `{"judgments": [...]}`, a bare array, and may be wrapped in a fenced code block.
pub fn parse_judgments(json: Value) -> Result<Vec<Value>> {
	let parsed = match json.pointer("/choices/0/message/content").and_then(Value::as_str) {
		Some(content) => parse_content(content)?,
		None if json.is_object() || json.is_array() => json,
		None => {
			return Err(Error::InvalidResponse {
				message: "Oracle response is missing JSON content.".to_string(),
			});
		},
	};

	match parsed {
		Value::Array(items) => Ok(items),
		Value::Object(mut map) => match map.remove("judgments") {
			Some(Value::Array(items)) => Ok(items),
			_ => Err(Error::InvalidResponse {
				message: "Oracle content is missing a judgments array.".to_string(),
			}),
		},
		_ => Err(Error::InvalidResponse {
			message: "Oracle content must be a JSON object or array.".to_string(),
		}),
	}
}

fn parse_content(content: &str) -> Result<Value> {
	let unfenced = FENCE_RE
		.captures(content)
		.and_then(|caps| caps.get(1))
		.map(|body| body.as_str())
		.unwrap_or(content);

	serde_json::from_str(unfenced.trim()).map_err(|_| Error::InvalidResponse {
		message: "Oracle content is not valid JSON.".to_string(),
	})
}
