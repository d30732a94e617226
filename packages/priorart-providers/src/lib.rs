pub mod auth;
pub mod oracle;
pub mod papers;
pub mod patents;
pub mod rate_limit;

mod error;

pub use auth::{HttpTokenBroker, StaticTokens, TokenBroker};
pub use error::{Error, Result};
pub use oracle::OracleClient;
pub use papers::PapersClient;
pub use patents::PatentsClient;
pub use rate_limit::{RateLimitedClient, RateLimiter, RateLimiters, RetryPolicy};

use std::{future::Future, pin::Pin};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub fn auth_headers(token: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {token}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}
