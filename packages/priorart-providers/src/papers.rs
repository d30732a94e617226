use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{Error, RateLimitedClient, RateLimiter, Result, RetryPolicy, TokenBroker};
use priorart_config::BackendConfig;
use priorart_domain::{Domain, PaperQuery, Provenance, SearchCandidate, SearchEnvelope, SearchPage};

pub const RESPONSE_FIELDS: &str =
	"paperId,title,abstract,year,publicationDate,authors,citationCount,referenceCount,venue,url";

/// Free-text literature backend with a `{total, offset, next}` envelope.
pub struct PapersClient {
	client: RateLimitedClient,
	url: String,
	default_headers: Map<String, Value>,
	tokens: Arc<dyn TokenBroker>,
}
impl PapersClient {
	pub fn new(
		cfg: &BackendConfig,
		limiter: Arc<RateLimiter>,
		policy: RetryPolicy,
		tokens: Arc<dyn TokenBroker>,
	) -> Result<Self> {
		let client = RateLimitedClient::new(
			Domain::Papers.as_str(),
			Duration::from_millis(cfg.timeout_ms),
			limiter,
			policy,
		)?;

		Ok(Self {
			client,
			url: format!("{}{}", cfg.api_base, cfg.path),
			default_headers: cfg.default_headers.clone(),
			tokens,
		})
	}

	pub async fn search(&self, query: &PaperQuery, limit: u32) -> Result<SearchPage> {
		let token = self.tokens.token(Domain::Papers).await?;
		let headers = crate::auth_headers(&token, &self.default_headers)?;
		let text = query.text();
		let limit = limit.to_string();
		let response = self
			.client
			.send(|http| {
				Ok(http.get(&self.url).headers(headers.clone()).query(&[
					("query", text.as_str()),
					("limit", limit.as_str()),
					("fields", RESPONSE_FIELDS),
				]))
			})
			.await?;
		let payload: Value = response.json().await?;

		parse_response(payload, query)
	}
}

#[derive(Deserialize)]
struct PapersResponse {
	total: Option<u64>,
	#[serde(default)]
	offset: u64,
	next: Option<u64>,
	#[serde(default)]
	data: Vec<PaperRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaperRecord {
	paper_id: Option<String>,
	title: Option<String>,
	#[serde(rename = "abstract")]
	summary: Option<String>,
	year: Option<i32>,
	publication_date: Option<String>,
	#[serde(default)]
	authors: Vec<Author>,
	citation_count: Option<u64>,
	reference_count: Option<u64>,
	venue: Option<String>,
	url: Option<String>,
}

#[derive(Deserialize)]
struct Author {
	name: Option<String>,
}

fn parse_response(payload: Value, query: &PaperQuery) -> Result<SearchPage> {
	if !payload.is_object() {
		return Err(Error::InvalidResponse {
			message: "Paper response must be a JSON object.".to_string(),
		});
	}

	let response: PapersResponse = serde_json::from_value(payload)?;
	let provenance = Provenance { query: query.text(), keywords: query.keywords.clone() };
	let candidates = response
		.data
		.into_iter()
		.filter_map(|record| {
			let id = record.paper_id?.trim().to_string();

			if id.is_empty() {
				return None;
			}

			Some(SearchCandidate {
				candidate_id: id,
				domain: Domain::Papers,
				title: record.title.unwrap_or_default(),
				summary: record.summary,
				published: record
					.publication_date
					.or_else(|| record.year.map(|year| year.to_string())),
				contributors: record.authors.into_iter().filter_map(|author| author.name).collect(),
				citation_count: record.citation_count,
				reference_count: record.reference_count,
				venue: record.venue.filter(|venue| !venue.trim().is_empty()),
				url: record.url,
				provenance: vec![provenance.clone()],
			})
		})
		.collect();

	Ok(SearchPage {
		candidates,
		envelope: SearchEnvelope { total: response.total, offset: response.offset, next: response.next },
	})
}
