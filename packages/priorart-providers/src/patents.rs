use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{Error, RateLimitedClient, RateLimiter, Result, RetryPolicy, TokenBroker};
use priorart_config::BackendConfig;
use priorart_domain::{Domain, PatentQuery, Provenance, SearchCandidate, SearchEnvelope, SearchPage};

pub const RESPONSE_FIELDS: [&str; 7] = [
	"patent_id",
	"patent_title",
	"patent_abstract",
	"patent_date",
	"inventors",
	"patent_num_times_cited_by_us_patents",
	"patent_num_us_patents_cited",
];
const SORT_FIELD: &str = "patent_num_times_cited_by_us_patents";

/// Structured field-predicate backend.
pub struct PatentsClient {
	client: RateLimitedClient,
	url: String,
	default_headers: Map<String, Value>,
	tokens: Arc<dyn TokenBroker>,
}
impl PatentsClient {
	pub fn new(
		cfg: &BackendConfig,
		limiter: Arc<RateLimiter>,
		policy: RetryPolicy,
		tokens: Arc<dyn TokenBroker>,
	) -> Result<Self> {
		let client = RateLimitedClient::new(
			Domain::Patents.as_str(),
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

	pub async fn search(&self, query: &PatentQuery, limit: u32) -> Result<SearchPage> {
		let token = self.tokens.token(Domain::Patents).await?;
		let headers = crate::auth_headers(&token, &self.default_headers)?;
		let body = request_body(query, limit);
		let response = self
			.client
			.send(|http| Ok(http.post(&self.url).headers(headers.clone()).json(&body)))
			.await?;
		let payload: Value = response.json().await?;

		parse_response(payload, query)
	}
}

pub fn request_body(query: &PatentQuery, limit: u32) -> Value {
	serde_json::json!({
		"q": query.predicate.to_json(),
		"f": RESPONSE_FIELDS,
		"s": [{ SORT_FIELD: "desc" }],
		"o": { "size": limit, "offset": 0 },
	})
}

#[derive(Deserialize)]
struct PatentsResponse {
	#[serde(default)]
	patents: Option<Vec<PatentRecord>>,
	total_hits: Option<u64>,
}

#[derive(Deserialize)]
struct PatentRecord {
	patent_id: Option<String>,
	patent_title: Option<String>,
	patent_abstract: Option<String>,
	patent_date: Option<String>,
	#[serde(default)]
	inventors: Vec<Inventor>,
	patent_num_times_cited_by_us_patents: Option<u64>,
	patent_num_us_patents_cited: Option<u64>,
}

#[derive(Deserialize)]
struct Inventor {
	inventor_name_first: Option<String>,
	inventor_name_last: Option<String>,
}
impl Inventor {
	fn display_name(&self) -> Option<String> {
		let name = [self.inventor_name_first.as_deref(), self.inventor_name_last.as_deref()]
			.into_iter()
			.flatten()
			.map(str::trim)
			.filter(|part| !part.is_empty())
			.collect::<Vec<_>>()
			.join(" ");

		(!name.is_empty()).then_some(name)
	}
}

fn parse_response(payload: Value, query: &PatentQuery) -> Result<SearchPage> {
	if !payload.is_object() {
		return Err(Error::InvalidResponse {
			message: "Patent response must be a JSON object.".to_string(),
		});
	}

	let response: PatentsResponse = serde_json::from_value(payload)?;
	let provenance =
		Provenance { query: query.label().to_string(), keywords: vec![query.keyword.clone()] };
	let candidates = response
		.patents
		.unwrap_or_default()
		.into_iter()
		.filter_map(|record| {
			let id = record.patent_id?.trim().to_string();

			if id.is_empty() {
				return None;
			}

			Some(SearchCandidate {
				url: Some(format!("https://patents.google.com/patent/US{id}")),
				candidate_id: id,
				domain: Domain::Patents,
				title: record.patent_title.unwrap_or_default(),
				summary: record.patent_abstract,
				published: record.patent_date,
				contributors: record.inventors.iter().filter_map(Inventor::display_name).collect(),
				citation_count: record.patent_num_times_cited_by_us_patents,
				reference_count: record.patent_num_us_patents_cited,
				venue: None,
				provenance: vec![provenance.clone()],
			})
		})
		.collect();

	Ok(SearchPage {
		candidates,
		envelope: SearchEnvelope { total: response.total_hits, offset: 0, next: None },
	})
}
