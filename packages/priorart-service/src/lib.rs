pub mod evaluate;
pub mod jobs;
pub mod persist;
pub mod pipeline;
pub mod refine;

mod error;

pub use error::{Error, Result};
pub use jobs::{
	JobStatus, ReportFlagRequest, ReportFlagResponse, ResultsResponse, StatusQuery, TriggerRequest,
	TriggerResponse,
};
pub use persist::PersistReport;
pub use pipeline::DomainOutcome;
pub use priorart_providers::BoxFuture;

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use priorart_config::Config;
use priorart_domain::{PaperQuery, PatentQuery, RankedResult, SearchPage};
use priorart_providers::{
	OracleClient, PapersClient, PatentsClient, RateLimiters, RetryPolicy, auth,
};
use priorart_storage::{db::Db, results};

/// One search backend, queried with the domain's query type.
pub trait RetrievalBackend<Q>
where
	Self: Send + Sync,
	Q: Sync,
{
	fn search<'a>(
		&'a self,
		query: &'a Q,
		limit: u32,
	) -> BoxFuture<'a, priorart_providers::Result<SearchPage>>;
}

/// Reasoning service that scores candidates. Returns the raw judgment entries; validation happens
/// in [`evaluate`].
pub trait RelevanceOracle
where
	Self: Send + Sync,
{
	fn judge<'a>(
		&'a self,
		messages: &'a [Value],
	) -> BoxFuture<'a, priorart_providers::Result<Vec<Value>>>;
}

pub trait ResultStore
where
	Self: Send + Sync,
{
	fn upsert<'a>(
		&'a self,
		result: &'a RankedResult,
		run_id: Option<Uuid>,
	) -> BoxFuture<'a, priorart_storage::Result<()>>;

	fn query_all<'a>(
		&'a self,
		disclosure_id: &'a str,
		domain: Option<&'a str>,
	) -> BoxFuture<'a, priorart_storage::Result<Vec<RankedResult>>>;

	fn count<'a>(
		&'a self,
		disclosure_id: &'a str,
		domain: &'a str,
	) -> BoxFuture<'a, priorart_storage::Result<i64>>;

	/// Removes the pair's unreviewed results that are not in `keep`.
	fn prune_stale<'a>(
		&'a self,
		disclosure_id: &'a str,
		domain: &'a str,
		keep: &'a [String],
	) -> BoxFuture<'a, priorart_storage::Result<u64>>;
}

#[derive(Clone)]
pub struct Providers {
	pub patents: Arc<dyn RetrievalBackend<PatentQuery>>,
	pub papers: Arc<dyn RetrievalBackend<PaperQuery>>,
	pub oracle: Arc<dyn RelevanceOracle>,
}
impl Providers {
	pub fn new(
		patents: Arc<dyn RetrievalBackend<PatentQuery>>,
		papers: Arc<dyn RetrievalBackend<PaperQuery>>,
		oracle: Arc<dyn RelevanceOracle>,
	) -> Self {
		Self { patents, papers, oracle }
	}

	/// HTTP clients for every backend. `limiters` should be shared by every pipeline in the
	/// process so the per-backend spacing holds globally.
	pub fn from_config(cfg: &Config, limiters: &RateLimiters) -> Result<Self> {
		let policy = RetryPolicy::from_config(&cfg.retry);
		let tokens = auth::from_config(&cfg.providers)?;
		let patents = PatentsClient::new(
			&cfg.providers.patents,
			limiters.for_domain(priorart_domain::Domain::Patents),
			policy.clone(),
			tokens.clone(),
		)?;
		let papers = PapersClient::new(
			&cfg.providers.papers,
			limiters.for_domain(priorart_domain::Domain::Papers),
			policy.clone(),
			tokens,
		)?;
		let oracle = OracleClient::new(&cfg.providers.oracle, policy)?;

		Ok(Self::new(Arc::new(patents), Arc::new(papers), Arc::new(oracle)))
	}
}

pub struct PriorArtService {
	pub cfg: Config,
	pub db: Db,
	pub providers: Providers,
}
impl PriorArtService {
	pub fn new(cfg: Config, db: Db, providers: Providers) -> Self {
		Self { cfg, db, providers }
	}
}

impl RetrievalBackend<PatentQuery> for PatentsClient {
	fn search<'a>(
		&'a self,
		query: &'a PatentQuery,
		limit: u32,
	) -> BoxFuture<'a, priorart_providers::Result<SearchPage>> {
		Box::pin(PatentsClient::search(self, query, limit))
	}
}

impl RetrievalBackend<PaperQuery> for PapersClient {
	fn search<'a>(
		&'a self,
		query: &'a PaperQuery,
		limit: u32,
	) -> BoxFuture<'a, priorart_providers::Result<SearchPage>> {
		Box::pin(PapersClient::search(self, query, limit))
	}
}

impl RelevanceOracle for OracleClient {
	fn judge<'a>(
		&'a self,
		messages: &'a [Value],
	) -> BoxFuture<'a, priorart_providers::Result<Vec<Value>>> {
		Box::pin(OracleClient::judge(self, messages))
	}
}

impl ResultStore for Db {
	fn upsert<'a>(
		&'a self,
		result: &'a RankedResult,
		run_id: Option<Uuid>,
	) -> BoxFuture<'a, priorart_storage::Result<()>> {
		Box::pin(results::upsert(self, result, run_id))
	}

	fn query_all<'a>(
		&'a self,
		disclosure_id: &'a str,
		domain: Option<&'a str>,
	) -> BoxFuture<'a, priorart_storage::Result<Vec<RankedResult>>> {
		Box::pin(results::query_all(self, disclosure_id, domain))
	}

	fn count<'a>(
		&'a self,
		disclosure_id: &'a str,
		domain: &'a str,
	) -> BoxFuture<'a, priorart_storage::Result<i64>> {
		Box::pin(results::count(self, disclosure_id, domain))
	}

	fn prune_stale<'a>(
		&'a self,
		disclosure_id: &'a str,
		domain: &'a str,
		keep: &'a [String],
	) -> BoxFuture<'a, priorart_storage::Result<u64>> {
		Box::pin(results::prune_stale(self, disclosure_id, domain, keep))
	}
}
