//! One (disclosure, domain) search, end to end: queries, retrieval, reduction, the literature
//! quality loop, oracle scoring, selection and persistence. Execution is sequential; network calls
//! are the only suspension points.

use std::collections::HashMap;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, Providers, Result, ResultStore, evaluate, persist,
	refine::{self, RefinedSearch},
};
use priorart_config::Config;
use priorart_domain::{
	Disclosure, Domain, DomainPolicy, QualityThresholds, RankedResult, SearchCandidate, reduce,
	selection, strategy,
};

#[derive(Debug, Clone)]
pub struct DomainOutcome {
	pub disclosure_id: String,
	pub domain: Domain,
	pub queries: usize,
	/// Hits across every query before deduplication.
	pub raw_hits: usize,
	pub unique: usize,
	pub evaluated: usize,
	pub judged: usize,
	pub persisted: usize,
	pub failed_writes: Vec<String>,
	pub results: Vec<RankedResult>,
}
impl DomainOutcome {
	fn empty(disclosure_id: &str, domain: Domain) -> Self {
		Self {
			disclosure_id: disclosure_id.to_string(),
			domain,
			queries: 0,
			raw_hits: 0,
			unique: 0,
			evaluated: 0,
			judged: 0,
			persisted: 0,
			failed_writes: Vec::new(),
			results: Vec::new(),
		}
	}
}

pub async fn run_domain_search(
	cfg: &Config,
	providers: &Providers,
	store: &dyn ResultStore,
	disclosure: &Disclosure,
	domain: Domain,
	run_id: Option<Uuid>,
	now: OffsetDateTime,
) -> Result<DomainOutcome> {
	let keywords = disclosure.clean_keywords();

	if keywords.is_empty() {
		tracing::info!(
			disclosure_id = %disclosure.id,
			domain = %domain,
			"Disclosure has no usable keywords. Nothing to search."
		);

		return Ok(DomainOutcome::empty(&disclosure.id, domain));
	}

	let mut outcome = DomainOutcome::empty(&disclosure.id, domain);
	let lists = match domain {
		Domain::Patents => retrieve_patents(cfg, providers, &keywords, &disclosure.id).await?,
		Domain::Papers => retrieve_papers(cfg, providers, disclosure, &keywords).await?,
	};

	outcome.queries = lists.len();
	outcome.raw_hits = lists.iter().map(Vec::len).sum();

	let merged = reduce::merge(lists);

	outcome.unique = merged.len();

	let candidates = reduce::prefilter(merged, cfg.search.prefilter_k as usize);

	outcome.evaluated = candidates.len();

	tracing::info!(
		disclosure_id = %disclosure.id,
		domain = %domain,
		queries = outcome.queries,
		raw_hits = outcome.raw_hits,
		unique = outcome.unique,
		evaluated = outcome.evaluated,
		"Candidates reduced."
	);

	let judgments =
		evaluate::evaluate(providers.oracle.as_ref(), &cfg.evaluation, domain, disclosure, &candidates)
			.await?;
	let mut by_id: HashMap<String, SearchCandidate> =
		candidates.into_iter().map(|c| (c.candidate_id.clone(), c)).collect();
	let judged: Vec<_> = judgments
		.into_iter()
		.filter_map(|judgment| by_id.remove(&judgment.candidate_id).map(|c| (c, judgment)))
		.collect();

	outcome.judged = judged.len();

	let policy = DomainPolicy::from_config(domain, &cfg.selection);
	let results = selection::select(&disclosure.id, judged, &policy, now);
	let report = persist::persist_all(store, &results, run_id, &cfg.persistence).await;

	if report.written == 0 && !results.is_empty() {
		return Err(Error::Storage {
			message: format!("None of the {} selected results could be written.", results.len()),
		});
	}

	outcome.persisted = report.written;
	outcome.failed_writes = report.failed;
	outcome.results = results;

	tracing::info!(
		disclosure_id = %disclosure.id,
		domain = %domain,
		judged = outcome.judged,
		persisted = outcome.persisted,
		pruned = report.pruned,
		failed_writes = outcome.failed_writes.len(),
		kept = outcome.results.iter().filter(|r| r.add_to_report).count(),
		"Domain search finished."
	);

	Ok(outcome)
}

async fn retrieve_patents(
	cfg: &Config,
	providers: &Providers,
	keywords: &[String],
	disclosure_id: &str,
) -> Result<Vec<Vec<SearchCandidate>>> {
	let queries = strategy::patent_queries(keywords, cfg.search.granted_after.as_deref());
	let mut lists = Vec::with_capacity(queries.len());

	for query in &queries {
		let page = providers.patents.search(query, cfg.search.page_size).await?;

		tracing::debug!(
			disclosure_id,
			domain = "patents",
			keyword = query.label(),
			hits = page.candidates.len(),
			total = page.total(),
			"Patent query returned."
		);

		lists.push(page.candidates);
	}

	Ok(lists)
}

async fn retrieve_papers(
	cfg: &Config,
	providers: &Providers,
	disclosure: &Disclosure,
	keywords: &[String],
) -> Result<Vec<Vec<SearchCandidate>>> {
	let queries = strategy::paper_queries(disclosure, cfg.search.max_paper_queries as usize);
	let thresholds = QualityThresholds::from_config(&cfg.quality);
	let mut lists = Vec::with_capacity(queries.len());

	for query in queries {
		let RefinedSearch { page, attempts, .. } = refine::search_with_refinement(
			providers.papers.as_ref(),
			query,
			keywords,
			thresholds,
			cfg.quality.max_attempts,
			cfg.search.page_size,
			&disclosure.id,
		)
		.await?;

		tracing::debug!(
			disclosure_id = %disclosure.id,
			domain = "papers",
			attempts,
			hits = page.candidates.len(),
			"Literature query settled."
		);

		lists.push(page.candidates);
	}

	Ok(lists)
}

impl crate::PriorArtService {
	/// Runs one domain search against the service's providers and database.
	pub async fn run_search(
		&self,
		disclosure: &Disclosure,
		domain: Domain,
		run_id: Option<Uuid>,
	) -> Result<DomainOutcome> {
		run_domain_search(
			&self.cfg,
			&self.providers,
			&self.db,
			disclosure,
			domain,
			run_id,
			OffsetDateTime::now_utc(),
		)
		.await
	}
}
