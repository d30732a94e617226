use crate::{Result, RetrievalBackend};
use priorart_domain::{
	Assessment, PaperQuery, QualityThresholds, Refinement, RefinementStep, SearchPage,
};

pub struct RefinedSearch {
	pub page: SearchPage,
	pub attempts: u32,
	pub history: Vec<(String, Assessment)>,
}

/// Runs one literature query through the refine-and-retry loop. Quality problems never fail the
/// search; backend errors do.
pub async fn search_with_refinement(
	backend: &dyn RetrievalBackend<PaperQuery>,
	query: PaperQuery,
	keywords: &[String],
	thresholds: QualityThresholds,
	max_attempts: u32,
	limit: u32,
	disclosure_id: &str,
) -> Result<RefinedSearch> {
	let mut refinement = Refinement::new(query, max_attempts);

	loop {
		let page = backend.search(refinement.query(), limit).await?;
		let assessment = thresholds.assess(&page);

		tracing::info!(
			disclosure_id,
			domain = "papers",
			query = %refinement.query().text(),
			total = page.total(),
			assessment = assessment.as_str(),
			"Literature query assessed."
		);

		if refinement.record(page, assessment, keywords) == RefinementStep::Finished {
			break;
		}
	}

	let attempts = refinement.attempts();
	let history = refinement.history().to_vec();

	Ok(RefinedSearch { page: refinement.into_page(), attempts, history })
}
