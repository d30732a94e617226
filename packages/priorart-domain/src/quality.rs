use serde::{Deserialize, Serialize};

use crate::{PaperQuery, SearchPage, strategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
	TooBroad,
	TooNarrow,
	Acceptable,
}
impl Assessment {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::TooBroad => "too_broad",
			Self::TooNarrow => "too_narrow",
			Self::Acceptable => "acceptable",
		}
	}
}

#[derive(Debug, Clone, Copy)]
pub struct QualityThresholds {
	pub too_broad_total: u64,
	pub too_narrow_total: u64,
}
impl QualityThresholds {
	pub fn from_config(cfg: &priorart_config::Quality) -> Self {
		Self { too_broad_total: cfg.too_broad_total, too_narrow_total: cfg.too_narrow_total }
	}

	pub fn assess(&self, page: &SearchPage) -> Assessment {
		let total = page.total();

		if total > self.too_broad_total {
			Assessment::TooBroad
		} else if total <= self.too_narrow_total {
			Assessment::TooNarrow
		} else {
			Assessment::Acceptable
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementStep {
	/// Run `Refinement::query` again; it has been revised.
	Retry,
	Finished,
}

/// Bounded refine-and-retry loop for one literature query.
///
/// Every recorded page counts as one attempt. The loop finishes on the first acceptable page,
/// when the attempt cap is hit, or when the strategist has no further revision; whichever page is
/// kept at that point is handed on, possibly empty.
#[derive(Debug, Clone)]
pub struct Refinement {
	query: PaperQuery,
	attempts: u32,
	max_attempts: u32,
	kept: Option<SearchPage>,
	history: Vec<(String, Assessment)>,
}
impl Refinement {
	pub fn new(query: PaperQuery, max_attempts: u32) -> Self {
		Self { query, attempts: 0, max_attempts: max_attempts.max(1), kept: None, history: Vec::new() }
	}

	pub fn query(&self) -> &PaperQuery {
		&self.query
	}

	pub fn attempts(&self) -> u32 {
		self.attempts
	}

	/// Query texts tried so far with their classification.
	pub fn history(&self) -> &[(String, Assessment)] {
		&self.history
	}

	pub fn record(
		&mut self,
		page: SearchPage,
		assessment: Assessment,
		keywords: &[String],
	) -> RefinementStep {
		self.attempts += 1;
		self.history.push((self.query.text(), assessment));

		let keep = !page.candidates.is_empty()
			|| self.kept.as_ref().map(|kept| kept.candidates.is_empty()).unwrap_or(true);

		if keep {
			self.kept = Some(page);
		}
		if assessment == Assessment::Acceptable || self.attempts >= self.max_attempts {
			return RefinementStep::Finished;
		}

		match strategy::refine_paper_query(&self.query, assessment, keywords) {
			Some(next) => {
				self.query = next;

				RefinementStep::Retry
			},
			None => RefinementStep::Finished,
		}
	}

	/// Latest non-empty page, or an empty page when every attempt came back empty.
	pub fn into_page(self) -> SearchPage {
		self.kept.unwrap_or_default()
	}
}
