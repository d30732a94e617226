use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Domain, SearchCandidate, reduce};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
	Keep,
	Drop,
}
impl Decision {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Keep => "KEEP",
			Self::Drop => "DROP",
		}
	}

	pub fn parse(value: &str) -> Option<Self> {
		match value.trim().to_ascii_uppercase().as_str() {
			"KEEP" | "INCLUDE" | "YES" | "TRUE" => Some(Self::Keep),
			"DROP" | "EXCLUDE" | "NO" | "FALSE" => Some(Self::Drop),
			_ => None,
		}
	}
}

/// The oracle's verdict for one candidate, after schema validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
	pub candidate_id: String,
	pub score: f32,
	pub decision: Decision,
	pub rationale: String,
	#[serde(default)]
	pub matched_keywords: Vec<String>,
}

/// Cap and keep threshold for one domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainPolicy {
	pub domain: Domain,
	pub cap: usize,
	pub keep_threshold: f32,
}
impl DomainPolicy {
	pub fn from_config(domain: Domain, cfg: &priorart_config::Selection) -> Self {
		match domain {
			Domain::Patents => Self {
				domain,
				cap: cfg.patents.cap as usize,
				keep_threshold: cfg.patents.keep_threshold,
			},
			Domain::Papers =>
				Self { domain, cap: cfg.papers.cap as usize, keep_threshold: cfg.papers.keep_threshold },
		}
	}

	/// The score is the authoritative gate. Patents additionally need the oracle to agree; for
	/// papers the oracle's flag is advisory only.
	pub fn decide(&self, judgment: &Judgment) -> Decision {
		let meets = judgment.score >= self.keep_threshold;
		let keep = match self.domain {
			Domain::Patents => meets && judgment.decision == Decision::Keep,
			Domain::Papers => meets,
		};

		if keep { Decision::Keep } else { Decision::Drop }
	}
}

/// A scored, capped output record, persisted under `(disclosure_id, candidate_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
	pub disclosure_id: String,
	pub domain: Domain,
	pub rank: u32,
	pub candidate: SearchCandidate,
	pub relevance_score: f32,
	pub decision: Decision,
	pub rationale: String,
	pub matched_keywords: Vec<String>,
	pub add_to_report: bool,
	#[serde(with = "time::serde::rfc3339")]
	pub search_timestamp: OffsetDateTime,
}
impl RankedResult {
	pub fn candidate_id(&self) -> &str {
		&self.candidate.candidate_id
	}
}

/// Ranks judged candidates by score, breaks ties by importance then identifier, and truncates to
/// the domain cap.
pub fn select(
	disclosure_id: &str,
	judged: Vec<(SearchCandidate, Judgment)>,
	policy: &DomainPolicy,
	now: OffsetDateTime,
) -> Vec<RankedResult> {
	let mut judged = judged;

	judged.sort_by(|(a, ja), (b, jb)| {
		jb.score
			.partial_cmp(&ja.score)
			.unwrap_or(Ordering::Equal)
			.then_with(|| reduce::cmp_importance(a, b))
			.then_with(|| a.candidate_id.cmp(&b.candidate_id))
	});
	judged.truncate(policy.cap);

	judged
		.into_iter()
		.enumerate()
		.map(|(idx, (candidate, judgment))| {
			let decision = policy.decide(&judgment);
			let matched_keywords = if judgment.matched_keywords.is_empty() {
				candidate.matched_keywords()
			} else {
				judgment.matched_keywords.clone()
			};

			RankedResult {
				disclosure_id: disclosure_id.to_string(),
				domain: policy.domain,
				rank: idx as u32 + 1,
				candidate,
				relevance_score: judgment.score,
				decision,
				rationale: judgment.rationale,
				matched_keywords,
				add_to_report: decision == Decision::Keep,
				search_timestamp: now,
			}
		})
		.collect()
}
