use serde::{Deserialize, Serialize};

use crate::Domain;

/// Which query variant produced a hit, and the disclosure keywords that variant carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
	pub query: String,
	pub keywords: Vec<String>,
}

/// One backend hit. Lives only for the duration of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
	pub candidate_id: String,
	pub domain: Domain,
	pub title: String,
	pub summary: Option<String>,
	pub published: Option<String>,
	#[serde(default)]
	pub contributors: Vec<String>,
	pub citation_count: Option<u64>,
	pub reference_count: Option<u64>,
	pub venue: Option<String>,
	pub url: Option<String>,
	#[serde(default)]
	pub provenance: Vec<Provenance>,
}
impl SearchCandidate {
	/// Importance proxy used by the pre-filter and as the ranking tie-breaker.
	pub fn importance(&self) -> Option<u64> {
		self.citation_count
	}

	/// Union of the keywords of every query that surfaced this candidate, first-seen order.
	pub fn matched_keywords(&self) -> Vec<String> {
		let mut out: Vec<String> = Vec::new();

		for provenance in &self.provenance {
			for keyword in &provenance.keywords {
				if !out.iter().any(|seen| seen.eq_ignore_ascii_case(keyword)) {
					out.push(keyword.clone());
				}
			}
		}

		out
	}

	pub fn merge_provenance(&mut self, other: &[Provenance]) {
		for provenance in other {
			if !self.provenance.contains(provenance) {
				self.provenance.push(provenance.clone());
			}
		}
	}
}

/// Result-count envelope. The structured backend fills `total` only; the free-text backend also
/// reports paging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchEnvelope {
	pub total: Option<u64>,
	pub offset: u64,
	pub next: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
	pub candidates: Vec<SearchCandidate>,
	pub envelope: SearchEnvelope,
}
impl SearchPage {
	/// Reported total, or the number of hits actually returned when the backend omits it.
	pub fn total(&self) -> u64 {
		self.envelope.total.unwrap_or(self.candidates.len() as u64)
	}
}
