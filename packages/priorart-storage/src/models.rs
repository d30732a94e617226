use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, Result};
use priorart_domain::{Decision, Domain, Provenance, RankedResult, SearchCandidate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
	Pending,
	Running,
	Done,
	Failed,
}
impl RunStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "PENDING",
			Self::Running => "RUNNING",
			Self::Done => "DONE",
			Self::Failed => "FAILED",
		}
	}

	pub fn parse(value: &str) -> Option<Self> {
		match value {
			"PENDING" => Some(Self::Pending),
			"RUNNING" => Some(Self::Running),
			"DONE" => Some(Self::Done),
			"FAILED" => Some(Self::Failed),
			_ => None,
		}
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Done | Self::Failed)
	}
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SearchRun {
	pub run_id: Uuid,
	pub disclosure_id: String,
	pub domain: String,
	pub disclosure: Value,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub result_count: i32,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
	pub finished_at: Option<OffsetDateTime>,
}
impl SearchRun {
	pub fn status(&self) -> Result<RunStatus> {
		RunStatus::parse(&self.status)
			.ok_or_else(|| Error::Corrupt(format!("Unknown run status {:?}.", self.status)))
	}

	pub fn domain(&self) -> Result<Domain> {
		self.domain.parse().map_err(|_| Error::Corrupt(format!("Unknown domain {:?}.", self.domain)))
	}
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RankedResultRow {
	pub disclosure_id: String,
	pub candidate_id: String,
	pub domain: String,
	pub rank: i32,
	pub title: String,
	pub summary: Option<String>,
	pub published: Option<String>,
	pub contributors: Json<Vec<String>>,
	pub citation_count: Option<i64>,
	pub reference_count: Option<i64>,
	pub venue: Option<String>,
	pub url: Option<String>,
	pub relevance_score: f32,
	pub decision: String,
	pub rationale: String,
	pub matched_keywords: Json<Vec<String>>,
	pub add_to_report: bool,
	pub reviewed_at: Option<OffsetDateTime>,
	pub run_id: Option<Uuid>,
	pub search_timestamp: OffsetDateTime,
}
impl RankedResultRow {
	pub fn into_ranked(self) -> Result<RankedResult> {
		let domain: Domain = self
			.domain
			.parse()
			.map_err(|_| Error::Corrupt(format!("Unknown domain {:?}.", self.domain)))?;
		let decision = Decision::parse(&self.decision)
			.ok_or_else(|| Error::Corrupt(format!("Unknown decision {:?}.", self.decision)))?;
		let matched_keywords = self.matched_keywords.0;

		Ok(RankedResult {
			disclosure_id: self.disclosure_id,
			domain,
			rank: self.rank.max(0) as u32,
			candidate: SearchCandidate {
				candidate_id: self.candidate_id,
				domain,
				title: self.title,
				summary: self.summary,
				published: self.published,
				contributors: self.contributors.0,
				citation_count: self.citation_count.map(|value| value.max(0) as u64),
				reference_count: self.reference_count.map(|value| value.max(0) as u64),
				venue: self.venue,
				url: self.url,
				provenance: vec![Provenance {
					query: String::new(),
					keywords: matched_keywords.clone(),
				}],
			},
			relevance_score: self.relevance_score,
			decision,
			rationale: self.rationale,
			matched_keywords,
			add_to_report: self.add_to_report,
			search_timestamp: self.search_timestamp,
		})
	}
}
