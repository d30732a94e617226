use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// One of the two search contexts, each with its own backend shape, caps, and thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
	Patents,
	Papers,
}
impl Domain {
	pub const ALL: [Domain; 2] = [Domain::Patents, Domain::Papers];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Patents => "patents",
			Self::Papers => "papers",
		}
	}

	/// Upper bound of the relevance score scale the oracle uses for this domain.
	pub fn max_score(self) -> f32 {
		match self {
			Self::Patents => 1.0,
			Self::Papers => 10.0,
		}
	}

	pub fn score_in_range(self, score: f32) -> bool {
		score.is_finite() && (0.0..=self.max_score()).contains(&score)
	}
}
impl fmt::Display for Domain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for Domain {
	type Err = ParseDomainError;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value.trim().to_ascii_lowercase().as_str() {
			"patents" | "patent" => Ok(Self::Patents),
			"papers" | "paper" | "literature" => Ok(Self::Papers),
			other => Err(ParseDomainError(other.to_string())),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDomainError(pub String);
impl fmt::Display for ParseDomainError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Unknown search domain {:?}; expected patents or papers.", self.0)
	}
}
impl std::error::Error for ParseDomainError {}
