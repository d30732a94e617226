use serde::{Deserialize, Serialize};

/// The invention write-up under review. Produced upstream and read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disclosure {
	pub id: String,
	pub keywords: Vec<String>,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub description: String,
}
impl Disclosure {
	/// Keywords with surrounding whitespace removed, blanks and case-insensitive repeats dropped.
	pub fn clean_keywords(&self) -> Vec<String> {
		let mut out: Vec<String> = Vec::with_capacity(self.keywords.len());

		for keyword in &self.keywords {
			let trimmed = keyword.split_whitespace().collect::<Vec<_>>().join(" ");

			if trimmed.is_empty() || out.iter().any(|seen| seen.eq_ignore_ascii_case(&trimmed)) {
				continue;
			}

			out.push(trimmed);
		}

		out
	}
}
