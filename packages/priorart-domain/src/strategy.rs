//! Turns a disclosure's keywords into query variants for each search domain.
//!
//! Patents get one structured query per keyword, with phrases matched as a unit. Papers get a
//! handful of free-text reformulations covering different facets of the invention, plus the
//! refinement rules the quality loop applies when a reformulation returns too much or too little.

use serde::{Deserialize, Serialize};

use crate::{Assessment, Disclosure, FieldOp, Predicate};

pub const PATENT_TEXT_FIELDS: [&str; 2] = ["patent_title", "patent_abstract"];
pub const PATENT_DATE_FIELD: &str = "patent_date";

const CORE_TERMS: usize = 3;
const TAIL_TERMS: usize = 3;
const CONTEXT_TERMS: usize = 6;
const MIN_PAPER_QUERIES: usize = 3;
const STOPWORDS: &[&str] = &[
	"a", "an", "and", "apparatus", "are", "as", "at", "based", "by", "device", "for", "from",
	"improved", "in", "into", "is", "method", "methods", "novel", "of", "on", "or", "system",
	"systems", "that", "the", "this", "to", "using", "via", "with",
];

#[derive(Debug, Clone, PartialEq)]
pub struct PatentQuery {
	pub keyword: String,
	pub predicate: Predicate,
}
impl PatentQuery {
	pub fn label(&self) -> &str {
		&self.keyword
	}

	pub fn is_phrase(&self) -> bool {
		is_phrase(&self.keyword)
	}
}

/// Free-text literature query. `exact` wraps the whole term list in quotes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperQuery {
	pub facet: String,
	pub terms: Vec<String>,
	pub exact: bool,
	/// Disclosure keywords carried by `terms`, used for keyword attribution.
	pub keywords: Vec<String>,
}
impl PaperQuery {
	fn new(facet: &str, terms: Vec<String>, keywords: &[String]) -> Self {
		let carried = carried_keywords(&terms, keywords);

		Self { facet: facet.to_string(), terms, exact: false, keywords: carried }
	}

	pub fn text(&self) -> String {
		if self.exact {
			return format!("\"{}\"", self.terms.join(" "));
		}

		self.terms
			.iter()
			.map(|term| if is_phrase(term) { format!("\"{term}\"") } else { term.clone() })
			.collect::<Vec<_>>()
			.join(" ")
	}
}

/// One query per distinct keyword. Multi-word keywords use phrase matching so the backend does
/// not split them into independent tokens.
pub fn patent_queries(keywords: &[String], granted_after: Option<&str>) -> Vec<PatentQuery> {
	let mut out: Vec<PatentQuery> = Vec::new();

	for keyword in keywords {
		let keyword = keyword.split_whitespace().collect::<Vec<_>>().join(" ");

		if keyword.is_empty() || out.iter().any(|q| q.keyword.eq_ignore_ascii_case(&keyword)) {
			continue;
		}

		let op = if is_phrase(&keyword) { FieldOp::TextPhrase } else { FieldOp::TextAny };
		let text_match = Predicate::Or(
			PATENT_TEXT_FIELDS
				.iter()
				.map(|field| Predicate::field(op, *field, keyword.as_str()))
				.collect(),
		);
		let predicate = match granted_after {
			Some(date) => Predicate::And(vec![
				text_match,
				Predicate::field(FieldOp::Gte, PATENT_DATE_FIELD, date),
			]),
			None => text_match,
		};

		out.push(PatentQuery { keyword, predicate });
	}

	out
}

/// A small set of strategically distinct reformulations, capped at `max_queries`.
pub fn paper_queries(disclosure: &Disclosure, max_queries: usize) -> Vec<PaperQuery> {
	let keywords = disclosure.clean_keywords();

	if keywords.is_empty() || max_queries == 0 {
		return Vec::new();
	}

	let mut candidates: Vec<PaperQuery> = Vec::new();

	candidates.push(PaperQuery::new(
		"core",
		keywords.iter().take(CORE_TERMS).cloned().collect(),
		&keywords,
	));

	if keywords.len() > CORE_TERMS {
		let mut terms = vec![keywords[0].clone()];

		terms.extend(keywords.iter().skip(CORE_TERMS).take(TAIL_TERMS).cloned());
		candidates.push(PaperQuery::new("tail", terms, &keywords));
	} else if keywords.len() > 1 {
		candidates.push(PaperQuery::new("tail", keywords[1..].to_vec(), &keywords));
	}

	let title_terms = context_terms(&disclosure.title);

	if !title_terms.is_empty() {
		candidates.push(PaperQuery::new("title", title_terms, &keywords));
	}

	if let Some(phrase) = keywords.iter().find(|keyword| is_phrase(keyword)) {
		let mut query = PaperQuery::new("phrase", vec![phrase.clone()], &keywords);

		query.exact = true;
		candidates.push(query);
	}

	let first_sentence = disclosure.description.split(['.', ';', '\n']).next().unwrap_or_default();
	let description_terms = context_terms(first_sentence);

	if !description_terms.is_empty() {
		candidates.push(PaperQuery::new("description", description_terms, &keywords));
	}

	for keyword in &keywords {
		candidates.push(PaperQuery::new("single", vec![keyword.clone()], &keywords));
	}

	let mut out: Vec<PaperQuery> = Vec::new();

	for query in candidates {
		if out.len() >= max_queries {
			break;
		}

		let is_filler = query.facet == "single";

		if is_filler && out.len() >= MIN_PAPER_QUERIES {
			break;
		}

		let text = query.text();

		if out.iter().any(|seen| seen.text().eq_ignore_ascii_case(&text)) {
			continue;
		}

		out.push(query);
	}

	out
}

/// Revises a query after the quality assessor rejected its result set. `None` when there is
/// nothing left to try in the requested direction.
pub fn refine_paper_query(
	query: &PaperQuery,
	assessment: Assessment,
	keywords: &[String],
) -> Option<PaperQuery> {
	let mut next = query.clone();

	match assessment {
		Assessment::Acceptable => return None,
		Assessment::TooBroad => {
			let unused = keywords.iter().find(|keyword| {
				!query.terms.iter().any(|term| term.eq_ignore_ascii_case(keyword))
			});

			if let Some(keyword) = unused {
				next.terms.push(keyword.clone());
				next.exact = false;
			} else if !query.exact && !query.terms.is_empty() {
				next.exact = true;
			} else {
				return None;
			}
		},
		Assessment::TooNarrow =>
			if query.exact {
				next.exact = false;
			} else if query.terms.len() > 1 {
				next.terms.pop();
			} else {
				return None;
			},
	}

	if next.text() == query.text() {
		return None;
	}

	next.keywords = carried_keywords(&next.terms, keywords);

	Some(next)
}

fn is_phrase(value: &str) -> bool {
	value.split_whitespace().nth(1).is_some()
}

fn carried_keywords(terms: &[String], keywords: &[String]) -> Vec<String> {
	keywords
		.iter()
		.filter(|keyword| {
			terms.iter().any(|term| {
				term.eq_ignore_ascii_case(keyword)
					|| (!is_phrase(keyword)
						&& term.split_whitespace().any(|word| word.eq_ignore_ascii_case(keyword)))
			})
		})
		.cloned()
		.collect()
}

fn context_terms(text: &str) -> Vec<String> {
	let mut out: Vec<String> = Vec::new();

	for raw in text.split(|c: char| !c.is_alphanumeric() && c != '-') {
		let word = raw.trim_matches('-');

		if word.len() < 3 || STOPWORDS.contains(&word.to_ascii_lowercase().as_str()) {
			continue;
		}
		if out.iter().any(|seen| seen.eq_ignore_ascii_case(word)) {
			continue;
		}

		out.push(word.to_string());

		if out.len() >= CONTEXT_TERMS {
			break;
		}
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	fn disclosure(keywords: &[&str], title: &str, description: &str) -> Disclosure {
		Disclosure {
			id: "DISC-042".to_string(),
			keywords: keywords.iter().map(|k| k.to_string()).collect(),
			title: title.to_string(),
			description: description.to_string(),
		}
	}

	fn strings(values: &[&str]) -> Vec<String> {
		values.iter().map(|v| v.to_string()).collect()
	}

	#[test]
	fn patent_queries_follow_keyword_order() {
		let queries = patent_queries(&strings(&["stent", "biliary", "deployment"]), None);
		let labels: Vec<_> = queries.iter().map(PatentQuery::label).collect();

		assert_eq!(labels, vec!["stent", "biliary", "deployment"]);
		assert_eq!(
			queries[0].predicate.to_json(),
			serde_json::json!({
				"_or": [
					{ "_text_any": { "patent_title": "stent" } },
					{ "_text_any": { "patent_abstract": "stent" } }
				]
			})
		);
	}

	#[test]
	fn patent_phrases_are_matched_as_units() {
		let queries = patent_queries(&strings(&["drug  eluting stent"]), Some("2015-01-01"));

		assert_eq!(queries.len(), 1);
		assert!(queries[0].is_phrase());
		assert_eq!(
			queries[0].predicate.to_json(),
			serde_json::json!({
				"_and": [
					{ "_or": [
						{ "_text_phrase": { "patent_title": "drug eluting stent" } },
						{ "_text_phrase": { "patent_abstract": "drug eluting stent" } }
					] },
					{ "_gte": { "patent_date": "2015-01-01" } }
				]
			})
		);
	}

	#[test]
	fn patent_queries_skip_blank_and_repeated_keywords() {
		let queries = patent_queries(&strings(&["Stent", " ", "stent", "valve"]), None);

		assert_eq!(queries.len(), 2);
	}

	#[test]
	fn empty_keywords_produce_no_queries() {
		assert!(patent_queries(&[], None).is_empty());
		assert!(paper_queries(&disclosure(&[], "A title", "A description."), 4).is_empty());
	}

	#[test]
	fn paper_queries_cover_distinct_facets() {
		let d = disclosure(
			&["biliary stent", "deployment", "self-expanding", "nitinol", "endoscopy"],
			"Self-expanding biliary stent with controlled deployment",
			"A nitinol stent that expands inside the bile duct. Further details follow.",
		);
		let queries = paper_queries(&d, 5);
		let facets: Vec<_> = queries.iter().map(|q| q.facet.as_str()).collect();

		assert_eq!(facets, vec!["core", "tail", "title", "phrase", "description"]);
		assert_eq!(queries[0].text(), "\"biliary stent\" deployment self-expanding");
		assert_eq!(queries[1].terms, strings(&["biliary stent", "nitinol", "endoscopy"]));
		assert_eq!(queries[3].text(), "\"biliary stent\"");
		assert!(queries[2].keywords.contains(&"deployment".to_string()));
	}

	#[test]
	fn paper_queries_respect_the_cap() {
		let d = disclosure(
			&["stent", "biliary", "deployment", "nitinol"],
			"Biliary stent delivery",
			"Stent delivery for bile ducts.",
		);

		assert_eq!(paper_queries(&d, 3).len(), 3);
	}

	#[test]
	fn sparse_disclosures_are_padded_with_single_keywords() {
		let d = disclosure(&["machine learning", "triage"], "", "");
		let queries = paper_queries(&d, 5);
		let texts: Vec<_> = queries.iter().map(PaperQuery::text).collect();

		assert_eq!(texts, vec!["\"machine learning\" triage", "triage", "\"machine learning\""]);
	}

	#[test]
	fn narrowing_adds_unused_keywords_then_quotes() {
		let keywords = strings(&["machine learning", "radiology"]);
		let query = PaperQuery::new("single", strings(&["machine learning"]), &keywords);
		let narrower =
			refine_paper_query(&query, Assessment::TooBroad, &keywords).expect("refinement");

		assert_eq!(narrower.terms, keywords);
		assert_eq!(narrower.keywords, keywords);

		let quoted =
			refine_paper_query(&narrower, Assessment::TooBroad, &keywords).expect("refinement");

		assert!(quoted.exact);
		assert_eq!(quoted.text(), "\"machine learning radiology\"");
		assert!(refine_paper_query(&quoted, Assessment::TooBroad, &keywords).is_none());
	}

	#[test]
	fn broadening_unquotes_then_drops_terms() {
		let keywords = strings(&["stent", "biliary"]);
		let mut query = PaperQuery::new("core", keywords.clone(), &keywords);

		query.exact = true;

		let unquoted =
			refine_paper_query(&query, Assessment::TooNarrow, &keywords).expect("refinement");

		assert!(!unquoted.exact);

		let shorter =
			refine_paper_query(&unquoted, Assessment::TooNarrow, &keywords).expect("refinement");

		assert_eq!(shorter.terms, strings(&["stent"]));
		assert_eq!(shorter.keywords, strings(&["stent"]));
		assert!(refine_paper_query(&shorter, Assessment::TooNarrow, &keywords).is_none());
		assert!(refine_paper_query(&shorter, Assessment::Acceptable, &keywords).is_none());
	}

	#[test]
	fn refinements_that_do_not_change_the_text_are_skipped() {
		let keywords = strings(&["machine learning"]);
		let query = PaperQuery::new("core", keywords.clone(), &keywords);

		assert!(refine_paper_query(&query, Assessment::TooBroad, &keywords).is_none());
	}
}
