//! Batched relevance scoring against the oracle.
//!
//! Each batch is one oracle call. The reply is validated entry by entry: anything that does not
//! name a candidate from the batch, carries a score outside the domain scale, or lacks a decision
//! is dropped with a warning. A reply that cannot be read as a judgment list at all is requested
//! once more and then given up on, so a bad batch costs its own candidates and nothing else.

use std::collections::HashSet;

use serde_json::Value;

use crate::{RelevanceOracle, Result};
use priorart_domain::{Decision, Disclosure, Domain, Judgment, SearchCandidate};

const BATCH_ATTEMPTS: u32 = 2;

/// Judges `candidates` in order, `batch_size` at a time. Only misconfiguration (auth or a rejected
/// request) fails the call; every other problem shrinks the output instead.
pub async fn evaluate(
	oracle: &dyn RelevanceOracle,
	cfg: &priorart_config::Evaluation,
	domain: Domain,
	disclosure: &Disclosure,
	candidates: &[SearchCandidate],
) -> Result<Vec<Judgment>> {
	let batch_size = cfg.batch_size.max(1) as usize;
	let mut out = Vec::with_capacity(candidates.len());

	for (index, batch) in candidates.chunks(batch_size).enumerate() {
		let messages = build_messages(domain, disclosure, batch, cfg.max_abstract_chars as usize);
		let Some(entries) = judge_batch(oracle, &messages, disclosure, domain, index).await? else {
			continue;
		};
		let judged = validate_entries(entries, batch, domain, &disclosure.id);

		for candidate_id in unjudged(batch, &judged) {
			tracing::warn!(
				disclosure_id = %disclosure.id,
				domain = %domain,
				batch = index,
				candidate_id,
				"Oracle returned no usable judgment for candidate."
			);
		}

		tracing::debug!(
			disclosure_id = %disclosure.id,
			domain = %domain,
			batch = index,
			submitted = batch.len(),
			accepted = judged.len(),
			"Oracle batch judged."
		);

		out.extend(judged);
	}

	Ok(out)
}

async fn judge_batch(
	oracle: &dyn RelevanceOracle,
	messages: &[Value],
	disclosure: &Disclosure,
	domain: Domain,
	batch: usize,
) -> Result<Option<Vec<Value>>> {
	for attempt in 1..=BATCH_ATTEMPTS {
		match oracle.judge(messages).await {
			Ok(entries) => return Ok(Some(entries)),
			Err(err) if err.is_fatal() => return Err(err.into()),
			Err(err) => {
				tracing::warn!(
					disclosure_id = %disclosure.id,
					domain = %domain,
					batch,
					attempt,
					error = %err,
					"Oracle batch failed."
				);
			},
		}
	}

	tracing::warn!(
		disclosure_id = %disclosure.id,
		domain = %domain,
		batch,
		"Dropping oracle batch after repeated failures."
	);

	Ok(None)
}

pub fn build_messages(
	domain: Domain,
	disclosure: &Disclosure,
	batch: &[SearchCandidate],
	max_abstract_chars: usize,
) -> Vec<Value> {
	let scale = match domain {
		Domain::Patents => "a number from 0.0 to 1.0",
		Domain::Papers => "a number from 0 to 10",
	};
	let system = format!(
		"You are a patent examiner assessing prior art for an invention disclosure. For every \
		 candidate, judge how closely it anticipates the disclosed invention on technical \
		 substance, not shared vocabulary. Reply with JSON only, shaped as \
		 {{\"judgments\": [{{\"candidate_id\": string, \"score\": number, \"decision\": \
		 \"KEEP\" | \"DROP\", \"rationale\": string, \"matched_keywords\": [string]}}]}}. \
		 The score is {scale}. Return exactly one judgment per candidate and use the \
		 candidate_id values given."
	);
	let candidates: Vec<Value> = batch
		.iter()
		.map(|candidate| {
			serde_json::json!({
				"candidate_id": candidate.candidate_id,
				"title": candidate.title,
				"abstract": candidate
					.summary
					.as_deref()
					.map(|text| truncate_chars(text, max_abstract_chars)),
				"published": candidate.published,
				"citation_count": candidate.citation_count,
			})
		})
		.collect();
	let user = serde_json::json!({
		"domain": domain.as_str(),
		"disclosure": {
			"id": disclosure.id,
			"title": disclosure.title,
			"description": disclosure.description,
			"keywords": disclosure.clean_keywords(),
		},
		"candidates": candidates,
	});

	vec![
		serde_json::json!({ "role": "system", "content": system }),
		serde_json::json!({ "role": "user", "content": user.to_string() }),
	]
}

/// Keeps the well-formed entries that name a candidate of `batch`, first judgment per id.
pub fn validate_entries(
	entries: Vec<Value>,
	batch: &[SearchCandidate],
	domain: Domain,
	disclosure_id: &str,
) -> Vec<Judgment> {
	let known: HashSet<&str> = batch.iter().map(|c| c.candidate_id.as_str()).collect();
	let mut seen: HashSet<String> = HashSet::new();
	let mut out = Vec::with_capacity(entries.len());

	for entry in entries {
		match validate_entry(&entry, domain, &known) {
			Ok(judgment) => {
				if !seen.insert(judgment.candidate_id.clone()) {
					tracing::warn!(
						disclosure_id,
						domain = %domain,
						candidate_id = %judgment.candidate_id,
						"Dropping duplicate judgment."
					);

					continue;
				}

				out.push(judgment);
			},
			Err(reason) => {
				let candidate_id = entry.get("candidate_id").and_then(Value::as_str).unwrap_or("");

				tracing::warn!(
					disclosure_id,
					domain = %domain,
					candidate_id,
					reason,
					"Dropping malformed judgment."
				);
			},
		}
	}

	out
}

/// Ids from `batch` that have no accepted judgment, in batch order.
pub fn unjudged<'a>(batch: &'a [SearchCandidate], judged: &[Judgment]) -> Vec<&'a str> {
	let accepted: HashSet<&str> = judged.iter().map(|j| j.candidate_id.as_str()).collect();

	batch
		.iter()
		.map(|c| c.candidate_id.as_str())
		.filter(|id| !accepted.contains(id))
		.collect()
}

fn validate_entry(
	entry: &Value,
	domain: Domain,
	known: &HashSet<&str>,
) -> Result<Judgment, &'static str> {
	let candidate_id = entry
		.get("candidate_id")
		.and_then(Value::as_str)
		.map(str::trim)
		.filter(|id| !id.is_empty())
		.ok_or("missing candidate_id")?;

	if !known.contains(candidate_id) {
		return Err("unknown candidate_id");
	}

	let score = entry.get("score").and_then(Value::as_f64).ok_or("score is not numeric")? as f32;

	if !domain.score_in_range(score) {
		return Err("score out of range");
	}

	let decision = entry
		.get("decision")
		.and_then(Value::as_str)
		.and_then(Decision::parse)
		.ok_or("missing decision")?;
	let rationale =
		entry.get("rationale").and_then(Value::as_str).unwrap_or_default().trim().to_string();
	let matched_keywords = entry
		.get("matched_keywords")
		.and_then(Value::as_array)
		.map(|items| {
			items.iter().filter_map(Value::as_str).map(|s| s.trim().to_string()).collect()
		})
		.unwrap_or_default();

	Ok(Judgment { candidate_id: candidate_id.to_string(), score, decision, rationale, matched_keywords })
}

fn truncate_chars(text: &str, max: usize) -> String {
	if text.chars().count() <= max {
		return text.to_string();
	}

	let mut out: String = text.chars().take(max).collect();

	out.push_str("...");

	out
}
