use std::{cmp::Ordering, collections::HashMap};

use crate::SearchCandidate;

/// Merges per-query hit lists. The first occurrence of an identifier wins; provenance from later
/// occurrences is folded into it so keyword attribution survives deduplication.
pub fn merge<I>(lists: I) -> Vec<SearchCandidate>
where
	I: IntoIterator<Item = Vec<SearchCandidate>>,
{
	let mut out: Vec<SearchCandidate> = Vec::new();
	let mut index: HashMap<String, usize> = HashMap::new();

	for list in lists {
		for candidate in list {
			let key = candidate.candidate_id.trim().to_string();

			if key.is_empty() {
				continue;
			}

			match index.get(&key) {
				Some(&pos) => out[pos].merge_provenance(&candidate.provenance),
				None => {
					index.insert(key, out.len());
					out.push(candidate);
				},
			}
		}
	}

	out
}

/// Descending importance; candidates without an importance proxy sort last.
pub fn cmp_importance(a: &SearchCandidate, b: &SearchCandidate) -> Ordering {
	match (a.importance(), b.importance()) {
		(Some(left), Some(right)) => right.cmp(&left),
		(Some(_), None) => Ordering::Less,
		(None, Some(_)) => Ordering::Greater,
		(None, None) => Ordering::Equal,
	}
}

/// Keeps the `k` most important candidates, preserving merge order among equals.
pub fn prefilter(mut candidates: Vec<SearchCandidate>, k: usize) -> Vec<SearchCandidate> {
	candidates.sort_by(cmp_importance);
	candidates.truncate(k);

	candidates
}
