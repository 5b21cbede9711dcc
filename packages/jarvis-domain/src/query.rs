use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::whitelist::DomainWhitelist;

/// A search query pinned to the domain it should be run against.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateQuery {
	pub query: String,
	pub domain: String,
}
impl CandidateQuery {
	pub fn new(query: impl Into<String>, domain: impl Into<String>) -> Self {
		Self { query: query.into(), domain: domain.into() }
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilteredQueries {
	pub kept: Vec<CandidateQuery>,
	pub raw_count: usize,
	/// Domains of candidates that were dropped because they are not trusted, in input order.
	pub dropped_domains: Vec<String>,
}

/// Keeps the candidates whose domain is whitelisted, at most `max` of them.
///
/// Dropped candidates are never rewritten or reassigned. Blank queries are dropped, exact
/// duplicates collapse to their first occurrence, and kept domains are reported in canonical
/// form. Applying the filter to its own output returns that output unchanged.
pub fn filter_candidates<I>(
	whitelist: &DomainWhitelist,
	candidates: I,
	max: usize,
) -> FilteredQueries
where
	I: IntoIterator<Item = CandidateQuery>,
{
	let mut out = FilteredQueries::default();
	let mut seen = HashSet::new();

	for candidate in candidates {
		out.raw_count += 1;

		let Some(domain) = whitelist.resolve(&candidate.domain) else {
			out.dropped_domains.push(candidate.domain);

			continue;
		};
		let query = candidate.query.trim();

		if query.is_empty() || out.kept.len() >= max {
			continue;
		}

		let kept = CandidateQuery::new(query, domain);

		if seen.insert(kept.clone()) {
			out.kept.push(kept);
		}
	}

	out
}
