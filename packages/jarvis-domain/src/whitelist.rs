use std::collections::HashSet;

pub use jarvis_config::normalize_domain;

use jarvis_config::SearchDomain;

/// Trusted domains that generated search queries may target.
///
/// Built once at startup and never mutated. Membership is an exact match on the normalized host,
/// so `docs.python.org` being trusted does not make `python.org` or `evil.docs.python.org` trusted.
#[derive(Clone, Debug, Default)]
pub struct DomainWhitelist {
	entries: Vec<WhitelistEntry>,
	hosts: HashSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WhitelistEntry {
	pub name: String,
	pub domain: String,
}

impl DomainWhitelist {
	pub fn new<I, N, D>(entries: I) -> Self
	where
		I: IntoIterator<Item = (N, D)>,
		N: Into<String>,
		D: AsRef<str>,
	{
		let mut whitelist = Self::default();

		for (name, domain) in entries {
			let Some(host) = normalize_domain(domain.as_ref()) else {
				continue;
			};

			if whitelist.hosts.insert(host.clone()) {
				whitelist.entries.push(WhitelistEntry { name: name.into(), domain: host });
			}
		}

		whitelist
	}

	pub fn from_config(domains: &[SearchDomain]) -> Self {
		Self::new(domains.iter().map(|entry| (entry.name.clone(), entry.domain.as_str())))
	}

	pub fn is_allowed(&self, domain: &str) -> bool {
		normalize_domain(domain).map(|host| self.hosts.contains(&host)).unwrap_or(false)
	}

	/// Returns the canonical whitelisted host for `domain`, if it is trusted.
	pub fn resolve(&self, domain: &str) -> Option<&str> {
		let host = normalize_domain(domain)?;

		self.hosts.get(&host).map(String::as_str)
	}

	pub fn entries(&self) -> &[WhitelistEntry] {
		&self.entries
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
