mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Chat, Config, Generation, Langfuse, Postgres, ProviderConfig, Providers, Search, SearchDomain,
	SearchStage, Service, Storage,
};

use std::{collections::HashSet, fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.llm.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.llm.api_key must be non-empty.".to_string(),
		});
	}
	if cfg.providers.llm.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.llm.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.chat.max_message_chars == 0 {
		return Err(Error::Validation {
			message: "chat.max_message_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.generation.max_response_chars == 0 {
		return Err(Error::Validation {
			message: "generation.max_response_chars must be greater than zero.".to_string(),
		});
	}

	validate_stage(
		"generation",
		&cfg.generation.model,
		cfg.generation.temperature,
		cfg.generation.max_tokens,
	)?;
	validate_stage(
		"search.decision",
		&cfg.search.decision.model,
		cfg.search.decision.temperature,
		cfg.search.decision.max_tokens,
	)?;
	validate_stage(
		"search.queries",
		&cfg.search.queries.model,
		cfg.search.queries.temperature,
		cfg.search.queries.max_tokens,
	)?;

	if cfg.search.max_queries == 0 {
		return Err(Error::Validation {
			message: "search.max_queries must be greater than zero.".to_string(),
		});
	}
	if cfg.search.enabled && cfg.search.domains.is_empty() {
		return Err(Error::Validation {
			message: "search.domains must be non-empty when search is enabled.".to_string(),
		});
	}

	let mut hosts = HashSet::new();

	for entry in &cfg.search.domains {
		let domain = entry.domain.as_str();

		if domain.is_empty() {
			return Err(Error::Validation {
				message: "search.domains.domain must be non-empty.".to_string(),
			});
		}

		let bare = !domain.contains("://")
			&& !domain.contains('/')
			&& !domain.contains(char::is_whitespace);
		let Some(host) = normalize_domain(domain).filter(|_| bare) else {
			return Err(Error::Validation {
				message: format!("search.domains.domain must be a bare host, got {domain:?}."),
			});
		};

		if !hosts.insert(host.clone()) {
			return Err(Error::Validation {
				message: format!("search.domains lists {host:?} more than once."),
			});
		}
		if entry.name.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("search.domains.name must be non-empty for {domain:?}."),
			});
		}
	}

	for origin in &cfg.service.cors_allowed_origins {
		let bare = origin.strip_prefix("https://").or_else(|| origin.strip_prefix("http://"));

		if bare.is_none_or(|rest| {
			rest.is_empty() || rest.contains(['/', '*']) || rest.contains(char::is_whitespace)
		}) {
			return Err(Error::Validation {
				message: format!(
					"service.cors_allowed_origins entries must be http(s) origins, got {origin:?}."
				),
			});
		}
	}

	if cfg.langfuse.enabled {
		for (label, value) in [
			("langfuse.host", &cfg.langfuse.host),
			("langfuse.public_key", &cfg.langfuse.public_key),
			("langfuse.secret_key", &cfg.langfuse.secret_key),
		] {
			if value.trim().is_empty() {
				return Err(Error::Validation {
					message: format!("{label} must be non-empty when langfuse is enabled."),
				});
			}
		}

		if cfg.langfuse.timeout_ms == 0 {
			return Err(Error::Validation {
				message: "langfuse.timeout_ms must be greater than zero.".to_string(),
			});
		}
	}

	Ok(())
}

fn validate_stage(label: &str, model: &str, temperature: f32, max_tokens: u32) -> Result<()> {
	if model.trim().is_empty() {
		return Err(Error::Validation { message: format!("{label}.model must be non-empty.") });
	}
	if !temperature.is_finite() {
		return Err(Error::Validation {
			message: format!("{label}.temperature must be a finite number."),
		});
	}
	if !(0.0..=2.0).contains(&temperature) {
		return Err(Error::Validation {
			message: format!("{label}.temperature must be in the range 0.0-2.0."),
		});
	}
	if max_tokens == 0 {
		return Err(Error::Validation {
			message: format!("{label}.max_tokens must be greater than zero."),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.generation.system_prompt.as_deref().map(|prompt| prompt.trim().is_empty()).unwrap_or(false)
	{
		cfg.generation.system_prompt = None;
	}
	if cfg.langfuse.environment.as_deref().map(|env| env.trim().is_empty()).unwrap_or(false) {
		cfg.langfuse.environment = None;
	}

	cfg.providers.llm.api_base = cfg.providers.llm.api_base.trim_end_matches('/').to_string();
	cfg.langfuse.host = cfg.langfuse.host.trim_end_matches('/').to_string();

	for origin in &mut cfg.service.cors_allowed_origins {
		*origin = origin.trim().trim_end_matches('/').to_string();
	}
	for entry in &mut cfg.search.domains {
		entry.domain = entry.domain.trim().to_ascii_lowercase();
		entry.name = entry.name.trim().to_string();
	}
}

/// Reduces a domain-ish string to a bare lowercase host.
///
/// Accepts `Example.com`, `https://www.example.com/path?q=1`, `example.com:443` and
/// `example.com.`, all of which become `example.com`. Returns `None` when nothing host-like
/// remains.
pub fn normalize_domain(raw: &str) -> Option<String> {
	let mut host = raw.trim().to_ascii_lowercase();

	for scheme in ["https://", "http://"] {
		if let Some(rest) = host.strip_prefix(scheme) {
			host = rest.to_string();

			break;
		}
	}

	if let Some(end) = host.find(['/', '?', '#']) {
		host.truncate(end);
	}
	if let Some(colon) = host.rfind(':')
		&& host[colon + 1..].chars().all(|ch| ch.is_ascii_digit())
	{
		host.truncate(colon);
	}

	let host = host.trim_end_matches('.');
	let host = host.strip_prefix("www.").unwrap_or(host);

	if host.is_empty() || host.contains(char::is_whitespace) || host.contains('@') {
		return None;
	}

	Some(host.to_string())
}
