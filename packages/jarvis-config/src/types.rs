use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub chat: Chat,
	#[serde(default)]
	pub generation: Generation,
	pub search: Search,
	#[serde(default)]
	pub langfuse: Langfuse,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
	/// Browser origins allowed to call the HTTP API, e.g. `http://localhost:3000`.
	#[serde(default)]
	pub cors_allowed_origins: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub llm: ProviderConfig,
}

/// Connection settings for an OpenAI-compatible chat completion endpoint.
///
/// Model, temperature, and token limits are per-call options, so one provider entry serves the
/// decision, query, and generation stages.
#[derive(Clone, Debug, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Chat {
	pub max_message_chars: u32,
}
impl Default for Chat {
	fn default() -> Self {
		Self { max_message_chars: 10_000 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Generation {
	pub model: String,
	pub temperature: f32,
	pub max_tokens: u32,
	pub max_response_chars: u32,
	/// Optional. Replaces the built-in base instructions when set.
	pub system_prompt: Option<String>,
}
impl Default for Generation {
	fn default() -> Self {
		Self {
			model: "gpt-4o".to_string(),
			temperature: 0.7,
			max_tokens: 4_000,
			max_response_chars: 1_000,
			system_prompt: None,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Search {
	pub enabled: bool,
	#[serde(default = "default_max_queries")]
	pub max_queries: u32,
	#[serde(default = "default_decision_stage")]
	pub decision: SearchStage,
	#[serde(default = "default_queries_stage")]
	pub queries: SearchStage,
	pub domains: Vec<SearchDomain>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SearchStage {
	pub model: String,
	pub temperature: f32,
	pub max_tokens: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SearchDomain {
	/// Human-readable label shown to the query model next to the domain.
	pub name: String,
	pub domain: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Langfuse {
	pub enabled: bool,
	pub host: String,
	pub public_key: String,
	pub secret_key: String,
	pub timeout_ms: u64,
	pub environment: Option<String>,
}
impl Default for Langfuse {
	fn default() -> Self {
		Self {
			enabled: false,
			host: "https://cloud.langfuse.com".to_string(),
			public_key: String::new(),
			secret_key: String::new(),
			timeout_ms: 5_000,
			environment: None,
		}
	}
}

fn default_max_queries() -> u32 {
	5
}

fn default_decision_stage() -> SearchStage {
	SearchStage { model: "gpt-4o-mini".to_string(), temperature: 0.0, max_tokens: 200 }
}

fn default_queries_stage() -> SearchStage {
	SearchStage { model: "gpt-4o-mini".to_string(), temperature: 0.2, max_tokens: 600 }
}
