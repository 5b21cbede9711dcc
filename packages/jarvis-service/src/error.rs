use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	Validation { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Malformed model response: {message}")]
	MalformedResponse { message: String },
	#[error("Persistence error: {message}")]
	Persistence { message: String },
}
impl Error {
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Validation { .. } => "VALIDATION_ERROR",
			Self::Provider { .. } => "PROVIDER_ERROR",
			Self::MalformedResponse { .. } => "MALFORMED_RESPONSE",
			Self::Persistence { .. } => "PERSISTENCE_ERROR",
		}
	}
}

impl From<jarvis_providers::Error> for Error {
	fn from(err: jarvis_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<jarvis_storage::Error> for Error {
	fn from(err: jarvis_storage::Error) -> Self {
		Self::Persistence { message: err.to_string() }
	}
}

/// Pipeline step a request was in when something went wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Validate,
	SaveUserMessage,
	LoadHistory,
	SearchDecision,
	GenerateQueries,
	LlmGeneration,
	SaveAssistantMessage,
}
impl Stage {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Validate => "validate",
			Self::SaveUserMessage => "save_user_message",
			Self::LoadHistory => "load_history",
			Self::SearchDecision => "search_decision",
			Self::GenerateQueries => "generate_queries",
			Self::LlmGeneration => "llm_generation",
			Self::SaveAssistantMessage => "save_assistant_message",
		}
	}
}
impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A request that ended without a reply.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {error}")]
pub struct ChatFailure {
	pub trace_id: Uuid,
	pub stage: Stage,
	#[source]
	pub error: Error,
}
impl ChatFailure {
	pub fn kind(&self) -> &'static str {
		self.error.kind()
	}
}
