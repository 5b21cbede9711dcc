use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use jarvis_config::{ProviderConfig, SearchStage};
use jarvis_providers::chat::{ChatTurn, CompletionOptions};

use crate::{
	ChatProvider, ConversationContext, Error, Result, Stage, prompts, structured,
	trace::RequestTrace,
};

const SPAN_NAME: &str = "search_decision";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchDecision {
	pub needs_search: bool,
	pub thoughts: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DecisionReply {
	#[serde(rename = "_thoughts")]
	thoughts: String,
	needs_search: bool,
}

/// Classifies whether the latest user message needs fresh web information.
pub struct SearchDecisionEngine {
	provider: Arc<dyn ChatProvider>,
	llm: ProviderConfig,
	options: CompletionOptions,
}
impl SearchDecisionEngine {
	pub fn new(provider: Arc<dyn ChatProvider>, llm: ProviderConfig, stage: &SearchStage) -> Self {
		let options = CompletionOptions {
			model: stage.model.clone(),
			temperature: stage.temperature,
			max_tokens: stage.max_tokens,
			json_mode: true,
		};

		Self { provider, llm, options }
	}

	pub fn model(&self) -> &str {
		&self.options.model
	}

	/// Runs the classification inside one `search_decision` span.
	///
	/// Provider and decoding failures are returned as they are. Falling back is up to the caller.
	pub async fn decide(
		&self,
		trace: &RequestTrace,
		message: &str,
		context: &ConversationContext,
	) -> Result<SearchDecision> {
		let mut span = trace.span(
			SPAN_NAME,
			serde_json::json!({ "message": message, "context": context.summary() }),
		);

		span.set_metadata("model", self.options.model.as_str());

		let result = self.classify(message, context).await;

		match &result {
			Ok(decision) => span.end(decision_output(decision)),
			Err(err) => span.fail(Stage::SearchDecision, err),
		}

		result
	}

	async fn classify(&self, message: &str, context: &ConversationContext) -> Result<SearchDecision> {
		if message.trim().is_empty() {
			return Err(Error::Validation {
				message: "Search decision requires a non-empty message.".to_string(),
			});
		}

		let recent = context.recent_transcript();
		let turns = [
			ChatTurn::system(prompts::search_decision(recent.as_deref())),
			ChatTurn::user(message),
		];
		let raw = self.provider.complete(&self.llm, &turns, &self.options).await?;
		let reply: DecisionReply = structured::decode(&raw, "Search decision")?;
		let thoughts = reply.thoughts.trim();

		Ok(SearchDecision {
			needs_search: reply.needs_search,
			thoughts: (!thoughts.is_empty()).then(|| thoughts.to_string()),
		})
	}
}

fn decision_output(decision: &SearchDecision) -> Value {
	serde_json::json!({
		"needs_search": decision.needs_search,
		"thoughts": decision.thoughts,
	})
}
