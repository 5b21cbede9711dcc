use std::sync::Arc;

use jarvis_config::{Generation, ProviderConfig};
use jarvis_domain::text;
use jarvis_providers::chat::{ChatTurn, CompletionOptions};

use crate::{
	ChatProvider, ConversationContext, Error, Result, Stage, prompts, trace::RequestTrace,
};

const SPAN_NAME: &str = "llm_generation";

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationOptions {
	pub model: String,
	pub temperature: f32,
	pub max_tokens: u32,
	/// Upper bound on the reply, in grapheme clusters.
	pub max_response_chars: usize,
	pub system_prompt: String,
	/// Extra system lines sent after `system_prompt`.
	pub extra_instructions: Vec<String>,
}
impl GenerationOptions {
	pub fn from_config(cfg: &Generation) -> Self {
		Self {
			model: cfg.model.clone(),
			temperature: cfg.temperature,
			max_tokens: cfg.max_tokens,
			max_response_chars: cfg.max_response_chars as usize,
			system_prompt: cfg
				.system_prompt
				.clone()
				.unwrap_or_else(|| prompts::BASE_SYSTEM_PROMPT.to_string()),
			extra_instructions: Vec::new(),
		}
	}

	pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
		self.extra_instructions.push(instruction.into());

		self
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedText {
	pub text: String,
	pub truncated: bool,
	pub model: String,
}

/// Turns a conversation into a reply. Holds no per-request state and persists nothing.
pub struct ResponseGenerator {
	provider: Arc<dyn ChatProvider>,
	llm: ProviderConfig,
}
impl ResponseGenerator {
	pub fn new(provider: Arc<dyn ChatProvider>, llm: ProviderConfig) -> Self {
		Self { provider, llm }
	}

	pub async fn generate(
		&self,
		trace: &RequestTrace,
		context: &ConversationContext,
		options: &GenerationOptions,
	) -> Result<GeneratedText> {
		let turns = build_turns(context, options);
		let mut span = trace.span(
			SPAN_NAME,
			serde_json::json!({ "model": options.model, "messages": turns }),
		);
		let completion = CompletionOptions {
			model: options.model.clone(),
			temperature: options.temperature,
			max_tokens: options.max_tokens,
			json_mode: false,
		};
		let result = match self.provider.complete(&self.llm, &turns, &completion).await {
			Ok(raw) if raw.trim().is_empty() => Err(Error::Provider {
				message: "Completion returned empty content.".to_string(),
			}),
			Ok(raw) => {
				let (text, truncated) =
					text::truncate_graphemes(raw.trim(), options.max_response_chars);

				Ok(GeneratedText { text, truncated, model: options.model.clone() })
			},
			Err(err) => Err(Error::from(err)),
		};

		match &result {
			Ok(generated) => {
				span.set_metadata("truncated", generated.truncated);
				span.end(serde_json::Value::String(generated.text.clone()));
			},
			Err(err) => span.fail(Stage::LlmGeneration, err),
		}

		result
	}
}

fn build_turns(context: &ConversationContext, options: &GenerationOptions) -> Vec<ChatTurn> {
	let mut turns = Vec::with_capacity(1 + options.extra_instructions.len() + context.len());

	turns.push(ChatTurn::system(options.system_prompt.as_str()));
	turns.extend(options.extra_instructions.iter().map(|line| ChatTurn::system(line.as_str())));
	turns.extend(context.turns());

	turns
}
