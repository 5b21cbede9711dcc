use std::sync::Arc;

use serde::Deserialize;

use jarvis_config::{ProviderConfig, SearchStage};
use jarvis_domain::{
	query::{self, CandidateQuery, FilteredQueries},
	whitelist::DomainWhitelist,
};
use jarvis_providers::chat::{ChatTurn, CompletionOptions};

use crate::{
	ChatProvider, ConversationContext, Error, Result, Stage, prompts, structured,
	trace::RequestTrace,
};

const SPAN_NAME: &str = "generate_queries";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QueryReply {
	#[serde(rename = "_thoughts")]
	thoughts: String,
	queries: Vec<QueryItem>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QueryItem {
	q: String,
	url: String,
}

/// Asks the model for search queries and keeps only those pinned to a whitelisted domain.
pub struct QueryGenerator {
	provider: Arc<dyn ChatProvider>,
	llm: ProviderConfig,
	options: CompletionOptions,
	whitelist: Arc<DomainWhitelist>,
	max_queries: usize,
}
impl QueryGenerator {
	pub fn new(
		provider: Arc<dyn ChatProvider>,
		llm: ProviderConfig,
		stage: &SearchStage,
		whitelist: Arc<DomainWhitelist>,
		max_queries: usize,
	) -> Self {
		let options = CompletionOptions {
			model: stage.model.clone(),
			temperature: stage.temperature,
			max_tokens: stage.max_tokens,
			json_mode: true,
		};

		Self { provider, llm, options, whitelist, max_queries }
	}

	/// Returns the filtered candidates. An empty result is not an error.
	pub async fn generate(
		&self,
		trace: &RequestTrace,
		message: &str,
		context: &ConversationContext,
	) -> Result<Vec<CandidateQuery>> {
		let mut span = trace.span(
			SPAN_NAME,
			serde_json::json!({ "message": message, "context": context.summary() }),
		);

		span.set_metadata("model", self.options.model.as_str());

		match self.request(message, context).await {
			Ok((filtered, thoughts)) => {
				span.set_metadata("raw_count", filtered.raw_count);
				span.set_metadata("kept_count", filtered.kept.len());
				span.set_metadata("dropped_domains", filtered.dropped_domains.clone());
				span.set_metadata("thoughts", thoughts);

				if !filtered.dropped_domains.is_empty() {
					tracing::info!(
						trace_id = %trace.id(),
						dropped = filtered.dropped_domains.len(),
						kept = filtered.kept.len(),
						"Dropped queries outside the domain whitelist."
					);
				}

				span.end(serde_json::json!({ "queries": filtered.kept }));

				Ok(filtered.kept)
			},
			Err(err) => {
				span.fail(Stage::GenerateQueries, &err);

				Err(err)
			},
		}
	}

	async fn request(
		&self,
		message: &str,
		context: &ConversationContext,
	) -> Result<(FilteredQueries, String)> {
		if message.trim().is_empty() {
			return Err(Error::Validation {
				message: "Query generation requires a non-empty message.".to_string(),
			});
		}

		let recent = context.recent_transcript();
		let turns = [
			ChatTurn::system(prompts::query_generation(&self.whitelist, recent.as_deref())),
			ChatTurn::user(message),
		];
		let raw = self.provider.complete(&self.llm, &turns, &self.options).await?;
		let reply: QueryReply = structured::decode(&raw, "Query generation")?;
		let candidates =
			reply.queries.into_iter().map(|item| CandidateQuery::new(item.q, item.url));
		let filtered = query::filter_candidates(&self.whitelist, candidates, self.max_queries);

		Ok((filtered, reply.thoughts))
	}
}
