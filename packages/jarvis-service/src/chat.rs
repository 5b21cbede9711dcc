use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use jarvis_domain::{message::Author, query::CandidateQuery};
use jarvis_storage::models::ChatMessage;

use crate::{
	ChatFailure, ConversationContext, Error, JarvisService, Result, Stage, prompts,
	trace::{self, RequestTrace, SpanGuard},
};

const TRACE_NAME: &str = "chat_conversation";
const TRACE_TAGS: &[&str] = &["chat", "conversation"];

#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
	pub message: String,
	#[serde(default)]
	pub conversation_id: Option<Uuid>,
	/// Free-form client context, stored as the user message's metadata.
	#[serde(default)]
	pub context: Option<Value>,
}

/// Path a request took through the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
	Direct,
	Search,
	/// The search decision failed and the reply was generated without search.
	DirectFallback,
	/// Search is turned off in configuration.
	Disabled,
}
impl Branch {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Direct => "direct",
			Self::Search => "search",
			Self::DirectFallback => "direct_fallback",
			Self::Disabled => "disabled",
		}
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct ChatOutcome {
	pub trace_id: Uuid,
	pub conversation_id: Uuid,
	pub user_message_id: Uuid,
	/// `None` when the reply could not be stored.
	pub message_id: Option<Uuid>,
	pub text: String,
	pub search_used: bool,
	pub queries_used: Vec<CandidateQuery>,
	pub branch: Branch,
	pub persisted: bool,
	pub truncated: bool,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, Serialize)]
pub struct HistoryMessage {
	pub message_id: Uuid,
	pub conversation_id: Uuid,
	pub author: Author,
	pub content: String,
	pub metadata: Option<Value>,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
}
impl From<ChatMessage> for HistoryMessage {
	fn from(message: ChatMessage) -> Self {
		Self {
			message_id: message.message_id,
			conversation_id: message.conversation_id,
			author: message.author,
			content: message.content,
			metadata: message.metadata,
			created_at: message.created_at,
		}
	}
}

impl JarvisService {
	/// Answers one chat message.
	///
	/// The user message is stored before any model call and the reply is stored before
	/// returning. The request trace is flushed exactly once, whatever the outcome.
	pub async fn handle(&self, req: ChatRequest) -> Result<ChatOutcome, ChatFailure> {
		let mut trace = RequestTrace::start(
			self.ports.trace.clone(),
			TRACE_NAME,
			serde_json::json!({
				"message": req.message,
				"conversation_id": req.conversation_id,
			}),
			TRACE_TAGS,
		);
		let trace_id = trace.id();
		let result = self.run(&mut trace, req).await;

		match &result {
			Ok(outcome) => {
				trace.set_metadata("status", if outcome.persisted { "ok" } else { "degraded" });
				trace.set_metadata("conversation_id", outcome.conversation_id.to_string());
				trace.set_metadata("branch", outcome.branch.as_str());
				trace.finish(serde_json::json!({
					"text": outcome.text,
					"branch": outcome.branch,
					"search_used": outcome.search_used,
					"persisted": outcome.persisted,
				}));

				tracing::info!(
					trace_id = %trace_id,
					conversation_id = %outcome.conversation_id,
					branch = outcome.branch.as_str(),
					persisted = outcome.persisted,
					truncated = outcome.truncated,
					"Chat request completed."
				);
			},
			Err(failure) => {
				trace.set_metadata("status", "failed");
				trace.set_metadata("failed_stage", failure.stage.as_str());
				trace.set_metadata("error_kind", failure.kind());
				trace.finish(serde_json::json!({ "error": failure.error.to_string() }));

				tracing::warn!(
					trace_id = %trace_id,
					stage = failure.stage.as_str(),
					error_kind = failure.kind(),
					error = %failure.error,
					"Chat request failed."
				);
			},
		}

		trace::flush(self.ports.trace.as_ref(), trace_id).await;

		result
	}

	/// Stored messages of one conversation, oldest first.
	pub async fn history(&self, conversation_id: Uuid) -> Result<Vec<HistoryMessage>> {
		let messages = self.ports.store.load_history(conversation_id).await?;

		Ok(messages.into_iter().map(HistoryMessage::from).collect())
	}

	async fn run(
		&self,
		trace: &mut RequestTrace,
		req: ChatRequest,
	) -> Result<ChatOutcome, ChatFailure> {
		let trace_id = trace.id();
		let fail = |stage: Stage, error: Error| ChatFailure { trace_id, stage, error };
		let ChatRequest { message, conversation_id, context } = req;

		self.validate(&message, context.as_ref()).map_err(|err| fail(Stage::Validate, err))?;

		let conversation_id = conversation_id.unwrap_or_else(Uuid::new_v4);
		let user_message = ChatMessage {
			message_id: Uuid::new_v4(),
			conversation_id,
			author: Author::User,
			content: message,
			metadata: context,
			created_at: OffsetDateTime::now_utc(),
		};
		let span = trace.span(
			"save_user_message",
			serde_json::json!({
				"conversation_id": conversation_id,
				"message_id": user_message.message_id,
			}),
		);
		let saved = self.ports.store.save(user_message).await.map_err(Error::from);
		let user_message = settle(span, Stage::SaveUserMessage, saved, |row| {
			serde_json::json!({ "message_id": row.message_id })
		})
		.map_err(|err| fail(Stage::SaveUserMessage, err))?;
		let span = trace
			.span("load_history", serde_json::json!({ "conversation_id": conversation_id }));
		let history = self.ports.store.load_history(conversation_id).await.map_err(Error::from);
		let history = settle(span, Stage::LoadHistory, history, |rows| {
			serde_json::json!({ "turns": rows.len() })
		})
		.map_err(|err| fail(Stage::LoadHistory, err))?;
		let context = ConversationContext::from_history(history, &user_message);
		let (branch, queries) = self
			.route(trace, &user_message.content, &context)
			.await
			.map_err(|err| fail(Stage::GenerateQueries, err))?;
		let mut options = self.defaults.clone();

		if branch == Branch::Search {
			options.extra_instructions.push(prompts::search_instructions(&queries));
		}

		let generated = self
			.generator
			.generate(trace, &context, &options)
			.await
			.map_err(|err| fail(Stage::LlmGeneration, err))?;
		let search_used = branch == Branch::Search;
		let reply = ChatMessage {
			message_id: Uuid::new_v4(),
			conversation_id,
			author: Author::Assistant,
			content: generated.text.clone(),
			metadata: Some(serde_json::json!({
				"branch": branch,
				"search_used": search_used,
				"queries": queries,
				"user_message_id": user_message.message_id,
				"trace_id": trace_id,
				"truncated": generated.truncated,
				"model": generated.model,
			})),
			created_at: reply_created_at(user_message.created_at, OffsetDateTime::now_utc()),
		};
		let unsaved_at = reply.created_at;
		let span = trace.span(
			"save_assistant_message",
			serde_json::json!({
				"conversation_id": conversation_id,
				"message_id": reply.message_id,
			}),
		);
		let saved = self.ports.store.save(reply).await.map_err(Error::from);
		let (message_id, created_at, persisted) =
			match settle(span, Stage::SaveAssistantMessage, saved, |row| {
				serde_json::json!({ "message_id": row.message_id })
			}) {
				Ok(row) => (Some(row.message_id), row.created_at, true),
				Err(err) => {
					tracing::error!(
						trace_id = %trace_id,
						conversation_id = %conversation_id,
						error = %err,
						"Failed to store the assistant reply. Returning it unsaved."
					);
					trace.mark_degraded(Stage::SaveAssistantMessage, &err);

					(None, unsaved_at, false)
				},
			};

		Ok(ChatOutcome {
			trace_id,
			conversation_id,
			user_message_id: user_message.message_id,
			message_id,
			text: generated.text,
			search_used,
			queries_used: queries,
			branch,
			persisted,
			truncated: generated.truncated,
			created_at,
		})
	}

	/// Picks the branch and, on the search branch, the filtered queries.
	///
	/// A failed decision falls back to direct generation. Query generation errors are returned.
	async fn route(
		&self,
		trace: &mut RequestTrace,
		message: &str,
		context: &ConversationContext,
	) -> Result<(Branch, Vec<CandidateQuery>)> {
		if !self.cfg.search.enabled {
			return Ok((Branch::Disabled, Vec::new()));
		}

		let decision = self.decision.decide(trace, message, context).await;

		match decision {
			Ok(decision) if decision.needs_search => {
				let queries = self.queries.generate(trace, message, context).await?;

				Ok((Branch::Search, queries))
			},
			Ok(_) => Ok((Branch::Direct, Vec::new())),
			Err(err) => {
				tracing::warn!(
					trace_id = %trace.id(),
					stage = Stage::SearchDecision.as_str(),
					error_kind = err.kind(),
					error = %err,
					"Search decision failed. Answering without search."
				);
				trace.mark_degraded(Stage::SearchDecision, &err);

				Ok((Branch::DirectFallback, Vec::new()))
			},
		}
	}

	fn validate(&self, message: &str, context: Option<&Value>) -> Result<()> {
		if message.trim().is_empty() {
			return Err(Error::Validation { message: "message must be non-empty.".to_string() });
		}

		let max = self.cfg.chat.max_message_chars as usize;

		if message.chars().count() > max {
			return Err(Error::Validation {
				message: format!("message must be at most {max} characters."),
			});
		}
		if context.is_some_and(|value| !value.is_object()) {
			return Err(Error::Validation {
				message: "context must be a JSON object.".to_string(),
			});
		}

		Ok(())
	}
}

/// Timestamp for a reply, at least one microsecond after its question.
///
/// The gap survives Postgres' microsecond precision, so history ordering never ties.
fn reply_created_at(question: OffsetDateTime, now: OffsetDateTime) -> OffsetDateTime {
	now.max(question + Duration::microseconds(1))
}

fn settle<T>(
	span: SpanGuard,
	stage: Stage,
	result: Result<T>,
	output: impl FnOnce(&T) -> Value,
) -> Result<T> {
	match &result {
		Ok(value) => span.end(output(value)),
		Err(err) => span.fail(stage, err),
	}

	result
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reply_sorts_after_question_when_clock_steps_back() {
		let question = OffsetDateTime::from_unix_timestamp(1_800_000_000).expect("timestamp");

		for now in
			[question - Duration::seconds(5), question, question + Duration::nanoseconds(300)]
		{
			let reply = reply_created_at(question, now);

			assert!(reply > question);
			assert!(reply - question >= Duration::microseconds(1));
		}

		let later = question + Duration::seconds(2);

		assert_eq!(reply_created_at(question, later), later);
	}
}
