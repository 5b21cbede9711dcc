use std::{sync::Arc, time::Duration};

use serde_json::Value;
use uuid::Uuid;

use jarvis_config::ProviderConfig;
use jarvis_domain::{message::Author, query::CandidateQuery};
use jarvis_providers::chat::{ChatTurn, CompletionOptions};
use jarvis_service::{
	BoxFuture, Branch, ChatFailure, ChatOutcome, ChatProvider, ChatRequest, JarvisService, Ports,
	Stage,
	trace::{CANCELLED, Level},
};
use jarvis_testkit::{
	DECISION_MODEL, GENERATION_MODEL, MemoryStore, QUERY_MODEL, RecordingTraceSink,
	ScriptedProvider,
};

const NO_SEARCH: &str = r#"{"_thoughts": "Arithmetic.", "needs_search": false}"#;
const SEARCH: &str = r#"{"_thoughts": "Release notes change.", "needs_search": true}"#;

/// Never answers, so the request stays parked on its first model call.
struct HangingProvider;
impl ChatProvider for HangingProvider {
	fn complete<'a>(
		&'a self,
		_cfg: &'a ProviderConfig,
		_messages: &'a [ChatTurn],
		_options: &'a CompletionOptions,
	) -> BoxFuture<'a, jarvis_providers::Result<String>> {
		Box::pin(std::future::pending())
	}
}

struct Harness {
	provider: Arc<ScriptedProvider>,
	store: Arc<MemoryStore>,
	sink: Arc<RecordingTraceSink>,
	service: JarvisService,
}
impl Harness {
	fn new(provider: ScriptedProvider) -> Self {
		Self::with_config(provider, jarvis_testkit::test_config())
	}

	fn with_config(provider: ScriptedProvider, cfg: jarvis_config::Config) -> Self {
		let provider = Arc::new(provider);
		let store = Arc::new(MemoryStore::new());
		let sink = Arc::new(RecordingTraceSink::new());
		let ports = Ports::new(provider.clone(), store.clone(), sink.clone());
		let service = JarvisService::with_ports(cfg, ports);

		Self { provider, store, sink, service }
	}

	async fn ask(&self, message: &str) -> Result<ChatOutcome, ChatFailure> {
		self.service
			.handle(ChatRequest {
				message: message.to_string(),
				conversation_id: None,
				context: None,
			})
			.await
	}

	fn assert_spans_balanced(&self) {
		let opened = self.sink.opened().iter().map(|span| span.span_id).collect::<Vec<_>>();
		let mut closed = self.sink.closed().iter().map(|span| span.span_id).collect::<Vec<_>>();

		closed.sort();

		let mut expected = opened.clone();

		expected.sort();

		assert_eq!(expected, closed, "Every opened span must close exactly once.");
	}
}

#[tokio::test]
async fn direct_answer_without_search() {
	let harness = Harness::new(
		ScriptedProvider::new().reply(DECISION_MODEL, NO_SEARCH).reply(GENERATION_MODEL, "4"),
	);
	let outcome = harness.ask("What is 2+2?").await.expect("Expected a reply.");

	assert_eq!(outcome.text, "4");
	assert!(!outcome.search_used);
	assert!(outcome.queries_used.is_empty());
	assert_eq!(outcome.branch, Branch::Direct);
	assert!(outcome.persisted);
	assert!(outcome.message_id.is_some());
	assert_eq!(harness.provider.calls_for(QUERY_MODEL), 0);
	assert_eq!(
		harness.sink.opened_names(),
		vec![
			"save_user_message",
			"load_history",
			"search_decision",
			"llm_generation",
			"save_assistant_message",
		]
	);
	assert_eq!(harness.sink.flush_count(), 1);
	harness.assert_spans_balanced();
}

#[tokio::test]
async fn search_keeps_only_whitelisted_queries() {
	let harness = Harness::new(
		ScriptedProvider::new()
			.reply(DECISION_MODEL, SEARCH)
			.reply(
				QUERY_MODEL,
				r#"{"_thoughts": "Official release notes.", "queries": [
					{"q": "next.js release notes", "url": "nextjs.org"},
					{"q": "next.js release notes", "url": "evil.example.com"}
				]}"#,
			)
			.reply(GENERATION_MODEL, "Next.js shipped a new release."),
	);
	let outcome = harness.ask("Latest Next.js release notes").await.expect("Expected a reply.");

	assert!(outcome.search_used);
	assert_eq!(outcome.branch, Branch::Search);
	assert_eq!(
		outcome.queries_used,
		vec![CandidateQuery::new("next.js release notes", "nextjs.org")]
	);

	let generation = harness
		.provider
		.calls()
		.into_iter()
		.find(|call| call.model == GENERATION_MODEL)
		.expect("Expected a generation call.");

	assert!(generation.messages.iter().any(|turn| turn.content.contains("(site: nextjs.org)")));
	assert!(!generation.messages.iter().any(|turn| turn.content.contains("evil.example.com")));

	let span = harness.sink.closed_span("generate_queries").expect("Expected a query span.");

	assert_eq!(span.metadata["raw_count"], 2);
	assert_eq!(span.metadata["kept_count"], 1);
	assert_eq!(span.metadata["dropped_domains"], serde_json::json!(["evil.example.com"]));
	assert_eq!(span.metadata["thoughts"], "Official release notes.");
	harness.assert_spans_balanced();
}

#[tokio::test]
async fn search_with_no_trusted_candidates_still_answers() {
	let harness = Harness::new(
		ScriptedProvider::new()
			.reply(DECISION_MODEL, SEARCH)
			.reply(
				QUERY_MODEL,
				r#"{"_thoughts": "x", "queries": [{"q": "latest", "url": "evil.example.com"}]}"#,
			)
			.reply(GENERATION_MODEL, "I am not sure this is current."),
	);
	let outcome = harness.ask("What happened today?").await.expect("Expected a reply.");

	assert!(outcome.search_used);
	assert!(outcome.queries_used.is_empty());
	assert_eq!(outcome.text, "I am not sure this is current.");
	assert_eq!(harness.provider.calls_for(GENERATION_MODEL), 1);
}

#[tokio::test]
async fn user_message_write_failure_makes_no_provider_calls() {
	let harness = Harness::new(ScriptedProvider::new());

	harness.store.fail_user_saves(true);

	let failure = harness.ask("Hello").await.expect_err("Expected a failure.");

	assert_eq!(failure.kind(), "PERSISTENCE_ERROR");
	assert_eq!(failure.stage, Stage::SaveUserMessage);
	assert_eq!(harness.provider.call_count(), 0);
	assert_eq!(harness.sink.flush_count(), 1);
	harness.assert_spans_balanced();

	let traces = harness.sink.traces();

	assert_eq!(traces.len(), 1);
	assert_eq!(traces[0].metadata["status"], "failed");
	assert_eq!(traces[0].metadata["failed_stage"], "save_user_message");
}

#[tokio::test]
async fn history_failure_aborts_before_provider_calls() {
	let harness = Harness::new(ScriptedProvider::new());

	harness.store.fail_history(true);

	let failure = harness.ask("Hello").await.expect_err("Expected a failure.");

	assert_eq!(failure.stage, Stage::LoadHistory);
	assert_eq!(failure.kind(), "PERSISTENCE_ERROR");
	assert_eq!(harness.provider.call_count(), 0);
	harness.assert_spans_balanced();
}

#[tokio::test]
async fn decision_failure_falls_back_to_direct_generation() {
	for decision in [Err("upstream 500".to_string()), Ok("1".to_string())] {
		let provider = ScriptedProvider::new().reply(GENERATION_MODEL, "Paris.");

		provider.push(DECISION_MODEL, decision);

		let harness = Harness::new(provider);
		let outcome = harness.ask("Capital of France?").await.expect("Expected a reply.");

		assert_eq!(outcome.branch, Branch::DirectFallback);
		assert!(!outcome.search_used);
		assert_eq!(outcome.text, "Paris.");
		assert_eq!(harness.provider.calls_for(QUERY_MODEL), 0);

		let span = harness.sink.closed_span("search_decision").expect("Expected a decision span.");

		assert_eq!(span.level, Level::Error);

		let traces = harness.sink.traces();

		assert_eq!(traces[0].metadata["degraded_stage"], "search_decision");
		assert_eq!(traces[0].metadata["status"], "ok");
		harness.assert_spans_balanced();
	}
}

#[tokio::test]
async fn decision_with_extra_fields_is_malformed() {
	let harness = Harness::new(
		ScriptedProvider::new()
			.reply(DECISION_MODEL, r#"{"_thoughts": "x", "needs_search": true, "confidence": 0.9}"#)
			.reply(GENERATION_MODEL, "Answer."),
	);
	let outcome = harness.ask("Question").await.expect("Expected a reply.");

	assert_eq!(outcome.branch, Branch::DirectFallback);

	let span = harness.sink.closed_span("search_decision").expect("Expected a decision span.");

	assert_eq!(span.metadata["error_kind"], "MALFORMED_RESPONSE");
}

#[tokio::test]
async fn fenced_decision_is_accepted() {
	let harness = Harness::new(
		ScriptedProvider::new()
			.reply(DECISION_MODEL, format!("```json\n{NO_SEARCH}\n```"))
			.reply(GENERATION_MODEL, "Fine."),
	);
	let outcome = harness.ask("How are you?").await.expect("Expected a reply.");

	assert_eq!(outcome.branch, Branch::Direct);
}

#[tokio::test]
async fn query_generation_failure_surfaces() {
	let harness = Harness::new(
		ScriptedProvider::new().reply(DECISION_MODEL, SEARCH).reply(QUERY_MODEL, "not json"),
	);
	let failure = harness.ask("Latest news").await.expect_err("Expected a failure.");

	assert_eq!(failure.stage, Stage::GenerateQueries);
	assert_eq!(failure.kind(), "MALFORMED_RESPONSE");
	assert_eq!(harness.provider.calls_for(GENERATION_MODEL), 0);
	harness.assert_spans_balanced();
}

#[tokio::test]
async fn generation_failure_is_reported_without_placeholder() {
	let harness = Harness::new(
		ScriptedProvider::new()
			.reply(DECISION_MODEL, NO_SEARCH)
			.fail(GENERATION_MODEL, "rate limited"),
	);
	let failure = harness.ask("Hi").await.expect_err("Expected a failure.");

	assert_eq!(failure.stage, Stage::LlmGeneration);
	assert_eq!(failure.kind(), "PROVIDER_ERROR");

	let stored = harness.store.messages();

	assert_eq!(stored.len(), 1);
	assert_eq!(stored[0].author, Author::User);

	let span = harness.sink.closed_span("llm_generation").expect("Expected a generation span.");

	assert_eq!(span.level, Level::Error);
	assert_eq!(span.metadata["stage"], "llm_generation");
	harness.assert_spans_balanced();
}

#[tokio::test]
async fn assistant_write_failure_is_a_degraded_success() {
	let harness = Harness::new(
		ScriptedProvider::new().reply(DECISION_MODEL, NO_SEARCH).reply(GENERATION_MODEL, "4"),
	);

	harness.store.fail_assistant_saves(true);

	let outcome = harness.ask("What is 2+2?").await.expect("Expected a degraded reply.");

	assert!(!outcome.persisted);
	assert!(outcome.message_id.is_none());
	assert_eq!(outcome.text, "4");

	let traces = harness.sink.traces();

	assert_eq!(traces[0].metadata["status"], "degraded");
	assert_eq!(traces[0].metadata["degraded_stage"], "save_assistant_message");
	harness.assert_spans_balanced();
}

#[tokio::test]
async fn flush_failure_is_not_surfaced() {
	let harness = Harness::new(
		ScriptedProvider::new().reply(DECISION_MODEL, NO_SEARCH).reply(GENERATION_MODEL, "ok"),
	);

	harness.sink.fail_flush(true);

	assert!(harness.ask("Ping").await.is_ok());
	assert_eq!(harness.sink.flush_count(), 1);
	assert!(harness.ask("").await.is_err());
	assert_eq!(harness.sink.flush_count(), 2);
}

#[tokio::test]
async fn invalid_requests_touch_nothing() {
	let mut cfg = jarvis_testkit::test_config();

	cfg.chat.max_message_chars = 5;

	let harness = Harness::with_config(ScriptedProvider::new(), cfg);

	for message in ["", "   ", "far too long"] {
		let failure = harness.ask(message).await.expect_err("Expected a validation failure.");

		assert_eq!(failure.stage, Stage::Validate);
		assert_eq!(failure.kind(), "VALIDATION_ERROR");
	}

	let failure = harness
		.service
		.handle(ChatRequest {
			message: "hi".to_string(),
			conversation_id: None,
			context: Some(serde_json::json!(["not", "an", "object"])),
		})
		.await
		.expect_err("Expected a validation failure.");

	assert_eq!(failure.stage, Stage::Validate);
	assert_eq!(harness.store.save_attempts(), 0);
	assert_eq!(harness.provider.call_count(), 0);
	assert!(harness.sink.opened().is_empty());
	assert_eq!(harness.sink.flush_count(), 4);
}

#[tokio::test]
async fn disabled_search_skips_the_decision() {
	let mut cfg = jarvis_testkit::test_config();

	cfg.search.enabled = false;

	let harness =
		Harness::with_config(ScriptedProvider::new().reply(GENERATION_MODEL, "Hello."), cfg);
	let outcome = harness.ask("Hi there").await.expect("Expected a reply.");

	assert_eq!(outcome.branch, Branch::Disabled);
	assert_eq!(harness.provider.call_count(), 1);
}

#[tokio::test]
async fn follow_up_sends_full_history_and_keeps_order() {
	let harness = Harness::new(
		ScriptedProvider::new()
			.reply(DECISION_MODEL, NO_SEARCH)
			.reply(GENERATION_MODEL, "4")
			.reply(DECISION_MODEL, NO_SEARCH)
			.reply(GENERATION_MODEL, "8"),
	);
	let first = harness.ask("What is 2+2?").await.expect("Expected a reply.");
	let second = harness
		.service
		.handle(ChatRequest {
			message: "Double it.".to_string(),
			conversation_id: Some(first.conversation_id),
			context: Some(serde_json::json!({ "client": "test" })),
		})
		.await
		.expect("Expected a reply.");

	assert_eq!(second.conversation_id, first.conversation_id);

	let last_generation = harness
		.provider
		.calls()
		.into_iter()
		.filter(|call| call.model == GENERATION_MODEL)
		.last()
		.expect("Expected generation calls.");
	let history = last_generation
		.messages
		.iter()
		.skip(1)
		.map(|turn| turn.content.as_str())
		.collect::<Vec<_>>();

	assert_eq!(history, vec!["What is 2+2?", "4", "Double it."]);

	let stored = harness.service.history(first.conversation_id).await.expect("history failed");

	assert_eq!(stored.len(), 4);

	for pair in stored.windows(2) {
		assert!(pair[0].created_at <= pair[1].created_at);
	}

	let user = stored.iter().find(|msg| msg.content == "Double it.").expect("Missing user message.");
	let reply = stored.iter().find(|msg| msg.content == "8").expect("Missing reply.");

	assert_eq!(user.metadata, Some(serde_json::json!({ "client": "test" })));
	assert!(user.created_at <= reply.created_at);

	let metadata = reply.metadata.as_ref().expect("Missing reply metadata.");

	assert_eq!(metadata["branch"], "direct");
	assert_eq!(metadata["user_message_id"], second.user_message_id.to_string());
	assert_eq!(metadata["trace_id"], second.trace_id.to_string());
	assert_eq!(metadata["model"], GENERATION_MODEL);
	assert_eq!(metadata["queries"], Value::Array(Vec::new()));
}

#[tokio::test]
async fn long_replies_are_truncated() {
	let mut cfg = jarvis_testkit::test_config();

	cfg.generation.max_response_chars = 10;

	let harness = Harness::with_config(
		ScriptedProvider::new()
			.reply(DECISION_MODEL, NO_SEARCH)
			.reply(GENERATION_MODEL, "abcdefghijklmnop"),
		cfg,
	);
	let outcome = harness.ask("Spell the alphabet").await.expect("Expected a reply.");

	assert_eq!(outcome.text, "abcdefg...");
	assert!(outcome.truncated);

	let span = harness.sink.closed_span("llm_generation").expect("Expected a generation span.");

	assert_eq!(span.metadata["truncated"], true);
}

#[tokio::test]
async fn dropped_request_closes_spans_as_cancelled() {
	let store = Arc::new(MemoryStore::new());
	let sink = Arc::new(RecordingTraceSink::new());
	let ports = Ports::new(Arc::new(HangingProvider), store.clone(), sink.clone());
	let service = JarvisService::with_ports(jarvis_testkit::test_config(), ports);
	let request = ChatRequest {
		message: "Hello".to_string(),
		conversation_id: Some(Uuid::new_v4()),
		context: None,
	};
	let result = tokio::time::timeout(Duration::from_millis(50), service.handle(request)).await;

	assert!(result.is_err(), "The hanging provider must keep the request pending.");
	assert_eq!(store.messages().len(), 1, "The user message stays stored.");
	assert_eq!(sink.flush_count(), 0);

	let decision = sink.closed_span("search_decision").expect("Expected a decision span.");

	assert_eq!(decision.level, Level::Error);
	assert_eq!(decision.status_message.as_deref(), Some(CANCELLED));
	assert_eq!(sink.opened().len(), sink.closed().len());

	let traces = sink.traces();

	assert_eq!(traces.len(), 1);
	assert_eq!(traces[0].metadata["status"], CANCELLED);
}
