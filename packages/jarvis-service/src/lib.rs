pub mod chat;
pub mod context;
pub mod decision;
pub mod generation;
pub mod prompts;
pub mod queries;
pub mod time_serde;
pub mod trace;

mod error;
mod structured;

use std::{future::Future, pin::Pin, sync::Arc};

use uuid::Uuid;

pub use chat::{Branch, ChatOutcome, ChatRequest, HistoryMessage};
pub use context::ConversationContext;
pub use decision::{SearchDecision, SearchDecisionEngine};
pub use error::{ChatFailure, Error, Result, Stage};
pub use generation::{GeneratedText, GenerationOptions, ResponseGenerator};
pub use queries::QueryGenerator;
pub use trace::{RequestTrace, SpanGuard, TraceSink};

use jarvis_config::{Config, ProviderConfig};
use jarvis_domain::whitelist::DomainWhitelist;
use jarvis_providers::chat::{self as provider_chat, ChatTurn, CompletionOptions};
use jarvis_storage::{db::Db, models::ChatMessage, queries as storage_queries};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Chat completion backend shared by the decision, query, and response stages.
pub trait ChatProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		messages: &'a [ChatTurn],
		options: &'a CompletionOptions,
	) -> BoxFuture<'a, jarvis_providers::Result<String>>;
}

pub trait MessageStore
where
	Self: Send + Sync,
{
	/// Persists `message` and returns the stored row.
	fn save<'a>(
		&'a self,
		message: ChatMessage,
	) -> BoxFuture<'a, jarvis_storage::Result<ChatMessage>>;

	/// Every message of the conversation, oldest first.
	fn load_history<'a>(
		&'a self,
		conversation_id: Uuid,
	) -> BoxFuture<'a, jarvis_storage::Result<Vec<ChatMessage>>>;

	fn ping<'a>(&'a self) -> BoxFuture<'a, jarvis_storage::Result<()>>;
}

/// Calls the configured OpenAI-compatible endpoint over HTTP.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpChatProvider;
impl ChatProvider for HttpChatProvider {
	fn complete<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		messages: &'a [ChatTurn],
		options: &'a CompletionOptions,
	) -> BoxFuture<'a, jarvis_providers::Result<String>> {
		Box::pin(provider_chat::complete(cfg, messages, options))
	}
}

#[derive(Clone)]
pub struct PgMessageStore {
	db: Db,
}
impl PgMessageStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}
impl MessageStore for PgMessageStore {
	fn save<'a>(
		&'a self,
		message: ChatMessage,
	) -> BoxFuture<'a, jarvis_storage::Result<ChatMessage>> {
		Box::pin(async move {
			storage_queries::insert_message(&self.db.pool, &message).await?;

			Ok(message)
		})
	}

	fn load_history<'a>(
		&'a self,
		conversation_id: Uuid,
	) -> BoxFuture<'a, jarvis_storage::Result<Vec<ChatMessage>>> {
		Box::pin(storage_queries::list_conversation_messages(&self.db.pool, conversation_id))
	}

	fn ping<'a>(&'a self) -> BoxFuture<'a, jarvis_storage::Result<()>> {
		Box::pin(storage_queries::ping(&self.db.pool))
	}
}

#[derive(Clone)]
pub struct Ports {
	pub provider: Arc<dyn ChatProvider>,
	pub store: Arc<dyn MessageStore>,
	pub trace: Arc<dyn TraceSink>,
}
impl Ports {
	pub fn new(
		provider: Arc<dyn ChatProvider>,
		store: Arc<dyn MessageStore>,
		trace: Arc<dyn TraceSink>,
	) -> Self {
		Self { provider, store, trace }
	}

	/// HTTP provider, Postgres store, and the trace sink selected by `[langfuse]`.
	pub fn with_db(db: Db, langfuse: &jarvis_config::Langfuse) -> Self {
		Self {
			provider: Arc::new(HttpChatProvider),
			store: Arc::new(PgMessageStore::new(db)),
			trace: trace::sink_from_config(langfuse),
		}
	}
}

pub struct JarvisService {
	pub cfg: Config,
	pub ports: Ports,
	whitelist: Arc<DomainWhitelist>,
	decision: SearchDecisionEngine,
	queries: QueryGenerator,
	generator: ResponseGenerator,
	defaults: GenerationOptions,
}
impl JarvisService {
	pub fn new(cfg: Config, db: Db) -> Self {
		let ports = Ports::with_db(db, &cfg.langfuse);

		Self::with_ports(cfg, ports)
	}

	pub fn with_ports(cfg: Config, ports: Ports) -> Self {
		let whitelist = Arc::new(DomainWhitelist::from_config(&cfg.search.domains));
		let llm = &cfg.providers.llm;
		let decision =
			SearchDecisionEngine::new(ports.provider.clone(), llm.clone(), &cfg.search.decision);
		let queries = QueryGenerator::new(
			ports.provider.clone(),
			llm.clone(),
			&cfg.search.queries,
			whitelist.clone(),
			cfg.search.max_queries as usize,
		);
		let generator = ResponseGenerator::new(ports.provider.clone(), llm.clone());
		let defaults = GenerationOptions::from_config(&cfg.generation);

		Self { cfg, ports, whitelist, decision, queries, generator, defaults }
	}

	pub fn whitelist(&self) -> &DomainWhitelist {
		&self.whitelist
	}

	/// Reports whether the message store is reachable.
	pub async fn health(&self) -> Result<()> {
		self.ports.store.ping().await?;

		Ok(())
	}
}
