//! In-memory stand-ins for the service ports.

use std::{
	collections::{HashMap, VecDeque},
	sync::{
		Mutex, MutexGuard,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
};

use uuid::Uuid;

use jarvis_config::ProviderConfig;
use jarvis_domain::message::Author;
use jarvis_providers::chat::{ChatTurn, CompletionOptions};
use jarvis_service::{
	BoxFuture, ChatProvider, MessageStore,
	trace::{SpanClose, SpanOpen, TraceRecord, TraceSink},
};
use jarvis_storage::models::ChatMessage;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|err| err.into_inner())
}

#[derive(Clone, Debug)]
pub struct RecordedCall {
	pub model: String,
	pub messages: Vec<ChatTurn>,
	pub json_mode: bool,
}

/// Replays queued replies per model name and records every call.
///
/// A call for a model with nothing queued fails with a provider error.
#[derive(Default)]
pub struct ScriptedProvider {
	replies: Mutex<HashMap<String, VecDeque<Result<String, String>>>>,
	calls: Mutex<Vec<RecordedCall>>,
	count: AtomicUsize,
}
impl ScriptedProvider {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn reply(self, model: &str, content: impl Into<String>) -> Self {
		self.push(model, Ok(content.into()));

		self
	}

	pub fn fail(self, model: &str, message: impl Into<String>) -> Self {
		self.push(model, Err(message.into()));

		self
	}

	pub fn push(&self, model: &str, reply: Result<String, String>) {
		lock(&self.replies).entry(model.to_string()).or_default().push_back(reply);
	}

	pub fn call_count(&self) -> usize {
		self.count.load(Ordering::SeqCst)
	}

	pub fn calls_for(&self, model: &str) -> usize {
		lock(&self.calls).iter().filter(|call| call.model == model).count()
	}

	pub fn calls(&self) -> Vec<RecordedCall> {
		lock(&self.calls).clone()
	}
}
impl ChatProvider for ScriptedProvider {
	fn complete<'a>(
		&'a self,
		_cfg: &'a ProviderConfig,
		messages: &'a [ChatTurn],
		options: &'a CompletionOptions,
	) -> BoxFuture<'a, jarvis_providers::Result<String>> {
		self.count.fetch_add(1, Ordering::SeqCst);
		lock(&self.calls).push(RecordedCall {
			model: options.model.clone(),
			messages: messages.to_vec(),
			json_mode: options.json_mode,
		});

		let reply = lock(&self.replies).get_mut(&options.model).and_then(VecDeque::pop_front);
		let result = match reply {
			Some(Ok(content)) => Ok(content),
			Some(Err(message)) => Err(jarvis_providers::Error::InvalidResponse { message }),
			None => Err(jarvis_providers::Error::InvalidResponse {
				message: format!("No scripted reply for model {:?}.", options.model),
			}),
		};

		Box::pin(async move { result })
	}
}

/// Message store backed by a vector, with switches to make each operation fail.
#[derive(Default)]
pub struct MemoryStore {
	messages: Mutex<Vec<ChatMessage>>,
	saves: AtomicUsize,
	fail_user_saves: AtomicBool,
	fail_assistant_saves: AtomicBool,
	fail_history: AtomicBool,
	fail_ping: AtomicBool,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn fail_user_saves(&self, fail: bool) {
		self.fail_user_saves.store(fail, Ordering::SeqCst);
	}

	pub fn fail_assistant_saves(&self, fail: bool) {
		self.fail_assistant_saves.store(fail, Ordering::SeqCst);
	}

	pub fn fail_history(&self, fail: bool) {
		self.fail_history.store(fail, Ordering::SeqCst);
	}

	pub fn fail_ping(&self, fail: bool) {
		self.fail_ping.store(fail, Ordering::SeqCst);
	}

	/// Save attempts, including failed ones.
	pub fn save_attempts(&self) -> usize {
		self.saves.load(Ordering::SeqCst)
	}

	pub fn messages(&self) -> Vec<ChatMessage> {
		lock(&self.messages).clone()
	}

	pub fn insert(&self, message: ChatMessage) {
		lock(&self.messages).push(message);
	}
}
impl MessageStore for MemoryStore {
	fn save<'a>(
		&'a self,
		message: ChatMessage,
	) -> BoxFuture<'a, jarvis_storage::Result<ChatMessage>> {
		self.saves.fetch_add(1, Ordering::SeqCst);

		let fail = match message.author {
			Author::User => self.fail_user_saves.load(Ordering::SeqCst),
			Author::Assistant => self.fail_assistant_saves.load(Ordering::SeqCst),
		};
		let result = if fail {
			Err(jarvis_storage::Error::Sqlx(sqlx::Error::PoolTimedOut))
		} else {
			lock(&self.messages).push(message.clone());

			Ok(message)
		};

		Box::pin(async move { result })
	}

	fn load_history<'a>(
		&'a self,
		conversation_id: Uuid,
	) -> BoxFuture<'a, jarvis_storage::Result<Vec<ChatMessage>>> {
		let result = if self.fail_history.load(Ordering::SeqCst) {
			Err(jarvis_storage::Error::Sqlx(sqlx::Error::PoolTimedOut))
		} else {
			let mut rows = lock(&self.messages)
				.iter()
				.filter(|message| message.conversation_id == conversation_id)
				.cloned()
				.collect::<Vec<_>>();

			rows.sort_by_key(|message| (message.created_at, message.message_id));

			Ok(rows)
		};

		Box::pin(async move { result })
	}

	fn ping<'a>(&'a self) -> BoxFuture<'a, jarvis_storage::Result<()>> {
		let result = if self.fail_ping.load(Ordering::SeqCst) {
			Err(jarvis_storage::Error::Sqlx(sqlx::Error::PoolTimedOut))
		} else {
			Ok(())
		};

		Box::pin(async move { result })
	}
}

/// Trace sink that keeps every event in memory.
#[derive(Default)]
pub struct RecordingTraceSink {
	opened: Mutex<Vec<SpanOpen>>,
	closed: Mutex<Vec<SpanClose>>,
	traces: Mutex<Vec<TraceRecord>>,
	flushes: AtomicUsize,
	fail_flush: AtomicBool,
}
impl RecordingTraceSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn fail_flush(&self, fail: bool) {
		self.fail_flush.store(fail, Ordering::SeqCst);
	}

	pub fn flush_count(&self) -> usize {
		self.flushes.load(Ordering::SeqCst)
	}

	pub fn opened(&self) -> Vec<SpanOpen> {
		lock(&self.opened).clone()
	}

	pub fn closed(&self) -> Vec<SpanClose> {
		lock(&self.closed).clone()
	}

	pub fn traces(&self) -> Vec<TraceRecord> {
		lock(&self.traces).clone()
	}

	pub fn opened_names(&self) -> Vec<&'static str> {
		lock(&self.opened).iter().map(|span| span.name).collect()
	}

	/// The closing event of the first span called `name`, if any.
	pub fn closed_span(&self, name: &str) -> Option<SpanClose> {
		lock(&self.closed).iter().find(|span| span.name == name).cloned()
	}
}
impl TraceSink for RecordingTraceSink {
	fn open_span(&self, span: SpanOpen) {
		lock(&self.opened).push(span);
	}

	fn close_span(&self, span: SpanClose) {
		lock(&self.closed).push(span);
	}

	fn record_trace(&self, trace: TraceRecord) {
		lock(&self.traces).push(trace);
	}

	fn flush<'a>(&'a self) -> BoxFuture<'a, jarvis_providers::Result<()>> {
		self.flushes.fetch_add(1, Ordering::SeqCst);

		let result = if self.fail_flush.load(Ordering::SeqCst) {
			Err(jarvis_providers::Error::InvalidResponse {
				message: "Scripted flush failure.".to_string(),
			})
		} else {
			Ok(())
		};

		Box::pin(async move { result })
	}
}
