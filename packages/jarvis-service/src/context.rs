use serde_json::Value;
use uuid::Uuid;

use jarvis_domain::{message::Author, text};
use jarvis_providers::chat::ChatTurn;
use jarvis_storage::models::ChatMessage;

const SUMMARY_TURNS: usize = 4;
const SUMMARY_TURN_CHARS: usize = 200;

/// Chronological view of one conversation, ending with the message being answered.
#[derive(Clone, Debug)]
pub struct ConversationContext {
	conversation_id: Uuid,
	messages: Vec<ChatMessage>,
}
impl ConversationContext {
	pub fn new(conversation_id: Uuid, messages: Vec<ChatMessage>) -> Self {
		Self { conversation_id, messages }
	}

	/// Builds the context from stored history, making sure `latest` is its final entry.
	///
	/// Concurrent writers on one conversation may interleave, so `latest` is appended when the
	/// store did not return it and moved to the end when it did.
	pub fn from_history(history: Vec<ChatMessage>, latest: &ChatMessage) -> Self {
		let mut messages: Vec<ChatMessage> =
			history.into_iter().filter(|msg| msg.message_id != latest.message_id).collect();

		messages.push(latest.clone());

		Self { conversation_id: latest.conversation_id, messages }
	}

	pub fn conversation_id(&self) -> Uuid {
		self.conversation_id
	}

	pub fn messages(&self) -> &[ChatMessage] {
		&self.messages
	}

	pub fn len(&self) -> usize {
		self.messages.len()
	}

	pub fn is_empty(&self) -> bool {
		self.messages.is_empty()
	}

	/// Every message before the one being answered.
	pub fn prior(&self) -> &[ChatMessage] {
		match self.messages.split_last() {
			Some((_, prior)) => prior,
			None => &[],
		}
	}

	pub fn turns(&self) -> Vec<ChatTurn> {
		self.messages.iter().map(to_turn).collect()
	}

	/// Short transcript of the last few prior turns, used by the classification prompts.
	pub fn recent_transcript(&self) -> Option<String> {
		let prior = self.prior();

		if prior.is_empty() {
			return None;
		}

		let start = prior.len().saturating_sub(SUMMARY_TURNS);
		let lines = prior[start..]
			.iter()
			.map(|msg| {
				let (content, _) = text::truncate_graphemes(&msg.content, SUMMARY_TURN_CHARS);

				format!("{}: {}", msg.author.as_str().to_uppercase(), content.replace('\n', " "))
			})
			.collect::<Vec<_>>();

		Some(lines.join("\n"))
	}

	pub fn summary(&self) -> Value {
		serde_json::json!({
			"conversation_id": self.conversation_id,
			"turns": self.messages.len(),
			"prior_turns": self.prior().len(),
		})
	}
}

fn to_turn(message: &ChatMessage) -> ChatTurn {
	match message.author {
		Author::User => ChatTurn::user(message.content.clone()),
		Author::Assistant => ChatTurn::assistant(message.content.clone()),
	}
}
