use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use jarvis_domain::message::Author;

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct ChatMessage {
	pub message_id: Uuid,
	pub conversation_id: Uuid,
	#[sqlx(try_from = "String")]
	pub author: Author,
	pub content: String,
	pub metadata: Option<Value>,
	pub created_at: OffsetDateTime,
}
