use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{Error, Result, models::ChatMessage};

pub async fn insert_message<'e, E>(executor: E, message: &ChatMessage) -> Result<()>
where
	E: PgExecutor<'e>,
{
	if message.metadata.as_ref().is_some_and(|metadata| !metadata.is_object()) {
		return Err(Error::InvalidArgument("Message metadata must be a JSON object.".to_string()));
	}

	sqlx::query(
		"\
INSERT INTO chat_messages (
	message_id,
	conversation_id,
	author,
	content,
	metadata,
	created_at
)
VALUES ($1,$2,$3,$4,$5,$6)",
	)
	.bind(message.message_id)
	.bind(message.conversation_id)
	.bind(message.author.as_str())
	.bind(message.content.as_str())
	.bind(message.metadata.clone())
	.bind(message.created_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn list_conversation_messages<'e, E>(
	executor: E,
	conversation_id: Uuid,
) -> Result<Vec<ChatMessage>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, ChatMessage>(
		"\
SELECT message_id, conversation_id, author, content, metadata, created_at
FROM chat_messages
WHERE conversation_id = $1
ORDER BY created_at ASC, message_id ASC",
	)
	.bind(conversation_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn ping<'e, E>(executor: E) -> Result<()>
where
	E: PgExecutor<'e>,
{
	let one: i32 = sqlx::query_scalar("SELECT 1").fetch_one(executor).await?;

	if one != 1 {
		return Err(Error::CorruptRow(format!("Health probe returned {one}.")));
	}

	Ok(())
}
