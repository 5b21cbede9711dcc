use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use jarvis_domain::message::Author;
use jarvis_storage::{db::Db, models::ChatMessage, queries};
use jarvis_testkit::TestDatabase;

fn message(
	conversation_id: Uuid,
	author: Author,
	content: &str,
	created_at: OffsetDateTime,
) -> ChatMessage {
	ChatMessage {
		message_id: Uuid::new_v4(),
		conversation_id,
		author,
		content: content.to_string(),
		metadata: None,
		created_at,
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set JARVIS_PG_DSN to run."]
async fn db_connects_and_bootstraps_twice() {
	let Some(base_dsn) = jarvis_testkit::env_dsn() else {
		eprintln!("Skipping db_connects_and_bootstraps_twice; set JARVIS_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = Db::connect(&test_db.postgres_config()).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");
	db.ensure_schema().await.expect("Schema bootstrap must be repeatable.");
	queries::ping(&db.pool).await.expect("Ping failed.");

	let count: i64 = sqlx::query_scalar(
		"SELECT count(*) FROM information_schema.tables WHERE table_name = 'chat_messages'",
	)
	.fetch_one(&db.pool)
	.await
	.expect("Failed to query schema tables.");

	assert_eq!(count, 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set JARVIS_PG_DSN to run."]
async fn conversation_history_is_chronological_and_isolated() {
	let Some(base_dsn) = jarvis_testkit::env_dsn() else {
		eprintln!(
			"Skipping conversation_history_is_chronological_and_isolated; set JARVIS_PG_DSN to run."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = Db::connect(&test_db.postgres_config()).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let conversation_id = Uuid::new_v4();
	let other_id = Uuid::new_v4();
	let base = OffsetDateTime::from_unix_timestamp(1_800_000_000).expect("timestamp");
	let mut reply = message(conversation_id, Author::Assistant, "4", base + Duration::seconds(1));

	reply.metadata = Some(serde_json::json!({ "branch": "direct", "search_used": false }));

	let question = message(conversation_id, Author::User, "What is 2+2?", base);
	let unrelated = message(other_id, Author::User, "Elsewhere", base);

	for row in [&reply, &question, &unrelated] {
		queries::insert_message(&db.pool, row).await.expect("Failed to insert message.");
	}

	let history = queries::list_conversation_messages(&db.pool, conversation_id)
		.await
		.expect("Failed to load history.");

	assert_eq!(history, vec![question, reply]);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set JARVIS_PG_DSN to run."]
async fn non_object_metadata_is_rejected_before_insert() {
	let Some(base_dsn) = jarvis_testkit::env_dsn() else {
		eprintln!("Skipping non_object_metadata_is_rejected_before_insert; set JARVIS_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = Db::connect(&test_db.postgres_config()).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let mut row = message(Uuid::new_v4(), Author::User, "hi", OffsetDateTime::now_utc());

	row.metadata = Some(serde_json::json!("not an object"));

	let err = queries::insert_message(&db.pool, &row).await.expect_err("Expected rejection.");

	assert!(matches!(err, jarvis_storage::Error::InvalidArgument(_)), "Unexpected error: {err}");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
