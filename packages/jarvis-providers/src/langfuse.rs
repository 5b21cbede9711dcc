use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};

const INGESTION_PATH: &str = "/api/public/ingestion";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
	TraceCreate,
	SpanCreate,
	SpanUpdate,
}

#[derive(Clone, Debug, Serialize)]
pub struct IngestionEvent {
	pub id: String,
	/// RFC 3339 timestamp of when the event was produced.
	pub timestamp: String,
	#[serde(rename = "type")]
	pub kind: EventKind,
	pub body: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestionReport {
	pub accepted: usize,
	pub rejected: Vec<String>,
}

pub async fn ingest(
	cfg: &jarvis_config::Langfuse,
	batch: &[IngestionEvent],
) -> Result<IngestionReport> {
	if batch.is_empty() {
		return Ok(IngestionReport::default());
	}

	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.host, INGESTION_PATH);
	let body = serde_json::json!({ "batch": batch });
	let res = client
		.post(&url)
		.basic_auth(&cfg.public_key, Some(&cfg.secret_key))
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_ingestion_response(&json)
}

fn parse_ingestion_response(json: &Value) -> Result<IngestionReport> {
	let Some(object) = json.as_object() else {
		return Err(Error::InvalidResponse {
			message: "Ingestion response must be a JSON object.".to_string(),
		});
	};
	let accepted = object.get("successes").and_then(|v| v.as_array()).map(Vec::len).unwrap_or(0);
	let rejected = object
		.get("errors")
		.and_then(|v| v.as_array())
		.map(|errors| {
			errors
				.iter()
				.map(|err| {
					let id = err.get("id").and_then(|v| v.as_str()).unwrap_or("unknown");
					let message = err
						.get("message")
						.and_then(|v| v.as_str())
						.or_else(|| err.get("error").and_then(|v| v.as_str()))
						.unwrap_or("rejected");

					format!("{id}: {message}")
				})
				.collect()
		})
		.unwrap_or_default();

	Ok(IngestionReport { accepted, rejected })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reports_partial_rejections() {
		let json = serde_json::json!({
			"successes": [{ "id": "a", "status": 201 }, { "id": "b", "status": 201 }],
			"errors": [{ "id": "c", "status": 400, "message": "Invalid body" }]
		});
		let report = parse_ingestion_response(&json).expect("parse failed");

		assert_eq!(report.accepted, 2);
		assert_eq!(report.rejected, vec!["c: Invalid body".to_string()]);
	}

	#[test]
	fn event_kind_uses_langfuse_labels() {
		let event = IngestionEvent {
			id: "evt".to_string(),
			timestamp: "2026-01-01T00:00:00Z".to_string(),
			kind: EventKind::SpanUpdate,
			body: serde_json::json!({ "id": "span" }),
		};
		let value = serde_json::to_value(&event).expect("serialize failed");

		assert_eq!(value["type"], "span-update");
		assert_eq!(value["body"]["id"], "span");
	}
}
