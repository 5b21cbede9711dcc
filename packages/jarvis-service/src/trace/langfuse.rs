use std::sync::{Mutex, MutexGuard};

use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use jarvis_providers::langfuse::{self, EventKind, IngestionEvent};

use crate::{
	BoxFuture, time_serde,
	trace::{SpanClose, SpanOpen, TraceRecord, TraceSink},
};

/// Buffers Langfuse ingestion events and ships them in one batch per flush.
pub struct LangfuseTraceSink {
	cfg: jarvis_config::Langfuse,
	buffer: Mutex<Vec<IngestionEvent>>,
}
impl LangfuseTraceSink {
	pub fn new(cfg: jarvis_config::Langfuse) -> Self {
		Self { cfg, buffer: Mutex::new(Vec::new()) }
	}

	pub fn pending(&self) -> usize {
		self.lock().len()
	}

	fn lock(&self) -> MutexGuard<'_, Vec<IngestionEvent>> {
		// A panic while pushing cannot leave a half-written event behind.
		self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	fn push(&self, kind: EventKind, mut body: Map<String, Value>) {
		if let Some(environment) = self.cfg.environment.as_ref() {
			body.insert("environment".to_string(), Value::String(environment.clone()));
		}

		let event = IngestionEvent {
			id: Uuid::new_v4().to_string(),
			timestamp: time_serde::format(OffsetDateTime::now_utc()),
			kind,
			body: Value::Object(body),
		};

		self.lock().push(event);
	}

	fn drain(&self) -> Vec<IngestionEvent> {
		std::mem::take(&mut *self.lock())
	}
}

impl TraceSink for LangfuseTraceSink {
	fn open_span(&self, span: SpanOpen) {
		self.push(EventKind::SpanCreate, span_create_body(span));
	}

	fn close_span(&self, span: SpanClose) {
		self.push(EventKind::SpanUpdate, span_update_body(span));
	}

	fn record_trace(&self, trace: TraceRecord) {
		self.push(EventKind::TraceCreate, trace_create_body(trace));
	}

	fn flush<'a>(&'a self) -> BoxFuture<'a, jarvis_providers::Result<()>> {
		Box::pin(async move {
			let batch = self.drain();

			if batch.is_empty() {
				return Ok(());
			}

			let report = langfuse::ingest(&self.cfg, &batch).await?;

			if !report.rejected.is_empty() {
				tracing::warn!(
					accepted = report.accepted,
					rejected = report.rejected.len(),
					first_rejection = report.rejected.first().map(String::as_str).unwrap_or(""),
					"Langfuse rejected part of a batch."
				);
			}

			Ok(())
		})
	}
}

fn span_create_body(span: SpanOpen) -> Map<String, Value> {
	let mut body = Map::new();

	body.insert("id".to_string(), Value::String(span.span_id.to_string()));
	body.insert("traceId".to_string(), Value::String(span.trace_id.to_string()));
	body.insert("name".to_string(), Value::String(span.name.to_string()));
	body.insert("startTime".to_string(), Value::String(time_serde::format(span.start_time)));
	body.insert("input".to_string(), span.input);

	body
}

fn span_update_body(span: SpanClose) -> Map<String, Value> {
	let mut body = Map::new();

	body.insert("id".to_string(), Value::String(span.span_id.to_string()));
	body.insert("traceId".to_string(), Value::String(span.trace_id.to_string()));
	body.insert("endTime".to_string(), Value::String(time_serde::format(span.end_time)));
	body.insert("output".to_string(), span.output);
	body.insert("metadata".to_string(), Value::Object(span.metadata));
	body.insert(
		"level".to_string(),
		serde_json::to_value(span.level).unwrap_or(Value::String("DEFAULT".to_string())),
	);

	if let Some(status) = span.status_message {
		body.insert("statusMessage".to_string(), Value::String(status));
	}

	body
}

fn trace_create_body(trace: TraceRecord) -> Map<String, Value> {
	let mut body = Map::new();

	body.insert("id".to_string(), Value::String(trace.trace_id.to_string()));
	body.insert("name".to_string(), Value::String(trace.name.to_string()));
	body.insert("timestamp".to_string(), Value::String(time_serde::format(trace.timestamp)));
	body.insert("input".to_string(), trace.input);
	body.insert("output".to_string(), trace.output);
	body.insert("metadata".to_string(), Value::Object(trace.metadata));
	body.insert(
		"tags".to_string(),
		Value::Array(trace.tags.into_iter().map(Value::String).collect()),
	);

	body
}
